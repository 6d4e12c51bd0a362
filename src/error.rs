use std::io;

use thiserror::Error;

/// Errors surfaced by a synthesis request.
///
/// Every variant is fatal to the request that produced it. A missing splice
/// anchor is not an error and never shows up here.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("unsupported proxy-core version '{version}'")]
    UnsupportedVersion { version: String },

    #[error("malformed subscription payload: {reason}")]
    MalformedSubscription { reason: String },

    #[error("no stored subscription payload for '{identifier}'")]
    MissingSubscription { identifier: String },

    #[error("malformed template: {0}")]
    MalformedTemplate(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl SynthesisError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedSubscription {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SynthesisError>;
