//! Proxy-core version parsing and family dispatch.
//!
//! Templates only exist for two sing-box release lines and the two are not
//! schema compatible, so every request resolves its version string to a
//! [`CoreFamily`] before anything else happens.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::error::SynthesisError;

// ============================================================================
// SingBoxVersion Type
// ============================================================================

/// A sing-box release number such as `v1.12.0` or `1.11.15-beta.2`.
///
/// The leading `v` and any pre-release or build suffix are accepted and
/// ignored.
#[derive(Clone, Debug)]
pub struct SingBoxVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: Option<u32>,
}

impl SingBoxVersion {
    pub fn new(major: u32, minor: u32) -> Self {
        Self {
            major,
            minor,
            patch: None,
        }
    }

    pub fn with_patch(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch: Some(patch),
        }
    }

    /// Release line, ignoring the patch component.
    pub fn line(&self) -> (u32, u32) {
        (self.major, self.minor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionParseError {
    #[error("version string is empty")]
    Empty,
    #[error("invalid version format '{0}': expected 'vMAJOR.MINOR' or 'vMAJOR.MINOR.PATCH'")]
    InvalidFormat(String),
    #[error("invalid version component '{0}': expected a number")]
    InvalidNumber(String),
}

impl FromStr for SingBoxVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(VersionParseError::Empty);
        }

        let bare = s.strip_prefix(['v', 'V']).unwrap_or(s);
        let core = bare.split(['-', '+']).next().unwrap_or(bare);

        let parts: Vec<&str> = core.split('.').collect();
        if parts.len() < 2 || parts.len() > 3 {
            return Err(VersionParseError::InvalidFormat(s.to_string()));
        }

        let number = |part: &str| {
            part.parse::<u32>()
                .map_err(|_| VersionParseError::InvalidNumber(part.to_string()))
        };

        let major = number(parts[0])?;
        let minor = number(parts[1])?;
        let patch = parts.get(2).map(|p| number(*p)).transpose()?;

        Ok(Self {
            major,
            minor,
            patch,
        })
    }
}

impl fmt::Display for SingBoxVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.patch {
            Some(patch) => write!(f, "{}.{}.{}", self.major, self.minor, patch),
            None => write!(f, "{}.{}", self.major, self.minor),
        }
    }
}

impl Serialize for SingBoxVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SingBoxVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        SingBoxVersion::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl PartialEq for SingBoxVersion {
    fn eq(&self, other: &Self) -> bool {
        self.major == other.major
            && self.minor == other.minor
            && self.patch.unwrap_or(0) == other.patch.unwrap_or(0)
    }
}

impl Eq for SingBoxVersion {}

// ============================================================================
// Core Families
// ============================================================================

/// Release lines that have their own template set and merge rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CoreFamily {
    /// sing-box 1.11.x: legacy `address` DNS servers.
    V1_11,
    /// sing-box 1.12.x: typed DNS servers, outbounds need a `domain_resolver`.
    V1_12,
}

impl CoreFamily {
    /// Maps a caller-supplied version string onto a family.
    ///
    /// Never falls back to a default: anything outside the known release
    /// lines, including unparseable input, is `UnsupportedVersion`.
    pub fn resolve(version: &str) -> Result<Self, SynthesisError> {
        let unsupported = || SynthesisError::UnsupportedVersion {
            version: version.to_string(),
        };

        let parsed = SingBoxVersion::from_str(version).map_err(|_| unsupported())?;
        match parsed.line() {
            (1, 12) => Ok(Self::V1_12),
            (1, 11) => Ok(Self::V1_11),
            _ => Err(unsupported()),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::V1_11 => "v1.11",
            Self::V1_12 => "v1.12",
        }
    }

    /// `dns` outbounds were replaced by DNS rule actions in 1.12, so a
    /// subscription entry of that type is a control entry, not a server.
    pub fn treats_dns_outbound_as_structural(self) -> bool {
        matches!(self, Self::V1_12)
    }

    /// Resolver tag every merged server must carry, if the family needs one.
    pub fn server_domain_resolver(self) -> Option<&'static str> {
        match self {
            Self::V1_11 => None,
            Self::V1_12 => Some("system"),
        }
    }
}

impl fmt::Display for CoreFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
