use serde::{Deserialize, Serialize};

use crate::config::util::is_false;

pub const CLASH_API_CONTROLLER: &str = "127.0.0.1:9191";

/// `experimental` block: the control-plane API and the cache file.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Experimental {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clash_api: Option<ClashApi>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_file: Option<CacheFile>,
}

/// Cache file configuration
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct CacheFile {
    #[serde(default, skip_serializing_if = "is_false")]
    pub enabled: bool,

    /// Absolute path, bound per request. Unset in templates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default)]
    pub store_fakeip: bool,

    /// Store rejected DNS response cache
    #[serde(default, skip_serializing_if = "is_false")]
    pub store_rdrc: bool,
}

/// Clash-compatible control API.
///
/// Clients authenticate with `Authorization: Bearer <secret>`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ClashApi {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_controller: Option<String>,

    #[serde(default)]
    pub secret: String,
}

impl Experimental {
    /// Control API on [`CLASH_API_CONTROLLER`] with an empty secret, and an
    /// enabled cache file without a path.
    pub fn standard() -> Self {
        Self {
            clash_api: Some(ClashApi {
                external_controller: Some(CLASH_API_CONTROLLER.to_string()),
                secret: String::new(),
            }),
            cache_file: Some(CacheFile {
                enabled: true,
                path: None,
                store_fakeip: false,
                store_rdrc: true,
            }),
        }
    }
}
