//! Subscription payloads and where they come from.
//!
//! A payload is the JSON document a provider serves: an object whose
//! `outbounds` array lists proxy servers (and, often, the provider's own
//! groups). Payloads are fetched by the surrounding application and cached
//! per subscription identifier; synthesis only ever reads the cache.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::outbound::OutboundDefinition;
use crate::error::{Result, SynthesisError};
use crate::fs_atomic;
use crate::generator::overrides::Platform;
use crate::get_version;

// ============================================================================
// Payload
// ============================================================================

/// The parsed `{ "outbounds": [...] }` document.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct SubscriptionPayload {
    pub outbounds: Vec<OutboundDefinition>,
}

impl SubscriptionPayload {
    /// Validates the payload shape. Fields other than `outbounds` are
    /// ignored.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut document) = value else {
            return Err(SynthesisError::malformed("payload is not a JSON object"));
        };
        let entries = match document.remove("outbounds") {
            Some(Value::Array(entries)) => entries,
            Some(_) => return Err(SynthesisError::malformed("'outbounds' is not an array")),
            None => return Err(SynthesisError::malformed("'outbounds' is missing")),
        };

        let outbounds = entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| {
                OutboundDefinition::from_value(entry).map_err(|reason| {
                    SynthesisError::malformed(format!("outbounds[{index}]: {reason}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { outbounds })
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(content)
            .map_err(|e| SynthesisError::malformed(format!("invalid JSON: {e}")))?;
        Self::from_value(value)
    }
}

// ============================================================================
// Sources
// ============================================================================

/// Lookup of stored payloads by subscription identifier.
pub trait SubscriptionSource: Send + Sync {
    /// `Ok(None)` when nothing is stored under `identifier`.
    fn load(&self, identifier: &str) -> impl Future<Output = Result<Option<Value>>> + Send;
}

/// Directory of `<identifier>.json` payload files.
pub struct SubscriptionCache {
    cache_dir: PathBuf,
}

impl SubscriptionCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Cache file for a subscription. Characters outside `[A-Za-z0-9_-]`
    /// become `_`.
    pub fn path_for(&self, identifier: &str) -> PathBuf {
        let safe_name: String = identifier
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.cache_dir.join(format!("{safe_name}.json"))
    }

    /// Replaces the cached payload. A failed write keeps the previous one.
    pub async fn save(&self, identifier: &str, payload: &Value) -> Result<PathBuf> {
        let path = self.path_for(identifier);
        let content = serde_json::to_string_pretty(payload)?;

        let _guard = fs_atomic::lock_path(&path).await;
        fs_atomic::replace_file(&path, content.as_bytes())
            .await
            .map_err(|e| SynthesisError::io(format!("writing {}", path.display()), e))?;

        debug!("Cached subscription '{}' at {}", identifier, path.display());
        Ok(path)
    }
}

impl SubscriptionSource for SubscriptionCache {
    async fn load(&self, identifier: &str) -> Result<Option<Value>> {
        let path = self.path_for(identifier);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No cached payload at {}", path.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(SynthesisError::io(format!("reading {}", path.display()), e));
            }
        };

        let value = serde_json::from_str(&content).map_err(|e| {
            SynthesisError::malformed(format!("{} is not valid JSON: {e}", path.display()))
        })?;
        Ok(Some(value))
    }
}

/// In-memory payloads keyed by identifier.
#[derive(Default)]
pub struct MemorySubscriptions {
    payloads: HashMap<String, Value>,
}

impl MemorySubscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, identifier: impl Into<String>, payload: Value) {
        self.payloads.insert(identifier.into(), payload);
    }
}

impl SubscriptionSource for MemorySubscriptions {
    async fn load(&self, identifier: &str) -> Result<Option<Value>> {
        Ok(self.payloads.get(identifier).cloned())
    }
}

// ============================================================================
// Remote Fetch
// ============================================================================

/// Traffic and expiry figures a provider reports alongside the payload.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubscriptionInfo {
    pub upload: u64,
    pub download: u64,
    pub total: u64,
    /// Unix seconds, 0 when the provider did not say.
    pub expire: u64,
    /// Name suggested by `content-disposition`.
    pub file_name: Option<String>,
}

impl SubscriptionInfo {
    pub fn used(&self) -> u64 {
        self.upload.saturating_add(self.download)
    }
}

#[derive(Clone, Debug)]
pub struct FetchedSubscription {
    pub payload: Value,
    pub info: SubscriptionInfo,
}

/// `SFL/0.1.0 (linux x86_64; sing-box 1.12.0)`
pub fn user_agent(core_version: &str) -> String {
    let prefix = Platform::current().client_code();
    let core_version = core_version.trim_start_matches(['v', 'V']);
    format!(
        "{}/{} ({} {}; sing-box {})",
        prefix,
        get_version(),
        std::env::consts::OS,
        std::env::consts::ARCH,
        core_version
    )
}

/// Downloads a payload with a sing-box client user agent.
///
/// The body must be JSON; its shape is only checked at synthesis time.
pub async fn fetch_subscription(
    url: &str,
    core_version: &str,
) -> anyhow::Result<FetchedSubscription> {
    debug!("Fetching subscription from: {}", url);

    let parsed = Url::parse(url).with_context(|| format!("Invalid subscription URL: {}", url))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        bail!("Unsupported subscription URL scheme '{}': {}", parsed.scheme(), url);
    }

    let client = reqwest::Client::builder()
        .user_agent(user_agent(core_version))
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")?;

    let response = client
        .get(parsed)
        .send()
        .await
        .with_context(|| format!("Failed to fetch URL: {}", url))?;

    let status = response.status();
    if !status.is_success() {
        bail!("HTTP request failed with status {}: {}", status, url);
    }

    let header = |name: &str| {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let mut info = header("subscription-userinfo")
        .map(|v| parse_userinfo(&v))
        .unwrap_or_default();
    info.file_name = header("content-disposition").and_then(|v| parse_content_disposition(&v));

    let payload: Value = response
        .json()
        .await
        .with_context(|| format!("Subscription body from {} is not JSON", url))?;

    debug!(
        "Fetched subscription: used {} of {} bytes, expires {}",
        info.used(),
        info.total,
        info.expire
    );
    Ok(FetchedSubscription { payload, info })
}

/// Parses `upload=1; download=2; total=3; expire=4`. Unknown keys and
/// unparsable numbers are ignored.
pub fn parse_userinfo(header: &str) -> SubscriptionInfo {
    let mut info = SubscriptionInfo::default();
    for item in header.split(';') {
        let Some((key, value)) = item.split_once('=') else {
            continue;
        };
        let Ok(value) = value.trim().parse::<u64>() else {
            continue;
        };
        match key.trim() {
            "upload" => info.upload = value,
            "download" => info.download = value,
            "total" => info.total = value,
            "expire" => info.expire = value,
            _ => {}
        }
    }
    info
}

/// File name from a `content-disposition` header, percent-decoded, with an
/// RFC 5987 `filename*=UTF-8''...` form preferred when both are present.
pub fn parse_content_disposition(header: &str) -> Option<String> {
    let mut plain = None;
    for param in header.split(';').map(str::trim) {
        if let Some(encoded) = param.strip_prefix("filename*=") {
            let encoded = encoded
                .split_once("''")
                .map(|(_, name)| name)
                .unwrap_or(encoded);
            return decode_file_name(encoded);
        }
        if let Some(name) = param.strip_prefix("filename=") {
            plain = decode_file_name(name);
        }
    }
    plain
}

fn decode_file_name(raw: &str) -> Option<String> {
    let unquoted = raw.trim().trim_matches(['"', '\'']);
    if unquoted.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(unquoted)
        .map(|name| name.into_owned())
        .unwrap_or_else(|_| unquoted.to_string());
    Some(decoded)
}
