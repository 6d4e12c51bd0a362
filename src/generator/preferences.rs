//! User preferences read from the settings store.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use rand::distr::Alphanumeric;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::inbound::TunStack;
use crate::error::{Result, SynthesisError};
use crate::generator::splice::{CustomRuleFragment, CustomRules};
use crate::store::SettingsStore;
use crate::template::{Mode, Scope};

pub const ALLOW_LAN_KEY: &str = "allow_lan";
pub const USE_DHCP_KEY: &str = "use_dhcp";
pub const TUN_STACK_KEY: &str = "tun_stack";
pub const STAGE_VERSION_KEY: &str = "stage_version";
pub const CUSTOM_DIRECT_KEY: &str = "custom_rule_set_direct";
pub const CUSTOM_PROXY_KEY: &str = "custom_rule_set_proxy";
pub const CLASH_API_SECRET_KEY: &str = "clash_api_secret";
pub const ENABLE_TUN_KEY: &str = "enable_tun";
pub const RULE_MODE_KEY: &str = "rule_mode";

const SECRET_LEN: usize = 32;

// ============================================================================
// Update Channel
// ============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UpdateChannel {
    #[default]
    Stable,
    Beta,
    Dev,
}

impl UpdateChannel {
    pub fn is_prerelease(self) -> bool {
        !matches!(self, Self::Stable)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stable => "stable",
            Self::Beta => "beta",
            Self::Dev => "dev",
        }
    }
}

impl fmt::Display for UpdateChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdateChannel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            // Older releases stored the stable channel as "latest".
            "stable" | "latest" => Ok(Self::Stable),
            "beta" => Ok(Self::Beta),
            "dev" => Ok(Self::Dev),
            other => Err(format!("unknown update channel '{other}'")),
        }
    }
}

// ============================================================================
// Preferences
// ============================================================================

/// Snapshot of every setting one synthesis reads.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Preferences {
    pub allow_lan: bool,
    pub use_dhcp: bool,
    /// Explicit stack choice, if the user made one.
    pub tun_stack: Option<TunStack>,
    pub channel: UpdateChannel,
    pub custom_rules: CustomRules,
    pub clash_api_secret: String,
}

impl Preferences {
    /// Reads every preference fresh from `store`.
    ///
    /// Unreadable values fall back to their defaults with a warning. The
    /// control-plane secret is generated and persisted on first use.
    pub async fn load<S: SettingsStore>(store: &S) -> Result<Self> {
        let allow_lan = read_flag(store, ALLOW_LAN_KEY).await?;
        let use_dhcp = read_flag(store, USE_DHCP_KEY).await?;
        let tun_stack = read_parsed::<_, TunStack>(store, TUN_STACK_KEY).await?;
        let channel = read_parsed::<_, UpdateChannel>(store, STAGE_VERSION_KEY)
            .await?
            .unwrap_or_default();
        let custom_rules = CustomRules {
            direct: read_fragment(store, CUSTOM_DIRECT_KEY).await?,
            proxy: read_fragment(store, CUSTOM_PROXY_KEY).await?,
        };
        let clash_api_secret = ensure_secret(store).await?;

        debug!(
            "Preferences: allow_lan={}, use_dhcp={}, tun_stack={:?}, channel={}",
            allow_lan, use_dhcp, tun_stack, channel
        );

        Ok(Self {
            allow_lan,
            use_dhcp,
            tun_stack,
            channel,
            custom_rules,
            clash_api_secret,
        })
    }
}

/// Scope and mode the user last selected, defaulting to mixed/rule.
pub async fn load_selection<S: SettingsStore>(store: &S) -> Result<(Scope, Mode)> {
    let scope = if read_flag(store, ENABLE_TUN_KEY).await? {
        Scope::Tun
    } else {
        Scope::Mixed
    };
    let mode = read_parsed::<_, Mode>(store, RULE_MODE_KEY)
        .await?
        .unwrap_or(Mode::Rule);
    Ok((scope, mode))
}

/// Returns the stored control-plane secret, creating one if none exists.
///
/// The secret must survive restarts, so a fresh one is written back before
/// it is returned.
pub async fn ensure_secret<S: SettingsStore>(store: &S) -> Result<String> {
    if let Some(Value::String(secret)) = read(store, CLASH_API_SECRET_KEY).await?
        && !secret.is_empty()
    {
        return Ok(secret);
    }

    let secret = generate_secret();
    store
        .set(CLASH_API_SECRET_KEY, Value::String(secret.clone()))
        .await
        .map_err(|e| SynthesisError::io(format!("persisting '{CLASH_API_SECRET_KEY}'"), e))?;
    info!("Generated a new control-plane secret");
    Ok(secret)
}

pub fn generate_secret() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_LEN)
        .map(char::from)
        .collect()
}

// ============================================================================
// Typed Reads
// ============================================================================

async fn read<S: SettingsStore>(store: &S, key: &str) -> Result<Option<Value>> {
    store
        .get(key)
        .await
        .map_err(|e| SynthesisError::io(format!("reading setting '{key}'"), e))
}

async fn read_flag<S: SettingsStore>(store: &S, key: &str) -> Result<bool> {
    Ok(match read(store, key).await? {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => flag,
        Some(other) => {
            warn!("Setting '{}' is not a boolean ({}), using false", key, other);
            false
        }
    })
}

async fn read_parsed<S, T>(store: &S, key: &str) -> Result<Option<T>>
where
    S: SettingsStore,
    T: FromStr,
    T::Err: fmt::Display,
{
    Ok(match read(store, key).await? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(Value::String(s)) => match s.parse() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring setting '{}': {}", key, e);
                None
            }
        },
        Some(other) => {
            warn!("Setting '{}' is not a string ({}), ignoring", key, other);
            None
        }
    })
}

/// Fragments are stored as objects; a JSON-encoded string is accepted too.
async fn read_fragment<S: SettingsStore>(
    store: &S,
    key: &str,
) -> Result<Option<CustomRuleFragment>> {
    Ok(match read(store, key).await? {
        None | Some(Value::Null) => None,
        Some(Value::String(encoded)) => decode(key, serde_json::from_str(&encoded)),
        Some(value) => decode(key, serde_json::from_value(value)),
    })
}

fn decode<T: DeserializeOwned>(
    key: &str,
    parsed: std::result::Result<T, serde_json::Error>,
) -> Option<T> {
    parsed
        .map_err(|e| warn!("Ignoring malformed setting '{}': {}", key, e))
        .ok()
}
