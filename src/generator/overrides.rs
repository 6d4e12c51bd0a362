//! Platform and preference overrides applied after merge and splice.

use std::path::PathBuf;

use tracing::debug;

use crate::config::dns::DnsServer;
use crate::config::experimental::{CacheFile, ClashApi, Experimental};
use crate::config::inbound::{ALL_INTERFACES, LOOPBACK, TunStack};
use crate::config::log::{Log, LogLevel};
use crate::generator::preferences::Preferences;
use crate::template::{self, Scope, Template};

/// Operating systems with different TUN defaults.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
    /// BSDs and anything else the desktop clients do not ship for.
    Other,
}

impl Platform {
    pub fn current() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    /// Maps a `std::env::consts::OS` value.
    pub fn from_os(os: &str) -> Self {
        match os {
            "linux" => Self::Linux,
            "macos" => Self::MacOs,
            "windows" => Self::Windows,
            _ => Self::Other,
        }
    }

    /// Stack used when the user has not chosen one.
    pub fn default_stack(self) -> TunStack {
        match self {
            Self::Linux => TunStack::System,
            Self::MacOs | Self::Windows | Self::Other => TunStack::Gvisor,
        }
    }

    /// Client code announced in the subscription user agent. Other Unix
    /// systems pass as the Linux client.
    pub fn client_code(self) -> &'static str {
        match self {
            Self::Linux | Self::Other => "SFL",
            Self::MacOs => "SFM",
            Self::Windows => "SFW",
        }
    }

    /// The system stack does not work on macOS, whatever the user picked.
    pub fn forces_gvisor(self) -> bool {
        matches!(self, Self::MacOs)
    }
}

/// Where the proxy core runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Environment {
    pub platform: Platform,
    /// Per-user configuration directory; cache files are placed here.
    pub config_dir: PathBuf,
}

impl Environment {
    pub fn new(platform: Platform, config_dir: impl Into<PathBuf>) -> Self {
        Self {
            platform,
            config_dir: config_dir.into(),
        }
    }
}

/// Stack for the TUN inbound on `platform` given the user's choice.
pub fn select_stack(platform: Platform, chosen: Option<TunStack>) -> TunStack {
    match chosen {
        _ if platform.forces_gvisor() => TunStack::Gvisor,
        Some(stack) => stack,
        None => platform.default_stack(),
    }
}

/// Binds the template to this machine and this user's preferences.
pub fn apply_overrides(template: &mut Template, prefs: &Preferences, env: &Environment) {
    let cache_path = env.config_dir.join(template.cache_file_name());
    let dhcp_resolver = template.dhcp_resolver;
    let scope = template.scope;
    let config = &mut template.config;

    if scope == Scope::Tun
        && let Some(tun) = config.tun_inbound_mut()
    {
        let stack = select_stack(env.platform, prefs.tun_stack);
        debug!("TUN stack: {}", stack);
        tun.stack = Some(stack);
    }

    let listen = if prefs.allow_lan {
        ALL_INTERFACES
    } else {
        LOOPBACK
    };
    for mixed in config.mixed_inbounds_mut() {
        mixed.bind(listen);
    }
    debug!("Local listeners bind {}", listen);

    let experimental = config.experimental.get_or_insert_with(Experimental::standard);
    let cache_file = experimental.cache_file.get_or_insert_with(|| CacheFile {
        enabled: true,
        ..Default::default()
    });
    cache_file.path = Some(cache_path.to_string_lossy().into_owned());
    experimental
        .clash_api
        .get_or_insert_with(ClashApi::default)
        .secret = prefs.clash_api_secret.clone();

    let level = if prefs.channel.is_prerelease() {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    config.log.get_or_insert_with(|| Log::at(level)).level = Some(level);

    if let Some(tag) = dhcp_resolver
        && let Some(server) = config.dns.as_mut().and_then(|dns| dns.server_mut(tag))
    {
        *server = if prefs.use_dhcp {
            DnsServer::dhcp(tag)
        } else {
            template::system_udp_resolver()
        };
        debug!("Resolver '{}' uses DHCP: {}", tag, prefs.use_dhcp);
    }
}
