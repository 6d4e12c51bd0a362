//! Version-pinned base documents.
//!
//! There is one template per (family, scope, mode). Each is built once per
//! process and never handed out by reference: [`get`] returns an owned
//! clone, so whatever a request does to its copy cannot leak into the next
//! request.

use std::fmt;
use std::str::FromStr;

use crate::config::SingBoxConfig;
use crate::config::inbound::{
    Inbound, LOOPBACK, MIXED_PORT, MixedInbound, TunHttpProxy, TunInbound, TunPlatform, TunStack,
};
use crate::config::log::{Log, LogLevel};
use crate::config::outbound::{
    AUTO_TAG, DIRECT_TAG, DirectOutbound, EXIT_GATEWAY_TAG, Outbound, SelectorOutbound,
    UrlTestOutbound,
};
use crate::config::version::CoreFamily;

pub mod rule_set;
mod v1_11;
mod v1_12;

pub(crate) use v1_12::system_udp_resolver;

// ============================================================================
// Selectors
// ============================================================================

/// Whether the proxy core intercepts all traffic or only serves a local
/// proxy listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    Mixed,
    Tun,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mixed => "mixed",
            Self::Tun => "tun",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mixed" => Ok(Self::Mixed),
            "tun" => Ok(Self::Tun),
            other => Err(format!("unknown scope '{other}', expected 'mixed' or 'tun'")),
        }
    }
}

/// Rule-based split routing, or everything through the exit gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Mode {
    Rule,
    Global,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rule => "rule",
            Self::Global => "global",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rule" | "rules" => Ok(Self::Rule),
            "global" => Ok(Self::Global),
            other => Err(format!("unknown mode '{other}', expected 'rule' or 'global'")),
        }
    }
}

// ============================================================================
// Template
// ============================================================================

/// A base document plus the metadata the later pipeline stages need.
#[derive(Clone, Debug, PartialEq)]
pub struct Template {
    pub family: CoreFamily,
    pub scope: Scope,
    pub mode: Mode,
    /// DNS server whose transport follows the DHCP preference, if any.
    pub dhcp_resolver: Option<&'static str>,
    pub config: SingBoxConfig,
}

impl Template {
    fn new(family: CoreFamily, scope: Scope, mode: Mode, config: SingBoxConfig) -> Self {
        Self {
            family,
            scope,
            mode,
            dhcp_resolver: None,
            config,
        }
    }

    fn with_dhcp_resolver(mut self, tag: &'static str) -> Self {
        self.dhcp_resolver = Some(tag);
        self
    }

    /// File name of the proxy core's cache database.
    ///
    /// The mixed-scope names are irregular, but existing installs already
    /// keep their caches under them.
    pub fn cache_file_name(&self) -> &'static str {
        match (self.scope, self.mode) {
            (Scope::Mixed, Mode::Rule) => "mixed-cache-rule--v1.db",
            (Scope::Mixed, Mode::Global) => "mixed-cache-gloabl-v1.db",
            (Scope::Tun, Mode::Rule) => "tun-cache-rule-v1.db",
            (Scope::Tun, Mode::Global) => "tun-cache-global-v1.db",
        }
    }
}

/// Fresh, unshared copy of the template for `(family, scope, mode)`.
pub fn get(family: CoreFamily, scope: Scope, mode: Mode) -> Template {
    match family {
        CoreFamily::V1_11 => v1_11::template(scope, mode).clone(),
        CoreFamily::V1_12 => v1_12::template(scope, mode).clone(),
    }
}

// ============================================================================
// Shared Building Blocks
// ============================================================================

pub(crate) const SERVER_TAG_SYSTEM: &str = "system";
pub(crate) const SERVER_TAG_PROXY: &str = "dns_proxy";
pub(crate) const SERVER_TAG_FAKEIP: &str = "remote";

/// Connectivity-check hosts that must never go through the proxy.
const CAPTIVE_DOMAINS: [&str; 5] = [
    "captive.oneoh.cloud",
    "captive.apple.com",
    "nmcheck.gnome.org",
    "www.msftconnecttest.com",
    "connectivitycheck.gstatic.com",
];

const LOCAL_SUFFIXES: [&str; 6] = [
    "local",
    "lan",
    "localdomain",
    "localhost",
    "bypass.local",
    "captive.apple.com",
];

/// Service domains routed direct in rule mode.
const SERVICE_SUFFIXES: [&str; 4] = [".oneoh.cloud", ".n2ray.dev", ".ksjhaoka.com", ".mixcapp.com"];

/// Domains resolved by the domestic resolver in rule mode.
const DOMESTIC_DNS_SUFFIXES: [&str; 12] = [
    ".oneoh.cloud",
    ".n2ray.dev",
    ".ksjhaoka.com",
    ".mixcapp.com",
    ".wiwide.net",
    "wiportal.wiwide.com",
    ".msftconnecttest.com",
    "nmcheck.gnome.org",
    "detectportal.firefox.com",
    "connectivitycheck.android.com",
    "www.miwifi.com",
    "router.asus.com",
];

const TUN_ADDRESSES: [&str; 2] = ["172.19.0.1/30", "fdfe:dcba:9876::1/126"];

const TUN_EXCLUDED_ROUTES: [&str; 17] = [
    "10.0.0.0/8",
    "100.64.0.0/10",
    "127.0.0.0/8",
    "169.254.0.0/16",
    "172.16.0.0/12",
    "192.0.0.0/24",
    "192.168.0.0/16",
    "224.0.0.0/4",
    "240.0.0.0/4",
    "255.255.255.255/32",
    "fe80::/10",
    "fc00::/7",
    "ff01::/16",
    "ff02::/16",
    "ff03::/16",
    "ff04::/16",
    "ff05::/16",
];

/// Domestic IPv6 block kept off the TUN device in rule mode.
const DOMESTIC_V6_ROUTE: &str = "240e::/20";

const URLTEST_PROBE: &str = "https://www.google.com/generate_204";

const TUN_MTU: u32 = 9000;

pub(crate) fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub(crate) fn captive_domains(count: usize) -> Vec<String> {
    strings(&CAPTIVE_DOMAINS[..count.min(CAPTIVE_DOMAINS.len())])
}

pub(crate) fn local_suffixes() -> Vec<String> {
    strings(&LOCAL_SUFFIXES)
}

pub(crate) fn service_suffixes() -> Vec<String> {
    strings(&SERVICE_SUFFIXES)
}

pub(crate) fn domestic_dns_suffixes() -> Vec<String> {
    strings(&DOMESTIC_DNS_SUFFIXES)
}

pub(crate) fn default_log() -> Log {
    Log::at(LogLevel::Info)
}

/// Local proxy listener. 1.12 also turns on address reuse and TFO.
pub(crate) fn mixed_listener(family: CoreFamily) -> Inbound {
    let listener = MixedInbound::loopback("mixed");
    Inbound::Mixed(match family {
        CoreFamily::V1_11 => listener,
        CoreFamily::V1_12 => listener.with_socket_tuning(),
    })
}

/// TUN listener with a gVisor stack; the resolver picks the final stack.
pub(crate) fn tun_listener(mode: Mode) -> Inbound {
    let mut excluded = strings(&TUN_EXCLUDED_ROUTES);
    if mode == Mode::Rule {
        excluded.push(DOMESTIC_V6_ROUTE.to_string());
    }

    Inbound::Tun(TunInbound {
        tag: "tun".to_string(),
        address: strings(&TUN_ADDRESSES),
        platform: Some(TunPlatform {
            http_proxy: Some(TunHttpProxy {
                enabled: true,
                server: LOOPBACK.to_string(),
                server_port: MIXED_PORT,
            }),
        }),
        mtu: Some(TUN_MTU),
        stack: Some(TunStack::Gvisor),
        auto_route: true,
        strict_route: true,
        sniff: true,
        sniff_override_destination: true,
        route_exclude_address: excluded,
    })
}

/// `direct`, the exit gateway selector and the `auto` urltest group, at
/// indices 0, 1 and 2.
pub(crate) fn control_outbounds(family: CoreFamily, probe: bool) -> Vec<Outbound> {
    vec![
        Outbound::Direct(DirectOutbound {
            tag: DIRECT_TAG.to_string(),
            domain_resolver: family.server_domain_resolver().map(str::to_string),
        }),
        Outbound::Selector(SelectorOutbound {
            tag: EXIT_GATEWAY_TAG.to_string(),
            outbounds: vec![AUTO_TAG.to_string()],
            default: None,
            interrupt_exist_connections: true,
        }),
        Outbound::UrlTest(UrlTestOutbound {
            tag: AUTO_TAG.to_string(),
            outbounds: Vec::new(),
            url: probe.then(|| URLTEST_PROBE.to_string()),
            interval: None,
        }),
    ]
}
