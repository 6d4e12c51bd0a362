use serde::{Deserialize, Serialize};

use crate::config::util::{is_false, string_or_vec};

/// `dns` block of the emitted document.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Dns {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<DnsServer>,

    /// Evaluated in order; the first matching rule decides.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<DnsRule>,

    /// Server used when no rule matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#final: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,

    /// Top-level fakeip switch used by 1.11 configs. 1.12 uses a `fakeip`
    /// server instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fakeip: Option<FakeIp>,
}

impl Dns {
    pub fn server_mut(&mut self, tag: &str) -> Option<&mut DnsServer> {
        self.servers.iter_mut().find(|s| s.tag() == tag)
    }
}

/// Domain resolution strategy
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    PreferIpv4,
    PreferIpv6,
    Ipv4Only,
    Ipv6Only,
}

// ============================================================================
// DNS Servers
// ============================================================================

/// A DNS server in either schema.
///
/// 1.12 servers carry a `type` discriminator; 1.11 servers are described by a
/// single `address` string and have no `type` at all.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum DnsServer {
    Typed(TypedDnsServer),
    Legacy(LegacyDnsServer),
}

impl DnsServer {
    pub fn tag(&self) -> &str {
        match self {
            Self::Typed(server) => server.tag(),
            Self::Legacy(server) => &server.tag,
        }
    }

    /// Legacy 1.11 server, e.g. `legacy("alibaba", "223.6.6.6")`.
    pub fn legacy(tag: impl Into<String>, address: impl Into<String>) -> LegacyDnsServer {
        LegacyDnsServer {
            tag: tag.into(),
            address: address.into(),
            strategy: None,
            detour: None,
        }
    }

    pub fn udp(tag: impl Into<String>, server: impl Into<String>) -> RemoteDnsServer {
        RemoteDnsServer::new(tag, server)
    }

    pub fn local(tag: impl Into<String>) -> Self {
        Self::Typed(TypedDnsServer::Local(LocalDnsServer { tag: tag.into() }))
    }

    pub fn dhcp(tag: impl Into<String>) -> Self {
        Self::Typed(TypedDnsServer::Dhcp(DhcpDnsServer {
            tag: tag.into(),
            interface: None,
        }))
    }

    pub fn fakeip(tag: impl Into<String>) -> Self {
        Self::Typed(TypedDnsServer::FakeIp(FakeIpDnsServer {
            tag: tag.into(),
            inet4_range: Some(FAKEIP_INET4_RANGE.to_string()),
            inet6_range: Some(FAKEIP_INET6_RANGE.to_string()),
        }))
    }
}

impl From<LegacyDnsServer> for DnsServer {
    fn from(server: LegacyDnsServer) -> Self {
        Self::Legacy(server)
    }
}

impl From<TypedDnsServer> for DnsServer {
    fn from(server: TypedDnsServer) -> Self {
        Self::Typed(server)
    }
}

pub const FAKEIP_INET4_RANGE: &str = "198.18.0.0/15";
pub const FAKEIP_INET6_RANGE: &str = "fc00::/18";

/// 1.12 server, discriminated by `type`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TypedDnsServer {
    Local(LocalDnsServer),
    Dhcp(DhcpDnsServer),
    Udp(RemoteDnsServer),
    Tcp(RemoteDnsServer),
    Quic(RemoteDnsServer),
    #[serde(rename = "fakeip")]
    FakeIp(FakeIpDnsServer),
}

impl TypedDnsServer {
    pub fn tag(&self) -> &str {
        match self {
            Self::Local(s) => &s.tag,
            Self::Dhcp(s) => &s.tag,
            Self::Udp(s) | Self::Tcp(s) | Self::Quic(s) => &s.tag,
            Self::FakeIp(s) => &s.tag,
        }
    }
}

/// 1.11 server configuration.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct LegacyDnsServer {
    pub tag: String,

    /// `223.6.6.6`, `tcp://1.0.0.1`, `local` or `fakeip`.
    pub address: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detour: Option<String>,
}

impl LegacyDnsServer {
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_detour(mut self, detour: impl Into<String>) -> Self {
        self.detour = Some(detour.into());
        self
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct LocalDnsServer {
    pub tag: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct DhcpDnsServer {
    pub tag: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
}

/// UDP, TCP and QUIC servers share one shape.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct RemoteDnsServer {
    pub tag: String,

    pub server: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_port: Option<u16>,

    #[serde(flatten)]
    pub dial: DialFields,
}

impl RemoteDnsServer {
    pub fn new(tag: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            server: server.into(),
            server_port: None,
            dial: DialFields::default(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.server_port = Some(port);
        self
    }

    pub fn with_detour(mut self, detour: impl Into<String>) -> Self {
        self.dial.detour = Some(detour.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: impl Into<String>) -> Self {
        self.dial.connect_timeout = Some(timeout.into());
        self
    }

    pub fn udp(self) -> DnsServer {
        DnsServer::Typed(TypedDnsServer::Udp(self))
    }

    pub fn tcp(self) -> DnsServer {
        DnsServer::Typed(TypedDnsServer::Tcp(self))
    }

    pub fn quic(self) -> DnsServer {
        DnsServer::Typed(TypedDnsServer::Quic(self))
    }
}

/// Dial options the templates use on remote servers.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct DialFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detour: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct FakeIpDnsServer {
    pub tag: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inet4_range: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inet6_range: Option<String>,
}

/// Top-level fakeip block (1.11 only).
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct FakeIp {
    #[serde(default, skip_serializing_if = "is_false")]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inet4_range: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inet6_range: Option<String>,
}

impl FakeIp {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            inet4_range: Some(FAKEIP_INET4_RANGE.to_string()),
            inet6_range: Some(FAKEIP_INET6_RANGE.to_string()),
        }
    }
}

// ============================================================================
// DNS Rules
// ============================================================================

/// A DNS rule. Match conditions are ANDed; `invert` negates the result.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct DnsRule {
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "string_or_vec"
    )]
    pub query_type: Vec<String>,

    /// Outbound match (1.11 only), `any` matches lookups made by outbounds.
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "string_or_vec"
    )]
    pub outbound: Vec<String>,

    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "string_or_vec"
    )]
    pub domain: Vec<String>,

    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "string_or_vec"
    )]
    pub domain_suffix: Vec<String>,

    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "string_or_vec"
    )]
    pub rule_set: Vec<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub invert: bool,

    /// Omitted means `route`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<DnsRuleAction>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub disable_cache: bool,
}

impl DnsRule {
    /// Rejects the listed query types.
    pub fn reject_query_types(types: &[&str]) -> Self {
        Self {
            query_type: types.iter().map(|t| t.to_string()).collect(),
            action: Some(DnsRuleAction::Reject),
            ..Default::default()
        }
    }

    /// Routes matching queries to `server`.
    pub fn to_server(server: impl Into<String>) -> Self {
        Self {
            server: Some(server.into()),
            ..Default::default()
        }
    }

    pub fn match_query_type(mut self, types: &[&str]) -> Self {
        self.query_type = types.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn match_outbound(mut self, outbound: impl Into<String>) -> Self {
        self.outbound = vec![outbound.into()];
        self
    }

    pub fn match_domain(mut self, domains: Vec<String>) -> Self {
        self.domain = domains;
        self
    }

    pub fn match_domain_suffix(mut self, suffixes: Vec<String>) -> Self {
        self.domain_suffix = suffixes;
        self
    }

    pub fn match_rule_set(mut self, rule_sets: Vec<String>) -> Self {
        self.rule_set = rule_sets;
        self
    }

    pub fn invert(mut self) -> Self {
        self.invert = true;
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.disable_cache = true;
        self
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DnsRuleAction {
    Route,
    Reject,
}
