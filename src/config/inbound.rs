use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::util::is_false;

pub const LOOPBACK: &str = "127.0.0.1";
pub const ALL_INTERFACES: &str = "0.0.0.0";

/// Port shared by the local proxy listener and the TUN HTTP proxy hint.
pub const MIXED_PORT: u16 = 6789;

// ============================================================================
// Inbound Enum
// ============================================================================

/// The two listener kinds the templates use.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Inbound {
    /// SOCKS + HTTP proxy listener
    Mixed(MixedInbound),
    /// Packet interception through a TUN device
    Tun(TunInbound),
}

impl Inbound {
    pub fn tag(&self) -> &str {
        match self {
            Self::Mixed(inbound) => &inbound.tag,
            Self::Tun(inbound) => &inbound.tag,
        }
    }
}

// ============================================================================
// Mixed Inbound
// ============================================================================

/// Listen options of a local listener.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ListenFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen_port: Option<u16>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub sniff: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub reuse_addr: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub tcp_fast_open: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct MixedInbound {
    pub tag: String,

    #[serde(flatten)]
    pub listen: ListenFields,

    #[serde(default)]
    pub set_system_proxy: bool,
}

impl MixedInbound {
    /// Loopback-bound listener on [`MIXED_PORT`].
    pub fn loopback(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            listen: ListenFields {
                listen: Some(LOOPBACK.to_string()),
                listen_port: Some(MIXED_PORT),
                sniff: true,
                ..Default::default()
            },
            set_system_proxy: false,
        }
    }

    pub fn with_socket_tuning(mut self) -> Self {
        self.listen.reuse_addr = true;
        self.listen.tcp_fast_open = true;
        self
    }

    pub fn bind(&mut self, address: &str) {
        self.listen.listen = Some(address.to_string());
    }

    pub fn listen_address(&self) -> Option<&str> {
        self.listen.listen.as_deref()
    }
}

// ============================================================================
// TUN Inbound
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct TunInbound {
    pub tag: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub address: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<TunPlatform>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<TunStack>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub auto_route: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub strict_route: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub sniff: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub sniff_override_destination: bool,

    /// Destinations that bypass the TUN device entirely.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub route_exclude_address: Vec<String>,
}

/// Platform hints for the TUN device (system HTTP proxy).
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct TunPlatform {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_proxy: Option<TunHttpProxy>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct TunHttpProxy {
    #[serde(default, skip_serializing_if = "is_false")]
    pub enabled: bool,

    pub server: String,

    pub server_port: u16,
}

/// TUN network stack implementation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TunStack {
    /// Kernel network stack
    System,
    /// User-space stack
    Gvisor,
    /// System stack for TCP, gVisor for UDP
    Mixed,
}

impl TunStack {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Gvisor => "gvisor",
            Self::Mixed => "mixed",
        }
    }
}

impl fmt::Display for TunStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TunStack {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "system" => Ok(Self::System),
            "gvisor" => Ok(Self::Gvisor),
            "mixed" => Ok(Self::Mixed),
            other => Err(format!("unknown TUN stack '{other}'")),
        }
    }
}
