use serde::{Deserialize, Serialize};

use crate::config::dns::Dns;
use crate::config::experimental::Experimental;
use crate::config::inbound::{Inbound, MixedInbound, TunInbound};
use crate::config::log::Log;
use crate::config::outbound::Outbound;
use crate::config::route::Route;

pub mod dns;
pub mod experimental;
pub mod inbound;
pub mod log;
pub mod outbound;
pub mod route;
pub mod util;
pub mod version;

/// A complete sing-box configuration document.
///
/// Section order matches what the proxy core documents: `log`, `dns`,
/// `inbounds`, `route`, `experimental`, `outbounds`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SingBoxConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<Log>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<Dns>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inbounds: Vec<Inbound>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<Route>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experimental: Option<Experimental>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outbounds: Vec<Outbound>,
}

impl SingBoxConfig {
    pub fn builder() -> SingBoxConfigBuilder {
        SingBoxConfigBuilder::default()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Every local proxy listener, in document order.
    pub fn mixed_inbounds_mut(&mut self) -> impl Iterator<Item = &mut MixedInbound> {
        self.inbounds.iter_mut().filter_map(|inbound| match inbound {
            Inbound::Mixed(mixed) => Some(mixed),
            Inbound::Tun(_) => None,
        })
    }

    pub fn tun_inbound_mut(&mut self) -> Option<&mut TunInbound> {
        self.inbounds.iter_mut().find_map(|inbound| match inbound {
            Inbound::Tun(tun) => Some(tun),
            Inbound::Mixed(_) => None,
        })
    }

    pub fn outbound(&self, tag: &str) -> Option<&Outbound> {
        self.outbounds.iter().find(|o| o.tag() == tag)
    }
}

/// Builder for [`SingBoxConfig`]
#[derive(Default)]
pub struct SingBoxConfigBuilder {
    config: SingBoxConfig,
}

impl SingBoxConfigBuilder {
    pub fn log(mut self, log: Log) -> Self {
        self.config.log = Some(log);
        self
    }

    pub fn dns(mut self, dns: Dns) -> Self {
        self.config.dns = Some(dns);
        self
    }

    pub fn inbound(mut self, inbound: Inbound) -> Self {
        self.config.inbounds.push(inbound);
        self
    }

    pub fn route(mut self, route: Route) -> Self {
        self.config.route = Some(route);
        self
    }

    pub fn experimental(mut self, experimental: Experimental) -> Self {
        self.config.experimental = Some(experimental);
        self
    }

    pub fn outbounds(mut self, outbounds: Vec<Outbound>) -> Self {
        self.config.outbounds = outbounds;
        self
    }

    pub fn build(self) -> SingBoxConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::inbound::{LOOPBACK, MixedInbound};
    use crate::config::log::LogLevel;
    use crate::config::outbound::DirectOutbound;

    #[test]
    fn test_singbox_config_default_serializes_empty() {
        let json = SingBoxConfig::default().to_json().unwrap();
        assert_eq!(json, "{}");
    }

    #[test]
    fn test_section_order() {
        let config = SingBoxConfig::builder()
            .outbounds(vec![Outbound::Direct(DirectOutbound {
                tag: "direct".to_string(),
                domain_resolver: None,
            })])
            .experimental(Experimental::standard())
            .route(Route::default())
            .inbound(Inbound::Mixed(MixedInbound::loopback("mixed")))
            .dns(Dns::default())
            .log(Log::at(LogLevel::Info))
            .build();

        let json = config.to_json().unwrap();
        let keys = [
            "\"log\"",
            "\"dns\"",
            "\"inbounds\"",
            "\"route\"",
            "\"experimental\"",
            "\"outbounds\"",
        ];
        let positions: Vec<usize> = keys.iter().map(|key| json.find(key).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{json}");
    }

    #[test]
    fn test_singbox_config_roundtrip() {
        let config = SingBoxConfig::builder()
            .log(Log::at(LogLevel::Debug))
            .inbound(Inbound::Mixed(MixedInbound::loopback("mixed")))
            .build();
        let parsed = SingBoxConfig::from_json(&config.to_json_pretty().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_inbound_accessors() {
        let mut config = SingBoxConfig::builder()
            .inbound(Inbound::Mixed(MixedInbound::loopback("mixed")))
            .build();
        assert!(config.tun_inbound_mut().is_none());
        let listeners: Vec<_> = config.mixed_inbounds_mut().collect();
        assert_eq!(listeners.len(), 1);
        assert_eq!(listeners[0].listen_address(), Some(LOOPBACK));
    }
}
