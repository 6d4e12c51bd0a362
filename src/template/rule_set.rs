//! Remote rule sets the templates route on.

use crate::config::outbound::DIRECT_TAG;
use crate::config::route::{RemoteRuleSet, RuleSet, RuleSetFormat};

/// A named binary rule set hosted on a CDN.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RuleSetDescriptor {
    pub tag: &'static str,
    pub url: &'static str,
}

impl RuleSetDescriptor {
    /// Downloaded over `direct` so a broken proxy cannot block rule updates.
    pub fn to_rule_set(self) -> RuleSet {
        RuleSet::Remote(RemoteRuleSet {
            tag: self.tag.to_string(),
            format: Some(RuleSetFormat::Binary),
            url: self.url.to_string(),
            download_detour: Some(DIRECT_TAG.to_string()),
        })
    }
}

pub const CATALOG: [RuleSetDescriptor; 7] = [
    RuleSetDescriptor {
        tag: "geoip-cn",
        url: "https://fastly.jsdelivr.net/gh/SagerNet/sing-geoip@rule-set/geoip-cn.srs",
    },
    RuleSetDescriptor {
        tag: "geosite-cn",
        url: "https://fastly.jsdelivr.net/gh/OneOhCloud/one-geosite@rules/geosite-one-cn.srs",
    },
    RuleSetDescriptor {
        tag: "geosite-apple",
        url: "https://fastly.jsdelivr.net/gh/SagerNet/sing-geosite@rule-set/geosite-apple.srs",
    },
    RuleSetDescriptor {
        tag: "geosite-microsoft-cn",
        url: "https://fastly.jsdelivr.net/gh/SagerNet/sing-geosite@rule-set/geosite-microsoft@cn.srs",
    },
    RuleSetDescriptor {
        tag: "geosite-samsung",
        url: "https://fastly.jsdelivr.net/gh/SagerNet/sing-geosite@rule-set/geosite-samsung.srs",
    },
    RuleSetDescriptor {
        tag: "geosite-telegram",
        url: "https://fastly.jsdelivr.net/gh/SagerNet/sing-geosite@rule-set/geosite-telegram.srs",
    },
    RuleSetDescriptor {
        tag: "geosite-private",
        url: "https://fastly.jsdelivr.net/gh/SagerNet/sing-geosite@rule-set/geosite-private.srs",
    },
];

/// Rule sets whose members resolve and connect without the proxy.
pub const DOMESTIC: [&str; 6] = [
    "geoip-cn",
    "geosite-cn",
    "geosite-apple",
    "geosite-microsoft-cn",
    "geosite-samsung",
    "geosite-private",
];

/// The whole catalog as `route.rule_set` entries.
pub fn catalog() -> Vec<RuleSet> {
    CATALOG.iter().map(|d| d.to_rule_set()).collect()
}

pub fn domestic() -> Vec<String> {
    DOMESTIC.iter().map(|tag| tag.to_string()).collect()
}

pub fn descriptor(tag: &str) -> Option<&'static RuleSetDescriptor> {
    CATALOG.iter().find(|d| d.tag == tag)
}
