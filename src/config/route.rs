//! Route configuration: ordered rules, rule-set references and the final
//! outbound.
//!
//! Rules that accept user-supplied entries carry an [`RuleDirection`] anchor.
//! The anchor is template metadata only and never reaches the emitted JSON;
//! the rule's sentinel domain is what survives serialization.

use serde::{Deserialize, Serialize};

use crate::config::util::{is_false, string_or_vec, u16_or_vec};

// ============================================================================
// Route Configuration
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Route {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<RouteRule>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rule_set: Vec<RuleSet>,

    /// Outbound used when no rule matches
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "final")]
    pub final_outbound: Option<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub auto_detect_interface: bool,
}

impl Route {
    /// First rule anchored for `direction`.
    ///
    /// An explicit anchor wins. Rules without one (a document parsed back
    /// from JSON) are matched on the direction's sentinel domain.
    pub fn anchor_mut(&mut self, direction: RuleDirection) -> Option<&mut RouteRule> {
        let explicit = self
            .rules
            .iter()
            .position(|rule| rule.anchor == Some(direction));
        let index = explicit.or_else(|| {
            self.rules.iter().position(|rule| {
                rule.anchor.is_none() && rule.domain.iter().any(|d| d == direction.sentinel())
            })
        })?;
        self.rules.get_mut(index)
    }
}

// ============================================================================
// Route Rules
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct RouteRule {
    /// `logical` for rules combining nested `rules`
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "type")]
    pub rule_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<LogicalMode>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<RouteRule>,

    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "string_or_vec"
    )]
    pub inbound: Vec<String>,

    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "string_or_vec"
    )]
    pub protocol: Vec<String>,

    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "u16_or_vec"
    )]
    pub port: Vec<u16>,

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
    pub ip_cidr: Vec<String>,

    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "string_or_vec"
    )]
    pub rule_set: Vec<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub ip_is_private: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub invert: bool,

    /// Omitted means `route`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<RuleAction>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outbound: Option<String>,

    #[serde(skip)]
    pub anchor: Option<RuleDirection>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogicalMode {
    And,
    Or,
}

impl RouteRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn logical(mode: LogicalMode, rules: Vec<RouteRule>) -> Self {
        Self {
            rule_type: Some("logical".to_string()),
            mode: Some(mode),
            rules,
            ..Default::default()
        }
    }

    /// Splice point for user rules. Starts out matching only the
    /// direction's sentinel domain.
    pub fn anchor(direction: RuleDirection) -> Self {
        Self {
            domain: vec![direction.sentinel().to_string()],
            outbound: Some(direction.outbound().to_string()),
            anchor: Some(direction),
            ..Default::default()
        }
    }

    pub fn with_action(mut self, action: RuleAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_outbound(mut self, outbound: impl Into<String>) -> Self {
        self.outbound = Some(outbound.into());
        self
    }

    pub fn match_inbound(mut self, inbounds: &[&str]) -> Self {
        self.inbound = inbounds.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn match_protocol(mut self, protocol: &str) -> Self {
        self.protocol = vec![protocol.to_string()];
        self
    }

    pub fn match_port(mut self, ports: Vec<u16>) -> Self {
        self.port = ports;
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

    pub fn match_private_ip(mut self) -> Self {
        self.ip_is_private = true;
        self
    }
}

// ============================================================================
// Rule Actions
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RuleAction {
    Route,
    Reject,
    HijackDns,
    Sniff,
    Resolve,
}

// ============================================================================
// Anchors
// ============================================================================

/// Which user rule list an anchor accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RuleDirection {
    Direct,
    Proxy,
}

impl RuleDirection {
    pub const ALL: [RuleDirection; 2] = [RuleDirection::Direct, RuleDirection::Proxy];

    /// Reserved domain that marks the anchor rule in serialized documents.
    pub fn sentinel(self) -> &'static str {
        match self {
            Self::Direct => "direct-tag.oneoh.cloud",
            Self::Proxy => "proxy-tag.oneoh.cloud",
        }
    }

    pub fn outbound(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Proxy => "ExitGateway",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Proxy => "proxy",
        }
    }
}

// ============================================================================
// Rule Sets
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RuleSet {
    Remote(RemoteRuleSet),
}

impl RuleSet {
    pub fn tag(&self) -> &str {
        match self {
            Self::Remote(rs) => &rs.tag,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct RemoteRuleSet {
    pub tag: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<RuleSetFormat>,

    pub url: String,

    /// Outbound used to download the rule set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_detour: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuleSetFormat {
    Source,
    Binary,
}
