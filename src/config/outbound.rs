//! Outbound configuration types.
//!
//! Only the control outbounds the templates own are modelled field by field.
//! Proxy servers come from subscriptions in whatever shape the provider
//! chose, so they are carried as an [`OutboundDefinition`] that keeps every
//! provider field and its order.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::config::util::is_false;

pub const DIRECT_TAG: &str = "direct";
pub const EXIT_GATEWAY_TAG: &str = "ExitGateway";
pub const AUTO_TAG: &str = "auto";

// ============================================================================
// Outbound Enum
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub enum Outbound {
    Direct(DirectOutbound),
    Selector(SelectorOutbound),
    UrlTest(UrlTestOutbound),
    /// A proxy server copied from a subscription.
    Server(OutboundDefinition),
}

impl Outbound {
    pub fn tag(&self) -> &str {
        match self {
            Self::Direct(o) => &o.tag,
            Self::Selector(o) => &o.tag,
            Self::UrlTest(o) => &o.tag,
            Self::Server(o) => o.tag(),
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::Direct(_) => "direct",
            Self::Selector(_) => "selector",
            Self::UrlTest(_) => "urltest",
            Self::Server(o) => o.kind(),
        }
    }
}

impl Serialize for Outbound {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        #[derive(Serialize)]
        #[serde(tag = "type", rename_all = "lowercase")]
        enum Tagged<'a> {
            Direct(&'a DirectOutbound),
            Selector(&'a SelectorOutbound),
            UrlTest(&'a UrlTestOutbound),
        }

        match self {
            Self::Direct(o) => Tagged::Direct(o).serialize(serializer),
            Self::Selector(o) => Tagged::Selector(o).serialize(serializer),
            Self::UrlTest(o) => Tagged::UrlTest(o).serialize(serializer),
            Self::Server(o) => o.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Outbound {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;

        let value = Value::deserialize(deserializer)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| D::Error::custom("outbound is missing a string 'type'"))?;

        match kind {
            "direct" => serde_json::from_value(value)
                .map(Outbound::Direct)
                .map_err(D::Error::custom),
            "selector" => serde_json::from_value(value)
                .map(Outbound::Selector)
                .map_err(D::Error::custom),
            "urltest" => serde_json::from_value(value)
                .map(Outbound::UrlTest)
                .map_err(D::Error::custom),
            _ => OutboundDefinition::from_value(value)
                .map(Outbound::Server)
                .map_err(D::Error::custom),
        }
    }
}

// ============================================================================
// Control Outbounds
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct DirectOutbound {
    pub tag: String,

    /// DNS server used to resolve domain destinations (since 1.12.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_resolver: Option<String>,
}

/// Manually selected group. The exit gateway is one of these.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SelectorOutbound {
    pub tag: String,

    #[serde(default)]
    pub outbounds: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub interrupt_exist_connections: bool,
}

/// Latency-tested group.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct UrlTestOutbound {
    pub tag: String,

    #[serde(default)]
    pub outbounds: Vec<String>,

    /// Probe URL (sing-box default: https://www.gstatic.com/generate_204)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
}

// ============================================================================
// Subscription Outbounds
// ============================================================================

/// An outbound as delivered by a subscription: a JSON object with string
/// `tag` and `type` plus arbitrary provider fields.
#[derive(Clone, Debug, PartialEq)]
pub struct OutboundDefinition {
    fields: Map<String, Value>,
}

impl OutboundDefinition {
    /// Validates the `tag`/`type` pair and takes ownership of the object.
    pub fn from_value(value: Value) -> Result<Self, String> {
        let Value::Object(fields) = value else {
            return Err("outbound entry is not a JSON object".to_string());
        };
        for key in ["tag", "type"] {
            if !fields.get(key).is_some_and(Value::is_string) {
                return Err(format!("outbound entry has no string '{key}'"));
            }
        }
        Ok(Self { fields })
    }

    pub fn tag(&self) -> &str {
        self.str_field("tag")
    }

    pub fn kind(&self) -> &str {
        self.str_field("type")
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Inserts or replaces a field. Existing keys keep their position.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.fields.insert(key.to_string(), value.into());
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    fn str_field(&self, key: &str) -> &str {
        self.fields.get(key).and_then(Value::as_str).unwrap_or_default()
    }
}

impl Serialize for OutboundDefinition {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.fields.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for OutboundDefinition {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        OutboundDefinition::from_value(value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_control_outbounds_serialize_with_type() {
        let selector = Outbound::Selector(SelectorOutbound {
            tag: EXIT_GATEWAY_TAG.to_string(),
            outbounds: vec![AUTO_TAG.to_string()],
            default: None,
            interrupt_exist_connections: true,
        });
        let value = serde_json::to_value(&selector).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "selector",
                "tag": "ExitGateway",
                "outbounds": ["auto"],
                "interrupt_exist_connections": true
            })
        );

        let urltest = Outbound::UrlTest(UrlTestOutbound {
            tag: AUTO_TAG.to_string(),
            ..Default::default()
        });
        let value = serde_json::to_value(&urltest).unwrap();
        assert_eq!(value, json!({"type": "urltest", "tag": "auto", "outbounds": []}));
    }

    #[test]
    fn test_server_outbound_is_verbatim() {
        let source = json!({
            "tag": "srv-a",
            "type": "shadowsocks",
            "server": "203.0.113.7",
            "server_port": 8388,
            "method": "2022-blake3-aes-128-gcm",
            "password": "secret",
            "multiplex": {"enabled": true}
        });
        let outbound: Outbound = serde_json::from_value(source.clone()).unwrap();
        assert_eq!(outbound.tag(), "srv-a");
        assert_eq!(outbound.kind(), "shadowsocks");
        assert!(matches!(outbound, Outbound::Server(_)));

        let text = serde_json::to_string(&outbound).unwrap();
        assert_eq!(text, serde_json::to_string(&source).unwrap());
    }

    #[test]
    fn test_typed_outbounds_deserialize() {
        let outbound: Outbound =
            serde_json::from_value(json!({"type": "direct", "tag": "direct"})).unwrap();
        assert!(matches!(outbound, Outbound::Direct(ref d) if d.domain_resolver.is_none()));

        let outbound: Outbound = serde_json::from_value(
            json!({"type": "urltest", "tag": "auto", "outbounds": ["a", "b"]}),
        )
        .unwrap();
        let Outbound::UrlTest(group) = outbound else {
            panic!("expected urltest");
        };
        assert_eq!(group.outbounds, vec!["a", "b"]);
    }

    #[test]
    fn test_definition_requires_tag_and_type() {
        assert!(OutboundDefinition::from_value(json!("srv-a")).is_err());
        assert!(OutboundDefinition::from_value(json!({"type": "vmess"})).is_err());
        assert!(OutboundDefinition::from_value(json!({"tag": 7, "type": "vmess"})).is_err());
        assert!(OutboundDefinition::from_value(json!({"tag": "a"})).is_err());
        assert!(OutboundDefinition::from_value(json!({"tag": "a", "type": "vmess"})).is_ok());
    }

    #[test]
    fn test_definition_set_appends_new_field_last() {
        let mut def =
            OutboundDefinition::from_value(json!({"tag": "a", "type": "trojan", "server": "x"}))
                .unwrap();
        def.set("domain_resolver", "system");
        let keys: Vec<&str> = def.fields().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["tag", "type", "server", "domain_resolver"]);
        assert_eq!(def.get("domain_resolver"), Some(&json!("system")));
    }
}
