//! Serde helpers shared by the typed sing-box document.
//!
//! sing-box accepts a bare value wherever it accepts a list, so the templates
//! and any document parsed back from disk go through these deserializers.

use serde::{Deserialize, Deserializer};

// ============================================================================
// Skip Predicates
// ============================================================================

/// Used with `#[serde(skip_serializing_if = "is_false")]`.
#[inline]
pub fn is_false(b: &bool) -> bool {
    !*b
}

// ============================================================================
// One-or-Many Deserializers
// ============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> From<OneOrMany<T>> for Vec<T> {
    fn from(value: OneOrMany<T>) -> Self {
        match value {
            OneOrMany::One(v) => vec![v],
            OneOrMany::Many(v) => v,
        }
    }
}

/// Accepts `"inbound": "tun"` as well as `"inbound": ["mixed", "tun"]`.
///
/// Use with `#[serde(default, deserialize_with = "string_or_vec")]`.
pub fn string_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    OneOrMany::<String>::deserialize(deserializer).map(Into::into)
}

/// Port matchers: `"port": 53` or `"port": [53, 853]`.
pub fn u16_or_vec<'de, D>(deserializer: D) -> Result<Vec<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    OneOrMany::<u16>::deserialize(deserializer).map(Into::into)
}
