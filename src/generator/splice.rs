//! Splicing user-authored rule fragments into anchored route rules.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SingBoxConfig;
use crate::config::route::RuleDirection;
use crate::config::util::string_or_vec;

/// Matchers a user adds to one direction.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct CustomRuleFragment {
    #[serde(default, deserialize_with = "string_or_vec")]
    pub domain: Vec<String>,

    #[serde(default, deserialize_with = "string_or_vec")]
    pub domain_suffix: Vec<String>,

    #[serde(default, deserialize_with = "string_or_vec")]
    pub ip_cidr: Vec<String>,
}

impl CustomRuleFragment {
    pub fn is_empty(&self) -> bool {
        self.domain.is_empty() && self.domain_suffix.is_empty() && self.ip_cidr.is_empty()
    }
}

/// Both fragments, either of which may be absent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CustomRules {
    pub direct: Option<CustomRuleFragment>,
    pub proxy: Option<CustomRuleFragment>,
}

impl CustomRules {
    pub fn get(&self, direction: RuleDirection) -> Option<&CustomRuleFragment> {
        match direction {
            RuleDirection::Direct => self.direct.as_ref(),
            RuleDirection::Proxy => self.proxy.as_ref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        RuleDirection::ALL
            .iter()
            .all(|d| self.get(*d).is_none_or(CustomRuleFragment::is_empty))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpliceReport {
    pub applied: Vec<RuleDirection>,
    /// Non-empty fragments with no anchor to go into.
    pub skipped: Vec<RuleDirection>,
}

/// Appends each non-empty fragment to the first rule anchored for its
/// direction. A template without the anchor keeps the fragment out.
pub fn splice(config: &mut SingBoxConfig, custom: &CustomRules) -> SpliceReport {
    let mut report = SpliceReport::default();

    for direction in RuleDirection::ALL {
        let Some(fragment) = custom.get(direction).filter(|f| !f.is_empty()) else {
            continue;
        };

        let anchor = config
            .route
            .as_mut()
            .and_then(|route| route.anchor_mut(direction));
        let Some(rule) = anchor else {
            debug!(
                "No {} anchor in this template, leaving custom rules out",
                direction.as_str()
            );
            report.skipped.push(direction);
            continue;
        };

        rule.domain.extend(fragment.domain.iter().cloned());
        rule.domain_suffix.extend(fragment.domain_suffix.iter().cloned());
        rule.ip_cidr.extend(fragment.ip_cidr.iter().cloned());
        debug!(
            "Spliced {} domains, {} suffixes, {} CIDRs into the {} anchor",
            fragment.domain.len(),
            fragment.domain_suffix.len(),
            fragment.ip_cidr.len(),
            direction.as_str()
        );
        report.applied.push(direction);
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::version::CoreFamily;
    use crate::template::{self, Mode, Scope};
    use serde_json::json;

    fn fragment(suffixes: &[&str]) -> CustomRuleFragment {
        CustomRuleFragment {
            domain_suffix: suffixes.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_fragment_deserializes_partial_objects() {
        let f: CustomRuleFragment =
            serde_json::from_value(json!({"domain_suffix": "example.com"})).unwrap();
        assert_eq!(f.domain_suffix, ["example.com"]);
        assert!(f.domain.is_empty());
        assert!(!f.is_empty());
        assert!(CustomRuleFragment::default().is_empty());
    }

    #[test]
    fn test_splice_appends_after_sentinel() {
        let mut config = template::get(CoreFamily::V1_12, Scope::Tun, Mode::Rule).config;
        let custom = CustomRules {
            direct: Some(CustomRuleFragment {
                domain: vec!["intranet.corp".to_string()],
                domain_suffix: vec![".corp".to_string(), ".lan.example".to_string()],
                ip_cidr: vec!["10.8.0.0/16".to_string()],
            }),
            proxy: Some(fragment(&["openai.com"])),
        };

        let report = splice(&mut config, &custom);
        assert_eq!(report.applied, RuleDirection::ALL);
        assert!(report.skipped.is_empty());

        let route = config.route.as_mut().unwrap();
        let direct = route.anchor_mut(RuleDirection::Direct).unwrap();
        assert_eq!(direct.domain, ["direct-tag.oneoh.cloud", "intranet.corp"]);
        assert_eq!(direct.domain_suffix, [".corp", ".lan.example"]);
        assert_eq!(direct.ip_cidr, ["10.8.0.0/16"]);
        assert_eq!(direct.outbound.as_deref(), Some("direct"));

        let proxy = route.anchor_mut(RuleDirection::Proxy).unwrap();
        assert_eq!(proxy.domain_suffix, ["openai.com"]);
        assert_eq!(proxy.outbound.as_deref(), Some("ExitGateway"));
    }

    #[test]
    fn test_splice_keeps_existing_contents_first() {
        let mut config = template::get(CoreFamily::V1_12, Scope::Tun, Mode::Rule).config;
        {
            let route = config.route.as_mut().unwrap();
            let rule = route.anchor_mut(RuleDirection::Direct).unwrap();
            rule.domain_suffix = vec!["existing.example".to_string()];
        }

        splice(
            &mut config,
            &CustomRules {
                direct: Some(fragment(&["new.example"])),
                proxy: None,
            },
        );

        let route = config.route.as_mut().unwrap();
        let rule = route.anchor_mut(RuleDirection::Direct).unwrap();
        assert_eq!(rule.domain_suffix, ["existing.example", "new.example"]);
    }

    #[test]
    fn test_missing_anchor_is_skipped_silently() {
        let original = template::get(CoreFamily::V1_11, Scope::Tun, Mode::Rule).config;
        let mut config = original.clone();
        let report = splice(
            &mut config,
            &CustomRules {
                direct: Some(fragment(&["corp.example"])),
                proxy: Some(fragment(&["openai.com"])),
            },
        );
        assert!(report.applied.is_empty());
        assert_eq!(report.skipped, RuleDirection::ALL);
        assert_eq!(config, original);
    }

    #[test]
    fn test_empty_fragments_are_ignored() {
        let original = template::get(CoreFamily::V1_12, Scope::Tun, Mode::Rule).config;
        let mut config = original.clone();
        let custom = CustomRules {
            direct: Some(CustomRuleFragment::default()),
            proxy: None,
        };
        assert!(custom.is_empty());

        let report = splice(&mut config, &custom);
        assert_eq!(report, SpliceReport::default());
        assert_eq!(config, original);
    }
}
