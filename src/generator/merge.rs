//! Merging subscription servers into a template's outbound groups.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::config::SingBoxConfig;
use crate::config::outbound::Outbound;
use crate::config::version::CoreFamily;
use crate::error::{Result, SynthesisError};
use crate::generator::subscription::SubscriptionPayload;

/// Index of the exit gateway selector in a freshly loaded template.
pub const SELECTOR_INDEX: usize = 1;
/// Index of the `auto` urltest group in a freshly loaded template.
pub const URLTEST_INDEX: usize = 2;

const CONTROL_TYPES: [&str; 4] = ["selector", "urltest", "direct", "block"];

// ============================================================================
// Merge Rules
// ============================================================================

/// Per-family classification and annotation rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MergeRules {
    /// `dns` entries are control entries, not servers.
    pub dns_is_structural: bool,
    /// Written to every server's `domain_resolver`.
    pub domain_resolver: Option<&'static str>,
}

impl MergeRules {
    pub fn for_family(family: CoreFamily) -> Self {
        Self {
            dns_is_structural: family.treats_dns_outbound_as_structural(),
            domain_resolver: family.server_domain_resolver(),
        }
    }

    /// True for entries that must never be treated as servers.
    pub fn is_structural(&self, kind: &str) -> bool {
        CONTROL_TYPES.contains(&kind) || (self.dns_is_structural && kind == "dns")
    }
}

impl From<CoreFamily> for MergeRules {
    fn from(family: CoreFamily) -> Self {
        Self::for_family(family)
    }
}

// ============================================================================
// Merge
// ============================================================================

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Server tags in the order they were added.
    pub servers: Vec<String>,
    /// Entries dropped because they were groups or other control types.
    pub skipped: usize,
    /// Tags that appeared more than once in the payload.
    pub duplicates: Vec<String>,
}

/// Adds every server in `payload` to the exit gateway selector, the `auto`
/// urltest group and the top-level outbound list, in payload order.
///
/// Fails with `MalformedTemplate`, leaving `config` untouched, if the
/// groups are not where a freshly loaded template keeps them.
pub fn merge(
    config: &mut SingBoxConfig,
    payload: &SubscriptionPayload,
    rules: MergeRules,
) -> Result<MergeReport> {
    check_groups(config)?;

    let mut report = MergeReport::default();
    let mut seen = HashSet::new();
    let mut servers = Vec::with_capacity(payload.outbounds.len());

    for definition in &payload.outbounds {
        if rules.is_structural(definition.kind()) {
            debug!(
                "Skipping {} entry '{}' from subscription",
                definition.kind(),
                definition.tag()
            );
            report.skipped += 1;
            continue;
        }

        let mut server = definition.clone();
        if let Some(resolver) = rules.domain_resolver {
            server.set("domain_resolver", resolver);
        }

        let tag = server.tag().to_string();
        if !seen.insert(tag.clone()) && !report.duplicates.contains(&tag) {
            report.duplicates.push(tag.clone());
        }
        report.servers.push(tag);
        servers.push(Outbound::Server(server));
    }

    if let Outbound::Selector(selector) = &mut config.outbounds[SELECTOR_INDEX] {
        selector.outbounds.extend(report.servers.iter().cloned());
    }
    if let Outbound::UrlTest(urltest) = &mut config.outbounds[URLTEST_INDEX] {
        urltest.outbounds.extend(report.servers.iter().cloned());
    }
    config.outbounds.extend(servers);

    if !report.duplicates.is_empty() {
        warn!(
            "Subscription repeats outbound tags {:?}; passing them through unchanged",
            report.duplicates
        );
    }
    debug!(
        "Merged {} servers, skipped {} control entries",
        report.servers.len(),
        report.skipped
    );

    Ok(report)
}

fn check_groups(config: &SingBoxConfig) -> Result<()> {
    match config.outbounds.get(SELECTOR_INDEX) {
        Some(Outbound::Selector(_)) => {}
        other => {
            return Err(SynthesisError::MalformedTemplate(format!(
                "outbounds[{SELECTOR_INDEX}] should be a selector, found {}",
                describe(other)
            )));
        }
    }
    match config.outbounds.get(URLTEST_INDEX) {
        Some(Outbound::UrlTest(_)) => Ok(()),
        other => Err(SynthesisError::MalformedTemplate(format!(
            "outbounds[{URLTEST_INDEX}] should be a urltest group, found {}",
            describe(other)
        ))),
    }
}

fn describe(outbound: Option<&Outbound>) -> String {
    match outbound {
        Some(o) => format!("{} '{}'", o.kind(), o.tag()),
        None => "nothing".to_string(),
    }
}
