//! Configuration synthesis.
//!
//! This module turns a stored subscription payload, the user's preferences
//! and a version-pinned template into the document the proxy core runs.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::SingBoxConfig;
use crate::config::version::CoreFamily;
use crate::error::{Result, SynthesisError};
use crate::store::SettingsStore;
use crate::template::{self, Mode, Scope};

// Sub-modules
pub mod emit;
pub mod generator_config;
pub mod helpers;
pub mod merge;
pub mod overrides;
pub mod preferences;
pub mod splice;
pub mod subscription;

// Re-exports
pub use emit::ConfigEmitter;
pub use generator_config::RunConfig;
pub use helpers::{default_config_dir, expand_tilde};
pub use merge::{MergeReport, MergeRules, merge};
pub use overrides::{Environment, Platform, apply_overrides};
pub use preferences::Preferences;
pub use splice::{CustomRuleFragment, CustomRules, SpliceReport, splice};
pub use subscription::{
    MemorySubscriptions, SubscriptionCache, SubscriptionPayload, SubscriptionSource,
};

/// File name the proxy core reads its configuration from.
pub const CONFIG_FILE_NAME: &str = "config.json";

// ============================================================================
// Request / Outcome
// ============================================================================

/// What to synthesize. The core version is always explicit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SynthesisRequest {
    pub identifier: String,
    pub core_version: String,
    pub scope: Scope,
    pub mode: Mode,
}

impl SynthesisRequest {
    pub fn new(
        identifier: impl Into<String>,
        core_version: impl Into<String>,
        scope: Scope,
        mode: Mode,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            core_version: core_version.into(),
            scope,
            mode,
        }
    }

    /// Request for the scope and mode the user last selected.
    pub async fn from_preferences<S: SettingsStore>(
        store: &S,
        identifier: impl Into<String>,
        core_version: impl Into<String>,
    ) -> Result<Self> {
        let (scope, mode) = preferences::load_selection(store).await?;
        Ok(Self::new(identifier, core_version, scope, mode))
    }
}

/// The synthesized document and what happened on the way.
#[derive(Clone, Debug)]
pub struct SynthesisOutcome {
    pub family: CoreFamily,
    pub config: SingBoxConfig,
    pub merge: MergeReport,
    pub splice: SpliceReport,
    /// Set once the document has been written.
    pub path: Option<PathBuf>,
}

// ============================================================================
// Synthesizer
// ============================================================================

/// Orchestrates a synthesis request from version lookup to file write.
pub struct Synthesizer<S, P> {
    settings: S,
    subscriptions: P,
    environment: Environment,
    output: PathBuf,
    emitter: ConfigEmitter,
}

impl<S, P> Synthesizer<S, P>
where
    S: SettingsStore,
    P: SubscriptionSource,
{
    /// Writes to `<config_dir>/config.json` unless told otherwise.
    pub fn new(settings: S, subscriptions: P, environment: Environment) -> Self {
        let output = environment.config_dir.join(CONFIG_FILE_NAME);
        Self {
            settings,
            subscriptions,
            environment,
            output,
            emitter: ConfigEmitter::new(),
        }
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = output.into();
        self
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn settings(&self) -> &S {
        &self.settings
    }

    /// Builds the document without writing it.
    pub async fn render(&self, request: &SynthesisRequest) -> Result<SynthesisOutcome> {
        info!(
            "Synthesizing '{}' for sing-box {} ({} / {})",
            request.identifier, request.core_version, request.scope, request.mode
        );

        // 1. Version gate, before any I/O
        let family = CoreFamily::resolve(&request.core_version)?;
        debug!("Version {} uses the {} templates", request.core_version, family);

        // 2. Stored payload
        let raw = self
            .subscriptions
            .load(&request.identifier)
            .await?
            .ok_or_else(|| SynthesisError::MissingSubscription {
                identifier: request.identifier.clone(),
            })?;
        let payload = SubscriptionPayload::from_value(raw)?;
        debug!("Payload has {} outbound entries", payload.outbounds.len());

        // 3. Fresh template copy
        let mut template = template::get(family, request.scope, request.mode);

        // 4. Servers into groups
        let merge_report = merge(&mut template.config, &payload, MergeRules::for_family(family))?;
        info!(
            "Merged {} servers into '{}' templates",
            merge_report.servers.len(),
            family
        );

        // 5. User rules into anchors
        let prefs = Preferences::load(&self.settings).await?;
        let splice_report = splice(&mut template.config, &prefs.custom_rules);
        if !splice_report.applied.is_empty() {
            info!("Applied custom rules for {:?}", splice_report.applied);
        }

        // 6. Platform and preference overrides
        apply_overrides(&mut template, &prefs, &self.environment);

        Ok(SynthesisOutcome {
            family,
            config: template.config,
            merge: merge_report,
            splice: splice_report,
            path: None,
        })
    }

    /// Builds the document and replaces the output file with it.
    pub async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesisOutcome> {
        let mut outcome = self.render(request).await?;
        self.emitter.emit(&outcome.config, &self.output).await?;
        outcome.path = Some(self.output.clone());
        Ok(outcome)
    }
}

// ============================================================================
// Tests
// ============================================================================
