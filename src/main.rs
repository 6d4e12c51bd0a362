#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::style)]

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Parser;
use singbox_synth::cli::{Args, Command};
use singbox_synth::generator::subscription::fetch_subscription;
use singbox_synth::generator::{
    Environment, Platform, RunConfig, SubscriptionCache, SynthesisRequest, Synthesizer,
};
use singbox_synth::store::JsonFileStore;
use tracing::Level;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let is_verbose = args.verbose;
    tracing_subscriber::fmt()
        .with_max_level(if is_verbose {
            Level::TRACE
        } else {
            Level::INFO
        })
        .init();

    if let Err(e) = run(args).await {
        tracing::error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let run_config = match &args.config {
        Some(path) => {
            tracing::info!("Loading run config from: {}", path);
            RunConfig::load(path).await?
        }
        None => RunConfig::default(),
    };

    match args.command {
        Command::Generate {
            subscription,
            core_version,
            scope,
            mode,
            output,
            dry_run,
        } => {
            let core_version = required_version(core_version, &run_config)?;
            let settings = JsonFileStore::open(run_config.settings_path())
                .await
                .context("Failed to open settings store")?;

            let mut request =
                SynthesisRequest::from_preferences(&settings, subscription, core_version).await?;
            if let Some(scope) = scope {
                request.scope = scope;
            }
            if let Some(mode) = mode {
                request.mode = mode;
            }

            let environment = Environment::new(Platform::current(), run_config.config_dir());
            let output = output.map_or_else(|| run_config.output_path(), PathBuf::from);
            let synthesizer = Synthesizer::new(
                settings,
                SubscriptionCache::new(run_config.subscriptions_dir()),
                environment,
            )
            .with_output(output);

            if dry_run {
                let outcome = synthesizer.render(&request).await?;
                println!("{}", outcome.config.to_json_pretty()?);
            } else {
                let outcome = synthesizer.synthesize(&request).await?;
                tracing::info!(
                    "Config generation complete! {} servers merged",
                    outcome.merge.servers.len()
                );
            }
        }
        Command::Fetch {
            subscription,
            url,
            core_version,
        } => {
            let core_version = required_version(core_version, &run_config)?;
            tracing::info!("Fetching subscription '{}' from {}", subscription, url);

            let fetched = fetch_subscription(&url, &core_version).await?;
            let cache = SubscriptionCache::new(run_config.subscriptions_dir());
            let path = cache.save(&subscription, &fetched.payload).await?;

            tracing::info!("Cached subscription at {}", path.display());
            if let Some(name) = &fetched.info.file_name {
                tracing::info!("Provider name: {}", name);
            }
            if fetched.info.total > 0 {
                tracing::info!(
                    "Traffic used: {} / {} bytes",
                    fetched.info.used(),
                    fetched.info.total
                );
            }
        }
    }

    Ok(())
}

/// The engine never guesses a version: take the flag, then the run config.
fn required_version(flag: Option<String>, run_config: &RunConfig) -> anyhow::Result<String> {
    match flag.or_else(|| run_config.core_version.clone()) {
        Some(version) => Ok(version),
        None => bail!("A core version is required: pass --core-version or set core_version"),
    }
}
