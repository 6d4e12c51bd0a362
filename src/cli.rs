use clap::{Parser, Subcommand};

use crate::template::{Mode, Scope};

#[derive(Parser)]
#[command(version, about = "Synthesize sing-box config files", long_about = None)]
pub struct Args {
    #[arg(short, long, global = true, help = "Run config TOML file")]
    pub config: Option<String>,

    #[arg(short, long, global = true, help = "Emit debug log")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Build config.json from a cached subscription
    Generate {
        #[arg(short, long, help = "Subscription identifier")]
        subscription: String,

        #[arg(long, help = "Target sing-box version, e.g. 1.12.0")]
        core_version: Option<String>,

        #[arg(long, help = "mixed or tun; defaults to the stored preference")]
        scope: Option<Scope>,

        #[arg(long, help = "rule or global; defaults to the stored preference")]
        mode: Option<Mode>,

        #[arg(short, long, help = "Config output path")]
        output: Option<String>,

        #[arg(long, help = "Print the document instead of writing it")]
        dry_run: bool,
    },

    /// Download a subscription into the local cache
    Fetch {
        #[arg(short, long, help = "Subscription identifier to cache under")]
        subscription: String,

        #[arg(short, long, help = "Subscription URL")]
        url: String,

        #[arg(long, help = "sing-box version announced in the user agent")]
        core_version: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_generate() {
        let args = Args::parse_from([
            "singbox-synth",
            "generate",
            "-s",
            "sub-1",
            "--core-version",
            "1.12.0",
            "--scope",
            "tun",
            "--mode",
            "rules",
            "--dry-run",
            "-v",
        ]);
        assert!(args.verbose);
        let Command::Generate {
            subscription,
            core_version,
            scope,
            mode,
            output,
            dry_run,
        } = args.command
        else {
            panic!("expected generate");
        };
        assert_eq!(subscription, "sub-1");
        assert_eq!(core_version.as_deref(), Some("1.12.0"));
        assert_eq!(scope, Some(Scope::Tun));
        assert_eq!(mode, Some(Mode::Rule));
        assert_eq!(output, None);
        assert!(dry_run);
    }

    #[test]
    fn test_parse_fetch() {
        let args = Args::parse_from([
            "singbox-synth",
            "--config",
            "run.toml",
            "fetch",
            "-s",
            "sub-1",
            "-u",
            "https://example.com/sub",
        ]);
        assert_eq!(args.config.as_deref(), Some("run.toml"));
        assert!(matches!(
            args.command,
            Command::Fetch { ref url, .. } if url == "https://example.com/sub"
        ));
    }

    #[test]
    fn test_rejects_unknown_scope() {
        assert!(
            Args::try_parse_from(["singbox-synth", "generate", "-s", "a", "--scope", "vpn"])
                .is_err()
        );
    }
}
