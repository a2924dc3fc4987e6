use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "assetctl")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Declarative asset management for your monitoring containers", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// API base URL
    #[arg(long, env = "ASSETCTL_API", global = true)]
    pub api: Option<String>,

    /// API token (32 lowercase hex characters)
    #[arg(long, env = "ASSETCTL_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Apply a state document to its container
    Apply(ApplyArgs),

    /// List the asset kinds the backend accepts
    Kinds,
}

#[derive(Args)]
pub struct ApplyArgs {
    /// State document (.json, .yml or .yaml)
    pub file: PathBuf,

    /// Show changes without applying them
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Remove labels, checks and collectors the document does not declare
    #[arg(long)]
    pub purge: bool,

    /// Always fetch the current state, never offer a cached one
    #[arg(long)]
    pub no_cache: bool,

    /// Answer yes to every prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_apply() {
        let cli = Cli::try_parse_from([
            "assetctl",
            "-vv",
            "apply",
            "--dry-run",
            "--purge",
            "state.yaml",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Apply(args) => {
                assert_eq!(args.file, PathBuf::from("state.yaml"));
                assert!(args.dry_run);
                assert!(args.purge);
                assert!(!args.no_cache);
                assert!(!args.yes);
            }
            Command::Kinds => panic!("Expected apply"),
        }
    }

    #[test]
    fn test_apply_requires_file() {
        assert!(Cli::try_parse_from(["assetctl", "apply"]).is_err());
    }
}
