use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "linkmirror")]
#[command(about = "Mirror media trees into hardlinked, optionally obfuscated targets")]
pub struct Cli {
    /// Configuration file (TOML or JSON); overrides LINKMIRROR_CONFIG
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// .env file to load before reading the environment
    #[arg(long, global = true)]
    pub env_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Watch every enabled source and mirror new files until interrupted (default)
    Run,
    /// Walk every source tree and link whatever is missing on the targets
    SyncAll,
    /// Re-link one source file on all targets, or on one target
    Retry {
        #[arg(long)]
        source: PathBuf,
        /// Target path or label
        #[arg(long)]
        target: Option<String>,
    },
    /// Re-link targets whose file is gone or differs in size from the source
    Resync {
        #[arg(long)]
        source: PathBuf,
    },
    /// Remove the linked target files of a source and forget its record
    Delete {
        #[arg(long)]
        source: PathBuf,
    },
    /// Trigger the downstream sync job now
    Trigger {
        /// Skip the busy check
        #[arg(long)]
        force: bool,
    },
    /// Seed template files into every show directory with records
    LinkTemplates,
    /// Print how names would be obfuscated
    Obfuscate {
        #[arg(required = true)]
        names: Vec<String>,
    },
    #[command(subcommand)]
    Db(DbCommand),
}

#[derive(Debug, Subcommand)]
pub enum DbCommand {
    /// Apply database migrations and exit
    Migrate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_is_the_default() {
        let cli = Cli::parse_from(["linkmirror"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn retry_takes_source_and_optional_target() {
        let cli = Cli::parse_from([
            "linkmirror",
            "--config",
            "/etc/linkmirror.toml",
            "retry",
            "--source",
            "/media/in/a.mkv",
            "--target",
            "cloud",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/linkmirror.toml")));
        match cli.command {
            Some(Command::Retry { source, target }) => {
                assert_eq!(source, PathBuf::from("/media/in/a.mkv"));
                assert_eq!(target.as_deref(), Some("cloud"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn obfuscate_requires_names() {
        assert!(Cli::try_parse_from(["linkmirror", "obfuscate"]).is_err());
        let cli = Cli::parse_from(["linkmirror", "obfuscate", "三体", "黑镜"]);
        assert!(matches!(cli.command, Some(Command::Obfuscate { names }) if names.len() == 2));
    }
}
