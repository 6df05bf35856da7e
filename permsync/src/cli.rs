//! Command-line interface

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::tracing_support::TracingFormat;

/// Walk through the runtime permission workflow on a simulated device
#[derive(Parser, Debug)]
#[command(name = "permsync", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Demo configuration file (JSON)
    #[arg(long, global = true, env = "PERMSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Saved session state file
    #[arg(long, global = true)]
    pub state_file: Option<PathBuf>,

    /// Append audit events (JSON Lines) to this file
    #[arg(long, global = true)]
    pub audit_log: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "compact")]
    pub log_format: TracingFormat,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Check permissions once and show the granted list (default)
    Run(RunArgs),
    /// Show the saved session state
    Status,
    /// Forget the saved session state
    Reset,
}

#[derive(clap::Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct RunArgs {
    /// Recreate the previous session from saved state instead of starting fresh
    #[arg(long)]
    pub restore: bool,

    /// Acknowledge rationale dialogs without waiting for input
    #[arg(long)]
    pub auto_ack: bool,
}

impl Cli {
    /// Subcommand to execute, defaulting to `run`
    pub fn resolved_command(&self) -> Command {
        self.command
            .clone()
            .unwrap_or_else(|| Command::Run(RunArgs::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_run() {
        let cli = Cli::try_parse_from(["permsync"]).unwrap();
        assert_eq!(cli.resolved_command(), Command::Run(RunArgs::default()));
        assert_eq!(cli.log_format, TracingFormat::Compact);
    }

    #[test]
    fn test_run_flags() {
        let cli =
            Cli::try_parse_from(["permsync", "run", "--restore", "--auto-ack", "-v"]).unwrap();
        assert_eq!(
            cli.resolved_command(),
            Command::Run(RunArgs {
                restore: true,
                auto_ack: true
            })
        );
        assert!(cli.verbose);
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let cli = Cli::try_parse_from([
            "permsync",
            "status",
            "--state-file",
            "/tmp/s.json",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.resolved_command(), Command::Status);
        assert_eq!(cli.state_file, Some(PathBuf::from("/tmp/s.json")));
        assert_eq!(cli.log_format, TracingFormat::Json);
    }

    #[test]
    fn test_verify_cli() {
        use clap::CommandFactory;
        <Cli as CommandFactory>::command().debug_assert();
    }
}
