//! CLI argument structures

use clap::{ArgGroup, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Winner selection and payout disbursement for reward cycles
#[derive(Parser)]
#[command(name = "cyclepay")]
#[command(about = "cyclepay - select cycle winners and disburse their payouts", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to a YAML or TOML configuration file
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Address to listen on (overrides server.bind)
        #[arg(long)]
        bind: Option<SocketAddr>,
    },

    /// Follow the disbursement of a cycle or a single batch
    #[command(group(ArgGroup::new("target").required(true).args(["cycle", "batch"])))]
    Watch {
        /// Base URL of a running cyclepay server
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        url: String,

        /// Resume whatever batch the cycle has in flight
        #[arg(long)]
        cycle: Option<String>,

        /// Poll one batch
        #[arg(long)]
        batch: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_requires_a_target() {
        assert!(Cli::try_parse_from(["cyclepay", "watch"]).is_err());
        assert!(
            Cli::try_parse_from(["cyclepay", "watch", "--cycle", "q1", "--batch", "b1"]).is_err()
        );

        let cli = Cli::try_parse_from(["cyclepay", "-vv", "watch", "--cycle", "q1"]).unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Watch { url, cycle, batch } => {
                assert_eq!(url, "http://127.0.0.1:8080");
                assert_eq!(cycle.as_deref(), Some("q1"));
                assert!(batch.is_none());
            }
            _ => panic!("expected watch"),
        }
    }

    #[test]
    fn test_serve_accepts_bind_override() {
        let cli =
            Cli::try_parse_from(["cyclepay", "serve", "--bind", "0.0.0.0:9000", "-c", "cp.yml"])
                .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("cp.yml")));
        match cli.command {
            Commands::Serve { bind } => assert_eq!(bind, Some("0.0.0.0:9000".parse().unwrap())),
            _ => panic!("expected serve"),
        }
    }
}
