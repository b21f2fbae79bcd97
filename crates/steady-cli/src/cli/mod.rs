//! CLI for the steady throughput stabilizer.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use steady_core::config;

use commands::{
    run_batch, run_completions, run_directive, run_monitor, run_probe, run_reset, Runtime,
};

/// Top-level CLI for the steady throughput stabilizer.
#[derive(Debug, Parser)]
#[command(name = "steady")]
#[command(about = "steady: keep bulk downloads near a target throughput", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Watch active sessions and mitigate when the mean speed drops.
    Monitor {
        /// JSON session snapshot to poll (default: sessions.json in the state dir).
        #[arg(long, value_name = "PATH")]
        sessions: Option<PathBuf>,
        /// Stop after N seconds instead of the configured watchdog.
        #[arg(long, value_name = "N")]
        max_run_secs: Option<u64>,
    },

    /// Download a list of URLs, resetting before each one.
    Batch {
        /// Direct HTTP/HTTPS URLs, downloaded in order.
        urls: Vec<String>,
        /// Read URLs from a file (one per line) when none are given.
        #[arg(long, value_name = "PATH")]
        from_file: Option<PathBuf>,
        /// Where files land (default: config download_dir, else current directory).
        #[arg(long, value_name = "DIR")]
        download_dir: Option<PathBuf>,
    },

    /// Run the full reset once: terminate residual downloaders, clear caches, flush DNS.
    Reset,

    /// Measure raw download speed against a reference file.
    Probe {
        /// Reference URL (default: config probe_url).
        #[arg(long)]
        url: Option<String>,
    },

    /// Write the rate-limit directive for the configured target now.
    Directive,

    /// Print a shell completion script.
    Completions {
        /// Target shell.
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        if let CliCommand::Completions { shell } = cli.command {
            return run_completions(shell);
        }

        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Monitor {
                sessions,
                max_run_secs,
            } => {
                let rt = Runtime::build(&cfg, None)?;
                run_monitor(&cfg, &rt, sessions, max_run_secs).await?;
            }
            CliCommand::Batch {
                urls,
                from_file,
                download_dir,
            } => {
                let rt = Runtime::build(&cfg, download_dir)?;
                run_batch(&rt, urls, from_file).await?;
            }
            CliCommand::Reset => {
                let rt = Runtime::build(&cfg, None)?;
                run_reset(&rt).await?;
            }
            CliCommand::Probe { url } => run_probe(&cfg, url).await?,
            CliCommand::Directive => run_directive(&cfg)?,
            CliCommand::Completions { .. } => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
