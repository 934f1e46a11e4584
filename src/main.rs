use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use ctxguard::config::{CtxguardToml, LoggingConfig};
use ctxguard::logging::init_logging;

mod cmd;

#[derive(Parser)]
#[command(name = "ctxguard")]
#[command(version, about = "Context compaction for local LLM sessions")]
pub struct Cli {
    /// Path to ctxguard.toml (overrides $CTXGUARD_CONFIG and discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the line-delimited JSON hook protocol on stdin/stdout
    Serve,
    /// Show token estimates for a transcript file
    Estimate {
        /// JSON array of messages, or an object with a `context` array
        transcript: PathBuf,
    },
    /// Run one compaction pass over a transcript file
    Compact {
        /// JSON array of messages, or an object with a `context` array
        transcript: PathBuf,

        /// Compact even when under the threshold
        #[arg(long)]
        force: bool,

        /// Write the resulting context here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Model to summarize with (defaults to [model].model)
        #[arg(long)]
        model: Option<String>,
    },
    /// View, validate or create configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Write a starter ctxguard.toml
    Init {
        /// Destination (defaults to .ctxguard/ctxguard.toml)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let command = match cli.command {
        Commands::Config { command } => {
            let _guard = init_logging(&LoggingConfig::default(), cli.verbose, cli.log_json)?;
            return cmd::cmd_config(cli.config.as_deref(), command);
        }
        other => other,
    };

    let (toml, config_path) = CtxguardToml::load_discovered(cli.config.as_deref())?;
    let _guard = init_logging(&toml.logging, cli.verbose, cli.log_json)?;
    debug!(path = %config_path.display(), "configuration loaded");
    for warning in toml.validate()? {
        debug!("config warning: {}", warning);
    }

    match command {
        Commands::Serve => cmd::cmd_serve(&toml).await?,
        Commands::Estimate { transcript } => cmd::cmd_estimate(&toml, &transcript)?,
        Commands::Compact {
            transcript,
            force,
            output,
            model,
        } => {
            cmd::cmd_compact(
                &toml,
                &transcript,
                force,
                output.as_deref(),
                model.as_deref(),
            )
            .await?
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}
