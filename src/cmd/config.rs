//! Configuration view and validation commands: `ctxguard config`.

use anyhow::{Result, bail};
use console::style;
use std::path::{Path, PathBuf};

use ctxguard::config::{CONFIG_FILE_NAME, CtxguardToml, PROJECT_CONFIG_DIR};

use super::super::ConfigCommands;

pub fn cmd_config(config_path: Option<&Path>, command: Option<ConfigCommands>) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => show(config_path),
        Some(ConfigCommands::Validate) => validate(config_path),
        Some(ConfigCommands::Init { path, force }) => init(path, force),
    }
}

fn show(config_path: Option<&Path>) -> Result<()> {
    let (toml, path) = CtxguardToml::load_discovered(config_path)?;

    println!();
    println!("ctxguard Configuration");
    println!("======================");
    println!();
    println!("Config file: {}", path.display());
    println!();

    let compaction = &toml.compaction;
    println!("[compaction]");
    println!("  maxTokens = {}", compaction.max_tokens);
    println!("  keepRecentTokens = {}", compaction.keep_recent_tokens);
    println!("  summaryMaxTokens = {}", compaction.summary_max_tokens);
    println!("  charsPerToken = {}", compaction.chars_per_token);
    println!(
        "  messageOverheadTokens = {}",
        compaction.message_overhead_tokens
    );
    println!(
        "  maxNoProgressCompactions = {}",
        compaction.max_no_progress_compactions
    );
    println!("  statsHistoryLimit = {}", compaction.stats_history_limit);
    println!();

    println!("[model]");
    println!("  base_url = \"{}\"", toml.model.base_url);
    println!("  model = \"{}\"", toml.model.model);
    println!("  timeout_secs = {}", toml.model.timeout_secs);
    if let Some(var) = &toml.model.api_key_env {
        println!("  api_key_env = \"{}\"", var);
    }
    println!();

    println!("[logging]");
    println!("  level = \"{}\"", toml.logging.level);
    println!("  json = {}", toml.logging.json);
    if let Some(file) = &toml.logging.file {
        println!("  file = \"{}\"", file.display());
    }
    println!();

    Ok(())
}

fn validate(config_path: Option<&Path>) -> Result<()> {
    let (toml, path) = CtxguardToml::load_discovered(config_path)?;

    println!();
    println!("Validating {}...", path.display());
    println!();

    let warnings = toml.validate()?;
    if warnings.is_empty() {
        println!("{} Configuration is valid.", style("✓").green());
    } else {
        println!("{} Configuration is valid, with warnings:", style("!").yellow());
        for warning in warnings {
            println!("  - {}", warning);
        }
    }
    println!();

    Ok(())
}

fn init(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = path.unwrap_or_else(|| Path::new(PROJECT_CONFIG_DIR).join(CONFIG_FILE_NAME));

    if path.exists() && !force {
        bail!(
            "{} already exists. Pass --force to overwrite it.",
            path.display()
        );
    }

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, CtxguardToml::template())?;

    println!("Created {}", path.display());
    println!();
    println!("You can now customize:");
    println!("  - [compaction] maxTokens, keepRecentTokens, summaryMaxTokens, charsPerToken");
    println!("  - [model] base_url and model of your local server");
    println!("  - [logging] level, json, file");
    println!();

    Ok(())
}
