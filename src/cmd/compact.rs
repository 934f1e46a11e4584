//! One engine pass over a transcript file: `ctxguard compact`.

use anyhow::{Context, Result, bail};
use console::style;
use std::path::Path;

use ctxguard::compaction::{CompactionState, StatsOutcome, TokenEstimator};
use ctxguard::config::CtxguardToml;

use super::{build_engine, read_transcript};

pub async fn cmd_compact(
    toml: &CtxguardToml,
    transcript: &Path,
    force: bool,
    output: Option<&Path>,
    model: Option<&str>,
) -> Result<()> {
    let messages = read_transcript(transcript)?;
    let engine = build_engine(toml)?;

    let mut state = CompactionState::new();
    if force {
        state.request_force_recompact();
    }

    let before = engine.estimator().estimate_context(&messages);
    let processed = engine.process(&messages, &state, model).await;

    let summary_line = match &processed.outcome {
        StatsOutcome::SummarizationFailed { reason } => {
            bail!("Summarization failed: {}", reason);
        }
        StatsOutcome::Compacted => {
            let after = engine.estimator().estimate_context(&processed.context);
            format!(
                "{} Compacted {} messages: {} -> {} tokens",
                style("✓").green(),
                messages.len() + 1 - processed.context.len(),
                before,
                after
            )
        }
        other => format!(
            "{} No compaction ({}): {} tokens, maxTokens = {}",
            style("-").dim(),
            other.label(),
            before,
            toml.compaction.max_tokens
        ),
    };

    let json = serde_json::to_string_pretty(&processed.context)
        .context("Failed to serialize compacted context")?;
    match output {
        Some(path) => {
            std::fs::write(path, format!("{}\n", json))
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("{}", summary_line);
            println!("Wrote {}", path.display());
        }
        None => {
            eprintln!("{}", summary_line);
            println!("{}", json);
        }
    }

    Ok(())
}
