//! Offline size report for a transcript: `ctxguard estimate`.

use anyhow::Result;
use console::style;
use std::collections::BTreeMap;
use std::path::Path;

use ctxguard::compaction::{CharRatioEstimator, TokenEstimator, split};
use ctxguard::config::CtxguardToml;

use super::read_transcript;

pub fn cmd_estimate(toml: &CtxguardToml, transcript: &Path) -> Result<()> {
    let messages = read_transcript(transcript)?;
    let config = &toml.compaction;
    config.validate()?;
    let estimator = CharRatioEstimator::from_config(config);

    let mut by_role: BTreeMap<&'static str, (usize, usize)> = BTreeMap::new();
    for message in &messages {
        let slot = by_role.entry(message.role.as_str()).or_default();
        slot.0 += 1;
        slot.1 += estimator.estimate_message(message);
    }
    let total = estimator.estimate_context(&messages);

    println!();
    println!("Token estimate - {}", transcript.display());
    println!("================================");
    println!();
    println!("  {:<12} {:>8} {:>10}", "role", "messages", "tokens");
    for (role, (count, tokens)) in &by_role {
        println!("  {:<12} {:>8} {:>10}", role, count, tokens);
    }
    println!("  {:<12} {:>8} {:>10}", "total", messages.len(), total);
    println!();

    let percent = total as f64 / config.max_tokens as f64 * 100.0;
    println!(
        "Context usage: {} / {} tokens ({:.1}%)",
        total, config.max_tokens, percent
    );

    if total > config.max_tokens {
        let parts = split(&messages, config.keep_recent_tokens, &estimator);
        println!(
            "{} Compaction would trigger: {} messages summarized, {} kept ({} tokens)",
            style("!").yellow(),
            parts.old.len(),
            parts.recent.len(),
            estimator.estimate_context(parts.recent)
        );
    } else {
        println!("{} Under threshold; no compaction needed", style("✓").green());
    }
    println!();

    Ok(())
}
