//! Hook server: `ctxguard serve`.

use anyhow::Result;
use tracing::info;

use ctxguard::config::CtxguardToml;
use ctxguard::server;
use ctxguard::session::SessionRegistry;

use super::build_engine;

pub async fn cmd_serve(toml: &CtxguardToml) -> Result<()> {
    let engine = build_engine(toml)?;
    info!(
        max_tokens = toml.compaction.max_tokens,
        keep_recent_tokens = toml.compaction.keep_recent_tokens,
        model = %toml.model.model,
        base_url = %toml.model.base_url,
        "starting hook server"
    );

    let mut registry = SessionRegistry::new(engine);
    server::serve_stdio(&mut registry).await
}
