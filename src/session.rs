//! Per-session compaction state, keyed by the host's session id.

use std::collections::HashMap;

use ctxguard_common::Message;
use tracing::debug;

use crate::compaction::{CompactionEngine, CompactionState, HostCommand, StatsOutcome, commands};

/// Outcome of one `before_turn` hook call.
#[derive(Debug, Clone)]
pub struct TurnResult {
    pub context: Vec<Message>,
    pub outcome: StatsOutcome,
}

impl TurnResult {
    pub fn compacted(&self) -> bool {
        self.outcome == StatsOutcome::Compacted
    }
}

#[derive(Debug, Default)]
struct SessionEntry {
    state: CompactionState,
    /// Model the host last reported for the session.
    model: Option<String>,
}

/// Owns one engine and an independent state per session.
///
/// States are created on first use and dropped by [`end_session`].
///
/// [`end_session`]: SessionRegistry::end_session
pub struct SessionRegistry {
    engine: CompactionEngine,
    sessions: HashMap<String, SessionEntry>,
}

impl SessionRegistry {
    pub fn new(engine: CompactionEngine) -> Self {
        Self {
            engine,
            sessions: HashMap::new(),
        }
    }

    pub fn engine(&self) -> &CompactionEngine {
        &self.engine
    }

    /// Run the engine for one turn of `session_id`.
    ///
    /// The session's state is replaced only after the engine resolves, so
    /// dropping this future leaves the session as it was.
    pub async fn before_turn(
        &mut self,
        session_id: &str,
        context: &[Message],
        model: Option<&str>,
    ) -> TurnResult {
        let entry = self.sessions.entry(session_id.to_string()).or_default();
        if let Some(model) = model {
            entry.model = Some(model.to_string());
        }
        let model = entry.model.clone();
        let current = entry.state.clone();

        let processed = self
            .engine
            .process(context, &current, model.as_deref())
            .await;

        debug!(session_id, outcome = processed.outcome.label(), "turn processed");
        if let Some(entry) = self.sessions.get_mut(session_id) {
            entry.state = processed.state;
        }

        TurnResult {
            context: processed.context,
            outcome: processed.outcome,
        }
    }

    /// Execute a host command against a session.
    ///
    /// # Errors
    /// Returns a message listing the available commands when `name` is
    /// unknown.
    pub fn run_command(&mut self, session_id: &str, name: &str) -> Result<String, String> {
        let command: HostCommand = name.parse()?;
        let entry = self.sessions.entry(session_id.to_string()).or_default();
        let text = match command {
            HostCommand::Stats => commands::stats(&entry.state, self.engine.config()),
            HostCommand::ForceRecompact => commands::force_recompact(&mut entry.state),
        };
        Ok(text)
    }

    /// Discard a session's state. Returns whether it existed.
    pub fn end_session(&mut self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    pub fn state(&self, session_id: &str) -> Option<&CompactionState> {
        self.sessions.get(session_id).map(|entry| &entry.state)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{GenerationRequest, ModelBackend};
    use crate::compaction::{CompactionConfig, Summarizer};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Records the model each request asked for.
    #[derive(Default)]
    struct RecordingBackend {
        models: Mutex<Vec<Option<String>>>,
    }

    #[async_trait]
    impl ModelBackend for RecordingBackend {
        async fn generate(&self, request: GenerationRequest) -> Result<String> {
            self.models.lock().unwrap().push(request.model);
            Ok("Summary of the session so far.".to_string())
        }
    }

    fn registry(backend: Arc<RecordingBackend>) -> SessionRegistry {
        let engine = CompactionEngine::new(
            CompactionConfig::new(100, 40, 20, 1.0),
            Summarizer::new(backend, Duration::from_secs(5)),
        )
        .unwrap();
        SessionRegistry::new(engine)
    }

    fn long_context() -> Vec<Message> {
        (0..6)
            .map(|i| Message::user(format!("{i}{}", "x".repeat(29))))
            .collect()
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let backend = Arc::new(RecordingBackend::default());
        let mut registry = registry(backend);

        registry.run_command("a", "force-recompact").unwrap();
        let a = registry.before_turn("a", &long_context()[..2], None).await;
        let b = registry.before_turn("b", &long_context()[..2], None).await;

        assert!(a.compacted());
        assert_eq!(b.outcome, StatsOutcome::PassThrough);
        assert_eq!(registry.session_count(), 2);
        assert_eq!(registry.state("a").unwrap().compaction_count(), 1);
        assert_eq!(registry.state("b").unwrap().compaction_count(), 0);
    }

    #[tokio::test]
    async fn test_session_model_is_used_and_remembered() {
        let backend = Arc::new(RecordingBackend::default());
        let mut registry = registry(backend.clone());

        registry
            .before_turn("s", &long_context(), Some("mistral-nemo"))
            .await;
        registry.run_command("s", "force-recompact").unwrap();
        registry.before_turn("s", &long_context(), None).await;

        let models = backend.models.lock().unwrap();
        assert_eq!(
            *models,
            vec![
                Some("mistral-nemo".to_string()),
                Some("mistral-nemo".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_stats_reflect_turns() {
        let backend = Arc::new(RecordingBackend::default());
        let mut registry = registry(backend);

        let result = registry.before_turn("s", &long_context(), None).await;
        assert!(result.compacted());

        let text = registry.run_command("s", "compaction-stats").unwrap();
        assert!(text.contains("1 compactions, 0 failures"));
    }

    #[test]
    fn test_unknown_command() {
        let mut registry = registry(Arc::new(RecordingBackend::default()));
        let err = registry.run_command("s", "explode").unwrap_err();
        assert!(err.contains("Unknown command 'explode'"));
    }

    #[tokio::test]
    async fn test_end_session_discards_state() {
        let mut registry = registry(Arc::new(RecordingBackend::default()));
        registry.run_command("s", "force-recompact").unwrap();

        assert!(registry.end_session("s"));
        assert!(!registry.end_session("s"));
        assert!(registry.state("s").is_none());

        let result = registry.before_turn("s", &long_context()[..2], None).await;
        assert_eq!(result.outcome, StatsOutcome::PassThrough);
    }

    #[tokio::test]
    async fn test_dropped_turn_keeps_previous_state() {
        struct Hanging;

        #[async_trait]
        impl ModelBackend for Hanging {
            async fn generate(&self, _request: GenerationRequest) -> Result<String> {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }

        let engine = CompactionEngine::new(
            CompactionConfig::new(100, 40, 20, 1.0),
            Summarizer::new(Arc::new(Hanging), Duration::from_secs(60)),
        )
        .unwrap();
        let mut registry = SessionRegistry::new(engine);
        registry.run_command("s", "force-recompact").unwrap();

        let result = tokio::time::timeout(
            Duration::from_millis(20),
            registry.before_turn("s", &long_context(), None),
        )
        .await;

        assert!(result.is_err());
        let state = registry.state("s").unwrap();
        assert!(state.force_recompact);
        assert!(state.stats_history.is_empty());
    }
}
