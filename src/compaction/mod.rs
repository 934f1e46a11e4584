//! Context Compaction
//!
//! Keeps a conversation under a token budget by replacing its oldest
//! messages with a single model-written summary.
//!
//! ## Pipeline
//!
//! - **Estimation**: [`TokenEstimator`] approximates the size of the context
//! - **Splitting**: [`split`] partitions it into old and recent groups without
//!   separating tool call/result pairs
//! - **Summarization**: [`Summarizer`] condenses the old group via the
//!   session's model
//! - **Engine**: [`CompactionEngine`] decides per turn and records stats in
//!   [`CompactionState`]
//!
//! ## Configuration
//!
//! ```toml
//! [compaction]
//! maxTokens = 8000
//! keepRecentTokens = 2000
//! summaryMaxTokens = 1000
//! charsPerToken = 4.0
//! ```

pub mod commands;
mod config;
mod engine;
mod estimator;
mod splitter;
mod state;
mod summarizer;

pub use commands::HostCommand;
pub use config::CompactionConfig;
pub use engine::{CompactionEngine, Processed};
pub use estimator::{CharRatioEstimator, TokenEstimator, message_text};
pub use splitter::{Split, paired_call_index, split};
pub use state::{CompactionState, StatsEntry, StatsOutcome};
pub use summarizer::{SUMMARY_HEADER, Summarizer};
