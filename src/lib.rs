pub mod backend;
pub mod compaction;
pub mod config;
pub mod errors;
pub mod logging;
pub mod server;
pub mod session;

pub use ctxguard_common::{CompactionMarker, Message, MessageContent, MessageMetadata, Role};
pub use errors::{ConfigurationError, EstimationInputError, SummarizationError};
