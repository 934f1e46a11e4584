//! Shared conversation types for ctxguard.
//!
//! These are the records a host hands to the compaction engine before every
//! turn. They mirror the host transcript format closely enough that a
//! round-trip through ctxguard never loses fields it does not understand.

mod message;

pub use message::{CompactionMarker, Message, MessageContent, MessageMetadata, Role};
