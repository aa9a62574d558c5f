//! Module C — the stream parser (spec §4.C).
//!
//! Consumes a worker's stdout as an incrementally-fed byte/text
//! stream, buffers until newline, decodes each line as JSON, and
//! classifies the result into one of four event shapes by the
//! object's `type` field. Lines that are not valid JSON, or that
//! arrive without a trailing newline yet, are held in the buffer —
//! never dropped — matching `StreamParser.feed`'s accumulator
//! semantics in the Python reference this crate is grounded on.

mod events;
mod parser;

pub use events::{AssistantEvent, StreamEvent, SystemEvent, ToolResultEvent, ToolUseEvent};
pub use parser::StreamParser;

/// The literal sentinel the worker prints on stdout right before exit
/// to hint that it considers its task done (spec §4.C, §6).
pub const TASK_COMPLETE_SENTINEL: &str = "TASK COMPLETE";
