//! Wire protocol for frontporch uploads.
//!
//! The protocol is a handful of plain-text WebSocket frames exchanged around
//! the binary (or base64) segment payloads.

pub mod constants;
pub mod messages;

pub use messages::{ClientMessage, SegmentMarker, ServerReply};

/// Errors produced while parsing wire messages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("unrecognized client message: {0:?}")]
    UnknownMessage(String),

    #[error("invalid {field} value: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("segment end {end} precedes start {start}")]
    InvertedSegment { start: u64, end: u64 },
}
