//! Everything needed to turn a source object into upload segments.
//!
//! - [`segments`]: contiguous, bounded byte ranges covering the object.
//! - [`codec`]: binary passthrough or base64 text payloads.
//! - [`source`]: asynchronous ranged reads from files or memory.
//! - [`progress`]: integer percentage reporting and throughput.

pub mod codec;
pub mod progress;
pub mod segments;
pub mod source;

pub use codec::{CodecError, CodecMode, Payload, encode, encode_code_points};
pub use progress::{ProgressMeter, Throughput};
pub use segments::{Segment, SegmentPlan};
pub use source::{FileSource, MemorySource, ReadFuture, Source};

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("segment {start}..{end} is outside an object of {size} bytes")]
    OutOfRange { start: u64, end: u64, size: u64 },

    #[error("source has no usable name: {0}")]
    InvalidName(String),
}
