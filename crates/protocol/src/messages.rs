//! Client and server text messages.

use std::fmt;

use crate::ProtocolError;
use crate::constants::{
    FILE_FINISH, FILESIZE_PREFIX, SEGMENT_FINISH_SEPARATOR, SEGMENT_START_PREFIX,
};

/// Metadata frame sent ahead of every segment payload.
///
/// Wire form: `Segment Start: <start> Segment Finish: <end>`, decimal byte
/// offsets with `end` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentMarker {
    pub start: u64,
    pub end: u64,
}

impl SegmentMarker {
    /// Parses a marker from its wire form.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let rest = text
            .strip_prefix(SEGMENT_START_PREFIX)
            .ok_or_else(|| ProtocolError::UnknownMessage(text.to_string()))?;
        let (start, end) = rest
            .split_once(SEGMENT_FINISH_SEPARATOR)
            .ok_or_else(|| ProtocolError::UnknownMessage(text.to_string()))?;
        let start = parse_offset("segment start", start)?;
        let end = parse_offset("segment finish", end)?;
        if end < start {
            return Err(ProtocolError::InvertedSegment { start, end });
        }
        Ok(Self { start, end })
    }

    /// Number of bytes covered by the segment.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for SegmentMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{SEGMENT_START_PREFIX}{}{SEGMENT_FINISH_SEPARATOR}{}",
            self.start, self.end
        )
    }
}

/// Text frames sent by the uploading client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMessage {
    /// Announces the total object size.
    Filesize(u64),
    /// Precedes one segment payload frame.
    Segment(SegmentMarker),
    /// All segments have been sent.
    FileFinish,
}

impl ClientMessage {
    /// Parses a client text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        if let Some(size) = text.strip_prefix(FILESIZE_PREFIX) {
            return Ok(Self::Filesize(parse_offset("filesize", size.trim())?));
        }
        if text == FILE_FINISH {
            return Ok(Self::FileFinish);
        }
        if text.starts_with(SEGMENT_START_PREFIX) {
            return SegmentMarker::parse(text).map(Self::Segment);
        }
        Err(ProtocolError::UnknownMessage(text.to_string()))
    }
}

impl fmt::Display for ClientMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filesize(size) => write!(f, "{FILESIZE_PREFIX}{size}"),
            Self::Segment(marker) => marker.fmt(f),
            Self::FileFinish => f.write_str(FILE_FINISH),
        }
    }
}

/// Status replies sent by the server.
///
/// Matching is on the exact literal; anything else is [`ServerReply::Other`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerReply {
    /// `Permitted`: the announced upload may proceed.
    Permitted,
    /// `Invalid: -1`: bad object name or malformed request.
    Invalid,
    /// `Not Permitted: -1`: an object with that name already exists.
    AlreadyExists,
    /// `Not Permitted: -2`: the destination directory is outside the upload root.
    DirectoryNotPermitted,
    /// `Finished`: the object was stored.
    Finished,
    /// `Finish Error: -1`: the server could not store the object.
    StorageFailure,
    /// `Finish Error: -2`: the received data did not make up the object.
    FinishFailed,
    /// `Segment Error: -1`: more data arrived than was announced.
    SegmentError,
    /// Any unrecognized text.
    Other(String),
}

impl ServerReply {
    pub fn parse(text: &str) -> Self {
        match text {
            "Permitted" => Self::Permitted,
            "Invalid: -1" => Self::Invalid,
            "Not Permitted: -1" => Self::AlreadyExists,
            "Not Permitted: -2" => Self::DirectoryNotPermitted,
            "Finished" => Self::Finished,
            "Finish Error: -1" => Self::StorageFailure,
            "Finish Error: -2" => Self::FinishFailed,
            "Segment Error: -1" => Self::SegmentError,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns the wire text of this reply.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Permitted => "Permitted",
            Self::Invalid => "Invalid: -1",
            Self::AlreadyExists => "Not Permitted: -1",
            Self::DirectoryNotPermitted => "Not Permitted: -2",
            Self::Finished => "Finished",
            Self::StorageFailure => "Finish Error: -1",
            Self::FinishFailed => "Finish Error: -2",
            Self::SegmentError => "Segment Error: -1",
            Self::Other(text) => text,
        }
    }
}

impl fmt::Display for ServerReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn parse_offset(field: &'static str, value: &str) -> Result<u64, ProtocolError> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProtocolError::InvalidNumber {
            field,
            value: value.to_string(),
        });
    }
    value.parse().map_err(|_| ProtocolError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}
