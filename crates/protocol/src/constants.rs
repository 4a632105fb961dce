//! Wire literals, segment sizes and protocol timings.

use std::time::Duration;

/// Prefix of the size announcement sent once the connection opens.
pub const FILESIZE_PREFIX: &str = "Filesize: ";

/// Sentinel sent after the last segment.
pub const FILE_FINISH: &str = "File Finish";

/// Leading field of a segment marker.
pub const SEGMENT_START_PREFIX: &str = "Segment Start: ";

/// Separator between the start and finish fields of a segment marker.
pub const SEGMENT_FINISH_SEPARATOR: &str = " Segment Finish: ";

/// Segment size when payloads travel as binary frames (128 KiB).
pub const BINARY_STEP_SIZE: usize = 128 * 1024;

/// Segment size when payloads are base64 text.
///
/// One byte over 128 KiB so the size is a multiple of 3 and only the final
/// segment of an object can carry `=` padding.
pub const TEXT_STEP_SIZE: usize = 128 * 1024 + 1;

/// Delay between backpressure checks while the transport is still draining.
pub const BACKPRESSURE_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Interval at which a close request is repeated until the transport closes.
pub const CLOSE_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Time allowed for the WebSocket handshake to complete.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum size of a single WebSocket message in bytes (16 MiB).
pub const WS_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;
