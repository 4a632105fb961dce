//! Upload tuning knobs.

use std::time::Duration;

use frontporch_protocol::constants::{
    BACKPRESSURE_POLL_INTERVAL, BINARY_STEP_SIZE, CLOSE_RETRY_INTERVAL, CONNECT_TIMEOUT,
    TEXT_STEP_SIZE, WS_MAX_MESSAGE_SIZE,
};
use frontporch_transfer::CodecMode;

use crate::error::UploadError;

/// Configuration for one [`Uploader`](crate::Uploader).
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Segment size when payloads are binary frames.
    pub binary_step_size: usize,
    /// Segment size when payloads are base64 text. Must be a multiple of 3.
    pub text_step_size: usize,
    /// Delay between checks while the transport is draining.
    pub backpressure_poll: Duration,
    /// Interval at which close requests are repeated.
    pub close_retry: Duration,
    /// Time allowed for the WebSocket handshake.
    pub connect_timeout: Duration,
    /// Send base64 text even though the transport carries binary frames.
    pub force_text: bool,
    /// Largest WebSocket message accepted or produced.
    pub max_message_size: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            binary_step_size: BINARY_STEP_SIZE,
            text_step_size: TEXT_STEP_SIZE,
            backpressure_poll: BACKPRESSURE_POLL_INTERVAL,
            close_retry: CLOSE_RETRY_INTERVAL,
            connect_timeout: CONNECT_TIMEOUT,
            force_text: false,
            max_message_size: WS_MAX_MESSAGE_SIZE,
        }
    }
}

impl UploadConfig {
    /// Segment size for the negotiated payload mode.
    pub fn step_size(&self, mode: CodecMode) -> usize {
        match mode {
            CodecMode::Binary => self.binary_step_size,
            CodecMode::Text => self.text_step_size,
        }
    }

    /// Buffered byte count above which segment sends are deferred.
    pub fn backpressure_threshold(&self, mode: CodecMode) -> usize {
        self.step_size(mode) / 2
    }

    /// Checks that the configuration can drive an upload.
    pub fn validate(&self) -> Result<(), UploadError> {
        if self.binary_step_size == 0 || self.text_step_size == 0 {
            return Err(UploadError::Unsupported("segment size must be non-zero".into()));
        }
        if self.text_step_size % 3 != 0 {
            return Err(UploadError::Unsupported(format!(
                "text segment size {} is not a multiple of 3",
                self.text_step_size
            )));
        }
        if self.close_retry.is_zero() || self.backpressure_poll.is_zero() {
            return Err(UploadError::Unsupported("poll intervals must be non-zero".into()));
        }
        let largest_frame = self
            .binary_step_size
            .max(self.text_step_size.div_ceil(3) * 4);
        if largest_frame > self.max_message_size {
            return Err(UploadError::Unsupported(format!(
                "segment frames of {largest_frame} bytes exceed the {} byte message limit",
                self.max_message_size
            )));
        }
        Ok(())
    }
}
