//! Upload protocol state machine.
//!
//! [`Session::handle`] takes one [`Event`] and returns the [`Effect`]s the
//! driver must carry out, in order. The session never touches the network
//! itself, so every transition can be exercised without a connection.

use frontporch_protocol::{ClientMessage, SegmentMarker, ServerReply};
use frontporch_transfer::{CodecMode, ProgressMeter, Segment};
use tracing::{debug, info, warn};

use crate::config::UploadConfig;
use crate::connection::Frame;
use crate::error::UploadError;
use crate::observer::UploadEvent;

/// Lifecycle of one upload. Ordered: a session only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum State {
    /// Connection is being established.
    Opening,
    /// Connection is open; size not yet announced.
    Opened,
    /// Size announced, waiting for the server's decision.
    SizeSent,
    /// Streaming segments.
    Sending,
    /// Every segment and `File Finish` sent, waiting for `Finished`.
    AllSent,
    /// An error was flagged; closing follows immediately.
    Erroring,
    /// Waiting for the transport to confirm closure.
    Closing,
    /// Terminal.
    Closed,
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The connection could not be established, or the environment cannot
    /// support an upload at all.
    ConnectFailed(UploadError),
    /// The connection is open. `binary_frames` reports whether the
    /// transport carries binary frames.
    Connected { binary_frames: bool },
    /// A text message from the server.
    Message(String),
    /// The bytes of the segment returned by [`Session::next_segment`].
    SegmentRead { segment: Segment, bytes: Vec<u8> },
    /// Reading the next segment from the source failed.
    ReadFailed(String),
    /// The transport reported an error.
    TransportError(String),
    /// The transport is closed.
    TransportClosed,
    /// The caller asked to stop.
    Abort,
}

/// Actions requested by the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Send a frame on the connection.
    Send(Frame),
    /// Invoke the caller's callback.
    Notify(UploadEvent),
    /// Request transport shutdown and keep re-requesting until it closes.
    BeginClose,
    /// Stop re-requesting shutdown.
    StopCloseTimer,
}

/// How an upload ended.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    /// The server confirmed the object was stored.
    Finished,
    /// The upload failed; the error was reported to the observer.
    Failed(UploadError),
    /// The caller aborted the upload.
    Aborted,
}

/// State of one upload attempt.
#[derive(Debug)]
pub struct Session {
    state: State,
    size: u64,
    cursor: u64,
    config: UploadConfig,
    mode: Option<CodecMode>,
    progress: ProgressMeter,
    error: Option<UploadError>,
    finished: bool,
}

impl Session {
    /// Creates a session for an object of `size` bytes.
    pub fn new(size: u64, config: &UploadConfig) -> Self {
        Self {
            state: State::Opening,
            size,
            cursor: 0,
            config: config.clone(),
            mode: None,
            progress: ProgressMeter::new(size),
            error: None,
            finished: false,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Bytes already handed to the transport.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Payload mode, resolved once the connection is open.
    pub fn mode(&self) -> Option<CodecMode> {
        self.mode
    }

    /// Segment size for the negotiated mode.
    pub fn step_size(&self) -> Option<usize> {
        self.mode.map(|mode| self.config.step_size(mode))
    }

    /// The segment to read next, while segments are being streamed.
    pub fn next_segment(&self) -> Option<Segment> {
        if self.state != State::Sending {
            return None;
        }
        Segment::at(self.cursor, self.step_size()?, self.size)
    }

    /// The outcome so far. Final once the state is [`State::Closed`].
    pub fn outcome(&self) -> UploadOutcome {
        if let Some(err) = &self.error {
            UploadOutcome::Failed(err.clone())
        } else if self.finished {
            UploadOutcome::Finished
        } else {
            UploadOutcome::Aborted
        }
    }

    /// Applies one event and returns the resulting effects.
    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        let mut fx = Vec::new();
        match event {
            Event::ConnectFailed(err) => self.connect_failed(err, &mut fx),
            Event::Connected { binary_frames } => self.connected(binary_frames, &mut fx),
            Event::Message(text) => self.message(text, &mut fx),
            Event::SegmentRead { segment, bytes } => self.segment_read(segment, bytes, &mut fx),
            Event::ReadFailed(reason) => {
                if self.state == State::Sending {
                    self.fail(UploadError::Read(reason), &mut fx);
                } else {
                    debug!(state = ?self.state, %reason, "ignoring read failure outside transfer");
                }
            }
            Event::TransportError(reason) => self.transport_error(reason, &mut fx),
            Event::TransportClosed => self.transport_closed(&mut fx),
            Event::Abort => self.abort(&mut fx),
        }
        fx
    }

    fn connect_failed(&mut self, err: UploadError, fx: &mut Vec<Effect>) {
        if self.state != State::Opening {
            debug!(state = ?self.state, "ignoring connect failure after open");
            return;
        }
        warn!(error = %err, "upload could not start");
        self.state = State::Erroring;
        self.error = Some(err.clone());
        fx.push(Effect::Notify(UploadEvent::Error(err)));
        // Nothing was opened, so there is nothing to close.
        self.state = State::Closed;
    }

    fn connected(&mut self, binary_frames: bool, fx: &mut Vec<Effect>) {
        if self.state != State::Opening {
            debug!(state = ?self.state, "ignoring duplicate open");
            return;
        }
        let mode = CodecMode::negotiate(binary_frames, self.config.force_text);
        self.mode = Some(mode);
        self.state = State::Opened;
        debug!(?mode, "connection opened");
        fx.push(Effect::Notify(UploadEvent::Opened("Opened".into())));
        self.announce_size(fx);
    }

    fn announce_size(&mut self, fx: &mut Vec<Effect>) {
        fx.push(Effect::Send(ClientMessage::Filesize(self.size).into()));
        self.state = State::SizeSent;
    }

    fn message(&mut self, text: String, fx: &mut Vec<Effect>) {
        if self.state == State::Closed {
            debug!(%text, "message after close");
            return;
        }
        fx.push(Effect::Notify(UploadEvent::Message(text.clone())));

        let reply = ServerReply::parse(&text);
        match self.state {
            State::Opening | State::Opened => {
                let err = match reply {
                    ServerReply::Invalid => UploadError::InvalidName,
                    _ => UploadError::EarlyMessage(text),
                };
                self.fail(err, fx);
            }
            State::SizeSent => match reply {
                ServerReply::Permitted => {
                    info!(size = self.size, "upload permitted");
                    self.state = State::Sending;
                    if self.cursor == self.size {
                        self.finish_sending(fx);
                    }
                }
                ServerReply::Invalid => self.fail(UploadError::InvalidName, fx),
                ServerReply::AlreadyExists => self.fail(UploadError::AlreadyExists, fx),
                ServerReply::DirectoryNotPermitted => {
                    self.fail(UploadError::DirectoryNotPermitted, fx)
                }
                _ => self.fail(UploadError::UnexpectedSizeResponse(text), fx),
            },
            State::Sending => self.fail(UploadError::UnexpectedDuringTransfer(text), fx),
            State::AllSent => match reply {
                ServerReply::Finished => {
                    info!(size = self.size, "upload finished");
                    self.finished = true;
                    fx.push(Effect::Notify(UploadEvent::Finished));
                    self.begin_close(fx);
                }
                ServerReply::StorageFailure => self.fail(UploadError::StorageFailure, fx),
                ServerReply::FinishFailed | ServerReply::Invalid => {
                    self.fail(UploadError::TransferFailed, fx)
                }
                _ => self.fail(UploadError::UnexpectedFinishResponse(text), fx),
            },
            State::Erroring | State::Closing | State::Closed => {
                debug!(state = ?self.state, %text, "ignoring message while closing");
            }
        }
    }

    fn segment_read(&mut self, segment: Segment, bytes: Vec<u8>, fx: &mut Vec<Effect>) {
        if self.state != State::Sending {
            debug!(state = ?self.state, start = segment.start, "discarding segment read after transfer stopped");
            return;
        }
        let Some(mode) = self.mode else {
            self.fail(UploadError::Read("segment read before negotiation".into()), fx);
            return;
        };
        if segment.start != self.cursor || bytes.len() as u64 != segment.len() {
            self.fail(
                UploadError::Read(format!(
                    "got {} bytes for segment {}..{} at cursor {}",
                    bytes.len(),
                    segment.start,
                    segment.end,
                    self.cursor
                )),
                fx,
            );
            return;
        }

        let marker = SegmentMarker {
            start: segment.start,
            end: segment.end,
        };
        fx.push(Effect::Send(ClientMessage::Segment(marker).into()));
        fx.push(Effect::Send(mode.encode_segment(bytes).into()));
        self.cursor = segment.end;
        self.report_progress(fx);

        if self.cursor == self.size {
            self.finish_sending(fx);
        }
    }

    fn finish_sending(&mut self, fx: &mut Vec<Effect>) {
        self.report_progress(fx);
        fx.push(Effect::Send(ClientMessage::FileFinish.into()));
        self.state = State::AllSent;
        debug!(size = self.size, "all segments sent");
    }

    fn report_progress(&mut self, fx: &mut Vec<Effect>) {
        if let Some(percent) = self.progress.update(self.cursor) {
            fx.push(Effect::Notify(UploadEvent::Progress(percent)));
        }
    }

    fn transport_error(&mut self, reason: String, fx: &mut Vec<Effect>) {
        if self.state >= State::Closing {
            debug!(state = ?self.state, %reason, "transport error while closing");
            return;
        }
        self.fail(UploadError::Transport(reason), fx);
    }

    fn transport_closed(&mut self, fx: &mut Vec<Effect>) {
        match self.state {
            State::Closed => {}
            State::Closing => self.finalize(fx),
            _ => {
                self.fail(UploadError::Transport("connection closed by server".into()), fx);
                self.finalize(fx);
            }
        }
    }

    fn abort(&mut self, fx: &mut Vec<Effect>) {
        match self.state {
            State::Opening => {
                info!("upload aborted before connecting");
                self.state = State::Closed;
            }
            State::Closing | State::Closed => {}
            _ => {
                info!(cursor = self.cursor, size = self.size, "upload aborted");
                self.begin_close(fx);
            }
        }
    }

    /// Flags `err` (reported once per session) and starts closing.
    fn fail(&mut self, err: UploadError, fx: &mut Vec<Effect>) {
        if self.state == State::Closed {
            return;
        }
        if self.error.is_none() {
            warn!(error = %err, cursor = self.cursor, "upload failed");
            if self.state < State::Erroring {
                self.state = State::Erroring;
            }
            self.error = Some(err.clone());
            fx.push(Effect::Notify(UploadEvent::Error(err)));
        } else {
            debug!(error = %err, "suppressing further error");
        }
        self.begin_close(fx);
    }

    fn begin_close(&mut self, fx: &mut Vec<Effect>) {
        if self.state < State::Closing {
            self.state = State::Closing;
            fx.push(Effect::BeginClose);
        }
    }

    fn finalize(&mut self, fx: &mut Vec<Effect>) {
        fx.push(Effect::StopCloseTimer);
        fx.push(Effect::Notify(UploadEvent::Closed("Closed".into())));
        self.state = State::Closed;
        debug!(outcome = ?self.outcome(), "connection closed");
    }
}
