//! Caller-facing upload notifications.
//!
//! A running upload reports through an [`UploadObserver`]. Every method has a
//! no-op default so observers only override what they care about.
//! [`ChannelObserver`] turns the callbacks into a stream of [`UploadEvent`]s.

use tokio::sync::mpsc;

use crate::error::UploadError;

/// One notification from a running upload.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    /// The connection opened.
    Opened(String),
    /// Raw text of a server message.
    Message(String),
    /// Integer percentage of bytes handed to the transport.
    Progress(u8),
    /// The server confirmed the object was stored.
    Finished,
    /// The upload failed. Reported at most once.
    Error(UploadError),
    /// The connection closed.
    Closed(String),
}

/// Callbacks invoked while an upload runs.
///
/// Called from the upload task, in protocol order.
pub trait UploadObserver: Send {
    fn on_open(&mut self, _info: &str) {}

    fn on_message(&mut self, _text: &str) {}

    fn on_progress(&mut self, _percent: u8) {}

    fn on_finish(&mut self) {}

    fn on_error(&mut self, _error: &UploadError) {}

    fn on_close(&mut self, _info: &str) {}
}

impl UploadObserver for () {}

/// Routes `event` to the matching observer callback.
pub fn dispatch(observer: &mut dyn UploadObserver, event: UploadEvent) {
    match event {
        UploadEvent::Opened(info) => observer.on_open(&info),
        UploadEvent::Message(text) => observer.on_message(&text),
        UploadEvent::Progress(percent) => observer.on_progress(percent),
        UploadEvent::Finished => observer.on_finish(),
        UploadEvent::Error(err) => observer.on_error(&err),
        UploadEvent::Closed(info) => observer.on_close(&info),
    }
}

/// Observer that forwards every notification over a channel.
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<UploadEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<UploadEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: UploadEvent) {
        // Receiver gone means nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

impl UploadObserver for ChannelObserver {
    fn on_open(&mut self, info: &str) {
        self.forward(UploadEvent::Opened(info.to_string()));
    }

    fn on_message(&mut self, text: &str) {
        self.forward(UploadEvent::Message(text.to_string()));
    }

    fn on_progress(&mut self, percent: u8) {
        self.forward(UploadEvent::Progress(percent));
    }

    fn on_finish(&mut self) {
        self.forward(UploadEvent::Finished);
    }

    fn on_error(&mut self, error: &UploadError) {
        self.forward(UploadEvent::Error(error.clone()));
    }

    fn on_close(&mut self, info: &str) {
        self.forward(UploadEvent::Closed(info.to_string()));
    }
}
