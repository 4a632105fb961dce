//! WebSocket object uploader.
//!
//! Streams one object to a server over a WebSocket using a small text
//! handshake:
//!
//! 1. client sends `Filesize: <n>`, server answers `Permitted` or a rejection;
//! 2. for each segment the client sends `Segment Start: <s> Segment Finish: <e>`
//!    followed by the payload (a binary frame, or base64 text);
//! 3. client sends `File Finish`, server answers `Finished` or an error;
//! 4. client closes the connection.
//!
//! The protocol itself lives in [`session`] as a pure state machine; the
//! [`driver`] connects it to a [`Connection`], and [`Uploader`] runs uploads
//! as background tasks.

pub mod config;
pub mod connection;
pub mod driver;
pub mod error;
pub mod observer;
mod pumps;
pub mod session;
pub mod target;
pub mod uploader;
pub mod ws;

pub use config::UploadConfig;
pub use connection::{Connection, Frame, Inbound, Outbound, Peer};
pub use error::{ConnectionError, UploadError};
pub use observer::{ChannelObserver, UploadEvent, UploadObserver};
pub use session::{Effect, Event, Session, State, UploadOutcome};
pub use target::Destination;
pub use uploader::{UploadHandle, Uploader};
