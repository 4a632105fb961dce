//! Tasks servicing the two halves of a WebSocket.

pub(crate) mod read;
pub(crate) mod write;
