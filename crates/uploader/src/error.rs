//! Upload error types.

/// Why an upload failed. Reported once through
/// [`UploadObserver::on_error`](crate::UploadObserver::on_error).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    #[error("Unsupported environment: {0}")]
    Unsupported(String),

    #[error("Could not connect: {0}")]
    Connect(String),

    #[error("Invalid Characters in Filename")]
    InvalidName,

    #[error("File already exists on server.")]
    AlreadyExists,

    #[error("Upload directory not permitted.")]
    DirectoryNotPermitted,

    #[error("File storage error on server.")]
    StorageFailure,

    #[error("Error during file transfer. Transfer failed.")]
    TransferFailed,

    #[error("Message Received Before Filesize Sent: {0}")]
    EarlyMessage(String),

    #[error("Before Filesize Response Received: {0}")]
    UnexpectedSizeResponse(String),

    #[error("Error during file transfer. Transfer failed: {0}")]
    UnexpectedDuringTransfer(String),

    #[error("After File Finished: {0}")]
    UnexpectedFinishResponse(String),

    #[error("Could not read source: {0}")]
    Read(String),

    #[error("Connection error: {0}")]
    Transport(String),

    #[error("an upload is already in progress")]
    Busy,
}

/// Errors from the connection layer.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("connection attempt timed out")]
    Timeout,

    #[error("connection closed")]
    Closed,
}
