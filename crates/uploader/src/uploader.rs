//! Public entry point: one upload at a time per [`Uploader`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use frontporch_transfer::Source;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info_span, warn};

use crate::config::UploadConfig;
use crate::driver;
use crate::error::UploadError;
use crate::observer::UploadObserver;
use crate::session::UploadOutcome;
use crate::target::Destination;

/// Uploads objects to one server.
///
/// Only one upload runs at a time; [`Uploader::start`] returns
/// [`UploadError::Busy`] while another is in progress.
pub struct Uploader {
    host: String,
    config: UploadConfig,
    busy: Arc<AtomicBool>,
}

/// Clears the busy flag when the upload task ends, however it ends.
struct SlotGuard(Arc<AtomicBool>);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Uploader {
    /// `host` is `name` or `name:port`; uploads go to `ws://host/<dir>/<name>`.
    pub fn new(host: impl Into<String>, config: UploadConfig) -> Self {
        Self {
            host: host.into(),
            config,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns `true` while an upload started here is still running.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Starts uploading `source` to `destination` in a background task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        &self,
        source: Arc<dyn Source>,
        destination: Destination,
        observer: impl UploadObserver + 'static,
    ) -> Result<UploadHandle, UploadError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(UploadError::Busy);
        }
        let guard = SlotGuard(self.busy.clone());

        let id = uuid::Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();
        let span = info_span!("upload", id = %id, object = %destination.path());

        let host = self.host.clone();
        let config = self.config.clone();
        let token = cancel.clone();
        let mut observer = observer;
        let task = tokio::spawn(
            async move {
                let _guard = guard;
                driver::run(source, &destination, &host, &config, &mut observer, token).await
            }
            .instrument(span),
        );

        Ok(UploadHandle { id, cancel, task })
    }
}

/// A running upload.
pub struct UploadHandle {
    id: String,
    cancel: CancellationToken,
    task: JoinHandle<UploadOutcome>,
}

impl UploadHandle {
    /// Identifier used in log output for this upload.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Stops sending segments and closes the connection. Idempotent.
    pub fn abort(&self) {
        self.cancel.cancel();
    }

    /// Token that aborts this upload when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Waits for the upload to end.
    pub async fn wait(self) -> UploadOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(id = %self.id, "upload task failed: {e}");
                UploadOutcome::Failed(UploadError::Transport(format!("upload task failed: {e}")))
            }
        }
    }
}
