//! Source objects: immutable byte sequences read by offset range.

use std::future::Future;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Mutex;
use tracing::trace;

use crate::TransferError;
use crate::segments::Segment;

/// Future returned by [`Source::read_range`].
pub type ReadFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<u8>, TransferError>> + Send + 'a>>;

/// A named object of known size that can be read by byte range.
pub trait Source: Send + Sync {
    /// Object name used to build the upload target.
    fn name(&self) -> &str;

    /// Total size in bytes.
    fn size(&self) -> u64;

    /// Reads exactly the bytes of `segment`.
    fn read_range(&self, segment: Segment) -> ReadFuture<'_>;
}

fn check_range(segment: Segment, size: u64) -> Result<(), TransferError> {
    if segment.start > segment.end || segment.end > size {
        return Err(TransferError::OutOfRange {
            start: segment.start,
            end: segment.end,
            size,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// FileSource
// ---------------------------------------------------------------------------

/// A file on the local filesystem.
///
/// The size is captured when the file is opened.
pub struct FileSource {
    path: PathBuf,
    name: String,
    size: u64,
    file: Mutex<tokio::fs::File>,
}

impl FileSource {
    /// Opens `path`; the object name is the file name.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, TransferError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| TransferError::InvalidName(path.display().to_string()))?
            .to_string();
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        Ok(Self {
            path: path.to_path_buf(),
            name,
            size,
            file: Mutex::new(file),
        })
    }

    /// Uploads the file under a different name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Source for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn read_range(&self, segment: Segment) -> ReadFuture<'_> {
        Box::pin(async move {
            check_range(segment, self.size)?;
            let mut file = self.file.lock().await;
            file.seek(SeekFrom::Start(segment.start)).await?;
            let mut buf = vec![0u8; segment.len() as usize];
            file.read_exact(&mut buf).await?;
            trace!(path = %self.path.display(), start = segment.start, end = segment.end, "read segment");
            Ok(buf)
        })
    }
}

// ---------------------------------------------------------------------------
// MemorySource
// ---------------------------------------------------------------------------

/// An in-memory object.
#[derive(Clone)]
pub struct MemorySource {
    name: String,
    data: Arc<[u8]>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

impl Source for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_range(&self, segment: Segment) -> ReadFuture<'_> {
        Box::pin(async move {
            check_range(segment, self.size())?;
            Ok(self.data[segment.start as usize..segment.end as usize].to_vec())
        })
    }
}
