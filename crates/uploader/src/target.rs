//! Upload destination and connection target.

use url::Url;

use crate::error::UploadError;

/// Where an object is uploaded: a directory and an object name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    directory: String,
    name: String,
}

impl Destination {
    /// Creates a destination, normalizing `directory` to start and end with `/`.
    pub fn new(directory: &str, name: impl Into<String>) -> Self {
        Self {
            directory: normalize_directory(directory),
            name: name.into(),
        }
    }

    pub fn directory(&self) -> &str {
        &self.directory
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Object path on the server, e.g. `/videos/clip.mp4`.
    pub fn path(&self) -> String {
        format!("{}{}", self.directory, self.name)
    }

    /// Builds the `ws://` target on `host` (`name` or `name:port`).
    pub fn url(&self, host: &str) -> Result<Url, UploadError> {
        if self.name.is_empty() || self.name.contains('/') {
            return Err(UploadError::Unsupported(format!(
                "object name {:?} cannot be used as a path segment",
                self.name
            )));
        }
        let mut url = Url::parse(&format!("ws://{host}/"))
            .map_err(|e| UploadError::Unsupported(format!("invalid host {host:?}: {e}")))?;
        if url.host().is_none() || url.path() != "/" {
            return Err(UploadError::Unsupported(format!("invalid host {host:?}")));
        }
        url.set_path(&self.path());
        Ok(url)
    }
}

fn normalize_directory(directory: &str) -> String {
    let mut dir = String::with_capacity(directory.len() + 2);
    if !directory.starts_with('/') {
        dir.push('/');
    }
    dir.push_str(directory);
    if !dir.ends_with('/') {
        dir.push('/');
    }
    dir
}
