//! Downloads to the local file system.

use std::path::{Path, PathBuf};

use crate::error::NetworkError;
use crate::types::{HttpResponse, RequestDescriptor};

/// Where a downloaded body is written.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DownloadDestination {
    /// A uniquely named file in the system temp directory.
    #[default]
    Temporary,
    InDirectory { dir: PathBuf, file_name: String },
    Custom(PathBuf),
}

impl DownloadDestination {
    /// Concrete path for a download of `descriptor`.
    pub fn resolve(&self, descriptor: &RequestDescriptor) -> PathBuf {
        match self {
            Self::Temporary => {
                let name = descriptor
                    .path
                    .rsplit('/')
                    .find(|s| !s.is_empty())
                    .unwrap_or("download");
                std::env::temp_dir().join(format!("{}-{}", uuid::Uuid::new_v4().simple(), name))
            }
            Self::InDirectory { dir, file_name } => dir.join(file_name),
            Self::Custom(path) => path.clone(),
        }
    }
}

/// A call whose body is saved to disk.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub descriptor: RequestDescriptor,
    pub destination: DownloadDestination,
}

impl DownloadRequest {
    pub fn new(domain_key: impl Into<String>, path: impl Into<String>) -> Self {
        Self::from_descriptor(RequestDescriptor::get(domain_key, path))
    }

    pub fn from_descriptor(descriptor: RequestDescriptor) -> Self {
        Self {
            descriptor,
            destination: DownloadDestination::default(),
        }
    }

    pub fn to(mut self, destination: DownloadDestination) -> Self {
        self.destination = destination;
        self
    }
}

/// Where the body went and how big it was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResponse {
    pub local_path: PathBuf,
    pub total_bytes_received: u64,
    /// `Content-Length` when the server sent one, otherwise the received size.
    pub total_bytes_expected: u64,
}

/// Write `response` to `path`, creating parent directories.
pub(crate) async fn save(path: &Path, response: &HttpResponse) -> Result<DownloadResponse, NetworkError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            NetworkError::Io(format!("failed to create {}: {e}", parent.display()))
        })?;
    }
    tokio::fs::write(path, &response.body)
        .await
        .map_err(|e| NetworkError::Io(format!("failed to write {}: {e}", path.display())))?;
    tracing::debug!(target: "callwire::http", path=%path.display(), bytes=response.body.len(), "download saved");

    Ok(DownloadResponse {
        local_path: path.to_path_buf(),
        total_bytes_received: response.body.len() as u64,
        total_bytes_expected: response.content_length(),
    })
}
