//! Canned payloads for mocked calls.
//!
//! A descriptor with `use_mock` set never reaches the transport. Its payload
//! comes from the inline bytes attached to the descriptor or, failing that,
//! from a named fixture resolved by the client's [`FixtureLoader`].

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::NetworkError;
use crate::types::{MockSource, RequestDescriptor};

/// Source of named fixtures.
#[async_trait]
pub trait FixtureLoader: Send + Sync {
    /// `Ok(None)` when no fixture with this name exists.
    async fn load(&self, name: &str) -> Result<Option<Bytes>, NetworkError>;
}

/// Loads `<root>/<name>.json`.
#[derive(Debug, Clone)]
pub struct DirectoryFixtures {
    root: PathBuf,
}

impl DirectoryFixtures {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.json"))
    }
}

#[async_trait]
impl FixtureLoader for DirectoryFixtures {
    async fn load(&self, name: &str) -> Result<Option<Bytes>, NetworkError> {
        let path = self.path_for(name);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(Bytes::from(bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(NetworkError::Io(format!(
                "failed to read fixture {}: {e}",
                path.display()
            ))),
        }
    }
}

/// In-memory fixtures.
#[derive(Debug, Clone, Default)]
pub struct StaticFixtures {
    fixtures: HashMap<String, Bytes>,
}

impl StaticFixtures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        self.fixtures.insert(name.into(), payload.into());
        self
    }
}

#[async_trait]
impl FixtureLoader for StaticFixtures {
    async fn load(&self, name: &str) -> Result<Option<Bytes>, NetworkError> {
        Ok(self.fixtures.get(name).cloned())
    }
}

/// Payload for a mocked descriptor. Inline bytes win over fixture names.
pub(crate) async fn resolve_mock_payload(
    descriptor: &RequestDescriptor,
    loader: Option<&dyn FixtureLoader>,
) -> Result<Bytes, NetworkError> {
    match &descriptor.mock {
        Some(MockSource::Inline(bytes)) => Ok(bytes.clone()),
        Some(MockSource::Fixture(name)) => {
            let loader = loader.ok_or_else(|| {
                NetworkError::MockDataNotFound(format!(
                    "fixture '{name}' requested but no fixture loader is configured"
                ))
            })?;
            loader
                .load(name)
                .await?
                .ok_or_else(|| NetworkError::MockDataNotFound(format!("no fixture named '{name}'")))
        }
        None => Err(NetworkError::MockDataNotFound(format!(
            "{} {}{} has use_mock set without a mock source",
            descriptor.method, descriptor.domain_key, descriptor.path
        ))),
    }
}
