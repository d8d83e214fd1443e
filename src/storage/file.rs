//! File backed entity store
//!
//! Reads one YAML or JSON document holding `clusters`, `routes` and `listeners` arrays.
//! The file is re-read on every load so edits are picked up by the next refresh; a
//! refresh parses it once for all three kinds.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{EntityDocument, EntityStore};
use crate::domain::{Cluster, Listener, Route};
use crate::errors::{ControlPlaneError, Result};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone)]
pub struct FileEntityStore {
    path: PathBuf,
}

impl FileEntityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the whole document.
    pub async fn load(&self) -> Result<EntityDocument> {
        let contents = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            ControlPlaneError::storage_with_source(
                format!("Failed to read entity file '{}'", self.path.display()),
                Box::new(e),
            )
        })?;

        if contents.trim().is_empty() {
            return Ok(EntityDocument::default());
        }

        let is_json = self
            .path
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| extension.eq_ignore_ascii_case("json"));

        let parsed: std::result::Result<EntityDocument, BoxError> = if is_json {
            serde_json::from_str(&contents).map_err(|e| Box::new(e) as BoxError)
        } else {
            serde_yaml::from_str(&contents).map_err(|e| Box::new(e) as BoxError)
        };

        parsed.map_err(|source| {
            ControlPlaneError::storage_with_source(
                format!("Failed to parse entity file '{}'", self.path.display()),
                source,
            )
        })
    }
}

#[async_trait]
impl EntityStore for FileEntityStore {
    async fn clusters(&self) -> Result<Vec<Cluster>> {
        Ok(self.load().await?.clusters)
    }

    async fn routes(&self) -> Result<Vec<Route>> {
        Ok(self.load().await?.routes)
    }

    async fn listeners(&self) -> Result<Vec<Listener>> {
        Ok(self.load().await?.listeners)
    }

    async fn load_all(&self) -> Result<EntityDocument> {
        self.load().await
    }
}
