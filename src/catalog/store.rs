//! JSON file storage for the catalog.

use std::path::{Path, PathBuf};

use super::{Catalog, Show};
use crate::error::{Error, Result};

/// Reads and writes the catalog file
///
/// The file is a JSON array of show records sorted by title. Writes go to a
/// sibling temp file that is then renamed over the target, so a crash leaves
/// either the old or the new catalog on disk.
#[derive(Clone, Debug)]
pub struct CatalogStore {
    path: PathBuf,
}

impl CatalogStore {
    /// Create a store for the file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Catalog file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the catalog file exists
    pub async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    /// Read the catalog file
    ///
    /// Returns `Ok(None)` when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptPersistedState`] when the file cannot be read or
    /// is not a list of show records.
    pub async fn try_load(&self) -> Result<Option<Catalog>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.corrupt(e.to_string())),
        };

        let shows: Vec<Show> =
            serde_json::from_slice(&bytes).map_err(|e| self.corrupt(e.to_string()))?;

        if let Some(pos) = shows.iter().position(|s| s.title.trim().is_empty()) {
            return Err(self.corrupt(format!("show record {pos} has an empty title")));
        }

        Ok(Some(Catalog::from_shows(shows)))
    }

    /// Load the catalog, starting fresh when there is nothing usable on disk
    ///
    /// A missing file yields an empty catalog. A corrupt file also yields an
    /// empty catalog, with a warning; it is overwritten at the next save.
    pub async fn load(&self) -> Catalog {
        match self.try_load().await {
            Ok(Some(catalog)) => {
                tracing::info!(
                    path = %self.path.display(),
                    shows = catalog.len(),
                    "Loaded catalog"
                );
                catalog
            }
            Ok(None) => {
                tracing::info!(
                    path = %self.path.display(),
                    "No catalog file found, starting with an empty catalog"
                );
                Catalog::new()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Catalog file is unusable, starting with an empty catalog");
                Catalog::new()
            }
        }
    }

    /// Write the catalog to disk
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be created or the file
    /// cannot be written or renamed.
    pub async fn save(&self, catalog: &Catalog) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_vec_pretty(catalog)?;
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        tracing::debug!(
            path = %self.path.display(),
            shows = catalog.len(),
            "Catalog saved"
        );
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "catalog.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn corrupt(&self, reason: String) -> Error {
        Error::CorruptPersistedState {
            path: self.path.clone(),
            reason,
        }
    }
}
