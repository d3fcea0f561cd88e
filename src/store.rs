/**
 * Artifact Store
 *
 * Maps (feature, model) pairs to their location under the models
 * directory and reports presence and size straight from disk.
 */

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::catalog::{ArtifactLayout, Catalog, CatalogEntry, Feature};
use crate::downloads::staging_path;

/// One row of the `GET /models` listing
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub name: String,
    pub description: String,
    pub downloaded: bool,
    pub size: u64,
}

#[derive(Clone)]
pub struct ArtifactStore {
    models_dir: PathBuf,
    catalog: Arc<Catalog>,
}

impl ArtifactStore {
    pub fn new(models_dir: PathBuf, catalog: Arc<Catalog>) -> Self {
        Self { models_dir, catalog }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn feature_dir(&self, feature: Feature) -> PathBuf {
        self.models_dir.join(feature.dir_name())
    }

    /// Final path of an artifact: a file for single-file models, a
    /// directory for multi-file ones.
    pub fn path(&self, entry: &CatalogEntry) -> PathBuf {
        let dir = self.feature_dir(entry.feature);
        match &entry.layout {
            ArtifactLayout::SingleFile { filename } => dir.join(filename),
            ArtifactLayout::Directory { .. } => dir.join(&entry.name),
        }
    }

    /// Final path of every constituent file, in download order
    pub fn file_paths(&self, entry: &CatalogEntry) -> Vec<PathBuf> {
        let dir = self.feature_dir(entry.feature);
        entry
            .files
            .iter()
            .map(|file| dir.join(&file.relative_path))
            .collect()
    }

    pub fn exists(&self, feature: Feature, model: &str) -> bool {
        match self.catalog.get(feature, model) {
            Some(entry) => self.entry_exists(entry),
            None => false,
        }
    }

    /// Size on disk in bytes, 0 when the artifact is absent or incomplete
    pub fn size(&self, feature: Feature, model: &str) -> u64 {
        match self.catalog.get(feature, model) {
            Some(entry) => self.entry_size(entry),
            None => 0,
        }
    }

    /// Remove the artifact. Absence is not an error.
    pub fn delete(&self, feature: Feature, model: &str) -> io::Result<()> {
        let Some(entry) = self.catalog.get(feature, model) else {
            return Ok(());
        };
        let path = self.path(entry);

        let result = match entry.layout {
            ArtifactLayout::SingleFile { .. } => {
                remove_if_exists(&staging_path(&path))?;
                std::fs::remove_file(&path)
            }
            ArtifactLayout::Directory { .. } => std::fs::remove_dir_all(&path),
        };
        match result {
            Ok(()) => {
                tracing::info!("[Store] Deleted {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Remove `*.part` staging files left by transfers that never
    /// finished. Only safe while no download is running.
    pub fn sweep_staging(&self) -> io::Result<usize> {
        let mut removed = 0;
        for entry in walkdir::WalkDir::new(&self.models_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            if entry.path().extension().is_some_and(|ext| ext == "part") && remove_if_exists(entry.path())? {
                tracing::info!("[Store] Removed stale {}", entry.path().display());
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Live status of every model of a feature
    pub fn list(&self, feature: Feature) -> Vec<ModelStatus> {
        self.catalog
            .models(feature)
            .map(|entry| ModelStatus {
                name: entry.name.clone(),
                description: entry.description.clone(),
                downloaded: self.entry_exists(entry),
                size: self.entry_size(entry),
            })
            .collect()
    }

    fn entry_exists(&self, entry: &CatalogEntry) -> bool {
        self.file_paths(entry).iter().all(|path| path.is_file())
    }

    fn entry_size(&self, entry: &CatalogEntry) -> u64 {
        if !self.entry_exists(entry) {
            return 0;
        }

        // Constituent files only; strays such as staging files don't count.
        self.file_paths(entry)
            .iter()
            .filter_map(|path| std::fs::metadata(path).ok())
            .map(|m| m.len())
            .sum()
    }
}

fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
