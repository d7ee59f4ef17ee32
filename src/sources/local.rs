use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::model::{CodeUnit, SourceDescriptor};
use crate::sources::decode_permissive;
use crate::traits::{SourceError, SourceProvider};

/// JS/TS files under a local directory, in file-name order at every level.
#[derive(Debug, Clone)]
pub struct LocalSource {
    root: PathBuf,
}

impl LocalSource {
    /// # Errors
    ///
    /// [`SourceError::FolderNotFound`] if `root` is missing or not a directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, SourceError> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(SourceError::FolderNotFound(root.to_path_buf()));
        }
        let root = root.canonicalize()?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl SourceProvider for LocalSource {
    fn descriptor(&self) -> SourceDescriptor {
        SourceDescriptor::Local {
            local_folder: self.root.clone(),
        }
    }

    async fn list_units(&self) -> Result<Vec<CodeUnit>, SourceError> {
        let root = self.root.clone();
        let units = tokio::task::spawn_blocking(move || walk(&root))
            .await
            .map_err(|e| SourceError::Task(e.to_string()))?;

        info!(root = %self.root.display(), files = units.len(), "Read local files");
        Ok(units)
    }
}

fn walk(root: &Path) -> Vec<CodeUnit> {
    let mut units = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let Some(rel_path) = relative_posix(root, entry.path()) else {
            continue;
        };
        let content = match std::fs::read(entry.path()) {
            Ok(bytes) => decode_permissive(&bytes),
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "Could not read file");
                continue;
            }
        };
        if let Some(unit) = CodeUnit::new(rel_path, content) {
            units.push(unit);
        }
    }
    units
}

/// `path` relative to `root`, joined with `/` on every platform.
fn relative_posix(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<&str> = rel
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<_>>()?;
    Some(parts.join("/"))
}
