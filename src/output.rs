//! Persistence of fixed code and serialization of the batch report.

use serde::Serialize;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum WriteError {
    /// A unit path would escape the output directory
    #[error("Path traversal attempt rejected: '{attempted}'")]
    PathTraversal { attempted: String },

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Maps `dir/name.ext` to `dir/name_prompt_{n}.ext` (`n` is 1-based).
///
/// # Errors
///
/// Returns [`WriteError::PathTraversal`] if `unit_path` is absolute or
/// contains `..`.
pub fn derived_path(unit_path: &str, prompt_index: usize) -> Result<PathBuf, WriteError> {
    let path = Path::new(unit_path);
    for component in path.components() {
        match component {
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(WriteError::PathTraversal {
                    attempted: unit_path.to_string(),
                });
            }
            _ => {}
        }
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| WriteError::PathTraversal {
            attempted: unit_path.to_string(),
        })?;
    let name = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}_prompt_{prompt_index}.{ext}"),
        None => format!("{stem}_prompt_{prompt_index}"),
    };

    Ok(match path.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    })
}

/// Writes fixed code under an output directory, or nothing in dry-run mode.
#[derive(Debug, Clone)]
pub struct OutputWriter {
    out_dir: PathBuf,
    dry_run: bool,
}

impl OutputWriter {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            dry_run: false,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Persists `code` for one pair and returns where it landed.
    ///
    /// `Ok(None)` in dry-run mode; the filesystem is not touched at all.
    /// Parent directories are created as needed and may already exist.
    pub fn write_fixed(
        &self,
        unit_path: &str,
        prompt_index: usize,
        code: &str,
    ) -> Result<Option<PathBuf>, WriteError> {
        if self.dry_run {
            return Ok(None);
        }

        let target = self.out_dir.join(derived_path(unit_path, prompt_index)?);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|source| WriteError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(&target, code).map_err(|source| WriteError::Io {
            path: target.clone(),
            source,
        })?;

        debug!(path = %target.display(), bytes = code.len(), "Fixed code written");
        Ok(Some(target))
    }
}

/// Pretty-prints `report` as JSON followed by a newline.
pub fn emit_report<T: Serialize, W: Write>(report: &T, mut out: W) -> Result<(), WriteError> {
    serde_json::to_writer_pretty(&mut out, report)?;
    writeln!(out).map_err(|source| WriteError::Io {
        path: PathBuf::from("<stream>"),
        source,
    })?;
    Ok(())
}

/// Writes the report to `path`, creating parent directories.
pub fn write_report_file<T: Serialize>(report: &T, path: &Path) -> Result<(), WriteError> {
    let io_err = |source| WriteError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let file = std::fs::File::create(path).map_err(io_err)?;
    let mut out = std::io::BufWriter::new(file);
    emit_report(report, &mut out)?;
    out.flush().map_err(io_err)
}
