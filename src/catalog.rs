//! Prompt templates stored as `*.txt` files in one directory.

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::model::PromptTemplate;
use crate::traits::{CatalogError, PromptCatalog};

const TEMPLATE_EXTENSION: &str = "txt";

/// Templates ordered by file name; each is named after its file stem.
#[derive(Debug, Clone)]
pub struct DirectoryCatalog {
    dir: PathBuf,
}

impl DirectoryCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Looks a template up by name.
    pub fn find(&self, name: &str) -> Result<Option<PromptTemplate>, CatalogError> {
        Ok(self.list_prompts()?.into_iter().find(|p| p.name == name))
    }
}

impl PromptCatalog for DirectoryCatalog {
    fn list_prompts(&self) -> Result<Vec<PromptTemplate>, CatalogError> {
        if !self.dir.is_dir() {
            return Err(CatalogError::NotFound(self.dir.clone()));
        }

        let mut files: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path.extension().and_then(|e| e.to_str()) == Some(TEMPLATE_EXTENSION)
            })
            .collect();
        files.sort();

        let mut prompts = Vec::with_capacity(files.len());
        for path in files {
            let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            match std::fs::read_to_string(&path) {
                Ok(body) => prompts.push(PromptTemplate {
                    name,
                    body,
                    source: Some(path),
                }),
                Err(e) => warn!(path = %path.display(), error = %e, "Could not read prompt file"),
            }
        }

        if prompts.is_empty() {
            return Err(CatalogError::Empty(self.dir.clone()));
        }

        info!(count = prompts.len(), dir = %self.dir.display(), "Loaded prompt templates");
        Ok(prompts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_loads_txt_files_in_name_order() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("02_xss.txt"), "Find XSS in {CODE HERE}").unwrap();
        std::fs::write(tmp.path().join("01_sqli.txt"), "Find SQLi in {}").unwrap();
        std::fs::write(tmp.path().join("notes.md"), "ignored").unwrap();
        std::fs::create_dir(tmp.path().join("nested.txt")).unwrap();

        let prompts = DirectoryCatalog::new(tmp.path()).list_prompts().unwrap();

        let names: Vec<&str> = prompts.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["01_sqli", "02_xss"]);
        assert_eq!(prompts[1].body, "Find XSS in {CODE HERE}");
        assert_eq!(prompts[0].source, Some(tmp.path().join("01_sqli.txt")));
    }

    #[test]
    fn test_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let err = DirectoryCatalog::new(tmp.path().join("prompts"))
            .list_prompts()
            .unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
    }

    #[test]
    fn test_empty_directory() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("readme.md"), "no templates").unwrap();
        let err = DirectoryCatalog::new(tmp.path()).list_prompts().unwrap_err();
        assert!(matches!(err, CatalogError::Empty(_)));
    }

    #[test]
    fn test_unreadable_template_is_skipped() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.txt"), b"\xff\xfe not utf8").unwrap();
        std::fs::write(tmp.path().join("b.txt"), "fine").unwrap();

        let prompts = DirectoryCatalog::new(tmp.path()).list_prompts().unwrap();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].name, "b");
    }

    #[test]
    fn test_find_by_name() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("xss.txt"), "body").unwrap();
        let catalog = DirectoryCatalog::new(tmp.path());

        assert_eq!(catalog.find("xss").unwrap().unwrap().body, "body");
        assert!(catalog.find("csrf").unwrap().is_none());
    }
}
