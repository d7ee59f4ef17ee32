use crate::model::{CodeUnit, PromptTemplate, SourceDescriptor};
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("Request timed out after {0}s")]
    Timeout(u64),
    #[error("Completion request failed: {0}")]
    Transport(String),
    #[error("Completion endpoint returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("Malformed completion response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for CompletionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CompletionError::Timeout(crate::completion::COMPLETION_TIMEOUT.as_secs())
        } else {
            CompletionError::Transport(err.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Source folder not found or not a directory: {0}")]
    FolderNotFound(PathBuf),
    #[error("GitHub request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("GitHub API returned {status} for {url}")]
    Status { status: u16, url: String },
    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),
    #[error("Undecodable content for {path}: {reason}")]
    Decode { path: String, reason: String },
    #[error("Source task failed: {0}")]
    Task(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Prompts directory not found: {0}")]
    NotFound(PathBuf),
    #[error("No prompt files found in {0}")]
    Empty(PathBuf),
    #[error("IO error reading prompts: {0}")]
    Io(#[from] std::io::Error),
}

/// One chat-completion call against a language-model endpoint.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Identifier of the model requests are sent to.
    fn model(&self) -> &str;

    /// Sends `prompt` as a single user message and returns the raw response text.
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

/// Supplies the code units of one source location, in a stable order.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// How this source appears in the report header.
    fn descriptor(&self) -> SourceDescriptor;

    async fn list_units(&self) -> Result<Vec<CodeUnit>, SourceError>;
}

/// Supplies the ordered prompt templates for a batch.
pub trait PromptCatalog: Send + Sync {
    /// Errors when the catalog location is missing or holds no templates.
    fn list_prompts(&self) -> Result<Vec<PromptTemplate>, CatalogError>;
}
