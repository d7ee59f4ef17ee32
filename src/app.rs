//! Command handlers behind the `vulnfix` binary.
//!
//! Each handler resolves configuration first (credentials, prompts, source
//! location) so that misconfiguration fails before any network work, then
//! writes its JSON result to the given writer.

use serde_json::json;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::analysis::{preview, BatchOrchestrator};
use crate::catalog::DirectoryCatalog;
use crate::cli::{AnalyzeArgs, Commands, FetchArgs, ModelArgs, PromptsArgs, RunArgs, SourceArgs};
use crate::completion::OpenAiCompletionClient;
use crate::config::{Config, ConfigError};
use crate::executor::ExecutorError;
use crate::model::CodeUnit;
use crate::output::{emit_report, write_report_file, OutputWriter, WriteError};
use crate::sources::{decode_permissive, GitHubLocator, GitHubSource, LocalSource};
use crate::traits::{CatalogError, PromptCatalog, SourceError, SourceProvider};

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("Failed to fetch source files: {0}")]
    Source(#[from] SourceError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("Analysis failed: {0}")]
    Analysis(#[from] ExecutorError),

    #[error("Prompt '{0}' not found")]
    PromptNotFound(String),

    #[error("Cannot read {path}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported file type: {0} (expected .js or .ts)")]
    UnsupportedFile(PathBuf),
}

impl AppError {
    /// `2` for configuration problems, `1` for everything else.
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Config(_)
            | AppError::Catalog(_)
            | AppError::PromptNotFound(_)
            | AppError::Input { .. }
            | AppError::UnsupportedFile(_)
            | AppError::Source(SourceError::FolderNotFound(_)) => 2,
            _ => 1,
        }
    }
}

pub async fn dispatch<W: Write>(command: Commands, config: &Config, out: W) -> Result<(), AppError> {
    match command {
        Commands::Run(args) => run(&args, config, out).await,
        Commands::Fetch(args) => fetch(&args, config, out).await,
        Commands::Prompts(args) => prompts(&args, config, out),
        Commands::Analyze(args) => analyze(&args, config, out).await,
        Commands::Status(args) => status(&args, config, out),
    }
}

/// CLI flags win over environment values.
fn with_overrides(config: &Config, model: Option<&str>, prompts_dir: Option<&Path>) -> Config {
    let mut config = config.clone();
    if let Some(model) = model {
        config.model = model.to_string();
    }
    if let Some(dir) = prompts_dir {
        config.prompts_dir = dir.to_path_buf();
    }
    config
}

fn model_config(config: &Config, args: &ModelArgs) -> Config {
    with_overrides(config, args.model.as_deref(), args.prompts.as_deref())
}

fn completion_client(config: &Config, args: &ModelArgs) -> Result<OpenAiCompletionClient, AppError> {
    Ok(OpenAiCompletionClient::new(config)?.with_structured_output(args.response_format.into()))
}

fn build_source(args: &SourceArgs, config: &Config) -> Result<Box<dyn SourceProvider>, AppError> {
    if let Some(parts) = &args.github {
        let [owner, repo, branch, folder] = parts.as_slice() else {
            return Err(ConfigError::InvalidValue {
                name: "--github".to_string(),
                reason: "expected OWNER REPO BRANCH FOLDER".to_string(),
            }
            .into());
        };
        let locator = GitHubLocator {
            owner: owner.clone(),
            repo: repo.clone(),
            branch: branch.clone(),
            folder: folder.clone(),
        };
        return Ok(Box::new(GitHubSource::new(config, locator)?));
    }

    match &args.local {
        Some(folder) => Ok(Box::new(LocalSource::new(folder)?)),
        None => Err(ConfigError::InvalidValue {
            name: "source".to_string(),
            reason: "one of --github or --local is required".to_string(),
        }
        .into()),
    }
}

async fn run<W: Write>(args: &RunArgs, config: &Config, out: W) -> Result<(), AppError> {
    let config = model_config(config, &args.model);
    let client = completion_client(&config, &args.model)?;
    let source = build_source(&args.source, &config)?;
    let prompts = DirectoryCatalog::new(&config.prompts_dir).list_prompts()?;

    let units = source.list_units().await?;
    info!(files = units.len(), prompts = prompts.len(), model = %config.model, "Starting batch");

    let out_dir = std::path::absolute(&args.out).map_err(|source| WriteError::Io {
        path: args.out.clone(),
        source,
    })?;
    let writer = OutputWriter::new(out_dir).with_dry_run(args.dry_run);
    let orchestrator = BatchOrchestrator::new(Arc::new(client), writer)
        .with_concurrency(usize::from(args.concurrency))
        .with_vars(args.model.vars.clone());

    let report = orchestrator
        .run(units, &prompts, args.max_files, source.descriptor())
        .await;

    // Dry runs leave the filesystem untouched, the report file included
    match &args.report {
        Some(path) if !args.dry_run => {
            write_report_file(&report, path)?;
            info!(path = %path.display(), "Report written");
        }
        Some(path) => {
            warn!(path = %path.display(), "Dry run: printing report instead of writing it");
            emit_report(&report, out)?;
        }
        None => emit_report(&report, out)?,
    }
    Ok(())
}

async fn fetch<W: Write>(args: &FetchArgs, config: &Config, out: W) -> Result<(), AppError> {
    let source = build_source(&args.source, config)?;
    let units = source.list_units().await?;
    emit_report(&units, out)?;
    Ok(())
}

fn prompts<W: Write>(args: &PromptsArgs, config: &Config, out: W) -> Result<(), AppError> {
    let config = with_overrides(config, None, args.prompts.as_deref());
    let prompts = DirectoryCatalog::new(&config.prompts_dir).list_prompts()?;
    emit_report(
        &json!({
            "prompts_loaded": prompts.len(),
            "prompts": prompts,
        }),
        out,
    )?;
    Ok(())
}

async fn analyze<W: Write>(args: &AnalyzeArgs, config: &Config, out: W) -> Result<(), AppError> {
    let config = model_config(config, &args.model);
    let client = completion_client(&config, &args.model)?;
    let template = DirectoryCatalog::new(&config.prompts_dir)
        .find(&args.prompt_name)?
        .ok_or_else(|| AppError::PromptNotFound(args.prompt_name.clone()))?;

    let bytes = std::fs::read(&args.file).map_err(|source| AppError::Input {
        path: args.file.clone(),
        source,
    })?;
    let path = args.file.to_string_lossy().replace('\\', "/");
    let unit = CodeUnit::new(path, decode_permissive(&bytes))
        .ok_or_else(|| AppError::UnsupportedFile(args.file.clone()))?;

    let orchestrator = BatchOrchestrator::new(Arc::new(client), OutputWriter::new(".").with_dry_run(true))
        .with_vars(args.model.vars.clone());
    let fields = orchestrator.analyze_pair(&unit, &template).await?;

    emit_report(
        &json!({
            "file_path": unit.path,
            "language": unit.language,
            "prompt_name": template.name,
            "prompt_preview": preview(&template.body),
            "model": config.model,
            "summary": fields.summary,
            "findings": fields.findings,
            "vulnerability_type": fields.vulnerability_type,
            "severity": fields.severity,
            "fixed_code": fields.fixed_code,
        }),
        out,
    )?;
    Ok(())
}

fn status<W: Write>(args: &PromptsArgs, config: &Config, out: W) -> Result<(), AppError> {
    let config = with_overrides(config, None, args.prompts.as_deref());
    emit_report(
        &json!({
            "version": env!("CARGO_PKG_VERSION"),
            "model": config.model,
            "openai_base_url": config.openai_base_url,
            "github_api_base": config.github_api_base,
            "openai_configured": config.openai_api_key.is_some(),
            "github_configured": config.github_token.is_some(),
            "prompts_dir": config.prompts_dir,
            "prompts_dir_exists": config.prompts_dir.is_dir(),
        }),
        out,
    )?;
    Ok(())
}
