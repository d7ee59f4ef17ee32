use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::completion::StructuredOutput;
use crate::config::{parse_var, ConfigError};

pub const DEFAULT_MAX_FILES: usize = 50;
pub const DEFAULT_OUT_DIR: &str = "fixed_output";

/// Top-level CLI parser for the `vulnfix` binary.
#[derive(Debug, Parser)]
#[command(
    name = "vulnfix",
    version,
    about = "Analyze JS/TS sources with security prompt templates and collect fixes"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run every prompt against every file and print the JSON report
    Run(RunArgs),
    /// Print the files a source would provide, as JSON
    Fetch(FetchArgs),
    /// Print the loaded prompt templates, as JSON
    Prompts(PromptsArgs),
    /// Analyze one local file with one named prompt
    Analyze(AnalyzeArgs),
    /// Print configuration status (never secrets)
    Status(PromptsArgs),
}

/// Exactly one of `--github` or `--local`.
#[derive(Debug, Clone, Args)]
#[group(required = true, multiple = false)]
pub struct SourceArgs {
    /// GitHub repository: owner repo branch folder-prefix
    #[arg(long, num_args = 4, value_names = ["OWNER", "REPO", "BRANCH", "FOLDER"])]
    pub github: Option<Vec<String>>,

    /// Local folder containing JS/TS files
    #[arg(long, value_name = "FOLDER")]
    pub local: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ResponseFormat {
    /// JSON mode first, plain text once if the endpoint rejects it
    #[default]
    Auto,
    /// JSON mode only
    Json,
    /// Plain text only
    Plain,
}

impl From<ResponseFormat> for StructuredOutput {
    fn from(format: ResponseFormat) -> Self {
        match format {
            ResponseFormat::Auto => StructuredOutput::Unknown,
            ResponseFormat::Json => StructuredOutput::Supported,
            ResponseFormat::Plain => StructuredOutput::Unsupported,
        }
    }
}

/// Options shared by every command that calls the model.
#[derive(Debug, Clone, Args)]
pub struct ModelArgs {
    /// Model name (defaults to OPENAI_MODEL, then gpt-4o-mini)
    #[arg(long)]
    pub model: Option<String>,

    /// Directory of *.txt prompt templates
    #[arg(long, value_name = "DIR")]
    pub prompts: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = ResponseFormat::Auto)]
    pub response_format: ResponseFormat,

    /// Extra template placeholder, replaces {KEY} (repeatable)
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var_arg)]
    pub vars: Vec<(String, String)>,
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub model: ModelArgs,

    /// Max number of files to process
    #[arg(long, default_value_t = DEFAULT_MAX_FILES)]
    pub max_files: usize,

    /// Output directory for fixed files
    #[arg(long, default_value = DEFAULT_OUT_DIR)]
    pub out: PathBuf,

    /// Do not write files, only print the JSON report
    #[arg(long)]
    pub dry_run: bool,

    /// Write the report to this file instead of stdout
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Pairs in flight at once (1 = strictly sequential)
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    pub concurrency: u16,
}

#[derive(Debug, Clone, Args)]
pub struct FetchArgs {
    #[command(flatten)]
    pub source: SourceArgs,
}

#[derive(Debug, Clone, Args)]
pub struct PromptsArgs {
    /// Directory of *.txt prompt templates
    #[arg(long, value_name = "DIR")]
    pub prompts: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct AnalyzeArgs {
    /// Local JS/TS file to analyze
    #[arg(long, value_name = "PATH")]
    pub file: PathBuf,

    /// Template name (file stem in the prompts directory)
    #[arg(long = "prompt", value_name = "NAME")]
    pub prompt_name: String,

    #[command(flatten)]
    pub model: ModelArgs,
}

fn parse_var_arg(raw: &str) -> Result<(String, String), ConfigError> {
    parse_var(raw)
}
