//! Batch analysis orchestrator.
//!
//! [`BatchOrchestrator`] drives the cross product of code units × prompt
//! templates:
//! - one completion call per pair, through [`PairExecutor`]
//! - failures captured per pair, never aborting the file or the batch
//! - responses normalized into [`AnalysisFields`]
//! - non-empty fixed code persisted via [`OutputWriter`] under a derived name
//!
//! The default mode is strictly sequential. A concurrency limit above 1 fans
//! the pairs out as tokio tasks but collects them in (file, prompt) order, so
//! the report is the same either way.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::analysis::{normalize, prompt};
use crate::executor::{ExecutorError, PairExecutor};
use crate::model::{
    AnalysisFields, AnalysisOutcome, BatchReport, BatchStats, CodeUnit, FileReport, PairFailure,
    PairSuccess, PromptTemplate, SourceDescriptor, NO_FILES_MATCHED,
};
use crate::output::OutputWriter;
use crate::traits::CompletionClient;

/// Drops units with an empty path or content, then keeps the first `max_files`.
pub fn select_units(units: Vec<CodeUnit>, max_files: usize) -> Vec<CodeUnit> {
    units
        .into_iter()
        .filter(|u| !u.path.is_empty() && !u.content.is_empty())
        .take(max_files)
        .collect()
}

pub struct BatchOrchestrator {
    client: Arc<dyn CompletionClient>,
    executor: PairExecutor,
    writer: OutputWriter,
    vars: Vec<(String, String)>,
}

impl BatchOrchestrator {
    /// Creates a sequential orchestrator.
    pub fn new(client: Arc<dyn CompletionClient>, writer: OutputWriter) -> Self {
        Self {
            client,
            executor: PairExecutor::new(1),
            writer,
            vars: Vec::new(),
        }
    }

    /// Allows up to `limit` pairs in flight. `1` keeps the sequential mode.
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.executor = PairExecutor::new(limit).with_timeout(self.executor.pair_timeout());
        self
    }

    pub fn with_pair_timeout(mut self, pair_timeout: Duration) -> Self {
        self.executor = self.executor.with_timeout(pair_timeout);
        self
    }

    /// Extra `{KEY}` placeholders applied to every template.
    pub fn with_vars(mut self, vars: Vec<(String, String)>) -> Self {
        self.vars = vars;
        self
    }

    fn filled_prompt(&self, unit: &CodeUnit, template: &PromptTemplate) -> String {
        prompt::fill(&template.body, &unit.path, &unit.content, &self.vars)
    }

    /// Runs a single pair without touching the output directory.
    pub async fn analyze_pair(
        &self,
        unit: &CodeUnit,
        template: &PromptTemplate,
    ) -> Result<AnalysisFields, ExecutorError> {
        let filled = self.filled_prompt(unit, template);
        let raw = self.executor.execute(self.client.as_ref(), &filled).await?;
        Ok(normalize::normalize(&raw))
    }

    /// Analyzes every retained unit with every prompt and assembles the report.
    ///
    /// Never fails: per-pair errors become [`AnalysisOutcome::Failure`] and
    /// write errors leave `written: false`.
    pub async fn run(
        &self,
        units: Vec<CodeUnit>,
        prompts: &[PromptTemplate],
        max_files: usize,
        source: SourceDescriptor,
    ) -> BatchReport {
        let start = Instant::now();
        let mut stats = BatchStats::default();
        let selected = select_units(units, max_files);

        let file_reports = if self.executor.concurrency_limit() > 1 {
            self.run_fanned_out(&selected, prompts, &mut stats).await
        } else {
            self.run_sequential(&selected, prompts, &mut stats).await
        };

        stats.total_duration_ms = start.elapsed().as_millis() as u64;
        info!(
            duration_ms = stats.total_duration_ms,
            files = file_reports.len(),
            pairs = stats.pairs_attempted,
            failed = stats.pairs_failed,
            written = stats.files_written,
            "Batch completed"
        );

        BatchReport {
            source,
            model: self.client.model().to_string(),
            output_dir: self.writer.out_dir().to_path_buf(),
            files_analyzed: file_reports.len(),
            prompts_used: prompts.len(),
            message: file_reports
                .is_empty()
                .then(|| NO_FILES_MATCHED.to_string()),
            file_reports,
            stats,
        }
    }

    async fn run_sequential(
        &self,
        units: &[CodeUnit],
        prompts: &[PromptTemplate],
        stats: &mut BatchStats,
    ) -> Vec<FileReport> {
        let mut reports = Vec::with_capacity(units.len());
        for (file_no, unit) in units.iter().enumerate() {
            info!(path = %unit.path, "Processing file {}/{}", file_no + 1, units.len());

            let mut outcomes = Vec::with_capacity(prompts.len());
            for (i, template) in prompts.iter().enumerate() {
                info!("Applying prompt {}/{}", i + 1, prompts.len());
                let filled = self.filled_prompt(unit, template);
                let raw = self
                    .executor
                    .execute(self.client.as_ref(), &filled)
                    .await
                    .map_err(|e| e.to_string());
                outcomes.push(self.settle(unit, template, i + 1, raw, stats));
            }

            reports.push(FileReport {
                path: unit.path.clone(),
                outcomes,
            });
        }
        reports
    }

    async fn run_fanned_out(
        &self,
        units: &[CodeUnit],
        prompts: &[PromptTemplate],
        stats: &mut BatchStats,
    ) -> Vec<FileReport> {
        info!(
            limit = self.executor.concurrency_limit(),
            pairs = units.len() * prompts.len(),
            "Fanning out pairs"
        );

        let handles: Vec<Vec<JoinHandle<Result<String, ExecutorError>>>> = units
            .iter()
            .map(|unit| {
                prompts
                    .iter()
                    .map(|template| {
                        let filled = self.filled_prompt(unit, template);
                        let executor = self.executor.clone();
                        let client = Arc::clone(&self.client);
                        tokio::spawn(async move { executor.execute(client.as_ref(), &filled).await })
                    })
                    .collect()
            })
            .collect();

        let mut reports = Vec::with_capacity(units.len());
        for (unit, file_handles) in units.iter().zip(handles) {
            let mut outcomes = Vec::with_capacity(prompts.len());
            for (i, (template, handle)) in prompts.iter().zip(file_handles).enumerate() {
                let raw = match handle.await {
                    Ok(result) => result.map_err(|e| e.to_string()),
                    Err(join_err) => Err(format!("Pair task failed: {join_err}")),
                };
                outcomes.push(self.settle(unit, template, i + 1, raw, stats));
            }
            reports.push(FileReport {
                path: unit.path.clone(),
                outcomes,
            });
        }
        reports
    }

    /// Turns one pair's raw result into its outcome, persisting fixed code.
    fn settle(
        &self,
        unit: &CodeUnit,
        template: &PromptTemplate,
        prompt_index: usize,
        raw: Result<String, String>,
        stats: &mut BatchStats,
    ) -> AnalysisOutcome {
        stats.pairs_attempted += 1;
        let prompt_preview = prompt::preview(&template.body);

        let raw = match raw {
            Ok(raw) => raw,
            Err(error) => {
                stats.pairs_failed += 1;
                warn!(path = %unit.path, prompt_index, %error, "Pair failed");
                return AnalysisOutcome::Failure(PairFailure {
                    prompt_index,
                    prompt_name: template.name.clone(),
                    error,
                    prompt_preview,
                });
            }
        };

        let fields = normalize::normalize(&raw);
        let mut output_path = None;
        if !fields.fixed_code.is_empty() {
            match self
                .writer
                .write_fixed(&unit.path, prompt_index, &fields.fixed_code)
            {
                Ok(Some(path)) => {
                    stats.files_written += 1;
                    output_path = Some(path);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(path = %unit.path, prompt_index, error = %e, "Skipping fixed-code write");
                }
            }
        }

        AnalysisOutcome::Success(PairSuccess {
            prompt_index,
            prompt_name: template.name.clone(),
            fields,
            written: output_path.is_some(),
            output_path,
            prompt_preview,
        })
    }
}
