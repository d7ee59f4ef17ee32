use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Marker emitted in place of results when a run finds nothing to analyze.
pub const NO_FILES_MATCHED: &str = "No files matched.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Javascript,
    Typescript,
}

impl Language {
    /// Classifies a path by extension (`.js` / `.ts`, case-insensitive).
    /// Anything else is not a code unit.
    pub fn from_path(path: &str) -> Option<Self> {
        let ext = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "js" => Some(Language::Javascript),
            "ts" => Some(Language::Typescript),
            _ => None,
        }
    }
}

/// One source file handed to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeUnit {
    pub path: String, // relative, '/'-separated
    pub content: String,
    pub language: Language,
}

impl CodeUnit {
    /// Builds a unit when `path` carries a supported extension.
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Option<Self> {
        let path = path.into();
        let language = Language::from_path(&path)?;
        Some(Self {
            path,
            content: content.into(),
            language,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptTemplate {
    pub name: String,
    #[serde(rename = "content")]
    pub body: String,
    #[serde(rename = "file", skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
}

impl PromptTemplate {
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
            source: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Case-insensitive match on the four levels; unknown labels fall back to `Medium`.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Severity::Low,
            "high" => Severity::High,
            "critical" => Severity::Critical,
            _ => Severity::Medium,
        }
    }
}

/// Canonical fields extracted from one model response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisFields {
    pub summary: String,
    pub findings: Vec<String>,
    /// Proposed replacement source. Empty means "no change recommended".
    #[serde(skip_serializing)]
    pub fixed_code: String,
    pub vulnerability_type: String,
    pub severity: Severity,
}

impl Default for AnalysisFields {
    fn default() -> Self {
        Self {
            summary: String::new(),
            findings: Vec::new(),
            fixed_code: String::new(),
            vulnerability_type: "Unknown".to_string(),
            severity: Severity::Medium,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PairSuccess {
    pub prompt_index: usize, // 1-based position in the catalog
    pub prompt_name: String,
    #[serde(flatten)]
    pub fields: AnalysisFields,
    /// True only when the fixed code actually reached the disk.
    pub written: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    pub prompt_preview: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PairFailure {
    pub prompt_index: usize,
    pub prompt_name: String,
    pub error: String,
    pub prompt_preview: String,
}

/// Result of one (file, prompt) pair. Exactly one variant per pair.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum AnalysisOutcome {
    Success(PairSuccess),
    Failure(PairFailure),
}

impl AnalysisOutcome {
    pub fn prompt_index(&self) -> usize {
        match self {
            AnalysisOutcome::Success(s) => s.prompt_index,
            AnalysisOutcome::Failure(f) => f.prompt_index,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AnalysisOutcome::Success(_))
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            AnalysisOutcome::Failure(f) => Some(&f.error),
            AnalysisOutcome::Success(_) => None,
        }
    }

    pub fn success(&self) -> Option<&PairSuccess> {
        match self {
            AnalysisOutcome::Success(s) => Some(s),
            AnalysisOutcome::Failure(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: String,
    #[serde(rename = "prompt_results")]
    pub outcomes: Vec<AnalysisOutcome>,
}

/// Where the analyzed units came from; flattened into the report's top level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum SourceDescriptor {
    Github {
        owner: String,
        repo: String,
        branch: String,
        folder: String,
    },
    Local {
        local_folder: PathBuf,
    },
}

/// Counters for one batch run. Logged, not serialized.
#[derive(Debug, Default, Clone)]
pub struct BatchStats {
    pub total_duration_ms: u64,
    pub pairs_attempted: usize,
    pub pairs_failed: usize,
    pub files_written: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    #[serde(flatten)]
    pub source: SourceDescriptor,
    pub model: String,
    pub output_dir: PathBuf,
    pub files_analyzed: usize,
    pub prompts_used: usize,
    #[serde(rename = "results")]
    pub file_reports: Vec<FileReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip)]
    pub stats: BatchStats,
}

impl BatchReport {
    pub fn no_files_matched(&self) -> bool {
        self.message.as_deref() == Some(NO_FILES_MATCHED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_from_extension() {
        assert_eq!(Language::from_path("src/a.js"), Some(Language::Javascript));
        assert_eq!(Language::from_path("b.TS"), Some(Language::Typescript));
        assert_eq!(Language::from_path("c.tsx"), None);
        assert_eq!(Language::from_path("Makefile"), None);
    }

    #[test]
    fn test_severity_parse_lenient() {
        assert_eq!(Severity::parse_lenient("CRITICAL"), Severity::Critical);
        assert_eq!(Severity::parse_lenient(" low "), Severity::Low);
        assert_eq!(Severity::parse_lenient("catastrophic"), Severity::Medium);
    }

    #[test]
    fn test_outcome_serialization_shapes() {
        let success = AnalysisOutcome::Success(PairSuccess {
            prompt_index: 1,
            prompt_name: "p1".to_string(),
            fields: AnalysisFields {
                summary: "ok".to_string(),
                fixed_code: "console.log(1)".to_string(),
                ..Default::default()
            },
            written: false,
            output_path: None,
            prompt_preview: "Fix: {CODE HERE}".to_string(),
        });
        let value = serde_json::to_value(&success).unwrap();
        assert_eq!(value["prompt_index"], 1);
        assert_eq!(value["summary"], "ok");
        assert_eq!(value["severity"], "Medium");
        assert_eq!(value["written"], false);
        assert!(value.get("error").is_none());
        assert!(value.get("fixed_code").is_none());
        assert!(value.get("output_path").is_none());

        let failure = AnalysisOutcome::Failure(PairFailure {
            prompt_index: 2,
            prompt_name: "p2".to_string(),
            error: "boom".to_string(),
            prompt_preview: "x".to_string(),
        });
        let value = serde_json::to_value(&failure).unwrap();
        assert_eq!(value["error"], "boom");
        assert!(value.get("summary").is_none());
    }

    #[test]
    fn test_report_flattens_source_descriptor() {
        let report = BatchReport {
            source: SourceDescriptor::Github {
                owner: "acme".to_string(),
                repo: "shop".to_string(),
                branch: "main".to_string(),
                folder: "src/".to_string(),
            },
            model: "gpt-4o-mini".to_string(),
            output_dir: PathBuf::from("/tmp/out"),
            files_analyzed: 0,
            prompts_used: 3,
            file_reports: vec![],
            message: Some(NO_FILES_MATCHED.to_string()),
            stats: BatchStats::default(),
        };

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["source"], "github");
        assert_eq!(value["owner"], "acme");
        assert_eq!(value["folder"], "src/");
        assert_eq!(value["results"], serde_json::json!([]));
        assert_eq!(value["message"], NO_FILES_MATCHED);
        assert!(report.no_files_matched());
    }
}
