//! Error taxonomy for the tracer.
//!
//! Mirrors the per-kind `thiserror` enum style the rest of this codebase's
//! lineage uses: every variant names the failing operation and carries
//! enough context (path, reason) to act on without re-running with
//! `RUST_LOG=debug`.

use std::path::PathBuf;
use thiserror::Error;

use crate::types::FileId;

/// Errors surfaced by a single phase of the tracer pipeline.
///
/// Per spec §7, only `config_error` aborts a run before any phase starts;
/// every other kind is absorbed per-file/per-source and recorded in `Stats`.
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("failed to read file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {language} file '{path}': {reason}")]
    Parse {
        path: PathBuf,
        language: String,
        reason: String,
    },

    #[error("file '{path}' exceeds max_file_size_bytes ({size} > {limit})")]
    FileTooLarge {
        path: PathBuf,
        size: u64,
        limit: u64,
    },

    #[error("no analyzer registered for extension '{extension}' (file '{path}')")]
    UnsupportedLanguage { path: PathBuf, extension: String },

    #[error("analyzer failed mid-extraction for '{path}': {reason}")]
    AnalyzerInternal { path: PathBuf, reason: String },

    #[error("memory pressure: heap usage {used_mb}MiB exceeded cap {cap_mb}MiB during {phase}")]
    MemoryPressure {
        phase: String,
        used_mb: u64,
        cap_mb: u64,
    },

    #[error("invalid configuration: {reason}")]
    Config { reason: String },

    #[error("file id {id:?} not found; it may not have been discovered in this run")]
    FileNotFound { id: FileId },

    #[error("{0}")]
    General(String),
}

impl TraceError {
    /// Recovery suggestions for CLI-facing errors, mirroring the teacher's
    /// `IndexError::recovery_suggestions` pattern.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::Config { .. } => vec![
                "Check that the root path exists and is a directory",
                "Run 'tainttrace init' to create a default .tainttrace/settings.toml",
            ],
            Self::MemoryPressure { .. } => vec![
                "Raise max_memory_mb or reduce workers",
                "The run still returns partial results; inspect stats.files_parsed",
            ],
            Self::UnsupportedLanguage { .. } => vec![
                "Restrict --languages to the set this build supports",
            ],
            _ => vec![],
        }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    pub fn general(reason: impl Into<String>) -> Self {
        Self::General(reason.into())
    }
}

impl From<std::io::Error> for TraceError {
    fn from(source: std::io::Error) -> Self {
        Self::General(source.to_string())
    }
}

/// Result alias used throughout the tracer.
pub type TraceResult<T> = Result<T, TraceError>;
