use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Pipeline phase a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Extract,
    Rewrite,
    UpdateManifest,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Extract => "extract",
            Self::Rewrite => "rewrite",
            Self::UpdateManifest => "update-manifest",
        }
    }

    /// CLI invocation that runs this phase again on its own.
    pub fn rerun_command(self) -> &'static str {
        match self {
            Self::Extract => "termsplit extract",
            Self::Rewrite => "termsplit rewrite",
            Self::UpdateManifest => "termsplit run --split <document>",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fatal conditions. Everything else lands in the report's message log.
#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(
        "refusing to write into {directory}: it holds markdown files without definition or reference markers ({})",
        .foreign_files.join(", ")
    )]
    UnsafeOutputState {
        directory: String,
        foreign_files: Vec<String>,
    },

    #[error(
        "{failed} phase failed after {completed} completed; earlier changes were kept, re-run `{}` once fixed: {reason}",
        .failed.rerun_command()
    )]
    PartialFailure {
        completed: Phase,
        failed: Phase,
        reason: String,
    },
}

impl MigrateError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Whether nothing at all was touched before the error surfaced.
    pub fn left_tree_untouched(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::UnsafeOutputState { .. }
        )
    }
}
