//! Admission control for the terms output directory.
//!
//! Inspected once before extraction writes anything. Hand-written markdown that
//! happens to live in the output directory must never be overwritten, while a
//! directory produced by an earlier run makes the extraction a no-op.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::filesystem::{list_markdown_files, relative_display};
use crate::scanner::contains_generated_marker;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GuardState {
    Missing,
    Empty,
    PopulatedForeign { foreign_files: Vec<String> },
    PopulatedGenerated { generated_files: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardVerdict {
    SafeToCreate,
    Safe,
    Unsafe,
    AlreadyDone,
}

impl GuardState {
    pub fn verdict(&self) -> GuardVerdict {
        match self {
            Self::Missing => GuardVerdict::SafeToCreate,
            Self::Empty => GuardVerdict::Safe,
            Self::PopulatedForeign { .. } => GuardVerdict::Unsafe,
            Self::PopulatedGenerated { .. } => GuardVerdict::AlreadyDone,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Empty => "empty",
            Self::PopulatedForeign { .. } => "populated-foreign",
            Self::PopulatedGenerated { .. } => "populated-generated",
        }
    }
}

impl GuardVerdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SafeToCreate => "safe-to-create",
            Self::Safe => "safe",
            Self::Unsafe => "unsafe",
            Self::AlreadyDone => "already-done",
        }
    }

    pub fn may_write(self) -> bool {
        matches!(self, Self::SafeToCreate | Self::Safe)
    }
}

/// Classify `terms_dir`. A single markdown file without markers makes the whole
/// directory foreign; unreadable markdown files count as foreign too.
pub fn inspect_terms_directory(terms_dir: &Path) -> Result<GuardState> {
    if !terms_dir.exists() {
        return Ok(GuardState::Missing);
    }
    if !terms_dir.is_dir() {
        return Ok(GuardState::PopulatedForeign {
            foreign_files: vec![relative_display(
                terms_dir.parent().unwrap_or(terms_dir),
                terms_dir,
            )],
        });
    }

    let files = list_markdown_files(terms_dir)
        .with_context(|| format!("failed to inspect {}", terms_dir.display()))?;
    if files.is_empty() {
        return Ok(GuardState::Empty);
    }

    let mut foreign_files = Vec::new();
    for path in &files {
        let generated = fs::read_to_string(path)
            .map(|content| contains_generated_marker(&content))
            .unwrap_or(false);
        if !generated {
            foreign_files.push(relative_display(terms_dir, path));
        }
    }

    if foreign_files.is_empty() {
        Ok(GuardState::PopulatedGenerated {
            generated_files: files.len(),
        })
    } else {
        Ok(GuardState::PopulatedForeign { foreign_files })
    }
}
