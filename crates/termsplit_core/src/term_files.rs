use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use serde::Serialize;

use crate::filesystem::{compute_hash, write_new_file};
use crate::report::MessageLog;
use crate::term_key::TermKey;

/// One definition occurrence, in scan order.
#[derive(Debug, Clone)]
pub struct TermCandidate {
    pub key: TermKey,
    pub head_term: String,
    pub definition_text: String,
    pub source_document: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedTermFile {
    pub key: TermKey,
    pub file_name: String,
    pub head_term: String,
    pub source_document: String,
    pub content_hash: String,
    #[serde(skip)]
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateKind {
    /// Same key, byte-identical definition text.
    Identical,
    /// Same key, different definition text; the later one is dropped.
    Conflicting,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateTerm {
    pub key: TermKey,
    pub head_term: String,
    pub kept_from: String,
    pub duplicate_in: String,
    pub kind: DuplicateKind,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TermWritePlan {
    pub files: Vec<PlannedTermFile>,
    pub duplicates: Vec<DuplicateTerm>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TermWriteOutcome {
    /// File names written (or that would be written under dry-run).
    pub created: Vec<String>,
    /// File names left alone because they already existed.
    pub kept_existing: Vec<String>,
}

/// Decide which candidates become files. The first occurrence of a key wins.
pub fn plan_term_files<I>(candidates: I, log: &mut MessageLog) -> TermWritePlan
where
    I: IntoIterator<Item = TermCandidate>,
{
    let mut plan = TermWritePlan::default();
    let mut first_seen: HashMap<TermKey, usize> = HashMap::new();

    for candidate in candidates {
        let content_hash = compute_hash(&candidate.definition_text);
        if let Some(&index) = first_seen.get(&candidate.key) {
            let kept = &plan.files[index];
            let kind = if kept.content_hash == content_hash {
                DuplicateKind::Identical
            } else {
                DuplicateKind::Conflicting
            };
            log.warn(format!(
                "duplicate definition for `{}` ({}) in {}; keeping the one from {}{}",
                candidate.head_term,
                candidate.key,
                candidate.source_document,
                kept.source_document,
                if kind == DuplicateKind::Identical {
                    " (identical text)"
                } else {
                    " (text differs)"
                }
            ));
            plan.duplicates.push(DuplicateTerm {
                key: candidate.key,
                head_term: candidate.head_term,
                kept_from: kept.source_document.clone(),
                duplicate_in: candidate.source_document,
                kind,
            });
            continue;
        }

        first_seen.insert(candidate.key.clone(), plan.files.len());
        plan.files.push(PlannedTermFile {
            file_name: candidate.key.file_name(),
            key: candidate.key,
            head_term: candidate.head_term,
            source_document: candidate.source_document,
            content_hash,
            content: candidate.definition_text,
        });
    }

    plan
}

/// Persist planned files under `terms_dir`. Existing files are never overwritten.
/// With `dry_run` the same decisions are reported and nothing is written.
pub fn write_term_files(
    plan: &TermWritePlan,
    terms_dir: &Path,
    dry_run: bool,
    log: &mut MessageLog,
) -> Result<TermWriteOutcome> {
    let mut outcome = TermWriteOutcome::default();
    for file in &plan.files {
        let target = terms_dir.join(&file.file_name);
        let written = if dry_run {
            !target.exists()
        } else {
            write_new_file(&target, &file.content)?
        };

        if written {
            log.info(format!(
                "{} {} (from {})",
                if dry_run { "would create" } else { "created" },
                file.file_name,
                file.source_document
            ));
            outcome.created.push(file.file_name.clone());
        } else {
            log.warn(format!(
                "kept existing {}; a term file is never overwritten",
                file.file_name
            ));
            outcome.kept_existing.push(file.file_name.clone());
        }
    }
    Ok(outcome)
}
