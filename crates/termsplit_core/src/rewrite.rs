use std::fs;
use std::ops::Range;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::filesystem::absolute_from_relative;
use crate::report::MessageLog;
use crate::scanner::scan_blocks;
use crate::term_key::sanitize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub range: Range<usize>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentRewrite {
    pub document: String,
    pub conversions: usize,
    pub written: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RewriteOutcome {
    pub documents: Vec<DocumentRewrite>,
    pub files_processed: usize,
    pub conversions: usize,
}

/// Inline references for every block in `source`, in document order. Blocks
/// whose term has no usable key stay in place since no term file backs them.
pub fn plan_replacements(source: &str, document: &str, log: &mut MessageLog) -> Vec<Replacement> {
    scan_blocks(source)
        .into_iter()
        .filter_map(|block| {
            if sanitize(&block.head_term).is_none() {
                log.warn(format!(
                    "{document}: left `{}` in place, its term yields no usable key",
                    block.source_text(source).lines().next().unwrap_or_default()
                ));
                return None;
            }
            Some(Replacement {
                text: block.inline_reference(),
                range: block.range,
            })
        })
        .collect()
}

/// Splice replacements back to front so earlier ranges stay valid.
pub fn apply_replacements(source: &str, replacements: &[Replacement]) -> String {
    let mut ordered = replacements.iter().collect::<Vec<_>>();
    ordered.sort_by(|left, right| right.range.start.cmp(&left.range.start));
    let mut output = source.to_string();
    for replacement in ordered {
        output.replace_range(replacement.range.clone(), &replacement.text);
    }
    output
}

/// Rewrite each listed document under `spec_root`. Unreadable documents are
/// skipped with a warning; documents without blocks are never written.
pub fn rewrite_documents(
    spec_root: &Path,
    documents: &[String],
    dry_run: bool,
    log: &mut MessageLog,
) -> Result<RewriteOutcome> {
    let mut outcome = RewriteOutcome::default();
    for document in documents {
        let path = absolute_from_relative(spec_root, document);
        let source = match fs::read_to_string(&path) {
            Ok(source) => source,
            Err(error) => {
                log.warn(format!("skipped {document}: cannot read {} ({error})", path.display()));
                continue;
            }
        };
        outcome.files_processed += 1;

        let replacements = plan_replacements(&source, document, log);
        let conversions = replacements.len();
        let written = if conversions == 0 {
            false
        } else {
            if !dry_run {
                let rewritten = apply_replacements(&source, &replacements);
                fs::write(&path, rewritten)
                    .with_context(|| format!("failed to write {}", path.display()))?;
            }
            log.info(format!(
                "{document}: {} {conversions} definition block(s) to inline references",
                if dry_run { "would convert" } else { "converted" }
            ));
            !dry_run
        };

        outcome.conversions += conversions;
        outcome.documents.push(DocumentRewrite {
            document: document.clone(),
            conversions,
            written,
        });
    }
    Ok(outcome)
}
