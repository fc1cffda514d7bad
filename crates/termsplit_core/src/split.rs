//! Companion fragments for a document that is dissolved into term files.
//!
//! Prose before the first block becomes `<stem>-intro.md`, prose after the last
//! block becomes `<stem>-trailing.md`. Both sit next to the source document.

use std::path::Path;

use anyhow::{Result, bail};
use serde::Serialize;

use crate::filesystem::{absolute_from_relative, display_path, write_new_file};
use crate::manifest_order::CompanionEntries;
use crate::report::MessageLog;
use crate::scanner::{inline_reference_lines, prose_layout, scan_blocks};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompanionFragment {
    pub entry: String,
    #[serde(skip)]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompanionPlan {
    pub source: String,
    pub blocks: usize,
    pub intro: Option<CompanionFragment>,
    pub trailing: Option<CompanionFragment>,
}

impl CompanionPlan {
    pub fn entries(&self) -> CompanionEntries {
        CompanionEntries {
            intro: self.intro.as_ref().map(|fragment| fragment.entry.clone()),
            trailing: self.trailing.as_ref().map(|fragment| fragment.entry.clone()),
        }
    }
}

pub fn companion_entry(source: &str, suffix: &str) -> String {
    let stem = source
        .strip_suffix(".md")
        .or_else(|| source.strip_suffix(".MD"))
        .unwrap_or(source);
    format!("{stem}-{suffix}.md")
}

/// Work out the fragments from the source text. A source whose blocks were
/// already rewritten is split around its inline-reference lines instead.
pub fn plan_companions(source: &str, text: &str, log: &mut MessageLog) -> CompanionPlan {
    let mut spans = scan_blocks(text)
        .into_iter()
        .map(|block| block.range)
        .collect::<Vec<_>>();
    if spans.is_empty() {
        spans = inline_reference_lines(text);
        if !spans.is_empty() {
            log.info(format!(
                "{source} was already rewritten; splitting around its {} inline reference(s)",
                spans.len()
            ));
        }
    }
    if spans.is_empty() {
        return CompanionPlan {
            source: source.to_string(),
            blocks: 0,
            intro: None,
            trailing: None,
        };
    }
    let layout = prose_layout(text, &spans);

    for gap in &layout.between {
        let first_line = gap.trim().lines().next().unwrap_or_default();
        log.warn(format!(
            "{source}: prose between definition blocks is not carried into a companion (starts with {first_line:?})"
        ));
    }

    CompanionPlan {
        source: source.to_string(),
        blocks: spans.len(),
        intro: fragment(companion_entry(source, "intro"), layout.leading),
        trailing: fragment(companion_entry(source, "trailing"), layout.trailing),
    }
}

fn fragment(entry: String, prose: &str) -> Option<CompanionFragment> {
    let trimmed = prose.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(CompanionFragment {
        entry,
        content: format!("{trimmed}\n"),
    })
}

/// Write the fragments under `spec_root`. An existing fragment file is kept and
/// still returned as a manifest entry.
pub fn write_companions(
    plan: &CompanionPlan,
    spec_root: &Path,
    dry_run: bool,
    log: &mut MessageLog,
) -> Result<CompanionEntries> {
    for fragment in [&plan.intro, &plan.trailing].into_iter().flatten() {
        let target = absolute_from_relative(spec_root, &fragment.entry);
        if target.exists() && !target.is_file() {
            bail!(
                "companion {} cannot be written: {} is not a regular file",
                fragment.entry,
                display_path(&target)
            );
        }
        let created = if dry_run {
            !target.exists()
        } else {
            write_new_file(&target, &fragment.content)?
        };
        if created {
            log.info(format!(
                "{} companion {} from {}",
                if dry_run { "would create" } else { "created" },
                fragment.entry,
                plan.source
            ));
        } else {
            log.info(format!("companion {} already exists; kept", fragment.entry));
        }
    }
    Ok(plan.entries())
}
