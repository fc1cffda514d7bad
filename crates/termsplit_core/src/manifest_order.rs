//! Ordered-list surgery on `markdown_paths`.
//!
//! A dissolved source document leaves the list; its intro companion goes right
//! before the anchor entry and its trailing companion right after it. Every
//! insertion checks for an identical entry first, so re-running changes nothing.

use anyhow::Result;
use serde::Serialize;
use similar::TextDiff;

use crate::manifest::Manifest;
use crate::report::MessageLog;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompanionEntries {
    pub intro: Option<String>,
    pub trailing: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderChange {
    pub removed_source: bool,
    pub inserted: Vec<String>,
    pub entries: Vec<String>,
}

impl OrderChange {
    pub fn changed(&self) -> bool {
        self.removed_source || !self.inserted.is_empty()
    }
}

pub fn plan_order(
    entries: &[String],
    source: &str,
    companions: &CompanionEntries,
    anchor: &str,
) -> OrderChange {
    let mut out = entries.to_vec();
    let before = out.len();
    out.retain(|entry| entry != source);
    let removed_source = out.len() != before;
    let mut inserted = Vec::new();

    if let Some(intro) = &companions.intro
        && !out.contains(intro)
    {
        match out.iter().position(|entry| entry == anchor) {
            Some(index) => out.insert(index, intro.clone()),
            None => out.push(intro.clone()),
        }
        inserted.push(intro.clone());
    }

    if let Some(trailing) = &companions.trailing
        && !out.contains(trailing)
    {
        match out.iter().position(|entry| entry == anchor) {
            Some(index) => out.insert(index + 1, trailing.clone()),
            None => out.push(trailing.clone()),
        }
        inserted.push(trailing.clone());
    }

    OrderChange {
        removed_source,
        inserted,
        entries: out,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ManifestUpdateReport {
    pub dry_run: bool,
    pub changed: bool,
    pub written: bool,
    pub removed_source: bool,
    pub inserted: Vec<String>,
    /// Unified diff of the manifest file; empty when nothing changes.
    pub diff: String,
}

/// Apply [`plan_order`] to the manifest and persist it when anything changed.
pub fn update_manifest_order(
    manifest: &mut Manifest,
    source: &str,
    companions: &CompanionEntries,
    anchor: &str,
    dry_run: bool,
    log: &mut MessageLog,
) -> Result<ManifestUpdateReport> {
    let change = plan_order(&manifest.markdown_paths, source, companions, anchor);
    if !change.changed() {
        log.info(format!(
            "manifest already in order for {source}; nothing to update"
        ));
        return Ok(ManifestUpdateReport {
            dry_run,
            changed: false,
            written: false,
            removed_source: false,
            inserted: Vec::new(),
            diff: String::new(),
        });
    }

    let before = manifest.render()?;
    manifest.set_markdown_paths(change.entries.clone());
    let after = manifest.render()?;
    let diff = TextDiff::from_lines(&before, &after)
        .unified_diff()
        .context_radius(2)
        .header("manifest (before)", "manifest (after)")
        .to_string();

    if change.removed_source {
        log.info(format!("manifest: removed {source}"));
    }
    for entry in &change.inserted {
        log.info(format!("manifest: inserted {entry} next to {anchor}"));
    }

    if !dry_run {
        manifest.save()?;
    }

    Ok(ManifestUpdateReport {
        dry_run,
        changed: true,
        written: !dry_run,
        removed_source: change.removed_source,
        inserted: change.inserted,
        diff,
    })
}
