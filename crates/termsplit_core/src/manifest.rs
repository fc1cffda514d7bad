//! The `specs.json` manifest: which documents make up the specification, in
//! render order, and where their term files live.
//!
//! Only `specs[0]` is consulted. The document is kept as a raw JSON value so a
//! write touches `markdown_paths` and nothing else.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;

use crate::error::MigrateError;
use crate::filesystem::absolute_from_relative;
use crate::report::MessageLog;

const PLACEHOLDER_VALUES: &[&str] = &["spec_terms_directory", "todo", "placeholder", "tbd"];

#[derive(Debug, Clone)]
pub struct Manifest {
    pub path: PathBuf,
    pub spec_directory: String,
    pub terms_directory: String,
    pub markdown_paths: Vec<String>,
    document: Value,
}

impl Manifest {
    /// Directory that `markdown_paths` entries are relative to.
    pub fn spec_root(&self, project_root: &Path) -> PathBuf {
        absolute_from_relative(project_root, &self.spec_directory)
    }

    /// Output directory for term files; `spec_terms_directory` is relative to the spec root.
    pub fn terms_root(&self, project_root: &Path) -> PathBuf {
        absolute_from_relative(&self.spec_root(project_root), &self.terms_directory)
    }

    /// Entries in manifest order with repeats dropped (and reported).
    pub fn unique_documents(&self, log: &mut MessageLog) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(self.markdown_paths.len());
        for entry in &self.markdown_paths {
            if seen.insert(entry.as_str()) {
                out.push(entry.clone());
            } else {
                log.warn(format!(
                    "manifest lists {entry} more than once; processing it once"
                ));
            }
        }
        out
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.markdown_paths.iter().any(|item| item == entry)
    }

    /// Replace the ordered document list, leaving every other field alone.
    pub fn set_markdown_paths(&mut self, entries: Vec<String>) {
        if let Some(spec) = self
            .document
            .get_mut("specs")
            .and_then(Value::as_array_mut)
            .and_then(|specs| specs.first_mut())
            .and_then(Value::as_object_mut)
        {
            spec.insert(
                "markdown_paths".to_string(),
                Value::Array(entries.iter().cloned().map(Value::String).collect()),
            );
        }
        self.markdown_paths = entries;
    }

    pub fn render(&self) -> Result<String> {
        let mut rendered =
            serde_json::to_string_pretty(&self.document).context("failed to serialize manifest")?;
        rendered.push('\n');
        Ok(rendered)
    }

    pub fn save(&self) -> Result<()> {
        let rendered = self.render()?;
        fs::write(&self.path, rendered)
            .with_context(|| format!("failed to write {}", self.path.display()))
    }
}

pub fn load_manifest(path: &Path) -> Result<Manifest> {
    let content = fs::read_to_string(path).map_err(|error| {
        MigrateError::configuration(format!("cannot read manifest {}: {error}", path.display()))
    })?;
    let document: Value = serde_json::from_str(&content).map_err(|error| {
        MigrateError::configuration(format!("manifest {} is not valid JSON: {error}", path.display()))
    })?;

    let spec = document
        .get("specs")
        .and_then(Value::as_array)
        .and_then(|specs| specs.first())
        .and_then(Value::as_object)
        .ok_or_else(|| {
            MigrateError::configuration(format!(
                "manifest {} has no `specs` entries",
                path.display()
            ))
        })?;

    let spec_directory = required_string(spec, "spec_directory", path)?;
    let terms_directory = required_string(spec, "spec_terms_directory", path)?;
    if is_placeholder(&terms_directory) {
        return Err(MigrateError::configuration(format!(
            "`spec_terms_directory` in {} is still a placeholder ({terms_directory:?}); set it to the directory that should hold term files",
            path.display()
        ))
        .into());
    }

    let markdown_paths = match spec.get("markdown_paths") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    MigrateError::configuration(format!(
                        "`markdown_paths` in {} must only hold strings",
                        path.display()
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?,
        _ => {
            return Err(MigrateError::configuration(format!(
                "manifest {} is missing `markdown_paths`",
                path.display()
            ))
            .into());
        }
    };

    Ok(Manifest {
        path: path.to_path_buf(),
        spec_directory,
        terms_directory,
        markdown_paths,
        document,
    })
}

fn required_string(
    spec: &serde_json::Map<String, Value>,
    key: &str,
    path: &Path,
) -> Result<String, MigrateError> {
    spec.get(key)
        .and_then(Value::as_str)
        .map(|value| value.trim().to_string())
        .ok_or_else(|| {
            MigrateError::configuration(format!(
                "manifest {} is missing `{key}`",
                path.display()
            ))
        })
}

fn is_placeholder(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty()
        || (trimmed.starts_with('<') && trimmed.ends_with('>'))
        || PLACEHOLDER_VALUES
            .iter()
            .any(|placeholder| trimmed.eq_ignore_ascii_case(placeholder))
}
