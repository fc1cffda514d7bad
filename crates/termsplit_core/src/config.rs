use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MANIFEST_FILE: &str = "specs.json";
pub const DEFAULT_ANCHOR_ENTRY: &str = "terms-and-definitions-intro.md";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct TermsplitConfig {
    #[serde(default)]
    pub migrate: MigrateSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct MigrateSection {
    pub manifest_file: Option<String>,
    pub anchor_entry: Option<String>,
}

impl TermsplitConfig {
    /// Manifest file name: env TERMSPLIT_MANIFEST > config > DEFAULT_MANIFEST_FILE.
    pub fn manifest_file(&self) -> String {
        self.manifest_file_with_lookup(|key| env::var(key).ok())
    }

    /// Anchor entry: env TERMSPLIT_ANCHOR > config > DEFAULT_ANCHOR_ENTRY.
    pub fn anchor_entry(&self) -> String {
        self.anchor_entry_with_lookup(|key| env::var(key).ok())
    }

    fn manifest_file_with_lookup<F>(&self, lookup_env: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        non_empty(lookup_env("TERMSPLIT_MANIFEST"))
            .or_else(|| self.migrate.manifest_file.clone())
            .unwrap_or_else(|| DEFAULT_MANIFEST_FILE.to_string())
    }

    fn anchor_entry_with_lookup<F>(&self, lookup_env: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        non_empty(lookup_env("TERMSPLIT_ANCHOR"))
            .or_else(|| self.migrate.anchor_entry.clone())
            .unwrap_or_else(|| DEFAULT_ANCHOR_ENTRY.to_string())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    let value = value?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Load and parse the TOML config. Returns defaults if the file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<TermsplitConfig> {
    if !config_path.exists() {
        return Ok(TermsplitConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: TermsplitConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}
