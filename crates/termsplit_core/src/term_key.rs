use std::fmt;

use serde::Serialize;

/// Filesystem-safe identifier for a term: `[a-z0-9-]+`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TermKey(String);

impl TermKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn file_name(&self) -> String {
        format!("{}.md", self.0)
    }
}

impl fmt::Display for TermKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercase, turn whitespace runs and `/` into `-`, drop everything outside `[a-z0-9-]`.
/// Returns `None` when nothing survives.
pub fn sanitize(head_term: &str) -> Option<TermKey> {
    let mut out = String::with_capacity(head_term.len());
    let mut in_whitespace = false;
    for ch in head_term.trim().to_lowercase().chars() {
        if ch.is_whitespace() {
            if !in_whitespace {
                out.push('-');
            }
            in_whitespace = true;
            continue;
        }
        in_whitespace = false;
        match ch {
            '/' | '-' => out.push('-'),
            'a'..='z' | '0'..='9' => out.push(ch),
            _ => {}
        }
    }
    if out.is_empty() {
        None
    } else {
        Some(TermKey(out))
    }
}
