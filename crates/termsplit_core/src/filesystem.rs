use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

/// Join a manifest-style relative path (`/` separated) onto `base`.
pub fn absolute_from_relative(base: &Path, relative: &str) -> PathBuf {
    let mut output = base.to_path_buf();
    for segment in relative.split(['/', '\\']) {
        if !segment.is_empty() && segment != "." {
            output.push(segment);
        }
    }
    output
}

/// Whether `candidate` (relative paths taken from `root`) stays at or below
/// `root` once `.` and `..` are folded.
pub fn is_within(root: &Path, candidate: &Path) -> bool {
    let absolute = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };
    normalize_pathbuf(&absolute).starts_with(normalize_pathbuf(root))
}

/// Whether two paths name the same location once `.` and `..` are folded.
pub fn same_location(left: &Path, right: &Path) -> bool {
    normalize_pathbuf(left) == normalize_pathbuf(right)
}

/// Reject paths that resolve outside `root` once `.` and `..` are folded.
pub fn validate_scoped_path(root: &Path, candidate: &Path) -> Result<()> {
    if is_within(root, candidate) {
        return Ok(());
    }
    let normalized = normalize_pathbuf(&root.join(candidate));
    let allowed = normalize_pathbuf(root);
    bail!(
        "path escapes scoped directory: {}\nallowed root: {}",
        display_path(&normalized),
        display_path(&allowed)
    )
}

/// Every `.md` file below `dir`, sorted by path.
pub fn list_markdown_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.with_context(|| format!("failed to walk {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("md"))
        {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// Write `content` only if `path` does not exist yet. Returns `false` when a file
/// was already there.
pub fn write_new_file(path: &Path, content: &str) -> Result<bool> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(error) if error.kind() == ErrorKind::AlreadyExists => return Ok(false),
        Err(error) => {
            return Err(error).with_context(|| format!("failed to create {}", path.display()));
        }
    };
    file.write_all(content.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(true)
}

pub fn compute_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let mut output = String::with_capacity(64);
    for byte in digest.iter() {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

pub fn relative_display(root: &Path, path: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) => display_path(rel),
        Err(_) => display_path(path),
    }
}

pub fn display_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn normalize_pathbuf(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(Path::new(std::path::MAIN_SEPARATOR_STR)),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}
