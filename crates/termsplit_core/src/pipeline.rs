//! The caller-facing operations.
//!
//! `Init -> GuardCheck -> {Abort | AlreadyDone | Proceed} -> Scan -> ExtractWrite
//! -> RewriteSources -> UpdateManifest -> Done`. Extraction and rewriting each
//! scan the documents on their own so either can run standalone. Nothing is
//! rolled back: a failure after extraction committed is a `PartialFailure`.

use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;

use crate::config::{DEFAULT_ANCHOR_ENTRY, DEFAULT_MANIFEST_FILE, TermsplitConfig};
use crate::error::{MigrateError, Phase};
use crate::filesystem::{
    absolute_from_relative, display_path, is_within, same_location, validate_scoped_path,
};
use crate::guard::{GuardState, GuardVerdict, inspect_terms_directory};
use crate::manifest::{Manifest, load_manifest};
use crate::manifest_order::{CompanionEntries, ManifestUpdateReport, update_manifest_order};
use crate::report::MessageLog;
use crate::rewrite::{DocumentRewrite, rewrite_documents};
use crate::runtime::ResolvedPaths;
use crate::scanner::{count_inline_references, scan_blocks};
use crate::split::{CompanionPlan, plan_companions, write_companions};
use crate::term_files::{DuplicateTerm, TermCandidate, plan_term_files, write_term_files};
use crate::term_key::sanitize;

#[derive(Debug, Clone)]
pub struct MigrateOptions {
    pub dry_run: bool,
    pub manifest_file: String,
    pub anchor_entry: String,
    /// Manifest document to dissolve into term files and companion fragments.
    pub split_source: Option<String>,
}

impl Default for MigrateOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            manifest_file: DEFAULT_MANIFEST_FILE.to_string(),
            anchor_entry: DEFAULT_ANCHOR_ENTRY.to_string(),
            split_source: None,
        }
    }
}

impl MigrateOptions {
    pub fn from_config(config: &TermsplitConfig) -> Self {
        Self {
            manifest_file: config.manifest_file(),
            anchor_entry: config.anchor_entry(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentScan {
    pub document: String,
    pub readable: bool,
    pub blocks: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractReport {
    pub dry_run: bool,
    pub terms_directory: String,
    pub guard: GuardState,
    pub verdict: GuardVerdict,
    pub definitions_found: usize,
    pub skipped_blocks: usize,
    pub files_created: Vec<String>,
    pub kept_existing: Vec<String>,
    pub duplicates: Vec<DuplicateTerm>,
    pub documents: Vec<DocumentScan>,
    pub messages: MessageLog,
}

impl ExtractReport {
    pub fn already_done(&self) -> bool {
        self.verdict == GuardVerdict::AlreadyDone
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RewriteReport {
    pub dry_run: bool,
    pub files_processed: usize,
    pub conversions: usize,
    pub documents: Vec<DocumentRewrite>,
    pub messages: MessageLog,
}

#[derive(Debug, Clone, Serialize)]
pub struct SplitReport {
    pub source: String,
    pub companions: CompanionEntries,
    pub manifest: ManifestUpdateReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub dry_run: bool,
    pub extract: ExtractReport,
    pub rewrite: RewriteReport,
    pub split: Option<SplitReport>,
    pub messages: MessageLog,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentStatus {
    pub document: String,
    pub exists: bool,
    pub definition_blocks: usize,
    pub inline_references: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub manifest_path: String,
    pub spec_directory: String,
    pub terms_directory: String,
    pub anchor_entry: String,
    pub anchor_listed: bool,
    pub guard: GuardState,
    pub verdict: GuardVerdict,
    pub documents: Vec<DocumentStatus>,
    pub messages: MessageLog,
}

struct Workspace {
    manifest: Manifest,
    spec_root: PathBuf,
    terms_root: PathBuf,
}

fn open_workspace(paths: &ResolvedPaths, options: &MigrateOptions) -> Result<Workspace> {
    let manifest_path = absolute_from_relative(&paths.project_root, &options.manifest_file);
    let manifest = load_manifest(&manifest_path)?;
    let spec_root = manifest.spec_root(&paths.project_root);
    let terms_root = manifest.terms_root(&paths.project_root);
    let scopes = [
        ("spec_directory", &paths.project_root, &spec_root),
        ("spec_terms_directory", &spec_root, &terms_root),
    ];
    for (field, root, dir) in scopes {
        validate_scoped_path(root, dir).map_err(|error| {
            MigrateError::configuration(format!("`{field}` leaves its parent directory: {error}"))
        })?;
    }
    if same_location(&spec_root, &terms_root) {
        return Err(MigrateError::configuration(format!(
            "`spec_terms_directory` resolves to the spec directory itself ({}); term files need a directory of their own",
            display_path(&terms_root)
        ))
        .into());
    }
    for entry in &manifest.markdown_paths {
        let document = absolute_from_relative(&spec_root, entry);
        if !is_within(&spec_root, &document) {
            return Err(MigrateError::configuration(format!(
                "`markdown_paths` entry {entry} leaves `spec_directory` ({})",
                display_path(&spec_root)
            ))
            .into());
        }
        if is_within(&terms_root, &document) {
            return Err(MigrateError::configuration(format!(
                "`markdown_paths` entry {entry} lies inside the terms directory {}; source documents and term files must not share it",
                display_path(&terms_root)
            ))
            .into());
        }
    }
    Ok(Workspace {
        manifest,
        spec_root,
        terms_root,
    })
}

/// Extract every definition block of every manifest document into term files.
pub fn scan_and_extract(paths: &ResolvedPaths, options: &MigrateOptions) -> Result<ExtractReport> {
    let mut log = MessageLog::new();
    let workspace = open_workspace(paths, options)?;
    let terms_directory = display_path(&workspace.terms_root);

    let guard = inspect_terms_directory(&workspace.terms_root)?;
    let verdict = guard.verdict();
    log.info(format!(
        "terms directory {terms_directory}: {} ({})",
        guard.as_str(),
        verdict.as_str()
    ));

    let mut report = ExtractReport {
        dry_run: options.dry_run,
        terms_directory,
        guard,
        verdict,
        definitions_found: 0,
        skipped_blocks: 0,
        files_created: Vec::new(),
        kept_existing: Vec::new(),
        duplicates: Vec::new(),
        documents: Vec::new(),
        messages: MessageLog::new(),
    };

    match verdict {
        GuardVerdict::Unsafe => {
            let foreign_files = match &report.guard {
                GuardState::PopulatedForeign { foreign_files } => foreign_files.clone(),
                _ => Vec::new(),
            };
            return Err(MigrateError::UnsafeOutputState {
                directory: report.terms_directory,
                foreign_files,
            }
            .into());
        }
        GuardVerdict::AlreadyDone => {
            log.info("term files from an earlier run are present; extraction skipped");
            report.messages = log;
            return Ok(report);
        }
        GuardVerdict::SafeToCreate | GuardVerdict::Safe => {}
    }

    let mut candidates = Vec::new();
    for document in workspace.manifest.unique_documents(&mut log) {
        let path = absolute_from_relative(&workspace.spec_root, &document);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(error) => {
                log.warn(format!(
                    "skipped {document}: cannot read {} ({error})",
                    path.display()
                ));
                report.documents.push(DocumentScan {
                    document,
                    readable: false,
                    blocks: 0,
                });
                continue;
            }
        };

        let blocks = scan_blocks(&text);
        report.definitions_found += blocks.len();
        for block in &blocks {
            let Some(key) = sanitize(&block.head_term) else {
                report.skipped_blocks += 1;
                log.warn(format!(
                    "{document}: skipped definition `{}`, its term yields no usable file name",
                    block.head_term
                ));
                continue;
            };
            candidates.push(TermCandidate {
                key,
                head_term: block.head_term.clone(),
                definition_text: block.definition_text(&text),
                source_document: document.clone(),
            });
        }
        tracing::debug!(document = %document, blocks = blocks.len(), "scanned document");
        log.info(format!("{document}: {} definition block(s)", blocks.len()));
        report.documents.push(DocumentScan {
            document,
            readable: true,
            blocks: blocks.len(),
        });
    }

    let plan = plan_term_files(candidates, &mut log);
    let outcome = write_term_files(&plan, &workspace.terms_root, options.dry_run, &mut log)?;
    log.info(format!(
        "{} {} term file(s) from {} definition(s), {} duplicate(s)",
        if options.dry_run { "would create" } else { "created" },
        outcome.created.len(),
        report.definitions_found,
        plan.duplicates.len()
    ));

    report.files_created = outcome.created;
    report.kept_existing = outcome.kept_existing;
    report.duplicates = plan.duplicates;
    report.messages = log;
    Ok(report)
}

/// Replace every definition block in the manifest documents with an inline reference.
pub fn rewrite_to_iref(paths: &ResolvedPaths, options: &MigrateOptions) -> Result<RewriteReport> {
    let mut log = MessageLog::new();
    let workspace = open_workspace(paths, options)?;
    let documents = workspace.manifest.unique_documents(&mut log);
    let outcome = rewrite_documents(&workspace.spec_root, &documents, options.dry_run, &mut log)?;
    log.info(format!(
        "{} {} definition block(s) across {} document(s)",
        if options.dry_run { "would convert" } else { "converted" },
        outcome.conversions,
        outcome.files_processed
    ));
    Ok(RewriteReport {
        dry_run: options.dry_run,
        files_processed: outcome.files_processed,
        conversions: outcome.conversions,
        documents: outcome.documents,
        messages: log,
    })
}

/// Extraction, then rewriting, then (with a split source) companions and
/// manifest ordering. The split source is read and planned before anything is
/// written, and a fatal extraction error stops before anything else runs.
pub fn run_both(paths: &ResolvedPaths, options: &MigrateOptions) -> Result<RunReport> {
    let mut log = MessageLog::new();
    let split_plan = match &options.split_source {
        Some(source) => prepare_split(paths, options, source, &mut log)?,
        None => None,
    };

    let extract = scan_and_extract(paths, options)?;
    log.extend(&extract.messages);

    let rewrite = rewrite_to_iref(paths, options)
        .map_err(|error| partial_failure(Phase::Extract, Phase::Rewrite, error))?;
    log.extend(&rewrite.messages);

    let split = match split_plan {
        Some(plan) => {
            let mut split_log = MessageLog::new();
            let report = finish_split(paths, options, &plan, &mut split_log)
                .map_err(|error| partial_failure(Phase::Rewrite, Phase::UpdateManifest, error))?;
            log.extend(&split_log);
            Some(report)
        }
        None => None,
    };

    Ok(RunReport {
        dry_run: options.dry_run,
        extract,
        rewrite,
        split,
        messages: log,
    })
}

fn partial_failure(completed: Phase, failed: Phase, error: anyhow::Error) -> anyhow::Error {
    MigrateError::PartialFailure {
        completed,
        failed,
        reason: format!("{error:#}"),
    }
    .into()
}

/// Capture companion text from the source before the rewrite touches it.
/// Read-only; an unreadable source is a configuration error.
fn prepare_split(
    paths: &ResolvedPaths,
    options: &MigrateOptions,
    source: &str,
    log: &mut MessageLog,
) -> Result<Option<CompanionPlan>> {
    let workspace = open_workspace(paths, options)?;
    if !workspace.manifest.contains(source) {
        log.info(format!(
            "{source} is not listed in the manifest; nothing to split"
        ));
        return Ok(None);
    }
    let path = absolute_from_relative(&workspace.spec_root, source);
    let text = fs::read_to_string(&path).map_err(|error| {
        MigrateError::configuration(format!(
            "split source {source} cannot be read from {}: {error}",
            path.display()
        ))
    })?;
    let plan = plan_companions(source, &text, log);
    if plan.blocks == 0 {
        log.warn(format!(
            "{source} holds no definition blocks; leaving it in the manifest"
        ));
        return Ok(None);
    }
    Ok(Some(plan))
}

fn finish_split(
    paths: &ResolvedPaths,
    options: &MigrateOptions,
    plan: &CompanionPlan,
    log: &mut MessageLog,
) -> Result<SplitReport> {
    let mut workspace = open_workspace(paths, options)?;
    for entry in [&plan.intro, &plan.trailing].into_iter().flatten() {
        validate_scoped_path(
            &workspace.spec_root,
            &absolute_from_relative(&workspace.spec_root, &entry.entry),
        )?;
    }
    let companions = write_companions(plan, &workspace.spec_root, options.dry_run, log)?;
    let manifest = update_manifest_order(
        &mut workspace.manifest,
        &plan.source,
        &companions,
        &options.anchor_entry,
        options.dry_run,
        log,
    )?;
    Ok(SplitReport {
        source: plan.source.clone(),
        companions,
        manifest,
    })
}

/// Read-only overview of the manifest, its documents and the terms directory.
pub fn inspect_project(paths: &ResolvedPaths, options: &MigrateOptions) -> Result<StatusReport> {
    let mut log = MessageLog::new();
    let workspace = open_workspace(paths, options)?;
    let guard = inspect_terms_directory(&workspace.terms_root)?;
    let verdict = guard.verdict();

    let mut documents = Vec::new();
    for document in workspace.manifest.unique_documents(&mut log) {
        let path = absolute_from_relative(&workspace.spec_root, &document);
        let status = match fs::read_to_string(&path) {
            Ok(text) => DocumentStatus {
                exists: true,
                definition_blocks: scan_blocks(&text).len(),
                inline_references: count_inline_references(&text),
                document,
            },
            Err(error) => {
                log.warn(format!("{document}: cannot read {} ({error})", path.display()));
                DocumentStatus {
                    document,
                    exists: false,
                    definition_blocks: 0,
                    inline_references: 0,
                }
            }
        };
        documents.push(status);
    }

    let anchor_listed = workspace.manifest.contains(&options.anchor_entry);
    if !anchor_listed {
        log.info(format!(
            "anchor entry {} is not listed; companions would be appended",
            options.anchor_entry
        ));
    }

    Ok(StatusReport {
        manifest_path: display_path(&workspace.manifest.path),
        spec_directory: display_path(&workspace.spec_root),
        terms_directory: display_path(&workspace.terms_root),
        anchor_entry: options.anchor_entry.clone(),
        anchor_listed,
        guard,
        verdict,
        documents,
        messages: log,
    })
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::{TempDir, tempdir};

    use super::*;

    const GLOSSARY: &str = "# Glossary\n\nThese terms apply throughout.\n\n[[def: Holder]]\n~ Holds credentials.\n\n[[def: Issuer]]\n~ Issues credentials.\n\n## Notes\n\nSee the appendix.\n";

    const INTRO: &str =
        "Intro text\n\n[[def: term one, alias]]\n~ Definition body.\n\nMore prose.";

    struct Fixture {
        _temp: TempDir,
        paths: ResolvedPaths,
    }

    impl Fixture {
        fn new(markdown_paths: &[&str], documents: &[(&str, &str)]) -> Self {
            let temp = tempdir().expect("tempdir");
            let root = temp.path().join("project");
            fs::create_dir_all(root.join("spec")).expect("create spec dir");
            let manifest = serde_json::json!({
                "specs": [{
                    "title": "Fixture spec",
                    "spec_directory": "./spec",
                    "spec_terms_directory": "terms-definitions",
                    "output_path": "./docs",
                    "markdown_paths": markdown_paths,
                }]
            });
            fs::write(
                root.join("specs.json"),
                serde_json::to_string_pretty(&manifest).expect("json"),
            )
            .expect("write manifest");
            for (name, content) in documents {
                write_file(&root.join("spec").join(name), content);
            }
            Self {
                _temp: temp,
                paths: ResolvedPaths::for_project(root),
            }
        }

        fn spec(&self, name: &str) -> PathBuf {
            self.paths.project_root.join("spec").join(name)
        }

        fn terms_dir(&self) -> PathBuf {
            self.spec("terms-definitions")
        }

        fn read(&self, name: &str) -> String {
            fs::read_to_string(self.spec(name)).expect("read spec file")
        }

        fn term_files(&self) -> Vec<String> {
            let Ok(entries) = fs::read_dir(self.terms_dir()) else {
                return Vec::new();
            };
            let mut names = entries
                .flatten()
                .map(|entry| entry.file_name().to_string_lossy().to_string())
                .collect::<Vec<_>>();
            names.sort();
            names
        }

        fn edit_manifest(&self, from: &str, to: &str) {
            let manifest_path = self.paths.project_root.join("specs.json");
            let text = fs::read_to_string(&manifest_path)
                .expect("read manifest")
                .replace(from, to);
            fs::write(manifest_path, text).expect("write manifest");
        }

        fn markdown_paths(&self) -> Vec<String> {
            load_manifest(&self.paths.project_root.join("specs.json"))
                .expect("manifest")
                .markdown_paths
        }
    }

    fn write_file(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(path, content).expect("write");
    }

    fn options(dry_run: bool) -> MigrateOptions {
        MigrateOptions {
            dry_run,
            ..MigrateOptions::default()
        }
    }

    #[test]
    fn end_to_end_scenario() {
        let fixture = Fixture::new(&["intro.md"], &[("intro.md", INTRO)]);
        fs::create_dir_all(fixture.terms_dir()).expect("empty terms dir");

        let extract = scan_and_extract(&fixture.paths, &options(false)).expect("extract");
        assert_eq!(extract.guard, GuardState::Empty);
        assert_eq!(extract.files_created, vec!["term-one.md"]);
        assert_eq!(
            fs::read_to_string(fixture.terms_dir().join("term-one.md")).expect("term file"),
            "[[def: term one, alias]]\n~ Definition body.\n"
        );
        assert_eq!(fixture.read("intro.md"), INTRO);

        let rewrite = rewrite_to_iref(&fixture.paths, &options(false)).expect("rewrite");
        assert_eq!(rewrite.conversions, 1);
        assert_eq!(
            fixture.read("intro.md"),
            "Intro text\n\n[[iref: term one]]\n\nMore prose."
        );
    }

    #[test]
    fn block_count_before_and_after_duplicate_collapse() {
        let fixture = Fixture::new(
            &["a.md", "b.md"],
            &[
                ("a.md", "[[def: Alpha]]\n~ a\n\n[[def: Beta]]\n~ b\n\n[[def: OAuth 2.0]]\n~ o\n"),
                ("b.md", "Prose.\n\n[[def: alpha, A]]\n~ other alpha\n\n[[def: Test/Term]]\n"),
            ],
        );

        let report = scan_and_extract(&fixture.paths, &options(false)).expect("extract");
        assert_eq!(report.definitions_found, 5);
        assert_eq!(report.documents[0].blocks, 3);
        assert_eq!(report.documents[1].blocks, 2);
        assert_eq!(report.files_created.len(), 4);
        assert_eq!(
            fixture.term_files(),
            vec!["alpha.md", "beta.md", "oauth-20.md", "test-term.md"]
        );
        assert_eq!(report.duplicates.len(), 1);
        assert_eq!(report.duplicates[0].kept_from, "a.md");
        assert_eq!(report.duplicates[0].duplicate_in, "b.md");
        assert_eq!(
            fs::read_to_string(fixture.terms_dir().join("alpha.md")).expect("alpha"),
            "[[def: Alpha]]\n~ a\n"
        );
    }

    #[test]
    fn round_trip_drops_aliases_and_keeps_casing() {
        let fixture = Fixture::new(
            &["ac.md"],
            &[("ac.md", "[[def: Access Control, AC]]\n~ Restricting access.\n")],
        );
        let report = run_both(&fixture.paths, &options(false)).expect("run");
        assert_eq!(report.extract.files_created, vec!["access-control.md"]);
        assert_eq!(fixture.read("ac.md"), "[[iref: Access Control]]\n");
    }

    #[test]
    fn second_run_is_idempotent() {
        let fixture = Fixture::new(
            &["intro.md", "more.md"],
            &[("intro.md", INTRO), ("more.md", "[[def: Other]]\n~ x\n")],
        );
        let first = run_both(&fixture.paths, &options(false)).expect("first");
        assert_eq!(first.extract.files_created.len(), 2);
        assert_eq!(first.rewrite.conversions, 2);
        let files_after_first = fixture.term_files();
        let intro_after_first = fixture.read("intro.md");

        let second = run_both(&fixture.paths, &options(false)).expect("second");
        assert!(second.extract.already_done());
        assert!(second.extract.files_created.is_empty());
        assert_eq!(second.rewrite.conversions, 0);
        assert_eq!(fixture.term_files(), files_after_first);
        assert_eq!(fixture.read("intro.md"), intro_after_first);
    }

    #[test]
    fn dry_run_matches_following_real_run() {
        let fixture = Fixture::new(
            &["a.md", "b.md"],
            &[
                ("a.md", "[[def: One]]\n~ 1\n\n[[def: Two]]\n"),
                ("b.md", "[[def: one]]\n~ dup\n\nplain\n"),
            ],
        );

        let preview = run_both(&fixture.paths, &options(true)).expect("dry run");
        assert!(fixture.term_files().is_empty());
        assert!(!fixture.terms_dir().exists());
        assert_eq!(fixture.read("a.md"), "[[def: One]]\n~ 1\n\n[[def: Two]]\n");

        let real = run_both(&fixture.paths, &options(false)).expect("real run");
        assert_eq!(preview.extract.files_created, real.extract.files_created);
        assert_eq!(preview.extract.duplicates, real.extract.duplicates);
        assert_eq!(preview.rewrite.conversions, real.rewrite.conversions);
        let preview_counts = preview
            .rewrite
            .documents
            .iter()
            .map(|doc| (doc.document.clone(), doc.conversions))
            .collect::<Vec<_>>();
        let real_counts = real
            .rewrite
            .documents
            .iter()
            .map(|doc| (doc.document.clone(), doc.conversions))
            .collect::<Vec<_>>();
        assert_eq!(preview_counts, real_counts);
    }

    #[test]
    fn foreign_terms_directory_aborts_without_changes() {
        let fixture = Fixture::new(&["intro.md"], &[("intro.md", INTRO)]);
        write_file(&fixture.terms_dir().join("notes.md"), "# Hand written notes\n");

        let error = scan_and_extract(&fixture.paths, &options(false)).expect_err("must abort");
        match error.downcast_ref::<MigrateError>() {
            Some(MigrateError::UnsafeOutputState { directory, foreign_files }) => {
                assert!(directory.ends_with("spec/terms-definitions"));
                assert_eq!(foreign_files, &vec!["notes.md".to_string()]);
            }
            other => panic!("expected unsafe output state, got {other:?}"),
        }
        assert_eq!(fixture.term_files(), vec!["notes.md"]);
        assert_eq!(fixture.read("intro.md"), INTRO);

        let error = run_both(&fixture.paths, &options(false)).expect_err("run aborts too");
        assert!(matches!(
            error.downcast_ref::<MigrateError>(),
            Some(MigrateError::UnsafeOutputState { .. })
        ));
        assert_eq!(fixture.read("intro.md"), INTRO);
    }

    #[test]
    fn unreadable_documents_are_skipped() {
        let fixture = Fixture::new(&["missing.md", "intro.md"], &[("intro.md", INTRO)]);
        let report = scan_and_extract(&fixture.paths, &options(false)).expect("extract");
        assert!(!report.documents[0].readable);
        assert_eq!(report.files_created, vec!["term-one.md"]);
        assert!(
            report
                .messages
                .warnings()
                .any(|message| message.text.contains("missing.md"))
        );
    }

    #[test]
    fn blocks_without_key_are_skipped_with_warning() {
        let fixture = Fixture::new(&["odd.md"], &[("odd.md", "[[def: ???]]\n~ x\n\n[[def: ok]]\n")]);
        let report = scan_and_extract(&fixture.paths, &options(false)).expect("extract");
        assert_eq!(report.definitions_found, 2);
        assert_eq!(report.skipped_blocks, 1);
        assert_eq!(report.files_created, vec!["ok.md"]);
    }

    #[test]
    fn placeholder_terms_directory_is_fatal_before_any_write() {
        let fixture = Fixture::new(&["intro.md"], &[("intro.md", INTRO)]);
        let manifest_path = fixture.paths.project_root.join("specs.json");
        let text = fs::read_to_string(&manifest_path)
            .expect("read")
            .replace("terms-definitions", "<spec_terms_directory>");
        fs::write(&manifest_path, text).expect("write");

        let error = run_both(&fixture.paths, &options(false)).expect_err("must fail");
        assert!(matches!(
            error.downcast_ref::<MigrateError>(),
            Some(MigrateError::Configuration(_))
        ));
        assert_eq!(fixture.read("intro.md"), INTRO);
    }

    #[test]
    fn terms_directory_outside_spec_directory_is_rejected() {
        let fixture = Fixture::new(&["intro.md"], &[("intro.md", INTRO)]);
        let manifest_path = fixture.paths.project_root.join("specs.json");
        let text = fs::read_to_string(&manifest_path)
            .expect("read")
            .replace("\"terms-definitions\"", "\"../terms\"");
        fs::write(&manifest_path, text).expect("write");

        let error = scan_and_extract(&fixture.paths, &options(false)).expect_err("must fail");
        assert!(error.to_string().contains("spec_terms_directory"));
    }

    #[test]
    fn split_source_reorders_manifest_exactly_once() {
        let fixture = Fixture::new(
            &[
                "intro.md",
                "glossary.md",
                "terms-and-definitions-intro.md",
                "outro.md",
            ],
            &[
                ("intro.md", "Intro only.\n"),
                ("glossary.md", GLOSSARY),
                ("terms-and-definitions-intro.md", "## Terms\n"),
                ("outro.md", "Bye.\n"),
            ],
        );
        let split = MigrateOptions {
            split_source: Some("glossary.md".to_string()),
            ..options(false)
        };

        let first = run_both(&fixture.paths, &split).expect("first run");
        assert_eq!(fixture.term_files(), vec!["holder.md", "issuer.md"]);
        let split_report = first.split.expect("split report");
        assert!(split_report.manifest.written);
        assert_eq!(
            fixture.markdown_paths(),
            vec![
                "intro.md",
                "glossary-intro.md",
                "terms-and-definitions-intro.md",
                "glossary-trailing.md",
                "outro.md"
            ]
        );
        assert_eq!(
            fixture.read("glossary-intro.md"),
            "# Glossary\n\nThese terms apply throughout.\n"
        );
        assert_eq!(fixture.read("glossary-trailing.md"), "## Notes\n\nSee the appendix.\n");

        let second = run_both(&fixture.paths, &split).expect("second run");
        assert!(second.split.is_none());
        assert!(second.extract.already_done());
        assert_eq!(
            fixture.markdown_paths(),
            vec![
                "intro.md",
                "glossary-intro.md",
                "terms-and-definitions-intro.md",
                "glossary-trailing.md",
                "outro.md"
            ]
        );
    }

    #[test]
    fn split_dry_run_leaves_manifest_untouched() {
        let fixture = Fixture::new(
            &["glossary.md", "terms-and-definitions-intro.md"],
            &[("glossary.md", "Lead.\n\n[[def: A]]\n~ a\n")],
        );
        let manifest_before =
            fs::read_to_string(fixture.paths.project_root.join("specs.json")).expect("read");
        let split = MigrateOptions {
            split_source: Some("glossary.md".to_string()),
            ..options(true)
        };
        let report = run_both(&fixture.paths, &split).expect("dry run");
        let manifest = report.split.expect("split").manifest;
        assert!(manifest.changed && !manifest.written);
        assert!(!manifest.diff.is_empty());
        assert_eq!(
            fs::read_to_string(fixture.paths.project_root.join("specs.json")).expect("read"),
            manifest_before
        );
        assert!(!fixture.spec("glossary-intro.md").exists());
    }

    #[test]
    fn status_reports_counts_without_writing() {
        let fixture = Fixture::new(
            &["intro.md", "ref.md", "gone.md"],
            &[("intro.md", INTRO), ("ref.md", "See [[iref: term one]].\n")],
        );
        let status = inspect_project(&fixture.paths, &options(false)).expect("status");
        assert_eq!(status.verdict, GuardVerdict::SafeToCreate);
        assert!(!status.anchor_listed);
        assert_eq!(status.documents[0].definition_blocks, 1);
        assert_eq!(status.documents[1].inline_references, 1);
        assert!(!status.documents[2].exists);
        assert!(!fixture.terms_dir().exists());
    }

    fn configuration_error(error: &anyhow::Error) -> String {
        match error.downcast_ref::<MigrateError>() {
            Some(MigrateError::Configuration(message)) => message.clone(),
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn terms_directory_equal_to_spec_directory_is_rejected() {
        let source = "[[def: Alpha]]\n~ precious body\n";
        let fixture = Fixture::new(&["a.md"], &[("a.md", source)]);
        fixture.edit_manifest("\"terms-definitions\"", "\".\"");

        let error = run_both(&fixture.paths, &options(false)).expect_err("must fail");
        assert!(configuration_error(&error).contains("spec directory itself"));
        assert_eq!(fixture.read("a.md"), source);
        assert!(!fixture.spec("alpha.md").exists());
    }

    #[test]
    fn terms_directory_holding_a_listed_document_is_rejected() {
        let source = "[[def: Alpha]]\n~ body\n";
        let fixture = Fixture::new(&["chapters/a.md"], &[("chapters/a.md", source)]);
        fixture.edit_manifest("\"terms-definitions\"", "\"chapters\"");

        let error = run_both(&fixture.paths, &options(false)).expect_err("must fail");
        assert!(configuration_error(&error).contains("chapters/a.md"));
        assert_eq!(fixture.read("chapters/a.md"), source);
        assert!(!fixture.spec("chapters/alpha.md").exists());
    }

    #[test]
    fn documents_outside_spec_directory_are_rejected() {
        let fixture = Fixture::new(&["../outside.md"], &[]);
        let outside = fixture.paths.project_root.join("outside.md");
        write_file(&outside, "[[def: Alpha]]\n~ body\n");

        let error = rewrite_to_iref(&fixture.paths, &options(false)).expect_err("must fail");
        assert!(configuration_error(&error).contains("../outside.md"));
        assert_eq!(
            fs::read_to_string(&outside).expect("read"),
            "[[def: Alpha]]\n~ body\n"
        );
    }

    #[test]
    fn unreadable_split_source_is_rejected_before_any_write() {
        let fixture = Fixture::new(&["a.md", "glossary.md"], &[("a.md", INTRO)]);
        let split = MigrateOptions {
            split_source: Some("glossary.md".to_string()),
            ..options(false)
        };

        let error = run_both(&fixture.paths, &split).expect_err("must fail");
        assert!(configuration_error(&error).contains("split source glossary.md"));
        assert!(!fixture.terms_dir().exists());
        assert_eq!(fixture.read("a.md"), INTRO);
    }

    #[test]
    fn manifest_step_failure_keeps_earlier_phases_and_can_be_rerun() {
        let fixture = Fixture::new(
            &["glossary.md", "terms-and-definitions-intro.md"],
            &[
                ("glossary.md", GLOSSARY),
                ("terms-and-definitions-intro.md", "## Terms\n"),
            ],
        );
        fs::create_dir_all(fixture.spec("glossary-intro.md")).expect("block companion path");
        let split = MigrateOptions {
            split_source: Some("glossary.md".to_string()),
            ..options(false)
        };

        let error = run_both(&fixture.paths, &split).expect_err("must fail");
        match error.downcast_ref::<MigrateError>() {
            Some(MigrateError::PartialFailure {
                completed, failed, ..
            }) => {
                assert_eq!(*completed, Phase::Rewrite);
                assert_eq!(*failed, Phase::UpdateManifest);
            }
            other => panic!("expected partial failure, got {other:?}"),
        }
        assert!(error.to_string().contains("termsplit run --split"));
        assert_eq!(fixture.term_files(), vec!["holder.md", "issuer.md"]);
        assert!(fixture.read("glossary.md").contains("[[iref: Holder]]"));
        assert!(fixture.markdown_paths().contains(&"glossary.md".to_string()));

        fs::remove_dir(fixture.spec("glossary-intro.md")).expect("unblock companion path");
        let rerun = run_both(&fixture.paths, &split).expect("rerun");
        assert!(rerun.extract.already_done());
        assert_eq!(rerun.rewrite.conversions, 0);
        assert!(rerun.split.is_some());
        assert_eq!(
            fixture.markdown_paths(),
            vec![
                "glossary-intro.md",
                "terms-and-definitions-intro.md",
                "glossary-trailing.md"
            ]
        );
        assert_eq!(
            fixture.read("glossary-intro.md"),
            "# Glossary\n\nThese terms apply throughout.\n"
        );
        assert_eq!(fixture.read("glossary-trailing.md"), "## Notes\n\nSee the appendix.\n");
    }
}
