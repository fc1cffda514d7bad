pub mod config;
pub mod error;
pub mod filesystem;
pub mod guard;
pub mod manifest;
pub mod manifest_order;
pub mod pipeline;
pub mod report;
pub mod rewrite;
pub mod runtime;
pub mod scanner;
pub mod split;
pub mod term_files;
pub mod term_key;

pub use error::{MigrateError, Phase};
pub use pipeline::{
    ExtractReport, MigrateOptions, RewriteReport, RunReport, StatusReport, inspect_project,
    rewrite_to_iref, run_both, scan_and_extract,
};
