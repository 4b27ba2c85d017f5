//! Narrative Patcher: directive-driven patching of event-structured scripts
//!
//! Base scripts are split into named events. Content packages contribute
//! override scripts and patch sources; patch sources hold `insert`, `replace`
//! and `ignore` directives that are merged into the events line by line, and
//! the results are written to an output directory that is only regenerated
//! when something it was built from has changed.
//!
//! # Architecture
//!
//! - [`directive`] parses patch-source documents into [`PatchDirective`]s.
//! - [`PatchCatalog`] holds pending directives per event and runs the
//!   cancellation pass for `ignore` directives.
//! - [`EventSegmenter`] splits a script into preamble and events.
//! - [`merge`] applies an event's directives in one forward pass.
//! - [`RebuildCoordinator`] decides whether the output is stale and
//!   regenerates the whole output directory when it is.
//!
//! # Safety
//!
//! - Output is staged beside the output directory and swapped in with renames
//! - The output directory may never overlap a source directory or home
//! - Per-file and per-directive problems are reported, never fatal
//!
//! # Example
//!
//! ```no_run
//! use narrative_patcher::{load_from_path, DirectoryRegistry, ErrorLog, RebuildCoordinator};
//! use std::path::Path;
//!
//! let config = load_from_path(Path::new("patcher.toml"))?;
//! let registry = DirectoryRegistry::scan(&config.paths.packages_dir, &config.packages)?;
//! let mut log = ErrorLog::new();
//!
//! let outcome = RebuildCoordinator::new(&config, &registry).rebuild(&mut log)?;
//! println!("{outcome:?}, {} problems", log.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod catalog;
pub mod config;
pub mod diagnostics;
pub mod directive;
pub mod merge;
pub mod output;
pub mod package;
pub mod rebuild;
pub mod safety;
pub mod segment;
pub mod telemetry;

// Re-exports
pub use catalog::{PatchCatalog, Registration};
pub use config::{load_from_path, load_from_str, ConfigError, PatcherConfig};
pub use diagnostics::{ErrorLog, ErrorSink, PatchError};
pub use directive::{
    parse_patch_source, parse_patch_text, DirectiveParseError, EventEdit, IgnoreDirective,
    InsertDirective, PatchDirective, ReplaceDirective,
};
pub use merge::{merge_document, merge_event, merge_lines, MergeOutput, MergeStats};
pub use package::{ContentPackageRef, DirectoryRegistry, PackageInfo, PackageRegistry, StaticRegistry};
pub use rebuild::{
    Freshness, RebuildCoordinator, RebuildError, RebuildManifest, RebuildOutcome, RebuildReport,
    StaleReason,
};
pub use safety::{OutputGuard, SafetyError};
pub use segment::{Event, EventSegmenter, ScriptDocument, ScriptLine};
