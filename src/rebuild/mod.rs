//! Deciding when to regenerate, and regenerating.

pub mod coordinator;
pub mod manifest;
pub mod sources;

pub use coordinator::{
    credits_directive, Freshness, GeneratedFile, RebuildCoordinator, RebuildError,
    RebuildOutcome, RebuildReport, StaleReason,
};
pub use manifest::{ManifestError, RebuildManifest, Timestamp, MANIFEST_FILE};
pub use sources::{PatchSource, ScriptSource, SourceSet};
