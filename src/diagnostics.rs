//! Recoverable problems and the sink they are reported to.
//!
//! Nothing in here aborts a regeneration: every [`PatchError`] is scoped to a
//! single directive or a single file, gets handed to an [`ErrorSink`], and the
//! engine carries on with a best-effort output.

use crate::directive::{DirectiveParseError, EventEdit};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("{}: {error}", file.display())]
    DirectiveParse {
        file: PathBuf,
        error: DirectiveParseError,
    },

    #[error("{edit}: could not find occurrence #{key2_index} of end key {key2:?}; directive not applied")]
    ApplicationFailure {
        edit: EventEdit,
        key2: String,
        key2_index: usize,
    },

    #[error("{edit}: never matched a line in event '{}'{}", .edit.event_id(), closest_hint(.closest))]
    UnappliedDirective {
        edit: EventEdit,
        closest: Option<String>,
    },

    #[error("{edit}: event '{}' does not exist in any script", .edit.event_id())]
    OrphanedDirective { edit: EventEdit },

    #[error("{edit}: shadowed by an earlier directive from '{first_origin}' at the same anchor")]
    ShadowedDirective { edit: EventEdit, first_origin: String },

    #[error("{}: event '{event_id}' already appeared earlier in the corpus", file.display())]
    DuplicateEvent { event_id: String, file: PathBuf },

    #[error("I/O error on {}: {source}", path.display())]
    FileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn closest_hint(closest: &Option<String>) -> String {
    match closest {
        Some(line) => format!(" (closest line: {line:?})"),
        None => String::new(),
    }
}

impl PatchError {
    /// Warnings leave the output correct for what was asked; errors mean some
    /// input could not be honoured.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            PatchError::UnappliedDirective { .. }
                | PatchError::OrphanedDirective { .. }
                | PatchError::ShadowedDirective { .. }
                | PatchError::DuplicateEvent { .. }
        )
    }
}

/// Non-fatal logging sink for engine problems.
pub trait ErrorSink {
    fn report_error(&mut self, error: PatchError);
}

/// Collects reported problems in order and mirrors each one to `tracing`.
#[derive(Debug, Default)]
pub struct ErrorLog {
    errors: Vec<PatchError>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> &[PatchError] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn warning_count(&self) -> usize {
        self.errors.iter().filter(|e| e.is_warning()).count()
    }

    pub fn into_errors(self) -> Vec<PatchError> {
        self.errors
    }
}

impl ErrorSink for ErrorLog {
    fn report_error(&mut self, error: PatchError) {
        tracing::warn!("{error}");
        self.errors.push(error);
    }
}

impl ErrorSink for Vec<PatchError> {
    fn report_error(&mut self, error: PatchError) {
        self.push(error);
    }
}
