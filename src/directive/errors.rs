use thiserror::Error;

/// A malformed directive block. Only the offending block is skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectiveParseError {
    #[error("line {line}: unknown directive type '{keyword}'")]
    UnknownType { line: usize, keyword: String },

    #[error("line {line}: '{kind}' expects {expected} fields after the marker, found {found}")]
    FieldCount {
        line: usize,
        kind: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: invalid {field} '{value}' (expected a non-negative integer)")]
    InvalidIndex {
        line: usize,
        field: &'static str,
        value: String,
    },

    #[error("line {line}: {field} must not be empty")]
    EmptyField { line: usize, field: &'static str },

    #[error("line {line}: directive block is never closed; rest of file skipped")]
    Unterminated { line: usize },
}

impl DirectiveParseError {
    /// Zero-based line of the offending header.
    pub fn line(&self) -> usize {
        match self {
            DirectiveParseError::UnknownType { line, .. }
            | DirectiveParseError::FieldCount { line, .. }
            | DirectiveParseError::InvalidIndex { line, .. }
            | DirectiveParseError::EmptyField { line, .. }
            | DirectiveParseError::Unterminated { line } => *line,
        }
    }
}
