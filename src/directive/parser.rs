//! Patch-source parsing.
//!
//! A patch-source document holds any number of blocks:
//!
//! ```text
//! @|insert|intro|Bye.|0
//! ----
//! Wave.
//! }
//! ```
//!
//! Anything outside a block is ignored, so authors are free to add notes
//! between blocks.

use crate::directive::errors::DirectiveParseError;
use crate::directive::types::{
    DirectiveTarget, IgnoreDirective, InsertDirective, PatchDirective, ReplaceDirective,
};
use std::ops::RangeInclusive;

/// Reserved first character of a directive header.
pub const DIRECTIVE_MARKER: char = '@';
/// Header field separator. Escape as `\|` to use it inside a field.
pub const FIELD_DELIMITER: char = '|';
/// A line trimming to exactly this closes a block.
pub const BLOCK_TERMINATOR: &str = "}";

/// A directive together with the lines (header through closing brace) it
/// was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDirective {
    pub directive: PatchDirective,
    pub lines: RangeInclusive<usize>,
}

/// Everything recovered from one document. Errors never stop the remaining
/// blocks from being read, except an unterminated block.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParseOutput {
    pub directives: Vec<ParsedDirective>,
    pub errors: Vec<DirectiveParseError>,
}

/// Whether `line` opens a directive block.
pub fn is_directive_header(line: &str) -> bool {
    line.trim_start().starts_with(DIRECTIVE_MARKER)
}

/// Parse every directive block in `lines`, attributing them to `origin`.
pub fn parse_patch_source<S: AsRef<str>>(origin: &str, lines: &[S]) -> ParseOutput {
    let mut output = ParseOutput::default();
    let mut cursor = 0;

    while cursor < lines.len() {
        let line = lines[cursor].as_ref();
        if !is_directive_header(line) {
            cursor += 1;
            continue;
        }

        let Some(close) = find_block_end(lines, cursor) else {
            output
                .errors
                .push(DirectiveParseError::Unterminated { line: cursor });
            break;
        };

        let content: Vec<String> = lines[cursor + 2..close]
            .iter()
            .map(|l| l.as_ref().to_string())
            .collect();

        match parse_header(origin, line, cursor, content) {
            Ok(directive) => output.directives.push(ParsedDirective {
                directive,
                lines: cursor..=close,
            }),
            Err(error) => output.errors.push(error),
        }

        cursor = close + 1;
    }

    output
}

/// Convenience wrapper over [`parse_patch_source`] for a whole text document.
pub fn parse_patch_text(origin: &str, text: &str) -> ParseOutput {
    let lines: Vec<&str> = text.lines().collect();
    parse_patch_source(origin, &lines)
}

/// Split a header on unescaped delimiters, unescaping `\|`.
pub fn split_fields(text: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&FIELD_DELIMITER) => {
                current.push(FIELD_DELIMITER);
                chars.next();
            }
            FIELD_DELIMITER => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

// The separator line right after the header is never a terminator.
fn find_block_end<S: AsRef<str>>(lines: &[S], header: usize) -> Option<usize> {
    (header + 2..lines.len()).find(|&idx| lines[idx].as_ref().trim() == BLOCK_TERMINATOR)
}

fn parse_header(
    origin: &str,
    header: &str,
    line: usize,
    content: Vec<String>,
) -> Result<PatchDirective, DirectiveParseError> {
    let fields = split_fields(header.trim());
    let keyword = fields
        .get(1)
        .map(|f| f.trim().to_ascii_lowercase())
        .unwrap_or_default();
    let found = fields.len().saturating_sub(1);

    match keyword.as_str() {
        "insert" => {
            expect_fields(line, "insert", 4, found)?;
            Ok(PatchDirective::Insert(InsertDirective {
                origin: origin.to_string(),
                event_id: event_field(line, &fields[2])?,
                key: key_field(line, &fields[3], "key")?,
                key_index: index_field(line, &fields[4], "key_index")?,
                content,
            }))
        }
        "replace" => {
            expect_fields(line, "replace", 6, found)?;
            Ok(PatchDirective::Replace(ReplaceDirective {
                origin: origin.to_string(),
                event_id: event_field(line, &fields[2])?,
                key: key_field(line, &fields[3], "key")?,
                key2: fields[4].clone(),
                key_index: index_field(line, &fields[5], "key_index")?,
                key2_index: index_field(line, &fields[6], "key2_index")?,
                content,
            }))
        }
        "ignore" => {
            expect_fields(line, "ignore", 7, found)?;
            let target_origin = fields[4].trim();
            if target_origin.is_empty() {
                return Err(DirectiveParseError::EmptyField {
                    line,
                    field: "target origin",
                });
            }
            Ok(PatchDirective::Ignore(IgnoreDirective {
                origin: origin.to_string(),
                target: DirectiveTarget {
                    origin: target_origin.to_string(),
                    event_id: event_field(line, &fields[2])?,
                    key: key_field(line, &fields[3], "key")?,
                    key2: fields[5].clone(),
                    key_index: index_field(line, &fields[6], "key_index")?,
                    key2_index: index_field(line, &fields[7], "key2_index")?,
                },
            }))
        }
        _ => Err(DirectiveParseError::UnknownType {
            line,
            keyword: fields.get(1).cloned().unwrap_or_default(),
        }),
    }
}

fn expect_fields(
    line: usize,
    kind: &'static str,
    expected: usize,
    found: usize,
) -> Result<(), DirectiveParseError> {
    if found == expected {
        Ok(())
    } else {
        Err(DirectiveParseError::FieldCount {
            line,
            kind,
            expected,
            found,
        })
    }
}

fn event_field(line: usize, raw: &str) -> Result<String, DirectiveParseError> {
    let event = raw.trim();
    if event.is_empty() {
        return Err(DirectiveParseError::EmptyField {
            line,
            field: "event-id",
        });
    }
    Ok(event.to_string())
}

// Keys are prefixes of script lines, so surrounding whitespace is significant.
fn key_field(line: usize, raw: &str, field: &'static str) -> Result<String, DirectiveParseError> {
    if raw.is_empty() {
        return Err(DirectiveParseError::EmptyField { line, field });
    }
    Ok(raw.to_string())
}

fn index_field(line: usize, raw: &str, field: &'static str) -> Result<usize, DirectiveParseError> {
    raw.trim()
        .parse::<usize>()
        .map_err(|_| DirectiveParseError::InvalidIndex {
            line,
            field,
            value: raw.to_string(),
        })
}
