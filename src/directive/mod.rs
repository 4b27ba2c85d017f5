pub mod errors;
pub mod parser;
pub mod types;

pub use errors::DirectiveParseError;
pub use parser::{
    is_directive_header, parse_patch_source, parse_patch_text, split_fields, ParseOutput,
    ParsedDirective, BLOCK_TERMINATOR, DIRECTIVE_MARKER, FIELD_DELIMITER,
};
pub use types::{
    DirectiveTarget, EventEdit, IgnoreDirective, InsertDirective, PatchDirective,
    ReplaceDirective, SYNTHETIC_ORIGIN,
};
