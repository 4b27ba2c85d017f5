use std::fmt;

/// Origin used for directives the engine builds itself rather than parsing
/// them from a content package.
pub const SYNTHETIC_ORIGIN: &str = "<engine>";

/// A parsed patch instruction.
///
/// `Insert` and `Replace` edit one event; `Ignore` cancels another package's
/// `Insert`/`Replace` before any merging happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchDirective {
    Insert(InsertDirective),
    Replace(ReplaceDirective),
    Ignore(IgnoreDirective),
}

/// Emit `content` immediately before the `key_index`-th line of the event
/// starting with `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertDirective {
    pub origin: String,
    pub event_id: String,
    pub key: String,
    pub key_index: usize,
    pub content: Vec<String>,
}

/// Replace the `key_index`-th line starting with `key` (and, when `key2` is
/// set, every line through the `key2_index`-th line starting with `key2`)
/// with `content`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaceDirective {
    pub origin: String,
    pub event_id: String,
    pub key: String,
    pub key_index: usize,
    pub key2: String,
    pub key2_index: usize,
    pub content: Vec<String>,
}

/// Cancel the directive identified by `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoreDirective {
    pub origin: String,
    pub target: DirectiveTarget,
}

/// Full identity of an `Insert`/`Replace` directive, as named by an `Ignore`.
///
/// Inserts are identified with an empty `key2` and a `key2_index` of 0.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DirectiveTarget {
    pub origin: String,
    pub event_id: String,
    pub key: String,
    pub key_index: usize,
    pub key2: String,
    pub key2_index: usize,
}

/// A directive that edits event lines. This is what the catalog holds and what
/// the merge engine consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventEdit {
    Insert(InsertDirective),
    Replace(ReplaceDirective),
}

impl EventEdit {
    pub fn origin(&self) -> &str {
        match self {
            EventEdit::Insert(d) => &d.origin,
            EventEdit::Replace(d) => &d.origin,
        }
    }

    pub fn event_id(&self) -> &str {
        match self {
            EventEdit::Insert(d) => &d.event_id,
            EventEdit::Replace(d) => &d.event_id,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            EventEdit::Insert(d) => &d.key,
            EventEdit::Replace(d) => &d.key,
        }
    }

    pub fn key_index(&self) -> usize {
        match self {
            EventEdit::Insert(d) => d.key_index,
            EventEdit::Replace(d) => d.key_index,
        }
    }

    pub fn content(&self) -> &[String] {
        match self {
            EventEdit::Insert(d) => &d.content,
            EventEdit::Replace(d) => &d.content,
        }
    }

    /// Whether an `Ignore` naming `target` cancels this directive.
    pub fn is_targeted_by(&self, target: &DirectiveTarget) -> bool {
        let (key2, key2_index) = match self {
            EventEdit::Insert(_) => ("", 0),
            EventEdit::Replace(d) => (d.key2.as_str(), d.key2_index),
        };
        self.origin() == target.origin
            && self.event_id() == target.event_id
            && self.key() == target.key
            && self.key_index() == target.key_index
            && key2 == target.key2
            && key2_index == target.key2_index
    }

    /// Two edits occupy the same anchor when they share event, key and index.
    pub fn same_anchor(&self, other: &EventEdit) -> bool {
        self.event_id() == other.event_id()
            && self.key() == other.key()
            && self.key_index() == other.key_index()
    }

    fn kind(&self) -> &'static str {
        match self {
            EventEdit::Insert(_) => "insert",
            EventEdit::Replace(_) => "replace",
        }
    }
}

impl fmt::Display for EventEdit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} from '{}' at {}:{:?}#{}",
            self.kind(),
            self.origin(),
            self.event_id(),
            self.key(),
            self.key_index()
        )
    }
}

impl PatchDirective {
    pub fn origin(&self) -> &str {
        match self {
            PatchDirective::Insert(d) => &d.origin,
            PatchDirective::Replace(d) => &d.origin,
            PatchDirective::Ignore(d) => &d.origin,
        }
    }

    /// Event this directive edits, or for an `Ignore`, the event it cancels in.
    pub fn event_id(&self) -> &str {
        match self {
            PatchDirective::Insert(d) => &d.event_id,
            PatchDirective::Replace(d) => &d.event_id,
            PatchDirective::Ignore(d) => &d.target.event_id,
        }
    }
}

impl From<InsertDirective> for PatchDirective {
    fn from(d: InsertDirective) -> Self {
        PatchDirective::Insert(d)
    }
}

impl From<ReplaceDirective> for PatchDirective {
    fn from(d: ReplaceDirective) -> Self {
        PatchDirective::Replace(d)
    }
}

impl From<IgnoreDirective> for PatchDirective {
    fn from(d: IgnoreDirective) -> Self {
        PatchDirective::Ignore(d)
    }
}
