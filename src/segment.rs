//! Event boundary detection for base and override scripts.

/// Marker used when the configuration does not name one.
pub const DEFAULT_EVENT_MARKER: &str = "#event";

/// One line of a source document. Immutable once read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLine {
    /// Zero-based position in the source document.
    pub index: usize,
    pub text: String,
}

/// A named run of lines from its header up to the next header or end of
/// document. The header itself is kept separately and is never a merge target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: String,
    pub header: ScriptLine,
    pub lines: Vec<ScriptLine>,
}

/// A script split into its preamble and its events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptDocument {
    /// Lines before the first event header, passed through verbatim.
    pub preamble: Vec<ScriptLine>,
    pub events: Vec<Event>,
}

impl ScriptDocument {
    /// Reassemble the document without applying anything.
    pub fn to_lines(&self) -> Vec<String> {
        let mut out: Vec<String> = self.preamble.iter().map(|l| l.text.clone()).collect();
        for event in &self.events {
            out.push(event.header.text.clone());
            out.extend(event.lines.iter().map(|l| l.text.clone()));
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSegmenter {
    marker: String,
}

impl Default for EventSegmenter {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_MARKER)
    }
}

impl EventSegmenter {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// The event-id named by `line`, if it is a header.
    pub fn event_id<'a>(&self, line: &'a str) -> Option<&'a str> {
        let name = line.trim().strip_prefix(self.marker.as_str())?.trim();
        (!name.is_empty()).then_some(name)
    }

    pub fn segment<S: AsRef<str>>(&self, lines: &[S]) -> ScriptDocument {
        let mut document = ScriptDocument::default();

        for (index, raw) in lines.iter().enumerate() {
            let text = raw.as_ref();
            let line = ScriptLine {
                index,
                text: text.to_string(),
            };

            if let Some(id) = self.event_id(text) {
                document.events.push(Event {
                    id: id.to_string(),
                    header: line,
                    lines: Vec::new(),
                });
                continue;
            }

            match document.events.last_mut() {
                Some(event) => event.lines.push(line),
                None => document.preamble.push(line),
            }
        }

        document
    }
}
