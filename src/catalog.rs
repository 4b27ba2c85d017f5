//! Per-event store of pending directives for one regeneration cycle.
//!
//! Directives are kept per event in registration order. That order decides
//! which directive wins when several could apply to the same line, so it is
//! part of the contract, not an implementation detail.

use crate::directive::{EventEdit, IgnoreDirective, PatchDirective};
use std::collections::BTreeMap;

/// Outcome of [`PatchCatalog::add`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Registration {
    Registered,
    /// Another directive already sits at the same `(event, key, key_index)`.
    /// The new one was still registered and will lose to the earlier one.
    Shadowed { first_origin: String },
    /// Ignore directives wait for [`PatchCatalog::apply_cancellations`].
    Deferred,
}

#[derive(Debug, Default, Clone)]
pub struct PatchCatalog {
    events: BTreeMap<String, Vec<EventEdit>>,
    ignores: Vec<IgnoreDirective>,
}

impl PatchCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, directive: PatchDirective) -> Registration {
        let edit = match directive {
            PatchDirective::Insert(d) => EventEdit::Insert(d),
            PatchDirective::Replace(d) => EventEdit::Replace(d),
            PatchDirective::Ignore(d) => {
                self.ignores.push(d);
                return Registration::Deferred;
            }
        };

        let pending = self.events.entry(edit.event_id().to_string()).or_default();
        let shadowed_by = pending
            .iter()
            .find(|existing| existing.same_anchor(&edit))
            .map(|existing| existing.origin().to_string());
        pending.push(edit);

        match shadowed_by {
            Some(first_origin) => Registration::Shadowed { first_origin },
            None => Registration::Registered,
        }
    }

    /// Remove every pending directive matching the ignore's target exactly.
    /// Returns how many were removed; zero is not an error.
    pub fn cancel(&mut self, ignore: &IgnoreDirective) -> usize {
        let Some(pending) = self.events.get_mut(&ignore.target.event_id) else {
            return 0;
        };
        let before = pending.len();
        pending.retain(|edit| !edit.is_targeted_by(&ignore.target));
        let removed = before - pending.len();
        if pending.is_empty() {
            self.events.remove(&ignore.target.event_id);
        }
        removed
    }

    /// Run every deferred ignore once, then discard them.
    /// Returns the total number of directives cancelled.
    pub fn apply_cancellations(&mut self) -> usize {
        let ignores = std::mem::take(&mut self.ignores);
        let mut cancelled = 0;
        for ignore in &ignores {
            let removed = self.cancel(ignore);
            tracing::debug!(
                origin = %ignore.origin,
                target_origin = %ignore.target.origin,
                event = %ignore.target.event_id,
                removed,
                "applied ignore directive"
            );
            cancelled += removed;
        }
        cancelled
    }

    pub fn directives_for(&self, event_id: &str) -> &[EventEdit] {
        self.events.get(event_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Take an event's pending directives out of the catalog for merging.
    /// Once taken they are no longer visible to any other event or file.
    pub fn take(&mut self, event_id: &str) -> Vec<EventEdit> {
        self.events.remove(event_id).unwrap_or_default()
    }

    pub fn pending_ignores(&self) -> &[IgnoreDirective] {
        &self.ignores
    }

    /// Drain every directive that was never taken, in event order.
    pub fn drain_remaining(&mut self) -> Vec<EventEdit> {
        std::mem::take(&mut self.events)
            .into_values()
            .flatten()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.ignores.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.ignores.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::{DirectiveTarget, InsertDirective, ReplaceDirective};

    fn insert(origin: &str, event: &str, key: &str, key_index: usize) -> PatchDirective {
        PatchDirective::Insert(InsertDirective {
            origin: origin.to_string(),
            event_id: event.to_string(),
            key: key.to_string(),
            key_index,
            content: vec!["+".to_string()],
        })
    }

    fn ignore(origin: &str, target_origin: &str, event: &str, key: &str) -> IgnoreDirective {
        IgnoreDirective {
            origin: origin.to_string(),
            target: DirectiveTarget {
                origin: target_origin.to_string(),
                event_id: event.to_string(),
                key: key.to_string(),
                key_index: 0,
                key2: String::new(),
                key2_index: 0,
            },
        }
    }

    #[test]
    fn test_directives_keep_registration_order() {
        let mut catalog = PatchCatalog::new();
        let _ = catalog.add(insert("a", "intro", "Z", 0));
        let _ = catalog.add(insert("b", "intro", "A", 0));
        let _ = catalog.add(insert("c", "intro", "M", 0));

        let origins: Vec<&str> = catalog
            .directives_for("intro")
            .iter()
            .map(|d| d.origin())
            .collect();
        assert_eq!(origins, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_same_anchor_is_shadowed_but_kept() {
        let mut catalog = PatchCatalog::new();
        assert_eq!(catalog.add(insert("a", "intro", "Foo", 0)), Registration::Registered);
        assert_eq!(
            catalog.add(insert("b", "intro", "Foo", 0)),
            Registration::Shadowed {
                first_origin: "a".to_string()
            }
        );
        assert_eq!(catalog.directives_for("intro").len(), 2);
    }

    #[test]
    fn test_ignore_cancels_exact_target_only() {
        let mut catalog = PatchCatalog::new();
        let _ = catalog.add(insert("modA", "intro", "Foo", 0));
        let _ = catalog.add(insert("modB", "intro", "Foo", 1));
        let _ = catalog.add(insert("modA", "outro", "Foo", 0));
        assert_eq!(
            catalog.add(PatchDirective::Ignore(ignore("modB", "modA", "intro", "Foo"))),
            Registration::Deferred
        );

        assert_eq!(catalog.apply_cancellations(), 1);
        assert!(catalog.pending_ignores().is_empty());

        let intro = catalog.directives_for("intro");
        assert_eq!(intro.len(), 1);
        assert_eq!(intro[0].origin(), "modB");
        assert_eq!(catalog.directives_for("outro").len(), 1);
    }

    #[test]
    fn test_ignore_without_match_is_noop() {
        let mut catalog = PatchCatalog::new();
        let _ = catalog.add(insert("modA", "intro", "Foo", 0));
        assert_eq!(catalog.cancel(&ignore("x", "modZ", "intro", "Foo")), 0);
        assert_eq!(catalog.cancel(&ignore("x", "modA", "nowhere", "Foo")), 0);
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_ignore_distinguishes_replace_end_key() {
        let mut catalog = PatchCatalog::new();
        let _ = catalog.add(PatchDirective::Replace(ReplaceDirective {
            origin: "modA".to_string(),
            event_id: "intro".to_string(),
            key: "Foo".to_string(),
            key_index: 0,
            key2: "Bar".to_string(),
            key2_index: 0,
            content: Vec::new(),
        }));

        assert_eq!(catalog.cancel(&ignore("x", "modA", "intro", "Foo")), 0);

        let mut exact = ignore("x", "modA", "intro", "Foo");
        exact.target.key2 = "Bar".to_string();
        assert_eq!(catalog.cancel(&exact), 1);
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_take_removes_event() {
        let mut catalog = PatchCatalog::new();
        let _ = catalog.add(insert("a", "intro", "Foo", 0));
        let _ = catalog.add(insert("a", "outro", "Foo", 0));

        assert_eq!(catalog.take("intro").len(), 1);
        assert!(catalog.take("intro").is_empty());

        let remaining = catalog.drain_remaining();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].event_id(), "outro");
        assert!(catalog.is_empty());
    }
}
