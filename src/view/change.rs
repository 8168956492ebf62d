use std::collections::BTreeMap;

use crate::util::assert;
use crate::view::indexed_variant::IndexedVariant;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EventType {
    #[default]
    Value,
    ChildAdded,
    ChildRemoved,
    ChildChanged,
    ChildMoved,
}

/// A single event produced by applying an operation to a view: the value
/// changed, or a child was added/removed/changed/moved. Produced for the
/// listener dispatch layer, never stored.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Change {
    pub event_type: EventType,
    pub indexed_variant: IndexedVariant,
    pub child_key: String,
    pub prev_name: String,
    pub old_indexed_variant: IndexedVariant,
}

impl Change {
    pub fn value(indexed_variant: impl Into<IndexedVariant>) -> Change {
        Change {
            event_type: EventType::Value,
            indexed_variant: indexed_variant.into(),
            ..Change::default()
        }
    }

    pub fn child_added(child_key: impl Into<String>, snapshot: impl Into<IndexedVariant>) -> Change {
        Change {
            event_type: EventType::ChildAdded,
            indexed_variant: snapshot.into(),
            child_key: child_key.into(),
            ..Change::default()
        }
    }

    pub fn child_removed(
        child_key: impl Into<String>,
        old_snapshot: impl Into<IndexedVariant>,
    ) -> Change {
        Change {
            event_type: EventType::ChildRemoved,
            indexed_variant: old_snapshot.into(),
            child_key: child_key.into(),
            ..Change::default()
        }
    }

    pub fn child_changed(
        child_key: impl Into<String>,
        snapshot: impl Into<IndexedVariant>,
        old_snapshot: impl Into<IndexedVariant>,
    ) -> Change {
        Change {
            event_type: EventType::ChildChanged,
            indexed_variant: snapshot.into(),
            child_key: child_key.into(),
            old_indexed_variant: old_snapshot.into(),
            ..Change::default()
        }
    }

    pub fn child_moved(child_key: impl Into<String>, snapshot: impl Into<IndexedVariant>) -> Change {
        Change {
            event_type: EventType::ChildMoved,
            indexed_variant: snapshot.into(),
            child_key: child_key.into(),
            ..Change::default()
        }
    }

    pub fn with_prev_name(mut self, prev_name: impl Into<String>) -> Change {
        self.prev_name = prev_name.into();
        self
    }
}

/// Collects per-child changes while an operation is applied, merging
/// sequences that touch the same key into the single change a listener
/// should observe.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChildChangeAccumulator {
    changes: BTreeMap<String, Change>,
}

impl ChildChangeAccumulator {
    pub fn new() -> ChildChangeAccumulator {
        ChildChangeAccumulator::default()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn track_child_change(&mut self, change: Change) {
        let event_type = change.event_type;
        assert(
            matches!(
                event_type,
                EventType::ChildAdded | EventType::ChildChanged | EventType::ChildRemoved
            ),
            "Only child changes supported for tracking",
        );
        assert(
            !crate::variant::is_priority_key(&change.child_key),
            "Changes to priorities are not tracked",
        );
        let key = change.child_key.clone();
        let Some(old_change) = self.changes.get(&key) else {
            self.changes.insert(key, change);
            return;
        };
        let merged = match (event_type, old_change.event_type) {
            (EventType::ChildAdded, EventType::ChildRemoved) => Some(Change::child_changed(
                key.clone(),
                change.indexed_variant,
                old_change.indexed_variant.clone(),
            )),
            (EventType::ChildRemoved, EventType::ChildAdded) => None,
            (EventType::ChildRemoved, EventType::ChildChanged) => Some(Change::child_removed(
                key.clone(),
                old_change.old_indexed_variant.clone(),
            )),
            (EventType::ChildChanged, EventType::ChildAdded) => {
                Some(Change::child_added(key.clone(), change.indexed_variant))
            }
            (EventType::ChildChanged, EventType::ChildChanged) => Some(Change::child_changed(
                key.clone(),
                change.indexed_variant,
                old_change.old_indexed_variant.clone(),
            )),
            _ => {
                assert(
                    false,
                    format!(
                        "Illegal combination of changes: {:?} occurred after {:?}",
                        event_type, old_change.event_type
                    ),
                );
                unreachable!()
            }
        };
        match merged {
            Some(merged) => {
                self.changes.insert(key, merged);
            }
            None => {
                self.changes.remove(&key);
            }
        }
    }

    /// The surviving changes in child-key order.
    pub fn into_changes(self) -> Vec<Change> {
        self.changes.into_values().collect()
    }
}
