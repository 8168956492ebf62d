use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::tree::Tree;
use crate::path::Path;
use crate::util::assert;
use crate::variant::{
    get_variant_value, is_priority_key, variant_get_child, variant_is_empty, variant_update_child,
};

/// An immutable collection of path-scoped complete overwrites.
///
/// Each entry states "at this relative path the value is exactly X". Entries
/// at shallower paths subsume deeper ones: recording a write at `a` absorbs
/// any later write below `a` into that value, so a single canonical lookup
/// exists for every path.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct CompoundWrite {
    write_tree: Tree<Value>,
}

impl CompoundWrite {
    pub fn empty() -> CompoundWrite {
        CompoundWrite::default()
    }

    fn from_tree(write_tree: Tree<Value>) -> CompoundWrite {
        CompoundWrite { write_tree }
    }

    /// Build a write from a map of child keys (which may contain slashes) to
    /// values.
    pub fn from_child_merge<I, S>(merge: I) -> CompoundWrite
    where
        I: IntoIterator<Item = (S, Value)>,
        S: AsRef<str>,
    {
        let mut write_tree = Tree::new();
        for (key, value) in merge {
            write_tree.set_value_at(&Path::new(key.as_ref()), value);
        }
        CompoundWrite::from_tree(write_tree)
    }

    /// Build a write from a JSON map; non-map values become a root write.
    pub fn from_variant_merge(merge: &Value) -> CompoundWrite {
        let mut write_tree = Tree::new();
        match merge.as_object() {
            Some(map) => {
                for (key, value) in map {
                    write_tree.set_value_at(&Path::new(key), value.clone());
                }
            }
            None => write_tree.set_value(merge.clone()),
        }
        CompoundWrite::from_tree(write_tree)
    }

    pub fn from_path_merge<I>(merge: I) -> CompoundWrite
    where
        I: IntoIterator<Item = (Path, Value)>,
    {
        let mut write_tree = Tree::new();
        for (path, value) in merge {
            write_tree.set_value_at(&path, value);
        }
        CompoundWrite::from_tree(write_tree)
    }

    pub fn add_write(&self, path: &Path, value: impl Into<Option<Value>>) -> CompoundWrite {
        let mut target = self.clone();
        target.add_write_inline(path, value);
        target
    }

    pub fn add_write_inline(&mut self, path: &Path, value: impl Into<Option<Value>>) {
        let value = value.into();
        if path.is_empty() {
            *self = CompoundWrite::from_tree(Tree::from_value(value));
            return;
        }
        if let Some(root_most_path) = self.write_tree.find_root_most_path_with_value(path) {
            // The relative path is just the remainder past the root-most
            // entry, which is always a prefix of `path`.
            let relative_path =
                Path::relative(&root_most_path, path).expect("root-most path is a prefix");
            let existing = self
                .write_tree
                .get_value_at(&root_most_path)
                .expect("root-most path holds a value");
            let back = relative_path.back().unwrap_or_default();

            if !relative_path.is_empty()
                && is_priority_key(back)
                && variant_is_empty(variant_get_child(existing, &relative_path.parent()))
            {
                // Ignore priority updates on empty variants.
            } else {
                let mut updated = existing.clone();
                variant_update_child(
                    &mut updated,
                    &relative_path,
                    value.as_ref().unwrap_or(&Value::Null),
                );
                self.write_tree.set_value_at(&root_most_path, updated);
            }
        } else {
            self.write_tree.set_value_at(path, value);
        }
    }

    /// Merge an entire sub-write in, reparenting each of its entries under
    /// `path`.
    pub fn add_writes(&self, path: &Path, updates: &CompoundWrite) -> CompoundWrite {
        updates.write_tree.fold(self.clone(), |relative, value, acc| {
            acc.add_write(&path.child_path(relative), value.clone())
        })
    }

    pub fn add_writes_inline(&mut self, path: &Path, updates: &CompoundWrite) {
        updates.write_tree.call_on_each(|relative, value| {
            self.add_write_inline(&path.child_path(relative), value.clone());
        });
    }

    pub fn remove_write(&self, path: &Path) -> CompoundWrite {
        let mut result = self.clone();
        result.remove_write_inline(path);
        result
    }

    pub fn remove_write_inline(&mut self, path: &Path) {
        if path.is_empty() {
            *self = CompoundWrite::empty();
        } else if let Some(subtree) = self.write_tree.get_child_mut(path) {
            *subtree = Tree::new();
        }
    }

    pub fn has_complete_write(&self, path: &Path) -> bool {
        self.get_complete_variant(path).is_some()
    }

    pub fn get_root_write(&self) -> Option<&Value> {
        self.write_tree.value()
    }

    /// The value some ancestor-or-self entry fully determines for `path`, if
    /// any.
    pub fn get_complete_variant(&self, path: &Path) -> Option<Value> {
        let root_most = self.write_tree.find_root_most_path_with_value(path)?;
        let root_most_value = self
            .write_tree
            .get_value_at(&root_most)
            .expect("root-most path holds a value");
        let remaining = Path::relative(&root_most, path).expect("root-most path is a prefix");
        Some(variant_get_child(root_most_value, &remaining).clone())
    }

    /// The top-level keys this write fully determines, with their values.
    pub fn get_complete_children(&self) -> Vec<(String, Value)> {
        let mut children = Vec::new();
        if let Some(root) = self.get_root_write() {
            if let Some(map) = get_variant_value(root).as_object() {
                for (key, value) in map {
                    children.push((key.clone(), value.clone()));
                }
            }
        } else {
            for (key, subtree) in self.write_tree.children() {
                if let Some(value) = subtree.value() {
                    children.push((key.clone(), value.clone()));
                }
            }
        }
        children
    }

    /// The sub-write scoped to `path`: a shadowing entry collapses to a root
    /// write, otherwise the subtree below `path` is sliced out.
    pub fn child_compound_write(&self, path: &Path) -> CompoundWrite {
        if path.is_empty() {
            return self.clone();
        }
        if let Some(shadowing) = self.get_complete_variant(path) {
            return CompoundWrite::from_tree(Tree::from_value(shadowing));
        }
        match self.write_tree.get_child(path) {
            Some(subtree) => CompoundWrite::from_tree(subtree.clone()),
            None => CompoundWrite::empty(),
        }
    }

    pub fn child_compound_writes(&self) -> BTreeMap<String, CompoundWrite> {
        let mut children = BTreeMap::new();
        for (key, subtree) in self.write_tree.children() {
            children.insert(key.clone(), CompoundWrite::from_tree(subtree.clone()));
        }
        children
    }

    pub fn is_empty(&self) -> bool {
        self.write_tree.is_empty()
    }

    /// Overlay every entry onto `base`, shallow entries first so deeper ones
    /// refine them.
    pub fn apply(&self, base: &Value) -> Value {
        Self::apply_subtree_write(&Path::root(), &self.write_tree, base.clone())
    }

    fn apply_subtree_write(relative_path: &Path, write_tree: &Tree<Value>, mut variant: Value) -> Value {
        if let Some(value) = write_tree.value() {
            // A write is always a leaf of the structure, so this subtree is done.
            variant_update_child(&mut variant, relative_path, value);
            return variant;
        }
        let mut priority_write = None;
        for (child_key, child_tree) in write_tree.children() {
            if is_priority_key(child_key) {
                // Apply priorities last so they are not applied to empty
                // variants, nor dropped from variants filled in afterwards.
                assert(
                    child_tree.children().is_empty(),
                    "Priority writes must always be leaf variants",
                );
                priority_write = child_tree.value();
            } else {
                variant =
                    Self::apply_subtree_write(&relative_path.child(child_key), child_tree, variant);
            }
        }
        if let Some(priority) = priority_write {
            if !variant_is_empty(variant_get_child(&variant, relative_path)) {
                variant_update_child(
                    &mut variant,
                    &relative_path.child(crate::variant::PRIORITY_KEY),
                    priority,
                );
            }
        }
        variant
    }

    pub fn write_tree(&self) -> &Tree<Value> {
        &self.write_tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_write() -> CompoundWrite {
        CompoundWrite::from_path_merge([
            (Path::new("aaa"), json!(1)),
            (Path::new("bbb"), json!(2)),
            (Path::new("ccc/ddd"), json!(3)),
            (Path::new("ccc/eee"), json!(4)),
            (Path::new("ccc/fff"), json!({"ggg": 5, "hhh": 6})),
        ])
    }

    #[test]
    fn empty_write() {
        let write = CompoundWrite::empty();
        assert!(write.is_empty());
        assert!(write.write_tree().is_empty());
        assert!(write.get_root_write().is_none());
    }

    #[test]
    fn from_child_merge() {
        let write = CompoundWrite::from_child_merge([("", json!(0))]);
        assert!(!write.is_empty());
        assert_eq!(write.get_root_write(), Some(&json!(0)));

        let write = CompoundWrite::from_child_merge([
            ("aaa", json!(1)),
            ("bbb", json!(2)),
            ("ccc/ddd", json!(3)),
            ("ccc/eee", json!(4)),
        ]);
        assert!(write.write_tree().value().is_none());
        assert_eq!(write.write_tree().get_value_at(&Path::new("aaa")), Some(&json!(1)));
        assert_eq!(write.write_tree().get_value_at(&Path::new("ccc")), None);
        assert_eq!(
            write.write_tree().get_value_at(&Path::new("ccc/ddd")),
            Some(&json!(3))
        );
        assert_eq!(write.write_tree().get_value_at(&Path::new("zzz")), None);
    }

    #[test]
    fn from_variant_merge() {
        let write = CompoundWrite::from_variant_merge(&json!({
            "aaa": 1,
            "ccc/ddd": 3,
        }));
        assert_eq!(write.write_tree().get_value_at(&Path::new("aaa")), Some(&json!(1)));
        assert_eq!(
            write.write_tree().get_value_at(&Path::new("ccc/ddd")),
            Some(&json!(3))
        );

        let scalar = CompoundWrite::from_variant_merge(&json!("whole value"));
        assert_eq!(scalar.get_root_write(), Some(&json!("whole value")));
    }

    #[test]
    fn add_write_at_root_replaces_everything() {
        let write = sample_write().add_write(&Path::root(), json!(100));
        assert_eq!(write.write_tree().get_value_at(&Path::new("aaa")), None);
        assert_eq!(write.write_tree().get_value_at(&Path::new("ccc/ddd")), None);
        assert_eq!(write.get_root_write(), Some(&json!(100)));
    }

    #[test]
    fn add_write_alongside_existing_data() {
        let write = sample_write().add_write(&Path::new("iii/jjj"), json!(100));
        assert_eq!(write.write_tree().get_value_at(&Path::new("aaa")), Some(&json!(1)));
        assert_eq!(
            write.write_tree().get_value_at(&Path::new("iii/jjj")),
            Some(&json!(100))
        );
    }

    #[test]
    fn add_write_below_existing_entry_updates_it() {
        let write = sample_write().add_write(&Path::new("ccc/fff/ggg"), json!(100));
        assert_eq!(
            write.write_tree().get_value_at(&Path::new("ccc/fff")),
            Some(&json!({"ggg": 100, "hhh": 6}))
        );
    }

    #[test]
    fn add_write_priority_on_missing_deep_node_is_ignored() {
        let write = sample_write();
        let updated = write.add_write(&Path::new("aaa/bad_path/.priority"), json!(100));
        assert_eq!(updated, write);

        let with_priority = write.add_write(&Path::new("ccc/.priority"), json!(100));
        assert_eq!(
            with_priority.write_tree().get_value_at(&Path::new("ccc/.priority")),
            Some(&json!(100))
        );
        assert_eq!(
            with_priority.write_tree().get_value_at(&Path::new("ccc/ddd")),
            Some(&json!(3))
        );
    }

    #[test]
    fn add_writes_reparents_a_merge() {
        let second = CompoundWrite::from_path_merge([
            (Path::new("zzz"), json!(-1)),
            (Path::new("xxx/www"), json!(-3)),
        ]);
        let third = CompoundWrite::from_path_merge([
            (Path::new("apple"), json!(1111)),
            (Path::new("carrot/date"), json!(3333)),
        ]);

        let updated = sample_write().add_writes(&Path::root(), &second);
        assert_eq!(updated.write_tree().get_value_at(&Path::new("aaa")), Some(&json!(1)));
        assert_eq!(updated.write_tree().get_value_at(&Path::new("zzz")), Some(&json!(-1)));
        assert_eq!(
            updated.write_tree().get_value_at(&Path::new("xxx/www")),
            Some(&json!(-3))
        );

        let updated = updated.add_writes(&Path::new("ccc"), &third);
        assert_eq!(
            updated.write_tree().get_value_at(&Path::new("ccc/apple")),
            Some(&json!(1111))
        );
        assert_eq!(
            updated.write_tree().get_value_at(&Path::new("ccc/carrot/date")),
            Some(&json!(3333))
        );
        assert_eq!(updated.write_tree().get_value_at(&Path::new("ccc/ddd")), Some(&json!(3)));
    }

    #[test]
    fn remove_write_clears_a_branch() {
        let write = sample_write().remove_write(&Path::new("aaa"));
        assert_eq!(write.write_tree().get_value_at(&Path::new("aaa")), None);
        assert_eq!(write.write_tree().get_value_at(&Path::new("bbb")), Some(&json!(2)));

        let cleared = sample_write().remove_write(&Path::root());
        assert!(cleared.is_empty());
    }

    #[test]
    fn has_complete_write_considers_ancestors_only() {
        let write = sample_write();
        assert!(write.has_complete_write(&Path::new("aaa")));
        assert!(!write.has_complete_write(&Path::new("ccc")));
        assert!(write.has_complete_write(&Path::new("ccc/ddd")));
        assert!(write.has_complete_write(&Path::new("ccc/fff/ggg")));
        assert!(!write.has_complete_write(&Path::new("zzz")));
        assert!(!write.has_complete_write(&Path::root()));
    }

    #[test]
    fn get_complete_variant_descends_into_entries() {
        let write = sample_write();
        assert_eq!(write.get_complete_variant(&Path::root()), None);
        assert_eq!(write.get_complete_variant(&Path::new("aaa")), Some(json!(1)));
        assert_eq!(
            write.get_complete_variant(&Path::new("ccc/fff/ggg")),
            Some(json!(5))
        );
        // Below a complete entry, missing children are complete nulls.
        assert_eq!(
            write.get_complete_variant(&Path::new("ccc/fff/iii")),
            Some(Value::Null)
        );
        assert_eq!(write.get_complete_variant(&Path::new("zzz")), None);
    }

    #[test]
    fn complete_children_lists_top_level_entries() {
        let children = sample_write().get_complete_children();
        assert_eq!(
            children,
            vec![("aaa".to_string(), json!(1)), ("bbb".to_string(), json!(2))]
        );

        let rooted = CompoundWrite::from_path_merge([(Path::root(), json!({"x": 1, "y": 2}))]);
        assert_eq!(
            rooted.get_complete_children(),
            vec![("x".to_string(), json!(1)), ("y".to_string(), json!(2))]
        );
    }

    #[test]
    fn child_compound_write_slices_subtrees() {
        let child = sample_write().child_compound_write(&Path::new("ccc"));
        assert_eq!(child.write_tree().get_value_at(&Path::new("ddd")), Some(&json!(3)));
        assert_eq!(child.write_tree().get_value_at(&Path::new("eee")), Some(&json!(4)));
        assert_eq!(child.write_tree().get_value_at(&Path::new("aaa")), None);
    }

    #[test]
    fn child_compound_write_collapses_shadowing_entries() {
        let write = CompoundWrite::from_path_merge([
            (Path::new("ccc"), json!(-9999)),
            (Path::new("ccc/ddd"), json!(3)),
        ]);
        let child = write.child_compound_write(&Path::new("ccc"));
        assert_eq!(child.get_root_write(), Some(&json!(-9999)));
    }

    #[test]
    fn child_compound_writes_splits_top_level() {
        let writes = sample_write().child_compound_writes();
        assert_eq!(writes.len(), 3);
        assert_eq!(writes["aaa"].get_root_write(), Some(&json!(1)));
        assert_eq!(
            writes["ccc"].write_tree().get_value_at(&Path::new("ddd")),
            Some(&json!(3))
        );
    }

    #[test]
    fn apply_overlays_entries_onto_base() {
        let result = sample_write().apply(&json!({"zzz": 100}));
        assert_eq!(
            result,
            json!({
                "aaa": 1,
                "bbb": 2,
                "ccc": {"ddd": 3, "eee": 4, "fff": {"ggg": 5, "hhh": 6}},
                "zzz": 100,
            })
        );
    }

    #[test]
    fn apply_priority_entries_only_on_nonempty_targets() {
        let write = CompoundWrite::empty().add_write(&Path::new("a/.priority"), json!(5));
        assert_eq!(write.apply(&Value::Null), Value::Null);
        assert_eq!(
            write.apply(&json!({"a": 1})),
            json!({"a": {".value": 1, ".priority": 5}})
        );
    }

    #[test]
    fn equality_is_structural() {
        assert_eq!(sample_write(), sample_write());
        let different = sample_write().add_write(&Path::new("ccc/fff/hhh"), json!(100));
        assert_ne!(sample_write(), different);
    }
}
