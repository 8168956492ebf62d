use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::compound_write::CompoundWrite;
use crate::logger::Logger;
use crate::path::Path;
use crate::query::{Post, QueryParams, QueryParamsComparator};
use crate::util::assert;
use crate::variant::{
    get_effective_children, variant_get_child, variant_update_child, NULL_VARIANT,
};
use crate::view::view_cache::CacheNode;

static LOGGER: Lazy<Logger> = Lazy::new(|| Logger::new("@firebase/database-core"));

pub type WriteId = i64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverwriteVisibility {
    Invisible,
    Visible,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HiddenWriteInclusion {
    Exclude,
    Include,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IterationDirection {
    Forward,
    Reverse,
}

/// The payload of a pending user operation: a `set` carries the complete new
/// value, an `update` carries a merge of changed children.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum UserWrite {
    Overwrite(Value),
    Merge(CompoundWrite),
}

/// A single pending user-initiated write. Serializable so a persistence layer
/// can durably record the outstanding queue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserWriteRecord {
    pub write_id: WriteId,
    pub path: Path,
    pub write: UserWrite,
    pub visible: bool,
}

impl UserWriteRecord {
    pub fn is_overwrite(&self) -> bool {
        matches!(self.write, UserWrite::Overwrite(_))
    }

    pub fn overwrite(&self) -> Option<&Value> {
        match &self.write {
            UserWrite::Overwrite(value) => Some(value),
            UserWrite::Merge(_) => None,
        }
    }

    pub fn merge(&self) -> Option<&CompoundWrite> {
        match &self.write {
            UserWrite::Overwrite(_) => None,
            UserWrite::Merge(merge) => Some(merge),
        }
    }
}

/// The ordered ledger of pending user writes.
///
/// Tracks every `set` and `update` issued locally and not yet acknowledged by
/// the server, and maintains `visible_writes`, the layered union of all
/// visible writes, so that "what should the event cache show at this path"
/// can be answered without replaying the ledger. Writes are added with
/// [`WriteTree::add_overwrite`] / [`WriteTree::add_merge`] and retired with
/// [`WriteTree::remove_write`].
#[derive(Debug)]
pub struct WriteTree {
    /// The result of applying all visible writes. Excludes writes hidden by
    /// `visible = false` (transactions not yet applied locally) and writes
    /// completely shadowed by later ones.
    visible_writes: CompoundWrite,
    /// Every pending write regardless of visibility and shadowing. Needed to
    /// recompute arbitrary slices of the data, such as the world without a
    /// specific transaction's own write.
    all_writes: Vec<UserWriteRecord>,
    /// The ids passed to `add_overwrite`/`add_merge` must strictly increase.
    last_write_id: WriteId,
}

impl Default for WriteTree {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteTree {
    pub fn new() -> Self {
        Self {
            visible_writes: CompoundWrite::empty(),
            all_writes: Vec::new(),
            last_write_id: -1,
        }
    }

    /// A view of this ledger scoped to `path`, for use by a sync point at
    /// that location.
    pub fn child_writes(&self, path: Path) -> WriteTreeRef<'_> {
        WriteTreeRef {
            path,
            write_tree: self,
        }
    }

    /// Record a new `set` from user code. The write id must be greater than
    /// that of every previous overwrite or merge.
    pub fn add_overwrite(
        &mut self,
        path: Path,
        snap: Value,
        write_id: WriteId,
        visibility: OverwriteVisibility,
    ) {
        assert(
            write_id > self.last_write_id,
            "Stacking an older write on top of newer ones",
        );
        let visible = visibility == OverwriteVisibility::Visible;
        if visible {
            self.visible_writes.add_write_inline(&path, snap.clone());
        }
        self.all_writes.push(UserWriteRecord {
            write_id,
            path,
            write: UserWrite::Overwrite(snap),
            visible,
        });
        self.last_write_id = write_id;
    }

    /// Record a new `update` from user code. The write id must be greater
    /// than that of every previous overwrite or merge.
    pub fn add_merge(&mut self, path: Path, changed_children: CompoundWrite, write_id: WriteId) {
        assert(
            write_id > self.last_write_id,
            "Stacking an older write on top of newer ones",
        );
        self.visible_writes
            .add_writes_inline(&path, &changed_children);
        self.all_writes.push(UserWriteRecord {
            write_id,
            path,
            write: UserWrite::Merge(changed_children),
            visible: true,
        });
        self.last_write_id = write_id;
    }

    pub fn get_write(&self, write_id: WriteId) -> Option<&UserWriteRecord> {
        self.all_writes
            .iter()
            .find(|record| record.write_id == write_id)
    }

    /// Abandon every pending write, returning the purged records. The write
    /// id sequence restarts, so the same ledger can be replayed verbatim
    /// afterwards.
    pub fn purge_all_writes(&mut self) -> Vec<UserWriteRecord> {
        LOGGER.debug(format!("Purging {} pending writes", self.all_writes.len()));
        self.visible_writes = CompoundWrite::empty();
        self.last_write_id = -1;
        std::mem::take(&mut self.all_writes)
    }

    /// Remove a write that the server acknowledged. Returns whether the write
    /// may have been visible, in which case the caller must reevaluate views
    /// and raise events.
    pub fn remove_write(&mut self, write_id: WriteId) -> bool {
        let position = self
            .all_writes
            .iter()
            .position(|record| record.write_id == write_id);
        assert(
            position.is_some(),
            "remove_write called with nonexistent write_id",
        );
        let position = position.expect("asserted above");
        let removed = self.all_writes.remove(position);

        if !removed.visible {
            return false;
        }

        let mut removed_write_is_shadowed = false;
        let mut removed_write_overlaps_with_other_writes = false;

        for index in (0..self.all_writes.len()).rev() {
            let current = &self.all_writes[index];
            if !current.visible {
                continue;
            }
            if index >= position && Self::record_contains_path(current, &removed.path) {
                // The removed write is completely shadowed by a later write.
                removed_write_is_shadowed = true;
                break;
            } else if removed.path.is_parent_of(&current.path) {
                // Either we cover some writes or they cover part of us.
                removed_write_overlaps_with_other_writes = true;
            }
        }

        if removed_write_is_shadowed {
            // The later write already determines every path the removed one
            // covered; the cached layering is untouched.
            true
        } else if removed_write_overlaps_with_other_writes {
            // Shadowing relationships cannot be fixed up incrementally;
            // rebuild the visible writes from scratch.
            self.reset_tree();
            true
        } else {
            match &removed.write {
                UserWrite::Overwrite(_) => {
                    self.visible_writes.remove_write_inline(&removed.path);
                }
                UserWrite::Merge(merge) => {
                    let keys: Vec<String> = merge.write_tree().children().keys().cloned().collect();
                    for key in keys {
                        self.visible_writes
                            .remove_write_inline(&removed.path.child(&key));
                    }
                }
            }
            true
        }
    }

    /// The complete visible write data at `path`, if any. Server data is not
    /// considered.
    pub fn get_complete_write_data(&self, path: &Path) -> Option<Value> {
        self.visible_writes.get_complete_variant(path)
    }

    /// Attempt to compute a complete snapshot for `tree_path` by layering
    /// pending writes over optional server data.
    ///
    /// `write_ids_to_exclude` removes specific writes from consideration
    /// (transactions use this to see the world without their own write);
    /// `include_hidden_writes` additionally layers writes recorded with
    /// [`OverwriteVisibility::Invisible`].
    pub fn calc_complete_event_cache(
        &self,
        tree_path: &Path,
        complete_server_cache: Option<&Value>,
        write_ids_to_exclude: &[WriteId],
        include_hidden_writes: HiddenWriteInclusion,
    ) -> Option<Value> {
        let include_hidden = include_hidden_writes == HiddenWriteInclusion::Include;
        if write_ids_to_exclude.is_empty() && !include_hidden {
            if let Some(shadowing) = self.shadowing_write(tree_path) {
                return Some(shadowing);
            }
            let sub_merge = self.visible_writes.child_compound_write(tree_path);
            if sub_merge.is_empty() {
                return complete_server_cache.cloned();
            }
            if complete_server_cache.is_none() && !sub_merge.has_complete_write(&Path::root()) {
                // No underlying data and no complete shadow; a complete
                // snapshot cannot be produced.
                return None;
            }
            let layered_cache = complete_server_cache.unwrap_or(&NULL_VARIANT);
            Some(sub_merge.apply(layered_cache))
        } else {
            let merge = self.visible_writes.child_compound_write(tree_path);
            if !include_hidden && merge.is_empty() {
                return complete_server_cache.cloned();
            }
            if !include_hidden
                && complete_server_cache.is_none()
                && !merge.has_complete_write(&Path::root())
            {
                return None;
            }
            let filter = |write: &UserWriteRecord| {
                (write.visible || include_hidden)
                    && !write_ids_to_exclude.contains(&write.write_id)
                    && (write.path.is_parent_of(tree_path) || tree_path.is_parent_of(&write.path))
            };
            let merge_at_path = Self::layer_tree(&self.all_writes, filter, tree_path);
            let layered_cache = complete_server_cache.cloned().unwrap_or(Value::Null);
            Some(merge_at_path.apply(&layered_cache))
        }
    }

    /// With underlying server children, return the children we have complete
    /// data for. Used to pre-fill a new view's event cache.
    pub fn calc_complete_event_children(
        &self,
        tree_path: &Path,
        complete_server_children: &Value,
    ) -> Value {
        if let Some(top_level_set) = self.visible_writes.get_complete_variant(tree_path) {
            if top_level_set.is_object() {
                return top_level_set;
            }
            return Value::Null;
        }
        // No top-level set; enumerate known server children, apply any
        // updates, then splice in children the writes fully determine.
        let mut complete_children = Value::Null;
        let merge = self.visible_writes.child_compound_write(tree_path);
        for (key, value) in get_effective_children(complete_server_children) {
            let key_path = Path::new(key);
            let child = merge.child_compound_write(&key_path).apply(value);
            variant_update_child(&mut complete_children, &key_path, &child);
        }
        for (key, value) in merge.get_complete_children() {
            variant_update_child(&mut complete_children, &Path::new(&key), &value);
        }
        complete_children
    }

    /// Given that server data changed at `tree_path`/`child_path`, decide
    /// what, if anything, applies to the event cache:
    /// completely shadowed yields no visible change, unshadowed passes the
    /// server value through, partially shadowed merges the sub-write over it.
    pub fn calc_event_cache_after_server_overwrite(
        &self,
        tree_path: &Path,
        child_path: &Path,
        existing_local_snap: Option<&Value>,
        existing_server_snap: Option<&Value>,
    ) -> Option<Value> {
        assert(
            existing_local_snap.is_some() || existing_server_snap.is_some(),
            "Either existing_local_snap or existing_server_snap must exist",
        );
        let path = tree_path.child_path(child_path);
        if self.visible_writes.has_complete_write(&path) {
            // Completely shadowed; no events.
            return None;
        }
        let child_merge = self.visible_writes.child_compound_write(&path);
        let server_snap = existing_server_snap.unwrap_or(&NULL_VARIANT);
        if child_merge.is_empty() {
            // Not shadowed at all; the server value applies as-is.
            Some(variant_get_child(server_snap, child_path).clone())
        } else {
            Some(child_merge.apply(variant_get_child(server_snap, child_path)))
        }
    }

    /// A complete value for `tree_path`/`child_key` after applying user
    /// writes to the server snapshot, if one can be produced.
    pub fn calc_complete_child(
        &self,
        tree_path: &Path,
        child_key: &str,
        existing_server_snap: &CacheNode,
    ) -> Option<Value> {
        let path = tree_path.child(child_key);
        if let Some(shadowing) = self.visible_writes.get_complete_variant(&path) {
            return Some(shadowing);
        }
        if existing_server_snap.is_complete_for_child(child_key) {
            let child_merge = self.visible_writes.child_compound_write(&path);
            let child = variant_get_child(existing_server_snap.variant(), &Path::new(child_key));
            return Some(child_merge.apply(child));
        }
        None
    }

    /// The next child past `post` in the query's order (or the previous one
    /// when iterating in reverse), considering both pending writes and server
    /// data. Used to pull a new child into a limit window when one is
    /// evicted.
    pub fn calc_next_variant_after_post(
        &self,
        tree_path: &Path,
        complete_server_data: Option<&Value>,
        post: &(String, Value),
        direction: IterationDirection,
        query_params: &QueryParams,
    ) -> Option<(String, Value)> {
        let merge = self.visible_writes.child_compound_write(tree_path);
        let to_iterate = match merge.get_complete_variant(&Path::root()) {
            Some(shadowing) => shadowing,
            None => match complete_server_data {
                Some(server_data) => merge.apply(server_data),
                // No children to iterate on.
                None => return None,
            },
        };

        let comparator = QueryParamsComparator::new(query_params);
        let post = Post::named(post.0.clone(), post.1.clone());
        let mut current_next: Option<(String, Value)> = None;
        for (key, value) in get_effective_children(&to_iterate) {
            let candidate = Post::named(key.clone(), value.clone());
            let past_post = match direction {
                IterationDirection::Forward => {
                    comparator.compare_posts(&candidate, &post) == std::cmp::Ordering::Greater
                }
                IterationDirection::Reverse => {
                    comparator.compare_posts(&candidate, &post) == std::cmp::Ordering::Less
                }
            };
            if !past_post {
                continue;
            }
            let closer = match &current_next {
                None => true,
                Some((current_key, current_value)) => {
                    let current = Post::named(current_key.clone(), current_value.clone());
                    match direction {
                        IterationDirection::Forward => {
                            comparator.compare_posts(&candidate, &current)
                                == std::cmp::Ordering::Less
                        }
                        IterationDirection::Reverse => {
                            comparator.compare_posts(&candidate, &current)
                                == std::cmp::Ordering::Greater
                        }
                    }
                }
            };
            if closer {
                current_next = Some((key.clone(), value.clone()));
            }
        }
        current_next
    }

    /// The complete value a visible write determines for `path`, if any.
    pub fn shadowing_write(&self, path: &Path) -> Option<Value> {
        self.visible_writes.get_complete_variant(path)
    }

    fn record_contains_path(record: &UserWriteRecord, path: &Path) -> bool {
        match &record.write {
            UserWrite::Overwrite(_) => record.path.is_parent_of(path),
            UserWrite::Merge(merge) => {
                let mut result = false;
                merge.write_tree().call_on_each(|current_path, _| {
                    if record.path.child_path(current_path).is_parent_of(path) {
                        result = true;
                    }
                });
                result
            }
        }
    }

    /// Re-layer the writes into a fresh `visible_writes` after a removal
    /// whose shadowing effects cannot be unwound incrementally.
    fn reset_tree(&mut self) {
        LOGGER.debug("Rebuilding visible write cache from the full ledger");
        self.visible_writes = Self::layer_tree(
            &self.all_writes,
            |record| record.visible,
            &Path::root(),
        );
        self.last_write_id = match self.all_writes.last() {
            Some(record) => record.write_id,
            None => -1,
        };
    }

    /// Layer the accepted writes into a single compound write rooted at
    /// `tree_root`, oldest first so newer writes win.
    fn layer_tree(
        writes: &[UserWriteRecord],
        filter: impl Fn(&UserWriteRecord) -> bool,
        tree_root: &Path,
    ) -> CompoundWrite {
        let mut compound_write = CompoundWrite::empty();
        for write in writes {
            if !filter(write) {
                continue;
            }
            let write_path = &write.path;
            match &write.write {
                UserWrite::Overwrite(overwrite) => {
                    if tree_root.is_parent_of(write_path) {
                        let relative_path = Path::relative(tree_root, write_path)
                            .expect("tree root is a parent of the write path");
                        compound_write =
                            compound_write.add_write(&relative_path, overwrite.clone());
                    } else if write_path.is_parent_of(tree_root) {
                        let relative_path = Path::relative(write_path, tree_root)
                            .expect("write path is a parent of the tree root");
                        compound_write = compound_write.add_write(
                            &Path::root(),
                            variant_get_child(overwrite, &relative_path).clone(),
                        );
                    } else {
                        // No overlap between the root and the write; skip it.
                    }
                }
                UserWrite::Merge(merge) => {
                    if tree_root.is_parent_of(write_path) {
                        let relative_path = Path::relative(tree_root, write_path)
                            .expect("tree root is a parent of the write path");
                        compound_write = compound_write.add_writes(&relative_path, merge);
                    } else if write_path.is_parent_of(tree_root) {
                        let relative_path = Path::relative(write_path, tree_root)
                            .expect("write path is a parent of the tree root");
                        if relative_path.is_empty() {
                            compound_write = compound_write.add_writes(&Path::root(), merge);
                        } else if let Some(deep_node) = merge.get_complete_variant(&relative_path)
                        {
                            compound_write = compound_write.add_write(&Path::root(), deep_node);
                        }
                    } else {
                        // No overlap between the root and the write; skip it.
                    }
                }
            }
        }
        compound_write
    }
}

/// A [`WriteTree`] scoped to a path, for convenient access to a particular
/// subtree. Every method forwards to the underlying tree with the ref's path
/// prepended; the ref borrows the tree and is created fresh per operation.
#[derive(Clone)]
pub struct WriteTreeRef<'a> {
    path: Path,
    write_tree: &'a WriteTree,
}

impl<'a> WriteTreeRef<'a> {
    pub fn calc_complete_event_cache(
        &self,
        complete_server_cache: Option<&Value>,
        write_ids_to_exclude: &[WriteId],
        include_hidden_writes: HiddenWriteInclusion,
    ) -> Option<Value> {
        self.write_tree.calc_complete_event_cache(
            &self.path,
            complete_server_cache,
            write_ids_to_exclude,
            include_hidden_writes,
        )
    }

    pub fn calc_complete_event_children(&self, complete_server_children: &Value) -> Value {
        self.write_tree
            .calc_complete_event_children(&self.path, complete_server_children)
    }

    pub fn calc_event_cache_after_server_overwrite(
        &self,
        path: &Path,
        existing_local_snap: Option<&Value>,
        existing_server_snap: Option<&Value>,
    ) -> Option<Value> {
        self.write_tree.calc_event_cache_after_server_overwrite(
            &self.path,
            path,
            existing_local_snap,
            existing_server_snap,
        )
    }

    pub fn shadowing_write(&self, path: &Path) -> Option<Value> {
        self.write_tree.shadowing_write(&self.path.child_path(path))
    }

    pub fn calc_complete_child(
        &self,
        child_key: &str,
        existing_server_cache: &CacheNode,
    ) -> Option<Value> {
        self.write_tree
            .calc_complete_child(&self.path, child_key, existing_server_cache)
    }

    pub fn calc_next_variant_after_post(
        &self,
        complete_server_data: Option<&Value>,
        post: &(String, Value),
        direction: IterationDirection,
        query_params: &QueryParams,
    ) -> Option<(String, Value)> {
        self.write_tree.calc_next_variant_after_post(
            &self.path,
            complete_server_data,
            post,
            direction,
            query_params,
        )
    }

    pub fn child(&self, child_key: &str) -> WriteTreeRef<'a> {
        WriteTreeRef {
            path: self.path.child(child_key),
            write_tree: self.write_tree,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_tree(&self) -> &'a WriteTree {
        self.write_tree
    }
}
