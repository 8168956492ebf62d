use once_cell::sync::Lazy;
use serde_json::Value;

use crate::core::compound_write::CompoundWrite;
use crate::core::operation::{AckStatus, Operation, OperationKind};
use crate::core::tree::Tree;
use crate::core::write_tree::{HiddenWriteInclusion, IterationDirection, WriteTreeRef};
use crate::logger::Logger;
use crate::path::Path;
use crate::query::{QueryIndex, QueryParams};
use crate::util::assert;
use crate::variant::{
    get_internal_variant, get_internal_variant_key, get_variant_priority, is_priority_key,
    variant_get_child, variant_get_child_key, variant_is_empty, variant_is_leaf,
    variant_update_child, variants_are_equivalent, NULL_VARIANT,
};
use crate::view::change::{Change, ChildChangeAccumulator};
use crate::view::indexed_filter::IndexedFilter;
use crate::view::indexed_variant::IndexedVariant;
use crate::view::variant_filter::{CompleteChildSource, NoCompleteSource, VariantFilter};
use crate::view::view_cache::{CacheNode, ViewCache};

static LOGGER: Lazy<Logger> = Lazy::new(|| Logger::new("@firebase/database-core"));

/// A [`CompleteChildSource`] backed by the write tree plus whatever server
/// data and old event caches are at hand, so pending writes and known server
/// state combine into complete children.
struct WriteTreeCompleteChildSource<'a> {
    writes: WriteTreeRef<'a>,
    view_cache: ViewCache,
    opt_complete_server_cache: Option<Value>,
}

impl<'a> WriteTreeCompleteChildSource<'a> {
    fn new(
        writes: WriteTreeRef<'a>,
        view_cache: ViewCache,
        opt_complete_server_cache: Option<Value>,
    ) -> Self {
        Self {
            writes,
            view_cache,
            opt_complete_server_cache,
        }
    }
}

impl CompleteChildSource for WriteTreeCompleteChildSource<'_> {
    fn get_complete_child(&self, child_key: &str) -> Option<Value> {
        let cache_node = self.view_cache.local_snap();
        if cache_node.is_complete_for_child(child_key) {
            return Some(
                get_internal_variant_key(cache_node.variant(), child_key)
                    .cloned()
                    .unwrap_or(Value::Null),
            );
        }
        let server_node = match &self.opt_complete_server_cache {
            Some(server_cache) => {
                // Only child nodes are requested, so the key index suffices.
                let mut params = QueryParams::default();
                params
                    .set_index(QueryIndex::Key)
                    .expect("fresh params accept an index");
                CacheNode::new(
                    IndexedVariant::with_params(server_cache.clone(), params),
                    true,
                    false,
                )
            }
            None => self.view_cache.server_snap().clone(),
        };
        self.writes.calc_complete_child(child_key, &server_node)
    }

    fn get_child_after_child(
        &self,
        query_params: &QueryParams,
        child: &(String, Value),
        direction: IterationDirection,
    ) -> Option<(String, Value)> {
        let server_data = match &self.opt_complete_server_cache {
            Some(server_cache) => Some(server_cache),
            None => self.view_cache.get_complete_server_snap(),
        };
        self.writes
            .calc_next_variant_after_post(server_data, child, direction, query_params)
    }
}

/// Turns an [`Operation`] into a new [`ViewCache`] plus the ordered list of
/// [`Change`]s the transition implies. The single place where server events,
/// user writes, acknowledgements and reverts meet the cached view state.
pub struct ViewProcessor {
    filter: Box<dyn VariantFilter>,
}

impl ViewProcessor {
    pub fn new(filter: Box<dyn VariantFilter>) -> Self {
        Self { filter }
    }

    pub fn apply_operation(
        &self,
        old_view_cache: &ViewCache,
        operation: &Operation,
        writes_cache: &WriteTreeRef<'_>,
        opt_complete_cache: Option<&Value>,
    ) -> (ViewCache, Vec<Change>) {
        let mut accumulator = ChildChangeAccumulator::new();
        let new_view_cache = match &operation.kind {
            OperationKind::Overwrite { snapshot } => {
                if operation.source.is_from_user() {
                    self.apply_user_overwrite(
                        old_view_cache,
                        &operation.path,
                        snapshot,
                        writes_cache,
                        opt_complete_cache,
                        &mut accumulator,
                    )
                } else {
                    // Filter the node on a tagged update, or when it was
                    // already filtered and the update is below the root (a
                    // root update may legitimately unfilter it again).
                    let filter_server_node = operation.source.tagged
                        || (old_view_cache.server_snap().filtered() && !operation.path.is_empty());
                    self.apply_server_overwrite(
                        old_view_cache,
                        &operation.path,
                        snapshot,
                        writes_cache,
                        opt_complete_cache,
                        filter_server_node,
                        &mut accumulator,
                    )
                }
            }
            OperationKind::Merge { children } => {
                if operation.source.is_from_user() {
                    self.apply_user_merge(
                        old_view_cache,
                        &operation.path,
                        children,
                        writes_cache,
                        opt_complete_cache,
                        &mut accumulator,
                    )
                } else {
                    let filter_server_node =
                        operation.source.tagged || old_view_cache.server_snap().filtered();
                    self.apply_server_merge(
                        old_view_cache,
                        &operation.path,
                        children,
                        writes_cache,
                        opt_complete_cache,
                        filter_server_node,
                        &mut accumulator,
                    )
                }
            }
            OperationKind::AckUserWrite {
                affected_tree,
                status,
            } => match status {
                AckStatus::Confirm => self.ack_user_write(
                    old_view_cache,
                    &operation.path,
                    affected_tree,
                    writes_cache,
                    opt_complete_cache,
                    &mut accumulator,
                ),
                AckStatus::Revert => self.revert_user_write(
                    old_view_cache,
                    &operation.path,
                    writes_cache,
                    opt_complete_cache,
                    &mut accumulator,
                ),
            },
            OperationKind::ListenComplete => {
                self.listen_complete(old_view_cache, &operation.path, writes_cache, &mut accumulator)
            }
        };

        let mut changes = accumulator.into_changes();
        Self::maybe_add_value_event(old_view_cache, &new_view_cache, &mut changes);
        (new_view_cache, changes)
    }

    fn maybe_add_value_event(
        old_view_cache: &ViewCache,
        new_view_cache: &ViewCache,
        changes: &mut Vec<Change>,
    ) {
        let local_snap = new_view_cache.local_snap();
        if !local_snap.fully_initialized() {
            return;
        }
        let is_leaf_or_empty =
            variant_is_leaf(local_snap.variant()) || variant_is_empty(local_snap.variant());
        let old_complete_snap = old_view_cache
            .get_complete_local_snap()
            .unwrap_or(&NULL_VARIANT);
        if !changes.is_empty()
            || !old_view_cache.local_snap().fully_initialized()
            || (is_leaf_or_empty && local_snap.variant() != old_view_cache.local_snap().variant())
            || !variants_are_equivalent(
                get_variant_priority(local_snap.variant()),
                get_variant_priority(old_complete_snap),
            )
        {
            changes.push(Change::value(local_snap.indexed_variant().clone()));
        }
    }

    /// Recompute the event cache after the server snapshot changed at
    /// `change_path`, raising child changes for whatever becomes visible.
    fn generate_event_cache_after_server_event(
        &self,
        view_cache: &ViewCache,
        change_path: &Path,
        writes_cache: &WriteTreeRef<'_>,
        source: &dyn CompleteChildSource,
        accumulator: &mut ChildChangeAccumulator,
    ) -> ViewCache {
        let old_local_snap = view_cache.local_snap();
        if writes_cache.shadowing_write(change_path).is_some() {
            // A pending write hides this change entirely.
            return view_cache.clone();
        }

        let new_local_cache: IndexedVariant;
        if change_path.is_empty() {
            assert(
                view_cache.server_snap().fully_initialized(),
                "If change path is empty, we must have complete server data",
            );
            let node_with_local_writes = if view_cache.server_snap().filtered() {
                // Only apply writes to complete children, or events could be
                // raised for incomplete ones: filtered server data cannot
                // vouch for deep writes.
                let server_cache = view_cache.get_complete_server_snap();
                let complete_children = match server_cache {
                    Some(cache) if !variant_is_leaf(cache) => cache.clone(),
                    _ => Value::Null,
                };
                Some(writes_cache.calc_complete_event_children(&complete_children))
            } else {
                writes_cache.calc_complete_event_cache(
                    view_cache.get_complete_server_snap(),
                    &[],
                    HiddenWriteInclusion::Exclude,
                )
            };
            assert(
                node_with_local_writes.is_some(),
                "Complete server data must produce a complete event cache",
            );
            let indexed_node = IndexedVariant::with_params(
                node_with_local_writes.expect("asserted above"),
                self.filter.query_params().clone(),
            );
            new_local_cache = self.filter.update_full_variant(
                old_local_snap.indexed_variant(),
                &indexed_node,
                Some(accumulator),
            );
        } else {
            let child_key = change_path.front().expect("change path is not empty");
            if is_priority_key(child_key) {
                assert(
                    change_path.len() == 1,
                    "Can't have a priority with additional path components",
                );
                // There may be overwrites for this priority.
                let updated_priority = writes_cache.calc_event_cache_after_server_overwrite(
                    change_path,
                    Some(old_local_snap.variant()),
                    Some(view_cache.server_snap().variant()),
                );
                new_local_cache = match updated_priority {
                    Some(priority) => self
                        .filter
                        .update_priority(old_local_snap.indexed_variant(), &priority),
                    // Priority did not change, keep the old node.
                    None => old_local_snap.indexed_variant().clone(),
                };
            } else {
                let child_change_path = change_path.pop_front();
                let new_local_child: Option<Value> = if old_local_snap
                    .is_complete_for_child(child_key)
                {
                    let local_child_update = writes_cache.calc_event_cache_after_server_overwrite(
                        change_path,
                        Some(old_local_snap.variant()),
                        Some(view_cache.server_snap().variant()),
                    );
                    match local_child_update {
                        Some(update) => {
                            let mut child =
                                variant_get_child_key(old_local_snap.variant(), child_key).clone();
                            variant_update_child(&mut child, &child_change_path, &update);
                            Some(child)
                        }
                        // Nothing changed, keep the old child.
                        None => Some(
                            variant_get_child_key(old_local_snap.variant(), child_key).clone(),
                        ),
                    }
                } else {
                    writes_cache.calc_complete_child(child_key, view_cache.server_snap())
                };
                new_local_cache = match new_local_child {
                    Some(child) => self.filter.update_child(
                        old_local_snap.indexed_variant(),
                        child_key,
                        &child,
                        &child_change_path,
                        source,
                        Some(accumulator),
                    ),
                    // No complete child available, or no change.
                    None => old_local_snap.indexed_variant().clone(),
                };
            }
        }

        view_cache.update_local_snap(
            new_local_cache,
            old_local_snap.fully_initialized() || change_path.is_empty(),
            self.filter.filters_variants(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_server_overwrite(
        &self,
        old_view_cache: &ViewCache,
        change_path: &Path,
        changed_snap: &Value,
        writes_cache: &WriteTreeRef<'_>,
        opt_complete_cache: Option<&Value>,
        filter_server_node: bool,
        accumulator: &mut ChildChangeAccumulator,
    ) -> ViewCache {
        let old_server_snap = old_view_cache.server_snap();
        let default_filter = IndexedFilter::new(QueryParams::default());
        let server_filter: &dyn VariantFilter = if filter_server_node {
            self.filter.as_ref()
        } else {
            &default_filter
        };

        let new_server_cache: IndexedVariant;
        if change_path.is_empty() {
            let new_indexed = IndexedVariant::with_params(
                changed_snap.clone(),
                server_filter.query_params().clone(),
            );
            new_server_cache = server_filter.update_full_variant(
                old_server_snap.indexed_variant(),
                &new_indexed,
                None,
            );
        } else if server_filter.filters_variants() && !old_server_snap.filtered() {
            // The server node needs filtering but has not been filtered yet;
            // simulate a full update.
            let child_key = change_path.front().expect("change path is not empty");
            let update_path = change_path.pop_front();
            let mut new_child = variant_get_child_key(old_server_snap.variant(), child_key).clone();
            variant_update_child(&mut new_child, &update_path, changed_snap);
            let new_server_node = old_server_snap
                .indexed_variant()
                .update_child(child_key, &new_child);
            new_server_cache = server_filter.update_full_variant(
                old_server_snap.indexed_variant(),
                &new_server_node,
                None,
            );
        } else {
            let child_key = change_path.front().expect("change path is not empty");
            if !old_server_snap.is_complete_for_path(change_path) && change_path.len() > 1 {
                // Incomplete nodes are not updated with changes intended for
                // other listeners.
                return old_view_cache.clone();
            }
            let child_change_path = change_path.pop_front();
            let mut new_child_node =
                variant_get_child_key(old_server_snap.variant(), child_key).clone();
            variant_update_child(&mut new_child_node, &child_change_path, changed_snap);
            if is_priority_key(child_key) {
                new_server_cache = server_filter
                    .update_priority(old_server_snap.indexed_variant(), &new_child_node);
            } else {
                new_server_cache = server_filter.update_child(
                    old_server_snap.indexed_variant(),
                    child_key,
                    &new_child_node,
                    &child_change_path,
                    &NoCompleteSource,
                    None,
                );
            }
        }

        let new_view_cache = old_view_cache.update_server_snap(
            new_server_cache,
            old_server_snap.fully_initialized() || change_path.is_empty(),
            server_filter.filters_variants(),
        );
        let source = WriteTreeCompleteChildSource::new(
            writes_cache.clone(),
            new_view_cache.clone(),
            opt_complete_cache.cloned(),
        );
        self.generate_event_cache_after_server_event(
            &new_view_cache,
            change_path,
            writes_cache,
            &source,
            accumulator,
        )
    }

    fn apply_user_overwrite(
        &self,
        old_view_cache: &ViewCache,
        change_path: &Path,
        changed_snap: &Value,
        writes_cache: &WriteTreeRef<'_>,
        opt_complete_cache: Option<&Value>,
        accumulator: &mut ChildChangeAccumulator,
    ) -> ViewCache {
        let old_local_snap = old_view_cache.local_snap();
        let source = WriteTreeCompleteChildSource::new(
            writes_cache.clone(),
            old_view_cache.clone(),
            opt_complete_cache.cloned(),
        );

        if change_path.is_empty() {
            let new_indexed = IndexedVariant::with_params(
                changed_snap.clone(),
                self.filter.query_params().clone(),
            );
            let new_local_cache = self.filter.update_full_variant(
                old_local_snap.indexed_variant(),
                &new_indexed,
                Some(accumulator),
            );
            return old_view_cache.update_local_snap(
                new_local_cache,
                true,
                self.filter.filters_variants(),
            );
        }

        let child_key = change_path.front().expect("change path is not empty");
        if is_priority_key(child_key) {
            let new_local_cache = self
                .filter
                .update_priority(old_local_snap.indexed_variant(), changed_snap);
            return old_view_cache.update_local_snap(
                new_local_cache,
                old_local_snap.fully_initialized(),
                old_local_snap.filtered(),
            );
        }

        let child_change_path = change_path.pop_front();
        let old_child = variant_get_child_key(old_local_snap.variant(), child_key).clone();
        let new_child: Value;
        if child_change_path.is_empty() {
            // Direct child overwrite.
            new_child = changed_snap.clone();
        } else {
            match source.get_complete_child(child_key) {
                Some(child_node) => {
                    if is_priority_key(&child_change_path.canonical_string())
                        && variant_is_empty(variant_get_child(
                            &child_node,
                            &child_change_path.parent(),
                        ))
                    {
                        // A priority update on an empty node. If the node
                        // exists on the server, the server will send the
                        // priority down with the next update.
                        new_child = child_node;
                    } else {
                        let mut child = child_node;
                        variant_update_child(&mut child, &child_change_path, changed_snap);
                        new_child = child;
                    }
                }
                // No complete child node available.
                None => new_child = Value::Null,
            }
        }
        if variants_are_equivalent(&old_child, &new_child) {
            return old_view_cache.clone();
        }
        let new_local_snap = self.filter.update_child(
            old_local_snap.indexed_variant(),
            child_key,
            &new_child,
            &child_change_path,
            &source,
            Some(accumulator),
        );
        old_view_cache.update_local_snap(
            new_local_snap,
            old_local_snap.fully_initialized(),
            self.filter.filters_variants(),
        )
    }

    fn cache_has_child(view_cache: &ViewCache, child_key: &str) -> bool {
        view_cache.local_snap().is_complete_for_child(child_key)
    }

    fn apply_user_merge(
        &self,
        view_cache: &ViewCache,
        path: &Path,
        changed_children: &CompoundWrite,
        writes_cache: &WriteTreeRef<'_>,
        opt_complete_cache: Option<&Value>,
        accumulator: &mut ChildChangeAccumulator,
    ) -> ViewCache {
        assert(
            changed_children.get_root_write().is_none(),
            "Can't have a merge that is an overwrite",
        );
        // In the case of a limit query, changes may bump children out of the
        // window and leave room for new ones. Those must be processed first,
        // so the changes are walked twice: first the ones affecting children
        // currently in view, then the rest.
        let mut current_view_cache =
            changed_children
                .write_tree()
                .fold(view_cache.clone(), |child_path, value, acc| {
                    let write_path = path.child_path(child_path);
                    if Self::cache_has_child(view_cache, write_path.front().unwrap_or_default()) {
                        self.apply_user_overwrite(
                            &acc,
                            &write_path,
                            value,
                            writes_cache,
                            opt_complete_cache,
                            accumulator,
                        )
                    } else {
                        acc
                    }
                });
        current_view_cache =
            changed_children
                .write_tree()
                .fold(current_view_cache, |child_path, value, acc| {
                    let write_path = path.child_path(child_path);
                    if !Self::cache_has_child(view_cache, write_path.front().unwrap_or_default()) {
                        self.apply_user_overwrite(
                            &acc,
                            &write_path,
                            value,
                            writes_cache,
                            opt_complete_cache,
                            accumulator,
                        )
                    } else {
                        acc
                    }
                });
        current_view_cache
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_server_merge(
        &self,
        view_cache: &ViewCache,
        path: &Path,
        changed_children: &CompoundWrite,
        writes_cache: &WriteTreeRef<'_>,
        opt_complete_cache: Option<&Value>,
        filter_server_node: bool,
        accumulator: &mut ChildChangeAccumulator,
    ) -> ViewCache {
        // With no server cache yet, this merge was intended for a previous
        // listen at the same location. Wait for the complete data update.
        if variant_is_empty(view_cache.server_snap().variant())
            && !view_cache.server_snap().fully_initialized()
        {
            LOGGER.debug("Ignoring server merge for uninitialized server cache");
            return view_cache.clone();
        }

        assert(
            changed_children.get_root_write().is_none(),
            "Can't have a merge that is an overwrite",
        );

        // Like user merges, children currently in view are processed first so
        // limit windows refill correctly.
        let actual_merge = if path.is_empty() {
            changed_children.clone()
        } else {
            CompoundWrite::empty().add_writes(path, changed_children)
        };
        let server_node = view_cache.server_snap().variant().clone();
        let child_compound_writes = actual_merge.child_compound_writes();

        let mut current_view_cache = view_cache.clone();
        for (child_key, child_write) in &child_compound_writes {
            if let Some(server_child) = get_internal_variant_key(&server_node, child_key) {
                let new_child = child_write.apply(server_child);
                current_view_cache = self.apply_server_overwrite(
                    &current_view_cache,
                    &Path::new(child_key),
                    &new_child,
                    writes_cache,
                    opt_complete_cache,
                    filter_server_node,
                    accumulator,
                );
            }
        }
        for (child_key, child_write) in &child_compound_writes {
            let is_unknown_deep_merge = !view_cache.server_snap().is_complete_for_child(child_key)
                && child_write.get_root_write().is_none();
            if get_internal_variant_key(&server_node, child_key).is_none() && !is_unknown_deep_merge
            {
                let new_child = child_write.apply(&Value::Null);
                current_view_cache = self.apply_server_overwrite(
                    &current_view_cache,
                    &Path::new(child_key),
                    &new_child,
                    writes_cache,
                    opt_complete_cache,
                    filter_server_node,
                    accumulator,
                );
            }
        }
        current_view_cache
    }

    fn ack_user_write(
        &self,
        view_cache: &ViewCache,
        ack_path: &Path,
        affected_tree: &Tree<bool>,
        writes_cache: &WriteTreeRef<'_>,
        opt_complete_cache: Option<&Value>,
        accumulator: &mut ChildChangeAccumulator,
    ) -> ViewCache {
        if writes_cache.shadowing_write(ack_path).is_some() {
            return view_cache.clone();
        }

        // Only filter the server node if it is already filtered.
        let filter_server_node = view_cache.server_snap().filtered();
        let server_cache = view_cache.server_snap();

        // The existing server cache for the affected paths is re-applied as a
        // server update now that the acked write no longer shadows it.
        if affected_tree.value().is_some() {
            // The acked write was an overwrite.
            if (ack_path.is_empty() && server_cache.fully_initialized())
                || server_cache.is_complete_for_path(ack_path)
            {
                let variant = get_internal_variant(server_cache.variant(), ack_path)
                    .cloned()
                    .unwrap_or(Value::Null);
                self.apply_server_overwrite(
                    view_cache,
                    ack_path,
                    &variant,
                    writes_cache,
                    opt_complete_cache,
                    filter_server_node,
                    accumulator,
                )
            } else if ack_path.is_empty() {
                // Data is acked at this location without full data. Re-apply
                // whatever is in the cache as a merge.
                let mut changed_children = CompoundWrite::empty();
                if let Some(map) = server_cache.variant().as_object() {
                    for (key, value) in map {
                        changed_children =
                            changed_children.add_write(&Path::new(key), value.clone());
                    }
                }
                self.apply_server_merge(
                    view_cache,
                    ack_path,
                    &changed_children,
                    writes_cache,
                    opt_complete_cache,
                    filter_server_node,
                    accumulator,
                )
            } else {
                view_cache.clone()
            }
        } else {
            // The acked write was a merge.
            let changed_children =
                affected_tree.fold(CompoundWrite::empty(), |merge_path, _, accum| {
                    let server_cache_path = ack_path.child_path(merge_path);
                    if server_cache.is_complete_for_path(&server_cache_path) {
                        accum.add_write(
                            merge_path,
                            get_internal_variant(server_cache.variant(), &server_cache_path)
                                .cloned(),
                        )
                    } else {
                        accum
                    }
                });
            self.apply_server_merge(
                view_cache,
                ack_path,
                &changed_children,
                writes_cache,
                opt_complete_cache,
                filter_server_node,
                accumulator,
            )
        }
    }

    fn revert_user_write(
        &self,
        view_cache: &ViewCache,
        path: &Path,
        writes_cache: &WriteTreeRef<'_>,
        opt_complete_server_cache: Option<&Value>,
        accumulator: &mut ChildChangeAccumulator,
    ) -> ViewCache {
        // A shadowing write hides this change; nothing to do.
        if writes_cache.shadowing_write(path).is_some() {
            return view_cache.clone();
        }

        let source = WriteTreeCompleteChildSource::new(
            writes_cache.clone(),
            view_cache.clone(),
            opt_complete_server_cache.cloned(),
        );
        let old_event_cache = view_cache.local_snap().indexed_variant().clone();
        let child_key = path.front().unwrap_or_default().to_string();

        let mut new_local_cache: IndexedVariant;
        if path.is_empty() || is_priority_key(&child_key) {
            // Generate a complete cache if the server snapshot is complete,
            // else recover as much as possible from the present children.
            let new_node = if view_cache.server_snap().fully_initialized() {
                writes_cache.calc_complete_event_cache(
                    view_cache.get_complete_server_snap(),
                    &[],
                    HiddenWriteInclusion::Exclude,
                )
            } else {
                Some(writes_cache.calc_complete_event_children(view_cache.server_snap().variant()))
            };
            let indexed_node = IndexedVariant::with_params(
                new_node.unwrap_or(Value::Null),
                self.filter.query_params().clone(),
            );
            new_local_cache =
                self.filter
                    .update_full_variant(&old_event_cache, &indexed_node, Some(accumulator));
        } else {
            let mut new_child =
                writes_cache.calc_complete_child(&child_key, view_cache.server_snap());
            if new_child.is_none()
                && view_cache
                    .server_snap()
                    .is_complete_for_child(&child_key)
            {
                new_child = get_internal_variant_key(old_event_cache.variant(), &child_key).cloned();
            }

            new_local_cache = match new_child {
                Some(child) => self.filter.update_child(
                    &old_event_cache,
                    &child_key,
                    &child,
                    &path.pop_front(),
                    &source,
                    Some(accumulator),
                ),
                None if get_internal_variant_key(
                    view_cache.local_snap().variant(),
                    &child_key,
                )
                .is_some() =>
                {
                    // No complete child available; delete the existing one.
                    self.filter.update_child(
                        &old_event_cache,
                        &child_key,
                        &Value::Null,
                        &path.pop_front(),
                        &source,
                        Some(accumulator),
                    )
                }
                None => old_event_cache.clone(),
            };

            if variant_is_empty(new_local_cache.variant())
                && view_cache.server_snap().fully_initialized()
            {
                // All child writes may have been reverted and the old event
                // cache was a leaf node.
                let complete = writes_cache.calc_complete_event_cache(
                    view_cache.get_complete_server_snap(),
                    &[],
                    HiddenWriteInclusion::Exclude,
                );
                if let Some(complete) = complete {
                    if variant_is_leaf(&complete) {
                        let indexed_node = IndexedVariant::with_params(
                            complete,
                            self.filter.query_params().clone(),
                        );
                        new_local_cache = self.filter.update_full_variant(
                            &new_local_cache,
                            &indexed_node,
                            Some(accumulator),
                        );
                    }
                }
            }
        }

        let complete = view_cache.server_snap().fully_initialized()
            || writes_cache.shadowing_write(&Path::root()).is_some();
        view_cache.update_local_snap(new_local_cache, complete, self.filter.filters_variants())
    }

    fn listen_complete(
        &self,
        view_cache: &ViewCache,
        path: &Path,
        writes_cache: &WriteTreeRef<'_>,
        accumulator: &mut ChildChangeAccumulator,
    ) -> ViewCache {
        let old_server_node = view_cache.server_snap();
        let new_view_cache = view_cache.update_server_snap(
            old_server_node.indexed_variant().clone(),
            old_server_node.fully_initialized() || path.is_empty(),
            old_server_node.filtered(),
        );
        self.generate_event_cache_after_server_event(
            &new_view_cache,
            path,
            writes_cache,
            &NoCompleteSource,
            accumulator,
        )
    }
}
