use std::cmp::Ordering;

use serde_json::Value;

use crate::core::write_tree::IterationDirection;
use crate::path::Path;
use crate::query::{Post, QueryLimit, QueryParams, QueryParamsComparator};
use crate::variant::{
    get_internal_variant_key, variant_is_empty, variant_is_leaf, NULL_VARIANT,
};
use crate::view::change::{Change, ChildChangeAccumulator};
use crate::view::indexed_variant::IndexedVariant;
use crate::view::ranged_filter::RangedFilter;
use crate::view::variant_filter::{CompleteChildSource, VariantFilter};

/// Restricts a view to a fixed-size window of its range, keeping the window
/// full by pulling in replacement children as others leave.
pub struct LimitedFilter {
    ranged_filter: RangedFilter,
    query_params: QueryParams,
    limit: usize,
    reverse: bool,
}

impl LimitedFilter {
    pub fn new(query_params: QueryParams) -> Self {
        let (limit, reverse) = match query_params.limit {
            Some(QueryLimit::First(limit)) => (limit as usize, false),
            Some(QueryLimit::Last(limit)) => (limit as usize, true),
            None => (usize::MAX, false),
        };
        Self {
            ranged_filter: RangedFilter::new(query_params.clone()),
            query_params,
            limit,
            reverse,
        }
    }

    fn full_limit_update_child(
        &self,
        old_indexed: &IndexedVariant,
        child_key: &str,
        child_snap: &Value,
        source: &dyn CompleteChildSource,
        mut change_accumulator: Option<&mut ChildChangeAccumulator>,
    ) -> IndexedVariant {
        let new_child_node = (child_key.to_string(), child_snap.clone());
        let window_boundary = if self.reverse {
            old_indexed.get_first_child()
        } else {
            old_indexed.get_last_child()
        };
        let Some(window_boundary) = window_boundary else {
            return old_indexed.clone();
        };
        let in_range = self.ranged_filter.matches(&new_child_node);
        let direction = if self.reverse {
            IterationDirection::Reverse
        } else {
            IterationDirection::Forward
        };
        let comparator = QueryParamsComparator::new(&self.query_params);

        let old_child_snap = get_internal_variant_key(old_indexed.variant(), child_key).cloned();
        if let Some(old_child_snap) = old_child_snap {
            // The child is currently in the window.
            let mut next_child =
                source.get_child_after_child(&self.query_params, &window_boundary, direction);
            while let Some(candidate) = &next_child {
                if candidate.0 == child_key
                    || get_internal_variant_key(old_indexed.variant(), &candidate.0).is_some()
                {
                    // The next child is already part of the window, e.g. a
                    // merge in the write tree not yet applied here. Skip past
                    // it; it will be updated separately.
                    next_child =
                        source.get_child_after_child(&self.query_params, candidate, direction);
                } else {
                    break;
                }
            }
            let compare_next = match &next_child {
                Some(next) => self.directed_compare(&comparator, next, &new_child_node),
                None => Ordering::Greater,
            };
            let remains_in_window =
                in_range && !variant_is_empty(child_snap) && compare_next != Ordering::Less;
            if remains_in_window {
                if let Some(accumulator) = change_accumulator.as_deref_mut() {
                    accumulator.track_child_change(Change::child_changed(
                        child_key,
                        child_snap.clone(),
                        old_child_snap.clone(),
                    ));
                }
                old_indexed.update_child(child_key, child_snap)
            } else {
                if let Some(accumulator) = change_accumulator.as_deref_mut() {
                    accumulator
                        .track_child_change(Change::child_removed(child_key, old_child_snap));
                }
                let new_indexed = old_indexed.update_child(child_key, &Value::Null);
                let next_child_in_range = next_child
                    .as_ref()
                    .is_some_and(|next| self.ranged_filter.matches(next));
                if next_child_in_range {
                    let next = next_child.expect("checked above");
                    if let Some(accumulator) = change_accumulator.as_deref_mut() {
                        accumulator.track_child_change(Change::child_added(
                            next.0.clone(),
                            next.1.clone(),
                        ));
                    }
                    new_indexed.update_child(&next.0, &next.1)
                } else {
                    new_indexed
                }
            }
        } else if variant_is_empty(child_snap) {
            // Deleting a child that was not in the window changes nothing.
            old_indexed.clone()
        } else if in_range {
            // The window is full; the new child competes with the boundary.
            if self.directed_compare(&comparator, &window_boundary, &new_child_node)
                != Ordering::Less
            {
                if let Some(accumulator) = change_accumulator.as_deref_mut() {
                    accumulator.track_child_change(Change::child_removed(
                        window_boundary.0.clone(),
                        window_boundary.1.clone(),
                    ));
                    accumulator
                        .track_child_change(Change::child_added(child_key, child_snap.clone()));
                }
                old_indexed
                    .update_child(child_key, child_snap)
                    .update_child(&window_boundary.0, &Value::Null)
            } else {
                old_indexed.clone()
            }
        } else {
            old_indexed.clone()
        }
    }

    /// Compare in iteration order: reversed windows flip the result.
    fn directed_compare(
        &self,
        comparator: &QueryParamsComparator<'_>,
        a: &(String, Value),
        b: &(String, Value),
    ) -> Ordering {
        let ordering = comparator.compare(&a.0, &a.1, &b.0, &b.1);
        if self.reverse {
            ordering.reverse()
        } else {
            ordering
        }
    }

    fn sign(&self, ordering: Ordering) -> Ordering {
        if self.reverse {
            ordering.reverse()
        } else {
            ordering
        }
    }
}

impl VariantFilter for LimitedFilter {
    fn update_child(
        &self,
        indexed_variant: &IndexedVariant,
        key: &str,
        new_child: &Value,
        affected_path: &Path,
        source: &dyn CompleteChildSource,
        change_accumulator: Option<&mut ChildChangeAccumulator>,
    ) -> IndexedVariant {
        let new_child = if self.ranged_filter.matches(&(key.to_string(), new_child.clone())) {
            new_child
        } else {
            &NULL_VARIANT
        };

        if get_internal_variant_key(indexed_variant.variant(), key) == Some(new_child) {
            // No change.
            return indexed_variant.clone();
        }
        if indexed_variant.index().len() < self.limit {
            self.ranged_filter.indexed_filter().update_child(
                indexed_variant,
                key,
                new_child,
                affected_path,
                source,
                change_accumulator,
            )
        } else {
            self.full_limit_update_child(indexed_variant, key, new_child, source, change_accumulator)
        }
    }

    fn update_full_variant(
        &self,
        old_snap: &IndexedVariant,
        new_snap: &IndexedVariant,
        change_accumulator: Option<&mut ChildChangeAccumulator>,
    ) -> IndexedVariant {
        let filtered;
        if variant_is_leaf(new_snap.variant()) || variant_is_empty(new_snap.variant()) {
            // Make sure we have a children node with the correct index.
            filtered = IndexedVariant::with_params(Value::Null, self.query_params.clone());
        } else {
            // Don't support priorities on queries.
            let mut result = new_snap.update_priority(&Value::Null);
            let comparator = QueryParamsComparator::new(&self.query_params);
            let start_post = if self.reverse {
                self.ranged_filter.end_post().clone()
            } else {
                self.ranged_filter.start_post().clone()
            };
            let end_post = if self.reverse {
                self.ranged_filter.start_post().clone()
            } else {
                self.ranged_filter.end_post().clone()
            };

            let mut count = 0usize;
            let mut found_start_post = false;
            let index: Vec<(String, Value)> = if self.reverse {
                new_snap.index().iter().rev().cloned().collect()
            } else {
                new_snap.index().to_vec()
            };
            for next in index {
                let next_post = Post::named(next.0.clone(), next.1.clone());
                if !found_start_post
                    && self.sign(comparator.compare_posts(&start_post, &next_post))
                        != Ordering::Greater
                {
                    found_start_post = true;
                }
                let in_range = found_start_post
                    && count < self.limit
                    && self.sign(comparator.compare_posts(&next_post, &end_post))
                        != Ordering::Greater;
                if in_range {
                    count += 1;
                } else {
                    result = result.update_child(&next.0, &Value::Null);
                }
            }
            filtered = result;
        }
        self.ranged_filter
            .indexed_filter()
            .update_full_variant(old_snap, &filtered, change_accumulator)
    }

    fn update_priority(&self, old_snap: &IndexedVariant, _new_priority: &Value) -> IndexedVariant {
        // Filtered variants never carry priorities.
        old_snap.clone()
    }

    fn filters_variants(&self) -> bool {
        true
    }

    fn indexed_filter(&self) -> &dyn VariantFilter {
        self.ranged_filter.indexed_filter()
    }

    fn query_params(&self) -> &QueryParams {
        &self.query_params
    }
}
