use serde_json::Value;

use crate::path::Path;
use crate::query::QueryParams;
use crate::util::assert;
use crate::variant::{
    get_effective_children, variant_get_child, variant_get_child_key, variant_is_empty,
    variant_is_leaf,
};
use crate::view::change::{Change, ChildChangeAccumulator};
use crate::view::indexed_variant::IndexedVariant;
use crate::view::variant_filter::{CompleteChildSource, VariantFilter};

/// A filter that admits every child and only tracks changes. The terminal
/// delegate of the ranged and limited filters.
pub struct IndexedFilter {
    query_params: QueryParams,
}

impl IndexedFilter {
    pub fn new(query_params: QueryParams) -> Self {
        Self { query_params }
    }
}

impl VariantFilter for IndexedFilter {
    fn update_child(
        &self,
        indexed_variant: &IndexedVariant,
        key: &str,
        new_child: &Value,
        affected_path: &Path,
        _source: &dyn CompleteChildSource,
        change_accumulator: Option<&mut ChildChangeAccumulator>,
    ) -> IndexedVariant {
        assert(
            indexed_variant.query_params() == &self.query_params,
            "The index must match the filter",
        );
        let variant = indexed_variant.variant();
        let old_child = variant_get_child_key(variant, key).clone();

        if variant_get_child(&old_child, affected_path) == variant_get_child(new_child, affected_path)
            && variant_is_empty(&old_child) == variant_is_empty(new_child)
        {
            // The update is a no-op at the affected location.
            return indexed_variant.clone();
        }

        if let Some(accumulator) = change_accumulator {
            if variant_is_empty(new_child) {
                if !variant_is_empty(&old_child) {
                    accumulator.track_child_change(Change::child_removed(key, old_child.clone()));
                } else {
                    assert(
                        variant_is_leaf(variant),
                        "A child remove without an old child only makes sense on a leaf",
                    );
                }
            } else if variant_is_empty(&old_child) {
                accumulator.track_child_change(Change::child_added(key, new_child.clone()));
            } else {
                accumulator.track_child_change(Change::child_changed(
                    key,
                    new_child.clone(),
                    old_child.clone(),
                ));
            }
        }

        if variant_is_leaf(variant) && variant_is_empty(new_child) {
            indexed_variant.clone()
        } else {
            indexed_variant.update_child(key, new_child)
        }
    }

    fn update_full_variant(
        &self,
        old_snap: &IndexedVariant,
        new_snap: &IndexedVariant,
        change_accumulator: Option<&mut ChildChangeAccumulator>,
    ) -> IndexedVariant {
        assert(
            new_snap.query_params() == &self.query_params,
            "The index must match the filter",
        );
        if let Some(accumulator) = change_accumulator {
            let old_children: std::collections::BTreeMap<&String, &Value> =
                get_effective_children(old_snap.variant()).into_iter().collect();
            let new_children: std::collections::BTreeMap<&String, &Value> =
                get_effective_children(new_snap.variant()).into_iter().collect();
            for (key, old_value) in &old_children {
                if !new_children.contains_key(*key) {
                    accumulator
                        .track_child_change(Change::child_removed(*key, (*old_value).clone()));
                }
            }
            for (key, new_value) in &new_children {
                match old_children.get(*key) {
                    Some(old_value) if old_value != new_value => {
                        accumulator.track_child_change(Change::child_changed(
                            *key,
                            (*new_value).clone(),
                            (*old_value).clone(),
                        ));
                    }
                    Some(_) => {}
                    None => {
                        accumulator
                            .track_child_change(Change::child_added(*key, (*new_value).clone()));
                    }
                }
            }
        }
        new_snap.clone()
    }

    fn update_priority(&self, old_snap: &IndexedVariant, new_priority: &Value) -> IndexedVariant {
        if variant_is_empty(old_snap.variant()) {
            old_snap.clone()
        } else {
            old_snap.update_priority(new_priority)
        }
    }

    fn filters_variants(&self) -> bool {
        false
    }

    fn indexed_filter(&self) -> &dyn VariantFilter {
        self
    }

    fn query_params(&self) -> &QueryParams {
        &self.query_params
    }
}
