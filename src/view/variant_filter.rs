use serde_json::Value;

use crate::core::write_tree::IterationDirection;
use crate::path::Path;
use crate::query::QueryParams;
use crate::view::change::ChildChangeAccumulator;
use crate::view::indexed_variant::IndexedVariant;

/// Supplies children a filter may need that are not part of the snapshot it
/// is updating, e.g. to pull a replacement into a limit window.
pub trait CompleteChildSource {
    fn get_complete_child(&self, child_key: &str) -> Option<Value>;

    fn get_child_after_child(
        &self,
        query_params: &QueryParams,
        child: &(String, Value),
        direction: IterationDirection,
    ) -> Option<(String, Value)>;
}

/// Applies incoming data to a view's snapshot, restricting it to what the
/// view's query admits and tracking the child-level changes that result.
pub trait VariantFilter {
    /// Update a single child and return the new filtered snapshot.
    fn update_child(
        &self,
        indexed_variant: &IndexedVariant,
        key: &str,
        new_child: &Value,
        affected_path: &Path,
        source: &dyn CompleteChildSource,
        change_accumulator: Option<&mut ChildChangeAccumulator>,
    ) -> IndexedVariant;

    /// Replace the whole snapshot and return the filtered result.
    fn update_full_variant(
        &self,
        old_snap: &IndexedVariant,
        new_snap: &IndexedVariant,
        change_accumulator: Option<&mut ChildChangeAccumulator>,
    ) -> IndexedVariant;

    /// Update the snapshot's priority.
    fn update_priority(&self, old_snap: &IndexedVariant, new_priority: &Value) -> IndexedVariant;

    /// True if this filter may drop children, in which case snapshots it
    /// produces must be marked filtered.
    fn filters_variants(&self) -> bool;

    /// The change-tracking filter this filter delegates to, used where data
    /// must be indexed but not windowed.
    fn indexed_filter(&self) -> &dyn VariantFilter;

    fn query_params(&self) -> &QueryParams;
}

/// A [`CompleteChildSource`] that never offers additional children.
pub struct NoCompleteSource;

impl CompleteChildSource for NoCompleteSource {
    fn get_complete_child(&self, _child_key: &str) -> Option<Value> {
        None
    }

    fn get_child_after_child(
        &self,
        _query_params: &QueryParams,
        _child: &(String, Value),
        _direction: IterationDirection,
    ) -> Option<(String, Value)> {
        None
    }
}

/// Build the filter a query's params call for: plain indexing when the query
/// loads all data, a range filter for start/end bounds, a limit filter when a
/// window size is set.
pub fn variant_filter_from_query_params(params: &QueryParams) -> Box<dyn VariantFilter> {
    if params.loads_all_data() {
        Box::new(crate::view::indexed_filter::IndexedFilter::new(params.clone()))
    } else if params.limit.is_none() {
        Box::new(crate::view::ranged_filter::RangedFilter::new(params.clone()))
    } else {
        Box::new(crate::view::limited_filter::LimitedFilter::new(params.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{QueryBound, QueryLimit};
    use serde_json::json;

    #[test]
    fn factory_picks_the_cheapest_filter() {
        let params = QueryParams::default();
        assert!(!variant_filter_from_query_params(&params).filters_variants());

        let mut ranged = QueryParams::default();
        ranged
            .set_start(QueryBound {
                value: json!("m"),
                name: None,
            })
            .unwrap();
        assert!(variant_filter_from_query_params(&ranged).filters_variants());

        let mut limited = QueryParams::default();
        limited.set_limit(QueryLimit::First(3)).unwrap();
        assert!(variant_filter_from_query_params(&limited).filters_variants());
    }

    #[test]
    fn no_complete_source_returns_nothing() {
        let source = NoCompleteSource;
        assert_eq!(source.get_complete_child("key"), None);
        assert_eq!(
            source.get_child_after_child(
                &QueryParams::default(),
                &("key".to_string(), json!(1)),
                IterationDirection::Forward,
            ),
            None
        );
    }
}
