use serde_json::Value;

use crate::path::Path;
use crate::query::{Post, QueryParams, QueryParamsComparator};
use crate::variant::{get_effective_children, variant_is_leaf, NULL_VARIANT};
use crate::view::change::ChildChangeAccumulator;
use crate::view::indexed_filter::IndexedFilter;
use crate::view::indexed_variant::IndexedVariant;
use crate::view::variant_filter::{CompleteChildSource, VariantFilter};

/// Restricts a view to the children between its query's start and end bounds.
pub struct RangedFilter {
    indexed_filter: IndexedFilter,
    query_params: QueryParams,
    start_post: Post,
    end_post: Post,
}

impl RangedFilter {
    pub fn new(query_params: QueryParams) -> Self {
        let start_post = query_params.start_post();
        let end_post = query_params.end_post();
        Self {
            indexed_filter: IndexedFilter::new(query_params.clone()),
            query_params,
            start_post,
            end_post,
        }
    }

    pub fn start_post(&self) -> &Post {
        &self.start_post
    }

    pub fn end_post(&self) -> &Post {
        &self.end_post
    }

    /// True if the child sorts within the query's bounds.
    pub fn matches(&self, child: &(String, Value)) -> bool {
        let comparator = QueryParamsComparator::new(&self.query_params);
        let post = Post::named(child.0.clone(), child.1.clone());
        comparator.compare_posts(&self.start_post, &post) != std::cmp::Ordering::Greater
            && comparator.compare_posts(&post, &self.end_post) != std::cmp::Ordering::Greater
    }
}

impl VariantFilter for RangedFilter {
    fn update_child(
        &self,
        indexed_variant: &IndexedVariant,
        key: &str,
        new_child: &Value,
        affected_path: &Path,
        source: &dyn CompleteChildSource,
        change_accumulator: Option<&mut ChildChangeAccumulator>,
    ) -> IndexedVariant {
        let new_child = if self.matches(&(key.to_string(), new_child.clone())) {
            new_child
        } else {
            &NULL_VARIANT
        };
        self.indexed_filter.update_child(
            indexed_variant,
            key,
            new_child,
            affected_path,
            source,
            change_accumulator,
        )
    }

    fn update_full_variant(
        &self,
        old_snap: &IndexedVariant,
        new_snap: &IndexedVariant,
        change_accumulator: Option<&mut ChildChangeAccumulator>,
    ) -> IndexedVariant {
        let filtered = if variant_is_leaf(new_snap.variant()) {
            // Leaves carry no children into a windowed view.
            IndexedVariant::with_params(Value::Null, self.query_params.clone())
        } else {
            // Windowed views do not track priorities.
            let mut filtered = new_snap.update_priority(&Value::Null);
            for (key, value) in get_effective_children(new_snap.variant()) {
                if !self.matches(&(key.clone(), value.clone())) {
                    filtered = filtered.update_child(key, &Value::Null);
                }
            }
            filtered
        };
        self.indexed_filter
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
        &self.indexed_filter
    }

    fn query_params(&self) -> &QueryParams {
        &self.query_params
    }
}
