use serde_json::Value;

use crate::query::{QueryParams, QueryParamsComparator};
use crate::variant::{
    combine_value_and_priority, get_effective_children, variant_update_child_key,
};

/// A variant paired with the ordered index its query params induce over the
/// children. The index is rebuilt on every update; like everything else in
/// the view layer the type is an immutable value.
#[derive(Clone, Debug, Default)]
pub struct IndexedVariant {
    variant: Value,
    query_params: QueryParams,
    index: Vec<(String, Value)>,
}

impl IndexedVariant {
    pub fn new(variant: Value) -> IndexedVariant {
        Self::with_params(variant, QueryParams::default())
    }

    pub fn with_params(variant: Value, query_params: QueryParams) -> IndexedVariant {
        let index = build_index(&variant, &query_params);
        IndexedVariant {
            variant,
            query_params,
            index,
        }
    }

    pub fn variant(&self) -> &Value {
        &self.variant
    }

    pub fn query_params(&self) -> &QueryParams {
        &self.query_params
    }

    /// The children in index order.
    pub fn index(&self) -> &[(String, Value)] {
        &self.index
    }

    pub fn update_child(&self, key: &str, new_child: &Value) -> IndexedVariant {
        let mut variant = self.variant.clone();
        variant_update_child_key(&mut variant, key, new_child);
        IndexedVariant::with_params(variant, self.query_params.clone())
    }

    pub fn update_priority(&self, priority: &Value) -> IndexedVariant {
        IndexedVariant::with_params(
            combine_value_and_priority(&self.variant, priority),
            self.query_params.clone(),
        )
    }

    pub fn get_first_child(&self) -> Option<(String, Value)> {
        self.index.first().cloned()
    }

    pub fn get_last_child(&self) -> Option<(String, Value)> {
        self.index.last().cloned()
    }

    /// The key of the child ordered immediately before `key`, or `None` if it
    /// is first (or absent).
    pub fn get_predecessor_child_name(&self, key: &str) -> Option<&str> {
        let position = self.index.iter().position(|(name, _)| name == key)?;
        if position == 0 {
            return None;
        }
        Some(&self.index[position - 1].0)
    }
}

impl PartialEq for IndexedVariant {
    fn eq(&self, other: &Self) -> bool {
        self.variant == other.variant && self.query_params == other.query_params
    }
}

impl From<Value> for IndexedVariant {
    fn from(variant: Value) -> Self {
        IndexedVariant::new(variant)
    }
}

fn build_index(variant: &Value, query_params: &QueryParams) -> Vec<(String, Value)> {
    let comparator = QueryParamsComparator::new(query_params);
    let mut index: Vec<(String, Value)> = get_effective_children(variant)
        .into_iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    index.sort_by(|(key_a, value_a), (key_b, value_b)| {
        comparator.compare(key_a, value_a, key_b, value_b)
    });
    index
}
