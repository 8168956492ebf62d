//! Query ordering and windowing parameters, and the comparator they induce
//! over child nodes.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{invalid_argument, DatabaseResult};
use crate::path::Path;
use crate::util::assert;
use crate::variant::{
    child_key_compare, compare_priorities, compare_values, set_variant_at_path, variant_get_child,
    PRIORITY_KEY,
};

#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QueryIndex {
    #[default]
    Priority,
    Key,
    Value,
    Child(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryBound {
    pub value: Value,
    pub name: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryLimit {
    First(u32),
    Last(u32),
}

/// The ordering/range/limit spec a view was created with. Constructed by the
/// query layer; the synchronization core only reads it.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryParams {
    pub index: QueryIndex,
    pub start: Option<QueryBound>,
    pub end: Option<QueryBound>,
    pub limit: Option<QueryLimit>,
    order_by_called: bool,
}

impl QueryParams {
    pub fn set_index(&mut self, index: QueryIndex) -> DatabaseResult<()> {
        if self.order_by_called {
            return Err(invalid_argument("orderBy has already been specified"));
        }
        self.index = index;
        self.order_by_called = true;
        Ok(())
    }

    pub fn set_start(&mut self, bound: QueryBound) -> DatabaseResult<()> {
        if self.start.is_some() {
            return Err(invalid_argument("startAt has already been specified"));
        }
        self.start = Some(bound);
        Ok(())
    }

    pub fn set_end(&mut self, bound: QueryBound) -> DatabaseResult<()> {
        if self.end.is_some() {
            return Err(invalid_argument("endAt has already been specified"));
        }
        self.end = Some(bound);
        Ok(())
    }

    pub fn set_limit(&mut self, limit: QueryLimit) -> DatabaseResult<()> {
        if self.limit.is_some() {
            return Err(invalid_argument("limit has already been specified"));
        }
        self.limit = Some(limit);
        Ok(())
    }

    /// True if no range or limit constrains the result set; such a query sees
    /// complete server data.
    pub fn loads_all_data(&self) -> bool {
        self.start.is_none() && self.end.is_none() && self.limit.is_none()
    }

    pub fn is_default(&self) -> bool {
        self.loads_all_data() && matches!(self.index, QueryIndex::Priority)
    }

    pub fn has_start(&self) -> bool {
        self.start.is_some()
    }

    pub fn has_end(&self) -> bool {
        self.end.is_some()
    }

    /// The lowest node admitted by this query's range.
    pub fn start_post(&self) -> Post {
        match &self.start {
            Some(bound) => self.make_post(bound, Post::MIN_KEY),
            None => Post::Min,
        }
    }

    /// The highest node admitted by this query's range.
    pub fn end_post(&self) -> Post {
        match &self.end {
            Some(bound) => self.make_post(bound, Post::MAX_KEY),
            None => Post::Max,
        }
    }

    /// Build a synthetic node that sorts exactly where a bound value does
    /// under this query's index.
    fn make_post(&self, bound: &QueryBound, default_name: &str) -> Post {
        let name = bound.name.as_deref().unwrap_or(default_name);
        match &self.index {
            QueryIndex::Priority => {
                Post::named(name, json!({ PRIORITY_KEY: bound.value.clone() }))
            }
            QueryIndex::Child(child) => {
                let mut value = Value::Null;
                set_variant_at_path(&mut value, &Path::new(child), &bound.value);
                Post::named(name, value)
            }
            QueryIndex::Key => {
                assert(
                    bound.value.is_string(),
                    "Key index bounds must be string keys",
                );
                Post::named(bound.value.as_str().unwrap_or_default(), Value::Null)
            }
            QueryIndex::Value => Post::named(name, bound.value.clone()),
        }
    }
}

/// A point in a query's ordering: either a real child node or one of the
/// open-ended sentinels.
#[derive(Clone, Debug, PartialEq)]
pub enum Post {
    Min,
    Named { name: String, value: Value },
    Max,
}

impl Post {
    pub const MIN_KEY: &'static str = "[MIN_KEY]";
    pub const MAX_KEY: &'static str = "[MAX_KEY]";

    pub fn named(name: impl Into<String>, value: Value) -> Post {
        Post::Named {
            name: name.into(),
            value,
        }
    }

    pub fn from_child(child: &(String, Value)) -> Post {
        Post::named(child.0.clone(), child.1.clone())
    }
}

/// Compares child nodes according to a [`QueryParams`] index, falling back to
/// key order to break ties.
pub struct QueryParamsComparator<'a> {
    query_params: &'a QueryParams,
}

impl<'a> QueryParamsComparator<'a> {
    pub fn new(query_params: &'a QueryParams) -> Self {
        Self { query_params }
    }

    pub fn compare(&self, key_a: &str, value_a: &Value, key_b: &str, value_b: &Value) -> Ordering {
        match &self.query_params.index {
            QueryIndex::Priority => compare_priorities(value_a, value_b)
                .then_with(|| compare_keys(key_a, key_b)),
            QueryIndex::Child(child) => {
                let path = Path::new(child);
                compare_values(
                    variant_get_child(value_a, &path),
                    variant_get_child(value_b, &path),
                )
                .then_with(|| compare_keys(key_a, key_b))
            }
            QueryIndex::Key => compare_keys(key_a, key_b),
            QueryIndex::Value => {
                compare_values(value_a, value_b).then_with(|| compare_keys(key_a, key_b))
            }
        }
    }

    pub fn compare_posts(&self, a: &Post, b: &Post) -> Ordering {
        match (a, b) {
            (Post::Min, Post::Min) | (Post::Max, Post::Max) => Ordering::Equal,
            (Post::Min, _) | (_, Post::Max) => Ordering::Less,
            (_, Post::Min) | (Post::Max, _) => Ordering::Greater,
            (
                Post::Named {
                    name: name_a,
                    value: value_a,
                },
                Post::Named {
                    name: name_b,
                    value: value_b,
                },
            ) => self.compare(name_a, value_a, name_b, value_b),
        }
    }
}

/// Key ordering with the sentinel names honored: an unnamed range bound keeps
/// its `[MIN_KEY]`/`[MAX_KEY]` placeholder name, which must sort before or
/// after every real key.
fn compare_keys(key_a: &str, key_b: &str) -> Ordering {
    if key_a == key_b {
        Ordering::Equal
    } else if key_a == Post::MIN_KEY || key_b == Post::MAX_KEY {
        Ordering::Less
    } else if key_b == Post::MIN_KEY || key_a == Post::MAX_KEY {
        Ordering::Greater
    } else {
        child_key_compare(key_a, key_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutators_reject_double_specification() {
        let mut params = QueryParams::default();
        params.set_index(QueryIndex::Key).unwrap();
        let err = params.set_index(QueryIndex::Value).unwrap_err();
        assert_eq!(err.code_str(), "database/invalid-argument");

        params
            .set_limit(QueryLimit::First(5))
            .expect("first limit accepted");
        assert!(params.set_limit(QueryLimit::Last(5)).is_err());
    }

    #[test]
    fn default_params_load_all_data() {
        let params = QueryParams::default();
        assert!(params.loads_all_data());
        assert!(params.is_default());
        assert_eq!(params.start_post(), Post::Min);
        assert_eq!(params.end_post(), Post::Max);
    }

    #[test]
    fn ranged_params_are_not_default() {
        let mut params = QueryParams::default();
        params
            .set_start(QueryBound {
                value: json!("m"),
                name: None,
            })
            .unwrap();
        assert!(!params.loads_all_data());
        assert!(!params.is_default());
    }

    #[test]
    fn priority_ordering_breaks_ties_by_key() {
        let params = QueryParams::default();
        let comp = QueryParamsComparator::new(&params);

        let low = json!({".value": "x", ".priority": 1});
        let high = json!({".value": "x", ".priority": 2});
        assert_eq!(comp.compare("a", &low, "b", &high), Ordering::Less);
        assert_eq!(comp.compare("b", &low, "a", &low), Ordering::Greater);
        assert_eq!(comp.compare("a", &json!(1), "a", &json!(2)), Ordering::Equal);
    }

    #[test]
    fn value_ordering() {
        let mut params = QueryParams::default();
        params.set_index(QueryIndex::Value).unwrap();
        let comp = QueryParamsComparator::new(&params);

        assert_eq!(comp.compare("a", &json!(2), "b", &json!(10)), Ordering::Less);
        assert_eq!(
            comp.compare("a", &json!("b"), "b", &json!("a")),
            Ordering::Greater
        );
    }

    #[test]
    fn child_ordering_reads_nested_values() {
        let mut params = QueryParams::default();
        params
            .set_index(QueryIndex::Child("stats/rank".into()))
            .unwrap();
        let comp = QueryParamsComparator::new(&params);

        let first = json!({"stats": {"rank": 1}});
        let second = json!({"stats": {"rank": 5}});
        assert_eq!(comp.compare("z", &first, "a", &second), Ordering::Less);
    }

    #[test]
    fn sentinel_posts_bound_everything() {
        let params = QueryParams::default();
        let comp = QueryParamsComparator::new(&params);
        let node = Post::named("key", json!(1));

        assert_eq!(comp.compare_posts(&Post::Min, &node), Ordering::Less);
        assert_eq!(comp.compare_posts(&node, &Post::Max), Ordering::Less);
        assert_eq!(comp.compare_posts(&Post::Max, &node), Ordering::Greater);
        assert_eq!(comp.compare_posts(&Post::Min, &Post::Max), Ordering::Less);
        assert_eq!(comp.compare_posts(&Post::Min, &Post::Min), Ordering::Equal);
    }

    #[test]
    fn key_index_posts_use_the_bound_as_key() {
        let mut params = QueryParams::default();
        params.set_index(QueryIndex::Key).unwrap();
        params
            .set_start(QueryBound {
                value: json!("m"),
                name: None,
            })
            .unwrap();

        let comp = QueryParamsComparator::new(&params);
        let start = params.start_post();
        assert_eq!(
            comp.compare_posts(&start, &Post::named("n", json!(1))),
            Ordering::Less
        );
        assert_eq!(
            comp.compare_posts(&start, &Post::named("a", json!(1))),
            Ordering::Greater
        );
    }

    #[test]
    fn unnamed_bounds_tie_break_around_real_keys() {
        let mut params = QueryParams::default();
        params.set_index(QueryIndex::Value).unwrap();
        params
            .set_start(QueryBound {
                value: json!(2),
                name: None,
            })
            .unwrap();
        params
            .set_end(QueryBound {
                value: json!(4),
                name: None,
            })
            .unwrap();
        let comp = QueryParamsComparator::new(&params);

        // Nodes whose values equal the bounds are inside the range regardless
        // of their keys.
        assert_eq!(
            comp.compare_posts(&params.start_post(), &Post::named("a", json!(2))),
            Ordering::Less
        );
        assert_eq!(
            comp.compare_posts(&Post::named("z", json!(4)), &params.end_post()),
            Ordering::Less
        );
    }

    #[test]
    fn priority_index_posts_wrap_the_bound_as_priority() {
        let mut params = QueryParams::default();
        params
            .set_start(QueryBound {
                value: json!(5),
                name: None,
            })
            .unwrap();
        let comp = QueryParamsComparator::new(&params);

        let below = Post::named("x", json!({".value": 1, ".priority": 4}));
        let above = Post::named("x", json!({".value": 1, ".priority": 6}));
        assert_eq!(comp.compare_posts(&params.start_post(), &below), Ordering::Greater);
        assert_eq!(comp.compare_posts(&params.start_post(), &above), Ordering::Less);
    }
}
