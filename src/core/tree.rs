use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::path::Path;

/// A tree whose nodes can each hold a value, keyed by path segments.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tree<T> {
    value: Option<T>,
    children: BTreeMap<String, Tree<T>>,
}

impl<T> Default for Tree<T> {
    fn default() -> Self {
        Self {
            value: None,
            children: BTreeMap::new(),
        }
    }
}

impl<T> Tree<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: impl Into<Option<T>>) -> Self {
        Self {
            value: value.into(),
            children: BTreeMap::new(),
        }
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn set_value(&mut self, value: impl Into<Option<T>>) {
        self.value = value.into();
    }

    pub fn children(&self) -> &BTreeMap<String, Tree<T>> {
        &self.children
    }

    /// True if no node in the tree holds a value.
    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.children.values().all(|child| child.is_empty())
    }

    pub fn get_child(&self, path: &Path) -> Option<&Tree<T>> {
        let mut current = self;
        for segment in path.segments() {
            current = current.children.get(segment)?;
        }
        Some(current)
    }

    pub fn get_child_mut(&mut self, path: &Path) -> Option<&mut Tree<T>> {
        let mut current = self;
        for segment in path.segments() {
            current = current.children.get_mut(segment)?;
        }
        Some(current)
    }

    pub fn get_or_make_subtree(&mut self, path: &Path) -> &mut Tree<T> {
        let mut current = self;
        for segment in path.segments() {
            current = current.children.entry(segment.clone()).or_default();
        }
        current
    }

    /// Set the value at a child location, creating intermediate nodes as
    /// required.
    pub fn set_value_at(&mut self, path: &Path, value: impl Into<Option<T>>) {
        self.get_or_make_subtree(path).value = value.into();
    }

    pub fn get_value_at(&self, path: &Path) -> Option<&T> {
        self.get_child(path)?.value.as_ref()
    }

    /// The path of the shallowest node holding a value along `path`
    /// (inclusive of the root and of `path` itself).
    pub fn find_root_most_path_with_value(&self, path: &Path) -> Option<Path> {
        self.find_root_most_matching(path, |_| true)
    }

    /// Like [`Tree::find_root_most_path_with_value`], restricted to values
    /// accepted by `predicate`.
    pub fn find_root_most_matching(
        &self,
        path: &Path,
        predicate: impl Fn(&T) -> bool,
    ) -> Option<Path> {
        if self.value.as_ref().is_some_and(&predicate) {
            return Some(Path::root());
        }
        let mut current = self;
        let mut walked: Vec<String> = Vec::new();
        for segment in path.segments() {
            current = current.children.get(segment)?;
            walked.push(segment.clone());
            if current.value.as_ref().is_some_and(&predicate) {
                return Some(Path::from_segments(walked));
            }
        }
        None
    }

    /// Fold every value in the tree, depth first in key order, passing each
    /// value's path relative to this node.
    pub fn fold<A>(&self, init: A, mut f: impl FnMut(&Path, &T, A) -> A) -> A {
        self.fold_inner(&Path::root(), init, &mut f)
    }

    fn fold_inner<A>(&self, prefix: &Path, init: A, f: &mut impl FnMut(&Path, &T, A) -> A) -> A {
        let mut acc = init;
        if let Some(value) = &self.value {
            acc = f(prefix, value, acc);
        }
        for (key, child) in &self.children {
            acc = child.fold_inner(&prefix.child(key), acc, f);
        }
        acc
    }

    pub fn call_on_each(&self, mut f: impl FnMut(&Path, &T)) {
        self.fold((), |path, value, ()| f(path, value));
    }
}
