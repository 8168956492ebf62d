use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::error::{invalid_argument, DatabaseResult};

/// An immutable slash-separated location in the database.
///
/// Empty segments are dropped, so `"a//b/"` and `"a/b"` name the same
/// location and the root path is spelled `""` or `"/"`.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Path {
    segments: Vec<String>,
}

const INVALID_KEY_CHARS: &[char] = &['#', '$', '[', ']'];

impl Path {
    pub fn new(path: &str) -> Self {
        Self {
            segments: path
                .split('/')
                .filter(|segment| !segment.is_empty())
                .map(|segment| segment.to_string())
                .collect(),
        }
    }

    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Like [`Path::new`] but rejects segments containing characters that are
    /// never valid in database keys. Used at API boundaries; internal callers
    /// construct paths directly.
    pub fn parse(path: &str) -> DatabaseResult<Self> {
        for segment in path.split('/') {
            if segment.contains(INVALID_KEY_CHARS) {
                return Err(invalid_argument(format!(
                    "Invalid path segment '{segment}': keys must not contain '#', '$', '[' or ']'"
                )));
            }
        }
        Ok(Self::new(path))
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The first segment, if any.
    pub fn front(&self) -> Option<&str> {
        self.segments.first().map(|s| s.as_str())
    }

    pub fn back(&self) -> Option<&str> {
        self.segments.last().map(|s| s.as_str())
    }

    /// Everything after the first segment.
    pub fn pop_front(&self) -> Path {
        if self.segments.is_empty() {
            return Path::root();
        }
        Path {
            segments: self.segments[1..].to_vec(),
        }
    }

    /// Everything before the last segment; the root's parent is the root.
    pub fn parent(&self) -> Path {
        if self.segments.is_empty() {
            return Path::root();
        }
        Path {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        }
    }

    /// Append a relative slash-separated string to this path.
    pub fn child(&self, relative: &str) -> Path {
        let mut segments = self.segments.clone();
        segments.extend(
            relative
                .split('/')
                .filter(|segment| !segment.is_empty())
                .map(|segment| segment.to_string()),
        );
        Path { segments }
    }

    pub fn child_path(&self, relative: &Path) -> Path {
        let mut segments = self.segments.clone();
        segments.extend(relative.segments.iter().cloned());
        Path { segments }
    }

    /// True if `self` is `other` or an ancestor of `other`.
    pub fn is_parent_of(&self, other: &Path) -> bool {
        if self.len() > other.len() {
            return false;
        }
        self.segments
            .iter()
            .zip(other.segments.iter())
            .all(|(l, r)| l == r)
    }

    /// The path from `from` to `to`, if `from` is a parent of `to`.
    pub fn relative(from: &Path, to: &Path) -> Option<Path> {
        if !from.is_parent_of(to) {
            return None;
        }
        Some(Path {
            segments: to.segments[from.len()..].to_vec(),
        })
    }

    pub fn compare(left: &Path, right: &Path) -> Ordering {
        left.segments.cmp(&right.segments)
    }

    pub fn canonical_string(&self) -> String {
        self.segments.join("/")
    }
}

impl Display for Path {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.canonical_string())
    }
}

impl From<&str> for Path {
    fn from(path: &str) -> Self {
        Path::new(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_render_path() {
        let path = Path::new("messages/room1/entries");
        assert_eq!(path.len(), 3);
        assert_eq!(path.front(), Some("messages"));
        assert_eq!(path.back(), Some("entries"));
        assert_eq!(path.canonical_string(), "messages/room1/entries");
    }

    #[test]
    fn empty_segments_are_dropped() {
        assert_eq!(Path::new("a//b/"), Path::new("a/b"));
        assert!(Path::new("/").is_empty());
        assert!(Path::new("").is_empty());
    }

    #[test]
    fn parse_rejects_invalid_key_characters() {
        let err = Path::parse("rooms/first#room").unwrap_err();
        assert_eq!(err.code_str(), "database/invalid-argument");
        assert!(Path::parse("rooms/.priority").is_ok());
    }

    #[test]
    fn front_and_pop_front() {
        let path = Path::new("a/b/c");
        assert_eq!(path.front(), Some("a"));
        assert_eq!(path.pop_front(), Path::new("b/c"));
        assert_eq!(Path::root().pop_front(), Path::root());
    }

    #[test]
    fn parent_drops_last_segment() {
        assert_eq!(Path::new("a/b/c").parent(), Path::new("a/b"));
        assert_eq!(Path::root().parent(), Path::root());
    }

    #[test]
    fn child_appends_segments() {
        let path = Path::new("a");
        assert_eq!(path.child("b/c"), Path::new("a/b/c"));
        assert_eq!(path.child_path(&Path::new("b/c")), Path::new("a/b/c"));
    }

    #[test]
    fn parent_relationship_is_inclusive() {
        let parent = Path::new("a/b");
        assert!(parent.is_parent_of(&Path::new("a/b")));
        assert!(parent.is_parent_of(&Path::new("a/b/c")));
        assert!(!parent.is_parent_of(&Path::new("a")));
        assert!(!parent.is_parent_of(&Path::new("a/x/c")));
        assert!(Path::root().is_parent_of(&Path::new("anything")));
    }

    #[test]
    fn relative_path() {
        let from = Path::new("a/b");
        let to = Path::new("a/b/c/d");
        assert_eq!(Path::relative(&from, &to), Some(Path::new("c/d")));
        assert_eq!(Path::relative(&from, &from), Some(Path::root()));
        assert_eq!(Path::relative(&to, &from), None);
        assert_eq!(Path::relative(&Path::new("x"), &to), None);
    }

    #[test]
    fn ordering_is_segment_wise() {
        assert_eq!(Path::compare(&Path::new("a/b"), &Path::new("a/b")), Ordering::Equal);
        assert_eq!(Path::compare(&Path::new("a"), &Path::new("a/b")), Ordering::Less);
        assert_eq!(Path::compare(&Path::new("b"), &Path::new("a/z")), Ordering::Greater);
    }
}
