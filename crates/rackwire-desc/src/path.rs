use serde::{Deserialize, Serialize};

use crate::Symbol;

/// Hierarchical path: the ordered child names from the tree root down to a
/// node. Two paths are equal iff they have the same segments in the same
/// order.
///
/// Ordering is plain lexicographic tuple comparison over the segments. This
/// is the documented presentation order for hierarchy records; `node_10`
/// sorts before `node_2` unless names were pre-normalized to fixed-width
/// indices. Do not swap in natural ordering here.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TreePath(Vec<Symbol>);

impl TreePath {
    /// The empty (root) path.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn new(segments: Vec<Symbol>) -> Self {
        Self(segments)
    }

    /// Extend this path with one more child name, returning the new path.
    pub fn child(&self, name: impl Into<Symbol>) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.into());
        Self(segments)
    }

    /// Concatenate a relative path onto this one.
    pub fn join(&self, relative: &TreePath) -> Self {
        let mut segments = self.0.clone();
        segments.extend(relative.0.iter().cloned());
        Self(segments)
    }

    pub fn push(&mut self, name: impl Into<Symbol>) {
        self.0.push(name.into());
    }

    /// Path to the parent node, or `None` at the root.
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    /// Last segment, or `None` at the root.
    pub fn leaf(&self) -> Option<&str> {
        self.0.last().map(|s| s.as_str())
    }

    pub fn segments(&self) -> &[Symbol] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn starts_with(&self, prefix: &TreePath) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }

    /// Map every segment through `f`, preserving order.
    pub fn map_segments(&self, f: impl Fn(&str) -> Symbol) -> Self {
        Self(self.0.iter().map(|s| f(s)).collect())
    }
}

impl From<Vec<Symbol>> for TreePath {
    fn from(segments: Vec<Symbol>) -> Self {
        Self(segments)
    }
}

impl From<&[&str]> for TreePath {
    fn from(segments: &[&str]) -> Self {
        Self(segments.iter().map(|s| s.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for TreePath {
    fn from(segments: [&str; N]) -> Self {
        Self(segments.iter().map(|s| s.to_string()).collect())
    }
}

impl std::fmt::Display for TreePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl std::str::FromStr for TreePath {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Self::root());
        }
        Ok(Self(s.split('.').map(|p| p.to_string()).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_roundtrip() {
        let path: TreePath = "pod_0.rack_1.switch".parse().unwrap();
        assert_eq!(path.len(), 3);
        assert_eq!(path.to_string(), "pod_0.rack_1.switch");
        assert_eq!(path.leaf(), Some("switch"));
        assert_eq!(path.parent().unwrap().to_string(), "pod_0.rack_1");
    }

    #[test]
    fn join_and_prefix() {
        let base = TreePath::from(["pod_0"]);
        let rel = TreePath::from(["rack_1", "switch"]);
        let abs = base.join(&rel);
        assert_eq!(abs.to_string(), "pod_0.rack_1.switch");
        assert!(abs.starts_with(&base));
        assert!(!base.starts_with(&abs));
        assert!(abs.starts_with(&TreePath::root()));
    }

    #[test]
    fn ordering_is_lexicographic() {
        // Deliberate contract: no numeric awareness.
        let a = TreePath::from(["node10"]);
        let b = TreePath::from(["node2"]);
        assert!(a < b);

        // Fixed-width normalized names sort as expected.
        let a = TreePath::from(["node_1"]);
        let b = TreePath::from(["node_2"]);
        assert!(a < b);

        // Shorter path sorts before its extensions.
        let a = TreePath::from(["pod"]);
        let b = TreePath::from(["pod", "x"]);
        assert!(a < b);
    }

    #[test]
    fn empty_string_parses_to_root() {
        let path: TreePath = "".parse().unwrap();
        assert!(path.is_empty());
        assert_eq!(path, TreePath::root());
    }
}
