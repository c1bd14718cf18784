//! Caller-supplied "ours" / "theirs" path lists.

use glob_match::glob_match;
use serde::{Deserialize, Serialize};

use crate::git::Side;

/// Two lists of path patterns naming which side of a conflict to keep.
///
/// A pattern matches a path when it is equal to it or glob-matches it.
/// When a path matches both lists, "ours" wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDispositions {
    #[serde(default)]
    pub ours: Vec<String>,
    #[serde(default)]
    pub theirs: Vec<String>,
}

impl FileDispositions {
    pub fn new(ours: Vec<String>, theirs: Vec<String>) -> Self {
        Self { ours, theirs }
    }

    pub fn is_empty(&self) -> bool {
        self.ours.is_empty() && self.theirs.is_empty()
    }

    /// The side `path` is pinned to, if any.
    pub fn side_for(&self, path: &str) -> Option<Side> {
        if self.ours.iter().any(|p| pattern_matches(p, path)) {
            Some(Side::Ours)
        } else if self.theirs.iter().any(|p| pattern_matches(p, path)) {
            Some(Side::Theirs)
        } else {
            None
        }
    }

    pub fn covers(&self, path: &str) -> bool {
        self.side_for(path).is_some()
    }
}

fn pattern_matches(pattern: &str, path: &str) -> bool {
    pattern == path || glob_match(pattern, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispositions(ours: &[&str], theirs: &[&str]) -> FileDispositions {
        FileDispositions::new(
            ours.iter().map(|s| s.to_string()).collect(),
            theirs.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn test_exact_and_glob_matches() {
        let d = dispositions(&["go.mod"], &["vendor/**", "*.lock"]);
        assert_eq!(d.side_for("go.mod"), Some(Side::Ours));
        assert_eq!(d.side_for("vendor/k8s.io/api/types.go"), Some(Side::Theirs));
        assert_eq!(d.side_for("Cargo.lock"), Some(Side::Theirs));
        assert_eq!(d.side_for("main.go"), None);
    }

    #[test]
    fn test_ours_wins_when_both_match() {
        let d = dispositions(&["x"], &["x"]);
        assert_eq!(d.side_for("x"), Some(Side::Ours));

        let d = dispositions(&["docs/*"], &["docs/**"]);
        assert_eq!(d.side_for("docs/README.md"), Some(Side::Ours));
        assert_eq!(d.side_for("docs/deep/README.md"), Some(Side::Theirs));
    }

    #[test]
    fn test_empty() {
        let d = FileDispositions::default();
        assert!(d.is_empty());
        assert!(!d.covers("anything"));
    }
}
