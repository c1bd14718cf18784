//! Status-code classification.
//!
//! The set of codes understood here is closed on purpose: anything outside
//! it is reported as [`ClassifyError::Unrecognized`] rather than guessed at.

use tracing::{debug, warn};

use super::dispositions::FileDispositions;
use super::status::StatusEntry;
use crate::errors::ClassifyError;

/// How a porcelain status code is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// Added, modified or deleted on one side only; git already merged it.
    Benign,
    /// Modified/deleted (`UD`) or renamed/deleted (`AU`); the deletion is
    /// accepted.
    ResolvableDeletion,
    /// Anything else.
    Unknown,
}

impl StatusClass {
    pub fn of(code: &str) -> Self {
        match code {
            " M " | " D " | " A " | "M  " | "D  " | "A  " => Self::Benign,
            "UD " | "AU " => Self::ResolvableDeletion,
            _ => Self::Unknown,
        }
    }

    pub fn is_conflict(&self) -> bool {
        !matches!(self, Self::Benign)
    }
}

/// Paths to remove to settle deletion conflicts.
///
/// Entries covered by `dispositions` are skipped; the explicit strategy
/// owns them. Fails on the first entry with an unknown code.
pub fn deletion_candidates(
    entries: &[StatusEntry],
    dispositions: &FileDispositions,
) -> Result<Vec<String>, ClassifyError> {
    let mut removals = Vec::new();
    for entry in entries {
        if dispositions.covers(&entry.path) {
            debug!(path = %entry.path, "path has an explicit disposition");
            continue;
        }
        match entry.class() {
            StatusClass::Benign => {}
            StatusClass::ResolvableDeletion => removals.push(entry.path.clone()),
            StatusClass::Unknown => {
                warn!(code = %entry.code, path = %entry.path, "unrecognized status");
                return Err(ClassifyError::Unrecognized {
                    code: entry.code.clone(),
                    path: entry.path.clone(),
                });
            }
        }
    }
    Ok(removals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::status::parse_porcelain;

    #[test]
    fn test_classify_codes() {
        assert_eq!(StatusClass::of(" M "), StatusClass::Benign);
        assert_eq!(StatusClass::of("A  "), StatusClass::Benign);
        assert_eq!(StatusClass::of("D  "), StatusClass::Benign);
        assert_eq!(StatusClass::of("UD "), StatusClass::ResolvableDeletion);
        assert_eq!(StatusClass::of("AU "), StatusClass::ResolvableDeletion);
        assert_eq!(StatusClass::of("UU "), StatusClass::Unknown);
        assert_eq!(StatusClass::of("DU "), StatusClass::Unknown);
        assert_eq!(StatusClass::of("AA "), StatusClass::Unknown);
        assert_eq!(StatusClass::of("?? "), StatusClass::Unknown);
        assert_eq!(StatusClass::of("MM "), StatusClass::Unknown);
    }

    #[test]
    fn test_deletions_collected_and_benign_ignored() {
        let entries = parse_porcelain("M  README.md\nUD a.txt\nAU pkg/renamed.go\n").unwrap();
        let removals = deletion_candidates(&entries, &FileDispositions::default()).unwrap();
        assert_eq!(removals, vec!["a.txt", "pkg/renamed.go"]);
    }

    #[test]
    fn test_unknown_code_fails() {
        let entries = parse_porcelain("UD a.txt\nUU b.txt\n").unwrap();
        let err = deletion_candidates(&entries, &FileDispositions::default()).unwrap_err();
        assert_eq!(
            err,
            ClassifyError::Unrecognized {
                code: "UU ".into(),
                path: "b.txt".into()
            }
        );
    }

    #[test]
    fn test_disposition_overrides_unknown_code() {
        let entries = parse_porcelain("UU b.txt\nUD a.txt\n").unwrap();
        let d = FileDispositions::new(vec![], vec!["b.txt".into(), "a.txt".into()]);
        assert!(deletion_candidates(&entries, &d).unwrap().is_empty());
    }
}
