//! Domain model types used throughout rebasebot.
//!
//! Both coordinate types parse from the textual forms accepted on the command
//! line and in the config file, and serialize back to the same form.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Source reference
// ---------------------------------------------------------------------------

/// An upstream git repository plus a branch, tag, or commit identifier.
///
/// Textual form: `<git url>:<reference>`. The split happens on the last
/// colon so URLs with a scheme or port survive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GitRef {
    pub url: String,
    pub reference: String,
}

impl GitRef {
    /// Candidate ref forms in resolution order: the bare identifier, then
    /// the identifier qualified with the `source` remote.
    pub fn candidates(&self) -> [String; 2] {
        [self.reference.clone(), format!("source/{}", self.reference)]
    }
}

impl FromStr for GitRef {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidValue {
            field: "source".into(),
            detail: format!("'{s}' must be in the form <git url>:<reference>"),
        };
        let (url, reference) = s.rsplit_once(':').ok_or_else(invalid)?;
        if reference.is_empty() || url::Url::parse(url).is_err() {
            return Err(invalid());
        }
        Ok(Self {
            url: url.to_string(),
            reference: reference.to_string(),
        })
    }
}

impl TryFrom<String> for GitRef {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<GitRef> for String {
    fn from(r: GitRef) -> Self {
        r.to_string()
    }
}

impl fmt::Display for GitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.url, self.reference)
    }
}

// ---------------------------------------------------------------------------
// GitHub branch
// ---------------------------------------------------------------------------

fn github_branch_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<ns>[^/]+)/(?P<name>[^:]+):(?P<branch>.*)$")
            .expect("github branch regex is valid")
    })
}

/// A branch in a GitHub repository: `<namespace>/<name>:<branch>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GitHubBranch {
    pub url: String,
    pub ns: String,
    pub name: String,
    pub branch: String,
}

impl GitHubBranch {
    /// `owner/repo`, as used in GitHub API paths.
    pub fn repo_path(&self) -> String {
        format!("{}/{}", self.ns, self.name)
    }

    /// `owner:branch`, as used for the `head` of a pull request.
    pub fn pr_head(&self) -> String {
        format!("{}:{}", self.ns, self.branch)
    }
}

impl FromStr for GitHubBranch {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = github_branch_re()
            .captures(s)
            .filter(|c| !c["branch"].is_empty())
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "branch".into(),
                detail: format!(
                    "'{s}' must be in the form <user or organisation>/<repo>:[<branch>|<tag>|<sha1>]"
                ),
            })?;
        let ns = caps["ns"].to_string();
        let name = caps["name"].to_string();
        Ok(Self {
            url: format!("https://github.com/{ns}/{name}"),
            ns,
            name,
            branch: caps["branch"].to_string(),
        })
    }
}

impl TryFrom<String> for GitHubBranch {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<GitHubBranch> for String {
    fn from(b: GitHubBranch) -> Self {
        b.to_string()
    }
}

impl fmt::Display for GitHubBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.ns, self.name, self.branch)
    }
}
