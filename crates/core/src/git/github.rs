//! GitHub REST API client for pull request lookup and creation.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::errors::GitHubError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub html_url: String,
    pub state: String,
    pub head: PullRequestRef,
    pub base: PullRequestRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestRef {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub sha: String,
}

/// Asynchronous GitHub REST API client.
#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    token: String,
}

impl GitHubClient {
    pub fn new(api_url: impl Into<String>, token: impl Into<String>) -> Result<Self, GitHubError> {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        let token = token.into();
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("rebasebot/", env!("CARGO_PKG_VERSION"))),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;
        info!(api_url = %api_url, "created GitHubClient");
        Ok(Self {
            http,
            api_url,
            token,
        })
    }

    /// First open pull request in `repo` whose head is `head` (`owner:branch`).
    #[instrument(skip(self))]
    pub async fn find_open_pull_request(
        &self,
        repo: &str,
        head: &str,
    ) -> Result<Option<PullRequest>, GitHubError> {
        let url = format!("{}/repos/{}/pulls", self.api_url, repo);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("head", head), ("state", "open")])
            .send()
            .await?;
        let prs: Vec<PullRequest> = check_response(resp).await?.json().await?;
        debug!(count = prs.len(), "fetched open pull requests");
        Ok(prs.into_iter().next())
    }

    #[instrument(skip(self))]
    pub async fn create_pull_request(
        &self,
        repo: &str,
        title: &str,
        head: &str,
        base: &str,
    ) -> Result<PullRequest, GitHubError> {
        let url = format!("{}/repos/{}/pulls", self.api_url, repo);
        let payload = pull_request_payload(title, head, base);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await?;
        let pr: PullRequest = check_response(resp).await?.json().await?;
        info!(number = pr.number, url = %pr.html_url, "created pull request");
        Ok(pr)
    }
}

fn pull_request_payload(title: &str, head: &str, base: &str) -> serde_json::Value {
    serde_json::json!({
        "title": title,
        "head": head,
        "base": base,
        "maintainer_can_modify": false,
    })
}

/// Pass successful responses through; map the rest to [`GitHubError`].
async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, GitHubError> {
    let status = resp.status().as_u16();
    if resp.status().is_success() {
        return Ok(resp);
    }
    let reset = resp
        .headers()
        .get("x-ratelimit-reset")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = resp.text().await.unwrap_or_default();
    Err(status_error(status, reset.as_deref(), &body))
}

fn status_error(status: u16, rate_limit_reset: Option<&str>, body: &str) -> GitHubError {
    match status {
        401 | 403 => GitHubError::AuthenticationFailed(format!("HTTP {status}")),
        429 => GitHubError::RateLimited {
            reset_at: rate_limit_reset
                .map(format_reset)
                .unwrap_or_else(|| "unknown".into()),
        },
        _ => GitHubError::ApiError {
            status,
            body: error_detail(body).unwrap_or_else(|| format!("HTTP {status}")),
        },
    }
}

/// GitHub's `message` plus any per-field `errors[].message`, or the raw body
/// when it is not JSON.
fn error_detail(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    let Ok(json) = serde_json::from_str::<serde_json::Value>(body) else {
        return Some(body.to_string());
    };
    let mut parts: Vec<&str> = json["message"].as_str().into_iter().collect();
    if let Some(errors) = json["errors"].as_array() {
        parts.extend(errors.iter().filter_map(|e| e["message"].as_str()));
    }
    if parts.is_empty() {
        Some(body.to_string())
    } else {
        Some(parts.join(": "))
    }
}

/// Render the `x-ratelimit-reset` epoch seconds as RFC 3339.
fn format_reset(raw: &str) -> String {
    raw.parse::<i64>()
        .ok()
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error(401, None, ""),
            GitHubError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            status_error(429, Some("1700000000"), ""),
            GitHubError::RateLimited { reset_at } if reset_at == "2023-11-14T22:13:20+00:00"
        ));
        assert!(matches!(
            status_error(429, Some("soon"), ""),
            GitHubError::RateLimited { reset_at } if reset_at == "soon"
        ));
        assert!(matches!(
            status_error(502, None, ""),
            GitHubError::ApiError { status: 502, body } if body == "HTTP 502"
        ));
    }

    #[test]
    fn test_api_error_keeps_github_reason() {
        let body = r#"{
            "message": "Validation Failed",
            "errors": [{"resource": "PullRequest", "code": "custom",
                        "message": "A pull request already exists for bot:rebase-bot-main."}],
            "documentation_url": "https://docs.github.com/rest/pulls/pulls#create-a-pull-request"
        }"#;
        let err = status_error(422, None, body);
        assert_eq!(
            err.to_string(),
            "GitHub API error (HTTP 422): Validation Failed: \
             A pull request already exists for bot:rebase-bot-main."
        );

        assert!(matches!(
            status_error(500, None, "upstream connect error\n"),
            GitHubError::ApiError { body, .. } if body == "upstream connect error"
        ));
        assert!(matches!(
            status_error(404, None, r#"{"message": "Not Found"}"#),
            GitHubError::ApiError { body, .. } if body == "Not Found"
        ));
    }

    #[test]
    fn test_payload_disallows_maintainer_edits() {
        let payload = pull_request_payload("Merge up", "bot:rebase", "main");
        assert_eq!(payload["head"], "bot:rebase");
        assert_eq!(payload["base"], "main");
        assert_eq!(payload["maintainer_can_modify"], false);
    }

    #[test]
    fn test_deserialize_pull_request() {
        let json = r#"{
            "number": 42,
            "title": "Merge https://github.com/up/repo:main",
            "html_url": "https://github.com/org/repo/pull/42",
            "state": "open",
            "head": {"ref": "rebase-bot-main", "sha": "abc"},
            "base": {"ref": "main", "sha": "def"},
            "draft": false
        }"#;
        let pr: PullRequest = serde_json::from_str(json).unwrap();
        assert_eq!(pr.number, 42);
        assert_eq!(pr.head.ref_name, "rebase-bot-main");
    }

    #[test]
    fn test_client_trims_api_url() {
        let client = GitHubClient::new("https://api.github.com/", "t").unwrap();
        assert_eq!(client.api_url, "https://api.github.com");
    }
}
