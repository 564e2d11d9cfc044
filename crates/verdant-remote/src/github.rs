//! GitHub commits API as an [`ActivitySource`].
//!
//! Each account maps to one repository. A fetch walks
//! `GET {api_url}/repos/{owner}/{repo}/commits?since=..&per_page=..&page=..`
//! until a short page or the page limit, then keeps only commits whose
//! committer date is strictly after the floor. GitHub's `since` is
//! inclusive, so the strict filter is applied here. Commits whose date is
//! missing or unparseable are kept so nothing is silently dropped.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use tracing::{debug, warn};
use verdant_core::config::{AccountConfig, GitHubConfig};
use verdant_core::source::{ActivitySource, SourceError};
use verdant_types::{AccountId, ActivityEvent};

use crate::error::{RemoteError, source_error};

/// `User-Agent` sent with every request (GitHub rejects requests without one).
const USER_AGENT: &str = concat!("verdant/", env!("CARGO_PKG_VERSION"));

/// Longest response-body excerpt carried in an error.
const MAX_ERROR_BODY_CHARS: usize = 200;

/// One element of the commits list response.
#[derive(Debug, Clone, Deserialize)]
pub struct CommitItem {
    /// Commit hash.
    #[serde(default)]
    pub sha: String,
    /// Git-level commit data.
    pub commit: CommitDetail,
}

/// The `commit` object of a [`CommitItem`].
#[derive(Debug, Clone, Deserialize)]
pub struct CommitDetail {
    /// Full commit message.
    #[serde(default)]
    pub message: String,
    /// Committer signature (its date is the filter key).
    #[serde(default)]
    pub committer: Option<Signature>,
}

/// A git signature; only the date is used.
#[derive(Debug, Clone, Deserialize)]
pub struct Signature {
    /// ISO-8601 timestamp.
    #[serde(default)]
    pub date: Option<String>,
}

/// The repository an account tracks and the token used to read it.
#[derive(Clone)]
pub struct RepoTarget {
    /// Repository owner login.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Access token; `None` sends unauthenticated requests.
    pub token: Option<String>,
}

impl core::fmt::Debug for RepoTarget {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RepoTarget")
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Activity source reading commits from the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GitHubActivitySource {
    client: reqwest::Client,
    api_url: String,
    per_page: u32,
    max_pages: u32,
    targets: HashMap<AccountId, RepoTarget>,
}

impl GitHubActivitySource {
    /// Build a source with no accounts.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Client`] if the HTTP client cannot be built.
    pub fn new(config: &GitHubConfig) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_owned(),
            per_page: config.per_page,
            max_pages: config.max_pages,
            targets: HashMap::new(),
        })
    }

    /// Build a source for the configured accounts, reading each token from
    /// the environment variable the account names.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Client`] if the HTTP client cannot be built.
    pub fn from_config(
        config: &GitHubConfig,
        accounts: &[AccountConfig],
    ) -> Result<Self, RemoteError> {
        let mut source = Self::new(config)?;
        for account in accounts {
            let token = account.token_env.as_deref().and_then(|name| {
                let value = std::env::var(name).ok().filter(|v| !v.trim().is_empty());
                if value.is_none() {
                    warn!(
                        account = %account.id,
                        env = name,
                        "Token variable unset, using unauthenticated requests"
                    );
                }
                value
            });
            source.add_account(
                AccountId::new(account.id.as_str()),
                RepoTarget {
                    owner: account.owner.clone(),
                    repo: account.repo.clone(),
                    token,
                },
            );
        }
        Ok(source)
    }

    /// Track `account` against `target`, replacing any previous target.
    pub fn add_account(&mut self, account: AccountId, target: RepoTarget) {
        self.targets.insert(account, target);
    }

    /// Number of tracked accounts.
    pub fn account_count(&self) -> usize {
        self.targets.len()
    }

    /// Commits list URL for `target`.
    pub fn commits_url(&self, target: &RepoTarget) -> String {
        format!(
            "{}/repos/{}/{}/commits",
            self.api_url, target.owner, target.repo
        )
    }

    async fn fetch_page(
        &self,
        target: &RepoTarget,
        since: &str,
        page: u32,
    ) -> Result<Vec<CommitItem>, SourceError> {
        let mut request = self
            .client
            .get(self.commits_url(target))
            .header("Accept", "application/vnd.github+json")
            .query(&[
                ("since", since.to_owned()),
                ("per_page", self.per_page.to_string()),
                ("page", page.to_string()),
            ]);
        if let Some(token) = &target.token {
            request = request.header("Authorization", format!("token {token}"));
        }

        let response = request.send().await.map_err(|e| source_error(&e))?;
        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("unable to read error body: {e}"));
            return Err(classify_failure(status, &headers, &body, Utc::now()));
        }

        response
            .json::<Vec<CommitItem>>()
            .await
            .map_err(|e| SourceError::Decode {
                message: e.to_string(),
            })
    }
}

impl ActivitySource for GitHubActivitySource {
    async fn fetch_since(
        &self,
        account: &AccountId,
        floor: DateTime<Utc>,
    ) -> Result<Vec<ActivityEvent>, SourceError> {
        let target = self
            .targets
            .get(account)
            .ok_or_else(|| SourceError::UnknownAccount(account.clone()))?;
        let since = floor.to_rfc3339_opts(SecondsFormat::Secs, true);

        let mut events = Vec::new();
        for page in 1..=self.max_pages {
            let items = self.fetch_page(target, &since, page).await?;
            let fetched = items.len();
            events.extend(events_after(items, floor));

            if fetched < usize::try_from(self.per_page).unwrap_or(usize::MAX) {
                break;
            }
            if page == self.max_pages {
                warn!(
                    %account,
                    max_pages = self.max_pages,
                    "Page limit reached, older commits in this window are skipped"
                );
            }
        }

        debug!(
            %account,
            owner = %target.owner,
            repo = %target.repo,
            %since,
            events = events.len(),
            "Fetched commits"
        );
        Ok(events)
    }
}

/// Keep the commits strictly after `floor`, in response order (GitHub
/// lists newest first).
pub fn events_after(items: Vec<CommitItem>, floor: DateTime<Utc>) -> Vec<ActivityEvent> {
    items
        .into_iter()
        .filter_map(|item| {
            let date = item
                .commit
                .committer
                .and_then(|signature| signature.date)
                .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
                .map(|at| at.with_timezone(&Utc));
            let event = ActivityEvent::new(item.commit.message);
            match date {
                Some(at) if at <= floor => None,
                Some(at) => Some(event.with_occurred_at(at)),
                None => {
                    debug!(sha = %item.sha, "Commit without a usable date, keeping it");
                    Some(event)
                }
            }
        })
        .collect()
}

/// Map a non-success response onto a [`SourceError`].
pub fn classify_failure(
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
    now: DateTime<Utc>,
) -> SourceError {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
    };
    let exhausted = header("x-ratelimit-remaining") == Some("0");

    if status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN && exhausted)
    {
        let retry_after_secs = header("retry-after")
            .and_then(|v| v.parse::<u64>().ok())
            .or_else(|| {
                header("x-ratelimit-reset")
                    .and_then(|v| v.parse::<i64>().ok())
                    .and_then(|reset| reset.checked_sub(now.timestamp()))
                    .and_then(|secs| u64::try_from(secs).ok())
            });
        return SourceError::RateLimited { retry_after_secs };
    }

    let message: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    if status == StatusCode::UNAUTHORIZED {
        return SourceError::Unauthorized { message };
    }
    SourceError::Status {
        status: status.as_u16(),
        message,
    }
}
