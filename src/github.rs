use std::{fmt::Display, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, trace};
use url::Url;

use crate::bot::utils::shorten_content;

const GITHUB_API_VERSION: &str = "2022-11-28";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const FILES_PER_PAGE: usize = 100;
// the files endpoint stops at 3000 files
const MAX_FILE_PAGES: usize = 30;

/// Handle to an issue (or pull request) thread the bot can comment on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRef {
    pub repository: String,
    pub number: u64,
    pub html_url: Option<Url>,
}

impl Display for IssueRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.repository, self.number)
    }
}

/// What the bot needs to know about a pull request to explain how to try it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub number: u64,
    /// Branch the pull request comes from
    pub head_ref: String,
    /// Repository holding that branch, `None` when it was deleted
    pub head_repo_url: Option<Url>,
    /// Paths changed by the pull request, relative to the repository root
    pub files: Vec<String>,
}

/// Repository access the bot needs: find the thread an event points at, and reply to it.
#[async_trait]
pub trait IssueService: Send + Sync {
    async fn resolve_issue(&self, repo_full_name: &str, number: u64) -> anyhow::Result<IssueRef>;

    async fn post_comment(&self, issue: &IssueRef, body: &str) -> anyhow::Result<()>;

    async fn pull_request(&self, repo_full_name: &str, number: u64)
        -> anyhow::Result<PullRequest>;
}

/// [`IssueService`] backed by the GitHub REST API.
pub struct GitHubIssues {
    http: reqwest::Client,
    api_base: String,
}

impl GitHubIssues {
    pub fn new(api_base: &Url, token: &str) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("sdkbot"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static(GITHUB_API_VERSION),
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token.trim()))
                .context("invalid github authorization header")?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to create github api client")?;

        Ok(Self {
            http,
            api_base: api_base.as_str().trim_end_matches('/').to_owned(),
        })
    }

    fn issue_url(&self, repo_full_name: &str, number: u64) -> String {
        format!(
            "{}/repos/{}/issues/{}",
            self.api_base, repo_full_name, number
        )
    }
}

#[derive(Debug, Deserialize)]
struct IssueResponse {
    number: u64,
    html_url: Url,
}

#[derive(Debug, Deserialize)]
struct PullRequestResponse {
    number: u64,
    head: PullRequestHead,
}

#[derive(Debug, Deserialize)]
struct PullRequestHead {
    #[serde(rename = "ref")]
    git_ref: String,
    repo: Option<HeadRepository>,
}

#[derive(Debug, Deserialize)]
struct HeadRepository {
    html_url: Url,
}

#[derive(Debug, Deserialize)]
struct PullRequestFile {
    filename: String,
}

#[async_trait]
impl IssueService for GitHubIssues {
    async fn resolve_issue(&self, repo_full_name: &str, number: u64) -> anyhow::Result<IssueRef> {
        trace!("resolving issue {}#{}", repo_full_name, number);

        let issue: IssueResponse = self
            .http
            .get(self.issue_url(repo_full_name, number))
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .with_context(|| format!("couldn't fetch issue {}#{}", repo_full_name, number))?
            .json()
            .await
            .context("couldn't decode issue response")?;

        Ok(IssueRef {
            repository: repo_full_name.to_owned(),
            number: issue.number,
            html_url: Some(issue.html_url),
        })
    }

    async fn post_comment(&self, issue: &IssueRef, body: &str) -> anyhow::Result<()> {
        debug!("posting comment on {}: `{}`", issue, shorten_content(body));

        self.http
            .post(format!(
                "{}/comments",
                self.issue_url(&issue.repository, issue.number)
            ))
            .json(&json!({ "body": body }))
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .with_context(|| format!("couldn't post comment on {}", issue))?;

        Ok(())
    }

    async fn pull_request(
        &self,
        repo_full_name: &str,
        number: u64,
    ) -> anyhow::Result<PullRequest> {
        trace!("fetching pull request {}#{}", repo_full_name, number);

        let pulls_url = format!(
            "{}/repos/{}/pulls/{}",
            self.api_base, repo_full_name, number
        );
        let pull: PullRequestResponse = self
            .http
            .get(&pulls_url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .with_context(|| format!("couldn't fetch pull request {}#{}", repo_full_name, number))?
            .json()
            .await
            .context("couldn't decode pull request response")?;

        let mut files = Vec::new();
        for page in 1..=MAX_FILE_PAGES {
            let batch: Vec<PullRequestFile> = self
                .http
                .get(format!("{}/files", pulls_url))
                .query(&[("per_page", FILES_PER_PAGE), ("page", page)])
                .send()
                .await
                .and_then(|response| response.error_for_status())
                .with_context(|| {
                    format!("couldn't list files of {}#{}", repo_full_name, number)
                })?
                .json()
                .await
                .context("couldn't decode pull request files")?;

            let last_page = batch.len() < FILES_PER_PAGE;
            files.extend(batch.into_iter().map(|file| file.filename));
            if last_page {
                break;
            }
        }
        debug!(
            "{}#{} changes {} file(s)",
            repo_full_name,
            number,
            files.len()
        );

        Ok(PullRequest {
            number: pull.number,
            head_ref: pull.head.git_ref,
            head_repo_url: pull.head.repo.map(|repo| repo.html_url),
            files,
        })
    }
}
