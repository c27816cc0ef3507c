use crate::config::GitHubConfig;
use crate::models::RateLimitSnapshot;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("{message} (Status: {status})")]
    Status { status: u16, message: String },
    #[error("GitHub request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid GitHub request: {0}")]
    Encoding(String),
}

impl GitHubError {
    pub fn status(&self) -> Option<u16> {
        match self {
            GitHubError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND.as_u16())
    }

    /// A create without `sha` was refused because the path is already taken.
    pub fn is_existing_file(&self) -> bool {
        match self {
            GitHubError::Status { status, message } => {
                *status == StatusCode::UNPROCESSABLE_ENTITY.as_u16() && message.contains("sha")
            }
            _ => false,
        }
    }
}

/// The slice of the repository contents API the publisher needs.
#[async_trait]
pub trait ContentsApi: Send + Sync {
    async fn rate_limit(&self) -> Result<RateLimitSnapshot, GitHubError>;

    /// Succeeds when `path` exists, as a file or a directory.
    async fn get_contents(&self, path: &str) -> Result<(), GitHubError>;

    /// Create a new file. Fails if one already exists at `path`.
    async fn create_file(&self, path: &str, message: &str, content: &str)
    -> Result<(), GitHubError>;
}

pub struct GitHubClient {
    client: reqwest::Client,
    api_url: String,
    token: String,
    repo: String,
    branch: String,
}

#[derive(Deserialize)]
struct RateLimitResponse {
    resources: RateLimitResources,
}

#[derive(Deserialize)]
struct RateLimitResources {
    core: RateLimitSnapshot,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("bookforge/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(GitHubClient {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            repo: config.repo.clone(),
            branch: config.branch.clone(),
        })
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// `{api}/repos/{owner}/{name}/contents/{path}` with every segment escaped.
    fn contents_url(&self, path: &str) -> Result<Url, GitHubError> {
        let mut url = Url::parse(&self.api_url)
            .map_err(|e| GitHubError::Encoding(format!("{}: {}", self.api_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| GitHubError::Encoding(format!("{} cannot be a base URL", self.api_url)))?
            .pop_if_empty()
            .push("repos")
            .extend(self.repo.split('/'))
            .push("contents")
            .extend(path.split('/'));
        Ok(url)
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .header("Authorization", format!("Bearer {}", self.token))
    }
}

/// Turn a non-2xx response into a `Status` error carrying GitHub's message.
async fn check(response: reqwest::Response) -> Result<reqwest::Response, GitHubError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(GitHubError::Status {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| "Unknown error".to_string())
}

#[async_trait]
impl ContentsApi for GitHubClient {
    async fn rate_limit(&self) -> Result<RateLimitSnapshot, GitHubError> {
        let url = Url::parse(&format!("{}/rate_limit", self.api_url))
            .map_err(|e| GitHubError::Encoding(e.to_string()))?;
        let response = check(self.request(reqwest::Method::GET, url).send().await?).await?;
        let body: RateLimitResponse = response.json().await?;
        tracing::debug!(
            remaining = body.resources.core.remaining,
            limit = body.resources.core.limit,
            "Fetched rate limit"
        );
        Ok(body.resources.core)
    }

    async fn get_contents(&self, path: &str) -> Result<(), GitHubError> {
        let url = self.contents_url(path)?;
        tracing::debug!(repo = %self.repo, path, "Reading contents");
        check(
            self.request(reqwest::Method::GET, url)
                .query(&[("ref", self.branch.as_str())])
                .send()
                .await?,
        )
        .await?;
        Ok(())
    }

    async fn create_file(
        &self,
        path: &str,
        message: &str,
        content: &str,
    ) -> Result<(), GitHubError> {
        let url = self.contents_url(path)?;
        tracing::info!(repo = %self.repo, path, branch = %self.branch, "Creating file");
        check(
            self.request(reqwest::Method::PUT, url)
                .json(&json!({
                    "message": message,
                    "content": STANDARD.encode(content),
                    "branch": self.branch,
                }))
                .send()
                .await?,
        )
        .await?;
        Ok(())
    }
}
