//! Release lookup against the GitHub GraphQL API.
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::model::{Release, RepoSnapshot};

pub const GITHUB_GRAPHQL_URL: &str = "https://api.github.com/graphql";

const REPOSITORY_QUERY: &str = r#"query($owner: String!, $name: String!) {
  repository(owner: $owner, name: $name) {
    id
    url
    name
    owner { login }
    releases(first: 1, orderBy: {field: CREATED_AT, direction: DESC}) {
      nodes { tagName id isPrerelease }
    }
  }
}"#;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("repository {owner}/{name} not found")]
    NotFound { owner: String, name: String },
    #[error("upstream lookup failed: {0:#}")]
    Upstream(#[from] anyhow::Error),
}

impl LookupError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, LookupError::NotFound { .. })
    }
}

/// Resolves a repository and its latest release.
///
/// A repository without releases is a successful lookup whose snapshot has
/// `release == None`. No retries happen at this layer.
#[async_trait]
pub trait ReleaseLookup: Send + Sync {
    async fn resolve(&self, owner: &str, name: &str) -> Result<RepoSnapshot, LookupError>;
}

#[derive(Clone)]
pub struct GitHubClient {
    http: Client,
    endpoint: Url,
    token: String,
}

impl fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl GitHubClient {
    pub fn new(token: String) -> anyhow::Result<Self> {
        let endpoint = Url::parse(GITHUB_GRAPHQL_URL).context("invalid GitHub GraphQL URL")?;
        Self::with_endpoint(token, endpoint)
    }

    pub fn with_endpoint(token: String, endpoint: Url) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent("release-watchbot/0.1")
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            endpoint,
            token,
        })
    }

    pub fn build_request(&self, owner: &str, name: &str) -> anyhow::Result<reqwest::Request> {
        self.http
            .post(self.endpoint.clone())
            .bearer_auth(&self.token)
            .json(&build_query_body(owner, name))
            .build()
            .context("failed to build GitHub request")
    }
}

#[async_trait]
impl ReleaseLookup for GitHubClient {
    #[instrument(skip_all, fields(owner = %owner, name = %name))]
    async fn resolve(&self, owner: &str, name: &str) -> Result<RepoSnapshot, LookupError> {
        let request = self.build_request(owner, name)?;
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach GitHub")?;

        let status = res.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = res.text().await.unwrap_or_default();
            warn!(%status, "GitHub rejected credentials or rate limited");
            return Err(anyhow!("github error {}: {}", status, body).into());
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("github error {}: {}", status, body).into());
        }

        let payload: GraphQlResponse = res
            .json()
            .await
            .context("invalid GitHub response JSON")?;
        debug!(errors = payload.errors.len(), "GitHub responded");
        snapshot_from_response(owner, name, payload)
    }
}

pub fn build_query_body(owner: &str, name: &str) -> Value {
    json!({
        "query": REPOSITORY_QUERY,
        "variables": { "owner": owner, "name": name },
    })
}

#[derive(Debug, Deserialize)]
pub struct GraphQlResponse {
    data: Option<QueryData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    #[serde(rename = "type")]
    kind: Option<String>,
    message: String,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    repository: Option<RepositoryNode>,
}

#[derive(Debug, Deserialize)]
struct RepositoryNode {
    id: String,
    url: String,
    name: String,
    owner: OwnerNode,
    releases: ReleaseConnection,
}

#[derive(Debug, Deserialize)]
struct OwnerNode {
    login: String,
}

#[derive(Debug, Deserialize)]
struct ReleaseConnection {
    #[serde(default)]
    nodes: Vec<ReleaseNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReleaseNode {
    tag_name: String,
    id: String,
    is_prerelease: bool,
}

/// Map a GraphQL payload to a snapshot. A `NOT_FOUND` error or a null
/// repository both mean the repository does not exist.
pub fn snapshot_from_response(
    owner: &str,
    name: &str,
    payload: GraphQlResponse,
) -> Result<RepoSnapshot, LookupError> {
    let not_found = || LookupError::NotFound {
        owner: owner.to_string(),
        name: name.to_string(),
    };

    if payload
        .errors
        .iter()
        .any(|e| e.kind.as_deref() == Some("NOT_FOUND"))
    {
        return Err(not_found());
    }
    if !payload.errors.is_empty() {
        let messages: Vec<&str> = payload.errors.iter().map(|e| e.message.as_str()).collect();
        return Err(anyhow!("graphql errors: {}", messages.join("; ")).into());
    }

    let repo = payload
        .data
        .and_then(|d| d.repository)
        .ok_or_else(not_found)?;

    let release = repo.releases.nodes.into_iter().next().map(|n| Release {
        tag: n.tag_name,
        id: n.id,
        is_prerelease: n.is_prerelease,
    });

    Ok(RepoSnapshot {
        repo_id: repo.id,
        owner: repo.owner.login,
        name: repo.name,
        link: repo.url,
        release,
    })
}
