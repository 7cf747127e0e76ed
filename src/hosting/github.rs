//! GitHub REST implementation of [`HostingClient`].

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{HostIdentity, HostingClient, RepoRef, RepoSummary};
use crate::errors::AppError;

const DEFAULT_BASE_URL: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("repodrop/", env!("CARGO_PKG_VERSION"));

pub struct GithubClient {
    http: reqwest::Client,
    base_url: String,
}

impl GithubClient {
    pub fn new() -> Result<Self, AppError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Base URL override for tests against a mock server.
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(AppError::Http)?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn request(&self, method: reqwest::Method, url: String, token: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(token)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
    }

    fn contents_url(&self, repo: &RepoRef, path: &str) -> String {
        let encoded: Vec<String> = path
            .split('/')
            .map(|seg| urlencoding::encode(seg).into_owned())
            .collect();
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.base_url,
            repo.owner,
            repo.name,
            encoded.join("/")
        )
    }
}

#[derive(Deserialize)]
struct UserResponse {
    login: String,
}

#[derive(Deserialize)]
struct ContentsResponse {
    sha: String,
}

#[async_trait]
impl HostingClient for GithubClient {
    async fn verify_identity(&self, token: &str) -> Result<HostIdentity, AppError> {
        let resp = self
            .request(reqwest::Method::GET, format!("{}/user", self.base_url), token)
            .send()
            .await?;

        match resp.status().as_u16() {
            200 => {}
            401 | 403 => {
                return Err(AppError::Validation(
                    "the token was rejected by the hosting service".into(),
                ))
            }
            status => return Err(AppError::Hosting(format!("identity check failed ({status})"))),
        }

        let scopes = resp
            .headers()
            .get("x-oauth-scopes")
            .and_then(|v| v.to_str().ok())
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let user: UserResponse = resp.json().await?;
        Ok(HostIdentity {
            username: user.login,
            scopes,
        })
    }

    async fn get_file_sha(
        &self,
        token: &str,
        repo: &RepoRef,
        path: &str,
    ) -> Result<Option<String>, AppError> {
        let resp = self
            .request(reqwest::Method::GET, self.contents_url(repo, path), token)
            .send()
            .await?;

        match resp.status().as_u16() {
            200 => {
                // A directory at this path answers with an array; for the
                // purposes of a file write that is "no prior version".
                let body: serde_json::Value = resp.json().await?;
                Ok(body
                    .as_object()
                    .and_then(|o| o.get("sha"))
                    .and_then(|s| s.as_str())
                    .map(String::from))
            }
            404 => Ok(None),
            status => Err(AppError::Hosting(format!(
                "reading metadata for '{path}' failed ({status})"
            ))),
        }
    }

    async fn put_file(
        &self,
        token: &str,
        repo: &RepoRef,
        path: &str,
        content: &[u8],
        message: &str,
        prior_sha: Option<&str>,
    ) -> Result<(), AppError> {
        let mut body = json!({
            "message": message,
            "content": BASE64.encode(content),
        });
        if let Some(sha) = prior_sha {
            body["sha"] = json!(sha);
        }

        let resp = self
            .request(reqwest::Method::PUT, self.contents_url(repo, path), token)
            .json(&body)
            .send()
            .await?;

        match resp.status().as_u16() {
            200 | 201 => Ok(()),
            409 => Err(AppError::Conflict(path.to_string())),
            422 => {
                let text = resp.text().await.unwrap_or_default();
                // A stale version marker comes back as a 422 mentioning the
                // expected sha; anything else is a genuine request error.
                if text.contains("sha") {
                    Err(AppError::Conflict(path.to_string()))
                } else {
                    Err(AppError::Hosting(format!("write to '{path}' rejected")))
                }
            }
            404 => Err(AppError::NotFound(format!("Repository '{repo}'"))),
            status => Err(AppError::Hosting(format!(
                "write to '{path}' failed ({status})"
            ))),
        }
    }

    async fn list_repositories(
        &self,
        token: &str,
        limit: usize,
    ) -> Result<Vec<RepoSummary>, AppError> {
        let resp = self
            .request(
                reqwest::Method::GET,
                format!(
                    "{}/user/repos?sort=updated&per_page={limit}",
                    self.base_url
                ),
                token,
            )
            .send()
            .await?;

        match resp.status().as_u16() {
            200 => Ok(resp.json().await?),
            status => Err(AppError::Hosting(format!(
                "listing repositories failed ({status})"
            ))),
        }
    }

    async fn repo_has_content(&self, token: &str, repo: &RepoRef) -> Result<bool, AppError> {
        let resp = self
            .request(
                reqwest::Method::GET,
                format!(
                    "{}/repos/{}/{}/commits?per_page=1",
                    self.base_url, repo.owner, repo.name
                ),
                token,
            )
            .send()
            .await?;

        match resp.status().as_u16() {
            200 => Ok(true),
            // The commits endpoint answers 409 for a repository with no history.
            409 => Ok(false),
            404 => Err(AppError::NotFound(format!("Repository '{repo}'"))),
            status => Err(AppError::Hosting(format!(
                "checking repository '{repo}' failed ({status})"
            ))),
        }
    }

    async fn bootstrap_empty_repo(&self, token: &str, repo: &RepoRef) -> Result<(), AppError> {
        tracing::info!(repo = %repo, "bootstrapping empty repository");
        self.put_file(
            token,
            repo,
            ".gitkeep",
            b"",
            "Initialize repository",
            None,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn verify_identity_parses_login_and_scopes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-oauth-scopes", "repo, read:org")
                    .set_body_json(serde_json::json!({"login": "octocat"})),
            )
            .mount(&server)
            .await;

        let client = GithubClient::with_base_url(server.uri()).unwrap();
        let identity = client.verify_identity("tok").await.unwrap();
        assert_eq!(identity.username, "octocat");
        assert_eq!(identity.scopes, vec!["repo", "read:org"]);
    }

    #[tokio::test]
    async fn rejected_token_maps_to_validation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = GithubClient::with_base_url(server.uri()).unwrap();
        assert!(matches!(
            client.verify_identity("bad").await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn missing_file_reads_as_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/o/r/contents/a.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = GithubClient::with_base_url(server.uri()).unwrap();
        let sha = client
            .get_file_sha("tok", &RepoRef::new("o", "r"), "a.txt")
            .await
            .unwrap();
        assert_eq!(sha, None);
    }

    #[tokio::test]
    async fn put_conflict_maps_to_conflict_error() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/repos/o/r/contents/a.txt"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;

        let client = GithubClient::with_base_url(server.uri()).unwrap();
        let err = client
            .put_file("tok", &RepoRef::new("o", "r"), "a.txt", b"x", "msg", Some("old"))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn empty_repo_detected_via_409() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/o/r/commits"))
            .and(query_param("per_page", "1"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;

        let client = GithubClient::with_base_url(server.uri()).unwrap();
        assert!(!client
            .repo_has_content("tok", &RepoRef::new("o", "r"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn missing_repo_maps_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/o/gone/commits"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = GithubClient::with_base_url(server.uri()).unwrap();
        assert!(matches!(
            client.repo_has_content("tok", &RepoRef::new("o", "gone")).await,
            Err(AppError::NotFound(_))
        ));
    }
}
