use async_trait::async_trait;
use base64::Engine as _;
use reqwest::{Client, Response, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{Config, ConfigError};
use crate::model::{CodeUnit, SourceDescriptor};
use crate::sources::decode_permissive;
use crate::traits::{SourceError, SourceProvider};

pub const GITHUB_TIMEOUT: Duration = Duration::from_secs(30);

/// Below this many remaining requests a warning is logged.
pub const RATE_LIMIT_WARN_THRESHOLD: u64 = 10;

/// Repository paths are matched on these exact, lowercase suffixes.
const CODE_SUFFIXES: [&str; 2] = [".js", ".ts"];

fn is_code_path(path: &str) -> bool {
    CODE_SUFFIXES.iter().any(|suffix| path.ends_with(suffix))
}

/// Repository coordinates plus a plain path-prefix filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubLocator {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub folder: String,
}

impl GitHubLocator {
    /// String-prefix match against a repository-relative path, ignoring a
    /// trailing `/` on the folder. An empty folder matches everything.
    pub fn includes(&self, path: &str) -> bool {
        path.starts_with(self.folder.trim_end_matches('/'))
    }
}

pub struct GitHubSource {
    client: Client,
    api_base: String,
    token: String,
    locator: GitHubLocator,
}

impl GitHubSource {
    /// # Errors
    ///
    /// [`ConfigError::MissingCredential`] when no GitHub token is configured.
    pub fn new(config: &Config, locator: GitHubLocator) -> Result<Self, ConfigError> {
        let token = config.require_github_token()?.to_string();
        let client = Client::builder()
            .timeout(GITHUB_TIMEOUT)
            .user_agent(concat!("vulnfix/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            api_base: config.github_api_base.clone(),
            token,
            locator,
        })
    }

    fn endpoint<'a>(
        &self,
        segments: impl IntoIterator<Item = &'a str>,
    ) -> Result<Url, SourceError> {
        let mut url =
            Url::parse(&self.api_base).map_err(|e| SourceError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| SourceError::InvalidUrl(self.api_base.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get(&self, url: Url) -> Result<Response, SourceError> {
        let response = self
            .client
            .get(url.clone())
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?;

        check_rate_limit(&response);

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    async fn list_blobs(&self) -> Result<Vec<String>, SourceError> {
        let loc = &self.locator;
        let mut url = self.endpoint([
            "repos",
            loc.owner.as_str(),
            loc.repo.as_str(),
            "git",
            "trees",
            loc.branch.as_str(),
        ])?;
        url.query_pairs_mut().append_pair("recursive", "1");

        let tree: TreeResponse = self.get(url).await?.json().await?;
        if tree.truncated {
            warn!(owner = %loc.owner, repo = %loc.repo, "Tree listing truncated by GitHub");
        }

        Ok(tree
            .tree
            .into_iter()
            .filter(|entry| entry.kind == "blob")
            .map(|entry| entry.path)
            .collect())
    }

    /// `Ok(None)` when the contents response carries no `content` field.
    async fn fetch_content(&self, path: &str) -> Result<Option<String>, SourceError> {
        let loc = &self.locator;
        let mut url = self.endpoint(
            ["repos", loc.owner.as_str(), loc.repo.as_str(), "contents"]
                .into_iter()
                .chain(path.split('/')),
        )?;
        url.query_pairs_mut().append_pair("ref", &loc.branch);

        let body: ContentResponse = self.get(url).await?.json().await?;
        let Some(encoded) = body.content else {
            return Ok(None);
        };

        let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(compact)
            .map_err(|e| SourceError::Decode {
                path: path.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Some(decode_permissive(&bytes)))
    }
}

#[async_trait]
impl SourceProvider for GitHubSource {
    fn descriptor(&self) -> SourceDescriptor {
        SourceDescriptor::Github {
            owner: self.locator.owner.clone(),
            repo: self.locator.repo.clone(),
            branch: self.locator.branch.clone(),
            folder: self.locator.folder.clone(),
        }
    }

    /// Fails only if the tree listing fails; a file whose content cannot be
    /// fetched is logged and left out.
    async fn list_units(&self) -> Result<Vec<CodeUnit>, SourceError> {
        let blobs = self.list_blobs().await?;

        let mut units = Vec::new();
        for path in blobs {
            if !self.locator.includes(&path) || !is_code_path(&path) {
                continue;
            }
            match self.fetch_content(&path).await {
                Ok(Some(content)) => units.extend(CodeUnit::new(path, content)),
                Ok(None) => warn!(%path, "No content found"),
                Err(e) => warn!(%path, error = %e, "Failed to fetch content"),
            }
        }

        info!(
            owner = %self.locator.owner,
            repo = %self.locator.repo,
            files = units.len(),
            "Fetched repository files"
        );
        Ok(units)
    }
}

fn check_rate_limit(response: &Response) {
    let remaining = response
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if let Some(remaining) = remaining {
        if remaining < RATE_LIMIT_WARN_THRESHOLD {
            warn!(remaining, "GitHub API rate limit low");
        }
    }
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn locator(folder: &str) -> GitHubLocator {
        GitHubLocator {
            owner: "acme".to_string(),
            repo: "shop".to_string(),
            branch: "main".to_string(),
            folder: folder.to_string(),
        }
    }

    fn source(base: String, folder: &str) -> GitHubSource {
        let config = Config {
            github_token: Some("ghp_test".to_string()),
            github_api_base: base,
            ..Config::default()
        };
        GitHubSource::new(&config, locator(folder)).unwrap()
    }

    fn encoded(bytes: &[u8]) -> String {
        let b64 = base64::engine::general_purpose::STANDARD.encode(bytes);
        // GitHub wraps base64 at 60 columns
        let (head, tail) = b64.split_at(b64.len() / 2);
        format!("{head}\n{tail}\n")
    }

    async fn mock_content(server: &mut mockito::Server, path: &str, body: serde_json::Value) -> mockito::Mock {
        server
            .mock("GET", format!("/repos/acme/shop/contents/{path}").as_str())
            .match_query(Matcher::UrlEncoded("ref".into(), "main".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await
    }

    #[test]
    fn test_folder_prefix_is_plain_string_match() {
        assert!(locator("src/").includes("src/app.js"));
        assert!(locator("src").includes("srcx/app.js"));
        assert!(locator("").includes("anything.js"));
        assert!(!locator("lib/").includes("src/app.js"));
    }

    #[test]
    fn test_code_suffix_match_is_case_sensitive() {
        assert!(is_code_path("src/app.js"));
        assert!(is_code_path("src/types.ts"));
        assert!(!is_code_path("src/LEGACY.JS"));
        assert!(!is_code_path("src/Types.Ts"));
        assert!(!is_code_path("src/app.jsx"));
    }

    #[test]
    fn test_new_requires_token() {
        let err = GitHubSource::new(&Config::default(), locator("")).err().unwrap();
        assert!(matches!(err, ConfigError::MissingCredential { .. }));
    }

    #[tokio::test]
    async fn test_lists_filters_and_decodes() {
        let mut server = mockito::Server::new_async().await;
        let tree = server
            .mock("GET", "/repos/acme/shop/git/trees/main")
            .match_query(Matcher::UrlEncoded("recursive".into(), "1".into()))
            .match_header("authorization", "token ghp_test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_header("x-ratelimit-remaining", "5")
            .with_body(
                json!({
                    "tree": [
                        { "path": "src", "type": "tree" },
                        { "path": "src/app.js", "type": "blob" },
                        { "path": "src/LEGACY.JS", "type": "blob" },
                        { "path": "src/README.md", "type": "blob" },
                        { "path": "src/lib/util.ts", "type": "blob" },
                        { "path": "src/missing.js", "type": "blob" },
                        { "path": "src/broken.js", "type": "blob" },
                        { "path": "test/a.js", "type": "blob" }
                    ],
                    "truncated": false
                })
                .to_string(),
            )
            .create_async()
            .await;

        let _app = mock_content(&mut server, "src/app.js", json!({ "content": encoded(b"console.log(1)") })).await;
        let _util = mock_content(&mut server, "src/lib/util.ts", json!({ "content": encoded(b"export {}\xff") })).await;
        let _missing = mock_content(&mut server, "src/missing.js", json!({ "type": "submodule" })).await;
        let _broken = server
            .mock("GET", "/repos/acme/shop/contents/src/broken.js")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let legacy = server
            .mock("GET", "/repos/acme/shop/contents/src/LEGACY.JS")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let units = source(server.url(), "src/").list_units().await.unwrap();

        let paths: Vec<&str> = units.iter().map(|u| u.path.as_str()).collect();
        assert_eq!(paths, vec!["src/app.js", "src/lib/util.ts"]);
        assert_eq!(units[0].content, "console.log(1)");
        assert_eq!(units[1].content, "export {}");
        tree.assert_async().await;
        legacy.assert_async().await;
    }

    #[tokio::test]
    async fn test_tree_failure_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _tree = server
            .mock("GET", "/repos/acme/shop/git/trees/main")
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let err = source(server.url(), "").list_units().await.unwrap_err();
        assert!(matches!(err, SourceError::Status { status: 404, .. }));
    }

    #[test]
    fn test_descriptor() {
        let src = source("http://localhost".to_string(), "src/");
        assert_eq!(
            src.descriptor(),
            SourceDescriptor::Github {
                owner: "acme".to_string(),
                repo: "shop".to_string(),
                branch: "main".to_string(),
                folder: "src/".to_string(),
            }
        );
    }
}
