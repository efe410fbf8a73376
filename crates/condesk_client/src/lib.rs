//! HTTP façade over the package registry (anaconda.org-compatible).
//!
//! Authentication, user/organization lookups and per-owner package listings,
//! serialized through a dedicated task queue like every other external
//! resource. Listings come back as [`RegistryPackage`] values shaped like the
//! repository-index metadata so the reconciliation layer can merge them in by
//! name.

use std::path::PathBuf;
use std::sync::Arc;

use condesk_consts::consts;
use condesk_task_queue::{TaskError, TaskQueue};
use parking_lot::RwLock;
use reqwest::StatusCode;
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("registry call to {url} failed: {status}")]
    HttpStatus { url: Url, status: StatusCode },

    #[error(transparent)]
    Reqwest(Arc<reqwest::Error>),

    #[error(transparent)]
    ReqwestMiddleware(Arc<reqwest_middleware::Error>),

    #[error("not logged in")]
    NotAuthenticated,

    #[error("failed to access the token store")]
    TokenStore(#[source] Arc<std::io::Error>),

    #[error("the registry call was cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        Self::Reqwest(Arc::new(err))
    }
}

impl From<reqwest_middleware::Error> for RegistryError {
    fn from(err: reqwest_middleware::Error) -> Self {
        Self::ReqwestMiddleware(Arc::new(err))
    }
}

/// One package listing of a registry owner, already reduced to the fields the
/// reconciliation layer consumes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RegistryPackage {
    pub name: String,

    #[serde(default)]
    pub summary: String,

    #[serde(default)]
    pub home: String,

    #[serde(default)]
    pub license: String,

    #[serde(default)]
    pub latest_version: Option<String>,

    #[serde(default)]
    pub versions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryUser {
    pub login: String,

    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

/// The registry HTTP client. One instance per application; cheap to share by
/// reference from the context handle.
pub struct RegistryClient {
    client: ClientWithMiddleware,
    domain: Url,
    queue: TaskQueue,
    token: RwLock<Option<String>>,
    token_dir: PathBuf,
}

impl RegistryClient {
    pub fn new(client: ClientWithMiddleware, domain: Url) -> Self {
        let token_dir = dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(consts::APP_NAME)
            .join(consts::TOKENS_DIR);
        Self {
            client,
            domain,
            queue: TaskQueue::new("registry"),
            token: RwLock::new(None),
            token_dir,
        }
    }

    /// Override where tokens are persisted (used by tests and portable
    /// installs).
    #[must_use]
    pub fn with_token_dir(mut self, token_dir: impl Into<PathBuf>) -> Self {
        self.token_dir = token_dir.into();
        self
    }

    pub fn domain(&self) -> &Url {
        &self.domain
    }

    /// The loaded authentication token, if any. Conda invocations splice it
    /// into private channel URLs.
    pub fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    /// Authenticate and persist the received token for later sessions.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), RegistryError> {
        let url = self.endpoint("authentications");
        let client = self.client.clone();
        let username = username.to_string();
        let password = password.to_string();

        let handle = self.queue.submit(async move {
            let response = client
                .post(url.clone())
                .basic_auth(&username, Some(&password))
                .json(&serde_json::json!({
                    "scopes": ["api:read", "api:write"],
                    "note": consts::APP_NAME,
                }))
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(RegistryError::HttpStatus {
                    url,
                    status: response.status(),
                });
            }
            let token: TokenResponse = response.json().await?;
            Ok(token.token)
        });

        let token = flatten(handle.finished().await)?;
        self.store_token(&token)?;
        *self.token.write() = Some(token);
        Ok(())
    }

    /// Drop the session and the persisted token.
    pub fn logout(&self) -> Result<(), RegistryError> {
        *self.token.write() = None;
        self.remove_token()
    }

    /// The authenticated user, if a token is loaded.
    pub async fn user(&self) -> Result<RegistryUser, RegistryError> {
        self.get_json(self.endpoint("user")).await
    }

    /// Package listings owned by a user or organization.
    pub async fn packages(&self, owner: &str) -> Result<Vec<RegistryPackage>, RegistryError> {
        self.get_json(self.endpoint(&format!("packages/{owner}")))
            .await
    }

    /// The organizations the given login belongs to; their packages are what
    /// private channels advertise.
    pub async fn organizations(&self, login: &str) -> Result<Vec<RegistryUser>, RegistryError> {
        self.get_json(self.endpoint(&format!("user/{login}/orgs")))
            .await
    }

    /// Whether the configured domain answers like a registry API.
    pub async fn is_valid_api_url(&self) -> bool {
        let url = self.domain.clone();
        let client = self.client.clone();
        let handle = self.queue.submit(async move {
            let Ok(response) = client.get(url).send().await else {
                return false;
            };
            let Ok(body) = response.json::<serde_json::Value>().await else {
                return false;
            };
            body.get("ok").and_then(serde_json::Value::as_i64) == Some(1)
        });
        handle.finished().await.unwrap_or(false)
    }

    /// Abort every in-flight registry call.
    pub fn terminate_all(&self) {
        self.queue.terminate_all();
    }

    /// Load a previously stored token for this domain, returning whether one
    /// was found.
    pub fn load_token(&self) -> Result<bool, RegistryError> {
        match fs_err::read_to_string(self.token_path()) {
            Ok(token) => {
                *self.token.write() = Some(token.trim().to_string());
                Ok(true)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(RegistryError::TokenStore(Arc::new(err))),
        }
    }

    fn store_token(&self, token: &str) -> Result<(), RegistryError> {
        fs_err::create_dir_all(&self.token_dir)
            .and_then(|_| fs_err::write(self.token_path(), token))
            .map_err(|err| RegistryError::TokenStore(Arc::new(err)))
    }

    fn remove_token(&self) -> Result<(), RegistryError> {
        match fs_err::remove_file(self.token_path()) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(RegistryError::TokenStore(Arc::new(err))),
        }
    }

    /// Per-domain token file, so several registries can be logged into at
    /// once.
    fn token_path(&self) -> PathBuf {
        let host = self.domain.host_str().unwrap_or("registry");
        self.token_dir.join(format!("{host}.token"))
    }

    fn endpoint(&self, path: &str) -> Url {
        let spec = format!("{}/{path}", self.domain.as_str().trim_end_matches('/'));
        Url::parse(&spec).expect("a registry endpoint path is a valid url suffix")
    }

    async fn get_json<T>(&self, url: Url) -> Result<T, RegistryError>
    where
        T: serde::de::DeserializeOwned + Send + 'static,
    {
        let token = self
            .token
            .read()
            .clone()
            .ok_or(RegistryError::NotAuthenticated)?;
        let client = self.client.clone();

        let handle = self.queue.submit(async move {
            let response = client
                .get(url.clone())
                .header("Authorization", format!("token {token}"))
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(RegistryError::HttpStatus {
                    url,
                    status: response.status(),
                });
            }
            Ok(response.json::<T>().await?)
        });
        flatten(handle.finished().await)
    }
}

fn flatten<T>(result: Result<Result<T, RegistryError>, TaskError>) -> Result<T, RegistryError> {
    match result {
        Ok(outcome) => outcome,
        Err(TaskError::Cancelled) => Err(RegistryError::Cancelled),
        Err(TaskError::Panicked(message)) => {
            tracing::error!("registry worker panicked: {message}");
            Err(RegistryError::Cancelled)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(domain: &str) -> RegistryClient {
        RegistryClient::new(ClientWithMiddleware::default(), Url::parse(domain).unwrap())
    }

    #[tokio::test]
    async fn token_files_are_keyed_by_domain_host() {
        let dir = tempfile::tempdir().unwrap();
        let client = client("https://api.anaconda.org").with_token_dir(dir.path());
        assert_eq!(
            client.token_path(),
            dir.path().join("api.anaconda.org.token")
        );
    }

    #[tokio::test]
    async fn tokens_round_trip_through_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let client = client("https://api.anaconda.org").with_token_dir(dir.path());

        assert!(!client.load_token().unwrap());
        client.store_token("SECRET").unwrap();
        assert!(client.load_token().unwrap());
        assert_eq!(client.token.read().as_deref(), Some("SECRET"));

        client.logout().unwrap();
        assert!(!client.load_token().unwrap());
    }

    #[tokio::test]
    async fn endpoints_join_cleanly() {
        let client = client("https://api.anaconda.org/");
        assert_eq!(
            client.endpoint("packages/owner").as_str(),
            "https://api.anaconda.org/packages/owner"
        );
    }

    #[test]
    fn listings_parse_with_missing_optional_fields() {
        let raw = r#"[{"name": "privpkg", "versions": ["1.0", "1.1"]}]"#;
        let packages: Vec<RegistryPackage> = serde_json::from_str(raw).unwrap();
        assert_eq!(packages[0].name, "privpkg");
        assert_eq!(packages[0].versions, ["1.0", "1.1"]);
        assert!(packages[0].summary.is_empty());
    }

    #[tokio::test]
    async fn calls_without_a_token_fail_fast() {
        let client = client("https://api.anaconda.org");
        assert!(matches!(
            client.user().await,
            Err(RegistryError::NotAuthenticated)
        ));
    }
}
