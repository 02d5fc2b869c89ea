//! Session credential handling
//!
//! The remote service authenticates every call (HTTP and WebSocket upgrade)
//! with a `token` cookie. The token lives in a plain-text file; a refresh call
//! returns a new one in `Set-Cookie`, which is written back to the file.

use crate::config::Config;
use crate::error::{AuthError, Error, Result};
use crate::retry::with_retry;
use regex::Regex;
use reqwest::header::{COOKIE, HeaderMap, HeaderValue, ORIGIN, SET_COOKIE};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

/// Path of the session refresh endpoint, relative to `endpoints.api_url`
const REFRESH_PATH: &str = "/api/users/me/refresh-session";

// Literal pattern, compilation cannot fail.
#[allow(clippy::unwrap_used)]
static TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"token=([A-Za-z0-9+\-._]+)").unwrap());

/// Opaque bearer token
///
/// `Debug` never prints the token itself.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a raw token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for building request headers
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Credential(<{} chars>)", self.0.len())
    }
}

/// Token file on disk
#[derive(Clone, Debug)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    /// Create a store backed by `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the token file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and trim the stored token
    pub async fn read(&self) -> Result<Credential> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            AuthError::TokenFileUnreadable {
                path: self.path.clone(),
                reason: e.to_string(),
            }
        })?;

        let token = raw.trim();
        if token.is_empty() {
            return Err(AuthError::EmptyToken {
                path: self.path.clone(),
            }
            .into());
        }
        Ok(Credential::new(token))
    }

    /// Replace the stored token
    pub async fn write(&self, credential: &Credential) -> Result<()> {
        tokio::fs::write(&self.path, credential.expose()).await?;
        debug!(path = %self.path.display(), "token file rewritten");
        Ok(())
    }
}

/// Value of the `Cookie` header for a credential
pub fn cookie_value(app_id: &str, credential: &Credential) -> String {
    format!("app-uid={}; token={}", app_id, credential.expose())
}

/// Headers that authenticate an HTTP request
pub fn auth_headers(config: &Config, credential: &Credential) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let cookie = cookie_value(&config.workspace.app_id, credential);
    headers.insert(
        COOKIE,
        HeaderValue::from_str(&cookie).map_err(|e| AuthError::InvalidHeader(e.to_string()))?,
    );
    headers.insert(
        ORIGIN,
        HeaderValue::from_str(&config.endpoints.origin)
            .map_err(|e| Error::config("endpoints.origin", e.to_string()))?,
    );
    Ok(headers)
}

/// Find a token in a set of `Set-Cookie` header values
pub fn extract_token<'a>(set_cookies: impl IntoIterator<Item = &'a str>) -> Option<String> {
    set_cookies.into_iter().find_map(|cookie| {
        TOKEN_PATTERN
            .captures(cookie)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    })
}

/// Refresh the session and persist the new token
///
/// Reads the current token from `store`, calls the refresh endpoint, and
/// writes the token found in the response cookies back to the store. When
/// the response carries no token the current one is kept.
///
/// # Errors
///
/// Fails when the token file cannot be read or the endpoint rejects the
/// credential. Both abort session startup.
pub async fn refresh_credential(
    client: &reqwest::Client,
    config: &Config,
    store: &TokenStore,
) -> Result<Credential> {
    let current = store.read().await?;
    let url = format!(
        "{}{}",
        config.endpoints.api_url.trim_end_matches('/'),
        REFRESH_PATH
    );
    let headers = auth_headers(config, &current)?;

    let response = with_retry(&config.retry, || {
        let request = client
            .post(&url)
            .headers(headers.clone())
            .header("X-Requested-With", "XMLHttpRequest");
        async move {
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(Error::Auth(AuthError::Rejected {
                    status: status.as_u16(),
                }));
            }
            Ok::<_, Error>(response)
        }
    })
    .await?;

    let cookies = response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok());

    match extract_token(cookies) {
        Some(token) => {
            let refreshed = Credential::new(token);
            store.write(&refreshed).await?;
            info!("session credential refreshed");
            Ok(refreshed)
        }
        None => {
            warn!("refresh response carried no token, keeping the current one");
            Ok(current)
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(api_url: &str) -> Config {
        let mut config = Config::default();
        config.workspace.brain_id = "brain".to_string();
        config.workspace.app_id = "app-7".to_string();
        config.endpoints.api_url = api_url.to_string();
        config.retry.max_attempts = 0;
        config.retry.initial_delay = Duration::from_millis(1);
        config
    }

    fn store_with(dir: &tempfile::TempDir, token: &str) -> TokenStore {
        let path = dir.path().join("token");
        std::fs::write(&path, token).unwrap();
        TokenStore::new(path)
    }

    #[test]
    fn debug_hides_token() {
        let credential = Credential::new("super-secret");
        let printed = format!("{credential:?}");
        assert!(!printed.contains("super-secret"));
        assert!(printed.contains("12 chars"));
    }

    #[test]
    fn extract_token_accepts_token_characters() {
        let cookies = [
            "_ga=GA1; Path=/",
            "token=abc.DEF-1+2_3; Path=/; HttpOnly",
        ];
        assert_eq!(extract_token(cookies), Some("abc.DEF-1+2_3".to_string()));
    }

    #[test]
    fn extract_token_stops_at_separator() {
        assert_eq!(
            extract_token(["token=abc;def"]),
            Some("abc".to_string())
        );
        assert_eq!(extract_token(["session=xyz"]), None);
    }

    #[test]
    fn cookie_carries_app_uid_and_token() {
        let cookie = cookie_value("app-1", &Credential::new("tok"));
        assert_eq!(cookie, "app-uid=app-1; token=tok");
    }

    #[tokio::test]
    async fn read_trims_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&dir, "  tok-1\n");
        assert_eq!(store.read().await.unwrap().expose(), "tok-1");
    }

    #[tokio::test]
    async fn read_rejects_empty_and_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&dir, "\n");
        assert!(matches!(
            store.read().await,
            Err(Error::Auth(AuthError::EmptyToken { .. }))
        ));

        let missing = TokenStore::new(dir.path().join("nope"));
        assert!(matches!(
            missing.read().await,
            Err(Error::Auth(AuthError::TokenFileUnreadable { .. }))
        ));
    }

    #[tokio::test]
    async fn refresh_rewrites_token_file() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .and(header("cookie", "app-uid=app-7; token=old-token"))
            .and(header("x-requested-with", "XMLHttpRequest"))
            .respond_with(
                ResponseTemplate::new(200)
                    .append_header("Set-Cookie", "other=1; Path=/")
                    .append_header("Set-Cookie", "token=new.Token_2; Path=/; HttpOnly"),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&dir, "old-token");
        let config = test_config(&mock_server.uri());

        let refreshed = refresh_credential(&reqwest::Client::new(), &config, &store)
            .await
            .unwrap();

        assert_eq!(refreshed.expose(), "new.Token_2");
        assert_eq!(
            std::fs::read_to_string(store.path()).unwrap(),
            "new.Token_2"
        );
    }

    #[tokio::test]
    async fn refresh_without_token_keeps_current() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&dir, "keep-me");
        let config = test_config(&mock_server.uri());

        let credential = refresh_credential(&reqwest::Client::new(), &config, &store)
            .await
            .unwrap();
        assert_eq!(credential.expose(), "keep-me");
    }

    #[tokio::test]
    async fn refresh_rejected_is_auth_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .respond_with(ResponseTemplate::new(401))
            .mount(&mock_server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&dir, "expired");
        let config = test_config(&mock_server.uri());

        let err = refresh_credential(&reqwest::Client::new(), &config, &store)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::Rejected { status: 401 })));
    }
}
