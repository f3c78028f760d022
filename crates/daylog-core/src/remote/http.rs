//! reqwest implementation of [`LogRemote`].

use std::fmt;
use std::sync::Arc;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{parse_api_error, LogRemote, RemoteError, RemoteResult};
use crate::models::{BackupRecord, LogDate, LogPush, ServerLogRecord};
use crate::storage::KeyValueStore;
use crate::util::is_http_url;

/// Storage key holding the bearer token.
pub const TOKEN_KEY: &str = "token";

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Serialize)]
struct BulkRequest<'a> {
    logs: &'a [LogPush],
}

/// Talks to the daylog API with a bearer token kept in local storage.
pub struct HttpLogRemote<S> {
    base_url: String,
    client: Client,
    tokens: Arc<S>,
}

impl<S> fmt::Debug for HttpLogRemote<S> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("HttpLogRemote")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl<S: KeyValueStore + 'static> HttpLogRemote<S> {
    pub fn new(base_url: impl AsRef<str>, tokens: Arc<S>) -> RemoteResult<Self> {
        Ok(Self {
            base_url: normalize_api_url(base_url.as_ref())?,
            client: Client::builder().build()?,
            tokens,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create an account and keep its session.
    pub async fn sign_up(&self, username: &str, password: &str) -> RemoteResult<()> {
        self.authenticate("/auth/signup", username, password).await
    }

    pub async fn sign_in(&self, username: &str, password: &str) -> RemoteResult<()> {
        self.authenticate("/auth/login", username, password).await
    }

    /// Forget the stored token.
    pub fn sign_out(&self) -> RemoteResult<()> {
        self.tokens
            .remove(TOKEN_KEY)
            .map_err(|error| RemoteError::TokenStorage(error.to_string()))
    }

    async fn authenticate(&self, path: &str, username: &str, password: &str) -> RemoteResult<()> {
        validate_credentials(username, password)?;
        let request = self
            .client
            .post(self.url(path))
            .json(&Credentials { username, password });
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Api(parse_api_error(status, &body)));
        }
        let token = response.json::<TokenResponse>().await?;
        self.tokens
            .set(TOKEN_KEY, &token.access_token)
            .map_err(|error| RemoteError::TokenStorage(error.to_string()))?;
        tracing::info!(username, "Signed in");
        Ok(())
    }

    fn token(&self) -> Option<String> {
        match self.tokens.get(TOKEN_KEY) {
            Ok(token) => token.filter(|token| !token.trim().is_empty()),
            Err(error) => {
                tracing::warn!("Failed to read stored token: {}", error);
                None
            }
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorized(&self, request: RequestBuilder) -> RemoteResult<RequestBuilder> {
        let token = self.token().ok_or(RemoteError::Unauthenticated)?;
        Ok(request.bearer_auth(token))
    }

    async fn send(&self, request: RequestBuilder) -> RemoteResult<Response> {
        let response = self.authorized(request)?.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            let body = response.text().await.unwrap_or_default();
            if let Err(error) = self.tokens.remove(TOKEN_KEY) {
                tracing::warn!("Failed to clear rejected token: {}", error);
            }
            tracing::warn!("Server rejected session; stored token cleared");
            return Err(RemoteError::Unauthorized(parse_api_error(status, &body)));
        }
        Ok(response)
    }

    async fn read_data<T: DeserializeOwned>(response: Response) -> RemoteResult<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Api(parse_api_error(status, &body)));
        }
        Ok(response.json::<DataEnvelope<T>>().await?.data)
    }
}

impl<S: KeyValueStore + 'static> LogRemote for HttpLogRemote<S> {
    fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    async fn fetch_log(&self, date: LogDate) -> RemoteResult<Option<ServerLogRecord>> {
        let response = self
            .send(self.client.get(self.url(&format!("/raw-logs/{date}"))))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::read_data(response).await.map(Some)
    }

    async fn push_log(&self, push: &LogPush) -> RemoteResult<ServerLogRecord> {
        let response = self
            .send(self.client.post(self.url("/raw-logs")).json(push))
            .await?;
        Self::read_data(response).await
    }

    async fn push_bulk(&self, logs: &[LogPush]) -> RemoteResult<Vec<ServerLogRecord>> {
        let response = self
            .send(
                self.client
                    .post(self.url("/raw-logs/bulk"))
                    .json(&BulkRequest { logs }),
            )
            .await?;
        Self::read_data(response).await
    }

    async fn fetch_all(&self) -> RemoteResult<Vec<ServerLogRecord>> {
        let response = self.send(self.client.get(self.url("/raw-logs"))).await?;
        Self::read_data(response).await
    }

    async fn fetch_backups(&self, date: LogDate) -> RemoteResult<Vec<BackupRecord>> {
        let response = self
            .send(
                self.client
                    .get(self.url(&format!("/raw-logs/{date}/backups"))),
            )
            .await?;
        Self::read_data(response).await
    }
}

pub fn normalize_api_url(url: &str) -> RemoteResult<String> {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(RemoteError::InvalidConfiguration(
            "API URL must not be empty",
        ));
    }
    if !is_http_url(trimmed) {
        return Err(RemoteError::InvalidConfiguration(
            "API URL must include http:// or https://",
        ));
    }
    Ok(trimmed.to_string())
}

fn validate_credentials(username: &str, password: &str) -> RemoteResult<()> {
    if username.trim().is_empty() {
        return Err(RemoteError::Api("Username is required".to_string()));
    }
    if password.is_empty() {
        return Err(RemoteError::Api("Password is required".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn normalize_api_url_strips_trailing_slash() {
        assert_eq!(
            normalize_api_url("https://logs.example.com/").unwrap(),
            "https://logs.example.com"
        );
    }

    #[test]
    fn normalize_api_url_requires_scheme() {
        assert!(normalize_api_url("logs.example.com").is_err());
        assert!(normalize_api_url("   ").is_err());
    }

    #[test]
    fn authentication_follows_stored_token() {
        let tokens = Arc::new(MemoryStore::new());
        let remote = HttpLogRemote::new("http://localhost:3000", tokens.clone()).unwrap();
        assert!(!remote.is_authenticated());

        tokens.set(TOKEN_KEY, "jwt").unwrap();
        assert!(remote.is_authenticated());

        remote.sign_out().unwrap();
        assert!(!remote.is_authenticated());
    }

    #[tokio::test]
    async fn requests_without_token_fail_before_sending() {
        let remote =
            HttpLogRemote::new("http://localhost:9", Arc::new(MemoryStore::new())).unwrap();
        let err = remote
            .fetch_log("2026-01-12".parse().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Unauthenticated));
    }

    #[test]
    fn debug_omits_token_store() {
        let remote =
            HttpLogRemote::new("http://localhost:3000", Arc::new(MemoryStore::new())).unwrap();
        let rendered = format!("{remote:?}");
        assert!(rendered.contains("localhost:3000"));
    }
}
