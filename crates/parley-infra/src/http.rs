//! HttpSessionRepository -- [`SessionRepository`] over the chat REST API.
//!
//! Endpoints, relative to `api.base_url`:
//!
//! | Operation          | Request                                         |
//! |--------------------|-------------------------------------------------|
//! | `create_session`   | `POST /sessions`                                |
//! | `get_message_page` | `GET /sessions/{id}/messages?page={p}&size={s}` |
//! | `mark_read`        | `POST /messages/read` with `{"ids":[...]}`      |
//!
//! Every request carries `Authorization: Bearer <token>`. The token is held
//! as a [`SecretString`] and only exposed while building headers.

use std::time::Duration;

use parley_core::chat::SessionRepository;
use parley_types::config::ApiConfig;
use parley_types::error::RepositoryError;
use parley_types::message::SessionInfo;
use parley_types::page::Page;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;

#[derive(Serialize)]
struct MarkReadBody<'a> {
    ids: &'a [i64],
}

// No Debug: the bearer token must never end up in logs.
pub struct HttpSessionRepository {
    client: reqwest::Client,
    base_url: String,
    token: SecretString,
}

impl HttpSessionRepository {
    pub fn new(config: &ApiConfig, token: SecretString) -> Result<Self, RepositoryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| RepositoryError::Http(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, RepositoryError> {
        let response = self.send(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| RepositoryError::Decode(format!("failed to parse response: {e}")))
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, RepositoryError> {
        let response = request
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|e| RepositoryError::Http(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(%status, "session API request failed");
        Err(match status.as_u16() {
            401 | 403 => RepositoryError::Unauthorized,
            code => RepositoryError::Status { status: code, body },
        })
    }
}

impl SessionRepository for HttpSessionRepository {
    async fn create_session(&self) -> Result<SessionInfo, RepositoryError> {
        self.execute(self.client.post(self.url("/sessions"))).await
    }

    async fn get_message_page(
        &self,
        session_id: i64,
        page: u32,
        size: u32,
    ) -> Result<Page, RepositoryError> {
        let request = self
            .client
            .get(self.url(&format!("/sessions/{session_id}/messages")))
            .query(&[("page", page), ("size", size)]);
        self.execute(request).await
    }

    async fn mark_read(&self, ids: &[i64]) -> Result<(), RepositoryError> {
        let request = self
            .client
            .post(self.url("/messages/read"))
            .json(&MarkReadBody { ids });
        self.send(request).await.map(|_| ())
    }
}
