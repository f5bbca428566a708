//! Non-streaming calls the chat view makes besides sending messages.

use fairchat_protocol::{ClearSessionResponse, GithubUrl, SessionContext};
use log::debug;
use serde::de::DeserializeOwned;

use crate::config::EndpointsConfig;
use crate::error::{TransportError, TransportResult};
use crate::transport::HttpTransport;
use crate::transport::http::check_status;

/// Typed client for session and model lookups.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: HttpTransport,
    endpoints: EndpointsConfig,
}

impl ApiClient {
    pub fn new(http: HttpTransport, endpoints: EndpointsConfig) -> Self {
        Self { http, endpoints }
    }

    pub fn base_url(&self) -> &str {
        self.http.base_url()
    }

    /// Server-side context of a chat session.
    pub async fn session_context(&self, session_id: &str) -> TransportResult<SessionContext> {
        let path = fill(&self.endpoints.session_context, "{session_id}", session_id);
        let response = self.http.get(&path).send().await?;
        decode(response).await
    }

    /// Drop the server-side context of a chat session.
    pub async fn clear_session(&self, session_id: &str) -> TransportResult<ClearSessionResponse> {
        let path = fill(&self.endpoints.clear_session, "{session_id}", session_id);
        let response = self.http.post(&path).send().await?;
        decode(response).await
    }

    /// Repository URL registered for a model.
    pub async fn model_github_url(&self, model_id: i64) -> TransportResult<Option<String>> {
        let path = fill(
            &self.endpoints.model_github_url,
            "{model_id}",
            &model_id.to_string(),
        );
        let response = self.http.get(&path).send().await?;
        let body: GithubUrl = decode(response).await?;
        Ok(body.github_url)
    }

    /// Whether the backend answers its health endpoint with success.
    pub async fn health(&self) -> TransportResult<bool> {
        let response = self.http.get(&self.endpoints.health).send().await?;
        debug!("health check returned {}", response.status());
        Ok(response.status().is_success())
    }
}

fn fill(template: &str, placeholder: &str, value: &str) -> String {
    template.replace(placeholder, &urlencoding::encode(value))
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> TransportResult<T> {
    let response = check_status(response).await?;
    response
        .json::<T>()
        .await
        .map_err(|err| TransportError::Decode(err.to_string()))
}
