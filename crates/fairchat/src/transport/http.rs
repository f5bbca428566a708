//! HTTP implementation of [`ChatTransport`].

use std::time::Duration;

use async_trait::async_trait;
use fairchat_protocol::{ChatResponse, ErrorBody};
use log::{debug, info};
use reqwest::header::ACCEPT;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::pump::{StreamReport, pump_stream};
use super::{ChatPayload, ChatTransport, FragmentSink};
use crate::config::{AuthContext, ServerConfig};
use crate::error::{TransportError, TransportResult};

/// Header carrying the organization scope.
pub const ORGANIZATION_HEADER: &str = "X-Organization-Id";

const EVENT_STREAM: &str = "text/event-stream";

/// HTTP client for the assistant backend.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    client: reqwest::Client,
    auth: AuthContext,
    request_timeout: Duration,
}

impl HttpTransport {
    pub fn new(server: &ServerConfig, auth: AuthContext) -> TransportResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(server.connect_timeout_secs))
            .build()
            .map_err(|err| TransportError::Client(err.to_string()))?;

        Ok(Self {
            base_url: server.url.trim_end_matches('/').to_string(),
            client,
            auth,
            request_timeout: Duration::from_secs(server.request_timeout_secs),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    pub(crate) fn with_auth_headers(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let req = match self.auth.token.as_ref() {
            Some(token) => req.bearer_auth(token),
            None => req,
        };
        match self.auth.organization_id.as_ref() {
            Some(org) => req.header(ORGANIZATION_HEADER, org),
            None => req,
        }
    }

    pub(crate) fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.with_auth_headers(self.client.get(self.url(path)))
            .timeout(self.request_timeout)
    }

    pub(crate) fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.with_auth_headers(self.client.post(self.url(path)))
            .timeout(self.request_timeout)
    }
}

/// Turn a non-success response into [`TransportError::Status`].
pub(crate) async fn check_status(response: reqwest::Response) -> TransportResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TransportError::Status {
        status: status.as_u16(),
        detail: ErrorBody::detail_from(&body),
    })
}

#[async_trait]
impl ChatTransport for HttpTransport {
    #[instrument(skip_all, fields(endpoint = %endpoint))]
    async fn stream(
        &self,
        endpoint: &str,
        payload: &ChatPayload,
        on_fragment: &mut FragmentSink<'_>,
        cancel: &CancellationToken,
    ) -> TransportResult<StreamReport> {
        let request = self
            .with_auth_headers(self.client.post(self.url(endpoint)))
            .header(ACCEPT, EVENT_STREAM)
            .json(payload);

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("stream request cancelled before response");
                return Ok(StreamReport::cancelled());
            }
            response = request.send() => response?,
        };
        let response = check_status(response).await?;
        info!("streaming reply from {endpoint} ({})", response.status());

        pump_stream(Box::pin(response.bytes_stream()), on_fragment, cancel).await
    }

    #[instrument(skip_all, fields(endpoint = %endpoint))]
    async fn send(&self, endpoint: &str, payload: &ChatPayload) -> TransportResult<ChatResponse> {
        let response = self.post(endpoint).json(payload).send().await?;
        let response = check_status(response).await?;
        response
            .json::<ChatResponse>()
            .await
            .map_err(|err| TransportError::Decode(err.to_string()))
    }
}
