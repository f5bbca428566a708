//! Streaming transport to the assistant backend.
//!
//! The transport never touches the transcript. Decoded fragments are handed
//! to a caller-supplied callback, which is the only way text reaches the
//! [`MessageStore`](crate::store::MessageStore).

pub mod decoder;
pub mod http;
pub mod pump;

use async_trait::async_trait;
use fairchat_protocol::{AnalyzeModelRequest, ChatRequest, ChatResponse};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::TransportResult;

pub use decoder::{Frame, FrameDecoder, Utf8StreamDecoder};
pub use http::HttpTransport;
pub use pump::{StreamOutcome, StreamReport, pump_stream};

/// Callback receiving decoded reply fragments in arrival order.
pub type FragmentSink<'a> = dyn for<'s> FnMut(&'s str) + Send + 'a;

/// Body of an outgoing assistant request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ChatPayload {
    Chat(ChatRequest),
    AnalyzeModel(AnalyzeModelRequest),
}

impl ChatPayload {
    /// The user text carried by this payload.
    pub fn text(&self) -> &str {
        match self {
            Self::Chat(req) => &req.message,
            Self::AnalyzeModel(req) => &req.user_query,
        }
    }
}

/// A backend capable of answering chat messages.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Post `payload` to `endpoint` and stream the reply into `on_fragment`.
    ///
    /// Fails before any callback when the request cannot be sent or the
    /// response status is not a success.
    async fn stream(
        &self,
        endpoint: &str,
        payload: &ChatPayload,
        on_fragment: &mut FragmentSink<'_>,
        cancel: &CancellationToken,
    ) -> TransportResult<StreamReport>;

    /// Post `payload` to `endpoint` and wait for the complete reply.
    async fn send(&self, endpoint: &str, payload: &ChatPayload) -> TransportResult<ChatResponse>;
}
