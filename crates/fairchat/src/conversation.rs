//! The message-sending handler.
//!
//! A [`Conversation`] ties one session, its transcript and a transport
//! together. Each call to [`Conversation::send`] routes the message, appends
//! the user entry and a pending reply, and drives the transport until the
//! reply is complete. Transport failures never escape: they end up as the
//! reply's text.

use fairchat_protocol::{AnalyzeModelRequest, ChatRequest, SessionContext};
use log::{info, warn};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::EndpointsConfig;
use crate::error::ConversationError;
use crate::router::{self, Intent, Route, TransportMode};
use crate::session::SessionManager;
use crate::store::{MessageId, MessageStore};
use crate::transport::{ChatPayload, ChatTransport, FragmentSink, StreamOutcome};

/// Shown when the server gave no error detail.
pub const GENERIC_ERROR_DETAIL: &str = "Failed to get a response from the assistant";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationOptions {
    /// Model the conversation is about. Required for code analysis.
    pub model_id: Option<i64>,
    /// Repository the server may fetch for general chat messages.
    pub github_url: Option<String>,
    /// Whether replies can be displayed incrementally.
    pub streaming: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReplyStatus {
    Completed,
    Cancelled,
    Failed { detail: String },
}

/// What happened to one sent message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub route: Route,
    pub endpoint: String,
    pub user_message: MessageId,
    pub assistant_message: MessageId,
    #[serde(flatten)]
    pub status: ReplyStatus,
    pub fragments: usize,
}

pub struct Conversation<T> {
    transport: T,
    endpoints: EndpointsConfig,
    options: ConversationOptions,
    session: SessionManager,
    store: MessageStore,
}

impl<T: ChatTransport> Conversation<T> {
    pub fn new(
        transport: T,
        endpoints: EndpointsConfig,
        session: SessionManager,
        options: ConversationOptions,
    ) -> Self {
        Self {
            transport,
            endpoints,
            options,
            session,
            store: MessageStore::new(),
        }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn options(&self) -> &ConversationOptions {
        &self.options
    }

    /// Overwrite the optimistic context flag with the server's answer.
    pub fn reconcile_context(&mut self, context: &SessionContext) -> bool {
        self.session.reconcile(context)
    }

    pub async fn send(
        &mut self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Reply, ConversationError> {
        self.send_observed(text, cancel, &mut |_: &str| {}).await
    }

    /// Like [`send`](Self::send), also passing every fragment to `observer`
    /// once it has been applied to the transcript.
    pub async fn send_observed(
        &mut self,
        text: &str,
        cancel: &CancellationToken,
        observer: &mut FragmentSink<'_>,
    ) -> Result<Reply, ConversationError> {
        if text.trim().is_empty() {
            return Err(ConversationError::EmptyMessage);
        }

        let (route, payload) = self.prepare(text);
        if route.intent == Intent::CodeAnalysis {
            self.session.mark_context_attached();
        }
        let endpoint = route.endpoint(&self.endpoints).to_string();

        let user_message = self.store.append_user(text);
        let assistant_message = self.store.append_pending();
        info!(
            "sending {} message {} to {endpoint} ({:?})",
            route.intent, user_message, route.mode
        );

        let result = match route.mode {
            TransportMode::Streaming => {
                let store = &mut self.store;
                let id = &assistant_message;
                let mut on_fragment = |fragment: &str| {
                    if let Err(err) = store.apply_fragment(id, fragment) {
                        warn!("dropping fragment for {id}: {err}");
                        return;
                    }
                    observer(fragment);
                };
                self.transport
                    .stream(&endpoint, &payload, &mut on_fragment, cancel)
                    .await
                    .map(|report| (report.outcome, report.fragments))
            }
            TransportMode::SingleShot => {
                let response = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    response = self.transport.send(&endpoint, &payload) => Some(response),
                };
                match response {
                    None => Ok((StreamOutcome::Cancelled, 0)),
                    Some(Ok(response)) if response.response.is_empty() => {
                        Ok((StreamOutcome::Done, 0))
                    }
                    Some(Ok(response)) => {
                        self.store
                            .apply_fragment(&assistant_message, &response.response)?;
                        observer(&response.response);
                        Ok((StreamOutcome::Done, 1))
                    }
                    Some(Err(err)) => Err(err),
                }
            }
        };

        let (status, fragments) = match result {
            Ok((StreamOutcome::Cancelled, fragments)) => {
                self.store.finalize(&assistant_message)?;
                (ReplyStatus::Cancelled, fragments)
            }
            Ok((_, fragments)) => {
                self.store.finalize(&assistant_message)?;
                (ReplyStatus::Completed, fragments)
            }
            Err(err) => {
                warn!("reply {assistant_message} failed: {err}");
                let detail = err
                    .server_detail()
                    .unwrap_or(GENERIC_ERROR_DETAIL)
                    .to_string();
                self.store.apply_error(&assistant_message, &detail)?;
                (ReplyStatus::Failed { detail }, 0)
            }
        };

        Ok(Reply {
            route,
            endpoint,
            user_message,
            assistant_message,
            status,
            fragments,
        })
    }

    /// Route `text` and build its request body. Code analysis needs a model;
    /// without one the message goes to general chat.
    fn prepare(&self, text: &str) -> (Route, ChatPayload) {
        let mut route = router::route(text, self.options.streaming);
        let session_id = Some(self.session.id().to_string());

        if route.intent == Intent::CodeAnalysis {
            match self.options.model_id {
                Some(model_id) => {
                    let payload = ChatPayload::AnalyzeModel(AnalyzeModelRequest {
                        model_id,
                        user_query: text.to_string(),
                        session_id,
                    });
                    return (route, payload);
                }
                None => {
                    warn!("code analysis requested without a model id, using general chat");
                    route.intent = Intent::GeneralChat;
                }
            }
        }

        let payload = ChatPayload::Chat(ChatRequest {
            message: text.to_string(),
            model_id: self.options.model_id,
            github_url: self.options.github_url.clone(),
            session_id,
        });
        (route, payload)
    }
}
