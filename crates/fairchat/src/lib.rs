//! Streaming assistant client for the fairness certification platform.
//!
//! The pieces, leaves first:
//!
//! - [`transport`]: posts a message and decodes the streamed reply into text
//!   fragments.
//! - [`router`]: picks the backend capability and delivery mode per message.
//! - [`session`]: session identity and the "context attached" flag.
//! - [`store`]: the ordered transcript.
//! - [`conversation`]: the message-sending handler tying them together.

pub mod api;
pub mod config;
pub mod conversation;
pub mod error;
pub mod router;
pub mod session;
pub mod store;
pub mod transport;

pub use api::ApiClient;
pub use config::{AppConfig, AuthContext};
pub use conversation::{Conversation, ConversationOptions, Reply, ReplyStatus};
pub use error::{ConversationError, StoreError, TransportError};
pub use router::{Intent, Route, TransportMode};
pub use session::SessionManager;
pub use store::{Message, MessageId, MessageStore, Role};
pub use transport::{
    ChatPayload, ChatTransport, FragmentSink, HttpTransport, StreamOutcome, StreamReport,
};
