//! Ordered conversation transcript.

use std::fmt;

use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;

use crate::error::{StoreError, StoreResult};

/// Text of an assistant message that has not received content yet.
///
/// Empty, so no fragment the server sends can be mistaken for it.
pub const PENDING_PLACEHOLDER: &str = "";

/// Prefix of the text shown when a reply failed.
pub const ERROR_PREFIX: &str = "Sorry, I encountered an error: ";

/// Text left in place when a reply finished without any content.
pub const EMPTY_REPLY_NOTICE: &str = "The assistant returned an empty response.";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub text: String,
    pub created_at: DateTime<Utc>,
    /// False while an assistant reply is still arriving.
    pub complete: bool,
}

impl Message {
    pub fn is_pending(&self) -> bool {
        self.role == Role::Assistant && !self.complete && self.text == PENDING_PLACEHOLDER
    }
}

/// Append-only message log.
///
/// User messages are immutable. Assistant messages start as the pending
/// placeholder and accept fragments until they are finalized or replaced by
/// an error.
#[derive(Debug, Default, Serialize)]
pub struct MessageStore {
    messages: Vec<Message>,
    next_seq: u64,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> MessageId {
        self.next_seq += 1;
        MessageId(format!("msg-{}", self.next_seq))
    }

    fn push(&mut self, role: Role, text: String, complete: bool) -> MessageId {
        let id = self.next_id();
        self.messages.push(Message {
            id: id.clone(),
            role,
            text,
            created_at: Utc::now(),
            complete,
        });
        id
    }

    pub fn append_user(&mut self, text: impl Into<String>) -> MessageId {
        self.push(Role::User, text.into(), true)
    }

    /// Append an assistant placeholder and return its id.
    pub fn append_pending(&mut self) -> MessageId {
        self.push(Role::Assistant, PENDING_PLACEHOLDER.to_string(), false)
    }

    fn open_assistant(&mut self, id: &MessageId) -> StoreResult<&mut Message> {
        let message = self
            .messages
            .iter_mut()
            .find(|m| &m.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if message.role != Role::Assistant {
            return Err(StoreError::NotAssistant(id.to_string()));
        }
        if message.complete {
            return Err(StoreError::AlreadyComplete(id.to_string()));
        }
        Ok(message)
    }

    /// Add a fragment to an assistant reply. The first fragment replaces the
    /// placeholder, later ones are appended.
    pub fn apply_fragment(&mut self, id: &MessageId, fragment: &str) -> StoreResult<()> {
        let message = self.open_assistant(id)?;
        if message.text == PENDING_PLACEHOLDER {
            message.text = fragment.to_string();
        } else {
            message.text.push_str(fragment);
        }
        Ok(())
    }

    /// Replace an assistant reply with the error text and close it.
    pub fn apply_error(&mut self, id: &MessageId, detail: &str) -> StoreResult<()> {
        let message = self.open_assistant(id)?;
        message.text = format!("{ERROR_PREFIX}{detail}");
        message.complete = true;
        debug!("message {id} closed with error");
        Ok(())
    }

    /// Close an assistant reply. A reply that never received content gets
    /// the empty-reply notice.
    pub fn finalize(&mut self, id: &MessageId) -> StoreResult<()> {
        let message = self.open_assistant(id)?;
        if message.text == PENDING_PLACEHOLDER {
            message.text = EMPTY_REPLY_NOTICE.to_string();
        }
        message.complete = true;
        Ok(())
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| &m.id == id)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_fragment_replaces_placeholder() {
        let mut store = MessageStore::new();
        store.append_user("hi");
        let reply = store.append_pending();
        assert!(store.get(&reply).unwrap().is_pending());

        store.apply_fragment(&reply, "Hello").unwrap();
        store.apply_fragment(&reply, " world").unwrap();

        assert_eq!(store.len(), 2);
        let assistant = store.get(&reply).unwrap();
        assert_eq!(assistant.role, Role::Assistant);
        assert_eq!(assistant.text, "Hello world");
        assert!(!assistant.is_pending());
    }

    #[test]
    fn reply_starting_with_placeholder_like_text_is_kept() {
        let mut store = MessageStore::new();
        let reply = store.append_pending();
        store.apply_fragment(&reply, "Thinking...").unwrap();
        store.apply_fragment(&reply, " done").unwrap();
        store.finalize(&reply).unwrap();
        assert_eq!(store.get(&reply).unwrap().text, "Thinking... done");
    }

    #[test]
    fn error_after_no_fragments_replaces_placeholder() {
        let mut store = MessageStore::new();
        let reply = store.append_pending();
        store.apply_error(&reply, "Model not found").unwrap();

        let message = store.get(&reply).unwrap();
        assert_eq!(message.text, "Sorry, I encountered an error: Model not found");
        assert!(message.complete);
    }

    #[test]
    fn error_replaces_partial_reply() {
        let mut store = MessageStore::new();
        let reply = store.append_pending();
        store.apply_fragment(&reply, "Partial").unwrap();
        store.apply_error(&reply, "stream cut").unwrap();
        assert_eq!(
            store.get(&reply).unwrap().text,
            "Sorry, I encountered an error: stream cut"
        );
    }

    #[test]
    fn ids_increase_in_creation_order() {
        let mut store = MessageStore::new();
        let a = store.append_user("one");
        let b = store.append_pending();
        let c = store.append_user("two");
        assert_eq!(a.as_str(), "msg-1");
        assert_eq!(b.as_str(), "msg-2");
        assert_eq!(c.as_str(), "msg-3");
        let order: Vec<&str> = store.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(order, vec!["msg-1", "msg-2", "msg-3"]);
    }

    #[test]
    fn user_messages_are_immutable() {
        let mut store = MessageStore::new();
        let user = store.append_user("question");
        assert_eq!(
            store.apply_fragment(&user, "x"),
            Err(StoreError::NotAssistant("msg-1".to_string()))
        );
        assert_eq!(store.get(&user).unwrap().text, "question");
    }

    #[test]
    fn finalized_replies_reject_fragments() {
        let mut store = MessageStore::new();
        let reply = store.append_pending();
        store.apply_fragment(&reply, "done").unwrap();
        store.finalize(&reply).unwrap();
        assert_eq!(
            store.apply_fragment(&reply, "more"),
            Err(StoreError::AlreadyComplete("msg-1".to_string()))
        );
        assert_eq!(store.get(&reply).unwrap().text, "done");
    }

    #[test]
    fn finalize_without_content_leaves_notice() {
        let mut store = MessageStore::new();
        let reply = store.append_pending();
        store.finalize(&reply).unwrap();
        assert_eq!(store.get(&reply).unwrap().text, EMPTY_REPLY_NOTICE);
    }

    #[test]
    fn interleaved_replies_stay_separate() {
        let mut store = MessageStore::new();
        let first = store.append_pending();
        let second = store.append_pending();
        store.apply_fragment(&first, "A1").unwrap();
        store.apply_fragment(&second, "B1").unwrap();
        store.apply_fragment(&first, "A2").unwrap();
        assert_eq!(store.get(&first).unwrap().text, "A1A2");
        assert_eq!(store.get(&second).unwrap().text, "B1");
    }

    #[test]
    fn unknown_id_is_rejected() {
        let mut store = MessageStore::new();
        let missing = MessageId("msg-9".to_string());
        assert_eq!(
            store.apply_error(&missing, "x"),
            Err(StoreError::NotFound("msg-9".to_string()))
        );
    }
}
