//! Chat session identity and context tracking.

use chrono::{DateTime, Utc};
use fairchat_protocol::SessionContext;
use log::{debug, info};
use serde::Serialize;
use uuid::Uuid;

/// One continuous chat interaction, scoped to a resource.
///
/// The "context attached" flag is set optimistically when a code-analysis
/// message is dispatched, before the server confirms it fetched anything.
/// [`SessionManager::reconcile`] replaces it with the server's answer.
#[derive(Debug, Clone, Serialize)]
pub struct SessionManager {
    id: String,
    scope: String,
    created_at: DateTime<Utc>,
    context_attached: bool,
}

impl SessionManager {
    /// Start a session for `scope` (usually a model id).
    pub fn new(scope: impl Into<String>) -> Self {
        Self::new_at(scope, Utc::now())
    }

    pub fn new_at(scope: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        let scope = scope.into();
        let scope = if scope.trim().is_empty() {
            "default".to_string()
        } else {
            scope.trim().to_string()
        };
        let id = format!(
            "chat_{}_{}_{}",
            scope,
            created_at.timestamp_millis(),
            Uuid::new_v4().simple()
        );
        debug!("created chat session {id}");
        Self {
            id,
            scope,
            created_at,
            context_attached: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn context_attached(&self) -> bool {
        self.context_attached
    }

    /// Record that a code-analysis message was dispatched in this session.
    pub fn mark_context_attached(&mut self) {
        if !self.context_attached {
            info!("session {} marked as carrying repository context", self.id);
            self.context_attached = true;
        }
    }

    /// Adopt the server's view of whether context is attached.
    ///
    /// Returns true when the local flag changed.
    pub fn reconcile(&mut self, context: &SessionContext) -> bool {
        let changed = self.context_attached != context.has_github_code;
        if changed {
            info!(
                "session {} context flag reconciled: {} -> {}",
                self.id, self.context_attached, context.has_github_code
            );
        }
        self.context_attached = context.has_github_code;
        changed
    }

    /// Forget attached context, e.g. after the server session was cleared.
    pub fn reset_context(&mut self) {
        self.context_attached = false;
    }
}
