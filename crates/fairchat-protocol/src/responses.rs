//! Response bodies returned by the assistant endpoints.

use serde::{Deserialize, Serialize};

/// Full reply from a single-shot chat or analysis call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    #[serde(default)]
    pub github_code_analyzed: bool,
    #[serde(default)]
    pub files_fetched: Vec<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Model metadata the server attaches to a session after analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub model_type: Option<String>,
    pub description: Option<String>,
}

/// Server-side view of a chat session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    /// Whether repository code is attached to the session.
    #[serde(default)]
    pub has_github_code: bool,
    #[serde(default)]
    pub files_fetched: Vec<String>,
    #[serde(default)]
    pub model_info: Option<ModelInfo>,
    #[serde(default)]
    pub conversation_length: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearSessionResponse {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GithubUrl {
    pub github_url: Option<String>,
}

/// Error envelope used by the backend for non-success responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<String>,
}

impl ErrorBody {
    /// Extract the `detail` string from a raw error body, if there is one.
    pub fn detail_from(body: &str) -> Option<String> {
        serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.detail)
            .filter(|d| !d.trim().is_empty())
    }
}
