//! Per-message routing between the assistant capabilities.

use std::fmt;

use serde::Serialize;

use crate::config::EndpointsConfig;

/// Lower-case terms that mark a request to connect to, fetch from, or
/// analyze a code repository.
pub const CODE_ANALYSIS_KEYWORDS: &[&str] = &[
    "github",
    "gitlab",
    "repository",
    "repositories",
    "codebase",
    "source code",
    "analyze code",
    "analyze the code",
    "fetch code",
    "git repo",
];

/// Which backend capability answers a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    CodeAnalysis,
    GeneralChat,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CodeAnalysis => write!(f, "code_analysis"),
            Self::GeneralChat => write!(f, "general_chat"),
        }
    }
}

/// How the reply is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    Streaming,
    SingleShot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Route {
    pub intent: Intent,
    pub mode: TransportMode,
}

impl Route {
    /// Path of the endpoint serving this route.
    pub fn endpoint<'a>(&self, endpoints: &'a EndpointsConfig) -> &'a str {
        match (self.intent, self.mode) {
            (Intent::CodeAnalysis, TransportMode::Streaming) => &endpoints.analyze_model_stream,
            (Intent::CodeAnalysis, TransportMode::SingleShot) => &endpoints.analyze_model,
            (Intent::GeneralChat, TransportMode::Streaming) => &endpoints.chat_stream,
            (Intent::GeneralChat, TransportMode::SingleShot) => &endpoints.chat,
        }
    }
}

/// Classify a user message. Anything without a keyword is general chat.
pub fn classify(text: &str) -> Intent {
    let lower = text.to_lowercase();
    if CODE_ANALYSIS_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        Intent::CodeAnalysis
    } else {
        Intent::GeneralChat
    }
}

/// Pick capability and delivery mode for a message.
pub fn route(text: &str, streaming_supported: bool) -> Route {
    Route {
        intent: classify(text),
        mode: if streaming_supported {
            TransportMode::Streaming
        } else {
            TransportMode::SingleShot
        },
    }
}
