//! Wire types for the fairchat assistant endpoints.
//!
//! The assistant backend exposes two capabilities, each in a single-shot and
//! a streaming flavour:
//!
//! ```text
//! general chat   POST /chat/send            -> ChatResponse
//!                POST /chat/send/stream     -> text/event-stream
//! code analysis  POST /chat/analyze-model   -> ChatResponse
//!                POST /chat/analyze-model/stream -> text/event-stream
//! ```
//!
//! Streaming bodies are line oriented. Every line that carries content starts
//! with [`STREAM_DATA_PREFIX`] and holds either a [`StreamPayload`] JSON object
//! or the literal [`STREAM_DONE`] sentinel.

pub mod requests;
pub mod responses;
pub mod stream;

pub use requests::{AnalyzeModelRequest, ChatRequest};
pub use responses::{
    ChatResponse, ClearSessionResponse, ErrorBody, GithubUrl, ModelInfo, SessionContext,
};
pub use stream::{STREAM_DATA_PREFIX, STREAM_DONE, StreamPayload};
