//! BYO-key Gemini client for Banter.
//!
//! Pure HTTP client: text generation, image generation, and the Files API.
//! Non-2xx responses are mapped to the [`GeminiError`] classes the retry
//! coordinator dispatches on.

mod client;
mod error;
mod files;
mod types;

pub use client::GeminiClient;
pub use error::{GeminiError, Result};
pub use files::{FILE_POLL_INTERVAL, FILE_READY_TIMEOUT, FileHandle, FileState};
pub use types::{
    Content, ContentPart, FileData, ImageOutput, InlineData, Role, SamplingConfig, ThinkingLevel,
};
