//! Files API: upload media and poll until the service has processed it.
//!
//! Video uploads in particular stay in `PROCESSING` for a while before they
//! can be referenced from a generate call, so callers wait with a bounded,
//! monotonic-deadline poll loop.

use crate::client::GeminiClient;
use crate::error::{GeminiError, Result, classify_api_error};
use bytes::Bytes;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::Instant;

pub const FILE_READY_TIMEOUT: Duration = Duration::from_secs(120);
pub const FILE_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileState {
    Active,
    Processing,
    Failed,
}

#[derive(Debug, Clone)]
pub struct FileHandle {
    /// Resource name, e.g. `files/abc123`.
    pub name: String,
    pub uri: String,
    pub mime_type: String,
    pub state: FileState,
}

impl GeminiClient {
    /// Upload raw bytes through the simple media upload protocol.
    #[tracing::instrument(level = "info", skip_all, fields(mime_type = %mime_type, len = bytes.len()))]
    pub async fn upload_file(&self, bytes: Bytes, mime_type: &str) -> Result<FileHandle> {
        let url = format!(
            "https://generativelanguage.googleapis.com/upload/v1beta/files?key={}",
            self.api_key()
        );
        let response = self
            .http()
            .post(&url)
            .header("X-Goog-Upload-Protocol", "raw")
            .header("Content-Type", mime_type.to_string())
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(classify_api_error(status, &text));
        }
        let parsed: FileEnvelope = serde_json::from_str(&text)?;
        Ok(parsed.file.into_handle())
    }

    pub async fn get_file(&self, name: &str) -> Result<FileHandle> {
        let url = self.api_url(&format!("/{name}"));
        let response = self
            .http()
            .get(&url)
            .query(&[("key", self.api_key())])
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(classify_api_error(status, &text));
        }
        let parsed: FileResource = serde_json::from_str(&text)?;
        Ok(parsed.into_handle())
    }

    /// Poll `get_file` until the file is `Active`, failing on `Failed` state
    /// or when the wall-clock deadline passes. Never hangs silently.
    #[tracing::instrument(level = "info", skip_all, fields(file = %handle.name))]
    pub async fn wait_for_active(
        &self,
        handle: &FileHandle,
        max_wait: Duration,
        poll_interval: Duration,
    ) -> Result<FileHandle> {
        let deadline = Instant::now() + max_wait;
        loop {
            let current = self.get_file(&handle.name).await?;
            match current.state {
                FileState::Active => return Ok(current),
                FileState::Failed => {
                    return Err(GeminiError::FileFailed(handle.name.clone()));
                }
                FileState::Processing => {}
            }
            if Instant::now() >= deadline {
                return Err(GeminiError::FileTimeout(max_wait));
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

#[derive(Debug, Deserialize)]
struct FileEnvelope {
    file: FileResource,
}

#[derive(Debug, Deserialize)]
struct FileResource {
    name: String,
    #[serde(default)]
    uri: String,
    #[serde(default, rename = "mimeType")]
    mime_type: String,
    #[serde(default)]
    state: String,
}

impl FileResource {
    fn into_handle(self) -> FileHandle {
        let state = match self.state.as_str() {
            "ACTIVE" => FileState::Active,
            "FAILED" => FileState::Failed,
            _ => FileState::Processing,
        };
        FileHandle {
            name: self.name,
            uri: self.uri,
            mime_type: self.mime_type,
            state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_file_state_maps_to_processing() {
        let resource = FileResource {
            name: "files/x".to_string(),
            uri: String::new(),
            mime_type: String::new(),
            state: "STATE_UNSPECIFIED".to_string(),
        };
        assert_eq!(resource.into_handle().state, FileState::Processing);
    }

    #[test]
    fn upload_envelope_parses() {
        let raw = r#"{
            "file": { "name": "files/abc", "uri": "https://e/files/abc", "mimeType": "video/mp4", "state": "PROCESSING" }
        }"#;
        let parsed: FileEnvelope = serde_json::from_str(raw).expect("parse envelope");
        let handle = parsed.file.into_handle();
        assert_eq!(handle.name, "files/abc");
        assert_eq!(handle.state, FileState::Processing);
    }
}
