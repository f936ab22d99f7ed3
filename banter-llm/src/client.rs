use crate::error::{GeminiError, Result, classify_api_error};
use crate::types::{Content, ImageOutput, SamplingConfig};
use base64::Engine as _;
use serde::Deserialize;
use serde_json::json;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// BYO-key Gemini HTTP client. One instance per (key, model) pair;
/// constructing another via [`GeminiClient::with_http`] on a shared
/// `reqwest::Client` is cheap and reuses the connection pool, which is how
/// the rotation path swaps credentials.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: &str, model: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(%e, "reqwest client build failed; falling back to default client");
                reqwest::Client::new()
            });
        Self::with_http(http, api_key, model)
    }

    pub fn with_http(http: reqwest::Client, api_key: &str, model: &str) -> Self {
        Self {
            http,
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn api_key(&self) -> &str {
        &self.api_key
    }

    pub(crate) fn api_url(&self, path: &str) -> String {
        format!("{GEMINI_API_BASE}{path}")
    }

    /// Single text generation call. Returns the concatenated text parts of
    /// the first candidate; an empty candidate is an [`GeminiError::EmptyResponse`].
    #[tracing::instrument(level = "info", skip_all, fields(model = %self.model))]
    pub async fn generate(
        &self,
        contents: &[Content],
        system_instruction: &str,
        sampling: &SamplingConfig,
    ) -> Result<String> {
        if contents.is_empty() {
            return Err(GeminiError::InvalidInput("contents is empty".to_string()));
        }

        let body = json!({
            "contents": contents,
            "systemInstruction": { "parts": [{ "text": system_instruction }] },
            "generationConfig": {
                "temperature": sampling.temperature,
                "topP": sampling.top_p,
                "maxOutputTokens": sampling.max_output_tokens,
                "thinkingConfig": { "thinkingLevel": sampling.thinking.as_str() },
            },
        });

        let model = self.model.clone();
        let response: GenerateContentResponse = self.post_generate(&model, body).await?;
        let text = response.first_text();
        if text.is_empty() {
            return Err(GeminiError::EmptyResponse);
        }
        Ok(text)
    }

    /// Image generation/edit call against a dedicated image model.
    ///
    /// `input_images` are (bytes, mime_type) pairs for edits. On a free-tier
    /// key the API rejects this with the billing 429, which classifies as
    /// [`GeminiError::PaidTierRequired`].
    #[tracing::instrument(level = "info", skip_all, fields(image_model = %image_model))]
    pub async fn generate_image(
        &self,
        image_model: &str,
        prompt: &str,
        input_images: &[(Vec<u8>, String)],
        aspect_ratio: Option<&str>,
    ) -> Result<ImageOutput> {
        let mut parts = Vec::with_capacity(input_images.len() + 1);
        for (bytes, mime_type) in input_images {
            parts.push(json!({
                "inlineData": {
                    "data": base64::engine::general_purpose::STANDARD.encode(bytes),
                    "mimeType": mime_type,
                }
            }));
        }
        parts.push(json!({ "text": prompt }));

        let mut generation_config = json!({ "responseModalities": ["TEXT", "IMAGE"] });
        if let Some(ratio) = aspect_ratio {
            generation_config["imageConfig"] = json!({ "aspectRatio": ratio });
        }

        let body = json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": generation_config,
        });

        let response: GenerateContentResponse = self.post_generate(image_model, body).await?;

        let mut text = None;
        let mut image = None;
        for part in response.parts() {
            if let Some(t) = part.text.as_ref() {
                text = Some(t.clone());
            }
            if let Some(inline) = part.inline_data.as_ref() {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(&inline.data)
                    .map_err(|e| GeminiError::ResponseFormat(format!("inline data: {e}")))?;
                image = Some((bytes, inline.mime_type.clone()));
            }
        }
        if text.is_none() && image.is_none() {
            return Err(GeminiError::EmptyResponse);
        }
        Ok(ImageOutput { text, image })
    }

    async fn post_generate(
        &self,
        model: &str,
        body: serde_json::Value,
    ) -> Result<GenerateContentResponse> {
        let url = self.api_url(&format!("/models/{model}:generateContent"));
        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(classify_api_error(status, &text));
        }
        let parsed: GenerateContentResponse = serde_json::from_str(&text)?;
        Ok(parsed)
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateContentResponse {
    fn parts(&self) -> impl Iterator<Item = &ResponsePart> {
        self.candidates
            .first()
            .into_iter()
            .flat_map(|c| c.content.parts.iter())
    }

    fn first_text(&self) -> String {
        self.parts()
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: CandidateContent,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default, rename = "inlineData")]
    inline_data: Option<ResponseInlineData>,
}

#[derive(Debug, Deserialize)]
struct ResponseInlineData {
    data: String,
    #[serde(rename = "mimeType")]
    mime_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_text_concatenates_candidate_parts() {
        let raw = r#"{
            "candidates": [{
                "content": { "parts": [{ "text": "Hello, " }, { "text": "world." }] }
            }]
        }"#;
        let parsed: GenerateContentResponse = serde_json::from_str(raw).expect("parse response");
        assert_eq!(parsed.first_text(), "Hello, world.");
    }

    #[test]
    fn empty_candidates_yield_empty_text() {
        let parsed: GenerateContentResponse =
            serde_json::from_str(r#"{"candidates": []}"#).expect("parse response");
        assert_eq!(parsed.first_text(), "");
    }
}
