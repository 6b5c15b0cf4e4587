//! Gemini generateContent adapter.
//!
//! Endpoint: POST {endpoint}/models/{model}:generateContent
//! One request per completion, no streaming, no conversation state.
//! The key travels in the `x-goog-api-key` header, never in the URL, so
//! request errors can be logged as-is.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Adapter, AdapterOutput};
use crate::config::AssistSettings;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini REST client
pub struct GeminiAdapter {
    endpoint: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

/// Response from generateContent (only the fields we read)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    total_token_count: Option<u64>,
}

impl GenerateResponse {
    /// Text of the first part of the first candidate, empty when absent
    fn first_text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .and_then(|c| c.parts.first())
            .and_then(|p| p.text.clone())
            .unwrap_or_default()
    }
}

impl GeminiAdapter {
    /// Create a new client
    pub fn new(endpoint: String, model: String, api_key: String) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model,
            api_key,
            client: reqwest::Client::new(),
        }
    }

    /// Create from assist settings, reading the key from the configured env var
    pub fn from_settings(settings: &AssistSettings) -> Result<Self> {
        let api_key = std::env::var(&settings.api_key_env).with_context(|| {
            format!("{} environment variable required", settings.api_key_env)
        })?;
        Ok(Self::new(
            settings.endpoint.clone(),
            settings.model.clone(),
            api_key,
        ))
    }

    /// Build API URL
    fn api_url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }

    fn model_url(&self) -> String {
        format!("{}/models/{}", self.endpoint, self.model)
    }
}

#[async_trait]
impl Adapter for GeminiAdapter {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(&self, prompt: &str, timeout: Duration) -> Result<AdapterOutput> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![RequestPart { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(self.api_url())
            .header(API_KEY_HEADER, &self.api_key)
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| e.without_url())
            .context("Failed to reach Gemini")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Gemini API error ({}): {}", status, text.trim());
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| e.without_url())
            .context("Failed to parse Gemini response")?;

        let mut output = AdapterOutput::new(body.first_text());
        output.tokens_used = body.usage_metadata.and_then(|u| u.total_token_count);
        Ok(output)
    }

    async fn health_check(&self) -> Result<()> {
        let response = self
            .client
            .get(self.model_url())
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| e.without_url())
            .context("Failed to reach Gemini")?;

        if !response.status().is_success() {
            anyhow::bail!("Gemini health check failed: {}", response.status());
        }

        Ok(())
    }
}
