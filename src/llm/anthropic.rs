use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::models::Source;

use super::backend::{ArtifactRef, ContentBackend};

/// Configuration for the Anthropic API client, generalized from the
/// teacher crate's single-model `AnthropicConfig` to a per-call model
/// override (this pipeline runs up to ten distinct stage/model pairs
/// against one client).
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub default_model: String,
    pub max_tokens: u32,
    pub request_timeout_s: u64,
}

impl AnthropicConfig {
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").context("ANTHROPIC_API_KEY environment variable not set")?;
        Ok(Self {
            api_key,
            default_model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 4096,
            request_timeout_s: 120,
        })
    }
}

/// Anthropic-backed implementation of `ContentBackend`. Reuses the
/// teacher crate's request/response shape (messages API, tool-use for
/// structured output) and adds the web-search tool and a minimal
/// Files-API-shaped upload/attach path for C1's large-document call.
pub struct AnthropicBackend {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicBackend {
    pub fn new(config: AnthropicConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_s))
            .build()
            .expect("failed to build reqwest client");
        Self { client, config }
    }

    async fn post_messages(&self, body: &Value) -> Result<AnthropicResponse> {
        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .context("Failed to send request to Anthropic API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Anthropic API error: {} - {}", status, body);
        }

        response.json().await.context("Failed to parse Anthropic API response")
    }
}

#[async_trait]
impl ContentBackend for AnthropicBackend {
    async fn generate_text(&self, prompt: &str, temperature: f64, max_tokens: u32) -> Result<String> {
        let body = serde_json::json!({
            "model": self.config.default_model,
            "max_tokens": max_tokens,
            "temperature": temperature,
            "messages": [{"role": "user", "content": prompt}],
        });
        let response = self.post_messages(&body).await?;
        response
            .content
            .into_iter()
            .find(|c| c.content_type == "text")
            .map(|c| c.text)
            .context("No text content in response")
    }

    async fn generate_structured(&self, prompt: &str, schema: &Value, temperature: f64) -> Result<Value> {
        let tool = serde_json::json!({
            "name": "submit_structured_output",
            "description": "Submit the structured output matching the provided schema",
            "input_schema": schema,
        });
        let body = serde_json::json!({
            "model": self.config.default_model,
            "max_tokens": self.config.max_tokens,
            "temperature": temperature,
            "messages": [{"role": "user", "content": prompt}],
            "tools": [tool],
            "tool_choice": {"type": "tool", "name": "submit_structured_output"},
        });
        let response = self.post_messages(&body).await?;
        for block in &response.content {
            if block.content_type == "tool_use" && block.name.as_deref() == Some("submit_structured_output") {
                if let Some(input) = &block.input {
                    return Ok(input.clone());
                }
            }
        }
        anyhow::bail!("No tool_use response found for structured output")
    }

    async fn generate_with_web_search(&self, prompt: &str, temperature: f64) -> Result<(String, Vec<Source>)> {
        // Hard backend constraint (spec.md §6): this call never also
        // requests structured output. Callers compose a follow-up
        // generate_structured call against the returned text.
        let body = serde_json::json!({
            "model": self.config.default_model,
            "max_tokens": self.config.max_tokens,
            "temperature": temperature,
            "messages": [{"role": "user", "content": prompt}],
            "tools": [{"type": "web_search_20250305", "name": "web_search"}],
        });
        let response = self.post_messages(&body).await?;

        let mut text = String::new();
        let mut sources = Vec::new();
        for block in &response.content {
            if block.content_type == "text" {
                text.push_str(&block.text);
            }
            for citation in &block.citations {
                sources.push(Source {
                    url: citation.url.clone(),
                    title: citation.title.clone().unwrap_or_default(),
                    snippet: citation.cited_text.clone().unwrap_or_default(),
                });
            }
        }
        if text.is_empty() {
            anyhow::bail!("No text content in web-search response");
        }
        Ok((text, sources))
    }

    async fn upload_artifact(&self, content: &str, name: &str) -> Result<ArtifactRef> {
        let form = reqwest::multipart::Form::new()
            .part("file", reqwest::multipart::Part::text(content.to_string()).file_name(name.to_string()));

        let response = self
            .client
            .post("https://api.anthropic.com/v1/files")
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("anthropic-beta", "files-api-2025-04-14")
            .multipart(form)
            .send()
            .await
            .context("Failed to upload artifact to Anthropic Files API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Anthropic Files API error: {} - {}", status, body);
        }

        let parsed: FileUploadResponse = response.json().await.context("Failed to parse file upload response")?;
        Ok(ArtifactRef(parsed.id))
    }

    async fn generate_with_artifact(
        &self,
        artifact: &ArtifactRef,
        prompt: &str,
        schema: &Value,
        temperature: f64,
    ) -> Result<Value> {
        let tool = serde_json::json!({
            "name": "submit_structured_output",
            "description": "Submit the structured output matching the provided schema",
            "input_schema": schema,
        });
        let body = serde_json::json!({
            "model": self.config.default_model,
            "max_tokens": self.config.max_tokens,
            "temperature": temperature,
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "document", "source": {"type": "file", "file_id": artifact.0}},
                    {"type": "text", "text": prompt},
                ],
            }],
            "tools": [tool],
            "tool_choice": {"type": "tool", "name": "submit_structured_output"},
            "anthropic-beta": "files-api-2025-04-14",
        });
        let response = self.post_messages(&body).await?;
        for block in &response.content {
            if block.content_type == "tool_use" && block.name.as_deref() == Some("submit_structured_output") {
                if let Some(input) = &block.input {
                    return Ok(input.clone());
                }
            }
        }
        anyhow::bail!("No tool_use response found for artifact-grounded structured output")
    }
}

#[derive(Debug, Deserialize)]
struct FileUploadResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    input: Option<Value>,
    #[serde(default)]
    citations: Vec<Citation>,
}

#[derive(Debug, Deserialize)]
struct Citation {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    cited_text: Option<String>,
}

