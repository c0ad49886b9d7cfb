use async_trait::async_trait;
use serde_json::Value;

use crate::models::Source;

/// Opaque handle to a large document uploaded to the backend, used by
/// C1 so the full transcript is attached rather than inlined (spec.md
/// §4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef(pub String);

/// The four-method LLM backend contract from spec.md §6.
///
/// Hard constraint: `generate_with_web_search` and `generate_structured`
/// are never combined in a single call. C3 and C9 compose them in
/// sequence — a grounded freeform call, then a structured call that
/// parses the first call's text.
#[async_trait]
pub trait ContentBackend: Send + Sync {
    async fn generate_text(&self, prompt: &str, temperature: f64, max_tokens: u32) -> anyhow::Result<String>;

    async fn generate_structured(&self, prompt: &str, schema: &Value, temperature: f64) -> anyhow::Result<Value>;

    async fn generate_with_web_search(&self, prompt: &str, temperature: f64) -> anyhow::Result<(String, Vec<Source>)>;

    async fn upload_artifact(&self, content: &str, name: &str) -> anyhow::Result<ArtifactRef>;

    async fn generate_with_artifact(
        &self,
        artifact: &ArtifactRef,
        prompt: &str,
        schema: &Value,
        temperature: f64,
    ) -> anyhow::Result<Value>;
}
