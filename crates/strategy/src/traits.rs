use async_trait::async_trait;

/// Chat-completion collaborator. One request per cycle: a system instruction
/// plus a user prompt, answered with free text expected to contain a single
/// JSON object.
#[async_trait]
pub trait LlmApi: Send + Sync {
    async fn chat(&self, system: &str, user: &str) -> anyhow::Result<String>;
}
