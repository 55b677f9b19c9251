use super::{ExplainError, Explainer, prompt};
use crate::config::ExplainerConfig;
use crate::tour::models::StepTarget;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Explainer backed by an OpenAI-compatible chat-completions endpoint.
pub struct HttpExplainer {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    api_key: String,
    max_tokens: u32,
}

impl HttpExplainer {
    /// Reads the API key from the environment variable named in `config`.
    pub fn from_config(config: &ExplainerConfig) -> Result<Self, ExplainError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ExplainError::MissingApiKey(config.api_key_env.clone()))?;

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("difftour/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ExplainError::RequestFailed(format!("HTTP client build failed: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
            max_tokens: config.max_tokens,
        })
    }
}

impl Explainer for HttpExplainer {
    fn explain(&self, target: &StepTarget, intent: Option<&str>) -> Result<String, ExplainError> {
        let user = prompt::build(target, intent);
        let request = ChatRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: prompt::SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &user,
                },
            ],
        };

        debug!("requesting explanation for {}:{}", target.file_path(), target.range());
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .map_err(|e| ExplainError::RequestFailed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ExplainError::RequestFailed(format!(
                "endpoint returned status {}",
                resp.status()
            )));
        }

        let body: ChatResponse = resp
            .json()
            .map_err(|e| ExplainError::BadResponse(e.to_string()))?;
        parse_content(body)
    }
}

fn parse_content(body: ChatResponse) -> Result<String, ExplainError> {
    body.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ExplainError::BadResponse("no message content".to_string()))
}
