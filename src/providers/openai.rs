use crate::config::ProviderConfig;
use crate::error::AdapterError;
use crate::providers::{classify_failure, AdapterResult, ProviderAdapter};
use crate::types::{NormalizedResponse, ProviderId, TokenUsage};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// OpenAI chat completion 请求格式
#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// OpenAI chat completion 响应格式（只保留需要的字段）
#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: Option<u64>,
    #[serde(default)]
    completion_tokens: Option<u64>,
}

/// 静态 Bearer 密钥的 OpenAI 风格适配器
#[derive(Debug, Clone)]
pub struct OpenAiAdapter {
    client: Client,
    api_key: String,
    url: String,
    model: String,
}

impl OpenAiAdapter {
    pub fn new(config: &ProviderConfig, client: Client) -> Self {
        Self {
            client,
            api_key: config.api_key.clone(),
            url: format!("{}/chat/completions", config.base_url()),
            model: config.model_name().to_string(),
        }
    }
}

impl ProviderAdapter for OpenAiAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::OpenAi
    }

    async fn send(&self, prompt: &str) -> AdapterResult<NormalizedResponse> {
        let body = OpenAiRequest {
            model: &self.model,
            messages: vec![OpenAiMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(classify_failure(self.id(), response).await);
        }

        let parsed: OpenAiResponse = response.json().await?;
        debug!(choices = parsed.choices.len(), "OpenAI 响应已解析");
        normalize(parsed)
    }
}

fn normalize(resp: OpenAiResponse) -> AdapterResult<NormalizedResponse> {
    let content = resp
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| AdapterError::malformed("OpenAI 响应缺少 choices[0].message.content"))?;

    let usage = resp.usage.unwrap_or_default();
    Ok(NormalizedResponse::new(
        ProviderId::OpenAi,
        content,
        TokenUsage {
            input: usage.prompt_tokens.unwrap_or(0),
            output: usage.completion_tokens.unwrap_or(0),
        },
    ))
}
