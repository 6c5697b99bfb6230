use crate::config::ProviderConfig;
use crate::providers::{classify_failure, AdapterResult, ProviderAdapter};
use crate::types::{NormalizedResponse, ProviderId, TokenUsage};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API 请求格式
#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Anthropic Messages API 响应格式
///
/// `content` 必须存在（缺失视为响应格式错误），`usage` 可缺省或为 null。
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: Option<u64>,
    #[serde(default)]
    output_tokens: Option<u64>,
}

/// x-api-key 认证的 Anthropic 风格适配器
#[derive(Debug, Clone)]
pub struct AnthropicAdapter {
    client: Client,
    api_key: String,
    url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicAdapter {
    pub fn new(config: &ProviderConfig, client: Client) -> Self {
        Self {
            client,
            api_key: config.api_key.clone(),
            url: format!("{}/v1/messages", config.base_url()),
            model: config.model_name().to_string(),
            max_tokens: config.max_tokens,
        }
    }
}

impl ProviderAdapter for AnthropicAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Anthropic
    }

    async fn send(&self, prompt: &str) -> AdapterResult<NormalizedResponse> {
        let body = AnthropicRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(classify_failure(self.id(), response).await);
        }

        let parsed: AnthropicResponse = response.json().await?;
        debug!(blocks = parsed.content.len(), "Anthropic 响应已解析");
        Ok(normalize(parsed))
    }
}

/// 拼接所有 text 块，忽略其他类型的块
fn normalize(resp: AnthropicResponse) -> NormalizedResponse {
    let content = resp
        .content
        .into_iter()
        .filter(|block| block.block_type == "text")
        .map(|block| block.text)
        .collect::<Vec<_>>()
        .join("");

    let usage = resp.usage.unwrap_or_default();
    NormalizedResponse::new(
        ProviderId::Anthropic,
        content,
        TokenUsage {
            input: usage.input_tokens.unwrap_or(0),
            output: usage.output_tokens.unwrap_or(0),
        },
    )
}
