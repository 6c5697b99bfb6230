use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 支持的上游提供商（封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Nova,
}

impl ProviderId {
    pub const ALL: [ProviderId; 3] = [ProviderId::OpenAi, ProviderId::Anthropic, ProviderId::Nova];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenAi => "openai",
            ProviderId::Anthropic => "anthropic",
            ProviderId::Nova => "nova",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// 调用方提交的与提供商无关的聊天请求
///
/// `provider` 以原始字符串接收，未知取值由分发器拒绝（400），
/// 而不是在反序列化阶段失败。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub provider: String,
    pub prompt: String,
}

impl ChatRequest {
    pub fn new(provider: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            prompt: prompt.into(),
        }
    }

    /// 验证请求参数
    pub fn validate(&self) -> Result<(), String> {
        if self.prompt.trim().is_empty() {
            return Err("prompt 不能为空".to_string());
        }
        Ok(())
    }
}

/// Token 使用统计，上游缺失时两项都为 0
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
}

/// 统一响应格式，对所有提供商结构相同
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedResponse {
    pub provider: ProviderId,
    pub content: String,
    pub tokens: TokenUsage,
}

impl NormalizedResponse {
    pub fn new(provider: ProviderId, content: impl Into<String>, tokens: TokenUsage) -> Self {
        Self {
            provider,
            content: content.into(),
            tokens,
        }
    }
}
