pub mod routing;
pub mod session;
pub mod openai;
pub mod anthropic;
pub mod nova;

use crate::error::{AdapterError, RouterError};
use crate::types::{NormalizedResponse, ProviderId};
use reqwest::{Client, Response};
use std::time::Duration;

pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

/// Provider trait - 所有适配器实现同一个 send 契约
#[allow(async_fn_in_trait)]
pub trait ProviderAdapter {
    fn id(&self) -> ProviderId;

    async fn send(&self, prompt: &str) -> AdapterResult<NormalizedResponse>;
}

/// 封闭的适配器集合，每个提供商一个变体
#[derive(Debug, Clone)]
pub enum Adapter {
    OpenAi(openai::OpenAiAdapter),
    Anthropic(anthropic::AnthropicAdapter),
    Nova(nova::NovaAdapter),
}

impl Adapter {
    pub fn id(&self) -> ProviderId {
        match self {
            Adapter::OpenAi(a) => a.id(),
            Adapter::Anthropic(a) => a.id(),
            Adapter::Nova(a) => a.id(),
        }
    }

    pub async fn send(&self, prompt: &str) -> AdapterResult<NormalizedResponse> {
        match self {
            Adapter::OpenAi(a) => a.send(prompt).await,
            Adapter::Anthropic(a) => a.send(prompt).await,
            Adapter::Nova(a) => a.send(prompt).await,
        }
    }
}

/// 构建共享 HTTP 客户端（连接池复用）
pub fn build_http_client(timeout: Duration) -> Result<Client, RouterError> {
    Client::builder()
        .timeout(timeout)
        .pool_max_idle_per_host(10)
        .build()
        .map_err(|e| RouterError::internal(format!("HTTP 客户端创建失败: {}", e)))
}

/// 读取错误响应体，限制大小防止日志与响应膨胀
pub(crate) async fn read_error_body(response: Response) -> String {
    response
        .text()
        .await
        .unwrap_or_default()
        .chars()
        .take(4096)
        .collect()
}

/// 401/403 归类为认证失败，其余非 2xx 为上游拒绝
pub(crate) async fn classify_failure(provider: ProviderId, response: Response) -> AdapterError {
    let status = response.status();
    let body = read_error_body(response).await;
    if matches!(status.as_u16(), 401 | 403) {
        AdapterError::auth(format!("{} 拒绝了凭证 (HTTP {}): {}", provider, status.as_u16(), body))
    } else {
        AdapterError::rejected(status.as_u16(), &body)
    }
}
