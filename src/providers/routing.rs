use crate::config::Config;
use crate::error::RouterError;
use crate::providers::anthropic::AnthropicAdapter;
use crate::providers::nova::NovaAdapter;
use crate::providers::openai::OpenAiAdapter;
use crate::providers::session::SessionCache;
use crate::providers::{build_http_client, Adapter};
use crate::types::{ChatRequest, NormalizedResponse, ProviderId};
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// 分发器：按提供商选择适配器并把适配器失败映射为网关错误
#[derive(Debug)]
pub struct Dispatcher {
    adapters: HashMap<ProviderId, Adapter>,
    sessions: Arc<SessionCache>,
}

impl Dispatcher {
    /// 根据配置构建所有适配器，共享一个 HTTP 客户端
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = build_http_client(Duration::from_secs(config.request_timeout_secs))?;
        let sessions = Arc::new(SessionCache::new());

        let adapters = config
            .provider_list
            .iter()
            .map(|provider_config| {
                let client = client.clone();
                let adapter = match provider_config.provider {
                    ProviderId::OpenAi => Adapter::OpenAi(OpenAiAdapter::new(provider_config, client)),
                    ProviderId::Anthropic => {
                        Adapter::Anthropic(AnthropicAdapter::new(provider_config, client))
                    }
                    ProviderId::Nova => Adapter::Nova(NovaAdapter::new(
                        provider_config,
                        client,
                        Arc::clone(&sessions),
                    )),
                };
                (provider_config.provider, adapter)
            })
            .collect();

        Ok(Self { adapters, sessions })
    }

    pub fn sessions(&self) -> &Arc<SessionCache> {
        &self.sessions
    }

    /// 已配置的提供商
    pub fn providers(&self) -> Vec<ProviderId> {
        ProviderId::ALL
            .into_iter()
            .filter(|id| self.adapters.contains_key(id))
            .collect()
    }

    /// 路由请求到对应适配器
    ///
    /// 未知提供商与空 prompt 在调用任何适配器之前被拒绝。
    pub async fn route(&self, req: ChatRequest) -> Result<NormalizedResponse> {
        let provider: ProviderId = req
            .provider
            .parse()
            .map_err(RouterError::UnknownProvider)?;

        req.validate().map_err(RouterError::InvalidRequest)?;

        let adapter = self
            .adapters
            .get(&provider)
            .ok_or(RouterError::ProviderNotConfigured(provider))?;

        match adapter.send(&req.prompt).await {
            Ok(response) => {
                info!(
                    %provider,
                    input_tokens = response.tokens.input,
                    output_tokens = response.tokens.output,
                    "请求完成"
                );
                Ok(response)
            }
            Err(source) => {
                warn!(%provider, kind = source.kind.as_str(), detail = %source.detail, "上游调用失败");
                Err(RouterError::Upstream { provider, source })
            }
        }
    }
}
