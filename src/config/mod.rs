use crate::error::RouterError;
use crate::types::ProviderId;
use crate::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// 本地 mock 提供商服务的默认地址
pub const DEFAULT_PROVIDER_BASE: &str = "http://127.0.0.1:9876";

/// 主配置结构
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    pub provider_list: Vec<ProviderConfig>,
}

/// 单个提供商配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    pub provider: ProviderId,
    pub api_key: String,
    #[serde(default)]
    pub api_base: String,
    /// 为空时使用提供商默认模型
    #[serde(default)]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_max_tokens() -> u32 {
    1024
}

impl ProviderConfig {
    pub fn new(provider: ProviderId, api_key: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            provider,
            api_key: api_key.into(),
            api_base: api_base.into(),
            model: String::new(),
            max_tokens: default_max_tokens(),
        }
    }

    /// 实际使用的 API 地址（去除末尾斜杠）
    pub fn base_url(&self) -> &str {
        let base = if self.api_base.is_empty() {
            default_api_base(self.provider).unwrap_or_default()
        } else {
            self.api_base.as_str()
        };
        base.trim_end_matches('/')
    }

    /// 实际使用的模型名；Nova 请求不携带模型
    pub fn model_name(&self) -> &str {
        if !self.model.is_empty() {
            return &self.model;
        }
        default_model(self.provider).unwrap_or_default()
    }
}

/// 公开的官方地址；Nova 没有公共地址，必须显式配置
fn default_api_base(provider: ProviderId) -> Option<&'static str> {
    match provider {
        ProviderId::OpenAi => Some("https://api.openai.com/v1"),
        ProviderId::Anthropic => Some("https://api.anthropic.com"),
        ProviderId::Nova => None,
    }
}

fn default_model(provider: ProviderId) -> Option<&'static str> {
    match provider {
        ProviderId::OpenAi => Some("gpt-4o-mini"),
        ProviderId::Anthropic => Some("claude-3-5-sonnet-20241022"),
        ProviderId::Nova => None,
    }
}

impl Config {
    /// 从 YAML 文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// 从 YAML 字符串加载配置
    pub fn from_yaml(content: &str) -> Result<Self> {
        let content = Self::replace_env_vars(content)?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// 开发环境配置：三个提供商共用一个 mock 服务地址
    pub fn local(provider_base: &str) -> Self {
        let base = provider_base.trim_end_matches('/');
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            provider_list: vec![
                ProviderConfig::new(
                    ProviderId::OpenAi,
                    "sk-test-openai-key-123",
                    format!("{}/openai/v1", base),
                ),
                ProviderConfig::new(
                    ProviderId::Anthropic,
                    "ant-test-anthropic-key-456",
                    format!("{}/anthropic", base),
                ),
                ProviderConfig::new(
                    ProviderId::Nova,
                    "nova-test-key-789",
                    format!("{}/nova/v1", base),
                ),
            ],
        }
    }

    /// 替换配置中的环境变量 ${VAR}
    fn replace_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
            .map_err(|e| RouterError::internal(e.to_string()))?;
        let mut result = content.to_string();

        for cap in re.captures_iter(content) {
            let var_name = &cap[1];
            let var_value = std::env::var(var_name).map_err(|_| {
                RouterError::config(format!("环境变量未找到: {}", var_name))
            })?;
            result = result.replace(&cap[0], &var_value);
        }

        Ok(result)
    }

    /// 验证配置
    fn validate(&self) -> Result<()> {
        if self.provider_list.is_empty() {
            return Err(RouterError::config("provider_list 不能为空"));
        }
        if self.request_timeout_secs == 0 {
            return Err(RouterError::config("request_timeout_secs 必须大于 0"));
        }

        let mut seen = HashSet::new();
        for provider in &self.provider_list {
            if provider.api_key.is_empty() {
                return Err(RouterError::config(format!(
                    "{} 的 api_key 不能为空",
                    provider.provider
                )));
            }
            if provider.api_base.is_empty() && default_api_base(provider.provider).is_none() {
                return Err(RouterError::config(format!(
                    "{} 必须配置 api_base",
                    provider.provider
                )));
            }
            if !seen.insert(provider.provider) {
                return Err(RouterError::config(format!(
                    "提供商重复配置: {}",
                    provider.provider
                )));
            }
        }

        Ok(())
    }

    /// 根据提供商查找配置
    pub fn find_provider(&self, provider: ProviderId) -> Option<&ProviderConfig> {
        self.provider_list.iter().find(|p| p.provider == provider)
    }
}
