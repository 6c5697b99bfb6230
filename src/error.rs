use crate::types::ProviderId;
use thiserror::Error;

/// 上游错误详情的最大保留长度（字符数）
const MAX_DETAIL_CHARS: usize = 256;

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("YAML 解析错误: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("JSON 解析错误: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("无效的请求: {0}")]
    InvalidRequest(String),

    #[error("请求体超过 {0} 字节上限")]
    PayloadTooLarge(usize),

    #[error("未知的提供商: {0}")]
    UnknownProvider(String),

    #[error("提供商未配置: {0}")]
    ProviderNotConfigured(ProviderId),

    #[error("{provider} 调用失败: {source}")]
    Upstream {
        provider: ProviderId,
        #[source]
        source: AdapterError,
    },

    #[error("内部错误: {0}")]
    InternalError(String),
}

impl RouterError {
    pub fn config(msg: impl Into<String>) -> Self {
        RouterError::ConfigError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        RouterError::InternalError(msg.into())
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        RouterError::InvalidRequest(msg.into())
    }

    /// 是否为调用方的错误（映射为 4xx）
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            RouterError::InvalidRequest(_)
                | RouterError::PayloadTooLarge(_)
                | RouterError::UnknownProvider(_)
                | RouterError::JsonError(_)
        )
    }
}

/// 适配器失败分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterErrorKind {
    /// 凭证被拒绝
    AuthFailure,
    /// 上游返回与认证无关的非成功状态
    UpstreamRejection,
    /// 上游返回成功但响应体无法规范化
    MalformedResponse,
    /// 网络层失败（连接拒绝、超时等）
    TransportFailure,
}

impl AdapterErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterErrorKind::AuthFailure => "authentication_error",
            AdapterErrorKind::UpstreamRejection => "upstream_error",
            AdapterErrorKind::MalformedResponse => "malformed_response",
            AdapterErrorKind::TransportFailure => "transport_error",
        }
    }
}

/// 由适配器产生、由分发器消费的类型化失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}: {detail}", .kind.as_str())]
pub struct AdapterError {
    pub kind: AdapterErrorKind,
    pub detail: String,
}

impl AdapterError {
    pub fn new(kind: AdapterErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: truncate_detail(&detail.into()),
        }
    }

    pub fn auth(detail: impl Into<String>) -> Self {
        Self::new(AdapterErrorKind::AuthFailure, detail)
    }

    pub fn rejected(status: u16, body: &str) -> Self {
        Self::new(
            AdapterErrorKind::UpstreamRejection,
            format!("HTTP {}: {}", status, body),
        )
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::new(AdapterErrorKind::MalformedResponse, detail)
    }

    pub fn transport(detail: impl Into<String>) -> Self {
        Self::new(AdapterErrorKind::TransportFailure, detail)
    }
}

/// 去掉上游 URL，并保留完整的错误链（解码失败的具体原因在 source 中）
impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        let err = err.without_url();
        if err.is_decode() {
            AdapterError::malformed(error_chain(&err))
        } else {
            AdapterError::transport(error_chain(&err))
        }
    }
}

impl From<serde_json::Error> for AdapterError {
    fn from(err: serde_json::Error) -> Self {
        AdapterError::malformed(err.to_string())
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn truncate_detail(detail: &str) -> String {
    let trimmed = detail.trim();
    if trimmed.chars().count() <= MAX_DETAIL_CHARS {
        return trimmed.to_string();
    }
    let mut short: String = trimmed.chars().take(MAX_DETAIL_CHARS).collect();
    short.push('…');
    short
}
