use crate::config::ProviderConfig;
use crate::error::{AdapterError, AdapterErrorKind};
use crate::metrics;
use crate::providers::session::SessionCache;
use crate::providers::{classify_failure, AdapterResult, ProviderAdapter};
use crate::types::{NormalizedResponse, ProviderId, TokenUsage};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 聊天调用携带会话令牌的请求头
pub const SESSION_HEADER: &str = "X-Nova-Session";

/// 回复文本可能出现的位置，按优先级排列
const CONTENT_PATHS: &[&str] = &[
    "/reply",
    "/content",
    "/text",
    "/output",
    "/response",
    "/message/content",
    "/response/text",
    "/response/content",
    "/data/reply",
    "/data/content",
    "/data/text",
    "/result/text",
    "/result/content",
];

const INPUT_TOKEN_PATHS: &[&str] = &[
    "/usage/input_tokens",
    "/usage/prompt_tokens",
    "/usage/input",
    "/tokens/input",
    "/data/usage/input_tokens",
];

const OUTPUT_TOKEN_PATHS: &[&str] = &[
    "/usage/output_tokens",
    "/usage/completion_tokens",
    "/usage/output",
    "/tokens/output",
    "/data/usage/output_tokens",
];

#[derive(Debug, Serialize)]
struct NovaAuthRequest<'a> {
    api_key: &'a str,
}

#[derive(Debug, Deserialize)]
struct NovaAuthResponse {
    #[serde(default, alias = "token", alias = "session", alias = "session_id")]
    session_token: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

#[derive(Debug, Serialize)]
struct NovaChatRequest<'a> {
    messages: Vec<NovaMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct NovaMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// 单次聊天调用的结果
#[derive(Debug)]
enum ChatOutcome {
    Done(NormalizedResponse),
    /// 上游表示会话令牌缺失或失效
    StaleSession(String),
}

/// 基于会话令牌的 Nova 风格适配器
///
/// 聊天接口不接受静态密钥：先用静态密钥换取会话令牌并缓存，
/// 聊天时通过 `X-Nova-Session` 头携带。收到会话失效信号时
/// 丢弃令牌、重新认证一次并重试一次。
#[derive(Debug, Clone)]
pub struct NovaAdapter {
    client: Client,
    api_key: String,
    auth_url: String,
    chat_url: String,
    sessions: Arc<SessionCache>,
}

impl NovaAdapter {
    pub fn new(config: &ProviderConfig, client: Client, sessions: Arc<SessionCache>) -> Self {
        let base = config.base_url();
        Self {
            client,
            api_key: config.api_key.clone(),
            auth_url: format!("{}/auth", base),
            chat_url: format!("{}/chat", base),
            sessions,
        }
    }

    /// 优先使用缓存的令牌，缺失时认证
    async fn session_token(&self) -> AdapterResult<String> {
        match self.sessions.get(self.id()).await {
            Some(token) => Ok(token),
            None => self.authenticate().await,
        }
    }

    /// 用静态密钥换取会话令牌并写入缓存
    async fn authenticate(&self) -> AdapterResult<String> {
        let response = self
            .client
            .post(&self.auth_url)
            .bearer_auth(&self.api_key)
            .json(&NovaAuthRequest {
                api_key: &self.api_key,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(classify_failure(self.id(), response).await);
        }

        let auth: NovaAuthResponse = response.json().await?;
        let token = auth
            .session_token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                AdapterError::auth(format!(
                    "Nova 认证未返回会话令牌: {}",
                    auth.detail.unwrap_or_default()
                ))
            })?;

        self.sessions.put(self.id(), token.clone()).await;
        info!(provider = %self.id(), "已获取新的会话令牌");
        Ok(token)
    }

    async fn chat(&self, token: &str, prompt: &str) -> AdapterResult<ChatOutcome> {
        let body = NovaChatRequest {
            messages: vec![NovaMessage {
                role: "human",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.chat_url)
            .header(SESSION_HEADER, token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        let parsed: Option<Value> = serde_json::from_str(&text).ok();

        // 会话失效以结构化响应体为准，不依赖特定 HTTP 状态码
        if let Some(detail) = parsed.as_ref().and_then(stale_session_detail) {
            return Ok(ChatOutcome::StaleSession(detail));
        }

        if !status.is_success() {
            let body: String = text.chars().take(4096).collect();
            if matches!(status.as_u16(), 401 | 403) {
                return Err(AdapterError::auth(format!("nova 拒绝了请求: {}", body)));
            }
            return Err(AdapterError::rejected(status.as_u16(), &body));
        }

        let value = parsed.ok_or_else(|| AdapterError::malformed("Nova 响应不是合法 JSON"))?;
        if is_error_status(&value) {
            return Err(AdapterError::rejected(status.as_u16(), &error_detail(&value)));
        }

        normalize(&value).map(ChatOutcome::Done)
    }
}

impl ProviderAdapter for NovaAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Nova
    }

    async fn send(&self, prompt: &str) -> AdapterResult<NormalizedResponse> {
        let token = self.session_token().await?;
        let detail = match self.chat(&token, prompt).await? {
            ChatOutcome::Done(response) => return Ok(response),
            ChatOutcome::StaleSession(detail) => detail,
        };

        warn!(provider = %self.id(), %detail, "会话令牌失效，重新认证");
        self.sessions.invalidate(self.id()).await;
        metrics::global_metrics().record_session_refresh();

        // 刷新后的重试无论以何种方式失败，都按认证失败返回
        let retried = async {
            let token = self.authenticate().await?;
            self.chat(&token, prompt).await
        }
        .await;

        match retried {
            Ok(ChatOutcome::Done(response)) => Ok(response),
            Ok(ChatOutcome::StaleSession(detail)) => {
                self.sessions.invalidate(self.id()).await;
                Err(AdapterError::auth(format!(
                    "重新认证后会话仍被拒绝: {}",
                    detail
                )))
            }
            Err(e) if e.kind == AdapterErrorKind::AuthFailure => Err(e),
            Err(e) => Err(AdapterError::auth(format!("会话刷新后重试失败: {}", e))),
        }
    }
}

fn is_error_status(value: &Value) -> bool {
    value.get("status").and_then(Value::as_str) == Some("error")
}

fn error_detail(value: &Value) -> String {
    value
        .get("detail")
        .map(|d| match d {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_default()
}

/// `{"status": "error", "detail": "...session..."}` 视为会话失效信号
fn stale_session_detail(value: &Value) -> Option<String> {
    if !is_error_status(value) {
        return None;
    }
    let detail = error_detail(value);
    detail
        .to_ascii_lowercase()
        .contains("session")
        .then_some(detail)
}

fn first_str<'a>(value: &'a Value, paths: &[&str]) -> Option<&'a str> {
    paths
        .iter()
        .find_map(|path| value.pointer(path).and_then(Value::as_str))
}

fn first_u64(value: &Value, paths: &[&str]) -> u64 {
    paths
        .iter()
        .find_map(|path| value.pointer(path).and_then(Value::as_u64))
        .unwrap_or(0)
}

fn normalize(value: &Value) -> AdapterResult<NormalizedResponse> {
    let content = first_str(value, CONTENT_PATHS)
        .ok_or_else(|| AdapterError::malformed("Nova 响应缺少回复文本"))?;
    debug!(bytes = content.len(), "Nova 响应已解析");

    Ok(NormalizedResponse::new(
        ProviderId::Nova,
        content,
        TokenUsage {
            input: first_u64(value, INPUT_TOKEN_PATHS),
            output: first_u64(value, OUTPUT_TOKEN_PATHS),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AdapterErrorKind;
    use mockito::{Matcher, Server, ServerGuard};
    use serde_json::json;

    const STALE_BODY: &str =
        r#"{"status": "error", "detail": "Missing or invalid X-Nova-Session header"}"#;

    async fn setup_mock_server() -> ServerGuard {
        Server::new_async().await
    }

    fn create_adapter(api_base: &str) -> (NovaAdapter, Arc<SessionCache>) {
        let config = ProviderConfig::new(ProviderId::Nova, "nova-test-key", api_base);
        let sessions = Arc::new(SessionCache::new());
        let adapter = NovaAdapter::new(&config, Client::new(), Arc::clone(&sessions));
        (adapter, sessions)
    }

    fn success_body(text: &str) -> String {
        json!({
            "status": "success",
            "reply": text,
            "usage": {"input_tokens": 7, "output_tokens": 11}
        })
        .to_string()
    }

    #[test]
    fn test_stale_session_detection() {
        let stale: Value = serde_json::from_str(STALE_BODY).unwrap();
        assert!(stale_session_detail(&stale).is_some());

        let other_error = json!({"status": "error", "detail": "model overloaded"});
        assert!(stale_session_detail(&other_error).is_none());

        let ok = json!({"status": "success", "reply": "session notes"});
        assert!(stale_session_detail(&ok).is_none());
    }

    #[test]
    fn test_normalize_content_locations() {
        let nested = json!({"message": {"content": "[NovaAI] nested"}});
        assert_eq!(normalize(&nested).unwrap().content, "[NovaAI] nested");

        let flat = json!({"text": "[NovaAI] flat", "tokens": {"input": 3, "output": 4}});
        let normalized = normalize(&flat).unwrap();
        assert_eq!(normalized.content, "[NovaAI] flat");
        assert_eq!(normalized.tokens, TokenUsage { input: 3, output: 4 });

        let missing = json!({"status": "success"});
        assert_eq!(
            normalize(&missing).unwrap_err().kind,
            AdapterErrorKind::MalformedResponse
        );
    }

    #[tokio::test]
    async fn test_send_authenticates_on_first_use() {
        let mut server = setup_mock_server().await;

        let auth = server
            .mock("POST", "/auth")
            .match_body(Matcher::Json(json!({"api_key": "nova-test-key"})))
            .with_status(200)
            .with_body(r#"{"session_token": "sess-1"}"#)
            .expect(1)
            .create_async()
            .await;

        let chat = server
            .mock("POST", "/chat")
            .match_header("x-nova-session", "sess-1")
            .match_body(Matcher::Json(json!({
                "messages": [{"role": "human", "content": "What is Hess's law?"}]
            })))
            .with_status(200)
            .with_body(success_body("[NovaAI] Enthalpy is a state function."))
            .expect(2)
            .create_async()
            .await;

        let (adapter, sessions) = create_adapter(&server.url());

        let first = adapter.send("What is Hess's law?").await.unwrap();
        assert_eq!(first.provider, ProviderId::Nova);
        assert!(first.content.contains("NovaAI"));
        assert_eq!(first.tokens, TokenUsage { input: 7, output: 11 });
        assert_eq!(sessions.get(ProviderId::Nova).await.as_deref(), Some("sess-1"));

        // 第二次调用复用缓存令牌，不再认证
        adapter.send("What is Hess's law?").await.unwrap();

        auth.assert_async().await;
        chat.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_recovers_from_stale_session() {
        let mut server = setup_mock_server().await;

        let stale_chat = server
            .mock("POST", "/chat")
            .match_header("x-nova-session", "expired")
            .with_status(200)
            .with_body(STALE_BODY)
            .expect(1)
            .create_async()
            .await;

        let auth = server
            .mock("POST", "/auth")
            .with_status(200)
            .with_body(r#"{"token": "fresh"}"#)
            .expect(1)
            .create_async()
            .await;

        let fresh_chat = server
            .mock("POST", "/chat")
            .match_header("x-nova-session", "fresh")
            .with_status(200)
            .with_body(success_body("[NovaAI] recovered"))
            .expect(1)
            .create_async()
            .await;

        let (adapter, sessions) = create_adapter(&server.url());
        sessions.put(ProviderId::Nova, "expired").await;

        let response = adapter.send("test").await.unwrap();
        assert_eq!(response.content, "[NovaAI] recovered");
        assert_eq!(sessions.get(ProviderId::Nova).await.as_deref(), Some("fresh"));

        stale_chat.assert_async().await;
        auth.assert_async().await;
        fresh_chat.assert_async().await;
    }

    #[tokio::test]
    async fn test_stale_signal_is_detected_regardless_of_status_code() {
        let mut server = setup_mock_server().await;

        let _stale_chat = server
            .mock("POST", "/chat")
            .match_header("x-nova-session", "expired")
            .with_status(401)
            .with_body(STALE_BODY)
            .create_async()
            .await;

        let _auth = server
            .mock("POST", "/auth")
            .with_status(200)
            .with_body(r#"{"session_token": "fresh"}"#)
            .create_async()
            .await;

        let _fresh_chat = server
            .mock("POST", "/chat")
            .match_header("x-nova-session", "fresh")
            .with_status(200)
            .with_body(success_body("[NovaAI] ok"))
            .create_async()
            .await;

        let (adapter, sessions) = create_adapter(&server.url());
        sessions.put(ProviderId::Nova, "expired").await;

        assert!(adapter.send("test").await.is_ok());
    }

    #[tokio::test]
    async fn test_send_gives_up_after_single_retry() {
        let mut server = setup_mock_server().await;

        let auth = server
            .mock("POST", "/auth")
            .with_status(200)
            .with_body(r#"{"session_token": "never-accepted"}"#)
            .expect(2)
            .create_async()
            .await;

        let chat = server
            .mock("POST", "/chat")
            .with_status(200)
            .with_body(STALE_BODY)
            .expect(2)
            .create_async()
            .await;

        let (adapter, sessions) = create_adapter(&server.url());

        let err = adapter.send("test").await.unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::AuthFailure);
        assert_eq!(sessions.get(ProviderId::Nova).await, None);

        auth.assert_async().await;
        chat.assert_async().await;
    }

    #[tokio::test]
    async fn test_retry_failure_after_refresh_is_auth_failure() {
        let mut server = setup_mock_server().await;

        let _stale_chat = server
            .mock("POST", "/chat")
            .match_header("x-nova-session", "expired")
            .with_status(200)
            .with_body(STALE_BODY)
            .create_async()
            .await;

        let _auth = server
            .mock("POST", "/auth")
            .with_status(200)
            .with_body(r#"{"session_token": "fresh"}"#)
            .create_async()
            .await;

        let fresh_chat = server
            .mock("POST", "/chat")
            .match_header("x-nova-session", "fresh")
            .with_status(503)
            .with_body("service unavailable")
            .expect(1)
            .create_async()
            .await;

        let (adapter, sessions) = create_adapter(&server.url());
        sessions.put(ProviderId::Nova, "expired").await;

        let err = adapter.send("test").await.unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::AuthFailure);
        assert!(err.detail.contains("503"), "{}", err.detail);

        fresh_chat.assert_async().await;
    }

    #[tokio::test]
    async fn test_auth_rejected() {
        let mut server = setup_mock_server().await;

        let _auth = server
            .mock("POST", "/auth")
            .with_status(401)
            .with_body(r#"{"status": "error", "detail": "invalid api key"}"#)
            .create_async()
            .await;

        let chat = server
            .mock("POST", "/chat")
            .expect(0)
            .create_async()
            .await;

        let (adapter, _) = create_adapter(&server.url());
        let err = adapter.send("test").await.unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::AuthFailure);

        chat.assert_async().await;
    }

    #[tokio::test]
    async fn test_auth_without_token_is_auth_failure() {
        let mut server = setup_mock_server().await;

        let _auth = server
            .mock("POST", "/auth")
            .with_status(200)
            .with_body(r#"{"detail": "no session for you"}"#)
            .create_async()
            .await;

        let (adapter, _) = create_adapter(&server.url());
        let err = adapter.send("test").await.unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::AuthFailure);
        assert!(err.detail.contains("no session for you"));
    }

    #[tokio::test]
    async fn test_non_session_error_is_rejection_without_retry() {
        let mut server = setup_mock_server().await;

        let auth = server
            .mock("POST", "/auth")
            .with_status(200)
            .with_body(r#"{"session_token": "sess"}"#)
            .expect(1)
            .create_async()
            .await;

        let _chat = server
            .mock("POST", "/chat")
            .with_status(200)
            .with_body(r#"{"status": "error", "detail": "model overloaded"}"#)
            .create_async()
            .await;

        let (adapter, sessions) = create_adapter(&server.url());
        let err = adapter.send("test").await.unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::UpstreamRejection);
        assert!(err.detail.contains("model overloaded"));
        // 与会话无关的错误不影响缓存
        assert_eq!(sessions.get(ProviderId::Nova).await.as_deref(), Some("sess"));

        auth.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_connection_refused_is_transport_failure() {
        let (adapter, _) = create_adapter("http://127.0.0.1:1");
        let err = adapter.send("test").await.unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::TransportFailure);
    }
}
