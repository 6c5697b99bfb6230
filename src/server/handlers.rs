use crate::error::RouterError;
use crate::metrics;
use crate::providers::routing::Dispatcher;
use crate::types::ChatRequest;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{info_span, warn, Instrument};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// `/chat` 请求体上限
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// 处理 HTTP 请求的主路由
pub async fn handle_request(
    req: Request<hyper::body::Incoming>,
    dispatcher: Arc<Dispatcher>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let request_id = Uuid::new_v4();
    let span = info_span!("request", %request_id, method = %req.method(), path = req.uri().path());

    let mut response = async move {
        match (req.method(), req.uri().path()) {
            (&Method::GET, "/health") => health_check(),
            (&Method::GET, "/metrics") => metrics_endpoint(),
            (&Method::POST, "/chat") => chat(req, dispatcher).await,
            _ => not_found(),
        }
    }
    .instrument(span)
    .await;

    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    Ok(response)
}

/// 健康检查端点，不依赖任何上游
fn health_check() -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &json!({ "status": "ok" }))
}

/// 指标端点
fn metrics_endpoint() -> Response<Full<Bytes>> {
    let body = metrics::global_metrics().export_prometheus();
    let mut response = Response::new(Full::new(Bytes::from(body)));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}

/// 聊天端点
async fn chat(
    req: Request<hyper::body::Incoming>,
    dispatcher: Arc<Dispatcher>,
) -> Response<Full<Bytes>> {
    let metrics = metrics::global_metrics();

    let whole_body = match Limited::new(req.into_body(), MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            metrics.record_rejected();
            let err = if e.downcast_ref::<LengthLimitError>().is_some() {
                RouterError::PayloadTooLarge(MAX_BODY_BYTES)
            } else {
                RouterError::invalid_request(format!("读取请求体失败: {}", e))
            };
            return error_response(&err);
        }
    };

    let chat_req: ChatRequest = match serde_json::from_slice(&whole_body) {
        Ok(chat_req) => chat_req,
        Err(e) => {
            metrics.record_rejected();
            return error_response(&RouterError::from(e));
        }
    };

    let provider = chat_req.provider.clone();
    match dispatcher
        .route(chat_req)
        .instrument(info_span!("chat", %provider))
        .await
    {
        Ok(response) => match serde_json::to_value(&response) {
            Ok(body) => {
                metrics.record_success();
                json_response(StatusCode::OK, &body)
            }
            Err(e) => {
                metrics.record_failure();
                error_response(&RouterError::internal(e.to_string()))
            }
        },
        Err(e) => {
            if e.is_client_error() {
                metrics.record_rejected();
            } else {
                metrics.record_failure();
            }
            error_response(&e)
        }
    }
}

/// 网关错误到 HTTP 状态码的映射
///
/// 调用方错误为 400；所有上游失败（包括上游认证失败）为 502，
/// 具体分类放在响应体的 `type` 字段中。
pub fn status_for(err: &RouterError) -> StatusCode {
    match err {
        RouterError::InvalidRequest(_) | RouterError::UnknownProvider(_) | RouterError::JsonError(_) => {
            StatusCode::BAD_REQUEST
        }
        RouterError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        RouterError::ProviderNotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
        RouterError::Upstream { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_type(err: &RouterError) -> &'static str {
    match err {
        RouterError::Upstream { source, .. } => source.kind.as_str(),
        RouterError::ProviderNotConfigured(_) => "provider_unavailable",
        e if e.is_client_error() => "invalid_request_error",
        _ => "internal_error",
    }
}

fn error_response(err: &RouterError) -> Response<Full<Bytes>> {
    let status = status_for(err);
    if status.is_server_error() {
        warn!(status = status.as_u16(), error = %err, "请求失败");
    }
    json_response(
        status,
        &json!({
            "error": {
                "message": err.to_string(),
                "type": error_type(err)
            }
        }),
    )
}

fn json_response(status: StatusCode, body: &serde_json::Value) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// 404 响应
fn not_found() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::NOT_FOUND,
        &json!({
            "error": {
                "message": "Not Found",
                "type": "not_found"
            }
        }),
    )
}
