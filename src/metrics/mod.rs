use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// 简单的指标收集器
#[derive(Debug, Default)]
pub struct Metrics {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    rejected_requests: AtomicU64,
    session_refreshes: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录成功请求
    pub fn record_success(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.successful_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录上游失败的请求
    pub fn record_failure(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录调用方错误导致的拒绝（4xx）
    pub fn record_rejected(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.rejected_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_refresh(&self) {
        self.session_refreshes.fetch_add(1, Ordering::Relaxed);
    }

    /// 导出 Prometheus 格式
    pub fn export_prometheus(&self) -> String {
        format!(
            "# HELP llm_router_requests_total Total number of chat requests\n\
             # TYPE llm_router_requests_total counter\n\
             llm_router_requests_total {}\n\
             # HELP llm_router_requests_successful Successful chat requests\n\
             # TYPE llm_router_requests_successful counter\n\
             llm_router_requests_successful {}\n\
             # HELP llm_router_requests_failed Chat requests failed upstream\n\
             # TYPE llm_router_requests_failed counter\n\
             llm_router_requests_failed {}\n\
             # HELP llm_router_requests_rejected Chat requests rejected as invalid\n\
             # TYPE llm_router_requests_rejected counter\n\
             llm_router_requests_rejected {}\n\
             # HELP llm_router_session_refreshes Session tokens re-issued after a stale signal\n\
             # TYPE llm_router_session_refreshes counter\n\
             llm_router_session_refreshes {}\n",
            self.total_requests.load(Ordering::Relaxed),
            self.successful_requests.load(Ordering::Relaxed),
            self.failed_requests.load(Ordering::Relaxed),
            self.rejected_requests.load(Ordering::Relaxed),
            self.session_refreshes.load(Ordering::Relaxed)
        )
    }
}

/// 获取全局指标实例
pub fn global_metrics() -> &'static Arc<Metrics> {
    use once_cell::sync::Lazy;
    static METRICS: Lazy<Arc<Metrics>> = Lazy::new(|| Arc::new(Metrics::new()));
    &METRICS
}
