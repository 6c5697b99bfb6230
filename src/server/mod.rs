pub mod handlers;

use crate::providers::routing::Dispatcher;
use crate::Result;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

/// 启动 HTTP 服务器（带优雅关闭）
pub async fn start_server(dispatcher: Arc<Dispatcher>, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("llm-router 服务器运行在 http://{}", listener.local_addr()?);

    serve(listener, dispatcher, shutdown_signal()).await;

    info!("服务器已优雅关闭");
    Ok(())
}

/// 在已绑定的监听器上处理连接，直到 `shutdown` 完成
///
/// 每个连接一个任务，单个请求的失败不会影响其他连接。
pub async fn serve<F>(listener: TcpListener, dispatcher: Arc<Dispatcher>, shutdown: F)
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            // 等待新连接
            result = listener.accept() => {
                let (stream, peer) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!("接受连接失败: {}", e);
                        continue;
                    }
                };

                let io = TokioIo::new(stream);
                let dispatcher = Arc::clone(&dispatcher);

                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        let dispatcher = Arc::clone(&dispatcher);
                        handlers::handle_request(req, dispatcher)
                    });

                    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                        error!(%peer, "服务连接错误: {}", e);
                    }
                });
            }
            // 等待关闭信号
            _ = &mut shutdown => {
                info!("收到关闭信号，停止接受新连接");
                break;
            }
        }
    }
}

/// 等待 Ctrl+C 或 SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("设置 Ctrl+C 信号处理失败: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("设置 SIGTERM 信号处理失败: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => warn!("收到 Ctrl+C 信号，开始优雅关闭..."),
        _ = terminate => warn!("收到 SIGTERM 信号，开始优雅关闭..."),
    }
}
