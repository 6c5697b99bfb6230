use anyhow::Context;
use clap::Parser;
use llm_router::config::{Config, DEFAULT_PROVIDER_BASE};
use llm_router::providers::routing::Dispatcher;
use llm_router::server;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "llm-router")]
#[command(about = "统一的多提供商 LLM 聊天网关", long_about = None)]
struct Args {
    /// 配置文件路径
    #[arg(short, long, default_value = "llm-router.yaml")]
    config: String,

    /// 监听地址
    #[arg(short, long, default_value = "0.0.0.0:8000")]
    bind: String,

    /// 配置文件不存在时，三个提供商共用的上游地址
    #[arg(long, env = "MOCK_PROVIDER_URL", default_value = DEFAULT_PROVIDER_BASE)]
    provider_base: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // 解析命令行参数
    let args = Args::parse();

    // 加载配置
    let config = if Path::new(&args.config).exists() {
        Config::from_file(&args.config)
            .with_context(|| format!("加载配置失败: {}", args.config))?
    } else {
        warn!(
            config = %args.config,
            provider_base = %args.provider_base,
            "配置文件不存在，使用本地开发配置"
        );
        Config::local(&args.provider_base)
    };

    let dispatcher = Arc::new(Dispatcher::from_config(&config)?);
    info!(providers = ?dispatcher.providers(), "适配器已就绪");

    // 解析监听地址
    let addr: SocketAddr = args
        .bind
        .parse()
        .with_context(|| format!("无效的监听地址: {}", args.bind))?;

    // 启动服务器
    server::start_server(dispatcher, addr).await?;

    Ok(())
}
