mod app;
mod auth;
mod config;
mod db;
mod error;
mod helpers;
mod learning;
mod routes;
mod security;
mod services;

use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::{build_router, AppState};
use crate::config::CONFIG;
use crate::helpers::monitoring;
use crate::services::cache_warmup;

#[tokio::main]
async fn main() {
    let config = Arc::new(CONFIG.clone());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "learnboard={},tower_http=debug,sqlx=info",
                    config.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run(config).await {
        tracing::error!("❌ 服务启动失败: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: Arc<config::AppConfig>) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("🔧 运行环境: {}", config.environment);

    tracing::info!("🔧 正在连接数据库...");
    let pool = db::create_pool(&config).await?;
    db::init_db(&pool, &config).await?;
    tracing::info!("✅ 数据库初始化完成");

    tokio::fs::create_dir_all(config.uploads.dir.join("avatars")).await?;

    let metrics = monitoring::init_metrics();
    let state = AppState::new(pool.clone(), Arc::clone(&config), metrics);

    let points_per_level = config.gamification.points_per_level;
    cache_warmup::warmup_all_caches(&pool, points_per_level).await;
    tokio::spawn(cache_warmup::start_cache_refresh_task(
        pool.clone(),
        points_per_level,
    ));

    let app = build_router(state);

    let addr = config.server.server_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("🚀 Learnboard 已启动: http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 等待数据库连接归还，超时后直接退出
    let timeout = Duration::from_secs(config.server.graceful_shutdown_timeout_seconds);
    if tokio::time::timeout(timeout, pool.close()).await.is_err() {
        tracing::warn!("关闭数据库连接池超时 ({:?})", timeout);
    }

    tracing::info!("👋 服务已停止");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("无法监听 Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("收到 Ctrl+C，开始关闭");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                tracing::info!("收到 SIGTERM，开始关闭");
            }
            Err(e) => {
                tracing::error!("无法监听 SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
