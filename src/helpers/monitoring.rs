//! 监控和运维功能模块
//!
//! 提供健康检查、性能指标收集和 Prometheus 指标暴露

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use metrics::{gauge, histogram, increment_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::time::Instant;

use crate::app::AppState;

/// 健康检查响应
#[derive(Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub version: String,
    pub uptime: u64,
    pub database: String,
}

/// 安装 Prometheus 指标收集器
pub fn init_metrics() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!("无法安装 Prometheus 指标收集器: {}", e);
            None
        }
    }
}

/// 健康检查处理器
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    gauge!("app_uptime_seconds", state.uptime() as f64);

    let db_status = match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => "ok",
        Err(e) => {
            tracing::error!("数据库健康检查失败: {}", e);
            "error"
        }
    };

    let status = if db_status == "ok" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthCheckResponse {
        status: if db_status == "ok" { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime: state.uptime(),
        database: db_status.to_string(),
    };

    (status, Json(response))
}

/// 指标收集中间件
pub async fn metrics_middleware(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> impl IntoResponse {
    let start = Instant::now();
    // 使用路由模板而不是实际路径，避免 id 造成标签爆炸
    let path = req
        .extensions()
        .get::<axum::extract::MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let method = req.method().to_string();

    let response = next.run(req).await;

    let duration = start.elapsed();
    let status = response.status().as_u16().to_string();

    if response.status().is_success() || response.status().is_redirection() {
        increment_counter!("http_requests_total", "status" => status.clone(), "method" => method.clone(), "path" => path.clone());
    } else {
        increment_counter!("http_requests_errors_total", "status" => status.clone(), "method" => method.clone(), "path" => path.clone());
    }

    histogram!("http_request_duration_seconds", duration.as_secs_f64(),
        "status" => status,
        "method" => method,
        "path" => path
    );

    response
}

/// 指标处理器 - 暴露 Prometheus 文本格式
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            "# 指标收集器未安装\n".to_string(),
        ),
    }
}

/// 数据库查询监控帮助函数
pub async fn track_db_query<T, F>(query_name: &'static str, f: F) -> Result<T, sqlx::Error>
where
    F: std::future::Future<Output = Result<T, sqlx::Error>>,
{
    increment_counter!("db_queries_total", "query" => query_name);

    let start = Instant::now();

    match f.await {
        Ok(result) => {
            histogram!("db_query_duration_seconds", start.elapsed().as_secs_f64(),
                "query" => query_name,
                "status" => "success"
            );
            Ok(result)
        }
        Err(e) => {
            increment_counter!("db_queries_errors_total", "query" => query_name);
            histogram!("db_query_duration_seconds", start.elapsed().as_secs_f64(),
                "query" => query_name,
                "status" => "error"
            );
            Err(e)
        }
    }
}
