//! 应用状态与路由组装

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Instant;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    services::ServeDir,
    trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::helpers::monitoring;
use crate::learning::LearnEngine;
use crate::routes::{
    analytics, auth, courses, dashboard, enrollments, notifications, pages, progress,
    static_assets, students,
};

/// 应用状态，包含启动时间、数据库连接池和配置
#[derive(Clone)]
pub struct AppState {
    pub start_time: Instant,
    pub pool: SqlitePool,
    pub config: Arc<AppConfig>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: Arc<AppConfig>, metrics: Option<PrometheusHandle>) -> Self {
        Self {
            start_time: Instant::now(),
            pool,
            config,
            metrics,
        }
    }

    /// 获取应用运行时间（秒）
    pub fn uptime(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn engine(&self) -> LearnEngine {
        LearnEngine::new(self.pool.clone(), self.config.gamification.clone())
    }
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .security
        .cors_allow_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("忽略无效的 CORS 来源: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

/// /api 开头 - 返回 JSON
fn api_routes(config: &AppConfig) -> Router<AppState> {
    // 头像上传走自己的大小限制，额外留出 multipart 边界的余量
    let upload_limit = config.uploads.max_bytes + 64 * 1024;

    Router::new()
        // 认证
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me))
        // 个人资料
        .route(
            "/students/me",
            get(students::get_profile).put(students::update_profile),
        )
        .route("/students/me/password", put(students::change_password))
        .route(
            "/students/me/avatar",
            post(students::upload_avatar)
                .layer::<_, std::convert::Infallible>(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(upload_limit)),
        )
        // 课程目录与编辑
        .route(
            "/courses",
            get(courses::list_courses).post(courses::create_course),
        )
        .route("/courses/categories", get(courses::categories))
        .route(
            "/courses/:id",
            get(courses::get_course)
                .put(courses::update_course)
                .delete(courses::delete_course),
        )
        .route("/courses/:id/lessons", post(courses::add_lesson))
        .route("/courses/:id/quizzes", post(courses::create_quiz))
        .route("/courses/:id/analytics", get(courses::course_analytics))
        .route(
            "/courses/:id/enrollment",
            post(enrollments::enroll).delete(enrollments::unenroll),
        )
        .route(
            "/lessons/:id",
            put(courses::update_lesson).delete(courses::delete_lesson),
        )
        // 学习进度
        .route("/lessons/:id/complete", post(progress::complete_lesson))
        .route("/quizzes/:id", get(progress::get_quiz))
        .route("/quizzes/:id/submit", post(progress::submit_quiz))
        .route("/enrollments", get(enrollments::my_courses))
        .route("/certificates", get(progress::my_certificates))
        .route(
            "/certificates/verify/:code",
            get(progress::verify_certificate),
        )
        // 统计
        .route("/analytics/streak", get(analytics::streak))
        .route("/analytics/points", get(analytics::points))
        .route("/analytics/activity", get(analytics::activity))
        .route("/analytics/badges", get(analytics::badges))
        .route("/analytics/leaderboard", get(analytics::leaderboard))
        .route("/dashboard", get(dashboard::summary))
        // 通知
        .route("/notifications", get(notifications::list))
        .route("/notifications/read-all", post(notifications::mark_all_read))
        .route("/notifications/:id/read", post(notifications::mark_read))
        .route("/notifications/:id", delete(notifications::remove))
}

/// 组装完整的应用路由
pub fn build_router(state: AppState) -> Router {
    let config = Arc::clone(&state.config);

    Router::new()
        // 页面
        .route("/", get(pages::landing))
        .route("/app/dashboard", get(pages::dashboard))
        // 静态文件（嵌入式）
        .route("/static/*path", get(static_assets::static_handler))
        // 监控
        .route("/health", get(monitoring::health_check))
        .route("/metrics", get(monitoring::metrics_handler))
        .nest("/api", api_routes(&config))
        // 用户上传的文件
        .nest_service("/uploads", ServeDir::new(&config.uploads.dir))
        .layer(middleware::from_fn(monitoring::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors_layer(&config))
        .with_state(state)
}
