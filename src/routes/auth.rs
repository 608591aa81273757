//! 注册、登录与会话

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::app::AppState;
use crate::auth::{password, token, AuthStudent, ROLE_STUDENT};
use crate::error::{ApiResponse, AppError, AppResult};
use crate::learning::engine::record_activity;
use crate::learning::points::ActivityKind;
use crate::routes::students::{fetch_profile, Profile};
use crate::security::{sanitize_log_message, validate_input};

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 100, message = "姓名长度需在 1 到 100 之间"))]
    pub name: String,
    #[validate(email(message = "邮箱格式不正确"))]
    pub email: String,
    #[validate(length(min = 8, max = 128, message = "密码长度需在 8 到 128 之间"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "邮箱格式不正确"))]
    pub email: String,
    #[validate(length(min = 1, message = "密码不能为空"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub student: Profile,
}

#[derive(sqlx::FromRow)]
struct Credentials {
    id: i64,
    role: String,
    password_hash: String,
}

fn session_response(
    state: &AppState,
    status: StatusCode,
    token: String,
    student: Profile,
) -> axum::response::Response {
    let cookie = token::session_cookie(&state.config.auth, &token);
    (
        status,
        [(header::SET_COOKIE, cookie)],
        ApiResponse::ok(SessionResponse { token, student }),
    )
        .into_response()
}

pub async fn register(
    State(state): State<AppState>,
    Json(mut req): Json<RegisterRequest>,
) -> AppResult<impl IntoResponse> {
    // 先去掉首尾空白再校验，全空白的姓名按空处理
    req.name = req.name.trim().to_string();
    validate_input(&req)?;

    let email = req.email.trim().to_lowercase();
    let password_hash = password::hash_password(&req.password)?;

    let inserted: Result<i64, sqlx::Error> = sqlx::query_scalar(
        "INSERT INTO students (name, email, password_hash, role, created_at)
         VALUES (?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(&req.name)
    .bind(&email)
    .bind(&password_hash)
    .bind(ROLE_STUDENT)
    .bind(Utc::now())
    .fetch_one(&state.pool)
    .await;

    let student_id = match inserted {
        Ok(id) => id,
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            return Err(AppError::Conflict("该邮箱已注册".to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!(
        "新学生注册: {} ({})",
        student_id,
        sanitize_log_message(&email)
    );

    let token = token::issue_token(&state.config.auth, student_id, ROLE_STUDENT)?;
    let profile = fetch_profile(&state.pool, student_id).await?;
    Ok(session_response(&state, StatusCode::CREATED, token, profile))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    validate_input(&req)?;
    let email = req.email.trim().to_lowercase();

    let credentials = sqlx::query_as::<_, Credentials>(
        "SELECT id, role, password_hash FROM students WHERE email = ?",
    )
    .bind(&email)
    .fetch_optional(&state.pool)
    .await?;

    // 邮箱不存在和密码错误返回相同的错误
    let credentials = match credentials {
        Some(c) if password::verify_password(&req.password, &c.password_hash) => c,
        _ => {
            tracing::warn!("登录失败: {}", sanitize_log_message(&email));
            return Err(AppError::InvalidCredentials);
        }
    };

    let now = Utc::now();
    let mut tx = state.pool.begin().await?;
    sqlx::query("UPDATE students SET last_login_at = ? WHERE id = ?")
        .bind(now)
        .bind(credentials.id)
        .execute(&mut *tx)
        .await?;
    record_activity(&mut tx, credentials.id, ActivityKind::Login, 0, now).await?;
    tx.commit().await?;

    let token = token::issue_token(&state.config.auth, credentials.id, &credentials.role)?;
    let profile = fetch_profile(&state.pool, credentials.id).await?;
    Ok(session_response(&state, StatusCode::OK, token, profile))
}

pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    let cookie = token::clear_session_cookie(&state.config.auth);
    (
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        ApiResponse::ok(serde_json::json!({ "logged_out": true })),
    )
}

pub async fn me(
    State(state): State<AppState>,
    student: AuthStudent,
) -> AppResult<impl IntoResponse> {
    let profile = fetch_profile(&state.pool, student.id).await?;
    Ok(ApiResponse::ok(profile))
}
