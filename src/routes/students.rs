//! 个人资料、修改密码与头像上传

use axum::{
    extract::{Multipart, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use validator::Validate;

use crate::app::AppState;
use crate::auth::{password, AuthStudent};
use crate::error::{ApiResponse, AppError, AppResult};
use crate::security::{generate_token, validate_input};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Profile {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100, message = "姓名长度需在 1 到 100 之间"))]
    pub name: Option<String>,
    #[validate(length(max = 500, message = "简介不能超过 500 字"))]
    pub bio: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    #[validate(length(min = 8, max = 128, message = "新密码长度需在 8 到 128 之间"))]
    pub new_password: String,
}

/// 允许的头像类型及保存时使用的扩展名
const AVATAR_TYPES: &[(&str, &str)] = &[
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
];

pub async fn fetch_profile(pool: &SqlitePool, student_id: i64) -> AppResult<Profile> {
    sqlx::query_as::<_, Profile>(
        "SELECT id, name, email, role, bio, avatar_url, created_at, last_login_at FROM students WHERE id = ?",
    )
    .bind(student_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("学生"))
}

pub async fn get_profile(
    State(state): State<AppState>,
    student: AuthStudent,
) -> AppResult<impl IntoResponse> {
    Ok(ApiResponse::ok(fetch_profile(&state.pool, student.id).await?))
}

pub async fn update_profile(
    State(state): State<AppState>,
    student: AuthStudent,
    Json(mut req): Json<UpdateProfileRequest>,
) -> AppResult<impl IntoResponse> {
    req.name = req.name.map(|n| n.trim().to_string());
    validate_input(&req)?;

    sqlx::query(
        "UPDATE students SET name = COALESCE(?, name), bio = COALESCE(?, bio) WHERE id = ?",
    )
    .bind(req.name.as_deref())
    .bind(req.bio.as_deref())
    .bind(student.id)
    .execute(&state.pool)
    .await?;

    Ok(ApiResponse::ok(fetch_profile(&state.pool, student.id).await?))
}

pub async fn change_password(
    State(state): State<AppState>,
    student: AuthStudent,
    Json(req): Json<ChangePasswordRequest>,
) -> AppResult<impl IntoResponse> {
    validate_input(&req)?;

    let current_hash: String =
        sqlx::query_scalar("SELECT password_hash FROM students WHERE id = ?")
            .bind(student.id)
            .fetch_one(&state.pool)
            .await?;

    if !password::verify_password(&req.current_password, &current_hash) {
        tracing::warn!("学生 {} 修改密码时当前密码错误", student.id);
        return Err(AppError::InvalidCredentials);
    }

    let new_hash = password::hash_password(&req.new_password)?;
    sqlx::query("UPDATE students SET password_hash = ? WHERE id = ?")
        .bind(&new_hash)
        .bind(student.id)
        .execute(&state.pool)
        .await?;

    tracing::info!("学生 {} 修改了密码", student.id);
    Ok(ApiResponse::ok(serde_json::json!({ "updated": true })))
}

fn avatar_extension(content_type: &str) -> Option<&'static str> {
    AVATAR_TYPES
        .iter()
        .find(|(mime, _)| *mime == content_type)
        .map(|(_, ext)| *ext)
}

fn avatar_file_name(ext: &str) -> String {
    format!("{}.{}", generate_token(24), ext)
}

/// 上传头像，multipart 字段名为 `file`
pub async fn upload_avatar(
    State(state): State<AppState>,
    student: AuthStudent,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let max_bytes = state.config.uploads.max_bytes;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("无法解析上传内容: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        // 优先使用声明的类型，缺失时根据文件名推断
        let content_type = field
            .content_type()
            .map(str::to_string)
            .or_else(|| {
                field
                    .file_name()
                    .and_then(|name| mime_guess::from_path(name).first())
                    .map(|mime| mime.essence_str().to_string())
            })
            .unwrap_or_default();

        let ext = avatar_extension(&content_type)
            .ok_or_else(|| AppError::UnsupportedMedia(content_type.clone()))?;

        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("读取上传文件失败: {e}")))?;

        if data.len() > max_bytes {
            return Err(AppError::PayloadTooLarge(max_bytes));
        }
        if data.is_empty() {
            return Err(AppError::Validation("上传文件为空".to_string()));
        }

        let avatar_dir = state.config.uploads.dir.join("avatars");
        tokio::fs::create_dir_all(&avatar_dir)
            .await
            .map_err(|e| AppError::Internal(format!("创建上传目录失败: {e}")))?;

        let file_name = avatar_file_name(ext);
        tokio::fs::write(avatar_dir.join(&file_name), &data)
            .await
            .map_err(|e| AppError::Internal(format!("保存头像失败: {e}")))?;

        let previous: Option<String> =
            sqlx::query_scalar("SELECT avatar_url FROM students WHERE id = ?")
                .bind(student.id)
                .fetch_one(&state.pool)
                .await?;

        let avatar_url = format!("/uploads/avatars/{}", file_name);
        sqlx::query("UPDATE students SET avatar_url = ? WHERE id = ?")
            .bind(&avatar_url)
            .bind(student.id)
            .execute(&state.pool)
            .await?;

        // 旧头像删除失败不影响本次上传
        if let Some(old_name) = previous
            .as_deref()
            .and_then(|url| url.strip_prefix("/uploads/avatars/"))
        {
            if let Err(e) = tokio::fs::remove_file(avatar_dir.join(old_name)).await {
                tracing::warn!("删除旧头像 {} 失败: {}", old_name, e);
            }
        }

        tracing::info!("学生 {} 上传头像 {} ({} 字节)", student.id, file_name, data.len());
        return Ok(ApiResponse::ok(fetch_profile(&state.pool, student.id).await?));
    }

    Err(AppError::Validation("缺少 file 字段".to_string()))
}
