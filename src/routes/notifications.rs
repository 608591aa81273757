use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::app::AppState;
use crate::auth::AuthStudent;
use crate::error::{ApiResponse, AppError, AppResult};

const MAX_NOTIFICATIONS: i64 = 50;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Notification {
    pub id: i64,
    pub kind: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
}

pub async fn notifications_for(
    pool: &SqlitePool,
    student_id: i64,
    unread_only: bool,
) -> Result<Vec<Notification>, sqlx::Error> {
    sqlx::query_as::<_, Notification>(
        "SELECT id, kind, message, is_read, created_at FROM notifications
         WHERE student_id = ? AND (? = 0 OR is_read = 0)
         ORDER BY created_at DESC, id DESC
         LIMIT ?",
    )
    .bind(student_id)
    .bind(unread_only)
    .bind(MAX_NOTIFICATIONS)
    .fetch_all(pool)
    .await
}

pub async fn list(
    State(state): State<AppState>,
    student: AuthStudent,
    Query(query): Query<NotificationQuery>,
) -> AppResult<impl IntoResponse> {
    let notifications = notifications_for(&state.pool, student.id, query.unread_only).await?;
    Ok(ApiResponse::ok(notifications))
}

/// 只能操作自己的通知，其他人的通知视为不存在
pub async fn mark_read(
    State(state): State<AppState>,
    student: AuthStudent,
    Path(id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let updated = sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ? AND student_id = ?")
        .bind(id)
        .bind(student.id)
        .execute(&state.pool)
        .await?
        .rows_affected();

    if updated == 0 {
        return Err(AppError::NotFound("通知"));
    }
    Ok(ApiResponse::ok(serde_json::json!({ "id": id, "is_read": true })))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    student: AuthStudent,
) -> AppResult<impl IntoResponse> {
    let updated = sqlx::query(
        "UPDATE notifications SET is_read = 1 WHERE student_id = ? AND is_read = 0",
    )
    .bind(student.id)
    .execute(&state.pool)
    .await?
    .rows_affected();

    Ok(ApiResponse::ok(serde_json::json!({ "updated": updated })))
}

pub async fn remove(
    State(state): State<AppState>,
    student: AuthStudent,
    Path(id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let deleted = sqlx::query("DELETE FROM notifications WHERE id = ? AND student_id = ?")
        .bind(id)
        .bind(student.id)
        .execute(&state.pool)
        .await?
        .rows_affected();

    if deleted == 0 {
        return Err(AppError::NotFound("通知"));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::learning::engine::notify;
    use crate::learning::engine::test_support::create_student;

    #[tokio::test]
    async fn unread_filter_and_ordering() {
        let pool = memory_pool().await;
        let student = create_student(&pool, "n@example.com", "student").await;
        let mut conn = pool.acquire().await.unwrap();
        notify(&mut conn, student, "badge", "first").await.unwrap();
        notify(&mut conn, student, "badge", "second").await.unwrap();
        drop(conn);

        sqlx::query("UPDATE notifications SET is_read = 1 WHERE message = 'first'")
            .execute(&pool)
            .await
            .unwrap();

        let all = notifications_for(&pool, student, false).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].message, "second");

        let unread = notifications_for(&pool, student, true).await.unwrap();
        assert_eq!(unread.len(), 1);
        assert!(!unread[0].is_read);
    }
}
