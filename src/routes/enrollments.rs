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
use crate::helpers::cache::{invalidate_prefix, CATALOG_PREFIX};
use crate::learning::engine::EnrollmentStatus;
use crate::learning::points::progress_percent;

/// 我的课程列表中的一项
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct EnrolledCourse {
    pub enrollment_id: i64,
    pub course_id: i64,
    pub title: String,
    pub category: String,
    pub status: String,
    pub progress: i64,
    pub lessons_completed: i64,
    pub lessons_total: i64,
    pub enrolled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_accessed_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EnrollmentFilter {
    pub status: Option<String>,
}

/// 学生的全部选课，按最近学习时间倒序
pub async fn enrolled_courses(
    pool: &SqlitePool,
    student_id: i64,
    status: Option<EnrollmentStatus>,
) -> Result<Vec<EnrolledCourse>, sqlx::Error> {
    let mut courses = sqlx::query_as::<_, EnrolledCourse>(
        "SELECT e.id AS enrollment_id, e.course_id, c.title, c.category, e.status, e.progress,
                (SELECT COUNT(*) FROM lesson_completions lc
                  JOIN lessons l ON l.id = lc.lesson_id
                  WHERE lc.student_id = e.student_id AND l.course_id = e.course_id) AS lessons_completed,
                (SELECT COUNT(*) FROM lessons l WHERE l.course_id = e.course_id) AS lessons_total,
                e.enrolled_at, e.completed_at, e.last_accessed_at
         FROM enrollments e
         JOIN courses c ON c.id = e.course_id
         WHERE e.student_id = ? AND (? IS NULL OR e.status = ?)
         ORDER BY e.last_accessed_at DESC, e.id DESC",
    )
    .bind(student_id)
    .bind(status.map(|s| s.as_str()))
    .bind(status.map(|s| s.as_str()))
    .fetch_all(pool)
    .await?;

    // 课程新增课时后，未结课的进度按当前课时数重新计算
    for course in &mut courses {
        if EnrollmentStatus::from(course.status.as_str()) == EnrollmentStatus::InProgress {
            course.progress = progress_percent(course.lessons_completed, course.lessons_total);
        }
    }

    Ok(courses)
}

fn parse_status(raw: Option<&str>) -> AppResult<Option<EnrollmentStatus>> {
    match raw.filter(|s| !s.is_empty()) {
        None | Some("all") => Ok(None),
        Some("in_progress") => Ok(Some(EnrollmentStatus::InProgress)),
        Some("completed") => Ok(Some(EnrollmentStatus::Completed)),
        Some(other) => Err(AppError::Validation(format!("未知的选课状态: {other}"))),
    }
}

pub async fn enroll(
    State(state): State<AppState>,
    student: AuthStudent,
    Path(course_id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let (enrollment, created) = state.engine().enroll(student.id, course_id).await?;

    let status = if created {
        // 目录中的选课人数已变化
        invalidate_prefix(CATALOG_PREFIX);
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, ApiResponse::ok(enrollment)))
}

pub async fn unenroll(
    State(state): State<AppState>,
    student: AuthStudent,
    Path(course_id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    state.engine().unenroll(student.id, course_id).await?;
    invalidate_prefix(CATALOG_PREFIX);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn my_courses(
    State(state): State<AppState>,
    student: AuthStudent,
    Query(filter): Query<EnrollmentFilter>,
) -> AppResult<impl IntoResponse> {
    let status = parse_status(filter.status.as_deref())?;
    let courses = enrolled_courses(&state.pool, student.id, status).await?;
    Ok(ApiResponse::ok(courses))
}
