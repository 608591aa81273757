//! 学生仪表盘汇总，JSON 接口和页面共用

use axum::{extract::State, response::IntoResponse};
use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::app::AppState;
use crate::auth::AuthStudent;
use crate::error::{ApiResponse, AppResult};
use crate::learning::engine::{Badge, EnrollmentStatus};
use crate::learning::points::{level_for, LevelInfo};
use crate::learning::streak::StreakSummary;
use crate::routes::analytics::{activity_series, DayActivity};
use crate::routes::courses::CourseSummary;
use crate::routes::enrollments::{enrolled_courses, EnrolledCourse};
use crate::routes::students::{fetch_profile, Profile};

const RECENT_DAYS: i64 = 7;
const RECENT_BADGES: i64 = 5;
const RECOMMENDATIONS: i64 = 5;

#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub profile: Profile,
    pub total_points: i64,
    pub level: LevelInfo,
    pub streak: StreakSummary,
    pub enrolled_count: usize,
    pub in_progress_count: usize,
    pub completed_count: usize,
    pub average_progress: f64,
    pub certificates_count: i64,
    pub courses: Vec<EnrolledCourse>,
    pub recent_activity: Vec<DayActivity>,
    pub recent_badges: Vec<Badge>,
    pub unread_notifications: i64,
    pub recommendations: Vec<CourseSummary>,
}

async fn recent_badges(pool: &SqlitePool, student_id: i64) -> Result<Vec<Badge>, sqlx::Error> {
    sqlx::query_as::<_, Badge>(
        "SELECT b.code, b.name, b.description, b.icon, sb.awarded_at
         FROM student_badges sb JOIN badges b ON b.code = sb.badge_code
         WHERE sb.student_id = ?
         ORDER BY sb.awarded_at DESC LIMIT ?",
    )
    .bind(student_id)
    .bind(RECENT_BADGES)
    .fetch_all(pool)
    .await
}

/// 学生尚未选修的已发布课程，新课在前
async fn recommendations(
    pool: &SqlitePool,
    student_id: i64,
) -> Result<Vec<CourseSummary>, sqlx::Error> {
    sqlx::query_as::<_, CourseSummary>(
        "SELECT c.id, c.title, c.description, c.category, c.difficulty, c.created_at,
            (SELECT COUNT(*) FROM lessons l WHERE l.course_id = c.id) AS lessons_count,
            (SELECT COUNT(*) FROM enrollments e WHERE e.course_id = c.id) AS enrolled_count
         FROM courses c
         WHERE c.is_published = 1
           AND NOT EXISTS (SELECT 1 FROM enrollments e WHERE e.course_id = c.id AND e.student_id = ?)
         ORDER BY c.created_at DESC, c.id DESC
         LIMIT ?",
    )
    .bind(student_id)
    .bind(RECOMMENDATIONS)
    .fetch_all(pool)
    .await
}

async fn scalar_count(pool: &SqlitePool, sql: &str, student_id: i64) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(sql).bind(student_id).fetch_one(pool).await
}

pub async fn build_summary(state: &AppState, student_id: i64) -> AppResult<DashboardSummary> {
    let pool = &state.pool;
    let engine = state.engine();
    let today = Utc::now().date_naive();

    let profile = fetch_profile(pool, student_id).await?;

    let (courses, recent_activity, recent_badges, recommendations) = tokio::join!(
        enrolled_courses(pool, student_id, None),
        activity_series(pool, student_id, today, RECENT_DAYS),
        recent_badges(pool, student_id),
        recommendations(pool, student_id),
    );
    let courses = courses?;

    let (unread, certificates) = tokio::join!(
        scalar_count(
            pool,
            "SELECT COUNT(*) FROM notifications WHERE student_id = ? AND is_read = 0",
            student_id
        ),
        scalar_count(
            pool,
            "SELECT COUNT(*) FROM certificates WHERE student_id = ?",
            student_id
        ),
    );

    let total_points = engine.total_points(student_id).await?;
    let streak = engine.streak(student_id).await?;

    let completed_count = courses
        .iter()
        .filter(|c| EnrollmentStatus::from(c.status.as_str()) == EnrollmentStatus::Completed)
        .count();
    let average_progress = if courses.is_empty() {
        0.0
    } else {
        let sum: i64 = courses.iter().map(|c| c.progress).sum();
        ((sum as f64 / courses.len() as f64) * 10.0).round() / 10.0
    };

    Ok(DashboardSummary {
        profile,
        total_points,
        level: level_for(total_points, state.config.gamification.points_per_level),
        streak,
        enrolled_count: courses.len(),
        in_progress_count: courses.len() - completed_count,
        completed_count,
        average_progress,
        certificates_count: certificates?,
        courses,
        recent_activity: recent_activity?,
        recent_badges: recent_badges?,
        unread_notifications: unread?,
        recommendations: recommendations?,
    })
}

pub async fn summary(
    State(state): State<AppState>,
    student: AuthStudent,
) -> AppResult<impl IntoResponse> {
    Ok(ApiResponse::ok(build_summary(&state, student.id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db::memory_pool;
    use crate::learning::engine::test_support::{create_course, create_student};
    use std::sync::Arc;

    #[tokio::test]
    async fn summary_counts_courses_and_recommends_the_rest() {
        let pool = memory_pool().await;
        let state = AppState::new(pool.clone(), Arc::new(AppConfig::default()), None);
        let student = create_student(&pool, "d@example.com", "student").await;
        let (short, short_lessons) = create_course(&pool, 1).await;
        let (long, _) = create_course(&pool, 2).await;
        let (other, _) = create_course(&pool, 1).await;

        let engine = state.engine();
        engine.enroll(student, short).await.unwrap();
        engine.enroll(student, long).await.unwrap();
        engine.complete_lesson(student, short_lessons[0]).await.unwrap();

        let summary = build_summary(&state, student).await.unwrap();
        assert_eq!(summary.enrolled_count, 2);
        assert_eq!(summary.completed_count, 1);
        assert_eq!(summary.in_progress_count, 1);
        assert_eq!(summary.average_progress, 50.0);
        assert_eq!(summary.certificates_count, 1);
        // 课时 10 分 + 结课奖励 100 分
        assert_eq!(summary.total_points, 110);
        assert_eq!(summary.streak.current, 1);
        assert_eq!(summary.recent_activity.len(), 7);
        assert_eq!(summary.recommendations.len(), 1);
        assert_eq!(summary.recommendations[0].id, other);
        assert!(summary.unread_notifications >= 3);
        assert!(summary
            .recent_badges
            .iter()
            .any(|b| b.code == "first_course"));
    }
}
