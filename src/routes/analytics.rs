//! 学习统计：连续天数、积分、每日活动、徽章与排行榜

use axum::{
    extract::{Query, State},
    response::IntoResponse,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::BTreeMap;

use crate::app::AppState;
use crate::auth::AuthStudent;
use crate::error::{ApiResponse, AppResult};
use crate::helpers::cache::{get_from_cache, set_to_cache, LEADERBOARD_PREFIX};
use crate::helpers::monitoring::track_db_query;
use crate::learning::points::{level_for, LevelInfo};

const DEFAULT_ACTIVITY_DAYS: i64 = 30;
const MAX_ACTIVITY_DAYS: i64 = 365;
pub const DEFAULT_LEADERBOARD_SIZE: i64 = 10;
const MAX_LEADERBOARD_SIZE: i64 = 50;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PointsByKind {
    pub kind: String,
    pub points: i64,
    pub events: i64,
}

#[derive(Debug, Serialize)]
pub struct PointsSummary {
    pub total: i64,
    pub level: LevelInfo,
    pub breakdown: Vec<PointsByKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayActivity {
    pub date: NaiveDate,
    pub points: i64,
    pub events: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BadgeProgress {
    pub code: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub earned: bool,
    pub awarded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub student_id: i64,
    pub name: String,
    pub avatar_url: Option<String>,
    pub points: i64,
    pub level: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct ActivityQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<i64>,
}

/// 把事件按 UTC 日期分桶，补齐没有记录的日期，最早的在前
pub fn daily_activity(
    events: &[(DateTime<Utc>, i64)],
    today: NaiveDate,
    days: i64,
) -> Vec<DayActivity> {
    let days = days.max(1);
    let start = today - Duration::days(days - 1);

    let mut buckets: BTreeMap<NaiveDate, DayActivity> = (0..days)
        .map(|offset| {
            let date = start + Duration::days(offset);
            (
                date,
                DayActivity {
                    date,
                    points: 0,
                    events: 0,
                },
            )
        })
        .collect();

    for (at, points) in events {
        if let Some(bucket) = buckets.get_mut(&at.date_naive()) {
            bucket.points += points;
            bucket.events += 1;
        }
    }

    buckets.into_values().collect()
}

pub async fn activity_series(
    pool: &SqlitePool,
    student_id: i64,
    today: NaiveDate,
    days: i64,
) -> Result<Vec<DayActivity>, sqlx::Error> {
    let days = days.clamp(1, MAX_ACTIVITY_DAYS);
    let start = (today - Duration::days(days - 1))
        .and_hms_opt(0, 0, 0)
        .map(|t| t.and_utc())
        .unwrap_or_else(Utc::now);

    let events: Vec<(DateTime<Utc>, i64)> = sqlx::query_as(
        "SELECT occurred_at, points FROM activity_events WHERE student_id = ? AND occurred_at >= ?",
    )
    .bind(student_id)
    .bind(start)
    .fetch_all(pool)
    .await?;

    Ok(daily_activity(&events, today, days))
}

pub async fn points_breakdown(
    pool: &SqlitePool,
    student_id: i64,
) -> Result<Vec<PointsByKind>, sqlx::Error> {
    sqlx::query_as::<_, PointsByKind>(
        "SELECT kind, COALESCE(SUM(points), 0) AS points, COUNT(*) AS events
         FROM activity_events WHERE student_id = ?
         GROUP BY kind ORDER BY points DESC, kind",
    )
    .bind(student_id)
    .fetch_all(pool)
    .await
}

/// 全部徽章，已获得的带有获得时间
pub async fn badge_catalog(
    pool: &SqlitePool,
    student_id: i64,
) -> Result<Vec<BadgeProgress>, sqlx::Error> {
    sqlx::query_as::<_, BadgeProgress>(
        "SELECT b.code, b.name, b.description, b.icon,
                sb.awarded_at IS NOT NULL AS earned, sb.awarded_at
         FROM badges b
         LEFT JOIN student_badges sb ON sb.badge_code = b.code AND sb.student_id = ?
         ORDER BY earned DESC, sb.awarded_at DESC, b.code",
    )
    .bind(student_id)
    .fetch_all(pool)
    .await
}

pub async fn query_leaderboard(
    pool: &SqlitePool,
    limit: i64,
    points_per_level: i64,
) -> Result<Vec<LeaderboardEntry>, sqlx::Error> {
    let rows: Vec<(i64, String, Option<String>, i64)> = sqlx::query_as(
        "SELECT s.id, s.name, s.avatar_url, SUM(a.points) AS total
         FROM students s
         JOIN activity_events a ON a.student_id = s.id
         WHERE s.role = 'student'
         GROUP BY s.id
         HAVING total > 0
         ORDER BY total DESC, s.id
         LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .enumerate()
        .map(|(index, (student_id, name, avatar_url, points))| LeaderboardEntry {
            rank: index + 1,
            student_id,
            name,
            avatar_url,
            points,
            level: level_for(points, points_per_level).level,
        })
        .collect())
}

/// 带缓存的排行榜，积分变化时由进度接口清除
pub async fn cached_leaderboard(
    pool: &SqlitePool,
    limit: i64,
    points_per_level: i64,
) -> Result<Vec<LeaderboardEntry>, sqlx::Error> {
    let limit = limit.clamp(1, MAX_LEADERBOARD_SIZE);
    let key = format!("{}{}", LEADERBOARD_PREFIX, limit);
    if let Some(hit) = get_from_cache::<Vec<LeaderboardEntry>>(&key) {
        return Ok(hit);
    }

    let board = track_db_query(
        "leaderboard",
        query_leaderboard(pool, limit, points_per_level),
    )
    .await?;
    set_to_cache(&key, board.clone(), None);
    Ok(board)
}

pub async fn streak(
    State(state): State<AppState>,
    student: AuthStudent,
) -> AppResult<impl IntoResponse> {
    Ok(ApiResponse::ok(state.engine().streak(student.id).await?))
}

pub async fn points(
    State(state): State<AppState>,
    student: AuthStudent,
) -> AppResult<impl IntoResponse> {
    let total = state.engine().total_points(student.id).await?;
    let breakdown = points_breakdown(&state.pool, student.id).await?;

    Ok(ApiResponse::ok(PointsSummary {
        total,
        level: level_for(total, state.config.gamification.points_per_level),
        breakdown,
    }))
}

pub async fn activity(
    State(state): State<AppState>,
    student: AuthStudent,
    Query(query): Query<ActivityQuery>,
) -> AppResult<impl IntoResponse> {
    let days = query
        .days
        .unwrap_or(DEFAULT_ACTIVITY_DAYS)
        .clamp(1, MAX_ACTIVITY_DAYS);
    let series = activity_series(&state.pool, student.id, Utc::now().date_naive(), days).await?;
    Ok(ApiResponse::ok(series))
}

pub async fn badges(
    State(state): State<AppState>,
    student: AuthStudent,
) -> AppResult<impl IntoResponse> {
    Ok(ApiResponse::ok(badge_catalog(&state.pool, student.id).await?))
}

pub async fn leaderboard(
    State(state): State<AppState>,
    _student: AuthStudent,
    Query(query): Query<LeaderboardQuery>,
) -> AppResult<impl IntoResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_LEADERBOARD_SIZE);
    let board = cached_leaderboard(
        &state.pool,
        limit,
        state.config.gamification.points_per_level,
    )
    .await?;
    Ok(ApiResponse::ok(board))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::learning::engine::record_activity;
    use crate::learning::engine::test_support::create_student;
    use crate::learning::points::ActivityKind;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        date(y, m, d).and_hms_opt(h, 0, 0).unwrap().and_utc()
    }

    #[test]
    fn days_are_zero_filled_oldest_first() {
        let events = vec![(at(2024, 3, 10, 8), 10), (at(2024, 3, 10, 23), 5), (at(2024, 3, 8, 1), 20)];
        let series = daily_activity(&events, date(2024, 3, 10), 4);

        assert_eq!(series.len(), 4);
        assert_eq!(series[0].date, date(2024, 3, 7));
        assert_eq!(series[0].events, 0);
        assert_eq!(series[1].points, 20);
        assert_eq!(series[2].events, 0);
        assert_eq!(series[3].points, 15);
        assert_eq!(series[3].events, 2);
    }

    #[test]
    fn events_outside_window_are_dropped() {
        let events = vec![(at(2024, 1, 1, 0), 99), (at(2024, 3, 11, 0), 99)];
        let series = daily_activity(&events, date(2024, 3, 10), 2);
        assert!(series.iter().all(|d| d.events == 0));
    }

    #[tokio::test]
    async fn leaderboard_ranks_by_points() {
        let pool = memory_pool().await;
        let low = create_student(&pool, "low@example.com", "student").await;
        let high = create_student(&pool, "high@example.com", "student").await;
        let idle = create_student(&pool, "idle@example.com", "student").await;
        let teacher = create_student(&pool, "t@example.com", "instructor").await;

        let mut conn = pool.acquire().await.unwrap();
        let now = Utc::now();
        for (student, points) in [(low, 10), (high, 300), (idle, 0), (teacher, 1000)] {
            record_activity(&mut conn, student, ActivityKind::LessonCompleted, points, now)
                .await
                .unwrap();
        }
        drop(conn);

        let board = query_leaderboard(&pool, 10, 250).await.unwrap();
        let ids: Vec<i64> = board.iter().map(|e| e.student_id).collect();
        assert_eq!(ids, vec![high, low]);
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[0].level, 2);
    }

    #[tokio::test]
    async fn badge_catalog_marks_earned() {
        let pool = memory_pool().await;
        let student = create_student(&pool, "b@example.com", "student").await;
        sqlx::query("INSERT INTO student_badges (student_id, badge_code, awarded_at) VALUES (?, 'first_lesson', ?)")
            .bind(student)
            .bind(Utc::now())
            .execute(&pool)
            .await
            .unwrap();

        let catalog = badge_catalog(&pool, student).await.unwrap();
        assert_eq!(catalog.len(), 9);
        assert_eq!(catalog[0].code, "first_lesson");
        assert!(catalog[0].earned);
        assert_eq!(catalog.iter().filter(|b| b.earned).count(), 1);
    }

    #[tokio::test]
    async fn activity_series_reads_recent_events() {
        let pool = memory_pool().await;
        let student = create_student(&pool, "s@example.com", "student").await;
        let now = Utc::now();
        let mut conn = pool.acquire().await.unwrap();
        record_activity(&mut conn, student, ActivityKind::Login, 0, now)
            .await
            .unwrap();
        record_activity(&mut conn, student, ActivityKind::LessonCompleted, 10, now - Duration::days(40))
            .await
            .unwrap();
        drop(conn);

        let series = activity_series(&pool, student, now.date_naive(), 30)
            .await
            .unwrap();
        assert_eq!(series.len(), 30);
        assert_eq!(series.iter().map(|d| d.events).sum::<i64>(), 1);
        assert_eq!(series[29].events, 1);
    }
}
