//! 学习进度引擎
//!
//! 课时完成、测验提交、选课等会改变积分的操作都经过这里，
//! 在同一个事务中更新进度、记录学习行为、结课发证和发放徽章。

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashMap;

use crate::config::GamificationConfig;
use crate::error::{AppError, AppResult};
use crate::learning::badges::{self, BadgeStats};
use crate::learning::grading::{self, AnswerResult, QuizQuestion};
use crate::learning::points::{progress_percent, ActivityKind};
use crate::learning::streak::{compute_streak, StreakSummary};
use crate::security::generate_token;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    InProgress,
    Completed,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

impl From<&str> for EnrollmentStatus {
    fn from(s: &str) -> Self {
        match s {
            "completed" => Self::Completed,
            _ => Self::InProgress,
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Enrollment {
    pub id: i64,
    pub student_id: i64,
    pub course_id: i64,
    pub status: String,
    pub progress: i64,
    pub enrolled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_accessed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Badge {
    pub code: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub awarded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CourseState {
    pub course_id: i64,
    pub progress: i64,
    pub lessons_completed: i64,
    pub lessons_total: i64,
    pub course_completed: bool,
    pub certificate_code: Option<String>,
    /// 本次完成课程时发放的奖励积分
    pub bonus_awarded: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LessonCompletion {
    pub lesson_id: i64,
    pub already_completed: bool,
    pub points_awarded: i64,
    pub course: CourseState,
    pub new_badges: Vec<Badge>,
}

impl LessonCompletion {
    /// 本次操作写入的全部积分，包括课程完成奖励
    pub fn points_earned(&self) -> i64 {
        self.points_awarded + self.course.bonus_awarded
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QuizSubmissionResult {
    pub quiz_id: i64,
    pub attempt_number: i64,
    pub score: i64,
    pub max_score: i64,
    pub percentage: f64,
    pub passed: bool,
    pub perfect: bool,
    pub points_awarded: i64,
    pub answers_breakdown: Vec<AnswerResult>,
    pub course: CourseState,
    pub new_badges: Vec<Badge>,
}

impl QuizSubmissionResult {
    pub fn points_earned(&self) -> i64 {
        self.points_awarded + self.course.bonus_awarded
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct LessonRow {
    id: i64,
    course_id: i64,
    title: String,
    points: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct QuizRow {
    pub id: i64,
    pub course_id: i64,
    pub title: String,
    pub passing_score: i64,
    pub max_attempts: Option<i64>,
    pub questions: String,
}

impl QuizRow {
    pub fn parsed_questions(&self) -> AppResult<Vec<QuizQuestion>> {
        serde_json::from_str(&self.questions)
            .map_err(|e| AppError::Internal(format!("测验 {} 题目数据损坏: {e}", self.id)))
    }
}

pub struct LearnEngine {
    pool: SqlitePool,
    rules: GamificationConfig,
}

impl LearnEngine {
    pub fn new(pool: SqlitePool, rules: GamificationConfig) -> Self {
        Self { pool, rules }
    }

    // ----- Enrollment -----

    /// 选课，重复选课返回已有记录，第二个返回值表示是否新建
    pub async fn enroll(&self, student_id: i64, course_id: i64) -> AppResult<(Enrollment, bool)> {
        let mut tx = self.pool.begin().await?;

        let title: Option<String> =
            sqlx::query_scalar("SELECT title FROM courses WHERE id = ? AND is_published = 1")
                .bind(course_id)
                .fetch_optional(&mut *tx)
                .await?;
        let title = title.ok_or(AppError::NotFound("课程"))?;

        if let Some(existing) = find_enrollment(&mut tx, student_id, course_id).await? {
            tx.commit().await?;
            return Ok((existing, false));
        }

        let now = Utc::now();
        let enrollment = sqlx::query_as::<_, Enrollment>(
            "INSERT INTO enrollments (student_id, course_id, status, progress, enrolled_at, last_accessed_at)
             VALUES (?, ?, 'in_progress', 0, ?, ?)
             RETURNING id, student_id, course_id, status, progress, enrolled_at, completed_at, last_accessed_at",
        )
        .bind(student_id)
        .bind(course_id)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        record_activity(&mut tx, student_id, ActivityKind::Enroll, 0, now).await?;
        notify(
            &mut tx,
            student_id,
            "enrollment",
            &format!("已加入课程《{}》", title),
        )
        .await?;

        tx.commit().await?;
        tracing::info!("学生 {} 选修课程 {}", student_id, course_id);
        Ok((enrollment, true))
    }

    /// 退课，同时清除该课程的课时完成记录
    pub async fn unenroll(&self, student_id: i64, course_id: i64) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM enrollments WHERE student_id = ? AND course_id = ?")
            .bind(student_id)
            .bind(course_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if deleted == 0 {
            return Err(AppError::NotFound("选课记录"));
        }

        sqlx::query("DELETE FROM lesson_completions WHERE student_id = ? AND course_id = ?")
            .bind(student_id)
            .bind(course_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!("学生 {} 退出课程 {}", student_id, course_id);
        Ok(())
    }

    // ----- Progress -----

    pub async fn complete_lesson(
        &self,
        student_id: i64,
        lesson_id: i64,
    ) -> AppResult<LessonCompletion> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let lesson = sqlx::query_as::<_, LessonRow>(
            "SELECT id, course_id, title, points FROM lessons WHERE id = ?",
        )
        .bind(lesson_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("课时"))?;

        require_enrollment(&mut tx, student_id, lesson.course_id).await?;

        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO lesson_completions (student_id, lesson_id, course_id, completed_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(student_id)
        .bind(lesson.id)
        .bind(lesson.course_id)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let already_completed = inserted == 0;
        let points_awarded = if already_completed { 0 } else { lesson.points };

        if !already_completed {
            record_activity(
                &mut tx,
                student_id,
                ActivityKind::LessonCompleted,
                points_awarded,
                now,
            )
            .await?;
        }

        touch_enrollment(&mut tx, student_id, lesson.course_id, now).await?;
        let course = self
            .refresh_course(&mut tx, student_id, lesson.course_id, now)
            .await?;
        let new_badges = award_badges(&mut tx, student_id, now).await?;

        tx.commit().await?;

        if !already_completed {
            tracing::info!(
                "学生 {} 完成课时 {}《{}》，获得 {} 积分",
                student_id,
                lesson.id,
                lesson.title,
                points_awarded
            );
        }

        Ok(LessonCompletion {
            lesson_id: lesson.id,
            already_completed,
            points_awarded,
            course,
            new_badges,
        })
    }

    /// 提交测验。只有第一次通过时发放积分（题目得分加通过奖励）
    pub async fn submit_quiz(
        &self,
        student_id: i64,
        quiz_id: i64,
        answers: &HashMap<String, Vec<usize>>,
    ) -> AppResult<QuizSubmissionResult> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let quiz = fetch_quiz(&mut tx, quiz_id).await?;
        require_enrollment(&mut tx, student_id, quiz.course_id).await?;

        let (attempts, passed_before): (i64, bool) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(MAX(passed), 0) FROM quiz_attempts WHERE student_id = ? AND quiz_id = ?",
        )
        .bind(student_id)
        .bind(quiz_id)
        .fetch_one(&mut *tx)
        .await?;

        if let Some(max) = quiz.max_attempts {
            if attempts >= max {
                return Err(AppError::Conflict(format!(
                    "测验最多可提交 {} 次，已用完",
                    max
                )));
            }
        }

        let questions = quiz.parsed_questions()?;
        let outcome = grading::grade(&questions, answers, quiz.passing_score);
        let attempt_number = attempts + 1;

        sqlx::query(
            "INSERT INTO quiz_attempts (student_id, quiz_id, score, max_score, percentage, passed, attempt_number, submitted_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(student_id)
        .bind(quiz_id)
        .bind(outcome.score)
        .bind(outcome.max_score)
        .bind(outcome.percentage)
        .bind(outcome.passed)
        .bind(attempt_number)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let points_awarded = if outcome.passed && !passed_before {
            outcome.score + self.rules.quiz_pass_bonus
        } else {
            0
        };
        record_activity(
            &mut tx,
            student_id,
            ActivityKind::QuizSubmitted,
            points_awarded,
            now,
        )
        .await?;

        touch_enrollment(&mut tx, student_id, quiz.course_id, now).await?;
        let course = self
            .refresh_course(&mut tx, student_id, quiz.course_id, now)
            .await?;
        let new_badges = award_badges(&mut tx, student_id, now).await?;

        tx.commit().await?;

        tracing::info!(
            "学生 {} 第 {} 次提交测验 {}: {:.1}% ({})",
            student_id,
            attempt_number,
            quiz_id,
            outcome.percentage,
            if outcome.passed { "通过" } else { "未通过" }
        );

        Ok(QuizSubmissionResult {
            quiz_id,
            attempt_number,
            score: outcome.score,
            max_score: outcome.max_score,
            percentage: outcome.percentage,
            passed: outcome.passed,
            perfect: outcome.is_perfect(),
            points_awarded,
            answers_breakdown: outcome.breakdown,
            course,
            new_badges,
        })
    }

    /// 重新计算课程进度；全部课时完成且全部测验通过时结课
    async fn refresh_course(
        &self,
        conn: &mut SqliteConnection,
        student_id: i64,
        course_id: i64,
        now: DateTime<Utc>,
    ) -> AppResult<CourseState> {
        let lessons_total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM lessons WHERE course_id = ?")
                .bind(course_id)
                .fetch_one(&mut *conn)
                .await?;

        let lessons_completed: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM lesson_completions lc
             JOIN lessons l ON l.id = lc.lesson_id
             WHERE lc.student_id = ? AND l.course_id = ?",
        )
        .bind(student_id)
        .bind(course_id)
        .fetch_one(&mut *conn)
        .await?;

        let quizzes_total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM quizzes WHERE course_id = ?")
                .bind(course_id)
                .fetch_one(&mut *conn)
                .await?;

        let quizzes_passed: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT qa.quiz_id) FROM quiz_attempts qa
             JOIN quizzes q ON q.id = qa.quiz_id
             WHERE qa.student_id = ? AND q.course_id = ? AND qa.passed = 1",
        )
        .bind(student_id)
        .bind(course_id)
        .fetch_one(&mut *conn)
        .await?;

        let enrollment = find_enrollment(conn, student_id, course_id)
            .await?
            .ok_or(AppError::NotFound("选课记录"))?;
        let was_completed =
            EnrollmentStatus::from(enrollment.status.as_str()) == EnrollmentStatus::Completed;

        // 已完成的课程保持 100，不受之后新增课时影响
        let progress = if was_completed {
            100
        } else {
            progress_percent(lessons_completed, lessons_total)
        };
        let finished = lessons_total > 0
            && lessons_completed >= lessons_total
            && quizzes_passed >= quizzes_total;

        let mut state = CourseState {
            course_id,
            progress,
            lessons_completed,
            lessons_total,
            course_completed: was_completed,
            certificate_code: None,
            bonus_awarded: 0,
        };

        if was_completed {
            return Ok(state);
        }

        if !finished {
            sqlx::query("UPDATE enrollments SET progress = ? WHERE id = ?")
                .bind(progress)
                .bind(enrollment.id)
                .execute(&mut *conn)
                .await?;
            return Ok(state);
        }

        sqlx::query(
            "UPDATE enrollments SET status = 'completed', progress = 100, completed_at = ? WHERE id = ?",
        )
        .bind(now)
        .bind(enrollment.id)
        .execute(&mut *conn)
        .await?;

        record_activity(
            conn,
            student_id,
            ActivityKind::CourseCompleted,
            self.rules.course_completion_bonus,
            now,
        )
        .await?;

        // 证书分数取各测验最好成绩的平均值，没有测验时为 100
        let score: Option<f64> = sqlx::query_scalar(
            "SELECT AVG(best) FROM (
                SELECT MAX(qa.percentage) AS best FROM quiz_attempts qa
                JOIN quizzes q ON q.id = qa.quiz_id
                WHERE qa.student_id = ? AND q.course_id = ?
                GROUP BY qa.quiz_id
             )",
        )
        .bind(student_id)
        .bind(course_id)
        .fetch_one(&mut *conn)
        .await?;
        let score = score.map(|s| s.round() as i64).unwrap_or(100);

        let code = generate_token(16).to_uppercase();
        sqlx::query(
            "INSERT OR IGNORE INTO certificates (student_id, course_id, score, verification_code, issued_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(student_id)
        .bind(course_id)
        .bind(score)
        .bind(&code)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        let title: String = sqlx::query_scalar("SELECT title FROM courses WHERE id = ?")
            .bind(course_id)
            .fetch_one(&mut *conn)
            .await?;
        notify(
            conn,
            student_id,
            "course_completed",
            &format!("恭喜完成课程《{}》，证书编号 {}", title, code),
        )
        .await?;

        tracing::info!("学生 {} 完成课程 {}", student_id, course_id);

        state.progress = 100;
        state.course_completed = true;
        state.certificate_code = Some(code);
        state.bonus_awarded = self.rules.course_completion_bonus;
        Ok(state)
    }

    // ----- Analytics -----

    pub async fn streak(&self, student_id: i64) -> AppResult<StreakSummary> {
        let mut conn = self.pool.acquire().await?;
        streak_for(&mut conn, student_id, Utc::now().date_naive()).await
    }

    pub async fn total_points(&self, student_id: i64) -> AppResult<i64> {
        let mut conn = self.pool.acquire().await?;
        Ok(points_for(&mut conn, student_id).await?)
    }
}

/// 写入一条学习行为记录
pub async fn record_activity(
    conn: &mut SqliteConnection,
    student_id: i64,
    kind: ActivityKind,
    points: i64,
    at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO activity_events (student_id, kind, points, occurred_at) VALUES (?, ?, ?, ?)",
    )
    .bind(student_id)
    .bind(kind.as_str())
    .bind(points)
    .bind(at)
    .execute(conn)
    .await?;
    Ok(())
}

/// 写入站内通知
pub async fn notify(
    conn: &mut SqliteConnection,
    student_id: i64,
    kind: &str,
    message: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO notifications (student_id, kind, message, is_read, created_at) VALUES (?, ?, ?, 0, ?)",
    )
    .bind(student_id)
    .bind(kind)
    .bind(message)
    .bind(Utc::now())
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn points_for(conn: &mut SqliteConnection, student_id: i64) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COALESCE(SUM(points), 0) FROM activity_events WHERE student_id = ?")
        .bind(student_id)
        .fetch_one(conn)
        .await
}

/// 所有有学习记录的 UTC 日期
pub async fn activity_days(
    conn: &mut SqliteConnection,
    student_id: i64,
) -> Result<Vec<NaiveDate>, sqlx::Error> {
    let stamps: Vec<DateTime<Utc>> =
        sqlx::query_scalar("SELECT occurred_at FROM activity_events WHERE student_id = ?")
            .bind(student_id)
            .fetch_all(conn)
            .await?;
    Ok(stamps.into_iter().map(|t| t.date_naive()).collect())
}

pub async fn streak_for(
    conn: &mut SqliteConnection,
    student_id: i64,
    today: NaiveDate,
) -> AppResult<StreakSummary> {
    let days = activity_days(conn, student_id).await?;
    Ok(compute_streak(days, today))
}

/// 根据当前统计发放新徽章，并为每个徽章发送通知
pub async fn award_badges(
    conn: &mut SqliteConnection,
    student_id: i64,
    now: DateTime<Utc>,
) -> AppResult<Vec<Badge>> {
    let lessons_completed: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM lesson_completions WHERE student_id = ?")
            .bind(student_id)
            .fetch_one(&mut *conn)
            .await?;

    let courses_completed: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM enrollments WHERE student_id = ? AND status = 'completed'",
    )
    .bind(student_id)
    .fetch_one(&mut *conn)
    .await?;

    let perfect_quizzes: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM quiz_attempts WHERE student_id = ? AND max_score > 0 AND score = max_score",
    )
    .bind(student_id)
    .fetch_one(&mut *conn)
    .await?;

    let streak = streak_for(conn, student_id, now.date_naive()).await?;
    let total_points = points_for(conn, student_id).await?;

    let stats = BadgeStats {
        lessons_completed,
        courses_completed,
        perfect_quizzes,
        current_streak: streak.current,
        total_points,
    };

    let owned: Vec<String> =
        sqlx::query_scalar("SELECT badge_code FROM student_badges WHERE student_id = ?")
            .bind(student_id)
            .fetch_all(&mut *conn)
            .await?;

    let mut awarded = Vec::new();
    for code in badges::new_badges(&stats, &owned) {
        sqlx::query(
            "INSERT OR IGNORE INTO student_badges (student_id, badge_code, awarded_at) VALUES (?, ?, ?)",
        )
        .bind(student_id)
        .bind(code)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        let badge = sqlx::query_as::<_, Badge>(
            "SELECT b.code, b.name, b.description, b.icon, sb.awarded_at
             FROM badges b JOIN student_badges sb ON sb.badge_code = b.code
             WHERE sb.student_id = ? AND b.code = ?",
        )
        .bind(student_id)
        .bind(code)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(badge) = badge {
            notify(
                conn,
                student_id,
                "badge",
                &format!("获得徽章 {} {}", badge.icon, badge.name),
            )
            .await?;
            awarded.push(badge);
        } else {
            tracing::warn!("徽章 {} 不在徽章目录中", code);
        }
    }

    Ok(awarded)
}

pub async fn find_enrollment(
    conn: &mut SqliteConnection,
    student_id: i64,
    course_id: i64,
) -> Result<Option<Enrollment>, sqlx::Error> {
    sqlx::query_as::<_, Enrollment>(
        "SELECT id, student_id, course_id, status, progress, enrolled_at, completed_at, last_accessed_at
         FROM enrollments WHERE student_id = ? AND course_id = ?",
    )
    .bind(student_id)
    .bind(course_id)
    .fetch_optional(conn)
    .await
}

pub async fn fetch_quiz(conn: &mut SqliteConnection, quiz_id: i64) -> AppResult<QuizRow> {
    sqlx::query_as::<_, QuizRow>(
        "SELECT id, course_id, title, passing_score, max_attempts, questions FROM quizzes WHERE id = ?",
    )
    .bind(quiz_id)
    .fetch_optional(conn)
    .await?
    .ok_or(AppError::NotFound("测验"))
}

/// 未选课的学生不能提交进度
pub async fn require_enrollment(
    conn: &mut SqliteConnection,
    student_id: i64,
    course_id: i64,
) -> AppResult<Enrollment> {
    find_enrollment(conn, student_id, course_id)
        .await?
        .ok_or(AppError::Forbidden)
}

async fn touch_enrollment(
    conn: &mut SqliteConnection,
    student_id: i64,
    course_id: i64,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE enrollments SET last_accessed_at = ? WHERE student_id = ? AND course_id = ?")
        .bind(now)
        .bind(student_id)
        .bind(course_id)
        .execute(conn)
        .await?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::db::memory_pool;
    use chrono::Duration;

    fn engine(pool: &SqlitePool) -> LearnEngine {
        LearnEngine::new(pool.clone(), GamificationConfig::default())
    }

    #[tokio::test]
    async fn enroll_is_idempotent() {
        let pool = memory_pool().await;
        let student = create_student(&pool, "a@example.com", "student").await;
        let (course, _) = create_course(&pool, 2).await;
        let engine = engine(&pool);

        let (first, created) = engine.enroll(student, course).await.unwrap();
        assert!(created);
        let (second, created_again) = engine.enroll(student, course).await.unwrap();
        assert!(!created_again);
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn cannot_enroll_in_unpublished_course() {
        let pool = memory_pool().await;
        let student = create_student(&pool, "a@example.com", "student").await;
        let (course, _) = create_course(&pool, 1).await;
        sqlx::query("UPDATE courses SET is_published = 0 WHERE id = ?")
            .bind(course)
            .execute(&pool)
            .await
            .unwrap();

        let err = engine(&pool).enroll(student, course).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn lesson_requires_enrollment() {
        let pool = memory_pool().await;
        let student = create_student(&pool, "a@example.com", "student").await;
        let (_, lessons) = create_course(&pool, 1).await;

        let err = engine(&pool)
            .complete_lesson(student, lessons[0])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden));
    }

    #[tokio::test]
    async fn completing_a_lesson_twice_awards_points_once() {
        let pool = memory_pool().await;
        let student = create_student(&pool, "a@example.com", "student").await;
        let (course, lessons) = create_course(&pool, 3).await;
        let engine = engine(&pool);
        engine.enroll(student, course).await.unwrap();

        let first = engine.complete_lesson(student, lessons[0]).await.unwrap();
        assert_eq!(first.points_awarded, 10);
        assert_eq!(first.course.progress, 33);
        assert_eq!(first.new_badges.len(), 1);
        assert_eq!(first.new_badges[0].code, "first_lesson");

        let again = engine.complete_lesson(student, lessons[0]).await.unwrap();
        assert!(again.already_completed);
        assert_eq!(again.points_awarded, 0);
        assert!(again.new_badges.is_empty());
        assert_eq!(engine.total_points(student).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn finishing_all_lessons_completes_course_without_quiz() {
        let pool = memory_pool().await;
        let student = create_student(&pool, "a@example.com", "student").await;
        let (course, lessons) = create_course(&pool, 2).await;
        let engine = engine(&pool);
        engine.enroll(student, course).await.unwrap();

        engine.complete_lesson(student, lessons[0]).await.unwrap();
        let done = engine.complete_lesson(student, lessons[1]).await.unwrap();

        assert!(done.course.course_completed);
        assert_eq!(done.course.progress, 100);
        assert!(done.course.certificate_code.is_some());
        assert!(done.new_badges.iter().any(|b| b.code == "first_course"));

        // 两节课 20 分 + 结课奖励 100 分
        assert_eq!(engine.total_points(student).await.unwrap(), 120);

        let score: i64 = sqlx::query_scalar("SELECT score FROM certificates WHERE student_id = ?")
            .bind(student)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(score, 100);
    }

    #[tokio::test]
    async fn zero_point_lesson_still_reports_completion_bonus() {
        let pool = memory_pool().await;
        let student = create_student(&pool, "a@example.com", "student").await;
        let (course, lessons) = create_course(&pool, 1).await;
        sqlx::query("UPDATE lessons SET points = 0 WHERE id = ?")
            .bind(lessons[0])
            .execute(&pool)
            .await
            .unwrap();
        let engine = engine(&pool);
        engine.enroll(student, course).await.unwrap();

        let done = engine.complete_lesson(student, lessons[0]).await.unwrap();
        assert_eq!(done.points_awarded, 0);
        assert_eq!(done.course.bonus_awarded, 100);
        assert_eq!(done.points_earned(), 100);
        assert_eq!(engine.total_points(student).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn completed_course_stays_at_full_progress() {
        let pool = memory_pool().await;
        let student = create_student(&pool, "a@example.com", "student").await;
        let (course, lessons) = create_course(&pool, 1).await;
        let engine = engine(&pool);
        engine.enroll(student, course).await.unwrap();
        engine.complete_lesson(student, lessons[0]).await.unwrap();

        sqlx::query(
            "INSERT INTO lessons (course_id, title, position, points, created_at) VALUES (?, '新课时', 2, 10, ?)",
        )
        .bind(course)
        .bind(Utc::now())
        .execute(&pool)
        .await
        .unwrap();

        let again = engine.complete_lesson(student, lessons[0]).await.unwrap();
        assert!(again.course.course_completed);
        assert_eq!(again.course.progress, 100);
        assert_eq!(again.course.lessons_total, 2);
        assert_eq!(again.course.bonus_awarded, 0);
        assert_eq!(again.points_earned(), 0);
    }

    #[tokio::test]
    async fn course_with_quiz_needs_a_pass() {
        let pool = memory_pool().await;
        let student = create_student(&pool, "a@example.com", "student").await;
        let (course, lessons) = create_course(&pool, 1).await;
        let quiz = create_quiz(&pool, course, None).await;
        let engine = engine(&pool);
        engine.enroll(student, course).await.unwrap();

        let lesson = engine.complete_lesson(student, lessons[0]).await.unwrap();
        assert_eq!(lesson.course.progress, 100);
        assert!(!lesson.course.course_completed);

        let failed = engine
            .submit_quiz(student, quiz, &answers(&[("q1", 0), ("q2", 1)]))
            .await
            .unwrap();
        assert!(!failed.passed);
        assert_eq!(failed.points_awarded, 0);
        assert!(!failed.course.course_completed);

        let passed = engine
            .submit_quiz(student, quiz, &answers(&[("q1", 1), ("q2", 0)]))
            .await
            .unwrap();
        assert!(passed.passed);
        assert_eq!(passed.attempt_number, 2);
        // 题目得分 2 + 通过奖励 20
        assert_eq!(passed.points_awarded, 22);
        assert!(passed.course.course_completed);
        assert!(passed.new_badges.iter().any(|b| b.code == "quiz_ace"));

        let again = engine
            .submit_quiz(student, quiz, &answers(&[("q1", 1), ("q2", 0)]))
            .await
            .unwrap();
        assert_eq!(again.points_awarded, 0);
    }

    #[tokio::test]
    async fn quiz_attempt_limit_is_enforced() {
        let pool = memory_pool().await;
        let student = create_student(&pool, "a@example.com", "student").await;
        let (course, _) = create_course(&pool, 1).await;
        let quiz = create_quiz(&pool, course, Some(1)).await;
        let engine = engine(&pool);
        engine.enroll(student, course).await.unwrap();

        engine
            .submit_quiz(student, quiz, &answers(&[("q1", 0)]))
            .await
            .unwrap();
        let err = engine
            .submit_quiz(student, quiz, &answers(&[("q1", 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn unenroll_clears_completions() {
        let pool = memory_pool().await;
        let student = create_student(&pool, "a@example.com", "student").await;
        let (course, lessons) = create_course(&pool, 2).await;
        let engine = engine(&pool);
        engine.enroll(student, course).await.unwrap();
        engine.complete_lesson(student, lessons[0]).await.unwrap();

        engine.unenroll(student, course).await.unwrap();
        let remaining: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM lesson_completions WHERE student_id = ?")
                .bind(student)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(remaining, 0);

        assert!(matches!(
            engine.unenroll(student, course).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn streak_badges_follow_activity_log() {
        let pool = memory_pool().await;
        let student = create_student(&pool, "a@example.com", "student").await;
        let now = Utc::now();
        let mut conn = pool.acquire().await.unwrap();
        for days_ago in 0..3 {
            record_activity(
                &mut conn,
                student,
                ActivityKind::Login,
                0,
                now - Duration::days(days_ago),
            )
            .await
            .unwrap();
        }

        let streak = streak_for(&mut conn, student, now.date_naive())
            .await
            .unwrap();
        assert_eq!(streak.current, 3);

        let awarded = award_badges(&mut conn, student, now).await.unwrap();
        let codes: Vec<_> = awarded.iter().map(|b| b.code.as_str()).collect();
        assert_eq!(codes, vec!["streak_3"]);

        let unread: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE student_id = ? AND kind = 'badge'",
        )
        .bind(student)
        .fetch_one(&mut *conn)
        .await
        .unwrap();
        assert_eq!(unread, 1);
    }
}
