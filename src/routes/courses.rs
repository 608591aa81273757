//! 课程目录与讲师编辑接口

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::time::Duration;
use validator::Validate;

use crate::app::AppState;
use crate::auth::{Instructor, MaybeStudent};
use crate::error::{ApiResponse, AppError, AppResult};
use crate::helpers::cache::{get_from_cache, invalidate_prefix, set_to_cache, CATALOG_PREFIX};
use crate::helpers::monitoring::track_db_query;
use crate::helpers::pagination::{PageQuery, Paginated};
use crate::learning::engine::{find_enrollment, Enrollment, EnrollmentStatus};
use crate::learning::grading::{validate_questions, PublicQuestion, QuizQuestion};
use crate::learning::points::progress_percent;
use crate::security::validate_input;

pub const DIFFICULTIES: &[&str] = &["beginner", "intermediate", "advanced"];
const CATEGORIES_KEY: &str = "catalog:categories";
const CATALOG_TTL: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Course {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub category: String,
    pub difficulty: String,
    pub is_published: bool,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 目录列表中的课程
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CourseSummary {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub category: String,
    pub difficulty: String,
    pub created_at: DateTime<Utc>,
    pub lessons_count: i64,
    pub enrolled_count: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Lesson {
    pub id: i64,
    pub course_id: i64,
    pub title: String,
    pub content: String,
    pub position: i64,
    pub duration_minutes: i64,
    pub points: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct QuizSummary {
    pub id: i64,
    pub title: String,
    pub passing_score: i64,
    pub max_attempts: Option<i64>,
    pub questions: Vec<PublicQuestion>,
}

#[derive(Debug, Serialize)]
pub struct CourseDetail {
    pub course: Course,
    pub lessons: Vec<Lesson>,
    pub quizzes: Vec<QuizSummary>,
    /// 当前登录学生的选课记录
    pub enrollment: Option<Enrollment>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CategoryCount {
    pub category: String,
    pub courses: i64,
}

#[derive(Debug, Serialize)]
pub struct QuizDetail {
    pub id: i64,
    pub course_id: i64,
    pub title: String,
    pub passing_score: i64,
    pub max_attempts: Option<i64>,
    pub questions: Vec<QuizQuestion>,
}

#[derive(Debug, Serialize)]
pub struct CourseAnalytics {
    pub course_id: i64,
    pub enrolled: i64,
    pub completed: i64,
    pub completion_rate: f64,
    pub average_progress: f64,
    pub average_quiz_percentage: Option<f64>,
}

/// 目录查询参数
///
/// 分页字段直接展开在这里，serde 的 flatten 无法从查询字符串解析数字
#[derive(Debug, Default, Clone, Deserialize)]
pub struct CatalogQuery {
    pub q: Option<String>,
    pub category: Option<String>,
    pub difficulty: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl CatalogQuery {
    fn page(&self) -> PageQuery {
        PageQuery {
            page: self.page,
            per_page: self.per_page,
        }
    }

    fn search(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }

    fn cache_key(&self) -> String {
        let page = self.page();
        format!(
            "{}list:{}|{}|{}|{}|{}",
            CATALOG_PREFIX,
            self.search().unwrap_or_default(),
            self.category.as_deref().unwrap_or_default(),
            self.difficulty.as_deref().unwrap_or_default(),
            page.get_page(),
            page.get_per_page()
        )
    }

    fn push_filters(&self, builder: &mut QueryBuilder<'_, Sqlite>) {
        builder.push(" FROM courses c WHERE c.is_published = 1");
        if let Some(q) = self.search() {
            let pattern = format!("%{}%", q);
            builder
                .push(" AND (c.title LIKE ")
                .push_bind(pattern.clone())
                .push(" OR c.description LIKE ")
                .push_bind(pattern)
                .push(")");
        }
        if let Some(category) = self.category.as_deref().filter(|c| !c.is_empty()) {
            builder.push(" AND c.category = ").push_bind(category.to_string());
        }
        if let Some(difficulty) = self.difficulty.as_deref().filter(|d| !d.is_empty()) {
            builder
                .push(" AND c.difficulty = ")
                .push_bind(difficulty.to_string());
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCourseRequest {
    #[validate(length(min = 1, max = 200, message = "标题长度需在 1 到 200 之间"))]
    pub title: String,
    #[validate(length(max = 5000, message = "描述不能超过 5000 字"))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 50, message = "分类长度需在 1 到 50 之间"))]
    pub category: String,
    pub difficulty: Option<String>,
    #[serde(default)]
    pub is_published: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCourseRequest {
    #[validate(length(min = 1, max = 200, message = "标题长度需在 1 到 200 之间"))]
    pub title: Option<String>,
    #[validate(length(max = 5000, message = "描述不能超过 5000 字"))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 50, message = "分类长度需在 1 到 50 之间"))]
    pub category: Option<String>,
    pub difficulty: Option<String>,
    pub is_published: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LessonRequest {
    #[validate(length(min = 1, max = 200, message = "标题长度需在 1 到 200 之间"))]
    pub title: String,
    pub content: Option<String>,
    #[validate(range(min = 0, max = 1440, message = "时长需在 0 到 1440 分钟之间"))]
    pub duration_minutes: Option<i64>,
    #[validate(range(min = 0, max = 1000, message = "积分需在 0 到 1000 之间"))]
    pub points: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateLessonRequest {
    #[validate(length(min = 1, max = 200, message = "标题长度需在 1 到 200 之间"))]
    pub title: Option<String>,
    pub content: Option<String>,
    #[validate(range(min = 0, max = 1440, message = "时长需在 0 到 1440 分钟之间"))]
    pub duration_minutes: Option<i64>,
    #[validate(range(min = 0, max = 1000, message = "积分需在 0 到 1000 之间"))]
    pub points: Option<i64>,
    #[validate(range(min = 1, message = "位置从 1 开始"))]
    pub position: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuizRequest {
    #[validate(length(min = 1, max = 200, message = "标题长度需在 1 到 200 之间"))]
    pub title: String,
    #[validate(range(min = 0, max = 100, message = "及格线需在 0 到 100 之间"))]
    pub passing_score: Option<i64>,
    #[validate(range(min = 1, message = "最多提交次数至少为 1"))]
    pub max_attempts: Option<i64>,
    pub questions: Vec<QuizQuestion>,
}

fn check_difficulty(difficulty: Option<&str>) -> AppResult<()> {
    match difficulty {
        Some(d) if !DIFFICULTIES.contains(&d) => Err(AppError::Validation(format!(
            "难度必须是 {} 之一",
            DIFFICULTIES.join(", ")
        ))),
        _ => Ok(()),
    }
}

/// 课程内容变化后清空目录缓存
fn invalidate_catalog() {
    let removed = invalidate_prefix(CATALOG_PREFIX);
    tracing::debug!("课程目录变更，清除 {} 个缓存项", removed);
}

/// 查询已发布课程，首页和目录接口共用
pub async fn query_catalog(
    pool: &SqlitePool,
    filter: &CatalogQuery,
) -> Result<Paginated<CourseSummary>, sqlx::Error> {
    let page = filter.page();

    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*)");
    filter.push_filters(&mut count);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let mut select = QueryBuilder::<Sqlite>::new(
        "SELECT c.id, c.title, c.description, c.category, c.difficulty, c.created_at,
            (SELECT COUNT(*) FROM lessons l WHERE l.course_id = c.id) AS lessons_count,
            (SELECT COUNT(*) FROM enrollments e WHERE e.course_id = c.id) AS enrolled_count",
    );
    filter.push_filters(&mut select);
    select
        .push(" ORDER BY c.created_at DESC, c.id DESC LIMIT ")
        .push_bind(page.get_per_page())
        .push(" OFFSET ")
        .push_bind(page.get_offset());

    let items = select
        .build_query_as::<CourseSummary>()
        .fetch_all(pool)
        .await?;

    Ok(page.paginate(items, total))
}

/// 带缓存的目录查询
pub async fn cached_catalog(
    pool: &SqlitePool,
    filter: &CatalogQuery,
) -> Result<Paginated<CourseSummary>, sqlx::Error> {
    let key = filter.cache_key();
    if let Some(hit) = get_from_cache::<Paginated<CourseSummary>>(&key) {
        return Ok(hit);
    }

    let result = track_db_query("list_courses", query_catalog(pool, filter)).await?;
    set_to_cache(&key, result.clone(), Some(CATALOG_TTL));
    Ok(result)
}

pub async fn load_categories(pool: &SqlitePool) -> Result<Vec<CategoryCount>, sqlx::Error> {
    if let Some(hit) = get_from_cache::<Vec<CategoryCount>>(CATEGORIES_KEY) {
        return Ok(hit);
    }

    let categories = sqlx::query_as::<_, CategoryCount>(
        "SELECT category, COUNT(*) AS courses FROM courses
         WHERE is_published = 1 GROUP BY category ORDER BY category",
    )
    .fetch_all(pool)
    .await?;

    set_to_cache(CATEGORIES_KEY, categories.clone(), Some(CATALOG_TTL));
    Ok(categories)
}

async fn fetch_course(pool: &SqlitePool, course_id: i64) -> AppResult<Course> {
    sqlx::query_as::<_, Course>(
        "SELECT id, title, description, category, difficulty, is_published, created_by, created_at, updated_at
         FROM courses WHERE id = ?",
    )
    .bind(course_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("课程"))
}

async fn fetch_lesson(pool: &SqlitePool, lesson_id: i64) -> AppResult<Lesson> {
    sqlx::query_as::<_, Lesson>(
        "SELECT id, course_id, title, content, position, duration_minutes, points, created_at
         FROM lessons WHERE id = ?",
    )
    .bind(lesson_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("课时"))
}

pub async fn list_courses(
    State(state): State<AppState>,
    Query(filter): Query<CatalogQuery>,
) -> AppResult<impl IntoResponse> {
    check_difficulty(filter.difficulty.as_deref().filter(|d| !d.is_empty()))?;
    Ok(ApiResponse::ok(cached_catalog(&state.pool, &filter).await?))
}

pub async fn categories(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    Ok(ApiResponse::ok(load_categories(&state.pool).await?))
}

pub async fn get_course(
    State(state): State<AppState>,
    MaybeStudent(viewer): MaybeStudent,
    Path(course_id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let course = fetch_course(&state.pool, course_id).await?;

    // 未发布的课程只对讲师可见
    let is_instructor = viewer.as_ref().is_some_and(|s| s.is_instructor());
    if !course.is_published && !is_instructor {
        return Err(AppError::NotFound("课程"));
    }

    let lessons = sqlx::query_as::<_, Lesson>(
        "SELECT id, course_id, title, content, position, duration_minutes, points, created_at
         FROM lessons WHERE course_id = ? ORDER BY position, id",
    )
    .bind(course_id)
    .fetch_all(&state.pool)
    .await?;

    let quiz_rows: Vec<(i64, String, i64, Option<i64>, String)> = sqlx::query_as(
        "SELECT id, title, passing_score, max_attempts, questions FROM quizzes WHERE course_id = ? ORDER BY id",
    )
    .bind(course_id)
    .fetch_all(&state.pool)
    .await?;

    let mut quizzes = Vec::with_capacity(quiz_rows.len());
    for (id, title, passing_score, max_attempts, raw) in quiz_rows {
        let questions: Vec<QuizQuestion> = serde_json::from_str(&raw)
            .map_err(|e| AppError::Internal(format!("测验 {id} 题目数据损坏: {e}")))?;
        quizzes.push(QuizSummary {
            id,
            title,
            passing_score,
            max_attempts,
            questions: questions.iter().map(PublicQuestion::from).collect(),
        });
    }

    let enrollment = match &viewer {
        Some(student) => {
            let mut conn = state.pool.acquire().await?;
            find_enrollment(&mut conn, student.id, course_id).await?
        }
        None => None,
    };

    Ok(ApiResponse::ok(CourseDetail {
        course,
        lessons,
        quizzes,
        enrollment,
    }))
}

pub async fn create_course(
    State(state): State<AppState>,
    Instructor(instructor): Instructor,
    Json(req): Json<CreateCourseRequest>,
) -> AppResult<impl IntoResponse> {
    validate_input(&req)?;
    check_difficulty(req.difficulty.as_deref())?;

    let now = Utc::now();
    let course = sqlx::query_as::<_, Course>(
        "INSERT INTO courses (title, description, category, difficulty, is_published, created_by, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)
         RETURNING id, title, description, category, difficulty, is_published, created_by, created_at, updated_at",
    )
    .bind(req.title.trim())
    .bind(req.description.as_deref().unwrap_or_default())
    .bind(req.category.trim())
    .bind(req.difficulty.as_deref().unwrap_or("beginner"))
    .bind(req.is_published)
    .bind(instructor.id)
    .bind(now)
    .bind(now)
    .fetch_one(&state.pool)
    .await?;

    invalidate_catalog();
    tracing::info!("讲师 {} 创建课程 {}《{}》", instructor.id, course.id, course.title);
    Ok((StatusCode::CREATED, ApiResponse::ok(course)))
}

pub async fn update_course(
    State(state): State<AppState>,
    Instructor(instructor): Instructor,
    Path(course_id): Path<i64>,
    Json(req): Json<UpdateCourseRequest>,
) -> AppResult<impl IntoResponse> {
    validate_input(&req)?;
    check_difficulty(req.difficulty.as_deref())?;

    let course = sqlx::query_as::<_, Course>(
        "UPDATE courses SET
            title = COALESCE(?, title),
            description = COALESCE(?, description),
            category = COALESCE(?, category),
            difficulty = COALESCE(?, difficulty),
            is_published = COALESCE(?, is_published),
            updated_at = ?
         WHERE id = ?
         RETURNING id, title, description, category, difficulty, is_published, created_by, created_at, updated_at",
    )
    .bind(req.title.as_deref().map(str::trim))
    .bind(req.description.as_deref())
    .bind(req.category.as_deref().map(str::trim))
    .bind(req.difficulty.as_deref())
    .bind(req.is_published)
    .bind(Utc::now())
    .bind(course_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::NotFound("课程"))?;

    invalidate_catalog();
    tracing::info!("讲师 {} 更新课程 {}", instructor.id, course_id);
    Ok(ApiResponse::ok(course))
}

pub async fn delete_course(
    State(state): State<AppState>,
    Instructor(instructor): Instructor,
    Path(course_id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let deleted = sqlx::query("DELETE FROM courses WHERE id = ?")
        .bind(course_id)
        .execute(&state.pool)
        .await?
        .rows_affected();

    if deleted == 0 {
        return Err(AppError::NotFound("课程"));
    }

    invalidate_catalog();
    tracing::info!("讲师 {} 删除课程 {}", instructor.id, course_id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_lesson(
    State(state): State<AppState>,
    Instructor(instructor): Instructor,
    Path(course_id): Path<i64>,
    Json(req): Json<LessonRequest>,
) -> AppResult<impl IntoResponse> {
    validate_input(&req)?;
    fetch_course(&state.pool, course_id).await?;

    let lesson = sqlx::query_as::<_, Lesson>(
        "INSERT INTO lessons (course_id, title, content, position, duration_minutes, points, created_at)
         VALUES (?, ?, ?, (SELECT COALESCE(MAX(position), 0) + 1 FROM lessons WHERE course_id = ?), ?, ?, ?)
         RETURNING id, course_id, title, content, position, duration_minutes, points, created_at",
    )
    .bind(course_id)
    .bind(req.title.trim())
    .bind(req.content.as_deref().unwrap_or_default())
    .bind(course_id)
    .bind(req.duration_minutes.unwrap_or(0))
    .bind(req.points.unwrap_or(state.config.gamification.lesson_points))
    .bind(Utc::now())
    .fetch_one(&state.pool)
    .await?;

    invalidate_catalog();
    tracing::info!(
        "讲师 {} 为课程 {} 添加第 {} 课时",
        instructor.id,
        course_id,
        lesson.position
    );
    Ok((StatusCode::CREATED, ApiResponse::ok(lesson)))
}

pub async fn update_lesson(
    State(state): State<AppState>,
    Instructor(_): Instructor,
    Path(lesson_id): Path<i64>,
    Json(req): Json<UpdateLessonRequest>,
) -> AppResult<impl IntoResponse> {
    validate_input(&req)?;

    let updated = sqlx::query(
        "UPDATE lessons SET
            title = COALESCE(?, title),
            content = COALESCE(?, content),
            duration_minutes = COALESCE(?, duration_minutes),
            points = COALESCE(?, points),
            position = COALESCE(?, position)
         WHERE id = ?",
    )
    .bind(req.title.as_deref().map(str::trim))
    .bind(req.content.as_deref())
    .bind(req.duration_minutes)
    .bind(req.points)
    .bind(req.position)
    .bind(lesson_id)
    .execute(&state.pool)
    .await?
    .rows_affected();

    if updated == 0 {
        return Err(AppError::NotFound("课时"));
    }

    invalidate_catalog();
    Ok(ApiResponse::ok(fetch_lesson(&state.pool, lesson_id).await?))
}

pub async fn delete_lesson(
    State(state): State<AppState>,
    Instructor(instructor): Instructor,
    Path(lesson_id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let deleted = sqlx::query("DELETE FROM lessons WHERE id = ?")
        .bind(lesson_id)
        .execute(&state.pool)
        .await?
        .rows_affected();

    if deleted == 0 {
        return Err(AppError::NotFound("课时"));
    }

    invalidate_catalog();
    tracing::info!("讲师 {} 删除课时 {}", instructor.id, lesson_id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_quiz(
    State(state): State<AppState>,
    Instructor(instructor): Instructor,
    Path(course_id): Path<i64>,
    Json(req): Json<CreateQuizRequest>,
) -> AppResult<impl IntoResponse> {
    validate_input(&req)?;
    validate_questions(&req.questions).map_err(AppError::Validation)?;
    fetch_course(&state.pool, course_id).await?;

    let passing_score = req.passing_score.unwrap_or(70);
    let raw = serde_json::to_string(&req.questions)
        .map_err(|e| AppError::Internal(format!("序列化题目失败: {e}")))?;

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO quizzes (course_id, title, passing_score, max_attempts, questions, created_at)
         VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(course_id)
    .bind(req.title.trim())
    .bind(passing_score)
    .bind(req.max_attempts)
    .bind(&raw)
    .bind(Utc::now())
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(
        "讲师 {} 为课程 {} 创建测验 {}，共 {} 题",
        instructor.id,
        course_id,
        id,
        req.questions.len()
    );

    Ok((
        StatusCode::CREATED,
        ApiResponse::ok(QuizDetail {
            id,
            course_id,
            title: req.title.trim().to_string(),
            passing_score,
            max_attempts: req.max_attempts,
            questions: req.questions,
        }),
    ))
}

/// 选课人数、结课人数和平均进度
fn enrollment_stats(rows: &[(String, i64)], lessons_total: i64) -> (i64, i64, f64) {
    let enrolled = rows.len() as i64;
    if enrolled == 0 {
        return (0, 0, 0.0);
    }

    let mut completed = 0;
    let mut progress_sum = 0;
    for (status, lessons_completed) in rows {
        if EnrollmentStatus::from(status.as_str()) == EnrollmentStatus::Completed {
            completed += 1;
            progress_sum += 100;
        } else {
            progress_sum += progress_percent(*lessons_completed, lessons_total);
        }
    }
    (enrolled, completed, progress_sum as f64 / enrolled as f64)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub async fn course_analytics(
    State(state): State<AppState>,
    Instructor(_): Instructor,
    Path(course_id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    fetch_course(&state.pool, course_id).await?;

    let lessons_total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lessons WHERE course_id = ?")
        .bind(course_id)
        .fetch_one(&state.pool)
        .await?;

    // 未结课的进度按当前课时数实时计算，和“我的课程”保持一致
    let rows: Vec<(String, i64)> = track_db_query(
        "course_enrollment_stats",
        sqlx::query_as(
            "SELECT e.status,
                    (SELECT COUNT(*) FROM lesson_completions lc
                      JOIN lessons l ON l.id = lc.lesson_id
                      WHERE lc.student_id = e.student_id AND l.course_id = e.course_id)
             FROM enrollments e WHERE e.course_id = ?",
        )
        .bind(course_id)
        .fetch_all(&state.pool),
    )
    .await?;

    let (enrolled, completed, average_progress) = enrollment_stats(&rows, lessons_total);

    let average_quiz_percentage: Option<f64> = track_db_query(
        "course_quiz_stats",
        sqlx::query_scalar(
            "SELECT AVG(best) FROM (
                SELECT MAX(qa.percentage) AS best FROM quiz_attempts qa
                JOIN quizzes q ON q.id = qa.quiz_id
                WHERE q.course_id = ?
                GROUP BY qa.student_id, qa.quiz_id
             )",
        )
        .bind(course_id)
        .fetch_one(&state.pool),
    )
    .await?;

    let completion_rate = if enrolled > 0 {
        round1(completed as f64 * 100.0 / enrolled as f64)
    } else {
        0.0
    };

    Ok(ApiResponse::ok(CourseAnalytics {
        course_id,
        enrolled,
        completed,
        completion_rate,
        average_progress: round1(average_progress),
        average_quiz_percentage: average_quiz_percentage.map(round1),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::learning::engine::test_support::create_course;

    #[test]
    fn difficulty_must_be_known() {
        assert!(check_difficulty(None).is_ok());
        assert!(check_difficulty(Some("advanced")).is_ok());
        assert!(matches!(
            check_difficulty(Some("expert")),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn cache_key_normalises_paging() {
        let a = CatalogQuery {
            q: Some("  rust ".into()),
            ..Default::default()
        };
        let b = CatalogQuery {
            q: Some("rust".into()),
            page: Some(0),
            per_page: Some(12),
            ..Default::default()
        };
        assert_eq!(a.cache_key(), b.cache_key());
        assert!(a.cache_key().starts_with(CATALOG_PREFIX));
    }

    #[test]
    fn enrollment_stats_use_current_lesson_count() {
        // 一人完成 1/4，一人已结课
        let rows = vec![
            ("in_progress".to_string(), 1),
            ("completed".to_string(), 2),
        ];
        let (enrolled, completed, average) = enrollment_stats(&rows, 4);
        assert_eq!(enrolled, 2);
        assert_eq!(completed, 1);
        assert_eq!(round1(average), 62.5);

        assert_eq!(enrollment_stats(&[], 4), (0, 0, 0.0));
    }

    #[tokio::test]
    async fn catalog_hides_unpublished_and_filters() {
        let pool = memory_pool().await;
        let (published, _) = create_course(&pool, 2).await;
        let (hidden, _) = create_course(&pool, 1).await;
        sqlx::query("UPDATE courses SET is_published = 0 WHERE id = ?")
            .bind(hidden)
            .execute(&pool)
            .await
            .unwrap();

        let all = query_catalog(&pool, &CatalogQuery::default()).await.unwrap();
        assert_eq!(all.pagination.total, 1);
        assert_eq!(all.items[0].id, published);
        assert_eq!(all.items[0].lessons_count, 2);

        let by_category = CatalogQuery {
            category: Some("nothing".into()),
            ..Default::default()
        };
        let none = query_catalog(&pool, &by_category).await.unwrap();
        assert!(none.items.is_empty());

        let search = CatalogQuery {
            q: Some("测试".into()),
            ..Default::default()
        };
        assert_eq!(query_catalog(&pool, &search).await.unwrap().items.len(), 1);
    }

    #[tokio::test]
    async fn catalog_pages_results() {
        let pool = memory_pool().await;
        for _ in 0..5 {
            create_course(&pool, 0).await;
        }
        let filter = CatalogQuery {
            page: Some(2),
            per_page: Some(2),
            ..Default::default()
        };
        let page = query_catalog(&pool, &filter).await.unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.pagination.total, 5);
        assert_eq!(page.pagination.total_pages, 3);
        assert!(page.pagination.has_next);
    }
}
