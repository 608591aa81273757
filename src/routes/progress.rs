//! 课时完成、测验与证书

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashMap;

use crate::app::AppState;
use crate::auth::AuthStudent;
use crate::error::{ApiResponse, AppResult};
use crate::helpers::cache::{invalidate_prefix, LEADERBOARD_PREFIX};
use crate::learning::engine::{fetch_quiz, require_enrollment};
use crate::learning::grading::PublicQuestion;

#[derive(Debug, Deserialize)]
pub struct SubmitQuizRequest {
    /// 题目 id 到所选选项下标
    pub answers: HashMap<String, Vec<usize>>,
}

#[derive(Debug, Serialize)]
pub struct QuizView {
    pub id: i64,
    pub course_id: i64,
    pub title: String,
    pub passing_score: i64,
    pub max_attempts: Option<i64>,
    pub questions: Vec<PublicQuestion>,
    pub attempts_used: i64,
    pub attempts_remaining: Option<i64>,
    pub best_percentage: Option<f64>,
    pub passed: bool,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Certificate {
    pub id: i64,
    pub course_id: i64,
    pub course_title: String,
    pub student_name: String,
    pub score: i64,
    pub verification_code: String,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CertificateVerification {
    pub is_valid: bool,
    pub certificate: Option<Certificate>,
    pub message: String,
}

const CERTIFICATE_SELECT: &str = "SELECT cert.id, cert.course_id, c.title AS course_title, s.name AS student_name,
        cert.score, cert.verification_code, cert.issued_at
     FROM certificates cert
     JOIN courses c ON c.id = cert.course_id
     JOIN students s ON s.id = cert.student_id";

pub async fn certificates_for(
    pool: &SqlitePool,
    student_id: i64,
) -> Result<Vec<Certificate>, sqlx::Error> {
    let sql = format!("{CERTIFICATE_SELECT} WHERE cert.student_id = ? ORDER BY cert.issued_at DESC");
    sqlx::query_as::<_, Certificate>(&sql)
        .bind(student_id)
        .fetch_all(pool)
        .await
}

pub async fn complete_lesson(
    State(state): State<AppState>,
    student: AuthStudent,
    Path(lesson_id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let result = state.engine().complete_lesson(student.id, lesson_id).await?;
    if result.points_earned() > 0 {
        invalidate_prefix(LEADERBOARD_PREFIX);
    }
    Ok(ApiResponse::ok(result))
}

pub async fn get_quiz(
    State(state): State<AppState>,
    student: AuthStudent,
    Path(quiz_id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let mut conn = state.pool.acquire().await?;
    let quiz = fetch_quiz(&mut conn, quiz_id).await?;
    require_enrollment(&mut conn, student.id, quiz.course_id).await?;

    let (attempts_used, best_percentage, passed): (i64, Option<f64>, bool) = sqlx::query_as(
        "SELECT COUNT(*), MAX(percentage), COALESCE(MAX(passed), 0)
         FROM quiz_attempts WHERE student_id = ? AND quiz_id = ?",
    )
    .bind(student.id)
    .bind(quiz_id)
    .fetch_one(&mut *conn)
    .await?;

    let questions = quiz.parsed_questions()?;

    Ok(ApiResponse::ok(QuizView {
        id: quiz.id,
        course_id: quiz.course_id,
        title: quiz.title,
        passing_score: quiz.passing_score,
        max_attempts: quiz.max_attempts,
        questions: questions.iter().map(PublicQuestion::from).collect(),
        attempts_used,
        attempts_remaining: quiz
            .max_attempts
            .map(|max| (max - attempts_used).max(0)),
        best_percentage,
        passed,
    }))
}

pub async fn submit_quiz(
    State(state): State<AppState>,
    student: AuthStudent,
    Path(quiz_id): Path<i64>,
    Json(req): Json<SubmitQuizRequest>,
) -> AppResult<impl IntoResponse> {
    let result = state
        .engine()
        .submit_quiz(student.id, quiz_id, &req.answers)
        .await?;
    if result.points_earned() > 0 {
        invalidate_prefix(LEADERBOARD_PREFIX);
    }
    Ok(ApiResponse::ok(result))
}

pub async fn my_certificates(
    State(state): State<AppState>,
    student: AuthStudent,
) -> AppResult<impl IntoResponse> {
    Ok(ApiResponse::ok(
        certificates_for(&state.pool, student.id).await?,
    ))
}

/// 公开的证书校验，不需要登录
pub async fn verify_certificate(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> AppResult<impl IntoResponse> {
    let code = code.trim().to_uppercase();

    let sql = format!("{CERTIFICATE_SELECT} WHERE cert.verification_code = ?");
    let certificate = sqlx::query_as::<_, Certificate>(&sql)
        .bind(&code)
        .fetch_optional(&state.pool)
        .await?;

    let verification = match certificate {
        Some(cert) => CertificateVerification {
            is_valid: true,
            message: format!("证书有效：{} 完成了《{}》", cert.student_name, cert.course_title),
            certificate: Some(cert),
        },
        None => CertificateVerification {
            is_valid: false,
            certificate: None,
            message: "未找到该证书".to_string(),
        },
    };

    Ok(ApiResponse::ok(verification))
}
