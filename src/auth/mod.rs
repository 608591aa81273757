//! 认证模块
//!
//! 密码哈希、会话令牌以及处理器使用的学生身份提取器

pub mod password;
pub mod token;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use serde::Serialize;

use crate::app::AppState;
use crate::error::AppError;
use crate::security::extract_cookie_value;

pub const ROLE_STUDENT: &str = "student";
pub const ROLE_INSTRUCTOR: &str = "instructor";

/// 已登录的学生
///
/// 角色以数据库为准，令牌中的角色只用于客户端展示
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AuthStudent {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: String,
}

impl AuthStudent {
    pub fn is_instructor(&self) -> bool {
        self.role == ROLE_INSTRUCTOR
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
}

fn cookie_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get(header::COOKIE)
        .and_then(|h| h.to_str().ok())
        .and_then(|cookies| extract_cookie_value(cookies, cookie_name))
        .filter(|token| !token.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthStudent
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);

        // 优先使用 Authorization 头，其次是会话 Cookie
        let token = bearer_token(&parts.headers)
            .or_else(|| cookie_token(&parts.headers, &state.config.auth.cookie_name))
            .ok_or(AppError::Unauthorized)?;

        let claims = token::decode_token(&state.config.auth, &token)?;
        let student_id = claims.student_id().ok_or(AppError::Unauthorized)?;

        sqlx::query_as::<_, AuthStudent>("SELECT id, name, email, role FROM students WHERE id = ?")
            .bind(student_id)
            .fetch_optional(&state.pool)
            .await?
            .ok_or(AppError::Unauthorized)
    }
}

/// 可选登录，页面路由用于决定渲染还是跳转
pub struct MaybeStudent(pub Option<AuthStudent>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeStudent
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match AuthStudent::from_request_parts(parts, state).await {
            Ok(student) => Ok(MaybeStudent(Some(student))),
            Err(AppError::Unauthorized) => Ok(MaybeStudent(None)),
            Err(e) => Err(e),
        }
    }
}

/// 讲师身份，非讲师返回 403
pub struct Instructor(pub AuthStudent);

#[async_trait]
impl<S> FromRequestParts<S> for Instructor
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let student = AuthStudent::from_request_parts(parts, state).await?;
        if !student.is_instructor() {
            tracing::warn!(
                "学生 {} 尝试访问讲师接口: {}",
                student.id,
                parts.uri.path()
            );
            return Err(AppError::Forbidden);
        }
        Ok(Instructor(student))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn reads_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc.def.ghi"),
        );
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn ignores_non_bearer_authorization() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic Zm9v"));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn empty_session_cookie_is_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("learnboard_session="),
        );
        assert_eq!(cookie_token(&headers, "learnboard_session"), None);
    }
}
