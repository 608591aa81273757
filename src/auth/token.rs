//! 会话令牌（HS256 JWT）

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn student_id(&self) -> Option<i64> {
        self.sub.parse().ok()
    }
}

/// 为学生签发会话令牌
pub fn issue_token(config: &AuthConfig, student_id: i64, role: &str) -> Result<String, AppError> {
    let now = Utc::now();
    let claims = Claims {
        sub: student_id.to_string(),
        role: role.to_string(),
        iss: config.issuer.clone(),
        iat: now.timestamp(),
        exp: (now + Duration::hours(config.token_ttl_hours)).timestamp(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("签发令牌失败: {e}")))
}

/// 校验签名、签发者和过期时间
pub fn decode_token(config: &AuthConfig, token: &str) -> Result<Claims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[config.issuer.as_str()]);
    validation.leeway = 0;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::debug!("令牌校验失败: {}", e);
        AppError::Unauthorized
    })
}

/// 写入会话 Cookie 的 Set-Cookie 值
pub fn session_cookie(config: &AuthConfig, token: &str) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        config.cookie_name,
        token,
        config.token_ttl_hours * 3600
    )
}

/// 清除会话 Cookie 的 Set-Cookie 值
pub fn clear_session_cookie(config: &AuthConfig) -> String {
    format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
        config.cookie_name
    )
}
