//! 安全模块
//!
//! 提供输入验证、随机令牌、Cookie 解析和日志脱敏等安全功能

use rand::{distributions::Alphanumeric, Rng};
use thiserror::Error;
use validator::Validate;

/// 安全错误类型
#[derive(Error, Debug)]
pub enum SecurityError {
    #[error("输入验证失败: {0}")]
    ValidationFailed(String),
}

/// 从cookie字符串中提取指定cookie的值
pub fn extract_cookie_value(cookie_str: &str, cookie_name: &str) -> Option<String> {
    for cookie in cookie_str.split(';') {
        let cookie = cookie.trim();
        if let Some((name, value)) = cookie.split_once('=') {
            if name == cookie_name {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// 生成指定长度的字母数字随机串（证书编号、上传文件名）
pub fn generate_token(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// 输入验证工具
pub mod validation {
    use super::*;
    use validator::ValidationErrors;

    /// 验证输入数据并返回友好的错误消息
    pub fn validate_input<T: Validate>(input: &T) -> Result<(), SecurityError> {
        match input.validate() {
            Ok(_) => Ok(()),
            Err(errors) => {
                let error_message = format_validation_errors(&errors);
                Err(SecurityError::ValidationFailed(error_message))
            }
        }
    }

    /// 格式化验证错误为友好的错误消息
    fn format_validation_errors(errors: &ValidationErrors) -> String {
        let mut messages = Vec::new();

        for (field, field_errors) in errors.field_errors() {
            for error in field_errors {
                let message = match &error.message {
                    Some(msg) => msg.to_string(),
                    None => format!("字段 '{}' 验证失败: {}", field, error.code),
                };
                messages.push(message);
            }
        }

        // HashMap 迭代顺序不固定
        messages.sort();
        messages.join(", ")
    }
}

/// 日志脱敏工具
pub mod sanitization {
    use regex::{Captures, Regex};

    lazy_static::lazy_static! {
        static ref EMAIL_RE: Regex =
            Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").expect("email regex");
        static ref PHONE_RE: Regex = Regex::new(r"\b\d{10,15}\b").expect("phone regex");
        static ref PASSWORD_RE: Regex =
            Regex::new(r#"(?i)password\s*[=:]\s*['"]?[^'"&\s,}]+['"]?"#).expect("password regex");
        static ref TOKEN_RE: Regex =
            Regex::new(r#"(?i)token\s*[=:]\s*['"]?[^'"&\s,}]+['"]?"#).expect("token regex");
        static ref BEARER_RE: Regex =
            Regex::new(r"Bearer\s+[A-Za-z0-9_\-]+\.[A-Za-z0-9_\-]+\.[A-Za-z0-9_\-]+")
                .expect("bearer regex");
    }

    /// 脱敏敏感信息
    pub fn sanitize_log_message(message: &str) -> String {
        let result = EMAIL_RE.replace_all(message, "***@***.***");

        let result = PHONE_RE.replace_all(&result, |caps: &Captures| {
            let num = &caps[0];
            format!("{}****{}", &num[0..3], &num[num.len() - 3..])
        });

        let result = PASSWORD_RE.replace_all(&result, "password=***");
        let result = TOKEN_RE.replace_all(&result, "token=***");
        let result = BEARER_RE.replace_all(&result, "Bearer ********");

        result.into_owned()
    }
}

pub use self::sanitization::sanitize_log_message;
pub use self::validation::validate_input;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Validate)]
    struct Signup {
        #[validate(email(message = "邮箱格式不正确"))]
        email: String,
        #[validate(length(min = 8, message = "密码至少 8 位"))]
        password: String,
    }

    #[test]
    fn validation_collects_all_messages() {
        let input = Signup {
            email: "not-an-email".into(),
            password: "short".into(),
        };
        let err = validate_input(&input).unwrap_err().to_string();
        assert!(err.contains("邮箱格式不正确"));
        assert!(err.contains("密码至少 8 位"));
    }

    #[test]
    fn sanitizes_emails_and_secrets() {
        let line = "login alice@example.com password=hunter22 token=abc123";
        let clean = sanitize_log_message(line);
        assert!(!clean.contains("alice@example.com"));
        assert!(!clean.contains("hunter22"));
        assert!(!clean.contains("abc123"));
    }

    #[test]
    fn sanitizes_bearer_jwt() {
        let clean = sanitize_log_message("Authorization: Bearer aaa.bbb.ccc");
        assert_eq!(clean, "Authorization: Bearer ********");
    }

    #[test]
    fn masks_phone_numbers_keeping_edges() {
        assert_eq!(sanitize_log_message("call 13812345678"), "call 138****678");
    }

    #[test]
    fn extracts_named_cookie() {
        let header = "theme=dark; learnboard_session=abc.def.ghi; other=1";
        assert_eq!(
            extract_cookie_value(header, "learnboard_session").as_deref(),
            Some("abc.def.ghi")
        );
        assert_eq!(extract_cookie_value(header, "missing"), None);
    }

    #[test]
    fn generated_tokens_are_alphanumeric() {
        let token = generate_token(24);
        assert_eq!(token.len(), 24);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
