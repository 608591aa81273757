//! 应用配置管理模块
//!
//! 统一管理应用的所有配置，支持从环境变量和配置文件加载配置

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Error as FigmentError, Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// 配置加载错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置加载错误: {0}")]
    Loading(#[from] FigmentError),
    #[error("配置验证错误: {0}")]
    Validation(String),
}

/// 数据库配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            min_connections: 2,
            acquire_timeout_seconds: 5,
            idle_timeout_seconds: 300,
        }
    }
}

/// 服务器配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub graceful_shutdown_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            graceful_shutdown_timeout_seconds: 5,
        }
    }
}

impl ServerConfig {
    /// 获取服务器地址
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 安全配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SecurityConfig {
    pub cors_allow_origins: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            cors_allow_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

/// 认证配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub issuer: String,
    pub token_ttl_hours: i64,
    pub cookie_name: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "learnboard-dev-secret-change-me".to_string(),
            issuer: "learnboard".to_string(),
            token_ttl_hours: 24,
            cookie_name: "learnboard_session".to_string(),
        }
    }
}

/// 上传文件配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UploadConfig {
    pub dir: PathBuf,
    pub max_bytes: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./uploads"),
            max_bytes: 2 * 1024 * 1024,
        }
    }
}

/// 积分与等级规则
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GamificationConfig {
    pub lesson_points: i64,
    pub quiz_pass_bonus: i64,
    pub course_completion_bonus: i64,
    pub points_per_level: i64,
}

impl Default for GamificationConfig {
    fn default() -> Self {
        Self {
            lesson_points: 10,
            quiz_pass_bonus: 20,
            course_completion_bonus: 100,
            points_per_level: 250,
        }
    }
}

/// 应用配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub security: SecurityConfig,
    pub auth: AuthConfig,
    pub uploads: UploadConfig,
    pub gamification: GamificationConfig,
    pub log_level: String,
    pub environment: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            server: ServerConfig::default(),
            security: SecurityConfig::default(),
            auth: AuthConfig::default(),
            uploads: UploadConfig::default(),
            gamification: GamificationConfig::default(),
            log_level: "info".to_string(),
            environment: "development".to_string(),
        }
    }
}

impl AppConfig {
    /// 从默认位置加载配置
    pub fn load() -> Result<Self, ConfigError> {
        // 配置文件搜索路径
        let config_paths = [
            PathBuf::from("./config.toml"),
            PathBuf::from("../config.toml"),
            PathBuf::from("./config/config.toml"),
        ];

        // 以默认值为底，文件和环境变量逐层覆盖
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

        for path in config_paths {
            if path.exists() {
                tracing::info!("从配置文件加载: {}", path.display());
                figment = figment.merge(Toml::file(path));
                break; // 只加载第一个存在的配置文件
            }
        }

        // 从环境变量加载（优先级最高），如 APP_AUTH__JWT_SECRET
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config: AppConfig = figment.extract()?;
        config.validate()?;

        Ok(config)
    }

    /// 验证配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(
            self.environment.to_lowercase().as_str(),
            "development" | "staging" | "production"
        ) {
            return Err(ConfigError::Validation(
                "环境必须是 development、staging 或 production".to_string(),
            ));
        }

        if !matches!(
            self.log_level.to_lowercase().as_str(),
            "error" | "warn" | "info" | "debug" | "trace"
        ) {
            return Err(ConfigError::Validation(
                "日志级别必须是 error、warn、info、debug 或 trace".to_string(),
            ));
        }

        if self.database.max_connections < self.database.min_connections {
            return Err(ConfigError::Validation(
                "最大连接数不能小于最小连接数".to_string(),
            ));
        }

        if self.is_production() && self.auth.jwt_secret == AuthConfig::default().jwt_secret {
            return Err(ConfigError::Validation(
                "生产环境必须配置 auth.jwt_secret".to_string(),
            ));
        }

        if self.auth.jwt_secret.is_empty() {
            return Err(ConfigError::Validation("jwt_secret 不能为空".to_string()));
        }

        if self.auth.token_ttl_hours <= 0 {
            return Err(ConfigError::Validation(
                "token_ttl_hours 必须大于 0".to_string(),
            ));
        }

        if self.gamification.points_per_level <= 0 {
            return Err(ConfigError::Validation(
                "points_per_level 必须大于 0".to_string(),
            ));
        }

        Ok(())
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}

// 提供一个全局配置实例的访问方式
lazy_static::lazy_static! {
    pub static ref CONFIG: AppConfig = AppConfig::load()
        .unwrap_or_else(|e| {
            eprintln!("警告: 无法加载配置: {}. 使用默认配置.", e);
            AppConfig::default()
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_unknown_environment() {
        let config = AppConfig {
            environment: "qa".to_string(),
            ..AppConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn production_requires_real_secret() {
        let mut config = AppConfig {
            environment: "production".to_string(),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());

        config.auth.jwt_secret = "a-real-secret".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_inverted_pool_bounds() {
        let mut config = AppConfig::default();
        config.database.max_connections = 1;
        config.database.min_connections = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_points_per_level() {
        let mut config = AppConfig::default();
        config.gamification.points_per_level = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn server_addr_joins_host_and_port() {
        assert_eq!(ServerConfig::default().server_addr(), "127.0.0.1:3000");
    }
}
