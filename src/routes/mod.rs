//! 路由模块
//!
//! 每个子模块对应一组 HTTP 处理器，路由表在 `app.rs` 中组装

pub mod analytics;
pub mod auth;
pub mod courses;
pub mod dashboard;
pub mod enrollments;
pub mod notifications;
pub mod pages;
pub mod progress;
pub mod static_assets;
pub mod students;
