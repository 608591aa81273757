//! 通用辅助模块：缓存、监控、分页

pub mod cache;
pub mod monitoring;
pub mod pagination;
