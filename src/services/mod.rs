//! 后台服务

pub mod cache_warmup;
