//! 学习业务核心
//!
//! 连续天数、积分等级、测验评分和徽章规则都是纯函数，
//! `engine` 负责把它们和数据库操作组合起来。

pub mod badges;
pub mod engine;
pub mod grading;
pub mod points;
pub mod streak;

pub use engine::LearnEngine;
