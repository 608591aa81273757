//! 积分、等级与课程进度计算

use serde::{Deserialize, Serialize};

/// 学习记录类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Login,
    Enroll,
    LessonCompleted,
    QuizSubmitted,
    CourseCompleted,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Enroll => "enroll",
            Self::LessonCompleted => "lesson_completed",
            Self::QuizSubmitted => "quiz_submitted",
            Self::CourseCompleted => "course_completed",
        }
    }
}

impl std::fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LevelInfo {
    pub level: i64,
    pub points: i64,
    pub points_into_level: i64,
    pub points_to_next_level: i64,
}

/// 每 `points_per_level` 分升一级，从 1 级开始
pub fn level_for(points: i64, points_per_level: i64) -> LevelInfo {
    let points = points.max(0);
    let per_level = points_per_level.max(1);
    let points_into_level = points % per_level;

    LevelInfo {
        level: points / per_level + 1,
        points,
        points_into_level,
        points_to_next_level: per_level - points_into_level,
    }
}

/// 课程进度百分比，向下取整；没有课时的课程进度为 0
pub fn progress_percent(completed: i64, total: i64) -> i64 {
    if total <= 0 {
        return 0;
    }
    (completed.clamp(0, total) * 100) / total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_starts_at_one() {
        let info = level_for(0, 250);
        assert_eq!(info.level, 1);
        assert_eq!(info.points_to_next_level, 250);
    }

    #[test]
    fn level_boundary_is_inclusive() {
        assert_eq!(level_for(249, 250).level, 1);
        assert_eq!(level_for(250, 250).level, 2);

        let info = level_for(610, 250);
        assert_eq!(info.level, 3);
        assert_eq!(info.points_into_level, 110);
        assert_eq!(info.points_to_next_level, 140);
    }

    #[test]
    fn progress_rounds_down() {
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_percent(2, 3), 66);
        assert_eq!(progress_percent(3, 3), 100);
    }

    #[test]
    fn progress_handles_empty_course() {
        assert_eq!(progress_percent(0, 0), 0);
        assert_eq!(progress_percent(5, 3), 100);
    }

    #[test]
    fn activity_kind_names() {
        assert_eq!(ActivityKind::LessonCompleted.as_str(), "lesson_completed");
        assert_eq!(ActivityKind::QuizSubmitted.to_string(), "quiz_submitted");
    }
}
