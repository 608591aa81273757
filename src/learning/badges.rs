//! 徽章规则

use serde::Serialize;

/// 判断徽章所需的学习统计
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BadgeStats {
    pub lessons_completed: i64,
    pub courses_completed: i64,
    pub perfect_quizzes: i64,
    pub current_streak: u32,
    pub total_points: i64,
}

struct BadgeRule {
    code: &'static str,
    earned: fn(&BadgeStats) -> bool,
}

// 与迁移中 badges 表的目录保持一致
const RULES: &[BadgeRule] = &[
    BadgeRule {
        code: "first_lesson",
        earned: |s| s.lessons_completed >= 1,
    },
    BadgeRule {
        code: "lesson_marathon",
        earned: |s| s.lessons_completed >= 25,
    },
    BadgeRule {
        code: "first_course",
        earned: |s| s.courses_completed >= 1,
    },
    BadgeRule {
        code: "quiz_ace",
        earned: |s| s.perfect_quizzes >= 1,
    },
    BadgeRule {
        code: "streak_3",
        earned: |s| s.current_streak >= 3,
    },
    BadgeRule {
        code: "streak_7",
        earned: |s| s.current_streak >= 7,
    },
    BadgeRule {
        code: "streak_30",
        earned: |s| s.current_streak >= 30,
    },
    BadgeRule {
        code: "points_500",
        earned: |s| s.total_points >= 500,
    },
    BadgeRule {
        code: "points_1000",
        earned: |s| s.total_points >= 1000,
    },
];

/// 当前统计满足条件的全部徽章编码
pub fn eligible_badges(stats: &BadgeStats) -> Vec<&'static str> {
    RULES
        .iter()
        .filter(|rule| (rule.earned)(stats))
        .map(|rule| rule.code)
        .collect()
}

/// 去掉已经获得的徽章
pub fn new_badges(stats: &BadgeStats, owned: &[String]) -> Vec<&'static str> {
    eligible_badges(stats)
        .into_iter()
        .filter(|code| !owned.iter().any(|o| o == code))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_for_fresh_student() {
        assert!(eligible_badges(&BadgeStats::default()).is_empty());
    }

    #[test]
    fn thresholds_are_inclusive() {
        let stats = BadgeStats {
            lessons_completed: 25,
            current_streak: 7,
            total_points: 500,
            ..BadgeStats::default()
        };
        let codes = eligible_badges(&stats);
        assert_eq!(
            codes,
            vec![
                "first_lesson",
                "lesson_marathon",
                "streak_3",
                "streak_7",
                "points_500"
            ]
        );
    }

    #[test]
    fn owned_badges_are_not_awarded_again() {
        let stats = BadgeStats {
            lessons_completed: 1,
            courses_completed: 1,
            perfect_quizzes: 1,
            ..BadgeStats::default()
        };
        let owned = vec!["first_lesson".to_string()];
        assert_eq!(new_badges(&stats, &owned), vec!["first_course", "quiz_ace"]);
    }
}
