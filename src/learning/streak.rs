//! 连续学习天数
//!
//! 以 UTC 自然日为单位：某天只要有一条学习记录即视为活跃。
//! 今天尚无记录时，截止到昨天的连续天数仍然有效。

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StreakSummary {
    pub current: u32,
    pub longest: u32,
    pub active_today: bool,
    pub last_active: Option<NaiveDate>,
}

pub fn compute_streak<I>(days: I, today: NaiveDate) -> StreakSummary
where
    I: IntoIterator<Item = NaiveDate>,
{
    // 未来日期（时钟偏差）不计入
    let days: BTreeSet<NaiveDate> = days.into_iter().filter(|d| *d <= today).collect();

    let mut longest = 0u32;
    let mut run = 0u32;
    let mut previous: Option<NaiveDate> = None;
    for day in &days {
        run = match previous {
            Some(prev) if *day - prev == Duration::days(1) => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        previous = Some(*day);
    }

    let active_today = days.contains(&today);
    let yesterday = today - Duration::days(1);
    let anchor = if active_today {
        Some(today)
    } else if days.contains(&yesterday) {
        Some(yesterday)
    } else {
        None
    };

    let current = match anchor {
        Some(mut day) => {
            let mut count = 0;
            while days.contains(&day) {
                count += 1;
                day -= Duration::days(1);
            }
            count
        }
        None => 0,
    };

    StreakSummary {
        current,
        longest,
        active_today,
        last_active: days.iter().next_back().copied(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn no_activity_means_no_streak() {
        let summary = compute_streak(Vec::new(), d("2024-03-10"));
        assert_eq!(summary.current, 0);
        assert_eq!(summary.longest, 0);
        assert!(!summary.active_today);
        assert_eq!(summary.last_active, None);
    }

    #[test]
    fn counts_run_ending_today() {
        let days = vec![d("2024-03-08"), d("2024-03-09"), d("2024-03-10")];
        let summary = compute_streak(days, d("2024-03-10"));
        assert_eq!(summary.current, 3);
        assert_eq!(summary.longest, 3);
        assert!(summary.active_today);
    }

    #[test]
    fn streak_survives_until_today_ends() {
        let days = vec![d("2024-03-08"), d("2024-03-09")];
        let summary = compute_streak(days, d("2024-03-10"));
        assert_eq!(summary.current, 2);
        assert!(!summary.active_today);
    }

    #[test]
    fn missing_yesterday_breaks_streak() {
        let days = vec![d("2024-03-07"), d("2024-03-08")];
        let summary = compute_streak(days, d("2024-03-10"));
        assert_eq!(summary.current, 0);
        assert_eq!(summary.longest, 2);
        assert_eq!(summary.last_active, Some(d("2024-03-08")));
    }

    #[test]
    fn longest_run_can_be_in_the_past() {
        let days = vec![
            d("2024-02-01"),
            d("2024-02-02"),
            d("2024-02-03"),
            d("2024-02-04"),
            d("2024-03-09"),
            d("2024-03-10"),
        ];
        let summary = compute_streak(days, d("2024-03-10"));
        assert_eq!(summary.current, 2);
        assert_eq!(summary.longest, 4);
    }

    #[test]
    fn duplicate_days_count_once() {
        let days = vec![d("2024-03-10"), d("2024-03-10"), d("2024-03-09")];
        assert_eq!(compute_streak(days, d("2024-03-10")).current, 2);
    }

    #[test]
    fn run_spans_month_boundary() {
        let days = vec![d("2024-02-28"), d("2024-02-29"), d("2024-03-01")];
        assert_eq!(compute_streak(days, d("2024-03-01")).current, 3);
    }

    #[test]
    fn future_days_are_ignored() {
        let days = vec![d("2024-03-10"), d("2024-03-11")];
        let summary = compute_streak(days, d("2024-03-10"));
        assert_eq!(summary.current, 1);
        assert_eq!(summary.last_active, Some(d("2024-03-10")));
    }
}
