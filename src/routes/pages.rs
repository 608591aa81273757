//! 页面路由处理模块
//!
//! 服务端渲染的首页和学生仪表盘

use askama::Template;
use axum::{
    extract::State,
    response::{IntoResponse, Redirect, Response},
};

use crate::app::AppState;
use crate::auth::MaybeStudent;
use crate::error::AppResult;
use crate::routes::analytics::{cached_leaderboard, LeaderboardEntry};
use crate::routes::courses::{cached_catalog, load_categories, CatalogQuery, CategoryCount, CourseSummary};
use crate::routes::dashboard::{build_summary, DashboardSummary};

pub const LANDING_COURSES: i64 = 6;
pub const LANDING_LEADERBOARD: i64 = 5;

#[derive(Template)]
#[template(path = "pages/landing.html")]
pub struct LandingTemplate {
    pub student_name: Option<String>,
    pub courses: Vec<CourseSummary>,
    pub total_courses: i64,
    pub categories: Vec<CategoryCount>,
    pub leaderboard: Vec<LeaderboardEntry>,
}

/// 柱状图中的一天
pub struct ActivityBar {
    pub label: String,
    pub points: i64,
    pub events: i64,
    pub height: i64,
}

#[derive(Template)]
#[template(path = "pages/dashboard.html")]
pub struct DashboardTemplate {
    pub summary: DashboardSummary,
    pub bars: Vec<ActivityBar>,
}

fn activity_bars(summary: &DashboardSummary) -> Vec<ActivityBar> {
    let max = summary
        .recent_activity
        .iter()
        .map(|d| d.points)
        .max()
        .unwrap_or(0)
        .max(1);

    summary
        .recent_activity
        .iter()
        .map(|day| ActivityBar {
            label: day.date.format("%m-%d").to_string(),
            points: day.points,
            events: day.events,
            // 有活动但没有积分的日子也显示一个矮柱
            height: if day.points > 0 {
                (day.points * 100 / max).max(8)
            } else if day.events > 0 {
                4
            } else {
                0
            },
        })
        .collect()
}

/// 首页：课程目录、分类和排行榜，查询失败时降级为空列表
pub async fn landing(
    State(state): State<AppState>,
    MaybeStudent(viewer): MaybeStudent,
) -> impl IntoResponse {
    let filter = CatalogQuery {
        per_page: Some(LANDING_COURSES),
        ..Default::default()
    };

    let (catalog, categories, leaderboard) = tokio::join!(
        cached_catalog(&state.pool, &filter),
        load_categories(&state.pool),
        cached_leaderboard(
            &state.pool,
            LANDING_LEADERBOARD,
            state.config.gamification.points_per_level
        ),
    );

    let (courses, total_courses) = match catalog {
        Ok(page) => (page.items, page.pagination.total),
        Err(e) => {
            tracing::error!("首页加载课程目录失败: {}", e);
            (Vec::new(), 0)
        }
    };

    LandingTemplate {
        student_name: viewer.map(|s| s.name),
        courses,
        total_courses,
        categories: categories.unwrap_or_else(|e| {
            tracing::error!("首页加载分类失败: {}", e);
            Vec::new()
        }),
        leaderboard: leaderboard.unwrap_or_else(|e| {
            tracing::error!("首页加载排行榜失败: {}", e);
            Vec::new()
        }),
    }
}

/// 仪表盘页面，未登录时跳转到首页
pub async fn dashboard(
    State(state): State<AppState>,
    MaybeStudent(viewer): MaybeStudent,
) -> AppResult<Response> {
    let Some(student) = viewer else {
        return Ok(Redirect::to("/").into_response());
    };

    let summary = build_summary(&state, student.id).await?;
    let bars = activity_bars(&summary);
    Ok(DashboardTemplate { summary, bars }.into_response())
}
