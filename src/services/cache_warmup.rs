//! 缓存预热服务
//!
//! 启动时预加载首页和目录接口最常用的数据，之后定期刷新

use futures::future::{join_all, BoxFuture, FutureExt};
use sqlx::SqlitePool;
use std::time::Duration;
use tracing::{info, warn};

use crate::helpers::cache::{invalidate_prefix, CATALOG_PREFIX, LEADERBOARD_PREFIX};
use crate::routes::analytics::{cached_leaderboard, DEFAULT_LEADERBOARD_SIZE};
use crate::routes::courses::{cached_catalog, load_categories, CatalogQuery};
use crate::routes::pages::{LANDING_COURSES, LANDING_LEADERBOARD};

const REFRESH_INTERVAL: Duration = Duration::from_secs(300);

type WarmupTask<'a> = (&'static str, BoxFuture<'a, Result<(), sqlx::Error>>);

fn warmup_tasks(pool: &SqlitePool, points_per_level: i64) -> Vec<WarmupTask<'_>> {
    vec![
        (
            "课程目录首页",
            async move {
                cached_catalog(pool, &CatalogQuery::default()).await?;
                Ok(())
            }
            .boxed(),
        ),
        (
            "首页推荐课程",
            async move {
                let filter = CatalogQuery {
                    per_page: Some(LANDING_COURSES),
                    ..Default::default()
                };
                cached_catalog(pool, &filter).await?;
                Ok(())
            }
            .boxed(),
        ),
        (
            "课程分类",
            async move {
                load_categories(pool).await?;
                Ok(())
            }
            .boxed(),
        ),
        (
            "排行榜",
            async move {
                cached_leaderboard(pool, DEFAULT_LEADERBOARD_SIZE, points_per_level).await?;
                cached_leaderboard(pool, LANDING_LEADERBOARD, points_per_level).await?;
                Ok(())
            }
            .boxed(),
        ),
    ]
}

/// 预加载所有热点数据，返回成功的任务数
pub async fn warmup_all_caches(pool: &SqlitePool, points_per_level: i64) -> usize {
    info!("开始缓存预热...");

    // 先清空旧数据，确保读到的是数据库中的最新值
    invalidate_prefix(CATALOG_PREFIX);
    invalidate_prefix(LEADERBOARD_PREFIX);

    let tasks = warmup_tasks(pool, points_per_level);
    let (names, futures): (Vec<_>, Vec<_>) = tasks.into_iter().unzip();
    let results = join_all(futures).await;

    let mut success_count = 0;
    for (name, result) in names.iter().zip(results) {
        match result {
            Ok(()) => success_count += 1,
            Err(e) => warn!("预热 {} 失败: {}", name, e),
        }
    }

    info!(
        "缓存预热完成: 成功 {}, 失败 {}",
        success_count,
        names.len() - success_count
    );
    success_count
}

/// 定期刷新缓存的后台任务
pub async fn start_cache_refresh_task(pool: SqlitePool, points_per_level: i64) {
    info!("启动缓存自动刷新任务，间隔: {:?}", REFRESH_INTERVAL);

    let mut ticker = tokio::time::interval(REFRESH_INTERVAL);
    // 第一次 tick 立即返回，启动时已经预热过
    ticker.tick().await;

    loop {
        ticker.tick().await;
        warmup_all_caches(&pool, points_per_level).await;
    }
}
