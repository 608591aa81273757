use chrono::Utc;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions},
    Error as SqlxError, Transaction,
};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::auth::password;
use crate::config::AppConfig;

/// 数据库操作错误类型
#[derive(Error, Debug)]
pub enum DbError {
    #[error("数据库连接错误: {0}")]
    Connection(#[from] SqlxError),
    #[error("数据库迁移错误: {0}")]
    Migration(String),
    #[error("事务操作错误: {0}")]
    Transaction(String),
    #[error("示例数据错误: {0}")]
    Seed(String),
}

/// 数据库迁移信息
#[derive(Debug, Clone)]
pub struct MigrationInfo {
    pub version: i64,
    pub sql: &'static str,
}

// 定义数据库迁移
static MIGRATIONS: &[MigrationInfo] = &[
    MigrationInfo {
        version: 1,
        sql: r#"
        CREATE TABLE IF NOT EXISTS students (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'student',
            bio TEXT,
            avatar_url TEXT,
            created_at DATETIME NOT NULL,
            last_login_at DATETIME
        );

        CREATE TABLE IF NOT EXISTS courses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            category TEXT NOT NULL,
            difficulty TEXT NOT NULL DEFAULT 'beginner',
            is_published BOOLEAN NOT NULL DEFAULT 0,
            created_by INTEGER REFERENCES students(id) ON DELETE SET NULL,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        );

        CREATE TABLE IF NOT EXISTS lessons (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            course_id INTEGER NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
            title TEXT NOT NULL,
            content TEXT NOT NULL DEFAULT '',
            position INTEGER NOT NULL,
            duration_minutes INTEGER NOT NULL DEFAULT 0,
            points INTEGER NOT NULL,
            created_at DATETIME NOT NULL
        );

        CREATE TABLE IF NOT EXISTS quizzes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            course_id INTEGER NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
            title TEXT NOT NULL,
            passing_score INTEGER NOT NULL DEFAULT 70,
            max_attempts INTEGER,
            questions TEXT NOT NULL,
            created_at DATETIME NOT NULL
        );

        CREATE TABLE IF NOT EXISTS enrollments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id INTEGER NOT NULL REFERENCES students(id) ON DELETE CASCADE,
            course_id INTEGER NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
            status TEXT NOT NULL DEFAULT 'in_progress',
            progress INTEGER NOT NULL DEFAULT 0,
            enrolled_at DATETIME NOT NULL,
            completed_at DATETIME,
            last_accessed_at DATETIME NOT NULL,
            UNIQUE (student_id, course_id)
        );

        CREATE TABLE IF NOT EXISTS lesson_completions (
            student_id INTEGER NOT NULL REFERENCES students(id) ON DELETE CASCADE,
            lesson_id INTEGER NOT NULL REFERENCES lessons(id) ON DELETE CASCADE,
            course_id INTEGER NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
            completed_at DATETIME NOT NULL,
            PRIMARY KEY (student_id, lesson_id)
        );

        CREATE TABLE IF NOT EXISTS quiz_attempts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id INTEGER NOT NULL REFERENCES students(id) ON DELETE CASCADE,
            quiz_id INTEGER NOT NULL REFERENCES quizzes(id) ON DELETE CASCADE,
            score INTEGER NOT NULL,
            max_score INTEGER NOT NULL,
            percentage REAL NOT NULL,
            passed BOOLEAN NOT NULL,
            attempt_number INTEGER NOT NULL,
            submitted_at DATETIME NOT NULL
        );

        CREATE TABLE IF NOT EXISTS activity_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id INTEGER NOT NULL REFERENCES students(id) ON DELETE CASCADE,
            kind TEXT NOT NULL,
            points INTEGER NOT NULL DEFAULT 0,
            occurred_at DATETIME NOT NULL
        );

        CREATE TABLE IF NOT EXISTS badges (
            code TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT NOT NULL,
            icon TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS student_badges (
            student_id INTEGER NOT NULL REFERENCES students(id) ON DELETE CASCADE,
            badge_code TEXT NOT NULL REFERENCES badges(code),
            awarded_at DATETIME NOT NULL,
            PRIMARY KEY (student_id, badge_code)
        );

        CREATE TABLE IF NOT EXISTS certificates (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id INTEGER NOT NULL REFERENCES students(id) ON DELETE CASCADE,
            course_id INTEGER NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
            score INTEGER NOT NULL,
            verification_code TEXT NOT NULL UNIQUE,
            issued_at DATETIME NOT NULL,
            UNIQUE (student_id, course_id)
        );

        CREATE TABLE IF NOT EXISTS notifications (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id INTEGER NOT NULL REFERENCES students(id) ON DELETE CASCADE,
            kind TEXT NOT NULL,
            message TEXT NOT NULL,
            is_read BOOLEAN NOT NULL DEFAULT 0,
            created_at DATETIME NOT NULL
        );
        "#,
    },
    MigrationInfo {
        version: 2,
        sql: r#"
        CREATE INDEX IF NOT EXISTS idx_lessons_course ON lessons (course_id, position);
        CREATE INDEX IF NOT EXISTS idx_quizzes_course ON quizzes (course_id);
        CREATE INDEX IF NOT EXISTS idx_enrollments_student ON enrollments (student_id, last_accessed_at);
        CREATE INDEX IF NOT EXISTS idx_completions_course ON lesson_completions (student_id, course_id);
        CREATE INDEX IF NOT EXISTS idx_attempts_quiz ON quiz_attempts (student_id, quiz_id);
        CREATE INDEX IF NOT EXISTS idx_activity_student ON activity_events (student_id, occurred_at);
        CREATE INDEX IF NOT EXISTS idx_notifications_student ON notifications (student_id, is_read);
        "#,
    },
    MigrationInfo {
        version: 3,
        sql: r#"
        INSERT OR IGNORE INTO badges (code, name, description, icon) VALUES
            ('first_lesson', '第一步', '完成第一节课', '🌱'),
            ('lesson_marathon', '课程马拉松', '累计完成 25 节课', '🏃'),
            ('first_course', '结业', '完成第一门课程', '🎓'),
            ('quiz_ace', '满分达人', '在任意测验中获得满分', '💯'),
            ('streak_3', '三日连续', '连续学习 3 天', '🔥'),
            ('streak_7', '一周不断', '连续学习 7 天', '⚡'),
            ('streak_30', '月度坚持', '连续学习 30 天', '🏆'),
            ('points_500', '积分新星', '累计获得 500 积分', '⭐'),
            ('points_1000', '积分大师', '累计获得 1000 积分', '🌟');
        "#,
    },
];

/// 获取可执行文件所在目录的数据库路径
fn get_default_db_path() -> String {
    let exe_path = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("."));

    let exe_dir = exe_path
        .parent()
        .unwrap_or_else(|| std::path::Path::new("."));

    let db_path = exe_dir.join("app.db");

    format!("sqlite://{}?mode=rwc", db_path.display())
}

/// 创建数据库连接池
pub async fn create_pool(config: &AppConfig) -> Result<SqlitePool, DbError> {
    // DATABASE_URL 优先于配置文件
    let database_url = std::env::var("DATABASE_URL")
        .ok()
        .or_else(|| config.database.url.clone())
        .unwrap_or_else(get_default_db_path);

    tracing::info!("📂 数据库路径: {}", database_url);

    let options = SqliteConnectOptions::from_str(&database_url)?
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true)
        .create_if_missing(true);

    let db = &config.database;
    let pool = SqlitePoolOptions::new()
        .max_connections(db.max_connections)
        .min_connections(db.min_connections)
        .acquire_timeout(Duration::from_secs(db.acquire_timeout_seconds))
        .idle_timeout(Duration::from_secs(db.idle_timeout_seconds))
        .connect_with(options)
        .await?;

    tracing::info!("✅ 数据库连接池创建成功");
    Ok(pool)
}

/// 执行结构化的数据库迁移
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), DbError> {
    let mut tx = start_transaction(pool).await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (version INTEGER PRIMARY KEY, applied_at DATETIME DEFAULT CURRENT_TIMESTAMP)"
    )
    .execute(&mut *tx)
    .await?;

    let last_version: Option<i64> =
        sqlx::query_scalar("SELECT MAX(version) FROM schema_migrations")
            .fetch_one(&mut *tx)
            .await?;

    let last_applied = last_version.unwrap_or(0);

    let mut applied = 0;
    for migration in MIGRATIONS {
        if migration.version > last_applied {
            tracing::info!("应用数据库迁移版本: {}", migration.version);

            sqlx::raw_sql(migration.sql)
                .execute(&mut *tx)
                .await
                .map_err(|e| DbError::Migration(format!("版本 {}: {}", migration.version, e)))?;

            sqlx::query("INSERT INTO schema_migrations (version) VALUES (?)")
                .bind(migration.version)
                .execute(&mut *tx)
                .await?;

            applied += 1;
        }
    }

    tx.commit().await?;

    tracing::info!("✅ 数据库迁移完成，应用了 {} 个迁移", applied);
    Ok(())
}

/// 开始数据库事务
pub async fn start_transaction(
    pool: &SqlitePool,
) -> Result<Transaction<'_, sqlx::Sqlite>, DbError> {
    pool.begin()
        .await
        .map_err(|e| DbError::Transaction(e.to_string()))
}

const DEMO_INSTRUCTOR_EMAIL: &str = "instructor@learnboard.local";

/// 插入示例数据：一位讲师和一门已发布的演示课程
pub async fn seed_data(pool: &SqlitePool, config: &AppConfig) -> Result<(), DbError> {
    let mut tx = start_transaction(pool).await?;

    let course_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM courses")
        .fetch_one(&mut *tx)
        .await?;

    if course_count > 0 {
        tx.commit().await?;
        return Ok(());
    }

    // 邮箱已被占用时不插入演示数据，也不修改已有账号的角色
    let taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM students WHERE email = ?)")
        .bind(DEMO_INSTRUCTOR_EMAIL)
        .fetch_one(&mut *tx)
        .await?;
    if taken {
        tx.commit().await?;
        tracing::warn!("邮箱 {} 已存在，跳过演示数据", DEMO_INSTRUCTOR_EMAIL);
        return Ok(());
    }

    let now = Utc::now();
    let password_hash =
        password::hash_password("instructor-demo").map_err(|e| DbError::Seed(e.to_string()))?;

    let instructor_id: i64 = sqlx::query_scalar(
        "INSERT INTO students (name, email, password_hash, role, created_at)
         VALUES (?, ?, ?, 'instructor', ?)
         RETURNING id",
    )
    .bind("演示讲师")
    .bind(DEMO_INSTRUCTOR_EMAIL)
    .bind(&password_hash)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    let course_id: i64 = sqlx::query_scalar(
        "INSERT INTO courses (title, description, category, difficulty, is_published, created_by, created_at, updated_at)
         VALUES (?, ?, ?, 'beginner', 1, ?, ?, ?) RETURNING id",
    )
    .bind("Rust 入门")
    .bind("从所有权到错误处理的基础课程")
    .bind("programming")
    .bind(instructor_id)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    let lessons = [
        ("安装工具链", "使用 rustup 安装 Rust。", 10),
        ("所有权与借用", "理解 move、&T 与 &mut T。", 20),
        ("错误处理", "Result、? 运算符与自定义错误。", 20),
    ];

    for (position, (title, content, minutes)) in lessons.iter().enumerate() {
        sqlx::query(
            "INSERT INTO lessons (course_id, title, content, position, duration_minutes, points, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(course_id)
        .bind(title)
        .bind(content)
        .bind(position as i64 + 1)
        .bind(minutes)
        .bind(config.gamification.lesson_points)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    let questions = serde_json::json!([
        {
            "id": "q1",
            "text": "以下哪个类型表示可变借用？",
            "options": ["&T", "&mut T", "Box<T>"],
            "correct_answers": [1],
            "explanation": "&mut T 是独占的可变引用。",
            "points": 1
        },
        {
            "id": "q2",
            "text": "哪些类型常用于错误处理？",
            "options": ["Result", "Option", "Vec"],
            "correct_answers": [0, 1],
            "explanation": null,
            "points": 2
        }
    ]);

    sqlx::query(
        "INSERT INTO quizzes (course_id, title, passing_score, max_attempts, questions, created_at)
         VALUES (?, ?, 70, 3, ?, ?)",
    )
    .bind(course_id)
    .bind("Rust 基础测验")
    .bind(questions.to_string())
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    tracing::info!("✅ 插入演示课程数据");
    Ok(())
}

/// 初始化数据库：迁移后按需插入示例数据
pub async fn init_db(pool: &SqlitePool, config: &AppConfig) -> Result<(), DbError> {
    run_migrations(pool).await?;
    if config.is_production() {
        tracing::info!("生产环境不插入演示数据");
        return Ok(());
    }
    seed_data(pool, config).await
}

/// 测试使用的内存数据库，只保留一个连接以共享同一个库
#[cfg(test)]
pub async fn memory_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("memory url")
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("memory pool");
    run_migrations(&pool).await.expect("migrations");
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let pool = memory_pool().await;
        run_migrations(&pool).await.unwrap();

        let version: i64 = sqlx::query_scalar("SELECT MAX(version) FROM schema_migrations")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(version, MIGRATIONS.len() as i64);

        let badges: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM badges")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(badges, 9);
    }

    #[tokio::test]
    async fn seed_inserts_demo_course_once() {
        let pool = memory_pool().await;
        let config = AppConfig::default();
        seed_data(&pool, &config).await.unwrap();
        seed_data(&pool, &config).await.unwrap();

        let courses: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM courses")
            .fetch_one(&pool)
            .await
            .unwrap();
        let lessons: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lessons")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(courses, 1);
        assert_eq!(lessons, 3);
    }

    #[tokio::test]
    async fn production_skips_demo_data() {
        let pool = memory_pool().await;
        let config = AppConfig {
            environment: "production".to_string(),
            ..AppConfig::default()
        };
        init_db(&pool, &config).await.unwrap();

        let students: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM students")
            .fetch_one(&pool)
            .await
            .unwrap();
        let courses: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM courses")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(students, 0);
        assert_eq!(courses, 0);
    }

    #[tokio::test]
    async fn seed_leaves_existing_account_alone() {
        let pool = memory_pool().await;
        sqlx::query(
            "INSERT INTO students (name, email, password_hash, role, created_at) VALUES ('已有', ?, 'x', 'student', ?)",
        )
        .bind(DEMO_INSTRUCTOR_EMAIL)
        .bind(Utc::now())
        .execute(&pool)
        .await
        .unwrap();

        seed_data(&pool, &AppConfig::default()).await.unwrap();

        let role: String = sqlx::query_scalar("SELECT role FROM students WHERE email = ?")
            .bind(DEMO_INSTRUCTOR_EMAIL)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(role, "student");
        let courses: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM courses")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(courses, 0);
    }
}
