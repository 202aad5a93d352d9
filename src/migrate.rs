//! Versioned schema migrations.
//!
//! Each migration runs once, in order, inside its own transaction, and is
//! recorded in `schema_migrations`. Re-running is a no-op.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::info;

use crate::config::Config;
use crate::db;

struct Migration {
    version: i64,
    name: &'static str,
    statements: &'static [&'static str],
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_screenshots",
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS screenshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                filepath TEXT NOT NULL,
                captured_at TEXT NOT NULL,
                image_hash TEXT NOT NULL,
                file_size INTEGER NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_screenshots_captured_at ON screenshots(captured_at DESC)",
        ],
    },
    Migration {
        version: 2,
        name: "screenshot_dimensions_and_digest",
        statements: &[
            "ALTER TABLE screenshots ADD COLUMN width INTEGER NOT NULL DEFAULT 0",
            "ALTER TABLE screenshots ADD COLUMN height INTEGER NOT NULL DEFAULT 0",
            "ALTER TABLE screenshots ADD COLUMN content_sha256 TEXT",
            "ALTER TABLE screenshots ADD COLUMN nearest_distance INTEGER",
            "CREATE INDEX IF NOT EXISTS idx_screenshots_image_hash ON screenshots(image_hash)",
        ],
    },
];

/// Latest schema version this build knows about.
pub fn latest_version() -> i64 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

/// Connect using the configured path and bring the schema up to date.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let applied = migrate(&pool).await?;
    if applied > 0 {
        info!(applied, version = latest_version(), "database schema updated");
    }
    pool.close().await;
    Ok(())
}

/// Apply pending migrations on an open pool. Returns how many were applied.
pub async fn migrate(pool: &SqlitePool) -> Result<usize> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    let current = current_version(pool).await?;
    let mut applied = 0;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        let mut tx = pool.begin().await?;
        for statement in migration.statements {
            sqlx::query(*statement)
                .execute(&mut *tx)
                .await
                .with_context(|| {
                    format!(
                        "Migration {} ({}) failed",
                        migration.version, migration.name
                    )
                })?;
        }
        sqlx::query("INSERT INTO schema_migrations (version, name, applied_at) VALUES (?, ?, ?)")
            .bind(migration.version)
            .bind(migration.name)
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(
            version = migration.version,
            name = migration.name,
            "applied migration"
        );
        applied += 1;
    }

    Ok(applied)
}

pub async fn current_version(pool: &SqlitePool) -> Result<i64> {
    let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_migrations")
        .fetch_one(pool)
        .await?;
    Ok(version.unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DbConfig};
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> Config {
        Config {
            db: DbConfig {
                path: dir.path().join("data").join("sctx.sqlite"),
            },
            capture: Default::default(),
            storage: Default::default(),
            server: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let pool = db::connect(&config_in(&dir)).await.unwrap();

        assert_eq!(migrate(&pool).await.unwrap(), MIGRATIONS.len());
        assert_eq!(migrate(&pool).await.unwrap(), 0);
        assert_eq!(current_version(&pool).await.unwrap(), latest_version());

        let recorded: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_migrations")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(recorded, MIGRATIONS.len() as i64);
    }

    #[tokio::test]
    async fn test_schema_has_all_columns() {
        let dir = TempDir::new().unwrap();
        let pool = db::connect(&config_in(&dir)).await.unwrap();
        migrate(&pool).await.unwrap();

        let columns: Vec<String> =
            sqlx::query_scalar("SELECT name FROM pragma_table_info('screenshots')")
                .fetch_all(&pool)
                .await
                .unwrap();
        for expected in [
            "id",
            "filepath",
            "captured_at",
            "image_hash",
            "file_size",
            "width",
            "height",
            "content_sha256",
            "nearest_distance",
        ] {
            assert!(columns.iter().any(|c| c == expected), "missing {}", expected);
        }
    }

    #[tokio::test]
    async fn test_run_migrations_creates_database_file() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        run_migrations(&config).await.unwrap();
        run_migrations(&config).await.unwrap();
        assert!(config.db.path.exists());
    }
}
