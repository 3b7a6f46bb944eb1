// Database connection and pool management
// This module handles SQLite database connections using sqlx

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing::info;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        let in_memory = database_url.contains(":memory:");

        if !in_memory {
            let db_path = database_url
                .trim_start_matches("sqlite://")
                .trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(db_path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database url: {database_url}"))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        // every in-memory connection would see its own empty database
        let max_connections = if in_memory { 1 } else { 10 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context("Failed to open database")?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        // AUTOINCREMENT: internal ids are never reused, even after deletes
        let create_horses_sql = r"
            CREATE TABLE IF NOT EXISTS horses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                studbook_id INTEGER NOT NULL UNIQUE,
                name TEXT NOT NULL,
                first_scraped DATETIME,
                last_scraped DATETIME,
                sex TEXT,
                color TEXT,
                date_of_birth DATETIME,
                status TEXT,
                deceased_date DATETIME,
                life_number TEXT,
                microchip_number TEXT,
                dna_typed TEXT,
                aust_id TEXT,
                bred_by TEXT,
                family TEXT,
                foal_ref TEXT,
                taproot_name TEXT,
                taproot_studbook_id INTEGER,
                taproot_id INTEGER,
                pedigree_info TEXT NOT NULL DEFAULT '[]',
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            )
        ";

        let create_reports_sql = r"
            CREATE TABLE IF NOT EXISTS reports (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event TEXT NOT NULL,
                message TEXT NOT NULL,
                url TEXT NOT NULL,
                outcome TEXT NOT NULL,
                studbook_id INTEGER,
                created_at DATETIME NOT NULL
            )
        ";

        let create_indexes_sql = r"
            CREATE INDEX IF NOT EXISTS idx_reports_studbook_id ON reports (studbook_id);
            CREATE INDEX IF NOT EXISTS idx_reports_outcome ON reports (outcome);
        ";

        sqlx::query(create_horses_sql).execute(&self.pool).await?;
        sqlx::query(create_reports_sql).execute(&self.pool).await?;
        sqlx::raw_sql(create_indexes_sql).execute(&self.pool).await?;

        info!("Database schema ready");
        Ok(())
    }
}
