//! SQLite audit store. Reports are append-only.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::domain::report::{NewReport, Outcome, Report};
use crate::domain::repositories::ReportRepository;
use crate::domain::value_objects::StudbookId;

#[derive(Clone)]
pub struct SqliteReportRepository {
    pool: Arc<SqlitePool>,
}

impl SqliteReportRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool: Arc::new(pool) }
    }
}

fn report_from_row(row: &SqliteRow) -> Result<Report> {
    let outcome: String = row.try_get("outcome")?;
    let studbook_id: Option<i64> = row.try_get("studbook_id")?;
    Ok(Report {
        id: row.try_get("id")?,
        report: NewReport {
            event: row.try_get("event")?,
            message: row.try_get("message")?,
            url: row.try_get("url")?,
            outcome: Outcome::parse(&outcome).ok_or_else(|| anyhow!("Unknown report outcome: {outcome}"))?,
            studbook_id: studbook_id.map(StudbookId::try_from).transpose()?,
        },
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl ReportRepository for SqliteReportRepository {
    async fn append(&self, report: NewReport) -> Result<Report> {
        let created_at = Utc::now();
        let result = sqlx::query(
            r"
            INSERT INTO reports (event, message, url, outcome, studbook_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&report.event)
        .bind(&report.message)
        .bind(&report.url)
        .bind(report.outcome.as_str())
        .bind(report.studbook_id.map(i64::from))
        .bind(created_at)
        .execute(&*self.pool)
        .await?;

        Ok(Report {
            id: result.last_insert_rowid(),
            report,
            created_at,
        })
    }

    async fn list_for_studbook_id(&self, studbook_id: StudbookId) -> Result<Vec<Report>> {
        let rows = sqlx::query(
            r"
            SELECT id, event, message, url, outcome, studbook_id, created_at
            FROM reports
            WHERE studbook_id = ?
            ORDER BY id ASC
            ",
        )
        .bind(i64::from(studbook_id))
        .fetch_all(&*self.pool)
        .await?;

        rows.iter().map(report_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database_connection::DatabaseConnection;
    use tempfile::TempDir;

    #[tokio::test]
    async fn appended_reports_are_listed_in_order() {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite:{}", dir.path().join("reports.db").display());
        let db = DatabaseConnection::new(&url).await.unwrap();
        db.migrate().await.unwrap();
        let repo = SqliteReportRepository::new(db.pool().clone());

        let first = repo.append(NewReport::invalid_id(777, "u")).await.unwrap();
        let second = repo.append(NewReport::success(777, "u")).await.unwrap();
        repo.append(NewReport::success(778, "u")).await.unwrap();

        assert!(second.id > first.id);
        let listed = repo.list_for_studbook_id(777).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].report.outcome, Outcome::InvalidId);
        assert_eq!(listed[1].report.outcome, Outcome::Success);
    }
}
