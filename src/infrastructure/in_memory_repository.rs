//! In-memory record and audit stores
//!
//! Same semantics as the SQLite stores: unique studbook ids, monotonically
//! increasing internal ids that are never reused, append-only reports.
//! Used by tests and `--dry-run`.

use std::collections::{BTreeMap, HashMap};

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::domain::horse::{Horse, HorseUpdate, NewHorse};
use crate::domain::report::{NewReport, Report};
use crate::domain::repositories::{HorseRepository, ReportRepository};
use crate::domain::value_objects::{HorseId, StudbookId};

#[derive(Debug, Default)]
struct HorseTable {
    rows: BTreeMap<HorseId, Horse>,
    by_studbook_id: HashMap<StudbookId, HorseId>,
    last_id: i64,
}

impl HorseTable {
    fn insert(&mut self, horse: NewHorse) -> Horse {
        self.last_id += 1;
        let id = HorseId(self.last_id);
        let studbook_id = horse.studbook.id;
        let horse = horse.into_horse(id, Utc::now());
        self.by_studbook_id.insert(studbook_id, id);
        self.rows.insert(id, horse.clone());
        horse
    }
}

#[derive(Debug, Default)]
pub struct InMemoryHorseRepository {
    table: Mutex<HorseTable>,
}

impl InMemoryHorseRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<Horse> {
        self.table.lock().await.rows.values().cloned().collect()
    }
}

#[async_trait]
impl HorseRepository for InMemoryHorseRepository {
    async fn find_by_studbook_id(&self, studbook_id: StudbookId) -> Result<Option<Horse>> {
        let table = self.table.lock().await;
        Ok(table
            .by_studbook_id
            .get(&studbook_id)
            .and_then(|id| table.rows.get(id))
            .cloned())
    }

    async fn create(&self, horse: NewHorse) -> Result<Horse> {
        let mut table = self.table.lock().await;
        if table.by_studbook_id.contains_key(&horse.studbook.id) {
            bail!("Horse with studbook id {} already exists", horse.studbook.id);
        }
        Ok(table.insert(horse))
    }

    async fn insert_stub_if_absent(&self, studbook_id: StudbookId, name: &str) -> Result<(Horse, bool)> {
        let mut table = self.table.lock().await;
        if let Some(existing) = table.by_studbook_id.get(&studbook_id).and_then(|id| table.rows.get(id)) {
            return Ok((existing.clone(), false));
        }
        Ok((table.insert(NewHorse::stub(studbook_id, name)), true))
    }

    async fn update(&self, id: HorseId, update: &HorseUpdate) -> Result<Option<Horse>> {
        let mut table = self.table.lock().await;
        Ok(table.rows.get_mut(&id).map(|horse| {
            update.apply_to(horse, Utc::now());
            horse.clone()
        }))
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.table.lock().await.rows.len() as u64)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryReportRepository {
    reports: Mutex<Vec<Report>>,
}

impl InMemoryReportRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<Report> {
        self.reports.lock().await.clone()
    }
}

#[async_trait]
impl ReportRepository for InMemoryReportRepository {
    async fn append(&self, report: NewReport) -> Result<Report> {
        let mut reports = self.reports.lock().await;
        let stored = Report {
            id: i64::try_from(reports.len())? + 1,
            report,
            created_at: Utc::now(),
        };
        reports.push(stored.clone());
        Ok(stored)
    }

    async fn list_for_studbook_id(&self, studbook_id: StudbookId) -> Result<Vec<Report>> {
        Ok(self
            .reports
            .lock()
            .await
            .iter()
            .filter(|r| r.report.studbook_id == Some(studbook_id))
            .cloned()
            .collect())
    }
}
