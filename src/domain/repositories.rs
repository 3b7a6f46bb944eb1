//! Repository interfaces for the studbook record and audit stores
//!
//! Contains trait definitions for data access used by the crawling core.

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::horse::{Horse, HorseUpdate, NewHorse};
use crate::domain::report::{NewReport, Report};
use crate::domain::value_objects::{HorseId, StudbookId};

#[async_trait]
pub trait HorseRepository: Send + Sync {
    async fn find_by_studbook_id(&self, studbook_id: StudbookId) -> Result<Option<Horse>>;

    /// Fails if a record with the same studbook id already exists
    async fn create(&self, horse: NewHorse) -> Result<Horse>;

    /// Atomic insert-if-absent keyed by studbook id.
    /// Returns the stored record and whether this call created it.
    async fn insert_stub_if_absent(&self, studbook_id: StudbookId, name: &str) -> Result<(Horse, bool)>;

    /// Partial update; `None` when no record has that internal id
    async fn update(&self, id: HorseId, update: &HorseUpdate) -> Result<Option<Horse>>;

    async fn count(&self) -> Result<u64>;
}

#[async_trait]
pub trait ReportRepository: Send + Sync {
    async fn append(&self, report: NewReport) -> Result<Report>;
    async fn list_for_studbook_id(&self, studbook_id: StudbookId) -> Result<Vec<Report>>;
}
