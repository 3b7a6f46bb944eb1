//! Audit report entity
//!
//! Append-only: every unit of work produces exactly one report, whatever the outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::value_objects::StudbookId;

pub const SCRAPER_EVENT: &str = "Scraper";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Success,
    NavigationError,
    InvalidId,
    /// Page loaded but the horse name could not be found
    MissingData,
    /// The record store rejected the write
    PersistenceError,
}

impl Outcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::NavigationError => "NAVIGATION_ERROR",
            Self::InvalidId => "INVALID_ID",
            Self::MissingData => "MISSING_DATA",
            Self::PersistenceError => "PERSISTENCE_ERROR",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "SUCCESS" => Some(Self::Success),
            "NAVIGATION_ERROR" => Some(Self::NavigationError),
            "INVALID_ID" => Some(Self::InvalidId),
            "MISSING_DATA" => Some(Self::MissingData),
            "PERSISTENCE_ERROR" => Some(Self::PersistenceError),
            _ => None,
        }
    }
}

/// Report before the audit store has accepted it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReport {
    pub event: String,
    pub message: String,
    pub url: String,
    pub outcome: Outcome,
    pub studbook_id: Option<StudbookId>,
}

impl NewReport {
    #[must_use]
    pub fn scraper(outcome: Outcome, studbook_id: StudbookId, url: &str, message: String) -> Self {
        Self {
            event: SCRAPER_EVENT.to_string(),
            message,
            url: url.to_string(),
            outcome,
            studbook_id: Some(studbook_id),
        }
    }

    #[must_use]
    pub fn success(studbook_id: StudbookId, url: &str) -> Self {
        Self::scraper(
            Outcome::Success,
            studbook_id,
            url,
            format!("Successfully scraped horse ID: {studbook_id}"),
        )
    }

    #[must_use]
    pub fn navigation_failed(studbook_id: StudbookId, url: &str, attempts: u32) -> Self {
        Self::scraper(
            Outcome::NavigationError,
            studbook_id,
            url,
            format!("Navigation failed for horse ID: {studbook_id} after {attempts} attempts. Skipping..."),
        )
    }

    #[must_use]
    pub fn invalid_id(studbook_id: StudbookId, url: &str) -> Self {
        Self::scraper(
            Outcome::InvalidId,
            studbook_id,
            url,
            format!("Server error encountered for horse ID: {studbook_id}. Skipping..."),
        )
    }

    #[must_use]
    pub fn missing_data(studbook_id: StudbookId, url: &str, field: &str) -> Self {
        Self::scraper(
            Outcome::MissingData,
            studbook_id,
            url,
            format!("No {field} found for horse ID: {studbook_id}. Nothing saved"),
        )
    }

    #[must_use]
    pub fn persistence_failed(studbook_id: StudbookId, url: &str, reason: &str) -> Self {
        Self::scraper(
            Outcome::PersistenceError,
            studbook_id,
            url,
            format!("Failed to save horse ID: {studbook_id}: {reason}"),
        )
    }
}

/// Report as stored by the audit store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: i64,
    #[serde(flatten)]
    pub report: NewReport,
    pub created_at: DateTime<Utc>,
}
