//! # Crawling Module
//!
//! Scraping-and-reconciliation core: shared id counter, navigation retry
//! state machine, pedigree reconciler, horse upserter, worker loop,
//! progress aggregation, coordinator and the inbound trigger.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::config::ConfigError;

pub mod coordinator;
pub mod id_counter;
pub mod navigation;
pub mod pedigree_reconciler;
pub mod progress;
pub mod snapshot;
pub mod trigger;
pub mod upserter;
pub mod worker;

pub use coordinator::{ScrapeCoordinator, ScrapeRun};
pub use id_counter::IdCounter;
pub use navigation::{NavigationOutcome, NavigationPolicy, navigate_with_retry};
pub use pedigree_reconciler::{PedigreeReconciler, ReconciledPedigree};
pub use progress::{LoggingProgressObserver, ProgressObserver, ProgressSnapshot, ScrapeSummary, UnitResult};
pub use snapshot::SnapshotArchiver;
pub use trigger::{ScrapeRequest, TriggerResponse, handle_trigger_body, start_scraper};
pub use upserter::{HorseUpserter, UpsertOutcome};
pub use worker::{ScrapeContext, Worker, WorkerStats};

/// Run-level failures. Per-id failures never surface here.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum CrawlingError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No browser session could be started: {0}")]
    NoWorkersStarted(String),
}

impl From<ConfigError> for CrawlingError {
    fn from(error: ConfigError) -> Self {
        Self::Configuration(error.to_string())
    }
}
