//! Scrape worker
//!
//! Owns one browser session for its whole life. Per id:
//! claim -> navigate (bounded retries) -> archive snapshot -> server error
//! check -> extract -> reconcile pedigree -> upsert -> append report -> pace.
//! Every claimed id produces exactly one audit report; no per-id failure
//! escapes the loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::crawling::id_counter::IdCounter;
use crate::crawling::navigation::{NavigationOutcome, NavigationPolicy, navigate_with_retry};
use crate::crawling::pedigree_reconciler::PedigreeReconciler;
use crate::crawling::progress::UnitResult;
use crate::crawling::snapshot::SnapshotArchiver;
use crate::crawling::upserter::{HorseUpserter, fields_from_info};
use crate::domain::report::NewReport;
use crate::domain::repositories::{HorseRepository, ReportRepository};
use crate::domain::services::{BrowserSession, LoginOutcome, SessionStore};
use crate::domain::value_objects::StudbookId;
use crate::infrastructure::config::SiteConfig;
use crate::infrastructure::parsing::PageExtractor;

/// Collaborators shared by every worker of a run
pub struct ScrapeContext {
    pub site: SiteConfig,
    pub navigation: NavigationPolicy,
    pub horses: Arc<dyn HorseRepository>,
    pub reports: Arc<dyn ReportRepository>,
    pub extractor: Arc<dyn PageExtractor>,
    pub sessions: Option<Arc<dyn SessionStore>>,
    pub archiver: Option<Arc<SnapshotArchiver>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    pub worker: usize,
    pub processed: u64,
}

pub struct Worker {
    index: usize,
    session: Box<dyn BrowserSession>,
    context: Arc<ScrapeContext>,
    counter: Arc<IdCounter>,
    delay: Duration,
    cancel: CancellationToken,
    reconciler: PedigreeReconciler,
    upserter: HorseUpserter,
}

impl Worker {
    pub fn new(
        index: usize,
        session: Box<dyn BrowserSession>,
        context: Arc<ScrapeContext>,
        counter: Arc<IdCounter>,
        delay: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let reconciler = PedigreeReconciler::new(Arc::clone(&context.horses));
        let upserter = HorseUpserter::new(Arc::clone(&context.horses));
        Self {
            index,
            session,
            context,
            counter,
            delay,
            cancel,
            reconciler,
            upserter,
        }
    }

    /// Restore saved cookies, log in if the site still asks for it, save the session.
    /// Failures are logged; the worker continues unauthenticated.
    pub async fn prepare_session(&mut self) {
        let site = self.context.site.site_key();

        if let Some(store) = &self.context.sessions {
            match store.load(&site).await {
                Some(saved) => {
                    if let Err(e) = self.session.restore_session(&saved) {
                        warn!(worker = self.index, error = %e, "Ignoring saved session");
                    }
                }
                None => debug!(worker = self.index, site = %site, "No saved session"),
            }
        }

        match self.session.login(&self.context.site.login_config()).await {
            Ok(LoginOutcome::SkippedNoCredentials) => {}
            Ok(outcome) => {
                debug!(worker = self.index, ?outcome, "Login finished");
                if let Some(store) = &self.context.sessions {
                    let snapshot = self.session.export_session(&site);
                    if let Err(e) = store.save(&snapshot).await {
                        warn!(worker = self.index, "Failed to save session: {:#}", e);
                    }
                }
            }
            Err(e) => warn!(worker = self.index, error = %e, "Login failed, continuing without it"),
        }
    }

    /// Process ids until the counter is exhausted or the run is cancelled.
    /// Cancellation is checked before every claim, so an in-flight unit always finishes.
    pub async fn run(mut self, results: mpsc::UnboundedSender<UnitResult>) -> WorkerStats {
        info!(worker = self.index, "Worker started");
        self.prepare_session().await;

        let mut processed = 0;
        loop {
            if self.cancel.is_cancelled() {
                info!(worker = self.index, "Cancellation requested, no further ids claimed");
                break;
            }
            let Some(studbook_id) = self.counter.claim() else {
                break;
            };

            let unit = self.process(studbook_id).await;
            processed += 1;
            if results.send(unit).is_err() {
                debug!(worker = self.index, "Progress receiver gone");
            }

            pace(&self.cancel, self.delay).await;
        }

        self.session.close().await;
        info!(worker = self.index, processed, "Worker finished");
        WorkerStats {
            worker: self.index,
            processed,
        }
    }

    /// One unit of work, ending in exactly one report append
    pub async fn process(&mut self, studbook_id: StudbookId) -> UnitResult {
        let started = Instant::now();
        let url = self.context.site.detail_url(studbook_id);
        info!(worker = self.index, studbook_id, "Scraping horse");

        let report = self.scrape(studbook_id, &url).await;
        let outcome = report.outcome;
        if let Err(e) = self.context.reports.append(report).await {
            error!(worker = self.index, studbook_id, "Failed to append report: {:#}", e);
        }

        UnitResult {
            worker: self.index,
            studbook_id,
            outcome,
            duration: started.elapsed(),
        }
    }

    async fn scrape(&mut self, studbook_id: StudbookId, url: &str) -> NewReport {
        let policy = self.context.navigation;
        let page = match navigate_with_retry(self.session.as_mut(), url, policy).await {
            NavigationOutcome::Loaded { page, .. } => page,
            NavigationOutcome::Exhausted { attempts, last_error } => {
                error!(
                    worker = self.index,
                    studbook_id,
                    attempts,
                    error = %last_error,
                    "Failed to navigate, skipping"
                );
                return NewReport::navigation_failed(studbook_id, url, attempts);
            }
        };

        if let Some(archiver) = &self.context.archiver {
            if let Err(e) = archiver.archive(&page).await {
                warn!(worker = self.index, studbook_id, "Snapshot not archived: {:#}", e);
            }
        }

        if self.context.extractor.is_server_error(&page) {
            info!(worker = self.index, studbook_id, "Server error page, skipping");
            return NewReport::invalid_id(studbook_id, url);
        }

        let info = match self.context.extractor.extract(&page) {
            Ok(info) => info,
            Err(e) => {
                warn!(worker = self.index, studbook_id, error = %e, "Nothing saved");
                return NewReport::missing_data(studbook_id, url, e.missing_field().unwrap_or("data"));
            }
        };

        let pedigree = self.reconciler.reconcile(&info.pedigree, info.taproot.as_ref()).await;
        let fields = fields_from_info(&info, &pedigree);

        match self.upserter.upsert(studbook_id, fields, Utc::now()).await {
            Ok(outcome) => {
                debug!(
                    worker = self.index,
                    studbook_id,
                    created = outcome.was_created(),
                    triples = pedigree.triples.len(),
                    "Horse saved"
                );
                NewReport::success(studbook_id, url)
            }
            Err(e) => {
                error!(worker = self.index, studbook_id, "Failed to save horse: {:#}", e);
                NewReport::persistence_failed(studbook_id, url, &format!("{e:#}"))
            }
        }
    }
}

/// Fixed delay after every unit, cut short by cancellation
async fn pace(cancel: &CancellationToken, delay: Duration) {
    tokio::select! {
        () = cancel.cancelled() => {}
        () = tokio::time::sleep(delay) => {}
    }
}
