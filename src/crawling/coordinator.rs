//! Scrape coordinator
//!
//! Launches N workers that race on one shared id counter, aggregates their
//! unit results into progress snapshots and waits for all of them. Only
//! configuration problems fail a run; per-id failures end up as reports.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::crawling::CrawlingError;
use crate::crawling::id_counter::IdCounter;
use crate::crawling::progress::{LoggingProgressObserver, ProgressObserver, ProgressTracker, ScrapeSummary};
use crate::crawling::worker::{ScrapeContext, Worker};
use crate::domain::services::BrowserLauncher;
use crate::domain::value_objects::StudbookId;

/// Parameters of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrapeRun {
    pub start_id: StudbookId,
    pub end_id: StudbookId,
    pub delay: Duration,
    pub workers: usize,
}

impl ScrapeRun {
    pub fn validate(&self) -> Result<(), CrawlingError> {
        if self.start_id > self.end_id {
            return Err(CrawlingError::Configuration(format!(
                "start id {} is greater than end id {}",
                self.start_id, self.end_id
            )));
        }
        if self.workers == 0 {
            return Err(CrawlingError::Configuration("at least one browser is required".into()));
        }
        Ok(())
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        u64::from(self.end_id.saturating_sub(self.start_id)) + 1
    }
}

pub struct ScrapeCoordinator {
    context: Arc<ScrapeContext>,
    launcher: Arc<dyn BrowserLauncher>,
    observer: Arc<dyn ProgressObserver>,
    cancel: CancellationToken,
}

impl ScrapeCoordinator {
    pub fn new(context: ScrapeContext, launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self {
            context: Arc::new(context),
            launcher,
            observer: Arc::new(LoggingProgressObserver::default()),
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Cancelling stops every worker before its next claim
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run(&self, run: ScrapeRun) -> Result<ScrapeSummary, CrawlingError> {
        run.validate()?;
        info!(
            start_id = run.start_id,
            end_id = run.end_id,
            workers = run.workers,
            delay_ms = u64::try_from(run.delay.as_millis()).unwrap_or(u64::MAX),
            "Starting scrape"
        );

        let counter = Arc::new(IdCounter::new(run.start_id, run.end_id));
        let (results_tx, mut results_rx) = mpsc::unbounded_channel();
        let mut workers = JoinSet::new();
        let mut last_launch_error = None;

        let launches = join_all((0..run.workers).map(|index| self.launcher.launch(index))).await;
        for (index, launch) in launches.into_iter().enumerate() {
            match launch {
                Ok(session) => {
                    let worker = Worker::new(
                        index,
                        session,
                        Arc::clone(&self.context),
                        Arc::clone(&counter),
                        run.delay,
                        self.cancel.clone(),
                    );
                    workers.spawn(worker.run(results_tx.clone()));
                }
                Err(e) => {
                    error!(worker = index, error = %e, "Failed to launch browser");
                    last_launch_error = Some(e);
                }
            }
        }
        drop(results_tx);

        let launched = workers.len();
        if launched == 0 {
            let reason = last_launch_error.map_or_else(|| "no browsers requested".to_string(), |e| e.to_string());
            return Err(CrawlingError::NoWorkersStarted(reason));
        }

        let mut tracker = ProgressTracker::new(run.total());
        while let Some(unit) = results_rx.recv().await {
            let snapshot = tracker.record(&unit);
            self.observer.on_progress(&snapshot);
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(stats) => debug!(worker = stats.worker, processed = stats.processed, "Worker joined"),
                Err(e) => error!(error = %e, "Worker task aborted"),
            }
        }

        let summary = ScrapeSummary {
            start_id: run.start_id,
            end_id: run.end_id,
            workers: launched,
            completed: tracker.completed(),
            outcomes: tracker.outcomes().clone(),
            elapsed: tracker.elapsed(),
            cancelled: self.cancel.is_cancelled(),
        };
        self.observer.on_finished(&summary);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawling::navigation::NavigationPolicy;
    use crate::domain::report::Outcome;
    use crate::domain::services::{BrowserError, BrowserSession, LoadedPage, LoginConfig, LoginOutcome, SavedSession};
    use crate::infrastructure::config::SiteConfig;
    use crate::infrastructure::in_memory_repository::{InMemoryHorseRepository, InMemoryReportRepository};
    use crate::infrastructure::parsing::HorseDetailParser;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ErrorPageSession;

    #[async_trait]
    impl BrowserSession for ErrorPageSession {
        async fn navigate(&mut self, url: &str) -> Result<LoadedPage, BrowserError> {
            Ok(LoadedPage {
                url: url.to_string(),
                status: 500,
                html: "<h1>Server Error in '/' Application.</h1>".to_string(),
            })
        }
        async fn login(&mut self, _login: &LoginConfig) -> Result<LoginOutcome, BrowserError> {
            Ok(LoginOutcome::SkippedNoCredentials)
        }
        fn export_session(&self, site: &str) -> SavedSession {
            SavedSession {
                site: site.to_string(),
                cookies: Vec::new(),
                saved_at: Utc::now(),
            }
        }
        fn restore_session(&mut self, _session: &SavedSession) -> Result<(), BrowserError> {
            Ok(())
        }
        async fn close(&mut self) {}
    }

    /// Every launch after the first `working` ones fails
    struct FlakyLauncher {
        working: usize,
        launched: AtomicUsize,
    }

    #[async_trait]
    impl BrowserLauncher for FlakyLauncher {
        async fn launch(&self, _worker_index: usize) -> Result<Box<dyn BrowserSession>, BrowserError> {
            if self.launched.fetch_add(1, Ordering::SeqCst) < self.working {
                Ok(Box::new(ErrorPageSession))
            } else {
                Err(BrowserError::Launch("no display".into()))
            }
        }
    }

    fn coordinator(working: usize) -> (ScrapeCoordinator, Arc<InMemoryReportRepository>) {
        let reports = Arc::new(InMemoryReportRepository::new());
        let context = ScrapeContext {
            site: SiteConfig::default(),
            navigation: NavigationPolicy {
                attempts: 3,
                backoff: Duration::from_secs(5),
                timeout: Duration::from_secs(60),
            },
            horses: Arc::new(InMemoryHorseRepository::new()),
            reports: reports.clone(),
            extractor: Arc::new(HorseDetailParser::new().unwrap()),
            sessions: None,
            archiver: None,
        };
        let launcher = Arc::new(FlakyLauncher {
            working,
            launched: AtomicUsize::new(0),
        });
        (ScrapeCoordinator::new(context, launcher), reports)
    }

    fn run(start_id: StudbookId, end_id: StudbookId, workers: usize) -> ScrapeRun {
        ScrapeRun {
            start_id,
            end_id,
            delay: Duration::from_millis(10),
            workers,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn inverted_range_fails_before_launching() {
        let (coordinator, reports) = coordinator(1);

        let result = coordinator.run(run(10, 5, 1)).await;

        assert!(matches!(result, Err(CrawlingError::Configuration(_))));
        assert!(reports.all().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_workers_is_a_configuration_error() {
        let (coordinator, _) = coordinator(1);
        assert!(matches!(
            coordinator.run(run(1, 2, 0)).await,
            Err(CrawlingError::Configuration(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn no_launched_browser_fails_the_run() {
        let (coordinator, _) = coordinator(0);

        let result = coordinator.run(run(1, 3, 2)).await;

        match result {
            Err(CrawlingError::NoWorkersStarted(reason)) => assert!(reason.contains("no display")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn surviving_workers_cover_the_whole_range() {
        let (coordinator, reports) = coordinator(2);

        let summary = coordinator.run(run(100, 119, 4)).await.unwrap();

        assert_eq!(summary.workers, 2);
        assert_eq!(summary.completed, 20);
        assert_eq!(summary.count(Outcome::InvalidId), 20);
        assert!(!summary.cancelled);
        let mut ids: Vec<_> = reports
            .all()
            .await
            .into_iter()
            .filter_map(|r| r.report.studbook_id)
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, (100..=119).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn pre_cancelled_run_processes_nothing() {
        let (coordinator, reports) = coordinator(1);
        coordinator.cancellation_token().cancel();

        let summary = coordinator.run(run(1, 50, 1)).await.unwrap();

        assert_eq!(summary.completed, 0);
        assert!(summary.cancelled);
        assert!(reports.all().await.is_empty());
    }
}
