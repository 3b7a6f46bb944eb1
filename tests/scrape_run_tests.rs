//! End-to-end scrape runs against a scripted browser, the real page extractor
//! and in-memory or SQLite stores.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

use studbook_scraper_lib::crawling::{
    CrawlingError, NavigationPolicy, ScrapeContext, ScrapeCoordinator, ScrapeRun, SnapshotArchiver,
    handle_trigger_body,
};
use studbook_scraper_lib::domain::report::Outcome;
use studbook_scraper_lib::domain::repositories::{HorseRepository, ReportRepository};
use studbook_scraper_lib::domain::services::{
    BrowserError, BrowserLauncher, BrowserSession, LoadedPage, LoginConfig, LoginOutcome, SavedSession,
    SessionStore,
};
use studbook_scraper_lib::domain::value_objects::StudbookId;
use studbook_scraper_lib::infrastructure::config::SiteConfig;
use studbook_scraper_lib::infrastructure::{
    DatabaseConnection, FileSessionStore, FsObjectStore, HorseDetailParser, InMemoryHorseRepository,
    InMemoryReportRepository, SqliteHorseRepository, SqliteReportRepository,
};

const HORSE_900: &str = include_str!("fixtures/horse_900.html");
const SERVER_ERROR: &str = include_str!("fixtures/server_error.html");

#[derive(Clone, Copy)]
enum Response {
    Page(&'static str),
    Hang,
}

/// Per-url responses shared by every session of a launcher; unscripted urls get the error page
#[derive(Default)]
struct Script {
    responses: Mutex<HashMap<String, VecDeque<Response>>>,
    navigations: Mutex<Vec<String>>,
    restored_cookies: Mutex<Vec<String>>,
}

impl Script {
    fn respond(&self, url: &str, responses: &[Response]) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), responses.iter().copied().collect());
    }

    fn navigations_to(&self, url: &str) -> usize {
        self.navigations.lock().unwrap().iter().filter(|u| *u == url).count()
    }
}

struct ScriptedSession {
    script: Arc<Script>,
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    async fn navigate(&mut self, url: &str) -> Result<LoadedPage, BrowserError> {
        self.script.navigations.lock().unwrap().push(url.to_string());
        let next = self
            .script
            .responses
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Response::Page(SERVER_ERROR));
        match next {
            Response::Page(html) => Ok(LoadedPage {
                url: url.to_string(),
                status: 200,
                html: html.to_string(),
            }),
            Response::Hang => std::future::pending().await,
        }
    }

    async fn login(&mut self, _login: &LoginConfig) -> Result<LoginOutcome, BrowserError> {
        Ok(LoginOutcome::LoggedIn)
    }

    fn export_session(&self, site: &str) -> SavedSession {
        SavedSession {
            site: site.to_string(),
            cookies: vec!["ASP.NET_SessionId=scripted".to_string()],
            saved_at: Utc::now(),
        }
    }

    fn restore_session(&mut self, session: &SavedSession) -> Result<(), BrowserError> {
        self.script
            .restored_cookies
            .lock()
            .unwrap()
            .extend(session.cookies.iter().cloned());
        Ok(())
    }

    async fn close(&mut self) {}
}

struct ScriptedLauncher {
    script: Arc<Script>,
}

#[async_trait]
impl BrowserLauncher for ScriptedLauncher {
    async fn launch(&self, _worker_index: usize) -> Result<Box<dyn BrowserSession>, BrowserError> {
        Ok(Box::new(ScriptedSession {
            script: Arc::clone(&self.script),
        }))
    }
}

struct Setup {
    script: Arc<Script>,
    horses: Arc<dyn HorseRepository>,
    reports: Arc<dyn ReportRepository>,
    sessions: Option<Arc<dyn SessionStore>>,
    archiver: Option<Arc<SnapshotArchiver>>,
}

impl Setup {
    fn in_memory() -> Self {
        Self {
            script: Arc::new(Script::default()),
            horses: Arc::new(InMemoryHorseRepository::new()),
            reports: Arc::new(InMemoryReportRepository::new()),
            sessions: None,
            archiver: None,
        }
    }

    async fn sqlite(dir: &TempDir) -> Self {
        let url = format!("sqlite:{}", dir.path().join("studbook.db").display());
        let db = DatabaseConnection::new(&url).await.unwrap();
        db.migrate().await.unwrap();
        Self {
            horses: Arc::new(SqliteHorseRepository::new(db.pool().clone())),
            reports: Arc::new(SqliteReportRepository::new(db.pool().clone())),
            ..Self::in_memory()
        }
    }

    fn url(id: StudbookId) -> String {
        SiteConfig::default().detail_url(id)
    }

    fn coordinator(&self) -> ScrapeCoordinator {
        let context = ScrapeContext {
            site: SiteConfig::default(),
            navigation: NavigationPolicy {
                attempts: 3,
                backoff: Duration::from_secs(5),
                timeout: Duration::from_secs(60),
            },
            horses: Arc::clone(&self.horses),
            reports: Arc::clone(&self.reports),
            extractor: Arc::new(HorseDetailParser::new().unwrap()),
            sessions: self.sessions.clone(),
            archiver: self.archiver.clone(),
        };
        let launcher = Arc::new(ScriptedLauncher {
            script: Arc::clone(&self.script),
        });
        ScrapeCoordinator::new(context, launcher)
    }
}

fn run(start_id: StudbookId, end_id: StudbookId, delay: Duration, workers: usize) -> ScrapeRun {
    ScrapeRun {
        start_id,
        end_id,
        delay,
        workers,
    }
}

#[tokio::test(start_paused = true)]
async fn every_id_is_claimed_exactly_once_across_workers() {
    let setup = Setup::in_memory();

    let summary = setup
        .coordinator()
        .run(run(1, 60, Duration::from_millis(250), 4))
        .await
        .unwrap();

    assert_eq!(summary.completed, 60);
    let mut seen = Vec::new();
    for id in 1..=60 {
        let reports = setup.reports.list_for_studbook_id(id).await.unwrap();
        assert_eq!(reports.len(), 1, "id {id} must have exactly one report");
        seen.push(id);
        assert_eq!(setup.script.navigations_to(&Setup::url(id)), 1);
    }
    assert_eq!(seen.into_iter().collect::<BTreeSet<_>>().len(), 60);
    assert_eq!(setup.script.navigations.lock().unwrap().len(), 60);
}

#[tokio::test(start_paused = true)]
async fn three_timeouts_report_navigation_error_and_continue() {
    let setup = Setup::in_memory();
    setup
        .script
        .respond(&Setup::url(500), &[Response::Hang, Response::Hang, Response::Hang]);

    let summary = setup
        .coordinator()
        .run(run(500, 501, Duration::from_secs(2), 1))
        .await
        .unwrap();

    let reports = setup.reports.list_for_studbook_id(500).await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].report.outcome, Outcome::NavigationError);
    assert_eq!(reports[0].report.studbook_id, Some(500));
    assert!(setup.horses.find_by_studbook_id(500).await.unwrap().is_none());

    assert_eq!(setup.script.navigations_to(&Setup::url(500)), 3);
    assert_eq!(setup.script.navigations_to(&Setup::url(501)), 1);
    assert_eq!(summary.count(Outcome::NavigationError), 1);
    assert_eq!(summary.completed, 2);
}

#[tokio::test(start_paused = true)]
async fn site_error_reports_invalid_id_and_paces() {
    let setup = Setup::in_memory();
    let started = tokio::time::Instant::now();

    let summary = setup
        .coordinator()
        .run(run(777, 777, Duration::from_secs(2), 1))
        .await
        .unwrap();

    let reports = setup.reports.list_for_studbook_id(777).await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].report.outcome, Outcome::InvalidId);
    assert_eq!(setup.horses.count().await.unwrap(), 0);
    assert_eq!(summary.count(Outcome::InvalidId), 1);
    assert!(started.elapsed() >= Duration::from_secs(2));
}

#[tokio::test]
async fn successful_scrape_persists_entity_pedigree_and_report() {
    let dir = TempDir::new().unwrap();
    let setup = Setup::sqlite(&dir).await;
    setup.script.respond(&Setup::url(900), &[Response::Page(HORSE_900)]);

    let summary = setup.coordinator().run(run(900, 900, Duration::ZERO, 1)).await.unwrap();
    assert_eq!(summary.count(Outcome::Success), 1);

    let horse = setup.horses.find_by_studbook_id(900).await.unwrap().unwrap();
    assert_eq!(horse.name, "Moonlight Sonata");
    assert_eq!(horse.studbook.first_scraped, horse.studbook.last_scraped);
    assert!(horse.pedigree_info.len() <= 7);
    assert_eq!(horse.pedigree_info.len(), 7);
    for triple in &horse.pedigree_info {
        for member in [&triple.horse, &triple.father, &triple.mother] {
            assert!(member.id.value() > 0);
        }
    }
    assert_eq!(horse.pedigree_info[0].horse.id, horse.id);
    assert_eq!(horse.pedigree_info[0].father.name, "Todman");
    assert_eq!(horse.pedigree_info[0].mother.name, "Evening Song");
    assert_eq!(horse.taproot.as_ref().map(|t| t.studbook_id), Some(55));

    // 14 distinct pedigree ids (one common ancestor) plus the taproot
    assert_eq!(setup.horses.count().await.unwrap(), 15);

    let reports = setup.reports.list_for_studbook_id(900).await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].report.outcome, Outcome::Success);
}

#[tokio::test]
async fn rescrape_is_idempotent_and_keeps_first_scraped() {
    let dir = TempDir::new().unwrap();
    let setup = Setup::sqlite(&dir).await;
    setup
        .script
        .respond(&Setup::url(900), &[Response::Page(HORSE_900), Response::Page(HORSE_900)]);
    let coordinator = setup.coordinator();

    assert_ok!(coordinator.run(run(900, 900, Duration::ZERO, 1)).await);
    let first = setup.horses.find_by_studbook_id(900).await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_ok!(coordinator.run(run(900, 900, Duration::ZERO, 1)).await);
    let second = setup.horses.find_by_studbook_id(900).await.unwrap().unwrap();

    assert_eq!(setup.horses.count().await.unwrap(), 15);
    assert_eq!(second.id, first.id);
    assert_eq!(second.studbook.first_scraped, first.studbook.first_scraped);
    assert!(second.studbook.last_scraped > first.studbook.last_scraped);
    assert_eq!(second.pedigree_info, first.pedigree_info);
    assert_eq!(setup.reports.list_for_studbook_id(900).await.unwrap().len(), 2);
}

#[tokio::test]
async fn session_is_saved_and_restored_between_runs() {
    let dir = TempDir::new().unwrap();
    let mut setup = Setup::in_memory();
    setup.sessions = Some(Arc::new(FileSessionStore::new(dir.path().join("cookies.json"))));

    assert_ok!(setup.coordinator().run(run(1, 1, Duration::ZERO, 1)).await);
    assert!(setup.script.restored_cookies.lock().unwrap().is_empty());

    assert_ok!(setup.coordinator().run(run(2, 2, Duration::ZERO, 1)).await);
    assert_eq!(
        *setup.script.restored_cookies.lock().unwrap(),
        vec!["ASP.NET_SessionId=scripted".to_string()]
    );
}

#[tokio::test]
async fn snapshots_are_archived_for_loaded_pages() {
    let dir = TempDir::new().unwrap();
    let mut setup = Setup::in_memory();
    let store = Arc::new(FsObjectStore::new(dir.path().join("archive")));
    setup.archiver = Some(Arc::new(SnapshotArchiver::new(store, dir.path().join("scratch"))));
    setup.script.respond(&Setup::url(900), &[Response::Page(HORSE_900)]);

    assert_ok!(setup.coordinator().run(run(900, 900, Duration::ZERO, 1)).await);

    let mut entries = tokio::fs::read_dir(dir.path().join("archive").join("snapshots")).await.unwrap();
    let entry = entries.next_entry().await.unwrap().unwrap();
    let name = entry.file_name().to_string_lossy().to_string();
    assert!(name.starts_with("horse_aspx_hid_900_"));
    assert!(name.ends_with(".html"));
}

#[tokio::test(start_paused = true)]
async fn inverted_range_fails_fast() {
    let setup = Setup::in_memory();
    let result = setup.coordinator().run(run(20, 10, Duration::ZERO, 1)).await;
    let error = assert_err!(result);
    assert!(matches!(error, CrawlingError::Configuration(_)));
    assert!(setup.script.navigations.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn trigger_body_runs_scrape_and_answers_200() {
    let setup = Setup::in_memory();
    setup.script.respond(&Setup::url(900), &[Response::Page(HORSE_900)]);

    let response = handle_trigger_body(
        &setup.coordinator(),
        r#"{"startId": 899, "endId": 900, "delayMs": 0, "numBrowsers": 2}"#,
    )
    .await;

    assert_eq!(response.status_code, 200);
    assert_eq!(response.body["message"], "Scraping completed successfully");
    assert_eq!(response.body["summary"]["completed"], 2);
    assert!(setup.horses.find_by_studbook_id(900).await.unwrap().is_some());
}
