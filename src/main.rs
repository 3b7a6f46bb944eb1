//! Studbook scraper command line front end

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use studbook_scraper_lib::crawling::{
    LoggingProgressObserver, NavigationPolicy, ScrapeContext, ScrapeCoordinator, ScrapeRun, SnapshotArchiver,
};
use studbook_scraper_lib::domain::repositories::{HorseRepository, ReportRepository};
use studbook_scraper_lib::domain::services::{ObjectStore, SessionStore};
use studbook_scraper_lib::domain::value_objects::StudbookId;
use studbook_scraper_lib::infrastructure::{
    AppConfig, ConfigManager, DatabaseConnection, FileSessionStore, FsObjectStore, HorseDetailParser,
    HorseDetailSelectors, HttpBrowserConfig, HttpBrowserLauncher, InMemoryHorseRepository, InMemoryReportRepository,
    SqliteHorseRepository, SqliteReportRepository, bootstrap_console_logging, init_logging_with_config,
    log_system_info,
};

#[derive(Parser)]
#[command(name = "studbook-scraper")]
#[command(about = "Scrape a range of studbook registry ids into the local record store")]
#[command(version)]
struct Cli {
    /// First studbook id to scrape
    start_id: StudbookId,

    /// Last studbook id to scrape (inclusive)
    end_id: StudbookId,

    /// Pause after every id, in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Number of parallel browser sessions
    #[arg(long)]
    browsers: Option<usize>,

    /// Configuration file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Keep records in memory instead of the database
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {e:#}");
            ExitCode::from(1)
        }
    }
}

async fn load_config(path: Option<PathBuf>) -> Result<AppConfig> {
    // scoped to this function, the configured subscriber replaces it
    let _console = bootstrap_console_logging();
    let manager = match path {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new()?,
    };
    let mut config = manager.load_config().await?;
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

async fn stores(config: &AppConfig, dry_run: bool) -> Result<(Arc<dyn HorseRepository>, Arc<dyn ReportRepository>)> {
    if dry_run {
        info!("Dry run: records are kept in memory");
        return Ok((
            Arc::new(InMemoryHorseRepository::new()),
            Arc::new(InMemoryReportRepository::new()),
        ));
    }

    let database = DatabaseConnection::new(&config.storage.database_url).await?;
    database.migrate().await?;
    let pool = database.pool().clone();
    Ok((
        Arc::new(SqliteHorseRepository::new(pool.clone())),
        Arc::new(SqliteReportRepository::new(pool)),
    ))
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config).await?;
    init_logging_with_config(&config.logging)?;
    log_system_info();

    let (horses, reports) = stores(&config, cli.dry_run).await?;

    let sessions: Arc<dyn SessionStore> = Arc::new(FileSessionStore::new(&config.storage.session_file));
    let archiver = config.storage.archive_snapshots.then(|| {
        let store: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(&config.storage.archive_dir));
        Arc::new(SnapshotArchiver::new(store, &config.storage.snapshot_dir))
    });

    let selectors = HorseDetailSelectors {
        server_error_marker: config.site.server_error_marker.clone(),
        ..HorseDetailSelectors::default()
    };
    let context = ScrapeContext {
        site: config.site.clone(),
        navigation: NavigationPolicy::from_config(&config.scraper),
        horses: Arc::clone(&horses),
        reports,
        extractor: Arc::new(HorseDetailParser::with_selectors(&selectors).context("Invalid page selectors")?),
        sessions: Some(sessions),
        archiver,
    };
    let launcher = Arc::new(HttpBrowserLauncher::new(HttpBrowserConfig {
        base_url: config.site.base_url.clone(),
        user_agent: config.site.user_agent.clone(),
        timeout: config.scraper.navigation_timeout(),
        max_requests_per_second: config.scraper.max_requests_per_second,
    }));
    let coordinator = ScrapeCoordinator::new(context, launcher)
        .with_observer(Arc::new(LoggingProgressObserver::new(config.scraper.progress_every)));

    let cancel = coordinator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, finishing in-flight pages");
            cancel.cancel();
        }
    });

    let run = ScrapeRun {
        start_id: cli.start_id,
        end_id: cli.end_id,
        delay: cli.delay_ms.map_or_else(|| config.scraper.delay(), Duration::from_millis),
        workers: cli.browsers.unwrap_or(config.scraper.num_browsers),
    };
    let summary = coordinator.run(run).await?;

    info!(
        completed = summary.completed,
        horses = horses.count().await?,
        cancelled = summary.cancelled,
        "Scraping completed successfully"
    );
    Ok(())
}
