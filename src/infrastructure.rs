//! Infrastructure layer for configuration, logging, storage and the registry site
//!
//! Concrete adapters behind the domain traits: SQLite and in-memory record
//! stores, the cookie session file, the file-system object store, the
//! reqwest-backed browser session and the scraper-based page extractor.

pub mod browser;
pub mod config;
pub mod database_connection;
pub mod horse_repository;
pub mod in_memory_repository;
pub mod logging;
pub mod object_store;
pub mod parsing;
pub mod report_repository;
pub mod session_store;

// Re-export commonly used items
pub use browser::{HttpBrowser, HttpBrowserConfig, HttpBrowserLauncher};
pub use config::{AppConfig, ConfigError, ConfigManager};
pub use database_connection::DatabaseConnection;
pub use horse_repository::SqliteHorseRepository;
pub use in_memory_repository::{InMemoryHorseRepository, InMemoryReportRepository};
pub use logging::{bootstrap_console_logging, init_logging_with_config, log_system_info};
pub use object_store::FsObjectStore;
pub use parsing::{HorseDetailParser, HorseDetailSelectors, PageExtractor, ParsingError, ParsingResult};
pub use report_repository::SqliteReportRepository;
pub use session_store::FileSessionStore;
