//! HTML parsing infrastructure for registry pages
//!
//! The worker loop only sees the `PageExtractor` seam; the scraper-based
//! `HorseDetailParser` is the shipped implementation.

pub mod config;
pub mod error;
pub mod horse_detail_parser;

pub use config::HorseDetailSelectors;
pub use error::{ParsingError, ParsingResult};
pub use horse_detail_parser::HorseDetailParser;

use crate::domain::services::{HorseInfo, LoadedPage};

/// Turns a loaded detail page into structured horse data
pub trait PageExtractor: Send + Sync {
    /// Site-level error page, rendered for ids outside the registry's range
    fn is_server_error(&self, page: &LoadedPage) -> bool;

    /// Fails with `RequiredFieldMissing` when the page has no horse name
    fn extract(&self, page: &LoadedPage) -> ParsingResult<HorseInfo>;
}
