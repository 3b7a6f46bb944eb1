//! Studbook Scraper - incremental horse pedigree registry scraper
//!
//! Walks a range of registry ids with a pool of browser sessions, extracts
//! each horse and its 15-slot pedigree, reconciles ancestors against the
//! record store and leaves one audit report per id.

pub mod crawling;
pub mod domain;
pub mod infrastructure;
