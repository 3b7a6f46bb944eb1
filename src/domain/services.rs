//! Domain services
//!
//! Seams to the external collaborators of the crawling core: the browser
//! session that loads registry pages, the session store that keeps its
//! cookies, and the object store that archives page snapshots.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::horse::Sex;
use crate::domain::pedigree::{PedigreeNode, PedigreeTree};

/// A page as rendered by the browser session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedPage {
    pub url: String,
    pub status: u16,
    pub html: String,
}

#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum BrowserError {
    #[error("Navigation to {url} timed out after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("Transport error for {url}: {message}")]
    Transport { url: String, message: String },

    #[error("Invalid url {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Login failed: {0}")]
    Login(String),

    #[error("Browser could not be launched: {0}")]
    Launch(String),

    #[error("Session error: {0}")]
    Session(String),
}

impl BrowserError {
    /// Whether retrying the same navigation may succeed
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Transport { .. })
    }
}

/// Interactive login form of the target site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginConfig {
    pub site: String,
    pub login_url: String,
    pub user_field: String,
    pub password_field: String,
    pub submit_field: String,
    pub user_id: String,
    pub password: String,
}

impl LoginConfig {
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.user_id.is_empty() && !self.password.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Restored cookies were accepted; no login form was shown
    AlreadyAuthenticated,
    LoggedIn,
    /// Login form shown but no credentials configured
    SkippedNoCredentials,
}

/// Cookie jar snapshot of one site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedSession {
    pub site: String,
    /// `name=value` pairs
    pub cookies: Vec<String>,
    pub saved_at: DateTime<Utc>,
}

/// One browser session, owned by exactly one worker
#[async_trait]
pub trait BrowserSession: Send {
    /// Load a page. Any HTTP status is a loaded page; only transport failures are errors.
    async fn navigate(&mut self, url: &str) -> Result<LoadedPage, BrowserError>;

    async fn login(&mut self, login: &LoginConfig) -> Result<LoginOutcome, BrowserError>;

    fn export_session(&self, site: &str) -> SavedSession;

    fn restore_session(&mut self, session: &SavedSession) -> Result<(), BrowserError>;

    async fn close(&mut self);
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, worker_index: usize) -> Result<Box<dyn BrowserSession>, BrowserError>;
}

/// Persists browser cookies between runs, keyed by site
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save(&self, session: &SavedSession) -> Result<()>;

    /// Unreadable or corrupt data counts as absent
    async fn load(&self, site: &str) -> Option<SavedSession>;
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, local_path: &Path, key: &str) -> Result<()>;
}

/// Everything read from one horse detail page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HorseInfo {
    pub name: String,
    pub life_number: Option<String>,
    /// Raw `day/month/year` text
    pub date_of_birth: Option<String>,
    pub microchip_number: Option<String>,
    pub dna_typed: Option<String>,
    pub aust_id: Option<String>,
    pub sex: Option<Sex>,
    pub color: Option<String>,
    pub bred_by: Option<String>,
    /// Raw `day/month/year` text
    pub deceased: Option<String>,
    pub family: Option<String>,
    pub taproot: Option<PedigreeNode>,
    pub foal_ref: Option<String>,
    pub pedigree: PedigreeTree,
}
