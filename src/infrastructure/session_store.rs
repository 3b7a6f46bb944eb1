//! Cookie persistence between runs
//!
//! One JSON file holds a map of site -> saved session. Writes go to a
//! sibling temp file first and are renamed into place.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::services::{SavedSession, SessionStore};

type SessionMap = BTreeMap<String, SavedSession>;

pub struct FileSessionStore {
    path: PathBuf,
    // serializes read-modify-write between workers of this process
    write_lock: Mutex<()>,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_map(&self) -> Result<SessionMap> {
        let content = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read session file {:?}", self.path))?;
        serde_json::from_str(&content).with_context(|| format!("Corrupt session file {:?}", self.path))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn save(&self, session: &SavedSession) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut sessions = if fs::try_exists(&self.path).await.unwrap_or(false) {
            self.read_map().await.unwrap_or_else(|e| {
                warn!("Discarding unreadable session file: {:#}", e);
                SessionMap::new()
            })
        } else {
            SessionMap::new()
        };
        sessions.insert(session.site.clone(), session.clone());

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let tmp_path = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(&sessions)?;
        fs::write(&tmp_path, content)
            .await
            .with_context(|| format!("Failed to write {:?}", tmp_path))?;
        fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| format!("Failed to move session file into {:?}", self.path))?;

        debug!(site = %session.site, cookies = session.cookies.len(), "Session saved");
        Ok(())
    }

    async fn load(&self, site: &str) -> Option<SavedSession> {
        if !fs::try_exists(&self.path).await.unwrap_or(false) {
            return None;
        }
        match self.read_map().await {
            Ok(mut sessions) => sessions.remove(site),
            Err(e) => {
                warn!("Ignoring saved session: {:#}", e);
                None
            }
        }
    }
}
