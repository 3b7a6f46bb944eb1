//! Page snapshot archiving
//!
//! Each loaded page is written to a scratch file, put into the object store
//! under `snapshots/<file name>` and the scratch file is removed.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::debug;

use crate::domain::services::{LoadedPage, ObjectStore};

pub const SNAPSHOT_KEY_PREFIX: &str = "snapshots";

/// `https://host/Horse.aspx?hid=900` -> `horse_aspx_hid_900_<timestamp>.html`
#[must_use]
pub fn snapshot_file_name(url: &str, at: DateTime<Utc>) -> String {
    let tail = url::Url::parse(url).map_or_else(
        |_| url.to_string(),
        |parsed| {
            let mut tail = parsed.path().to_string();
            if let Some(query) = parsed.query() {
                tail.push('?');
                tail.push_str(query);
            }
            tail
        },
    );

    let mut stem = String::with_capacity(tail.len());
    for c in tail.chars() {
        if c.is_ascii_alphanumeric() {
            stem.push(c.to_ascii_lowercase());
        } else if !stem.ends_with('_') {
            stem.push('_');
        }
    }
    let stem = stem.trim_matches('_');
    let stem = if stem.is_empty() { "page" } else { stem };

    format!("{stem}_{}.html", at.format("%Y%m%dT%H%M%S%3f"))
}

pub struct SnapshotArchiver {
    store: Arc<dyn ObjectStore>,
    scratch_dir: PathBuf,
}

impl SnapshotArchiver {
    pub fn new(store: Arc<dyn ObjectStore>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            scratch_dir: scratch_dir.into(),
        }
    }

    /// Returns the object key the snapshot was stored under
    pub async fn archive(&self, page: &LoadedPage) -> Result<String> {
        fs::create_dir_all(&self.scratch_dir)
            .await
            .with_context(|| format!("Failed to create snapshot dir {:?}", self.scratch_dir))?;

        let file_name = snapshot_file_name(&page.url, Utc::now());
        let local_path = self.scratch_dir.join(&file_name);
        fs::write(&local_path, &page.html)
            .await
            .with_context(|| format!("Failed to write snapshot {local_path:?}"))?;

        let key = format!("{SNAPSHOT_KEY_PREFIX}/{file_name}");
        self.store.put(&local_path, &key).await?;

        fs::remove_file(&local_path)
            .await
            .with_context(|| format!("Failed to delete local snapshot {local_path:?}"))?;
        debug!(key = %key, "Snapshot archived");
        Ok(key)
    }
}
