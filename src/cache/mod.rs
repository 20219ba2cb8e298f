//! Persistent side-cache of synced token records.
//!
//! Keyed by owner address, one entry per owner plus a separate staleness
//! flag. The backing store sits behind a small repository trait so the sync
//! logic never touches the filesystem directly.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::types::TokenRecord;

/// Storage key prefixes, kept byte-compatible with the original client so a
/// cache directory can be inspected by hand.
const RECORDS_KEY_PREFIX: &str = "mintedIPs_";
const STALE_KEY_PREFIX: &str = "needsIPRefresh_";

/// Everything persisted for one owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub records: Vec<TokenRecord>,
    pub synced_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(records: Vec<TokenRecord>) -> Self {
        Self {
            records,
            synced_at: Utc::now(),
        }
    }
}

/// Repository over the per-owner cache. Only the synchronizer writes through
/// this; views read snapshots it hands out.
pub trait CacheStore: Send + Sync {
    /// Load the cached entry for `owner`, `None` when absent or unreadable.
    fn load(&self, owner: &str) -> Option<CacheEntry>;

    /// Overwrite the entry for `owner`.
    fn save(&self, owner: &str, entry: &CacheEntry) -> Result<()>;

    /// Whether a mutation has invalidated the entry since the last sync.
    fn is_stale(&self, owner: &str) -> bool;

    fn mark_stale(&self, owner: &str) -> Result<()>;

    fn clear_stale(&self, owner: &str) -> Result<()>;

    /// Drop a single record without a resync (used right after a transfer).
    fn remove_record(&self, owner: &str, token_id: &str) -> Result<()>;
}

/// File-per-key store under a cache directory. The records file holds the
/// JSON `CacheEntry`; the staleness flag is literal `"true"` / `"false"`
/// text.
pub struct FileCacheStore {
    dir: PathBuf,
}

impl FileCacheStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn records_path(&self, owner: &str) -> PathBuf {
        self.dir.join(format!("{RECORDS_KEY_PREFIX}{owner}"))
    }

    fn stale_path(&self, owner: &str) -> PathBuf {
        self.dir.join(format!("{STALE_KEY_PREFIX}{owner}"))
    }

    fn write_key(&self, path: &Path, contents: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating cache dir {:?}", self.dir))?;
        fs::write(path, contents).with_context(|| format!("writing cache key {path:?}"))
    }
}

impl CacheStore for FileCacheStore {
    fn load(&self, owner: &str) -> Option<CacheEntry> {
        let path = self.records_path(owner);
        let bytes = fs::read(&path).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("⚠️ [CACHE] Unreadable cache entry {:?}: {}", path, e);
                None
            }
        }
    }

    fn save(&self, owner: &str, entry: &CacheEntry) -> Result<()> {
        let json = serde_json::to_vec_pretty(entry)?;
        self.write_key(&self.records_path(owner), &json)
    }

    fn is_stale(&self, owner: &str) -> bool {
        match fs::read_to_string(self.stale_path(owner)) {
            Ok(flag) => flag.trim() == "true",
            Err(_) => false,
        }
    }

    fn mark_stale(&self, owner: &str) -> Result<()> {
        self.write_key(&self.stale_path(owner), b"true")
    }

    fn clear_stale(&self, owner: &str) -> Result<()> {
        self.write_key(&self.stale_path(owner), b"false")
    }

    fn remove_record(&self, owner: &str, token_id: &str) -> Result<()> {
        let Some(mut entry) = self.load(owner) else {
            return Ok(());
        };
        let before = entry.records.len();
        entry.records.retain(|r| r.token_id != token_id);
        if entry.records.len() != before {
            self.save(owner, &entry)?;
        }
        Ok(())
    }
}
