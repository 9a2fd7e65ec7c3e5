//! Persisted aggregation state, one entry per symbol.
//!
//! The aggregator is stateless; a [`RecordStore`] keeps the [`CacheState`]
//! between submissions. Entries older than the store's time-to-live are
//! evicted on load, so an abandoned task never resurfaces hours later.
//!
//! - [`MemoryStore`]: process-local map, used by tests and batch runs
//! - [`JsonFileStore`]: one `{SYMBOL}.json` per symbol, atomic writes,
//!   corrupt files quarantined instead of failing the session

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDateTime};
use gexlab_core::CacheState;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize state for {symbol}: {source}")]
    Serialize {
        symbol: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("atomic rename failed for {path}: {source}")]
    Rename {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Storage for aggregation state keyed by canonical (upper-case) symbol.
pub trait RecordStore {
    /// Returns the live state for `symbol`, evicting it if older than the TTL.
    fn load(&mut self, symbol: &str, now: NaiveDateTime) -> Result<Option<CacheState>, StoreError>;

    fn save(&mut self, symbol: &str, state: &CacheState) -> Result<(), StoreError>;

    fn remove(&mut self, symbol: &str) -> Result<(), StoreError>;

    /// Symbols with stored state, sorted.
    fn symbols(&self) -> Result<Vec<String>, StoreError>;

    fn ttl(&self) -> Duration;
}

/// True when `state` was last touched more than `ttl` before `now`.
///
/// State without a timestamp never expires.
pub fn is_expired(state: &CacheState, now: NaiveDateTime, ttl: Duration) -> bool {
    state.updated_at.is_some_and(|t| now - t > ttl)
}

fn ttl_from_secs(secs: u64) -> Duration {
    Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX / 1000))
}

// ─── In-memory ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct MemoryStore {
    entries: BTreeMap<String, CacheState>,
    ttl: Duration,
}

impl MemoryStore {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            entries: BTreeMap::new(),
            ttl: ttl_from_secs(ttl_secs),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(gexlab_core::config::AggregationConfig::default().ttl_secs)
    }
}

impl RecordStore for MemoryStore {
    fn load(&mut self, symbol: &str, now: NaiveDateTime) -> Result<Option<CacheState>, StoreError> {
        let expired = self
            .entries
            .get(symbol)
            .is_some_and(|s| is_expired(s, now, self.ttl));
        if expired {
            log::info!("store: {symbol} expired, evicting");
            self.entries.remove(symbol);
        }
        Ok(self.entries.get(symbol).cloned())
    }

    fn save(&mut self, symbol: &str, state: &CacheState) -> Result<(), StoreError> {
        self.entries.insert(symbol.to_string(), state.clone());
        Ok(())
    }

    fn remove(&mut self, symbol: &str) -> Result<(), StoreError> {
        self.entries.remove(symbol);
        Ok(())
    }

    fn symbols(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.entries.keys().cloned().collect())
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}

// ─── JSON files ─────────────────────────────────────────────────────

/// File-backed store: `{dir}/{SYMBOL}.json`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
    ttl: Duration,
}

impl JsonFileStore {
    /// Opens (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl AsRef<Path>, ttl_secs: u64) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        Ok(Self {
            dir,
            ttl: ttl_from_secs(ttl_secs),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{symbol}.json"))
    }

    /// Removes every stored entry. Quarantined files are left in place.
    pub fn clear(&mut self) -> Result<usize, StoreError> {
        let symbols = self.symbols()?;
        for s in &symbols {
            self.remove(s)?;
        }
        Ok(symbols.len())
    }

    fn quarantine(&self, path: &Path, reason: &str) {
        let target = path.with_extension("json.quarantined");
        log::warn!("store: quarantining corrupt file {}: {reason}", path.display());
        let _ = fs::rename(path, target);
    }
}

impl RecordStore for JsonFileStore {
    fn load(&mut self, symbol: &str, now: NaiveDateTime) -> Result<Option<CacheState>, StoreError> {
        let path = self.path_for(symbol);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).map_err(|e| StoreError::io(&path, e))?;
        let state: CacheState = match serde_json::from_str(&content) {
            Ok(s) => s,
            Err(e) => {
                self.quarantine(&path, &e.to_string());
                return Ok(None);
            }
        };
        if is_expired(&state, now, self.ttl) {
            log::info!("store: {symbol} expired, evicting");
            self.remove(symbol)?;
            return Ok(None);
        }
        Ok(Some(state))
    }

    /// Writes are atomic: write to `.tmp` then rename.
    fn save(&mut self, symbol: &str, state: &CacheState) -> Result<(), StoreError> {
        let path = self.path_for(symbol);
        let tmp_path = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(state).map_err(|e| StoreError::Serialize {
            symbol: symbol.to_string(),
            source: e,
        })?;
        fs::write(&tmp_path, json).map_err(|e| StoreError::io(&tmp_path, e))?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            StoreError::Rename { path: path.clone(), source: e }
        })?;
        log::debug!("store: saved {}", path.display());
        Ok(())
    }

    fn remove(&mut self, symbol: &str) -> Result<(), StoreError> {
        let path = self.path_for(symbol);
        if path.exists() {
            fs::remove_file(&path).map_err(|e| StoreError::io(&path, e))?;
        }
        Ok(())
    }

    fn symbols(&self) -> Result<Vec<String>, StoreError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;
        let mut out: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.is_file() && p.extension().and_then(|s| s.to_str()) == Some("json"))
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect();
        out.sort();
        Ok(out)
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}
