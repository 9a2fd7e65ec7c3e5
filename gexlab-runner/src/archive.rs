//! Per-symbol analysis archive: the completed analysis plus a series of
//! key-level snapshots taken as the session develops.
//!
//! Each snapshot records the levels that matter for managing a position
//! (spot, expected move, trigger, walls, net gamma, front IVs) and the
//! changes against the previous snapshot. Only levels valid in both and
//! actually different are listed.
//!
//! Documents live at `{dir}/{SYMBOL}/{SYMBOL}_{YYYYMMDD}.json`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use gexlab_core::record::SpotVsTrigger;
use gexlab_core::TargetRecord;

use crate::pipeline::Analysis;

/// Current archive document layout. Newer documents are rejected on load.
pub const SCHEMA_VERSION: u32 = 1;

// ─── Snapshots ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    Initial,
    Intraday,
    Close,
}

/// Key levels read from a record. `None` where the leaf was missing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct KeyLevels {
    pub spot_price: Option<f64>,
    pub em1_dollar: Option<f64>,
    pub vol_trigger: Option<f64>,
    pub spot_vs_trigger: Option<SpotVsTrigger>,
    pub net_gex: Option<f64>,
    pub call_wall: Option<f64>,
    pub put_wall: Option<f64>,
    pub iv_7d: Option<f64>,
    pub iv_14d: Option<f64>,
}

impl KeyLevels {
    pub fn of(record: &TargetRecord) -> Self {
        let g = &record.gamma_metrics;
        Self {
            spot_price: record.spot_price.get(),
            em1_dollar: record.em1_dollar.get(),
            vol_trigger: g.vol_trigger.get(),
            spot_vs_trigger: g.spot_vs_trigger.get(),
            net_gex: g.net_gex.get(),
            call_wall: record.walls.call_wall.get(),
            put_wall: record.walls.put_wall.get(),
            iv_7d: record.atm_iv.iv_7d.get(),
            iv_14d: record.atm_iv.iv_14d.get(),
        }
    }

    fn numeric(&self) -> [(&'static str, Option<f64>); 8] {
        [
            ("spot_price", self.spot_price),
            ("em1_dollar", self.em1_dollar),
            ("vol_trigger", self.vol_trigger),
            ("call_wall", self.call_wall),
            ("put_wall", self.put_wall),
            ("net_gex", self.net_gex),
            ("iv_7d", self.iv_7d),
            ("iv_14d", self.iv_14d),
        ]
    }

    /// Levels valid in both snapshots whose values differ.
    pub fn changes_since(&self, previous: &KeyLevels) -> Vec<LevelChange> {
        previous
            .numeric()
            .into_iter()
            .zip(self.numeric())
            .filter_map(|((level, old), (_, new))| {
                let (old, new) = (old?, new?);
                (old != new).then(|| LevelChange {
                    level: level.to_string(),
                    old,
                    new,
                    change_pct: (old != 0.0)
                        .then(|| ((new - old) / old * 100.0 * 100.0).round() / 100.0),
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelChange {
    pub level: String,
    pub old: f64,
    pub new: f64,
    /// Percent change, two decimals. Absent when the old value is zero.
    pub change_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: usize,
    pub kind: SnapshotKind,
    pub timestamp: NaiveDateTime,
    pub note: String,
    pub levels: KeyLevels,
    pub changes: Vec<LevelChange>,
}

// ─── Document ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisDocument {
    pub schema_version: u32,
    pub symbol: String,
    pub created_at: NaiveDateTime,
    pub last_updated: Option<NaiveDateTime>,
    pub analysis: Option<Analysis>,
    pub snapshots: Vec<Snapshot>,
}

impl AnalysisDocument {
    pub fn new(symbol: impl Into<String>, at: NaiveDateTime) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            symbol: symbol.into(),
            created_at: at,
            last_updated: None,
            analysis: None,
            snapshots: Vec::new(),
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.created_at.date()
    }

    /// Stores a completed analysis; the first one also seeds the initial
    /// snapshot from its record.
    pub fn record_analysis(&mut self, analysis: Analysis) {
        let at = analysis.completed_at;
        if self.snapshots.is_empty() {
            self.push_snapshot(&analysis.record, SnapshotKind::Initial, "full analysis", at);
        }
        self.analysis = Some(analysis);
        self.last_updated = Some(at);
    }

    /// Appends a snapshot. The first snapshot of a document is always
    /// [`SnapshotKind::Initial`] regardless of `kind`.
    pub fn add_snapshot(
        &mut self,
        record: &TargetRecord,
        kind: SnapshotKind,
        note: &str,
        at: NaiveDateTime,
    ) -> &Snapshot {
        let kind = if self.snapshots.is_empty() {
            SnapshotKind::Initial
        } else {
            kind
        };
        self.last_updated = Some(at);
        self.push_snapshot(record, kind, note, at)
    }

    pub fn last_snapshot(&self) -> Option<&Snapshot> {
        self.snapshots.last()
    }

    fn push_snapshot(
        &mut self,
        record: &TargetRecord,
        kind: SnapshotKind,
        note: &str,
        at: NaiveDateTime,
    ) -> &Snapshot {
        let levels = KeyLevels::of(record);
        let changes = self
            .snapshots
            .last()
            .map(|prev| levels.changes_since(&prev.levels))
            .unwrap_or_default();
        log::debug!(
            "archive: {} snapshot #{} with {} changes",
            self.symbol,
            self.snapshots.len(),
            changes.len()
        );
        self.snapshots.push(Snapshot {
            id: self.snapshots.len(),
            kind,
            timestamp: at,
            note: note.to_string(),
            levels,
            changes,
        });
        let last = self.snapshots.len() - 1;
        &self.snapshots[last]
    }
}

// ─── Storage ────────────────────────────────────────────────────────

/// Directory of analysis documents.
#[derive(Debug, Clone)]
pub struct AnalysisArchive {
    dir: PathBuf,
}

impl AnalysisArchive {
    /// Opens (creating if needed) an archive rooted at `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create archive dir: {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, symbol: &str, date: NaiveDate) -> PathBuf {
        self.dir
            .join(symbol)
            .join(format!("{symbol}_{}.json", date.format("%Y%m%d")))
    }

    pub fn contains(&self, symbol: &str, date: NaiveDate) -> bool {
        self.path_for(symbol, date).exists()
    }

    /// Loads a document, rejecting unknown schema versions and documents
    /// whose contents disagree with their file name.
    pub fn load(&self, symbol: &str, date: NaiveDate) -> Result<Option<AnalysisDocument>> {
        let path = self.path_for(symbol, date);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let doc: AnalysisDocument = serde_json::from_str(&json)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        if doc.schema_version > SCHEMA_VERSION {
            bail!(
                "unsupported schema version {} (max supported: {})",
                doc.schema_version,
                SCHEMA_VERSION
            );
        }
        if doc.symbol != symbol || doc.date() != date {
            bail!(
                "{} holds {} for {}, expected {} for {}",
                path.display(),
                doc.symbol,
                doc.date(),
                symbol,
                date
            );
        }
        Ok(Some(doc))
    }

    /// Loads the document for `symbol` on the day of `at`, or starts one.
    pub fn load_or_new(&self, symbol: &str, at: NaiveDateTime) -> Result<AnalysisDocument> {
        Ok(self
            .load(symbol, at.date())?
            .unwrap_or_else(|| AnalysisDocument::new(symbol, at)))
    }

    /// Writes atomically (`.tmp` then rename). Returns the document path.
    pub fn save(&self, doc: &AnalysisDocument) -> Result<PathBuf> {
        let path = self.path_for(&doc.symbol, doc.date());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(doc).context("failed to serialize analysis document")?;
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json)
            .with_context(|| format!("failed to write {}", tmp_path.display()))?;
        if let Err(e) = fs::rename(&tmp_path, &path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e).with_context(|| format!("atomic rename failed for {}", path.display()));
        }
        Ok(path)
    }

    /// Dates with a stored document for `symbol`, ascending.
    pub fn dates(&self, symbol: &str) -> Result<Vec<NaiveDate>> {
        let dir = self.dir.join(symbol);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let prefix = format!("{symbol}_");
        let mut dates: Vec<NaiveDate> = fs::read_dir(&dir)
            .with_context(|| format!("failed to list {}", dir.display()))?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_str()?.to_string();
                let stamp = name.strip_prefix(&prefix)?.strip_suffix(".json")?.to_string();
                NaiveDate::parse_from_str(&stamp, "%Y%m%d").ok()
            })
            .collect();
        dates.sort();
        Ok(dates)
    }
}
