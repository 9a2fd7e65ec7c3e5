//! GexLab Runner: pipeline sessions, persistence, batch analysis, exports.
//!
//! This crate builds on `gexlab-core` to provide:
//! - Pipeline orchestration over one submission (aggregate → calculate →
//!   score → strategies → rank), stamped with the configuration hash
//! - Record stores with time-to-live (in-memory and JSON files)
//! - Per-symbol analysis archive with key-level snapshots and change sets
//! - Symbol validation
//! - Parallel one-shot analysis across instruments
//! - JSON, CSV and Markdown exports

pub mod archive;
pub mod batch;
pub mod export;
pub mod pipeline;
pub mod store;
pub mod symbol;

pub use archive::{AnalysisArchive, AnalysisDocument, KeyLevels, LevelChange, Snapshot, SnapshotKind};
pub use batch::{analyze_batch, leaders, BatchItem, BatchLeader, BatchResult};
pub use export::{export_json, export_ranking_csv, generate_report, import_json, save_artifacts};
pub use pipeline::{Analysis, Pipeline, PipelineError, PipelineOutcome, Session};
pub use store::{JsonFileStore, MemoryStore, RecordStore, StoreError};
pub use symbol::{validate_symbol, SymbolError};
