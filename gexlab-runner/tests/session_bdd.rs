//! BDD tests for sessions, persistence and the analysis archive.
//!
//! These tests verify:
//! - Multi-round accumulation through a file-backed store
//! - State surviving a store reopen between submissions
//! - Archive documents with snapshots and change sets
//! - Artifact export from a completed session

use chrono::{Duration, NaiveDate, NaiveDateTime};
use gexlab_core::aggregator::{DataStatus, MergeFailure};
use gexlab_core::{MarketParams, PipelineConfig};
use gexlab_runner::{
    save_artifacts, AnalysisArchive, JsonFileStore, Pipeline, RecordStore, Session, SnapshotKind,
};
use serde_json::{json, Value};

fn at(secs: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 1, 2)
        .unwrap()
        .and_hms_opt(9, 30, 0)
        .unwrap()
        + Duration::seconds(secs)
}

fn structure_round(spot: f64) -> Value {
    json!({
        "targets": {
            "symbol": "spy",
            "spot_price": spot,
            "walls": {
                "call_wall": 600.0,
                "put_wall": 580.0,
                "major_wall": 600.0,
                "major_wall_type": "call"
            },
            "gamma_metrics": {
                "gap_distance_dollar": 10.0,
                "cluster_strength_ratio": 1.3,
                "net_gex": 3.5e9,
                "net_gex_sign": "positive_gamma",
                "vol_trigger": 585.0,
                "spot_vs_trigger": "above",
                "monthly_cluster_override": false
            }
        }
    })
}

fn flow_round() -> Value {
    json!({
        "symbol": "SPY",
        "directional_metrics": {
            "dex_same_dir_pct": 58.0,
            "vanna_dir": "up",
            "vanna_confidence": "medium",
            "iv_path": "falling",
            "iv_path_confidence": "medium"
        },
        "atm_iv": { "iv_7d": 0.14, "iv_14d": 0.15, "iv_source": "term" }
    })
}

fn params() -> MarketParams {
    MarketParams::new(16.0, 35.0, 14.0, 12.0)
}

fn pipeline() -> Pipeline {
    Pipeline::new(PipelineConfig::default()).unwrap()
}

#[test]
fn bdd_scenario_accumulate_across_store_reopen() {
    let _ = env_logger::try_init();
    let temp_dir = tempfile::tempdir().unwrap();

    // GIVEN a file store and the structural half of a record
    let first = {
        let mut store = JsonFileStore::open(temp_dir.path(), 3600).unwrap();
        let mut session = Session::new(pipeline(), &mut store);
        session
            .submit(None, &structure_round(590.0), Some(&params()), at(0))
            .unwrap()
    };

    // THEN the task awaits data and the guide names what is missing
    assert!(!first.is_ready());
    assert_eq!(first.aggregation.cache.status, DataStatus::AwaitingData);
    let guide = first.guide().expect("fields still missing").to_string();
    assert!(guide.contains("SPY"));

    // WHEN the store is reopened and the flow half arrives
    let mut store = JsonFileStore::open(temp_dir.path(), 3600).unwrap();
    assert_eq!(store.symbols().unwrap(), vec!["SPY".to_string()]);
    let mut session = Session::new(pipeline(), &mut store);
    let second = session
        .submit(None, &flow_round(), Some(&params()), at(300))
        .unwrap();

    // THEN the calculator fills the expected move and the record completes
    let analysis = second.analysis.as_ref().expect("record complete");
    assert!(second.record().em1_dollar.is_valid());
    assert!(second.calculation_log.derivation("em1_dollar").is_some());
    assert_eq!(analysis.symbol, "SPY");
    assert!(!analysis.ranking.entries.is_empty());
    assert_eq!(analysis.config_hash, PipelineConfig::default().config_hash());

    // AND the persisted state is marked ready without a retained record
    let saved = store.load("SPY", at(301)).unwrap().unwrap();
    assert_eq!(saved.status, DataStatus::Ready);
    assert!(saved.record.is_none());
}

#[test]
fn bdd_scenario_repeat_submission_reports_no_progress() {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut store = JsonFileStore::open(temp_dir.path(), 3600).unwrap();
    let mut session = Session::new(pipeline(), &mut store);

    // GIVEN one accumulated round
    session
        .submit(None, &structure_round(590.0), None, at(0))
        .unwrap();

    // WHEN the same data is sent again
    let again = session
        .submit(None, &structure_round(590.0), None, at(60))
        .unwrap();

    // THEN the merge is flagged and nothing new is recorded
    assert!(again.aggregation.report.merge_failed);
    assert_eq!(again.aggregation.report.failure, Some(MergeFailure::NoProgress));
    assert_eq!(again.aggregation.cache.history.len(), 2);
}

#[test]
fn bdd_scenario_archive_tracks_snapshots() {
    let temp_dir = tempfile::tempdir().unwrap();
    let archive = AnalysisArchive::open(temp_dir.path().join("archive")).unwrap();
    let mut store = JsonFileStore::open(temp_dir.path().join("state"), 3600).unwrap();
    let mut session = Session::new(pipeline(), &mut store);

    // GIVEN a completed analysis stored in the day's document
    session
        .submit(None, &structure_round(590.0), Some(&params()), at(0))
        .unwrap();
    let done = session
        .submit(None, &flow_round(), Some(&params()), at(300))
        .unwrap();
    let analysis = done.analysis.clone().unwrap();
    let mut doc = archive.load_or_new("SPY", at(300)).unwrap();
    doc.record_analysis(analysis.clone());
    archive.save(&doc).unwrap();

    // WHEN an intraday refresh moves spot and is snapshotted
    let mut refreshed = analysis.record.clone();
    refreshed.spot_price = gexlab_core::Field::Valid(595.9);
    let mut doc = archive.load_or_new("SPY", at(7200)).unwrap();
    doc.add_snapshot(&refreshed, SnapshotKind::Intraday, "midday", at(7200));
    archive.save(&doc).unwrap();

    // THEN the document keeps both snapshots and lists only the spot change
    let loaded = archive.load("SPY", at(0).date()).unwrap().unwrap();
    assert_eq!(loaded.snapshots.len(), 2);
    assert_eq!(loaded.snapshots[0].kind, SnapshotKind::Initial);
    let changes = &loaded.snapshots[1].changes;
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].level, "spot_price");
    assert_eq!(changes[0].change_pct, Some(1.0));

    // AND the artifact bundle exports from it
    let out = save_artifacts(&loaded, &temp_dir.path().join("out")).unwrap();
    assert!(out.join("report.md").exists());
}
