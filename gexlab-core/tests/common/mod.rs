//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde_json::{json, Value};

use gexlab_core::record::CanonicalField;
use gexlab_core::TargetRecord;

/// A full submission in the nested layout: spot above trigger, 1 EM from
/// the call wall, confident upward vanna.
pub fn complete_submission() -> Value {
    json!({
        "symbol": "tsla",
        "spot_price": 250.0,
        "em1_dollar": 5.0,
        "walls": {
            "call_wall": 260.0,
            "put_wall": 240.0,
            "major_wall": 260.0,
            "major_wall_type": "call"
        },
        "gamma_metrics": {
            "gap_distance_dollar": 5.0,
            "gap_distance_em1_multiple": 1.0,
            "cluster_strength_ratio": 1.5,
            "net_gex": 1.0e9,
            "net_gex_sign": "positive",
            "vol_trigger": 245.0,
            "spot_vs_trigger": "above",
            "monthly_cluster_override": false
        },
        "directional_metrics": {
            "dex_same_dir_pct": 65.0,
            "vanna_dir": "up",
            "vanna_confidence": "high",
            "iv_path": "rising",
            "iv_path_confidence": "medium"
        },
        "atm_iv": {
            "iv_7d": 0.45,
            "iv_14d": 0.47,
            "iv_source": "skew"
        }
    })
}

pub fn complete_record() -> TargetRecord {
    TargetRecord::from_json(&complete_submission()).unwrap()
}

/// The complete record restricted to the canonical leaves selected by `mask`
/// (bit `i` keeps `CanonicalField::ALL[i]`). The symbol is always kept.
pub fn masked_record(mask: u32) -> TargetRecord {
    let full = complete_record();
    let mut out = TargetRecord::default();
    out.symbol = full.symbol.clone();
    for (i, field) in CanonicalField::ALL.iter().enumerate() {
        if mask & (1 << i) != 0 {
            let value = full.get(field.path()).unwrap();
            out.set(field.path(), &value).unwrap();
        }
    }
    out
}

/// Fixed session open plus `secs`.
pub fn at(secs: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 1, 2)
        .unwrap()
        .and_hms_opt(9, 30, 0)
        .unwrap()
        + Duration::seconds(secs)
}
