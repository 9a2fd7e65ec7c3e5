//! One-shot analysis of many instruments in parallel.
//!
//! Each item is run against an empty cache, so there is no shared state
//! between instruments and the work fans out on the rayon pool.

use chrono::NaiveDateTime;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use gexlab_core::strategy::Archetype;
use gexlab_core::{CacheState, MarketParams, TargetRecord};

use crate::pipeline::{Pipeline, PipelineError, PipelineOutcome};
use crate::symbol::validate_symbol;

/// A complete submission plus its market parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    pub submission: Value,
    #[serde(default)]
    pub params: Option<MarketParams>,
}

#[derive(Debug)]
pub struct BatchResult {
    /// Index of the item in the input.
    pub index: usize,
    pub outcome: Result<PipelineOutcome, PipelineError>,
}

/// Best-ranked candidate per ready instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchLeader {
    pub symbol: String,
    pub archetype: Archetype,
    pub composite: f64,
    pub ev: f64,
    pub score: f64,
}

fn analyze_one(
    pipeline: &Pipeline,
    item: &BatchItem,
    at: NaiveDateTime,
) -> Result<PipelineOutcome, PipelineError> {
    if let Some(p) = &item.params {
        p.validate()?;
    }
    let incoming = TargetRecord::from_json(&item.submission)?;
    let symbol = incoming.symbol().ok_or(PipelineError::MissingSymbol)?;
    validate_symbol(symbol)?;
    Ok(pipeline.run(&incoming, &CacheState::default(), item.params.as_ref(), at))
}

/// Analyses every item independently. Results keep input order.
pub fn analyze_batch(pipeline: &Pipeline, items: &[BatchItem], at: NaiveDateTime) -> Vec<BatchResult> {
    let results: Vec<BatchResult> = items
        .par_iter()
        .enumerate()
        .map(|(index, item)| BatchResult {
            index,
            outcome: analyze_one(pipeline, item, at),
        })
        .collect();

    let failed = results.iter().filter(|r| r.outcome.is_err()).count();
    log::info!("batch: {} items, {} failed", results.len(), failed);
    results
}

/// Leaders across ready instruments, best composite first.
pub fn leaders(results: &[BatchResult]) -> Vec<BatchLeader> {
    let mut out: Vec<BatchLeader> = results
        .iter()
        .filter_map(|r| r.outcome.as_ref().ok()?.analysis.as_ref())
        .filter_map(|a| {
            let best = a.ranking.best()?;
            Some(BatchLeader {
                symbol: a.symbol.clone(),
                archetype: best.archetype(),
                composite: best.composite,
                ev: best.ev,
                score: a.scoring.total,
            })
        })
        .collect();
    out.sort_by(|a, b| b.composite.total_cmp(&a.composite));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use gexlab_core::PipelineConfig;
    use serde_json::json;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 2)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    fn complete(symbol: &str, spot: f64) -> Value {
        json!({
            "symbol": symbol,
            "spot_price": spot,
            "em1_dollar": spot * 0.02,
            "walls": {
                "call_wall": spot * 1.04,
                "put_wall": spot * 0.96,
                "major_wall": spot * 1.04,
                "major_wall_type": "call"
            },
            "gamma_metrics": {
                "gap_distance_dollar": spot * 0.02,
                "gap_distance_em1_multiple": 1.0,
                "cluster_strength_ratio": 1.5,
                "net_gex": 1.0e9,
                "net_gex_sign": "positive",
                "vol_trigger": spot * 0.98,
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
            "atm_iv": { "iv_7d": 0.45, "iv_14d": 0.47, "iv_source": "skew" }
        })
    }

    #[test]
    fn batch_keeps_order_and_isolates_failures() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let items = vec![
            BatchItem { submission: complete("TSLA", 250.0), params: None },
            BatchItem { submission: complete("TEST", 100.0), params: None },
            BatchItem {
                submission: complete("NVDA", 140.0),
                params: Some(MarketParams::new(18.0, 45.0, 0.45, 0.40)),
            },
            BatchItem { submission: json!({ "symbol": "AMD", "spot_price": 120.0 }), params: None },
        ];

        let results = analyze_batch(&pipeline, &items, at());
        assert_eq!(results.len(), 4);
        for (i, r) in results.iter().enumerate() {
            assert_eq!(r.index, i);
        }
        assert!(results[0].outcome.as_ref().unwrap().is_ready());
        assert!(matches!(results[1].outcome, Err(PipelineError::Symbol(_))));
        assert!(results[2].outcome.as_ref().unwrap().is_ready());
        assert!(!results[3].outcome.as_ref().unwrap().is_ready());

        let board = leaders(&results);
        assert_eq!(board.len(), 2);
        assert!(board[0].composite >= board[1].composite);
    }
}
