//! Criterion benchmarks for the pipeline stages.
//!
//! Benchmarks:
//! 1. Aggregation (parse + merge + validate + guide) over split submissions
//! 2. Field calculation with market parameters
//! 3. Scoring → strategies → ranking on a ready record

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::{json, Value};

use gexlab_core::{
    Aggregator, CacheState, FieldCalculator, MarketParams, RankingEngine, Readiness,
    ScoringEngine, StrategyCalculator, TargetRecord,
};

// ── Helpers ──────────────────────────────────────────────────────────

fn submission() -> Value {
    json!({
        "symbol": "BENCH",
        "spot_price": 250.0,
        "em1_dollar": 5.0,
        "walls": { "call_wall": 260.0, "put_wall": 240.0, "major_wall": 260.0, "major_wall_type": "call" },
        "gamma_metrics": {
            "gap_distance_dollar": 5.0, "gap_distance_em1_multiple": 1.0,
            "cluster_strength_ratio": 1.5, "net_gex": 1.0e9, "net_gex_sign": "positive",
            "vol_trigger": 245.0, "spot_vs_trigger": "above", "monthly_cluster_override": false
        },
        "directional_metrics": {
            "dex_same_dir_pct": 65.0, "vanna_dir": "up", "vanna_confidence": "high",
            "iv_path": "rising", "iv_path_confidence": "medium"
        },
        "atm_iv": { "iv_7d": 0.45, "iv_14d": 0.47, "iv_source": "skew" }
    })
}

/// The submission split into `parts` roughly equal sections.
fn split_submission(parts: usize) -> Vec<TargetRecord> {
    let full = submission();
    let Value::Object(map) = full else {
        unreachable!()
    };
    let keys: Vec<String> = map.keys().filter(|k| *k != "symbol").cloned().collect();
    keys.chunks(keys.len().div_ceil(parts))
        .map(|chunk| {
            let mut part = serde_json::Map::new();
            part.insert("symbol".into(), json!("BENCH"));
            for k in chunk {
                part.insert(k.clone(), map[k].clone());
            }
            TargetRecord::from_json(&Value::Object(part)).unwrap()
        })
        .collect()
}

// ── 1. Aggregation ───────────────────────────────────────────────────

fn bench_aggregation(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregation");
    let aggregator = Aggregator::default();
    let at = chrono::NaiveDate::from_ymd_opt(2025, 1, 2)
        .unwrap()
        .and_hms_opt(9, 30, 0)
        .unwrap();

    for &parts in &[1usize, 3, 6] {
        let records = split_submission(parts);
        group.bench_with_input(BenchmarkId::from_parameter(parts), &records, |b, records| {
            b.iter(|| {
                let mut cache = CacheState::default();
                for r in records {
                    cache = aggregator.aggregate(black_box(r), &cache, at).cache;
                }
                cache
            })
        });
    }
    group.finish();
}

// ── 2. Field calculation ─────────────────────────────────────────────

fn bench_calculation(c: &mut Criterion) {
    let calculator = FieldCalculator::default();
    let record = TargetRecord::from_json(&submission()).unwrap();
    let params = MarketParams::new(18.0, 45.0, 0.45, 0.40);
    c.bench_function("field_calculation", |b| {
        b.iter(|| calculator.calculate(black_box(&record), Some(&params)))
    });
}

// ── 3. Scoring through ranking ───────────────────────────────────────

fn bench_decision_chain(c: &mut Criterion) {
    let record = TargetRecord::from_json(&submission()).unwrap();
    let Readiness::Ready(ready) = Readiness::check(record) else {
        panic!("bench record must be ready");
    };
    let scoring = ScoringEngine::default();
    let strategies = StrategyCalculator::default();
    let ranking = RankingEngine::default();

    c.bench_function("score_strategies_rank", |b| {
        b.iter(|| {
            let s = scoring.score(black_box(&ready), Some(45.0));
            let set = strategies.evaluate(&ready, &s, None);
            ranking.rank(&set)
        })
    });
}

criterion_group!(
    benches,
    bench_aggregation,
    bench_calculation,
    bench_decision_chain,
);
criterion_main!(benches);
