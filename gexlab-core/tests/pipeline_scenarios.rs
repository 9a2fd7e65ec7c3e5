//! Scenario tests for the aggregation → calculation → scoring → strategy →
//! ranking chain.
//!
//! Scenarios:
//! A. Near gap with a very strong cluster scores break-wall 8
//! B. Panic IV rank selects the panic weight row
//! C. An all-sentinel submission leaves the accumulated record untouched
//! D. Neutral VIX and IVR give lambda 1 and the textbook expected move
//! E. Volume divergence zeroes directional candidates in the ranking
//! plus a multi-round end-to-end run.

mod common;

use common::{at, complete_record, complete_submission};
use gexlab_core::aggregator::{DataStatus, Decision, MergeFailure};
use gexlab_core::config::ScoringConfig;
use gexlab_core::record::{Field, SpotVsTrigger, VolumeSignal};
use gexlab_core::scoring::factors::break_wall;
use gexlab_core::scoring::{AppliedWeights, WeightRegime};
use gexlab_core::strategy::Archetype;
use gexlab_core::{
    Aggregator, CacheState, FieldCalculator, MarketParams, RankingEngine, Readiness,
    ReadyRecord, ScoringEngine, StrategyCalculator, TargetRecord,
};
use serde_json::json;

// ──────────────────────────────────────────────
// Helpers
// ──────────────────────────────────────────────

fn ready(record: TargetRecord) -> ReadyRecord {
    match Readiness::check(record) {
        Readiness::Ready(r) => r,
        Readiness::Awaiting(missing) => panic!("record not ready, missing {missing:?}"),
    }
}

// ──────────────────────────────────────────────
// Scenario A
// ──────────────────────────────────────────────

#[test]
fn scenario_a_near_gap_strong_cluster() {
    // GIVEN spot above trigger, gap 0.3 EM and a 2.5× cluster
    let mut r = complete_record();
    r.gamma_metrics.spot_vs_trigger = Field::Valid(SpotVsTrigger::Above);
    r.gamma_metrics.gap_distance_em1_multiple = Field::Valid(0.3);
    r.gamma_metrics.cluster_strength_ratio = Field::Valid(2.5);

    // WHEN the record is scored
    let result = ScoringEngine::default().score(&ready(r), None);

    // THEN break-wall is 9 - 1
    assert_eq!(result.break_wall.score.score, 8.0);
    assert_eq!(
        break_wall(Some(0.3), Some(2.5), false, &ScoringConfig::default()).score.score,
        8.0
    );
    assert!(result
        .risk_warnings
        .iter()
        .any(|w| w.contains("dominant wall")));
}

// ──────────────────────────────────────────────
// Scenario B
// ──────────────────────────────────────────────

#[test]
fn scenario_b_panic_weights() {
    // GIVEN IVR 85 and no index context
    let cfg = ScoringConfig::default();

    // WHEN weights are selected
    let w = AppliedWeights::select(Some(85.0), false, &cfg);

    // THEN the panic row applies untouched
    assert_eq!(w.regime, WeightRegime::Panic);
    assert_eq!(
        [w.applied.regime, w.applied.break_wall, w.applied.direction, w.applied.volatility],
        [0.2, 0.2, 0.2, 0.4]
    );
    assert!((w.sum() - 1.0).abs() < 1e-6);

    // AND with an index the four are rescaled around its fixed weight
    let with_index = AppliedWeights::select(Some(85.0), true, &cfg);
    assert_eq!(with_index.base, w.applied);
    assert!((with_index.sum() - 1.0).abs() < 1e-6);
}

// ──────────────────────────────────────────────
// Scenario C
// ──────────────────────────────────────────────

#[test]
fn scenario_c_empty_submission_is_degenerate() {
    let _ = env_logger::try_init();
    let aggregator = Aggregator::default();

    // GIVEN a task with some accumulated fields
    let first = aggregator.aggregate(&common::masked_record(0b111), &CacheState::default(), at(0));
    assert_eq!(first.cache.status, DataStatus::AwaitingData);

    // WHEN a submission of sentinels only arrives
    let empty = TargetRecord::from_json(&json!({
        "symbol": "TSLA",
        "spot_price": -999,
        "walls": { "call_wall": -999, "major_wall_type": "N/A" }
    }))
    .unwrap();
    let second = aggregator.aggregate(&empty, &first.cache, at(30));

    // THEN the prior record survives and the merge is flagged
    assert_eq!(second.record, first.record);
    assert!(second.report.merge_failed);
    assert_eq!(second.report.failure, Some(MergeFailure::EmptyContribution));
    assert_eq!(second.report.new_fields_count(), 0);
    assert_eq!(second.cache.history.len(), 2);
    let guide = second.guide.expect("still awaiting data");
    assert!(guide.to_string().contains("no valid fields"));
}

#[test]
fn resubmitting_identical_data_is_idempotent() {
    let aggregator = Aggregator::default();
    let partial = common::masked_record(0b1111);
    let first = aggregator.aggregate(&partial, &CacheState::default(), at(0));
    let again = aggregator.aggregate(&partial, &first.cache, at(1));

    assert_eq!(again.record, first.record);
    assert!(again.report.merge_failed);
    assert_eq!(again.report.failure, Some(MergeFailure::NoProgress));
    assert!(again.report.fields_added.is_empty());
    assert!(again.report.fields_updated.is_empty());
}

// ──────────────────────────────────────────────
// Scenario D
// ──────────────────────────────────────────────

#[test]
fn scenario_d_neutral_regime_expected_move() {
    // GIVEN spot 100, iv 0.40/0.42, VIX at base and IVR at floor
    let mut r = TargetRecord::default();
    r.spot_price = Field::Valid(100.0);
    r.atm_iv.iv_7d = Field::Valid(0.40);
    r.atm_iv.iv_14d = Field::Valid(0.42);
    let params = MarketParams::new(15.0, 50.0, 30.0, 30.0);

    // WHEN derived fields are calculated
    let calc = FieldCalculator::default().calculate(&r, Some(&params));

    // THEN lambda is exactly 1 and EM1 = 100 × 0.40 × sqrt(1/252)
    let profile = calc.profile.expect("params supplied");
    assert_eq!(profile.lambda, 1.0);
    assert_eq!(calc.record.em1_dollar, Field::Valid(2.52));
    let d = calc.log.derivation("em1_dollar").unwrap();
    assert!(d.formula.contains("min(iv_7d, iv_14d)"));
}

// ──────────────────────────────────────────────
// Scenario E
// ──────────────────────────────────────────────

#[test]
fn scenario_e_volume_divergence_zeroes_directional() {
    // GIVEN a long-leaning record whose tape buys puts
    let mut r = complete_record();
    r.flow_signals.net_volume_signal = Field::Valid(VolumeSignal::BearishPutBuy);
    let ready = ready(r);

    // WHEN the full chain runs
    let scoring = ScoringEngine::default().score(&ready, Some(50.0));
    let set = StrategyCalculator::default().evaluate(&ready, &scoring, None);
    let ranking = RankingEngine::default().rank(&set);

    // THEN every directional entry scores exactly zero and ranks last
    let directional: Vec<_> = ranking
        .entries
        .iter()
        .filter(|e| e.archetype().is_directional())
        .collect();
    assert!(!directional.is_empty());
    for e in &directional {
        assert_eq!(e.composite, 0.0, "{}", e.archetype());
        assert!(e.candidate.veto.vetoed);
    }
    assert!(!ranking.best().unwrap().archetype().is_directional());
}

// ──────────────────────────────────────────────
// End to end
// ──────────────────────────────────────────────

#[test]
fn multi_round_submission_reaches_ranking() {
    let _ = env_logger::try_init();
    let aggregator = Aggregator::default();
    let calculator = FieldCalculator::default();
    let params = MarketParams::new(18.0, 45.0, 0.45, 0.40);

    // GIVEN the submission split in two halves, EM left to the calculator
    let mut full = complete_submission();
    full.as_object_mut().unwrap().remove("em1_dollar");
    let mut first_half = full.clone();
    first_half.as_object_mut().unwrap().remove("directional_metrics");
    first_half.as_object_mut().unwrap().remove("atm_iv");
    let second_half = json!({
        "symbol": "TSLA",
        "directional_metrics": full["directional_metrics"].clone(),
        "atm_iv": full["atm_iv"].clone()
    });

    // WHEN round one arrives
    let r1 = aggregator.aggregate(
        &TargetRecord::from_json(&first_half).unwrap(),
        &CacheState::default(),
        at(0),
    );
    assert_eq!(r1.report.decision, Decision::FirstSubmission);
    assert!(!r1.is_ready());
    assert!(r1.guide.as_ref().is_some_and(|g| !g.commands.is_empty()));

    // AND round two completes the observations
    let r2 = aggregator.aggregate(&TargetRecord::from_json(&second_half).unwrap(), &r1.cache, at(120));
    assert_eq!(r2.report.decision, Decision::Accumulate);

    // AND the calculator supplies EM1
    let calc = calculator.calculate(&r2.record, Some(&params));
    let r2 = aggregator.refresh(r2, calc.record.clone());

    // THEN the record is ready and flows through to a ranking
    assert!(r2.is_ready());
    assert_eq!(r2.cache.status, DataStatus::Ready);
    assert!(r2.cache.record.is_none());
    let Readiness::Ready(ready) = r2.readiness() else {
        panic!("expected ready");
    };
    let scoring = ScoringEngine::default().score(&ready, Some(params.ivr));
    let set = StrategyCalculator::default().evaluate(&ready, &scoring, calc.profile.as_ref());
    let ranking = RankingEngine::default().rank(&set);

    assert_eq!(ranking.symbol.as_deref(), Some("TSLA"));
    assert!(set.candidate(Archetype::IronCondor).is_some());
    assert_eq!(ranking.summary.total, set.candidates.len());
    assert!(ranking.summary.top.len() <= 3);
    for (i, e) in ranking.entries.iter().enumerate() {
        assert_eq!(e.rank, i + 1);
        assert!((0.0..=100.0).contains(&e.composite));
    }
    assert!(ranking
        .entries
        .windows(2)
        .all(|w| w[0].composite >= w[1].composite));

    // AND a further submission after readiness starts a new task
    let r3 = aggregator.aggregate(&TargetRecord::from_json(&second_half).unwrap(), &r2.cache, at(300));
    assert!(matches!(r3.report.decision, Decision::NewTask(_)));
}
