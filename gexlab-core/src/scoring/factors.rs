//! Rule tables for the factor sub-scores.
//!
//! Each rule takes plain optional inputs so it can be exercised without a
//! full record; missing inputs fall to the least favourable row.

use serde::{Deserialize, Serialize};

use crate::config::ScoringConfig;
use crate::record::{Confidence, IvPath, SpotVsTrigger, Trend};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Factor {
    Regime,
    BreakWall,
    Direction,
    Volatility,
    IndexConsistency,
}

/// One factor's 0-10 score and the row of the rule table that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorScore {
    pub factor: Factor,
    pub score: f64,
    pub rationale: String,
}

impl FactorScore {
    fn new(factor: Factor, score: f64, rationale: impl Into<String>) -> Self {
        Self {
            factor,
            score,
            rationale: rationale.into(),
        }
    }
}

pub fn regime(spot_vs_trigger: Option<SpotVsTrigger>) -> FactorScore {
    match spot_vs_trigger {
        Some(SpotVsTrigger::Above) => FactorScore::new(
            Factor::Regime,
            7.0,
            "spot above trigger: positive gamma, dealers dampen moves",
        ),
        Some(SpotVsTrigger::Below) => FactorScore::new(
            Factor::Regime,
            7.0,
            "spot below trigger: negative gamma, dealers amplify moves",
        ),
        _ => FactorScore::new(Factor::Regime, 4.0, "spot near trigger: regime may flip"),
    }
}

/// Break-wall assessment including the distance threshold in force.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakWall {
    pub score: FactorScore,
    /// EM multiple treated as "within reach".
    pub threshold: f64,
    pub threshold_note: String,
}

pub fn break_wall(
    gap_em1: Option<f64>,
    cluster: Option<f64>,
    monthly_override: bool,
    cfg: &ScoringConfig,
) -> BreakWall {
    let gap = gap_em1.unwrap_or(f64::INFINITY);
    let (base, distance): (f64, &str) = if gap < cfg.break_wall_near {
        (9.0, "near")
    } else if gap < cfg.break_wall_mid {
        (6.0, "mid")
    } else {
        (3.0, "far")
    };

    let ratio = cluster.unwrap_or(0.0);
    let (adjustment, resistance): (f64, &str) = if ratio >= cfg.cluster_strong {
        (-1.0, "very strong wall")
    } else if ratio >= cfg.cluster_trend {
        (0.0, "moderate wall")
    } else {
        (1.0, "weak wall")
    };

    let score = (base + adjustment).clamp(1.0, 10.0);
    let (threshold, threshold_note) = if monthly_override {
        (
            cfg.monthly_override_threshold,
            "monthly cluster dominates weekly".to_string(),
        )
    } else {
        (cfg.break_wall_mid, format!("standard {}×EM1", cfg.break_wall_mid))
    };

    BreakWall {
        score: FactorScore::new(
            Factor::BreakWall,
            score,
            format!("gap {gap:.2} EM ({distance}) {base}, cluster {ratio:.2} ({resistance}) {adjustment:+}"),
        ),
        threshold,
        threshold_note,
    }
}

pub fn vanna_weight(confidence: Option<Confidence>, cfg: &ScoringConfig) -> f64 {
    let w = &cfg.vanna_weights;
    match confidence {
        Some(Confidence::High) => w.high,
        Some(Confidence::Medium) => w.medium,
        _ => w.low,
    }
}

pub fn direction(
    dex_same_dir_pct: Option<f64>,
    vanna_dir: Option<Trend>,
    vanna_confidence: Option<Confidence>,
    cfg: &ScoringConfig,
) -> FactorScore {
    let dex = dex_same_dir_pct.unwrap_or(0.0);
    let weight = vanna_weight(vanna_confidence, cfg);
    let medium = cfg.vanna_weights.medium;
    let clear_vanna = matches!(vanna_dir, Some(Trend::Up | Trend::Down));

    let (score, label) = if dex >= cfg.dex_strong && clear_vanna && weight >= medium {
        (9.0, "strong flow with confident vanna")
    } else if dex >= cfg.dex_medium || weight == medium {
        (6.0, "medium flow or medium vanna confidence")
    } else if dex < cfg.dex_weak || !vanna_confidence.is_some_and(Confidence::is_actionable) {
        (3.0, "weak flow or low vanna confidence")
    } else {
        (5.0, "ambiguous")
    };
    FactorScore::new(
        Factor::Direction,
        score,
        format!("dex {dex:.1}% + vanna weight {weight:.1}: {label}"),
    )
}

pub fn volatility(iv_path: Option<IvPath>, confidence: Option<Confidence>) -> FactorScore {
    let (score, label) = match (iv_path, confidence) {
        (Some(IvPath::Rising), Some(Confidence::High)) => (8.0, "expanding, high confidence"),
        (Some(IvPath::Rising), Some(Confidence::Medium)) => (6.0, "expanding, medium confidence"),
        (Some(IvPath::Falling), Some(Confidence::High)) => (3.0, "compressing, high confidence"),
        (Some(IvPath::Falling), Some(Confidence::Medium)) => (4.0, "compressing, medium confidence"),
        (Some(IvPath::Falling), _) => (5.0, "compressing, low confidence"),
        _ => (5.0, "flat or uncertain"),
    };
    FactorScore::new(Factor::Volatility, score, format!("iv path {label}"))
}

/// Agreement between a benchmark index's regime and the instrument's own.
pub fn index_consistency(
    own: Option<SpotVsTrigger>,
    index: SpotVsTrigger,
    index_name: &str,
) -> FactorScore {
    use SpotVsTrigger::{Above, Below};
    let (score, label) = match (own, index) {
        (Some(a), b) if a == b && a != SpotVsTrigger::Near => (6.0, "confirms"),
        (Some(Above), Below) | (Some(Below), Above) => (4.0, "contradicts"),
        _ => (5.0, "inconclusive"),
    };
    FactorScore::new(
        Factor::IndexConsistency,
        score,
        format!("{index_name} regime {index} {label}"),
    )
}
