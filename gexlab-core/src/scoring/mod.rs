//! Multi-factor regime scoring.
//!
//! - Four rule-table factors plus an optional index-consistency factor
//! - Regime-aware weights selected by IV rank (calm / default / panic)
//! - Entry gate combining the weighted total with four binary conditions
//! - Risk warnings, key levels and the dominant scenario
//!
//! Only a [`ReadyRecord`] can be scored.

pub mod factors;
pub mod scenario;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::aggregator::ReadyRecord;
use crate::calc::round_to;
use crate::config::{FactorWeights, ScoringConfig};
use crate::record::{Confidence, IvPath, SpotVsTrigger, TargetRecord, Trend};

pub use factors::{BreakWall, Factor, FactorScore};
pub use scenario::{DeltaBias, ScenarioClassification, ScenarioKind};

// ─── Weights ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightRegime {
    Calm,
    Default,
    Panic,
}

/// Weights before and after making room for the index factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedWeights {
    pub regime: WeightRegime,
    pub base: FactorWeights,
    pub applied: FactorWeights,
    /// Weight of the index-consistency factor when it is active.
    pub index: Option<f64>,
}

impl AppliedWeights {
    pub fn select(ivr: Option<f64>, index_active: bool, cfg: &ScoringConfig) -> Self {
        let (regime, base) = match ivr {
            Some(v) if v > cfg.ivr_panic_above => (WeightRegime::Panic, cfg.weights.panic),
            Some(v) if v < cfg.ivr_calm_below => (WeightRegime::Calm, cfg.weights.calm),
            _ => (WeightRegime::Default, cfg.weights.default),
        };
        let index = (index_active && cfg.index_weight > 0.0).then_some(cfg.index_weight);
        let applied = match index {
            Some(w) => base.scaled(1.0 - w),
            None => base,
        };
        Self {
            regime,
            base,
            applied,
            index,
        }
    }

    pub fn sum(&self) -> f64 {
        self.applied.sum() + self.index.unwrap_or(0.0)
    }

    pub fn weight_of(&self, factor: Factor) -> f64 {
        match factor {
            Factor::Regime => self.applied.regime,
            Factor::BreakWall => self.applied.break_wall,
            Factor::Direction => self.applied.direction,
            Factor::Volatility => self.applied.volatility,
            Factor::IndexConsistency => self.index.unwrap_or(0.0),
        }
    }
}

// ─── Entry gate ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryDecision {
    Enter,
    Probe,
    Wait,
}

impl fmt::Display for EntryDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntryDecision::Enter => "enter",
            EntryDecision::Probe => "probe",
            EntryDecision::Wait => "wait",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryCheck {
    pub decision: EntryDecision,
    pub met: Vec<String>,
    pub failed: Vec<String>,
}

impl EntryCheck {
    pub const CONDITIONS: usize = 4;

    pub fn evaluate(record: &TargetRecord, total: f64, cfg: &ScoringConfig) -> Self {
        let g = &record.gamma_metrics;
        let d = &record.directional_metrics;
        let mut met = Vec::new();
        let mut failed = Vec::new();
        let mut check = |ok: bool, text: String| if ok { met.push(text) } else { failed.push(text) };

        let regime = g.spot_vs_trigger.get();
        check(
            matches!(regime, Some(SpotVsTrigger::Above | SpotVsTrigger::Below)),
            format!("regime decisive ({})", opt_label(regime)),
        );
        let gap = g.gap_distance_em1_multiple.get();
        check(
            gap.is_some_and(|v| v < cfg.entry_gap_max),
            format!("gap < {} EM ({})", cfg.entry_gap_max, opt_num(gap)),
        );
        let dex = d.dex_same_dir_pct.get();
        check(
            dex.is_some_and(|v| v >= cfg.dex_medium),
            format!("dex >= {}% ({})", cfg.dex_medium, opt_num(dex)),
        );
        let vanna = d.vanna_confidence.get();
        check(
            vanna.is_some_and(Confidence::is_actionable),
            format!("vanna confidence >= medium ({})", opt_label(vanna)),
        );

        let decision = match (total >= cfg.entry_threshold, met.len()) {
            (true, n) if n >= 3 => EntryDecision::Enter,
            (true, 2) => EntryDecision::Probe,
            _ => EntryDecision::Wait,
        };
        Self {
            decision,
            met,
            failed,
        }
    }

    pub fn met_count(&self) -> usize {
        self.met.len()
    }
}

fn opt_label<T: fmt::Display>(v: Option<T>) -> String {
    v.map_or_else(|| "n/a".to_string(), |v| v.to_string())
}

fn opt_num(v: Option<f64>) -> String {
    v.map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}"))
}

// ─── Result ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct KeyLevels {
    pub spot: Option<f64>,
    pub trigger: Option<f64>,
    pub support: Option<f64>,
    pub resistance: Option<f64>,
}

impl KeyLevels {
    pub fn of(record: &TargetRecord) -> Self {
        Self {
            spot: record.spot_price.get(),
            trigger: record.gamma_metrics.vol_trigger.get(),
            support: record.walls.put_wall.get(),
            resistance: record.walls.call_wall.get(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringResult {
    pub factors: Vec<FactorScore>,
    pub weights: AppliedWeights,
    /// Weighted total on 0-10, one decimal.
    pub total: f64,
    /// `total × 10`, on 0-100.
    pub composite: f64,
    pub break_wall: BreakWall,
    pub vanna_weight: f64,
    pub entry: EntryCheck,
    pub risk_warnings: Vec<String>,
    pub key_levels: KeyLevels,
    pub scenario: ScenarioClassification,
}

impl ScoringResult {
    pub fn factor(&self, factor: Factor) -> Option<&FactorScore> {
        self.factors.iter().find(|f| f.factor == factor)
    }

    /// `"7×0.40 + 8×0.30 + ... = 6.9"`
    pub fn breakdown(&self) -> String {
        let terms: Vec<String> = self
            .factors
            .iter()
            .map(|f| format!("{}×{:.2}", f.score, self.weights.weight_of(f.factor)))
            .collect();
        format!("{} = {:.1}", terms.join(" + "), self.total)
    }
}

// ─── Engine ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct ScoringEngine {
    config: ScoringConfig,
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Scores a complete record. Without an IV rank the default weights apply.
    pub fn score(&self, ready: &ReadyRecord, ivr: Option<f64>) -> ScoringResult {
        let cfg = &self.config;
        let r = ready.record();
        let g = &r.gamma_metrics;
        let d = &r.directional_metrics;

        let regime = factors::regime(g.spot_vs_trigger.get());
        let break_wall = factors::break_wall(
            g.gap_distance_em1_multiple.get(),
            g.cluster_strength_ratio.get(),
            g.monthly_cluster_override.get().unwrap_or(false),
            cfg,
        );
        let direction = factors::direction(
            d.dex_same_dir_pct.get(),
            d.vanna_dir.get(),
            d.vanna_confidence.get(),
            cfg,
        );
        let volatility = factors::volatility(d.iv_path.get(), d.iv_path_confidence.get());

        let index = r
            .indices
            .get(&cfg.primary_index)
            .and_then(|idx| idx.regime())
            .map(|idx_regime| {
                factors::index_consistency(g.spot_vs_trigger.get(), idx_regime, &cfg.primary_index)
            });

        let weights = AppliedWeights::select(ivr, index.is_some(), cfg);
        let mut scored = vec![regime, break_wall.score.clone(), direction, volatility];
        scored.extend(index);

        let total = round_to(
            scored
                .iter()
                .map(|f| f.score * weights.weight_of(f.factor))
                .sum::<f64>(),
            1,
        );
        let composite = total * 10.0;

        let entry = EntryCheck::evaluate(r, total, cfg);
        let scenario = ScenarioClassification::classify(
            r,
            break_wall.score.score,
            scored[2].score,
            composite,
        );

        log::info!(
            "score: {} total {total:.1} ({:?} weights), entry {}",
            r.symbol().unwrap_or("?"),
            weights.regime,
            entry.decision
        );

        ScoringResult {
            factors: scored,
            vanna_weight: factors::vanna_weight(d.vanna_confidence.get(), cfg),
            risk_warnings: self.risk_warnings(r),
            key_levels: KeyLevels::of(r),
            weights,
            total,
            composite,
            break_wall,
            entry,
            scenario,
        }
    }

    fn risk_warnings(&self, r: &TargetRecord) -> Vec<String> {
        let cfg = &self.config;
        let g = &r.gamma_metrics;
        let d = &r.directional_metrics;
        let mut warnings = Vec::new();

        if let Some(gap) = g.gap_distance_em1_multiple.get().filter(|v| *v > cfg.risk_gap_warning) {
            let wall = if g.spot_vs_trigger.get() == Some(SpotVsTrigger::Above) {
                "call wall"
            } else {
                "put wall"
            };
            warnings.push(format!(
                "{wall} is {gap:.2} EM away; reassess as a range if it is not reached soon"
            ));
        }
        if g.spot_vs_trigger.get() == Some(SpotVsTrigger::Near) {
            warnings.push("spot near the gamma flip; regime may reverse".to_string());
        }
        let conflict = matches!(
            (d.vanna_dir.get(), d.iv_path.get()),
            (Some(Trend::Up), Some(IvPath::Falling)) | (Some(Trend::Down), Some(IvPath::Rising))
        );
        if conflict {
            warnings.push("vanna direction conflicts with the IV path".to_string());
        }
        if let Some(ratio) = g.cluster_strength_ratio.get() {
            if ratio >= cfg.cluster_strong {
                warnings.push(format!(
                    "cluster strength {ratio:.2} >= {:.1}: dominant wall, breaks are unlikely",
                    cfg.cluster_strong
                ));
            } else if ratio >= cfg.cluster_strong - cfg.cluster_warning_margin {
                warnings.push(format!(
                    "cluster strength {ratio:.2} approaching {:.1}",
                    cfg.cluster_strong
                ));
            }
        }
        for w in &warnings {
            log::debug!("score: risk warning: {w}");
        }
        warnings
    }
}
