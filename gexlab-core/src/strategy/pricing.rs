//! Holding period, closed-form risk/reward and win probability.

use serde::{Deserialize, Serialize};

use crate::calc::round_to;
use crate::config::{tier_fraction, DteConfig, StrategyConfig, WinProbabilityConfig};

use super::archetype::{Archetype, Ladder, Pricing};

// ─── DTE ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DteDecision {
    pub days: u32,
    pub t_scale: f64,
    pub gap_multiplier: f64,
    pub monthly_floor_applied: bool,
    pub rationale: String,
}

/// `base × t_scale × gap multiplier`, floored under a monthly override,
/// clamped and truncated to whole days.
pub fn holding_period(
    t_scale: f64,
    gap_em1: Option<f64>,
    monthly_override: bool,
    cfg: &DteConfig,
) -> DteDecision {
    let gap = gap_em1.unwrap_or(2.0);
    let (gap_multiplier, gap_label) = if gap > cfg.gap_long_above {
        (cfg.long_multiplier, "far wall")
    } else if gap < cfg.gap_short_below {
        (cfg.short_multiplier, "near wall")
    } else {
        (1.0, "mid distance")
    };

    let mut raw = cfg.base_days * t_scale * gap_multiplier;
    let monthly_floor_applied = monthly_override && raw < cfg.monthly_floor_days;
    if monthly_floor_applied {
        raw = cfg.monthly_floor_days;
    }
    let days = raw.clamp(cfg.min_days, cfg.max_days) as u32;

    let mut rationale = format!(
        "{} × t_scale {t_scale:.2} × {gap_multiplier} ({gap_label}, gap {gap:.2} EM)",
        cfg.base_days
    );
    if monthly_floor_applied {
        rationale.push_str(&format!(", monthly floor {}", cfg.monthly_floor_days));
    }
    rationale.push_str(&format!(" = {days}d"));

    DteDecision {
        days,
        t_scale,
        gap_multiplier,
        monthly_floor_applied,
        rationale,
    }
}

// ─── Risk / reward ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReward {
    pub pricing: Pricing,
    pub width: f64,
    /// IVR-tier fraction of width (or of EM for single legs).
    pub fraction: f64,
    /// Premium received (credit) or paid (debit).
    pub premium: f64,
    pub max_profit: f64,
    pub max_loss: f64,
    /// `max_profit / max_loss`, 0 when nothing is at risk.
    pub ratio: f64,
}

impl RiskReward {
    fn new(pricing: Pricing, width: f64, fraction: f64, premium: f64, max_profit: f64, max_loss: f64) -> Self {
        let ratio = if max_loss > 0.0 { max_profit / max_loss } else { 0.0 };
        Self {
            pricing,
            width: round_to(width, 2),
            fraction,
            premium: round_to(premium, 2),
            max_profit: round_to(max_profit, 2),
            max_loss: round_to(max_loss, 2),
            ratio: round_to(ratio, 2),
        }
    }
}

pub fn risk_reward(
    archetype: Archetype,
    ladder: &Ladder,
    spot: f64,
    em1: f64,
    ivr: f64,
    cfg: &StrategyConfig,
) -> RiskReward {
    let w = ladder.width;
    match archetype.pricing() {
        Pricing::Credit => {
            let f = tier_fraction(&cfg.credit_fractions, ivr);
            let credit = w * f;
            RiskReward::new(Pricing::Credit, w, f, credit, credit, w - credit)
        }
        Pricing::DebitSpread => {
            let f = tier_fraction(&cfg.debit_fractions, ivr);
            let cost = w * f;
            RiskReward::new(Pricing::DebitSpread, w, f, cost, w - cost, cost)
        }
        Pricing::SingleLeg => {
            let f = tier_fraction(&cfg.debit_fractions, ivr);
            let premium = em1 * f;
            let strike = ladder.legs.first().map_or(spot, |l| l.strike);
            let distance = ladder.target.map_or(0.0, |t| (t - strike).abs());
            RiskReward::new(Pricing::SingleLeg, 0.0, f, premium, (distance - premium).max(0.0), premium)
        }
    }
}

// ─── Win probability ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WinProbability {
    /// Written back as a fraction; read from a number or text like `"约 65%"`.
    #[serde(deserialize_with = "crate::ranking::deserialize_estimate")]
    pub estimate: f64,
    pub formula: String,
}

/// Inputs shared by the win-probability rules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbabilityInputs {
    pub cluster: Option<f64>,
    pub gap_em1: Option<f64>,
    pub dex_same_dir_pct: Option<f64>,
    pub vanna_weight: f64,
    pub spot: f64,
    pub em1: f64,
}

pub fn win_probability(
    archetype: Archetype,
    ladder: &Ladder,
    inputs: &ProbabilityInputs,
    cfg: &WinProbabilityConfig,
) -> WinProbability {
    match archetype {
        Archetype::IronCondor => {
            let cluster = inputs.cluster.unwrap_or(1.0);
            let gap = inputs.gap_em1.unwrap_or(cfg.credit_comfort_em);
            let raw = cfg.credit_base + cfg.credit_cluster_coef * (cluster - 1.0)
                - cfg.credit_distance_coef * (cfg.credit_comfort_em - gap).max(0.0);
            WinProbability {
                estimate: round_to(raw.clamp(cfg.credit_min, cfg.credit_max), 3),
                formula: format!(
                    "{} + {}×(cluster {cluster:.2} - 1) - {}×max(0, {} - gap {gap:.2}), clamped [{}, {}]",
                    cfg.credit_base,
                    cfg.credit_cluster_coef,
                    cfg.credit_distance_coef,
                    cfg.credit_comfort_em,
                    cfg.credit_min,
                    cfg.credit_max
                ),
            }
        }
        Archetype::IronButterfly => {
            let body = ladder.legs.first().map_or(inputs.spot, |l| l.strike);
            let inside = (body - inputs.spot).abs() <= inputs.em1;
            let estimate = if inside {
                cfg.butterfly_inside
            } else {
                cfg.butterfly_offset
            };
            WinProbability {
                estimate,
                formula: format!(
                    "body {body:.2} {} 1 EM of spot {:.2}",
                    if inside { "within" } else { "beyond" },
                    inputs.spot
                ),
            }
        }
        _ => {
            let dex = inputs.dex_same_dir_pct.unwrap_or(50.0);
            let raw = cfg.debit_base
                + cfg.debit_dex_coef * (dex - 50.0) / 10.0
                + cfg.debit_vanna_coef * inputs.vanna_weight;
            WinProbability {
                estimate: round_to(raw.clamp(cfg.debit_min, cfg.debit_max), 3),
                formula: format!(
                    "{} + {}×(dex {dex:.1} - 50)/10 + {}×vanna {:.1}, clamped [{}, {}]",
                    cfg.debit_base,
                    cfg.debit_dex_coef,
                    cfg.debit_vanna_coef,
                    inputs.vanna_weight,
                    cfg.debit_min,
                    cfg.debit_max
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::archetype::{ladder, Anchors};
    use crate::config::StrikeOffsets;

    fn anchors() -> Anchors {
        Anchors {
            spot: 100.0,
            em1: 2.0,
            call_wall: 106.0,
            put_wall: 94.0,
            major_wall: Some(101.0),
        }
    }

    fn inputs() -> ProbabilityInputs {
        ProbabilityInputs {
            cluster: Some(1.5),
            gap_em1: Some(1.0),
            dex_same_dir_pct: Some(65.0),
            vanna_weight: 1.0,
            spot: 100.0,
            em1: 2.0,
        }
    }

    #[test]
    fn dte_scales_and_clamps() {
        let cfg = DteConfig::default();
        assert_eq!(holding_period(1.0, Some(2.0), false, &cfg).days, 21);
        // 21 × 1.0 × 1.2 = 25.2
        assert_eq!(holding_period(1.0, Some(3.5), false, &cfg).days, 25);
        // 21 × 0.5 × 0.8 = 8.4
        assert_eq!(holding_period(0.5, Some(0.5), false, &cfg).days, 8);
        assert_eq!(holding_period(2.0, Some(4.0), false, &cfg).days, 45);
    }

    #[test]
    fn monthly_override_floors_dte() {
        let d = holding_period(0.5, Some(2.0), true, &DteConfig::default());
        assert!(d.monthly_floor_applied);
        assert_eq!(d.days, 25);
    }

    #[test]
    fn credit_and_debit_tiers() {
        let cfg = StrategyConfig::default();
        let a = anchors();
        let o = StrikeOffsets::default();

        let condor = ladder(Archetype::IronCondor, &a, &o).unwrap();
        let rr = risk_reward(Archetype::IronCondor, &condor, a.spot, a.em1, 60.0, &cfg);
        // width 3.0, fraction 0.40
        assert_eq!(rr.max_profit, 1.2);
        assert_eq!(rr.max_loss, 1.8);

        let bull = ladder(Archetype::BullCallSpread, &a, &o).unwrap();
        let rr = risk_reward(Archetype::BullCallSpread, &bull, a.spot, a.em1, 30.0, &cfg);
        // width 5.6, cost 1.68
        assert_eq!(rr.max_loss, 1.68);
        assert_eq!(rr.max_profit, 3.92);
        assert!((rr.ratio - 2.33).abs() < 1e-9);
    }

    #[test]
    fn single_leg_profit_runs_to_target_wall() {
        let cfg = StrategyConfig::default();
        let a = anchors();
        let call = ladder(Archetype::LongCall, &a, &StrikeOffsets::default()).unwrap();
        let rr = risk_reward(Archetype::LongCall, &call, a.spot, a.em1, 50.0, &cfg);
        // premium 2.0 × 0.40, strike 100.4, target 106
        assert_eq!(rr.max_loss, 0.8);
        assert_eq!(rr.max_profit, 4.8);
    }

    #[test]
    fn credit_probability_formula() {
        let cfg = WinProbabilityConfig::default();
        let condor = ladder(Archetype::IronCondor, &anchors(), &StrikeOffsets::default()).unwrap();
        // 0.5 + 0.05 - 0.05
        let p = win_probability(Archetype::IronCondor, &condor, &inputs(), &cfg);
        assert!((p.estimate - 0.5).abs() < 1e-9);
        let far = ProbabilityInputs {
            cluster: Some(5.0),
            ..inputs()
        };
        assert_eq!(win_probability(Archetype::IronCondor, &condor, &far, &cfg).estimate, 0.85);
    }

    #[test]
    fn debit_and_butterfly_probabilities() {
        let cfg = WinProbabilityConfig::default();
        let a = anchors();
        let o = StrikeOffsets::default();
        let bull = ladder(Archetype::BullCallSpread, &a, &o).unwrap();
        // 0.3 + 0.15 + 0.2
        let p = win_probability(Archetype::BullCallSpread, &bull, &inputs(), &cfg);
        assert!((p.estimate - 0.65).abs() < 1e-9);

        let fly = ladder(Archetype::IronButterfly, &a, &o).unwrap();
        assert_eq!(win_probability(Archetype::IronButterfly, &fly, &inputs(), &cfg).estimate, 0.65);
        let off = Anchors {
            major_wall: Some(105.0),
            ..a
        };
        let fly = ladder(Archetype::IronButterfly, &off, &o).unwrap();
        assert_eq!(win_probability(Archetype::IronButterfly, &fly, &inputs(), &cfg).estimate, 0.45);
    }
}
