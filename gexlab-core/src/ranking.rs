//! Expected-value ranking of strategy candidates.
//!
//! Each candidate gets EV, RAR, a scenario-match tier and a liquidity check,
//! which feed a 0-100 composite built from capped buckets:
//!
//! | bucket    | points                       |
//! |-----------|------------------------------|
//! | EV        | >0.5 → 40, >0.2 → 30, >0 → 20 |
//! | RAR       | >0.3 → 30, >0.15 → 25, >0.05 → 15 |
//! | scenario  | high → 20, medium → 10       |
//! | liquidity | pass → 10                    |
//!
//! The strategy vetoes are applied last and the result floored at zero; a
//! vetoed candidate scores exactly zero.

use std::fmt;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::calc::round_to;
use crate::config::RankingConfig;
use crate::scoring::{ScenarioClassification, ScenarioKind};
use crate::strategy::{Archetype, RiskTier, StrategyCandidate, StrategySet};

/// Win probability used when a textual estimate cannot be read.
pub const FALLBACK_WIN_PROBABILITY: f64 = 0.5;

// ─── Metrics ─────────────────────────────────────────────────────────

/// `EV = Pw·MaxProfit − (1−Pw)·MaxLoss`
pub fn expected_value(pw: f64, max_profit: f64, max_loss: f64) -> f64 {
    pw * max_profit - (1.0 - pw) * max_loss
}

/// `RAR = EV / MaxLoss`; zero when nothing is at risk.
pub fn risk_adjusted_return(ev: f64, max_loss: f64) -> f64 {
    if max_loss > 0.0 {
        ev / max_loss
    } else {
        0.0
    }
}

/// Reads a textual win probability: `"65%"`, `"约 50%"`, `"50-60%"`
/// (midpoint), `"0.65"`. Bare numbers above 1 are percentages; negative
/// estimates are rejected.
pub fn parse_win_probability(text: &str) -> Option<f64> {
    let text = text.trim();
    let start = text.find(|c: char| c.is_ascii_digit() || c == '.')?;
    if text[..start].contains('-') {
        return None;
    }
    let cleaned = text[start..].trim();
    let percent = cleaned.contains('%');
    let body = cleaned.replace('%', "");

    let value = match body.split_once('-') {
        Some((lo, hi)) => {
            let lo: f64 = lo.trim().parse().ok()?;
            let hi: f64 = hi.trim().parse().ok()?;
            (lo + hi) / 2.0
        }
        None => body.trim().parse().ok()?,
    };

    as_fraction(value, percent)
}

fn as_fraction(value: f64, percent: bool) -> Option<f64> {
    let p = if percent || value > 1.0 { value / 100.0 } else { value };
    (0.0..=1.0).contains(&p).then_some(p)
}

/// Deserializes a win-probability estimate written either as a number or
/// as text. Unreadable estimates fall back to [`FALLBACK_WIN_PROBABILITY`].
pub(crate) fn deserialize_estimate<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<f64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let parsed = match &value {
        Value::Number(n) => n.as_f64().and_then(|v| as_fraction(v, false)),
        Value::String(s) => parse_win_probability(s),
        other => return Err(de::Error::custom(format!("expected a win probability, got {other}"))),
    };
    Ok(parsed.unwrap_or_else(|| {
        log::warn!("ranking: unreadable win probability {value}, using {FALLBACK_WIN_PROBABILITY}");
        FALLBACK_WIN_PROBABILITY
    }))
}

// ─── Scenario match ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchLevel {
    Low,
    Medium,
    High,
}

impl MatchLevel {
    fn points(self) -> f64 {
        match self {
            MatchLevel::High => 20.0,
            MatchLevel::Medium => 10.0,
            MatchLevel::Low => 0.0,
        }
    }
}

impl fmt::Display for MatchLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MatchLevel::High => "high",
            MatchLevel::Medium => "medium",
            MatchLevel::Low => "low",
        })
    }
}

pub fn scenario_match(
    tier: RiskTier,
    scenario: &ScenarioClassification,
    cfg: &RankingConfig,
) -> (MatchLevel, String) {
    let p = scenario.probability;
    let kind = scenario.kind;
    let trending = scenario.is_trending();
    match tier {
        RiskTier::Conservative => {
            if kind == ScenarioKind::Range && p >= cfg.conservative_high_probability {
                (MatchLevel::High, format!("range scenario at {p:.0}% suits premium selling"))
            } else if kind == ScenarioKind::Range {
                (MatchLevel::Medium, format!("range scenario at {p:.0}% is marginal"))
            } else {
                (MatchLevel::Low, format!("{kind} scenario does not suit a range structure"))
            }
        }
        RiskTier::Balanced => {
            if trending && p >= cfg.balanced_high_probability {
                (MatchLevel::High, format!("{kind} scenario at {p:.0}% suits a debit spread"))
            } else if kind == ScenarioKind::Range {
                (MatchLevel::Medium, "range scenario leaves partial directional room".to_string())
            } else {
                (MatchLevel::Low, "unclear scenario for a directional spread".to_string())
            }
        }
        RiskTier::Aggressive => {
            if kind == ScenarioKind::StrongTrend || p >= cfg.aggressive_high_probability {
                (MatchLevel::High, format!("high conviction ({p:.0}%) favours outright exposure"))
            } else if trending {
                (MatchLevel::Medium, "early trend, single leg carries extra risk".to_string())
            } else {
                (MatchLevel::Low, "no trend, time decay works against a single leg".to_string())
            }
        }
    }
}

// ─── Liquidity ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Liquidity {
    pub pass: bool,
    pub note: String,
}

/// Fails on too many legs or a strike too far from spot in EM units.
/// Without a positive EM the distance check is skipped.
pub fn liquidity(candidate: &StrategyCandidate, spot: f64, em1: f64, cfg: &RankingConfig) -> Liquidity {
    let n = candidate.legs.len();
    if n > cfg.max_legs {
        return Liquidity {
            pass: false,
            note: format!("{n} legs exceeds {}", cfg.max_legs),
        };
    }
    if em1 > 0.0 {
        for leg in &candidate.legs {
            let distance = (leg.strike - spot).abs() / em1;
            if distance > cfg.max_leg_distance_em {
                return Liquidity {
                    pass: false,
                    note: format!("strike {:.2} is {distance:.1} EM from spot", leg.strike),
                };
            }
        }
    }
    Liquidity {
        pass: true,
        note: "liquidity ok".to_string(),
    }
}

// ─── Composite ───────────────────────────────────────────────────────

fn ev_points(ev: f64) -> f64 {
    if ev > 0.5 {
        40.0
    } else if ev > 0.2 {
        30.0
    } else if ev > 0.0 {
        20.0
    } else {
        0.0
    }
}

fn rar_points(rar: f64) -> f64 {
    if rar > 0.3 {
        30.0
    } else if rar > 0.15 {
        25.0
    } else if rar > 0.05 {
        15.0
    } else {
        0.0
    }
}

/// Bucket total before vetoes, on 0-100.
pub fn subtotal(ev: f64, rar: f64, matched: MatchLevel, liquid: bool) -> f64 {
    ev_points(ev) + rar_points(rar) + matched.points() + if liquid { 10.0 } else { 0.0 }
}

/// Applies the veto adjustment; vetoed candidates score exactly zero.
pub fn composite(subtotal: f64, adjustment: f64, vetoed: bool) -> f64 {
    if vetoed {
        return 0.0;
    }
    (subtotal + adjustment).clamp(0.0, 100.0)
}

// ─── Ranking ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
    /// 1-based position.
    pub rank: usize,
    pub candidate: StrategyCandidate,
    pub win_probability: f64,
    pub ev: f64,
    pub rar: f64,
    pub scenario_match: MatchLevel,
    pub match_reason: String,
    pub liquidity: Liquidity,
    pub subtotal: f64,
    pub composite: f64,
}

impl RankingEntry {
    pub fn archetype(&self) -> Archetype {
        self.candidate.archetype
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopPick {
    pub rank: usize,
    pub archetype: Archetype,
    pub ev: f64,
    pub rar: f64,
    pub win_probability: f64,
    pub scenario_match: MatchLevel,
    pub composite: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingSummary {
    pub total: usize,
    pub positive_ev_count: usize,
    pub top: Vec<TopPick>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ranking {
    pub symbol: Option<String>,
    pub entries: Vec<RankingEntry>,
    pub summary: RankingSummary,
}

impl Ranking {
    pub fn best(&self) -> Option<&RankingEntry> {
        self.entries.first()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RankingEngine {
    config: RankingConfig,
}

impl RankingEngine {
    pub fn new(config: RankingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    pub fn rank(&self, set: &StrategySet) -> Ranking {
        let cfg = &self.config;
        let mut entries: Vec<RankingEntry> = set
            .candidates
            .iter()
            .map(|c| {
                let pw = c.win_probability.estimate;
                let rr = &c.risk_reward;
                let ev = expected_value(pw, rr.max_profit, rr.max_loss);
                let rar = risk_adjusted_return(ev, rr.max_loss);
                let (scenario_match, match_reason) = scenario_match(c.tier, &set.scenario, cfg);
                let liquidity = liquidity(c, set.spot, set.em1, cfg);
                let sub = subtotal(ev, rar, scenario_match, liquidity.pass);
                let score = composite(sub, c.veto.adjustment, c.veto.vetoed);
                log::debug!(
                    "rank: {} ev {ev:.2} rar {rar:.3} match {scenario_match} subtotal {sub} composite {score}",
                    c.archetype
                );
                RankingEntry {
                    rank: 0,
                    candidate: c.clone(),
                    win_probability: pw,
                    ev: round_to(ev, 2),
                    rar: round_to(rar, 3),
                    scenario_match,
                    match_reason,
                    liquidity,
                    subtotal: sub,
                    composite: score,
                }
            })
            .collect();

        // stable: ties keep candidate order
        entries.sort_by(|a, b| b.composite.total_cmp(&a.composite));
        for (i, e) in entries.iter_mut().enumerate() {
            e.rank = i + 1;
        }

        let summary = RankingSummary {
            total: entries.len(),
            positive_ev_count: entries.iter().filter(|e| e.ev > 0.0).count(),
            top: entries
                .iter()
                .take(3)
                .map(|e| TopPick {
                    rank: e.rank,
                    archetype: e.archetype(),
                    ev: e.ev,
                    rar: e.rar,
                    win_probability: e.win_probability,
                    scenario_match: e.scenario_match,
                    composite: e.composite,
                })
                .collect(),
        };

        if let Some(top) = entries.first() {
            log::info!(
                "rank: {} top {} (ev {:.2}, composite {})",
                set.symbol.as_deref().unwrap_or("?"),
                top.archetype(),
                top.ev,
                top.composite
            );
        }

        Ranking {
            symbol: set.symbol.clone(),
            entries,
            summary,
        }
    }
}
