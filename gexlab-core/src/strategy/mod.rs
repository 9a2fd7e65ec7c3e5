//! Strategy candidates for a scored record.
//!
//! Archetypes are fixed: a credit structure and a balanced butterfly are
//! always built, directional structures follow the resolved delta bias.
//! Strikes, holding period, pricing and win probability are closed-form
//! (see [`archetype`] and [`pricing`]); [`vetoes`] then adjusts each
//! candidate before ranking.

pub mod archetype;
pub mod pricing;
pub mod vetoes;

use serde::{Deserialize, Serialize};

use crate::aggregator::ReadyRecord;
use crate::calc::VolatilityProfile;
use crate::config::{GreeksTarget, StrategyConfig};
use crate::scoring::{DeltaBias, ScenarioClassification, ScoringResult};

pub use archetype::{Anchors, Archetype, Ladder, Leg, OptionType, Pricing, RiskTier, Side};
pub use pricing::{DteDecision, ProbabilityInputs, RiskReward, WinProbability};
pub use vetoes::{Friction, VetoAssessment};

/// IV rank assumed when no market parameters were supplied.
pub const DEFAULT_IVR: f64 = 40.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitPlan {
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
    pub exit_days_before_expiry: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyCandidate {
    pub archetype: Archetype,
    pub tier: RiskTier,
    pub legs: Vec<Leg>,
    pub dte: u32,
    pub risk_reward: RiskReward,
    pub win_probability: WinProbability,
    pub greeks: GreeksTarget,
    pub exit: ExitPlan,
    pub veto: VetoAssessment,
    pub notes: Vec<String>,
}

impl StrategyCandidate {
    pub fn name(&self) -> &'static str {
        self.archetype.name()
    }
}

/// A candidate that failed construction or the debit edge rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedCandidate {
    pub archetype: Archetype,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySet {
    pub symbol: Option<String>,
    pub spot: f64,
    pub em1: f64,
    pub ivr: f64,
    pub scenario: ScenarioClassification,
    pub dte: DteDecision,
    pub friction: Option<Friction>,
    pub candidates: Vec<StrategyCandidate>,
    pub dropped: Vec<DroppedCandidate>,
}

impl StrategySet {
    pub fn bias(&self) -> DeltaBias {
        self.scenario.bias
    }

    pub fn candidate(&self, archetype: Archetype) -> Option<&StrategyCandidate> {
        self.candidates.iter().find(|c| c.archetype == archetype)
    }
}

/// Archetypes considered for a lean, credit structures first.
pub fn archetypes_for(bias: DeltaBias) -> Vec<Archetype> {
    let mut out = vec![Archetype::IronCondor, Archetype::IronButterfly];
    match bias {
        DeltaBias::Long => out.extend([Archetype::BullCallSpread, Archetype::LongCall]),
        DeltaBias::Short => out.extend([Archetype::BearPutSpread, Archetype::LongPut]),
        DeltaBias::Neutral => out.extend([
            Archetype::BullCallSpread,
            Archetype::BearPutSpread,
            Archetype::LongCall,
            Archetype::LongPut,
        ]),
    }
    out
}

#[derive(Debug, Clone, Default)]
pub struct StrategyCalculator {
    config: StrategyConfig,
}

impl StrategyCalculator {
    pub fn new(config: StrategyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn evaluate(
        &self,
        ready: &ReadyRecord,
        scoring: &ScoringResult,
        profile: Option<&VolatilityProfile>,
    ) -> StrategySet {
        let cfg = &self.config;
        let r = ready.record();
        let g = &r.gamma_metrics;
        let scenario = scoring.scenario.clone();
        let ivr = profile.map_or(DEFAULT_IVR, |p| p.ivr);

        let dte = pricing::holding_period(
            profile.map_or(1.0, |p| p.t_scale),
            g.gap_distance_em1_multiple.get(),
            g.monthly_cluster_override.get().unwrap_or(false),
            &cfg.dte,
        );

        let spot = r.spot_price.get().unwrap_or(0.0);
        let em1 = r.em1_dollar.get().unwrap_or(0.0);
        let friction = Friction::detect(spot, g.nearby_peak_price.get(), &cfg.vetoes);

        let mut set = StrategySet {
            symbol: r.symbol().map(str::to_string),
            spot,
            em1,
            ivr,
            scenario,
            dte,
            friction,
            candidates: Vec::new(),
            dropped: Vec::new(),
        };

        let Some(anchors) = Anchors::from_record(r, &cfg.offsets) else {
            log::warn!("strategy: spot or expected move missing, no candidates");
            return set;
        };

        let inputs = ProbabilityInputs {
            cluster: g.cluster_strength_ratio.get(),
            gap_em1: g.gap_distance_em1_multiple.get(),
            dex_same_dir_pct: r.directional_metrics.dex_same_dir_pct.get(),
            vanna_weight: scoring.vanna_weight,
            spot: anchors.spot,
            em1: anchors.em1,
        };

        for archetype in archetypes_for(set.scenario.bias) {
            match self.build(archetype, &anchors, &inputs, &set, r) {
                Ok(c) => set.candidates.push(c),
                Err(reason) => {
                    log::warn!("strategy: dropped {archetype}: {reason}");
                    set.dropped.push(DroppedCandidate { archetype, reason });
                }
            }
        }

        log::info!(
            "strategy: {} {} candidates ({} dropped), {} bias, {}d",
            set.symbol.as_deref().unwrap_or("?"),
            set.candidates.len(),
            set.dropped.len(),
            match set.scenario.bias {
                DeltaBias::Long => "long",
                DeltaBias::Short => "short",
                DeltaBias::Neutral => "neutral",
            },
            set.dte.days
        );
        set
    }

    fn build(
        &self,
        archetype: Archetype,
        anchors: &Anchors,
        inputs: &ProbabilityInputs,
        set: &StrategySet,
        record: &crate::record::TargetRecord,
    ) -> Result<StrategyCandidate, String> {
        let cfg = &self.config;
        let ladder = archetype::ladder(archetype, anchors, &cfg.offsets)?;
        let rr = pricing::risk_reward(archetype, &ladder, anchors.spot, anchors.em1, set.ivr, cfg);

        match rr.pricing {
            Pricing::DebitSpread if rr.ratio < cfg.min_debit_reward_ratio => {
                return Err(format!(
                    "reward/risk {:.2} below {:.1}",
                    rr.ratio, cfg.min_debit_reward_ratio
                ));
            }
            Pricing::SingleLeg if rr.max_profit <= 0.0 => {
                return Err("premium exceeds the move to the target wall".to_string());
            }
            _ => {}
        }

        let win_probability = pricing::win_probability(archetype, &ladder, inputs, &cfg.win_probability);
        let veto = vetoes::assess(
            archetype,
            set.dte.days,
            set.scenario.bias,
            &record.flow_signals,
            &cfg.vetoes,
        );

        let tier = archetype.tier();
        let greeks = match tier {
            RiskTier::Conservative => cfg.greeks.conservative.clone(),
            RiskTier::Balanced => cfg.greeks.balanced.clone(),
            RiskTier::Aggressive => cfg.greeks.aggressive.clone(),
        };
        let x = &cfg.exits;
        let exit = match rr.pricing {
            Pricing::Credit => ExitPlan {
                take_profit_pct: x.credit_take_profit_pct,
                stop_loss_pct: x.credit_stop_loss_pct,
                exit_days_before_expiry: x.exit_days_before_expiry,
            },
            Pricing::DebitSpread | Pricing::SingleLeg => ExitPlan {
                take_profit_pct: x.debit_take_profit_pct,
                stop_loss_pct: x.debit_stop_loss_pct,
                exit_days_before_expiry: x.exit_days_before_expiry,
            },
        };

        let mut notes = Vec::new();
        if let Some(f) = set.friction.as_ref().filter(|f| f.obstructed) {
            notes.push(f.note());
        }

        Ok(StrategyCandidate {
            archetype,
            tier,
            legs: ladder.legs,
            dte: set.dte.days,
            risk_reward: rr,
            win_probability,
            greeks,
            exit,
            veto,
            notes,
        })
    }
}
