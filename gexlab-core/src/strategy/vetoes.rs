//! Quality vetoes applied after a candidate is priced.
//!
//! - volume divergence: the live tape trades against the scenario lean;
//!   directional candidates are vetoed outright
//! - 0DTE share: same-day volume crowds short-duration structures
//! - dealer vega bias: dealer vega contradicts the structure's vega
//! - friction: a structural peak close to spot, noted but never scored

use serde::{Deserialize, Serialize};

use crate::config::VetoConfig;
use crate::record::{FlowSignals, VegaExposure, VolumeSignal};
use crate::scoring::DeltaBias;

use super::archetype::{Archetype, Pricing};

/// Score adjustment and audit notes for one candidate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VetoAssessment {
    /// Non-positive points added to the ranking composite.
    pub adjustment: f64,
    /// The final score is forced to zero.
    pub vetoed: bool,
    pub notes: Vec<String>,
}

impl VetoAssessment {
    fn penalise(&mut self, points: f64, note: String) {
        log::debug!("veto: -{points} {note}");
        self.adjustment -= points;
        self.notes.push(note);
    }
}

pub fn assess(
    archetype: Archetype,
    dte: u32,
    bias: DeltaBias,
    flow: &FlowSignals,
    cfg: &VetoConfig,
) -> VetoAssessment {
    let mut v = VetoAssessment::default();

    if archetype.is_directional() {
        let divergent = match flow.net_volume_signal.get() {
            Some(VolumeSignal::BearishPutBuy) => bias.is_bullish(),
            Some(VolumeSignal::BullishCallBuy) => bias.is_bearish(),
            _ => false,
        };
        if divergent {
            log::debug!("veto: {archetype} vetoed on volume divergence");
            v.vetoed = true;
            v.notes.push("volume divergence: tape trades against the scenario lean".into());
        }
    }

    let short_duration = archetype.pricing() == Pricing::SingleLeg || dte <= cfg.short_duration_max_dte;
    if short_duration {
        if let Some(share) = flow.zero_dte_share.get() {
            if share >= cfg.zero_dte_high {
                v.penalise(cfg.zero_dte_high_penalty, format!("0DTE share {:.0}% crowds short-duration entries", share * 100.0));
            } else if share >= cfg.zero_dte_low {
                v.penalise(cfg.zero_dte_low_penalty, format!("0DTE share {:.0}% elevated", share * 100.0));
            }
        }
    }

    let contradicts = match (flow.net_vega_exposure.get(), archetype.pricing()) {
        (Some(VegaExposure::ShortVega), Pricing::DebitSpread | Pricing::SingleLeg) => true,
        (Some(VegaExposure::LongVega), Pricing::Credit) => true,
        _ => false,
    };
    if contradicts {
        v.penalise(cfg.vega_bias_penalty, "dealer vega bias contradicts structure".into());
    }

    v
}

/// A nearby structural peak that may stall price before the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Friction {
    pub peak: f64,
    pub distance_pct: f64,
    pub obstructed: bool,
}

impl Friction {
    pub fn detect(spot: f64, nearby_peak: Option<f64>, cfg: &VetoConfig) -> Option<Self> {
        let peak = nearby_peak?;
        if spot <= 0.0 {
            return None;
        }
        let distance_pct = (peak - spot).abs() / spot;
        Some(Self {
            peak,
            distance_pct,
            obstructed: distance_pct <= cfg.friction_pct,
        })
    }

    pub fn note(&self) -> String {
        format!(
            "weekly friction: peak {:.2} sits {:.2}% from spot",
            self.peak,
            self.distance_pct * 100.0
        )
    }
}
