//! Observation parameters (strike span, expiry windows, lookback) chosen by
//! market regime.
//!
//! Volatile tapes need wider strike spans and shorter expiries; quiet tapes
//! need the opposite. The remediation guide renders its commands from a plan.

use serde::{Deserialize, Serialize};

use crate::market::MarketParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketScenario {
    /// Rich volatility or extreme IV rank with VIX above 25.
    Panic,
    /// Rich volatility or extreme IV rank, VIX contained.
    Squeeze,
    /// Cheap volatility or low IV rank with VIX below 15.
    DeepGrind,
    /// Cheap volatility or low IV rank, VIX elevated.
    Grind,
    Normal,
    /// No market parameters supplied.
    Baseline,
}

/// Strike span, three expiry windows and a flow lookback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchPlan {
    pub scenario: MarketScenario,
    pub strikes: u32,
    pub dte_short: String,
    pub dte_mid: String,
    pub dte_long: String,
    pub window: u32,
}

impl FetchPlan {
    fn new(scenario: MarketScenario, strikes: u32, dtes: [&str; 3], window: u32) -> Self {
        Self {
            scenario,
            strikes,
            dte_short: dtes[0].to_string(),
            dte_mid: dtes[1].to_string(),
            dte_long: dtes[2].to_string(),
            window,
        }
    }

    /// Parameters used when the market regime is unknown.
    pub fn baseline() -> Self {
        Self::new(MarketScenario::Baseline, 25, ["7w", "14w", "30m"], 60)
    }

    pub fn for_market(params: &MarketParams) -> Self {
        let vrp = params.vrp();
        let (ivr, vix) = (params.ivr, params.vix);

        if vrp > 1.15 || ivr > 80.0 {
            if vix > 25.0 {
                Self::new(MarketScenario::Panic, 50, ["3w", "7w", "14w"], 20)
            } else {
                Self::new(MarketScenario::Squeeze, 45, ["7w", "14w", "30w"], 45)
            }
        } else if vrp < 0.9 || ivr < 30.0 {
            if vix < 15.0 {
                Self::new(MarketScenario::DeepGrind, 25, ["30w", "60m", "90m"], 90)
            } else {
                Self::new(MarketScenario::Grind, 35, ["21w", "45w", "60m"], 60)
            }
        } else {
            Self::new(MarketScenario::Normal, 30, ["14w", "30w", "60m"], 60)
        }
    }
}

impl Default for FetchPlan {
    fn default() -> Self {
        Self::baseline()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rich_vol_with_high_vix_is_panic() {
        let plan = FetchPlan::for_market(&MarketParams::new(30.0, 60.0, 40.0, 30.0));
        assert_eq!(plan.scenario, MarketScenario::Panic);
        assert_eq!(plan.strikes, 50);
        assert_eq!(plan.dte_short, "3w");
        assert_eq!(plan.window, 20);
    }

    #[test]
    fn extreme_ivr_alone_is_squeeze() {
        let plan = FetchPlan::for_market(&MarketParams::new(20.0, 85.0, 30.0, 30.0));
        assert_eq!(plan.scenario, MarketScenario::Squeeze);
        assert_eq!(plan.dte_long, "30w");
    }

    #[test]
    fn cheap_vol_in_calm_tape_is_deep_grind() {
        let plan = FetchPlan::for_market(&MarketParams::new(12.0, 40.0, 20.0, 25.0));
        assert_eq!(plan.scenario, MarketScenario::DeepGrind);
        assert_eq!(plan.window, 90);
    }

    #[test]
    fn low_ivr_with_elevated_vix_is_grind() {
        let plan = FetchPlan::for_market(&MarketParams::new(19.0, 20.0, 30.0, 30.0));
        assert_eq!(plan.scenario, MarketScenario::Grind);
        assert_eq!(plan.strikes, 35);
    }

    #[test]
    fn balanced_market_is_normal() {
        let plan = FetchPlan::for_market(&MarketParams::new(17.0, 50.0, 30.0, 30.0));
        assert_eq!(plan.scenario, MarketScenario::Normal);
        assert_eq!(plan.dte_mid, "30w");
    }
}
