//! Regime-aware expected-move scaling and the volatility time-scale.

use serde::{Deserialize, Serialize};

use crate::config::VolatilityConfig;
use crate::market::{MarketParams, VolState};

/// Everything derived from the market parameters alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityProfile {
    pub lambda: f64,
    pub k_sys: f64,
    pub k_idio: f64,
    pub in_earnings_window: bool,
    /// Multiplier on the default holding period.
    pub t_scale: f64,
    pub vrp: f64,
    pub vol_state: VolState,
    pub ivr: f64,
}

impl VolatilityProfile {
    pub fn from_params(params: &MarketParams, cfg: &VolatilityConfig) -> Self {
        let k_sys = cfg.k_sys_base + cfg.k_sys_beta_slope * (params.beta.unwrap_or(1.0) - 1.0).max(0.0);
        let in_earnings_window = params
            .days_to_earnings()
            .is_some_and(|d| d.abs() <= cfg.earnings_window_days);
        let k_idio = if in_earnings_window {
            cfg.k_idio_earnings
        } else {
            cfg.k_idio_base
        };

        let lambda = 1.0
            + k_sys * ((params.vix - cfg.vix_base) / 100.0).max(0.0)
            + k_idio * ((cfg.ivr_floor - params.ivr) / 100.0).max(0.0);

        let vrp = params.vrp();
        let vol_state = if vrp > cfg.vrp_rich_above {
            VolState::Rich
        } else if vrp < cfg.vrp_cheap_below {
            VolState::Cheap
        } else {
            VolState::Balanced
        };

        Self {
            lambda,
            k_sys,
            k_idio,
            in_earnings_window,
            t_scale: t_scale(params, cfg),
            vrp,
            vol_state,
            ivr: params.ivr,
        }
    }
}

/// `clamp((HV20 / IV30)^exp, min, max)`; neutral when IV30 is zero.
pub fn t_scale(params: &MarketParams, cfg: &VolatilityConfig) -> f64 {
    if params.iv30 <= 0.0 {
        return 1.0;
    }
    (params.hv20 / params.iv30)
        .powf(cfg.t_scale_exponent)
        .clamp(cfg.t_scale_min, cfg.t_scale_max)
}
