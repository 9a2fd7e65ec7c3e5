//! Market-regime parameters supplied alongside a record.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum MarketParamsError {
    #[error("ivr {0} outside [0, 100]")]
    IvrOutOfRange(f64),

    #[error("vix {0} must be non-negative")]
    NegativeVix(f64),

    #[error("iv30 {0} must be non-negative")]
    NegativeIv30(f64),

    #[error("hv20 {0} must be positive")]
    NonPositiveHv20(f64),

    #[error("{0} is not a finite number")]
    NotFinite(&'static str),
}

/// VIX, IV rank and the IV/HV pair for one instrument at one point in time.
///
/// `iv30` and `hv20` share units (both percent or both fractions); only
/// their ratio is used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketParams {
    pub vix: f64,
    pub ivr: f64,
    pub iv30: f64,
    pub hv20: f64,
    #[serde(default)]
    pub beta: Option<f64>,
    #[serde(default)]
    pub earnings_date: Option<NaiveDate>,
    /// Valuation date for the earnings window.
    #[serde(default)]
    pub as_of: Option<NaiveDate>,
}

impl MarketParams {
    pub fn new(vix: f64, ivr: f64, iv30: f64, hv20: f64) -> Self {
        Self {
            vix,
            ivr,
            iv30,
            hv20,
            beta: None,
            earnings_date: None,
            as_of: None,
        }
    }

    pub fn validate(&self) -> Result<(), MarketParamsError> {
        for (name, v) in [
            ("vix", self.vix),
            ("ivr", self.ivr),
            ("iv30", self.iv30),
            ("hv20", self.hv20),
        ] {
            if !v.is_finite() {
                return Err(MarketParamsError::NotFinite(name));
            }
        }
        if !(0.0..=100.0).contains(&self.ivr) {
            return Err(MarketParamsError::IvrOutOfRange(self.ivr));
        }
        if self.vix < 0.0 {
            return Err(MarketParamsError::NegativeVix(self.vix));
        }
        if self.iv30 < 0.0 {
            return Err(MarketParamsError::NegativeIv30(self.iv30));
        }
        if self.hv20 <= 0.0 {
            return Err(MarketParamsError::NonPositiveHv20(self.hv20));
        }
        Ok(())
    }

    /// Volatility risk premium, IV30 / HV20.
    pub fn vrp(&self) -> f64 {
        if self.hv20 > 0.0 {
            self.iv30 / self.hv20
        } else {
            1.0
        }
    }

    /// Signed days from `as_of` to the next earnings date.
    pub fn days_to_earnings(&self) -> Option<i64> {
        let (earnings, as_of) = (self.earnings_date?, self.as_of?);
        Some((earnings - as_of).num_days())
    }
}

/// Rich / cheap / balanced implied volatility versus realized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VolState {
    Rich,
    Cheap,
    #[default]
    Balanced,
}
