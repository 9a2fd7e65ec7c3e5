//! Pipeline configuration: every threshold, table and offset in one place.
//!
//! Loaded from TOML; every section and field has a default, so an empty file
//! is a valid configuration. `config_hash()` stamps outcomes with the exact
//! configuration that produced them.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from loading or validating a [`PipelineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    pub aggregation: AggregationConfig,
    pub volatility: VolatilityConfig,
    pub scoring: ScoringConfig,
    pub strategy: StrategyConfig,
    pub ranking: RankingConfig,
}

impl PipelineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Rejects tables that would break scoring or pricing invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.scoring;
        for (name, w) in [
            ("default", &s.weights.default),
            ("panic", &s.weights.panic),
            ("calm", &s.weights.calm),
        ] {
            if w.iter().any(|x| x < 0.0) {
                return Err(ConfigError::Invalid(format!("{name} weights must be non-negative")));
            }
            if (w.sum() - 1.0).abs() > 1e-6 {
                return Err(ConfigError::Invalid(format!(
                    "{name} weights sum to {:.4}, expected 1.0",
                    w.sum()
                )));
            }
        }
        if !(0.0..1.0).contains(&s.index_weight) {
            return Err(ConfigError::Invalid(format!(
                "index_weight {} must be in [0, 1)",
                s.index_weight
            )));
        }
        if s.ivr_calm_below > s.ivr_panic_above {
            return Err(ConfigError::Invalid(format!(
                "ivr_calm_below {} exceeds ivr_panic_above {}",
                s.ivr_calm_below, s.ivr_panic_above
            )));
        }
        if s.break_wall_near >= s.break_wall_mid {
            return Err(ConfigError::Invalid(
                "break_wall_near must be below break_wall_mid".into(),
            ));
        }

        let st = &self.strategy;
        for (name, tiers) in [
            ("credit_fractions", &st.credit_fractions),
            ("debit_fractions", &st.debit_fractions),
        ] {
            if tiers.is_empty() {
                return Err(ConfigError::Invalid(format!("{name} must not be empty")));
            }
            if tiers.windows(2).any(|w| w[0].up_to >= w[1].up_to) {
                return Err(ConfigError::Invalid(format!(
                    "{name} tiers must be strictly ascending"
                )));
            }
            if tiers.iter().any(|t| !(0.0..1.0).contains(&t.fraction)) {
                return Err(ConfigError::Invalid(format!("{name} fractions must be in [0, 1)")));
            }
        }
        if st.dte.min_days > st.dte.max_days {
            return Err(ConfigError::Invalid("dte.min_days exceeds dte.max_days".into()));
        }
        if self.volatility.t_scale_min > self.volatility.t_scale_max {
            return Err(ConfigError::Invalid("t_scale_min exceeds t_scale_max".into()));
        }
        Ok(())
    }

    /// BLAKE3 hash of the canonical JSON form.
    pub fn config_hash(&self) -> String {
        let canonical = serde_json::to_string(self).unwrap_or_default();
        blake3::hash(canonical.as_bytes()).to_hex().to_string()
    }
}

// ─── Aggregation ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Seconds an awaiting cache entry stays usable.
    pub ttl_secs: u64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
        }
    }
}

// ─── Volatility / field calculation ─────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolatilityConfig {
    pub trading_days: f64,
    pub vix_base: f64,
    pub ivr_floor: f64,
    pub k_sys_base: f64,
    pub k_sys_beta_slope: f64,
    pub k_idio_base: f64,
    pub k_idio_earnings: f64,
    pub earnings_window_days: i64,
    pub t_scale_exponent: f64,
    pub t_scale_min: f64,
    pub t_scale_max: f64,
    pub vrp_rich_above: f64,
    pub vrp_cheap_below: f64,
    /// ATM IV assumed for an index that reports none.
    pub default_index_iv: f64,
    pub monthly_override_multiple: f64,
    pub em_band_min_pct: f64,
    pub em_band_max_pct: f64,
    pub gap_em1_max: f64,
    pub cluster_ratio_min: f64,
    pub cluster_ratio_max: f64,
}

impl Default for VolatilityConfig {
    fn default() -> Self {
        Self {
            trading_days: 252.0,
            vix_base: 15.0,
            ivr_floor: 50.0,
            k_sys_base: 0.5,
            k_sys_beta_slope: 0.25,
            k_idio_base: 0.3,
            k_idio_earnings: 0.8,
            earnings_window_days: 7,
            t_scale_exponent: 0.8,
            t_scale_min: 0.5,
            t_scale_max: 2.0,
            vrp_rich_above: 1.1,
            vrp_cheap_below: 0.9,
            default_index_iv: 0.15,
            monthly_override_multiple: 1.5,
            em_band_min_pct: 0.005,
            em_band_max_pct: 0.10,
            gap_em1_max: 5.0,
            cluster_ratio_min: 0.5,
            cluster_ratio_max: 3.0,
        }
    }
}

// ─── Scoring ────────────────────────────────────────────────────────

/// Weights of the four core factors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorWeights {
    pub regime: f64,
    pub break_wall: f64,
    pub direction: f64,
    pub volatility: f64,
}

impl FactorWeights {
    pub const fn new(regime: f64, break_wall: f64, direction: f64, volatility: f64) -> Self {
        Self {
            regime,
            break_wall,
            direction,
            volatility,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> {
        [self.regime, self.break_wall, self.direction, self.volatility].into_iter()
    }

    pub fn sum(&self) -> f64 {
        self.iter().sum()
    }

    pub fn scaled(&self, k: f64) -> Self {
        Self::new(
            self.regime * k,
            self.break_wall * k,
            self.direction * k,
            self.volatility * k,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeWeightTable {
    pub default: FactorWeights,
    pub panic: FactorWeights,
    pub calm: FactorWeights,
}

impl Default for RegimeWeightTable {
    fn default() -> Self {
        Self {
            default: FactorWeights::new(0.4, 0.3, 0.2, 0.1),
            panic: FactorWeights::new(0.2, 0.2, 0.2, 0.4),
            calm: FactorWeights::new(0.5, 0.3, 0.1, 0.1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VannaWeights {
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

impl Default for VannaWeights {
    fn default() -> Self {
        Self {
            high: 1.0,
            medium: 0.6,
            low: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: RegimeWeightTable,
    pub ivr_calm_below: f64,
    pub ivr_panic_above: f64,
    pub break_wall_near: f64,
    pub break_wall_mid: f64,
    pub monthly_override_threshold: f64,
    pub cluster_trend: f64,
    pub cluster_strong: f64,
    /// Width of the "approaching strong" warning band below `cluster_strong`.
    pub cluster_warning_margin: f64,
    pub dex_strong: f64,
    pub dex_medium: f64,
    pub dex_weak: f64,
    pub vanna_weights: VannaWeights,
    /// Fixed weight of the index-consistency factor when it is active.
    pub index_weight: f64,
    pub primary_index: String,
    pub entry_threshold: f64,
    pub entry_gap_max: f64,
    pub risk_gap_warning: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: RegimeWeightTable::default(),
            ivr_calm_below: 20.0,
            ivr_panic_above: 80.0,
            break_wall_near: 0.4,
            break_wall_mid: 0.8,
            monthly_override_threshold: 0.7,
            cluster_trend: 1.2,
            cluster_strong: 2.0,
            cluster_warning_margin: 0.2,
            dex_strong: 70.0,
            dex_medium: 60.0,
            dex_weak: 50.0,
            vanna_weights: VannaWeights::default(),
            index_weight: 0.1,
            primary_index: "spx".into(),
            entry_threshold: 3.0,
            entry_gap_max: 2.0,
            risk_gap_warning: 2.0,
        }
    }
}

// ─── Strategy ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrikeOffsets {
    pub conservative_long: f64,
    pub balanced_wing: f64,
    pub aggressive_long: f64,
    /// Fallback wall distance from spot when a wall is missing.
    pub wall_fallback_pct: f64,
}

impl Default for StrikeOffsets {
    fn default() -> Self {
        Self {
            conservative_long: 1.5,
            balanced_wing: 1.0,
            aggressive_long: 0.2,
            wall_fallback_pct: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DteConfig {
    pub base_days: f64,
    pub gap_long_above: f64,
    pub gap_short_below: f64,
    pub long_multiplier: f64,
    pub short_multiplier: f64,
    pub monthly_floor_days: f64,
    pub min_days: f64,
    pub max_days: f64,
}

impl Default for DteConfig {
    fn default() -> Self {
        Self {
            base_days: 21.0,
            gap_long_above: 3.0,
            gap_short_below: 1.0,
            long_multiplier: 1.2,
            short_multiplier: 0.8,
            monthly_floor_days: 25.0,
            min_days: 5.0,
            max_days: 45.0,
        }
    }
}

/// One row of an IVR-indexed fraction table: applies when `ivr < up_to`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IvrTier {
    pub up_to: f64,
    pub fraction: f64,
}

/// First tier whose bound exceeds `ivr`; the last tier catches the rest.
pub fn tier_fraction(tiers: &[IvrTier], ivr: f64) -> f64 {
    tiers
        .iter()
        .find(|t| ivr < t.up_to)
        .or(tiers.last())
        .map_or(0.0, |t| t.fraction)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WinProbabilityConfig {
    pub credit_base: f64,
    pub credit_cluster_coef: f64,
    pub credit_distance_coef: f64,
    /// Gap (EM units) below which the credit distance penalty starts.
    pub credit_comfort_em: f64,
    pub credit_min: f64,
    pub credit_max: f64,
    pub debit_base: f64,
    pub debit_dex_coef: f64,
    pub debit_vanna_coef: f64,
    pub debit_min: f64,
    pub debit_max: f64,
    pub butterfly_inside: f64,
    pub butterfly_offset: f64,
}

impl Default for WinProbabilityConfig {
    fn default() -> Self {
        Self {
            credit_base: 0.5,
            credit_cluster_coef: 0.1,
            credit_distance_coef: 0.05,
            credit_comfort_em: 2.0,
            credit_min: 0.40,
            credit_max: 0.85,
            debit_base: 0.3,
            debit_dex_coef: 0.1,
            debit_vanna_coef: 0.2,
            debit_min: 0.25,
            debit_max: 0.75,
            butterfly_inside: 0.65,
            butterfly_offset: 0.45,
        }
    }
}

/// Target greeks envelope for one risk tier. `None` leaves a bound open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GreeksTarget {
    pub delta_min: f64,
    pub delta_max: f64,
    pub theta_min: Option<f64>,
    pub vega_max: Option<f64>,
    pub vega_min: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GreeksTable {
    pub conservative: GreeksTarget,
    pub balanced: GreeksTarget,
    pub aggressive: GreeksTarget,
}

impl Default for GreeksTable {
    fn default() -> Self {
        Self {
            conservative: GreeksTarget {
                delta_min: -0.1,
                delta_max: 0.1,
                theta_min: Some(5.0),
                vega_max: Some(-10.0),
                vega_min: None,
            },
            balanced: GreeksTarget {
                delta_min: -0.2,
                delta_max: 0.2,
                theta_min: Some(8.0),
                vega_max: None,
                vega_min: None,
            },
            aggressive: GreeksTarget {
                delta_min: 0.3,
                delta_max: 0.6,
                theta_min: None,
                vega_max: None,
                vega_min: Some(10.0),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitRules {
    pub credit_take_profit_pct: f64,
    pub credit_stop_loss_pct: f64,
    pub debit_take_profit_pct: f64,
    pub debit_stop_loss_pct: f64,
    pub exit_days_before_expiry: u32,
}

impl Default for ExitRules {
    fn default() -> Self {
        Self {
            credit_take_profit_pct: 30.0,
            credit_stop_loss_pct: 150.0,
            debit_take_profit_pct: 60.0,
            debit_stop_loss_pct: 50.0,
            exit_days_before_expiry: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VetoConfig {
    pub zero_dte_high: f64,
    pub zero_dte_low: f64,
    pub zero_dte_high_penalty: f64,
    pub zero_dte_low_penalty: f64,
    /// Candidates at or under this DTE count as short-duration.
    pub short_duration_max_dte: u32,
    pub vega_bias_penalty: f64,
    /// Nearby structural peak within this fraction of spot obstructs entries.
    pub friction_pct: f64,
}

impl Default for VetoConfig {
    fn default() -> Self {
        Self {
            zero_dte_high: 0.40,
            zero_dte_low: 0.25,
            zero_dte_high_penalty: 20.0,
            zero_dte_low_penalty: 10.0,
            short_duration_max_dte: 14,
            vega_bias_penalty: 10.0,
            friction_pct: 0.01,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub offsets: StrikeOffsets,
    pub dte: DteConfig,
    pub credit_fractions: Vec<IvrTier>,
    pub debit_fractions: Vec<IvrTier>,
    pub win_probability: WinProbabilityConfig,
    pub greeks: GreeksTable,
    pub exits: ExitRules,
    pub vetoes: VetoConfig,
    /// Debit structures below this reward/risk are dropped.
    pub min_debit_reward_ratio: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            offsets: StrikeOffsets::default(),
            dte: DteConfig::default(),
            credit_fractions: vec![
                IvrTier { up_to: 25.0, fraction: 0.20 },
                IvrTier { up_to: 50.0, fraction: 0.30 },
                IvrTier { up_to: 75.0, fraction: 0.40 },
                IvrTier { up_to: 100.0, fraction: 0.50 },
            ],
            debit_fractions: vec![
                IvrTier { up_to: 40.0, fraction: 0.30 },
                IvrTier { up_to: 70.0, fraction: 0.40 },
                IvrTier { up_to: 100.0, fraction: 0.50 },
            ],
            win_probability: WinProbabilityConfig::default(),
            greeks: GreeksTable::default(),
            exits: ExitRules::default(),
            vetoes: VetoConfig::default(),
            min_debit_reward_ratio: 1.8,
        }
    }
}

// ─── Ranking ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub max_legs: usize,
    pub max_leg_distance_em: f64,
    pub conservative_high_probability: f64,
    pub balanced_high_probability: f64,
    pub aggressive_high_probability: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            max_legs: 4,
            max_leg_distance_em: 3.0,
            conservative_high_probability: 60.0,
            balanced_high_probability: 55.0,
            aggressive_high_probability: 65.0,
        }
    }
}
