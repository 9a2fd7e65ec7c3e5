//! Derived-field calculation.
//!
//! Fills the fields that are computed rather than observed:
//! - `em1_dollar` (regime-scaled expected move)
//! - `gamma_metrics.gap_distance_em1_multiple`
//! - `gamma_metrics.cluster_strength_ratio` (peaks, else strike-panel concentration)
//! - `gamma_metrics.monthly_cluster_override`
//! - `indices.*.em1_dollar`
//!
//! Missing operands propagate as missing; a missing result never overwrites
//! an observed value. Sanity bands flag, never reject.

pub mod concentration;
pub mod volatility;

use serde::{Deserialize, Serialize};

use crate::config::VolatilityConfig;
use crate::market::MarketParams;
use crate::record::{Field, TargetRecord};
use crate::validity::is_valid_number;

pub use concentration::{assess, ConcentrationAssessment, ConcentrationTier, PanelConcentration};
pub use volatility::{t_scale, VolatilityProfile};

// ─── Audit log ───────────────────────────────────────────────────────

/// One derivation: formula, operands, result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Derivation {
    pub field: String,
    pub formula: String,
    pub inputs: Vec<(String, f64)>,
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Plausibility check on a computed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SanityCheck {
    pub field: String,
    pub value: f64,
    pub within_band: bool,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CalculationLog {
    pub derivations: Vec<Derivation>,
    pub checks: Vec<SanityCheck>,
}

impl CalculationLog {
    pub fn derivation(&self, field: &str) -> Option<&Derivation> {
        self.derivations.iter().find(|d| d.field == field)
    }

    pub fn flagged(&self) -> impl Iterator<Item = &SanityCheck> {
        self.checks.iter().filter(|c| !c.within_band)
    }

    fn record(
        &mut self,
        field: impl Into<String>,
        formula: impl Into<String>,
        inputs: &[(&str, Option<f64>)],
        value: Option<f64>,
        note: Option<String>,
    ) {
        let field = field.into();
        match value {
            Some(v) => log::debug!("calc: {field} = {v}"),
            None => log::debug!("calc: {field} not derivable"),
        }
        self.derivations.push(Derivation {
            field,
            formula: formula.into(),
            inputs: inputs
                .iter()
                .filter_map(|(k, v)| v.map(|v| ((*k).to_string(), v)))
                .collect(),
            value,
            note,
        });
    }

    fn check(&mut self, field: &str, value: f64, within_band: bool, band: &str) {
        let note = if within_band {
            format!("within {band}")
        } else {
            log::warn!("calc: {field} = {value:.2} outside {band}");
            format!("outside {band}")
        };
        self.checks.push(SanityCheck {
            field: field.to_string(),
            value,
            within_band,
            note,
        });
    }
}

// ─── Calculator ──────────────────────────────────────────────────────

/// Record with derived fields plus how they were obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct Calculation {
    pub record: TargetRecord,
    /// Present when market parameters were supplied.
    pub profile: Option<VolatilityProfile>,
    pub log: CalculationLog,
}

#[derive(Debug, Clone, Default)]
pub struct FieldCalculator {
    config: VolatilityConfig,
}

pub(crate) fn round_to(v: f64, decimals: i32) -> f64 {
    let k = 10f64.powi(decimals);
    (v * k).round() / k
}

/// Writes a derived value. `None` or a non-finite result leaves the existing
/// leaf untouched.
fn fill(field: &str, slot: &mut Field<f64>, value: Option<f64>) {
    match value {
        Some(v) if is_valid_number(v) => *slot = Field::Valid(v),
        Some(v) => log::warn!("calc: {field} computed as {v}, keeping {slot}"),
        None => {}
    }
}

impl FieldCalculator {
    pub fn new(config: VolatilityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VolatilityConfig {
        &self.config
    }

    pub fn calculate(&self, record: &TargetRecord, params: Option<&MarketParams>) -> Calculation {
        let mut out = record.clone();
        let mut log = CalculationLog::default();
        let profile = params.map(|p| VolatilityProfile::from_params(p, &self.config));

        self.expected_move(&mut out, profile.as_ref(), &mut log);
        self.gap_in_em(&mut out, &mut log);
        self.cluster_strength(&mut out, &mut log);
        self.monthly_override(&mut out, &mut log);
        self.index_moves(&mut out, &mut log);
        self.sanity(&out, &mut log);

        log::info!(
            "calc: {} derivations, {} sanity flags",
            log.derivations.len(),
            log.flagged().count()
        );
        Calculation {
            record: out,
            profile,
            log,
        }
    }

    fn sqrt_day(&self) -> f64 {
        (1.0 / self.config.trading_days).sqrt()
    }

    fn expected_move(
        &self,
        r: &mut TargetRecord,
        profile: Option<&VolatilityProfile>,
        log: &mut CalculationLog,
    ) {
        let spot = r.spot_price.get();
        let (iv7, iv14) = (r.atm_iv.iv_7d.get(), r.atm_iv.iv_14d.get());
        let lambda = profile.map_or(1.0, |p| p.lambda);

        let value = match (spot, iv7, iv14) {
            (Some(s), Some(a), Some(b)) => Some(round_to(s * a.min(b) * self.sqrt_day() * lambda, 2)),
            _ => None,
        };
        let note = match (value, r.em1_dollar.get()) {
            (None, Some(_)) => Some("inputs missing; observed value kept".to_string()),
            (Some(_), Some(observed)) => Some(format!("replaces observed {observed}")),
            _ => None,
        };
        log.record(
            "em1_dollar",
            "spot × min(iv_7d, iv_14d) × sqrt(1/252) × lambda",
            &[
                ("spot_price", spot),
                ("iv_7d", iv7),
                ("iv_14d", iv14),
                ("lambda", Some(lambda)),
            ],
            value,
            note,
        );
        fill("em1_dollar", &mut r.em1_dollar, value);
    }

    fn gap_in_em(&self, r: &mut TargetRecord, log: &mut CalculationLog) {
        let gap = r.gamma_metrics.gap_distance_dollar.get();
        let em1 = r.em1_dollar.get();
        let value = match (gap, em1) {
            (Some(g), Some(e)) if e != 0.0 => Some(round_to(g / e, 2)),
            _ => None,
        };
        log.record(
            "gamma_metrics.gap_distance_em1_multiple",
            "gap_distance_dollar / em1_dollar",
            &[("gap_distance_dollar", gap), ("em1_dollar", em1)],
            value,
            None,
        );
        fill(
            "gamma_metrics.gap_distance_em1_multiple",
            &mut r.gamma_metrics.gap_distance_em1_multiple,
            value,
        );
    }

    fn cluster_strength(&self, r: &mut TargetRecord, log: &mut CalculationLog) {
        let g = &r.gamma_metrics;
        let (nearest, secondary) = (g.nearest_peak_gex.get(), g.secondary_peak_gex.get());

        if let (Some(n), Some(s)) = (nearest, secondary) {
            let value = (n != 0.0).then(|| round_to(s.abs() / n.abs(), 2));
            log.record(
                "gamma_metrics.cluster_strength_ratio",
                "|secondary_peak_gex| / |nearest_peak_gex|",
                &[("nearest_peak_gex", nearest), ("secondary_peak_gex", secondary)],
                value,
                None,
            );
            fill(
                "gamma_metrics.cluster_strength_ratio",
                &mut r.gamma_metrics.cluster_strength_ratio,
                value,
            );
            return;
        }
        if r.gamma_metrics.cluster_strength_ratio.is_valid() {
            return;
        }
        if let Some(a) = assess(&r.concentration_panels) {
            log.record(
                "gamma_metrics.cluster_strength_ratio",
                "concentration tier of strike panels",
                &[("avg_top1", Some(a.avg_top1)), ("avg_enp", Some(a.avg_enp))],
                Some(a.tier.ratio()),
                Some(format!("{:?} concentration", a.tier).to_lowercase()),
            );
            r.gamma_metrics.cluster_strength_ratio = Field::Valid(a.tier.ratio());
        }
    }

    fn monthly_override(&self, r: &mut TargetRecord, log: &mut CalculationLog) {
        let g = &r.gamma_metrics;
        let (weekly, monthly) = (g.weekly_cluster_gex.get(), g.monthly_cluster_gex.get());
        let (Some(w), Some(m)) = (weekly, monthly) else {
            return;
        };
        let dominant = m.abs() >= self.config.monthly_override_multiple * w.abs();
        log.record(
            "gamma_metrics.monthly_cluster_override",
            format!(
                "|monthly| >= {} × |weekly|",
                self.config.monthly_override_multiple
            ),
            &[("weekly_cluster_gex", weekly), ("monthly_cluster_gex", monthly)],
            Some(if dominant { 1.0 } else { 0.0 }),
            None,
        );
        r.gamma_metrics.monthly_cluster_override = Field::Valid(dominant);
    }

    fn index_moves(&self, r: &mut TargetRecord, log: &mut CalculationLog) {
        let sqrt_day = self.sqrt_day();
        for (name, idx) in r.indices.iter_mut() {
            let Some(spot) = idx.spot.get() else {
                continue;
            };
            let observed_iv = idx.atm_iv.get().filter(|iv| *iv > 0.0);
            let iv = observed_iv.unwrap_or(self.config.default_index_iv);
            let value = round_to(spot * iv * sqrt_day, 2);
            log.record(
                format!("indices.{name}.em1_dollar"),
                "spot × atm_iv × sqrt(1/252)",
                &[("spot", Some(spot)), ("atm_iv", Some(iv))],
                Some(value),
                observed_iv.is_none().then(|| "default index IV".to_string()),
            );
            fill(&format!("indices.{name}.em1_dollar"), &mut idx.em1_dollar, Some(value));
        }
    }

    fn sanity(&self, r: &TargetRecord, log: &mut CalculationLog) {
        let c = &self.config;
        if let (Some(em1), Some(spot)) = (r.em1_dollar.get(), r.spot_price.get()) {
            if spot > 0.0 {
                let pct = em1 / spot;
                log.check(
                    "em1_dollar",
                    em1,
                    (c.em_band_min_pct..=c.em_band_max_pct).contains(&pct),
                    &format!(
                        "{:.1}%-{:.0}% of spot",
                        c.em_band_min_pct * 100.0,
                        c.em_band_max_pct * 100.0
                    ),
                );
            }
        }
        if let Some(gap) = r.gamma_metrics.gap_distance_em1_multiple.get() {
            log.check(
                "gamma_metrics.gap_distance_em1_multiple",
                gap,
                gap < c.gap_em1_max,
                &format!("< {} EM", c.gap_em1_max),
            );
        }
        if let Some(ratio) = r.gamma_metrics.cluster_strength_ratio.get() {
            log.check(
                "gamma_metrics.cluster_strength_ratio",
                ratio,
                (c.cluster_ratio_min..=c.cluster_ratio_max).contains(&ratio),
                &format!("{}-{}", c.cluster_ratio_min, c.cluster_ratio_max),
            );
        }
    }
}
