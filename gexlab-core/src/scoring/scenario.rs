//! Dominant scenario and directional lean derived from a scored record.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::record::{Confidence, DexBias, SpotVsTrigger, Strength, TargetRecord, Trend};

/// Which way dealer positioning leans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaBias {
    Long,
    Short,
    Neutral,
}

impl DeltaBias {
    /// Resolution order: dealer inventory bias (medium or strong), then
    /// confident vanna direction, then negative-gamma momentum.
    pub fn resolve(record: &TargetRecord) -> (Self, &'static str) {
        let d = &record.directional_metrics;
        let firm = matches!(
            d.dex_bias_strength.get(),
            Some(Strength::Strong | Strength::Medium)
        );
        match (d.dex_bias.get(), firm) {
            (Some(DexBias::Support), true) => return (DeltaBias::Long, "dealer inventory supports upside"),
            (Some(DexBias::Oppose), true) => return (DeltaBias::Short, "dealer inventory opposes upside"),
            _ => {}
        }

        if d.vanna_confidence.get().is_some_and(Confidence::is_actionable) {
            match d.vanna_dir.get() {
                Some(Trend::Up) => return (DeltaBias::Long, "confident upward vanna flow"),
                Some(Trend::Down) => return (DeltaBias::Short, "confident downward vanna flow"),
                _ => {}
            }
        }

        if record.gamma_metrics.spot_vs_trigger.get() == Some(SpotVsTrigger::Below) {
            return (DeltaBias::Short, "negative gamma momentum");
        }
        (DeltaBias::Neutral, "mixed or no directional signal")
    }

    pub fn is_bullish(self) -> bool {
        self == DeltaBias::Long
    }

    pub fn is_bearish(self) -> bool {
        self == DeltaBias::Short
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    Range,
    Trend,
    StrongTrend,
    Transition,
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScenarioKind::Range => "range",
            ScenarioKind::Trend => "trend",
            ScenarioKind::StrongTrend => "strong trend",
            ScenarioKind::Transition => "transition",
        })
    }
}

/// The dominant scenario, its lean and its probability (percent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioClassification {
    pub kind: ScenarioKind,
    pub bias: DeltaBias,
    pub bias_note: String,
    pub probability: f64,
}

const STRONG_BREAK_WALL: f64 = 8.0;
const STRONG_DIRECTION: f64 = 6.0;
const MIN_PROBABILITY: f64 = 30.0;
const MAX_PROBABILITY: f64 = 90.0;

impl ScenarioClassification {
    pub fn classify(
        record: &TargetRecord,
        break_wall_score: f64,
        direction_score: f64,
        composite: f64,
    ) -> Self {
        let kind = match record.gamma_metrics.spot_vs_trigger.get() {
            Some(SpotVsTrigger::Above) => ScenarioKind::Range,
            Some(SpotVsTrigger::Below)
                if break_wall_score >= STRONG_BREAK_WALL && direction_score >= STRONG_DIRECTION =>
            {
                ScenarioKind::StrongTrend
            }
            Some(SpotVsTrigger::Below) => ScenarioKind::Trend,
            _ => ScenarioKind::Transition,
        };
        let (bias, note) = DeltaBias::resolve(record);
        Self {
            kind,
            bias,
            bias_note: note.to_string(),
            probability: composite.clamp(MIN_PROBABILITY, MAX_PROBABILITY),
        }
    }

    pub fn is_trending(&self) -> bool {
        matches!(self.kind, ScenarioKind::Trend | ScenarioKind::StrongTrend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Field;

    fn record(regime: SpotVsTrigger) -> TargetRecord {
        let mut r = TargetRecord::default();
        r.gamma_metrics.spot_vs_trigger = Field::Valid(regime);
        r
    }

    #[test]
    fn dealer_inventory_wins_over_vanna() {
        let mut r = record(SpotVsTrigger::Above);
        r.directional_metrics.dex_bias = Field::Valid(DexBias::Oppose);
        r.directional_metrics.dex_bias_strength = Field::Valid(Strength::Medium);
        r.directional_metrics.vanna_dir = Field::Valid(Trend::Up);
        r.directional_metrics.vanna_confidence = Field::Valid(Confidence::High);
        assert_eq!(DeltaBias::resolve(&r).0, DeltaBias::Short);
    }

    #[test]
    fn weak_inventory_defers_to_vanna() {
        let mut r = record(SpotVsTrigger::Below);
        r.directional_metrics.dex_bias = Field::Valid(DexBias::Oppose);
        r.directional_metrics.dex_bias_strength = Field::Valid(Strength::Weak);
        r.directional_metrics.vanna_dir = Field::Valid(Trend::Up);
        r.directional_metrics.vanna_confidence = Field::Valid(Confidence::Medium);
        assert_eq!(DeltaBias::resolve(&r).0, DeltaBias::Long);
    }

    #[test]
    fn negative_gamma_leans_short_otherwise_neutral() {
        assert_eq!(DeltaBias::resolve(&record(SpotVsTrigger::Below)).0, DeltaBias::Short);
        assert_eq!(DeltaBias::resolve(&record(SpotVsTrigger::Above)).0, DeltaBias::Neutral);
    }

    #[test]
    fn below_trigger_with_strong_scores_is_strong_trend() {
        let r = record(SpotVsTrigger::Below);
        assert_eq!(
            ScenarioClassification::classify(&r, 8.0, 6.0, 70.0).kind,
            ScenarioKind::StrongTrend
        );
        assert_eq!(
            ScenarioClassification::classify(&r, 8.0, 5.0, 70.0).kind,
            ScenarioKind::Trend
        );
    }

    #[test]
    fn probability_is_clamped() {
        let above = record(SpotVsTrigger::Above);
        let c = ScenarioClassification::classify(&above, 3.0, 3.0, 95.0);
        assert_eq!(c.kind, ScenarioKind::Range);
        assert_eq!(c.probability, 90.0);
        let near = record(SpotVsTrigger::Near);
        let c = ScenarioClassification::classify(&near, 3.0, 3.0, 12.0);
        assert_eq!(c.kind, ScenarioKind::Transition);
        assert_eq!(c.probability, 30.0);
    }
}
