//! Record sections and their categorical vocabularies.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::field::{categorical, Field, Leaf};
use super::paths::CanonicalField;

categorical! {
    /// Where spot sits relative to the gamma flip (volatility trigger).
    SpotVsTrigger {
        Above => "above" | "positive",
        Below => "below" | "negative",
        Near => "near" | "critical" | "at",
    }
}

categorical! {
    /// Sign of aggregate dealer gamma exposure.
    GexSign {
        Positive => "positive" | "positive_gamma" | "+",
        Negative => "negative" | "negative_gamma" | "-",
        Neutral => "neutral" | "flat",
    }
}

categorical! {
    WallType {
        Call => "call" | "call_wall",
        Put => "put" | "put_wall",
    }
}

categorical! {
    /// Direction of a second-order hedging flow (vanna).
    Trend {
        Up => "up" | "bullish",
        Down => "down" | "bearish",
        Neutral => "neutral" | "flat" | "mixed",
    }
}

categorical! {
    Confidence {
        High => "high",
        Medium => "medium" | "med",
        Low => "low",
    }
}

categorical! {
    /// Implied-volatility term path over the next sessions.
    IvPath {
        Rising => "rising" | "up" | "expanding",
        Falling => "falling" | "down" | "compressing",
        Flat => "flat" | "stable" | "sideways",
    }
}

categorical! {
    /// Whether dealer delta inventory supports or opposes the move.
    DexBias {
        Support => "support" | "supportive",
        Oppose => "oppose" | "opposing",
        Mixed => "mixed" | "neutral",
    }
}

categorical! {
    Strength {
        Strong => "strong",
        Medium => "medium" | "moderate",
        Weak => "weak",
    }
}

categorical! {
    /// Dominant aggressor flow in the live options tape.
    VolumeSignal {
        BullishCallBuy => "bullish_call_buy",
        BearishPutBuy => "bearish_put_buy",
        Neutral => "neutral",
    }
}

categorical! {
    /// Net dealer vega position.
    VegaExposure {
        ShortVega => "short_vega",
        LongVega => "long_vega",
        Neutral => "neutral",
    }
}

impl Confidence {
    /// At least medium confidence.
    pub fn is_actionable(self) -> bool {
        matches!(self, Confidence::High | Confidence::Medium)
    }
}

/// Per-leaf adopt/update bookkeeping for one merge.
///
/// Every leaf follows the same fill/update rule, but only canonical paths
/// are tallied: flow signals, raw peak magnitudes, index entries and the
/// symbol never count as progress.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeTally {
    pub added: Vec<String>,
    pub updated: Vec<String>,
}

impl MergeTally {
    /// Adopt `incoming` when it is valid and either fills a gap or changes a value.
    pub fn merge<T: Leaf>(&mut self, path: String, prior: &mut Field<T>, incoming: &Field<T>) {
        let Field::Valid(new) = incoming else {
            return;
        };
        let list = match prior.valid() {
            None => &mut self.added,
            Some(old) if old != new => &mut self.updated,
            Some(_) => return,
        };
        *prior = Field::Valid(new.clone());
        if CanonicalField::from_path(&path).is_some() {
            log::debug!("merge: {path} adopted");
            list.push(path);
        }
    }

    pub fn changed(&self) -> usize {
        self.added.len() + self.updated.len()
    }
}

/// Declares a section struct whose leaves are all [`Field`]s, with
/// key-addressed get/set, valid-leaf counting and merge.
macro_rules! section {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$fmeta:meta])* $field:ident : $ty:ty ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
        #[serde(default)]
        pub struct $name {
            $( $(#[$fmeta])* pub $field: Field<$ty>, )+
        }

        impl $name {
            pub const LEAVES: &'static [&'static str] = &[$(stringify!($field)),+];

            pub fn get(&self, key: &str) -> Option<Value> {
                match key {
                    $( stringify!($field) => Some(self.$field.to_json()), )+
                    _ => None,
                }
            }

            /// Sets one leaf from raw JSON. `Ok(false)` when `key` is not a leaf
            /// of this section.
            pub fn set(&mut self, key: &str, value: &Value) -> Result<bool, String> {
                match key {
                    $( stringify!($field) => {
                        self.$field = Field::from_json(value)?;
                        Ok(true)
                    } )+
                    _ => Ok(false),
                }
            }

            pub fn valid_count(&self) -> usize {
                0 $( + usize::from(self.$field.is_valid()) )+
            }

            pub fn is_empty(&self) -> bool {
                self.valid_count() == 0
            }

            pub fn merge_from(&mut self, incoming: &Self, prefix: &str, tally: &mut MergeTally) {
                $( tally.merge(format!("{prefix}.{}", stringify!($field)), &mut self.$field, &incoming.$field); )+
            }
        }
    };
}

section! {
    /// Support/resistance levels from open-interest concentration.
    Walls {
        call_wall: f64,
        put_wall: f64,
        major_wall: f64,
        major_wall_type: WallType,
    }
}

section! {
    /// Dealer gamma positioning.
    ///
    /// The last five leaves are raw inputs for the field calculator; they are
    /// merged like every other leaf but are not required for readiness.
    GammaMetrics {
        gap_distance_dollar: f64,
        gap_distance_em1_multiple: f64,
        cluster_strength_ratio: f64,
        net_gex: f64,
        net_gex_sign: GexSign,
        vol_trigger: f64,
        spot_vs_trigger: SpotVsTrigger,
        monthly_cluster_override: bool,
        nearest_peak_gex: f64,
        secondary_peak_gex: f64,
        weekly_cluster_gex: f64,
        monthly_cluster_gex: f64,
        nearby_peak_price: f64,
    }
}

section! {
    DirectionalMetrics {
        dex_same_dir_pct: f64,
        vanna_dir: Trend,
        vanna_confidence: Confidence,
        iv_path: IvPath,
        iv_path_confidence: Confidence,
        dex_bias: DexBias,
        dex_bias_strength: Strength,
    }
}

section! {
    /// Near-dated at-the-money implied volatility, as fractions (0.40 = 40%).
    AtmIv {
        iv_7d: f64,
        iv_14d: f64,
        iv_source: String,
    }
}

section! {
    /// Live-tape and dealer-vega readings consumed by the strategy vetoes.
    FlowSignals {
        net_volume_signal: VolumeSignal,
        net_vega_exposure: VegaExposure,
        zero_dte_share: f64,
    }
}

section! {
    /// Benchmark index context (e.g. `spx`, `qqq`).
    IndexSnapshot {
        spot: f64,
        net_gex: f64,
        atm_iv: f64,
        vol_trigger: f64,
        spot_vs_trigger: SpotVsTrigger,
        em1_dollar: f64,
    }
}

impl IndexSnapshot {
    /// Observed regime, or the one implied by spot versus trigger.
    pub fn regime(&self) -> Option<SpotVsTrigger> {
        if let Some(r) = self.spot_vs_trigger.get() {
            return Some(r);
        }
        let (spot, trigger) = (self.spot.get()?, self.vol_trigger.get()?);
        Some(if spot > trigger {
            SpotVsTrigger::Above
        } else if spot < trigger {
            SpotVsTrigger::Below
        } else {
            SpotVsTrigger::Near
        })
    }
}

/// Technical overlay; replaced wholesale when a newer one carries a score.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TechnicalAnalysis {
    pub ta_score: f64,
    pub summary: String,
}

/// One strike panel of gamma exposure, used for concentration assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcentrationPanel {
    #[serde(default)]
    pub label: String,
    pub rows: Vec<StrikeRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrikeRow {
    pub strike: f64,
    #[serde(default)]
    pub gex_total: Option<f64>,
    #[serde(default)]
    pub share_pct: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn categorical_aliases_parse() {
        assert_eq!(SpotVsTrigger::parse("ABOVE"), Some(SpotVsTrigger::Above));
        assert_eq!(GexSign::parse("negative_gamma"), Some(GexSign::Negative));
        assert_eq!(IvPath::parse("up"), Some(IvPath::Rising));
        assert_eq!(Confidence::parse("sideways"), None);
    }

    #[test]
    fn section_set_and_get_by_key() {
        let mut walls = Walls::default();
        assert!(walls.set("call_wall", &json!(610.0)).unwrap());
        assert!(!walls.set("not_a_leaf", &json!(1)).unwrap());
        assert_eq!(walls.get("call_wall"), Some(json!(610.0)));
        assert_eq!(walls.get("put_wall"), Some(json!(-999.0)));
        assert_eq!(walls.valid_count(), 1);
    }

    #[test]
    fn unknown_category_is_rejected() {
        let mut gamma = GammaMetrics::default();
        let err = gamma.set("spot_vs_trigger", &json!("sideways")).unwrap_err();
        assert!(err.contains("SpotVsTrigger"));
    }

    #[test]
    fn merge_adopts_fills_and_changes_only() {
        let mut prior = Walls {
            call_wall: Field::Valid(600.0),
            put_wall: Field::Valid(580.0),
            ..Walls::default()
        };
        let incoming = Walls {
            call_wall: Field::Valid(605.0),
            put_wall: Field::Valid(580.0),
            major_wall: Field::Valid(600.0),
            ..Walls::default()
        };
        let mut tally = MergeTally::default();
        prior.merge_from(&incoming, "walls", &mut tally);

        assert_eq!(tally.added, vec!["walls.major_wall"]);
        assert_eq!(tally.updated, vec!["walls.call_wall"]);
        assert_eq!(prior.call_wall, Field::Valid(605.0));
        assert_eq!(prior.major_wall_type, Field::Missing);
    }

    #[test]
    fn non_canonical_leaves_merge_without_counting() {
        let mut prior = GammaMetrics::default();
        let incoming = GammaMetrics {
            vol_trigger: Field::Valid(585.0),
            nearest_peak_gex: Field::Valid(2.0e9),
            ..GammaMetrics::default()
        };
        let mut tally = MergeTally::default();
        prior.merge_from(&incoming, "gamma_metrics", &mut tally);

        assert_eq!(tally.added, vec!["gamma_metrics.vol_trigger"]);
        assert_eq!(prior.nearest_peak_gex, Field::Valid(2.0e9));
    }

    #[test]
    fn index_regime_falls_back_to_trigger() {
        let idx = IndexSnapshot {
            spot: Field::Valid(5800.0),
            vol_trigger: Field::Valid(5750.0),
            ..IndexSnapshot::default()
        };
        assert_eq!(idx.regime(), Some(SpotVsTrigger::Above));
    }
}
