//! The target record: one instrument's market-structure measurements.
//!
//! - Typed sections ([`Walls`], [`GammaMetrics`], [`DirectionalMetrics`],
//!   [`AtmIv`], [`FlowSignals`]) with a [`Field`] per leaf
//! - Dotted-path addressing (`gamma_metrics.vol_trigger`, `indices.spx.spot`)
//! - Path-aware parsing of external submissions, with flat-layout normalisation
//! - Leaf-wise merge with added/updated bookkeeping

pub mod field;
pub mod paths;
pub mod sections;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub use field::{Field, Leaf};
pub use paths::{CanonicalField, REQUIRED_FIELD_COUNT};
pub use sections::{
    AtmIv, ConcentrationPanel, Confidence, DexBias, DirectionalMetrics, FlowSignals,
    GammaMetrics, GexSign, IndexSnapshot, IvPath, MergeTally, SpotVsTrigger, Strength,
    StrikeRow, TechnicalAnalysis, Trend, VegaExposure, VolumeSignal, WallType, Walls,
};

/// A submission that does not fit the record schema.
#[derive(Debug, Error, PartialEq)]
pub enum RecordError {
    #[error("malformed record at '{path}': {reason}")]
    Malformed { path: String, reason: String },

    #[error("unknown record path '{0}'")]
    UnknownPath(String),
}

impl RecordError {
    fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        RecordError::Malformed {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

const SECTION_NAMES: [&str; 5] = [
    "walls",
    "gamma_metrics",
    "directional_metrics",
    "atm_iv",
    "flow_signals",
];

/// The accumulated measurements for one instrument.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetRecord {
    pub symbol: Field<String>,
    pub spot_price: Field<f64>,
    pub em1_dollar: Field<f64>,
    pub walls: Walls,
    pub gamma_metrics: GammaMetrics,
    pub directional_metrics: DirectionalMetrics,
    pub atm_iv: AtmIv,
    #[serde(skip_serializing_if = "FlowSignals::is_empty")]
    pub flow_signals: FlowSignals,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub indices: BTreeMap<String, IndexSnapshot>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub concentration_panels: Vec<ConcentrationPanel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub technical_analysis: Option<TechnicalAnalysis>,
}

impl TargetRecord {
    /// Parses an external submission.
    ///
    /// Accepts the bare record, `{"targets": {..}}`, `{"targets": [{..}]}`
    /// and flat layouts where section leaves sit at the top level. Unknown
    /// keys are ignored; a known leaf with the wrong shape is an error naming
    /// its path.
    pub fn from_json(value: &Value) -> Result<Self, RecordError> {
        let targets = unwrap_targets(value)?;
        let nested = normalize_layout(targets);

        let mut record = TargetRecord::default();
        for (key, v) in &nested {
            match key.as_str() {
                "symbol" | "spot_price" | "em1_dollar" => record.set(key, v)?,
                "indices" => record.read_indices(v)?,
                "concentration_panels" => {
                    record.concentration_panels = serde_json::from_value(v.clone())
                        .map_err(|e| RecordError::malformed(key.clone(), e.to_string()))?;
                }
                "technical_analysis" => {
                    let ta: TechnicalAnalysis = serde_json::from_value(v.clone())
                        .map_err(|e| RecordError::malformed(key.clone(), e.to_string()))?;
                    record.technical_analysis = Some(ta);
                }
                section if SECTION_NAMES.contains(&section) => {
                    let Value::Object(leaves) = v else {
                        return Err(RecordError::malformed(section, "expected an object"));
                    };
                    for (leaf, lv) in leaves {
                        let path = format!("{section}.{leaf}");
                        if path == "gamma_metrics.concentration_panels" {
                            record.concentration_panels = serde_json::from_value(lv.clone())
                                .map_err(|e| RecordError::malformed(path, e.to_string()))?;
                            continue;
                        }
                        match record.set(&path, lv) {
                            Err(RecordError::UnknownPath(p)) => {
                                log::debug!("ignoring unknown leaf '{p}'");
                            }
                            other => other?,
                        }
                    }
                }
                other => log::debug!("ignoring unknown key '{other}'"),
            }
        }
        if let Some(symbol) = record.symbol.valid() {
            record.symbol = Field::Valid(symbol.to_ascii_uppercase());
        }
        Ok(record)
    }

    fn read_indices(&mut self, value: &Value) -> Result<(), RecordError> {
        let Value::Object(indices) = value else {
            return Err(RecordError::malformed("indices", "expected an object"));
        };
        for (name, snapshot) in indices {
            let Value::Object(leaves) = snapshot else {
                return Err(RecordError::malformed(
                    format!("indices.{name}"),
                    "expected an object",
                ));
            };
            for (leaf, lv) in leaves {
                let path = format!("indices.{name}.{leaf}");
                match self.set(&path, lv) {
                    Err(RecordError::UnknownPath(p)) => log::debug!("ignoring unknown leaf '{p}'"),
                    other => other?,
                }
            }
        }
        Ok(())
    }

    /// Reads one leaf as JSON (sentinel if missing).
    pub fn get(&self, path: &str) -> Result<Value, RecordError> {
        let unknown = || RecordError::UnknownPath(path.to_string());
        match split_path(path) {
            ("symbol", None) => Ok(self.symbol.to_json()),
            ("spot_price", None) => Ok(self.spot_price.to_json()),
            ("em1_dollar", None) => Ok(self.em1_dollar.to_json()),
            ("walls", Some(k)) => self.walls.get(k).ok_or_else(unknown),
            ("gamma_metrics", Some(k)) => self.gamma_metrics.get(k).ok_or_else(unknown),
            ("directional_metrics", Some(k)) => self.directional_metrics.get(k).ok_or_else(unknown),
            ("atm_iv", Some(k)) => self.atm_iv.get(k).ok_or_else(unknown),
            ("flow_signals", Some(k)) => self.flow_signals.get(k).ok_or_else(unknown),
            ("indices", Some(rest)) => {
                let (name, leaf) = rest.split_once('.').ok_or_else(unknown)?;
                match self.indices.get(name) {
                    Some(idx) => idx.get(leaf).ok_or_else(unknown),
                    None => IndexSnapshot::default().get(leaf).ok_or_else(unknown),
                }
            }
            _ => Err(unknown()),
        }
    }

    /// Writes one leaf from JSON. Sentinels clear the leaf.
    pub fn set(&mut self, path: &str, value: &Value) -> Result<(), RecordError> {
        let bad = |reason: String| RecordError::malformed(path, reason);
        let known = match split_path(path) {
            ("symbol", None) => {
                self.symbol = Field::from_json(value).map_err(bad)?;
                true
            }
            ("spot_price", None) => {
                self.spot_price = Field::from_json(value).map_err(bad)?;
                true
            }
            ("em1_dollar", None) => {
                self.em1_dollar = Field::from_json(value).map_err(bad)?;
                true
            }
            ("walls", Some(k)) => self.walls.set(k, value).map_err(bad)?,
            ("gamma_metrics", Some(k)) => self.gamma_metrics.set(k, value).map_err(bad)?,
            ("directional_metrics", Some(k)) => {
                self.directional_metrics.set(k, value).map_err(bad)?
            }
            ("atm_iv", Some(k)) => self.atm_iv.set(k, value).map_err(bad)?,
            ("flow_signals", Some(k)) => self.flow_signals.set(k, value).map_err(bad)?,
            ("indices", Some(rest)) => match rest.split_once('.') {
                Some((name, leaf)) if IndexSnapshot::LEAVES.contains(&leaf) => self
                    .indices
                    .entry(name.to_ascii_lowercase())
                    .or_default()
                    .set(leaf, value)
                    .map_err(bad)?,
                _ => false,
            },
            _ => false,
        };
        if known {
            Ok(())
        } else {
            Err(RecordError::UnknownPath(path.to_string()))
        }
    }

    pub fn symbol(&self) -> Option<&str> {
        self.symbol.valid().map(String::as_str)
    }

    /// Valid observation leaves, excluding the symbol.
    ///
    /// A submission scoring zero here contributes nothing to a merge.
    pub fn valid_leaf_count(&self) -> usize {
        usize::from(self.spot_price.is_valid())
            + usize::from(self.em1_dollar.is_valid())
            + self.walls.valid_count()
            + self.gamma_metrics.valid_count()
            + self.directional_metrics.valid_count()
            + self.atm_iv.valid_count()
            + self.flow_signals.valid_count()
            + self.indices.values().map(IndexSnapshot::valid_count).sum::<usize>()
    }

    /// Canonical leaves that hold a valid value.
    pub fn canonical_present(&self) -> usize {
        CanonicalField::ALL
            .iter()
            .filter(|f| f.is_present(self))
            .count()
    }

    /// Leaf-wise merge of `incoming` into `self`; never clears a valid leaf.
    ///
    /// Panels are replaced when the incoming set is non-empty; technical
    /// analysis is replaced when the incoming score is positive. Neither is
    /// counted in the tally.
    pub fn merge_from(&mut self, incoming: &TargetRecord) -> MergeTally {
        let mut tally = MergeTally::default();
        tally.merge("symbol".into(), &mut self.symbol, &incoming.symbol);
        tally.merge("spot_price".into(), &mut self.spot_price, &incoming.spot_price);
        tally.merge("em1_dollar".into(), &mut self.em1_dollar, &incoming.em1_dollar);
        self.walls.merge_from(&incoming.walls, "walls", &mut tally);
        self.gamma_metrics
            .merge_from(&incoming.gamma_metrics, "gamma_metrics", &mut tally);
        self.directional_metrics.merge_from(
            &incoming.directional_metrics,
            "directional_metrics",
            &mut tally,
        );
        self.atm_iv.merge_from(&incoming.atm_iv, "atm_iv", &mut tally);
        self.flow_signals
            .merge_from(&incoming.flow_signals, "flow_signals", &mut tally);
        for (name, idx) in &incoming.indices {
            self.indices
                .entry(name.clone())
                .or_default()
                .merge_from(idx, &format!("indices.{name}"), &mut tally);
        }

        if !incoming.concentration_panels.is_empty() {
            self.concentration_panels = incoming.concentration_panels.clone();
        }
        if let Some(ta) = &incoming.technical_analysis {
            if ta.ta_score > 0.0 {
                self.technical_analysis = Some(ta.clone());
            }
        }
        tally
    }
}

fn split_path(path: &str) -> (&str, Option<&str>) {
    match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    }
}

fn unwrap_targets(value: &Value) -> Result<&Map<String, Value>, RecordError> {
    let root = match value {
        Value::Object(map) => map,
        _ => return Err(RecordError::malformed("$", "expected a JSON object")),
    };
    match root.get("targets") {
        None => Ok(root),
        Some(Value::Object(targets)) => Ok(targets),
        Some(Value::Array(items)) => match items.first() {
            Some(Value::Object(first)) => Ok(first),
            Some(_) => Err(RecordError::malformed("targets[0]", "expected an object")),
            None => Err(RecordError::malformed("targets", "empty target list")),
        },
        Some(_) => Err(RecordError::malformed("targets", "expected an object or array")),
    }
}

/// Lifts flat top-level leaves into their sections.
///
/// Nested sections already present win over flat duplicates.
fn normalize_layout(targets: &Map<String, Value>) -> Map<String, Value> {
    let mut nested = Map::new();
    let mut lifted: BTreeMap<&'static str, Map<String, Value>> = BTreeMap::new();

    for (key, value) in targets {
        if let Some(section) = flat_section_of(key) {
            lifted
                .entry(section)
                .or_default()
                .insert(key.clone(), value.clone());
        } else {
            nested.insert(key.clone(), value.clone());
        }
    }

    for (section, leaves) in lifted {
        match nested.get_mut(section) {
            Some(Value::Object(existing)) => {
                for (k, v) in leaves {
                    existing.entry(k).or_insert(v);
                }
            }
            // A non-object section is left in place so parsing reports it.
            Some(_) => {}
            None => {
                nested.insert(section.to_string(), Value::Object(leaves));
            }
        }
    }
    nested
}

fn flat_section_of(key: &str) -> Option<&'static str> {
    if Walls::LEAVES.contains(&key) {
        Some("walls")
    } else if GammaMetrics::LEAVES.contains(&key) {
        Some("gamma_metrics")
    } else if DirectionalMetrics::LEAVES.contains(&key) {
        Some("directional_metrics")
    } else if AtmIv::LEAVES.contains(&key) {
        Some("atm_iv")
    } else if FlowSignals::LEAVES.contains(&key) {
        Some("flow_signals")
    } else {
        None
    }
}
