//! Remediation guidance for missing leaves. Advisory only: it never changes
//! a record's status.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{MergeFailure, MergeRound};
use crate::aggregator::validation::ValidationSummary;
use crate::fetch_plan::FetchPlan;
use crate::record::CanonicalField;

/// How urgently a missing leaf blocks analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Gates the regime read.
    Critical,
    /// Distance and strength inputs.
    High,
    /// Directional and volatility-path inputs.
    Medium,
}

/// The chart/query that re-observes a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationSource {
    Trigger,
    NetGex,
    GexRange,
    GexRangeMonthly,
    AtmSkew7,
    AtmSkew14,
    NetDex,
    Vanna,
    TermStructure,
}

impl ObservationSource {
    pub fn command(self, symbol: &str, plan: &FetchPlan) -> String {
        let FetchPlan {
            strikes,
            dte_short,
            dte_mid,
            dte_long,
            window,
            ..
        } = plan;
        match self {
            ObservationSource::Trigger => format!("!trigger {symbol} {window}"),
            ObservationSource::NetGex => format!("!gexn {symbol} {window} 98"),
            ObservationSource::GexRange => format!("!gexr {symbol} {strikes} {dte_short}"),
            ObservationSource::GexRangeMonthly => format!("!gexr {symbol} {strikes} {dte_long}"),
            ObservationSource::AtmSkew7 => format!("!skew {symbol} ivmid atm 7"),
            ObservationSource::AtmSkew14 => format!("!skew {symbol} ivmid atm 14"),
            ObservationSource::NetDex => format!("!dexn {symbol} {strikes} {dte_mid}"),
            ObservationSource::Vanna => format!("!vanna {symbol} ntm {window} m"),
            ObservationSource::TermStructure => format!("!term {symbol} {window}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Remediation {
    pub source: ObservationSource,
    pub description: &'static str,
    pub severity: Severity,
}

impl CanonicalField {
    pub fn remediation(self) -> Remediation {
        use ObservationSource as Src;
        use Severity::*;

        let (source, description, severity) = match self {
            CanonicalField::VolTrigger => (Src::Trigger, "gamma flip (volatility trigger)", Critical),
            CanonicalField::SpotVsTrigger => (Src::Trigger, "spot relative to trigger", Critical),
            CanonicalField::NetGex => (Src::NetGex, "net gamma exposure", Critical),
            CanonicalField::NetGexSign => (Src::NetGex, "net gamma sign", Critical),
            CanonicalField::SpotPrice => (Src::Trigger, "spot price", High),
            CanonicalField::Em1Dollar => (Src::AtmSkew7, "expected move (from ATM IV)", High),
            CanonicalField::CallWall => (Src::GexRange, "call wall", High),
            CanonicalField::PutWall => (Src::GexRange, "put wall", High),
            CanonicalField::MajorWall => (Src::GexRange, "major wall", High),
            CanonicalField::MajorWallType => (Src::GexRange, "major wall type", High),
            CanonicalField::GapDistanceDollar => (Src::GexRange, "gap to wall (dollars)", High),
            CanonicalField::GapDistanceEm1Multiple => {
                (Src::GexRange, "gap to wall (EM units)", High)
            }
            CanonicalField::Iv7d => (Src::AtmSkew7, "7-day ATM implied volatility", High),
            CanonicalField::Iv14d => (Src::AtmSkew14, "14-day ATM implied volatility", High),
            CanonicalField::IvSource => (Src::AtmSkew7, "implied volatility source", High),
            CanonicalField::ClusterStrengthRatio => {
                (Src::GexRange, "cluster strength ratio", Medium)
            }
            CanonicalField::MonthlyClusterOverride => {
                (Src::GexRangeMonthly, "monthly cluster dominance", Medium)
            }
            CanonicalField::DexSameDirPct => (Src::NetDex, "delta exposure alignment", Medium),
            CanonicalField::VannaDir => (Src::Vanna, "vanna direction", Medium),
            CanonicalField::VannaConfidence => (Src::Vanna, "vanna confidence", Medium),
            CanonicalField::IvPath => (Src::TermStructure, "IV path trend", Medium),
            CanonicalField::IvPathConfidence => {
                (Src::TermStructure, "IV path confidence", Medium)
            }
        };
        Remediation {
            source,
            description,
            severity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuideItem {
    pub field: CanonicalField,
    pub command: String,
    pub description: &'static str,
}

const MAX_COMMANDS: usize = 5;

/// Plain-text remediation guide for an incomplete record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemediationGuide {
    pub summary: String,
    /// `"X% (n/22)"`
    pub progress: String,
    pub warning: Option<String>,
    /// De-duplicated, first five in priority order.
    pub commands: Vec<String>,
    pub critical: Vec<GuideItem>,
    pub high: Vec<GuideItem>,
    pub medium: Vec<GuideItem>,
    pub next_action: String,
    pub merge_log: Vec<String>,
}

impl RemediationGuide {
    pub fn build(
        missing: &[CanonicalField],
        summary: &ValidationSummary,
        history: &[MergeRound],
        last_failure: Option<MergeFailure>,
        symbol: &str,
        plan: &FetchPlan,
    ) -> Self {
        let progress = format!(
            "{}% ({}/{})",
            summary.completion_pct, summary.provided, summary.total_required
        );
        let merge_log = history.iter().map(MergeRound::log_line).collect();
        let warning = last_failure.map(|f| f.remediation_hint().to_string());

        if missing.is_empty() {
            return Self {
                summary: "data complete, nothing to collect".into(),
                progress,
                warning,
                commands: Vec::new(),
                critical: Vec::new(),
                high: Vec::new(),
                medium: Vec::new(),
                next_action: "proceed to analysis".into(),
                merge_log,
            };
        }

        let mut ordered: Vec<(Severity, GuideItem)> = missing
            .iter()
            .map(|&field| {
                let r = field.remediation();
                let item = GuideItem {
                    field,
                    command: r.source.command(symbol, plan),
                    description: r.description,
                };
                (r.severity, item)
            })
            .collect();
        // Stable: within a severity, keep path order.
        ordered.sort_by_key(|(severity, _)| *severity);

        let mut commands: Vec<String> = Vec::new();
        for (_, item) in &ordered {
            if !commands.contains(&item.command) {
                commands.push(item.command.clone());
            }
        }
        commands.truncate(MAX_COMMANDS);

        let (mut critical, mut high, mut medium) = (Vec::new(), Vec::new(), Vec::new());
        for (severity, item) in ordered {
            match severity {
                Severity::Critical => critical.push(item),
                Severity::High => high.push(item),
                Severity::Medium => medium.push(item),
            }
        }

        Self {
            summary: format!(
                "progress {progress}, {} field(s) still missing",
                missing.len()
            ),
            progress,
            warning,
            commands,
            critical,
            high,
            medium,
            next_action: format!(
                "submit more observations to fill the remaining {} field(s); submissions accumulate",
                missing.len()
            ),
            merge_log,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.critical.is_empty() && self.high.is_empty() && self.medium.is_empty()
    }
}

impl fmt::Display for RemediationGuide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.summary)?;
        if let Some(w) = &self.warning {
            writeln!(f, "WARNING: {w}")?;
        }
        if !self.commands.is_empty() {
            writeln!(f, "\nCommands:")?;
            for c in &self.commands {
                writeln!(f, "  {c}")?;
            }
        }
        for (label, items) in [
            ("Critical", &self.critical),
            ("High", &self.high),
            ("Medium", &self.medium),
        ] {
            if items.is_empty() {
                continue;
            }
            writeln!(f, "\n{label}:")?;
            for (i, item) in items.iter().enumerate() {
                writeln!(
                    f,
                    "  {}. {} ({}) via `{}`",
                    i + 1,
                    item.field,
                    item.description,
                    item.command
                )?;
            }
        }
        if !self.merge_log.is_empty() {
            writeln!(f, "\nMerge log:")?;
            for line in &self.merge_log {
                writeln!(f, "  {line}")?;
            }
        }
        write!(f, "\nNext: {}", self.next_action)
    }
}
