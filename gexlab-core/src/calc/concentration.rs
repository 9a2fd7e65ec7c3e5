//! Concentration of gamma exposure across strike panels.
//!
//! Used as a cluster-strength fallback when the peak magnitudes were not
//! observed. Each panel is reduced to its top-1 share, top-2 share, HHI and
//! effective number of peaks (ENP = 1 / HHI).

use serde::{Deserialize, Serialize};

use crate::record::ConcentrationPanel;

const STRONG_RATIO: f64 = 1.35;
const MEDIUM_RATIO: f64 = 1.20;
const WEAK_RATIO: f64 = 1.05;

const STRONG_TOP1: f64 = 0.65;
const STRONG_ENP: f64 = 1.8;
const MEDIUM_TOP1: f64 = 0.50;
const MEDIUM_ENP: f64 = 2.3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PanelConcentration {
    pub top1: f64,
    pub top2: f64,
    pub hhi: f64,
    pub enp: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcentrationTier {
    Strong,
    Medium,
    Weak,
}

impl ConcentrationTier {
    /// Cluster-strength ratio implied by the tier.
    pub fn ratio(self) -> f64 {
        match self {
            ConcentrationTier::Strong => STRONG_RATIO,
            ConcentrationTier::Medium => MEDIUM_RATIO,
            ConcentrationTier::Weak => WEAK_RATIO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcentrationAssessment {
    pub panels: Vec<PanelConcentration>,
    pub avg_top1: f64,
    pub avg_enp: f64,
    pub tier: ConcentrationTier,
}

/// Per-panel metrics; `None` for a panel without usable weights.
///
/// Weights are `|gex_total|` when any row reports it, else `share_pct`.
pub fn panel_concentration(panel: &ConcentrationPanel) -> Option<PanelConcentration> {
    let use_gex = panel.rows.iter().any(|r| r.gex_total.is_some());
    let mut weights: Vec<f64> = panel
        .rows
        .iter()
        .filter_map(|r| if use_gex { r.gex_total.map(f64::abs) } else { r.share_pct })
        .filter(|w| w.is_finite() && *w > 0.0)
        .collect();

    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return None;
    }
    weights.sort_by(|a, b| b.total_cmp(a));

    let shares: Vec<f64> = weights.iter().map(|w| w / total).collect();
    let top1 = shares[0];
    let top2 = top1 + shares.get(1).copied().unwrap_or(0.0);
    let hhi: f64 = shares.iter().map(|s| s * s).sum();

    Some(PanelConcentration {
        top1,
        top2,
        hhi,
        enp: 1.0 / hhi,
    })
}

/// Averages the usable panels and maps them to a strength tier.
pub fn assess(panels: &[ConcentrationPanel]) -> Option<ConcentrationAssessment> {
    let metrics: Vec<PanelConcentration> = panels.iter().filter_map(panel_concentration).collect();
    if metrics.is_empty() {
        return None;
    }
    let n = metrics.len() as f64;
    let avg_top1 = metrics.iter().map(|m| m.top1).sum::<f64>() / n;
    let avg_enp = metrics.iter().map(|m| m.enp).sum::<f64>() / n;

    let tier = if avg_top1 >= STRONG_TOP1 || avg_enp <= STRONG_ENP {
        ConcentrationTier::Strong
    } else if avg_top1 >= MEDIUM_TOP1 || avg_enp <= MEDIUM_ENP {
        ConcentrationTier::Medium
    } else {
        ConcentrationTier::Weak
    };

    Some(ConcentrationAssessment {
        panels: metrics,
        avg_top1,
        avg_enp,
        tier,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::StrikeRow;

    fn panel(gex: &[f64]) -> ConcentrationPanel {
        ConcentrationPanel {
            label: "weekly".into(),
            rows: gex
                .iter()
                .enumerate()
                .map(|(i, g)| StrikeRow {
                    strike: 100.0 + i as f64,
                    gex_total: Some(*g),
                    share_pct: None,
                })
                .collect(),
        }
    }

    #[test]
    fn single_dominant_peak_is_strong() {
        let a = assess(&[panel(&[-800.0, 100.0, 100.0])]).unwrap();
        assert!((a.avg_top1 - 0.8).abs() < 1e-12);
        assert_eq!(a.tier, ConcentrationTier::Strong);
        assert_eq!(a.tier.ratio(), 1.35);
    }

    #[test]
    fn even_spread_is_weak() {
        let a = assess(&[panel(&[1.0, 1.0, 1.0, 1.0])]).unwrap();
        assert!((a.avg_enp - 4.0).abs() < 1e-9);
        assert_eq!(a.tier, ConcentrationTier::Weak);
    }

    #[test]
    fn two_peaks_are_medium() {
        // shares 0.5/0.3/0.2 -> hhi 0.38, enp 2.63
        let a = assess(&[panel(&[5.0, 3.0, 2.0])]).unwrap();
        assert_eq!(a.tier, ConcentrationTier::Medium);
    }

    #[test]
    fn share_pct_used_without_gex() {
        let p = ConcentrationPanel {
            label: String::new(),
            rows: vec![
                StrikeRow { strike: 1.0, gex_total: None, share_pct: Some(70.0) },
                StrikeRow { strike: 2.0, gex_total: None, share_pct: Some(30.0) },
            ],
        };
        let m = panel_concentration(&p).unwrap();
        assert!((m.top1 - 0.7).abs() < 1e-12);
        assert!((m.top2 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn empty_panels_yield_nothing() {
        assert!(assess(&[]).is_none());
        assert!(assess(&[panel(&[0.0])]).is_none());
    }
}
