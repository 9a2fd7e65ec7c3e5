//! Reporting and export: JSON, CSV, and Markdown artifact generation.
//!
//! Provides three export formats for a completed analysis:
//! - **JSON**: the archive document with schema versioning
//! - **CSV**: the ranking table for spreadsheets
//! - **Markdown**: a human-readable report of score, scenario and ranking
//!
//! JSON artifacts carry a `schema_version` field. Unknown versions are
//! rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use gexlab_core::ranking::Ranking;
use gexlab_core::strategy::{Leg, OptionType, Side};

use crate::archive::{AnalysisDocument, SCHEMA_VERSION};
use crate::pipeline::Analysis;

// ─── JSON export ────────────────────────────────────────────────────

/// Serialize an `AnalysisDocument` to pretty JSON.
pub fn export_json(doc: &AnalysisDocument) -> Result<String> {
    serde_json::to_string_pretty(doc).context("failed to serialize AnalysisDocument to JSON")
}

/// Deserialize an `AnalysisDocument`, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<AnalysisDocument> {
    let doc: AnalysisDocument =
        serde_json::from_str(json).context("failed to deserialize AnalysisDocument from JSON")?;
    if doc.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            doc.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(doc)
}

// ─── CSV export ─────────────────────────────────────────────────────

fn leg_label(leg: &Leg) -> String {
    let side = match leg.side {
        Side::Buy => "+",
        Side::Sell => "-",
    };
    let kind = match leg.option_type {
        OptionType::Call => "C",
        OptionType::Put => "P",
    };
    format!("{side}{}{kind}", leg.strike)
}

/// Export a ranking as CSV, one row per entry in rank order.
///
/// Columns: rank, strategy, tier, legs, dte, premium, max_profit, max_loss,
/// win_probability, ev, rar, scenario_match, liquidity, vetoed, composite
pub fn export_ranking_csv(ranking: &Ranking) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "rank",
        "strategy",
        "tier",
        "legs",
        "dte",
        "premium",
        "max_profit",
        "max_loss",
        "win_probability",
        "ev",
        "rar",
        "scenario_match",
        "liquidity",
        "vetoed",
        "composite",
    ])?;

    for e in &ranking.entries {
        let c = &e.candidate;
        let legs: Vec<String> = c.legs.iter().map(leg_label).collect();
        wtr.write_record([
            e.rank.to_string(),
            c.name().to_string(),
            format!("{:?}", c.tier).to_lowercase(),
            legs.join(" "),
            c.dte.to_string(),
            format!("{:.2}", c.risk_reward.premium),
            format!("{:.2}", c.risk_reward.max_profit),
            format!("{:.2}", c.risk_reward.max_loss),
            format!("{:.3}", e.win_probability),
            format!("{:.2}", e.ev),
            format!("{:.3}", e.rar),
            e.scenario_match.to_string(),
            if e.liquidity.pass { "pass" } else { "fail" }.to_string(),
            c.veto.vetoed.to_string(),
            format!("{:.1}", e.composite),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the artifact set for a document with a completed analysis.
///
/// Creates `{SYMBOL}_{YYYYMMDD}/` under `output_dir` containing:
/// - `analysis.json`: the full `AnalysisDocument`
/// - `ranking.csv`: the ranking table
/// - `report.md`: the Markdown report
///
/// Returns the path to the created directory.
pub fn save_artifacts(doc: &AnalysisDocument, output_dir: &Path) -> Result<PathBuf> {
    let Some(analysis) = doc.analysis.as_ref() else {
        bail!("{} has no completed analysis to export", doc.symbol);
    };
    let dirname = format!("{}_{}", doc.symbol, doc.date().format("%Y%m%d"));
    let run_dir = output_dir.join(dirname);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    std::fs::write(run_dir.join("analysis.json"), export_json(doc)?)?;
    std::fs::write(run_dir.join("ranking.csv"), export_ranking_csv(&analysis.ranking)?)?;
    std::fs::write(run_dir.join("report.md"), generate_report(analysis))?;

    Ok(run_dir)
}

// ─── Markdown reports ───────────────────────────────────────────────

fn level(v: Option<f64>) -> String {
    v.map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}"))
}

/// Generate a Markdown report for a completed analysis.
pub fn generate_report(analysis: &Analysis) -> String {
    let mut md = String::with_capacity(4096);
    let s = &analysis.scoring;
    let set = &analysis.strategies;

    md.push_str(&format!("# {} Analysis\n\n", analysis.symbol));

    md.push_str("## Metadata\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Completed | {} |\n", analysis.completed_at));
    md.push_str(&format!("| Spot | {:.2} |\n", set.spot));
    md.push_str(&format!("| EM1$ | {:.2} |\n", set.em1));
    md.push_str(&format!("| IV Rank | {:.0} |\n", set.ivr));
    if let Some(p) = &analysis.profile {
        md.push_str(&format!("| Lambda | {:.3} |\n", p.lambda));
        md.push_str(&format!("| VRP | {:.2} |\n", p.vrp));
    }
    md.push_str(&format!("| Config Hash | {} |\n", analysis.config_hash));
    md.push('\n');

    md.push_str("## Regime Score\n\n");
    md.push_str("| Factor | Score | Weight | Rationale |\n");
    md.push_str("| --- | ---: | ---: | --- |\n");
    for f in &s.factors {
        md.push_str(&format!(
            "| {:?} | {:.1} | {:.2} | {} |\n",
            f.factor,
            f.score,
            s.weights.weight_of(f.factor),
            f.rationale
        ));
    }
    md.push_str(&format!(
        "\nTotal **{:.1}** / 10 (composite {:.0}), entry: **{}**\n\n",
        s.total, s.composite, s.entry.decision
    ));
    for c in &s.entry.failed {
        md.push_str(&format!("- not met: {c}\n"));
    }
    if !s.entry.failed.is_empty() {
        md.push('\n');
    }

    md.push_str("## Scenario\n\n");
    md.push_str(&format!(
        "{} ({:.0}%), {:?} bias: {}\n\n",
        s.scenario.kind, s.scenario.probability, s.scenario.bias, s.scenario.bias_note
    ));
    md.push_str("| Level | Value |\n");
    md.push_str("| --- | ---: |\n");
    md.push_str(&format!("| Support | {} |\n", level(s.key_levels.support)));
    md.push_str(&format!("| Trigger | {} |\n", level(s.key_levels.trigger)));
    md.push_str(&format!("| Resistance | {} |\n", level(s.key_levels.resistance)));
    md.push_str(&format!(
        "\nHolding period: {} days ({})\n\n",
        set.dte.days, set.dte.rationale
    ));

    if !s.risk_warnings.is_empty() {
        md.push_str("## Risk Warnings\n\n");
        for w in &s.risk_warnings {
            md.push_str(&format!("- {w}\n"));
        }
        md.push('\n');
    }

    md.push_str("## Strategy Ranking\n\n");
    md.push_str("| # | Strategy | Legs | Win % | EV | RAR | Match | Liquidity | Score |\n");
    md.push_str("| ---: | --- | --- | ---: | ---: | ---: | --- | --- | ---: |\n");
    for e in &analysis.ranking.entries {
        let legs: Vec<String> = e.candidate.legs.iter().map(leg_label).collect();
        let name = if e.candidate.veto.vetoed {
            format!("~~{}~~", e.candidate.name())
        } else {
            e.candidate.name().to_string()
        };
        md.push_str(&format!(
            "| {} | {} | {} | {:.0} | {:.2} | {:.3} | {} | {} | {:.1} |\n",
            e.rank,
            name,
            legs.join(" "),
            e.win_probability * 100.0,
            e.ev,
            e.rar,
            e.scenario_match,
            if e.liquidity.pass { "pass" } else { "fail" },
            e.composite
        ));
    }
    md.push('\n');

    let notes: Vec<String> = analysis
        .ranking
        .entries
        .iter()
        .flat_map(|e| {
            e.candidate
                .veto
                .notes
                .iter()
                .chain(&e.candidate.notes)
                .map(move |n| format!("- {}: {n}", e.candidate.name()))
        })
        .collect();
    if !notes.is_empty() || !set.dropped.is_empty() {
        md.push_str("## Notes\n\n");
        for n in &notes {
            md.push_str(n);
            md.push('\n');
        }
        for d in &set.dropped {
            md.push_str(&format!("- {} dropped: {}\n", d.archetype, d.reason));
        }
        md.push('\n');
    }

    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;
    use chrono::{NaiveDate, NaiveDateTime};
    use gexlab_core::{CacheState, PipelineConfig, TargetRecord};
    use serde_json::json;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 2)
            .unwrap()
            .and_hms_opt(16, 0, 0)
            .unwrap()
    }

    fn sample_analysis() -> Analysis {
        let record = TargetRecord::from_json(&json!({
            "symbol": "TSLA",
            "spot_price": 250.0,
            "em1_dollar": 5.0,
            "walls": {
                "call_wall": 260.0, "put_wall": 240.0,
                "major_wall": 260.0, "major_wall_type": "call"
            },
            "gamma_metrics": {
                "gap_distance_dollar": 5.0, "gap_distance_em1_multiple": 1.0,
                "cluster_strength_ratio": 1.5, "net_gex": 1.0e9,
                "net_gex_sign": "positive", "vol_trigger": 245.0,
                "spot_vs_trigger": "above", "monthly_cluster_override": false
            },
            "directional_metrics": {
                "dex_same_dir_pct": 65.0, "vanna_dir": "up", "vanna_confidence": "high",
                "iv_path": "rising", "iv_path_confidence": "medium"
            },
            "atm_iv": { "iv_7d": 0.45, "iv_14d": 0.47, "iv_source": "skew" }
        }))
        .unwrap();
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        pipeline
            .run(&record, &CacheState::default(), None, at())
            .analysis
            .expect("complete record")
    }

    fn sample_doc() -> AnalysisDocument {
        let mut doc = AnalysisDocument::new("TSLA", at());
        doc.record_analysis(sample_analysis());
        doc
    }

    #[test]
    fn json_roundtrip() {
        let doc = sample_doc();
        let json = export_json(&doc).unwrap();
        let restored = import_json(&json).unwrap();
        assert_eq!(restored, doc);
        assert_eq!(restored.snapshots.len(), 1);
    }

    #[test]
    fn json_rejects_unknown_version() {
        let mut doc = sample_doc();
        doc.schema_version = 99;
        let json = export_json(&doc).unwrap();
        let err = import_json(&json).unwrap_err();
        assert!(err.to_string().contains("unsupported schema version"));
    }

    #[test]
    fn csv_ranking_one_row_per_entry() {
        let analysis = sample_analysis();
        let csv = export_ranking_csv(&analysis.ranking).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), analysis.ranking.entries.len() + 1);
        assert!(lines[0].starts_with("rank,strategy,tier,legs"));
        assert!(lines[1].starts_with("1,"));
    }

    #[test]
    fn report_has_all_sections() {
        let md = generate_report(&sample_analysis());
        assert!(md.starts_with("# TSLA Analysis"));
        for section in ["## Metadata", "## Regime Score", "## Scenario", "## Strategy Ranking"] {
            assert!(md.contains(section), "missing {section}");
        }
    }

    #[test]
    fn save_artifacts_writes_bundle() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = save_artifacts(&sample_doc(), temp_dir.path()).unwrap();
        assert!(dir.ends_with("TSLA_20250102"));
        for file in ["analysis.json", "ranking.csv", "report.md"] {
            assert!(dir.join(file).exists(), "missing {file}");
        }
    }

    #[test]
    fn save_artifacts_requires_analysis() {
        let temp_dir = tempfile::tempdir().unwrap();
        let doc = AnalysisDocument::new("TSLA", at());
        assert!(save_artifacts(&doc, temp_dir.path()).is_err());
    }
}
