//! GexLab Core: target record, aggregation, derived fields, scoring, strategies, ranking.
//!
//! This crate contains the deterministic decision pipeline:
//! - Validity model and typed target record with dotted-path addressing
//! - Incremental aggregation across submissions, with remediation guides
//! - Regime-aware derived-field calculation (expected move, gap, cluster)
//! - Multi-factor regime scoring with entry gate and scenario classification
//! - Closed-form strategy candidates with quality vetoes
//! - Expected-value ranking
//!
//! Every stage is a pure function of its inputs and configuration; I/O lives
//! in `gexlab-runner`.

pub mod aggregator;
pub mod calc;
pub mod config;
pub mod fetch_plan;
pub mod market;
pub mod ranking;
pub mod record;
pub mod scoring;
pub mod strategy;
pub mod validity;

pub use aggregator::{Aggregation, Aggregator, CacheState, Readiness, ReadyRecord};
pub use calc::{Calculation, FieldCalculator, VolatilityProfile};
pub use config::{ConfigError, PipelineConfig};
pub use market::{MarketParams, MarketParamsError};
pub use ranking::{Ranking, RankingEngine};
pub use record::{Field, RecordError, TargetRecord};
pub use scoring::{ScoringEngine, ScoringResult};
pub use strategy::{StrategyCalculator, StrategySet};

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    use crate::record::{
        Confidence, Field, GexSign, IvPath, SpotVsTrigger, TargetRecord, Trend, WallType,
    };

    /// A ready TSLA record: above trigger, 1 EM from the wall, long lean.
    pub fn complete_record() -> TargetRecord {
        let mut r = TargetRecord {
            symbol: Field::Valid("TSLA".to_string()),
            spot_price: Field::Valid(250.0),
            em1_dollar: Field::Valid(5.0),
            ..TargetRecord::default()
        };

        let w = &mut r.walls;
        w.call_wall = Field::Valid(260.0);
        w.put_wall = Field::Valid(240.0);
        w.major_wall = Field::Valid(260.0);
        w.major_wall_type = Field::Valid(WallType::Call);

        let g = &mut r.gamma_metrics;
        g.gap_distance_dollar = Field::Valid(5.0);
        g.gap_distance_em1_multiple = Field::Valid(1.0);
        g.cluster_strength_ratio = Field::Valid(1.5);
        g.net_gex = Field::Valid(1.0e9);
        g.net_gex_sign = Field::Valid(GexSign::Positive);
        g.vol_trigger = Field::Valid(245.0);
        g.spot_vs_trigger = Field::Valid(SpotVsTrigger::Above);
        g.monthly_cluster_override = Field::Valid(false);

        let d = &mut r.directional_metrics;
        d.dex_same_dir_pct = Field::Valid(65.0);
        d.vanna_dir = Field::Valid(Trend::Up);
        d.vanna_confidence = Field::Valid(Confidence::High);
        d.iv_path = Field::Valid(IvPath::Rising);
        d.iv_path_confidence = Field::Valid(Confidence::Medium);

        r.atm_iv.iv_7d = Field::Valid(0.45);
        r.atm_iv.iv_14d = Field::Valid(0.47);
        r.atm_iv.iv_source = Field::Valid("skew".to_string());
        r
    }

    /// Fixed session open plus `secs`.
    pub fn at(secs: i64) -> NaiveDateTime {
        let open = NaiveDate::from_ymd_opt(2025, 1, 2)
            .and_then(|d| d.and_hms_opt(9, 30, 0))
            .unwrap();
        open + Duration::seconds(secs)
    }
}
