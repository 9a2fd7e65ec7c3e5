//! Pipeline orchestration: aggregate → calculate → validate → score →
//! strategies → rank.
//!
//! [`Pipeline`] is pure: given a submission, the prior cache state and the
//! market parameters it returns a [`PipelineOutcome`]. [`Session`] binds a
//! pipeline to a [`RecordStore`] and does the read-merge-write per symbol.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use gexlab_core::aggregator::RemediationGuide;
use gexlab_core::calc::CalculationLog;
use gexlab_core::fetch_plan::FetchPlan;
use gexlab_core::{
    Aggregation, Aggregator, CacheState, ConfigError, Field, FieldCalculator, MarketParams,
    MarketParamsError, PipelineConfig, Ranking, RankingEngine, Readiness, RecordError,
    ScoringEngine, ScoringResult, StrategyCalculator, StrategySet, TargetRecord,
    VolatilityProfile,
};

use crate::store::{RecordStore, StoreError};
use crate::symbol::{validate_symbol, SymbolError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Symbol(#[from] SymbolError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid market parameters: {0}")]
    MarketParams(#[from] MarketParamsError),

    #[error("submission carries no symbol and none was given")]
    MissingSymbol,
}

/// Scoring, strategies and ranking for a complete record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub symbol: String,
    pub completed_at: NaiveDateTime,
    pub config_hash: String,
    pub record: TargetRecord,
    pub profile: Option<VolatilityProfile>,
    pub scoring: ScoringResult,
    pub strategies: StrategySet,
    pub ranking: Ranking,
}

/// Everything one submission produces.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    pub aggregation: Aggregation,
    pub calculation_log: CalculationLog,
    pub profile: Option<VolatilityProfile>,
    /// Present once every canonical leaf is valid.
    pub analysis: Option<Analysis>,
    pub config_hash: String,
}

impl PipelineOutcome {
    pub fn is_ready(&self) -> bool {
        self.analysis.is_some()
    }

    pub fn symbol(&self) -> Option<&str> {
        self.aggregation.cache.symbol.as_deref()
    }

    pub fn guide(&self) -> Option<&RemediationGuide> {
        self.aggregation.guide.as_ref()
    }

    pub fn record(&self) -> &TargetRecord {
        &self.aggregation.record
    }
}

/// The five stages wired to one configuration.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    config_hash: String,
    calculator: FieldCalculator,
    scoring: ScoringEngine,
    strategies: StrategyCalculator,
    ranking: RankingEngine,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            config_hash: config.config_hash(),
            calculator: FieldCalculator::new(config.volatility.clone()),
            scoring: ScoringEngine::new(config.scoring.clone()),
            strategies: StrategyCalculator::new(config.strategy.clone()),
            ranking: RankingEngine::new(config.ranking.clone()),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn config_hash(&self) -> &str {
        &self.config_hash
    }

    /// Aggregator whose guide commands follow the market regime.
    pub fn aggregator(&self, params: Option<&MarketParams>) -> Aggregator {
        let plan = params.map_or_else(FetchPlan::baseline, FetchPlan::for_market);
        Aggregator::new(self.config.aggregation.clone()).with_fetch_plan(plan)
    }

    /// Runs one submission against `cache`. Pure; the caller persists
    /// `outcome.aggregation.cache`.
    pub fn run(
        &self,
        incoming: &TargetRecord,
        cache: &CacheState,
        params: Option<&MarketParams>,
        at: NaiveDateTime,
    ) -> PipelineOutcome {
        let aggregator = self.aggregator(params);
        let aggregation = aggregator.aggregate(incoming, cache, at);

        let calc = self.calculator.calculate(&aggregation.record, params);
        for check in calc.log.flagged() {
            log::warn!("pipeline: {} = {} ({})", check.field, check.value, check.note);
        }
        let aggregation = aggregator.refresh(aggregation, calc.record);

        let analysis = match aggregation.readiness() {
            Readiness::Ready(ready) => {
                let scoring = self.scoring.score(&ready, params.map(|p| p.ivr));
                let strategies = self.strategies.evaluate(&ready, &scoring, calc.profile.as_ref());
                let ranking = self.ranking.rank(&strategies);
                log::info!(
                    "pipeline: {} ready, score {:.1} ({}), {} ranked",
                    ready.record().symbol().unwrap_or("?"),
                    scoring.total,
                    scoring.entry.decision,
                    ranking.entries.len()
                );
                Some(Analysis {
                    symbol: aggregation.cache.symbol.clone().unwrap_or_default(),
                    completed_at: at,
                    config_hash: self.config_hash.clone(),
                    record: ready.record().clone(),
                    profile: calc.profile.clone(),
                    scoring,
                    strategies,
                    ranking,
                })
            }
            Readiness::Awaiting(missing) => {
                log::info!("pipeline: awaiting {} fields", missing.len());
                None
            }
        };

        PipelineOutcome {
            aggregation,
            calculation_log: calc.log,
            profile: calc.profile,
            analysis,
            config_hash: self.config_hash.clone(),
        }
    }
}

/// A pipeline bound to a store.
///
/// The session holds the store mutably, so submissions for one symbol are
/// serialised by construction.
pub struct Session<'s, S: RecordStore> {
    pipeline: Pipeline,
    store: &'s mut S,
}

impl<'s, S: RecordStore> Session<'s, S> {
    pub fn new(pipeline: Pipeline, store: &'s mut S) -> Self {
        Self { pipeline, store }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn store(&mut self) -> &mut S {
        self.store
    }

    /// Parses, merges and persists one submission.
    ///
    /// `symbol` overrides the store key; otherwise the submission's own
    /// symbol is used. A submission without a symbol inherits the key.
    pub fn submit(
        &mut self,
        symbol: Option<&str>,
        submission: &Value,
        params: Option<&MarketParams>,
        at: NaiveDateTime,
    ) -> Result<PipelineOutcome, PipelineError> {
        if let Some(p) = params {
            p.validate()?;
        }
        let mut incoming = TargetRecord::from_json(submission)?;
        let key = symbol
            .or_else(|| incoming.symbol())
            .ok_or(PipelineError::MissingSymbol)
            .and_then(|s| validate_symbol(s).map_err(PipelineError::from))?;
        if !incoming.symbol.is_valid() {
            incoming.symbol = Field::Valid(key.clone());
        }

        let cache = self.store.load(&key, at)?.unwrap_or_default();
        let outcome = self.pipeline.run(&incoming, &cache, params, at);
        self.store.save(&key, &outcome.aggregation.cache)?;
        Ok(outcome)
    }

    /// Drops any accumulated state for `symbol`.
    pub fn reset(&mut self, symbol: &str) -> Result<(), PipelineError> {
        let key = validate_symbol(symbol)?;
        self.store.remove(&key)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::{Duration, NaiveDate};
    use gexlab_core::aggregator::{DataStatus, Decision, NewTaskReason};
    use serde_json::json;

    fn at(secs: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 2)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
            + Duration::seconds(secs)
    }

    fn first_half() -> Value {
        json!({
            "symbol": "nvda",
            "spot_price": 140.0,
            "em1_dollar": 4.0,
            "walls": {
                "call_wall": 150.0,
                "put_wall": 130.0,
                "major_wall": 150.0,
                "major_wall_type": "call"
            },
            "gamma_metrics": {
                "gap_distance_dollar": 10.0,
                "gap_distance_em1_multiple": 2.5,
                "cluster_strength_ratio": 1.4,
                "net_gex": 2.0e8,
                "net_gex_sign": "positive_gamma",
                "vol_trigger": 135.0,
                "spot_vs_trigger": "above",
                "monthly_cluster_override": false
            }
        })
    }

    fn second_half() -> Value {
        json!({
            "symbol": "NVDA",
            "directional_metrics": {
                "dex_same_dir_pct": 55.0,
                "vanna_dir": "up",
                "vanna_confidence": "medium",
                "iv_path": "flat",
                "iv_path_confidence": "medium"
            },
            "atm_iv": { "iv_7d": 0.5, "iv_14d": 0.52, "iv_source": "skew" }
        })
    }

    fn pipeline() -> Pipeline {
        Pipeline::new(PipelineConfig::default()).unwrap()
    }

    #[test]
    fn two_rounds_reach_ranking() {
        let _ = env_logger::try_init();
        let mut store = MemoryStore::default();
        let mut session = Session::new(pipeline(), &mut store);

        let r1 = session.submit(None, &first_half(), None, at(0)).unwrap();
        assert!(!r1.is_ready());
        assert_eq!(r1.symbol(), Some("NVDA"));
        assert!(r1.guide().is_some());

        let r2 = session.submit(None, &second_half(), None, at(60)).unwrap();
        assert_eq!(r2.aggregation.report.decision, Decision::Accumulate);
        let analysis = r2.analysis.as_ref().expect("record complete");
        assert_eq!(analysis.symbol, "NVDA");
        assert_eq!(analysis.config_hash, r2.config_hash);
        assert_eq!(analysis.ranking.summary.total, analysis.strategies.candidates.len());

        let saved = store.load("NVDA", at(61)).unwrap().unwrap();
        assert_eq!(saved.status, DataStatus::Ready);
        assert!(saved.record.is_none());
        assert_eq!(saved.history.len(), 2);
    }

    #[test]
    fn submission_after_ready_starts_new_task() {
        let mut store = MemoryStore::default();
        let mut session = Session::new(pipeline(), &mut store);
        session.submit(None, &first_half(), None, at(0)).unwrap();
        session.submit(None, &second_half(), None, at(60)).unwrap();

        let r3 = session.submit(None, &second_half(), None, at(120)).unwrap();
        assert_eq!(
            r3.aggregation.report.decision,
            Decision::NewTask(NewTaskReason::PreviousReady)
        );
        assert!(!r3.is_ready());
    }

    #[test]
    fn expired_state_is_not_merged() {
        let mut store = MemoryStore::new(60);
        let mut session = Session::new(pipeline(), &mut store);
        session.submit(None, &first_half(), None, at(0)).unwrap();

        let late = session.submit(None, &second_half(), None, at(600)).unwrap();
        assert_eq!(late.aggregation.report.decision, Decision::FirstSubmission);
        assert!(!late.is_ready());
    }

    #[test]
    fn missing_symbol_inherits_key() {
        let mut store = MemoryStore::default();
        let mut session = Session::new(pipeline(), &mut store);
        let mut body = first_half();
        body.as_object_mut().unwrap().remove("symbol");

        assert!(matches!(
            session.submit(None, &body, None, at(0)),
            Err(PipelineError::MissingSymbol)
        ));
        let outcome = session.submit(Some("amd"), &body, None, at(0)).unwrap();
        assert_eq!(outcome.symbol(), Some("AMD"));
        assert_eq!(session.store().symbols().unwrap(), vec!["AMD".to_string()]);
    }

    #[test]
    fn rejects_reserved_symbol_and_bad_params() {
        let mut store = MemoryStore::default();
        let mut session = Session::new(pipeline(), &mut store);
        let mut body = first_half();
        // A sentinel symbol in the record reads as no symbol at all.
        body["symbol"] = json!("unknown");
        assert!(matches!(
            session.submit(None, &body, None, at(0)),
            Err(PipelineError::MissingSymbol)
        ));
        assert!(matches!(
            session.submit(Some("unknown"), &body, None, at(0)),
            Err(PipelineError::Symbol(SymbolError::Reserved(_)))
        ));
        body["symbol"] = json!("test");
        assert!(matches!(
            session.submit(None, &body, None, at(0)),
            Err(PipelineError::Symbol(SymbolError::Reserved(_)))
        ));

        let bad = MarketParams::new(18.0, 140.0, 0.4, 0.3);
        assert!(matches!(
            session.submit(None, &first_half(), Some(&bad), at(0)),
            Err(PipelineError::MarketParams(_))
        ));
        assert!(session.store().symbols().unwrap().is_empty());
    }

    #[test]
    fn reset_clears_accumulated_state() {
        let mut store = MemoryStore::default();
        let mut session = Session::new(pipeline(), &mut store);
        session.submit(None, &first_half(), None, at(0)).unwrap();
        session.reset("nvda").unwrap();
        assert!(session.store().symbols().unwrap().is_empty());
    }
}
