//! Multi-round accumulation of a target record.
//!
//! One call = one submission:
//! - [`decide`] whether to continue the cached task or start a fresh one
//! - leaf-wise merge with added/updated bookkeeping and degenerate-merge guards
//! - validation of the 22 canonical leaves (sole authority for status)
//! - an advisory [`RemediationGuide`] while data is still missing
//!
//! The caller owns the [`CacheState`]; nothing here performs I/O.

pub mod guide;
pub mod validation;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::config::AggregationConfig;
use crate::fetch_plan::FetchPlan;
use crate::record::TargetRecord;

pub use guide::{GuideItem, ObservationSource, Remediation, RemediationGuide, Severity};
pub use validation::{
    DataStatus, MissingField, ReadyRecord, Readiness, Validation, ValidationSummary,
};

// ─── Cache state ─────────────────────────────────────────────────────

/// Caller-held accumulation state for one instrument.
///
/// The record is retained only while the task is awaiting data.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheState {
    pub record: Option<TargetRecord>,
    pub symbol: Option<String>,
    pub status: DataStatus,
    pub history: Vec<MergeRound>,
    pub updated_at: Option<NaiveDateTime>,
}

impl CacheState {
    pub fn is_awaiting(&self) -> bool {
        self.status == DataStatus::AwaitingData
    }
}

// ─── Decision ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum NewTaskReason {
    PreviousReady,
    SymbolChanged { from: String, to: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    FirstSubmission,
    Accumulate,
    NewTask(NewTaskReason),
}

/// Chooses between continuing the cached task and starting afresh.
///
/// An incoming record without a symbol is treated as the cached symbol.
/// An awaiting task for the same symbol always accumulates, however many
/// rounds it has taken.
pub fn decide(cache: &CacheState, incoming_symbol: Option<&str>) -> Decision {
    if cache.status == DataStatus::Ready {
        return Decision::NewTask(NewTaskReason::PreviousReady);
    }
    if cache.record.is_none() || cache.status == DataStatus::Initial {
        return Decision::FirstSubmission;
    }
    if let (Some(cached), Some(incoming)) = (cache.symbol.as_deref(), incoming_symbol) {
        if !cached.eq_ignore_ascii_case(incoming) {
            return Decision::NewTask(NewTaskReason::SymbolChanged {
                from: cached.to_string(),
                to: incoming.to_ascii_uppercase(),
            });
        }
    }
    Decision::Accumulate
}

// ─── Merge history ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeAction {
    FirstSubmission,
    IncrementalFill,
    MergeFailed,
    NewTask,
}

/// Why a merge contributed nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeFailure {
    /// The submission holds no valid leaf at all.
    EmptyContribution,
    /// Valid leaves, all identical to what is already held.
    NoProgress,
}

impl MergeFailure {
    pub fn reason(self) -> &'static str {
        match self {
            MergeFailure::EmptyContribution => "incoming record has no valid fields",
            MergeFailure::NoProgress => "no fields added or updated",
        }
    }

    pub fn remediation_hint(self) -> &'static str {
        match self {
            MergeFailure::EmptyContribution => {
                "last submission carried no valid fields; check the extraction step produced values"
            }
            MergeFailure::NoProgress => {
                "last submission duplicated data already held; submit the missing observations below"
            }
        }
    }
}

/// One entry in the append-only merge history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeRound {
    pub round: usize,
    pub timestamp: NaiveDateTime,
    pub action: MergeAction,
    pub fields_added: usize,
    pub fields_updated: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl MergeRound {
    pub fn log_line(&self) -> String {
        let action = match self.action {
            MergeAction::FirstSubmission => "first submission",
            MergeAction::IncrementalFill => "incremental fill",
            MergeAction::MergeFailed => "merge failed",
            MergeAction::NewTask => "new task",
        };
        let mut line = format!(
            "round {} [{}] {}: +{} added, {} updated",
            self.round,
            self.timestamp.format("%H:%M:%S"),
            action,
            self.fields_added,
            self.fields_updated
        );
        if let Some(reason) = &self.failure_reason {
            line.push_str(&format!(" ({reason})"));
        }
        line
    }
}

// ─── Aggregation ─────────────────────────────────────────────────────

/// Outcome of merging one submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeReport {
    pub decision: Decision,
    pub action: MergeAction,
    pub merge_failed: bool,
    pub failure: Option<MergeFailure>,
    /// Valid observation leaves in the submission (symbol excluded).
    pub contributed: usize,
    pub fields_added: Vec<String>,
    pub fields_updated: Vec<String>,
}

impl MergeReport {
    pub fn new_fields_count(&self) -> usize {
        self.fields_added.len()
    }
}

/// Everything one aggregation call produces.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub record: TargetRecord,
    pub cache: CacheState,
    pub validation: Validation,
    pub report: MergeReport,
    /// Present while canonical leaves are still missing.
    pub guide: Option<RemediationGuide>,
}

impl Aggregation {
    pub fn is_ready(&self) -> bool {
        self.validation.is_complete()
    }

    pub fn readiness(&self) -> Readiness {
        Readiness::check(self.record.clone())
    }
}

/// Stateless merge engine; the cache is passed in and handed back.
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    config: AggregationConfig,
    plan: FetchPlan,
}

impl Aggregator {
    pub fn new(config: AggregationConfig) -> Self {
        Self {
            config,
            plan: FetchPlan::baseline(),
        }
    }

    /// Renders guide commands with regime-specific observation parameters.
    pub fn with_fetch_plan(mut self, plan: FetchPlan) -> Self {
        self.plan = plan;
        self
    }

    pub fn config(&self) -> &AggregationConfig {
        &self.config
    }

    pub fn fetch_plan(&self) -> &FetchPlan {
        &self.plan
    }

    pub fn aggregate(
        &self,
        incoming: &TargetRecord,
        cache: &CacheState,
        at: NaiveDateTime,
    ) -> Aggregation {
        let decision = decide(cache, incoming.symbol());
        log::debug!("aggregate: decision {decision:?}");

        let (mut record, mut history) = match &decision {
            Decision::Accumulate => (cache.record.clone().unwrap_or_default(), cache.history.clone()),
            Decision::FirstSubmission => (
                cache.record.clone().unwrap_or_default(),
                Vec::new(),
            ),
            Decision::NewTask(reason) => {
                log::info!("aggregate: starting new task ({reason:?})");
                (
                    TargetRecord {
                        symbol: incoming.symbol.clone(),
                        ..TargetRecord::default()
                    },
                    Vec::new(),
                )
            }
        };

        let contributed = incoming.valid_leaf_count();
        let (failure, added, updated) = if contributed == 0 {
            (Some(MergeFailure::EmptyContribution), Vec::new(), Vec::new())
        } else {
            let tally = record.merge_from(incoming);
            let failure = (tally.changed() == 0).then_some(MergeFailure::NoProgress);
            (failure, tally.added, tally.updated)
        };
        if record.symbol.is_valid() {
            // Symbols are compared and stored upper-case.
            record.symbol = record.symbol.clone().map(|s| s.to_ascii_uppercase());
        }

        let action = match (&failure, &decision) {
            (Some(_), _) => MergeAction::MergeFailed,
            (None, Decision::FirstSubmission) => MergeAction::FirstSubmission,
            (None, Decision::Accumulate) => MergeAction::IncrementalFill,
            (None, Decision::NewTask(_)) => MergeAction::NewTask,
        };
        if let Some(f) = failure {
            log::warn!("aggregate: merge failed: {}", f.reason());
        }

        history.push(MergeRound {
            round: history.len() + 1,
            timestamp: at,
            action,
            fields_added: added.len(),
            fields_updated: updated.len(),
            failure_reason: failure.map(|f| f.reason().to_string()),
        });

        let report = MergeReport {
            decision,
            action,
            merge_failed: failure.is_some(),
            failure,
            contributed,
            fields_added: added,
            fields_updated: updated,
        };

        let symbol = record
            .symbol()
            .map(str::to_string)
            .or_else(|| cache.symbol.clone());
        let seed = CacheState {
            record: None,
            symbol,
            status: DataStatus::Initial,
            history,
            updated_at: Some(at),
        };
        let aggregation = self.finish(record, seed, report);
        log::info!(
            "aggregate: {} {:?}, {}",
            aggregation.cache.symbol.as_deref().unwrap_or("?"),
            aggregation.validation.status,
            aggregation.validation.summary.completion_pct
        );
        aggregation
    }

    /// Re-validates after derived fields were added to the record.
    pub fn refresh(&self, aggregation: Aggregation, record: TargetRecord) -> Aggregation {
        let Aggregation { cache, report, .. } = aggregation;
        self.finish(record, cache, report)
    }

    fn finish(&self, record: TargetRecord, mut cache: CacheState, report: MergeReport) -> Aggregation {
        let validation = Validation::of(&record);
        cache.status = validation.status;
        cache.record = cache.is_awaiting().then(|| record.clone());

        let guide = (!validation.is_complete()).then(|| {
            RemediationGuide::build(
                &validation.missing,
                &validation.summary,
                &cache.history,
                report.failure,
                cache.symbol.as_deref().unwrap_or("SYMBOL"),
                &self.plan,
            )
        });

        Aggregation {
            record,
            cache,
            validation,
            report,
            guide,
        }
    }
}
