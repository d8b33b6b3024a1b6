//! Execution engine: the full persisted pipeline for one analysis.
//!
//! `pending -> running -> {completed | failed}`. The engine is the only
//! place a panic inside a test implementation is caught; it becomes a
//! failed run, never a crashed caller. Validation and AI review are
//! additive and can never block or alter the computed result.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};

use sigmalab_core::registry::unknown_test_result;
use sigmalab_core::{
    run_full_validation, AnalysisResult, Confidence, DataTable, JsonMap, Registry,
    UnknownTestError, ValidationReport,
};

use crate::collaborators::{
    AiReview, AiReviewer, AnalysisRecord, AnalysisStatus, DatasetRepository, DatasetSnapshot,
    EventPublisher, RepositoryError, ResultStore, ReviewRequest, SavedResult, StoreError,
};
use crate::config::EngineConfig;
use crate::dataset::reconstruct_table;

/// Event emitted after every run that reaches a terminal state.
pub const ANALYSIS_COMPLETED: &str = "analysis.completed";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("analysis '{0}' not found")]
    AnalysisNotFound(String),
    #[error(transparent)]
    UnknownTest(#[from] UnknownTestError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("dataset reconstruction task failed: {0}")]
    Blocking(#[from] tokio::task::JoinError),
}

pub struct ExecutionEngine {
    registry: Arc<Registry>,
    datasets: Arc<dyn DatasetRepository>,
    store: Arc<dyn ResultStore>,
    reviewer: Option<Arc<dyn AiReviewer>>,
    events: Arc<dyn EventPublisher>,
    config: EngineConfig,
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("registry", &self.registry)
            .field("reviewer", &self.reviewer.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl ExecutionEngine {
    pub fn new(
        registry: Arc<Registry>,
        datasets: Arc<dyn DatasetRepository>,
        store: Arc<dyn ResultStore>,
        events: Arc<dyn EventPublisher>,
        config: EngineConfig,
    ) -> Self {
        Self {
            registry,
            datasets,
            store,
            reviewer: None,
            events,
            config,
        }
    }

    pub fn with_reviewer(mut self, reviewer: Arc<dyn AiReviewer>) -> Self {
        self.reviewer = Some(reviewer);
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one stored analysis end to end and persist the outcome.
    ///
    /// Errors are reserved for problems outside the test itself: a missing
    /// record, an unknown test type, or an unreachable collaborator. A test
    /// that fails, or panics, comes back as `Ok` with `success == false`.
    pub async fn execute_analysis(&self, analysis_id: &str) -> Result<AnalysisResult, EngineError> {
        let span = info_span!(
            "execute_analysis",
            analysis_id = %analysis_id,
            test_type = tracing::field::Empty
        );
        self.execute(analysis_id).instrument(span).await
    }

    /// Run several analyses concurrently; results come back in input order.
    pub async fn execute_many(&self, analysis_ids: &[String]) -> Vec<Result<AnalysisResult, EngineError>> {
        join_all(analysis_ids.iter().map(|id| self.execute_analysis(id))).await
    }

    async fn execute(&self, analysis_id: &str) -> Result<AnalysisResult, EngineError> {
        let record = self
            .store
            .load(analysis_id)
            .await?
            .ok_or_else(|| EngineError::AnalysisNotFound(analysis_id.to_string()))?;
        tracing::Span::current().record("test_type", record.test_type.as_str());

        let (test, category) = match self.registry.lookup(&record.test_type) {
            Ok(found) => found,
            Err(unknown) => {
                warn!(error = %unknown, "unknown test type");
                self.persist_unknown(analysis_id, &unknown).await?;
                return Err(unknown.into());
            }
        };

        let snapshot = match &record.dataset_id {
            Some(id) => {
                let found = self.datasets.get(id).await?;
                if found.is_none() {
                    warn!(dataset_id = %id, "referenced dataset not found, running without data");
                }
                found
            }
            None => None,
        };
        let reconstructed = {
            let snapshot = snapshot.clone();
            let config = self.config.dataset.clone();
            tokio::task::spawn_blocking(move || reconstruct_table(snapshot.as_ref(), &config))
                .await?
        };
        let table = reconstructed.table;
        debug!(rows = table.n_rows(), source = ?reconstructed.source, "table reconstructed");

        self.store
            .set_status(analysis_id, AnalysisStatus::Running)
            .await?;

        let start = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            test.run(&table, &record.configuration)
        }));
        let mut result = match outcome {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(panic = %message, "test implementation panicked");
                AnalysisResult::failed_with(
                    &record.test_type,
                    category.as_str(),
                    format!("Computation failed: {message}"),
                )
            }
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        result = result.with_duration(duration_ms);
        result.warnings.extend(reconstructed.warnings);
        if !table.is_empty() {
            result
                .details
                .insert("dataset_hash".into(), Value::from(table.fingerprint()));
        }

        let validation = self.validate(&record, &table, snapshot.as_ref(), &result);
        let validation_block = match validation {
            Some(report) => Some(self.validation_block(&record, snapshot.as_ref(), &result, report).await),
            None => None,
        };

        let status = if result.success {
            AnalysisStatus::Completed
        } else {
            AnalysisStatus::Failed
        };
        let saved = SavedResult {
            status,
            results: persisted_results(&result, validation_block),
            charts: (!result.charts.is_empty()).then(|| json!({ "charts": result.charts })),
            duration_ms: Some(duration_ms),
            run_at: Some(Utc::now()),
        };
        self.store.save(analysis_id, saved).await?;
        info!(status = %status, duration_ms, "analysis finished");

        let payload = json!({
            "analysis_id": analysis_id,
            "initiative_id": record.initiative_id,
            "test_type": record.test_type,
        });
        if let Err(e) = self.events.publish(ANALYSIS_COMPLETED, payload).await {
            warn!(error = %e, "failed to publish {ANALYSIS_COMPLETED}");
        }

        Ok(result)
    }

    async fn persist_unknown(&self, analysis_id: &str, unknown: &UnknownTestError) -> Result<(), StoreError> {
        let failed = unknown_test_result(unknown);
        let mut results = JsonMap::new();
        results.insert("error".into(), Value::from(failed.error.unwrap_or_default()));
        results.insert("available_tests".into(), Value::from(unknown.available.clone()));
        self.store
            .save(
                analysis_id,
                SavedResult {
                    status: AnalysisStatus::Failed,
                    results,
                    charts: None,
                    duration_ms: None,
                    run_at: Some(Utc::now()),
                },
            )
            .await
    }

    /// Programmatic validation; a panic here is logged and the report omitted.
    fn validate(
        &self,
        record: &AnalysisRecord,
        table: &DataTable,
        snapshot: Option<&DatasetSnapshot>,
        result: &AnalysisResult,
    ) -> Option<ValidationReport> {
        let table = (!table.is_empty()).then_some(table);
        let row_count = snapshot.map(|s| s.row_count);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            run_full_validation(&record.test_type, &record.configuration, table, row_count, result)
        }));
        match outcome {
            Ok(report) => Some(report),
            Err(payload) => {
                error!(panic = %panic_message(payload.as_ref()), "validation panicked, omitting report");
                None
            }
        }
    }

    async fn validation_block(
        &self,
        record: &AnalysisRecord,
        snapshot: Option<&DatasetSnapshot>,
        result: &AnalysisResult,
        report: ValidationReport,
    ) -> Value {
        let mut verdict = if report.passed { "validated" } else { "concern" }.to_string();
        let mut confidence = report.confidence;

        let review = match (&self.reviewer, self.config.ai_review.enabled) {
            (Some(reviewer), true) => {
                let request = ReviewRequest {
                    test_type: record.test_type.clone(),
                    configuration: record.configuration.clone(),
                    dataset_profile: snapshot.map(DatasetSnapshot::profile),
                    summary: result.summary.clone(),
                    details: result.details.clone(),
                    programmatic_validation: report.clone(),
                };
                Some(self.review(reviewer.as_ref(), request).await)
            }
            _ => None,
        };

        if let (Some(review), true) = (&review, report.passed) {
            verdict = review.verdict.clone();
            confidence = confidence_from_score(review.confidence_score);
        }

        let mut block = json!({
            "overall_verdict": verdict,
            "overall_confidence": confidence,
            "programmatic": report,
        });
        if let (Some(review), Value::Object(map)) = (review, &mut block) {
            map.insert("ai_review".into(), json!(review));
        }
        block
    }

    async fn review(&self, reviewer: &dyn AiReviewer, request: ReviewRequest) -> AiReview {
        let timeout = self.config.ai_review.timeout();
        match tokio::time::timeout(timeout, reviewer.review(request)).await {
            Ok(Ok(review)) => review,
            Ok(Err(e)) => {
                warn!(error = %e, "AI review failed, using placeholder");
                AiReview::placeholder()
            }
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "AI review timed out, using placeholder");
                AiReview::placeholder()
            }
        }
    }
}

/// `>= 75` high, `>= 50` medium, else low.
pub fn confidence_from_score(score: u32) -> Confidence {
    if score >= 75 {
        Confidence::High
    } else if score >= 50 {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

/// `{summary, details, warnings, interpretation_context, validation?}`,
/// with the error surfaced at the top level for failed runs.
fn persisted_results(result: &AnalysisResult, validation: Option<Value>) -> JsonMap {
    let mut results = JsonMap::new();
    results.insert("summary".into(), Value::Object(result.summary.clone()));
    results.insert("details".into(), Value::Object(result.details.clone()));
    results.insert("warnings".into(), json!(result.warnings));
    results.insert(
        "interpretation_context".into(),
        Value::Object(result.interpretation_context.clone()),
    );
    if let Some(error) = &result.error {
        results.insert("error".into(), Value::from(error.clone()));
    }
    if let Some(validation) = validation {
        results.insert("validation".into(), validation);
    }
    results
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_bands() {
        assert_eq!(confidence_from_score(90), Confidence::High);
        assert_eq!(confidence_from_score(75), Confidence::High);
        assert_eq!(confidence_from_score(74), Confidence::Medium);
        assert_eq!(confidence_from_score(50), Confidence::Medium);
        assert_eq!(confidence_from_score(10), Confidence::Low);
    }

    proptest::proptest! {
        #[test]
        fn higher_scores_never_lower_confidence(a in 0u32..=100, b in 0u32..=100) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            proptest::prop_assert!(confidence_from_score(lo) <= confidence_from_score(hi));
        }
    }

    #[test]
    fn panic_payloads_become_messages() {
        let caught = panic::catch_unwind(|| panic!("boom {}", 7)).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "boom 7");
        let caught = panic::catch_unwind(|| std::panic::panic_any(3_u8)).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "unknown panic");
    }

    #[test]
    fn persisted_shape_always_has_warnings() {
        let r = AnalysisResult::success(sigmalab_core::TestKind::CChart);
        let results = persisted_results(&r, None);
        assert_eq!(results["warnings"], json!([]));
        assert!(!results.contains_key("validation"));
        assert!(!results.contains_key("error"));
    }
}
