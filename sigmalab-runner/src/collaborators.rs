//! Boundaries the engine talks through, plus in-memory implementations.
//!
//! - [`DatasetRepository`]: read-only dataset snapshots
//! - [`ResultStore`]: analysis records and their persisted results
//! - [`AiReviewer`]: optional second opinion on a finished run
//! - [`EventPublisher`]: fire-and-forget notifications
//!
//! The in-memory types back the CLI's `execute` command and the tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use sigmalab_core::catalog::{ColumnProfile, DatasetProfile};
use sigmalab_core::{JsonMap, ValidationReport};

// ─── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("dataset repository unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("analysis '{0}' is not in the store")]
    NotFound(String),
    #[error("result store backend: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("reviewer request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("reviewer returned status {0}")]
    Status(u16),
    #[error("reviewer response is not a review: {0}")]
    Malformed(String),
    #[error("reviewer unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("event bus closed")]
    Closed,
    #[error("event bus: {0}")]
    Backend(String),
}

// ─── Records ─────────────────────────────────────────────────────────

/// Read-only view of a stored dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSnapshot {
    pub id: String,
    #[serde(default)]
    pub columns: Vec<ColumnProfile>,
    #[serde(default)]
    pub row_count: usize,
    /// Full upload (CSV), preferred over the preview when readable.
    #[serde(default)]
    pub file_reference: Option<PathBuf>,
    /// First rows of the upload, kept as JSON objects.
    #[serde(default)]
    pub preview_rows: Option<Vec<JsonMap>>,
}

impl DatasetSnapshot {
    pub fn profile(&self) -> DatasetProfile {
        DatasetProfile {
            columns: self.columns.clone(),
            row_count: self.row_count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisStatus::Pending => "pending",
            AnalysisStatus::Running => "running",
            AnalysisStatus::Completed => "completed",
            AnalysisStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, AnalysisStatus::Completed | AnalysisStatus::Failed)
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A requested analysis, owned by the result store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: String,
    pub test_type: String,
    #[serde(default)]
    pub configuration: JsonMap,
    #[serde(default)]
    pub dataset_id: Option<String>,
    #[serde(default)]
    pub initiative_id: Option<String>,
    pub status: AnalysisStatus,
}

impl AnalysisRecord {
    pub fn pending(id: impl Into<String>, test_type: impl Into<String>, configuration: JsonMap) -> Self {
        Self {
            id: id.into(),
            test_type: test_type.into(),
            configuration,
            dataset_id: None,
            initiative_id: None,
            status: AnalysisStatus::Pending,
        }
    }

    pub fn with_dataset(mut self, dataset_id: impl Into<String>) -> Self {
        self.dataset_id = Some(dataset_id.into());
        self
    }

    pub fn with_initiative(mut self, initiative_id: impl Into<String>) -> Self {
        self.initiative_id = Some(initiative_id.into());
        self
    }
}

/// What the engine writes back when a run ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedResult {
    pub status: AnalysisStatus,
    /// `{summary, details, warnings, interpretation_context, validation?}`,
    /// or `{error, available_tests}` for an unknown test type.
    pub results: JsonMap,
    /// `{charts: [...]}`, absent when the run produced none.
    #[serde(default)]
    pub charts: Option<Value>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub run_at: Option<DateTime<Utc>>,
}

impl SavedResult {
    /// The full persisted document, charts folded back in.
    pub fn to_document(&self) -> Value {
        let mut doc = self.results.clone();
        if let Some(charts) = &self.charts {
            doc.insert("charts".into(), charts.clone());
        }
        doc.insert("status".into(), Value::from(self.status.as_str()));
        if let Some(ms) = self.duration_ms {
            doc.insert("duration_ms".into(), Value::from(ms));
        }
        if let Some(at) = self.run_at {
            doc.insert("run_at".into(), Value::from(at.to_rfc3339()));
        }
        Value::Object(doc)
    }
}

// ─── AI review ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewFinding {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

fn default_verdict() -> String {
    "caution".to_string()
}

fn default_score() -> u32 {
    50
}

fn default_review_summary() -> String {
    "AI review completed.".to_string()
}

fn default_recommendation() -> String {
    "Review the results carefully.".to_string()
}

/// An independent assessment of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiReview {
    /// `validated`, `caution`, or `concern`.
    #[serde(default = "default_verdict")]
    pub verdict: String,
    #[serde(default = "default_score")]
    pub confidence_score: u32,
    #[serde(default = "default_review_summary")]
    pub plain_language_summary: String,
    #[serde(default)]
    pub findings: Vec<ReviewFinding>,
    #[serde(default = "default_recommendation")]
    pub recommendation: String,
}

impl AiReview {
    /// Stand-in used when the reviewer errors or times out.
    pub fn placeholder() -> Self {
        Self {
            verdict: "caution".to_string(),
            confidence_score: 50,
            plain_language_summary: "AI review unavailable. Programmatic validation completed."
                .to_string(),
            findings: Vec::new(),
            recommendation: "Review programmatic findings.".to_string(),
        }
    }
}

/// Everything a reviewer sees about one run.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewRequest {
    pub test_type: String,
    pub configuration: JsonMap,
    pub dataset_profile: Option<DatasetProfile>,
    pub summary: JsonMap,
    pub details: JsonMap,
    pub programmatic_validation: ValidationReport,
}

// ─── Traits ──────────────────────────────────────────────────────────

#[async_trait]
pub trait DatasetRepository: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<DatasetSnapshot>, RepositoryError>;
}

#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn load(&self, id: &str) -> Result<Option<AnalysisRecord>, StoreError>;
    async fn set_status(&self, id: &str, status: AnalysisStatus) -> Result<(), StoreError>;
    async fn save(&self, id: &str, result: SavedResult) -> Result<(), StoreError>;
}

/// Must bound its own work; the engine also applies a timeout.
#[async_trait]
pub trait AiReviewer: Send + Sync {
    async fn review(&self, request: ReviewRequest) -> Result<AiReview, ReviewError>;
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, name: &str, payload: Value) -> Result<(), PublishError>;
}

// ─── In-memory implementations ───────────────────────────────────────

#[derive(Debug, Default)]
pub struct InMemoryDatasets {
    datasets: RwLock<HashMap<String, DatasetSnapshot>>,
}

impl InMemoryDatasets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshots(snapshots: impl IntoIterator<Item = DatasetSnapshot>) -> Self {
        Self {
            datasets: RwLock::new(snapshots.into_iter().map(|s| (s.id.clone(), s)).collect()),
        }
    }

    pub async fn insert(&self, snapshot: DatasetSnapshot) {
        self.datasets.write().await.insert(snapshot.id.clone(), snapshot);
    }
}

#[async_trait]
impl DatasetRepository for InMemoryDatasets {
    async fn get(&self, id: &str) -> Result<Option<DatasetSnapshot>, RepositoryError> {
        Ok(self.datasets.read().await.get(id).cloned())
    }
}

#[derive(Debug, Clone)]
struct StoredAnalysis {
    record: AnalysisRecord,
    saved: Option<SavedResult>,
    transitions: Vec<AnalysisStatus>,
}

/// Result store that keeps every status transition for inspection.
#[derive(Debug, Default)]
pub struct InMemoryResultStore {
    analyses: RwLock<HashMap<String, StoredAnalysis>>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, record: AnalysisRecord) {
        let stored = StoredAnalysis {
            transitions: vec![record.status],
            record,
            saved: None,
        };
        self.analyses
            .write()
            .await
            .insert(stored.record.id.clone(), stored);
    }

    pub async fn record(&self, id: &str) -> Option<AnalysisRecord> {
        self.analyses.read().await.get(id).map(|s| s.record.clone())
    }

    pub async fn saved(&self, id: &str) -> Option<SavedResult> {
        self.analyses.read().await.get(id).and_then(|s| s.saved.clone())
    }

    /// Every status the record has held, oldest first.
    pub async fn transitions(&self, id: &str) -> Vec<AnalysisStatus> {
        self.analyses
            .read()
            .await
            .get(id)
            .map(|s| s.transitions.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn load(&self, id: &str) -> Result<Option<AnalysisRecord>, StoreError> {
        Ok(self.record(id).await)
    }

    async fn set_status(&self, id: &str, status: AnalysisStatus) -> Result<(), StoreError> {
        let mut analyses = self.analyses.write().await;
        let stored = analyses
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        stored.record.status = status;
        stored.transitions.push(status);
        Ok(())
    }

    async fn save(&self, id: &str, result: SavedResult) -> Result<(), StoreError> {
        let mut analyses = self.analyses.write().await;
        let stored = analyses
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        stored.record.status = result.status;
        stored.transitions.push(result.status);
        stored.saved = Some(result);
        Ok(())
    }
}

/// Collects published events in order.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<(String, Value)>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<(String, Value)> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, name: &str, payload: Value) -> Result<(), PublishError> {
        self.events.lock().await.push((name.to_string(), payload));
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(&self, _name: &str, _payload: Value) -> Result<(), PublishError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn review_defaults_fill_missing_fields() {
        let review: AiReview = serde_json::from_value(json!({"verdict": "validated"})).unwrap();
        assert_eq!(review.confidence_score, 50);
        assert_eq!(review.recommendation, "Review the results carefully.");
        assert!(review.findings.is_empty());
    }

    #[test]
    fn document_folds_charts_and_status() {
        let saved = SavedResult {
            status: AnalysisStatus::Completed,
            results: sigmalab_core::result::object(json!({"summary": {"n": 3}})),
            charts: Some(json!({"charts": []})),
            duration_ms: Some(12),
            run_at: None,
        };
        let doc = saved.to_document();
        assert_eq!(doc["status"], "completed");
        assert_eq!(doc["charts"], json!({"charts": []}));
        assert_eq!(doc["summary"]["n"], 3);
        assert!(doc.get("run_at").is_none());
    }

    #[tokio::test]
    async fn store_tracks_transitions() {
        let store = InMemoryResultStore::new();
        store
            .insert(AnalysisRecord::pending("a1", "c_chart", JsonMap::new()))
            .await;
        store.set_status("a1", AnalysisStatus::Running).await.unwrap();
        store
            .save(
                "a1",
                SavedResult {
                    status: AnalysisStatus::Failed,
                    results: JsonMap::new(),
                    charts: None,
                    duration_ms: None,
                    run_at: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(
            store.transitions("a1").await,
            vec![AnalysisStatus::Pending, AnalysisStatus::Running, AnalysisStatus::Failed]
        );
        assert!(matches!(
            store.set_status("missing", AnalysisStatus::Running).await,
            Err(StoreError::NotFound(_))
        ));
    }
}
