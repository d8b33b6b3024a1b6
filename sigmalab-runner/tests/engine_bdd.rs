//! BDD scenarios for the execution engine pipeline.
//!
//! Each scenario wires the engine to in-memory collaborators and checks
//! the persisted record, the status transitions, and the emitted events.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use sigmalab_core::{dist, AnalysisResult, DataTable, JsonMap, Registry, TestImplementation, TestKind};
use sigmalab_runner::{
    AiReview, AiReviewer, AnalysisRecord, AnalysisStatus, DatasetSnapshot, EngineConfig,
    EngineError, EventPublisher, ExecutionEngine, InMemoryDatasets, InMemoryResultStore,
    PublishError, RecordingPublisher, ReviewError, ReviewRequest, ANALYSIS_COMPLETED,
};
use tempfile::NamedTempFile;

// ── Fixtures ─────────────────────────────────────────────────────────

fn config(v: Value) -> JsonMap {
    match v {
        Value::Object(map) => map,
        _ => JsonMap::new(),
    }
}

/// Two groups of 30 with equal spread and shifted means, as CSV.
fn two_group_csv() -> String {
    let mut csv = String::from("wait_time,shift\n");
    for (shift, mean) in [("day", 20.0), ("night", 23.0)] {
        for i in 0..30 {
            let z = dist::normal_ppf((i as f64 + 0.5) / 30.0);
            csv.push_str(&format!("{:.6},{shift}\n", mean + 2.0 * z));
        }
    }
    csv
}

fn csv_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn preview_rows(n: usize) -> Vec<JsonMap> {
    (0..n)
        .map(|i| {
            config(json!({
                "wait_time": 20.0 + (i % 7) as f64,
                "shift": if i % 2 == 0 { "day" } else { "night" },
            }))
        })
        .collect()
}

fn snapshot(file: Option<PathBuf>, preview: Option<Vec<JsonMap>>, row_count: usize) -> DatasetSnapshot {
    DatasetSnapshot {
        id: "ds-1".into(),
        columns: Vec::new(),
        row_count,
        file_reference: file,
        preview_rows: preview,
    }
}

fn t_test_record(id: &str) -> AnalysisRecord {
    AnalysisRecord::pending(
        id,
        "two_sample_t",
        config(json!({"y_column": "wait_time", "x_column": "shift"})),
    )
    .with_dataset("ds-1")
    .with_initiative("init-9")
}

struct Harness {
    engine: ExecutionEngine,
    store: Arc<InMemoryResultStore>,
    events: Arc<RecordingPublisher>,
}

async fn harness(
    registry: Registry,
    snapshot: Option<DatasetSnapshot>,
    records: Vec<AnalysisRecord>,
    engine_config: EngineConfig,
) -> Harness {
    let datasets = Arc::new(InMemoryDatasets::from_snapshots(snapshot));
    let store = Arc::new(InMemoryResultStore::new());
    for record in records {
        store.insert(record).await;
    }
    let events = Arc::new(RecordingPublisher::new());
    let engine = ExecutionEngine::new(
        Arc::new(registry),
        datasets,
        store.clone(),
        events.clone(),
        engine_config,
    );
    Harness { engine, store, events }
}

fn review_enabled(timeout_ms: u64) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.ai_review.enabled = true;
    config.ai_review.timeout_ms = timeout_ms;
    config
}

// ── Test doubles ─────────────────────────────────────────────────────

struct FixedReviewer(AiReview);

#[async_trait]
impl AiReviewer for FixedReviewer {
    async fn review(&self, _request: ReviewRequest) -> Result<AiReview, ReviewError> {
        Ok(self.0.clone())
    }
}

struct SlowReviewer;

#[async_trait]
impl AiReviewer for SlowReviewer {
    async fn review(&self, _request: ReviewRequest) -> Result<AiReview, ReviewError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(AiReview::placeholder())
    }
}

struct BrokenReviewer;

#[async_trait]
impl AiReviewer for BrokenReviewer {
    async fn review(&self, _request: ReviewRequest) -> Result<AiReview, ReviewError> {
        Err(ReviewError::Unavailable("model offline".into()))
    }
}

struct ClosedBus;

#[async_trait]
impl EventPublisher for ClosedBus {
    async fn publish(&self, _name: &str, _payload: Value) -> Result<(), PublishError> {
        Err(PublishError::Closed)
    }
}

struct ExplodingTest;

impl TestImplementation for ExplodingTest {
    fn kind(&self) -> TestKind {
        TestKind::CChart
    }

    fn run(&self, _table: &DataTable, _config: &JsonMap) -> AnalysisResult {
        panic!("division by zero in control limits")
    }
}

// ── Scenarios ────────────────────────────────────────────────────────

#[tokio::test]
async fn bdd_scenario_completed_run_is_persisted_validated_and_announced() {
    // GIVEN a two-group dataset stored as a CSV file
    let file = csv_file(&two_group_csv());
    let snap = snapshot(Some(file.path().to_path_buf()), Some(preview_rows(5)), 60);
    let h = harness(Registry::standard(), Some(snap), vec![t_test_record("a-1")], EngineConfig::default()).await;

    // WHEN the analysis executes
    let result = h.engine.execute_analysis("a-1").await.unwrap();

    // THEN the test succeeded on the full file, not the preview
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.summary["group_1_n"], 30);
    assert!(result.warnings.iter().all(|w| !w.contains("preview")));

    // AND the record moved pending -> running -> completed
    assert_eq!(
        h.store.transitions("a-1").await,
        vec![AnalysisStatus::Pending, AnalysisStatus::Running, AnalysisStatus::Completed]
    );

    // AND the persisted shape carries results, charts and validation
    let saved = h.store.saved("a-1").await.unwrap();
    for key in ["summary", "details", "warnings", "interpretation_context", "validation"] {
        assert!(saved.results.contains_key(key), "missing {key}");
    }
    assert!(saved.charts.as_ref().unwrap()["charts"].as_array().is_some_and(|c| !c.is_empty()));
    assert!(saved.duration_ms.is_some());
    assert!(saved.run_at.is_some());
    let hash = saved.results["details"]["dataset_hash"].as_str().unwrap();
    assert_eq!(hash.len(), 64);
    let validation = &saved.results["validation"];
    assert_eq!(validation["overall_verdict"], "validated");
    assert_eq!(validation["programmatic"]["passed"], true);
    assert!(validation.get("ai_review").is_none());

    // AND a completion event names the analysis
    let events = h.events.events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, ANALYSIS_COMPLETED);
    assert_eq!(
        events[0].1,
        json!({"analysis_id": "a-1", "initiative_id": "init-9", "test_type": "two_sample_t"})
    );
}

#[tokio::test]
async fn bdd_scenario_unknown_test_type_fails_and_lists_available_tests() {
    // GIVEN a record whose test type does not exist
    let record = AnalysisRecord::pending("a-2", "three_sample_t", JsonMap::new());
    let h = harness(Registry::standard(), None, vec![record], EngineConfig::default()).await;

    // WHEN the analysis executes
    let err = h.engine.execute_analysis("a-2").await.unwrap_err();

    // THEN a distinct unknown-test error lists every registered type
    let unknown = match err {
        EngineError::UnknownTest(unknown) => unknown,
        other => panic!("expected UnknownTest, got {other:?}"),
    };
    assert_eq!(unknown.requested, "three_sample_t");
    assert_eq!(unknown.available.len(), 28);

    // AND the record is failed with the list persisted, never running
    let saved = h.store.saved("a-2").await.unwrap();
    assert_eq!(saved.status, AnalysisStatus::Failed);
    assert_eq!(saved.results["available_tests"].as_array().unwrap().len(), 28);
    assert_eq!(
        h.store.transitions("a-2").await,
        vec![AnalysisStatus::Pending, AnalysisStatus::Failed]
    );
    assert!(h.events.events().await.is_empty());
}

#[tokio::test]
async fn bdd_scenario_missing_record_is_not_found() {
    let h = harness(Registry::standard(), None, Vec::new(), EngineConfig::default()).await;
    let err = h.engine.execute_analysis("ghost").await.unwrap_err();
    assert!(matches!(err, EngineError::AnalysisNotFound(id) if id == "ghost"));
}

#[tokio::test]
async fn bdd_scenario_preview_fallback_is_surfaced_as_a_warning() {
    // GIVEN a dataset whose file is gone, leaving 40 preview rows of 500
    let snap = snapshot(Some(PathBuf::from("/nonexistent/upload.csv")), Some(preview_rows(40)), 500);
    let h = harness(Registry::standard(), Some(snap), vec![t_test_record("a-3")], EngineConfig::default()).await;

    // WHEN the analysis executes
    let result = h.engine.execute_analysis("a-3").await.unwrap();

    // THEN the truncation is reported on the result and in the record
    let expected = "Analysis ran on a preview sample of 40 of 500 rows";
    assert!(result.warnings.iter().any(|w| w == expected));
    let saved = h.store.saved("a-3").await.unwrap();
    assert!(saved.results["warnings"]
        .as_array()
        .unwrap()
        .iter()
        .any(|w| w == expected));
}

#[tokio::test]
async fn bdd_scenario_configuration_failure_is_a_failed_record_not_an_error() {
    // GIVEN a record missing its grouping column
    let record = AnalysisRecord::pending("a-4", "two_sample_t", config(json!({"y_column": "wait_time"})))
        .with_dataset("ds-1");
    let snap = snapshot(None, Some(preview_rows(20)), 20);
    let h = harness(Registry::standard(), Some(snap), vec![record], EngineConfig::default()).await;

    // WHEN the analysis executes
    let result = h.engine.execute_analysis("a-4").await.unwrap();

    // THEN the run failed with the missing key named, and validation agrees
    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("x_column"));
    let saved = h.store.saved("a-4").await.unwrap();
    assert_eq!(saved.status, AnalysisStatus::Failed);
    assert_eq!(saved.results["validation"]["overall_verdict"], "concern");
    assert_eq!(saved.results["validation"]["overall_confidence"], "low");
    assert!(saved.results["error"].as_str().unwrap().contains("x_column"));
}

#[tokio::test]
async fn bdd_scenario_panicking_test_becomes_a_failed_run() {
    // GIVEN a registry whose only test panics
    let registry = Registry::empty().with(Box::new(ExplodingTest));
    let record = AnalysisRecord::pending("a-5", "c_chart", config(json!({"column": "x"})));
    let h = harness(registry, None, vec![record], EngineConfig::default()).await;

    // WHEN the analysis executes
    let result = h.engine.execute_analysis("a-5").await.unwrap();

    // THEN the caller gets a failed result with a readable error
    assert!(!result.success);
    assert_eq!(
        result.error.as_deref(),
        Some("Computation failed: division by zero in control limits")
    );
    assert_eq!(result.test_category, "spc");

    // AND the record ends failed, with the event still published
    assert_eq!(
        h.store.transitions("a-5").await.last(),
        Some(&AnalysisStatus::Failed)
    );
    assert_eq!(h.events.events().await.len(), 1);
}

#[tokio::test]
async fn bdd_scenario_ai_verdict_wins_when_programmatic_checks_pass() {
    // GIVEN a clean dataset and a reviewer with reservations
    let file = csv_file(&two_group_csv());
    let snap = snapshot(Some(file.path().to_path_buf()), None, 60);
    let h = harness(Registry::standard(), Some(snap), vec![t_test_record("a-6")], review_enabled(5_000)).await;
    let review = AiReview {
        verdict: "caution".into(),
        confidence_score: 62,
        plain_language_summary: "Groups differ; check sampling.".into(),
        findings: Vec::new(),
        recommendation: "Confirm shifts were sampled alike.".into(),
    };
    let engine = h.engine.with_reviewer(Arc::new(FixedReviewer(review)));

    // WHEN the analysis executes
    engine.execute_analysis("a-6").await.unwrap();

    // THEN the overall verdict and confidence follow the reviewer
    let saved = h.store.saved("a-6").await.unwrap();
    let validation = &saved.results["validation"];
    assert_eq!(validation["programmatic"]["passed"], true);
    assert_eq!(validation["overall_verdict"], "caution");
    assert_eq!(validation["overall_confidence"], "medium");
    assert_eq!(validation["ai_review"]["confidence_score"], 62);
}

#[tokio::test]
async fn bdd_scenario_slow_or_broken_reviewer_degrades_to_placeholder() {
    for (id, reviewer) in [
        ("a-7", Arc::new(SlowReviewer) as Arc<dyn AiReviewer>),
        ("a-8", Arc::new(BrokenReviewer) as Arc<dyn AiReviewer>),
    ] {
        // GIVEN a reviewer that never answers in time, or errors
        let file = csv_file(&two_group_csv());
        let snap = snapshot(Some(file.path().to_path_buf()), None, 60);
        let h = harness(Registry::standard(), Some(snap), vec![t_test_record(id)], review_enabled(50)).await;
        let engine = h.engine.with_reviewer(reviewer);

        // WHEN the analysis executes
        let started = std::time::Instant::now();
        let result = engine.execute_analysis(id).await.unwrap();

        // THEN the run completes promptly with the placeholder review
        assert!(result.success);
        assert!(started.elapsed() < Duration::from_secs(10));
        let saved = h.store.saved(id).await.unwrap();
        let review = &saved.results["validation"]["ai_review"];
        assert_eq!(review["verdict"], "caution");
        assert_eq!(review["confidence_score"], 50);
        assert_eq!(
            review["plain_language_summary"],
            "AI review unavailable. Programmatic validation completed."
        );
        assert_eq!(review["recommendation"], "Review programmatic findings.");
        assert_eq!(saved.results["validation"]["overall_confidence"], "medium");
    }
}

#[tokio::test]
async fn bdd_scenario_publish_failure_is_swallowed() {
    // GIVEN an event bus that rejects everything
    let snap = snapshot(None, Some(preview_rows(20)), 20);
    let datasets = Arc::new(InMemoryDatasets::from_snapshots([snap]));
    let store = Arc::new(InMemoryResultStore::new());
    store.insert(t_test_record("a-9")).await;
    let engine = ExecutionEngine::new(
        Arc::new(Registry::standard()),
        datasets,
        store.clone(),
        Arc::new(ClosedBus),
        EngineConfig::default(),
    );

    // WHEN the analysis executes
    let result = engine.execute_analysis("a-9").await;

    // THEN the run still completes and is persisted
    assert!(result.unwrap().success);
    assert_eq!(
        store.record("a-9").await.unwrap().status,
        AnalysisStatus::Completed
    );
}

#[tokio::test]
async fn bdd_scenario_many_analyses_run_concurrently_and_independently() {
    // GIVEN three analyses, one of them unknown
    let snap = snapshot(None, Some(preview_rows(30)), 30);
    let records = vec![
        t_test_record("m-1"),
        AnalysisRecord::pending("m-2", "descriptive_summary", JsonMap::new()).with_dataset("ds-1"),
        AnalysisRecord::pending("m-3", "nope", JsonMap::new()),
    ];
    let h = harness(Registry::standard(), Some(snap), records, EngineConfig::default()).await;

    // WHEN executed together
    let ids: Vec<String> = ["m-1", "m-2", "m-3"].iter().map(|s| s.to_string()).collect();
    let outcomes = h.engine.execute_many(&ids).await;

    // THEN each outcome stands alone, in input order
    assert!(outcomes[0].as_ref().unwrap().success);
    assert_eq!(outcomes[1].as_ref().unwrap().test_type, "descriptive_summary");
    assert!(matches!(outcomes[2], Err(EngineError::UnknownTest(_))));
    assert_eq!(h.events.events().await.len(), 2);
}
