//! SigmaLab Runner: async orchestration around `sigmalab-core`.
//!
//! This crate builds on `sigmalab-core` to provide:
//! - The execution engine (load, reconstruct, run, validate, review, persist, publish)
//! - Collaborator traits and in-memory implementations
//! - Dataset reconstruction with file-first, preview-fallback semantics
//! - An HTTP AI reviewer
//! - TOML engine configuration and logging setup

pub mod collaborators;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod logging;
pub mod review;

pub use collaborators::{
    AiReview, AiReviewer, AnalysisRecord, AnalysisStatus, DatasetRepository, DatasetSnapshot,
    EventPublisher, InMemoryDatasets, InMemoryResultStore, NoopPublisher, PublishError,
    RecordingPublisher, RepositoryError, ResultStore, ReviewError, ReviewFinding, ReviewRequest,
    SavedResult, StoreError,
};
pub use config::{ConfigError, EngineConfig, LoggingConfig};
pub use dataset::{reconstruct_table, Reconstructed, TableSource};
pub use engine::{EngineError, ExecutionEngine, ANALYSIS_COMPLETED};
pub use logging::init_logging;
pub use review::HttpAiReviewer;
pub use sigmalab_core::run_test;
