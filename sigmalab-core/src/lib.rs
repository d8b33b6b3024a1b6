//! SigmaLab Core: tabular data, statistical tests, chart specs, validation.
//!
//! This crate is the pure, synchronous half of the engine:
//! - Tabular data model with CSV and JSON-row loading
//! - Distribution functions, hypothesis tests, and linear-model kernels
//! - 28 test implementations across descriptive, comparison, regression,
//!   SPC, capability/MSA, and DOE families
//! - Declarative chart specifications
//! - Static test catalog and the immutable test registry
//! - Three-layer programmatic validation
//!
//! Nothing here performs I/O beyond reading the table handed in, and no
//! test mutates its input.

pub mod analysis;
pub mod catalog;
pub mod charts;
pub mod dist;
pub mod htest;
pub mod kind;
pub mod linalg;
pub mod linear_model;
pub mod registry;
pub mod result;
pub mod sample;
pub mod table;
pub mod validation;

pub use analysis::TestImplementation;
pub use catalog::{
    applicable, available_tests, categories, entry as catalog_entry, test_info, DatasetProfile,
    TestRequirement,
};
pub use charts::ChartSpec;
pub use kind::{TestCategory, TestKind, UnknownTestError};
pub use registry::{run_test, Registry};
pub use result::{AnalysisResult, JsonMap, TestError};
pub use table::{Column, DataTable, TableError, Value};
pub use validation::{
    run_full_validation, Confidence, Severity, ValidationFinding, ValidationReport,
};
