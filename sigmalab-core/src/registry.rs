//! Immutable `TestKind -> implementation` lookup.
//!
//! [`Registry::standard`] registers every built-in test once; the registry
//! is then shared read-only (typically behind an `Arc`) by whoever runs
//! tests. Unknown or unregistered types are a typed absence, never a panic.

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Instant;

use serde_json::Value;

use crate::analysis::{capability, comparison, descriptive, doe, regression, spc};
use crate::analysis::{TestImplementation, TypedTest};
use crate::kind::{TestCategory, TestKind, UnknownTestError};
use crate::result::{AnalysisResult, JsonMap};
use crate::table::DataTable;

// ─── Factory ─────────────────────────────────────────────────────────

/// Built-in implementation for a kind.
pub fn create_test(kind: TestKind) -> Box<dyn TestImplementation> {
    use TestKind as K;
    match kind {
        K::DescriptiveSummary => Box::new(TypedTest::new(kind, descriptive::descriptive_summary)),
        K::NormalityTest => Box::new(TypedTest::new(kind, descriptive::normality_test)),
        K::ParetoAnalysis => Box::new(TypedTest::new(kind, descriptive::pareto_analysis)),
        K::OneSampleT => Box::new(TypedTest::new(kind, comparison::one_sample_t)),
        K::TwoSampleT => Box::new(TypedTest::new(kind, comparison::two_sample_t)),
        K::PairedT => Box::new(TypedTest::new(kind, comparison::paired_t)),
        K::OneWayAnova => Box::new(TypedTest::new(kind, comparison::one_way_anova)),
        K::TwoWayAnova => Box::new(TypedTest::new(kind, comparison::two_way_anova)),
        K::MannWhitney => Box::new(TypedTest::new(kind, comparison::mann_whitney)),
        K::KruskalWallis => Box::new(TypedTest::new(kind, comparison::kruskal_wallis)),
        K::ChiSquareAssociation => {
            Box::new(TypedTest::new(kind, comparison::chi_square_association))
        }
        K::ChiSquareGoodness => Box::new(TypedTest::new(kind, comparison::chi_square_goodness)),
        K::Correlation => Box::new(TypedTest::new(kind, regression::correlation)),
        K::SimpleRegression => Box::new(TypedTest::new(kind, regression::simple_regression)),
        K::MultipleRegression => Box::new(TypedTest::new(kind, regression::multiple_regression)),
        K::LogisticRegression => Box::new(TypedTest::new(kind, regression::logistic_regression)),
        K::IMrChart => Box::new(TypedTest::new(kind, spc::i_mr_chart)),
        K::XbarRChart => Box::new(TypedTest::new(kind, spc::xbar_r_chart)),
        K::PChart => Box::new(TypedTest::new(kind, spc::p_chart)),
        K::NpChart => Box::new(TypedTest::new(kind, spc::np_chart)),
        K::CChart => Box::new(TypedTest::new(kind, spc::c_chart)),
        K::UChart => Box::new(TypedTest::new(kind, spc::u_chart)),
        K::CapabilityNormal => Box::new(TypedTest::new(kind, capability::capability_normal)),
        K::CapabilityNonnormal => Box::new(TypedTest::new(kind, capability::capability_nonnormal)),
        K::MsaGageRr => Box::new(TypedTest::new(kind, capability::msa_gage_rr)),
        K::FullFactorial => Box::new(TypedTest::new(kind, doe::full_factorial)),
        K::FractionalFactorial => Box::new(TypedTest::new(kind, doe::fractional_factorial)),
        K::DoeAnalysis => Box::new(TypedTest::new(kind, doe::doe_analysis)),
    }
}

// ─── Registry ────────────────────────────────────────────────────────

pub struct Registry {
    tests: HashMap<TestKind, Box<dyn TestImplementation>>,
}

impl Registry {
    pub fn empty() -> Self {
        Self {
            tests: HashMap::new(),
        }
    }

    /// Every built-in test.
    pub fn standard() -> Self {
        TestKind::ALL
            .iter()
            .fold(Self::empty(), |reg, &kind| reg.with(create_test(kind)))
    }

    /// Add or replace the implementation for its kind.
    pub fn with(mut self, test: Box<dyn TestImplementation>) -> Self {
        self.tests.insert(test.kind(), test);
        self
    }

    pub fn has(&self, kind: TestKind) -> bool {
        self.tests.contains_key(&kind)
    }

    /// Registered kinds in catalog order.
    pub fn kinds(&self) -> Vec<TestKind> {
        TestKind::ALL
            .iter()
            .copied()
            .filter(|k| self.has(*k))
            .collect()
    }

    fn unknown(&self, requested: &str) -> UnknownTestError {
        UnknownTestError {
            requested: requested.to_string(),
            available: self.kinds().iter().map(|k| k.as_str().to_string()).collect(),
        }
    }

    /// Implementation and category for an externally sourced test type.
    pub fn lookup(
        &self,
        test_type: &str,
    ) -> Result<(&dyn TestImplementation, TestCategory), UnknownTestError> {
        let kind = TestKind::parse(test_type).map_err(|_| self.unknown(test_type))?;
        self.tests
            .get(&kind)
            .map(|t| (t.as_ref(), kind.category()))
            .ok_or_else(|| self.unknown(test_type))
    }

    /// Run one test and stamp its duration. Unknown types produce a failed
    /// result listing the registered types.
    pub fn run_test(&self, test_type: &str, table: &DataTable, config: &JsonMap) -> AnalysisResult {
        let (test, _) = match self.lookup(test_type) {
            Ok(found) => found,
            Err(e) => return unknown_test_result(&e),
        };
        let start = Instant::now();
        let result = test.run(table, config);
        result.with_duration(start.elapsed().as_millis() as u64)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("tests", &self.kinds())
            .finish()
    }
}

/// Failed result for a type outside the registry.
pub fn unknown_test_result(error: &UnknownTestError) -> AnalysisResult {
    let mut r = AnalysisResult::failed_with(&error.requested, "unknown", error.to_string());
    r.details.insert(
        "available_tests".into(),
        Value::from(error.available.clone()),
    );
    r.warnings
        .push(format!("Test type '{}' is not registered", error.requested));
    r
}

/// Run a test against the shared standard registry.
pub fn run_test(test_type: &str, table: &DataTable, config: &JsonMap) -> AnalysisResult {
    static STANDARD: OnceLock<Registry> = OnceLock::new();
    STANDARD
        .get_or_init(Registry::standard)
        .run_test(test_type, table, config)
}
