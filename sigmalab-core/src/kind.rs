//! Closed set of test kinds and their families.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Requested test type is not registered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown test type: '{requested}'")]
pub struct UnknownTestError {
    pub requested: String,
    pub available: Vec<String>,
}

/// Family a test belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestCategory {
    Descriptive,
    Comparison,
    Correlation,
    Regression,
    Spc,
    Capability,
    Doe,
}

impl TestCategory {
    pub const fn as_str(self) -> &'static str {
        match self {
            TestCategory::Descriptive => "descriptive",
            TestCategory::Comparison => "comparison",
            TestCategory::Correlation => "correlation",
            TestCategory::Regression => "regression",
            TestCategory::Spc => "spc",
            TestCategory::Capability => "capability",
            TestCategory::Doe => "doe",
        }
    }
}

impl fmt::Display for TestCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

macro_rules! test_kinds {
    ($( $variant:ident => $name:literal, $cat:ident; )*) => {
        /// Every statistical test the engine knows how to run.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum TestKind {
            $( $variant, )*
        }

        impl TestKind {
            /// All kinds, in catalog order.
            pub const ALL: &'static [TestKind] = &[ $( TestKind::$variant, )* ];

            /// Wire name (`two_sample_t`, `i_mr_chart`, ...).
            pub const fn as_str(self) -> &'static str {
                match self {
                    $( TestKind::$variant => $name, )*
                }
            }

            pub const fn category(self) -> TestCategory {
                match self {
                    $( TestKind::$variant => TestCategory::$cat, )*
                }
            }

            /// Parse an externally sourced test type.
            pub fn parse(raw: &str) -> Result<Self, UnknownTestError> {
                match raw {
                    $( $name => Ok(TestKind::$variant), )*
                    other => Err(UnknownTestError {
                        requested: other.to_string(),
                        available: Self::names(),
                    }),
                }
            }
        }
    };
}

test_kinds! {
    DescriptiveSummary => "descriptive_summary", Descriptive;
    NormalityTest => "normality_test", Descriptive;
    ParetoAnalysis => "pareto_analysis", Descriptive;
    OneSampleT => "one_sample_t", Comparison;
    TwoSampleT => "two_sample_t", Comparison;
    PairedT => "paired_t", Comparison;
    OneWayAnova => "one_way_anova", Comparison;
    TwoWayAnova => "two_way_anova", Comparison;
    MannWhitney => "mann_whitney", Comparison;
    KruskalWallis => "kruskal_wallis", Comparison;
    ChiSquareAssociation => "chi_square_association", Comparison;
    ChiSquareGoodness => "chi_square_goodness", Comparison;
    Correlation => "correlation", Correlation;
    SimpleRegression => "simple_regression", Regression;
    MultipleRegression => "multiple_regression", Regression;
    LogisticRegression => "logistic_regression", Regression;
    IMrChart => "i_mr_chart", Spc;
    XbarRChart => "xbar_r_chart", Spc;
    PChart => "p_chart", Spc;
    NpChart => "np_chart", Spc;
    CChart => "c_chart", Spc;
    UChart => "u_chart", Spc;
    CapabilityNormal => "capability_normal", Capability;
    CapabilityNonnormal => "capability_nonnormal", Capability;
    MsaGageRr => "msa_gage_rr", Capability;
    FullFactorial => "full_factorial", Doe;
    FractionalFactorial => "fractional_factorial", Doe;
    DoeAnalysis => "doe_analysis", Doe;
}

impl TestKind {
    pub fn names() -> Vec<String> {
        Self::ALL.iter().map(|k| k.as_str().to_string()).collect()
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TestKind {
    type Err = UnknownTestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TestKind::parse(s)
    }
}
