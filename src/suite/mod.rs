//! Named end-to-end test cases against the deployed sample apps
//!
//! Cases are grouped in suites that share one fixture. A failing case is reported and the
//! remaining cases still run; the caller decides the exit code from the [`Report`].

pub mod app;
pub mod cf;
pub mod kyma;
mod runner;

pub use app::{BoundServices, SampleApp};
pub use cf::{CfContext, CfFixture, CfSuite};
pub use kyma::KymaFixture;
pub use runner::{CaseFn, CaseResult, Outcome, Report, Suite, TestCase, assert_status};
