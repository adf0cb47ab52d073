pub mod adapter;
pub mod error;
pub mod exec;
pub mod profile;
pub mod quirks;
pub mod template;

pub use adapter::*;
pub use error::BuildError;
pub use exec::{run_argv, ExecResult};
pub use profile::*;
pub use quirks::*;
pub use template::*;
pub use tests::{parse_counts, run_tests, select_tests, selected_test_passed, TestCounts, TestOutcome, TestReport, TestSelection};
