pub mod outcome;
pub mod report;

pub use outcome::{Payload, RunOutcome, RunVerdict};
pub use report::{GLOBAL_FAILURE, GLOBAL_MODULE, ModuleResults, SuiteReport, TestOutcome};
