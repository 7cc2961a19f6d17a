use serde_json::Value;
use tracing::debug;

use crate::models::{GLOBAL_FAILURE, GLOBAL_MODULE, SuiteReport, TestOutcome};
use crate::protocol::{LogRecord, WireMessage, normalize_pair};

/// What the supervisor should do after a message has been folded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Continue,
    /// `done`, or a record named `global failure`.
    Complete,
    /// The aggregator was already sealed; nothing was recorded.
    Rejected,
}

/// Folds wire messages into a [`SuiteReport`], numbering outcomes as they arrive.
#[derive(Debug)]
pub struct Aggregator {
    report: SuiteReport,
    next_test_number: u32,
    any_failure: bool,
    completed: bool,
    sealed: bool,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl Aggregator {
    pub fn new() -> Self {
        Self {
            report: SuiteReport::new(),
            next_test_number: 1,
            any_failure: false,
            completed: false,
            sealed: false,
        }
    }

    pub fn ingest(&mut self, message: WireMessage) -> Progress {
        if self.sealed {
            debug!("aggregator sealed, dropping message");
            return Progress::Rejected;
        }

        match message {
            WireMessage::Log { result } => {
                let global_failure = result.name == GLOBAL_FAILURE;
                self.record(result);
                if global_failure {
                    self.completed = true;
                    Progress::Complete
                } else {
                    Progress::Continue
                }
            }
            WireMessage::Done => {
                self.completed = true;
                Progress::Complete
            }
        }
    }

    fn record(&mut self, record: LogRecord) {
        let module = record.module.as_deref().unwrap_or(GLOBAL_MODULE);
        let (expected, actual) = normalize_pair(record.expected, record.actual);
        let failure = !record.result;
        let test_number = self.take_number();

        debug!(module, test = %record.name, test_number, failure, "recorded outcome");

        self.any_failure |= failure;
        self.report
            .outcomes_mut(module, &record.name)
            .push(TestOutcome {
                test_number,
                message: record.message,
                expected,
                actual,
                source: record.source,
                failure,
            });
    }

    /// Append a driver-generated failure under `global` / `global failure`.
    pub fn record_global_failure(&mut self, message: String, source: String) {
        if self.sealed {
            return;
        }
        let test_number = self.take_number();
        self.any_failure = true;
        self.report
            .outcomes_mut(GLOBAL_MODULE, GLOBAL_FAILURE)
            .push(synthetic(test_number, message, source));
    }

    /// Discard everything collected so far and keep only this failure.
    pub fn replace_with_failure(&mut self, message: String, source: String) {
        if self.sealed {
            return;
        }
        let discarded = self.report.len();
        if discarded > 0 {
            debug!(discarded, "discarding partial results");
        }
        self.report.clear();
        self.next_test_number = 1;
        self.record_global_failure(message, source);
    }

    pub fn any_failure(&self) -> bool {
        self.any_failure
    }

    pub fn is_complete(&self) -> bool {
        self.completed
    }

    pub fn report(&self) -> &SuiteReport {
        &self.report
    }

    /// Stop accepting writes and hand over the report.
    pub fn seal(&mut self) -> SuiteReport {
        self.sealed = true;
        std::mem::take(&mut self.report)
    }

    fn take_number(&mut self) -> u32 {
        let n = self.next_test_number;
        self.next_test_number += 1;
        n
    }
}

fn synthetic(test_number: u32, message: String, source: String) -> TestOutcome {
    TestOutcome {
        test_number,
        message: Some(Some(message)),
        expected: Some(Value::Null),
        actual: Some(Value::Null),
        source: Some(Some(source)),
        failure: true,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::protocol::parse;

    fn log(module: Option<&str>, name: &str, ok: bool) -> WireMessage {
        WireMessage::Log {
            result: LogRecord {
                module: module.map(str::to_string),
                name: name.to_string(),
                result: ok,
                message: Some(Some(format!("{name} holds"))),
                expected: None,
                actual: None,
                source: Some(Some("    at tests.js:1\n".into())),
            },
        }
    }

    #[test]
    fn two_modules_with_one_failure() {
        let mut agg = Aggregator::new();
        assert_eq!(agg.ingest(log(Some("ModuleOne"), "first", true)), Progress::Continue);
        assert_eq!(agg.ingest(log(Some("ModuleOne"), "first", true)), Progress::Continue);
        assert_eq!(agg.ingest(log(Some("ModuleTwo"), "second", false)), Progress::Continue);
        assert_eq!(agg.ingest(WireMessage::Done), Progress::Complete);

        assert!(agg.any_failure());
        assert!(agg.is_complete());

        let report = agg.seal();
        let one = report.outcomes("ModuleOne", "first").unwrap();
        assert_eq!(one.len(), 2);
        assert!(one.iter().all(|o| !o.failure));
        let two = report.outcomes("ModuleTwo", "second").unwrap();
        assert_eq!(two.len(), 1);
        assert!(two[0].failure);

        let numbers: Vec<u32> = report.iter().map(|(_, _, o)| o.test_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn numbering_follows_arrival_across_buckets() {
        let mut agg = Aggregator::new();
        agg.ingest(log(Some("A"), "x", true));
        agg.ingest(log(Some("B"), "y", true));
        agg.ingest(log(Some("A"), "x", true));

        let report = agg.report();
        let x: Vec<u32> = report
            .outcomes("A", "x")
            .unwrap()
            .iter()
            .map(|o| o.test_number)
            .collect();
        assert_eq!(x, vec![1, 3]);
        assert_eq!(report.outcomes("B", "y").unwrap()[0].test_number, 2);
        assert!(!agg.any_failure());
    }

    #[test]
    fn missing_module_defaults_to_global() {
        let mut agg = Aggregator::new();
        agg.ingest(log(None, "loose", true));
        assert!(agg.report().outcomes(GLOBAL_MODULE, "loose").is_some());
    }

    #[test]
    fn global_failure_completes_without_discarding() {
        let mut agg = Aggregator::new();
        agg.ingest(log(Some("M"), "t", true));
        let progress = agg.ingest(log(None, GLOBAL_FAILURE, false));

        assert_eq!(progress, Progress::Complete);
        assert!(agg.is_complete());
        assert!(agg.any_failure());
        assert_eq!(agg.report().len(), 2);
    }

    #[test]
    fn object_pairs_are_stored_as_json_text() {
        let mut agg = Aggregator::new();
        let msg = parse(
            r#"__qUnitTestDriver__:{"type":"log","result":{"module":"M","name":"deep","result":false,"expected":{"a":1},"actual":{"a":2}}}"#,
        )
        .unwrap()
        .unwrap();
        agg.ingest(msg);

        let outcome = &agg.report().outcomes("M", "deep").unwrap()[0];
        assert_eq!(outcome.expected, Some(json!("{\"a\":1}")));
        assert_eq!(outcome.actual, Some(json!("{\"a\":2}")));
    }

    #[test]
    fn restringified_values_are_not_encoded_twice() {
        let mut agg = Aggregator::new();
        let first = WireMessage::Log {
            result: LogRecord {
                module: None,
                name: "deep".into(),
                result: true,
                message: None,
                expected: Some(json!({"a": 1})),
                actual: Some(json!({"a": 1})),
                source: None,
            },
        };
        agg.ingest(first);
        let stored = agg.report().outcomes(GLOBAL_MODULE, "deep").unwrap()[0].clone();

        agg.ingest(WireMessage::Log {
            result: LogRecord {
                module: None,
                name: "deep".into(),
                result: true,
                message: None,
                expected: stored.expected.clone(),
                actual: stored.actual.clone(),
                source: None,
            },
        });
        let again = &agg.report().outcomes(GLOBAL_MODULE, "deep").unwrap()[1];
        assert_eq!(again.expected, stored.expected);
        assert_eq!(again.actual, stored.actual);
    }

    #[test]
    fn replace_discards_partial_results() {
        let mut agg = Aggregator::new();
        agg.ingest(log(Some("M"), "a", true));
        agg.ingest(log(Some("M"), "b", true));
        agg.ingest(log(None, "c", true));

        agg.replace_with_failure("ReferenceError: x is not defined".into(), "    at app.js:3\n".into());

        let report = agg.seal();
        assert_eq!(report.modules().len(), 1);
        let global = report.outcomes(GLOBAL_MODULE, GLOBAL_FAILURE).unwrap();
        assert_eq!(global.len(), 1);
        assert_eq!(global[0].test_number, 1);
        assert!(global[0].failure);
        assert_eq!(global[0].expected, Some(Value::Null));
    }

    #[test]
    fn global_failure_is_appended_after_existing_results() {
        let mut agg = Aggregator::new();
        agg.ingest(log(Some("M"), "a", true));
        agg.record_global_failure("page.html timed out.".into(), "    at page.html".into());

        let report = agg.report();
        assert_eq!(report.len(), 2);
        assert_eq!(
            report.outcomes(GLOBAL_MODULE, GLOBAL_FAILURE).unwrap()[0].test_number,
            2
        );
        assert!(agg.any_failure());
    }

    #[test]
    fn sealed_aggregator_rejects_writes() {
        let mut agg = Aggregator::new();
        agg.ingest(WireMessage::Done);
        let report = agg.seal();
        assert!(report.is_empty());

        assert_eq!(agg.ingest(log(Some("M"), "late", false)), Progress::Rejected);
        agg.record_global_failure("late".into(), "late".into());
        assert!(agg.report().is_empty());
        assert!(!agg.any_failure());
    }
}
