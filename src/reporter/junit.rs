use std::fmt::Write;

use serde_json::Value;

use crate::models::{Payload, RunVerdict, SuiteReport, TestOutcome};

/// Render verdicts as a JUnit XML document, one `<testsuite>` per document.
pub fn render(suites: &[(&str, &RunVerdict)]) -> String {
    let mut body = String::new();
    let mut totals = Counts::default();

    for (name, verdict) in suites {
        let counts = match &verdict.payload {
            Payload::Report(report) => write_report_suite(&mut body, name, verdict, report),
            Payload::Text(text) => write_error_suite(&mut body, name, verdict, text),
        };
        totals.add(&counts);
    }

    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let _ = writeln!(
        out,
        r#"<testsuites tests="{}" failures="{}" errors="{}">"#,
        totals.tests, totals.failures, totals.errors
    );
    out.push_str(&body);
    out.push_str("</testsuites>\n");
    out
}

#[derive(Debug, Default, PartialEq)]
struct Counts {
    tests: usize,
    failures: usize,
    errors: usize,
}

impl Counts {
    fn add(&mut self, other: &Counts) {
        self.tests += other.tests;
        self.failures += other.failures;
        self.errors += other.errors;
    }
}

fn write_report_suite(
    out: &mut String,
    name: &str,
    verdict: &RunVerdict,
    report: &SuiteReport,
) -> Counts {
    let mut counts = Counts::default();
    let mut cases = String::new();

    for module in report.modules() {
        for test in module.tests() {
            counts.tests += 1;
            let failing: Vec<&TestOutcome> = test.outcomes.iter().filter(|o| o.failure).collect();
            if !failing.is_empty() {
                counts.failures += 1;
            }

            let _ = write!(
                cases,
                r#"    <testcase classname="{}" name="{}""#,
                escape(&module.name),
                escape(&test.name)
            );
            if failing.is_empty() {
                cases.push_str("/>\n");
                continue;
            }
            cases.push_str(">\n");
            for outcome in failing {
                let _ = writeln!(
                    cases,
                    r#"      <failure message="{}" type="QUnit">{}</failure>"#,
                    escape(&failure_message(outcome)),
                    escape(outcome.source().unwrap_or(""))
                );
            }
            cases.push_str("    </testcase>\n");
        }
    }

    write_suite_open(out, name, verdict, &counts);
    out.push_str(&cases);
    out.push_str("  </testsuite>\n");
    counts
}

fn write_error_suite(out: &mut String, name: &str, verdict: &RunVerdict, text: &str) -> Counts {
    let counts = Counts {
        tests: 1,
        failures: 0,
        errors: 1,
    };
    write_suite_open(out, name, verdict, &counts);
    let _ = writeln!(
        out,
        r#"    <testcase classname="global" name="load"><error message="{}" type="LoadFailure"/></testcase>"#,
        escape(text)
    );
    out.push_str("  </testsuite>\n");
    counts
}

fn write_suite_open(out: &mut String, name: &str, verdict: &RunVerdict, counts: &Counts) {
    let _ = writeln!(
        out,
        r#"  <testsuite name="{}" tests="{}" failures="{}" errors="{}" skipped="0" time="{:.3}">"#,
        escape(name),
        counts.tests,
        counts.failures,
        counts.errors,
        verdict.elapsed.as_secs_f64()
    );
}

/// `"<message> (From QUnit: [Expected: <expected>, Actual: <actual>])"`
fn failure_message(outcome: &TestOutcome) -> String {
    format!(
        "{} (From QUnit: [Expected: {}, Actual: {}])",
        outcome.message().unwrap_or(""),
        value_text(outcome.expected.as_ref()),
        value_text(outcome.actual.as_ref())
    )
}

fn value_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "null".into(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\n' => out.push_str("&#10;"),
            c if c.is_control() && c != '\t' => {}
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::models::RunOutcome;

    fn outcome(n: u32, failure: bool) -> TestOutcome {
        TestOutcome {
            test_number: n,
            message: Some(Some("values match".into())),
            expected: Some(json!("something")),
            actual: Some(json!("nothing")),
            source: Some(Some("    at tests.js:9\n".into())),
            failure,
        }
    }

    #[test]
    fn failing_outcomes_become_failure_elements() {
        let mut report = SuiteReport::new();
        let module = "Module One";
        report.outcomes_mut(module, "Test case one").push(outcome(1, false));
        report.outcomes_mut(module, "Test case two").push(outcome(2, false));
        report.outcomes_mut(module, "Test case two").push(outcome(3, true));
        let verdict = RunVerdict {
            outcome: RunOutcome::AssertionFailure,
            payload: Payload::Report(report),
            elapsed: Duration::from_millis(1500),
        };

        let xml = render(&[("/t/SampleTest.html", &verdict)]);
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains(r#"<testsuites tests="2" failures="1" errors="0">"#));
        assert!(xml.contains(r#"tests="2" failures="1" errors="0" skipped="0" time="1.500""#));
        assert!(xml.contains(r#"<testcase classname="Module One" name="Test case one"/>"#));
        assert!(xml.contains(
            "message=\"values match (From QUnit: [Expected: something, Actual: nothing])\""
        ));
        assert!(xml.contains(">    at tests.js:9&#10;</failure>"));
        assert_eq!(xml.matches("<failure ").count(), 1);
    }

    #[test]
    fn load_failure_is_an_error_suite() {
        let verdict = RunVerdict {
            outcome: RunOutcome::LoadFailure,
            payload: Payload::Text("Unable to run test at file:///t/XTest.html".into()),
            elapsed: Duration::ZERO,
        };
        let xml = render(&[("/t/XTest.html", &verdict)]);
        assert!(xml.contains(r#"<testsuites tests="1" failures="0" errors="1">"#));
        assert!(xml.contains(r#"<error message="Unable to run test at file:///t/XTest.html" type="LoadFailure"/>"#));
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(escape(r#"a<b & "c">'d'"#), "a&lt;b &amp; &quot;c&quot;&gt;&apos;d&apos;");
        assert_eq!(escape("x\u{1}y"), "xy");
    }

    #[test]
    fn missing_values_read_as_null() {
        let mut o = outcome(1, true);
        o.expected = None;
        o.actual = Some(Value::Null);
        o.message = None;
        assert_eq!(
            failure_message(&o),
            " (From QUnit: [Expected: null, Actual: null])"
        );
    }
}
