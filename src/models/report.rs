use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// Module name used when a record carries none, and for driver-generated failures.
pub const GLOBAL_MODULE: &str = "global";

/// Test name reserved for unrecoverable, run-ending failures.
pub const GLOBAL_FAILURE: &str = "global failure";

/// One assertion, or one synthetic failure produced by the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestOutcome {
    pub test_number: u32,
    /// Outer `None` means the producer never sent the field; `Some(None)` is an explicit null.
    #[serde(
        default,
        deserialize_with = "crate::protocol::present",
        skip_serializing_if = "Option::is_none"
    )]
    pub message: Option<Option<String>>,
    /// `None` means the producer never sent the field; `Some(Value::Null)` is an explicit null.
    #[serde(
        default,
        deserialize_with = "crate::protocol::present",
        skip_serializing_if = "Option::is_none"
    )]
    pub expected: Option<Value>,
    #[serde(
        default,
        deserialize_with = "crate::protocol::present",
        skip_serializing_if = "Option::is_none"
    )]
    pub actual: Option<Value>,
    #[serde(
        default,
        deserialize_with = "crate::protocol::present",
        skip_serializing_if = "Option::is_none"
    )]
    pub source: Option<Option<String>>,
    pub failure: bool,
}

impl TestOutcome {
    pub fn message(&self) -> Option<&str> {
        self.message.as_ref().and_then(Option::as_deref)
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_ref().and_then(Option::as_deref)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestResults {
    pub name: String,
    pub outcomes: Vec<TestOutcome>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleResults {
    pub name: String,
    tests: Vec<TestResults>,
}

impl ModuleResults {
    pub fn tests(&self) -> &[TestResults] {
        &self.tests
    }

    pub fn test(&self, name: &str) -> Option<&TestResults> {
        self.tests.iter().find(|t| t.name == name)
    }
}

/// Results grouped by module, then by test name, both in first-seen order.
///
/// Serializes as `{"results": {<module>: {<test>: [<outcome>, ...]}}}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuiteReport {
    modules: Vec<ModuleResults>,
}

impl SuiteReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn modules(&self) -> &[ModuleResults] {
        &self.modules
    }

    pub fn module(&self, name: &str) -> Option<&ModuleResults> {
        self.modules.iter().find(|m| m.name == name)
    }

    /// Outcomes recorded for `(module, test)`, if that key exists.
    pub fn outcomes(&self, module: &str, test: &str) -> Option<&[TestOutcome]> {
        self.module(module)?
            .test(test)
            .map(|t| t.outcomes.as_slice())
    }

    /// Get-or-create the outcome list for `(module, test)`.
    pub fn outcomes_mut(&mut self, module: &str, test: &str) -> &mut Vec<TestOutcome> {
        let module_idx = match self.modules.iter().position(|m| m.name == module) {
            Some(idx) => idx,
            None => {
                self.modules.push(ModuleResults {
                    name: module.to_string(),
                    tests: Vec::new(),
                });
                self.modules.len() - 1
            }
        };

        let tests = &mut self.modules[module_idx].tests;
        let test_idx = match tests.iter().position(|t| t.name == test) {
            Some(idx) => idx,
            None => {
                tests.push(TestResults {
                    name: test.to_string(),
                    outcomes: Vec::new(),
                });
                tests.len() - 1
            }
        };

        &mut tests[test_idx].outcomes
    }

    /// Drop every module and test collected so far.
    pub fn clear(&mut self) {
        self.modules.clear();
    }

    /// Walk every outcome as `(module, test, outcome)` in report order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &TestOutcome)> {
        self.modules.iter().flat_map(|m| {
            m.tests.iter().flat_map(move |t| {
                t.outcomes
                    .iter()
                    .map(move |o| (m.name.as_str(), t.name.as_str(), o))
            })
        })
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_failure(&self) -> bool {
        self.iter().any(|(_, _, o)| o.failure)
    }
}

impl Serialize for SuiteReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut root = serializer.serialize_map(Some(1))?;
        root.serialize_entry("results", &ModulesView(&self.modules))?;
        root.end()
    }
}

struct ModulesView<'a>(&'a [ModuleResults]);

impl Serialize for ModulesView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for module in self.0 {
            map.serialize_entry(&module.name, &TestsView(&module.tests))?;
        }
        map.end()
    }
}

struct TestsView<'a>(&'a [TestResults]);

impl Serialize for TestsView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for test in self.0 {
            map.serialize_entry(&test.name, &test.outcomes)?;
        }
        map.end()
    }
}
