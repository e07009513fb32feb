//! Failure deduplication.
//!
//! A failure's signature covers the check, the operation, the title and
//! the validator's context with every nested value reduced to its shape.
//! Two failures with the same signature are the same bug.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tether_explore::{CheckFailure, ScenarioId};
use tether_ir::OperationId;

use crate::repro::ReproductionTrace;

/// 16 hex digits identifying a class of failures: the leading bytes of a
/// SHA-256 digest, so signatures compare across runs and builds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    pub fn compute(failure: &CheckFailure, operation: &OperationId) -> Self {
        let context = normalize_context(&failure.context).to_string();
        let mut hasher = Sha256::new();
        for part in [
            failure.check.as_str(),
            operation.as_str(),
            failure.title.as_str(),
            context.as_str(),
        ] {
            hasher.update(part.as_bytes());
            hasher.update([0]);
        }
        let digest = hasher.finalize();
        Signature(digest[..8].iter().map(|b| format!("{b:02x}")).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Keep top-level scalars, replace anything nested with its shape.
pub fn normalize_context(context: &Value) -> Value {
    match context {
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(key, value)| {
                    let kept = match value {
                        Value::Object(_) | Value::Array(_) => shape(value),
                        scalar => scalar.clone(),
                    };
                    (key.clone(), kept)
                })
                .collect(),
        ),
        Value::Array(_) => shape(context),
        scalar => scalar.clone(),
    }
}

/// Type tags in place of scalars. Arrays collapse to the sorted set of
/// their element shapes so length does not matter.
fn shape(value: &Value) -> Value {
    match value {
        Value::Null => Value::from("null"),
        Value::Bool(_) => Value::from("boolean"),
        Value::Number(_) => Value::from("number"),
        Value::String(_) => Value::from("string"),
        Value::Array(items) => {
            let mut shapes: Vec<Value> = Vec::new();
            for item in items {
                let s = shape(item);
                if !shapes.contains(&s) {
                    shapes.push(s);
                }
            }
            shapes.sort_by_key(|s| s.to_string());
            Value::Array(shapes)
        }
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(key, value)| (key.clone(), shape(value)))
                .collect::<Map<_, _>>(),
        ),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub signature: Signature,
    /// Not seen earlier in this run.
    pub is_new: bool,
    /// Already seen in the current suite.
    pub is_duplicate: bool,
    /// Replayed, and the replay did not raise it again.
    pub is_flaky: bool,
    /// Earlier marked flaky, raised again in a later suite and reproduced
    /// this time.
    pub is_confirmed: bool,
}

/// Tracks signatures per suite and per run.
#[derive(Debug, Default)]
pub struct FailureClassifier {
    seen_in_run: HashSet<Signature>,
    seen_in_suite: HashSet<Signature>,
    /// Seen, but no replay has reproduced them yet.
    flaky: HashSet<Signature>,
}

impl FailureClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_suite(&mut self) {
        self.seen_in_suite.clear();
    }

    /// Classify `failure` raised on `operation`. `reproduces` is called for
    /// failures new to the run, and once per suite for failures still
    /// considered flaky.
    pub fn classify(
        &mut self,
        failure: &CheckFailure,
        operation: &OperationId,
        reproduces: impl FnOnce() -> bool,
    ) -> Classification {
        let signature = Signature::compute(failure, operation);
        let is_duplicate = !self.seen_in_suite.insert(signature.clone());
        let is_new = !self.seen_in_run.contains(&signature);
        let retry = !is_new && !is_duplicate && self.flaky.contains(&signature);
        let is_flaky = (is_new || retry) && !reproduces();
        let is_confirmed = retry && !is_flaky;

        self.seen_in_run.insert(signature.clone());
        if is_new && is_flaky {
            self.flaky.insert(signature.clone());
        } else if is_confirmed {
            self.flaky.remove(&signature);
        }
        Classification {
            signature,
            is_new,
            is_duplicate,
            is_flaky,
            is_confirmed,
        }
    }

    pub fn is_flaky(&self, signature: &Signature) -> bool {
        self.flaky.contains(signature)
    }

    pub fn seen(&self, signature: &Signature) -> bool {
        self.seen_in_run.contains(signature)
    }

    pub fn distinct(&self) -> usize {
        self.seen_in_run.len()
    }
}

/// A distinct failure surfaced by a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Failure {
    pub signature: Signature,
    pub check: String,
    pub title: String,
    pub message: String,
    pub operation: OperationId,
    pub suite: u32,
    pub scenario: ScenarioId,
    pub step: usize,
    pub flaky: bool,
    pub reproduction: ReproductionTrace,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn failure(context: Value) -> CheckFailure {
        CheckFailure::new("not_a_server_error", "Server error", "500").with_context(context)
    }

    #[test]
    fn test_signature_format() {
        let sig = Signature::compute(&failure(json!({})), &OperationId::new("getUser"));
        assert_eq!(sig.as_str().len(), 16);
        assert!(sig.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_nested_values_do_not_affect_signature() {
        let op = OperationId::new("getUser");
        let a = failure(json!({"status_code": 500, "body": {"id": 1, "tags": ["a"]}}));
        let b = failure(json!({"status_code": 500, "body": {"id": 99, "tags": ["x", "y"]}}));
        assert_eq!(Signature::compute(&a, &op), Signature::compute(&b, &op));
    }

    #[test]
    fn test_top_level_scalars_affect_signature() {
        let op = OperationId::new("getUser");
        let a = failure(json!({"status_code": 500}));
        let b = failure(json!({"status_code": 503}));
        assert_ne!(Signature::compute(&a, &op), Signature::compute(&b, &op));
        assert_ne!(
            Signature::compute(&a, &op),
            Signature::compute(&a, &OperationId::new("deleteUser"))
        );
    }

    #[test]
    fn test_shape_of_nested_structure() {
        let normalized = normalize_context(&json!({
            "code": 7,
            "body": {"id": 1, "name": "x", "items": [1, 2, "a", null]}
        }));
        assert_eq!(
            normalized,
            json!({
                "code": 7,
                "body": {"id": "number", "name": "string", "items": ["null", "number", "string"]}
            })
        );
    }

    #[test]
    fn test_classify_tracks_suite_and_run() {
        let mut classifier = FailureClassifier::new();
        let op = OperationId::new("getUser");
        let f = failure(json!({"status_code": 500}));

        let first = classifier.classify(&f, &op, || true);
        assert!(first.is_new && !first.is_duplicate && !first.is_flaky);

        let again = classifier.classify(&f, &op, || panic!("known failures are not replayed"));
        assert!(!again.is_new && again.is_duplicate);
        assert_eq!(first.signature, again.signature);

        classifier.start_suite();
        let next_suite = classifier.classify(&f, &op, || true);
        assert!(!next_suite.is_new && !next_suite.is_duplicate);
        assert_eq!(classifier.distinct(), 1);
    }

    #[test]
    fn test_unreproduced_failure_is_flaky() {
        let mut classifier = FailureClassifier::new();
        let c = classifier.classify(&failure(json!({})), &OperationId::new("getUser"), || false);
        assert!(c.is_new && c.is_flaky);
        assert!(classifier.seen(&c.signature));
        assert!(classifier.is_flaky(&c.signature));
    }

    #[test]
    fn test_flaky_failure_is_retried_in_later_suites() {
        let mut classifier = FailureClassifier::new();
        let op = OperationId::new("getUser");
        let f = failure(json!({"status_code": 500}));

        let first = classifier.classify(&f, &op, || false);
        assert!(first.is_flaky && !first.is_confirmed);
        let same_suite = classifier.classify(&f, &op, || panic!("duplicates are not replayed"));
        assert!(same_suite.is_duplicate && !same_suite.is_confirmed);

        classifier.start_suite();
        let still = classifier.classify(&f, &op, || false);
        assert!(!still.is_new && still.is_flaky && !still.is_confirmed);

        classifier.start_suite();
        let confirmed = classifier.classify(&f, &op, || true);
        assert!(!confirmed.is_new && !confirmed.is_flaky && confirmed.is_confirmed);
        assert!(!classifier.is_flaky(&confirmed.signature));

        classifier.start_suite();
        let settled = classifier.classify(&f, &op, || panic!("confirmed failures are not replayed"));
        assert!(!settled.is_confirmed && !settled.is_flaky);
    }

    #[test]
    fn test_signature_is_stable() {
        let sig = Signature::compute(&failure(json!({"status_code": 500})), &OperationId::new("getUser"));
        assert_eq!(sig.as_str(), "44b9a06f9f5d3189");
    }
}
