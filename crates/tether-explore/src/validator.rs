use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tether_ir::{Case, Response};

/// A single failed check on one response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckFailure {
    /// Name of the check that failed, e.g. `not_a_server_error`.
    pub check: String,
    /// Short, stable description of the failure class.
    pub title: String,
    /// Human-readable detail. May contain random values.
    pub message: String,
    /// Distinguishing data the check declares for deduplication.
    #[serde(default)]
    pub context: Value,
}

impl CheckFailure {
    pub fn new(check: &str, title: &str, message: impl Into<String>) -> Self {
        Self {
            check: check.to_string(),
            title: title.to_string(),
            message: message.into(),
            context: Value::Null,
        }
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }
}

/// A response check. Pure: the same response and case give the same result.
pub trait Validator: Send + Sync {
    fn name(&self) -> &str;

    fn validate(&self, response: &Response, case: &Case) -> Vec<CheckFailure>;
}

/// Flags any 5xx response.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotAServerError;

impl Validator for NotAServerError {
    fn name(&self) -> &str {
        "not_a_server_error"
    }

    fn validate(&self, response: &Response, case: &Case) -> Vec<CheckFailure> {
        if response.status_code < 500 {
            return Vec::new();
        }
        vec![CheckFailure::new(
            self.name(),
            "Server error",
            format!(
                "{} {} returned {}",
                case.method,
                case.formatted_path(),
                response.status_code
            ),
        )
        .with_context(json!({ "status_code": response.status_code }))]
    }
}

/// Runs several validators in order and concatenates their failures.
#[derive(Default, Clone)]
pub struct CompositeValidator {
    validators: Vec<std::sync::Arc<dyn Validator>>,
}

impl CompositeValidator {
    pub fn new(validators: Vec<std::sync::Arc<dyn Validator>>) -> Self {
        Self { validators }
    }

    pub fn push(&mut self, validator: std::sync::Arc<dyn Validator>) {
        self.validators.push(validator);
    }
}

impl Validator for CompositeValidator {
    fn name(&self) -> &str {
        "composite"
    }

    fn validate(&self, response: &Response, case: &Case) -> Vec<CheckFailure> {
        self.validators
            .iter()
            .flat_map(|v| v.validate(response, case))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tether_ir::Operation;

    #[test]
    fn test_not_a_server_error() {
        let case = Case::new(&Operation::new("getUser", "get", "/users/{id}"));
        assert!(NotAServerError.validate(&Response::new(404), &case).is_empty());

        let failures = NotAServerError.validate(&Response::new(503), &case);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].check, "not_a_server_error");
        assert_eq!(failures[0].context, json!({"status_code": 503}));
    }

    #[test]
    fn test_composite_concatenates() {
        let case = Case::new(&Operation::new("getUser", "get", "/users/{id}"));
        let composite = CompositeValidator::new(vec![Arc::new(NotAServerError), Arc::new(NotAServerError)]);
        assert_eq!(composite.validate(&Response::new(500), &case).len(), 2);
    }
}
