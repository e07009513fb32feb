use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{Operation, OperationId, ParameterLocation};

static NEXT_CASE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a generated case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseId(pub u64);

impl CaseId {
    pub fn next() -> Self {
        CaseId(NEXT_CASE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "case-{}", self.0)
    }
}

/// Whether generated data should conform to the schema or violate it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    #[default]
    Positive,
    Negative,
}

/// A single request to an operation. A value type: every mutator returns a new case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub id: CaseId,
    pub operation: OperationId,
    pub method: String,
    /// Path template, e.g. `/users/{id}`.
    pub path: String,
    #[serde(default)]
    pub path_parameters: BTreeMap<String, Value>,
    #[serde(default)]
    pub query: BTreeMap<String, Value>,
    #[serde(default)]
    pub headers: BTreeMap<String, Value>,
    #[serde(default)]
    pub cookies: BTreeMap<String, Value>,
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub mode: GenerationMode,
}

impl Case {
    /// An empty case for `operation`.
    pub fn new(operation: &Operation) -> Self {
        Self {
            id: CaseId::next(),
            operation: operation.id.clone(),
            method: operation.method.to_uppercase(),
            path: operation.path.clone(),
            path_parameters: BTreeMap::new(),
            query: BTreeMap::new(),
            headers: BTreeMap::new(),
            cookies: BTreeMap::new(),
            body: None,
            mode: GenerationMode::Positive,
        }
    }

    pub fn with_mode(mut self, mode: GenerationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Same data under a fresh id.
    pub fn renumbered(mut self) -> Self {
        self.id = CaseId::next();
        self
    }

    /// Everything but the id, rendered as a string. Two cases that send the
    /// same request share a key.
    pub fn content_key(&self) -> String {
        fn object(map: &BTreeMap<String, Value>) -> Value {
            Value::Object(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        }
        Value::Array(vec![
            Value::from(self.operation.as_str()),
            Value::from(self.method.as_str()),
            Value::from(self.path.as_str()),
            object(&self.path_parameters),
            object(&self.query),
            object(&self.headers),
            object(&self.cookies),
            self.body.clone().unwrap_or(Value::Null),
            Value::from(self.mode == GenerationMode::Negative),
        ])
        .to_string()
    }

    /// Read a parameter from the container for `location`.
    ///
    /// For `Body`, `name` addresses a top-level field of an object body.
    pub fn parameter(&self, location: ParameterLocation, name: &str) -> Option<&Value> {
        match location {
            ParameterLocation::Path => self.path_parameters.get(name),
            ParameterLocation::Query => self.query.get(name),
            ParameterLocation::Header => self
                .headers
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value),
            ParameterLocation::Cookie => self.cookies.get(name),
            ParameterLocation::Body => self.body.as_ref().and_then(|b| b.get(name)),
        }
    }

    pub fn with_parameter(mut self, location: ParameterLocation, name: &str, value: Value) -> Self {
        match location {
            ParameterLocation::Path => {
                self.path_parameters.insert(name.to_string(), value);
            }
            ParameterLocation::Query => {
                self.query.insert(name.to_string(), value);
            }
            ParameterLocation::Header => {
                self.headers.retain(|key, _| !key.eq_ignore_ascii_case(name));
                self.headers.insert(name.to_string(), value);
            }
            ParameterLocation::Cookie => {
                self.cookies.insert(name.to_string(), value);
            }
            ParameterLocation::Body => {
                let mut body = match self.body.take() {
                    Some(Value::Object(map)) => map,
                    _ => serde_json::Map::new(),
                };
                body.insert(name.to_string(), value);
                self.body = Some(Value::Object(body));
            }
        }
        self
    }

    pub fn without_parameter(mut self, location: ParameterLocation, name: &str) -> Self {
        match location {
            ParameterLocation::Path => {
                self.path_parameters.remove(name);
            }
            ParameterLocation::Query => {
                self.query.remove(name);
            }
            ParameterLocation::Header => {
                self.headers.retain(|key, _| !key.eq_ignore_ascii_case(name));
            }
            ParameterLocation::Cookie => {
                self.cookies.remove(name);
            }
            ParameterLocation::Body => {
                if let Some(Value::Object(map)) = self.body.as_mut() {
                    map.remove(name);
                }
            }
        }
        self
    }

    pub fn with_body(mut self, body: Option<Value>) -> Self {
        self.body = body;
        self
    }

    /// The path with `{name}` placeholders substituted from path parameters.
    /// Placeholders without a value are left as-is.
    pub fn formatted_path(&self) -> String {
        let mut path = self.path.clone();
        for (name, value) in &self.path_parameters {
            let placeholder = format!("{{{name}}}");
            path = path.replace(&placeholder, &value_to_plain_string(value));
        }
        path
    }

    /// Formatted path followed by the query string, if any.
    pub fn url(&self) -> String {
        let mut url = self.formatted_path();
        if !self.query.is_empty() {
            let query: Vec<String> = self
                .query
                .iter()
                .map(|(k, v)| format!("{k}={}", value_to_plain_string(v)))
                .collect();
            url.push('?');
            url.push_str(&query.join("&"));
        }
        url
    }
}

/// Render a JSON value the way it appears inside a URL or header:
/// strings without quotes, everything else as JSON.
pub fn value_to_plain_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn get_user() -> Operation {
        Operation::new("getUser", "get", "/users/{id}")
            .with_parameter(ParameterLocation::Path, "id")
    }

    #[test]
    fn test_case_ids_are_unique() {
        let a = Case::new(&get_user());
        let b = Case::new(&get_user());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_content_key_ignores_id() {
        let a = Case::new(&get_user()).with_parameter(ParameterLocation::Path, "id", json!(7));
        let b = a.clone().renumbered();
        assert_ne!(a.id, b.id);
        assert_eq!(a.content_key(), b.content_key());

        let c = a.clone().with_parameter(ParameterLocation::Path, "id", json!(8));
        assert_ne!(a.content_key(), c.content_key());
        let d = a.clone().with_mode(GenerationMode::Negative);
        assert_ne!(a.content_key(), d.content_key());
    }

    #[test]
    fn test_formatted_path() {
        let case = Case::new(&get_user()).with_parameter(ParameterLocation::Path, "id", json!(42));
        assert_eq!(case.formatted_path(), "/users/42");

        let case = Case::new(&get_user()).with_parameter(ParameterLocation::Path, "id", json!("abc"));
        assert_eq!(case.formatted_path(), "/users/abc");
    }

    #[test]
    fn test_url_includes_query() {
        let case = Case::new(&get_user())
            .with_parameter(ParameterLocation::Path, "id", json!(1))
            .with_parameter(ParameterLocation::Query, "verbose", json!(true));
        assert_eq!(case.url(), "/users/1?verbose=true");
    }

    #[test]
    fn test_header_parameters_are_case_insensitive() {
        let case = Case::new(&get_user())
            .with_parameter(ParameterLocation::Header, "X-Token", json!("a"))
            .with_parameter(ParameterLocation::Header, "x-token", json!("b"));
        assert_eq!(case.headers.len(), 1);
        assert_eq!(case.parameter(ParameterLocation::Header, "X-TOKEN"), Some(&json!("b")));
    }

    #[test]
    fn test_body_parameter_creates_object() {
        let case = Case::new(&get_user()).with_parameter(ParameterLocation::Body, "name", json!("x"));
        assert_eq!(case.body, Some(json!({"name": "x"})));

        let case = case.without_parameter(ParameterLocation::Body, "name");
        assert_eq!(case.body, Some(json!({})));
    }
}
