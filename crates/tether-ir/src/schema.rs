use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{Operation, OperationId, StatusPattern};

/// Raw schema inputs: operations plus the links declared between them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaDocument {
    #[serde(default)]
    pub operations: Vec<Operation>,
    #[serde(default)]
    pub links: Vec<LinkDefinition>,
}

/// A declared link, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkDefinition {
    /// Defaults to the target operation's label when absent.
    #[serde(default)]
    pub name: Option<String>,
    pub source: OperationId,
    pub status_code: StatusPattern,
    pub target: OperationId,
    /// `"path.id"` or `"id"` -> literal value or runtime expression.
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    #[serde(default)]
    pub request_body: Option<Value>,
    #[serde(default = "default_merge_body")]
    pub merge_body: bool,
}

fn default_merge_body() -> bool {
    true
}

impl LinkDefinition {
    pub fn new(source: &str, status_code: StatusPattern, target: &str) -> Self {
        Self {
            name: None,
            source: OperationId::new(source),
            status_code,
            target: OperationId::new(target),
            parameters: BTreeMap::new(),
            request_body: None,
            merge_body: true,
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_parameter(mut self, key: &str, rule: Value) -> Self {
        self.parameters.insert(key.to_string(), rule);
        self
    }

    pub fn with_request_body(mut self, body: Value, merge: bool) -> Self {
        self.request_body = Some(body);
        self.merge_body = merge;
        self
    }
}
