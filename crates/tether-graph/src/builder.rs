use std::collections::HashMap;

use serde_json::Value;
use tether_expr::{ExpressionError, Node, ValueTemplate};
use tether_ir::{LinkDefinition, Operation, OperationId, ParameterLocation, SchemaDocument, StatusPattern};

use crate::graph::LinkGraph;
use crate::link::{BodyRule, Link, ParameterRule};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    #[error("Duplicate operation id '{operation}'")]
    DuplicateOperation { operation: OperationId },

    #[error("Link '{link}': source operation '{operation}' not found")]
    UnknownSource { link: String, operation: OperationId },

    #[error("Link '{link}': target operation '{operation}' not found")]
    UnknownTarget { link: String, operation: OperationId },

    #[error("Link '{link}': '{operation}' never returns status {status}")]
    StatusNotDeclared {
        link: String,
        operation: OperationId,
        status: StatusPattern,
    },

    #[error("Link '{link}': parameter '{name}' is not defined in '{target}'")]
    UnknownParameter {
        link: String,
        target: String,
        name: String,
    },

    #[error("Link '{link}': '{target}' declares '{name}' in {declared}, not in {given}")]
    InvalidLocation {
        link: String,
        target: String,
        name: String,
        given: ParameterLocation,
        declared: ParameterLocation,
    },

    #[error("Link '{link}': expression `{expression}` references {location} parameter '{name}', which '{source_label}' does not declare")]
    UnknownSourceParameter {
        link: String,
        expression: String,
        source_label: String,
        location: ParameterLocation,
        name: String,
    },

    #[error("Link '{link}': {source}")]
    Expression {
        link: String,
        #[source]
        source: ExpressionError,
    },
}

/// Collects operations and links, validates them, and freezes the result
/// into a [`LinkGraph`].
#[derive(Debug, Default)]
pub struct LinkGraphBuilder {
    operations: Vec<Operation>,
    index: HashMap<OperationId, usize>,
    links: Vec<Link>,
    errors: Vec<GraphError>,
}

impl LinkGraphBuilder {
    pub fn new(operations: Vec<Operation>) -> Self {
        let mut builder = Self::default();
        for operation in operations {
            if builder.index.contains_key(&operation.id) {
                builder.errors.push(GraphError::DuplicateOperation {
                    operation: operation.id.clone(),
                });
                continue;
            }
            builder
                .index
                .insert(operation.id.clone(), builder.operations.len());
            builder.operations.push(operation);
        }
        builder
    }

    /// Register every declared link of `document`. Errors are kept and
    /// reported together by [`build`](Self::build).
    pub fn from_document(document: &SchemaDocument) -> Self {
        let mut builder = Self::new(document.operations.clone());
        for definition in &document.links {
            if let Err(errors) = builder.add_link(definition.clone()) {
                builder.errors.extend(errors);
            }
        }
        builder
    }

    pub fn operation(&self, id: &OperationId) -> Option<&Operation> {
        self.index.get(id).map(|&i| &self.operations[i])
    }

    /// Validate and register one link.
    ///
    /// A link with the same name on the same `(source, status)` replaces the
    /// earlier one.
    pub fn add_link(&mut self, definition: LinkDefinition) -> Result<(), Vec<GraphError>> {
        let link = self.compile_link(definition)?;
        if let Some(existing) = self.links.iter_mut().find(|l| {
            l.name == link.name && l.source == link.source && l.status == link.status
        }) {
            tracing::warn!(
                link = %link.name,
                source = %link.source,
                status = %link.status,
                "duplicate link replaces earlier definition"
            );
            *existing = link;
        } else {
            self.links.push(link);
        }
        Ok(())
    }

    pub fn build(self) -> Result<LinkGraph, Vec<GraphError>> {
        if !self.errors.is_empty() {
            return Err(self.errors);
        }
        tracing::debug!(
            operations = self.operations.len(),
            links = self.links.len(),
            "link graph built"
        );
        Ok(LinkGraph::new(self.operations, self.links))
    }

    fn compile_link(&self, definition: LinkDefinition) -> Result<Link, Vec<GraphError>> {
        let mut errors = Vec::new();
        let source = self.operation(&definition.source);
        let target = self.operation(&definition.target);
        let name = definition.name.clone().unwrap_or_else(|| {
            target
                .map(Operation::label)
                .unwrap_or_else(|| definition.target.to_string())
        });

        match source {
            None => errors.push(GraphError::UnknownSource {
                link: name.clone(),
                operation: definition.source.clone(),
            }),
            Some(op) if !op.can_return(&definition.status_code) => {
                errors.push(GraphError::StatusNotDeclared {
                    link: name.clone(),
                    operation: op.id.clone(),
                    status: definition.status_code,
                })
            }
            Some(_) => {}
        }
        if target.is_none() {
            errors.push(GraphError::UnknownTarget {
                link: name.clone(),
                operation: definition.target.clone(),
            });
        }

        let mut parameters = Vec::new();
        for (key, rule) in &definition.parameters {
            let Some(template) = compile_rule(&name, rule, source, &mut errors) else {
                continue;
            };
            let Some(target) = target else {
                continue;
            };
            match resolve_parameter(&name, key, target) {
                Ok((location, param)) => parameters.push(ParameterRule {
                    location,
                    name: param,
                    definition: rule.clone(),
                    template,
                }),
                Err(err) => errors.push(err),
            }
        }

        let request_body = definition.request_body.as_ref().and_then(|rule| {
            compile_rule(&name, rule, source, &mut errors).map(|template| BodyRule {
                definition: rule.clone(),
                template,
                merge: definition.merge_body,
            })
        });

        match (source, target) {
            (Some(source), Some(target)) if errors.is_empty() => Ok(Link {
                name,
                source: source.id.clone(),
                source_label: source.label(),
                status: definition.status_code,
                target: target.id.clone(),
                target_label: target.label(),
                parameters,
                request_body,
            }),
            _ => Err(errors),
        }
    }
}

fn compile_rule(
    link: &str,
    rule: &Value,
    source: Option<&Operation>,
    errors: &mut Vec<GraphError>,
) -> Option<ValueTemplate> {
    let template = match ValueTemplate::compile(rule) {
        Ok(template) => template,
        Err(err) => {
            errors.push(GraphError::Expression {
                link: link.to_string(),
                source: err,
            });
            return None;
        }
    };
    let Some(source) = source else {
        return Some(template);
    };
    let before = errors.len();
    for expression in template.expressions() {
        for node in expression.nodes() {
            if let Node::RequestParameter { location, name, .. } = node {
                let declared = source
                    .parameters
                    .iter()
                    .any(|p| p.location == *location && p.name.eq_ignore_ascii_case(name));
                if !declared {
                    errors.push(GraphError::UnknownSourceParameter {
                        link: link.to_string(),
                        expression: expression.source().to_string(),
                        source_label: source.label(),
                        location: *location,
                        name: name.clone(),
                    });
                }
            }
        }
    }
    (errors.len() == before).then_some(template)
}

/// `path.id` names its location explicitly; a bare `id` takes the location
/// the target declares for it.
fn resolve_parameter(
    link: &str,
    key: &str,
    target: &Operation,
) -> Result<(ParameterLocation, String), GraphError> {
    let explicit = key
        .split_once('.')
        .filter(|(_, name)| !name.contains('.'))
        .and_then(|(location, name)| Some((location.parse::<ParameterLocation>().ok()?, name)));

    match explicit {
        Some((location, name)) => match target.find_parameter(name) {
            Some(declared) if declared.location != location => Err(GraphError::InvalidLocation {
                link: link.to_string(),
                target: target.label(),
                name: name.to_string(),
                given: location,
                declared: declared.location,
            }),
            _ => Ok((location, name.to_string())),
        },
        None => target
            .find_parameter(key)
            .map(|declared| (declared.location, key.to_string()))
            .ok_or_else(|| GraphError::UnknownParameter {
                link: link.to_string(),
                target: target.label(),
                name: key.to_string(),
            }),
    }
}
