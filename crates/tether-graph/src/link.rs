use serde_json::Value;
use tether_expr::{merge_values, EvaluationError, ExpressionContext, ValueTemplate};
use tether_ir::{Case, OperationId, ParameterLocation, Response, StatusPattern};

/// Where an extracted value goes in the target request, and how to get it.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterRule {
    pub location: ParameterLocation,
    pub name: String,
    /// The rule as written, for diagnostics.
    pub definition: Value,
    pub template: ValueTemplate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BodyRule {
    pub definition: Value,
    pub template: ValueTemplate,
    /// Overlay evaluated fields on the generated body instead of replacing it.
    pub merge: bool,
}

/// A validated edge of the link graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub name: String,
    pub source: OperationId,
    pub source_label: String,
    pub status: StatusPattern,
    pub target: OperationId,
    pub target_label: String,
    pub parameters: Vec<ParameterRule>,
    pub request_body: Option<BodyRule>,
}

/// A value the link wanted to set but could not extract.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionFailure {
    /// `path.id`, `body`, ...
    pub target: String,
    pub definition: Value,
    pub error: EvaluationError,
}

impl Link {
    /// Stable transition id, e.g. `POST /users -> [201] GetUser -> GET /users/{id}`.
    pub fn transition_id(&self) -> String {
        format!(
            "{} -> [{}] {} -> {}",
            self.source_label, self.status, self.name, self.target_label
        )
    }

    /// Fill `generated` with values extracted from an observed source step.
    ///
    /// Extracted values win over generated ones. A parameter whose rule fails
    /// to evaluate is removed, so the request goes out without it.
    pub fn apply(
        &self,
        generated: Case,
        source_case: &Case,
        source_response: &Response,
    ) -> (Case, Vec<ExtractionFailure>) {
        let context = ExpressionContext::observed(source_case, source_response);
        let mut case = generated;
        let mut failures = Vec::new();

        for rule in &self.parameters {
            case = match rule.template.evaluate(&context) {
                Ok(value) => case.with_parameter(rule.location, &rule.name, value),
                Err(error) => {
                    failures.push(ExtractionFailure {
                        target: format!("{}.{}", rule.location, rule.name),
                        definition: rule.definition.clone(),
                        error,
                    });
                    case.without_parameter(rule.location, &rule.name)
                }
            };
        }

        if let Some(body) = &self.request_body {
            match body.template.evaluate_lenient(&context) {
                Ok((value, errors)) => {
                    failures.extend(errors.into_iter().map(|error| ExtractionFailure {
                        target: "body".to_string(),
                        definition: body.definition.clone(),
                        error,
                    }));
                    let new_body = if body.merge {
                        merge_values(case.body.clone(), value)
                    } else {
                        value
                    };
                    case = case.with_body(Some(new_body));
                }
                Err(error) => failures.push(ExtractionFailure {
                    target: "body".to_string(),
                    definition: body.definition.clone(),
                    error,
                }),
            }
        }

        (case, failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tether_ir::Operation;

    fn link(parameters: Vec<ParameterRule>, request_body: Option<BodyRule>) -> Link {
        Link {
            name: "GetUser".to_string(),
            source: OperationId::new("createUser"),
            source_label: "POST /users".to_string(),
            status: StatusPattern::Exact(201),
            target: OperationId::new("getUser"),
            target_label: "GET /users/{id}".to_string(),
            parameters,
            request_body,
        }
    }

    fn rule(location: ParameterLocation, name: &str, definition: Value) -> ParameterRule {
        ParameterRule {
            location,
            name: name.to_string(),
            template: ValueTemplate::compile(&definition).unwrap(),
            definition,
        }
    }

    fn observed() -> (Case, Response) {
        let case = Case::new(&Operation::new("createUser", "post", "/users"))
            .with_body(Some(json!({"name": "ann"})));
        (case, Response::json(201, &json!({"id": 42})))
    }

    #[test]
    fn test_transition_id() {
        assert_eq!(
            link(vec![], None).transition_id(),
            "POST /users -> [201] GetUser -> GET /users/{id}"
        );
    }

    #[test]
    fn test_extracted_parameter_wins() {
        let (source, response) = observed();
        let generated = Case::new(&Operation::new("getUser", "get", "/users/{id}"))
            .with_parameter(ParameterLocation::Path, "id", json!(999));
        let link = link(
            vec![rule(ParameterLocation::Path, "id", json!("$response.body#/id"))],
            None,
        );
        let (case, failures) = link.apply(generated, &source, &response);
        assert!(failures.is_empty());
        assert_eq!(case.path_parameters["id"], json!(42));
    }

    #[test]
    fn test_failed_extraction_removes_parameter() {
        let (source, response) = observed();
        let generated = Case::new(&Operation::new("getUser", "get", "/users/{id}"))
            .with_parameter(ParameterLocation::Path, "id", json!(999));
        let link = link(
            vec![rule(ParameterLocation::Path, "id", json!("$response.body#/uuid"))],
            None,
        );
        let (case, failures) = link.apply(generated, &source, &response);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].target, "path.id");
        assert!(!case.path_parameters.contains_key("id"));
    }

    #[test]
    fn test_body_merge_and_replace() {
        let (source, response) = observed();
        let generated = Case::new(&Operation::new("updateUser", "patch", "/users/{id}"))
            .with_body(Some(json!({"name": "gen", "age": 3})));
        let definition = json!({"owner": "$response.body#/id", "name": "$request.body#/name"});
        let merged = link(
            vec![],
            Some(BodyRule {
                template: ValueTemplate::compile(&definition).unwrap(),
                definition: definition.clone(),
                merge: true,
            }),
        );
        let (case, _) = merged.apply(generated.clone(), &source, &response);
        assert_eq!(case.body, Some(json!({"name": "ann", "age": 3, "owner": 42})));

        let replaced = link(
            vec![],
            Some(BodyRule {
                template: ValueTemplate::compile(&definition).unwrap(),
                definition,
                merge: false,
            }),
        );
        let (case, _) = replaced.apply(generated, &source, &response);
        assert_eq!(case.body, Some(json!({"name": "ann", "owner": 42})));
    }
}
