use std::cell::OnceCell;

use serde_json::Value;
use tether_ir::case::value_to_plain_string;
use tether_ir::{Case, ParameterLocation, Response};

use crate::expression::{Expression, Node};
use crate::pointer::{resolve_pointer, PointerError};

/// A value that could not be produced at runtime. Callers treat it as
/// "value unavailable" rather than as a failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvaluationError {
    #[error("Expression `{expression}` needs a response, but none is available")]
    MissingResponse { expression: String },

    #[error("Expression `{expression}` needs a request, but none is available")]
    MissingRequest { expression: String },

    #[error(transparent)]
    Pointer(#[from] PointerError),

    #[error("Response has no `{name}` header")]
    HeaderNotFound { name: String },

    #[error("Request has no {location} parameter `{name}`")]
    ParameterNotFound {
        location: ParameterLocation,
        name: String,
    },

    #[error("Request has no body")]
    MissingBody,

    #[error("Response body is not valid JSON: {reason}")]
    BodyNotJson { reason: String },
}

/// The request/response pair an expression is evaluated against.
///
/// The response body is decoded at most once, on first use.
#[derive(Debug, Default)]
pub struct ExpressionContext<'a> {
    request: Option<&'a Case>,
    response: Option<&'a Response>,
    response_body: OnceCell<Result<Value, String>>,
}

impl<'a> ExpressionContext<'a> {
    pub fn new(request: Option<&'a Case>, response: Option<&'a Response>) -> Self {
        Self {
            request,
            response,
            response_body: OnceCell::new(),
        }
    }

    /// Context of an observed step: the case that was sent and what came back.
    pub fn observed(request: &'a Case, response: &'a Response) -> Self {
        Self::new(Some(request), Some(response))
    }

    pub fn request(&self) -> Option<&'a Case> {
        self.request
    }

    pub fn response(&self) -> Option<&'a Response> {
        self.response
    }

    fn response_body(&self, response: &Response) -> Result<&Value, EvaluationError> {
        self.response_body
            .get_or_init(|| response.json_body().map_err(|e| e.to_string()))
            .as_ref()
            .map_err(|reason| EvaluationError::BodyNotJson {
                reason: reason.clone(),
            })
    }
}

impl Expression {
    /// A single node yields its raw value. Several nodes are rendered as
    /// strings and concatenated.
    pub fn evaluate(&self, context: &ExpressionContext<'_>) -> Result<Value, EvaluationError> {
        match self.nodes() {
            [] => Ok(Value::String(String::new())),
            [node] => self.evaluate_node(node, context),
            nodes => {
                let mut out = String::new();
                for node in nodes {
                    out.push_str(&value_to_plain_string(&self.evaluate_node(node, context)?));
                }
                Ok(Value::String(out))
            }
        }
    }

    fn evaluate_node(
        &self,
        node: &Node,
        context: &ExpressionContext<'_>,
    ) -> Result<Value, EvaluationError> {
        match node {
            Node::Text(text) => Ok(Value::String(text.clone())),
            Node::Url => Ok(Value::String(self.request_of(context)?.url())),
            Node::Method => Ok(Value::String(self.request_of(context)?.method.clone())),
            Node::StatusCode => Ok(Value::from(self.response_of(context)?.status_code)),
            Node::RequestParameter {
                location,
                name,
                extractor,
            } => {
                let value = self
                    .request_of(context)?
                    .parameter(*location, name)
                    .ok_or_else(|| EvaluationError::ParameterNotFound {
                        location: *location,
                        name: name.clone(),
                    })?;
                Ok(match extractor {
                    Some(extractor) => {
                        Value::String(extractor.extract(&value_to_plain_string(value)))
                    }
                    None => value.clone(),
                })
            }
            Node::RequestBody { pointer } => {
                let body = self
                    .request_of(context)?
                    .body
                    .as_ref()
                    .ok_or(EvaluationError::MissingBody)?;
                match pointer {
                    Some(pointer) => Ok(resolve_pointer(body, pointer)?.clone()),
                    None => Ok(body.clone()),
                }
            }
            Node::ResponseHeader { name, extractor } => {
                let value = self
                    .response_of(context)?
                    .header(name)
                    .ok_or_else(|| EvaluationError::HeaderNotFound { name: name.clone() })?;
                Ok(Value::String(match extractor {
                    Some(extractor) => extractor.extract(value),
                    None => value.to_string(),
                }))
            }
            Node::ResponseBody { pointer } => {
                let response = self.response_of(context)?;
                let body = context.response_body(response)?;
                match pointer {
                    Some(pointer) => Ok(resolve_pointer(body, pointer)?.clone()),
                    None => Ok(body.clone()),
                }
            }
        }
    }

    fn request_of<'a>(&self, context: &ExpressionContext<'a>) -> Result<&'a Case, EvaluationError> {
        context.request.ok_or_else(|| EvaluationError::MissingRequest {
            expression: self.source().to_string(),
        })
    }

    fn response_of<'a>(
        &self,
        context: &ExpressionContext<'a>,
    ) -> Result<&'a Response, EvaluationError> {
        context.response.ok_or_else(|| EvaluationError::MissingResponse {
            expression: self.source().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tether_ir::Operation;

    fn create_user() -> (Case, Response) {
        let op = Operation::new("createUser", "post", "/users");
        let case = Case::new(&op).with_body(Some(json!({"name": "ann", "tags": ["a"]})));
        let response = Response::json(201, &json!({"id": 42, "name": "ann"}))
            .with_header("Location", "/users/42");
        (case, response)
    }

    fn eval(expression: &str, ctx: &ExpressionContext<'_>) -> Result<Value, EvaluationError> {
        Expression::parse(expression).unwrap().evaluate(ctx)
    }

    #[test]
    fn test_response_body_pointer_keeps_type() {
        let (case, response) = create_user();
        let ctx = ExpressionContext::observed(&case, &response);
        assert_eq!(eval("$response.body#/id", &ctx).unwrap(), json!(42));
        assert_eq!(
            eval("$response.body", &ctx).unwrap(),
            json!({"id": 42, "name": "ann"})
        );
    }

    #[test]
    fn test_request_body_and_method() {
        let (case, response) = create_user();
        let ctx = ExpressionContext::observed(&case, &response);
        assert_eq!(eval("$request.body#/tags/0", &ctx).unwrap(), json!("a"));
        assert_eq!(eval("$method", &ctx).unwrap(), json!("POST"));
        assert_eq!(eval("$url", &ctx).unwrap(), json!("/users"));
        assert_eq!(eval("$statusCode", &ctx).unwrap(), json!(201));
    }

    #[test]
    fn test_concatenation_renders_strings() {
        let (case, response) = create_user();
        let ctx = ExpressionContext::observed(&case, &response);
        assert_eq!(
            eval("ID_{$response.body#/id}_{$response.body#/name}", &ctx).unwrap(),
            json!("ID_42_ann")
        );
    }

    #[test]
    fn test_missing_pieces_are_errors() {
        let (case, response) = create_user();
        let ctx = ExpressionContext::observed(&case, &response);
        assert!(matches!(
            eval("$response.body#/missing", &ctx),
            Err(EvaluationError::Pointer(PointerError::Unresolvable { .. }))
        ));
        assert!(matches!(
            eval("$response.header.ETag", &ctx),
            Err(EvaluationError::HeaderNotFound { .. })
        ));
        assert!(matches!(
            eval("$request.query.page", &ctx),
            Err(EvaluationError::ParameterNotFound { .. })
        ));

        let empty = ExpressionContext::default();
        assert!(matches!(
            eval("$statusCode", &empty),
            Err(EvaluationError::MissingResponse { .. })
        ));
        assert!(matches!(
            eval("$url", &empty),
            Err(EvaluationError::MissingRequest { .. })
        ));
    }

    #[test]
    fn test_non_json_body() {
        let (case, _) = create_user();
        let response = Response::new(500).with_body(b"oops".to_vec());
        let ctx = ExpressionContext::observed(&case, &response);
        assert!(matches!(
            eval("$response.body#/id", &ctx),
            Err(EvaluationError::BodyNotJson { .. })
        ));
    }
}
