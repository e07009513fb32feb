//! Pre-compiled extraction rules.
//!
//! A rule is any JSON value. Strings containing `$` are runtime expressions,
//! everything else is literal. Objects and arrays may hold expressions at
//! any depth.

use serde_json::{Map, Value};

use crate::eval::{EvaluationError, ExpressionContext};
use crate::expression::{Expression, ExpressionError};

#[derive(Debug, Clone, PartialEq)]
pub enum ValueTemplate {
    Literal(Value),
    Expression(Expression),
    Array(Vec<ValueTemplate>),
    Object(Vec<(String, ValueTemplate)>),
}

impl ValueTemplate {
    pub fn compile(rule: &Value) -> Result<Self, ExpressionError> {
        match rule {
            Value::String(s) if s.contains('$') => Ok(Self::Expression(Expression::parse(s)?)),
            Value::Array(items) => {
                let items = items.iter().map(Self::compile).collect::<Result<Vec<_>, _>>()?;
                if items.iter().all(Self::is_literal) {
                    Ok(Self::Literal(rule.clone()))
                } else {
                    Ok(Self::Array(items))
                }
            }
            Value::Object(map) => {
                let fields = map
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), Self::compile(v)?)))
                    .collect::<Result<Vec<_>, ExpressionError>>()?;
                if fields.iter().all(|(_, t)| t.is_literal()) {
                    Ok(Self::Literal(rule.clone()))
                } else {
                    Ok(Self::Object(fields))
                }
            }
            other => Ok(Self::Literal(other.clone())),
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Self::Literal(_))
    }

    /// Every expression this template contains, depth first.
    pub fn expressions(&self) -> Vec<&Expression> {
        let mut out = Vec::new();
        self.collect_expressions(&mut out);
        out
    }

    fn collect_expressions<'a>(&'a self, out: &mut Vec<&'a Expression>) {
        match self {
            Self::Literal(_) => {}
            Self::Expression(expr) => out.push(expr),
            Self::Array(items) => items.iter().for_each(|t| t.collect_expressions(out)),
            Self::Object(fields) => fields.iter().for_each(|(_, t)| t.collect_expressions(out)),
        }
    }

    /// Evaluate every leaf; the first failure fails the whole template.
    pub fn evaluate(&self, context: &ExpressionContext<'_>) -> Result<Value, EvaluationError> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Expression(expr) => expr.evaluate(context),
            Self::Array(items) => items
                .iter()
                .map(|t| t.evaluate(context))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Self::Object(fields) => {
                let mut map = Map::new();
                for (key, template) in fields {
                    map.insert(key.clone(), template.evaluate(context)?);
                }
                Ok(Value::Object(map))
            }
        }
    }

    /// Evaluate leaves independently. Nested leaves that fail are reported
    /// alongside the result: object fields are left out, array elements
    /// become `null` so later elements keep their index. Only a failing
    /// top-level expression is an error.
    pub fn evaluate_lenient(
        &self,
        context: &ExpressionContext<'_>,
    ) -> Result<(Value, Vec<EvaluationError>), EvaluationError> {
        let mut errors = Vec::new();
        match self {
            Self::Expression(expr) => expr.evaluate(context).map(|v| (v, errors)),
            other => {
                let value = other.evaluate_nested(context, &mut errors);
                Ok((value.unwrap_or(Value::Null), errors))
            }
        }
    }

    fn evaluate_nested(
        &self,
        context: &ExpressionContext<'_>,
        errors: &mut Vec<EvaluationError>,
    ) -> Option<Value> {
        match self {
            Self::Literal(value) => Some(value.clone()),
            Self::Expression(expr) => match expr.evaluate(context) {
                Ok(value) => Some(value),
                Err(err) => {
                    errors.push(err);
                    None
                }
            },
            Self::Array(items) => Some(Value::Array(
                items
                    .iter()
                    .map(|t| t.evaluate_nested(context, errors).unwrap_or(Value::Null))
                    .collect(),
            )),
            Self::Object(fields) => Some(Value::Object(
                fields
                    .iter()
                    .filter_map(|(k, t)| Some((k.clone(), t.evaluate_nested(context, errors)?)))
                    .collect(),
            )),
        }
    }
}

/// Overlay `evaluated` onto `generated`.
///
/// Objects merge key by key, recursively: evaluated fields win, fields the
/// evaluated side does not mention keep their generated value. Any other
/// combination takes the evaluated value.
pub fn merge_values(generated: Option<Value>, evaluated: Value) -> Value {
    match (generated, evaluated) {
        (Some(Value::Object(mut base)), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let merged = merge_values(base.remove(&key), value);
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (_, evaluated) => evaluated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tether_ir::{Case, Operation, Response};

    fn context_parts() -> (Case, Response) {
        let case = Case::new(&Operation::new("createUser", "post", "/users"));
        (case, Response::json(201, &json!({"id": 7, "org": {"id": 3}})))
    }

    #[test]
    fn test_plain_values_are_literal() {
        assert!(ValueTemplate::compile(&json!("hello")).unwrap().is_literal());
        assert!(ValueTemplate::compile(&json!({"a": [1, "x"]})).unwrap().is_literal());
    }

    #[test]
    fn test_nested_expressions_compile() {
        let template =
            ValueTemplate::compile(&json!({"user": {"id": "$response.body#/id"}, "n": 1})).unwrap();
        assert_eq!(template.expressions().len(), 1);
        assert!(ValueTemplate::compile(&json!(["$nope"])).is_err());
    }

    #[test]
    fn test_nested_evaluation_reassembles_structure() {
        let (case, response) = context_parts();
        let ctx = ExpressionContext::observed(&case, &response);
        let template = ValueTemplate::compile(&json!({
            "owner": "$response.body#/id",
            "org": ["$response.body#/org/id", "fixed"]
        }))
        .unwrap();
        assert_eq!(
            template.evaluate(&ctx).unwrap(),
            json!({"owner": 7, "org": [3, "fixed"]})
        );
    }

    #[test]
    fn test_lenient_evaluation_drops_failing_leaves() {
        let (case, response) = context_parts();
        let ctx = ExpressionContext::observed(&case, &response);
        let template = ValueTemplate::compile(&json!({
            "owner": "$response.body#/id",
            "missing": "$response.body#/nope"
        }))
        .unwrap();
        assert!(template.evaluate(&ctx).is_err());
        let (value, errors) = template.evaluate_lenient(&ctx).unwrap();
        assert_eq!(value, json!({"owner": 7}));
        assert_eq!(errors.len(), 1);

        let list = ValueTemplate::compile(&json!([
            "$response.body#/nope",
            "$response.body#/id"
        ]))
        .unwrap();
        let (value, errors) = list.evaluate_lenient(&ctx).unwrap();
        assert_eq!(value, json!([null, 7]), "positions are kept");
        assert_eq!(errors.len(), 1);

        let top = ValueTemplate::compile(&json!("$response.body#/nope")).unwrap();
        assert!(top.evaluate_lenient(&ctx).is_err());
    }

    #[test]
    fn test_merge_values() {
        let generated = json!({"name": "gen", "meta": {"a": 1, "b": 2}});
        let evaluated = json!({"id": 5, "meta": {"b": 9}});
        assert_eq!(
            merge_values(Some(generated), evaluated),
            json!({"name": "gen", "id": 5, "meta": {"a": 1, "b": 9}})
        );
        assert_eq!(merge_values(Some(json!([1])), json!({"x": 1})), json!({"x": 1}));
        assert_eq!(merge_values(None, json!(3)), json!(3));
    }
}
