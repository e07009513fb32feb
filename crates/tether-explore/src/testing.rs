//! Deterministic stand-ins for generation and transport.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, PoisonError};

use rand::{Rng, RngCore};
use serde_json::{json, Value};
use tether_ir::{Case, GenerationMode, Operation, OperationId, ParameterLocation, Response};

use crate::generator::Generator;
use crate::transport::{Transport, TransportError};

/// Builds cases from per-operation templates.
///
/// Declared parameters without a template value get a small random integer
/// (positive mode) or a string that no integer parser accepts (negative
/// mode). Templated values are copied verbatim.
#[derive(Debug, Default, Clone)]
pub struct TemplateGenerator {
    templates: HashMap<OperationId, Vec<(ParameterLocation, String, Value)>>,
    bodies: HashMap<OperationId, Value>,
}

impl TemplateGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, operation: &str, location: ParameterLocation, name: &str, value: Value) -> Self {
        self.templates
            .entry(OperationId::new(operation))
            .or_default()
            .push((location, name.to_string(), value));
        self
    }

    pub fn with_body(mut self, operation: &str, body: Value) -> Self {
        self.bodies.insert(OperationId::new(operation), body);
        self
    }
}

impl Generator for TemplateGenerator {
    fn generate(&self, operation: &Operation, mode: GenerationMode, rng: &mut dyn RngCore) -> Case {
        let mut case = Case::new(operation).with_mode(mode);
        if let Some(body) = self.bodies.get(&operation.id) {
            case = case.with_body(Some(body.clone()));
        }
        let templated = self.templates.get(&operation.id);
        for param in &operation.parameters {
            let fixed = templated.and_then(|values| {
                values
                    .iter()
                    .find(|(loc, name, _)| *loc == param.location && *name == param.name)
                    .map(|(_, _, value)| value.clone())
            });
            let value = match (fixed, mode) {
                (Some(value), _) => value,
                (None, _) if case.parameter(param.location, &param.name).is_some() => continue,
                (None, GenerationMode::Positive) => json!(rng.gen_range(1..1000)),
                (None, GenerationMode::Negative) => json!(format!("~{}", rng.gen::<u16>())),
            };
            case = case.with_parameter(param.location, &param.name, value);
        }
        case
    }
}

#[derive(Debug, Default)]
struct UsersState {
    next_id: u64,
    users: BTreeMap<u64, Value>,
    deleted: BTreeSet<u64>,
    calls: Vec<String>,
}

/// In-memory `/users` API.
///
/// - `POST /users` creates a user: `201` with `{"id", "name"}` and a
///   `Location` header, or `400` when `name` is missing.
/// - `GET /users/{id}` returns `200` or `404`.
/// - `DELETE /users/{id}` returns `204` or `404`.
///
/// Faults can be scripted per operation to make checks fail.
#[derive(Debug, Default)]
pub struct UsersApi {
    state: Mutex<UsersState>,
    faults: HashMap<OperationId, u16>,
    deleted_fault: Option<u16>,
}

impl UsersApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// The schema this API implements, as JSON.
    pub fn schema() -> Value {
        json!({
            "operations": [
                {
                    "id": "createUser", "method": "POST", "path": "/users",
                    "parameters": [{ "name": "name", "in": "body" }],
                    "responses": ["201", "400"]
                },
                {
                    "id": "getUser", "method": "GET", "path": "/users/{id}",
                    "parameters": [{ "name": "id", "in": "path" }],
                    "responses": ["200", "404"]
                },
                {
                    "id": "deleteUser", "method": "DELETE", "path": "/users/{id}",
                    "parameters": [{ "name": "id", "in": "path" }],
                    "responses": ["204", "404"]
                }
            ],
            "links": [
                {
                    "name": "GetCreatedUser",
                    "source": "createUser", "status_code": "201", "target": "getUser",
                    "parameters": { "path.id": "$response.body#/id" }
                },
                {
                    "name": "DeleteCreatedUser",
                    "source": "createUser", "status_code": "201", "target": "deleteUser",
                    "parameters": { "path.id": "$response.header.Location#regex:/users/(.+)" }
                }
            ]
        })
    }

    /// Answer every call to `operation` with `status`.
    pub fn with_fault(mut self, operation: &str, status: u16) -> Self {
        self.faults.insert(OperationId::new(operation), status);
        self
    }

    /// Answer `GET` of a deleted user with `status` instead of `404`.
    pub fn with_deleted_fault(mut self, status: u16) -> Self {
        self.deleted_fault = Some(status);
        self
    }

    /// `METHOD /formatted/path` of every call so far.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn user_count(&self) -> usize {
        self.lock().users.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, UsersState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn user_id(case: &Case) -> Option<u64> {
        match case.path_parameters.get("id")? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl Transport for UsersApi {
    fn call(&self, case: &Case) -> Result<Response, TransportError> {
        let mut state = self.lock();
        state
            .calls
            .push(format!("{} {}", case.method, case.formatted_path()));
        if let Some(&status) = self.faults.get(&case.operation) {
            return Ok(Response::json(status, &json!({"error": "scripted fault"})));
        }

        let response = match case.operation.as_str() {
            "createUser" => match case.body.as_ref().and_then(|b| b.get("name")) {
                Some(name) => {
                    state.next_id += 1;
                    let id = state.next_id;
                    let user = json!({"id": id, "name": name});
                    state.users.insert(id, user.clone());
                    Response::json(201, &user).with_header("Location", &format!("/users/{id}"))
                }
                None => Response::json(400, &json!({"error": "name is required"})),
            },
            "getUser" => {
                let id = Self::user_id(case);
                match id.and_then(|id| state.users.get(&id)) {
                    Some(user) => Response::json(200, user),
                    None => match self.deleted_fault {
                        Some(status) if id.is_some_and(|id| state.deleted.contains(&id)) => {
                            Response::json(status, &json!({"error": "dangling user"}))
                        }
                        _ => Response::json(404, &json!({"error": "not found"})),
                    },
                }
            }
            "deleteUser" => match Self::user_id(case).and_then(|id| state.users.remove(&id)) {
                Some(user) => {
                    if let Some(id) = user.get("id").and_then(Value::as_u64) {
                        state.deleted.insert(id);
                    }
                    Response::new(204)
                }
                None => Response::json(404, &json!({"error": "not found"})),
            },
            other => {
                return Err(TransportError::Connection {
                    url: case.url(),
                    reason: format!("no route for operation '{other}'"),
                })
            }
        };
        Ok(response)
    }
}
