//! Data model shared by every layer of the engine: operations, status
//! patterns, cases, responses and the raw schema document.

pub mod case;
pub mod parse;
pub mod response;
pub mod schema;
pub mod types;

pub use case::{Case, CaseId, GenerationMode};
pub use parse::{load_schema, parse_schema, ParseError};
pub use response::Response;
pub use schema::{LinkDefinition, SchemaDocument};
pub use types::{Operation, OperationId, ParameterDef, ParameterLocation, StatusPattern};
