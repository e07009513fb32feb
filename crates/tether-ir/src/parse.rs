use std::path::Path;

use crate::schema::SchemaDocument;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cannot read schema file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub fn parse_schema(json: &str) -> Result<SchemaDocument, ParseError> {
    Ok(serde_json::from_str(json)?)
}

pub fn load_schema(path: &Path) -> Result<SchemaDocument, ParseError> {
    let json = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_schema(&json)
}
