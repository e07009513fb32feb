use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Stable identifier of an API operation (e.g. `createUser`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(pub String);

impl OperationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OperationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// ── Operations ───────────────────────────────────────────────────────

/// An addressable unit of the API. Immutable once the schema is loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: OperationId,
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub parameters: Vec<ParameterDef>,
    /// Status patterns declared for this operation's responses.
    #[serde(default)]
    pub responses: Vec<StatusPattern>,
}

impl Operation {
    pub fn new(id: impl Into<String>, method: &str, path: &str) -> Self {
        Self {
            id: OperationId::new(id),
            method: method.to_uppercase(),
            path: path.to_string(),
            parameters: Vec::new(),
            responses: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, location: ParameterLocation, name: &str) -> Self {
        self.parameters.push(ParameterDef {
            name: name.to_string(),
            location,
        });
        self
    }

    pub fn with_response(mut self, status: StatusPattern) -> Self {
        self.responses.push(status);
        self
    }

    /// Human-readable label, e.g. `POST /users`.
    pub fn label(&self) -> String {
        format!("{} {}", self.method.to_uppercase(), self.path)
    }

    /// Find a declared parameter by name, in any location.
    pub fn find_parameter(&self, name: &str) -> Option<&ParameterDef> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn has_location(&self, location: ParameterLocation) -> bool {
        self.parameters.iter().any(|p| p.location == location)
    }

    /// Whether the operation declares a response matching `pattern`.
    ///
    /// An operation that declares no responses at all accepts any pattern.
    pub fn can_return(&self, pattern: &StatusPattern) -> bool {
        if self.responses.is_empty() {
            return true;
        }
        self.responses.iter().any(|declared| declared.overlaps(pattern))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDef {
    pub name: String,
    #[serde(rename = "in")]
    pub location: ParameterLocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Cookie,
    Body,
}

impl ParameterLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterLocation::Path => "path",
            ParameterLocation::Query => "query",
            ParameterLocation::Header => "header",
            ParameterLocation::Cookie => "cookie",
            ParameterLocation::Body => "body",
        }
    }
}

impl fmt::Display for ParameterLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParameterLocation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "path" => Ok(ParameterLocation::Path),
            "query" => Ok(ParameterLocation::Query),
            "header" => Ok(ParameterLocation::Header),
            "cookie" => Ok(ParameterLocation::Cookie),
            "body" => Ok(ParameterLocation::Body),
            other => Err(format!("unknown parameter location: {other}")),
        }
    }
}

// ── Status patterns ──────────────────────────────────────────────────

/// A response status as written in a schema: `201`, `2XX` or `default`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StatusPattern {
    Exact(u16),
    /// First digit of a status class (`2` for `2XX`).
    Class(u8),
    Default,
}

impl StatusPattern {
    pub fn matches(&self, status: u16) -> bool {
        match self {
            StatusPattern::Exact(code) => *code == status,
            StatusPattern::Class(class) => status / 100 == *class as u16,
            StatusPattern::Default => true,
        }
    }

    /// Whether some concrete status could satisfy both patterns.
    pub fn overlaps(&self, other: &StatusPattern) -> bool {
        match (self, other) {
            (StatusPattern::Default, _) | (_, StatusPattern::Default) => true,
            (StatusPattern::Exact(a), StatusPattern::Exact(b)) => a == b,
            (StatusPattern::Exact(code), StatusPattern::Class(class))
            | (StatusPattern::Class(class), StatusPattern::Exact(code)) => {
                code / 100 == *class as u16
            }
            (StatusPattern::Class(a), StatusPattern::Class(b)) => a == b,
        }
    }
}

impl fmt::Display for StatusPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusPattern::Exact(code) => write!(f, "{code}"),
            StatusPattern::Class(class) => write!(f, "{class}XX"),
            StatusPattern::Default => f.write_str("default"),
        }
    }
}

impl FromStr for StatusPattern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("default") {
            return Ok(StatusPattern::Default);
        }
        let bytes = s.as_bytes();
        if bytes.len() != 3 {
            return Err(format!("invalid status code: {s}"));
        }
        if bytes[1..].eq_ignore_ascii_case(b"xx") {
            return match bytes[0] {
                b @ b'1'..=b'5' => Ok(StatusPattern::Class(b - b'0')),
                _ => Err(format!("invalid status class: {s}")),
            };
        }
        match s.parse::<u16>() {
            Ok(code) if (100..=599).contains(&code) => Ok(StatusPattern::Exact(code)),
            _ => Err(format!("invalid status code: {s}")),
        }
    }
}

impl Serialize for StatusPattern {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for StatusPattern {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // Schemas write status codes both as strings and as bare integers.
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::String(s) => s.parse().map_err(serde::de::Error::custom),
            serde_json::Value::Number(n) => n
                .as_u64()
                .map(|code| code.to_string())
                .ok_or_else(|| serde::de::Error::custom(format!("invalid status code: {n}")))?
                .parse()
                .map_err(serde::de::Error::custom),
            other => Err(serde::de::Error::custom(format!(
                "status code must be a string or integer, got: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status_patterns() {
        assert_eq!("201".parse::<StatusPattern>(), Ok(StatusPattern::Exact(201)));
        assert_eq!("2XX".parse::<StatusPattern>(), Ok(StatusPattern::Class(2)));
        assert_eq!("4xx".parse::<StatusPattern>(), Ok(StatusPattern::Class(4)));
        assert_eq!("default".parse::<StatusPattern>(), Ok(StatusPattern::Default));
        assert!("20".parse::<StatusPattern>().is_err());
        assert!("9XX".parse::<StatusPattern>().is_err());
        assert!("700".parse::<StatusPattern>().is_err());
    }

    #[test]
    fn test_status_matching() {
        assert!(StatusPattern::Exact(201).matches(201));
        assert!(!StatusPattern::Exact(201).matches(200));
        assert!(StatusPattern::Class(2).matches(204));
        assert!(!StatusPattern::Class(2).matches(404));
        assert!(StatusPattern::Default.matches(503));
    }

    #[test]
    fn test_status_overlap() {
        assert!(StatusPattern::Class(2).overlaps(&StatusPattern::Exact(201)));
        assert!(!StatusPattern::Class(4).overlaps(&StatusPattern::Exact(201)));
        assert!(StatusPattern::Default.overlaps(&StatusPattern::Exact(500)));
    }

    #[test]
    fn test_operation_without_responses_can_return_anything() {
        let op = Operation::new("getUser", "get", "/users/{id}");
        assert!(op.can_return(&StatusPattern::Exact(200)));

        let op = op.with_response(StatusPattern::Exact(200));
        assert!(op.can_return(&StatusPattern::Class(2)));
        assert!(!op.can_return(&StatusPattern::Exact(404)));
    }

    #[test]
    fn test_label_uppercases_method() {
        let op = Operation::new("createUser", "post", "/users");
        assert_eq!(op.label(), "POST /users");
    }
}
