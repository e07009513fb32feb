//! RFC 6901 JSON Pointer resolution.
//!
//! Unlike `serde_json::Value::pointer`, a malformed pointer and a pointer
//! that simply does not resolve are reported as different errors.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PointerError {
    #[error("Malformed JSON pointer '{pointer}': {reason}")]
    Malformed { pointer: String, reason: String },

    #[error("JSON pointer '{pointer}' does not resolve: no '{segment}'")]
    Unresolvable { pointer: String, segment: String },
}

/// Split a pointer into unescaped reference tokens.
pub fn parse_pointer(pointer: &str) -> Result<Vec<String>, PointerError> {
    if pointer.is_empty() {
        return Ok(Vec::new());
    }
    let Some(rest) = pointer.strip_prefix('/') else {
        return Err(PointerError::Malformed {
            pointer: pointer.to_string(),
            reason: "must be empty or start with '/'".to_string(),
        });
    };
    rest.split('/')
        .map(|segment| unescape(segment).map_err(|reason| PointerError::Malformed {
            pointer: pointer.to_string(),
            reason,
        }))
        .collect()
}

fn unescape(segment: &str) -> Result<String, String> {
    let mut out = String::with_capacity(segment.len());
    let mut chars = segment.chars();
    while let Some(c) = chars.next() {
        if c == '~' {
            match chars.next() {
                Some('0') => out.push('~'),
                Some('1') => out.push('/'),
                Some(other) => return Err(format!("invalid escape '~{other}'")),
                None => return Err("dangling '~' at end of segment".to_string()),
            }
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

/// Resolve `pointer` against `document`.
pub fn resolve_pointer<'a>(document: &'a Value, pointer: &str) -> Result<&'a Value, PointerError> {
    let mut current = document;
    for segment in parse_pointer(pointer)? {
        let next = match current {
            Value::Object(map) => map.get(&segment),
            Value::Array(items) => parse_index(&segment).and_then(|i| items.get(i)),
            _ => None,
        };
        current = next.ok_or_else(|| PointerError::Unresolvable {
            pointer: pointer.to_string(),
            segment: segment.clone(),
        })?;
    }
    Ok(current)
}

/// Array indices are decimal without leading zeros. `-` never resolves.
fn parse_index(segment: &str) -> Option<usize> {
    if segment.is_empty() || (segment.len() > 1 && segment.starts_with('0')) {
        return None;
    }
    if !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}
