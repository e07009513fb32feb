use tether_ir::parse::{load_schema, parse_schema, ParseError};
use tether_ir::types::{ParameterLocation, StatusPattern};

#[test]
fn test_parse_users_fixture() {
    let json = include_str!("fixtures/users.json");
    let doc = parse_schema(json).unwrap();

    assert_eq!(doc.operations.len(), 3);
    assert_eq!(doc.links.len(), 2);

    let create = &doc.operations[0];
    assert_eq!(create.id.as_str(), "createUser");
    assert_eq!(create.label(), "POST /users");
    assert_eq!(
        create.responses,
        vec![StatusPattern::Exact(201), StatusPattern::Class(4)]
    );

    let get = &doc.operations[1];
    assert_eq!(get.responses, vec![StatusPattern::Exact(200), StatusPattern::Exact(404)]);
    assert_eq!(
        get.find_parameter("id").map(|p| p.location),
        Some(ParameterLocation::Path)
    );
}

#[test]
fn test_link_defaults() {
    let json = include_str!("fixtures/users.json");
    let doc = parse_schema(json).unwrap();

    let named = &doc.links[0];
    assert_eq!(named.name.as_deref(), Some("GetCreatedUser"));
    assert!(named.merge_body);
    assert!(named.request_body.is_none());

    let unnamed = &doc.links[1];
    assert_eq!(unnamed.name, None);
    assert_eq!(unnamed.status_code, StatusPattern::Exact(201));
}

#[test]
fn test_invalid_json_fails() {
    assert!(matches!(parse_schema("not json"), Err(ParseError::Json(_))));
}

#[test]
fn test_invalid_status_code_fails() {
    let json = r#"{
        "operations": [
            { "id": "a", "method": "GET", "path": "/a", "responses": ["2X"] }
        ]
    }"#;
    assert!(parse_schema(json).is_err());
}

#[test]
fn test_empty_document_is_valid() {
    let doc = parse_schema("{}").unwrap();
    assert!(doc.operations.is_empty());
    assert!(doc.links.is_empty());
}

#[test]
fn test_load_missing_file_reports_path() {
    let err = load_schema(std::path::Path::new("/nonexistent/schema.json")).unwrap_err();
    assert!(err.to_string().contains("/nonexistent/schema.json"));
}
