//! Session behaviour: closed variable namespace, substitution and piping
//!
//! Run with: cargo test --test session_pipeline

use std::sync::Arc;

use dsl_plugins::{
    register_builtin_plugins, DslError, PipelineError, PluginRegistry, SchemaDocument, Session,
    VariableError,
};
use serde_json::json;

const SCHEMA: &str = r#"
variables:
  left: 2
  right:
    type: integer
    value: 5
  label:
    type: string
piping:
  enabled: true
"#;

fn session() -> Session {
    let registry = Arc::new(PluginRegistry::new());
    register_builtin_plugins(&registry).unwrap();
    let schema = SchemaDocument::from_yaml_str(SCHEMA).unwrap();
    Session::new(registry, &schema).unwrap()
}

#[test]
fn test_variable_namespace_is_closed() {
    let mut session = session();

    let err = session
        .variables_mut()
        .set("unknown", json!(1))
        .unwrap_err();
    assert_eq!(
        err,
        VariableError::NotDeclared {
            name: "unknown".to_string()
        }
    );
    assert!(session.variables().get("unknown").is_err());

    session.variables_mut().set("label", json!("sum")).unwrap();
    assert_eq!(session.variables().get("label").unwrap(), &json!("sum"));
}

#[test]
fn test_declared_type_enforced_on_set() {
    let mut session = session();
    let err = session
        .variables_mut()
        .set("right", json!("five"))
        .unwrap_err();
    assert!(matches!(err, VariableError::TypeMismatch { .. }));
    assert_eq!(session.variables().get("right").unwrap(), &json!(5));
}

#[test]
fn test_three_stage_pipeline() {
    let mut session = session();
    let outputs = session
        .run_line(concat!(
            "calc sum add ${left} ${right}",
            " | calc sum add ${_result} 3",
            " | json pretty ${_result}"
        ))
        .unwrap();

    let values: Vec<_> = outputs.into_iter().map(|o| o.into_value()).collect();
    assert_eq!(values, vec![json!(7), json!(10), json!("10")]);
}

#[test]
fn test_tree_output_is_stored_as_json() {
    let mut session = session();
    session.execute("calc", "add", "add 1 2").unwrap();
    let stored = session.variables().get("_result").unwrap();
    assert_eq!(stored["rule"], json!("addExpression"));
    assert_eq!(stored["children"][2]["lexeme"], json!("2"));
}

#[test]
fn test_failed_stage_reports_its_index() {
    let mut session = session();
    let err = session
        .run_line("calc sum add 1 1 | calc sum add ${missing} 1")
        .unwrap_err();
    match err {
        DslError::Pipeline(PipelineError::Segment { index, source }) => {
            assert_eq!(index, 1);
            assert!(matches!(
                *source,
                DslError::Variable(VariableError::NotFound { .. })
            ));
        }
        other => panic!("Expected pipeline error, got {:?}", other),
    }
}

#[test]
fn test_invalid_schema_never_starts_a_session() {
    let registry = Arc::new(PluginRegistry::new());
    let schema = SchemaDocument::from_json_str(r#"{"variables": {"a": 1, "a": 2}}"#).unwrap();
    match Session::new(registry, &schema).unwrap_err() {
        DslError::Validation(errors) => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].path, "variables.a");
        }
        other => panic!("Expected validation errors, got {:?}", other),
    }
}
