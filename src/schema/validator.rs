//! Schema document validation
//!
//! Two passes: the document's shape is checked against a JSON meta-schema
//! (jsonschema crate), then variable-level rules that a meta-schema cannot
//! express are checked in Rust (duplicate names, name syntax, reserved
//! names, default value vs declared type). Every problem found is reported;
//! validation never stops at the first one unless the document is not a
//! mapping at all.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;

use super::{decode_variable, value_type_name, SchemaDocument};
use crate::error::{ValidationCause, ValidationError};

/// Variable holding the previous pipeline stage's output
pub const RESERVED_RESULT: &str = "_result";

static VARIABLE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-]*$").unwrap());

static META_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "required": ["variables"],
        "properties": {
            "description": { "type": "string" },
            "variables": {
                "type": "object",
                "additionalProperties": {
                    "if": {
                        "type": "object",
                        "anyOf": [{ "required": ["type"] }, { "required": ["value"] }]
                    },
                    "then": {
                        "properties": {
                            "type": {
                                "enum": ["string", "number", "integer", "boolean", "array", "object", "any"]
                            },
                            "value": {},
                            "description": { "type": "string" }
                        },
                        "additionalProperties": false
                    }
                }
            },
            "piping": {
                "type": "object",
                "required": ["enabled"],
                "properties": {
                    "enabled": { "type": "boolean" },
                    "delimiter": { "type": "string", "minLength": 1 }
                },
                "additionalProperties": false
            }
        },
        "additionalProperties": false
    })
});

/// Whether `name` may be used as a variable name
pub(crate) fn is_valid_variable_name(name: &str) -> bool {
    VARIABLE_NAME_RE.is_match(name)
}

/// Validate a schema document. Returns an empty list when the document is
/// usable; the document itself is never modified.
pub fn validate(schema: &SchemaDocument) -> Vec<ValidationError> {
    let root = schema.root();

    // A non-mapping document is a single error; nothing else can be checked
    let Some(obj) = root.as_object() else {
        return vec![ValidationError::new(
            "$",
            ValidationCause::TypeMismatch {
                expected: "object".to_string(),
                found: value_type_name(root).to_string(),
            },
        )];
    };

    let mut errors = meta_schema_errors(root);

    if let Some(vars) = obj.get("variables").and_then(Value::as_object) {
        let mut seen = HashSet::new();
        for name in schema.declared_names() {
            let path = format!("variables.{}", name);
            if !seen.insert(name.clone()) {
                errors.push(ValidationError::new(
                    path.clone(),
                    ValidationCause::DuplicateVariable(name.clone()),
                ));
            }
            if name == RESERVED_RESULT {
                errors.push(ValidationError::new(
                    path,
                    ValidationCause::ReservedName(name),
                ));
            } else if !is_valid_variable_name(&name) {
                errors.push(ValidationError::new(path, ValidationCause::InvalidName(name)));
            }
        }

        for (name, entry) in vars {
            // Unknown types are already reported by the meta-schema
            match decode_variable(name, entry) {
                Err(cause @ ValidationCause::TypeMismatch { .. }) => {
                    errors.push(ValidationError::new(format!("variables.{}", name), cause));
                }
                Err(_) | Ok(_) => {}
            }
        }
    }

    debug!(errors = errors.len(), "validated schema document");
    errors
}

fn meta_schema_errors(root: &Value) -> Vec<ValidationError> {
    // jsonschema 0.29+ uses iter_errors() to collect all errors
    match jsonschema::validator_for(&META_SCHEMA) {
        Ok(validator) => validator
            .iter_errors(root)
            .map(|e| {
                let path = pointer_to_path(&e.instance_path.to_string());
                let cause = match &e.kind {
                    jsonschema::error::ValidationErrorKind::Required { property } => {
                        ValidationCause::MissingField(
                            property.as_str().unwrap_or_default().to_string(),
                        )
                    }
                    _ => ValidationCause::Constraint(e.to_string()),
                };
                ValidationError::new(path, cause)
            })
            .collect(),
        Err(e) => vec![ValidationError::new(
            "$",
            ValidationCause::Malformed(format!("invalid meta-schema: {}", e)),
        )],
    }
}

/// `/variables/port/type` becomes `variables.port.type`, the root becomes `$`
fn pointer_to_path(pointer: &str) -> String {
    let trimmed = pointer.trim_start_matches('/');
    if trimmed.is_empty() {
        "$".to_string()
    } else {
        trimmed.replace('/', ".")
    }
}
