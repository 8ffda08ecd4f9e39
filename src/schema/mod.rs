//! Schema documents
//!
//! A schema document declares the variables a session may use:
//!
//! ```yaml
//! variables:
//!   greeting: "hello"            # bare default, type inferred
//!   port:
//!     type: integer
//!     value: 8080
//!     description: listening port
//! piping:
//!   enabled: true
//!   delimiter: "|"
//! ```
//!
//! Documents are loaded once, checked with [`validate`], and then only read.

mod validator;

use std::fmt;

use serde::de::{IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{ValidationCause, ValidationError};

pub use validator::{validate, RESERVED_RESULT};

/// Declared type of a schema variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    Any,
}

impl VarType {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "string" => Some(VarType::String),
            "number" => Some(VarType::Number),
            "integer" => Some(VarType::Integer),
            "boolean" => Some(VarType::Boolean),
            "array" => Some(VarType::Array),
            "object" => Some(VarType::Object),
            "any" => Some(VarType::Any),
            _ => None,
        }
    }

    /// Type inferred for a bare default value
    pub fn infer(value: &Value) -> Self {
        match value {
            Value::Null => VarType::Any,
            Value::Bool(_) => VarType::Boolean,
            Value::Number(_) => VarType::Number,
            Value::String(_) => VarType::String,
            Value::Array(_) => VarType::Array,
            Value::Object(_) => VarType::Object,
        }
    }

    /// Null is accepted by every type and means "unset"
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) | (VarType::Any, _) => true,
            (VarType::String, Value::String(_)) => true,
            (VarType::Number, Value::Number(_)) => true,
            (VarType::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (VarType::Boolean, Value::Bool(_)) => true,
            (VarType::Array, Value::Array(_)) => true,
            (VarType::Object, Value::Object(_)) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VarType::String => "string",
            VarType::Number => "number",
            VarType::Integer => "integer",
            VarType::Boolean => "boolean",
            VarType::Array => "array",
            VarType::Object => "object",
            VarType::Any => "any",
        }
    }
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON type name of a value, for error messages
pub fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One declared variable
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDecl {
    pub name: String,
    pub var_type: VarType,
    pub default: Value,
    pub description: Option<String>,
}

/// Piping configuration carried by a schema document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
}

fn default_delimiter() -> String {
    "|".to_string()
}

impl Default for PipingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            delimiter: default_delimiter(),
        }
    }
}

/// A declarative schema document
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDocument {
    root: Value,
    /// Variable names in source order, duplicates included, when the source
    /// text was available
    source_names: Option<Vec<String>>,
}

impl SchemaDocument {
    /// Wrap an already-parsed document
    pub fn from_value(root: Value) -> Self {
        Self {
            root,
            source_names: None,
        }
    }

    /// Parse JSON text. Syntax errors become a single validation error.
    pub fn from_json_str(text: &str) -> Result<Self, ValidationError> {
        let root: Value = serde_json::from_str(text).map_err(|e| {
            ValidationError::new("$", ValidationCause::Malformed(e.to_string()))
        })?;
        let source_names = serde_json::from_str::<NameProbe>(text)
            .ok()
            .and_then(|probe| probe.variables)
            .map(|names| names.0);
        Ok(Self { root, source_names })
    }

    /// Parse YAML text. Syntax errors become a single validation error.
    pub fn from_yaml_str(text: &str) -> Result<Self, ValidationError> {
        let root: Value = serde_yaml::from_str(text).map_err(|e| {
            ValidationError::new("$", ValidationCause::Malformed(e.to_string()))
        })?;
        let source_names = serde_yaml::from_str::<NameProbe>(text)
            .ok()
            .and_then(|probe| probe.variables)
            .map(|names| names.0);
        Ok(Self { root, source_names })
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Variable names as written in the source, falling back to the keys of
    /// the parsed `variables` object
    pub fn declared_names(&self) -> Vec<String> {
        match &self.source_names {
            Some(names) => names.clone(),
            None => self
                .root
                .get("variables")
                .and_then(Value::as_object)
                .map(|vars| vars.keys().cloned().collect())
                .unwrap_or_default(),
        }
    }

    /// Declared variables; entries that do not decode are skipped, so call
    /// [`validate`] first
    pub fn variables(&self) -> Vec<VariableDecl> {
        let Some(vars) = self.root.get("variables").and_then(Value::as_object) else {
            return Vec::new();
        };
        vars.iter()
            .filter_map(|(name, entry)| decode_variable(name, entry).ok())
            .collect()
    }

    pub fn piping(&self) -> PipingConfig {
        self.root
            .get("piping")
            .and_then(|p| serde_json::from_value(p.clone()).ok())
            .unwrap_or_default()
    }
}

/// Whether an entry is a `{type, value, description}` descriptor rather than
/// a bare object default
pub(crate) fn is_descriptor(entry: &Value) -> bool {
    entry
        .as_object()
        .is_some_and(|obj| obj.contains_key("type") || obj.contains_key("value"))
}

pub(crate) fn decode_variable(name: &str, entry: &Value) -> Result<VariableDecl, ValidationCause> {
    if !is_descriptor(entry) {
        return Ok(VariableDecl {
            name: name.to_string(),
            var_type: VarType::infer(entry),
            default: entry.clone(),
            description: None,
        });
    }

    let default = entry.get("value").cloned().unwrap_or(Value::Null);
    let var_type = match entry.get("type") {
        None => VarType::infer(&default),
        Some(Value::String(type_name)) => VarType::parse(type_name).ok_or_else(|| {
            ValidationCause::Constraint(format!("unknown variable type '{}'", type_name))
        })?,
        Some(other) => {
            return Err(ValidationCause::TypeMismatch {
                expected: "string".to_string(),
                found: value_type_name(other).to_string(),
            })
        }
    };

    if !var_type.accepts(&default) {
        return Err(ValidationCause::TypeMismatch {
            expected: var_type.to_string(),
            found: value_type_name(&default).to_string(),
        });
    }

    Ok(VariableDecl {
        name: name.to_string(),
        var_type,
        default,
        description: entry
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

/// Reads only the keys of `variables`, keeping duplicates that a map would
/// silently merge
#[derive(Deserialize)]
struct NameProbe {
    #[serde(default)]
    variables: Option<KeyList>,
}

struct KeyList(Vec<String>);

impl<'de> Deserialize<'de> for KeyList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeyVisitor;

        impl<'de> Visitor<'de> for KeyVisitor {
            type Value = KeyList;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of variable names")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<KeyList, A::Error> {
                let mut keys = Vec::new();
                while let Some(key) = map.next_key::<String>()? {
                    map.next_value::<IgnoredAny>()?;
                    keys.push(key);
                }
                Ok(KeyList(keys))
            }
        }

        deserializer.deserialize_map(KeyVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_keeps_duplicate_names() {
        let doc = SchemaDocument::from_json_str(r#"{"variables": {"a": 1, "b": 2, "a": 3}}"#)
            .unwrap();
        assert_eq!(doc.declared_names(), vec!["a", "b", "a"]);
        // the parsed value keeps only one of them
        assert_eq!(doc.variables().len(), 2);
    }

    #[test]
    fn test_malformed_json_is_one_error() {
        let err = SchemaDocument::from_json_str("{\"variables\": ").unwrap_err();
        assert_eq!(err.path, "$");
        assert!(matches!(err.cause, ValidationCause::Malformed(_)));
    }

    #[test]
    fn test_yaml_document() {
        let doc = SchemaDocument::from_yaml_str(
            "variables:\n  port:\n    type: integer\n    value: 8080\n  name: demo\npiping:\n  enabled: true\n",
        )
        .unwrap();
        let vars = doc.variables();
        let port = vars.iter().find(|v| v.name == "port").unwrap();
        assert_eq!(port.var_type, VarType::Integer);
        assert_eq!(port.default, json!(8080));
        assert_eq!(
            doc.piping(),
            PipingConfig {
                enabled: true,
                delimiter: "|".to_string()
            }
        );
    }

    #[test]
    fn test_descriptor_vs_bare_object() {
        let decl = decode_variable("cfg", &json!({"host": "x"})).unwrap();
        assert_eq!(decl.var_type, VarType::Object);

        let decl = decode_variable("n", &json!({"type": "number"})).unwrap();
        assert_eq!(decl.var_type, VarType::Number);
        assert_eq!(decl.default, Value::Null);

        let cause = decode_variable("n", &json!({"type": "integer", "value": 1.5})).unwrap_err();
        assert_eq!(
            cause,
            ValidationCause::TypeMismatch {
                expected: "integer".to_string(),
                found: "number".to_string()
            }
        );
    }

    #[test]
    fn test_type_acceptance() {
        assert!(VarType::Integer.accepts(&json!(3)));
        assert!(!VarType::Integer.accepts(&json!(3.2)));
        assert!(VarType::Number.accepts(&json!(3)));
        assert!(VarType::String.accepts(&Value::Null));
        assert!(!VarType::Boolean.accepts(&json!("true")));
        assert!(VarType::Any.accepts(&json!([1, 2])));
    }
}
