//! Variable store seeded from a validated schema
//!
//! The namespace is closed: the schema fixes which names exist, and `set`
//! can only change values of declared names (respecting their declared
//! types). The store is owned by one session and mutated only through
//! `set`.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use crate::error::VariableError;
use crate::schema::{value_type_name, SchemaDocument, VarType, RESERVED_RESULT};

#[derive(Debug, Clone, PartialEq)]
struct Slot {
    var_type: VarType,
    value: Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableStore {
    slots: BTreeMap<String, Slot>,
}

impl VariableStore {
    /// Copy every declared variable of `schema` into a fresh store
    pub fn initialize(schema: &SchemaDocument) -> Self {
        let mut slots = BTreeMap::new();
        for decl in schema.variables() {
            slots.insert(
                decl.name,
                Slot {
                    var_type: decl.var_type,
                    value: decl.default,
                },
            );
        }
        let mut store = Self { slots };
        if schema.piping().enabled {
            store.declare_result();
        }
        debug!(count = store.slots.len(), "initialized variable store");
        store
    }

    /// Declare the reserved pipeline result slot unless it already exists
    pub(crate) fn declare_result(&mut self) {
        self.slots
            .entry(RESERVED_RESULT.to_string())
            .or_insert(Slot {
                var_type: VarType::Any,
                value: Value::Null,
            });
    }

    pub fn get(&self, name: &str) -> Result<&Value, VariableError> {
        self.slots
            .get(name)
            .map(|slot| &slot.value)
            .ok_or_else(|| VariableError::NotFound {
                name: name.to_string(),
            })
    }

    /// Replace the value of a declared variable, returning the old value
    pub fn set(&mut self, name: &str, value: Value) -> Result<Value, VariableError> {
        let slot = self
            .slots
            .get_mut(name)
            .ok_or_else(|| VariableError::NotDeclared {
                name: name.to_string(),
            })?;

        if !slot.var_type.accepts(&value) {
            return Err(VariableError::TypeMismatch {
                name: name.to_string(),
                expected: slot.var_type.to_string(),
                found: value_type_name(&value).to_string(),
            });
        }

        Ok(std::mem::replace(&mut slot.value, value))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    pub fn declared_type(&self, name: &str) -> Option<VarType> {
        self.slots.get(name).map(|slot| slot.var_type)
    }

    /// Names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Snapshot of all values as a JSON object
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.slots
                .iter()
                .map(|(name, slot)| (name.clone(), slot.value.clone()))
                .collect(),
        )
    }

    /// Replace every `${name}` in `text` with the variable's value. Strings
    /// are inserted verbatim, other values as compact JSON. A `$` not
    /// followed by `{` is left alone.
    pub fn substitute(&self, text: &str) -> Result<String, VariableError> {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        let mut consumed = 0;

        while let Some(pos) = rest.find("${") {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + 2..];
            let close = after
                .find('}')
                .ok_or(VariableError::UnterminatedReference {
                    offset: consumed + pos,
                })?;
            let name = after[..close].trim();
            match self.get(name)? {
                Value::String(s) => out.push_str(s),
                other => out.push_str(&other.to_string()),
            }
            let advance = pos + 2 + close + 1;
            consumed += advance;
            rest = &rest[advance..];
        }

        out.push_str(rest);
        Ok(out)
    }
}
