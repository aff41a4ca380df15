//! Argument templates
//!
//! Arguments arrive from the code generator as JSON where a variable
//! reference is written `{"kind": "Variable", "variableName": "episode"}`.
//! Any object or list may contain such placeholders at any depth.

use crate::variables::Variables;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const KIND: &str = "kind";
const VARIABLE_KIND: &str = "Variable";
const VARIABLE_NAME: &str = "variableName";

/// An argument template, resolved against variables at execution time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum Argument {
    /// A literal scalar (string, number, bool, null)
    Literal(Value),
    /// A reference to a bound variable
    Variable(String),
    /// An input object whose fields may hold placeholders
    Object(BTreeMap<String, Argument>),
    /// A list whose elements may hold placeholders
    List(Vec<Argument>),
}

impl Argument {
    /// Literal argument
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::from_json(value.into())
    }

    /// Variable reference
    pub fn variable(name: impl Into<String>) -> Self {
        Argument::Variable(name.into())
    }

    /// Parse the code generator's JSON form
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Object(map) => {
                if let Some(name) = variable_name(&map) {
                    return Argument::Variable(name);
                }
                Argument::Object(
                    map.into_iter()
                        .map(|(k, v)| (k, Argument::from_json(v)))
                        .collect(),
                )
            }
            Value::Array(items) => {
                Argument::List(items.into_iter().map(Argument::from_json).collect())
            }
            other => Argument::Literal(other),
        }
    }

    /// Render back to the code generator's JSON form, placeholders intact
    pub fn to_json(&self) -> Value {
        match self {
            Argument::Literal(v) => v.clone(),
            Argument::Variable(name) => {
                let mut map = Map::new();
                map.insert(KIND.to_string(), Value::String(VARIABLE_KIND.to_string()));
                map.insert(VARIABLE_NAME.to_string(), Value::String(name.clone()));
                Value::Object(map)
            }
            Argument::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Argument::List(items) => Value::Array(items.iter().map(Argument::to_json).collect()),
        }
    }

    /// Substitute bound variables, recursively
    ///
    /// An unbound variable resolves to `null`.
    pub fn resolve(&self, variables: &Variables) -> Value {
        match self {
            Argument::Literal(v) => v.clone(),
            Argument::Variable(name) => variables.get(name).cloned().unwrap_or(Value::Null),
            Argument::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.resolve(variables)))
                    .collect(),
            ),
            Argument::List(items) => {
                Value::Array(items.iter().map(|item| item.resolve(variables)).collect())
            }
        }
    }

    /// Whether this template references any variable
    pub fn has_variables(&self) -> bool {
        match self {
            Argument::Literal(_) => false,
            Argument::Variable(_) => true,
            Argument::Object(fields) => fields.values().any(Argument::has_variables),
            Argument::List(items) => items.iter().any(Argument::has_variables),
        }
    }
}

fn variable_name(map: &Map<String, Value>) -> Option<String> {
    if map.len() != 2 || map.get(KIND).and_then(Value::as_str) != Some(VARIABLE_KIND) {
        return None;
    }
    map.get(VARIABLE_NAME)
        .and_then(Value::as_str)
        .map(str::to_string)
}

impl From<Value> for Argument {
    fn from(value: Value) -> Self {
        Argument::from_json(value)
    }
}

impl From<Argument> for Value {
    fn from(argument: Argument) -> Self {
        argument.to_json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_variable_placeholder() {
        let arg = Argument::from_json(json!({"kind": "Variable", "variableName": "episode"}));
        assert_eq!(arg, Argument::Variable("episode".to_string()));
    }

    #[test]
    fn test_nested_placeholders_resolve() {
        let arg = Argument::from_json(json!({
            "stars": {"kind": "Variable", "variableName": "stars"},
            "tags": ["fixed", {"kind": "Variable", "variableName": "tag"}]
        }));
        assert!(arg.has_variables());

        let vars = Variables::new().with("stars", 5).with("tag", "new");
        assert_eq!(
            arg.resolve(&vars),
            json!({"stars": 5, "tags": ["fixed", "new"]})
        );
    }

    #[test]
    fn test_unbound_variable_is_null() {
        let arg = Argument::variable("missing");
        assert_eq!(arg.resolve(&Variables::new()), Value::Null);
    }

    #[test]
    fn test_object_with_kind_field_is_not_a_variable() {
        let arg = Argument::from_json(json!({"kind": "Variable", "other": 1, "variableName": "x"}));
        assert!(matches!(arg, Argument::Object(_)));
    }

    #[test]
    fn test_serde_uses_placeholder_form() {
        let arg = Argument::variable("id");
        let text = serde_json::to_string(&arg).unwrap();
        assert!(text.contains("\"variableName\":\"id\""));

        let back: Argument = serde_json::from_str(&text).unwrap();
        assert_eq!(back, arg);
    }
}
