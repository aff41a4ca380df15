//! Variable bindings and input object marshaling

use crate::writer::to_canonical_string;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// Custom input types write themselves field by field
///
/// The same marshaled form is used for the wire payload and for cache keys.
pub trait InputMarshaller {
    fn marshal(&self, writer: &mut InputFieldWriter) -> Result<()>;
}

/// Collects the fields of one input object
///
/// `None` values are written as explicit `null`.
#[derive(Debug, Default)]
pub struct InputFieldWriter {
    fields: Map<String, Value>,
}

impl InputFieldWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_string(&mut self, name: &str, value: Option<&str>) {
        self.put(name, value.map(|s| Value::String(s.to_string())));
    }

    pub fn write_int(&mut self, name: &str, value: Option<i64>) {
        self.put(name, value.map(Value::from));
    }

    pub fn write_float(&mut self, name: &str, value: Option<f64>) -> Result<()> {
        let value = match value {
            Some(f) => Some(Value::Number(Number::from_f64(f).ok_or_else(|| {
                Error::InvalidInput {
                    field: name.to_string(),
                    message: format!("{} is not a finite number", f),
                }
            })?)),
            None => None,
        };
        self.put(name, value);
        Ok(())
    }

    pub fn write_boolean(&mut self, name: &str, value: Option<bool>) {
        self.put(name, value.map(Value::Bool));
    }

    /// Write an already-encoded custom scalar or enum value
    pub fn write_custom(&mut self, name: &str, value: Option<Value>) {
        self.put(name, value);
    }

    /// Write a nested input object
    pub fn write_object(&mut self, name: &str, value: Option<&dyn InputMarshaller>) -> Result<()> {
        let value = match value {
            Some(input) => Some(marshal(input)?),
            None => None,
        };
        self.put(name, value);
        Ok(())
    }

    /// Write a list of nested input objects
    pub fn write_object_list(
        &mut self,
        name: &str,
        values: Option<&[&dyn InputMarshaller]>,
    ) -> Result<()> {
        let value = match values {
            Some(items) => Some(Value::Array(
                items
                    .iter()
                    .map(|item| marshal(*item))
                    .collect::<Result<Vec<_>>>()?,
            )),
            None => None,
        };
        self.put(name, value);
        Ok(())
    }

    /// Write a list of scalar values
    pub fn write_list(&mut self, name: &str, values: Option<Vec<Value>>) {
        self.put(name, values.map(Value::Array));
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    fn put(&mut self, name: &str, value: Option<Value>) {
        self.fields
            .insert(name.to_string(), value.unwrap_or(Value::Null));
    }
}

/// Marshal an input object into its canonical JSON value
pub fn marshal(input: &dyn InputMarshaller) -> Result<Value> {
    let mut writer = InputFieldWriter::new();
    input.marshal(&mut writer)?;
    Ok(writer.into_value())
}

/// Variable bindings for one operation execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Variables(BTreeMap<String, Value>);

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a scalar, list or pre-built JSON value
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Bind a custom input object
    pub fn with_input(
        mut self,
        name: impl Into<String>,
        input: &dyn InputMarshaller,
    ) -> Result<Self> {
        self.0.insert(name.into(), marshal(input)?);
        Ok(self)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Variables as the JSON object sent to the server
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Canonical wire serialization of the variables object
    pub fn to_wire_json(&self) -> String {
        to_canonical_string(&self.to_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct ReviewInput {
        stars: i64,
        commentary: Option<String>,
        favorite_color: ColorInput,
    }

    struct ColorInput {
        red: i64,
        green: f64,
    }

    impl InputMarshaller for ColorInput {
        fn marshal(&self, writer: &mut InputFieldWriter) -> Result<()> {
            writer.write_int("red", Some(self.red));
            writer.write_float("green", Some(self.green))?;
            Ok(())
        }
    }

    impl InputMarshaller for ReviewInput {
        fn marshal(&self, writer: &mut InputFieldWriter) -> Result<()> {
            writer.write_int("stars", Some(self.stars));
            writer.write_string("commentary", self.commentary.as_deref());
            writer.write_object("favoriteColor", Some(&self.favorite_color))?;
            Ok(())
        }
    }

    #[test]
    fn test_input_marshaling() {
        let review = ReviewInput {
            stars: 5,
            commentary: None,
            favorite_color: ColorInput { red: 0, green: 0.5 },
        };

        let vars = Variables::new()
            .with("episode", "JEDI")
            .with_input("review", &review)
            .unwrap();

        assert_eq!(
            vars.get("review"),
            Some(&json!({"stars": 5, "commentary": null, "favoriteColor": {"red": 0, "green": 0.5}}))
        );
        assert_eq!(
            vars.to_wire_json(),
            r#"{"episode":"JEDI","review":{"commentary":null,"favoriteColor":{"green":0.5,"red":0},"stars":5}}"#
        );
    }

    #[test]
    fn test_non_finite_float_rejected() {
        let mut writer = InputFieldWriter::new();
        let result = writer.write_float("ratio", Some(f64::NAN));
        assert!(matches!(result, Err(Error::InvalidInput { .. })));
    }

    #[test]
    fn test_variables_deserialize_transparent() {
        let vars: Variables = serde_json::from_str(r#"{"id": "1000", "first": 3}"#).unwrap();
        assert_eq!(vars.len(), 2);
        assert_eq!(vars.get("first"), Some(&json!(3)));
    }
}
