//! Field trees and operations

use crate::arguments::Argument;
use crate::variables::Variables;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root record key for queries
pub const QUERY_ROOT: &str = "QUERY_ROOT";
/// Root record key for mutations
pub const MUTATION_ROOT: &str = "MUTATION_ROOT";
/// Root record key for subscriptions
pub const SUBSCRIPTION_ROOT: &str = "SUBSCRIPTION_ROOT";

/// Built-in scalar types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    String,
    Int,
    Float,
    Boolean,
    Id,
    Enum,
}

impl std::fmt::Display for ScalarType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScalarType::String => write!(f, "String"),
            ScalarType::Int => write!(f, "Int"),
            ScalarType::Float => write!(f, "Float"),
            ScalarType::Boolean => write!(f, "Boolean"),
            ScalarType::Id => write!(f, "ID"),
            ScalarType::Enum => write!(f, "Enum"),
        }
    }
}

/// Shape of a field's value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldType {
    /// Built-in scalar
    Scalar { scalar: ScalarType },
    /// Custom scalar, decoded through a registered adapter on read
    Custom { type_name: String },
    /// Composite type with its own selection set
    Object { selections: Vec<Selection> },
    /// List of any field type, nesting allowed
    List { item: Box<FieldType> },
}

impl FieldType {
    pub fn scalar(scalar: ScalarType) -> Self {
        FieldType::Scalar { scalar }
    }

    pub fn custom(type_name: impl Into<String>) -> Self {
        FieldType::Custom {
            type_name: type_name.into(),
        }
    }

    pub fn object(selections: Vec<Selection>) -> Self {
        FieldType::Object { selections }
    }

    pub fn list(item: FieldType) -> Self {
        FieldType::List {
            item: Box::new(item),
        }
    }
}

/// One selected field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Key in the response (the alias when aliased)
    pub response_name: String,
    /// Schema field name
    pub field_name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub arguments: BTreeMap<String, Argument>,
    /// Whether the schema allows the field to be null or absent
    #[serde(default)]
    pub optional: bool,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl Field {
    pub fn new(
        response_name: impl Into<String>,
        field_name: impl Into<String>,
        field_type: FieldType,
    ) -> Self {
        Self {
            response_name: response_name.into(),
            field_name: field_name.into(),
            arguments: BTreeMap::new(),
            optional: false,
            field_type,
        }
    }

    pub fn scalar(name: &str, scalar: ScalarType) -> Self {
        Self::new(name, name, FieldType::scalar(scalar))
    }

    pub fn custom(name: &str, type_name: &str) -> Self {
        Self::new(name, name, FieldType::custom(type_name))
    }

    pub fn object(name: &str, selections: Vec<Selection>) -> Self {
        Self::new(name, name, FieldType::object(selections))
    }

    pub fn list(name: &str, item: FieldType) -> Self {
        Self::new(name, name, FieldType::list(item))
    }

    /// The `__typename` meta field
    pub fn typename() -> Self {
        Self::scalar("__typename", ScalarType::String)
    }

    /// Expose the field under a different response name
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.response_name = alias.into();
        self
    }

    pub fn with_argument(mut self, name: impl Into<String>, argument: Argument) -> Self {
        self.arguments.insert(name.into(), argument);
        self
    }

    /// Mark the field as nullable
    pub fn nullable(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Arguments with variables substituted, as one JSON object
    pub fn resolve_arguments(&self, variables: &Variables) -> serde_json::Value {
        serde_json::Value::Object(
            self.arguments
                .iter()
                .map(|(name, arg)| (name.clone(), arg.resolve(variables)))
                .collect(),
        )
    }
}

/// A type-conditional sub-selection (inline fragment or fragment spread)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conditional {
    /// Concrete typenames this branch applies to
    pub type_conditions: Vec<String>,
    pub selections: Vec<Selection>,
}

impl Conditional {
    pub fn new(type_conditions: Vec<String>, selections: Vec<Selection>) -> Self {
        Self {
            type_conditions,
            selections,
        }
    }

    /// Whether the branch applies to an object of the given typename
    pub fn matches(&self, typename: Option<&str>) -> bool {
        match typename {
            Some(name) => self.type_conditions.iter().any(|t| t == name),
            None => false,
        }
    }
}

/// Entry in a selection set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    Field(Field),
    Conditional(Conditional),
}

impl From<Field> for Selection {
    fn from(field: Field) -> Self {
        Selection::Field(field)
    }
}

impl From<Conditional> for Selection {
    fn from(conditional: Conditional) -> Self {
        Selection::Conditional(conditional)
    }
}

/// Operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Query,
    Mutation,
    Subscription,
}

impl OperationType {
    /// Key of the record holding this operation's root fields
    pub fn root_key(&self) -> &'static str {
        match self {
            OperationType::Query => QUERY_ROOT,
            OperationType::Mutation => MUTATION_ROOT,
            OperationType::Subscription => SUBSCRIPTION_ROOT,
        }
    }
}

/// A typed operation ready to execute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub name: String,
    pub operation_type: OperationType,
    pub selections: Vec<Selection>,
    #[serde(default)]
    pub variables: Variables,
}

impl Operation {
    pub fn new(
        name: impl Into<String>,
        operation_type: OperationType,
        selections: Vec<Selection>,
    ) -> Self {
        Self {
            name: name.into(),
            operation_type,
            selections,
            variables: Variables::new(),
        }
    }

    pub fn query(name: impl Into<String>, selections: Vec<Selection>) -> Self {
        Self::new(name, OperationType::Query, selections)
    }

    pub fn mutation(name: impl Into<String>, selections: Vec<Selection>) -> Self {
        Self::new(name, OperationType::Mutation, selections)
    }

    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = variables;
        self
    }

    pub fn root_key(&self) -> &'static str {
        self.operation_type.root_key()
    }

    /// Parse a JSON operation descriptor
    pub fn from_json_str(text: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
