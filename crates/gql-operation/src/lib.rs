//! Typed GraphQL operation descriptors
//!
//! The data a GraphQL code generator hands to a normalized cache: the field
//! tree of an operation, argument templates that may reference variables,
//! variable bindings, and adapters for custom scalar types.
//!
//! Everything here is plain data. A field tree can be built in Rust or
//! deserialized from a JSON descriptor produced by a compiler.
//!
//! # Example
//!
//! ```
//! use gql_operation::{Argument, Field, Operation, ScalarType, Selection, Variables};
//!
//! let hero = Field::object(
//!     "hero",
//!     vec![
//!         Selection::Field(Field::typename()),
//!         Selection::Field(Field::scalar("name", ScalarType::String)),
//!     ],
//! )
//! .with_argument("episode", Argument::variable("episode"));
//!
//! let op = Operation::query("HeroName", vec![Selection::Field(hero)])
//!     .with_variables(Variables::new().with("episode", "JEDI"));
//!
//! assert_eq!(op.root_key(), "QUERY_ROOT");
//! assert_eq!(op.variables.to_wire_json(), r#"{"episode":"JEDI"}"#);
//! ```

mod arguments;
mod field;
mod scalar;
mod variables;
pub mod writer;

pub use arguments::Argument;
pub use field::{
    Conditional, Field, FieldType, Operation, OperationType, ScalarType, Selection, MUTATION_ROOT,
    QUERY_ROOT, SUBSCRIPTION_ROOT,
};
pub use scalar::{CustomScalarAdapter, ScalarAdapters};
pub use variables::{marshal, InputFieldWriter, InputMarshaller, Variables};

use thiserror::Error;

/// Errors raised while building operations or converting scalar values
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid input value for {field}: {message}")]
    InvalidInput { field: String, message: String },

    #[error("Custom scalar {type_name} could not be decoded: {message}")]
    ScalarDecode { type_name: String, message: String },

    #[error("Custom scalar {type_name} could not be encoded: {message}")]
    ScalarEncode { type_name: String, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for operation building
pub type Result<T> = std::result::Result<T, Error>;
