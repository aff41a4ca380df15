//! Field key canonicalization

use gql_operation::writer::to_canonical_string;
use gql_operation::{Field, Variables};

/// Field key for `field` under the given variable bindings
///
/// `fieldName` when there are no arguments, otherwise
/// `fieldName({"arg":value,...})` with variables substituted and object keys
/// sorted at every depth. The response alias never participates.
pub fn field_key(field: &Field, variables: &Variables) -> String {
    if field.arguments.is_empty() {
        return field.field_name.clone();
    }
    let arguments = field.resolve_arguments(variables);
    format!("{}({})", field.field_name, to_canonical_string(&arguments))
}
