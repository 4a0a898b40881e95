//! The contract every persisted entity implements.
//!
//! # Responsibility
//! - Describe how an entity is constructed from factory arguments.
//! - Describe how an entity maps to and from table columns.
//!
//! # Invariants
//! - `Model::construct` must be free of side effects; factories may build
//!   and discard instances.
//! - Table and column names are plain SQL identifiers.

use crate::model::value::{FieldValue, Params};
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

pub type ModelResult<T> = Result<T, ModelError>;

/// Construction/hydration failure for a model.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    MissingField {
        model: &'static str,
        field: String,
    },
    InvalidField {
        model: &'static str,
        field: String,
        message: String,
    },
    TooManyPositional {
        model: &'static str,
        expected: usize,
        got: usize,
    },
}

impl Display for ModelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField { model, field } => {
                write!(f, "{model}: missing value for field `{field}`")
            }
            Self::InvalidField {
                model,
                field,
                message,
            } => write!(f, "{model}: invalid value for field `{field}`: {message}"),
            Self::TooManyPositional {
                model,
                expected,
                got,
            } => write!(
                f,
                "{model}: takes at most {expected} positional arguments, got {got}"
            ),
        }
    }
}

impl Error for ModelError {}

/// An ORM-mapped entity a factory can construct, look up and persist.
pub trait Model: Sized {
    /// Table backing this model.
    fn table() -> &'static str;

    /// Column names bound by positional constructor arguments, in order.
    fn positional_fields() -> &'static [&'static str] {
        &[]
    }

    /// Builds an instance from positional and keyword arguments.
    fn construct(args: &[FieldValue], kwargs: &Params) -> ModelResult<Self>;

    /// Hydrates an instance from a loaded row.
    fn from_params(params: &Params) -> ModelResult<Self> {
        Self::construct(&[], params)
    }

    /// Columns written on insert. Unset generated keys should be omitted.
    fn to_params(&self) -> Params;

    /// Receives the generated rowid after the instance has been inserted.
    fn assign_row_id(&mut self, _row_id: i64) {}
}

/// Returns whether `name` can be interpolated into SQL as an identifier.
pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER_RE.is_match(name)
}

/// Names positional arguments with `M::positional_fields()`.
pub fn bind_positional<M: Model>(args: &[FieldValue]) -> ModelResult<Params> {
    let fields = M::positional_fields();
    if args.len() > fields.len() {
        return Err(ModelError::TooManyPositional {
            model: M::table(),
            expected: fields.len(),
            got: args.len(),
        });
    }

    Ok(fields
        .iter()
        .zip(args.iter())
        .map(|(name, value)| (*name, value.clone()))
        .collect())
}

/// Merges bound positional arguments under keyword arguments.
///
/// A name given both positionally and by keyword keeps the keyword value.
pub fn merge_arguments<M: Model>(args: &[FieldValue], kwargs: &Params) -> ModelResult<Params> {
    let mut merged = bind_positional::<M>(args)?;
    merged.extend_from(kwargs);
    Ok(merged)
}

/// Reads a required text column.
pub fn text_field(model: &'static str, params: &Params, field: &str) -> ModelResult<String> {
    match params.get(field) {
        Some(FieldValue::Text(value)) => Ok(value.clone()),
        Some(FieldValue::Null) | None => Err(ModelError::MissingField {
            model,
            field: field.to_string(),
        }),
        Some(other) => Err(type_mismatch(model, field, "text", other)),
    }
}

/// Reads an optional text column; absent and NULL both map to `None`.
pub fn optional_text_field(
    model: &'static str,
    params: &Params,
    field: &str,
) -> ModelResult<Option<String>> {
    match params.get(field) {
        Some(FieldValue::Text(value)) => Ok(Some(value.clone())),
        Some(FieldValue::Null) | None => Ok(None),
        Some(other) => Err(type_mismatch(model, field, "text", other)),
    }
}

/// Reads a required integer column.
pub fn integer_field(model: &'static str, params: &Params, field: &str) -> ModelResult<i64> {
    match params.get(field) {
        Some(FieldValue::Integer(value)) => Ok(*value),
        Some(FieldValue::Null) | None => Err(ModelError::MissingField {
            model,
            field: field.to_string(),
        }),
        Some(other) => Err(type_mismatch(model, field, "integer", other)),
    }
}

/// Reads an optional integer column; absent and NULL both map to `None`.
pub fn optional_integer_field(
    model: &'static str,
    params: &Params,
    field: &str,
) -> ModelResult<Option<i64>> {
    match params.get(field) {
        Some(FieldValue::Integer(value)) => Ok(Some(*value)),
        Some(FieldValue::Null) | None => Ok(None),
        Some(other) => Err(type_mismatch(model, field, "integer", other)),
    }
}

fn type_mismatch(
    model: &'static str,
    field: &str,
    expected: &str,
    got: &FieldValue,
) -> ModelError {
    ModelError::InvalidField {
        model,
        field: field.to_string(),
        message: format!("expected {expected}, got {}", got.type_name()),
    }
}
