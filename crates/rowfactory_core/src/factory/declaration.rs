//! Attribute declarations and their resolution into constructor arguments.
//!
//! # Invariants
//! - Declarations resolve in declaration order.
//! - Caller-supplied values replace declarations and are never evaluated.
//! - Lazy declarations see caller values and every field resolved before them.

use crate::model::value::{FieldValue, Params};
use std::fmt::{Debug, Formatter};
use std::rc::Rc;
use uuid::Uuid;

/// How a factory produces one attribute when the caller does not supply it.
#[derive(Clone)]
pub enum Declaration {
    /// Fixed value.
    Value(FieldValue),
    /// Value derived from the factory's sequence number.
    Sequence(Rc<dyn Fn(u64) -> FieldValue>),
    /// Value derived from the attributes resolved so far.
    Lazy(Rc<dyn Fn(&Params) -> FieldValue>),
    /// Fresh random v4 UUID rendered as text.
    Uuid,
}

impl Declaration {
    pub fn value(value: impl Into<FieldValue>) -> Self {
        Self::Value(value.into())
    }

    pub fn sequence<F, V>(build: F) -> Self
    where
        F: Fn(u64) -> V + 'static,
        V: Into<FieldValue>,
    {
        Self::Sequence(Rc::new(move |n| build(n).into()))
    }

    pub fn lazy<F, V>(build: F) -> Self
    where
        F: Fn(&Params) -> V + 'static,
        V: Into<FieldValue>,
    {
        Self::Lazy(Rc::new(move |resolved| build(resolved).into()))
    }

    fn evaluate(&self, sequence: u64, resolved: &Params) -> FieldValue {
        match self {
            Self::Value(value) => value.clone(),
            Self::Sequence(build) => build(sequence),
            Self::Lazy(build) => build(resolved),
            Self::Uuid => FieldValue::Text(Uuid::new_v4().to_string()),
        }
    }
}

impl Debug for Declaration {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Sequence(_) => f.write_str("Sequence(..)"),
            Self::Lazy(_) => f.write_str("Lazy(..)"),
            Self::Uuid => f.write_str("Uuid"),
        }
    }
}

/// Resolves `declarations` against caller `overrides` for one instance.
///
/// Declared fields come first in declaration order, followed by caller
/// fields that have no declaration, in caller order.
pub(crate) fn resolve(
    declarations: &[(String, Declaration)],
    overrides: &Params,
    sequence: u64,
) -> Params {
    let mut resolved = Params::new();

    for (name, declaration) in declarations {
        let value = match overrides.get(name) {
            Some(value) => value.clone(),
            None => {
                let mut visible = resolved.clone();
                visible.extend_from(overrides);
                declaration.evaluate(sequence, &visible)
            }
        };
        resolved.insert(name.as_str(), value);
    }

    for (name, value) in overrides.iter() {
        if !resolved.contains(name) {
            resolved.insert(name, value.clone());
        }
    }

    resolved
}
