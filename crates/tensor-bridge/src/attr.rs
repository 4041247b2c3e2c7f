//! Named, typed attribute records forming the engine calling convention.
//!
//! Every engine invocation carries an ordered attribute list describing the
//! operation's parameters. The set of attribute kinds is closed so engines can
//! match exhaustively; the list's length and content stay per-call flexible.

use serde::{Deserialize, Serialize};

use crate::dtype::DType;

/// Closed union of attribute payload kinds understood by engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f32),
    Str(String),
    IntList(Vec<i64>),
    Type(DType),
}

/// A single named operation parameter. Immutable once constructed; attribute
/// lists are rebuilt per call, never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    name: String,
    value: AttrValue,
}

impl Attribute {
    fn new(name: impl Into<String>, value: AttrValue) -> Self {
        Attribute {
            name: name.into(),
            value,
        }
    }

    /// Marshals a dtype parameter (e.g. the `T` attribute of a generic op).
    pub fn dtype(name: impl Into<String>, dtype: DType) -> Self {
        Attribute::new(name, AttrValue::Type(dtype))
    }

    /// Marshals a boolean flag parameter.
    pub fn bool(name: impl Into<String>, value: bool) -> Self {
        Attribute::new(name, AttrValue::Bool(value))
    }

    /// Marshals a scalar integer parameter.
    pub fn int(name: impl Into<String>, value: i64) -> Self {
        Attribute::new(name, AttrValue::Int(value))
    }

    /// Marshals a scalar float parameter.
    pub fn float(name: impl Into<String>, value: f32) -> Self {
        Attribute::new(name, AttrValue::Float(value))
    }

    /// Marshals a string parameter.
    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Attribute::new(name, AttrValue::Str(value.into()))
    }

    /// Marshals a rank-1 integer list parameter (axes, shapes, strides).
    pub fn int_list(name: impl Into<String>, values: impl Into<Vec<i64>>) -> Self {
        Attribute::new(name, AttrValue::IntList(values.into()))
    }

    /// Returns the attribute name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the attribute payload.
    pub fn value(&self) -> &AttrValue {
        &self.value
    }
}

/// Finds an attribute by name in an invocation's attribute list.
pub fn find<'a>(attrs: &'a [Attribute], name: &str) -> Option<&'a AttrValue> {
    attrs
        .iter()
        .find(|attr| attr.name == name)
        .map(|attr| &attr.value)
}

/// Typed accessors engines use to pull expected attributes out of a list.
/// Each returns `None` when the attribute is absent or of the wrong kind.
pub fn get_dtype(attrs: &[Attribute], name: &str) -> Option<DType> {
    match find(attrs, name) {
        Some(AttrValue::Type(dtype)) => Some(*dtype),
        _ => None,
    }
}

pub fn get_bool(attrs: &[Attribute], name: &str) -> Option<bool> {
    match find(attrs, name) {
        Some(AttrValue::Bool(value)) => Some(*value),
        _ => None,
    }
}

pub fn get_int(attrs: &[Attribute], name: &str) -> Option<i64> {
    match find(attrs, name) {
        Some(AttrValue::Int(value)) => Some(*value),
        _ => None,
    }
}

pub fn get_int_list<'a>(attrs: &'a [Attribute], name: &str) -> Option<&'a [i64]> {
    match find(attrs, name) {
        Some(AttrValue::IntList(values)) => Some(values),
        _ => None,
    }
}
