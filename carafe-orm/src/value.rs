//! # Value Module
//!
//! Values flow through the ORM in two shapes:
//!
//! - [`Value`]: a storage scalar, exactly what is bound as a query parameter or read
//!   back from a row.
//! - [`FieldValue`]: the internal value held by a model field after casting. Besides
//!   plain scalars it can be an enum case, a chrono date/time, an unresolved relation
//!   proxy or an already resolved related model.
//!
//! Rust struct fields are converted to and from [`FieldValue`] by the generated
//! accessor table through [`IntoFieldValue`] and [`FromFieldValue`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use carafe_orm::{FieldValue, FromFieldValue, IntoFieldValue, Value};
//!
//! let v = 42i64.into_field_value();
//! assert_eq!(v, FieldValue::Value(Value::Int(42)));
//! assert_eq!(i64::from_field_value(v)?, 42);
//! ```

// ============================================================================
// External Crate Imports
// ============================================================================

use std::{collections::HashMap, fmt, sync::Arc};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Serialize, Serializer, ser::SerializeMap};

// ============================================================================
// Internal Crate Imports
// ============================================================================

use crate::{
    errors::{Error, Result},
    field::Relation,
    model::DynModel,
};

// ============================================================================
// Storage Value
// ============================================================================

/// A storage scalar as bound to or read from the data source.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

/// A row returned by a connection, keyed by column name.
pub type Row = HashMap<String, Value>;

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(*b as i64),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::String(s) => s.trim().parse().ok(),
            Value::Null => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{}", s),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(x) => serializer.serialize_f64(*x),
            Value::String(s) => serializer.serialize_str(s),
        }
    }
}

macro_rules! impl_value_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::Int(v as i64)
                }
            }
        )*
    };
}

impl_value_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

// ============================================================================
// Internal Field Value
// ============================================================================

/// A case of a backed enum as held by an enum field.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumCase {
    pub name: String,
    pub value: Value,
}

/// The raw foreign key of a one-to-one relation that has not been resolved yet.
#[derive(Debug, Clone)]
pub struct ProxyValue {
    pub relation: Arc<Relation>,
    pub value: Value,
}

/// Internal value of a model field.
#[derive(Clone)]
pub enum FieldValue {
    Value(Value),
    Enum(EnumCase),
    DateTime(NaiveDateTime),
    Date(NaiveDate),
    Proxy(ProxyValue),
    Model(Arc<dyn DynModel>),
}

impl FieldValue {
    pub const NULL: FieldValue = FieldValue::Value(Value::Null);

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Value(Value::Null))
    }

    /// Returns true for values that may be used as lookup keys.
    pub fn is_scalar(&self) -> bool {
        matches!(self, FieldValue::Value(_))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            FieldValue::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Value(v) => f.debug_tuple("Value").field(v).finish(),
            FieldValue::Enum(c) => f.debug_tuple("Enum").field(c).finish(),
            FieldValue::DateTime(dt) => f.debug_tuple("DateTime").field(dt).finish(),
            FieldValue::Date(d) => f.debug_tuple("Date").field(d).finish(),
            FieldValue::Proxy(p) => f.debug_tuple("Proxy").field(&p.value).finish(),
            FieldValue::Model(m) => f.debug_tuple("Model").field(&m.model_type().name()).finish(),
        }
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldValue::Value(a), FieldValue::Value(b)) => a == b,
            (FieldValue::Enum(a), FieldValue::Enum(b)) => a == b,
            (FieldValue::DateTime(a), FieldValue::DateTime(b)) => a == b,
            (FieldValue::Date(a), FieldValue::Date(b)) => a == b,
            (FieldValue::Proxy(a), FieldValue::Proxy(b)) => {
                Arc::ptr_eq(&a.relation, &b.relation) && a.value == b.value
            }
            (FieldValue::Model(a), FieldValue::Model(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<Value> for FieldValue {
    fn from(v: Value) -> Self {
        FieldValue::Value(v)
    }
}

macro_rules! impl_field_value_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for FieldValue {
                fn from(v: $t) -> Self {
                    FieldValue::Value(Value::from(v))
                }
            }
        )*
    };
}

impl_field_value_from!(i8, i16, i32, i64, u8, u16, u32, f32, f64, bool, String, &str);

impl From<NaiveDateTime> for FieldValue {
    fn from(v: NaiveDateTime) -> Self {
        FieldValue::DateTime(v)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(v: NaiveDate) -> Self {
        FieldValue::Date(v)
    }
}

// ============================================================================
// Rust Field Conversions
// ============================================================================

/// Converts a Rust struct field into the internal value of its ORM field.
pub trait IntoFieldValue {
    fn into_field_value(&self) -> FieldValue;
}

/// Builds a Rust struct field from the internal value of its ORM field.
pub trait FromFieldValue: Sized {
    fn from_field_value(value: FieldValue) -> Result<Self>;
}

/// Strips a proxy down to its raw value so plain key fields can share a column with a relation.
fn scalar(value: FieldValue) -> FieldValue {
    match value {
        FieldValue::Proxy(p) => FieldValue::Value(p.value),
        FieldValue::Enum(c) => FieldValue::Value(c.value),
        other => other,
    }
}

fn mismatch<T>(expected: &str, value: &FieldValue) -> Result<T> {
    Err(Error::conversion(format!("cannot read {:?} as {}", value, expected)))
}

impl IntoFieldValue for FieldValue {
    fn into_field_value(&self) -> FieldValue {
        self.clone()
    }
}

impl FromFieldValue for FieldValue {
    fn from_field_value(value: FieldValue) -> Result<Self> {
        Ok(value)
    }
}

impl IntoFieldValue for Value {
    fn into_field_value(&self) -> FieldValue {
        FieldValue::Value(self.clone())
    }
}

impl FromFieldValue for Value {
    fn from_field_value(value: FieldValue) -> Result<Self> {
        match scalar(value) {
            FieldValue::Value(v) => Ok(v),
            other => mismatch("a scalar", &other),
        }
    }
}

macro_rules! impl_int_field {
    ($($t:ty),*) => {
        $(
            impl IntoFieldValue for $t {
                fn into_field_value(&self) -> FieldValue {
                    FieldValue::Value(Value::Int(*self as i64))
                }
            }

            impl FromFieldValue for $t {
                fn from_field_value(value: FieldValue) -> Result<Self> {
                    let value = scalar(value);
                    let int = value.as_value().and_then(Value::as_i64);
                    match int.and_then(|i| <$t>::try_from(i).ok()) {
                        Some(i) => Ok(i),
                        None => mismatch(stringify!($t), &value),
                    }
                }
            }
        )*
    };
}

impl_int_field!(i16, i32, i64, u16, u32);

impl IntoFieldValue for f64 {
    fn into_field_value(&self) -> FieldValue {
        FieldValue::Value(Value::Float(*self))
    }
}

impl FromFieldValue for f64 {
    fn from_field_value(value: FieldValue) -> Result<Self> {
        let value = scalar(value);
        match value.as_value().and_then(Value::as_f64) {
            Some(f) => Ok(f),
            None => mismatch("f64", &value),
        }
    }
}

impl IntoFieldValue for bool {
    fn into_field_value(&self) -> FieldValue {
        FieldValue::Value(Value::Bool(*self))
    }
}

impl FromFieldValue for bool {
    fn from_field_value(value: FieldValue) -> Result<Self> {
        match scalar(value) {
            FieldValue::Value(Value::Bool(b)) => Ok(b),
            FieldValue::Value(Value::Int(i)) => Ok(i != 0),
            other => mismatch("bool", &other),
        }
    }
}

impl IntoFieldValue for String {
    fn into_field_value(&self) -> FieldValue {
        FieldValue::Value(Value::String(self.clone()))
    }
}

impl FromFieldValue for String {
    fn from_field_value(value: FieldValue) -> Result<Self> {
        match scalar(value) {
            FieldValue::Value(Value::String(s)) => Ok(s),
            FieldValue::Value(v @ (Value::Int(_) | Value::Float(_) | Value::Bool(_))) => Ok(v.to_string()),
            other => mismatch("String", &other),
        }
    }
}

impl IntoFieldValue for NaiveDateTime {
    fn into_field_value(&self) -> FieldValue {
        FieldValue::DateTime(*self)
    }
}

impl FromFieldValue for NaiveDateTime {
    fn from_field_value(value: FieldValue) -> Result<Self> {
        match value {
            FieldValue::DateTime(dt) => Ok(dt),
            FieldValue::Date(d) => Ok(d.and_time(chrono::NaiveTime::MIN)),
            other => mismatch("NaiveDateTime", &other),
        }
    }
}

impl IntoFieldValue for NaiveDate {
    fn into_field_value(&self) -> FieldValue {
        FieldValue::Date(*self)
    }
}

impl FromFieldValue for NaiveDate {
    fn from_field_value(value: FieldValue) -> Result<Self> {
        match value {
            FieldValue::Date(d) => Ok(d),
            FieldValue::DateTime(dt) => Ok(dt.date()),
            other => mismatch("NaiveDate", &other),
        }
    }
}

impl<T: IntoFieldValue> IntoFieldValue for Option<T> {
    fn into_field_value(&self) -> FieldValue {
        match self {
            Some(v) => v.into_field_value(),
            None => FieldValue::NULL,
        }
    }
}

impl<T: FromFieldValue> FromFieldValue for Option<T> {
    fn from_field_value(value: FieldValue) -> Result<Self> {
        if value.is_null() { Ok(None) } else { T::from_field_value(value).map(Some) }
    }
}

// ============================================================================
// Backed Enums
// ============================================================================

/// A Rust enum whose cases map to storage values.
///
/// Wire an implementation into model accessors with [`impl_orm_enum!`](crate::impl_orm_enum).
pub trait OrmEnum: Sized + Clone + Send + Sync + 'static {
    /// Every case with its storage value, in declaration order.
    fn cases() -> Vec<(Self, Value)>;

    /// The name of this case.
    fn case_name(&self) -> &'static str;

    /// The name of the enum, used in error messages.
    fn enum_name() -> &'static str {
        std::any::type_name::<Self>()
    }

    fn from_case(case: &EnumCase) -> Option<Self> {
        Self::cases().into_iter().map(|(c, _)| c).find(|c| c.case_name() == case.name)
    }

    fn to_case(&self) -> EnumCase {
        let name = self.case_name();
        let value = Self::cases()
            .into_iter()
            .find(|(c, _)| c.case_name() == name)
            .map(|(_, v)| v)
            .unwrap_or(Value::Null);
        EnumCase { name: name.to_string(), value }
    }
}

/// Implements [`IntoFieldValue`] and [`FromFieldValue`] for types implementing [`OrmEnum`].
///
/// ```rust,ignore
/// #[derive(Clone, Debug, PartialEq, Default)]
/// enum Status { #[default] Yes, No }
///
/// impl OrmEnum for Status {
///     fn cases() -> Vec<(Self, Value)> { vec![(Status::Yes, "Y".into()), (Status::No, "N".into())] }
///     fn case_name(&self) -> &'static str { match self { Status::Yes => "Yes", Status::No => "No" } }
/// }
///
/// carafe_orm::impl_orm_enum!(Status);
/// ```
#[macro_export]
macro_rules! impl_orm_enum {
    ($($t:ty),+ $(,)?) => {
        $(
            impl $crate::IntoFieldValue for $t {
                fn into_field_value(&self) -> $crate::FieldValue {
                    $crate::FieldValue::Enum(<$t as $crate::OrmEnum>::to_case(self))
                }
            }

            impl $crate::FromFieldValue for $t {
                fn from_field_value(value: $crate::FieldValue) -> $crate::Result<Self> {
                    match value {
                        $crate::FieldValue::Enum(case) => <$t as $crate::OrmEnum>::from_case(&case).ok_or_else(|| {
                            $crate::Error::InvalidEnumValue {
                                enum_name: <$t as $crate::OrmEnum>::enum_name().to_string(),
                                value: case.name.clone(),
                            }
                        }),
                        other => Err($crate::Error::conversion(format!(
                            "cannot read {:?} as {}",
                            other,
                            <$t as $crate::OrmEnum>::enum_name()
                        ))),
                    }
                }
            }
        )+
    };
}

// ============================================================================
// Ordered Model Arrays
// ============================================================================

/// A value inside a [`ModelArray`].
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayValue {
    Value(Value),
    Model(ModelArray),
}

/// The plain representation of a model, keyed by field name in declaration order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelArray {
    entries: Vec<(String, ArrayValue)>,
}

impl ModelArray {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a key, keeping the position of an existing entry.
    pub fn insert(&mut self, key: impl Into<String>, value: ArrayValue) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&ArrayValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArrayValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Renders the array as a JSON string, keeping key order.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::conversion(e.to_string()))
    }
}

impl Serialize for ArrayValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ArrayValue::Value(v) => v.serialize(serializer),
            ArrayValue::Model(m) => m.serialize(serializer),
        }
    }
}

impl Serialize for ModelArray {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_fields_accept_numeric_values() {
        assert_eq!(i64::from_field_value(FieldValue::from("12")).unwrap(), 12);
        assert_eq!(i32::from_field_value(FieldValue::from(7i64)).unwrap(), 7);
        assert!(u32::from_field_value(FieldValue::from(-1i64)).is_err());
        assert!(i64::from_field_value(FieldValue::NULL).is_err());
    }

    #[test]
    fn options_map_null_to_none() {
        assert_eq!(Option::<String>::from_field_value(FieldValue::NULL).unwrap(), None);
        assert_eq!(Option::<i64>::None.into_field_value(), FieldValue::NULL);
        assert_eq!(
            Option::<String>::from_field_value(FieldValue::from("x")).unwrap(),
            Some("x".to_string())
        );
    }

    #[test]
    fn model_array_keeps_insertion_order_in_json() {
        let mut array = ModelArray::new();
        array.insert("title", ArrayValue::Value("X".into()));
        array.insert("id", ArrayValue::Value(5.into()));
        array.insert("title", ArrayValue::Value("Y".into()));

        assert_eq!(array.keys().collect::<Vec<_>>(), vec!["title", "id"]);
        assert_eq!(array.to_json().unwrap(), r#"{"title":"Y","id":5}"#);
    }
}
