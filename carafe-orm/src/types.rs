//! # Field Type Module
//!
//! [`FieldType`] describes the kind of value a field holds and converts values in
//! both directions:
//!
//! - `cast`: input (a storage scalar or an already structured value) → internal [`FieldValue`]
//! - `decast`: internal [`FieldValue`] → storage [`Value`]
//!
//! ## Kinds
//!
//! - `Int` / `Float` / `String`: numeric or string coercion
//! - `Decimal`: pass-through; `precision` and `scale` are metadata only and are not
//!   validated on cast
//! - `Enum`: maps storage values of a backed enum to its cases, otherwise pass-through
//! - `Datetime` / `Date`: parse with `format`, format back on decast
//! - `Related`: pass-through, carries the embedded field of a one-to-many alias
//!
//! `min` and `max` are stored for schema consumers and are not enforced on cast.
//!
//! ## Example
//!
//! ```rust,ignore
//! use carafe_orm::{FieldType, TypeOptions};
//!
//! let ty = FieldType::from_options("int", TypeOptions { min: Some(30.0), max: Some(40.0), is_null: true, ..Default::default() })?;
//! assert_eq!(ty.min(), Some(30.0));
//! ```

use std::{fmt, sync::Arc};

use crate::{
    errors::{Error, Result},
    field::Field,
    temporal::{self, DEFAULT_DATE_FORMAT, DEFAULT_DATETIME_FORMAT},
    value::{EnumCase, FieldValue, OrmEnum, Value},
};

// ============================================================================
// Kinds & Options
// ============================================================================

/// The closed set of field kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Int,
    Float,
    String,
    Decimal,
    Enum,
    Datetime,
    Date,
    Related,
}

impl FieldKind {
    /// Parses a kind name, ignoring case.
    pub fn parse(name: &str) -> Result<Self> {
        let kind = match name.to_ascii_lowercase().as_str() {
            "int" | "integer" => FieldKind::Int,
            "float" | "double" => FieldKind::Float,
            "string" | "text" => FieldKind::String,
            "decimal" => FieldKind::Decimal,
            "enum" => FieldKind::Enum,
            "datetime" => FieldKind::Datetime,
            "date" => FieldKind::Date,
            "related" => FieldKind::Related,
            other => return Err(Error::invalid_argument(format!("unknown field type `{}`", other))),
        };
        Ok(kind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Int => "int",
            FieldKind::Float => "float",
            FieldKind::String => "string",
            FieldKind::Decimal => "decimal",
            FieldKind::Enum => "enum",
            FieldKind::Datetime => "datetime",
            FieldKind::Date => "date",
            FieldKind::Related => "related",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An option of an enum field. Backed options carry their storage value.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumOption {
    pub name: String,
    pub value: Option<Value>,
}

impl EnumOption {
    pub fn plain(name: impl Into<String>) -> Self {
        Self { name: name.into(), value: None }
    }

    pub fn backed(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self { name: name.into(), value: Some(value.into()) }
    }
}

/// Optional properties accepted by [`FieldType::from_options`].
#[derive(Debug, Clone, Default)]
pub struct TypeOptions {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub format: Option<String>,
    pub options: Vec<EnumOption>,
    pub enum_name: Option<String>,
    pub is_null: bool,
}

/// Type options of an enum field backed by `E`.
pub fn enum_options<E: OrmEnum>() -> TypeOptions {
    let options = E::cases()
        .into_iter()
        .map(|(case, value)| EnumOption::backed(case.case_name(), value))
        .collect();
    TypeOptions { options, enum_name: Some(E::enum_name().to_string()), ..TypeOptions::default() }
}

// ============================================================================
// Field Type
// ============================================================================

/// Immutable description of the values a field holds.
#[derive(Debug, Clone)]
pub struct FieldType {
    kind: FieldKind,
    min: Option<f64>,
    max: Option<f64>,
    precision: Option<u32>,
    scale: Option<u32>,
    format: Option<String>,
    options: Vec<EnumOption>,
    enum_name: Option<String>,
    is_null: bool,
    field: Option<Arc<Field>>,
}

impl FieldType {
    fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            min: None,
            max: None,
            precision: None,
            scale: None,
            format: None,
            options: Vec::new(),
            enum_name: None,
            is_null: false,
            field: None,
        }
    }

    pub fn int() -> Self {
        Self { min: Some(0.0), max: Some(0xffff_ffff_u32 as f64), ..Self::new(FieldKind::Int) }
    }

    pub fn float() -> Self {
        Self { min: Some(0.0), max: Some(0xffff_ffff_u32 as f64), ..Self::new(FieldKind::Float) }
    }

    pub fn string() -> Self {
        Self::new(FieldKind::String)
    }

    pub fn decimal() -> Self {
        Self { precision: Some(12), scale: Some(2), ..Self::new(FieldKind::Decimal) }
    }

    /// A datetime field. Without an explicit format the context default applies.
    pub fn datetime() -> Self {
        Self::new(FieldKind::Datetime)
    }

    /// A date field. Without an explicit format the context default applies.
    pub fn date() -> Self {
        Self::new(FieldKind::Date)
    }

    /// An enum field over the given options. Fails when `options` is empty.
    pub fn enumeration(options: Vec<EnumOption>) -> Result<Self> {
        if options.is_empty() {
            return Err(Error::invalid_argument("enum options cannot be empty"));
        }
        Ok(Self { options, ..Self::new(FieldKind::Enum) })
    }

    /// An enum field backed by the cases of `E`.
    pub fn enum_of<E: OrmEnum>() -> Self {
        let opts = enum_options::<E>();
        Self { options: opts.options, enum_name: opts.enum_name, ..Self::new(FieldKind::Enum) }
    }

    /// A related field carrying the owning-side field of a one-to-many relation.
    pub fn related(field: Arc<Field>) -> Self {
        Self { field: Some(field), ..Self::new(FieldKind::Related) }
    }

    /// Creates a type from its name with default properties.
    pub fn from_string(name: &str) -> Result<Self> {
        Self::from_options(name, TypeOptions::default())
    }

    /// Creates a type from its name, overriding the defaults with `opts`.
    pub fn from_options(name: &str, opts: TypeOptions) -> Result<Self> {
        let mut ty = match FieldKind::parse(name)? {
            FieldKind::Int => Self::int(),
            FieldKind::Float => Self::float(),
            FieldKind::String => Self::string(),
            FieldKind::Decimal => Self::decimal(),
            FieldKind::Enum => Self::enumeration(opts.options.clone())?,
            FieldKind::Datetime => Self::datetime(),
            FieldKind::Date => Self::date(),
            FieldKind::Related => Self::new(FieldKind::Related),
        };
        if opts.min.is_some() {
            ty.min = opts.min;
        }
        if opts.max.is_some() {
            ty.max = opts.max;
        }
        if opts.precision.is_some() {
            ty.precision = opts.precision;
        }
        if opts.scale.is_some() {
            ty.scale = opts.scale;
        }
        if opts.enum_name.is_some() {
            ty.enum_name = opts.enum_name;
        }
        ty.format = opts.format.filter(|f| !f.is_empty());
        ty.is_null = opts.is_null;
        Ok(ty)
    }

    // ------------------------------------------------------------------------
    // Builders
    // ------------------------------------------------------------------------

    pub fn nullable(mut self, is_null: bool) -> Self {
        self.is_null = is_null;
        self
    }

    pub fn with_min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn with_max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn with_precision(mut self, precision: u32, scale: u32) -> Self {
        self.precision = Some(precision);
        self.scale = Some(scale);
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Fills in the format of date and datetime types declared without one.
    pub(crate) fn with_default_format(mut self, datetime_format: &str, date_format: &str) -> Self {
        if self.format.is_none() {
            match self.kind {
                FieldKind::Datetime => self.format = Some(datetime_format.to_string()),
                FieldKind::Date => self.format = Some(date_format.to_string()),
                _ => {}
            }
        }
        self
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn min(&self) -> Option<f64> {
        self.min
    }

    pub fn max(&self) -> Option<f64> {
        self.max
    }

    pub fn precision(&self) -> Option<u32> {
        self.precision
    }

    pub fn scale(&self) -> Option<u32> {
        self.scale
    }

    pub fn is_null(&self) -> bool {
        self.is_null
    }

    pub fn options(&self) -> &[EnumOption] {
        &self.options
    }

    /// The embedded field of a related type.
    pub fn field(&self) -> Option<&Arc<Field>> {
        self.field.as_ref()
    }

    /// The effective date format of date and datetime types.
    pub fn format(&self) -> &str {
        match (&self.format, self.kind) {
            (Some(format), _) => format,
            (None, FieldKind::Date) => DEFAULT_DATE_FORMAT,
            (None, _) => DEFAULT_DATETIME_FORMAT,
        }
    }

    fn is_backed_enum(&self) -> bool {
        self.options.first().is_some_and(|o| o.value.is_some())
    }

    // ------------------------------------------------------------------------
    // Conversion
    // ------------------------------------------------------------------------

    /// Converts an input value to the internal representation of this type.
    pub fn cast(&self, value: FieldValue) -> Result<FieldValue> {
        if value.is_null() {
            return if self.is_null {
                Ok(FieldValue::NULL)
            } else {
                Err(Error::NullNotAllowed { field: self.kind.to_string() })
            };
        }

        match self.kind {
            FieldKind::Int => match &value {
                FieldValue::Value(v) => v
                    .as_i64()
                    .or_else(|| v.as_f64().map(|f| f as i64))
                    .map(FieldValue::from)
                    .ok_or_else(|| self.invalid(v)),
                _ => Err(self.invalid_structured(&value)),
            },
            FieldKind::Float => match &value {
                FieldValue::Value(v) => v.as_f64().map(FieldValue::from).ok_or_else(|| self.invalid(v)),
                _ => Err(self.invalid_structured(&value)),
            },
            FieldKind::String => match value {
                FieldValue::Value(Value::String(s)) => Ok(FieldValue::from(s)),
                FieldValue::Value(v) => Ok(FieldValue::from(v.to_string())),
                other => Err(self.invalid_structured(&other)),
            },
            FieldKind::Decimal | FieldKind::Related => Ok(value),
            FieldKind::Enum => self.cast_enum(value),
            FieldKind::Datetime => match value {
                FieldValue::DateTime(_) => Ok(value),
                FieldValue::Date(d) => Ok(FieldValue::DateTime(d.and_time(chrono::NaiveTime::MIN))),
                FieldValue::Value(Value::String(s)) => {
                    temporal::parse_datetime(&s, self.format()).map(FieldValue::DateTime)
                }
                other => Err(self.invalid_date(&other)),
            },
            FieldKind::Date => match value {
                FieldValue::Date(_) => Ok(value),
                FieldValue::DateTime(dt) => Ok(FieldValue::Date(dt.date())),
                FieldValue::Value(Value::String(s)) => temporal::parse_date(&s, self.format()).map(FieldValue::Date),
                other => Err(self.invalid_date(&other)),
            },
        }
    }

    fn cast_enum(&self, value: FieldValue) -> Result<FieldValue> {
        if !self.is_backed_enum() {
            return Ok(value);
        }
        let raw = match value {
            FieldValue::Enum(case) => {
                if self.options.iter().any(|o| o.name == case.name) {
                    return Ok(FieldValue::Enum(case));
                }
                case.value
            }
            FieldValue::Value(v) => v,
            other => return Err(self.invalid_structured(&other)),
        };
        self.options
            .iter()
            .find(|o| o.value.as_ref().is_some_and(|v| loosely_equal(v, &raw)))
            .map(|o| {
                FieldValue::Enum(EnumCase { name: o.name.clone(), value: o.value.clone().unwrap_or_default() })
            })
            .ok_or_else(|| Error::InvalidEnumValue {
                enum_name: self.enum_name.clone().unwrap_or_else(|| "enum".to_string()),
                value: raw.to_string(),
            })
    }

    /// Converts an internal value to its storage representation.
    pub fn decast(&self, value: &FieldValue) -> Result<Value> {
        match value {
            FieldValue::Value(v) => Ok(v.clone()),
            FieldValue::Enum(case) => Ok(case.value.clone()),
            FieldValue::DateTime(dt) => Ok(Value::String(match self.kind {
                FieldKind::Date => temporal::format_date(&dt.date(), self.format()),
                _ => temporal::format_datetime(dt, self.format()),
            })),
            FieldValue::Date(d) => Ok(Value::String(match self.kind {
                FieldKind::Datetime => temporal::format_datetime(&d.and_time(chrono::NaiveTime::MIN), self.format()),
                _ => temporal::format_date(d, self.format()),
            })),
            FieldValue::Proxy(proxy) => Ok(proxy.value.clone()),
            FieldValue::Model(_) => Err(Error::conversion(format!(
                "a model instance cannot be stored in a {} field",
                self.kind
            ))),
        }
    }

    fn invalid(&self, value: &Value) -> Error {
        Error::InvalidValue { expected: self.kind.to_string(), value: value.to_string() }
    }

    fn invalid_structured(&self, value: &FieldValue) -> Error {
        Error::InvalidValue { expected: self.kind.to_string(), value: format!("{:?}", value) }
    }

    fn invalid_date(&self, value: &FieldValue) -> Error {
        Error::InvalidDateFormat { value: format!("{:?}", value), format: self.format().to_string() }
    }
}

fn loosely_equal(a: &Value, b: &Value) -> bool {
    a == b || a.to_string() == b.to_string()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn from_options_overrides_defaults() {
        let ty = FieldType::from_options(
            "int",
            TypeOptions { min: Some(30.0), max: Some(40.0), is_null: true, ..Default::default() },
        )
        .unwrap();

        assert_eq!(ty.kind(), FieldKind::Int);
        assert_eq!(ty.min(), Some(30.0));
        assert_eq!(ty.max(), Some(40.0));
        assert!(ty.is_null());
    }

    #[test]
    fn defaults_per_kind() {
        let int = FieldType::from_string("INT").unwrap();
        assert_eq!(int.min(), Some(0.0));
        assert_eq!(int.max(), Some(4294967295.0));

        let decimal = FieldType::from_string("decimal").unwrap();
        assert_eq!((decimal.precision(), decimal.scale()), (Some(12), Some(2)));

        assert!(FieldType::from_string("enum").is_err());
        assert!(FieldType::from_string("blob").is_err());
    }

    #[test]
    fn scalar_round_trips() {
        let int = FieldType::int();
        assert_eq!(int.decast(&int.cast("42".into()).unwrap()).unwrap(), Value::Int(42));
        assert!(int.cast("forty-two".into()).is_err());

        let float = FieldType::float();
        assert_eq!(float.decast(&float.cast(1.5.into()).unwrap()).unwrap(), Value::Float(1.5));

        let string = FieldType::string();
        assert_eq!(string.cast(7i64.into()).unwrap(), FieldValue::from("7"));

        let decimal = FieldType::decimal();
        assert_eq!(decimal.cast("10.999".into()).unwrap(), FieldValue::from("10.999"));
    }

    #[test]
    fn null_needs_nullable_type() {
        assert!(matches!(FieldType::int().cast(FieldValue::NULL), Err(Error::NullNotAllowed { .. })));
        assert_eq!(FieldType::int().nullable(true).cast(FieldValue::NULL).unwrap(), FieldValue::NULL);
    }

    #[test]
    fn backed_enum_maps_values_to_cases() {
        let ty = FieldType::enumeration(vec![EnumOption::backed("A", "Y"), EnumOption::backed("B", "N")]).unwrap();

        let a = ty.cast("Y".into()).unwrap();
        assert_eq!(a, FieldValue::Enum(EnumCase { name: "A".into(), value: "Y".into() }));
        assert_eq!(ty.decast(&a).unwrap(), Value::from("Y"));
        assert!(matches!(ty.cast("NOT_FOUND".into()), Err(Error::InvalidEnumValue { .. })));
    }

    #[test]
    fn plain_enum_passes_through() {
        let ty = FieldType::enumeration(vec![EnumOption::plain("small"), EnumOption::plain("large")]).unwrap();
        assert_eq!(ty.cast("anything".into()).unwrap(), FieldValue::from("anything"));
    }

    #[test]
    fn datetime_round_trip() {
        let ty = FieldType::datetime().with_format("Y-m-d\\TH:i:s");
        let cast = ty.cast("2024-04-07T10:11:12".into()).unwrap();
        let expected = NaiveDate::from_ymd_opt(2024, 4, 7).unwrap().and_hms_opt(10, 11, 12).unwrap();

        assert_eq!(cast, FieldValue::DateTime(expected));
        assert_eq!(ty.cast(cast.clone()).unwrap(), cast);
        assert_eq!(ty.decast(&cast).unwrap(), Value::from("2024-04-07T10:11:12"));
        assert!(matches!(ty.cast("InvalidString".into()), Err(Error::InvalidDateFormat { .. })));
    }

    #[test]
    fn strict_marker_is_stripped_on_decast() {
        let ty = FieldType::date().with_format("!Y-m-d");
        let cast = ty.cast("2024-01-31".into()).unwrap();
        assert_eq!(ty.decast(&cast).unwrap(), Value::from("2024-01-31"));
    }
}
