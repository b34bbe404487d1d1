//! Typed field descriptors for measurement schemas.
//!
//! An [`AttributeSpec`] describes one column of a measurement. Building it
//! yields an immutable [`AttributeConfig`], which owns the coercion,
//! validation and wire-rendering rules for its kind. An [`Attribute`] pairs
//! a shared config with its own value cell, so every measurement instance
//! holds independent state while the schema keeps a single read-only
//! template per field.
//!
//! # Example
//!
//! ```rust
//! use influxable::attribute::{Attribute, AttributeSpec};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut value = Attribute::new("value", AttributeSpec::integer().min(0))?;
//! value.set(10)?;
//! assert_eq!(value.to_wire_literal().as_deref(), Some("10i"));
//!
//! let mut time = Attribute::new("time", AttributeSpec::timestamp().precision("s"))?;
//! time.set(1_570_481_055)?;
//! assert_eq!(time.to_wire_literal().as_deref(), Some("1570481055000000000"));
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;

use crate::error::{SchemaError, ValidationError};

/// Format used to parse datetime fields when none is configured.
pub const DEFAULT_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Time unit of a timestamp field, as understood by the write and query endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Precision {
    /// `h`
    Hours,
    /// `m`
    Minutes,
    /// `s`
    Seconds,
    /// `ms`
    Milliseconds,
    /// `u`
    Microseconds,
    /// `ns`
    Nanoseconds,
}

impl Precision {
    /// Every precision, coarsest first.
    pub const ALL: [Self; 6] = [
        Self::Hours,
        Self::Minutes,
        Self::Seconds,
        Self::Milliseconds,
        Self::Microseconds,
        Self::Nanoseconds,
    ];

    /// Returns the unit string used on the wire.
    pub fn unit(self) -> &'static str {
        match self {
            Self::Hours => "h",
            Self::Minutes => "m",
            Self::Seconds => "s",
            Self::Milliseconds => "ms",
            Self::Microseconds => "u",
            Self::Nanoseconds => "ns",
        }
    }

    /// Parses a unit string, returning `None` for unknown units.
    pub fn parse(unit: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.unit() == unit)
    }

    /// Length of one unit in seconds.
    ///
    /// This is the conversion table every timestamp rendering goes through.
    /// All entries are exact decimals.
    pub fn seconds_per_unit(self) -> Decimal {
        match self {
            Self::Hours => Decimal::new(3600, 0),
            Self::Minutes => Decimal::new(60, 0),
            Self::Seconds => Decimal::ONE,
            Self::Milliseconds => Decimal::new(1, 3),
            Self::Microseconds => Decimal::new(1, 6),
            Self::Nanoseconds => Decimal::new(1, 9),
        }
    }

    /// Converts a count of this unit to nanoseconds.
    ///
    /// Returns `None` on decimal overflow.
    pub fn unit_to_nanos(self, count: Decimal) -> Option<Decimal> {
        count
            .checked_mul(self.seconds_per_unit())?
            .checked_mul(nanos_per_second())
    }

    /// Converts nanoseconds to a count of this unit.
    ///
    /// Returns `None` on decimal overflow.
    pub fn nanos_to_unit(self, nanos: Decimal) -> Option<Decimal> {
        nanos
            .checked_div(nanos_per_second())?
            .checked_div(self.seconds_per_unit())
            .map(|count| count.normalize())
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.unit())
    }
}

fn nanos_per_second() -> Decimal {
    Decimal::new(1_000_000_000, 0)
}

/// The closed set of field kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeType {
    /// Signed 64-bit integer, rendered with an `i` suffix.
    Integer,
    /// Decimal number.
    Float,
    /// Quoted string value.
    String,
    /// `true` / `false`.
    Boolean,
    /// Indexed label; stored and rendered verbatim.
    Tag,
    /// Count of a [`Precision`] unit since the epoch.
    Timestamp,
    /// Calendar datetime parsed against a format.
    DateTime,
}

impl AttributeType {
    /// Human-readable kind name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Tag => "tag",
            Self::Timestamp => "timestamp",
            Self::DateTime => "datetime",
        }
    }
}

/// A field kind together with its kind-specific constraints.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeKind {
    /// Integer with optional inclusive bounds.
    Integer {
        /// Minimum accepted value.
        min: Option<i64>,
        /// Maximum accepted value.
        max: Option<i64>,
    },
    /// Decimal with optional inclusive bounds and a decimal-place cap.
    Float {
        /// Minimum accepted value.
        min: Option<Decimal>,
        /// Maximum accepted value.
        max: Option<Decimal>,
        /// Values are rounded half away from zero to this many places.
        max_decimals: Option<u32>,
    },
    /// String with optional length cap and allowed choices.
    String {
        /// Maximum length in characters.
        max_length: Option<usize>,
        /// Allowed values.
        choices: Option<Vec<String>>,
    },
    /// Boolean.
    Boolean,
    /// Tag label.
    Tag,
    /// Epoch timestamp in `precision` units.
    Timestamp {
        /// Unit of the stored count.
        precision: Precision,
        /// Fill with the current instant when the field is cloned unset.
        auto_now: bool,
    },
    /// Calendar datetime.
    DateTime {
        /// Unit used when the raw input is numeric.
        precision: Precision,
        /// `chrono` format string used to parse textual input.
        format: String,
        /// Fill with the current instant when the field is cloned unset.
        auto_now: bool,
    },
}

impl AttributeKind {
    /// Returns the kind tag without its constraints.
    pub fn attribute_type(&self) -> AttributeType {
        match self {
            Self::Integer { .. } => AttributeType::Integer,
            Self::Float { .. } => AttributeType::Float,
            Self::String { .. } => AttributeType::String,
            Self::Boolean => AttributeType::Boolean,
            Self::Tag => AttributeType::Tag,
            Self::Timestamp { .. } => AttributeType::Timestamp,
            Self::DateTime { .. } => AttributeType::DateTime,
        }
    }
}

/// The coerced internal value of a field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Integer value.
    Integer(i64),
    /// Decimal value.
    Float(Decimal),
    /// String value.
    String(String),
    /// Boolean value.
    Boolean(bool),
    /// Tag label.
    Tag(String),
    /// Count of the field's precision unit since the epoch.
    Timestamp(Decimal),
    /// Absolute instant.
    DateTime(DateTime<Utc>),
    /// Uncoerced input kept by a lenient field whose cast failed.
    Raw(Value),
}

impl FieldValue {
    /// Returns the integer, if this is an integer value.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the decimal of a float or timestamp value.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Float(v) | Self::Timestamp(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the text of a string or tag value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::Tag(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the boolean, if this is a boolean value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the instant of a datetime value.
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    /// Converts the value to JSON. Datetimes become RFC 3339 strings.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Integer(v) => Value::from(*v),
            Self::Float(v) | Self::Timestamp(v) => decimal_to_json(*v),
            Self::String(s) | Self::Tag(s) => Value::String(s.clone()),
            Self::Boolean(b) => Value::Bool(*b),
            Self::DateTime(dt) => Value::String(dt.to_rfc3339()),
            Self::Raw(raw) => raw.clone(),
        }
    }
}

pub(crate) fn decimal_to_json(value: Decimal) -> Value {
    if value.fract().is_zero()
        && let Some(int) = value.to_i64()
    {
        return Value::from(int);
    }
    value.to_f64().map_or(Value::Null, Value::from)
}

/// Declarative configuration of one field, validated by [`AttributeSpec::build`].
///
/// Fields are nullable and strictly cast unless configured otherwise.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct AttributeSpec {
    attribute_type: AttributeType,
    default: Option<Value>,
    nullable: bool,
    enforce_cast: bool,
    min: Option<Value>,
    max: Option<Value>,
    max_decimals: Option<u32>,
    max_length: Option<usize>,
    choices: Option<Vec<String>>,
    precision: Option<String>,
    format: Option<String>,
    auto_now: bool,
}

impl AttributeSpec {
    /// Creates a spec of the given kind with no constraints.
    pub fn of(attribute_type: AttributeType) -> Self {
        Self {
            attribute_type,
            default: None,
            nullable: true,
            enforce_cast: true,
            min: None,
            max: None,
            max_decimals: None,
            max_length: None,
            choices: None,
            precision: None,
            format: None,
            auto_now: false,
        }
    }

    /// Integer field.
    pub fn integer() -> Self {
        Self::of(AttributeType::Integer)
    }

    /// Float field.
    pub fn float() -> Self {
        Self::of(AttributeType::Float)
    }

    /// String field.
    pub fn string() -> Self {
        Self::of(AttributeType::String)
    }

    /// Boolean field.
    pub fn boolean() -> Self {
        Self::of(AttributeType::Boolean)
    }

    /// Tag field.
    pub fn tag() -> Self {
        Self::of(AttributeType::Tag)
    }

    /// Timestamp field, nanosecond precision unless [`precision`](Self::precision) is set.
    pub fn timestamp() -> Self {
        Self::of(AttributeType::Timestamp)
    }

    /// Datetime field parsed with [`DEFAULT_DATETIME_FORMAT`] unless
    /// [`format`](Self::format) is set.
    pub fn datetime() -> Self {
        Self::of(AttributeType::DateTime)
    }

    /// Value used when the field receives null.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.default = (!value.is_null()).then_some(value);
        self
    }

    /// Sets whether null is an acceptable value.
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Shorthand for `nullable(false)`.
    pub fn required(self) -> Self {
        self.nullable(false)
    }

    /// Sets whether a failed cast is an error (`true`) or keeps the raw value.
    pub fn enforce_cast(mut self, enforce_cast: bool) -> Self {
        self.enforce_cast = enforce_cast;
        self
    }

    /// Shorthand for `enforce_cast(false)`.
    pub fn lenient(self) -> Self {
        self.enforce_cast(false)
    }

    /// Inclusive lower bound for integer and float fields.
    pub fn min(mut self, min: impl Into<Value>) -> Self {
        self.min = Some(min.into());
        self
    }

    /// Inclusive upper bound for integer and float fields.
    pub fn max(mut self, max: impl Into<Value>) -> Self {
        self.max = Some(max.into());
        self
    }

    /// Decimal-place cap for float fields.
    pub fn max_decimals(mut self, places: u32) -> Self {
        self.max_decimals = Some(places);
        self
    }

    /// Maximum length in characters for string fields.
    pub fn max_length(mut self, length: usize) -> Self {
        self.max_length = Some(length);
        self
    }

    /// Allowed values for string fields.
    pub fn choices<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.choices = Some(choices.into_iter().map(Into::into).collect());
        self
    }

    /// Precision unit (`h`, `m`, `s`, `ms`, `u`, `ns`) for timestamp and datetime fields.
    ///
    /// The unit is checked when the spec is built.
    pub fn precision(mut self, unit: impl Into<String>) -> Self {
        self.precision = Some(unit.into());
        self
    }

    /// `chrono` format string for datetime fields.
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Fills an unset timestamp or datetime field with the current instant.
    pub fn auto_now(mut self) -> Self {
        self.auto_now = true;
        self
    }

    /// Returns the kind this spec describes.
    pub fn attribute_type(&self) -> AttributeType {
        self.attribute_type
    }

    /// Validates the spec and produces the field's immutable configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] if an option does not apply to the kind, a
    /// bound is not a number of the field's type, bounds are inverted, the
    /// choice set is empty, the precision unit is unknown, or the default
    /// value fails the field's own validation.
    pub fn build(self, name: impl Into<String>) -> Result<AttributeConfig, SchemaError> {
        let name = name.into();
        let kind = self.build_kind(&name)?;
        let mut config = AttributeConfig {
            name,
            kind,
            default: None,
            nullable: self.nullable,
            enforce_cast: self.enforce_cast,
        };

        if let Some(raw) = &self.default {
            let value = config
                .coerce(raw)
                .and_then(|value| config.check(value))
                .map_err(|source| SchemaError::InvalidDefault {
                    field: config.name.clone(),
                    source,
                })?;
            config.default = Some(value);
        }

        Ok(config)
    }

    fn build_kind(&self, name: &str) -> Result<AttributeKind, SchemaError> {
        use AttributeType as T;

        let ty = self.attribute_type;
        let kind_name = ty.name();

        if !matches!(ty, T::Integer | T::Float) && (self.min.is_some() || self.max.is_some()) {
            return Err(misconfigured(name, format!("bounds do not apply to {kind_name} fields")));
        }
        if ty != T::Float && self.max_decimals.is_some() {
            return Err(misconfigured(name, format!("max_decimals does not apply to {kind_name} fields")));
        }
        if ty != T::String && (self.max_length.is_some() || self.choices.is_some()) {
            return Err(misconfigured(name, format!("length and choices do not apply to {kind_name} fields")));
        }
        if !matches!(ty, T::Timestamp | T::DateTime) && (self.precision.is_some() || self.auto_now) {
            return Err(misconfigured(name, format!("precision and auto_now do not apply to {kind_name} fields")));
        }
        if ty != T::DateTime && self.format.is_some() {
            return Err(misconfigured(name, format!("format does not apply to {kind_name} fields")));
        }

        let kind = match ty {
            T::Integer => {
                let min = self.integer_bound(name, self.min.as_ref(), "min")?;
                let max = self.integer_bound(name, self.max.as_ref(), "max")?;
                ordered_bounds(name, min, max)?;
                AttributeKind::Integer { min, max }
            }
            T::Float => {
                let min = self.decimal_bound(name, self.min.as_ref(), "min")?;
                let max = self.decimal_bound(name, self.max.as_ref(), "max")?;
                ordered_bounds(name, min, max)?;
                AttributeKind::Float {
                    min,
                    max,
                    max_decimals: self.max_decimals,
                }
            }
            T::String => {
                if self.choices.as_ref().is_some_and(Vec::is_empty) {
                    return Err(misconfigured(name, "choices cannot be empty"));
                }
                AttributeKind::String {
                    max_length: self.max_length,
                    choices: self.choices.clone(),
                }
            }
            T::Boolean => AttributeKind::Boolean,
            T::Tag => AttributeKind::Tag,
            T::Timestamp => AttributeKind::Timestamp {
                precision: self.parsed_precision(name)?,
                auto_now: self.auto_now,
            },
            T::DateTime => AttributeKind::DateTime {
                precision: self.parsed_precision(name)?,
                format: self
                    .format
                    .clone()
                    .unwrap_or_else(|| DEFAULT_DATETIME_FORMAT.to_string()),
                auto_now: self.auto_now,
            },
        };

        Ok(kind)
    }

    fn integer_bound(
        &self,
        name: &str,
        bound: Option<&Value>,
        which: &str,
    ) -> Result<Option<i64>, SchemaError> {
        bound
            .map(|raw| {
                raw.as_i64()
                    .ok_or_else(|| misconfigured(name, format!("{which} bound {raw} is not an integer")))
            })
            .transpose()
    }

    fn decimal_bound(
        &self,
        name: &str,
        bound: Option<&Value>,
        which: &str,
    ) -> Result<Option<Decimal>, SchemaError> {
        bound
            .map(|raw| {
                let parsed = match raw {
                    Value::Number(_) | Value::String(_) => to_decimal(raw),
                    _ => None,
                };
                parsed.ok_or_else(|| misconfigured(name, format!("{which} bound {raw} is not a number")))
            })
            .transpose()
    }

    fn parsed_precision(&self, name: &str) -> Result<Precision, SchemaError> {
        match &self.precision {
            None => Ok(Precision::Nanoseconds),
            Some(unit) => Precision::parse(unit).ok_or_else(|| SchemaError::InvalidPrecision {
                field: name.to_string(),
                unit: unit.clone(),
            }),
        }
    }
}

fn misconfigured(name: &str, reason: impl Into<String>) -> SchemaError {
    SchemaError::InvalidConfig {
        field: name.to_string(),
        reason: reason.into(),
    }
}

fn ordered_bounds<T: PartialOrd + fmt::Display>(
    name: &str,
    min: Option<T>,
    max: Option<T>,
) -> Result<(), SchemaError> {
    match (min, max) {
        (Some(min), Some(max)) if min > max => Err(misconfigured(
            name,
            format!("min bound {min} is greater than max bound {max}"),
        )),
        _ => Ok(()),
    }
}

/// Immutable configuration of a named field.
///
/// Shared between a schema and every instance built from it; it never
/// holds a value.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeConfig {
    name: String,
    kind: AttributeKind,
    default: Option<FieldValue>,
    nullable: bool,
    enforce_cast: bool,
}

impl AttributeConfig {
    /// Returns the field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the field kind and its constraints.
    pub fn kind(&self) -> &AttributeKind {
        &self.kind
    }

    /// Returns the kind tag.
    pub fn attribute_type(&self) -> AttributeType {
        self.kind.attribute_type()
    }

    /// Returns the coerced default value.
    pub fn default_value(&self) -> Option<&FieldValue> {
        self.default.as_ref()
    }

    /// Whether null is accepted.
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Whether a failed cast is an error.
    pub fn enforces_cast(&self) -> bool {
        self.enforce_cast
    }

    /// Whether an unset field fills itself with the current instant.
    pub fn auto_populates(&self) -> bool {
        matches!(
            self.kind,
            AttributeKind::Timestamp { auto_now: true, .. }
                | AttributeKind::DateTime { auto_now: true, .. }
        )
    }

    /// Whether an instance cannot be built without a value for this field.
    pub fn is_required(&self) -> bool {
        !self.nullable && self.default.is_none() && !self.auto_populates()
    }

    /// Whether this is a timestamp or datetime field.
    pub fn is_time(&self) -> bool {
        matches!(
            self.attribute_type(),
            AttributeType::Timestamp | AttributeType::DateTime
        )
    }

    /// Whether this is a tag field.
    pub fn is_tag(&self) -> bool {
        self.attribute_type() == AttributeType::Tag
    }

    /// Returns the precision of a time field, or nanoseconds for other kinds.
    pub fn precision(&self) -> Precision {
        match &self.kind {
            AttributeKind::Timestamp { precision, .. } | AttributeKind::DateTime { precision, .. } => {
                *precision
            }
            _ => Precision::Nanoseconds,
        }
    }

    /// Runs null handling, coercion and constraint checks on a raw value.
    ///
    /// Null resolves to the default, or to `None` when the field is
    /// nullable. A failed cast on a lenient field keeps the raw value as
    /// [`FieldValue::Raw`] and skips the constraint checks.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if the value is null on a required
    /// field, cannot be cast on a strict field, or violates a constraint.
    pub fn clean(&self, raw: &Value) -> Result<Option<FieldValue>, ValidationError> {
        if raw.is_null() {
            return match &self.default {
                Some(default) => Ok(Some(default.clone())),
                None if self.nullable => Ok(None),
                None => Err(ValidationError::NullValue {
                    field: self.name.clone(),
                }),
            };
        }

        let value = match self.coerce(raw) {
            Ok(value) => value,
            Err(_) if !self.enforce_cast => return Ok(Some(FieldValue::Raw(raw.clone()))),
            Err(err) => return Err(err),
        };

        self.check(value).map(Some)
    }

    fn coerce(&self, raw: &Value) -> Result<FieldValue, ValidationError> {
        let cast_error = |reason: String| ValidationError::Cast {
            field: self.name.clone(),
            kind: self.attribute_type().name(),
            raw: raw.to_string(),
            reason,
        };

        match &self.kind {
            AttributeKind::Integer { .. } => to_integer(raw)
                .map(FieldValue::Integer)
                .ok_or_else(|| cast_error("not an integer".to_string())),
            AttributeKind::Float { .. } => to_decimal(raw)
                .map(FieldValue::Float)
                .ok_or_else(|| cast_error("not a decimal number".to_string())),
            AttributeKind::String { .. } => Ok(FieldValue::String(to_text(raw))),
            AttributeKind::Boolean => to_boolean(raw)
                .map(FieldValue::Boolean)
                .ok_or_else(|| cast_error("not a boolean".to_string())),
            AttributeKind::Tag => Ok(FieldValue::Tag(to_text(raw))),
            AttributeKind::Timestamp { precision, .. } => {
                let count =
                    to_decimal(raw).ok_or_else(|| cast_error("not an epoch timestamp".to_string()))?;
                if timestamp_nanos(*precision, count).is_none() {
                    return Err(cast_error(format!(
                        "outside the 64-bit nanosecond range at precision '{precision}'"
                    )));
                }
                Ok(FieldValue::Timestamp(count))
            }
            AttributeKind::DateTime {
                precision, format, ..
            } => to_datetime(raw, *precision, format)
                .map(FieldValue::DateTime)
                .ok_or_else(|| cast_error(format!("does not match format '{format}'"))),
        }
    }

    fn check(&self, value: FieldValue) -> Result<FieldValue, ValidationError> {
        match (&self.kind, value) {
            (AttributeKind::Integer { min, max }, FieldValue::Integer(v)) => {
                check_bounds(&self.name, v, *min, *max)?;
                Ok(FieldValue::Integer(v))
            }
            (
                AttributeKind::Float {
                    min,
                    max,
                    max_decimals,
                },
                FieldValue::Float(v),
            ) => {
                let v = match max_decimals {
                    Some(places) => {
                        v.round_dp_with_strategy(*places, RoundingStrategy::MidpointAwayFromZero)
                    }
                    None => v,
                };
                check_bounds(&self.name, v, *min, *max)?;
                Ok(FieldValue::Float(v))
            }
            (
                AttributeKind::String {
                    max_length,
                    choices,
                },
                FieldValue::String(s),
            ) => {
                let length = s.chars().count();
                if let Some(max_length) = *max_length
                    && length > max_length
                {
                    return Err(ValidationError::TooLong {
                        field: self.name.clone(),
                        length,
                        max_length,
                    });
                }
                if let Some(choices) = choices
                    && !choices.contains(&s)
                {
                    return Err(ValidationError::InvalidChoice {
                        field: self.name.clone(),
                        value: s,
                        choices: choices.clone(),
                    });
                }
                Ok(FieldValue::String(s))
            }
            (_, value) => Ok(value),
        }
    }

    /// Renders a value as a line-protocol literal.
    ///
    /// Integers get an `i` suffix, strings are single-quoted without
    /// escaping, and timestamps and datetimes become integer nanoseconds.
    pub fn render(&self, value: &FieldValue) -> String {
        match value {
            FieldValue::Integer(v) => format!("{v}i"),
            FieldValue::Float(v) => v.to_string(),
            FieldValue::String(s) => format!("'{s}'"),
            FieldValue::Boolean(b) => b.to_string(),
            FieldValue::Tag(s) => s.clone(),
            // Assignment rejects counts without a nanosecond form
            FieldValue::Timestamp(count) => timestamp_nanos(self.precision(), *count)
                .map_or_else(String::new, |nanos| nanos.to_string()),
            FieldValue::DateTime(dt) => datetime_nanos(dt).to_string(),
            FieldValue::Raw(raw) => {
                let text = to_text(raw);
                match self.attribute_type() {
                    AttributeType::Integer => format!("{text}i"),
                    AttributeType::String => format!("'{text}'"),
                    _ => text,
                }
            }
        }
    }

    fn now_value(&self) -> Option<FieldValue> {
        match &self.kind {
            AttributeKind::Timestamp {
                precision,
                auto_now: true,
            } => {
                let nanos = Utc::now().timestamp_nanos_opt()?;
                precision
                    .nanos_to_unit(Decimal::from(nanos))
                    .map(|count| FieldValue::Timestamp(count.trunc()))
            }
            AttributeKind::DateTime { auto_now: true, .. } => Some(FieldValue::DateTime(Utc::now())),
            _ => None,
        }
    }
}

fn check_bounds<T>(field: &str, value: T, min: Option<T>, max: Option<T>) -> Result<(), ValidationError>
where
    T: PartialOrd + fmt::Display + Copy,
{
    if let Some(min) = min
        && value < min
    {
        return Err(ValidationError::BelowMinimum {
            field: field.to_string(),
            value: value.to_string(),
            min: min.to_string(),
        });
    }
    if let Some(max) = max
        && value > max
    {
        return Err(ValidationError::AboveMaximum {
            field: field.to_string(),
            value: value.to_string(),
            max: max.to_string(),
        });
    }
    Ok(())
}

/// Parses decimal text, accepting scientific notation.
pub(crate) fn parse_decimal(text: &str) -> Option<Decimal> {
    Decimal::from_str(text)
        .ok()
        .or_else(|| Decimal::from_scientific(text).ok())
}

fn to_decimal(raw: &Value) -> Option<Decimal> {
    match raw {
        Value::Number(n) => parse_decimal(&n.to_string()),
        Value::String(s) => parse_decimal(s.trim()),
        Value::Bool(b) => Some(Decimal::from(i64::from(*b))),
        _ => None,
    }
}

fn to_integer(raw: &Value) -> Option<i64> {
    match raw {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().and_then(truncate_to_i64)),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)] // range checked before the cast
fn truncate_to_i64(value: f64) -> Option<i64> {
    let value = value.trunc();
    (value.is_finite() && value >= i64::MIN as f64 && value < i64::MAX as f64).then(|| value as i64)
}

fn to_text(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn to_boolean(raw: &Value) -> Option<bool> {
    match raw {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|v| v != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" => Some(true),
            "false" | "f" | "no" | "n" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn to_datetime(raw: &Value, precision: Precision, format: &str) -> Option<DateTime<Utc>> {
    match raw {
        Value::String(s) => parse_datetime(s.trim(), format),
        Value::Number(_) => {
            let nanos = precision.unit_to_nanos(to_decimal(raw)?)?.trunc().to_i64()?;
            Some(DateTime::from_timestamp_nanos(nanos))
        }
        _ => None,
    }
}

fn parse_datetime(text: &str, format: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(text, format)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(text, format).map(|naive| naive.and_utc()))
        .or_else(|_| DateTime::parse_from_rfc3339(text).map(|dt| dt.with_timezone(&Utc)))
        .ok()
}

fn timestamp_nanos(precision: Precision, count: Decimal) -> Option<i64> {
    precision.unit_to_nanos(count)?.trunc().to_i64()
}

fn datetime_nanos(dt: &DateTime<Utc>) -> i128 {
    i128::from(dt.timestamp()) * 1_000_000_000 + i128::from(dt.timestamp_subsec_nanos())
}

/// A field descriptor holding its own value.
///
/// Pairs a shared [`AttributeConfig`] with the raw input and the coerced
/// internal value. Assignment always runs coercion and validation together.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    config: Arc<AttributeConfig>,
    raw: Value,
    value: Option<FieldValue>,
}

impl Attribute {
    /// Builds a standalone field from a spec.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] if the spec is invalid.
    pub fn new(name: impl Into<String>, spec: AttributeSpec) -> Result<Self, SchemaError> {
        Ok(Self::from_config(Arc::new(spec.build(name)?)))
    }

    /// Creates an unset field over a shared configuration.
    ///
    /// Auto-populated time fields start out holding the current instant.
    pub fn from_config(config: Arc<AttributeConfig>) -> Self {
        let value = config.now_value();
        let raw = value.as_ref().map_or(Value::Null, FieldValue::to_json);
        Self { config, raw, value }
    }

    /// Returns the shared configuration.
    pub fn config(&self) -> &AttributeConfig {
        &self.config
    }

    /// Returns the field name.
    pub fn name(&self) -> &str {
        self.config.name()
    }

    /// Assigns a raw value through coercion and validation.
    ///
    /// On failure the previous value is kept.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if the value is rejected.
    pub fn set(&mut self, raw: impl Into<Value>) -> Result<(), ValidationError> {
        let raw = raw.into();
        let value = self.config.clean(&raw)?;
        self.raw = raw;
        self.value = value;
        Ok(())
    }

    /// Returns the coerced internal value.
    pub fn get(&self) -> Option<&FieldValue> {
        self.value.as_ref()
    }

    /// Returns the raw value as last assigned.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Whether the field holds a value.
    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }

    /// Renders the value as a line-protocol literal, or `None` when unset.
    pub fn to_wire_literal(&self) -> Option<String> {
        self.value.as_ref().map(|value| self.config.render(value))
    }

    /// Returns a new field with the same configuration and no value.
    pub fn clone_blank(&self) -> Self {
        Self::from_config(Arc::clone(&self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attr(spec: AttributeSpec) -> Attribute {
        Attribute::new("value", spec).unwrap()
    }

    #[test]
    fn test_integer_round_trip_and_suffix() {
        let mut value = attr(AttributeSpec::integer());
        value.set(10).unwrap();
        assert_eq!(value.get(), Some(&FieldValue::Integer(10)));
        assert_eq!(value.to_wire_literal().as_deref(), Some("10i"));

        value.set("42").unwrap();
        assert_eq!(value.get().and_then(FieldValue::as_i64), Some(42));
        assert_eq!(value.raw(), &json!("42"));
    }

    #[test]
    fn test_integer_bounds() {
        let mut value = attr(AttributeSpec::integer().min(0).max(100));
        assert!(value.set(50).is_ok());
        assert!(matches!(
            value.set(-1),
            Err(ValidationError::BelowMinimum { .. })
        ));
        assert!(matches!(
            value.set(101),
            Err(ValidationError::AboveMaximum { .. })
        ));
        // The rejected assignments left the earlier value in place
        assert_eq!(value.get(), Some(&FieldValue::Integer(50)));
    }

    #[test]
    fn test_strict_cast_failure() {
        let mut value = attr(AttributeSpec::integer());
        let err = value.set("abc").unwrap_err();
        assert!(matches!(err, ValidationError::Cast { kind: "integer", .. }));
        assert_eq!(err.field(), "value");
    }

    #[test]
    fn test_lenient_cast_keeps_raw() {
        let mut value = attr(AttributeSpec::integer().lenient());
        value.set("abc").unwrap();
        assert_eq!(value.get(), Some(&FieldValue::Raw(json!("abc"))));
        assert_eq!(value.to_wire_literal().as_deref(), Some("abci"));
    }

    #[test]
    fn test_float_rounds_half_away_from_zero() {
        let mut value = attr(AttributeSpec::float().max_decimals(2));
        value.set(1.005).unwrap();
        assert_eq!(value.to_wire_literal().as_deref(), Some("1.01"));

        value.set(-2.345).unwrap();
        assert_eq!(value.to_wire_literal().as_deref(), Some("-2.35"));

        value.set("15.4").unwrap();
        assert_eq!(value.to_wire_literal().as_deref(), Some("15.4"));
    }

    #[test]
    fn test_float_bounds_apply_after_rounding() {
        let mut value = attr(AttributeSpec::float().max(10).max_decimals(0));
        assert!(value.set(10.4).is_ok());
        assert!(value.set(10.5).is_err());
    }

    #[test]
    fn test_string_quotes_and_constraints() {
        let mut value = attr(AttributeSpec::string().max_length(3).choices(["ok", "ko"]));
        value.set("ok").unwrap();
        assert_eq!(value.to_wire_literal().as_deref(), Some("'ok'"));

        assert!(matches!(
            value.set("okay"),
            Err(ValidationError::TooLong { length: 4, .. })
        ));
        assert!(matches!(
            value.set("no"),
            Err(ValidationError::InvalidChoice { .. })
        ));
    }

    #[test]
    fn test_string_is_not_escaped() {
        let mut value = attr(AttributeSpec::string());
        value.set("it's").unwrap();
        assert_eq!(value.to_wire_literal().as_deref(), Some("'it's'"));
    }

    #[test]
    fn test_boolean_cast() {
        let mut value = attr(AttributeSpec::boolean());
        value.set(true).unwrap();
        assert_eq!(value.to_wire_literal().as_deref(), Some("true"));
        value.set("False").unwrap();
        assert_eq!(value.get().and_then(FieldValue::as_bool), Some(false));
        value.set(0).unwrap();
        assert_eq!(value.to_wire_literal().as_deref(), Some("false"));
        assert!(value.set("maybe").is_err());
    }

    #[test]
    fn test_tag_is_opaque() {
        let mut phase = attr(AttributeSpec::tag());
        phase.set("moon").unwrap();
        assert_eq!(phase.get(), Some(&FieldValue::Tag("moon".to_string())));
        assert_eq!(phase.to_wire_literal().as_deref(), Some("moon"));
        phase.set(12).unwrap();
        assert_eq!(phase.to_wire_literal().as_deref(), Some("12"));
    }

    #[test]
    fn test_null_default_and_nullable() {
        let mut nullable = attr(AttributeSpec::integer());
        nullable.set(Value::Null).unwrap();
        assert!(!nullable.is_set());
        assert_eq!(nullable.to_wire_literal(), None);

        let mut defaulted = attr(AttributeSpec::integer().required().default(7));
        defaulted.set(Value::Null).unwrap();
        assert_eq!(defaulted.get(), Some(&FieldValue::Integer(7)));

        let mut required = attr(AttributeSpec::integer().required());
        assert!(matches!(
            required.set(Value::Null),
            Err(ValidationError::NullValue { .. })
        ));
    }

    #[test]
    fn test_timestamp_seconds_render_nanos() {
        let mut time = attr(AttributeSpec::timestamp().precision("s"));
        time.set(1_570_481_055).unwrap();
        assert_eq!(
            time.to_wire_literal().as_deref(),
            Some("1570481055000000000")
        );
    }

    #[test]
    fn test_timestamp_out_of_range_rejected_on_set() {
        let mut time = attr(AttributeSpec::timestamp().precision("h"));
        let err = time.set("100000000000000000000").unwrap_err();
        assert!(matches!(err, ValidationError::Cast { kind: "timestamp", .. }));
        assert!(!time.is_set());

        // The largest count that still fits in signed 64-bit nanoseconds
        let mut nanos = attr(AttributeSpec::timestamp());
        nanos.set(i64::MAX).unwrap();
        assert_eq!(nanos.to_wire_literal(), Some(i64::MAX.to_string()));
    }

    #[test]
    fn test_timestamp_ratio_table() {
        let count = Decimal::from(2);
        let expected = [
            (Precision::Hours, "7200000000000"),
            (Precision::Minutes, "120000000000"),
            (Precision::Seconds, "2000000000"),
            (Precision::Milliseconds, "2000000"),
            (Precision::Microseconds, "2000"),
            (Precision::Nanoseconds, "2"),
        ];
        for (precision, nanos) in expected {
            let rendered = precision.unit_to_nanos(count).unwrap().normalize().to_string();
            assert_eq!(rendered, nanos, "precision {precision}");
            let back = precision.nanos_to_unit(Decimal::from_str(nanos).unwrap()).unwrap();
            assert_eq!(back, count, "precision {precision}");
        }
    }

    #[test]
    fn test_unknown_precision_rejected_at_build() {
        let err = Attribute::new("time", AttributeSpec::timestamp().precision("days")).unwrap_err();
        assert_eq!(
            err,
            SchemaError::InvalidPrecision {
                field: "time".to_string(),
                unit: "days".to_string(),
            }
        );
    }

    #[test]
    fn test_datetime_parse_and_render() {
        let mut when = attr(AttributeSpec::datetime());
        when.set("2019-10-07 20:44:15").unwrap();
        assert_eq!(
            when.to_wire_literal().as_deref(),
            Some("1570481055000000000")
        );

        let mut custom = attr(AttributeSpec::datetime().format("%d/%m/%Y %H:%M"));
        custom.set("07/10/2019 20:44").unwrap();
        assert_eq!(
            custom.to_wire_literal().as_deref(),
            Some("1570481040000000000")
        );
        assert!(custom.set("not a date").is_err());
    }

    #[test]
    fn test_datetime_from_epoch_number() {
        let mut when = attr(AttributeSpec::datetime().precision("ms"));
        when.set(1_570_481_055_000_i64).unwrap();
        assert_eq!(
            when.to_wire_literal().as_deref(),
            Some("1570481055000000000")
        );
    }

    #[test]
    fn test_clone_blank_is_empty_and_independent() {
        let mut original = attr(AttributeSpec::integer());
        original.set(5).unwrap();
        let mut copy = original.clone_blank();
        assert!(!copy.is_set());
        copy.set(6).unwrap();
        assert_eq!(original.get(), Some(&FieldValue::Integer(5)));
        assert_eq!(copy.get(), Some(&FieldValue::Integer(6)));
    }

    #[test]
    fn test_auto_now_populates_on_clone() {
        let template = attr(AttributeSpec::timestamp().precision("s").auto_now());
        let copy = template.clone_blank();
        let seconds = copy.get().and_then(FieldValue::as_decimal).unwrap();
        // Any instant after 2020-01-01 will do
        assert!(seconds > Decimal::from(1_577_836_800));
        assert!(seconds.fract().is_zero(), "{seconds}");
        assert!(copy.to_wire_literal().unwrap().ends_with("000000000"));
        assert!(copy.config().auto_populates());
        assert!(!copy.config().is_required());
    }

    #[test]
    fn test_invalid_configuration() {
        assert!(matches!(
            AttributeSpec::integer().min(1.5).build("v"),
            Err(SchemaError::InvalidConfig { .. })
        ));
        assert!(matches!(
            AttributeSpec::integer().min(10).max(1).build("v"),
            Err(SchemaError::InvalidConfig { .. })
        ));
        assert!(matches!(
            AttributeSpec::boolean().max_length(3).build("v"),
            Err(SchemaError::InvalidConfig { .. })
        ));
        assert!(matches!(
            AttributeSpec::string().choices(Vec::<String>::new()).build("v"),
            Err(SchemaError::InvalidConfig { .. })
        ));
        assert!(matches!(
            AttributeSpec::integer().max(5).default(9).build("v"),
            Err(SchemaError::InvalidDefault { .. })
        ));
    }
}
