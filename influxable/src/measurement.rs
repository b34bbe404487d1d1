//! Measurement schemas and their points.
//!
//! A [`Schema`] binds an ordered list of field configurations to a
//! measurement name. It is immutable once built and is shared behind an
//! [`Arc`]. Every [`Point`] built from it owns one value cell per field,
//! indexed like the schema's fields, so points never share mutable state.
//!
//! # Example
//!
//! ```rust
//! use influxable::attribute::AttributeSpec;
//! use influxable::measurement::Schema;
//! use serde_json::json;
//!
//! # fn main() -> influxable::Result<()> {
//! let schema = Schema::builder("temperature")
//!     .field("phase", AttributeSpec::tag())
//!     .field("value", AttributeSpec::float().required())
//!     .field("time", AttributeSpec::timestamp().precision("s"))
//!     .build()?;
//!
//! let point = schema.point([
//!     ("phase", json!("moon")),
//!     ("value", json!(15.5)),
//!     ("time", json!(1_570_481_055)),
//! ])?;
//! assert_eq!(
//!     point.to_line_protocol()?,
//!     "temperature,phase=moon value=15.5 1570481055000000000"
//! );
//!
//! assert_eq!(
//!     schema.query().limit(10)?.compile(),
//!     r#"SELECT * FROM "temperature" LIMIT 10"#
//! );
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::attribute::{Attribute, AttributeConfig, AttributeSpec, FieldValue};
use crate::client::{Client, WriteOptions};
use crate::error::{InvalidArgumentError, Result, SchemaError};
use crate::query::Query;
use crate::serializer::{PointSerializer, Row};
use crate::transport::Transport;

/// Ordered field specs for one measurement, checked by [`build`](Self::build).
#[derive(Debug, Clone)]
#[must_use]
pub struct SchemaBuilder {
    measurement: String,
    fields: Vec<(String, AttributeSpec)>,
}

impl SchemaBuilder {
    /// Appends a field.
    pub fn field(mut self, name: impl Into<String>, spec: AttributeSpec) -> Self {
        self.fields.push((name.into(), spec));
        self
    }

    /// Validates every field and freezes the schema.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] if the measurement or a field name is empty,
    /// a name repeats, more than one time field is declared, or a field
    /// spec is invalid.
    pub fn build(self) -> Result<Arc<Schema>> {
        if self.measurement.trim().is_empty() {
            return Err(SchemaError::EmptyMeasurementName.into());
        }

        let mut seen = HashSet::new();
        let mut fields: Vec<Arc<AttributeConfig>> = Vec::with_capacity(self.fields.len());
        let mut time_index: Option<usize> = None;

        for (index, (name, spec)) in self.fields.into_iter().enumerate() {
            if name.trim().is_empty() {
                return Err(SchemaError::EmptyFieldName {
                    measurement: self.measurement,
                }
                .into());
            }
            if !seen.insert(name.clone()) {
                return Err(SchemaError::DuplicateField {
                    measurement: self.measurement,
                    field: name,
                }
                .into());
            }

            let config = spec.build(name)?;
            if config.is_time() {
                if let Some(first) = time_index {
                    let first = &fields[first];
                    return Err(SchemaError::MultipleTimeFields {
                        measurement: self.measurement,
                        first: first.name().to_string(),
                        second: config.name().to_string(),
                    }
                    .into());
                }
                time_index = Some(index);
            }
            fields.push(Arc::new(config));
        }

        debug!(measurement = %self.measurement, fields = fields.len(), "defined schema");
        Ok(Arc::new(Schema {
            measurement: self.measurement,
            fields,
            time_index,
        }))
    }
}

/// Immutable field layout of a measurement.
#[derive(Debug, PartialEq)]
pub struct Schema {
    measurement: String,
    fields: Vec<Arc<AttributeConfig>>,
    time_index: Option<usize>,
}

impl Schema {
    /// Starts a schema for the given measurement.
    pub fn builder(measurement: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            measurement: measurement.into(),
            fields: Vec::new(),
        }
    }

    /// Builds a schema from `(name, spec)` pairs in declaration order.
    ///
    /// # Errors
    ///
    /// See [`SchemaBuilder::build`].
    pub fn define<I, S>(measurement: impl Into<String>, fields: I) -> Result<Arc<Self>>
    where
        I: IntoIterator<Item = (S, AttributeSpec)>,
        S: Into<String>,
    {
        fields
            .into_iter()
            .fold(Self::builder(measurement), |builder, (name, spec)| {
                builder.field(name, spec)
            })
            .build()
    }

    /// Returns the measurement name.
    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    /// Returns the field configurations in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &AttributeConfig> {
        self.fields.iter().map(Arc::as_ref)
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&AttributeConfig> {
        self.index_of(name).map(|index| self.fields[index].as_ref())
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|config| config.name() == name)
    }

    /// Returns the timestamp or datetime field, if one is declared.
    pub fn time_field(&self) -> Option<&AttributeConfig> {
        self.time_index.map(|index| self.fields[index].as_ref())
    }

    /// Returns a fresh query reading from this measurement.
    pub fn query(&self) -> Query {
        Query::scoped_to(&self.measurement)
    }

    /// Returns a point with every field unset, awaiting [`Point::validate`].
    ///
    /// Auto-populated time fields already hold the current instant.
    pub fn blank_point(self: &Arc<Self>) -> Point {
        Point {
            schema: Arc::clone(self),
            cells: self
                .fields
                .iter()
                .map(|config| Attribute::from_config(Arc::clone(config)))
                .collect(),
            validated: false,
        }
    }

    /// Builds a validated point from `(field, value)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::MissingField`] if a required field is not
    /// supplied, [`SchemaError::UnknownField`] for a name the schema does
    /// not declare, and [`SchemaError::InvalidFieldValue`] if a field
    /// rejects its value.
    pub fn point<I, K, V>(self: &Arc<Self>, values: I) -> Result<Point>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let values: Vec<(K, Value)> = values.into_iter().map(|(k, v)| (k, v.into())).collect();

        let supplied = |name: &str| values.iter().any(|(k, _)| k.as_ref() == name);
        if let Some(missing) = self
            .fields
            .iter()
            .find(|config| config.is_required() && !supplied(config.name()))
        {
            return Err(SchemaError::MissingField {
                measurement: self.measurement.clone(),
                field: missing.name().to_string(),
            }
            .into());
        }

        let mut point = self.blank_point();
        for (name, value) in values {
            point.set(name.as_ref(), value)?;
        }
        point.validate()?;
        Ok(point)
    }

    /// Runs a query and converts every returned row into a point.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails, the reply reports an error, or
    /// a row does not fit the schema.
    pub fn evaluate<T: Transport>(
        self: &Arc<Self>,
        client: &Client<T>,
        query: &Query,
    ) -> Result<Vec<Point>> {
        query.evaluate(client, &PointSerializer::new(Arc::clone(self)))
    }

    /// Writes a batch of points of this schema in one request.
    ///
    /// Every point is rendered before anything is sent.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidArgumentError::EmptyBatch`] for an empty batch,
    /// [`InvalidArgumentError::MixedSchemas`] if a point belongs to another
    /// schema, a [`SchemaError`] if a point cannot be rendered, or an error
    /// if the write fails.
    pub fn bulk_save<T: Transport>(&self, client: &Client<T>, points: &[Point]) -> Result<String> {
        if points.is_empty() {
            return Err(InvalidArgumentError::EmptyBatch.into());
        }

        let mut lines = Vec::with_capacity(points.len());
        for point in points {
            if !std::ptr::eq(point.schema.as_ref(), self) {
                return Err(InvalidArgumentError::MixedSchemas {
                    expected: self.measurement.clone(),
                    found: point.measurement().to_string(),
                }
                .into());
            }
            lines.push(point.to_line_protocol()?);
        }

        debug!(measurement = %self.measurement, points = lines.len(), "bulk saving points");
        client.write_points(&lines.join("\n"), &WriteOptions::default())
    }
}

/// One data point of a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    schema: Arc<Schema>,
    cells: Vec<Attribute>,
    validated: bool,
}

impl Point {
    /// Returns the schema this point belongs to.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Returns the measurement name.
    pub fn measurement(&self) -> &str {
        self.schema.measurement()
    }

    /// Returns the coerced value of a field.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.attribute(name).and_then(Attribute::get)
    }

    /// Returns a field's cell.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.schema.index_of(name).map(|index| &self.cells[index])
    }

    /// Returns every cell in declaration order.
    pub fn attributes(&self) -> &[Attribute] {
        &self.cells
    }

    /// Assigns a field through its coercion and validation.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownField`] if the schema does not declare
    /// the field, or [`SchemaError::InvalidFieldValue`] if it rejects the value.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let Some(index) = self.schema.index_of(name) else {
            return Err(SchemaError::UnknownField {
                measurement: self.schema.measurement.clone(),
                field: name.to_string(),
            }
            .into());
        };
        self.cells[index]
            .set(value)
            .map_err(|source| SchemaError::InvalidFieldValue {
                measurement: self.schema.measurement.clone(),
                field: name.to_string(),
                source,
            })?;
        Ok(())
    }

    /// Applies defaults to unset fields and checks required fields are present.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::MissingField`] naming the first required
    /// field without a value.
    pub fn validate(&mut self) -> Result<()> {
        for cell in &mut self.cells {
            if cell.is_set() {
                continue;
            }
            if cell.config().default_value().is_some() {
                cell.set(Value::Null).map_err(|source| SchemaError::InvalidFieldValue {
                    measurement: self.schema.measurement.clone(),
                    field: cell.name().to_string(),
                    source,
                })?;
            } else if !cell.config().is_nullable() {
                return Err(SchemaError::MissingField {
                    measurement: self.schema.measurement.clone(),
                    field: cell.name().to_string(),
                }
                .into());
            }
        }
        self.validated = true;
        Ok(())
    }

    /// Whether [`validate`](Self::validate) has succeeded.
    pub fn is_validated(&self) -> bool {
        self.validated
    }

    /// Returns the internal values keyed by field name. Unset fields are null.
    pub fn to_row(&self) -> Row {
        self.cells
            .iter()
            .map(|cell| {
                let value = cell.get().map_or(Value::Null, FieldValue::to_json);
                (cell.name().to_string(), value)
            })
            .collect()
    }

    /// Renders the point as one line-protocol line.
    ///
    /// Tags follow the measurement name, then fields, then the timestamp.
    /// Unset fields are left out.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::NotValidated`] if the point was never
    /// validated, or [`SchemaError::NoFieldValues`] if no non-tag field
    /// holds a value.
    pub fn to_line_protocol(&self) -> Result<String> {
        if !self.validated {
            return Err(SchemaError::NotValidated {
                measurement: self.schema.measurement.clone(),
            }
            .into());
        }

        let mut tags = Vec::new();
        let mut fields = Vec::new();
        let mut timestamp = None;
        for cell in &self.cells {
            let Some(literal) = cell.to_wire_literal() else {
                continue;
            };
            let config = cell.config();
            if config.is_tag() {
                tags.push(format!("{}={literal}", cell.name()));
            } else if config.is_time() {
                timestamp = Some(literal);
            } else {
                fields.push(format!("{}={literal}", cell.name()));
            }
        }

        if fields.is_empty() {
            return Err(SchemaError::NoFieldValues {
                measurement: self.schema.measurement.clone(),
            }
            .into());
        }

        let mut line = self.schema.measurement.clone();
        for tag in &tags {
            line.push(',');
            line.push_str(tag);
        }
        line.push(' ');
        line.push_str(&fields.join(","));
        if let Some(timestamp) = timestamp {
            line.push(' ');
            line.push_str(&timestamp);
        }
        Ok(line)
    }

    /// Writes this point alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the point cannot be rendered or the write fails.
    pub fn save<T: Transport>(&self, client: &Client<T>) -> Result<String> {
        client.write_points(&self.to_line_protocol()?, &WriteOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InfluxableError;
    use serde_json::json;

    fn cpu() -> Arc<Schema> {
        Schema::builder("cpu")
            .field("host", AttributeSpec::tag())
            .field("region", AttributeSpec::tag())
            .field("value", AttributeSpec::integer().required())
            .field("status", AttributeSpec::string().default("ok"))
            .field("time", AttributeSpec::timestamp().precision("s"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_line_protocol_group_order() {
        let point = cpu()
            .point([
                ("time", json!(1_570_481_055)),
                ("value", json!(10)),
                ("region", json!("eu")),
                ("host", json!("web1")),
            ])
            .unwrap();
        assert_eq!(
            point.to_line_protocol().unwrap(),
            "cpu,host=web1,region=eu value=10i,status='ok' 1570481055000000000"
        );
    }

    #[test]
    fn test_line_protocol_without_tags_or_time() {
        let point = cpu().point([("value", 3)]).unwrap();
        assert_eq!(point.to_line_protocol().unwrap(), "cpu value=3i,status='ok'");
    }

    #[test]
    fn test_missing_required_field() {
        let err = cpu().point([("host", "web1")]).unwrap_err();
        assert!(matches!(
            err,
            InfluxableError::Schema(SchemaError::MissingField { ref field, .. }) if field == "value"
        ));
    }

    #[test]
    fn test_rejected_value_names_field() {
        let err = cpu().point([("value", "ten")]).unwrap_err();
        match err {
            InfluxableError::Schema(SchemaError::InvalidFieldValue { field, source, .. }) => {
                assert_eq!(field, "value");
                assert!(matches!(source, crate::error::ValidationError::Cast { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_field() {
        let err = cpu().point([("value", json!(1)), ("bogus", json!(2))]).unwrap_err();
        assert!(matches!(
            err,
            InfluxableError::Schema(SchemaError::UnknownField { .. })
        ));
    }

    #[test]
    fn test_blank_point_requires_validation() {
        let schema = cpu();
        let mut point = schema.blank_point();
        point.set("value", 5).unwrap();
        assert!(matches!(
            point.to_line_protocol(),
            Err(InfluxableError::Schema(SchemaError::NotValidated { .. }))
        ));
        point.validate().unwrap();
        assert!(point.is_validated());
        assert_eq!(point.to_line_protocol().unwrap(), "cpu value=5i,status='ok'");
    }

    #[test]
    fn test_validate_reports_missing_required() {
        let mut point = cpu().blank_point();
        assert!(matches!(
            point.validate(),
            Err(InfluxableError::Schema(SchemaError::MissingField { .. }))
        ));
        assert!(!point.is_validated());
    }

    #[test]
    fn test_no_field_values() {
        let schema = Schema::define(
            "tags_only",
            [("host", AttributeSpec::tag()), ("value", AttributeSpec::float())],
        )
        .unwrap();
        let point = schema.point([("host", "web1")]).unwrap();
        assert!(matches!(
            point.to_line_protocol(),
            Err(InfluxableError::Schema(SchemaError::NoFieldValues { .. }))
        ));
    }

    #[test]
    fn test_schema_definition_errors() {
        assert!(matches!(
            Schema::builder(" ").build(),
            Err(InfluxableError::Schema(SchemaError::EmptyMeasurementName))
        ));
        assert!(matches!(
            Schema::builder("m")
                .field("a", AttributeSpec::integer())
                .field("a", AttributeSpec::float())
                .build(),
            Err(InfluxableError::Schema(SchemaError::DuplicateField { .. }))
        ));
        assert!(matches!(
            Schema::builder("m")
                .field("t1", AttributeSpec::timestamp())
                .field("t2", AttributeSpec::datetime())
                .build(),
            Err(InfluxableError::Schema(SchemaError::MultipleTimeFields { ref first, ref second, .. }))
                if first == "t1" && second == "t2"
        ));
        assert!(matches!(
            Schema::builder("m")
                .field("t", AttributeSpec::timestamp().precision("x"))
                .build(),
            Err(InfluxableError::Schema(SchemaError::InvalidPrecision { .. }))
        ));
    }

    #[test]
    fn test_build_keeps_declaration_order() {
        let schema = Schema::builder("m")
            .field("b", AttributeSpec::integer())
            .field("a", AttributeSpec::string())
            .field("time", AttributeSpec::timestamp())
            .build()
            .unwrap();
        let names: Vec<&str> = schema.fields().map(AttributeConfig::name).collect();
        assert_eq!(names, ["b", "a", "time"]);
        assert_eq!(schema.time_field().map(AttributeConfig::name), Some("time"));
    }

    #[test]
    fn test_points_do_not_share_state() {
        let schema = cpu();
        let mut a = schema.point([("value", 1)]).unwrap();
        let b = schema.point([("value", 2)]).unwrap();
        a.set("value", 100).unwrap();
        assert_eq!(a.get("value"), Some(&FieldValue::Integer(100)));
        assert_eq!(b.get("value"), Some(&FieldValue::Integer(2)));
    }

    #[test]
    fn test_concurrent_point_construction() {
        let schema = cpu();
        let rendered: Vec<String> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let schema = Arc::clone(&schema);
                    scope.spawn(move || {
                        schema
                            .point([("value", json!(i)), ("host", json!(format!("h{i}")))])
                            .and_then(|point| point.to_line_protocol())
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for (i, line) in rendered.iter().enumerate() {
            assert_eq!(line, &format!("cpu,host=h{i} value={i}i,status='ok'"));
        }
    }

    #[test]
    fn test_to_row_and_time_field() {
        let schema = cpu();
        assert_eq!(schema.time_field().map(AttributeConfig::name), Some("time"));
        let point = schema.point([("value", json!(7)), ("time", json!(12))]).unwrap();
        let row = point.to_row();
        assert_eq!(row["value"], json!(7));
        assert_eq!(row["status"], json!("ok"));
        assert_eq!(row["time"], json!(12));
        assert_eq!(row["host"], Value::Null);
    }

    #[test]
    fn test_scoped_query() {
        assert_eq!(cpu().query().compile(), r#"SELECT * FROM "cpu""#);
    }
}
