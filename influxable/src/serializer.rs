//! Converters from a [`Response`] to caller-facing shapes.
//!
//! | Serializer | Output |
//! |---|---|
//! | [`RawSerializer`] | the decoded reply unchanged |
//! | [`JsonSerializer`] | the reply as compact JSON text |
//! | [`FormattedSeriesSerializer`] | named-column rows grouped per series |
//! | [`FlatFormattedSeriesSerializer`] | the rows of the only series |
//! | [`FlatSimpleResultSerializer`] | every value of the main series, flattened |
//! | [`FlatSingleValueSerializer`] | the single value of the main series |
//! | [`PointSerializer`] | typed [`Point`]s of a schema |

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat};
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::attribute::{AttributeType, parse_decimal};
use crate::error::{ResponseError, Result};
use crate::measurement::{Point, Schema};
use crate::response::{Response, Series};

/// One row keyed by column name.
pub type Row = Map<String, Value>;

/// Converts a response into some output shape.
pub trait Serializer {
    /// The produced shape.
    type Output;

    /// Runs the conversion.
    ///
    /// # Errors
    ///
    /// Returns an error if the response cannot be converted.
    fn convert(&self, response: &Response) -> Result<Self::Output>;
}

/// Returns the decoded reply unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawSerializer;

impl Serializer for RawSerializer {
    type Output = Value;

    fn convert(&self, response: &Response) -> Result<Value> {
        Ok(Value::Object(response.raw().clone()))
    }
}

/// Renders the decoded reply as compact JSON text.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    type Output = String;

    fn convert(&self, response: &Response) -> Result<String> {
        serde_json::to_string(response.raw()).map_err(|err| {
            ResponseError::Malformed {
                reason: err.to_string(),
            }
            .into()
        })
    }
}

/// Rows of one series, keyed by column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesRows {
    /// Series name.
    pub name: String,
    /// Rows in reply order.
    pub rows: Vec<Row>,
}

fn zip_row(columns: &[&str], row: &Value) -> Row {
    let values = row.as_array().map(Vec::as_slice).unwrap_or_default();
    columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            let value = values.get(i).cloned().unwrap_or(Value::Null);
            ((*column).to_string(), value)
        })
        .collect()
}

fn format_series(series: &Series<'_>) -> Result<SeriesRows> {
    let columns = series.columns()?;
    let rows = series.rows();
    let rows = if rows.is_empty() {
        vec![zip_row(&columns, &Value::Null)]
    } else {
        rows.iter().map(|row| zip_row(&columns, row)).collect()
    };
    Ok(SeriesRows {
        name: series.name().to_string(),
        rows,
    })
}

/// Zips every series' columns against its rows.
///
/// A series without rows yields a single row of nulls.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormattedSeriesSerializer;

impl Serializer for FormattedSeriesSerializer {
    type Output = Vec<SeriesRows>;

    fn convert(&self, response: &Response) -> Result<Vec<SeriesRows>> {
        let formatted = response
            .series()
            .iter()
            .map(format_series)
            .collect::<Result<Vec<SeriesRows>>>()?;
        debug!(series = formatted.len(), "formatted series");
        Ok(formatted)
    }
}

/// Returns the rows of the only series.
///
/// Zero or several series yield an empty list. Several series are
/// reported with a warning, since their rows are dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatFormattedSeriesSerializer;

impl Serializer for FlatFormattedSeriesSerializer {
    type Output = Vec<Row>;

    fn convert(&self, response: &Response) -> Result<Vec<Row>> {
        let mut formatted = FormattedSeriesSerializer.convert(response)?;
        match formatted.len() {
            1 => Ok(formatted.swap_remove(0).rows),
            0 => Ok(Vec::new()),
            count => {
                warn!(series = count, "cannot flatten a multi-series reply, returning no rows");
                Ok(Vec::new())
            }
        }
    }
}

/// Concatenates every row value of the main series.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatSimpleResultSerializer;

impl Serializer for FlatSimpleResultSerializer {
    type Output = Vec<Value>;

    fn convert(&self, response: &Response) -> Result<Vec<Value>> {
        let values: Vec<Value> = response
            .main_series()
            .map(|series| {
                series
                    .rows()
                    .iter()
                    .filter_map(Value::as_array)
                    .flatten()
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        debug!(values = values.len(), "flattened main series");
        Ok(values)
    }
}

/// Returns the value of the main series when it holds exactly one.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatSingleValueSerializer;

impl Serializer for FlatSingleValueSerializer {
    type Output = Option<Value>;

    fn convert(&self, response: &Response) -> Result<Option<Value>> {
        let mut values = FlatSimpleResultSerializer.convert(response)?;
        Ok(if values.len() == 1 { values.pop() } else { None })
    }
}

/// Builds typed points of a schema from every row of every series.
///
/// Time columns arrive as nanoseconds and are converted to each time
/// field's own precision before assignment. Tags of a grouped series are
/// added to its rows. Columns the schema does not declare are skipped.
#[derive(Debug, Clone)]
pub struct PointSerializer {
    schema: Arc<Schema>,
}

impl PointSerializer {
    /// Creates a serializer for the given schema.
    pub fn new(schema: Arc<Schema>) -> Self {
        Self { schema }
    }

    fn time_value(&self, column: &str, value: Value) -> Value {
        let Some(config) = self.schema.field(column).filter(|config| config.is_time()) else {
            return value;
        };
        let Some(nanos) = value.as_number().and_then(|n| parse_decimal(&n.to_string())) else {
            return value;
        };
        if config.attribute_type() == AttributeType::Timestamp {
            return config
                .precision()
                .nanos_to_unit(nanos)
                .map_or(value, |count| Value::String(count.to_string()));
        }
        // Datetimes take the exact nanoseconds as RFC 3339 text
        nanos.to_i64().map_or(value, |nanos| {
            let instant = DateTime::from_timestamp_nanos(nanos);
            Value::String(instant.to_rfc3339_opts(SecondsFormat::Nanos, true))
        })
    }

    fn to_point(&self, columns: &[&str], row: &Value, tags: Option<&Row>) -> Result<Point> {
        let mut row = zip_row(columns, row);
        for (tag, value) in tags.into_iter().flatten() {
            row.entry(tag.clone()).or_insert_with(|| value.clone());
        }
        let values = row
            .into_iter()
            .filter(|(column, _)| self.schema.field(column).is_some())
            .map(|(column, value)| {
                let value = self.time_value(&column, value);
                (column, value)
            });
        self.schema.point(values)
    }
}

impl Serializer for PointSerializer {
    type Output = Vec<Point>;

    fn convert(&self, response: &Response) -> Result<Vec<Point>> {
        let mut points = Vec::new();
        for series in response.series() {
            let columns = series.columns()?;
            let unmapped: Vec<&str> = columns
                .iter()
                .copied()
                .filter(|column| self.schema.field(column).is_none())
                .collect();
            if !unmapped.is_empty() {
                warn!(
                    measurement = self.schema.measurement(),
                    columns = ?unmapped,
                    "skipping columns without a matching field"
                );
            }
            for row in series.rows() {
                points.push(self.to_point(&columns, row, series.tags())?);
            }
        }
        debug!(
            measurement = self.schema.measurement(),
            points = points.len(),
            "converted rows to points"
        );
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(raw: Value) -> Response {
        Response::new(raw).unwrap()
    }

    fn two_series() -> Response {
        response(json!({"results": [{"series": [
            {"name": "cpu", "columns": ["time", "value"], "values": [[1, 10], [2, 20]]},
            {"name": "mem", "columns": ["time", "value"]}
        ]}]}))
    }

    #[test]
    fn test_raw_and_json() {
        let r = response(json!({"results": []}));
        assert_eq!(RawSerializer.convert(&r).unwrap(), json!({"results": []}));
        assert_eq!(JsonSerializer.convert(&r).unwrap(), r#"{"results":[]}"#);
    }

    #[test]
    fn test_formatted_series_fills_empty_series() {
        let formatted = FormattedSeriesSerializer.convert(&two_series()).unwrap();
        assert_eq!(formatted.len(), 2);
        assert_eq!(formatted[0].name, "cpu");
        assert_eq!(formatted[0].rows[1]["value"], json!(20));
        assert_eq!(formatted[1].rows.len(), 1);
        assert_eq!(formatted[1].rows[0]["time"], Value::Null);
        assert_eq!(formatted[1].rows[0]["value"], Value::Null);
    }

    #[test]
    fn test_flat_formatted_needs_exactly_one_series() {
        assert!(FlatFormattedSeriesSerializer.convert(&two_series()).unwrap().is_empty());

        let none = response(json!({"results": [{"statement_id": 0}]}));
        assert!(FlatFormattedSeriesSerializer.convert(&none).unwrap().is_empty());

        let one = response(json!({"results": [{"series": [
            {"columns": ["time", "value"], "values": [[1, 10]]}
        ]}]}));
        let rows = FlatFormattedSeriesSerializer.convert(&one).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(Value::Object(rows[0].clone()), json!({"time": 1, "value": 10}));
    }

    #[test]
    fn test_flat_values() {
        let values = FlatSimpleResultSerializer.convert(&two_series()).unwrap();
        assert_eq!(values, [json!(1), json!(10), json!(2), json!(20)]);
        assert_eq!(FlatSingleValueSerializer.convert(&two_series()).unwrap(), None);

        let single = response(json!({"results": [{"series": [
            {"columns": ["count"], "values": [[42]]}
        ]}]}));
        assert_eq!(
            FlatSingleValueSerializer.convert(&single).unwrap(),
            Some(json!(42))
        );
    }
}
