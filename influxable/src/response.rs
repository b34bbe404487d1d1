//! Read-only views over a decoded `/query` reply.
//!
//! The expected shape is
//! `{"results": [{"series": [{"name", "columns", "values"}], "error"?}], "error"?}`.
//! Only the first result is ever read.

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{InfluxableError, ResponseError, Result};

/// Name reported for a series that carries none.
pub const DEFAULT_SERIES_NAME: &str = "default";

/// A decoded reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    raw: Map<String, Value>,
}

impl Response {
    /// Wraps a decoded reply.
    ///
    /// # Errors
    ///
    /// Returns [`ResponseError::Malformed`] if the value is not a JSON object.
    pub fn new(raw: Value) -> Result<Self> {
        match raw {
            Value::Object(raw) => Ok(Self { raw }),
            other => Err(ResponseError::Malformed {
                reason: format!("expected a JSON object, got {other}"),
            }
            .into()),
        }
    }

    /// Returns the reply as decoded.
    pub fn raw(&self) -> &Map<String, Value> {
        &self.raw
    }

    /// Consumes the view and returns the decoded reply.
    pub fn into_raw(self) -> Value {
        Value::Object(self.raw)
    }

    fn first_result(&self) -> Option<&Map<String, Value>> {
        self.raw
            .get("results")
            .and_then(Value::as_array)
            .and_then(|results| results.first())
            .and_then(Value::as_object)
    }

    /// Returns the error string, checking the top level first and then the first result.
    pub fn error(&self) -> Option<&str> {
        self.raw
            .get("error")
            .and_then(Value::as_str)
            .or_else(|| {
                self.first_result()
                    .and_then(|result| result.get("error"))
                    .and_then(Value::as_str)
            })
    }

    /// Fails if the reply reports an error.
    ///
    /// # Errors
    ///
    /// Returns [`ResponseError::Server`] carrying the reported message.
    pub fn raise_if_error(&self) -> Result<()> {
        match self.error() {
            Some(message) => {
                warn!(error = message, "query reply reports an error");
                Err(ResponseError::Server {
                    message: message.to_string(),
                }
                .into())
            }
            None => Ok(()),
        }
    }

    /// Returns the series of the first result.
    pub fn series(&self) -> Vec<Series<'_>> {
        self.first_result()
            .and_then(|result| result.get("series"))
            .and_then(Value::as_array)
            .map(|series| series.iter().filter_map(Series::new).collect())
            .unwrap_or_default()
    }

    /// Returns the first series of the first result.
    pub fn main_series(&self) -> Option<Series<'_>> {
        self.series().into_iter().next()
    }
}

impl TryFrom<Value> for Response {
    type Error = InfluxableError;

    fn try_from(raw: Value) -> Result<Self> {
        Self::new(raw)
    }
}

/// One named table inside a result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Series<'a> {
    raw: &'a Map<String, Value>,
}

impl<'a> Series<'a> {
    fn new(raw: &'a Value) -> Option<Self> {
        raw.as_object().map(|raw| Self { raw })
    }

    /// Returns the series name, or [`DEFAULT_SERIES_NAME`].
    pub fn name(&self) -> &'a str {
        self.raw
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_SERIES_NAME)
    }

    /// Returns the column names in order. A series without a `columns`
    /// key has none.
    ///
    /// # Errors
    ///
    /// Returns [`ResponseError::Malformed`] if a column name is not a
    /// string, since the names would no longer line up with row values.
    pub fn columns(&self) -> Result<Vec<&'a str>> {
        let Some(columns) = self.raw.get("columns").and_then(Value::as_array) else {
            return Ok(Vec::new());
        };
        columns
            .iter()
            .enumerate()
            .map(|(index, column)| {
                column.as_str().ok_or_else(|| {
                    InfluxableError::from(ResponseError::Malformed {
                        reason: format!(
                            "series '{}' has non-string column {column} at position {index}",
                            self.name()
                        ),
                    })
                })
            })
            .collect()
    }

    /// Returns the rows. A series without a `values` key has no rows.
    pub fn rows(&self) -> &'a [Value] {
        self.raw
            .get("values")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Returns the tag set of a grouped series.
    pub fn tags(&self) -> Option<&'a Map<String, Value>> {
        self.raw.get("tags").and_then(Value::as_object)
    }
}
