//! Error types for influxable.

use thiserror::Error;

/// The main error type for all influxable operations.
///
/// Each variant wraps the error enum of one failure domain: field values,
/// schema construction, query arguments, server-reported errors and the
/// transport underneath.
#[derive(Error, Debug)]
pub enum InfluxableError {
    /// A field rejected the value assigned to it.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A measurement schema or instance could not be built.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// A query builder clause or a batch was given a malformed argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] InvalidArgumentError),

    /// The decoded response reports an error or has an unexpected shape.
    #[error("response error: {0}")]
    Response(#[from] ResponseError),

    /// The transport failed to deliver a request or decode its reply.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Errors raised when a value is assigned to a field.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A null value was given to a field that is neither nullable nor defaulted.
    #[error("field '{field}' does not accept null values")]
    NullValue {
        /// The field name.
        field: String,
    },

    /// The raw value could not be converted to the field's type.
    #[error("field '{field}' cannot cast {raw} to {kind}: {reason}")]
    Cast {
        /// The field name.
        field: String,
        /// The target kind of the field.
        kind: &'static str,
        /// The raw value, rendered as JSON.
        raw: String,
        /// Why the conversion failed.
        reason: String,
    },

    /// The value is below the field's minimum bound.
    #[error("field '{field}' value {value} is below the minimum {min}")]
    BelowMinimum {
        /// The field name.
        field: String,
        /// The rejected value.
        value: String,
        /// The configured minimum.
        min: String,
    },

    /// The value is above the field's maximum bound.
    #[error("field '{field}' value {value} is above the maximum {max}")]
    AboveMaximum {
        /// The field name.
        field: String,
        /// The rejected value.
        value: String,
        /// The configured maximum.
        max: String,
    },

    /// The string value is longer than the field allows.
    #[error("field '{field}' value has {length} characters (max {max_length})")]
    TooLong {
        /// The field name.
        field: String,
        /// The length of the rejected value in characters.
        length: usize,
        /// The configured maximum length.
        max_length: usize,
    },

    /// The string value is not one of the allowed choices.
    #[error("field '{field}' value '{value}' must be one of {choices:?}")]
    InvalidChoice {
        /// The field name.
        field: String,
        /// The rejected value.
        value: String,
        /// The allowed values.
        choices: Vec<String>,
    },
}

impl ValidationError {
    /// Returns the name of the field that rejected the value.
    pub fn field(&self) -> &str {
        match self {
            Self::NullValue { field }
            | Self::Cast { field, .. }
            | Self::BelowMinimum { field, .. }
            | Self::AboveMaximum { field, .. }
            | Self::TooLong { field, .. }
            | Self::InvalidChoice { field, .. } => field,
        }
    }
}

/// Errors raised while defining a schema or constructing one of its instances.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    /// The measurement name is empty.
    #[error("measurement name cannot be empty")]
    EmptyMeasurementName,

    /// A field name is empty.
    #[error("measurement '{measurement}' declares a field with an empty name")]
    EmptyFieldName {
        /// The measurement name.
        measurement: String,
    },

    /// Two fields share the same name.
    #[error("measurement '{measurement}' declares field '{field}' twice")]
    DuplicateField {
        /// The measurement name.
        measurement: String,
        /// The duplicated field name.
        field: String,
    },

    /// More than one timestamp or datetime field is declared.
    #[error("measurement '{measurement}' declares two time fields: '{first}' and '{second}'")]
    MultipleTimeFields {
        /// The measurement name.
        measurement: String,
        /// The first time field.
        first: String,
        /// The second time field.
        second: String,
    },

    /// A timestamp precision unit is not recognized.
    #[error("field '{field}' has unknown precision unit '{unit}' (expected h, m, s, ms, u or ns)")]
    InvalidPrecision {
        /// The field name.
        field: String,
        /// The rejected unit.
        unit: String,
    },

    /// A field option is invalid or does not apply to the field's kind.
    #[error("field '{field}' is misconfigured: {reason}")]
    InvalidConfig {
        /// The field name.
        field: String,
        /// Description of what is wrong.
        reason: String,
    },

    /// A field's default value does not pass its own validation.
    #[error("field '{field}' has an invalid default: {source}")]
    InvalidDefault {
        /// The field name.
        field: String,
        /// The validation failure of the default value.
        #[source]
        source: ValidationError,
    },

    /// A required field was not supplied when building an instance.
    #[error("measurement '{measurement}' requires field '{field}'")]
    MissingField {
        /// The measurement name.
        measurement: String,
        /// The missing field name.
        field: String,
    },

    /// A supplied value was rejected by its field.
    #[error("measurement '{measurement}' rejected field '{field}': {source}")]
    InvalidFieldValue {
        /// The measurement name.
        measurement: String,
        /// The field name.
        field: String,
        /// The underlying validation failure.
        #[source]
        source: ValidationError,
    },

    /// A value was given for a field the schema does not declare.
    #[error("measurement '{measurement}' has no field '{field}'")]
    UnknownField {
        /// The measurement name.
        measurement: String,
        /// The unknown field name.
        field: String,
    },

    /// The instance was rendered before it was validated.
    #[error("point of measurement '{measurement}' has not been validated")]
    NotValidated {
        /// The measurement name.
        measurement: String,
    },

    /// The instance has no non-null field values to write.
    #[error("point of measurement '{measurement}' has no field values")]
    NoFieldValues {
        /// The measurement name.
        measurement: String,
    },
}

/// Errors raised when a query clause or a batch receives a malformed argument.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvalidArgumentError {
    /// A clause requiring a non-empty sequence received an empty one.
    #[error("{clause} clause requires at least one argument")]
    EmptyArgument {
        /// The clause name.
        clause: &'static str,
    },

    /// A clause requiring a positive integer received zero.
    #[error("{clause} clause requires a positive integer")]
    NonPositive {
        /// The clause name.
        clause: &'static str,
    },

    /// A measurement, target or tag name is empty.
    #[error("{clause} clause received an empty name")]
    EmptyName {
        /// The clause name.
        clause: &'static str,
    },

    /// A criterion is not well formed.
    #[error("WHERE clause received a malformed criterion: {reason}")]
    MalformedCriterion {
        /// Description of what is wrong.
        reason: String,
    },

    /// A duration literal does not follow the `<digits><unit>` grammar.
    #[error("{clause} clause received invalid duration '{value}'")]
    InvalidDuration {
        /// The clause name.
        clause: &'static str,
        /// The rejected literal.
        value: String,
    },

    /// A numeric fill value is NaN or infinite.
    #[error("GROUP BY clause received non-finite fill value {value}")]
    InvalidFill {
        /// The rejected value.
        value: f64,
    },

    /// A timezone name is not in the timezone database.
    #[error("unknown timezone '{name}'")]
    InvalidTimezone {
        /// The rejected timezone name.
        name: String,
    },

    /// An empty query string was submitted.
    #[error("query string cannot be empty")]
    EmptyQuery,

    /// A batch write received no points.
    #[error("bulk save requires at least one point")]
    EmptyBatch,

    /// A batch write mixes points of different measurements.
    #[error("bulk save for measurement '{expected}' received a point of '{found}'")]
    MixedSchemas {
        /// The measurement the batch was submitted for.
        expected: String,
        /// The measurement of the offending point.
        found: String,
    },
}

/// Errors reported by, or found in, a decoded response.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResponseError {
    /// The server reported an error string.
    #[error("server reported: {message}")]
    Server {
        /// The error message from the response body.
        message: String,
    },

    /// The decoded response is not shaped like a query result.
    #[error("malformed response: {reason}")]
    Malformed {
        /// Description of what is wrong.
        reason: String,
    },
}

/// Errors raised by a [`Transport`](crate::transport::Transport).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to create the HTTP client.
    #[cfg(feature = "http")]
    #[error("failed to create HTTP client: {source}")]
    ClientCreate {
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// The HTTP request failed before a status was received.
    #[cfg(feature = "http")]
    #[error("request to '{path}' failed: {source}")]
    RequestFailed {
        /// The request path.
        path: String,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// The server returned a non-2xx status.
    #[error("server returned status {status}: {body}")]
    HttpStatus {
        /// The HTTP status code.
        status: u16,
        /// The response body text.
        body: String,
    },

    /// The reply body is not valid JSON.
    #[error("failed to decode reply from '{path}': {source}")]
    Decode {
        /// The request path.
        path: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A custom transport failed.
    #[error("{reason}")]
    Other {
        /// Description of the failure.
        reason: String,
    },
}

/// Type alias for `Result<T, InfluxableError>`.
pub type Result<T> = std::result::Result<T, InfluxableError>;
