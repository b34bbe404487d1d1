//! # influxable
//!
//! Typed access layer over the InfluxDB 1.x HTTP query and write API.
//!
//! influxable lets you declare a measurement as a set of typed fields,
//! compose InfluxQL through a clause builder instead of formatting strings,
//! and move values between typed points, line protocol, and the nested
//! tabular JSON that `/query` returns.
//!
//! ## Key Properties
//!
//! - Field values are coerced and validated on every assignment
//! - Query setters validate their arguments immediately; compiling is pure
//! - Schemas are immutable and shared; points own their values
//! - Synchronous request/response; the transport is a swappable trait
//!
//! ## Quick Start
//!
//! ```rust
//! use influxable::attribute::AttributeSpec;
//! use influxable::client::Client;
//! use influxable::criteria::Field;
//! use influxable::measurement::Schema;
//! use influxable::transport::MemoryTransport;
//! use serde_json::json;
//!
//! # fn main() -> influxable::Result<()> {
//! let schema = Schema::builder("temperature")
//!     .field("phase", AttributeSpec::tag())
//!     .field("value", AttributeSpec::float().max_decimals(2).required())
//!     .field("time", AttributeSpec::timestamp().precision("s"))
//!     .build()?;
//!
//! // MemoryTransport stands in for a server; use Client::connect for HTTP
//! let client = Client::new(MemoryTransport::new(), "example");
//!
//! let point = schema.point([
//!     ("phase", json!("moon")),
//!     ("value", json!(21.456)),
//!     ("time", json!(1_570_481_055)),
//! ])?;
//! schema.bulk_save(&client, &[point])?;
//!
//! let query = schema.query().filter([Field::new("value").gt(20)])?.limit(10)?;
//! assert_eq!(
//!     query.compile(),
//!     r#"SELECT * FROM "temperature" WHERE "value" > 20 LIMIT 10"#
//! );
//! let points = schema.evaluate(&client, &query)?;
//! assert!(points.is_empty());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`attribute`]: Field kinds, coercion, validation and wire rendering
//! - [`criteria`]: WHERE-clause comparisons
//! - [`function`]: Aggregate, selector and transformation calls
//! - [`query`]: Clause builder and compiler
//! - [`measurement`]: Schemas, points and line protocol
//! - [`response`]: Views over decoded replies
//! - [`serializer`]: Reply converters
//! - [`client`]: API calls
//! - [`transport`]: Request delivery
//! - [`config`]: Connection settings
//! - [`error`]: Error types

pub mod attribute;
pub mod client;
pub mod config;
pub mod criteria;
pub mod error;
pub mod function;
pub mod measurement;
pub mod query;
pub mod response;
pub mod serializer;
pub mod transport;

pub use attribute::{Attribute, AttributeSpec, FieldValue, Precision};
pub use client::Client;
pub use config::ConnectionConfig;
pub use criteria::{Criterion, Field};
pub use error::{InfluxableError, Result};
pub use measurement::{Point, Schema};
pub use query::{Query, RawQuery};
pub use response::Response;
pub use serializer::Serializer;
