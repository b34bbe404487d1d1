//! Server API calls over a [`Transport`].

use serde_json::Value;
use tracing::{debug, warn};

use crate::attribute::Precision;
use crate::error::{InvalidArgumentError, Result, TransportError};
use crate::transport::{Method, Reply, Request, Transport};

#[cfg(feature = "http")]
use crate::config::ConnectionConfig;
#[cfg(feature = "http")]
use crate::transport::HttpTransport;

/// Options of a `/query` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// HTTP method. Defaults to `POST`.
    pub method: Method,
    /// Unit of returned timestamps. Defaults to nanoseconds.
    pub epoch: Precision,
    /// Ask the server to stream the reply in chunks.
    pub chunked: bool,
    /// Ask the server to indent the reply.
    pub pretty: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            method: Method::Post,
            epoch: Precision::Nanoseconds,
            chunked: false,
            pretty: false,
        }
    }
}

/// Write consistency level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Consistency {
    /// `any`
    Any,
    /// `one`
    One,
    /// `quorum`
    Quorum,
    /// `all`
    #[default]
    All,
}

impl Consistency {
    /// Returns the parameter value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::One => "one",
            Self::Quorum => "quorum",
            Self::All => "all",
        }
    }
}

/// Options of a `/write` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOptions {
    /// Unit of the line timestamps. Defaults to nanoseconds.
    pub precision: Precision,
    /// Defaults to [`Consistency::All`].
    pub consistency: Consistency,
    /// Retention policy; the server default when unset.
    pub retention_policy: Option<String>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            precision: Precision::Nanoseconds,
            consistency: Consistency::All,
            retention_policy: None,
        }
    }
}

/// Database-scoped API client.
#[derive(Debug, Clone)]
pub struct Client<T> {
    transport: T,
    database: String,
}

#[cfg(feature = "http")]
impl Client<HttpTransport> {
    /// Creates an HTTP client for the configured server and database.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn connect(config: &ConnectionConfig) -> Result<Self> {
        Ok(Self::new(HttpTransport::new(config)?, config.database.clone()))
    }
}

impl<T: Transport> Client<T> {
    /// Creates a client sending through `transport`.
    pub fn new(transport: T, database: impl Into<String>) -> Self {
        Self {
            transport,
            database: database.into(),
        }
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the database name.
    pub fn database(&self) -> &str {
        &self.database
    }

    fn send(&self, request: &Request) -> Result<Reply> {
        debug!(method = request.method.as_str(), path = %request.path, "api call");
        Ok(self.transport.send(request)?)
    }

    /// Checks the server is up. Returns the reply body, or `pong` when it is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails or the status is not 2xx.
    pub fn ping(&self, verbose: bool) -> Result<String> {
        let mut request = Request::new(Method::Get, "/ping");
        if verbose {
            request = request.param("verbose", "true");
        }
        let reply = expect_success(self.send(&request)?)?;
        Ok(if reply.body.trim().is_empty() {
            "pong".to_string()
        } else {
            reply.body
        })
    }

    /// Sends query text and decodes the reply.
    ///
    /// A reply whose body reports an `error` is returned as is, whatever
    /// its status, so the caller can inspect it. Chunked replies are merged
    /// into a single result.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidArgumentError::EmptyQuery`] for blank text, or a
    /// transport error if delivery fails, the status is not 2xx without an
    /// error body, or the body is not JSON.
    pub fn execute_query(&self, query: &str, options: &QueryOptions) -> Result<Value> {
        if query.trim().is_empty() {
            return Err(InvalidArgumentError::EmptyQuery.into());
        }
        debug!(query, "executing query");

        let request = Request::new(options.method, "/query")
            .param("db", self.database.as_str())
            .param("q", query)
            .param("epoch", options.epoch.unit())
            .param("chunked", options.chunked.to_string())
            .param("pretty", options.pretty.to_string());
        let reply = self.send(&request)?;

        if !reply.is_success() {
            if let Ok(body) = serde_json::from_str::<Value>(&reply.body)
                && body.get("error").is_some()
            {
                warn!(status = reply.status, "query rejected by server");
                return Ok(body);
            }
            return Err(status_error(reply).into());
        }

        if options.chunked {
            merge_chunks(&request.path, &reply.body)
        } else {
            decode(&request.path, &reply.body)
        }
    }

    /// Writes newline-separated line-protocol text. Returns the reply body.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails or the status is not 2xx.
    pub fn write_points(&self, lines: &str, options: &WriteOptions) -> Result<String> {
        let mut request = Request::new(Method::Post, "/write")
            .param("db", self.database.as_str())
            .param("precision", options.precision.unit())
            .param("consistency", options.consistency.as_str());
        if let Some(rp) = &options.retention_policy {
            request = request.param("rp", rp.as_str());
        }
        let request = request.body(lines);
        debug!(
            lines = lines.lines().count(),
            bytes = lines.len(),
            "writing points"
        );
        Ok(expect_success(self.send(&request)?)?.body)
    }

    /// Fetches server runtime statistics from `/debug/vars`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails, the status is not 2xx, or
    /// the body is not JSON.
    pub fn debug_vars(&self) -> Result<Value> {
        let request = Request::new(Method::Get, "/debug/vars");
        let reply = expect_success(self.send(&request)?)?;
        decode(&request.path, &reply.body)
    }

    /// Fetches per-user request counts from `/debug/requests`, collected
    /// over `seconds` when given.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails, the status is not 2xx, or
    /// the body is not JSON.
    pub fn debug_requests(&self, seconds: Option<u64>) -> Result<Value> {
        let mut request = Request::new(Method::Get, "/debug/requests");
        if let Some(seconds) = seconds {
            request = request.param("seconds", seconds.to_string());
        }
        let reply = expect_success(self.send(&request)?)?;
        decode(&request.path, &reply.body)
    }
}

fn status_error(reply: Reply) -> TransportError {
    TransportError::HttpStatus {
        status: reply.status,
        body: reply.body,
    }
}

fn expect_success(reply: Reply) -> std::result::Result<Reply, TransportError> {
    if reply.is_success() {
        Ok(reply)
    } else {
        Err(status_error(reply))
    }
}

fn decode(path: &str, body: &str) -> Result<Value> {
    serde_json::from_str(body).map_err(|source| {
        TransportError::Decode {
            path: path.to_string(),
            source,
        }
        .into()
    })
}

/// Folds a stream of chunk objects into one reply.
///
/// Series of the first result of later chunks are appended to the first
/// chunk's first result. A chunk reporting an error wins outright.
fn merge_chunks(path: &str, body: &str) -> Result<Value> {
    let mut merged: Option<Value> = None;
    for chunk in serde_json::Deserializer::from_str(body).into_iter::<Value>() {
        let chunk = chunk.map_err(|source| TransportError::Decode {
            path: path.to_string(),
            source,
        })?;
        if chunk.get("error").is_some() {
            return Ok(chunk);
        }
        if merged.is_none() {
            merged = Some(chunk);
            continue;
        }
        let Some(target) = merged.as_mut() else {
            continue;
        };
        let series = chunk
            .pointer("/results/0/series")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if let Some(existing) = target
            .pointer_mut("/results/0")
            .and_then(Value::as_object_mut)
        {
            let slot = existing
                .entry("series")
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Some(all) = slot.as_array_mut() {
                all.extend(series);
            }
        }
    }
    Ok(merged.unwrap_or_else(|| Value::Object(serde_json::Map::new())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InfluxableError;
    use crate::transport::MemoryTransport;
    use serde_json::json;

    fn client() -> Client<MemoryTransport> {
        Client::new(MemoryTransport::new(), "metrics")
    }

    #[test]
    fn test_query_parameters() {
        let client = client();
        client
            .execute_query("SELECT * FROM \"cpu\"", &QueryOptions::default())
            .unwrap();
        let sent = &client.transport().requests()[0];
        assert_eq!(sent.method, Method::Post);
        assert_eq!(sent.path, "/query");
        assert_eq!(sent.param_value("db"), Some("metrics"));
        assert_eq!(sent.param_value("q"), Some("SELECT * FROM \"cpu\""));
        assert_eq!(sent.param_value("epoch"), Some("ns"));
        assert_eq!(sent.param_value("chunked"), Some("false"));
    }

    #[test]
    fn test_empty_query_is_never_sent() {
        let client = client();
        let err = client.execute_query("  ", &QueryOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            InfluxableError::InvalidArgument(InvalidArgumentError::EmptyQuery)
        ));
        assert_eq!(client.transport().request_count(), 0);
    }

    #[test]
    fn test_error_body_is_returned_for_inspection() {
        let client = client();
        client
            .transport()
            .push_reply(Reply::new(400, r#"{"error":"error parsing query"}"#));
        let body = client
            .execute_query("SELEC", &QueryOptions::default())
            .unwrap();
        assert_eq!(body, json!({"error": "error parsing query"}));
    }

    #[test]
    fn test_bad_status_without_error_body() {
        let client = client();
        client.transport().push_reply(Reply::new(502, "bad gateway"));
        let err = client
            .execute_query("SELECT 1", &QueryOptions::default())
            .unwrap_err();
        assert!(matches!(
            err,
            InfluxableError::Transport(TransportError::HttpStatus { status: 502, .. })
        ));
    }

    #[test]
    fn test_undecodable_body() {
        let client = client();
        client.transport().push_reply(Reply::new(200, "not json"));
        assert!(matches!(
            client.execute_query("SELECT 1", &QueryOptions::default()),
            Err(InfluxableError::Transport(TransportError::Decode { .. }))
        ));
    }

    #[test]
    fn test_chunked_reply_is_merged() {
        let client = client();
        let body = concat!(
            r#"{"results":[{"statement_id":0,"series":[{"name":"cpu","columns":["time"],"values":[[1]]}]}]}"#,
            "\n",
            r#"{"results":[{"statement_id":0,"series":[{"name":"cpu","columns":["time"],"values":[[2]]}]}]}"#,
            "\n"
        );
        client.transport().push_reply(Reply::new(200, body));
        let options = QueryOptions {
            chunked: true,
            ..QueryOptions::default()
        };
        let merged = client.execute_query("SELECT * FROM cpu", &options).unwrap();
        let series = merged.pointer("/results/0/series").unwrap().as_array().unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[1]["values"], json!([[2]]));
    }

    #[test]
    fn test_write_parameters() {
        let client = client();
        client.transport().push_reply(Reply::new(204, ""));
        let options = WriteOptions {
            precision: Precision::Seconds,
            retention_policy: Some("week".to_string()),
            ..WriteOptions::default()
        };
        client.write_points("cpu value=1i", &options).unwrap();
        let sent = &client.transport().requests()[0];
        assert_eq!(sent.path, "/write");
        assert_eq!(sent.param_value("precision"), Some("s"));
        assert_eq!(sent.param_value("consistency"), Some("all"));
        assert_eq!(sent.param_value("rp"), Some("week"));
        assert_eq!(sent.body.as_deref(), Some("cpu value=1i"));
    }

    #[test]
    fn test_write_without_retention_policy() {
        let client = client();
        client.write_points("cpu value=1i", &WriteOptions::default()).unwrap();
        assert_eq!(client.transport().requests()[0].param_value("rp"), None);
    }

    #[test]
    fn test_ping_and_debug_endpoints() {
        let client = client();
        client.transport().push_reply(Reply::new(204, ""));
        assert_eq!(client.ping(true).unwrap(), "pong");

        client.transport().push_json(&json!({"cmdline": ["influxd"]}));
        assert_eq!(client.debug_vars().unwrap()["cmdline"][0], "influxd");

        client.transport().push_json(&json!({}));
        client.debug_requests(Some(10)).unwrap();

        let sent = client.transport().requests();
        assert_eq!(sent[0].param_value("verbose"), Some("true"));
        assert_eq!(sent[1].path, "/debug/vars");
        assert_eq!(sent[2].param_value("seconds"), Some("10"));
    }
}
