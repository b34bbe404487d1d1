//! Request delivery.
//!
//! A [`Transport`] sends one [`Request`] and hands back the raw [`Reply`].
//! It owns URL construction, authentication and timeouts. Nothing above it
//! retries.
//!
//! [`HttpTransport`] talks to a real server (feature `http`).
//! [`MemoryTransport`] answers from a queue and records what it was sent.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use crate::error::TransportError;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
}

impl Method {
    /// Returns the method name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// One call to the server API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// HTTP method.
    pub method: Method,
    /// Path below the base URL, starting with `/`.
    pub path: String,
    /// Query-string parameters in order.
    pub params: Vec<(String, String)>,
    /// Request body.
    pub body: Option<String>,
}

impl Request {
    /// Creates a request without parameters or body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: Vec::new(),
            body: None,
        }
    }

    /// Appends a query-string parameter.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Returns the first value of a parameter.
    pub fn param_value(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Status and body text of a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// HTTP status code.
    pub status: u16,
    /// Body text.
    pub body: String,
}

impl Reply {
    /// Creates a reply.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends requests to the server.
pub trait Transport {
    /// Sends one request, making exactly one attempt.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the request could not be delivered.
    /// A non-2xx status is still a successful delivery.
    fn send(&self, request: &Request) -> Result<Reply, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &Request) -> Result<Reply, TransportError> {
        (**self).send(request)
    }
}

/// Body returned by [`MemoryTransport`] when its queue is empty.
pub const EMPTY_RESULT: &str = r#"{"results":[{"statement_id":0}]}"#;

/// In-process transport that replays queued replies and records requests.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<Request>>,
}

impl MemoryTransport {
    /// Creates a transport with no queued replies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a reply. Replies are consumed in order.
    pub fn push_reply(&self, reply: Reply) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(reply);
    }

    /// Queues a `200` reply with a JSON body.
    pub fn push_json(&self, body: &serde_json::Value) {
        self.push_reply(Reply::new(200, body.to_string()));
    }

    /// Returns every request sent so far.
    pub fn requests(&self) -> Vec<Request> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns how many requests were sent.
    pub fn request_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Transport for MemoryTransport {
    fn send(&self, request: &Request) -> Result<Reply, TransportError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        let reply = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        Ok(reply.unwrap_or_else(|| Reply::new(200, EMPTY_RESULT)))
    }
}

#[cfg(feature = "http")]
pub use http::HttpTransport;

#[cfg(feature = "http")]
mod http {
    use reqwest::blocking::Client;
    use tracing::debug;

    use super::{Method, Reply, Request, Transport};
    use crate::config::ConnectionConfig;
    use crate::error::TransportError;

    /// Blocking HTTP transport over `reqwest`.
    #[derive(Debug, Clone)]
    pub struct HttpTransport {
        client: Client,
        base_url: String,
        credentials: Option<(String, Option<String>)>,
    }

    impl HttpTransport {
        /// Creates a transport for the configured server.
        ///
        /// # Errors
        ///
        /// Returns [`TransportError::ClientCreate`] if the HTTP client cannot be built.
        pub fn new(config: &ConnectionConfig) -> Result<Self, TransportError> {
            let client = Client::builder()
                .timeout(config.timeout)
                .build()
                .map_err(|e| TransportError::ClientCreate { source: e })?;
            Ok(Self {
                client,
                base_url: config.base_url.trim_end_matches('/').to_string(),
                credentials: config.user.clone().map(|user| (user, config.password.clone())),
            })
        }

        /// Returns the base URL requests are sent to.
        pub fn base_url(&self) -> &str {
            &self.base_url
        }
    }

    impl Transport for HttpTransport {
        fn send(&self, request: &Request) -> Result<Reply, TransportError> {
            let url = format!("{}{}", self.base_url, request.path);
            debug!(method = request.method.as_str(), path = %request.path, "sending request");

            let mut builder = match request.method {
                Method::Get => self.client.get(&url),
                Method::Post => self.client.post(&url),
            };
            builder = builder.query(&request.params);
            if let Some((user, password)) = &self.credentials {
                builder = builder.basic_auth(user, password.as_ref());
            }
            if let Some(body) = &request.body {
                builder = builder.body(body.clone());
            }

            let response = builder.send().map_err(|e| TransportError::RequestFailed {
                path: request.path.clone(),
                source: e,
            })?;
            let status = response.status().as_u16();
            let body = response.text().map_err(|e| TransportError::RequestFailed {
                path: request.path.clone(),
                source: e,
            })?;
            Ok(Reply { status, body })
        }
    }
}
