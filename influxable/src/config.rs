//! Connection settings.

use std::env;
use std::time::Duration;

/// Retention policy every write and scoped name uses.
pub const DEFAULT_POLICY: &str = "autogen";

/// Where and as whom to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Server base URL (e.g., `http://localhost:8086`).
    pub base_url: String,
    /// Database queries and writes go to.
    pub database: String,
    /// Basic-auth user.
    pub user: Option<String>,
    /// Basic-auth password.
    pub password: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl ConnectionConfig {
    /// Creates a config without credentials and a 30s timeout.
    pub fn new(base_url: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            database: database.into(),
            user: None,
            password: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Sets basic-auth credentials.
    #[must_use]
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the database.
    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Reads the config from `INFLUXDB_*` environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `INFLUXDB_URL` | `http://localhost:8086` |
    /// | `INFLUXDB_USER` | `admin` |
    /// | `INFLUXDB_PASSWORD` | `changeme` |
    /// | `INFLUXDB_DATABASE_NAME` | `default` |
    /// | `INFLUXDB_TIMEOUT_SECS` | `30` |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let timeout = lookup("INFLUXDB_TIMEOUT_SECS")
            .and_then(|secs| secs.parse().ok())
            .map_or(Duration::from_secs(30), Duration::from_secs);

        Self::new(
            var("INFLUXDB_URL", "http://localhost:8086"),
            var("INFLUXDB_DATABASE_NAME", "default"),
        )
        .with_credentials(
            var("INFLUXDB_USER", "admin"),
            var("INFLUXDB_PASSWORD", "changeme"),
        )
        .with_timeout(timeout)
    }

    /// Returns the retention policy name.
    pub fn policy_name(&self) -> &'static str {
        DEFAULT_POLICY
    }

    /// Returns `"<database>"."autogen"`.
    pub fn full_database_name(&self) -> String {
        format!("\"{}\".\"{}\"", self.database, self.policy_name())
    }
}
