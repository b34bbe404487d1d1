//! Clause-by-clause query builder.
//!
//! A [`Query`] holds one slot per clause. Every setter replaces its slot,
//! validates its argument up front, and returns the builder for chaining.
//! [`Query::compile`] renders the slots in a fixed order without touching
//! the state, so it can be called any number of times.
//!
//! # Example
//!
//! ```rust
//! use influxable::criteria::Field;
//! use influxable::query::{Fill, Order, Query, TimeBucket};
//!
//! # fn main() -> influxable::Result<()> {
//! let value = Field::new("value");
//! let query = Query::new()
//!     .select(["f1", "f2"])
//!     .from(["m"])?
//!     .filter([value.lt(400), value.gt(800)])?;
//! assert_eq!(
//!     query.compile(),
//!     r#"SELECT f1,f2 FROM "m" WHERE "value" < 400 AND "value" > 800"#
//! );
//!
//! let hourly = Query::new()
//!     .mean("value")
//!     .from(["cpu"])?
//!     .group_by_time(TimeBucket::new("1h").tags(["phase"]).fill(Fill::Previous))?
//!     .order_by(Order::Desc);
//! assert_eq!(
//!     hourly.compile(),
//!     r#"SELECT MEAN(value) FROM "cpu" GROUP BY time(1h),phase fill(previous) ORDER BY time DESC"#
//! );
//! # Ok(())
//! # }
//! ```

use std::fmt;

use chrono_tz::Tz;
use serde_json::Value;

use crate::client::{Client, QueryOptions};
use crate::criteria::Criterion;
use crate::error::{InvalidArgumentError, Result};
use crate::function::{self, FunctionArg};
use crate::response::Response;
use crate::serializer::Serializer;
use crate::transport::Transport;

/// Units accepted in duration literals. Two-letter units come first so
/// that `ms` is not read as `m` followed by `s`.
const DURATION_UNITS: [&str; 9] = ["ns", "ms", "u", "µ", "s", "m", "h", "d", "w"];

/// Sort direction on time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Order {
    /// `ORDER BY time ASC`
    Asc,
    /// `ORDER BY time DESC`
    Desc,
}

impl Order {
    fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Fill strategy of a time bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fill {
    /// `fill(<n>)`
    Value(f64),
    /// `fill(null)`
    Null,
    /// `fill(none)`
    None,
    /// `fill(previous)`
    Previous,
    /// `fill(linear)`
    Linear,
}

impl fmt::Display for Fill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "{v}"),
            Self::Null => f.write_str("null"),
            Self::None => f.write_str("none"),
            Self::Previous => f.write_str("previous"),
            Self::Linear => f.write_str("linear"),
        }
    }
}

/// Parameters of `GROUP BY time(...)`.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct TimeBucket {
    interval: String,
    offset: Option<String>,
    tags: Vec<String>,
    fill: Option<Fill>,
}

impl TimeBucket {
    /// Creates a bucket of the given interval, such as `10m` or `1h30m`.
    pub fn new(interval: impl Into<String>) -> Self {
        Self {
            interval: interval.into(),
            offset: None,
            tags: Vec::new(),
            fill: None,
        }
    }

    /// Shifts bucket boundaries by a duration. A leading `-` shifts backwards.
    pub fn offset(mut self, offset: impl Into<String>) -> Self {
        self.offset = Some(offset.into());
        self
    }

    /// Also groups by these tags.
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the fill strategy for empty buckets.
    pub fn fill(mut self, fill: Fill) -> Self {
        self.fill = Some(fill);
        self
    }

    fn validate(&self) -> std::result::Result<(), InvalidArgumentError> {
        if !is_duration(&self.interval) {
            return Err(InvalidArgumentError::InvalidDuration {
                clause: "GROUP BY",
                value: self.interval.clone(),
            });
        }
        if let Some(offset) = &self.offset {
            let unsigned = offset.strip_prefix('-').unwrap_or(offset);
            if !is_duration(unsigned) {
                return Err(InvalidArgumentError::InvalidDuration {
                    clause: "GROUP BY",
                    value: offset.clone(),
                });
            }
        }
        if let Some(Fill::Value(v)) = self.fill
            && !v.is_finite()
        {
            return Err(InvalidArgumentError::InvalidFill { value: v });
        }
        check_names("GROUP BY", &self.tags)
    }

    fn render(&self) -> String {
        let mut out = format!("GROUP BY time({}", self.interval);
        if let Some(offset) = &self.offset {
            out.push(',');
            out.push_str(offset);
        }
        out.push(')');
        if !self.tags.is_empty() {
            out.push(',');
            out.push_str(&self.tags.join(","));
        }
        if let Some(fill) = self.fill {
            out.push_str(&format!(" fill({fill})"));
        }
        out
    }
}

/// Returns whether `text` is one or more `<digits><unit>` pairs.
fn is_duration(text: &str) -> bool {
    let mut rest = text;
    if rest.is_empty() {
        return false;
    }
    while !rest.is_empty() {
        let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
        if digits == 0 {
            return false;
        }
        rest = &rest[digits..];
        match DURATION_UNITS.iter().find_map(|unit| rest.strip_prefix(unit)) {
            Some(remaining) => rest = remaining,
            None => return false,
        }
    }
    true
}

fn check_names(clause: &'static str, names: &[String]) -> std::result::Result<(), InvalidArgumentError> {
    if names.iter().any(|name| name.trim().is_empty()) {
        return Err(InvalidArgumentError::EmptyName { clause });
    }
    Ok(())
}

fn positive(clause: &'static str, n: u64) -> std::result::Result<u64, InvalidArgumentError> {
    if n == 0 {
        return Err(InvalidArgumentError::NonPositive { clause });
    }
    Ok(n)
}

#[derive(Debug, Clone, Default, PartialEq)]
enum GroupBy {
    #[default]
    None,
    Tags(Vec<String>),
    Time(TimeBucket),
}

/// Builder state for one SELECT query.
#[derive(Debug, Clone, Default, PartialEq)]
#[must_use]
pub struct Query {
    select: Vec<String>,
    into: Option<String>,
    from: Vec<String>,
    criteria: Vec<Criterion>,
    limit: Option<u64>,
    offset: Option<u64>,
    slimit: Option<u64>,
    soffset: Option<u64>,
    group_by: GroupBy,
    order: Option<Order>,
    timezone: Option<Tz>,
}

impl Query {
    /// Creates an empty query, which selects `*`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query already reading from one measurement.
    pub(crate) fn scoped_to(measurement: &str) -> Self {
        Self {
            from: vec![measurement.to_string()],
            ..Self::default()
        }
    }

    /// Sets the selected expressions, rendered verbatim and comma-joined.
    ///
    /// No expressions selects `*`.
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: fmt::Display,
    {
        self.select = fields.into_iter().map(|f| f.to_string()).collect();
        self
    }

    /// Selects `*`.
    pub fn select_all(mut self) -> Self {
        self.select.clear();
        self
    }

    /// Sets the `INTO` target, rendered verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidArgumentError::EmptyName`] if the target is empty.
    pub fn into(mut self, target: impl Into<String>) -> Result<Self> {
        let target = target.into();
        if target.trim().is_empty() {
            return Err(InvalidArgumentError::EmptyName { clause: "INTO" }.into());
        }
        self.into = Some(target);
        Ok(self)
    }

    /// Sets the measurements to read from. Each one is double-quoted.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidArgumentError`] if no measurement is given or a name is empty.
    pub fn from<I, S>(mut self, measurements: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let measurements: Vec<String> = measurements.into_iter().map(Into::into).collect();
        if measurements.is_empty() {
            return Err(InvalidArgumentError::EmptyArgument { clause: "FROM" }.into());
        }
        check_names("FROM", &measurements)?;
        self.from = measurements;
        Ok(self)
    }

    /// Sets the `WHERE` criteria. Criteria given together are joined with `AND`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidArgumentError`] if no criterion is given or one is malformed.
    pub fn filter<I, C>(mut self, criteria: I) -> Result<Self>
    where
        I: IntoIterator<Item = C>,
        C: Into<Criterion>,
    {
        let criteria: Vec<Criterion> = criteria.into_iter().map(Into::into).collect();
        if criteria.is_empty() {
            return Err(InvalidArgumentError::EmptyArgument { clause: "WHERE" }.into());
        }
        for criterion in &criteria {
            criterion.validate()?;
        }
        self.criteria = criteria;
        Ok(self)
    }

    /// Sets `LIMIT`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidArgumentError::NonPositive`] for zero.
    pub fn limit(mut self, n: u64) -> Result<Self> {
        self.limit = Some(positive("LIMIT", n)?);
        Ok(self)
    }

    /// Sets `OFFSET`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidArgumentError::NonPositive`] for zero.
    pub fn offset(mut self, n: u64) -> Result<Self> {
        self.offset = Some(positive("OFFSET", n)?);
        Ok(self)
    }

    /// Sets `SLIMIT`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidArgumentError::NonPositive`] for zero.
    pub fn slimit(mut self, n: u64) -> Result<Self> {
        self.slimit = Some(positive("SLIMIT", n)?);
        Ok(self)
    }

    /// Sets `SOFFSET`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidArgumentError::NonPositive`] for zero.
    pub fn soffset(mut self, n: u64) -> Result<Self> {
        self.soffset = Some(positive("SOFFSET", n)?);
        Ok(self)
    }

    /// Groups by tags, replacing any time bucket. No tags groups by `*`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidArgumentError::EmptyName`] if a tag name is empty.
    pub fn group_by<I, S>(mut self, tags: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tags: Vec<String> = tags.into_iter().map(Into::into).collect();
        check_names("GROUP BY", &tags)?;
        self.group_by = GroupBy::Tags(tags);
        Ok(self)
    }

    /// Groups by time bucket, replacing any tag grouping.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidArgumentError`] if the interval or offset is not a
    /// duration literal, a tag name is empty, or the fill value is not finite.
    pub fn group_by_time(mut self, bucket: TimeBucket) -> Result<Self> {
        bucket.validate()?;
        self.group_by = GroupBy::Time(bucket);
        Ok(self)
    }

    /// Sets the sort direction on time.
    pub fn order_by(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }

    /// Sets the result timezone.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidArgumentError::InvalidTimezone`] if the name is not
    /// in the IANA timezone database.
    pub fn timezone(mut self, name: &str) -> Result<Self> {
        let tz: Tz = name.parse().map_err(|_| InvalidArgumentError::InvalidTimezone {
            name: name.to_string(),
        })?;
        self.timezone = Some(tz);
        Ok(self)
    }

    /// Selects `COUNT(subject)`.
    pub fn count(self, subject: impl Into<FunctionArg>) -> Self {
        self.select([function::count(subject)])
    }

    /// Selects `DISTINCT(subject)`.
    pub fn distinct(self, subject: impl Into<FunctionArg>) -> Self {
        self.select([function::distinct(subject)])
    }

    /// Selects `INTEGRAL(subject)`.
    pub fn integral(self, subject: impl Into<FunctionArg>) -> Self {
        self.select([function::integral(subject)])
    }

    /// Selects `MEAN(subject)`.
    pub fn mean(self, subject: impl Into<FunctionArg>) -> Self {
        self.select([function::mean(subject)])
    }

    /// Selects `MEDIAN(subject)`.
    pub fn median(self, subject: impl Into<FunctionArg>) -> Self {
        self.select([function::median(subject)])
    }

    /// Selects `MODE(subject)`.
    pub fn mode(self, subject: impl Into<FunctionArg>) -> Self {
        self.select([function::mode(subject)])
    }

    /// Selects `SPREAD(subject)`.
    pub fn spread(self, subject: impl Into<FunctionArg>) -> Self {
        self.select([function::spread(subject)])
    }

    /// Selects `STDDEV(subject)`.
    pub fn stddev(self, subject: impl Into<FunctionArg>) -> Self {
        self.select([function::stddev(subject)])
    }

    /// Selects `SUM(subject)`.
    pub fn sum(self, subject: impl Into<FunctionArg>) -> Self {
        self.select([function::sum(subject)])
    }

    fn select_clause(&self) -> String {
        if self.select.is_empty() {
            "SELECT *".to_string()
        } else {
            format!("SELECT {}", self.select.join(","))
        }
    }

    fn into_clause(&self) -> String {
        self.into
            .as_ref()
            .map(|target| format!("INTO {target}"))
            .unwrap_or_default()
    }

    fn from_clause(&self) -> String {
        if self.from.is_empty() {
            return String::new();
        }
        let quoted: Vec<String> = self.from.iter().map(|m| format!("\"{m}\"")).collect();
        format!("FROM {}", quoted.join(", "))
    }

    fn where_clause(&self) -> String {
        if self.criteria.is_empty() {
            return String::new();
        }
        let rendered: Vec<String> = self.criteria.iter().map(Criterion::evaluate).collect();
        format!("WHERE {}", rendered.join(" AND "))
    }

    fn group_by_clause(&self) -> String {
        match &self.group_by {
            GroupBy::None => String::new(),
            GroupBy::Tags(tags) if tags.is_empty() => "GROUP BY *".to_string(),
            GroupBy::Tags(tags) => format!("GROUP BY {}", tags.join(",")),
            GroupBy::Time(bucket) => bucket.render(),
        }
    }

    fn order_clause(&self) -> String {
        self.order
            .map(|order| format!("ORDER BY time {}", order.keyword()))
            .unwrap_or_default()
    }

    fn timezone_clause(&self) -> String {
        self.timezone
            .map(|tz| format!("tz('{}')", tz.name()))
            .unwrap_or_default()
    }

    /// Renders the query text.
    ///
    /// Clauses appear in the order SELECT, INTO, FROM, WHERE, LIMIT,
    /// OFFSET, SLIMIT, SOFFSET, GROUP BY, ORDER BY, TIMEZONE. Empty clauses
    /// are dropped and whitespace runs are collapsed.
    pub fn compile(&self) -> String {
        let numbered = |keyword: &str, n: Option<u64>| {
            n.map(|n| format!("{keyword} {n}")).unwrap_or_default()
        };
        let clauses = [
            self.select_clause(),
            self.into_clause(),
            self.from_clause(),
            self.where_clause(),
            numbered("LIMIT", self.limit),
            numbered("OFFSET", self.offset),
            numbered("SLIMIT", self.slimit),
            numbered("SOFFSET", self.soffset),
            self.group_by_clause(),
            self.order_clause(),
            self.timezone_clause(),
        ];
        clauses
            .iter()
            .flat_map(|clause| clause.split_whitespace())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Sends the compiled query and returns the decoded reply unchecked.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails.
    pub fn execute<T: Transport>(&self, client: &Client<T>) -> Result<Value> {
        client.execute_query(&self.compile(), &QueryOptions::default())
    }

    /// Sends the query, checks the reply for errors, and converts it.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails, the reply reports an
    /// error, or the serializer rejects it.
    pub fn evaluate<T, S>(&self, client: &Client<T>, serializer: &S) -> Result<S::Output>
    where
        T: Transport,
        S: Serializer,
    {
        let response = Response::new(self.execute(client)?)?;
        response.raise_if_error()?;
        serializer.convert(&response)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.compile())
    }
}

/// Caller-written query text, sent as is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawQuery {
    text: String,
}

impl RawQuery {
    /// Wraps query text.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Returns the query text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Sends the query and returns the decoded reply unchecked.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidArgumentError::EmptyQuery`] for blank text, or an
    /// error if the transport fails.
    pub fn execute<T: Transport>(&self, client: &Client<T>) -> Result<Value> {
        client.execute_query(&self.text, &QueryOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::Field;

    #[test]
    fn test_select_star_from_default() {
        let q = Query::new().select_all().from(["default"]).unwrap();
        assert_eq!(q.compile(), r#"SELECT * FROM "default""#);
    }

    #[test]
    fn test_full_clause_order() {
        let q = Query::new()
            .select(["value"])
            .into("copy")
            .unwrap()
            .from(["cpu"])
            .unwrap()
            .filter([Field::new("value").gt(1)])
            .unwrap()
            .limit(10)
            .unwrap()
            .offset(2)
            .unwrap()
            .slimit(3)
            .unwrap()
            .soffset(4)
            .unwrap()
            .group_by_time(
                TimeBucket::new("1h")
                    .offset("15m")
                    .tags(["phase"])
                    .fill(Fill::Value(0.0)),
            )
            .unwrap()
            .order_by(Order::Desc)
            .timezone("Europe/Paris")
            .unwrap();
        assert_eq!(
            q.compile(),
            "SELECT value INTO copy FROM \"cpu\" WHERE \"value\" > 1 LIMIT 10 OFFSET 2 \
             SLIMIT 3 SOFFSET 4 GROUP BY time(1h,15m),phase fill(0) ORDER BY time DESC \
             tz('Europe/Paris')"
        );
    }

    #[test]
    fn test_multiple_measurements_are_quoted() {
        let q = Query::new().from(["cpu", "mem"]).unwrap();
        assert_eq!(q.compile(), r#"SELECT * FROM "cpu", "mem""#);
    }

    #[test]
    fn test_group_by_tags_or_star() {
        let q = Query::new().group_by(["host", "region"]).unwrap();
        assert_eq!(q.compile(), "SELECT * GROUP BY host,region");
        let q = Query::new().group_by(Vec::<String>::new()).unwrap();
        assert_eq!(q.compile(), "SELECT * GROUP BY *");
    }

    #[test]
    fn test_aggregate_sugar_replaces_select() {
        let q = Query::new().select(["a", "b"]).count("value");
        assert_eq!(q.compile(), "SELECT COUNT(value)");
        let q = q.stddev("*");
        assert_eq!(q.compile(), "SELECT STDDEV(*)");
    }

    #[test]
    fn test_setter_argument_errors() {
        assert!(matches!(
            Query::new().from(Vec::<String>::new()),
            Err(crate::InfluxableError::InvalidArgument(
                InvalidArgumentError::EmptyArgument { clause: "FROM" }
            ))
        ));
        assert!(Query::new().from([""]).is_err());
        assert!(Query::new().filter(Vec::<Criterion>::new()).is_err());
        assert!(Query::new().limit(0).is_err());
        assert!(Query::new().soffset(0).is_err());
        assert!(Query::new().into(" ").is_err());
        assert!(Query::new().timezone("Mars/Olympus").is_err());
        assert!(Query::new().group_by_time(TimeBucket::new("1x")).is_err());
        assert!(
            Query::new()
                .group_by_time(TimeBucket::new("1h").offset("m"))
                .is_err()
        );
    }

    #[test]
    fn test_duration_literals() {
        for ok in ["1h", "15m", "10s", "100ms", "5u", "5µ", "1ns", "1d", "2w", "1h30m"] {
            assert!(is_duration(ok), "{ok}");
        }
        for bad in ["", "h", "1", "1hh", "1.5h", "-1h", "1 h"] {
            assert!(!is_duration(bad), "{bad}");
        }
        let q = Query::new()
            .group_by_time(TimeBucket::new("1h").offset("-15m"))
            .unwrap();
        assert_eq!(q.compile(), "SELECT * GROUP BY time(1h,-15m)");
    }

    #[test]
    fn test_fill_keywords() {
        let rendered: Vec<String> = [Fill::Null, Fill::None, Fill::Previous, Fill::Linear, Fill::Value(-1.5)]
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(rendered, ["null", "none", "previous", "linear", "-1.5"]);
    }

    #[test]
    fn test_compile_collapses_whitespace() {
        let q = Query::new().select(["  value  ", "\tphase"]);
        assert_eq!(q.compile(), "SELECT value , phase");
    }

    #[test]
    fn test_display_matches_compile() {
        let q = Query::new().from(["cpu"]).unwrap().limit(1).unwrap();
        assert_eq!(q.to_string(), q.compile());
    }
}
