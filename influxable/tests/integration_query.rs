//! Integration tests for query compilation and execution.
//!
//! These tests cover the golden query texts, replace-not-accumulate
//! semantics for every clause setter, idempotent compilation, and the
//! execute/evaluate path over an in-memory transport.

use influxable::client::Client;
use influxable::criteria::Field;
use influxable::error::{InfluxableError, InvalidArgumentError, ResponseError};
use influxable::function;
use influxable::query::{Fill, Order, Query, RawQuery, TimeBucket};
use influxable::serializer::{FlatSingleValueSerializer, RawSerializer};
use influxable::transport::{MemoryTransport, Reply};
use serde_json::json;

#[test]
fn test_select_star_from_default() {
    let q = Query::new().select_all().from(["default"]).unwrap();
    assert_eq!(q.compile(), r#"SELECT * FROM "default""#);
}

#[test]
fn test_select_fields_with_conjoined_criteria() {
    let v = Field::new("v");
    let q = Query::new()
        .select(["f1", "f2"])
        .from(["m"])
        .unwrap()
        .filter([v.lt(400), v.gt(800)])
        .unwrap();
    assert_eq!(
        q.compile(),
        r#"SELECT f1,f2 FROM "m" WHERE "v" < 400 AND "v" > 800"#
    );
}

#[test]
fn test_compile_is_idempotent() {
    let q = Query::new()
        .select([function::max("value"), function::min("value")])
        .from(["cpu"])
        .unwrap()
        .filter([Field::new("host").eq("web1").or(Field::new("host").eq("web2"))])
        .unwrap()
        .group_by_time(TimeBucket::new("10m").fill(Fill::Linear))
        .unwrap()
        .timezone("America/Chicago")
        .unwrap();
    let first = q.compile();
    let second = q.compile();
    assert_eq!(first, second);
    assert_eq!(
        first,
        "SELECT MAX(value),MIN(value) FROM \"cpu\" WHERE (\"host\" = 'web1' OR \"host\" = 'web2') \
         GROUP BY time(10m) fill(linear) tz('America/Chicago')"
    );
}

#[test]
fn test_every_setter_replaces() {
    let q = Query::new()
        .select(["a"])
        .select(["b"])
        .into("x")
        .unwrap()
        .into("y")
        .unwrap()
        .from(["m1", "m2"])
        .unwrap()
        .from(["m3"])
        .unwrap()
        .filter([Field::new("a").eq(1), Field::new("b").eq(2)])
        .unwrap()
        .filter([Field::new("c").eq(3)])
        .unwrap()
        .limit(1)
        .unwrap()
        .limit(2)
        .unwrap()
        .offset(1)
        .unwrap()
        .offset(3)
        .unwrap()
        .slimit(1)
        .unwrap()
        .slimit(4)
        .unwrap()
        .soffset(1)
        .unwrap()
        .soffset(5)
        .unwrap()
        .group_by(["t1"])
        .unwrap()
        .group_by(["t2"])
        .unwrap()
        .order_by(Order::Asc)
        .order_by(Order::Desc)
        .timezone("UTC")
        .unwrap()
        .timezone("Asia/Tokyo")
        .unwrap();
    assert_eq!(
        q.compile(),
        "SELECT b INTO y FROM \"m3\" WHERE \"c\" = 3 LIMIT 2 OFFSET 3 SLIMIT 4 SOFFSET 5 \
         GROUP BY t2 ORDER BY time DESC tz('Asia/Tokyo')"
    );
}

#[test]
fn test_group_by_modes_are_exclusive() {
    let time_then_tags = Query::new()
        .group_by_time(TimeBucket::new("1h"))
        .unwrap()
        .group_by(["host"])
        .unwrap();
    assert_eq!(time_then_tags.compile(), "SELECT * GROUP BY host");

    let tags_then_time = Query::new()
        .group_by(["host"])
        .unwrap()
        .group_by_time(TimeBucket::new("1h").tags(["region"]))
        .unwrap();
    assert_eq!(tags_then_time.compile(), "SELECT * GROUP BY time(1h),region");
}

#[test]
fn test_failed_setter_reports_clause() {
    let err = Query::new().limit(0).unwrap_err();
    assert!(err.to_string().contains("LIMIT"));
    assert!(matches!(
        err,
        InfluxableError::InvalidArgument(InvalidArgumentError::NonPositive { clause: "LIMIT" })
    ));

    let err = Query::new()
        .group_by_time(TimeBucket::new("1h").offset("soon"))
        .unwrap_err();
    assert!(err.to_string().contains("soon"));
}

#[test]
fn test_execute_sends_compiled_text() {
    let client = Client::new(MemoryTransport::new(), "metrics");
    let q = Query::new().count("value").from(["cpu"]).unwrap();
    client.transport().push_json(&json!({"results": [{"series": [
        {"name": "cpu", "columns": ["time", "count"], "values": [[0, 42]]}
    ]}]}));

    let raw = q.execute(&client).unwrap();
    assert_eq!(raw["results"][0]["series"][0]["values"][0][1], 42);

    let sent = client.transport().requests();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].param_value("q"), Some(r#"SELECT COUNT(value) FROM "cpu""#));
    assert_eq!(sent[0].param_value("db"), Some("metrics"));
}

#[test]
fn test_evaluate_raises_reported_error() {
    let client = Client::new(MemoryTransport::new(), "metrics");
    client
        .transport()
        .push_reply(Reply::new(400, r#"{"error":"database not found: metrics"}"#));

    let q = Query::new().from(["cpu"]).unwrap();
    let err = q.evaluate(&client, &RawSerializer).unwrap_err();
    assert!(matches!(
        err,
        InfluxableError::Response(ResponseError::Server { ref message }) if message == "database not found: metrics"
    ));
}

#[test]
fn test_evaluate_with_single_value() {
    let client = Client::new(MemoryTransport::new(), "metrics");
    client.transport().push_json(&json!({"results": [{"series": [
        {"columns": ["sum"], "values": [[1234.5]]}
    ]}]}));
    let total = Query::new()
        .sum("value")
        .from(["cpu"])
        .unwrap()
        .evaluate(&client, &FlatSingleValueSerializer)
        .unwrap();
    assert_eq!(total, Some(json!(1234.5)));
}

#[test]
fn test_raw_query() {
    let client = Client::new(MemoryTransport::new(), "metrics");
    RawQuery::new("SHOW MEASUREMENTS").execute(&client).unwrap();
    assert_eq!(
        client.transport().requests()[0].param_value("q"),
        Some("SHOW MEASUREMENTS")
    );

    assert!(matches!(
        RawQuery::new("").execute(&client),
        Err(InfluxableError::InvalidArgument(InvalidArgumentError::EmptyQuery))
    ));
    assert_eq!(client.transport().request_count(), 1);
}
