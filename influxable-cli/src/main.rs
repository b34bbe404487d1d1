//! CLI for influxable.
//!
//! Provides commands for checking a server, running raw queries, and
//! writing a synthetic temperature measurement.

use std::time::{SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand, ValueEnum};
use influxable::attribute::AttributeSpec;
use influxable::client::Client;
use influxable::config::ConnectionConfig;
use influxable::measurement::{Point, Schema};
use influxable::query::RawQuery;
use influxable::response::Response;
use influxable::serializer::{FormattedSeriesSerializer, Serializer};
use influxable::transport::HttpTransport;
use serde_json::{Value, json};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Typed InfluxDB 1.x access from the command line.
#[derive(Parser)]
#[command(name = "influxable", version, about)]
struct Cli {
    /// Server URL. Overrides `INFLUXDB_URL`.
    #[arg(long, global = true)]
    url: Option<String>,

    /// Database name. Overrides `INFLUXDB_DATABASE_NAME`.
    #[arg(long, global = true)]
    database: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Check that the server is reachable.
    Ping {
        /// Ask the server for a verbose reply.
        #[arg(long)]
        verbose: bool,
    },

    /// Run a raw InfluxQL query and print the rows of every series.
    Query {
        /// Query text, e.g. `SELECT * FROM "cpu" LIMIT 10`.
        text: String,

        /// Output format.
        #[arg(long, default_value = "json")]
        format: OutputFormat,
    },

    /// Write a synthetic temperature measurement in one batch.
    Populate {
        /// Lowest generated value.
        #[arg(long, default_value = "10")]
        min: f64,

        /// Highest generated value.
        #[arg(long, default_value = "30")]
        max: f64,

        /// Number of points to write.
        #[arg(long, default_value = "100")]
        count: u32,

        /// Seconds between consecutive points.
        #[arg(long, default_value = "30")]
        interval_secs: u64,

        /// Measurement name.
        #[arg(long, default_value = "populate_temperature")]
        measurement: String,
    },
}

/// Output format for query results.
#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// JSON array of series objects.
    Json,
    /// Comma-separated values, one block per series.
    Csv,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = ConnectionConfig::from_env();
    if let Some(url) = cli.url {
        config.base_url = url;
    }
    if let Some(database) = cli.database {
        config = config.with_database(database);
    }

    let result = run(cli.command, &config);

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(command: Commands, config: &ConnectionConfig) -> Result<(), Box<dyn std::error::Error>> {
    let client = Client::connect(config)?;
    match command {
        Commands::Ping { verbose } => cmd_ping(&client, verbose),
        Commands::Query { text, format } => cmd_query(&client, &text, &format),
        Commands::Populate {
            min,
            max,
            count,
            interval_secs,
            measurement,
        } => cmd_populate(&client, min, max, count, interval_secs, &measurement),
    }
}

/// Implements `influxable ping`.
fn cmd_ping(
    client: &Client<HttpTransport>,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let reply = client.ping(verbose)?;
    println!("{reply}");
    Ok(())
}

/// Implements `influxable query <text>`.
fn cmd_query(
    client: &Client<HttpTransport>,
    text: &str,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let response = Response::new(RawQuery::new(text).execute(client)?)?;
    response.raise_if_error()?;

    match format {
        OutputFormat::Json => {
            let series = FormattedSeriesSerializer.convert(&response)?;
            println!("{}", serde_json::to_string_pretty(&series)?);
        }
        OutputFormat::Csv => {
            for series in response.series() {
                println!("# series={}, rows={}", series.name(), series.rows().len());
                println!("{}", series.columns()?.join(","));
                for row in series.rows() {
                    let cells: Vec<String> = row
                        .as_array()
                        .map(|values| values.iter().map(csv_cell).collect())
                        .unwrap_or_default();
                    println!("{}", cells.join(","));
                }
            }
        }
    }

    Ok(())
}

fn csv_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) if s.contains([',', '"', '\n', '\r']) => {
            format!("\"{}\"", s.replace('"', "\"\""))
        }
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Implements `influxable populate`.
///
/// Values sweep the `[min, max]` range in a fixed pattern, alternating the
/// `phase` tag between `moon` and `sun`. The last point lands on the
/// current second.
fn cmd_populate(
    client: &Client<HttpTransport>,
    min: f64,
    max: f64,
    count: u32,
    interval_secs: u64,
    measurement: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if count == 0 {
        return Err("--count must be at least 1".into());
    }
    if min > max {
        return Err(format!("--min {min} is greater than --max {max}").into());
    }

    let schema = Schema::builder(measurement)
        .field("phase", AttributeSpec::tag().required())
        .field("value", AttributeSpec::float().max_decimals(2).required())
        .field("time", AttributeSpec::timestamp().precision("s"))
        .build()?;

    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    let span = max - min;
    let points = (0..count)
        .map(|i| {
            let step = f64::from(i.wrapping_mul(37) % 101) / 100.0;
            let offset = u64::from(count - 1 - i) * interval_secs;
            schema.point([
                ("phase", json!(if i % 2 == 0 { "moon" } else { "sun" })),
                ("value", json!(min + span * step)),
                ("time", json!(now.saturating_sub(offset))),
            ])
        })
        .collect::<influxable::Result<Vec<Point>>>()?;

    schema.bulk_save(client, &points)?;
    info!(measurement, points = points.len(), "populated measurement");
    println!("Wrote {} points to '{measurement}'", points.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_cell_quotes_separators_and_line_breaks() {
        assert_eq!(csv_cell(&json!("plain")), "plain");
        assert_eq!(csv_cell(&json!("a,b")), "\"a,b\"");
        assert_eq!(csv_cell(&json!("say \"hi\"")), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_cell(&json!("line\nbreak")), "\"line\nbreak\"");
        assert_eq!(csv_cell(&json!("carriage\rreturn")), "\"carriage\rreturn\"");
        assert_eq!(csv_cell(&Value::Null), "");
        assert_eq!(csv_cell(&json!(1.5)), "1.5");
    }
}
