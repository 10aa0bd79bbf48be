use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use paypulse::config::EngineConfig;
use paypulse::event::{RawEvent, Stream};
use paypulse::pipeline;
use paypulse::source::sqlite::SqliteSource;
use paypulse::stats::baseline::Alignment;

#[derive(Parser)]
#[command(
    name = "paypulse",
    about = "Statistical health monitoring for payment-processing pipelines",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (read-only metrics API over the event store)
    Serve {
        /// Bind address
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,

        /// Path to the event store
        #[arg(long, default_value = "data/paypulse.db")]
        db: String,
    },

    /// Load flat event records (JSON lines) into the event store
    Ingest {
        #[arg(long, default_value = "data/paypulse.db")]
        db: String,

        /// Target stream: transaction or bio-auth
        #[arg(long, default_value = "transaction")]
        stream: String,

        /// Path to a JSON-lines file of raw events
        #[arg(long)]
        file: String,
    },

    /// Evaluate one stream for a date: bucketed metrics, baselines, flags
    Evaluate {
        #[arg(long, default_value = "data/paypulse.db")]
        db: String,

        /// Evaluation date (YYYY-MM-DD)
        #[arg(long)]
        date: String,

        #[arg(long, default_value = "transaction")]
        stream: String,

        /// Sensitivity multiplier k for the anomaly band
        #[arg(long)]
        k: Option<f64>,

        /// Baseline alignment: trailing, weekday, or day-of-month
        #[arg(long)]
        alignment: Option<String>,

        /// Trailing window length in days
        #[arg(long)]
        window_days: Option<u32>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Composite health score for a date
    Score {
        #[arg(long, default_value = "data/paypulse.db")]
        db: String,

        /// Evaluation date (YYYY-MM-DD)
        #[arg(long)]
        date: String,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// State-level gainers and decliners for a date
    Movers {
        #[arg(long, default_value = "data/paypulse.db")]
        db: String,

        /// Evaluation date (YYYY-MM-DD)
        #[arg(long)]
        date: String,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },
}

fn parse_stream(raw: &str) -> Result<Stream> {
    match raw {
        "transaction" | "tx" => Ok(Stream::Transaction),
        "bio-auth" | "bio_auth" | "auth" => Ok(Stream::BioAuth),
        other => anyhow::bail!("unknown stream: {other} (expected transaction or bio-auth)"),
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").with_context(|| format!("invalid date: {raw}"))
}

fn parse_alignment(alignment: Option<&str>, window_days: Option<u32>) -> Result<Option<Alignment>> {
    let Some(raw) = alignment else {
        return Ok(window_days.map(Alignment::TrailingDays));
    };
    match raw {
        "trailing" => Ok(Some(Alignment::TrailingDays(window_days.unwrap_or(7)))),
        "weekday" => Ok(Some(Alignment::SameWeekday)),
        "day-of-month" => Ok(Some(Alignment::SameDayOfMonth)),
        other => anyhow::bail!("unknown alignment: {other} (expected trailing, weekday, or day-of-month)"),
    }
}

fn fmt_value(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.2}")).unwrap_or_else(|| "-".to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind, db } => {
            tracing::info!(%bind, "Starting PayPulse daemon");
            paypulse::serve(&bind, &db).await?;
        }
        Commands::Ingest { db, stream, file } => {
            let stream = parse_stream(&stream)?;
            let source = SqliteSource::open(&db)?;

            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {file}"))?;
            let mut events: Vec<RawEvent> = Vec::new();
            for (idx, line) in content.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let event: RawEvent = serde_json::from_str(line)
                    .with_context(|| format!("{}:{} is not a raw event", file, idx + 1))?;
                events.push(event);
            }

            let count = source.ingest(stream, &events)?;
            println!("Ingested {count} {stream} events from {file}.");
        }
        Commands::Evaluate {
            db,
            date,
            stream,
            k,
            alignment,
            window_days,
            json,
        } => {
            let stream = parse_stream(&stream)?;
            let date = parse_date(&date)?;
            let config = EngineConfig::load_or_default();
            let mut params = config.evaluation.params(date);
            if let Some(k) = k {
                params.sensitivity = k;
            }
            if let Some(alignment) = parse_alignment(alignment.as_deref(), window_days)? {
                params.alignment = alignment;
            }

            let source = SqliteSource::open(&db)?;
            let report = pipeline::evaluate_stream(&source, stream, &params).await?;
            source.record_anomalies(&report.anomalies)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("\n{stream} metrics for {date} (k = {})", params.sensitivity);
                println!(
                    "{:<7} | {:>7} | {:>8} | {:>8} | {:>8} | {:>12} | Flag",
                    "Slot", "Total", "Success", "Rate %", "Median", "Amount"
                );
                println!(
                    "{:-<7}-|-{:-<7}-|-{:-<8}-|-{:-<8}-|-{:-<8}-|-{:-<12}-|-{:-<14}",
                    "", "", "", "", "", "", ""
                );
                for row in &report.rows {
                    println!(
                        "{:<7} | {:>7} | {:>8} | {:>8} | {:>8} | {:>12.2} | {}",
                        row.slot.to_string(),
                        row.total,
                        row.success,
                        fmt_value(row.success_rate),
                        fmt_value(row.rate_median),
                        row.success_amount,
                        row.rate_flag
                    );
                }

                if report.anomalies.is_empty() {
                    println!("\nNo anomalies flagged.");
                } else {
                    println!("\nAnomalies:");
                    for anomaly in &report.anomalies {
                        println!(
                            " - {} {} at {}: {} (median {:.2}, sigma {:.2})",
                            anomaly.field,
                            anomaly.flag,
                            anomaly.slot,
                            fmt_value(anomaly.value),
                            anomaly.median,
                            anomaly.std_dev
                        );
                    }
                }
            }
        }
        Commands::Score { db, date, json } => {
            let date = parse_date(&date)?;
            let config = EngineConfig::load_or_default();
            let params = config.evaluation.params(date);

            let source = SqliteSource::open(&db)?;
            let report = pipeline::evaluate_score(&source, &params, &config.health).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("\nHealth score for {date}");
                for input in &report.inputs {
                    println!(
                        "{:<22} | weight {:.2} | {}",
                        input.name,
                        input.weight,
                        fmt_value(input.value)
                    );
                }
                match (report.score, report.tier) {
                    (Some(score), Some(tier)) => {
                        let note = if report.partial {
                            " -- partial, weights renormalized"
                        } else {
                            ""
                        };
                        println!("\nComposite: {score:.1} ({tier}){note}");
                    }
                    _ => println!("\nComposite: no data"),
                }
            }
        }
        Commands::Movers { db, date, json } => {
            let date = parse_date(&date)?;
            let config = EngineConfig::load_or_default();

            let source = SqliteSource::open(&db)?;
            let report = pipeline::evaluate_movers(
                &source,
                date,
                config.ranking.alignment,
                &config.ranking.cutoffs,
            )
            .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("\nTop movers by {} for {date}", report.dimension);
                println!("\nGainers:");
                if report.movers.gainers.is_empty() {
                    println!("  none");
                }
                for mover in &report.movers.gainers {
                    println!(
                        "  {:<20} | current {:>10.2} | median {:>10.2} | {:>5.1}% vs median",
                        mover.instance,
                        mover.current,
                        mover.median,
                        mover.ratio * 100.0
                    );
                }
                println!("\nDecliners:");
                if report.movers.decliners.is_empty() {
                    println!("  none");
                }
                for mover in &report.movers.decliners {
                    println!(
                        "  {:<20} | current {:>10.2} | median {:>10.2} | {:>5.1}% vs median",
                        mover.instance,
                        mover.current,
                        mover.median,
                        mover.ratio * 100.0
                    );
                }
            }
        }
    }

    Ok(())
}
