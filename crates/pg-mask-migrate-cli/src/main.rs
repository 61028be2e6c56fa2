//! pg-mask-migrate CLI - masked PostgreSQL to PostgreSQL migration.

use clap::Parser;
use pg_mask_migrate::{Config, MigrateError, Orchestrator, RunReport};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "pg-mask-migrate")]
#[command(about = "Masked PostgreSQL to PostgreSQL migration")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Override the watermark state file
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Override the local execution history file
    #[arg(long)]
    history_file: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Print the run transcript to stdout after the summary
    #[arg(long)]
    print_transcript: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Role running the migration: guest, operator or dev
    #[arg(default_value = "dev")]
    role: String,

    /// Run option: 1 = full load, 2 = incremental, 3 = dry run
    #[arg(default_value = "3")]
    option: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<u8, MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(MigrateError::Config)?;

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);
    if let Some(path) = cli.state_file {
        config.migration.state_file = path;
    }
    if let Some(path) = cli.history_file {
        config.migration.history_file = path;
    }

    let orchestrator = Orchestrator::with_postgres(config)?;
    let report = orchestrator.execute(&cli.role, &cli.option).await;

    if cli.output_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }
    if cli.print_transcript {
        println!("\n{}", report.transcript);
    }
    if let Some(e) = &report.fatal {
        eprintln!("{}", e.format_detailed());
    }

    Ok(report.exit_code())
}

fn print_summary(report: &RunReport) {
    let operation = report.operation.map(|op| op.as_str()).unwrap_or("unknown");

    if !report.counts.is_empty() {
        println!("\nDry run ({}):", report.role);
        for count in &report.counts {
            match (&count.rows, &count.error) {
                (Some(rows), _) => println!("  {:<30} {:>12} rows", count.table, rows),
                (None, Some(err)) => println!("  {:<30} FAILED: {}", count.table, err),
                (None, None) => println!("  {:<30} -", count.table),
            }
        }
        return;
    }

    let Some(record) = &report.record else {
        println!("\nRun {} as {} did not start.", operation, report.role);
        return;
    };

    println!("\nExecution {}", record.execution_id);
    println!("  Role:      {}", record.role);
    println!("  Mode:      {}", record.mode);
    println!("  Outcome:   {:?}", record.outcome);
    if let Some(reason) = &record.security_error {
        println!("  Security:  {}", reason);
        return;
    }
    println!("  Rows:      {}", record.total_rows);
    println!("\n  {:<30} {:>10} {:>10}  Rules", "Table", "Read", "Written");
    for stats in &record.tables {
        println!(
            "  {:<30} {:>10} {:>10}  {}",
            stats.table,
            stats.rows_read,
            stats.rows_written,
            stats.rules_applied.join(",")
        );
        for err in &stats.errors {
            println!("    error: {}", err);
        }
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout carries the summary or JSON report
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().try_init().map_err(|e| e.to_string())
    } else {
        subscriber.try_init().map_err(|e| e.to_string())
    }
}
