//! Daily Metrics CLI
//!
//! Commands:
//! - summary: Summarise an exported platform snapshot for one day
//! - validate: Validate a platform snapshot
//! - doctor: Diagnose snapshot and configuration files

use clap::{Parser, Subcommand, ValueEnum};
use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::{DateTime, FixedOffset, Local};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use daily_metrics::{
    summarize_snapshot, AggregatorConfig, ConfigError, FetchError, MetricType, PlatformSnapshot,
    SummaryReport, PRODUCER_NAME, VERSION,
};

/// Daily Metrics - daily health summaries from platform health data
#[derive(Parser)]
#[command(name = "daily-metrics")]
#[command(version = VERSION)]
#[command(about = "Summarise step, heart rate, calorie, and sleep data for a day", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarise a platform snapshot for the day containing --now
    Summary {
        /// Snapshot file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Aggregator configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Instant to summarise up to (RFC 3339, defaults to the local clock)
        #[arg(long)]
        now: Option<String>,

        /// Output format (defaults to text on a terminal, JSON otherwise)
        #[arg(long)]
        format: Option<OutputFormat>,
    },

    /// Validate a platform snapshot
    Validate {
        /// Snapshot file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose snapshot and configuration files
    Doctor {
        /// Snapshot file to check
        #[arg(long)]
        input: Option<PathBuf>,

        /// Configuration file to check
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable lines
    Text,
    /// Compact JSON
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), MetricsCliError> {
    match cli.command {
        Commands::Summary {
            input,
            config,
            now,
            format,
        } => cmd_summary(&input, config.as_deref(), now.as_deref(), format),

        Commands::Validate { input, json } => cmd_validate(&input, json),

        Commands::Doctor {
            input,
            config,
            json,
        } => cmd_doctor(input.as_deref(), config.as_deref(), json),
    }
}

fn read_input(input: &Path) -> Result<String, MetricsCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn load_config(path: Option<&Path>) -> Result<AggregatorConfig, MetricsCliError> {
    match path {
        Some(path) => Ok(AggregatorConfig::from_json(&fs::read_to_string(path)?)?),
        None => Ok(AggregatorConfig::default()),
    }
}

fn cmd_summary(
    input: &Path,
    config: Option<&Path>,
    now: Option<&str>,
    format: Option<OutputFormat>,
) -> Result<(), MetricsCliError> {
    let snapshot = PlatformSnapshot::from_json(&read_input(input)?)?;
    let config = load_config(config)?;
    let now: DateTime<FixedOffset> = match now {
        Some(s) => DateTime::parse_from_rfc3339(s)
            .map_err(|e| MetricsCliError::InvalidInstant(e.to_string()))?,
        None => Local::now().fixed_offset(),
    };
    debug!(%now, metrics = config.tracked_metrics.len(), "summarising snapshot");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    let report = runtime.block_on(summarize_snapshot(snapshot, config, now))?;

    let format = format.unwrap_or(if atty::is(atty::Stream::Stdout) {
        OutputFormat::Text
    } else {
        OutputFormat::Json
    });

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(&report)?),
        OutputFormat::JsonPretty => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_report(&report),
    }

    if report == SummaryReport::PermissionRequired {
        return Err(MetricsCliError::PermissionRequired);
    }
    Ok(())
}

fn print_report(report: &SummaryReport) {
    match report {
        SummaryReport::PermissionRequired => {
            println!("No health permissions granted.");
            println!("Open the health provider app and allow access, then retry.");
        }
        SummaryReport::Summary {
            date,
            summary,
            missing_permissions,
            ..
        } => {
            println!("Daily Summary {}", date);
            println!("========================");
            for metric in MetricType::ALL {
                let value = match summary.get(metric) {
                    Some(v) if metric == MetricType::Sleep => format!("{:.1} {}", v, metric.unit()),
                    Some(v) => format!("{} {}", v, metric.unit()),
                    None if missing_permissions.contains(&metric) => "not permitted".to_string(),
                    None => "No Data".to_string(),
                };
                println!("  {:<22} {}", metric.record_name(), value);
            }
        }
    }
}

fn cmd_validate(input: &Path, json: bool) -> Result<(), MetricsCliError> {
    let snapshot = PlatformSnapshot::from_json(&read_input(input)?)?;
    let issues = snapshot.validate();

    let report = ValidationReport {
        total_records: snapshot.records.values().map(Vec::len).sum(),
        grants: snapshot.grants.len(),
        invalid_records: issues
            .iter()
            .map(|i| (i.metric, i.index))
            .collect::<BTreeSet<_>>()
            .len(),
        issues: issues
            .iter()
            .map(|i| ValidationIssue {
                metric: i.metric.record_name().to_string(),
                index: i.index,
                error: i.message.clone(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Grants:          {}", report.grants);
        println!("Total records:   {}", report.total_records);
        println!("Invalid records: {}", report.invalid_records);

        if !report.issues.is_empty() {
            println!("\nErrors:");
            for issue in &report.issues {
                println!("  - {} record {}: {}", issue.metric, issue.index, issue.error);
            }
        }
    }

    if report.invalid_records > 0 {
        Err(MetricsCliError::ValidationFailed(report.invalid_records))
    } else {
        Ok(())
    }
}

fn cmd_doctor(input: Option<&Path>, config: Option<&Path>, json: bool) -> Result<(), MetricsCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("{} version {}", PRODUCER_NAME, VERSION),
    });

    if let Some(path) = input {
        checks.push(match fs::read_to_string(path) {
            Ok(content) => match PlatformSnapshot::from_json(&content) {
                Ok(snapshot) if snapshot.grants.is_empty() => DoctorCheck {
                    name: "snapshot".to_string(),
                    status: CheckStatus::Warning,
                    message: "Snapshot has no grants; summaries will require permission".to_string(),
                },
                Ok(snapshot) => DoctorCheck {
                    name: "snapshot".to_string(),
                    status: CheckStatus::Ok,
                    message: format!(
                        "Snapshot valid ({} grants, {} issues)",
                        snapshot.grants.len(),
                        snapshot.validate().len()
                    ),
                },
                Err(e) => DoctorCheck {
                    name: "snapshot".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Invalid snapshot JSON: {}", e),
                },
            },
            Err(e) => DoctorCheck {
                name: "snapshot".to_string(),
                status: CheckStatus::Error,
                message: format!("Cannot read snapshot file: {}", e),
            },
        });
    }

    if let Some(path) = config {
        checks.push(match load_config(Some(path)) {
            Ok(config) => DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!("Config valid ({} tracked metrics)", config.tracked_metrics.len()),
            },
            Err(e) => DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: CliError::from(e).message,
            },
        });
    }

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Daily Metrics Doctor Report");
        println!("===========================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(MetricsCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Error types

#[derive(Debug)]
enum MetricsCliError {
    Io(io::Error),
    Json(serde_json::Error),
    Config(ConfigError),
    Fetch(FetchError),
    InvalidInstant(String),
    PermissionRequired,
    ValidationFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for MetricsCliError {
    fn from(e: io::Error) -> Self {
        MetricsCliError::Io(e)
    }
}

impl From<serde_json::Error> for MetricsCliError {
    fn from(e: serde_json::Error) -> Self {
        MetricsCliError::Json(e)
    }
}

impl From<ConfigError> for MetricsCliError {
    fn from(e: ConfigError) -> Self {
        MetricsCliError::Config(e)
    }
}

impl From<FetchError> for MetricsCliError {
    fn from(e: FetchError) -> Self {
        MetricsCliError::Fetch(e)
    }
}

#[derive(Debug, serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<MetricsCliError> for CliError {
    fn from(e: MetricsCliError) -> Self {
        match e {
            MetricsCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            MetricsCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            MetricsCliError::Config(e) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'daily-metrics doctor --config' for details".to_string()),
            },
            MetricsCliError::Fetch(e) => CliError {
                code: "FETCH_FAILED".to_string(),
                message: e.to_string(),
                hint: Some("Retry the summary".to_string()),
            },
            MetricsCliError::InvalidInstant(msg) => CliError {
                code: "INVALID_INSTANT".to_string(),
                message: msg,
                hint: Some("Use RFC 3339, e.g. 2024-03-10T18:00:00+01:00".to_string()),
            },
            MetricsCliError::PermissionRequired => CliError {
                code: "PERMISSION_REQUIRED".to_string(),
                message: "No health permissions granted".to_string(),
                hint: Some("Grant read access in the health provider app".to_string()),
            },
            MetricsCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} records failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            MetricsCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    grants: usize,
    total_records: usize,
    invalid_records: usize,
    issues: Vec<ValidationIssue>,
}

#[derive(serde::Serialize)]
struct ValidationIssue {
    metric: String,
    index: usize,
    error: String,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
