//! Stepflux CLI - Command-line interface for the Stepflux engine
//!
//! Commands:
//! - replay: Process a recorded sample stream (batch mode)
//! - run: Process streaming samples from stdin (streaming mode)
//! - validate: Classify samples and report malformed records
//! - doctor: Diagnose configuration and totals files
//! - config: Print the default engine configuration

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use stepflux::classifier::classify;
use stepflux::{
    ComputeError, EngineConfig, JsonFileStore, NullSink, Processed, RawSample, SampleError,
    SessionReport, TotalsSink, TotalsStore, TrackingSession, PRODUCER_NAME, STEPFLUX_VERSION,
};

/// Stepflux - On-device step filtering and distance estimation
#[derive(Parser)]
#[command(name = "stepflux")]
#[command(version = STEPFLUX_VERSION)]
#[command(about = "Filter step pulses and estimate walking distance", long_about = None)]
struct Cli {
    /// Log output format (logs go to stderr; level via RUST_LOG)
    #[arg(long, global = true, default_value = "compact")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a recorded sample stream (batch mode)
    Replay {
        /// Input NDJSON file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Engine configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Seed totals from file
        #[arg(long)]
        load_totals: Option<PathBuf>,

        /// Save totals to file after processing
        #[arg(long)]
        save_totals: Option<PathBuf>,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,

        /// Emit one record per sample instead of the final report
        #[arg(long)]
        trace: bool,
    },

    /// Process streaming samples from stdin (streaming mode)
    Run {
        /// Engine configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Totals file used to seed the session and persist every update
        #[arg(long)]
        totals: Option<PathBuf>,

        /// Flush output after each record
        #[arg(long, default_value = "true")]
        flush: bool,
    },

    /// Classify samples and report malformed records
    Validate {
        /// Input NDJSON file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and totals files
    Doctor {
        /// Check configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Check totals file
        #[arg(long)]
        totals: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the default engine configuration as JSON
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    /// JSON structured logs
    Json,
    /// Human-readable multi-line logs
    Pretty,
    /// Single-line logs
    Compact,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array / object
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.log_format) {
        eprintln!("failed to initialize logging: {}", e);
    }

    match run(cli.command) {
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

fn init_logging(format: LogFormat) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_writer(io::stderr))
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty().with_writer(io::stderr))
            .try_init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact().with_writer(io::stderr))
            .try_init(),
    }
}

fn run(command: Commands) -> Result<(), StepfluxCliError> {
    match command {
        Commands::Replay {
            input,
            output,
            config,
            load_totals,
            save_totals,
            output_format,
            trace,
        } => cmd_replay(
            &input,
            &output,
            config.as_deref(),
            load_totals.as_deref(),
            save_totals.as_deref(),
            output_format,
            trace,
        ),

        Commands::Run {
            config,
            totals,
            flush,
        } => cmd_run(config.as_deref(), totals.as_deref(), flush),

        Commands::Validate { input, json } => cmd_validate(&input, json),

        Commands::Doctor {
            config,
            totals,
            json,
        } => cmd_doctor(config.as_deref(), totals.as_deref(), json),

        Commands::Config => {
            println!("{}", EngineConfig::default().to_json()?);
            Ok(())
        }
    }
}

fn cmd_replay(
    input: &Path,
    output: &Path,
    config: Option<&Path>,
    load_totals: Option<&Path>,
    save_totals: Option<&Path>,
    output_format: OutputFormat,
    trace: bool,
) -> Result<(), StepfluxCliError> {
    let config = load_config(config)?;
    let input_data = read_input(input)?;
    let samples = parse_samples(&input_data)?;

    if samples.is_empty() {
        return Err(StepfluxCliError::NoSamples);
    }

    // The replay only reads the seed; saving happens below when requested
    let seed = match load_totals {
        Some(path) => JsonFileStore::new(path).load()?,
        None => Default::default(),
    };
    let mut session = TrackingSession::new(config, NullSink, stepflux::MemoryStore::new(seed))?;
    session.start()?;

    let mut records: Vec<TraceRecord> = Vec::new();
    for (index, raw) in samples.iter().enumerate() {
        let result = session.ingest(raw);
        if trace {
            records.push(TraceRecord::new(index, raw, result));
        }
    }

    let report = session.stop()?;

    if let Some(path) = save_totals {
        JsonFileStore::new(path).save(&report.totals)?;
    }

    let output_data = if trace {
        format_records(&records, output_format)?
    } else {
        format_report(&report, output_format)?
    };

    write_output(output, &output_data)
}

fn cmd_run(
    config: Option<&Path>,
    totals: Option<&Path>,
    flush: bool,
) -> Result<(), StepfluxCliError> {
    let config = load_config(config)?;
    let stdout = io::stdout();

    let sink = NdjsonSink {
        out: stdout.lock(),
        flush,
    };

    match totals {
        Some(path) => stream_session(config, sink, JsonFileStore::new(path)),
        None => stream_session(config, sink, stepflux::MemoryStore::default()),
    }
}

fn stream_session<S: TotalsStore>(
    config: EngineConfig,
    sink: NdjsonSink<'_>,
    store: S,
) -> Result<(), StepfluxCliError> {
    let mut session = TrackingSession::new(config, sink, store)?;
    session.start()?;

    let stdin = io::stdin();
    for (line_num, line) in stdin.lock().lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }

        let raw: RawSample = match serde_json::from_str(trimmed) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(line = line_num + 1, error = %e, "skipping unparseable line");
                continue;
            }
        };

        // Sample errors are logged by the engine; the stream keeps going
        let _ = session.ingest(&raw);
    }

    let report = session.stop()?;
    eprintln!("{}", serde_json::to_string(&report)?);
    Ok(())
}

fn cmd_validate(input: &Path, json: bool) -> Result<(), StepfluxCliError> {
    let input_data = read_input(input)?;
    let samples = parse_samples(&input_data)?;

    let mut errors: Vec<ValidationErrorDetail> = Vec::new();
    let mut last_timestamp: Option<i64> = None;

    for (index, raw) in samples.iter().enumerate() {
        let result = classify(raw).and_then(|_| match last_timestamp {
            Some(last) if raw.timestamp_ms < last => Err(SampleError::OutOfOrderSample {
                timestamp_ms: raw.timestamp_ms,
                last_timestamp_ms: last,
            }),
            _ => Ok(()),
        });

        match result {
            Ok(()) => last_timestamp = Some(raw.timestamp_ms),
            Err(e) => errors.push(ValidationErrorDetail {
                index,
                kind: raw.kind.as_str().to_string(),
                code: e.code().to_string(),
                error: e.to_string(),
            }),
        }
    }

    let report = ValidationReport {
        total_samples: samples.len(),
        valid_samples: samples.len() - errors.len(),
        invalid_samples: errors.len(),
        errors,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total samples:   {}", report.total_samples);
        println!("Valid samples:   {}", report.valid_samples);
        println!("Invalid samples: {}", report.invalid_samples);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - Sample {} ({}): {}", err.index, err.kind, err.error);
            }
        }
    }

    if report.invalid_samples > 0 {
        Err(StepfluxCliError::ValidationFailed(report.invalid_samples))
    } else {
        Ok(())
    }
}

fn cmd_doctor(
    config: Option<&Path>,
    totals: Option<&Path>,
    json: bool,
) -> Result<(), StepfluxCliError> {
    let mut checks: Vec<DoctorCheck> = vec![DoctorCheck {
        name: "stepflux_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Stepflux version {}", STEPFLUX_VERSION),
    }];

    if let Some(path) = config {
        checks.push(match EngineConfig::from_path(path) {
            Ok(config) => DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "Configuration valid (source {:?}, step length {} m)",
                    config.step_source, config.step_length_meters
                ),
            },
            Err(e) => DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: format!("Invalid configuration: {}", e),
            },
        });
    }

    if let Some(path) = totals {
        checks.push(if !path.exists() {
            DoctorCheck {
                name: "totals".to_string(),
                status: CheckStatus::Warning,
                message: "Totals file does not exist (a session will start from zero)"
                    .to_string(),
            }
        } else {
            match JsonFileStore::new(path).load() {
                Ok(totals) => DoctorCheck {
                    name: "totals".to_string(),
                    status: CheckStatus::Ok,
                    message: format!(
                        "Totals file valid ({} steps, {:.2} m)",
                        totals.step_count, totals.distance_meters
                    ),
                },
                Err(e) => DoctorCheck {
                    name: "totals".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Cannot load totals: {}", e),
                },
            }
        });
    }

    // Check stdin is available (for streaming mode)
    checks.push(DoctorCheck {
        name: "stdin".to_string(),
        status: CheckStatus::Ok,
        message: if atty::is(atty::Stream::Stdin) {
            "stdin is a TTY (interactive mode)".to_string()
        } else {
            "stdin is a pipe (streaming mode ready)".to_string()
        },
    });

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: STEPFLUX_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Stepflux Doctor Report");
        println!("======================");
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

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(StepfluxCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

fn load_config(path: Option<&Path>) -> Result<EngineConfig, StepfluxCliError> {
    match path {
        Some(path) => Ok(EngineConfig::from_path(path)?),
        None => Ok(EngineConfig::default()),
    }
}

fn read_input(input: &Path) -> Result<String, StepfluxCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn write_output(output: &Path, data: &str) -> Result<(), StepfluxCliError> {
    if output.to_string_lossy() == "-" {
        print!("{}", data);
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

fn parse_samples(ndjson: &str) -> Result<Vec<RawSample>, StepfluxCliError> {
    let mut samples = Vec::new();
    for (line_num, line) in ndjson.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let sample = serde_json::from_str::<RawSample>(trimmed).map_err(|e| {
            StepfluxCliError::ParseError(format!("Failed to parse line {}: {}", line_num + 1, e))
        })?;
        samples.push(sample);
    }
    Ok(samples)
}

fn format_report(report: &SessionReport, format: OutputFormat) -> Result<String, StepfluxCliError> {
    Ok(match format {
        OutputFormat::Ndjson => serde_json::to_string(report)? + "\n",
        OutputFormat::Json => serde_json::to_string(report)?,
        OutputFormat::JsonPretty => serde_json::to_string_pretty(report)?,
    })
}

fn format_records(records: &[TraceRecord], format: OutputFormat) -> Result<String, StepfluxCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for record in records {
                lines.push(serde_json::to_string(record)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(records)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(records)?),
    }
}

/// Writes every totals change to stdout as one NDJSON line
struct NdjsonSink<'a> {
    out: io::StdoutLock<'a>,
    flush: bool,
}

impl TotalsSink for NdjsonSink<'_> {
    fn publish(&mut self, totals: &stepflux::Totals) {
        let written = serde_json::to_string(totals)
            .map_err(io::Error::from)
            .and_then(|line| writeln!(self.out, "{}", line));
        let flushed = if self.flush {
            written.and_then(|_| self.out.flush())
        } else {
            written
        };
        if let Err(e) = flushed {
            tracing::warn!(error = %e, "failed to write totals");
        }
    }
}

// Error types

#[derive(Debug)]
enum StepfluxCliError {
    Io(io::Error),
    Compute(ComputeError),
    Json(serde_json::Error),
    NoSamples,
    ValidationFailed(usize),
    DoctorFailed,
    ParseError(String),
}

impl From<io::Error> for StepfluxCliError {
    fn from(e: io::Error) -> Self {
        StepfluxCliError::Io(e)
    }
}

impl From<ComputeError> for StepfluxCliError {
    fn from(e: ComputeError) -> Self {
        StepfluxCliError::Compute(e)
    }
}

impl From<serde_json::Error> for StepfluxCliError {
    fn from(e: serde_json::Error) -> Self {
        StepfluxCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<StepfluxCliError> for CliError {
    fn from(e: StepfluxCliError) -> Self {
        match e {
            StepfluxCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            StepfluxCliError::Compute(ComputeError::InvalidConfig(msg)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: msg,
                hint: Some("Run 'stepflux config' to see a valid configuration".to_string()),
            },
            StepfluxCliError::Compute(e) => CliError {
                code: "COMPUTE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'stepflux doctor' for details".to_string()),
            },
            StepfluxCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            StepfluxCliError::NoSamples => CliError {
                code: "NO_SAMPLES".to_string(),
                message: "No samples found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            StepfluxCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} samples failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            StepfluxCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            StepfluxCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Each line must be a sample: {kind, timestamp_ms, values}".to_string()),
            },
        }
    }
}

// Report types

#[derive(Serialize)]
struct TraceRecord {
    index: usize,
    kind: String,
    timestamp_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    processed: Option<Processed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl TraceRecord {
    fn new(
        index: usize,
        raw: &RawSample,
        result: Result<Option<Processed>, ComputeError>,
    ) -> Self {
        let (processed, error) = match result {
            Ok(processed) => (processed, None),
            Err(e) => (None, Some(e.to_string())),
        };
        TraceRecord {
            index,
            kind: raw.kind.as_str().to_string(),
            timestamp_ms: raw.timestamp_ms,
            processed,
            error,
        }
    }
}

#[derive(Serialize)]
struct ValidationReport {
    total_samples: usize,
    valid_samples: usize,
    invalid_samples: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(Serialize)]
struct ValidationErrorDetail {
    index: usize,
    kind: String,
    code: String,
    error: String,
}

#[derive(Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
