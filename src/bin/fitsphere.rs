//! FitSphere CLI - Command-line interface for FitSphere sensing
//!
//! Commands:
//! - replay: Feed a recorded session through the pipeline
//! - simulate: Run a session on simulated sensors
//! - validate: Validate a sensor recording
//! - config: Print the effective configuration
//! - schema: Describe the recording format

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use fitsphere_sensing::schema::{RecordAdapter, SensorRecord, SCHEMA_VERSION};
use fitsphere_sensing::types::{Capabilities, DashboardUpdate};
use fitsphere_sensing::{SensingError, SensorSession, SessionConfig, FITSPHERE_VERSION, PRODUCER_NAME};

/// FitSphere - step, heading and position pipeline for the fitness dashboard
#[derive(Parser)]
#[command(name = "fitsphere")]
#[command(author = "FitSphere")]
#[command(version = FITSPHERE_VERSION)]
#[command(about = "Drive FitSphere sensing sessions from recordings or simulation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded session and print the dashboard updates
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Print only the final dashboard snapshot
        #[arg(long)]
        snapshot: bool,

        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Run a session with no sensors, on simulated sources
    Simulate {
        /// Session length in seconds
        #[arg(long, default_value = "60")]
        duration_secs: u64,

        /// Heartbeat interval in milliseconds
        #[arg(long, default_value = "250")]
        tick_ms: u64,

        /// Start time (epoch ms); defaults to now
        #[arg(long)]
        start_ms: Option<i64>,

        /// Sleep between ticks instead of running on a virtual clock
        #[arg(long)]
        realtime: bool,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Print only the final dashboard snapshot
        #[arg(long)]
        snapshot: bool,

        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Validate a sensor recording
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as JSON
    Config {
        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Print schema information
    Schema {
        /// Output as JSON schema
        #[arg(long)]
        json_schema: bool,
    },
}

/// Configuration file and per-field overrides
#[derive(Args)]
struct ConfigArgs {
    /// Session configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// RNG seed for the simulated sources
    #[arg(long)]
    seed: Option<u64>,

    /// Step threshold on the smoothed magnitude (m/s²)
    #[arg(long)]
    threshold: Option<f64>,

    /// Moving average window (samples)
    #[arg(long)]
    window: Option<usize>,

    /// Minimum spacing between steps (ms)
    #[arg(long)]
    debounce_ms: Option<i64>,

    /// Offset from UTC for minute labels
    #[arg(long, allow_hyphen_values = true)]
    utc_offset_minutes: Option<i32>,
}

impl ConfigArgs {
    fn load(&self) -> Result<SessionConfig, FitsphereCliError> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::from_json(&fs::read_to_string(path)?)?,
            None => SessionConfig::default(),
        };

        if let Some(seed) = self.seed {
            config.simulation.seed = Some(seed);
        }
        if let Some(threshold) = self.threshold {
            config.step.threshold = threshold;
        }
        if let Some(window) = self.window {
            config.step.window_size = window;
        }
        if let Some(debounce_ms) = self.debounce_ms {
            config.step.debounce_ms = debounce_ms;
        }
        if let Some(offset) = self.utc_offset_minutes {
            config.chart.utc_offset_minutes = offset;
        }

        config.validate()?;
        Ok(config)
    }
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array of records
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one update per line)
    Ndjson,
    /// JSON array of updates
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), FitsphereCliError> {
    match cli.command {
        Commands::Replay {
            input,
            output,
            input_format,
            output_format,
            snapshot,
            config,
        } => cmd_replay(&input, &output, input_format, output_format, snapshot, &config),

        Commands::Simulate {
            duration_secs,
            tick_ms,
            start_ms,
            realtime,
            output_format,
            snapshot,
            config,
        } => cmd_simulate(
            duration_secs,
            tick_ms,
            start_ms,
            realtime,
            output_format,
            snapshot,
            &config,
        ),

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Config { config } => {
            println!("{}", config.load()?.to_json()?);
            Ok(())
        }

        Commands::Schema { json_schema } => cmd_schema(json_schema),
    }
}

fn cmd_replay(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    snapshot: bool,
    config_args: &ConfigArgs,
) -> Result<(), FitsphereCliError> {
    let config = config_args.load()?;
    let records = read_records(input, input_format)?;

    if records.is_empty() {
        return Err(FitsphereCliError::NoRecords);
    }

    let problems = RecordAdapter::validate_records(&records);
    if !problems.is_empty() {
        return Err(FitsphereCliError::ValidationFailed(problems.len()));
    }

    let mut session = SensorSession::new(config, Vec::new())?;
    for record in &records {
        let event = RecordAdapter::to_event(record, session.pending_permission());
        session.handle(event)?;
    }
    tracing::info!(
        records = records.len(),
        total_steps = session.total_steps(),
        "replay finished"
    );

    let output_data = if snapshot {
        format_output(&[session.snapshot()], &output_format)?
    } else {
        format_output(session.sink(), &output_format)?
    };

    if output.to_string_lossy() == "-" {
        print!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }

    Ok(())
}

fn cmd_simulate(
    duration_secs: u64,
    tick_ms: u64,
    start_ms: Option<i64>,
    realtime: bool,
    output_format: OutputFormat,
    snapshot: bool,
    config_args: &ConfigArgs,
) -> Result<(), FitsphereCliError> {
    let tick = match i64::try_from(tick_ms) {
        Ok(tick) if tick > 0 => tick,
        _ => {
            return Err(FitsphereCliError::InvalidArgument(format!(
                "tick-ms must be between 1 and {}",
                i64::MAX
            )))
        }
    };

    let config = config_args.load()?;
    let start = start_ms.unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
    let end = simulation_end(start, duration_secs)?;
    let streaming = matches!(output_format, OutputFormat::Ndjson) && !snapshot;

    let mut session = SensorSession::new(config, Vec::new())?;
    session.start(Capabilities::default(), start)?;

    let mut stdout = io::stdout();
    let mut collected: Vec<DashboardUpdate> = Vec::new();
    let mut flush_updates =
        |session: &mut SensorSession<Vec<DashboardUpdate>>| -> Result<(), FitsphereCliError> {
            let updates = std::mem::take(session.sink_mut());
            if streaming {
                for update in &updates {
                    writeln!(stdout, "{}", serde_json::to_string(update)?)?;
                }
                stdout.flush()?;
            } else if !snapshot {
                collected.extend(updates);
            }
            Ok(())
        };

    flush_updates(&mut session)?;

    let mut now = start;
    while now < end {
        if realtime {
            std::thread::sleep(Duration::from_millis(tick_ms));
        }
        now = now.saturating_add(tick).min(end);
        session.tick(now);
        flush_updates(&mut session)?;
    }

    session.stop();
    flush_updates(&mut session)?;

    tracing::info!(
        session = %session.id(),
        total_steps = session.total_steps(),
        minutes = session.history().len(),
        "simulation finished"
    );

    if snapshot {
        print!("{}", format_output(&[session.snapshot()], &output_format)?);
    } else if !streaming {
        print!("{}", format_output(&collected, &output_format)?);
    }

    Ok(())
}

fn cmd_validate(
    input: &Path,
    input_format: InputFormat,
    json: bool,
) -> Result<(), FitsphereCliError> {
    let records = read_records(input, input_format)?;
    let problems = RecordAdapter::validate_records(&records);

    let mut invalid: Vec<usize> = problems.iter().map(|(index, _)| *index).collect();
    invalid.dedup();

    let report = ValidationReport {
        total_records: records.len(),
        valid_records: records.len() - invalid.len(),
        invalid_records: invalid.len(),
        errors: problems
            .iter()
            .map(|(index, e)| ValidationErrorDetail {
                index: *index,
                record_type: records[*index].type_name().to_string(),
                error: e.to_string(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total records:   {}", report.total_records);
        println!("Valid records:   {}", report.valid_records);
        println!("Invalid records: {}", report.invalid_records);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for error in &report.errors {
                println!("  [{}] {}: {}", error.index, error.record_type, error.error);
            }
        }
    }

    if report.invalid_records > 0 {
        Err(FitsphereCliError::ValidationFailed(report.invalid_records))
    } else {
        Ok(())
    }
}

fn cmd_schema(json_schema: bool) -> Result<(), FitsphereCliError> {
    if json_schema {
        println!("{}", get_input_json_schema());
        return Ok(());
    }

    println!("Input Schema: {}", SCHEMA_VERSION);
    println!();
    println!("One JSON object per line, tagged by \"type\". Every record carries");
    println!("\"t\", the callback time in epoch milliseconds.");
    println!();
    println!("  start          {{ capabilities: {{ motion, orientation, permission_required, geolocation }} }}");
    println!("  permission     {{ status: granted|denied|error, request?, message? }}");
    println!("  motion         {{ acceleration?: {{ x, y, z }} }}");
    println!("  orientation    {{ heading_degrees? }}");
    println!("  location       {{ latitude, longitude }}");
    println!("  location_error {{ code: permission_denied|position_unavailable|timeout }}");
    println!("  tick           {{}}");
    println!("  stop           {{}}");
    println!();
    println!("Recordings must begin with start and be ordered by t.");
    println!("Producer: {} {}", PRODUCER_NAME, FITSPHERE_VERSION);

    Ok(())
}

// Helper functions

fn simulation_end(start_ms: i64, duration_secs: u64) -> Result<i64, FitsphereCliError> {
    i64::try_from(duration_secs)
        .ok()
        .and_then(|secs| secs.checked_mul(1_000))
        .and_then(|duration_ms| start_ms.checked_add(duration_ms))
        .ok_or_else(|| {
            FitsphereCliError::InvalidArgument(format!(
                "duration-secs {} is out of range",
                duration_secs
            ))
        })
}

fn read_records(input: &Path, format: InputFormat) -> Result<Vec<SensorRecord>, FitsphereCliError> {
    let input_data = if input.to_string_lossy() == "-" {
        if atty::is(atty::Stream::Stdin) {
            return Err(FitsphereCliError::InteractiveStdin);
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    let records = match format {
        InputFormat::Ndjson => RecordAdapter::parse_ndjson(&input_data)?,
        InputFormat::Json => RecordAdapter::parse_array(&input_data)?,
    };
    Ok(records)
}

fn format_output<T: Serialize>(items: &[T], format: &OutputFormat) -> Result<String, FitsphereCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for item in items {
                lines.push(serde_json::to_string(item)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(items)? + "\n"),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(items)? + "\n"),
    }
}

fn get_input_json_schema() -> String {
    let t = serde_json::json!({ "type": "integer", "minimum": 0 });
    let record = |name: &str, required: serde_json::Value, properties: serde_json::Value| {
        let mut props = properties;
        props["type"] = serde_json::json!({ "const": name });
        props["t"] = t.clone();
        serde_json::json!({
            "type": "object",
            "required": required,
            "properties": props
        })
    };

    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": SCHEMA_VERSION,
        "description": "FitSphere sensor recording record",
        "oneOf": [
            record("start", serde_json::json!(["type", "t"]), serde_json::json!({
                "schema": { "const": SCHEMA_VERSION },
                "capabilities": {
                    "type": "object",
                    "properties": {
                        "motion": { "type": "boolean" },
                        "orientation": { "type": "boolean" },
                        "permission_required": { "type": "boolean" },
                        "geolocation": { "type": "boolean" }
                    }
                }
            })),
            record("permission", serde_json::json!(["type", "t", "status"]), serde_json::json!({
                "status": { "enum": ["granted", "denied", "error"] },
                "request": { "type": "integer" },
                "message": { "type": "string" }
            })),
            record("motion", serde_json::json!(["type", "t"]), serde_json::json!({
                "acceleration": {
                    "type": ["object", "null"],
                    "required": ["x", "y", "z"],
                    "properties": {
                        "x": { "type": "number" },
                        "y": { "type": "number" },
                        "z": { "type": "number" }
                    }
                }
            })),
            record("orientation", serde_json::json!(["type", "t"]), serde_json::json!({
                "heading_degrees": { "type": ["number", "null"] }
            })),
            record("location", serde_json::json!(["type", "t", "latitude", "longitude"]), serde_json::json!({
                "latitude": { "type": "number", "minimum": -90, "maximum": 90 },
                "longitude": { "type": "number", "minimum": -180, "maximum": 180 }
            })),
            record("location_error", serde_json::json!(["type", "t", "code"]), serde_json::json!({
                "code": { "enum": ["permission_denied", "position_unavailable", "timeout"] }
            })),
            record("tick", serde_json::json!(["type", "t"]), serde_json::json!({})),
            record("stop", serde_json::json!(["type", "t"]), serde_json::json!({}))
        ]
    })
    .to_string()
}

// Error types

#[derive(Debug)]
enum FitsphereCliError {
    Io(io::Error),
    Sensing(SensingError),
    Json(serde_json::Error),
    NoRecords,
    ValidationFailed(usize),
    InteractiveStdin,
    InvalidArgument(String),
}

impl From<io::Error> for FitsphereCliError {
    fn from(e: io::Error) -> Self {
        FitsphereCliError::Io(e)
    }
}

impl From<SensingError> for FitsphereCliError {
    fn from(e: SensingError) -> Self {
        FitsphereCliError::Sensing(e)
    }
}

impl From<serde_json::Error> for FitsphereCliError {
    fn from(e: serde_json::Error) -> Self {
        FitsphereCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<FitsphereCliError> for CliError {
    fn from(e: FitsphereCliError) -> Self {
        match e {
            FitsphereCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            FitsphereCliError::Sensing(SensingError::InvalidConfig(msg)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: msg,
                hint: Some("Run 'fitsphere config' to see the defaults".to_string()),
            },
            FitsphereCliError::Sensing(e) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some(format!("Ensure input matches {} schema", SCHEMA_VERSION)),
            },
            FitsphereCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            FitsphereCliError::NoRecords => CliError {
                code: "NO_RECORDS".to_string(),
                message: "No records found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            FitsphereCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} records failed validation", count),
                hint: Some("Run 'fitsphere validate' for details".to_string()),
            },
            FitsphereCliError::InteractiveStdin => CliError {
                code: "NO_INPUT".to_string(),
                message: "stdin is a terminal".to_string(),
                hint: Some("Pipe a recording in or pass --input <file>".to_string()),
            },
            FitsphereCliError::InvalidArgument(msg) => CliError {
                code: "INVALID_ARGUMENT".to_string(),
                message: msg,
                hint: None,
            },
        }
    }
}

// Report types

#[derive(Serialize)]
struct ValidationReport {
    total_records: usize,
    valid_records: usize,
    invalid_records: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(Serialize)]
struct ValidationErrorDetail {
    index: usize,
    record_type: String,
    error: String,
}
