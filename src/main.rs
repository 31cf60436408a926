mod client;
mod config;
mod element;
mod mirror;

use crate::client::{Session, SessionConfig};
use crate::mirror::{Destination, DestinationError, ReportFormat, validate_part};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use dialoguer::Password;
use std::io::{self, BufRead, IsTerminal, Write};
use std::process::ExitCode;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// Exit code when the cluster cannot be reached or rejects the session.
const EXIT_CONNECT_FAILED: u8 = 2;

#[derive(Parser)]
#[command(
    name = "smupdate",
    version,
    about = "Show or update SnapMirror relationships on an ONTAP cluster"
)]
struct Cli {
    #[arg(short, long, value_enum, help = "Operation type")]
    operation: Operation,

    #[arg(short, long, help = "Cluster hostname")]
    cluster: String,

    #[arg(short, long, help = "Username")]
    user: String,

    #[arg(short, long, help = "Password (prompted for on stderr when omitted)")]
    password: Option<String>,

    #[arg(short, long, value_parser = svm_name, help = "Destination SVM name")]
    svm: String,

    #[arg(short, long, value_parser = volume_name, help = "Destination volume name")]
    vol: String,

    #[arg(short, long, help = "Enable debug mode")]
    debug: bool,

    #[arg(long, help = "Do not validate the cluster's TLS certificate")]
    insecure: bool,

    #[arg(
        short,
        long,
        value_enum,
        default_value_t = FormatArg::Csv,
        help = "Report format"
    )]
    format: FormatArg,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
enum Operation {
    Show,
    Update,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
enum FormatArg {
    Csv,
    Json,
}

impl From<FormatArg> for ReportFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Csv => ReportFormat::Csv,
            FormatArg::Json => ReportFormat::Json,
        }
    }
}

fn svm_name(value: &str) -> Result<String, DestinationError> {
    validate_part("SVM", value)?;
    Ok(value.to_string())
}

fn volume_name(value: &str) -> Result<String, DestinationError> {
    validate_part("volume", value)?;
    Ok(value.to_string())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let cwd = std::env::current_dir().context("reading current directory")?;
    let effective = config::resolve(&cwd, cli.insecure)?;
    let destination = Destination::new(&cli.svm, &cli.vol)?;

    let password = match cli.password {
        Some(password) => password,
        None => prompt_password()?,
    };

    if !effective.verify_tls {
        warn!("TLS certificate validation is disabled for {}", cli.cluster);
    }

    let session_config = SessionConfig {
        port: effective.port,
        transport: effective.transport,
        api_version: effective.api_version,
        verify_tls: effective.verify_tls,
        ..SessionConfig::new(&cli.cluster, &cli.user, &password)
    };

    let session = match Session::connect(&session_config) {
        Ok(session) => session,
        Err(err) => {
            debug!(reason = err.reason(), "connectivity check failed");
            eprintln!("{err}");
            return Ok(ExitCode::from(EXIT_CONNECT_FAILED));
        }
    };

    debug!(version = ?session.remote_version(), "session established");

    let format = ReportFormat::from(cli.format);
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match cli.operation {
        Operation::Show => {
            mirror::report(&session, &destination, format, &mut out)?;
        }
        Operation::Update => {
            // In JSON mode stdout carries only the report.
            let outcome = match format {
                ReportFormat::Csv => mirror::trigger(&session, &destination, &mut out)?,
                ReportFormat::Json => mirror::trigger(&session, &destination, &mut io::stderr())?,
            };
            debug!(?outcome, "update finished, reporting current state");
            mirror::report(&session, &destination, format, &mut out)?;
        }
    }

    out.flush().context("flushing stdout")?;
    Ok(ExitCode::SUCCESS)
}

/// Reads the password without echo, keeping the prompt off stdout.
fn prompt_password() -> Result<String> {
    if io::stdin().is_terminal() {
        return Password::new()
            .with_prompt("Enter password")
            .interact()
            .context("reading password");
    }

    eprint!("Enter password: ");
    io::stderr().flush().context("flushing stderr")?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("reading password from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("smupdate=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(io::stderr().is_terminal())
        .init();
}
