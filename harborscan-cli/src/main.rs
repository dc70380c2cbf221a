#![deny(missing_docs)]
//! HarborScan command-line interface.
//!
//! Submits scans to a running harborscan-server and renders the
//! resulting reports.

use clap::{Args, Parser, Subcommand, ValueEnum};
use harborscan_core::{ScanReport, ScanStatus};
use serde::Deserialize;
use std::fmt::Write as _;
use std::path::PathBuf;

pub(crate) type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser)]
#[command(name = "harborscan", version, about = "HarborScan CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct ServerArgs {
    /// Base URL of the harborscan server.
    #[arg(long, env = "HARBORSCAN_SERVER", default_value = "http://127.0.0.1:8080")]
    server: String,
}

#[derive(Args, Clone)]
struct OutputArgs {
    /// Output format for report data.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
    /// Write the report to a file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(ValueEnum, Copy, Clone, Debug, Eq, PartialEq)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a repository URL, package install command, or shorthand.
    Scan {
        /// The input reference to scan.
        input: String,
        #[command(flatten)]
        server: ServerArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Fetch a previously stored report by id.
    Report {
        /// Report identifier.
        id: String,
        #[command(flatten)]
        server: ServerArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    message: String,
}

#[tokio::main]
async fn main() -> CliResult<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Scan {
            input,
            server,
            output,
        } => {
            let report = submit_scan(&server.server, &input).await?;
            emit(&report, &output)?;
            if report.status == ScanStatus::Risky {
                std::process::exit(1);
            }
        }
        Commands::Report { id, server, output } => {
            let report = fetch_report(&server.server, &id).await?;
            emit(&report, &output)?;
        }
    }
    Ok(())
}

async fn submit_scan(server: &str, input: &str) -> CliResult<ScanReport> {
    let response = reqwest::Client::new()
        .post(format!("{}/api/scans", server.trim_end_matches('/')))
        .json(&serde_json::json!({ "input": input }))
        .send()
        .await?;
    read_report(response).await
}

async fn fetch_report(server: &str, id: &str) -> CliResult<ScanReport> {
    let response = reqwest::Client::new()
        .get(format!("{}/api/scans/{}", server.trim_end_matches('/'), id))
        .send()
        .await?;
    read_report(response).await
}

async fn read_report(response: reqwest::Response) -> CliResult<ScanReport> {
    if response.status().is_success() {
        return Ok(response.json::<ScanReport>().await?);
    }
    let status = response.status();
    match response.json::<ApiError>().await {
        Ok(err) => Err(format!("{} ({})", err.message, err.code).into()),
        Err(_) => Err(format!("server returned {status}").into()),
    }
}

fn emit(report: &ScanReport, output: &OutputArgs) -> CliResult<()> {
    let rendered = match output.format {
        OutputFormat::Text => render_text(report),
        OutputFormat::Json => serde_json::to_string_pretty(report)?,
    };
    match &output.output {
        Some(path) => std::fs::write(path, rendered)?,
        None => println!("{rendered}"),
    }
    Ok(())
}

fn render_text(report: &ScanReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Report {}", report.id);
    let _ = writeln!(out, "Input:  {}", report.input);
    let _ = writeln!(
        out,
        "Score:  {} (grade {}, {})",
        report.score,
        report.grade.as_str(),
        report.status.as_str()
    );
    let _ = writeln!(
        out,
        "Counts: {} critical, {} high, {} medium, {} low",
        report.summary.critical, report.summary.high, report.summary.medium, report.summary.low
    );
    if report.findings.is_empty() {
        let _ = writeln!(out, "No findings.");
    } else {
        let _ = writeln!(out, "Findings:");
        for finding in &report.findings {
            let _ = writeln!(
                out,
                "  [{}] {} ({}:{})",
                finding.severity.as_str(),
                finding.title,
                finding.file,
                finding.line
            );
            let _ = writeln!(out, "      {}", finding.recommendation);
        }
    }
    let _ = writeln!(out, "Scanners:");
    for scanner in &report.metadata.scanners {
        let _ = writeln!(
            out,
            "  {} {} ({} findings)",
            scanner.name,
            scanner.status.as_str(),
            scanner.finding_count
        );
    }
    out
}
