//! Job command handlers
//!
//! Submission, status, cancellation and waiting on executions.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Args;
use colored::*;
use jobrelay_client::{JobStatusResponse, JobSubmission, Method, OrchestratorClient};
use jobrelay_core::domain::execution::ExecutionStatus;
use uuid::Uuid;

use crate::config::{Config, DEFAULT_POLL_INTERVAL};

/// Arguments of `jobrelay submit`
#[derive(Args)]
pub struct SubmitArgs {
    /// Job name as registered in the orchestrator's mappings
    job: String,

    /// Idempotency key; resubmitting with the same key returns the same execution
    #[arg(short, long)]
    key: String,

    /// HTTP method forwarded to the downstream service
    #[arg(short = 'X', long, default_value = "POST", value_parser = parse_method)]
    method: Method,

    /// Request body, or @path to read it from a file
    #[arg(short, long)]
    data: Option<String>,

    /// Query parameter as key=value (repeatable)
    #[arg(short, long = "query", value_parser = parse_query)]
    query: Vec<(String, String)>,

    /// Header as name:value (repeatable)
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    header: Vec<(String, String)>,

    /// Wait for the execution to finish and print its result
    #[arg(short, long)]
    wait: bool,

    /// Seconds to wait when --wait is given
    #[arg(long, default_value_t = 60)]
    timeout: u64,
}

/// Submit a job and optionally wait for it
pub async fn submit(args: SubmitArgs, config: &Config) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);

    let body = match args.data {
        Some(data) => Some(read_body(&data)?),
        None => None,
    };

    let submitted = client
        .create_job(JobSubmission {
            job_name: args.job.clone(),
            idempotency_key: args.key,
            method: args.method,
            headers: args.header,
            query: args.query,
            body,
        })
        .await?;

    if submitted.replayed {
        println!(
            "{} Existing execution {} returned for this key",
            "↺".yellow(),
            submitted.uuid.to_string().cyan()
        );
    } else {
        println!(
            "{} Submitted {} as execution {}",
            "✓".green(),
            args.job.bold(),
            submitted.uuid.to_string().cyan()
        );
    }

    if args.wait {
        let execution = wait_until_done(&client, submitted.uuid, args.timeout).await?;
        println!();
        print_execution(&execution);
    }

    Ok(())
}

/// Show the status of an execution
pub async fn status(id: &str, config: &Config) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);
    let execution = client.get_job(parse_id(id)?).await?;

    print_execution(&execution);

    Ok(())
}

/// Cancel an execution
pub async fn cancel(id: &str, config: &Config) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);
    let response = client.cancel_job(parse_id(id)?).await?;

    println!(
        "{} {} ({})",
        "✓".green(),
        response.message,
        response.uuid.to_string().dimmed()
    );

    Ok(())
}

/// Block until an execution finishes
pub async fn wait(id: &str, timeout: u64, config: &Config) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);
    let execution = wait_until_done(&client, parse_id(id)?, timeout).await?;

    print_execution(&execution);

    Ok(())
}

async fn wait_until_done(
    client: &OrchestratorClient,
    id: Uuid,
    timeout: u64,
) -> Result<JobStatusResponse> {
    println!("{}", format!("Waiting for execution {}...", id).dimmed());

    let execution = client
        .wait_for_completion(id, DEFAULT_POLL_INTERVAL, Duration::from_secs(timeout))
        .await?;

    Ok(execution)
}

fn parse_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("'{}' is not a valid execution UUID", raw))
}

fn read_body(data: &str) -> Result<String> {
    match data.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read request body from {}", path)),
        None => Ok(data.to_string()),
    }
}

fn parse_method(raw: &str) -> Result<Method> {
    Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("'{}' is not an HTTP method", raw))
}

fn parse_query(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => bail!("expected key=value, got '{}'", raw),
    }
}

fn parse_header(raw: &str) -> Result<(String, String)> {
    match raw.split_once(':') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => bail!("expected name:value, got '{}'", raw),
    }
}

/// Print detailed execution information
fn print_execution(execution: &JobStatusResponse) {
    println!("{}", "Execution Details:".bold());
    println!("  ID:          {}", execution.uuid.to_string().cyan());
    println!("  Status:      {}", colorize_status(execution.status));
    println!(
        "  Started:     {}",
        execution.start_date.format("%Y-%m-%d %H:%M:%S")
    );

    if let Some(ended) = execution.end_date {
        println!("  Ended:       {}", ended.format("%Y-%m-%d %H:%M:%S"));
        let duration = ended.signed_duration_since(execution.start_date);
        println!("  Duration:    {}ms", duration.num_milliseconds());
    }

    if let Some(http_status) = execution.http_status {
        let label = if http_status == 0 {
            "no response".to_string()
        } else {
            http_status.to_string()
        };
        println!("  HTTP Status: {}", label);
    }

    if let Some(response) = &execution.response {
        println!("\n{}", "Response:".bold());
        match serde_json::from_str::<serde_json::Value>(response) {
            Ok(json) => match serde_json::to_string_pretty(&json) {
                Ok(pretty) => println!("{}", pretty),
                Err(_) => println!("{}", response),
            },
            Err(_) if execution.status == ExecutionStatus::Failed => println!("{}", response.red()),
            Err(_) => println!("{}", response),
        }
    }
}

/// Colorize execution status for display
fn colorize_status(status: ExecutionStatus) -> ColoredString {
    let label = status.as_str();
    match status {
        ExecutionStatus::Started => label.yellow(),
        ExecutionStatus::InProgress => label.cyan(),
        ExecutionStatus::Success => label.green(),
        ExecutionStatus::Failed => label.red(),
        ExecutionStatus::Cancelled => label.dimmed(),
    }
}
