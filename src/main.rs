//! agentping - agent authentication smoke test
//!
//! A CLI tool that checks an agent credential is present, sends one prompt
//! through the agent CLI, and reports whether a text response came back.
//!
//! Exit codes:
//!   0 - Response received (with --dry-run: a credential is present)
//!   1 - Missing credential, empty response, query failure, or runtime error

mod agent;
mod analysis;
mod cli;
mod config;
mod credentials;
mod error;
mod models;
mod report;

use agent::{ProcessQuery, QueryRequest};
use analysis::Aggregator;
use anyhow::{Context, Result};
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::Config;
use credentials::{Candidate, Credential};
use indicatif::{ProgressBar, ProgressStyle};
use models::{AggregationResult, RunReport};
use std::io::Write;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Config is merged first so a file-level `verbose` can raise the log level
    let mut config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    init_logging(config.log_level(args.quiet));

    info!("agentping v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    debug!("Configuration: {:?}", config);

    match run_check(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Run failed: {}", e);
            eprintln!("\n💥 Unexpected error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .agentping.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(config::DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  .agentping.toml already exists. Remove it first or edit it manually.");
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).context("Failed to write .agentping.toml")?;

    println!("✅ Created .agentping.toml with default settings.");
    println!("   Edit it to customize the model, prompt, executable, and credential variables.");
    Ok(())
}

/// Initialize logging at `level`.
///
/// Logs go to stderr so `--format json` output stays clean.
fn init_logging(level: Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run preflight and, unless this is a dry run, the query. Returns the exit code.
async fn run_check(args: Args, config: Config) -> Result<i32> {
    let start_time = Instant::now();
    let started_at = Utc::now();

    let interactive = args.is_interactive();

    if interactive {
        print!(
            "{}",
            report::generate_header("Testing agent authentication")
        );
    }

    // Step 1: preflight
    let candidates = credentials::candidates_from_env(&config.auth.variables);
    if interactive {
        print!(
            "{}",
            report::generate_env_check(&candidates, config.auth.preview_chars)
        );
    }

    let mut run = RunReport {
        started_at,
        model: config.query.model.clone(),
        prompt: config.query.prompt.trim().to_string(),
        credentials: candidates.iter().map(Candidate::status).collect(),
        credential_source: None,
        result: None,
        duration_seconds: 0.0,
    };

    let credential = match credentials::preflight(&candidates) {
        Ok(credential) => credential,
        Err(e) => {
            warn!("Preflight failed: {}", e);
            if args.format == OutputFormat::Text {
                print!("{}", report::generate_missing_credential(&e));
            }
            run.duration_seconds = start_time.elapsed().as_secs_f64();
            emit_report(&args, &run)?;
            return Ok(run.exit_code());
        }
    };
    info!("Using credential from {}", credential.variable());
    run.credential_source = Some(credential.variable().to_string());

    // Handle --dry-run: stop before any query is sent
    if args.dry_run {
        if args.format == OutputFormat::Text {
            println!(
                "\n✅ Dry run complete. Credential found in {}; no prompt was sent.",
                credential.variable()
            );
        }
        run.duration_seconds = start_time.elapsed().as_secs_f64();
        emit_report(&args, &run)?;
        return Ok(run.exit_code());
    }

    // Step 2: query and aggregate
    let result = query_agent(&args, &config, &credential).await;
    info!(
        "Query finished: {} ({} message(s))",
        result.outcome, result.message_count
    );

    run.result = Some(result);
    run.duration_seconds = start_time.elapsed().as_secs_f64();
    emit_report(&args, &run)?;

    Ok(run.exit_code())
}

/// Send the prompt and aggregate the response.
///
/// Ctrl+C and SIGTERM cancel the query; `--timeout` bounds it.
async fn query_agent(args: &Args, config: &Config, credential: &Credential) -> AggregationResult {
    let source = ProcessQuery::new(config.query.executable.clone())
        .with_executable_args(config.query.executable_args.clone());
    debug!("Agent executable: {}", source.executable());
    let aggregator = Aggregator::new(source);
    let request = QueryRequest::new(config.query.prompt.trim(), config.query.options());

    let interactive = args.is_interactive();
    let stream_text = config.general.stream && args.format == OutputFormat::Text;

    if interactive {
        println!("\n🔄 Testing agent...");
        println!("📤 Sending prompt: \"{}\"", request.prompt);
    }

    let cancel = CancellationToken::new();
    let finished = CancellationToken::new();
    // Left running: once the query is over, a signal exits straight away.
    tokio::spawn(watch_signals(cancel.clone(), finished.clone()));

    let spinner = if interactive && !stream_text {
        Some(new_spinner())
    } else {
        None
    };
    if stream_text {
        println!("\n💬 Response:");
        println!("{}", "─".repeat(50));
    }

    let mut received = 0usize;
    let mut observer = |text: &str| {
        if stream_text {
            print!("{}", text);
            std::io::stdout().flush().ok();
        } else if let Some(ref pb) = spinner {
            received += text.chars().count();
            pb.set_message(format!("Receiving response... {} chars", received));
        }
    };

    let result = aggregator
        .run_with_deadline(
            credential,
            request,
            cancel,
            &mut observer,
            args.timeout.map(Duration::from_secs),
        )
        .await;
    finished.cancel();

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    if stream_text {
        println!("\n{}", "─".repeat(50));
    }

    result
}

/// What a Ctrl+C or SIGTERM should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignalAction {
    /// Stop the running query and let the report print.
    CancelQuery,
    /// Nothing left to stop; leave now.
    Exit,
}

fn signal_action(cancel: &CancellationToken, finished: &CancellationToken) -> SignalAction {
    if finished.is_cancelled() || cancel.is_cancelled() {
        SignalAction::Exit
    } else {
        SignalAction::CancelQuery
    }
}

/// Watch for Ctrl+C and SIGTERM for the rest of the process.
///
/// The first signal during the query cancels it. A signal after the query
/// has finished, or a second one, exits with status 130.
async fn watch_signals(cancel: CancellationToken, finished: CancellationToken) {
    #[cfg(unix)]
    let mut sigterm = {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(sigterm) => Some(sigterm),
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                None
            }
        }
    };

    loop {
        #[cfg(unix)]
        let terminate = async {
            match sigterm.as_mut() {
                Some(sigterm) => {
                    sigterm.recv().await;
                }
                None => std::future::pending::<()>().await,
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    warn!("Cannot listen for Ctrl+C: {}", e);
                    return;
                }
            }
            _ = terminate => {}
        }

        match signal_action(&cancel, &finished) {
            SignalAction::Exit => std::process::exit(130),
            SignalAction::CancelQuery => {
                eprintln!("\n\n👋 Interrupted, stopping the agent");
                cancel.cancel();
            }
        }
    }
}

fn new_spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.blue} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message("Waiting for response...");
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// Print the end-of-run output in the requested format.
fn emit_report(args: &Args, run: &RunReport) -> Result<()> {
    match args.format {
        OutputFormat::Json => {
            println!("{}", report::generate_json_report(run)?);
        }
        OutputFormat::Text => {
            if let Some(ref result) = run.result {
                print!("{}", report::generate_result_section(run, result));
            }
        }
    }
    Ok(())
}

/// Load configuration from file or use defaults.
///
/// Runs before logging is set up, so problems go straight to stderr.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok(config),
        Ok(None) => Ok(Config::default()),
        Err(e) => {
            eprintln!("⚠️  Ignoring .agentping.toml: {:#}", e);
            Ok(Config::default())
        }
    }
}
