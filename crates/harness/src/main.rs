//! Tenrankai harness CLI
//!
//! `run` starts the server once per suite and checks every endpoint;
//! `validate-config` checks site configuration files without starting
//! anything.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tenrankai_harness::build::ensure_binary;
use tenrankai_harness::catalog;
use tenrankai_harness::config::HarnessConfig;
use tenrankai_harness::context::{RunContext, Style};
use tenrankai_harness::report::{self, OutputFormat};
use tenrankai_harness::{ServerProcess, SuiteRunner, TestSuite};

#[derive(Parser)]
#[command(name = "tenrankai-harness")]
#[command(author, version, about = "Black-box test harness for the Tenrankai server", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server per suite and check every endpoint
    Run(RunArgs),

    /// Check site configuration files
    ValidateConfig(ValidateArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Harness settings file (TOML)
    #[arg(long, default_value = "harness.toml")]
    harness_config: PathBuf,

    /// Port to run the server on (default 3456, 0 = pick a free port)
    #[arg(short, long)]
    port: Option<u16>,

    /// Server configuration file, relative to the site directory
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keep the last suite's server running after the run
    #[arg(long)]
    keep_running: bool,

    /// Auto-quit the server after N seconds (useful for CI)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    quit_after: Option<u64>,

    /// Path to the tenrankai binary
    #[arg(long)]
    binary: Option<PathBuf>,

    /// Site directory the server runs in
    #[arg(long)]
    site_dir: Option<PathBuf>,

    /// Build the binary from this checkout if it is missing
    #[arg(long)]
    build_dir: Option<PathBuf>,

    /// Suite file or directory replacing the built-in suites
    #[arg(long)]
    suites: Option<PathBuf>,

    /// Run only the named suite(s)
    #[arg(short, long)]
    suite: Vec<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Write test-results.json into this directory
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct ValidateArgs {
    /// Configuration files (defaults to the site's three configs)
    files: Vec<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    let style = Style { color: !cli.no_color };
    let result = rt.block_on(async move {
        match cli.command {
            Commands::Run(args) => run(args, style).await,
            Commands::ValidateConfig(args) => Ok(validate(args, style)),
        }
    });

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("{}", style.failure(&format!("✗ {:#}", e)));
            std::process::exit(1);
        }
    }
}

async fn run(args: RunArgs, style: Style) -> anyhow::Result<i32> {
    let mut config = HarnessConfig::load(&args.harness_config)
        .with_context(|| format!("loading {}", args.harness_config.display()))?;
    apply_overrides(&mut config, &args);

    if let Some(build) = config.build_config() {
        ensure_binary(&build).await?;
    }

    let suites = select_suites(&args)?;
    let runner = SuiteRunner::new(config.runner_config(args.keep_running))?;
    let mut ctx = RunContext::new(style, args.format);

    let kept = runner.run_all(&mut ctx, &suites).await;

    let summary = ctx.aggregator.summarize();
    ctx.reporter.summary(&summary)?;
    if let Some(dir) = &args.output {
        report::write_results(&summary, dir)?;
    }

    if let Some(server) = kept {
        hold(server, &ctx).await;
    }

    Ok(summary.exit_code())
}

fn apply_overrides(config: &mut HarnessConfig, args: &RunArgs) {
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(path) = &args.config {
        config.config = path.clone();
    }
    if let Some(secs) = args.quit_after {
        config.quit_after_secs = Some(secs);
    }
    if let Some(binary) = &args.binary {
        config.binary = binary.clone();
    }
    if let Some(site_dir) = &args.site_dir {
        config.site_dir = site_dir.clone();
    }
    if let Some(build_dir) = &args.build_dir {
        config.build_dir = Some(build_dir.clone());
    }
}

fn select_suites(args: &RunArgs) -> anyhow::Result<Vec<TestSuite>> {
    let mut suites = match &args.suites {
        Some(path) => TestSuite::load(path)?,
        None => catalog::default_suites(),
    };

    if !args.suite.is_empty() {
        suites.retain(|s| args.suite.iter().any(|name| name.eq_ignore_ascii_case(&s.name)));
        if suites.is_empty() {
            anyhow::bail!("no suite matches {:?}", args.suite);
        }
    }
    Ok(suites)
}

/// Serve until Ctrl+C or until the server exits on its own, then stop it
async fn hold(mut server: ServerProcess, ctx: &RunContext) {
    ctx.reporter.note(&format!(
        "Server is running at {} - press Ctrl+C to stop",
        server.base_url()
    ));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Shutting down..."),
        status = server.wait() => info!("Server exited on its own: {:?}", status),
    }

    let state = server.stop().await;
    ctx.reporter.note(&format!("Server {}", state));
}

fn validate(args: ValidateArgs, style: Style) -> i32 {
    let files: Vec<PathBuf> = if args.files.is_empty() {
        tenrankai_site_config::DEFAULT_CONFIGS
            .iter()
            .map(PathBuf::from)
            .collect()
    } else {
        args.files
    };

    let reports = tenrankai_site_config::validate_all(&files);
    for report in &reports {
        let path = report.path.display();
        if report.is_valid() {
            println!("{}", style.success(&format!("✓ {} is valid", path)));
        } else {
            println!("{}", style.failure(&format!("✗ {} failed validation", path)));
        }
        for error in &report.errors {
            println!("  {}", style.failure(&format!("✗ {}", error)));
        }
        for warning in &report.warnings {
            println!("  {}", style.header(&format!("⚠ {}", warning)));
        }
        for note in &report.notes {
            println!("  {}", style.success(&format!("✓ {}", note)));
        }
    }

    if reports.iter().all(|r| r.is_valid()) {
        0
    } else {
        1
    }
}
