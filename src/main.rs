//! `yo` CLI entrypoint.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use yamlops::cli::{Cli, Commands, LogFormat, OutputFormatter, ScopeArgs, StateCommands};
use yamlops::config::{Config, ConfigParser, ConfigValidator, EngineSettings, find_config};
use yamlops::error::Result;
use yamlops::planner::{CancelToken, Scope};
use yamlops::reconciler::Engine;
use yamlops::remote::OpenSshConnector;

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_format);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// `RUST_LOG` wins over the verbosity flag.
fn init_logging(verbose: bool, format: LogFormat) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<ExitCode> {
    let formatter = OutputFormatter::new(cli.output);
    let (config, settings) = load_config(cli.config.as_deref(), cli.env.as_deref())?;

    match cli.command {
        Commands::Validate => cmd_validate(&config, &formatter),
        Commands::Plan { scope } => cmd_plan(config, settings, scope, &formatter).await,
        Commands::Apply { scope, yes } => cmd_apply(config, settings, scope, yes, &formatter).await,
        Commands::State { command } => cmd_state(config, settings, command, &formatter).await,
    }
}

/// Validate configuration.
fn cmd_validate(config: &Config, formatter: &OutputFormatter) -> Result<ExitCode> {
    let result = ConfigValidator::new().validate(config)?;
    println!("{}", formatter.format_validation(config, &result));
    Ok(ExitCode::SUCCESS)
}

/// Show the plan.
async fn cmd_plan(
    config: Config,
    settings: EngineSettings,
    scope: ScopeArgs,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let engine = build_engine(config, settings);
    let plan = engine.plan(&Scope::from(scope)).await?;
    println!("{}", formatter.format_plan(&plan));
    Ok(ExitCode::SUCCESS)
}

/// Plan, confirm and apply.
async fn cmd_apply(
    config: Config,
    settings: EngineSettings,
    scope: ScopeArgs,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let engine = build_engine(config, settings);
    let plan = engine.plan(&Scope::from(scope)).await?;

    if !plan.has_changes() {
        println!("{}", formatter.format_plan(&plan));
        return Ok(ExitCode::SUCCESS);
    }
    eprintln!("{}", formatter.format_plan(&plan));

    if !auto_approve {
        eprint!("Do you want to apply this plan? [y/N]: ");
        std::io::stderr().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            eprintln!("Apply cancelled.");
            return Ok(ExitCode::SUCCESS);
        }
    }

    let cancel = CancelToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing running changes");
            on_signal.cancel();
        }
    });

    let report = engine.apply(&plan, &cancel).await?;
    println!("{}", formatter.format_report(&report));

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Inventory ledger commands.
async fn cmd_state(
    config: Config,
    settings: EngineSettings,
    command: StateCommands,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let engine = build_engine(config, settings);

    match command {
        StateCommands::Show => {
            let inventory = engine.inventory().await?;
            let lock = engine.lock_info().await?;
            println!("{}", formatter.format_inventory(&inventory, lock.as_ref()));
        }
        StateCommands::Unlock => match engine.force_unlock().await? {
            Some(lock) => eprintln!("Removed lock held by {} ({})", lock.holder, lock.lock_id),
            None => eprintln!("State is not locked."),
        },
    }

    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Loads `.env`, the configuration and the effective settings.
fn load_config(path: Option<&Path>, env: Option<&str>) -> Result<(Config, EngineSettings)> {
    let config_path: PathBuf = match path {
        Some(path) => path.to_path_buf(),
        None => find_config(".")?,
    };
    debug!("Loading configuration from: {}", config_path.display());

    let base = if config_path.is_dir() {
        config_path.as_path()
    } else {
        config_path.parent().unwrap_or_else(|| Path::new("."))
    };
    let parser = ConfigParser::new().with_base_path(base);
    parser.load_dotenv()?;

    let config = parser.load(&config_path)?;
    let mut settings = ConfigParser::settings(&config);
    if let Some(env) = env {
        settings.environment = env.to_string();
    }
    info!("Environment: {}", settings.environment);

    Ok((config, settings))
}

fn build_engine(config: Config, settings: EngineSettings) -> Engine {
    let connector = Arc::new(OpenSshConnector::new(
        settings.connect_timeout(),
        settings.command_timeout(),
    ));
    Engine::new(config, settings, connector)
}
