//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::planner::Scope;

/// yamlops - declarative server, service and DNS reconciliation.
#[derive(Parser, Debug)]
#[command(name = "yo")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file or directory.
    #[arg(short, long, global = true, env = "YO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Environment name, overrides the configuration and `YO_ENV`.
    #[arg(short, long, global = true)]
    pub env: Option<String>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log format.
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the configuration.
    Validate,

    /// Observe remote state and show the plan.
    Plan {
        /// Scope filters.
        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Plan and apply changes.
    Apply {
        /// Scope filters.
        #[command(flatten)]
        scope: ScopeArgs,

        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Manage the inventory ledger.
    State {
        /// State subcommand.
        #[command(subcommand)]
        command: StateCommands,
    },
}

/// Filters narrowing a plan or apply run.
#[derive(Args, Debug, Clone, Default)]
pub struct ScopeArgs {
    /// Only resources in this zone.
    #[arg(long)]
    pub zone: Option<String>,

    /// Only resources on this server.
    #[arg(long)]
    pub server: Option<String>,

    /// Only this business service (repeatable).
    #[arg(long = "service")]
    pub services: Vec<String>,

    /// Only this infra service or gateway (repeatable).
    #[arg(long = "infra")]
    pub infra_services: Vec<String>,

    /// Only this domain and its subdomains.
    #[arg(long)]
    pub domain: Option<String>,

    /// Only domains and DNS records.
    #[arg(long, conflicts_with_all = ["services", "infra_services"])]
    pub dns_only: bool,

    /// Redeploy selected services even when in sync.
    #[arg(long)]
    pub force: bool,
}

/// Inventory ledger subcommands.
#[derive(Subcommand, Debug)]
pub enum StateCommands {
    /// Show the ledger and the current lock.
    Show,

    /// Remove the workspace lock regardless of its holder.
    Unlock,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// Log format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable log lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl From<ScopeArgs> for Scope {
    fn from(args: ScopeArgs) -> Self {
        Self {
            zone: args.zone,
            server: args.server,
            services: args.services,
            infra_services: args.infra_services,
            domain: args.domain,
            dns_only: args.dns_only,
            force_deploy: args.force,
        }
    }
}
