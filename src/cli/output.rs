//! Output formatting for CLI commands.
//!
//! Every formatter returns a string; the binary decides where it goes.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::{Config, ValidationResult};
use crate::planner::{ApplyReport, Change, ChangeType, Plan};
use crate::state::{Inventory, LockInfo};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Result row for table display.
#[derive(Tabled)]
struct ResultRow {
    #[tabled(rename = "")]
    status: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Server")]
    server: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

/// Entity count row for table display.
#[derive(Tabled)]
struct CountRow {
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Count")]
    count: usize,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats the outcome of `validate`.
    #[must_use]
    pub fn format_validation(&self, config: &Config, result: &ValidationResult) -> String {
        match self.format {
            OutputFormat::Json => {
                let counts: serde_json::Map<String, serde_json::Value> = config
                    .entity_counts()
                    .into_iter()
                    .map(|(kind, count)| (kind.to_string(), count.into()))
                    .collect();
                let json = serde_json::json!({
                    "valid": result.is_valid(),
                    "warnings": result.warnings,
                    "entities": counts,
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = format!("{} Configuration is valid\n\n", "✓".green());
                let rows: Vec<CountRow> = config
                    .entity_counts()
                    .into_iter()
                    .map(|(kind, count)| CountRow {
                        kind: kind.to_string(),
                        count,
                    })
                    .collect();
                output.push_str(&Table::new(rows).to_string());
                output.push('\n');

                if !result.warnings.is_empty() {
                    let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }
                output
            }
        }
    }

    /// Formats a plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &Plan) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(plan).unwrap_or_default(),
            OutputFormat::Text => Self::format_plan_text(plan),
        }
    }

    fn format_plan_text(plan: &Plan) -> String {
        if !plan.has_changes() {
            return format!(
                "{} No changes required ({} resource(s) up to date)\n",
                "✓".green(),
                plan.len()
            );
        }

        let mut output = String::new();
        for change in &plan.changes {
            let _ = writeln!(output, "{}", Self::format_change(change));
            for action in &change.actions {
                let _ = writeln!(output, "      {}", action.dimmed());
            }
        }

        let summary = plan.summary();
        let _ = write!(
            output,
            "\nPlan: {} to create, {} to update, {} to delete, {} unchanged\n",
            summary.create.to_string().green(),
            summary.update.to_string().yellow(),
            summary.delete.to_string().red(),
            summary.noop
        );
        output
    }

    fn format_change(change: &Change) -> String {
        let line = format!(
            "{} {} {}{}",
            change.change_type.prefix(),
            change.kind,
            change.name,
            change
                .server
                .as_deref()
                .map(|s| format!(" (server: {s})"))
                .unwrap_or_default()
        );
        match change.change_type {
            ChangeType::Create => line.green().to_string(),
            ChangeType::Update => line.yellow().to_string(),
            ChangeType::Delete => line.red().to_string(),
            ChangeType::Noop => line.dimmed().to_string(),
        }
    }

    /// Formats the results of an apply run.
    #[must_use]
    pub fn format_report(&self, report: &ApplyReport) -> String {
        match self.format {
            OutputFormat::Json => {
                let results: Vec<_> = report
                    .results
                    .iter()
                    .map(|r| {
                        serde_json::json!({
                            "change": r.change,
                            "success": r.success,
                            "skipped": r.skipped,
                            "output": r.output,
                            "error": r.error,
                        })
                    })
                    .collect();
                let json = serde_json::json!({
                    "succeeded": report.succeeded(),
                    "failed": report.failed(),
                    "skipped": report.skipped(),
                    "results": results,
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let rows: Vec<ResultRow> = report
                    .results
                    .iter()
                    .filter(|r| r.change.is_change())
                    .map(|r| ResultRow {
                        status: if r.success {
                            "✓".green().to_string()
                        } else if r.skipped {
                            "-".dimmed().to_string()
                        } else {
                            "✗".red().to_string()
                        },
                        kind: r.change.kind.to_string(),
                        name: r.change.name.clone(),
                        server: r.change.server.clone().unwrap_or_default(),
                        detail: truncate(
                            r.error.as_deref().unwrap_or_else(|| last_line(&r.output)),
                            60,
                        ),
                    })
                    .collect();

                let mut output = String::new();
                if !rows.is_empty() {
                    output.push_str(&Table::new(rows).to_string());
                    output.push('\n');
                }
                let status = if report.is_success() {
                    "✓".green()
                } else {
                    "✗".red()
                };
                let _ = writeln!(output, "\n{status} Apply complete: {report}");
                output
            }
        }
    }

    /// Formats the inventory ledger and lock.
    #[must_use]
    pub fn format_inventory(&self, inventory: &Inventory, lock: Option<&LockInfo>) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({ "inventory": inventory, "lock": lock });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = format!("\nInventory: {}\n\n", inventory.environment);
                let _ = writeln!(output, "   Version: {}", inventory.version);
                let _ = writeln!(output, "   Last updated: {}", inventory.last_updated);
                for (kind, names) in [
                    ("ISPs", &inventory.isps),
                    ("Zones", &inventory.zones),
                    ("Registries", &inventory.registries),
                    ("Servers", &inventory.servers),
                    ("Domains", &inventory.domains),
                ] {
                    let list: Vec<&str> = names.iter().map(String::as_str).collect();
                    let _ = writeln!(output, "   {kind}: {}", list.join(", "));
                }
                for (name, cert) in &inventory.certificates {
                    let expiry = cert
                        .not_after
                        .map_or_else(|| String::from("unknown"), |t| t.format("%Y-%m-%d").to_string());
                    let _ = writeln!(output, "   Certificate {name}: expires {expiry}");
                }

                if !inventory.history.is_empty() {
                    let _ = writeln!(output, "\n   Recent history ({}):", inventory.history.len());
                    for entry in inventory.history.iter().rev().take(5) {
                        let status = if entry.failed == 0 { "✓" } else { "✗" };
                        let _ = writeln!(
                            output,
                            "     {status} {} - {} succeeded, {} failed ({})",
                            entry.timestamp.format("%Y-%m-%d %H:%M"),
                            entry.succeeded,
                            entry.failed,
                            entry.resources.join(", ")
                        );
                    }
                }

                match lock {
                    Some(lock) => {
                        let _ = writeln!(
                            output,
                            "\n{} Locked by {} ({}s remaining)",
                            "⚠".yellow(),
                            lock.holder,
                            lock.remaining_secs()
                        );
                    }
                    None => output.push_str("\n   Not locked\n"),
                }
                output
            }
        }
    }
}

fn last_line(output: &str) -> &str {
    output.trim().lines().last().unwrap_or("")
}

/// Truncates a string to at most `max_len` characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
