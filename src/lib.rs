// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # yamlops
//!
//! Declarative, idempotent reconciliation of servers, compose deployments,
//! DNS records and certificates described in YAML.
//!
//! ## Overview
//!
//! A run has two steps:
//!
//! 1. **Plan**: observe remote state (compose projects over SSH, DNS records
//!    through providers, the local inventory ledger) and diff it against the
//!    configuration, producing an ordered list of changes.
//! 2. **Apply**: execute the changes, one lane per server, and record what was
//!    done in the ledger.
//!
//! ## Modules
//!
//! - [`config`]: entity model, validation and YAML loading
//! - [`planner`]: scopes, plans, the diff and the executor
//! - [`state`]: observed state and the inventory ledger
//! - [`remote`]: remote execution over SSH
//! - [`providers`]: DNS and certificate capabilities
//! - [`reconciler`]: the [`Engine`] entry points
//! - [`cli`]: command-line interface
//!
//! ## Example
//!
//! ```yaml
//! servers:
//!   - name: web-1
//!     zone: hz
//!     ssh: { host: 10.0.0.1, user: root, key_file: ~/.ssh/id_ed25519 }
//!
//! services:
//!   - name: api
//!     server: web-1
//!     image: registry.example.com/api:1.4
//!     ports: ["8080:80"]
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod planner;
pub mod providers;
pub mod reconciler;
pub mod remote;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{Config, ConfigParser, ConfigValidator, EngineSettings, fingerprint};
pub use error::{Result, YoError};
pub use planner::{ApplyReport, CancelToken, Change, ChangeType, Executor, Plan, Planner, Scope};
pub use reconciler::Engine;
pub use remote::{Connector, OpenSshConnector, RemoteSession};
pub use state::{DeploymentState, Inventory, InventoryStore, LocalInventoryStore};
