// Copyright 2024-2026 SCAudit Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI commands for the `scaudit-cli` binary.
//!
//! Every command builds its own [`ModelServer`](crate::models::ModelServer)
//! from configuration; there is no long-running daemon to talk to except in
//! `serve` mode, which reads line-delimited JSON requests from stdin.
//!
//! ## Usage
//!
//! ```bash
//! scaudit-cli status                  # Load the model and print status
//! scaudit-cli predict --text "..."    # Classify one contract
//! scaudit-cli reload --base DIR       # Load from explicit paths
//! scaudit-cli health                  # Exit 0 when healthy
//! scaudit-cli labels                  # Print the label set
//! scaudit-cli config show             # Print effective configuration
//! scaudit-cli serve                   # JSON lines over stdin/stdout
//! ```

mod args;
pub mod config_cmd;
pub mod model_cmd;
pub mod serve_cmd;

pub use args::{ArgError, Args};

/// Process exit codes.
pub mod exit {
    pub const SUCCESS: i32 = 0;
    pub const FAILURE: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
}
