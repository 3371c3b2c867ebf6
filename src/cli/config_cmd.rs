// Copyright 2024-2026 SCAudit Contributors
// SPDX-License-Identifier: Apache-2.0

//! Config CLI subcommands: show, defaults, validate.

use crate::config::{EffectiveConfig, ServeConfig};

use super::exit;

/// Print effective config as key-value pairs to stdout.
pub fn run_show(config: &ServeConfig) {
    print_config(&config.effective_config());
}

/// Print built-in defaults (no file or env overrides).
pub fn run_defaults() {
    print_config(&ServeConfig::default().effective_config());
}

/// Check the configured paths. Returns 0 if valid, 1 if any warnings are found.
pub fn run_validate(config: &ServeConfig) -> i32 {
    let warnings = validate(config);
    for w in &warnings {
        eprintln!("WARNING: {}", w);
    }
    if warnings.is_empty() {
        println!("Configuration is valid.");
        exit::SUCCESS
    } else {
        exit::FAILURE
    }
}

fn validate(config: &ServeConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    let base = &config.base_model_path;
    if !base.is_dir() {
        warnings.push(format!("base model directory {} does not exist", base.display()));
    } else {
        for file in ["config.json", "tokenizer.json"] {
            if !base.join(file).is_file() {
                warnings.push(format!("{} missing from {}", file, base.display()));
            }
        }
    }
    if let Some(adapter) = &config.adapter_path {
        if !adapter.is_dir() {
            warnings.push(format!(
                "adapter directory {} does not exist; the base model will be served",
                adapter.display()
            ));
        }
    }
    warnings
}

fn print_config(cfg: &EffectiveConfig) {
    println!("SCAUDIT_BASE_MODEL={}", cfg.base_model_path.display());
    println!(
        "SCAUDIT_ADAPTER={}",
        cfg.adapter_path.as_ref().map(|p| p.display().to_string()).unwrap_or_default()
    );
    println!("SCAUDIT_DEVICE={}", cfg.device);
    println!("SCAUDIT_THRESHOLD={}", cfg.threshold);
    println!("SCAUDIT_MAX_LENGTH={}", cfg.max_length);
    println!("SCAUDIT_SHUTDOWN_TIMEOUT={}", cfg.shutdown_timeout_secs);
    println!("SCAUDIT_LOG_FORMAT={}", format!("{:?}", cfg.log_format).to_ascii_lowercase());
    println!("SCAUDIT_LOG_LEVEL={}", cfg.log_level);
    println!(
        "SCAUDIT_LOG_FILE={}",
        cfg.log_file.as_ref().map(|p| p.display().to_string()).unwrap_or_default()
    );
}
