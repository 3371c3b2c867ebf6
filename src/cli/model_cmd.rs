//! One-shot model commands: status, predict, reload, health, labels.

use std::path::PathBuf;

use serde::Serialize;

use super::args::Args;
use super::exit;
use crate::api::{PredictRequest, ReloadResponse};
use crate::config::ServeConfig;
use crate::engine::{validate_text, CandleBackend};
use crate::health::{HealthChecker, HealthState};
use crate::labels::LABELS;
use crate::models::ModelServer;
use crate::shutdown::ShutdownState;

fn print_json<T: Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(s) => {
            println!("{}", s);
            exit::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to serialize output: {}", e);
            exit::FAILURE
        }
    }
}

fn parse(rest: &[String], valued: &[&str], switches: &[&str]) -> Option<Args> {
    match Args::parse(rest, valued, switches) {
        Ok(args) => Some(args),
        Err(e) => {
            eprintln!("{}", e);
            None
        }
    }
}

/// Load the configured model and print the resulting status.
pub fn run_status(config: &ServeConfig) -> i32 {
    let server = ModelServer::<CandleBackend>::from_config(config);
    let _ = server.load(None, None);
    let status = server.status();
    let code = print_json(&status);
    server.teardown();
    if status.loaded {
        code
    } else {
        exit::FAILURE
    }
}

/// Classify one text given with `--text` or read from `--file`.
pub fn run_predict(config: &ServeConfig, rest: &[String]) -> i32 {
    let Some(args) = parse(
        rest,
        &["--text", "--file", "--threshold", "--max-length"],
        &["--json"],
    ) else {
        return exit::FAILURE;
    };

    let text = match (args.value("--text"), args.value("--file")) {
        (Some(text), None) => text.to_string(),
        (None, Some(path)) => match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                eprintln!("Cannot read {}: {}", path, e);
                return exit::FAILURE;
            }
        },
        _ => {
            eprintln!("Usage: scaudit-cli predict (--text TEXT | --file PATH) [--threshold F] [--max-length N] [--json]");
            return exit::FAILURE;
        }
    };

    let request = PredictRequest {
        text,
        threshold: match args.parsed("--threshold") {
            Ok(v) => v,
            Err(e) => {
                eprintln!("{}", e);
                return exit::FAILURE;
            }
        },
        max_length: match args.parsed("--max-length") {
            Ok(v) => v,
            Err(e) => {
                eprintln!("{}", e);
                return exit::FAILURE;
            }
        },
    };
    if let Err(e) = validate_text(&request.text) {
        eprintln!("{}", e);
        return exit::FAILURE;
    }
    let params = request.params(config.predict);

    let server = ModelServer::<CandleBackend>::from_config(config);
    if let Err(e) = server.load(None, None) {
        eprintln!("{}", e);
        return exit::FAILURE;
    }
    let result = server.predict(&request.text, params);
    server.teardown();

    match result {
        Ok(prediction) if args.has("--json") => print_json(&prediction),
        Ok(prediction) => {
            for (label, prob) in prediction.ranked(&server.labels().texts()) {
                let mark = if prob >= params.threshold { "*" } else { " " };
                println!("{} {:.4}  {}", mark, prob, label);
            }
            exit::SUCCESS
        }
        Err(e) => {
            eprintln!("{}", e);
            exit::FAILURE
        }
    }
}

/// Load from explicit paths and report the outcome.
pub fn run_reload(config: &ServeConfig, rest: &[String]) -> i32 {
    let Some(args) = parse(rest, &["--base", "--adapter"], &[]) else {
        return exit::FAILURE;
    };
    let server = ModelServer::<CandleBackend>::from_config(config);
    let result = server.load(
        args.value("--base").map(PathBuf::from),
        args.value("--adapter").map(PathBuf::from),
    );
    server.teardown();

    match result {
        Ok(report) => print_json(&ReloadResponse {
            status: "reloaded".to_string(),
            base: report.base_path,
            adapter: report.adapter_path,
        }),
        Err(e) => {
            eprintln!("reload failed: {}", e.message());
            exit::FAILURE
        }
    }
}

/// Exit 0 when the configured model loads cleanly.
pub fn run_health(config: &ServeConfig) -> i32 {
    let server = ModelServer::<CandleBackend>::from_config(config);
    let _ = server.load(None, None);
    let report = HealthChecker::new().report(&server.status(), ShutdownState::Running);
    server.teardown();
    let code = print_json(&report);
    if report.state == HealthState::Healthy {
        code
    } else {
        exit::FAILURE
    }
}

pub fn run_labels(rest: &[String]) -> i32 {
    let Some(args) = parse(rest, &[], &["--json"]) else {
        return exit::FAILURE;
    };
    if args.has("--json") {
        return print_json(&crate::api::LabelsResponse { labels: LABELS.texts() });
    }
    for (i, label) in LABELS.iter().enumerate() {
        println!("{}  {}", i, label);
    }
    exit::SUCCESS
}
