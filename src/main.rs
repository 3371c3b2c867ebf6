//! `scaudit-cli` entry point.
//!
//! ## CLI Subcommands
//!
//! - `scaudit-cli serve` - JSON lines over stdin/stdout (default)
//! - `scaudit-cli status` - Load the model and print status
//! - `scaudit-cli predict` - Classify one contract
//! - `scaudit-cli reload` - Load from explicit paths
//! - `scaudit-cli health` - Health check (exit 0/1)
//! - `scaudit-cli labels` - Print the label set
//! - `scaudit-cli config` - Show, validate or print default configuration

use std::process::ExitCode;

use scaudit_core::cli::{config_cmd, exit, model_cmd, serve_cmd};
use scaudit_core::config::{self as scaudit_config, ServeConfig};
use scaudit_core::telemetry;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("serve");
    let rest = args.get(2..).unwrap_or(&[]);

    match command {
        "help" | "--help" | "-h" => {
            print_usage();
            return ExitCode::SUCCESS;
        }
        "version" | "--version" | "-V" => {
            println!("scaudit-cli {}", env!("CARGO_PKG_VERSION"));
            return ExitCode::SUCCESS;
        }
        "labels" => return code(model_cmd::run_labels(rest)),
        _ => {}
    }

    let config = match scaudit_config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return code(exit::CONFIG_ERROR);
        }
    };
    if let Err(e) = telemetry::init_logging(&config.log) {
        eprintln!("Logging disabled: {}", e);
    }
    telemetry::describe_metrics();

    let status = match command {
        "serve" | "" => run_serve(&config),
        "status" => model_cmd::run_status(&config),
        "predict" => model_cmd::run_predict(&config, rest),
        "reload" => model_cmd::run_reload(&config, rest),
        "health" => model_cmd::run_health(&config),
        "config" => match rest.first().map(|s| s.as_str()).unwrap_or("show") {
            "show" => {
                config_cmd::run_show(&config);
                exit::SUCCESS
            }
            "defaults" => {
                config_cmd::run_defaults();
                exit::SUCCESS
            }
            "validate" => config_cmd::run_validate(&config),
            other => {
                eprintln!("Unknown config subcommand: {}", other);
                exit::FAILURE
            }
        },
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            exit::FAILURE
        }
    };
    code(status)
}

fn run_serve(config: &ServeConfig) -> i32 {
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Cannot start async runtime: {}", e);
            return exit::FAILURE;
        }
    };
    runtime.block_on(serve_cmd::run_serve(config))
}

fn code(status: i32) -> ExitCode {
    ExitCode::from(status.clamp(0, 255) as u8)
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "scaudit-cli - smart contract vulnerability classifier v{}

USAGE:
    scaudit-cli [COMMAND] [OPTIONS]

COMMANDS:
    serve        Answer JSON-lines requests on stdin (default)
    status       Load the configured model and print its status
    predict      Classify one contract
                   --text TEXT | --file PATH  [--threshold F] [--max-length N] [--json]
    reload       Load from explicit paths
                   [--base DIR] [--adapter DIR]
    health       Health check (exit 0 if healthy, 1 otherwise)
    labels       Print the label set [--json]
    config       show | defaults | validate
    version      Show version information
    help         Show this help message

SERVE PROTOCOL:
    in:  {{\"id\": 1, \"op\": \"predict\", \"text\": \"...\", \"threshold\": 0.5}}
    out: {{\"id\": 1, \"ok\": true, \"result\": {{\"labels\": [...], \"probs\": [...]}}}}
    ops: status, predict, reload, health, labels

ENVIRONMENT:
    SCAUDIT_CONFIG           TOML config file
    SCAUDIT_BASE_MODEL       Base model directory (default: models/base)
    SCAUDIT_ADAPTER          Adapter directory (default: models/adapter, empty = none)
    SCAUDIT_DEVICE           auto | cpu | cuda | metal
    SCAUDIT_THRESHOLD        Default threshold (default: 0.5)
    SCAUDIT_MAX_LENGTH       Default max tokens (default: 512)
    SCAUDIT_SHUTDOWN_TIMEOUT Drain timeout in seconds (default: 30)
    SCAUDIT_LOG_FORMAT       json | pretty
    SCAUDIT_LOG_LEVEL        Log filter (default: info)
    SCAUDIT_LOG_FILE         Log file (default: stderr)

EXIT CODES:
    0  Success / Healthy
    1  Failure / Unhealthy
    2  Configuration error
",
        version
    );
}
