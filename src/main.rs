//! Sentinel CORE command-line entry point.
//!
//! ## CLI Subcommands
//!
//! - `sentinel-core-cli analyze <TEXT>` - Combined safety analysis
//! - `sentinel-core-cli phi <MODE> <TEXT>` - PHI detection (detect, redact, encrypt)
//! - `sentinel-core-cli emotion <TEXT>` - Emotion classification
//! - `sentinel-core-cli hash-password` - Hash a password read from stdin
//! - `sentinel-core-cli serve` - JSON lines API over stdin/stdout
//! - `sentinel-core-cli config show|defaults|validate`

use std::process::ExitCode;

use sentinel_core::cli::{self, config_cmd};

fn exit(code: i32) -> ExitCode {
    ExitCode::from(code.clamp(0, 255) as u8)
}

/// Remaining args joined, so unquoted text still works.
fn text_arg(args: &[String], from: usize) -> Option<String> {
    let text = args.get(from..)?.join(" ");
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");

    match command {
        "analyze" => match text_arg(&args, 2) {
            Some(text) => exit(cli::run_analyze(&text).await),
            None => {
                print_command_help("analyze");
                ExitCode::from(2u8)
            }
        },
        "phi" => match (args.get(2), text_arg(&args, 3)) {
            (Some(mode), Some(text)) => exit(cli::run_phi(mode, &text).await),
            _ => {
                print_command_help("phi");
                ExitCode::from(2u8)
            }
        },
        "emotion" => match text_arg(&args, 2) {
            Some(text) => exit(cli::run_emotion(&text).await),
            None => {
                print_command_help("emotion");
                ExitCode::from(2u8)
            }
        },
        "hash-password" => exit(cli::run_hash_password().await),
        "serve" => exit(cli::run_serve().await),
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => exit(config_cmd::run_show()),
                "defaults" => {
                    config_cmd::run_defaults();
                    ExitCode::SUCCESS
                }
                "validate" => exit(config_cmd::run_validate()),
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    ExitCode::FAILURE
                }
            }
        }
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = args.get(2) {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("sentinel-core {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "sentinel-core v{}

USAGE:
    sentinel-core-cli <COMMAND> [ARGS]

COMMANDS:
    analyze <TEXT>       Combined crisis, emotion and PHI analysis
    phi <MODE> <TEXT>    PHI detection; MODE is detect, redact or encrypt
    emotion <TEXT>       Emotion classification
    hash-password        Hash a password read from stdin
    serve                JSON lines API over stdin/stdout
    config               Show or validate configuration
    version              Show version information
    help [COMMAND]       Show help

ENVIRONMENT:
    SENTINEL_CONFIG_FILE  TOML config file layered under SENTINEL_* variables
    SENTINEL_LOG_LEVEL    Log filter (default: info)

EXIT CODES:
    0  Success / content safe
    1  Content unsafe / failure
    2  Usage or configuration error
    3  Safety undetermined
",
        version
    );
}

fn print_command_help(command: &str) {
    match command {
        "analyze" => eprintln!(
            "sentinel-core-cli analyze <TEXT>

Runs crisis, emotion and PHI analysis concurrently and prints the combined
result as JSON. Exits 0 when safe, 1 when unsafe, 3 when any analyzer
failed or the deadline elapsed."
        ),
        "phi" => eprintln!(
            "sentinel-core-cli phi <detect|redact|encrypt> <TEXT>

Encrypt mode requires SENTINEL_PHI_KEY or SENTINEL_PHI_PASSPHRASE."
        ),
        "emotion" => eprintln!("sentinel-core-cli emotion <TEXT>"),
        "serve" => eprintln!(
            "sentinel-core-cli serve

Reads one JSON API message per line from stdin and writes one response per
line to stdout. Set SENTINEL_ADMIN_EMAIL and SENTINEL_ADMIN_PASSWORD to
provision a superuser at startup."
        ),
        "config" => eprintln!(
            "sentinel-core-cli config <show|defaults|validate>

    show       Effective configuration (secrets reduced to presence)
    defaults   Built-in defaults
    validate   Exit 0 if valid, 1 on warnings, 2 on errors"
        ),
        _ => eprintln!(
            "No detailed help available for '{}'. Use 'sentinel-core-cli help' for general usage.",
            command
        ),
    }
}
