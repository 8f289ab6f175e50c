//! CLI subcommands for the `sentinel-core-cli` binary.
//!
//! ```bash
//! sentinel-core-cli analyze "text"          # combined analysis, exit code = verdict
//! sentinel-core-cli phi redact "text"       # PHI detection in a given mode
//! sentinel-core-cli emotion "text"          # emotion classification
//! sentinel-core-cli hash-password < pw.txt  # Argon2id PHC string
//! sentinel-core-cli serve                   # JSON lines over stdin/stdout
//! sentinel-core-cli config show             # effective configuration
//! ```

pub mod analyze_cmd;
pub mod config_cmd;
pub mod serve;

pub use analyze_cmd::{run_analyze, run_emotion, run_hash_password, run_phi};
pub use serve::{run_serve, serve_lines};
