//! `serve`: newline-delimited JSON messages over stdin/stdout.
//!
//! One request per line, one response per line, in order. Ctrl+C or EOF
//! stops the loop.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::auth::RequestContext;
use crate::config;
use crate::telemetry::init_logging;
use crate::SentinelRuntime;

const ADMIN_EMAIL_VAR: &str = "SENTINEL_ADMIN_EMAIL";
const ADMIN_PASSWORD_VAR: &str = "SENTINEL_ADMIN_PASSWORD";

pub async fn run_serve() -> i32 {
    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 2;
        }
    };
    if let Err(e) = init_logging(&cfg.logging) {
        eprintln!("Error: {}", e);
        return 2;
    }

    let runtime = match SentinelRuntime::in_memory(cfg) {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(error = %e, "Runtime assembly failed");
            return 2;
        }
    };

    if let (Ok(email), Ok(password)) = (
        std::env::var(ADMIN_EMAIL_VAR),
        std::env::var(ADMIN_PASSWORD_VAR),
    ) {
        let ctx = RequestContext::new("bootstrap");
        match runtime.auth.provision_superuser(&email, &password, &ctx).await {
            Ok(profile) => tracing::info!(principal_id = %profile.id, "Bootstrap superuser provisioned"),
            Err(e) => {
                tracing::error!(error = %e, "Bootstrap superuser provisioning failed");
                return 2;
            }
        }
    }

    let maintenance = runtime.spawn_maintenance(runtime.config.sweep_interval);
    let outcome = serve_lines(&runtime, tokio::io::stdin(), tokio::io::stdout()).await;
    maintenance.abort();

    match outcome {
        Ok(served) => {
            tracing::info!(served, "Serve loop finished");
            0
        }
        Err(e) => {
            tracing::error!(error = %e, "Serve loop failed");
            1
        }
    }
}

/// Answer each input line until EOF or Ctrl+C. Returns the number served.
pub async fn serve_lines<R, W>(runtime: &SentinelRuntime, input: R, mut output: W) -> std::io::Result<usize>
where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(input).lines();
    let mut served = 0usize;

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received");
                break;
            }
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let response = runtime.handler.process(line.as_bytes()).await;
        output.write_all(&response).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
        served += 1;
    }

    Ok(served)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::HashingConfig;
    use crate::config::EnvConfig;

    #[tokio::test]
    async fn test_serve_lines_answers_each_request() {
        let mut cfg = EnvConfig::default();
        cfg.auth.hashing = HashingConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        };
        let runtime = SentinelRuntime::in_memory(cfg).unwrap();

        let input = concat!(
            "{\"type\":\"analyze_safety\",\"request_id\":\"r-1\",\"token\":\"bogus\",\"content\":\"hello\"}\n",
            "\n",
            "not json\n",
        );
        let mut output = Vec::new();
        let served = serve_lines(&runtime, input.as_bytes(), &mut output).await.unwrap();
        assert_eq!(served, 2);

        let text = String::from_utf8(output).unwrap();
        let responses: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(responses[0]["type"], "error");
        assert_eq!(responses[0]["code"], 401);
        assert_eq!(responses[0]["request_id"], "r-1");
        assert_eq!(responses[1]["code"], 400);
    }
}
