//! Stdin/stdout JSON-lines bridge for the call surface.
//!
//! Reads newline-delimited `CallEnvelope` JSON, routes each call, and writes
//! one `ReplyEnvelope` line per call. Calls are answered strictly in order.
//!
//! Stdout is reserved for the protocol; diagnostics go to stderr.

use super::contract::{CallEnvelope, CallName, ReplyEnvelope};
use super::router::CallRouter;
use crate::error::{BridgeError, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};

/// Run the bridge on the process's stdin/stdout until EOF or
/// `bridge.shutdown`.
pub async fn run_stdio_bridge(router: Arc<CallRouter>) -> Result<()> {
    let reader = BufReader::new(tokio::io::stdin());
    let writer = BufWriter::new(tokio::io::stdout());
    run_bridge(router, reader, writer).await
}

/// Run the bridge over arbitrary line-oriented streams.
///
/// Routing runs on the blocking pool: a prompt waits for the user and must
/// not stall the runtime.
pub async fn run_bridge<R, W>(router: Arc<CallRouter>, mut reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| BridgeError::Channel(format!("failed to read call line: {e}")))?;

        if bytes_read == 0 {
            tracing::info!("input closed (EOF); shutting down bridge");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let envelope: CallEnvelope = match serde_json::from_str(trimmed) {
            Ok(env) => env,
            Err(e) => {
                tracing::warn!(error = %e, raw_line = %trimmed, "failed to parse call envelope");
                write_reply(&mut writer, &ReplyEnvelope::parse_error(&e)).await?;
                continue;
            }
        };

        let is_shutdown = envelope.call == CallName::BridgeShutdown;
        let request_id = envelope.request_id.clone();
        let routed = Arc::clone(&router);
        let reply = match tokio::task::spawn_blocking(move || routed.route(&envelope)).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(error = %e, "call dispatch task failed");
                ReplyEnvelope::error(
                    request_id,
                    &BridgeError::Channel(format!("dispatch failed: {e}")),
                )
            }
        };
        write_reply(&mut writer, &reply).await?;

        if is_shutdown {
            tracing::info!("bridge.shutdown received; shutting down bridge");
            break;
        }
    }

    Ok(())
}

async fn write_reply<W: AsyncWrite + Unpin>(writer: &mut W, reply: &ReplyEnvelope) -> Result<()> {
    let json = serde_json::to_string(reply)?;
    writer
        .write_all(json.as_bytes())
        .await
        .map_err(|e| BridgeError::Channel(format!("failed to write reply: {e}")))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| BridgeError::Channel(format!("failed to write newline: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| BridgeError::Channel(format!("failed to flush replies: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::output::{MemoryLogSink, OutputRelay};
    use crate::platform::sim::SimHost;
    use crate::registry::FacadeRegistry;

    fn router() -> Arc<CallRouter> {
        let registry = Arc::new(FacadeRegistry::new(Arc::new(SimHost::new())));
        let relay = Arc::new(OutputRelay::new(
            "script",
            Arc::new(MemoryLogSink::default()),
            None,
        ));
        Arc::new(CallRouter::new(registry, relay))
    }

    async fn run(input: &str) -> Vec<ReplyEnvelope> {
        let mut out = Vec::new();
        run_bridge(router(), BufReader::new(input.as_bytes()), &mut out)
            .await
            .unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn replies_in_order_and_skips_blank_lines() {
        let replies = run(concat!(
            r#"{"v":1,"request_id":"a","call":"bridge.ping"}"#,
            "\n\n",
            r#"{"v":1,"request_id":"b","call":"battery.poll"}"#,
            "\n",
        ))
        .await;
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0].request_id, "a");
        assert_eq!(replies[1].request_id, "b");
        assert!(replies[1].ok);
        assert!(replies[1].value.is_null());
    }

    #[tokio::test]
    async fn garbage_line_gets_parse_error_reply() {
        let replies = run("not json\n").await;
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].request_id, "parse-error");
        assert!(!replies[0].ok);

        // Same reply the in-process surface gives for the same line.
        let in_process: ReplyEnvelope =
            serde_json::from_str(&router().route_json("not json")).unwrap();
        assert_eq!(replies[0], in_process);
    }

    #[tokio::test]
    async fn shutdown_stops_reading() {
        let replies = run(concat!(
            r#"{"v":1,"request_id":"s","call":"bridge.shutdown"}"#,
            "\n",
            r#"{"v":1,"request_id":"late","call":"bridge.ping"}"#,
            "\n",
        ))
        .await;
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].request_id, "s");
    }
}
