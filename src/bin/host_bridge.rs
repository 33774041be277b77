//! Headless bridge binary serving the call surface over stdin/stdout.
//!
//! Reads `CallEnvelope` messages as newline-delimited JSON from stdin and
//! writes one `ReplyEnvelope` per call to stdout. Facades run against the
//! simulated host, which makes this binary the reference peer for
//! interpreter-side bindings.
//!
//! All tracing/diagnostic output goes to stderr so that stdout remains a
//! clean JSON protocol channel.

use capbridge::bridge::stdio::run_stdio_bridge;
use capbridge::output::UiThread;
use capbridge::platform::HostProvider;
use capbridge::platform::sim::SimHost;
use capbridge::{BridgeConfig, CallRouter, FacadeRegistry, OutputRelay};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BridgeConfig::load_or_default()?;
    let _log_guard = capbridge::logging::init_tracing(&config.logging)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "capbridge-host starting");

    let host = Arc::new(SimHost::new());
    let ui = if config.output.notices {
        host.notice_surface().map(UiThread::spawn).transpose()?
    } else {
        None
    };

    let registry = Arc::new(FacadeRegistry::with_config(host, &config));
    let relay = Arc::new(OutputRelay::from_config(
        &config.output,
        ui.as_ref().map(UiThread::handle),
    )?);
    let router = Arc::new(CallRouter::new(Arc::clone(&registry), relay));

    let result = run_stdio_bridge(router).await;

    registry.stop_all();
    if let Some(ui) = ui {
        ui.shutdown();
    }

    result.map_err(|e| {
        tracing::error!(error = %e, "capbridge-host exited with error");
        anyhow::anyhow!("capbridge-host failed: {e}")
    })?;

    tracing::info!("capbridge-host shut down cleanly");
    Ok(())
}
