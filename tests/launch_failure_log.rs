//! A failed interpreter run must show up in the diagnostic log, not only in
//! the role's descriptor.
//!
//! Runs in its own test binary because it installs the process-wide
//! subscriber; the failing run logs from its carrier thread.

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use capbridge::interpreter::{RegistrySurfaceLoader, RunContext};
use capbridge::output::{MemoryLogSink, OutputRelay};
use capbridge::platform::sim::SimHost;
use capbridge::{
    BridgeError, FacadeRegistry, InterpreterEntry, InterpreterManager, LaunchSpec, Result,
    StartOutcome,
};

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap_or_else(PoisonError::into_inner)).into_owned()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

struct ExitsWithError;

impl InterpreterEntry for ExitsWithError {
    fn run(&self, _ctx: &RunContext) -> Result<()> {
        Err(BridgeError::InvalidState(
            "script raised SystemExit(2)".to_owned(),
        ))
    }
}

#[test]
fn failed_run_is_logged_as_launch_failure() {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("install subscriber");

    let loader = Arc::new(RegistrySurfaceLoader::new(
        Arc::new(FacadeRegistry::new(Arc::new(SimHost::new()))),
        Arc::new(OutputRelay::new(
            "script",
            Arc::new(MemoryLogSink::default()),
            None,
        )),
        Vec::new(),
    ));
    let manager = InterpreterManager::new(loader, Arc::new(ExitsWithError), 1);
    let spec = LaunchSpec::new("/data/scripts", "/data/runtime", "main.py", ["-u"]);

    assert_eq!(
        manager.start("manager", spec).expect("start"),
        StartOutcome::Launched
    );
    assert!(manager.wait("manager", Duration::from_secs(10)));

    let text = captured.text();
    let line = text
        .lines()
        .find(|l| l.contains("interpreter launch failed for role `manager`"))
        .unwrap_or_else(|| panic!("no launch failure event in log:\n{text}"));
    assert!(line.contains("ERROR"), "{line}");
    assert!(line.contains("SystemExit(2)"), "{line}");
}
