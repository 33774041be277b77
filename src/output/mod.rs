//! Output relay.
//!
//! [`OutputRelay::emit`] writes a durable `tag: message` line from the
//! calling thread, then asks the UI thread to show the message as a
//! transient notice. The caller never waits for the UI, and a notice that
//! cannot be scheduled is logged and dropped.

pub mod ui;

use crate::config::OutputConfig;
use crate::error::{BridgeError, Result};
use std::borrow::Cow;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tracing_appender::rolling::RollingFileAppender;
pub use ui::{UiHandle, UiThread};

/// Destination of durable output lines.
pub trait LogSink: Send + Sync {
    /// Writes one line. Must complete before returning.
    fn write_line(&self, tag: &str, message: &str) -> io::Result<()>;
}

/// Emits each line as a `tracing` event on the `capbridge::output` target.
#[derive(Debug, Default)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn write_line(&self, tag: &str, message: &str) -> io::Result<()> {
        tracing::info!(target: "capbridge::output", "{tag}: {message}");
        Ok(())
    }
}

/// Appends `[YYYY-MM-DD HH:MM:SS] tag: message` lines to a daily-rotated
/// `output.YYYY-MM-DD.log`.
///
/// Embedded newlines are escaped so every line is exactly one emit.
pub struct FileLogSink {
    file: Mutex<RollingFileAppender>,
}

impl FileLogSink {
    /// # Errors
    ///
    /// Returns an error if `dir` cannot be created or the log file cannot be
    /// opened.
    pub fn open(dir: &Path) -> Result<Self> {
        Ok(Self {
            file: Mutex::new(crate::logging::daily_appender(dir, "output")?),
        })
    }
}

impl LogSink for FileLogSink {
    fn write_line(&self, tag: &str, message: &str) -> io::Result<()> {
        let ts = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S");
        let line = format!("[{ts}] {tag}: {}\n", escape_newlines(message));
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(line.as_bytes())?;
        file.flush()
    }
}

fn escape_newlines(message: &str) -> Cow<'_, str> {
    if message.contains(['\n', '\r']) {
        message.replace('\r', "\\r").replace('\n', "\\n").into()
    } else {
        message.into()
    }
}

/// Keeps lines in memory; useful for hosts that forward them elsewhere.
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    lines: Mutex<Vec<String>>,
}

impl MemoryLogSink {
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl LogSink for MemoryLogSink {
    fn write_line(&self, tag: &str, message: &str) -> io::Result<()> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(format!("{tag}: {message}"));
        Ok(())
    }
}

pub struct OutputRelay {
    tag: String,
    sink: Arc<dyn LogSink>,
    ui: Option<UiHandle>,
}

impl OutputRelay {
    pub fn new(tag: impl Into<String>, sink: Arc<dyn LogSink>, ui: Option<UiHandle>) -> Self {
        Self {
            tag: tag.into(),
            sink,
            ui,
        }
    }

    /// Builds the relay described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if a file sink was requested and cannot be opened.
    pub fn from_config(config: &OutputConfig, ui: Option<UiHandle>) -> Result<Self> {
        let sink: Arc<dyn LogSink> = if config.log_file {
            let dir = config
                .log_dir
                .clone()
                .unwrap_or_else(crate::bridge_dirs::logs_dir);
            Arc::new(FileLogSink::open(&dir)?)
        } else {
            Arc::new(TracingLogSink)
        };
        let ui = if config.notices { ui } else { None };
        Ok(Self::new(config.tag.clone(), sink, ui))
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn has_ui(&self) -> bool {
        self.ui.is_some()
    }

    /// Log line plus notice, with the relay's own tag.
    pub fn emit(&self, message: &str) {
        self.emit_tagged(&self.tag, message);
    }

    /// Log line plus notice.
    pub fn emit_tagged(&self, tag: &str, message: &str) {
        self.log(tag, message);
        if let Some(ui) = &self.ui
            && let Err(e) = ui.notify(message)
        {
            tracing::warn!(error = %e, "notice dropped");
        }
    }

    /// Durable log line only.
    pub fn log(&self, tag: &str, message: &str) {
        if let Err(e) = self.sink.write_line(tag, message) {
            tracing::warn!(error = %e, tag, "durable log write failed");
        }
    }

    /// Asks the user a yes/no question on the UI thread. Blocks the caller.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidState`] if no UI is attached, or
    /// [`BridgeError::Channel`] if the UI thread is gone.
    pub fn prompt(&self, message: &str) -> Result<bool> {
        let ui = self
            .ui
            .as_ref()
            .ok_or_else(|| BridgeError::InvalidState("no ui attached".to_owned()))?;
        self.log(&self.tag, message);
        ui.prompt(message)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::platform::HostProvider;
    use crate::platform::sim::{NoticeEvent, SimHost};

    #[test]
    fn emit_without_ui_still_logs() {
        let sink = Arc::new(MemoryLogSink::default());
        let relay = OutputRelay::new("script", sink.clone(), None);
        relay.emit("hello");
        relay.emit_tagged("other", "world");
        assert_eq!(sink.lines(), vec!["script: hello", "other: world"]);
        assert!(relay.prompt("continue?").is_err());
    }

    #[test]
    fn new_notice_cancels_previous_on_ui_thread() {
        let host = SimHost::new();
        let ui = UiThread::spawn(host.notice_surface().unwrap()).unwrap();
        let ui_thread = ui.thread_id().unwrap();
        let sink = Arc::new(MemoryLogSink::default());
        let relay = OutputRelay::new("script", sink.clone(), Some(ui.handle()));

        relay.emit("first");
        relay.emit("second");
        ui.shutdown();

        let events = host.notices();
        assert_eq!(events.len(), 4);
        let NoticeEvent::Shown { id: first, text, thread } = &events[0] else {
            panic!("expected first notice, got {:?}", events[0]);
        };
        assert_eq!(text, "first");
        assert_eq!(*thread, ui_thread);
        assert_eq!(
            events[1],
            NoticeEvent::Cancelled {
                id: *first,
                thread: ui_thread
            }
        );
        assert!(matches!(&events[2], NoticeEvent::Shown { text, .. } if text == "second"));
        assert!(matches!(events[3], NoticeEvent::Cancelled { .. }));
        assert_ne!(ui_thread, std::thread::current().id());
        assert_eq!(sink.lines().len(), 2);
    }

    #[test]
    fn prompt_returns_user_answer() {
        let host = SimHost::new();
        host.set_prompt_answer(false);
        let ui = UiThread::spawn(host.notice_surface().unwrap()).unwrap();
        let relay = OutputRelay::new("script", Arc::new(MemoryLogSink::default()), Some(ui.handle()));
        assert!(!relay.prompt("delete everything?").unwrap());
    }

    #[test]
    fn notice_after_shutdown_is_swallowed() {
        let host = SimHost::new();
        let ui = UiThread::spawn(host.notice_surface().unwrap()).unwrap();
        let handle = ui.handle();
        ui.shutdown();
        let sink = Arc::new(MemoryLogSink::default());
        let relay = OutputRelay::new("script", sink.clone(), Some(handle));
        relay.emit("late");
        assert_eq!(sink.lines(), vec!["script: late"]);
    }

    #[test]
    fn file_sink_from_config() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = OutputConfig {
            log_file: true,
            log_dir: Some(tmp.path().to_path_buf()),
            ..OutputConfig::default()
        };
        let relay = OutputRelay::from_config(&config, None).unwrap();
        relay.emit("to disk");
        let entry = std::fs::read_dir(tmp.path()).unwrap().flatten().next().unwrap();
        let content = std::fs::read_to_string(entry.path()).unwrap();
        assert!(content.contains("capbridge: to disk"));
    }

    #[test]
    fn file_sink_keeps_one_line_per_emit() {
        let tmp = tempfile::TempDir::new().unwrap();
        let sink = FileLogSink::open(tmp.path()).unwrap();
        sink.write_line("script", "hello").unwrap();
        sink.write_line("script", "two\nlines").unwrap();

        let entry = std::fs::read_dir(tmp.path()).unwrap().flatten().next().unwrap();
        assert!(entry.file_name().to_string_lossy().starts_with("output."));
        let content = std::fs::read_to_string(entry.path()).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] script: hello"));
        assert!(lines[1].ends_with("] script: two\\nlines"));
    }
}
