//! The UI-owning thread.
//!
//! Notice state lives on one thread only. Every other thread talks to it
//! through a [`UiHandle`], which posts commands onto a channel the thread
//! drains in order.

use crate::error::{BridgeError, Result};
use crate::platform::{NoticeId, NoticeSurface};
use crossbeam_channel::{Receiver, Sender};
use std::thread::{JoinHandle, ThreadId};

enum UiCommand {
    Notice(String),
    Prompt { text: String, reply: Sender<bool> },
    Shutdown,
}

/// At most one visible notice; showing a new one cancels the old.
#[derive(Debug, Default)]
struct NoticeState {
    current: Option<NoticeId>,
}

impl NoticeState {
    fn replace(&mut self, surface: &mut dyn NoticeSurface, text: &str) {
        if let Some(old) = self.current.take() {
            surface.cancel(old);
        }
        self.current = Some(surface.show(text));
    }
}

/// Cloneable sender side of the UI thread.
#[derive(Clone)]
pub struct UiHandle {
    tx: Sender<UiCommand>,
}

impl UiHandle {
    /// Schedules `text` as the visible notice. Does not wait for it to show.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Channel`] if the UI thread is gone.
    pub fn notify(&self, text: &str) -> Result<()> {
        self.tx
            .send(UiCommand::Notice(text.to_owned()))
            .map_err(|_| BridgeError::Channel("ui thread is not running".to_owned()))
    }

    /// Asks the user a yes/no question and waits for the answer.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Channel`] if the UI thread is gone or exits
    /// before answering.
    pub fn prompt(&self, text: &str) -> Result<bool> {
        let (reply, answer) = crossbeam_channel::bounded(1);
        self.tx
            .send(UiCommand::Prompt {
                text: text.to_owned(),
                reply,
            })
            .map_err(|_| BridgeError::Channel("ui thread is not running".to_owned()))?;
        answer
            .recv()
            .map_err(|_| BridgeError::Channel("ui thread dropped the prompt".to_owned()))
    }
}

/// Owns the UI thread. Dropping it shuts the thread down.
pub struct UiThread {
    tx: Sender<UiCommand>,
    join: Option<JoinHandle<()>>,
}

impl UiThread {
    /// Spawns the UI thread around `surface`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Io`] if the thread cannot be spawned.
    pub fn spawn(surface: Box<dyn NoticeSurface>) -> Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let join = std::thread::Builder::new()
            .name("capbridge-ui".to_owned())
            .spawn(move || run(surface, rx))?;
        Ok(Self {
            tx,
            join: Some(join),
        })
    }

    #[must_use]
    pub fn handle(&self) -> UiHandle {
        UiHandle {
            tx: self.tx.clone(),
        }
    }

    /// Id of the UI-owning thread.
    #[must_use]
    pub fn thread_id(&self) -> Option<ThreadId> {
        self.join.as_ref().map(|j| j.thread().id())
    }

    /// Stops the loop after already queued commands and joins the thread.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        let _ = self.tx.send(UiCommand::Shutdown);
        if let Some(join) = self.join.take()
            && join.join().is_err()
        {
            tracing::error!("ui thread panicked");
        }
    }
}

impl Drop for UiThread {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

fn run(mut surface: Box<dyn NoticeSurface>, rx: Receiver<UiCommand>) {
    tracing::debug!("ui thread started");
    let mut notices = NoticeState::default();
    for command in rx.iter() {
        match command {
            UiCommand::Notice(text) => notices.replace(surface.as_mut(), &text),
            UiCommand::Prompt { text, reply } => {
                let answer = surface.ask(&text);
                tracing::debug!(answer, "prompt answered");
                let _ = reply.send(answer);
            }
            UiCommand::Shutdown => break,
        }
    }
    if let Some(id) = notices.current.take() {
        surface.cancel(id);
    }
    tracing::debug!("ui thread stopped");
}
