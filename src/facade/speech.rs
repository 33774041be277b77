//! Text-to-speech.
//!
//! Engine initialization is asynchronous: [`SpeechFacade::start`] asks the
//! host to open the engine and returns at once, and the engine reports
//! readiness later through the sink. Until then `speak` refuses utterances.

use super::{Facade, FacadeKind};
use crate::error::Result;
use crate::platform::{SpeechHost, SpeechSink, UpdateSink};
use crate::reading::{CacheKey, ReadingCache, Stamped};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpeechSource {
    Engine,
}

impl CacheKey for SpeechSource {
    fn all() -> &'static [Self] {
        &[Self::Engine]
    }
}

/// Engine status as last reported by the host.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpeechStatus {
    /// Initialization has completed.
    pub ready: bool,
    /// An utterance is being spoken.
    pub speaking: bool,
    /// Id of the utterance the engine last started or finished.
    pub last_utterance: Option<String>,
}

/// Receives engine status and tracks readiness.
///
/// Readiness only sticks while the engine is open; a report that arrives
/// after shutdown is cached but does not make the engine ready.
struct EngineState {
    open: AtomicBool,
    ready: AtomicBool,
    cache: ReadingCache<SpeechSource, SpeechStatus>,
}

impl UpdateSink<SpeechSource, SpeechStatus> for EngineState {
    fn on_update(&self, source: SpeechSource, status: SpeechStatus) {
        let ready = status.ready && self.open.load(Ordering::Acquire);
        let was_ready = self.ready.swap(ready, Ordering::AcqRel);
        if ready && !was_ready {
            tracing::info!("speech engine ready");
        }
        self.cache.replace(source, status);
    }
}

/// Facade over the host speech engine.
pub struct SpeechFacade {
    host: Arc<dyn SpeechHost>,
    state: Arc<EngineState>,
    max_message_chars: usize,
    opened: Mutex<bool>,
}

impl SpeechFacade {
    /// Wraps `host`; messages longer than `max_message_chars` are refused.
    pub fn new(host: Arc<dyn SpeechHost>, max_message_chars: usize) -> Self {
        Self {
            host,
            state: Arc::new(EngineState {
                open: AtomicBool::new(false),
                ready: AtomicBool::new(false),
                cache: ReadingCache::new(),
            }),
            max_message_chars,
            opened: Mutex::new(false),
        }
    }

    /// Queues `message` for speaking.
    ///
    /// Returns `false` if the engine is not open or has not finished
    /// initializing, the message is too long, or the host rejected the
    /// utterance. Utterances are passed through in call order; the engine
    /// does its own queueing.
    pub fn speak(&self, message: &str) -> bool {
        if !self.is_started() || !self.is_ready() {
            tracing::debug!("speech engine not ready; utterance refused");
            return false;
        }
        if message.chars().count() > self.max_message_chars {
            tracing::warn!(limit = self.max_message_chars, "utterance too long; refused");
            return false;
        }
        let utterance_id = uuid::Uuid::new_v4().to_string();
        match self.host.speak(message, &utterance_id) {
            Ok(()) => {
                tracing::debug!(utterance = %utterance_id, chars = message.len(), "utterance queued");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "speech engine rejected utterance");
                false
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state.ready.load(Ordering::Acquire)
    }

    /// Whether any media audio is playing (host query).
    pub fn is_media_playing(&self) -> bool {
        self.host.is_media_playing()
    }

    /// Whether the engine is speaking right now (host query).
    pub fn is_speaking(&self) -> bool {
        self.is_ready() && self.host.is_speaking()
    }

    pub fn poll(&self) -> Option<Arc<Stamped<SpeechStatus>>> {
        self.state.cache.poll(SpeechSource::Engine)
    }

    pub fn on_update(&self, source: SpeechSource, status: SpeechStatus) {
        self.state.on_update(source, status);
    }
}

impl Facade for SpeechFacade {
    fn kind(&self) -> FacadeKind {
        FacadeKind::Speech
    }

    fn start(&self) -> Result<()> {
        let mut opened = self.opened.lock().unwrap_or_else(PoisonError::into_inner);
        if *opened {
            return Ok(());
        }
        self.state.ready.store(false, Ordering::Release);
        self.state.open.store(true, Ordering::Release);
        if let Err(e) = self.host.open(Arc::clone(&self.state) as SpeechSink) {
            self.state.open.store(false, Ordering::Release);
            return Err(e);
        }
        *opened = true;
        tracing::info!("speech engine opening");
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let mut opened = self.opened.lock().unwrap_or_else(PoisonError::into_inner);
        if !*opened {
            return Ok(());
        }
        self.state.open.store(false, Ordering::Release);
        self.host.shutdown();
        self.state.ready.store(false, Ordering::Release);
        *opened = false;
        tracing::info!("speech engine shut down");
        Ok(())
    }

    fn is_started(&self) -> bool {
        *self.opened.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::platform::HostProvider;
    use crate::platform::sim::SimHost;

    fn ready_report() -> SpeechStatus {
        SpeechStatus {
            ready: true,
            ..SpeechStatus::default()
        }
    }

    #[test]
    fn late_ready_report_after_stop_does_not_revive_engine() {
        let host = SimHost::new();
        let speech = SpeechFacade::new(host.speech().unwrap(), 100);
        speech.start().unwrap();
        assert!(host.complete_speech_init());
        assert!(speech.speak("first"));

        speech.stop().unwrap();
        // Delivery thread still holding the sink reports readiness.
        speech.on_update(SpeechSource::Engine, ready_report());

        assert!(!speech.is_ready());
        assert!(!speech.speak("second"));
        assert_eq!(host.spoken(), ["first"]);
        assert!(speech.poll().unwrap().reading.ready);
    }

    #[test]
    fn restart_waits_for_fresh_readiness() {
        let host = SimHost::new();
        let speech = SpeechFacade::new(host.speech().unwrap(), 100);
        speech.start().unwrap();
        assert!(host.complete_speech_init());
        speech.stop().unwrap();

        speech.start().unwrap();
        assert!(!speech.speak("too early"));
        assert!(host.complete_speech_init());
        assert!(speech.speak("now"));
        assert_eq!(host.spoken(), ["now"]);
    }

    #[test]
    fn media_playing_does_not_need_engine() {
        let host = SimHost::new();
        let speech = SpeechFacade::new(host.speech().unwrap(), 100);
        assert!(!speech.is_media_playing());
        host.set_media_playing(true);
        assert!(speech.is_media_playing());
    }
}
