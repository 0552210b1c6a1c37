//! Single-flight speech delivery.
//!
//! [`Speaker`] owns the one "currently active text" slot. A new utterance
//! stops whatever is active before it starts, an identical utterance while
//! one is in flight is dropped, and the cloud provider is tried before the
//! local engine. Audio failures never reach the caller; a failed fallback
//! raises one user notification and the conversation continues as text.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wander_core::{AppNotification, NotificationStore, NotificationType, WanderConfig, WanderError};

use super::local::select_fallback_voices;
use super::{AudioSink, LocalSpeechEngine, Playback, TtsError, TtsProvider, TtsRequest};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakerState {
    Idle,
    Requesting,
    Playing,
}

/// How a `speak` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechOutcome {
    /// Cloud synthesis is playing.
    Succeeded,
    /// The local engine is speaking.
    FellBack,
    /// Both paths failed; a notification was raised.
    Failed,
    /// Blank text, or speech disabled.
    Ignored,
    /// Same text already in flight.
    Duplicate,
    /// A newer request or `stop()` took over before this one started sound.
    Superseded,
}

#[derive(Debug, Clone)]
pub struct SpeakerConfig {
    pub enabled: bool,
    pub voice_id: String,
    pub rate: f32,
    pub pitch: f32,
    /// Substrings matched case-sensitively against local voice names.
    pub preferred_voices: Vec<String>,
    pub intro_marker: String,
}

impl Default for SpeakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            voice_id: "21m00Tcm4TlvDq8ikWAM".into(),
            rate: 1.0,
            pitch: 0.0,
            preferred_voices: ["Google US English", "Microsoft David", "Samantha", "Daniel"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            intro_marker: "Hi, I'm Wander".into(),
        }
    }
}

impl SpeakerConfig {
    pub fn from_config(config: &WanderConfig) -> Self {
        Self {
            enabled: config.tts_enabled,
            voice_id: config.tts_voice_id.clone(),
            rate: config.tts_rate,
            pitch: config.tts_pitch,
            preferred_voices: config.preferred_local_voices.clone(),
            intro_marker: config.intro_marker.clone(),
        }
    }
}

/// The owned active-request slot. `generation` increases on every start and
/// stop so late events from an older request can be recognised.
#[derive(Debug)]
struct Slot {
    state: SpeakerState,
    text: Option<String>,
    generation: u64,
    cancel: Option<CancellationToken>,
}

impl Slot {
    fn clear(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        self.state = SpeakerState::Idle;
        self.text = None;
        self.generation += 1;
    }
}

// ---------------------------------------------------------------------------
// Speaker
// ---------------------------------------------------------------------------

pub struct Speaker {
    cloud: Option<Arc<dyn TtsProvider>>,
    local: Arc<dyn LocalSpeechEngine>,
    sink: Arc<dyn AudioSink>,
    notifications: Arc<NotificationStore>,
    config: RwLock<SpeakerConfig>,
    slot: Arc<Mutex<Slot>>,
    intro_played: AtomicBool,
}

impl Speaker {
    pub fn new(
        cloud: Option<Arc<dyn TtsProvider>>,
        local: Arc<dyn LocalSpeechEngine>,
        sink: Arc<dyn AudioSink>,
        notifications: Arc<NotificationStore>,
        config: SpeakerConfig,
    ) -> Self {
        Self {
            cloud,
            local,
            sink,
            notifications,
            config: RwLock::new(config),
            slot: Arc::new(Mutex::new(Slot {
                state: SpeakerState::Idle,
                text: None,
                generation: 0,
                cancel: None,
            })),
            intro_played: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> SpeakerConfig {
        self.config.read().clone()
    }

    pub fn update_config(&self, f: impl FnOnce(&mut SpeakerConfig)) {
        f(&mut self.config.write());
    }

    pub fn state(&self) -> SpeakerState {
        self.slot.lock().state
    }

    /// Whether `text` is the request currently requesting or playing.
    pub fn is_active(&self, text: &str) -> bool {
        let slot = self.slot.lock();
        slot.state != SpeakerState::Idle && slot.text.as_deref() == Some(text.trim())
    }

    pub fn intro_played(&self) -> bool {
        self.intro_played.load(Ordering::SeqCst)
    }

    /// Stop whatever is active. Safe from any state and idempotent.
    pub fn stop(&self) {
        let mut slot = self.slot.lock();
        if slot.state != SpeakerState::Idle {
            debug!(generation = slot.generation, "Speech stopped");
        }
        slot.clear();
    }

    /// Speak `text`, newest request wins.
    pub async fn speak(&self, text: &str) -> SpeechOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SpeechOutcome::Ignored;
        }
        let config = self.config.read().clone();

        if !config.intro_marker.is_empty()
            && text.contains(config.intro_marker.as_str())
            && !self.intro_played.swap(true, Ordering::SeqCst)
        {
            info!("Intro utterance played");
        }

        if !config.enabled {
            return SpeechOutcome::Ignored;
        }

        let (generation, cancel) = {
            let mut slot = self.slot.lock();
            if slot.state != SpeakerState::Idle && slot.text.as_deref() == Some(text) {
                debug!("Duplicate utterance suppressed");
                return SpeechOutcome::Duplicate;
            }
            slot.clear();
            let cancel = CancellationToken::new();
            slot.state = SpeakerState::Requesting;
            slot.text = Some(text.to_string());
            slot.cancel = Some(cancel.clone());
            (slot.generation, cancel)
        };

        // Primary: cloud synthesis.
        if let Some(cloud) = self.cloud.as_ref().filter(|c| c.is_available()) {
            match self.try_cloud(cloud.as_ref(), text, &config, &cancel).await {
                Ok(playback) => {
                    return if self.mark_playing(generation, playback) {
                        info!(provider = cloud.name(), "Speech playing");
                        SpeechOutcome::Succeeded
                    } else {
                        SpeechOutcome::Superseded
                    };
                }
                Err(TtsError::Cancelled) => return SpeechOutcome::Superseded,
                Err(e) => {
                    warn!(provider = cloud.name(), "Cloud synthesis failed, falling back: {e}");
                }
            }
        } else {
            debug!("No cloud voice available, using local engine");
        }

        if cancel.is_cancelled() {
            return SpeechOutcome::Superseded;
        }

        // Fallback: local engine.
        let voices = self.local.voices().await;
        let candidates = select_fallback_voices(&voices, &config.preferred_voices);
        debug!(
            available = voices.len(),
            candidates = candidates.len(),
            "Local voice candidates"
        );

        match self.local.speak(text, &candidates, config.rate, cancel.clone()).await {
            Ok(playback) => {
                if self.mark_playing(generation, playback) {
                    info!("Speech playing on local engine");
                    SpeechOutcome::FellBack
                } else {
                    SpeechOutcome::Superseded
                }
            }
            Err(TtsError::Cancelled) => SpeechOutcome::Superseded,
            Err(e) => {
                warn!("Local speech failed: {e}");
                self.finish_failed(generation);
                let err = WanderError::Synthesis(e.to_string());
                self.notifications
                    .push(AppNotification::new(NotificationType::Warning, err.user_message()));
                SpeechOutcome::Failed
            }
        }
    }

    async fn try_cloud(
        &self,
        cloud: &dyn TtsProvider,
        text: &str,
        config: &SpeakerConfig,
        cancel: &CancellationToken,
    ) -> Result<Playback, TtsError> {
        let request =
            TtsRequest::new(text, config.voice_id.clone()).with_prosody(config.rate, config.pitch);

        let audio = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TtsError::Cancelled),
            res = cloud.synthesize(&request) => res?,
        };
        let audio = match audio {
            Some(audio) if !audio.is_empty() => audio,
            _ => return Err(TtsError::EmptyAudio),
        };
        self.sink.play(audio, cancel.clone()).await
    }

    /// Move to `Playing` if `generation` is still current, and return the
    /// slot to `Idle` when that playback ends.
    fn mark_playing(&self, generation: u64, playback: Playback) -> bool {
        {
            let mut slot = self.slot.lock();
            if slot.generation != generation {
                return false;
            }
            slot.state = SpeakerState::Playing;
        }

        let slot = Arc::clone(&self.slot);
        tokio::spawn(async move {
            playback.wait().await;
            let mut slot = slot.lock();
            if slot.generation == generation && slot.state == SpeakerState::Playing {
                slot.clear();
                debug!(generation, "Speech finished");
            }
        });
        true
    }

    fn finish_failed(&self, generation: u64) {
        let mut slot = self.slot.lock();
        if slot.generation == generation {
            slot.clear();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tts::{AudioData, AudioFormat, PlaybackDone, VoiceInfo};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Notify;

    // -- mocks -------------------------------------------------------------

    struct MockCloud {
        fail: bool,
        /// Answer without an audio payload.
        silent: bool,
        calls: AtomicUsize,
        /// When set, synthesis waits for a permit.
        gate: Option<Arc<Notify>>,
    }

    impl MockCloud {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                fail: false,
                silent: false,
                calls: AtomicUsize::new(0),
                gate: None,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                fail: true,
                silent: false,
                calls: AtomicUsize::new(0),
                gate: None,
            })
        }

        fn gated(gate: Arc<Notify>) -> Arc<Self> {
            Arc::new(Self {
                fail: false,
                silent: false,
                calls: AtomicUsize::new(0),
                gate: Some(gate),
            })
        }

        fn silent() -> Arc<Self> {
            Arc::new(Self {
                fail: false,
                silent: true,
                calls: AtomicUsize::new(0),
                gate: None,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TtsProvider for MockCloud {
        fn name(&self) -> &str {
            "mock-cloud"
        }
        fn is_available(&self) -> bool {
            true
        }
        async fn synthesize(&self, request: &TtsRequest) -> Result<Option<AudioData>, TtsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail {
                return Err(TtsError::Network("unreachable".into()));
            }
            if self.silent {
                return Ok(None);
            }
            Ok(Some(AudioData {
                bytes: request.text.as_bytes().to_vec(),
                format: AudioFormat::Mp3,
                sample_rate: 44100,
            }))
        }
    }

    struct Started {
        label: String,
        cancel: CancellationToken,
        /// Whether every earlier sound was already stopped when this began.
        others_stopped: bool,
        _done: Option<PlaybackDone>,
    }

    #[derive(Default)]
    struct MockSink {
        finish_immediately: bool,
        /// Fail to open the output device.
        broken: bool,
        started: Mutex<Vec<Started>>,
    }

    impl MockSink {
        fn record(&self, label: String, cancel: CancellationToken) -> Playback {
            let mut started = self.started.lock();
            let others_stopped = started.iter().all(|s| s.cancel.is_cancelled());
            let (done, playback) = Playback::pending();
            let done = if self.finish_immediately {
                done.finish();
                None
            } else {
                Some(done)
            };
            started.push(Started {
                label,
                cancel,
                others_stopped,
                _done: done,
            });
            playback
        }

        fn live(&self) -> Vec<String> {
            self.started
                .lock()
                .iter()
                .filter(|s| !s.cancel.is_cancelled())
                .map(|s| s.label.clone())
                .collect()
        }
    }

    #[async_trait]
    impl AudioSink for MockSink {
        async fn play(&self, audio: AudioData, cancel: CancellationToken) -> Result<Playback, TtsError> {
            if self.broken {
                return Err(TtsError::Playback("no output device".into()));
            }
            let label = String::from_utf8(audio.bytes).unwrap();
            Ok(self.record(label, cancel))
        }
    }

    #[derive(Default)]
    struct MockLocal {
        fail: bool,
        voices: Vec<VoiceInfo>,
        sink: MockSink,
        candidates: Mutex<Vec<Vec<String>>>,
        rates: Mutex<Vec<f32>>,
    }

    impl MockLocal {
        fn calls(&self) -> usize {
            self.candidates.lock().len()
        }
    }

    #[async_trait]
    impl LocalSpeechEngine for MockLocal {
        async fn voices(&self) -> Vec<VoiceInfo> {
            self.voices.clone()
        }
        async fn speak(
            &self,
            text: &str,
            candidates: &[VoiceInfo],
            rate: f32,
            cancel: CancellationToken,
        ) -> Result<Playback, TtsError> {
            self.rates.lock().push(rate);
            self.candidates
                .lock()
                .push(candidates.iter().map(|v| v.name.clone()).collect());
            if self.fail {
                return Err(TtsError::Unavailable("espeak-ng: not found".into()));
            }
            Ok(self.sink.record(text.to_string(), cancel))
        }
    }

    struct Fixture {
        speaker: Arc<Speaker>,
        sink: Arc<MockSink>,
        local: Arc<MockLocal>,
        notifications: Arc<NotificationStore>,
    }

    fn fixture(cloud: Option<Arc<MockCloud>>, local: MockLocal) -> Fixture {
        fixture_with_sink(cloud, local, MockSink::default())
    }

    fn fixture_with_sink(cloud: Option<Arc<MockCloud>>, local: MockLocal, sink: MockSink) -> Fixture {
        let sink = Arc::new(sink);
        let local = Arc::new(local);
        let notifications = Arc::new(NotificationStore::new());
        let speaker = Arc::new(Speaker::new(
            cloud.map(|c| c as Arc<dyn TtsProvider>),
            local.clone(),
            sink.clone(),
            notifications.clone(),
            SpeakerConfig::default(),
        ));
        Fixture {
            speaker,
            sink,
            local,
            notifications,
        }
    }

    // -- tests -------------------------------------------------------------

    #[tokio::test]
    async fn blank_text_is_ignored() {
        let cloud = MockCloud::ok();
        let f = fixture(Some(cloud.clone()), MockLocal::default());
        assert_eq!(f.speaker.speak("   ").await, SpeechOutcome::Ignored);
        assert_eq!(cloud.calls(), 0);
        assert_eq!(f.speaker.state(), SpeakerState::Idle);
    }

    #[tokio::test]
    async fn cloud_success_plays_without_fallback() {
        let cloud = MockCloud::ok();
        let f = fixture(Some(cloud.clone()), MockLocal::default());

        assert_eq!(f.speaker.speak("Hello there").await, SpeechOutcome::Succeeded);
        assert_eq!(f.speaker.state(), SpeakerState::Playing);
        assert!(f.speaker.is_active("Hello there"));
        assert!(f.local.candidates.lock().is_empty());
        assert_eq!(f.sink.live(), ["Hello there"]);
    }

    #[tokio::test]
    async fn second_utterance_stops_the_first() {
        let f = fixture(Some(MockCloud::ok()), MockLocal::default());

        f.speaker.speak("A").await;
        assert_eq!(f.speaker.speak("B").await, SpeechOutcome::Succeeded);

        assert_eq!(f.sink.live(), ["B"]);
        let started = f.sink.started.lock();
        assert_eq!(started.len(), 2);
        assert!(started[1].others_stopped, "A must be stopped before B starts");
        assert!(f.speaker.is_active("B"));
        assert!(!f.speaker.is_active("A"));
    }

    #[tokio::test]
    async fn newer_request_supersedes_one_still_synthesizing() {
        let gate = Arc::new(Notify::new());
        let cloud = MockCloud::gated(gate.clone());
        let f = fixture(Some(cloud.clone()), MockLocal::default());

        let speaker = f.speaker.clone();
        let first = tokio::spawn(async move { speaker.speak("A").await });
        while cloud.calls() == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(f.speaker.state(), SpeakerState::Requesting);

        let speaker = f.speaker.clone();
        let second = tokio::spawn(async move { speaker.speak("B").await });
        while cloud.calls() < 2 {
            tokio::task::yield_now().await;
        }
        gate.notify_one();

        assert_eq!(first.await.unwrap(), SpeechOutcome::Superseded);
        assert_eq!(second.await.unwrap(), SpeechOutcome::Succeeded);
        assert_eq!(f.sink.live(), ["B"]);
        assert_eq!(f.sink.started.lock().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_while_playing_is_one_synthesis() {
        let cloud = MockCloud::ok();
        let f = fixture(Some(cloud.clone()), MockLocal::default());

        assert_eq!(f.speaker.speak("A").await, SpeechOutcome::Succeeded);
        assert_eq!(f.speaker.speak("A").await, SpeechOutcome::Duplicate);
        assert_eq!(cloud.calls(), 1);
        assert_eq!(f.sink.live(), ["A"]);
    }

    #[tokio::test]
    async fn duplicate_while_requesting_is_one_synthesis() {
        let gate = Arc::new(Notify::new());
        let cloud = MockCloud::gated(gate.clone());
        let f = fixture(Some(cloud.clone()), MockLocal::default());

        let speaker = f.speaker.clone();
        let first = tokio::spawn(async move { speaker.speak("A").await });
        while cloud.calls() == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(f.speaker.speak("A").await, SpeechOutcome::Duplicate);
        gate.notify_one();

        assert_eq!(first.await.unwrap(), SpeechOutcome::Succeeded);
        assert_eq!(cloud.calls(), 1);
    }

    #[tokio::test]
    async fn cloud_failure_falls_back_to_preferred_local_voice() {
        let local = MockLocal {
            voices: ["Alice", "Microsoft David", "Zira"]
                .iter()
                .map(|n| VoiceInfo::named(*n))
                .collect(),
            ..Default::default()
        };
        let f = fixture(Some(MockCloud::failing()), local);

        assert_eq!(f.speaker.speak("Tacos tonight?").await, SpeechOutcome::FellBack);
        assert_eq!(*f.local.candidates.lock(), vec![vec!["Microsoft David".to_string()]]);
        assert_eq!(f.speaker.state(), SpeakerState::Playing);
    }

    #[tokio::test]
    async fn missing_audio_payload_falls_back() {
        let cloud = MockCloud::silent();
        let f = fixture(Some(cloud.clone()), MockLocal::default());

        assert_eq!(f.speaker.speak("Any jazz tonight?").await, SpeechOutcome::FellBack);
        assert_eq!(cloud.calls(), 1);
        assert_eq!(f.local.calls(), 1);
        assert!(f.sink.live().is_empty());
        assert_eq!(f.local.sink.live(), ["Any jazz tonight?"]);
        assert!(f.notifications.is_empty());
    }

    #[tokio::test]
    async fn audio_output_failure_falls_back() {
        let cloud = MockCloud::ok();
        let sink = MockSink {
            broken: true,
            ..Default::default()
        };
        let f = fixture_with_sink(Some(cloud.clone()), MockLocal::default(), sink);

        assert_eq!(f.speaker.speak("Museums open late").await, SpeechOutcome::FellBack);
        assert_eq!(cloud.calls(), 1);
        assert_eq!(f.local.calls(), 1);
        assert_eq!(f.local.sink.live(), ["Museums open late"]);
        assert_eq!(f.speaker.state(), SpeakerState::Playing);
    }

    #[tokio::test]
    async fn local_engine_uses_current_rate() {
        let f = fixture(Some(MockCloud::failing()), MockLocal::default());
        f.speaker.speak("first").await;
        f.speaker.update_config(|c| c.rate = 1.5);
        f.speaker.speak("second").await;
        assert_eq!(*f.local.rates.lock(), vec![1.0, 1.5]);
    }

    #[tokio::test]
    async fn no_preferred_voice_passes_full_list() {
        let local = MockLocal {
            voices: ["Alice", "Zira"].iter().map(|n| VoiceInfo::named(*n)).collect(),
            ..Default::default()
        };
        let f = fixture(None, local);

        assert_eq!(f.speaker.speak("Hello").await, SpeechOutcome::FellBack);
        assert_eq!(
            *f.local.candidates.lock(),
            vec![vec!["Alice".to_string(), "Zira".to_string()]]
        );
    }

    #[tokio::test]
    async fn both_paths_failing_raises_one_notification() {
        let local = MockLocal {
            fail: true,
            ..Default::default()
        };
        let f = fixture(Some(MockCloud::failing()), local);

        assert_eq!(f.speaker.speak("Anything").await, SpeechOutcome::Failed);
        assert_eq!(f.notifications.len(), 1);
        assert_eq!(
            f.notifications.latest().unwrap().message,
            "Voice synthesis unavailable"
        );
        assert_eq!(f.speaker.state(), SpeakerState::Idle);
    }

    #[tokio::test]
    async fn intro_flag_only_moves_forward() {
        let local = MockLocal {
            fail: true,
            ..Default::default()
        };
        let f = fixture(Some(MockCloud::failing()), local);
        assert!(!f.speaker.intro_played());

        f.speaker.speak("Hi, I'm Wander, your local guide.").await;
        assert!(f.speaker.intro_played());

        f.speaker.speak("Something else").await;
        f.speaker.stop();
        f.speaker.speak("   ").await;
        assert!(f.speaker.intro_played());
    }

    #[tokio::test]
    async fn stop_is_idempotent_from_any_state() {
        let f = fixture(Some(MockCloud::ok()), MockLocal::default());
        f.speaker.stop();
        f.speaker.stop();
        assert_eq!(f.speaker.state(), SpeakerState::Idle);

        f.speaker.speak("A").await;
        f.speaker.stop();
        f.speaker.stop();
        assert_eq!(f.speaker.state(), SpeakerState::Idle);
        assert!(f.sink.live().is_empty());
    }

    #[tokio::test]
    async fn natural_completion_returns_to_idle() {
        let sink = Arc::new(MockSink {
            finish_immediately: true,
            ..Default::default()
        });
        let speaker = Speaker::new(
            Some(MockCloud::ok()),
            Arc::new(MockLocal::default()),
            sink,
            Arc::new(NotificationStore::new()),
            SpeakerConfig::default(),
        );

        assert_eq!(speaker.speak("short clip").await, SpeechOutcome::Succeeded);
        tokio::time::timeout(Duration::from_secs(2), async {
            while speaker.state() != SpeakerState::Idle {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("speaker should return to idle");
        assert!(!speaker.is_active("short clip"));
    }

    #[tokio::test]
    async fn disabled_speaker_ignores_text() {
        let cloud = MockCloud::ok();
        let f = fixture(Some(cloud.clone()), MockLocal::default());
        f.speaker.update_config(|c| c.enabled = false);
        assert_eq!(f.speaker.speak("Hello").await, SpeechOutcome::Ignored);
        assert_eq!(cloud.calls(), 0);
    }
}
