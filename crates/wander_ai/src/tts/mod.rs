//! Text-to-speech: provider trait, local engine and audio sink seams, and the
//! single-flight [`speaker::Speaker`].
//!
//! Cloud backends implement [`TtsProvider`]; on-device synthesis implements
//! [`LocalSpeechEngine`]; decoded audio goes out through an [`AudioSink`].
//! Every started sound is represented by a [`Playback`] and is bound to a
//! `CancellationToken` so stopping a request silences whatever it started.

pub mod elevenlabs;
pub mod local;
pub mod speaker;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from any speech path.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TtsError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid API key")]
    InvalidKey,

    #[error("Rate limited")]
    RateLimit,

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Provider returned no audio")]
    EmptyAudio,

    #[error("Playback error: {0}")]
    Playback(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("TTS error: {0}")]
    Other(String),
}

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// Encoded audio format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    Mp3,
    Wav,
    Pcm,
}

impl AudioFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Mp3 => "audio/mpeg",
            Self::Wav => "audio/wav",
            Self::Pcm => "audio/pcm",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::Pcm => "pcm",
        }
    }
}

/// A voice offered by a local engine or cloud provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceInfo {
    pub id: String,
    pub name: String,
    pub language: Option<String>,
}

impl VoiceInfo {
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            language: None,
        }
    }
}

/// Request to synthesise speech.
#[derive(Debug, Clone, PartialEq)]
pub struct TtsRequest {
    pub text: String,
    pub voice_id: String,
    /// 1.0 is normal speed.
    pub rate: f32,
    /// 0.0 is the voice's natural pitch.
    pub pitch: f32,
    pub format: AudioFormat,
}

impl TtsRequest {
    pub fn new(text: impl Into<String>, voice_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice_id: voice_id.into(),
            rate: 1.0,
            pitch: 0.0,
            format: AudioFormat::Mp3,
        }
    }

    pub fn with_prosody(mut self, rate: f32, pitch: f32) -> Self {
        self.rate = rate.clamp(0.25, 4.0);
        self.pitch = pitch;
        self
    }
}

/// Synthesised audio returned by a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioData {
    pub bytes: Vec<u8>,
    pub format: AudioFormat,
    pub sample_rate: u32,
}

impl AudioData {
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Playback
// ---------------------------------------------------------------------------

/// Resolves when a started sound finishes, is killed, or its producer goes
/// away.
#[derive(Debug)]
pub struct Playback {
    done: oneshot::Receiver<()>,
}

/// Producer side of a [`Playback`].
#[derive(Debug)]
pub struct PlaybackDone(oneshot::Sender<()>);

impl PlaybackDone {
    pub fn finish(self) {
        let _ = self.0.send(());
    }
}

impl Playback {
    pub fn pending() -> (PlaybackDone, Self) {
        let (tx, rx) = oneshot::channel();
        (PlaybackDone(tx), Self { done: rx })
    }

    /// A playback that has already finished.
    pub fn completed() -> Self {
        let (done, playback) = Self::pending();
        done.finish();
        playback
    }

    pub async fn wait(self) {
        let _ = self.done.await;
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Cloud synthesis backend.
#[async_trait]
pub trait TtsProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the provider can be called at all (credential present).
    fn is_available(&self) -> bool;

    /// `Ok(None)` when the provider answered without an audio payload.
    async fn synthesize(&self, request: &TtsRequest) -> Result<Option<AudioData>, TtsError>;
}

/// On-device speech engine used when the cloud path fails.
#[async_trait]
pub trait LocalSpeechEngine: Send + Sync {
    /// Voices installed on this machine. Empty if they cannot be listed.
    async fn voices(&self) -> Vec<VoiceInfo>;

    /// Speak `text`. With exactly one candidate the engine uses that voice;
    /// otherwise it picks its own default among `candidates`. Cancelling
    /// `cancel` must silence the utterance. `rate` scales the engine's
    /// normal speaking rate.
    async fn speak(
        &self,
        text: &str,
        candidates: &[VoiceInfo],
        rate: f32,
        cancel: CancellationToken,
    ) -> Result<Playback, TtsError>;
}

/// Output device for synthesised audio.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Start playing `audio`. Cancelling `cancel` must stop it.
    async fn play(&self, audio: AudioData, cancel: CancellationToken) -> Result<Playback, TtsError>;
}
