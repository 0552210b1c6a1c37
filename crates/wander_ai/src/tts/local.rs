//! On-device speech fallback.
//!
//! Voice selection from a preference list, a [`LocalSpeechEngine`] backed by
//! the platform speech command (`say` on macOS, `espeak-ng` elsewhere) and an
//! [`AudioSink`] that plays synthesised clips through a player process.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{AudioData, AudioSink, LocalSpeechEngine, Playback, TtsError, VoiceInfo};

/// Words per minute at rate 1.0 for both speech commands.
const BASE_WPM: f32 = 175.0;

static CLIP_COUNTER: AtomicU64 = AtomicU64::new(0);

// ---------------------------------------------------------------------------
// Voice selection
// ---------------------------------------------------------------------------

/// The first voice whose name contains any preferred token (case-sensitive),
/// alone; otherwise every voice, leaving the choice to the engine.
pub fn select_fallback_voices(voices: &[VoiceInfo], preferred: &[String]) -> Vec<VoiceInfo> {
    voices
        .iter()
        .find(|v| {
            preferred
                .iter()
                .any(|token| !token.is_empty() && v.name.contains(token.as_str()))
        })
        .map(|v| vec![v.clone()])
        .unwrap_or_else(|| voices.to_vec())
}

// ---------------------------------------------------------------------------
// Speech command
// ---------------------------------------------------------------------------

/// `say -v ?` lines: `Samantha            en_US    # Hello, my name is ...`
static SAY_VOICE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<name>.+?)\s+(?P<lang>[a-z]{2,3}[_-][A-Za-z0-9]+)\s+#").expect("say voice regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechCommand {
    Say,
    EspeakNg,
}

impl SpeechCommand {
    pub fn detect() -> Self {
        if cfg!(target_os = "macos") {
            Self::Say
        } else {
            Self::EspeakNg
        }
    }

    pub fn program(&self) -> &'static str {
        match self {
            Self::Say => "say",
            Self::EspeakNg => "espeak-ng",
        }
    }

    fn list_voices_args(&self) -> &'static [&'static str] {
        match self {
            Self::Say => &["-v", "?"],
            Self::EspeakNg => &["--voices"],
        }
    }

    pub fn parse_voices(&self, listing: &str) -> Vec<VoiceInfo> {
        match self {
            Self::Say => listing
                .lines()
                .filter_map(|line| SAY_VOICE_LINE.captures(line))
                .map(|caps| {
                    let name = caps["name"].trim().to_string();
                    VoiceInfo {
                        id: name.clone(),
                        name,
                        language: Some(caps["lang"].to_string()),
                    }
                })
                .collect(),
            // Pty Language Age/Gender VoiceName File [Other Languages]
            Self::EspeakNg => listing
                .lines()
                .skip_while(|line| !line.trim_start().starts_with("Pty"))
                .skip(1)
                .filter_map(|line| {
                    let cols: Vec<&str> = line.split_whitespace().collect();
                    (cols.len() >= 5).then(|| VoiceInfo {
                        id: cols[4].to_string(),
                        name: cols[3].to_string(),
                        language: Some(cols[1].to_string()),
                    })
                })
                .collect(),
        }
    }

    /// Arguments for speaking text supplied on stdin.
    pub fn speak_args(&self, voice: Option<&VoiceInfo>, rate: f32) -> Vec<String> {
        let wpm = ((BASE_WPM * rate).round() as u32).max(40).to_string();
        let mut args = match self {
            Self::Say => vec!["-r".to_string(), wpm],
            Self::EspeakNg => vec!["-s".to_string(), wpm],
        };
        if let Some(voice) = voice {
            args.push("-v".into());
            args.push(voice.id.clone());
        }
        if *self == Self::EspeakNg {
            args.push("--stdin".into());
        }
        args
    }
}

// ---------------------------------------------------------------------------
// Process plumbing
// ---------------------------------------------------------------------------

/// Spawn `cmd`, feed it `stdin`, and bind the child's lifetime to `cancel`.
/// The returned playback resolves when the process exits or is killed.
async fn spawn_tracked(
    mut cmd: Command,
    stdin: Option<String>,
    cancel: CancellationToken,
    cleanup: Option<PathBuf>,
) -> Result<Playback, TtsError> {
    let program = cmd.as_std().get_program().to_string_lossy().into_owned();
    if cancel.is_cancelled() {
        return Err(TtsError::Cancelled);
    }

    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::null())
    .stderr(Stdio::null())
    .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|e| TtsError::Unavailable(format!("{program}: {e}")))?;

    if let Some(text) = stdin
        && let Some(mut pipe) = child.stdin.take()
    {
        pipe.write_all(text.as_bytes())
            .await
            .map_err(|e| TtsError::Playback(format!("{program} stdin: {e}")))?;
    }

    debug!(program = %program, "Speech process started");
    let (done, playback) = Playback::pending();
    tokio::spawn(async move {
        tokio::select! {
            status = child.wait() => match status {
                Ok(s) if !s.success() => warn!(program = %program, status = %s, "Speech process failed"),
                Err(e) => warn!(program = %program, "Speech process wait failed: {e}"),
                Ok(_) => debug!(program = %program, "Speech process finished"),
            },
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                debug!(program = %program, "Speech process stopped");
            }
        }
        if let Some(path) = cleanup {
            let _ = tokio::fs::remove_file(path).await;
        }
        done.finish();
    });

    Ok(playback)
}

// ---------------------------------------------------------------------------
// SystemSpeechEngine
// ---------------------------------------------------------------------------

pub struct SystemSpeechEngine {
    command: SpeechCommand,
}

impl SystemSpeechEngine {
    pub fn new(command: SpeechCommand) -> Self {
        Self { command }
    }

    pub fn detect() -> Self {
        Self::new(SpeechCommand::detect())
    }
}

#[async_trait]
impl LocalSpeechEngine for SystemSpeechEngine {
    async fn voices(&self) -> Vec<VoiceInfo> {
        let output = Command::new(self.command.program())
            .args(self.command.list_voices_args())
            .stderr(Stdio::null())
            .output()
            .await;
        match output {
            Ok(out) if out.status.success() => {
                self.command.parse_voices(&String::from_utf8_lossy(&out.stdout))
            }
            Ok(out) => {
                debug!(status = %out.status, "Voice listing failed");
                Vec::new()
            }
            Err(e) => {
                debug!(program = self.command.program(), "Voice listing unavailable: {e}");
                Vec::new()
            }
        }
    }

    async fn speak(
        &self,
        text: &str,
        candidates: &[VoiceInfo],
        rate: f32,
        cancel: CancellationToken,
    ) -> Result<Playback, TtsError> {
        let voice = match candidates {
            [only] => Some(only),
            _ => None,
        };
        let mut cmd = Command::new(self.command.program());
        cmd.args(self.command.speak_args(voice, rate));
        debug!(voice = ?voice.map(|v| v.name.as_str()), "Local speech");
        spawn_tracked(cmd, Some(text.to_string()), cancel, None).await
    }
}

// ---------------------------------------------------------------------------
// ProcessAudioSink
// ---------------------------------------------------------------------------

/// Plays clips by writing them to a temp file and running a player.
pub struct ProcessAudioSink {
    program: String,
    args: Vec<String>,
}

impl ProcessAudioSink {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// `afplay` on macOS, `ffplay` elsewhere.
    pub fn detect() -> Self {
        if cfg!(target_os = "macos") {
            Self::new("afplay", Vec::new())
        } else {
            Self::new(
                "ffplay",
                ["-nodisp", "-autoexit", "-loglevel", "quiet"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            )
        }
    }
}

#[async_trait]
impl AudioSink for ProcessAudioSink {
    async fn play(&self, audio: AudioData, cancel: CancellationToken) -> Result<Playback, TtsError> {
        if audio.is_empty() {
            return Err(TtsError::EmptyAudio);
        }
        let path = std::env::temp_dir().join(format!(
            "wander-{}-{}.{}",
            std::process::id(),
            CLIP_COUNTER.fetch_add(1, Ordering::Relaxed),
            audio.format.extension()
        ));
        tokio::fs::write(&path, &audio.bytes)
            .await
            .map_err(|e| TtsError::Playback(format!("write clip: {e}")))?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg(&path);
        match spawn_tracked(cmd, None, cancel, Some(path.clone())).await {
            Ok(playback) => Ok(playback),
            Err(e) => {
                let _ = tokio::fs::remove_file(&path).await;
                Err(e)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
