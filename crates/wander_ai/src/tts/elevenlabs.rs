//! ElevenLabs cloud synthesis.
//!
//! REST API: `https://api.elevenlabs.io/v1`
//! Auth: `xi-api-key` header.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use super::{AudioData, AudioFormat, TtsError, TtsProvider, TtsRequest};

const API_BASE: &str = "https://api.elevenlabs.io/v1";
const MODEL_ID: &str = "eleven_multilingual_v2";

pub struct ElevenLabsProvider {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl ElevenLabsProvider {
    pub fn new(api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key: api_key.filter(|k| !k.is_empty()),
            base_url: API_BASE.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn auth_header(&self) -> Result<&str, TtsError> {
        self.api_key.as_deref().ok_or(TtsError::InvalidKey)
    }

    fn endpoint(&self, request: &TtsRequest) -> String {
        let output_format = match request.format {
            AudioFormat::Pcm => "pcm_24000",
            AudioFormat::Mp3 | AudioFormat::Wav => "mp3_44100_128",
        };
        format!(
            "{}/text-to-speech/{}?output_format={output_format}",
            self.base_url, request.voice_id
        )
    }

    async fn parse_response(
        &self,
        request: &TtsRequest,
        resp: reqwest::Response,
    ) -> Result<Option<AudioData>, TtsError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => TtsError::InvalidKey,
                429 => TtsError::RateLimit,
                _ => TtsError::Other(format!("ElevenLabs synthesis {status}: {body}")),
            });
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| TtsError::Network(e.to_string()))?;
        if bytes.is_empty() {
            return Ok(None);
        }

        let (format, sample_rate) = match request.format {
            AudioFormat::Pcm => (AudioFormat::Pcm, 24000),
            AudioFormat::Mp3 | AudioFormat::Wav => (AudioFormat::Mp3, 44100),
        };
        Ok(Some(AudioData {
            bytes: bytes.to_vec(),
            format,
            sample_rate,
        }))
    }
}

#[async_trait]
impl TtsProvider for ElevenLabsProvider {
    fn name(&self) -> &str {
        "ElevenLabs"
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn synthesize(&self, request: &TtsRequest) -> Result<Option<AudioData>, TtsError> {
        let api_key = self.auth_header()?;

        // No pitch control on this API; rate maps to `speed`.
        let payload = SynthesisPayload {
            text: &request.text,
            model_id: MODEL_ID,
            voice_settings: VoiceSettings {
                stability: 0.5,
                similarity_boost: 0.75,
                speed: request.rate,
            },
        };

        debug!(voice_id = %request.voice_id, chars = request.text.len(), "ElevenLabs TTS synthesis");

        let resp = self
            .client
            .post(self.endpoint(request))
            .header("xi-api-key", api_key)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| TtsError::Network(e.to_string()))?;

        self.parse_response(request, resp).await
    }
}

#[derive(Serialize)]
struct SynthesisPayload<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
    speed: f32,
}
