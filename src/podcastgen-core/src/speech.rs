//! Speech synthesis services.
//!
//! Each backend maps `(text, voice_id)` to the encoded audio bytes returned
//! by the service. Failures are reported as [`UpstreamError`]; the caller
//! decides whether a failure aborts anything.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use crate::config::{SpeechConfig, SpeechProvider};
use crate::error::{PodcastError, UpstreamError};

/// A speech-synthesis collaborator.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, UpstreamError>;

    /// Extension of the files this backend produces.
    fn file_extension(&self) -> &str;
}

/// ElevenLabs text-to-speech.
pub struct ElevenLabsSpeech {
    client: Client,
    api_base: String,
    api_key: String,
    model_id: String,
    stability: f32,
    similarity_boost: f32,
}

#[derive(Debug, Serialize)]
struct ElevenLabsBody<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

impl ElevenLabsSpeech {
    pub const DEFAULT_BASE: &'static str = "https://api.elevenlabs.io";
    pub const DEFAULT_MODEL: &'static str = "eleven_multilingual_v2";

    pub fn new(api_key: impl Into<String>, config: &SpeechConfig) -> Result<Self, PodcastError> {
        Ok(Self {
            client: http_client(config)?,
            api_base: config
                .api_base
                .clone()
                .unwrap_or_else(|| Self::DEFAULT_BASE.to_string()),
            api_key: api_key.into(),
            model_id: config
                .model
                .clone()
                .unwrap_or_else(|| Self::DEFAULT_MODEL.to_string()),
            stability: config.stability,
            similarity_boost: config.similarity_boost,
        })
    }

    fn endpoint(&self, voice_id: &str) -> String {
        format!(
            "{}/v1/text-to-speech/{}",
            self.api_base.trim_end_matches('/'),
            voice_id
        )
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsSpeech {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, UpstreamError> {
        let body = ElevenLabsBody {
            text,
            model_id: &self.model_id,
            voice_settings: VoiceSettings {
                stability: self.stability,
                similarity_boost: self.similarity_boost,
            },
        };

        let response = self
            .client
            .post(self.endpoint(voice_id))
            .header("Accept", "audio/mpeg")
            .header("xi-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        read_audio(response).await
    }

    fn file_extension(&self) -> &str {
        "mp3"
    }
}

/// OpenAI `audio/speech` endpoint (or any compatible server).
pub struct OpenAiSpeech {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct OpenAiSpeechBody<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

impl OpenAiSpeech {
    pub const DEFAULT_MODEL: &'static str = "tts-1";

    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        config: &SpeechConfig,
    ) -> Result<Self, PodcastError> {
        Ok(Self {
            client: http_client(config)?,
            api_base: config.api_base.clone().unwrap_or_else(|| api_base.into()),
            api_key: api_key.into(),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| Self::DEFAULT_MODEL.to_string()),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/audio/speech", self.api_base.trim_end_matches('/'))
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeech {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, UpstreamError> {
        let body = OpenAiSpeechBody {
            model: &self.model,
            input: text,
            voice: voice_id,
            response_format: "mp3",
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        read_audio(response).await
    }

    fn file_extension(&self) -> &str {
        "mp3"
    }
}

fn http_client(config: &SpeechConfig) -> Result<Client, PodcastError> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs.max(1)))
        .connect_timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| PodcastError::ConfigError(format!("Failed to create HTTP client: {}", e)))
}

/// Classify a service response: non-2xx and empty bodies are failures.
async fn read_audio(response: reqwest::Response) -> Result<Vec<u8>, UpstreamError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(UpstreamError::Status {
            status: status.as_u16(),
            body: truncate(&body, 500),
        });
    }

    let bytes = response.bytes().await?;
    if bytes.is_empty() {
        return Err(UpstreamError::EmptyBody);
    }
    Ok(bytes.to_vec())
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

/// Build the backend selected in configuration.
///
/// `openai_base` and `openai_key` serve the OpenAI backend, `elevenlabs_key`
/// the ElevenLabs one; the local backend needs neither.
pub async fn from_config(
    config: &SpeechConfig,
    openai_base: &str,
    openai_key: &str,
    elevenlabs_key: Option<&str>,
) -> Result<Box<dyn SpeechSynthesizer>, PodcastError> {
    match config.provider {
        SpeechProvider::OpenAI => Ok(Box::new(OpenAiSpeech::new(openai_base, openai_key, config)?)),
        SpeechProvider::ElevenLabs => {
            let key = elevenlabs_key.filter(|k| !k.is_empty()).ok_or_else(|| {
                PodcastError::ConfigError(
                    "ELEVEN_LABS_API_KEY must be set for the elevenlabs provider".to_string(),
                )
            })?;
            Ok(Box::new(ElevenLabsSpeech::new(key, config)?))
        }
        #[cfg(feature = "kokoro")]
        SpeechProvider::Kokoro => Ok(Box::new(kokoro::KokoroSpeech::new().await?)),
        #[cfg(not(feature = "kokoro"))]
        SpeechProvider::Kokoro => Err(PodcastError::ConfigError(
            "The kokoro provider requires building with the `kokoro` feature".to_string(),
        )),
    }
}

#[cfg(feature = "kokoro")]
pub mod kokoro {
    //! Local synthesis with kokoro-tiny (downloads the model on first run).

    use async_trait::async_trait;
    use hound::{SampleFormat, WavSpec, WavWriter};
    use kokoro_tiny::TtsEngine;
    use std::io::Cursor;
    use std::sync::Mutex;

    use super::SpeechSynthesizer;
    use crate::error::{PodcastError, UpstreamError};

    const SAMPLE_RATE: u32 = 24000;
    /// Kokoro has a strict input limit; ~200 chars is safe.
    const MAX_CHUNK_CHARS: usize = 200;
    /// 0.3 seconds between chunks to prevent cutoff.
    const CHUNK_PAUSE: usize = 7200;

    pub struct KokoroSpeech {
        engine: Mutex<TtsEngine>,
        available_voices: Vec<String>,
    }

    impl KokoroSpeech {
        pub async fn new() -> Result<Self, PodcastError> {
            let engine = TtsEngine::new()
                .await
                .map_err(|e| PodcastError::ConfigError(format!("Failed to initialize TTS: {}", e)))?;
            let available_voices = engine.voices();

            Ok(Self {
                engine: Mutex::new(engine),
                available_voices,
            })
        }

        pub fn available_voices(&self) -> &[String] {
            &self.available_voices
        }

        fn render(&self, text: &str, voice_id: &str) -> Result<Vec<f32>, UpstreamError> {
            if !self.available_voices.iter().any(|v| v == voice_id) {
                return Err(UpstreamError::Service(format!("Unknown voice '{}'", voice_id)));
            }

            let mut engine = self
                .engine
                .lock()
                .map_err(|_| UpstreamError::Service("TTS engine lock poisoned".to_string()))?;

            let mut samples = Vec::new();
            for chunk in split_into_chunks(text, MAX_CHUNK_CHARS) {
                let chunk_samples = engine
                    .synthesize(&chunk, Some(voice_id))
                    .map_err(|e| UpstreamError::Service(format!("Synthesis failed: {}", e)))?;
                if !samples.is_empty() {
                    samples.extend(std::iter::repeat_n(0.0, CHUNK_PAUSE));
                }
                samples.extend(chunk_samples);
            }
            Ok(samples)
        }
    }

    #[async_trait]
    impl SpeechSynthesizer for KokoroSpeech {
        async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, UpstreamError> {
            let samples = self.render(text, voice_id)?;
            if samples.is_empty() {
                return Err(UpstreamError::EmptyBody);
            }
            encode_wav(&samples)
        }

        fn file_extension(&self) -> &str {
            "wav"
        }
    }

    fn encode_wav(samples: &[f32]) -> Result<Vec<u8>, UpstreamError> {
        let spec = WavSpec {
            channels: 1,
            sample_rate: SAMPLE_RATE,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let wav_error = |e: hound::Error| UpstreamError::Service(format!("Failed to encode WAV: {}", e));

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).map_err(wav_error)?;
            for sample in samples {
                writer.write_sample(*sample).map_err(wav_error)?;
            }
            writer.finalize().map_err(wav_error)?;
        }
        Ok(cursor.into_inner())
    }

    /// Split `text` into chunks of at most `max_chars` characters.
    ///
    /// Breaks fall after sentence punctuation where possible, then after
    /// commas, then between words. A single word longer than `max_chars` is
    /// kept whole. Lengths count chars, not bytes.
    pub(super) fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut current_len = 0;

        for piece in pieces(text, max_chars) {
            let piece_len = piece.chars().count();
            let joined_len = if current_len == 0 {
                piece_len
            } else {
                current_len + 1 + piece_len
            };

            if joined_len > max_chars && current_len > 0 {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current.push_str(piece);
            current_len += piece_len;
        }

        if current_len > 0 {
            chunks.push(current);
        }
        chunks
    }

    /// Sentences, falling back to comma clauses and then words for any
    /// sentence longer than `max_chars`.
    fn pieces(text: &str, max_chars: usize) -> Vec<&str> {
        let mut out = Vec::new();
        for sentence in text.split_inclusive(['.', '!', '?', ';']) {
            let sentence = sentence.trim();
            if sentence.is_empty() {
                continue;
            }
            if sentence.chars().count() <= max_chars {
                out.push(sentence);
                continue;
            }
            for clause in sentence.split_inclusive(',') {
                let clause = clause.trim();
                if clause.is_empty() {
                    continue;
                }
                if clause.chars().count() <= max_chars {
                    out.push(clause);
                } else {
                    out.extend(clause.split_whitespace());
                }
            }
        }
        out
    }

}
