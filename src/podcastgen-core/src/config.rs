//! Configuration module for loading TOML config files.
//!
//! Every section has defaults, so an empty file (or no file at all, through
//! [`default_config`]) produces a working Host/Guest setup. API keys are not
//! part of the file; the CLI reads them from the environment.

use serde::Deserialize;
use std::collections::BTreeMap;
use regex::Regex;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use crate::error::PodcastError;
use crate::policy::{CallPolicy, RetryPolicy};
use crate::voice::SpeakerVoiceMap;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub speech: SpeechConfig,
    pub speakers: SpeakersConfig,
    pub output: OutputConfig,
    pub prompts: PromptsConfig,
}

/// Text-generation settings for persona and script prompts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    /// OpenAI-compatible base URL; the environment can override it.
    pub api_base: Option<String>,
    pub persona_max_tokens: u32,
    pub script_max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4".to_string(),
            api_base: None,
            persona_max_tokens: 800,
            script_max_tokens: 3000,
            temperature: 0.7,
            timeout_secs: 120,
            max_attempts: 3,
            retry_delay_ms: 1000,
        }
    }
}

/// Which speech service turns utterances into audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechProvider {
    #[default]
    OpenAI,
    ElevenLabs,
    Kokoro,
}

impl SpeechProvider {
    pub fn name(&self) -> &'static str {
        match self {
            SpeechProvider::OpenAI => "openai",
            SpeechProvider::ElevenLabs => "elevenlabs",
            SpeechProvider::Kokoro => "kokoro",
        }
    }

    /// Built-in Host/Guest voices for this provider.
    pub fn default_voices(&self) -> SpeakerVoiceMap {
        match self {
            SpeechProvider::OpenAI => SpeakerVoiceMap::new("alloy")
                .with_voice("Host", "alloy")
                .with_voice("Guest", "nova"),
            SpeechProvider::ElevenLabs => SpeakerVoiceMap::new("cgSgspJ2msm6clMCkdW9")
                .with_voice("Host", "cgSgspJ2msm6clMCkdW9")
                .with_voice("Guest", "iP95p4xoKVk53GoZ742B"),
            SpeechProvider::Kokoro => SpeakerVoiceMap::new("bf_emma")
                .with_voice("Host", "bf_emma")
                .with_voice("Guest", "bm_george"),
        }
    }
}

impl fmt::Display for SpeechProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SpeechProvider {
    type Err = PodcastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(SpeechProvider::OpenAI),
            "elevenlabs" | "eleven_labs" => Ok(SpeechProvider::ElevenLabs),
            "kokoro" => Ok(SpeechProvider::Kokoro),
            other => Err(PodcastError::ConfigError(format!(
                "Unknown speech provider '{}'. Available providers: openai, elevenlabs, kokoro",
                other
            ))),
        }
    }
}

/// Speech synthesis settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub provider: SpeechProvider,
    /// Provider model; each provider has its own default.
    pub model: Option<String>,
    pub api_base: Option<String>,
    /// ElevenLabs voice settings.
    pub stability: f32,
    pub similarity_boost: f32,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    /// Maximum synthesis calls in flight at once.
    pub concurrency: usize,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            provider: SpeechProvider::default(),
            model: None,
            api_base: None,
            stability: 0.5,
            similarity_boost: 0.5,
            timeout_secs: 60,
            max_attempts: 1,
            retry_delay_ms: 500,
            concurrency: 4,
        }
    }
}

/// Recognized speaker labels and their voices.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeakersConfig {
    pub labels: Vec<String>,
    /// Voice for labels without an entry in `voices`.
    pub default_voice: Option<String>,
    pub voices: BTreeMap<String, String>,
}

impl Default for SpeakersConfig {
    fn default() -> Self {
        Self {
            labels: vec!["Host".to_string(), "Guest".to_string()],
            default_voice: None,
            voices: BTreeMap::new(),
        }
    }
}

/// Output file layout.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub script_file: String,
    /// Final podcast file name without extension.
    pub podcast_stem: String,
    pub clip_prefix: String,
    /// Reuse non-empty clips left by a previous run instead of re-synthesizing.
    pub reuse_clips: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            script_file: "podcast_script.txt".to_string(),
            podcast_stem: "podcast_output".to_string(),
            clip_prefix: "output_audio".to_string(),
            reuse_clips: false,
        }
    }
}

/// Prompt templates.
///
/// Placeholders: `{article}`, `{discussion}`, `{personas}`, `{labels}`,
/// `{first_label}`, `{second_label}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    pub persona_system: String,
    pub persona_template: String,
    pub script_system: String,
    pub script_template: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            persona_system: DEFAULT_PERSONA_SYSTEM.to_string(),
            persona_template: DEFAULT_PERSONA_TEMPLATE.to_string(),
            script_system: DEFAULT_SCRIPT_SYSTEM.to_string(),
            script_template: DEFAULT_SCRIPT_TEMPLATE.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PodcastError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| PodcastError::ConfigError(format!("Failed to read config: {}", e)))?;

        Self::from_str(&content)
    }

    /// Load configuration from string content.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, PodcastError> {
        let config: Config = toml::from_str(content)
            .map_err(|e| PodcastError::ConfigError(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PodcastError> {
        if self.speakers.labels.is_empty() {
            return Err(PodcastError::ConfigError(
                "At least one speaker label is required".to_string(),
            ));
        }
        if let Some(label) = self
            .speakers
            .labels
            .iter()
            .find(|l| l.is_empty() || l.contains([']', '\n']))
        {
            return Err(PodcastError::ConfigError(format!(
                "Invalid speaker label '{}': labels must be non-empty and contain no ']' or newline",
                label
            )));
        }
        if self.speech.concurrency == 0 {
            return Err(PodcastError::ConfigError(
                "speech.concurrency must be at least 1".to_string(),
            ));
        }
        if self.llm.max_attempts == 0 || self.speech.max_attempts == 0 {
            return Err(PodcastError::ConfigError(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Voice map for the configured provider.
    ///
    /// Explicit `[speakers.voices]` entries replace the provider defaults.
    pub fn voice_map(&self) -> SpeakerVoiceMap {
        if self.speakers.voices.is_empty() {
            let defaults = self.speech.provider.default_voices();
            return match &self.speakers.default_voice {
                Some(default) => defaults.voices().iter().fold(
                    SpeakerVoiceMap::new(default.clone()),
                    |map, (label, voice)| map.with_voice(label.clone(), voice.clone()),
                ),
                None => defaults,
            };
        }

        let default = self
            .speakers
            .default_voice
            .clone()
            .or_else(|| {
                self.speakers
                    .labels
                    .iter()
                    .find_map(|l| self.speakers.voices.get(l).cloned())
            })
            .unwrap_or_else(|| self.speech.provider.default_voices().default_voice().to_string());

        self.speakers
            .voices
            .iter()
            .fold(SpeakerVoiceMap::new(default), |map, (label, voice)| {
                map.with_voice(label.clone(), voice.clone())
            })
    }

    pub fn llm_policy(&self) -> CallPolicy {
        CallPolicy::new(
            Duration::from_secs(self.llm.timeout_secs),
            RetryPolicy::new(
                self.llm.max_attempts,
                Duration::from_millis(self.llm.retry_delay_ms),
            ),
        )
    }

    pub fn speech_policy(&self) -> CallPolicy {
        CallPolicy::new(
            Duration::from_secs(self.speech.timeout_secs),
            RetryPolicy::new(
                self.speech.max_attempts,
                Duration::from_millis(self.speech.retry_delay_ms),
            ),
        )
    }

    /// Persona prompt with placeholders replaced.
    pub fn persona_prompt(&self, article: &str) -> String {
        self.render(&self.prompts.persona_template, article, "", "")
    }

    /// Script prompt with placeholders replaced.
    pub fn script_prompt(&self, article: &str, discussion: &str, personas: &str) -> String {
        self.render(&self.prompts.script_template, article, discussion, personas)
    }

    fn render(&self, template: &str, article: &str, discussion: &str, personas: &str) -> String {
        let labels = &self.speakers.labels;
        let first = labels.first().map(String::as_str).unwrap_or("Host");
        let second = labels.get(1).map(String::as_str).unwrap_or(first);
        let markers = labels
            .iter()
            .map(|l| format!("[{}]:", l))
            .collect::<Vec<_>>()
            .join(" or ");

        let Some(placeholder) = PLACEHOLDER.as_ref() else {
            return template.to_string();
        };

        // One pass, so placeholder-like text inside the substituted values
        // (model output, discussion files) is never expanded again.
        placeholder
            .replace_all(template, |caps: &regex::Captures<'_>| match &caps[1] {
                "labels" => markers.clone(),
                "first_label" => first.to_string(),
                "second_label" => second.to_string(),
                "personas" => personas.to_string(),
                "discussion" => discussion.to_string(),
                "article" => article.to_string(),
                _ => caps[0].to_string(),
            })
            .into_owned()
    }
}

static PLACEHOLDER: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\{(labels|first_label|second_label|personas|discussion|article)\}").ok()
});

/// Default configuration embedded in the binary.
pub fn default_config() -> Config {
    Config::default()
}

const DEFAULT_PERSONA_SYSTEM: &str =
    "You are an expert in creating diverse and engaging podcast personas.";

const DEFAULT_PERSONA_TEMPLATE: &str = r#"Generate two diverse personas for a podcast discussing this news article:

"""
{article}
"""

For each persona, provide:
1. Name (THE {first_label} IS FEMALE AND {second_label} IS MALE)
2. Role ({first_label} or {second_label})
3. Background (professional and personal)
4. Areas of expertise relevant to the article
5. Personality traits for engaging conversation
6. Speaking style (e.g., formal, casual, technical)
7. Potential biases or perspectives on the topic
8. Typical emotional responses or reactions

Output as a JSON list of two dictionaries, each containing the above fields.
"#;

const DEFAULT_SCRIPT_SYSTEM: &str = "You are an expert podcast scriptwriter, skilled in creating engaging and natural dialogues with proper formatting.";

const DEFAULT_SCRIPT_TEMPLATE: &str = r#"Create a strictly formatted podcast script based on the following article, discussion and personas. Delve into future predictions and the impact of the news.

Article:
"""
{article}
"""

Discussion:
"""
{discussion}
"""

Personas:
{personas}

Adhere to these STRICT formatting rules:
1. Always start dialogue with {labels}
2. Include a line break after each dialogue line.
3. Use quotation marks for actual dialogue.
4. Use <phoneme> tags for difficult pronunciations.
5. Use capitalization, duplicate letters like whaaaaaaaat and punctuation to emphasize EMOTIONS.
6. Keep speaking turns short (1-3 sentences).
7. Do not include any additional text or explanations.

Example of correct formatting:
[{first_label}]: "What do you think about the recent developments? It seems the situation is escalating rapidly."

[{second_label}]: "Well, it's a grim prospect, to say the least."

[{first_label}]: "What do you think are the implications?"

Create a natural, engaging conversation covering the article's main points. Aim for about 1500-2000 words total.
"#;
