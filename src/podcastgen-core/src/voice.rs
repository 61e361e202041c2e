//! Speaker label to synthesis voice lookup.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Static mapping from speaker label to voice identifier, with a fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerVoiceMap {
    #[serde(default)]
    voices: BTreeMap<String, String>,
    default_voice: String,
}

impl SpeakerVoiceMap {
    pub fn new(default_voice: impl Into<String>) -> Self {
        Self {
            voices: BTreeMap::new(),
            default_voice: default_voice.into(),
        }
    }

    /// Add or replace the voice for a speaker label.
    pub fn with_voice(mut self, speaker_label: impl Into<String>, voice_id: impl Into<String>) -> Self {
        self.voices.insert(speaker_label.into(), voice_id.into());
        self
    }

    pub fn default_voice(&self) -> &str {
        &self.default_voice
    }

    pub fn voices(&self) -> &BTreeMap<String, String> {
        &self.voices
    }

    /// Voice for `speaker_label`, or the default voice when it is unmapped.
    pub fn resolve(&self, speaker_label: &str) -> &str {
        self.voices
            .get(speaker_label)
            .map(String::as_str)
            .unwrap_or(&self.default_voice)
    }
}

/// Free-function form of [`SpeakerVoiceMap::resolve`].
pub fn resolve<'a>(speaker_label: &str, voice_map: &'a SpeakerVoiceMap) -> &'a str {
    voice_map.resolve(speaker_label)
}
