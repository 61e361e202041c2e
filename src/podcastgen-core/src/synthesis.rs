//! Per-utterance synthesis.
//!
//! [`UtteranceSynthesizer::synthesize`] never fails: every problem with the
//! speech service becomes a [`SynthesisOutcome::Failure`] for that utterance
//! alone, so one bad call cannot abort the batch.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::audio::AudioClip;
use crate::policy::CallPolicy;
use crate::script::Utterance;
use crate::speech::SpeechSynthesizer;
use crate::store::OutputStore;

/// Result of synthesizing one utterance.
#[derive(Debug, Clone)]
pub enum SynthesisOutcome {
    Success(AudioClip),
    Failure {
        sequence_index: usize,
        speaker_label: String,
        error: String,
    },
}

impl SynthesisOutcome {
    pub fn sequence_index(&self) -> usize {
        match self {
            SynthesisOutcome::Success(clip) => clip.sequence_index(),
            SynthesisOutcome::Failure { sequence_index, .. } => *sequence_index,
        }
    }

    pub fn speaker_label(&self) -> &str {
        match self {
            SynthesisOutcome::Success(clip) => clip.speaker_label(),
            SynthesisOutcome::Failure { speaker_label, .. } => speaker_label,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SynthesisOutcome::Success(_))
    }

    pub fn clip(&self) -> Option<&AudioClip> {
        match self {
            SynthesisOutcome::Success(clip) => Some(clip),
            SynthesisOutcome::Failure { .. } => None,
        }
    }
}

/// Outcome plus the path of the raw clip, when one was written.
#[derive(Debug, Clone)]
pub struct SynthesisResult {
    pub outcome: SynthesisOutcome,
    pub clip_path: Option<PathBuf>,
}

/// Calls the speech service for single utterances.
pub struct UtteranceSynthesizer {
    speech: Arc<dyn SpeechSynthesizer>,
    policy: CallPolicy,
    store: Option<OutputStore>,
    reuse_clips: bool,
}

impl UtteranceSynthesizer {
    pub fn new(speech: Arc<dyn SpeechSynthesizer>, policy: CallPolicy) -> Self {
        Self {
            speech,
            policy,
            store: None,
            reuse_clips: false,
        }
    }

    /// Persist every successful clip through `store`.
    pub fn with_store(mut self, store: OutputStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Allow [`synthesize_or_reuse`](Self::synthesize_or_reuse) to load
    /// stored clips instead of calling the service.
    pub fn reuse_clips(mut self, reuse: bool) -> Self {
        self.reuse_clips = reuse;
        self
    }

    pub async fn synthesize(&self, utterance: &Utterance, voice_id: &str) -> SynthesisOutcome {
        self.synthesize_and_store(utterance, voice_id).await.outcome
    }

    /// Reuse the stored clip when `previous`, the utterance at the same
    /// position in the last saved script, is identical to `utterance`.
    ///
    /// Clip files are named by index and speaker only, so the text check is
    /// what keeps an edited line from picking up stale audio. A changed voice
    /// mapping is not detected.
    pub async fn synthesize_or_reuse(
        &self,
        utterance: &Utterance,
        voice_id: &str,
        previous: Option<&Utterance>,
    ) -> SynthesisResult {
        if self.reuse_clips && previous == Some(utterance) {
            if let Some(result) = self.load_stored(utterance).await {
                return result;
            }
        }
        self.synthesize_and_store(utterance, voice_id).await
    }

    async fn load_stored(&self, utterance: &Utterance) -> Option<SynthesisResult> {
        let store = self.store.as_ref()?;
        let index = utterance.sequence_index();
        let speaker = utterance.speaker_label();
        let extension = self.speech.file_extension();

        let bytes = store.read_clip(index, speaker, extension).await?;
        debug!(index, speaker, "reusing existing clip");
        Some(SynthesisResult {
            outcome: SynthesisOutcome::Success(AudioClip::new(index, speaker, bytes)),
            clip_path: Some(store.clip_path(index, speaker, extension)),
        })
    }

    /// Synthesize and report where the raw clip was written.
    pub async fn synthesize_and_store(&self, utterance: &Utterance, voice_id: &str) -> SynthesisResult {
        let index = utterance.sequence_index();
        let speaker = utterance.speaker_label();
        let extension = self.speech.file_extension();

        let label = format!("speech synthesis #{}", index);
        let result = self
            .policy
            .call(&label, || self.speech.synthesize(utterance.text(), voice_id))
            .await;

        let bytes = match result {
            Ok(bytes) if bytes.is_empty() => {
                return failure(utterance, "Service returned an empty audio body".to_string());
            }
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(index, speaker, voice = voice_id, error = %e, "synthesis failed");
                return failure(utterance, e.to_string());
            }
        };

        debug!(index, speaker, voice = voice_id, bytes = bytes.len(), "synthesized utterance");

        let clip_path = match &self.store {
            Some(store) => match store.write_clip(index, speaker, extension, &bytes).await {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!(index, speaker, error = %e, "could not persist clip");
                    None
                }
            },
            None => None,
        };

        SynthesisResult {
            outcome: SynthesisOutcome::Success(AudioClip::new(index, speaker, bytes)),
            clip_path,
        }
    }
}

fn failure(utterance: &Utterance, error: String) -> SynthesisResult {
    SynthesisResult {
        outcome: SynthesisOutcome::Failure {
            sequence_index: utterance.sequence_index(),
            speaker_label: utterance.speaker_label().to_string(),
            error,
        },
        clip_path: None,
    }
}
