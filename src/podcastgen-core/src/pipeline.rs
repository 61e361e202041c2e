//! Podcast pipeline orchestration.
//!
//! Drives one article through persona generation, script generation,
//! parsing, per-utterance synthesis and concatenation, and reports how the
//! run ended.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use futures::{StreamExt, stream};
use thiserror::Error;
use tracing::{info, warn};

use crate::article::ArticleInput;
use crate::audio::{self, AudioClip};
use crate::config::Config;
use crate::error::{PodcastError, UpstreamError};
use crate::generation::{GenerationRequest, Personas, TextGenerator, strip_reasoning};
use crate::policy::CallPolicy;
use crate::script::{ScriptParser, Utterance};
use crate::speech::SpeechSynthesizer;
use crate::store::OutputStore;
use crate::synthesis::{SynthesisOutcome, SynthesisResult, UtteranceSynthesizer};
use crate::voice::SpeakerVoiceMap;

/// Which text-generation step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationStage {
    Personas,
    Script,
}

impl fmt::Display for GenerationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationStage::Personas => f.write_str("Persona"),
            GenerationStage::Script => f.write_str("Script"),
        }
    }
}

/// Persona or script generation failed; the run cannot continue.
#[derive(Error, Debug)]
#[error("{stage} generation failed: {error}")]
pub struct ScriptGenerationError {
    pub stage: GenerationStage,
    #[source]
    pub error: UpstreamError,
}

/// An utterance left out of the final audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedUtterance {
    pub sequence_index: usize,
    pub speaker_label: String,
    pub error: String,
}

/// Terminal state of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// Every utterance made it into the podcast.
    Completed { podcast_path: PathBuf },
    /// The podcast was written, but some utterances are missing from it.
    CompletedWithGaps {
        podcast_path: PathBuf,
        skipped: Vec<SkippedUtterance>,
    },
    /// No script was produced; nothing was written.
    AbortedNoScript {
        stage: GenerationStage,
        reason: String,
    },
    /// The script was saved but yielded no audio: either no dialogue was
    /// recognized (`skipped` is empty) or every synthesis call failed.
    AbortedNoDialogue {
        script_path: PathBuf,
        skipped: Vec<SkippedUtterance>,
    },
}

impl RunStatus {
    pub fn podcast_path(&self) -> Option<&PathBuf> {
        match self {
            RunStatus::Completed { podcast_path } | RunStatus::CompletedWithGaps { podcast_path, .. } => {
                Some(podcast_path)
            }
            _ => None,
        }
    }

    pub fn skipped(&self) -> &[SkippedUtterance] {
        match self {
            RunStatus::CompletedWithGaps { skipped, .. } | RunStatus::AbortedNoDialogue { skipped, .. } => {
                skipped
            }
            _ => &[],
        }
    }

    pub fn skipped_indices(&self) -> Vec<usize> {
        self.skipped().iter().map(|s| s.sequence_index).collect()
    }

    pub fn is_aborted(&self) -> bool {
        matches!(
            self,
            RunStatus::AbortedNoScript { .. } | RunStatus::AbortedNoDialogue { .. }
        )
    }
}

/// Files written during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Artifacts {
    pub script_path: Option<PathBuf>,
    /// Raw per-utterance clips, in sequence order.
    pub clip_paths: Vec<PathBuf>,
    pub podcast_path: Option<PathBuf>,
}

/// How a run ended, with what it produced.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub status: RunStatus,
    pub utterances: Vec<Utterance>,
    pub artifacts: Artifacts,
}

/// A fatal error after the script was produced, with whatever was already
/// written so the caller can salvage it.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct PipelineFailure {
    #[source]
    pub error: PodcastError,
    pub artifacts: Artifacts,
}

/// Callback for pipeline events.
pub type PipelineCallback = Box<dyn Fn(PipelineEvent) + Send + Sync>;

/// Events emitted during a run.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    PersonasStart,
    PersonasReady { personas: String },
    ScriptStart,
    ScriptReady { script: String },
    ScriptSaved { path: PathBuf },
    DialogueParsed { utterances: Vec<Utterance> },
    UtteranceDone {
        sequence_index: usize,
        speaker_label: String,
        total: usize,
        error: Option<String>,
    },
    ConcatenationStart { clips: usize },
    PodcastSaved { path: PathBuf },
}

/// Orchestrates one podcast run.
pub struct PodcastPipeline {
    config: Config,
    generator: Arc<dyn TextGenerator>,
    synthesizer: UtteranceSynthesizer,
    parser: ScriptParser,
    voices: SpeakerVoiceMap,
    store: OutputStore,
    llm_policy: CallPolicy,
    callback: Option<PipelineCallback>,
}

impl PodcastPipeline {
    /// Create a pipeline; `config` is validated and fixed for its lifetime.
    pub fn new(
        config: Config,
        generator: Arc<dyn TextGenerator>,
        speech: Arc<dyn SpeechSynthesizer>,
    ) -> Result<Self, PodcastError> {
        config.validate()?;

        let store = OutputStore::new(&config.output);
        let synthesizer = UtteranceSynthesizer::new(speech, config.speech_policy())
            .with_store(store.clone())
            .reuse_clips(config.output.reuse_clips);

        Ok(Self {
            parser: ScriptParser::new(config.speakers.labels.iter().cloned()),
            voices: config.voice_map(),
            llm_policy: config.llm_policy(),
            generator,
            synthesizer,
            store,
            config,
            callback: None,
        })
    }

    /// Set a callback for pipeline events.
    pub fn with_callback(mut self, callback: PipelineCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn store(&self) -> &OutputStore {
        &self.store
    }

    pub fn voices(&self) -> &SpeakerVoiceMap {
        &self.voices
    }

    /// Run the full pipeline for one article.
    ///
    /// Dropping the returned future abandons in-flight calls; the final
    /// podcast is only written once every clip is in, so a cancelled run
    /// never leaves a partial podcast behind.
    pub async fn run(&self, input: &ArticleInput) -> Result<PipelineReport, PipelineFailure> {
        match self.generate_script(input).await {
            Ok(script) => self.run_script(&script).await,
            Err(e) => {
                warn!(stage = %e.stage, error = %e.error, "aborting: no script");
                Ok(PipelineReport {
                    status: RunStatus::AbortedNoScript {
                        stage: e.stage,
                        reason: e.error.to_string(),
                    },
                    utterances: Vec::new(),
                    artifacts: Artifacts::default(),
                })
            }
        }
    }

    /// Generate personas and then the script. Nothing is persisted.
    pub async fn generate_script(&self, input: &ArticleInput) -> Result<String, ScriptGenerationError> {
        let llm = &self.config.llm;
        let prompts = &self.config.prompts;

        self.emit_event(PipelineEvent::PersonasStart);
        let persona_request = GenerationRequest {
            system: prompts.persona_system.clone(),
            prompt: self.config.persona_prompt(&input.article),
            max_tokens: llm.persona_max_tokens,
            temperature: llm.temperature,
        };
        let personas = self
            .llm_policy
            .call("persona generation", || self.generator.generate(&persona_request))
            .await
            .and_then(|response| {
                Personas::from_response(&response).ok_or(UpstreamError::EmptyResponse)
            })
            .map_err(|error| ScriptGenerationError {
                stage: GenerationStage::Personas,
                error,
            })?;
        info!(json = personas.as_json().is_some(), "personas generated");
        self.emit_event(PipelineEvent::PersonasReady {
            personas: personas.prompt_text(),
        });

        self.emit_event(PipelineEvent::ScriptStart);
        let script_request = GenerationRequest {
            system: prompts.script_system.clone(),
            prompt: self.config.script_prompt(
                &input.article,
                &input.discussion,
                &personas.prompt_text(),
            ),
            max_tokens: llm.script_max_tokens,
            temperature: llm.temperature,
        };
        let script = self
            .llm_policy
            .call("script generation", || self.generator.generate(&script_request))
            .await
            .map(|s| strip_reasoning(&s))
            .and_then(|s| {
                if s.is_empty() {
                    Err(UpstreamError::EmptyResponse)
                } else {
                    Ok(s)
                }
            })
            .map_err(|error| ScriptGenerationError {
                stage: GenerationStage::Script,
                error,
            })?;
        info!(chars = script.len(), "script generated");
        self.emit_event(PipelineEvent::ScriptReady {
            script: script.clone(),
        });

        Ok(script)
    }

    /// Run everything after script generation on existing script text.
    pub async fn run_script(&self, script: &str) -> Result<PipelineReport, PipelineFailure> {
        let mut artifacts = Artifacts::default();

        // Read before the new script overwrites it; reuse is decided per line.
        let previous = if self.config.output.reuse_clips {
            self.store
                .read_script()
                .await
                .map(|text| self.parser.parse(&text))
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        let script_path = self
            .store
            .write_script(script)
            .await
            .map_err(|error| PipelineFailure {
                error,
                artifacts: artifacts.clone(),
            })?;
        artifacts.script_path = Some(script_path.clone());
        self.emit_event(PipelineEvent::ScriptSaved {
            path: script_path.clone(),
        });

        let utterances = self.parser.parse(script);
        if utterances.is_empty() {
            warn!(error = %PodcastError::ParseEmptyResult, "aborting: no dialogue");
            return Ok(PipelineReport {
                status: RunStatus::AbortedNoDialogue {
                    script_path,
                    skipped: Vec::new(),
                },
                utterances,
                artifacts,
            });
        }
        info!(count = utterances.len(), "parsed dialogue");
        self.emit_event(PipelineEvent::DialogueParsed {
            utterances: utterances.clone(),
        });

        let results = self.synthesize_all(&utterances, &previous).await;
        artifacts.clip_paths = results.iter().filter_map(|r| r.clip_path.clone()).collect();

        let mut clips: Vec<AudioClip> = Vec::with_capacity(results.len());
        let mut skipped = Vec::new();
        for result in results {
            match result.outcome {
                SynthesisOutcome::Success(clip) => clips.push(clip),
                SynthesisOutcome::Failure {
                    sequence_index,
                    speaker_label,
                    error,
                } => skipped.push(SkippedUtterance {
                    sequence_index,
                    speaker_label,
                    error,
                }),
            }
        }

        if clips.is_empty() {
            warn!(skipped = skipped.len(), "aborting: every synthesis call failed");
            return Ok(PipelineReport {
                status: RunStatus::AbortedNoDialogue {
                    script_path,
                    skipped,
                },
                utterances,
                artifacts,
            });
        }

        self.emit_event(PipelineEvent::ConcatenationStart { clips: clips.len() });
        let podcast = audio::concatenate(&clips).map_err(|error| PipelineFailure {
            error,
            artifacts: artifacts.clone(),
        })?;

        let podcast_path = self
            .store
            .write_podcast(podcast.file_extension(), podcast.bytes())
            .await
            .map_err(|error| PipelineFailure {
                error,
                artifacts: artifacts.clone(),
            })?;
        artifacts.podcast_path = Some(podcast_path.clone());
        info!(
            path = %podcast_path.display(),
            clips = podcast.clip_indices().len(),
            skipped = skipped.len(),
            "podcast written"
        );
        self.emit_event(PipelineEvent::PodcastSaved {
            path: podcast_path.clone(),
        });

        let status = if skipped.is_empty() {
            RunStatus::Completed { podcast_path }
        } else {
            RunStatus::CompletedWithGaps {
                podcast_path,
                skipped,
            }
        };

        Ok(PipelineReport {
            status,
            utterances,
            artifacts,
        })
    }

    /// Synthesize every utterance, at most `speech.concurrency` at a time.
    ///
    /// Results land in one slot per utterance, so the returned order is the
    /// utterance order no matter which call finishes first.
    async fn synthesize_all(
        &self,
        utterances: &[Utterance],
        previous: &[Utterance],
    ) -> Vec<SynthesisResult> {
        let total = utterances.len();
        let mut slots: Vec<Option<SynthesisResult>> = (0..total).map(|_| None).collect();

        let mut completed = stream::iter(utterances.iter().enumerate())
            .map(|(slot, utterance)| async move {
                let voice = self.voices.resolve(utterance.speaker_label());
                let result = self
                    .synthesizer
                    .synthesize_or_reuse(utterance, voice, previous.get(slot))
                    .await;
                (slot, result)
            })
            .buffer_unordered(self.config.speech.concurrency.max(1));

        while let Some((slot, result)) = completed.next().await {
            self.emit_event(PipelineEvent::UtteranceDone {
                sequence_index: result.outcome.sequence_index(),
                speaker_label: result.outcome.speaker_label().to_string(),
                total,
                error: match &result.outcome {
                    SynthesisOutcome::Failure { error, .. } => Some(error.clone()),
                    SynthesisOutcome::Success(_) => None,
                },
            });
            slots[slot] = Some(result);
        }

        slots
            .into_iter()
            .zip(utterances)
            .map(|(slot, utterance)| {
                slot.unwrap_or_else(|| SynthesisResult {
                    outcome: SynthesisOutcome::Failure {
                        sequence_index: utterance.sequence_index(),
                        speaker_label: utterance.speaker_label().to_string(),
                        error: "no synthesis result collected".to_string(),
                    },
                    clip_path: None,
                })
            })
            .collect()
    }

    /// Emit an event if a callback is registered.
    fn emit_event(&self, event: PipelineEvent) {
        if let Some(ref callback) = self.callback {
            callback(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_config;
    use async_trait::async_trait;
    use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
    use std::collections::VecDeque;
    use std::io::Cursor;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Generator returning queued responses in order.
    struct ScriptedGenerator {
        responses: Mutex<VecDeque<Result<String, UpstreamError>>>,
    }

    impl ScriptedGenerator {
        fn new(responses: Vec<Result<String, UpstreamError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, _request: &GenerationRequest) -> Result<String, UpstreamError> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(UpstreamError::EmptyResponse))
        }
    }

    /// Speech fake producing one-sample WAV clips whose sample value is the
    /// number at the end of the utterance text ("Line 3" -> 3).
    struct WavSpeech {
        fail_on: Vec<usize>,
        mp3_on: Vec<usize>,
        delay: Duration,
        voices: Mutex<Vec<(usize, String)>>,
    }

    impl WavSpeech {
        fn new() -> Self {
            Self {
                fail_on: Vec::new(),
                mp3_on: Vec::new(),
                delay: Duration::ZERO,
                voices: Mutex::new(Vec::new()),
            }
        }
    }

    fn line_number(text: &str) -> usize {
        text.rsplit(' ')
            .next()
            .and_then(|n| n.trim_end_matches('.').parse().ok())
            .unwrap_or(0)
    }

    fn wav_clip(value: i16) -> Vec<u8> {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 24000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            writer.write_sample(value).unwrap();
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[async_trait]
    impl SpeechSynthesizer for WavSpeech {
        async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, UpstreamError> {
            let n = line_number(text);
            self.voices.lock().unwrap().push((n, voice_id.to_string()));
            // Earlier lines finish later, so completion order is reversed.
            tokio::time::sleep(self.delay * (10 - n.min(10)) as u32).await;

            if self.fail_on.contains(&n) {
                return Err(UpstreamError::Transport("connection reset".to_string()));
            }
            if self.mp3_on.contains(&n) {
                return Ok(vec![0xff, 0xfb, 0x90, 0x64, 0, 0]);
            }
            Ok(wav_clip(n as i16))
        }

        fn file_extension(&self) -> &str {
            "wav"
        }
    }

    fn test_config(dir: &Path) -> Config {
        let mut config = default_config();
        config.output.dir = dir.to_path_buf();
        config.llm.max_attempts = 1;
        config.speech.concurrency = 4;
        config
    }

    fn five_line_script() -> String {
        (0..5)
            .map(|i| {
                let label = if i % 2 == 0 { "Host" } else { "Guest" };
                format!("[{}]: \"Line {}\"", label, i)
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn samples(path: &Path) -> Vec<i16> {
        WavReader::open(path)
            .unwrap()
            .into_samples::<i16>()
            .map(Result::unwrap)
            .collect()
    }

    fn pipeline(dir: &Path, speech: WavSpeech) -> PodcastPipeline {
        PodcastPipeline::new(test_config(dir), ScriptedGenerator::new(Vec::new()), Arc::new(speech)).unwrap()
    }

    #[tokio::test]
    async fn test_host_guest_scenario_completes_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let speech = Arc::new(WavSpeech {
            delay: Duration::from_millis(5),
            ..WavSpeech::new()
        });
        let pipeline = PodcastPipeline::new(
            test_config(dir.path()),
            ScriptedGenerator::new(Vec::new()),
            speech.clone(),
        )
        .unwrap();

        let script = "[Host]: \"Hello! 0\"\n[Guest]: \"Hi there. 1\"\n[Host]: \"Great to have you. 2\"";
        let report = pipeline.run_script(script).await.unwrap();

        let podcast_path = dir.path().join("podcast_output.wav");
        assert_eq!(
            report.status,
            RunStatus::Completed {
                podcast_path: podcast_path.clone()
            }
        );
        assert_eq!(report.utterances[1].text(), "Hi there. 1");
        assert_eq!(samples(&podcast_path), vec![0, 1, 2]);
        assert_eq!(report.artifacts.clip_paths.len(), 3);
        assert!(report.artifacts.clip_paths[2].ends_with("output_audio_002_Host.wav"));

        let mut voices = speech.voices.lock().unwrap().clone();
        voices.sort();
        assert_eq!(
            voices,
            vec![
                (0, "alloy".to_string()),
                (1, "nova".to_string()),
                (2, "alloy".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_isolation_reports_gap() {
        let dir = tempfile::tempdir().unwrap();
        let speech = WavSpeech {
            fail_on: vec![2],
            delay: Duration::from_millis(3),
            ..WavSpeech::new()
        };

        let report = pipeline(dir.path(), speech)
            .run_script(&five_line_script())
            .await
            .unwrap();

        assert!(matches!(report.status, RunStatus::CompletedWithGaps { .. }));
        assert_eq!(report.status.skipped_indices(), vec![2]);
        assert_eq!(report.status.skipped()[0].speaker_label, "Host");
        assert_eq!(report.utterances.len(), 5);

        let podcast = report.status.podcast_path().unwrap();
        assert_eq!(samples(podcast), vec![0, 1, 3, 4]);
    }

    #[tokio::test]
    async fn test_total_failure_writes_no_audio() {
        let dir = tempfile::tempdir().unwrap();
        let speech = WavSpeech {
            fail_on: (0..5).collect(),
            ..WavSpeech::new()
        };

        let report = pipeline(dir.path(), speech)
            .run_script(&five_line_script())
            .await
            .unwrap();

        match &report.status {
            RunStatus::AbortedNoDialogue { script_path, .. } => assert!(script_path.exists()),
            other => panic!("unexpected status {:?}", other),
        }
        assert_eq!(report.status.skipped_indices(), vec![0, 1, 2, 3, 4]);
        assert!(report.artifacts.podcast_path.is_none());
        assert!(!dir.path().join("podcast_output.wav").exists());
    }

    #[tokio::test]
    async fn test_script_without_markers_aborts_no_dialogue() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path(), WavSpeech::new());

        for script in ["", "Sorry, I can't write that script."] {
            let report = pipeline.run_script(script).await.unwrap();
            assert!(matches!(
                &report.status,
                RunStatus::AbortedNoDialogue { skipped, .. } if skipped.is_empty()
            ));
            assert!(report.utterances.is_empty());
            assert_eq!(
                std::fs::read_to_string(dir.path().join("podcast_script.txt")).unwrap(),
                script
            );
        }
    }

    #[tokio::test]
    async fn test_run_generates_personas_then_script() {
        let dir = tempfile::tempdir().unwrap();
        let generator = ScriptedGenerator::new(vec![
            Ok("```json\n[{\"name\": \"Dana\", \"role\": \"Host\"}]\n```".to_string()),
            Ok("<think>plan</think>\n[Host]: \"Welcome 0\"\n[Guest]: \"Thanks 1\"".to_string()),
        ]);
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();

        let pipeline = PodcastPipeline::new(test_config(dir.path()), generator, Arc::new(WavSpeech::new()))
            .unwrap()
            .with_callback(Box::new(move |event| {
                let name = match event {
                    PipelineEvent::PersonasStart => "personas",
                    PipelineEvent::ScriptReady { .. } => "script",
                    PipelineEvent::UtteranceDone { .. } => "utterance",
                    PipelineEvent::PodcastSaved { .. } => "saved",
                    _ => return,
                };
                sink.lock().unwrap().push(name);
            }));

        let report = pipeline
            .run(&ArticleInput::new("Markets rallied."))
            .await
            .unwrap();

        assert!(matches!(report.status, RunStatus::Completed { .. }));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("podcast_script.txt")).unwrap(),
            "[Host]: \"Welcome 0\"\n[Guest]: \"Thanks 1\""
        );
        assert_eq!(
            *events.lock().unwrap(),
            vec!["personas", "script", "utterance", "utterance", "saved"]
        );
    }

    #[tokio::test]
    async fn test_generation_failure_aborts_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let generator = ScriptedGenerator::new(vec![Err(UpstreamError::Status {
            status: 401,
            body: "invalid api key".to_string(),
        })]);
        let pipeline =
            PodcastPipeline::new(test_config(dir.path()), generator, Arc::new(WavSpeech::new())).unwrap();

        let report = pipeline.run(&ArticleInput::new("News.")).await.unwrap();

        match report.status {
            RunStatus::AbortedNoScript { stage, reason } => {
                assert_eq!(stage, GenerationStage::Personas);
                assert!(reason.contains("401"));
            }
            other => panic!("unexpected status {:?}", other),
        }
        assert_eq!(report.artifacts, Artifacts::default());
        assert!(!dir.path().join("podcast_script.txt").exists());
    }

    #[tokio::test]
    async fn test_empty_script_response_aborts_no_script() {
        let dir = tempfile::tempdir().unwrap();
        let generator = ScriptedGenerator::new(vec![
            Ok("[]".to_string()),
            Ok("<thinking>nothing to say</thinking>".to_string()),
        ]);
        let pipeline =
            PodcastPipeline::new(test_config(dir.path()), generator, Arc::new(WavSpeech::new())).unwrap();

        let report = pipeline.run(&ArticleInput::new("News.")).await.unwrap();
        assert!(matches!(
            report.status,
            RunStatus::AbortedNoScript {
                stage: GenerationStage::Script,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_format_mismatch_returns_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let speech = WavSpeech {
            mp3_on: vec![3],
            ..WavSpeech::new()
        };

        let failure = pipeline(dir.path(), speech)
            .run_script(&five_line_script())
            .await
            .unwrap_err();

        assert!(matches!(
            failure.error,
            PodcastError::FormatMismatch { index: 3, .. }
        ));
        assert_eq!(
            failure.artifacts.script_path,
            Some(dir.path().join("podcast_script.txt"))
        );
        assert_eq!(failure.artifacts.clip_paths.len(), 5);
        assert!(!dir.path().join("podcast_output.wav").exists());
    }

    #[tokio::test]
    async fn test_podcast_write_failure_returns_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the podcast file should go makes the final write fail.
        std::fs::create_dir(dir.path().join("podcast_output.wav")).unwrap();

        let failure = pipeline(dir.path(), WavSpeech::new())
            .run_script(&five_line_script())
            .await
            .unwrap_err();

        match &failure.error {
            PodcastError::Persistence { path, .. } => {
                assert_eq!(path, &dir.path().join("podcast_output.wav"));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(
            failure.artifacts.script_path,
            Some(dir.path().join("podcast_script.txt"))
        );
        assert_eq!(failure.artifacts.clip_paths.len(), 5);
        assert!(failure.artifacts.clip_paths.iter().all(|p| p.exists()));
        assert!(failure.artifacts.podcast_path.is_none());
    }

    #[tokio::test]
    async fn test_script_write_failure_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("podcast_script.txt")).unwrap();

        let failure = pipeline(dir.path(), WavSpeech::new())
            .run_script(&five_line_script())
            .await
            .unwrap_err();

        assert!(matches!(failure.error, PodcastError::Persistence { .. }));
        assert_eq!(failure.artifacts, Artifacts::default());
    }

    #[tokio::test]
    async fn test_reuse_only_unchanged_lines() {
        let dir = tempfile::tempdir().unwrap();
        let speech = Arc::new(WavSpeech::new());
        let mut config = test_config(dir.path());
        config.output.reuse_clips = true;
        let pipeline =
            PodcastPipeline::new(config, ScriptedGenerator::new(Vec::new()), speech.clone()).unwrap();

        pipeline.run_script(&five_line_script()).await.unwrap();
        assert_eq!(speech.voices.lock().unwrap().len(), 5);

        let edited = five_line_script().replace("\"Line 3\"", "\"Changed 7\"");
        let report = pipeline.run_script(&edited).await.unwrap();

        assert!(matches!(report.status, RunStatus::Completed { .. }));
        let calls = speech.voices.lock().unwrap().clone();
        assert_eq!(calls.len(), 6);
        assert_eq!(calls[5].0, 7);
        assert_eq!(
            samples(report.status.podcast_path().unwrap()),
            vec![0, 1, 2, 7, 4]
        );
    }

    #[tokio::test]
    async fn test_cancelled_run_leaves_no_podcast() {
        let dir = tempfile::tempdir().unwrap();
        let speech = WavSpeech {
            delay: Duration::from_secs(1),
            ..WavSpeech::new()
        };
        let pipeline = pipeline(dir.path(), speech);

        let script = five_line_script();
        let result = tokio::time::timeout(Duration::from_millis(50), pipeline.run_script(&script)).await;

        assert!(result.is_err());
        assert!(!dir.path().join("podcast_output.wav").exists());
    }
}
