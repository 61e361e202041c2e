//! PodcastGen Core Library
//!
//! Turns a news article into a two-speaker podcast: persona and script
//! generation, dialogue parsing, per-utterance speech synthesis, and
//! concatenation of the clips into one audio file.

pub mod article;
pub mod audio;
pub mod config;
pub mod error;
pub mod generation;
pub mod pipeline;
pub mod policy;
pub mod script;
pub mod speech;
pub mod store;
pub mod synthesis;
pub mod voice;

pub use article::ArticleInput;
pub use audio::{AudioClip, AudioEncoding, PodcastAudio, concatenate};
pub use config::{Config, SpeechProvider, default_config};
pub use error::{PodcastError, UpstreamError};
pub use generation::{GenerationRequest, OpenAiGenerator, TextGenerator};
pub use pipeline::{
    Artifacts, GenerationStage, PipelineCallback, PipelineEvent, PipelineFailure, PipelineReport,
    PodcastPipeline, RunStatus, SkippedUtterance,
};
pub use policy::{CallPolicy, RetryPolicy};
pub use script::{ScriptParser, Utterance, parse};
pub use speech::SpeechSynthesizer;
pub use store::OutputStore;
pub use synthesis::{SynthesisOutcome, UtteranceSynthesizer};
pub use voice::SpeakerVoiceMap;
