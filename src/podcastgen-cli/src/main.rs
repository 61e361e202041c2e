//! PodcastGen CLI - AI Podcast Generator
//!
//! Turns a news article into a two-speaker podcast using an OpenAI-compatible
//! chat API for the script and a speech service for the voices.

use clap::{ArgAction, Parser};
use colored::Colorize;
use podcastgen_core::{
    ArticleInput, Artifacts, Config, OpenAiGenerator, PipelineEvent, PipelineFailure,
    PipelineReport, PodcastError, PodcastPipeline, RunStatus, SpeechProvider, default_config,
    speech,
};
use std::env;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Exit code for runs that ended without a podcast.
const EXIT_ABORTED: u8 = 2;
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(
    name = "podcastgen",
    version,
    about = "AI Podcast Generator - Turn an article into a two-host podcast",
    long_about = "Generates speaker personas and a dialogue script from an article, voices every line with a speech service, and joins the clips into one audio file."
)]
struct Cli {
    /// Article text file
    #[arg(value_name = "ARTICLE", default_value = "input_article.txt")]
    article: PathBuf,

    /// Discussion summary woven into the script (optional)
    #[arg(long, value_name = "PATH", default_value = "chat_summary.txt")]
    discussion: PathBuf,

    /// Configuration file (TOML)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory for the script, clips and podcast
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Speech provider: openai, elevenlabs or kokoro
    #[arg(short, long, value_name = "PROVIDER")]
    provider: Option<String>,

    /// Model used for personas and script
    #[arg(short, long, value_name = "MODEL")]
    model: Option<String>,

    /// Maximum speech calls in flight
    #[arg(long, value_name = "N")]
    concurrency: Option<usize>,

    /// Skip generation and voice an existing script
    #[arg(long, value_name = "PATH", conflicts_with = "script_only")]
    script: Option<PathBuf>,

    /// Generate and save the script without synthesizing audio
    #[arg(long)]
    script_only: bool,

    /// Reuse clips left by a previous run for lines unchanged since the
    /// last saved script (voice changes are not detected)
    #[arg(long)]
    reuse_clips: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize logging with the given verbosity level.
fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "podcastgen={level},podcastgen_core={level},{}",
            if verbosity >= 3 { "debug" } else { "warn" }
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbosity >= 2)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config = load_config(&cli)?;

    // Get API configuration from environment
    let api_base = config
        .llm
        .api_base
        .clone()
        .or_else(|| env::var("OPENAI_API_BASE").ok())
        .or_else(|| env::var("OPENAI_BASE_URL").ok())
        .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

    let api_key = env::var("OPENAI_API_KEY").unwrap_or_else(|_| {
        eprintln!(
            "{}",
            "Warning: OPENAI_API_KEY not set. API calls may fail.".yellow()
        );
        String::new()
    });

    let elevenlabs_key = env::var("ELEVEN_LABS_API_KEY")
        .or_else(|_| env::var("ELEVENLABS_API_KEY"))
        .ok();

    let generator = OpenAiGenerator::new(
        &api_base,
        &api_key,
        config.llm.model.clone(),
        Duration::from_secs(config.llm.timeout_secs),
    )?;
    let synthesizer =
        speech::from_config(&config.speech, &api_base, &api_key, elevenlabs_key.as_deref()).await?;

    print_header(&cli, &config);

    let pipeline = PodcastPipeline::new(config, Arc::new(generator), Arc::from(synthesizer))?
        .with_callback(create_console_callback());

    if cli.script_only {
        return run_script_only(&pipeline, &cli).await;
    }

    let result = match until_interrupted(execute(&pipeline, &cli)).await {
        Some(result) => result,
        None => return Ok(interrupted()),
    };

    Ok(match result {
        Ok(report) => report_status(&report),
        Err(failure) => report_failure(&failure),
    })
}

/// Load the config file (or defaults) and apply command-line overrides.
fn load_config(cli: &Cli) -> Result<Config, PodcastError> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => default_config(),
    };

    if let Some(dir) = &cli.output_dir {
        config.output.dir = dir.clone();
    }
    if let Some(provider) = &cli.provider {
        config.speech.provider = provider.parse::<SpeechProvider>()?;
    }
    if let Some(model) = &cli.model {
        config.llm.model = model.clone();
    }
    if let Some(concurrency) = cli.concurrency {
        config.speech.concurrency = concurrency;
    }
    if cli.reuse_clips {
        config.output.reuse_clips = true;
    }

    config.validate()?;
    Ok(config)
}

/// Run the pipeline from the article, or from `--script` when given.
async fn execute(pipeline: &PodcastPipeline, cli: &Cli) -> Result<PipelineReport, PipelineFailure> {
    let failed = |error: PodcastError| PipelineFailure {
        error,
        artifacts: Artifacts::default(),
    };

    match &cli.script {
        Some(path) => {
            let script = tokio::fs::read_to_string(path).await.map_err(|e| {
                failed(PodcastError::InputError(format!(
                    "Failed to read script '{}': {}",
                    path.display(),
                    e
                )))
            })?;
            pipeline.run_script(&script).await
        }
        None => {
            let input = ArticleInput::load(&cli.article, Some(&cli.discussion))
                .await
                .map_err(failed)?;
            pipeline.run(&input).await
        }
    }
}

async fn run_script_only(
    pipeline: &PodcastPipeline,
    cli: &Cli,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let input = ArticleInput::load(&cli.article, Some(&cli.discussion)).await?;

    let generated = match until_interrupted(pipeline.generate_script(&input)).await {
        Some(generated) => generated,
        None => return Ok(interrupted()),
    };

    match generated {
        Ok(script) => {
            let path = pipeline.store().write_script(&script).await?;
            print_result_banner("Script ready.", Some(&path));
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("{} {}", "Aborted:".red().bold(), e);
            Ok(ExitCode::from(EXIT_ABORTED))
        }
    }
}

/// Await `work`, giving up if Ctrl-C arrives first.
async fn until_interrupted<F: Future>(work: F) -> Option<F::Output> {
    tokio::select! {
        output = work => Some(output),
        _ = tokio::signal::ctrl_c() => None,
    }
}

fn interrupted() -> ExitCode {
    eprintln!();
    eprintln!(
        "{}",
        "Interrupted. Clips already written are kept; no podcast was produced.".yellow()
    );
    ExitCode::from(EXIT_INTERRUPTED)
}

fn print_header(cli: &Cli, config: &Config) {
    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!(
        "{}",
        format!("  {} - {}", "PodcastGen".bold(), config.speech.provider)
            .bright_blue()
            .bold()
    );
    println!("{}", "═".repeat(70).bright_blue());
    println!();
    match &cli.script {
        Some(path) => println!("{} {}", "Script:".bold(), path.display().to_string().bright_white()),
        None => println!("{} {}", "Article:".bold(), cli.article.display().to_string().bright_white()),
    }
    println!("{} {}", "Model:".bold(), config.llm.model.dimmed());
    println!("{}", "Speakers:".bold());
    let voices = config.voice_map();
    for (i, label) in config.speakers.labels.iter().enumerate() {
        println!(
            "  {}. {} - voice {}",
            i + 1,
            label.bright_cyan(),
            voices.resolve(label).yellow()
        );
    }
    println!("{} {}", "Output:".bold(), config.output.dir.display().to_string().dimmed());
    println!();
    println!("{}", "─".repeat(70).dimmed());
}

/// Print how the run ended and pick the exit code.
fn report_status(report: &PipelineReport) -> ExitCode {
    match &report.status {
        RunStatus::Completed { podcast_path } => {
            print_result_banner("Podcast complete.", Some(podcast_path));
            ExitCode::SUCCESS
        }
        RunStatus::CompletedWithGaps {
            podcast_path,
            skipped,
        } => {
            for s in skipped {
                eprintln!(
                    "{} utterance {} ({}) skipped: {}",
                    "Warning:".yellow().bold(),
                    s.sequence_index,
                    s.speaker_label,
                    s.error
                );
            }
            print_result_banner(
                &format!(
                    "Podcast complete with {} of {} utterances missing.",
                    skipped.len(),
                    report.utterances.len()
                ),
                Some(podcast_path),
            );
            ExitCode::SUCCESS
        }
        RunStatus::AbortedNoScript { stage, reason } => {
            eprintln!(
                "{} {} generation failed: {}",
                "Aborted:".red().bold(),
                stage,
                reason
            );
            ExitCode::from(EXIT_ABORTED)
        }
        RunStatus::AbortedNoDialogue {
            script_path,
            skipped,
        } => {
            if skipped.is_empty() {
                eprintln!(
                    "{} no dialogue found in the script.",
                    "Aborted:".red().bold()
                );
            } else {
                eprintln!(
                    "{} all {} utterances failed to synthesize.",
                    "Aborted:".red().bold(),
                    skipped.len()
                );
            }
            eprintln!("  Script kept at {}", script_path.display());
            ExitCode::from(EXIT_ABORTED)
        }
    }
}

fn report_failure(failure: &PipelineFailure) -> ExitCode {
    eprintln!("{} {}", "Error:".red().bold(), failure.error);
    if let Some(path) = &failure.artifacts.script_path {
        eprintln!("  Script kept at {}", path.display());
    }
    if !failure.artifacts.clip_paths.is_empty() {
        eprintln!(
            "  {} clips kept in {}",
            failure.artifacts.clip_paths.len(),
            failure.artifacts.clip_paths[0]
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .display()
        );
    }
    ExitCode::FAILURE
}

fn print_result_banner(message: &str, path: Option<&PathBuf>) {
    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!("{}", format!("  {}", message).bright_green().bold());
    if let Some(path) = path {
        println!("  {}", path.display().to_string().bright_white());
    }
    println!("{}", "═".repeat(70).bright_blue());
    println!();
}

/// Create a callback that prints pipeline events to the console.
fn create_console_callback() -> Box<dyn Fn(PipelineEvent) + Send + Sync> {
    Box::new(move |event| match event {
        PipelineEvent::PersonasStart => {
            println!("{} {}", "▶".bright_cyan(), "Creating personas...".bright_cyan());
        }
        PipelineEvent::PersonasReady { personas } => {
            for line in personas.lines().take(12) {
                println!("  {}", line.dimmed());
            }
            println!();
        }
        PipelineEvent::ScriptStart => {
            println!("{} {}", "▶".bright_cyan(), "Writing script...".bright_cyan());
        }
        PipelineEvent::ScriptReady { script } => {
            println!("  {} characters", script.len().to_string().yellow());
        }
        PipelineEvent::ScriptSaved { path } => {
            println!("  Script saved to {}", path.display().to_string().dimmed());
            println!();
        }
        PipelineEvent::DialogueParsed { utterances } => {
            println!("{}", "─".repeat(70).dimmed());
            for u in &utterances {
                println!("{}", u.speaker_label().bright_cyan().bold());
                // Word wrap and indent the content
                let wrapped = textwrap(u.text(), 66);
                for line in wrapped.lines() {
                    println!("  {}", line);
                }
            }
            println!("{}", "─".repeat(70).dimmed());
            println!();
            println!("{} {}", "▶".bright_cyan(), "Synthesizing speech...".bright_cyan());
        }
        PipelineEvent::UtteranceDone {
            sequence_index,
            speaker_label,
            total,
            error,
        } => {
            let position = format!("[{:>3}/{}]", sequence_index + 1, total).dimmed();
            match error {
                None => println!("  {} {} {}", position, "✓".green(), speaker_label),
                Some(e) => println!(
                    "  {} {} {} {}",
                    position,
                    "✗".red(),
                    speaker_label,
                    e.red()
                ),
            }
        }
        PipelineEvent::ConcatenationStart { clips } => {
            println!();
            println!(
                "{} {}",
                "▶".bright_cyan(),
                format!("Joining {} clips...", clips).bright_cyan()
            );
        }
        PipelineEvent::PodcastSaved { .. } => {
            // Handled in main
        }
    })
}

/// Simple text wrapping function.
fn textwrap(text: &str, width: usize) -> String {
    let mut result = String::new();
    let mut current_line_len = 0;

    for word in text.split_whitespace() {
        if current_line_len + word.len() + 1 > width && current_line_len > 0 {
            result.push('\n');
            current_line_len = 0;
        }
        if current_line_len > 0 {
            result.push(' ');
            current_line_len += 1;
        }
        result.push_str(word);
        current_line_len += word.len();
    }

    result
}
