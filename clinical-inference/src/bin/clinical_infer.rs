//! Clinical Inference CLI
//!
//! Runs the inference service from the command line against the local
//! models directory.
//!
//! Usage:
//!   clinical-infer generate --role triage_edge "58F, syncope at rest"
//!   clinical-infer classify --role intake_chat --choice Yes --choice No "Is the patient febrile?"
//!   clinical-infer transcribe --role medasr visit.wav
//!   clinical-infer models
//!
//! Results are printed to stdout as JSON; logs go to stderr and, when
//! `logging.log_dir` is configured, to a daily rolling file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use clinical_inference::{GenerationRequest, InferenceConfig, InferenceService};
use error_common::{log_error, RustCareError};
use logger_redacted::init_logging;
use serde_json::json;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "clinical-infer")]
#[command(about = "Run local clinical models: generation, choice scoring and transcription")]
struct Args {
    /// YAML configuration file, layered under CLINICAL_* environment variables
    #[arg(long, short, env = "CLINICAL_CONFIG")]
    config: Option<PathBuf>,

    /// Debug-level logging
    #[arg(long, short)]
    verbose: bool,

    /// JSON log lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate text for a prompt
    Generate {
        #[arg(long, default_value = "triage_edge")]
        role: String,
        /// Cap on new tokens (defaults to generation.default_max_new_tokens)
        #[arg(long)]
        max_tokens: Option<usize>,
        prompt: String,
    },
    /// Score candidate answers
    Classify {
        #[arg(long, default_value = "intake_chat")]
        role: String,
        /// Candidate label; repeat for each choice
        #[arg(long = "choice", required = true)]
        choices: Vec<String>,
        prompt: String,
    },
    /// Transcribe an audio file
    Transcribe {
        #[arg(long, default_value = "medasr")]
        role: String,
        /// Print which ladder stages ran
        #[arg(long)]
        trace: bool,
        audio: PathBuf,
    },
    /// List registered models and whether their artifacts exist
    Models,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Generate { .. } => "generate",
            Command::Classify { .. } => "classify",
            Command::Transcribe { .. } => "transcribe",
            Command::Models => "models",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config = InferenceConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if args.verbose {
        config.logging.log_level = "debug".to_string();
    }
    if args.json_logs {
        config.logging.json = true;
    }
    // Flushes the file writer on drop
    let _log_guard = init_logging(&config.logging).context("Failed to initialize logging")?;

    let service = Arc::new(InferenceService::new(config)?);
    info!(command = args.command.name(), "clinical-infer started");

    let output = match args.command {
        Command::Generate {
            role,
            max_tokens,
            prompt,
        } => {
            let mut request = GenerationRequest::new(prompt);
            if let Some(max_tokens) = max_tokens {
                request = request.with_max_output_tokens(max_tokens);
            }
            let text = service.generate_async(role.clone(), request).await;
            json!({ "role": role, "text": text })
        }
        Command::Classify { role, choices, prompt } => {
            let scores = service
                .compute_choice_probabilities_async(role.clone(), prompt, choices)
                .await;
            json!({ "role": role, "probabilities": scores })
        }
        Command::Transcribe { role, trace, audio } => {
            let worker = Arc::clone(&service);
            let report = tokio::task::spawn_blocking(move || worker.transcribe_with_report(&role, &audio))
                .await
                .context("Transcription worker aborted")?;
            match report {
                Ok(report) if trace => serde_json::to_value(report)?,
                Ok(report) => serde_json::to_value(report.result)?,
                Err(e) => {
                    let err = RustCareError::from(e);
                    log_error("transcribe", &err);
                    return Err(err.into());
                }
            }
        }
        Command::Models => {
            let models: Vec<_> = service
                .registry()
                .descriptors()
                .map(|d| {
                    json!({
                        "role": d.role,
                        "location": d.location,
                        "kind": d.artifact_kind,
                        "available": d.is_present(),
                    })
                })
                .collect();
            json!({ "models": models })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
