//! `histnote`: history notes in, study documents out.
//!
//! Every command prints one JSON envelope on stdout: `{"data": ...}` on
//! success, `{"message": ...}` with exit code 1 on failure. `analyze` puts the
//! document under `data` and adds `ocr_text` and `analyzed_at` beside it.
//! Logs go to stderr.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures::future::join_all;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use histnote_core::{schema::validate_history, HistoryDocument};
use histnote_runtime::{
    suggest_videos, Analysis, NoteImage, NotesInput, Orchestrator, ProviderKind, RuntimeConfig,
    TesseractOcr, TutorAnswer,
};

const DEFAULT_LOG_FILTER: &str = "histnote=info,histnote_runtime=info";

#[derive(Parser)]
#[command(name = "histnote")]
#[command(about = "Turn photos or OCR text of history notes into a validated study document")]
#[command(version)]
struct Cli {
    /// YAML config file; environment variables fill whatever it leaves out
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// LLM backend to use (openai or gemini), overriding the config
    #[arg(long, global = true)]
    provider: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a history document from OCR text or note photos
    Analyze {
        /// File with OCR text ('-' for stdin)
        #[arg(long, conflicts_with = "image", required_unless_present = "image")]
        text: Option<PathBuf>,

        /// JPEG or PNG photo of notes, repeatable
        #[arg(long)]
        image: Vec<PathBuf>,

        /// tesseract binary used when photos are OCR'd locally
        #[arg(long, default_value = "tesseract")]
        tesseract: String,
    },

    /// Ask a question about a document
    Ask {
        #[arg(long)]
        document: PathBuf,

        #[arg(long)]
        question: String,
    },

    /// Grade answers to the document's why-questions
    GradeWhy {
        #[arg(long)]
        document: PathBuf,

        /// JSON object mapping question index to answer, e.g. {"0": "..."}
        #[arg(long)]
        answers: PathBuf,
    },

    /// Grade an answer to one of the mini test's short-answer questions
    GradeShort {
        #[arg(long)]
        document: PathBuf,

        #[arg(long, default_value_t = 0)]
        index: usize,

        #[arg(long)]
        answer: String,
    },

    /// Bloom-level tutor questions and feedback
    Tutor {
        #[command(subcommand)]
        mode: TutorMode,
    },

    /// Find error patterns in an essay
    Essay {
        #[arg(long)]
        document: PathBuf,

        /// File containing the essay ('-' for stdin)
        #[arg(long)]
        essay: PathBuf,
    },

    /// Compare the document's event with another event
    Compare {
        #[arg(long)]
        document: PathBuf,

        #[arg(long)]
        other: String,
    },

    /// Suggest video searches for knowledge gaps
    Videos {
        #[arg(long)]
        document: PathBuf,

        /// Topic to cover, repeatable
        #[arg(long)]
        gap: Vec<String>,
    },
}

#[derive(Subcommand)]
enum TutorMode {
    /// One question per Bloom level
    Questions {
        #[arg(long)]
        document: PathBuf,
    },

    /// Feedback on answers to tutor questions
    Feedback {
        #[arg(long)]
        document: PathBuf,

        /// JSON array of {"level", "question", "answer"}
        #[arg(long)]
        answers: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(envelope) => {
            println!("{}", envelope);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "command failed");
            println!("{}", json!({ "message": format!("{e:#}") }));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<Value> {
    let Cli {
        config,
        provider,
        command,
    } = cli;
    let orchestrator = || build_orchestrator(config.as_deref(), provider.as_deref());

    match command {
        Commands::Analyze {
            text,
            image,
            tesseract,
        } => {
            let orchestrator = orchestrator()?;
            let analysis = match text {
                Some(path) => {
                    let ocr_text = read_text(&path).await?;
                    orchestrator
                        .produce_history_document(NotesInput::OcrText(ocr_text))
                        .await?
                }
                None => {
                    let images = read_images(&image).await?;
                    let ocr = TesseractOcr::new(tesseract, "vie+eng");
                    orchestrator.analyze_images(images, &ocr).await?
                }
            };
            Ok(analysis_envelope(analysis))
        }
        Commands::Ask { document, question } => {
            let doc = load_document(&document).await?;
            let answer = orchestrator()?.chat_answer(&doc, &question).await?;
            Ok(json!({ "data": { "answer": answer } }))
        }
        Commands::GradeWhy { document, answers } => {
            let doc = load_document(&document).await?;
            let answers: BTreeMap<usize, String> = read_json(&answers).await?;
            to_data(
                orchestrator()?
                    .grade_why_questions(&doc.why_questions, &answers)
                    .await?,
            )
        }
        Commands::GradeShort {
            document,
            index,
            answer,
        } => {
            let doc = load_document(&document).await?;
            to_data(
                orchestrator()?
                    .grade_mini_test_answer(&doc.mini_test, index, &answer)
                    .await?,
            )
        }
        Commands::Tutor { mode } => match mode {
            TutorMode::Questions { document } => {
                let doc = load_document(&document).await?;
                to_data(orchestrator()?.tutor_questions(&doc).await?)
            }
            TutorMode::Feedback { document, answers } => {
                let doc = load_document(&document).await?;
                let answers: Vec<TutorAnswer> = read_json(&answers).await?;
                to_data(orchestrator()?.tutor_feedback(&doc, &answers).await?)
            }
        },
        Commands::Essay { document, essay } => {
            let doc = load_document(&document).await?;
            let essay = read_text(&essay).await?;
            to_data(orchestrator()?.essay_feedback(&doc, &essay).await?)
        }
        Commands::Compare { document, other } => {
            let doc = load_document(&document).await?;
            to_data(orchestrator()?.compare_events(&doc, &other).await?)
        }
        // No model call, so no provider or credentials needed.
        Commands::Videos { document, gap } => {
            let doc = load_document(&document).await?;
            to_data(suggest_videos(&doc, &gap))
        }
    }
}

fn build_orchestrator(config: Option<&Path>, provider: Option<&str>) -> Result<Orchestrator> {
    let mut runtime_config = match config {
        Some(path) => RuntimeConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => RuntimeConfig::from_env()?,
    };

    if let Some(name) = provider {
        runtime_config = runtime_config.with_provider(name.parse::<ProviderKind>()?);
    }

    let orchestrator = Orchestrator::from_config(runtime_config)?;
    info!(
        provider = orchestrator.provider().name(),
        model = orchestrator.provider().default_model(),
        "provider ready"
    );
    Ok(orchestrator)
}

fn analysis_envelope(analysis: Analysis) -> Value {
    json!({
        "data": analysis.document,
        "ocr_text": analysis.ocr_text,
        "analyzed_at": analysis.analyzed_at,
    })
}

fn to_data<T: Serialize>(value: T) -> Result<Value> {
    Ok(json!({ "data": serde_json::to_value(value)? }))
}

async fn read_text(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        tokio::io::AsyncReadExt::read_to_string(&mut tokio::io::stdin(), &mut buf).await?;
        return Ok(buf);
    }
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = read_text(path).await?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))
}

/// Reads the photos concurrently and checks format and size.
async fn read_images(paths: &[PathBuf]) -> Result<Vec<NoteImage>> {
    if paths.is_empty() {
        bail!("No image given");
    }

    let reads = join_all(paths.iter().map(|path| async move {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        NoteImage::from_bytes(bytes).with_context(|| format!("Rejected {}", path.display()))
    }))
    .await;

    reads.into_iter().collect()
}

/// Loads a document file, accepting either a bare document or the output of
/// `histnote analyze`.
async fn load_document(path: &Path) -> Result<HistoryDocument> {
    let value: Value = read_json(path).await?;
    document_from_value(value).with_context(|| format!("Invalid document in {}", path.display()))
}

fn document_from_value(mut value: Value) -> Result<HistoryDocument> {
    if let Some(inner) = value.get_mut("data") {
        value = inner.take();
    }
    Ok(validate_history(value)?)
}
