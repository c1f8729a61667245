//! Bookmind CLI
//!
//! Command-line driver for one book: token counting, chunking, map-reduce
//! summaries, mind maps, workbooks, and grounded chat.
//! Results go to stdout as JSON; logs go to stderr.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::{BufRead, Read};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use bookmind_lib::{
    count_tokens, layout, Answer, Config, IndexReport, LlmError, MindMap, MiroClient, OpenAiClient,
    Progress, Session, SessionError, SessionInfo,
};

#[derive(Parser)]
#[command(name = "bookmind")]
#[command(about = "Bookmind CLI - Summaries, mind maps, workbooks and chat for books", long_about = None)]
struct Cli {
    /// Config file (overrides $BOOKMIND_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Token counting commands
    Tokens {
        #[command(subcommand)]
        action: TokensAction,
    },
    /// Split a book into token windows
    Chunk {
        /// PDF, text, or markdown file
        file: PathBuf,
        /// Include chunk text in the output
        #[arg(long)]
        full: bool,
    },
    /// Summarize a book with the map-reduce pipeline
    Summarize {
        file: PathBuf,
    },
    /// Summarize a book and draw its mind map
    Mindmap {
        file: PathBuf,
        /// Draw on an existing board instead of creating one
        #[arg(long)]
        board_id: Option<String>,
        /// Print the parsed structure and layout without calling Miro
        #[arg(long)]
        dry_run: bool,
    },
    /// Summarize a book and turn the summary into exercises
    Workbook {
        file: PathBuf,
    },
    /// Ask questions about a book
    Chat {
        file: PathBuf,
        /// Questions to ask in order; reads one question per stdin line when empty
        questions: Vec<String>,
    },
}

#[derive(Subcommand)]
enum TokensAction {
    /// Count tokens in text
    Count {
        /// Text to count (use - for stdin)
        text: String,
        /// Model whose tokenizer to use
        #[arg(long)]
        model: Option<String>,
    },
}

// ============ Output Types ============

#[derive(Serialize)]
struct TokenCountOutput {
    tokens: u32,
    model: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChunkItem {
    index: u32,
    tokens: usize,
    chars: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChunkOutput {
    document: String,
    chunk_count: usize,
    chunks: Vec<ChunkItem>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SummaryOutput {
    session: SessionInfo,
    summary: String,
    completion_calls: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MindMapPreview {
    structure: MindMap,
    nodes: usize,
    layout: serde_json::Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WorkbookOutput {
    workbook: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fallback_model: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatTurnOutput<'a> {
    question: &'a str,
    answer: &'a Answer,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatOutput<'a> {
    index: IndexReport,
    turns: Vec<ChatTurnOutput<'a>>,
}

#[derive(Serialize)]
struct ErrorOutput {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<&'static str>,
}

impl ErrorOutput {
    /// Full error chain, plus the remedy when a language model call failed.
    fn from_error(e: &anyhow::Error) -> Self {
        let hint = e.chain().find_map(|cause| {
            if let Some(session) = cause.downcast_ref::<SessionError>() {
                session.user_message()
            } else {
                cause.downcast_ref::<LlmError>().map(LlmError::user_message)
            }
        });
        Self { error: format!("{:#}", e), hint }
    }
}

// ============ Main ============

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bookmind=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = load_config(cli.config.as_deref()).and_then(|config| match cli.command {
        Commands::Tokens { action } => handle_tokens(&config, action),
        Commands::Chunk { file, full } => handle_chunk(config, &file, full),
        Commands::Summarize { file } => handle_summarize(config, &file),
        Commands::Mindmap { file, board_id, dry_run } => {
            handle_mindmap(config, &file, board_id.as_deref(), dry_run)
        }
        Commands::Workbook { file } => handle_workbook(config, &file),
        Commands::Chat { file, questions } => handle_chat(config, &file, questions),
    });

    match result {
        Ok(json) if json.is_empty() => {}
        Ok(json) => println!("{}", json),
        Err(e) => {
            match serde_json::to_string(&ErrorOutput::from_error(&e)) {
                Ok(json) => println!("{}", json),
                Err(_) => println!("{{\"error\":\"unknown error\"}}"),
            }
            std::process::exit(1);
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => {
            let mut config = Config::from_file(path)?;
            config.apply_env(|key| std::env::var(key).ok());
            config.validate()?;
            Ok(config)
        }
        None => Ok(Config::load()?),
    }
}

fn open_session(config: Config, file: &Path) -> Result<Session> {
    let mut session = Session::new(config);
    session
        .load_file(file)
        .with_context(|| format!("Failed to load {}", file.display()))?;
    Ok(session)
}

fn log_progress(p: Progress) {
    info!(stage = ?p.stage, completed = p.completed, total = p.total, "Progress");
}

// ============ Handlers ============

fn handle_tokens(config: &Config, action: TokensAction) -> Result<String> {
    match action {
        TokensAction::Count { text, model } => {
            let input = if text == "-" {
                let mut buffer = String::new();
                std::io::stdin().read_to_string(&mut buffer)?;
                buffer
            } else {
                text
            };

            let model = model.unwrap_or_else(|| config.openai.completion_model.clone());
            let tokens = count_tokens(&input, &model);
            Ok(serde_json::to_string(&TokenCountOutput { tokens, model })?)
        }
    }
}

fn handle_chunk(config: Config, file: &Path, full: bool) -> Result<String> {
    let mut session = open_session(config, file)?;
    let document = session.document().map(|d| d.name.clone()).unwrap_or_default();

    let chunks: Vec<ChunkItem> = session
        .chunks()?
        .iter()
        .map(|c| ChunkItem {
            index: c.index,
            tokens: c.token_count(),
            chars: c.content.chars().count(),
            content: full.then(|| c.content.clone()),
        })
        .collect();

    let output = ChunkOutput { document, chunk_count: chunks.len(), chunks };
    Ok(serde_json::to_string(&output)?)
}

fn summarize(config: Config, file: &Path) -> Result<(Session, OpenAiClient)> {
    let client = OpenAiClient::from_config(&config)?;
    let mut session = open_session(config, file)?;
    session.summarize(&client, &mut log_progress)?;
    Ok((session, client))
}

fn handle_summarize(config: Config, file: &Path) -> Result<String> {
    let (session, _) = summarize(config, file)?;
    let Some(summary) = session.summary() else {
        bail!("Summary was not produced");
    };

    let output = SummaryOutput {
        session: session.info(),
        summary: summary.text.clone(),
        completion_calls: summary.completion_calls,
    };
    Ok(serde_json::to_string(&output)?)
}

fn handle_mindmap(config: Config, file: &Path, board_id: Option<&str>, dry_run: bool) -> Result<String> {
    // fail on a missing token before paying for the summary
    let miro = if dry_run { None } else { Some(MiroClient::new(&config.miro)?) };

    let (mut session, _) = summarize(config, file)?;

    match miro {
        Some(miro) => {
            let rendered = session.render_mind_map(&miro, board_id)?;
            Ok(serde_json::to_string(rendered)?)
        }
        None => {
            let structure = session.mind_map_structure()?;
            let nodes = layout(&structure);
            let output = MindMapPreview {
                nodes: nodes.len(),
                layout: serde_json::to_value(&nodes)?,
                structure,
            };
            Ok(serde_json::to_string(&output)?)
        }
    }
}

fn handle_workbook(config: Config, file: &Path) -> Result<String> {
    let (mut session, client) = summarize(config, file)?;
    let workbook = session.generate_workbook(&client)?;

    let output = WorkbookOutput {
        workbook: workbook.text.clone(),
        fallback_model: workbook.fallback_model.clone(),
    };
    Ok(serde_json::to_string(&output)?)
}

fn handle_chat(config: Config, file: &Path, questions: Vec<String>) -> Result<String> {
    let client = OpenAiClient::from_config(&config)?;
    let mut session = open_session(config, file)?;
    let report = session.init_chat(&client, &mut log_progress)?;

    if questions.is_empty() {
        // index report first, then one JSON line per answer while stdin stays open
        println!("{}", serde_json::to_string(&report)?);
        for line in std::io::stdin().lock().lines() {
            let line = line?;
            let question = line.trim();
            if question.is_empty() {
                continue;
            }
            let answer = session.ask(question, &client, &client);
            println!("{}", serde_json::to_string(&ChatTurnOutput { question, answer: &answer })?);
        }
        return Ok(String::new());
    }

    let answers: Vec<Answer> = questions.iter().map(|q| session.ask(q, &client, &client)).collect();
    let turns = questions
        .iter()
        .zip(&answers)
        .map(|(question, answer)| ChatTurnOutput { question, answer })
        .collect();

    Ok(serde_json::to_string(&ChatOutput { index: report, turns })?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_error_carries_hint() {
        let err = handle_summarize(Config::default(), Path::new("book.txt")).unwrap_err();
        let output = ErrorOutput::from_error(&err);
        assert_eq!(output.hint, Some(LlmError::MissingApiKey.user_message()));

        let json = serde_json::to_value(&output).unwrap();
        assert!(json["error"].as_str().unwrap().contains("API key"));
        assert_eq!(json["hint"], LlmError::MissingApiKey.user_message());
    }

    #[test]
    fn test_hints_differ_by_remedy() {
        let quota = ErrorOutput::from_error(&anyhow::Error::new(SessionError::Llm(LlmError::QuotaExceeded)));
        let model = ErrorOutput::from_error(
            &anyhow::Error::new(LlmError::ModelUnauthorized { model: "gpt-4".to_string() })
                .context("Workbook failed"),
        );
        assert_eq!(quota.hint, Some(LlmError::QuotaExceeded.user_message()));
        assert_eq!(model.hint, Some(LlmError::ModelUnauthorized { model: String::new() }.user_message()));
        assert_ne!(quota.hint, model.hint);
    }

    #[test]
    fn test_other_errors_have_no_hint() {
        let err = handle_chunk(Config::default(), Path::new("missing-book.txt"), false).unwrap_err();
        let output = ErrorOutput::from_error(&err);
        assert!(output.hint.is_none());
        assert!(output.error.contains("missing-book.txt"));
    }
}
