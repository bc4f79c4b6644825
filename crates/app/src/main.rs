use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use docqa_core::{
    ApiAuth, CharacterNgramEmbedder, ChunkingConfig, EmbeddingProvider, EndpointConfig,
    FallbackOcr, HttpOcrService, Index, InvalidSelection, LanguageModel, OcrEndpointConfig,
    OcrService, OpenAiChatModel, OpenAiEmbeddings, PdfTextLayer, Pipeline, PipelineConfig,
    QueryOutcome, RetrievalResult, SelectionChannel, SelectionInput, SelectionMode,
    UnconfiguredModel,
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::{signal, task};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

type BoxedPipeline = Pipeline<
    Box<dyn OcrService + Send + Sync>,
    Box<dyn EmbeddingProvider + Send + Sync>,
    Box<dyn LanguageModel + Send + Sync>,
>;

const EXIT_WORDS: [&str; 3] = ["exit", "quit", "sair"];
const PREVIEW_CHARS: usize = 200;

#[derive(Parser)]
#[command(name = "docqa", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    settings: Settings,
}

#[derive(Args)]
struct Settings {
    /// Folder with the scanned documents (pdf, png, jpg, jpeg, tiff).
    #[arg(long, env = "DOCQA_CORPUS_DIR", default_value = "documents")]
    corpus_dir: PathBuf,

    /// Folder holding the index artifacts. Defaults to the corpus folder.
    #[arg(long, env = "DOCQA_INDEX_DIR")]
    index_dir: Option<PathBuf>,

    /// Passage size in characters.
    #[arg(long, default_value = "1000")]
    chunk_size: usize,

    /// Characters shared by consecutive passages.
    #[arg(long, default_value = "200")]
    chunk_overlap: usize,

    /// Passages sent to the embeddings endpoint per request.
    #[arg(long, env = "DOCQA_EMBED_BATCH_SIZE", default_value = "64")]
    embed_batch_size: usize,

    /// Number of candidate passages retrieved per question.
    #[arg(long, default_value = "5")]
    top_k: usize,

    /// OCR service URL. Without it only the text layer of digital PDFs is read.
    #[arg(long, env = "DOCQA_OCR_ENDPOINT")]
    ocr_endpoint: Option<String>,

    /// OCR service key, sent as a bearer token.
    #[arg(long, env = "DOCQA_OCR_API_KEY", hide_env_values = true)]
    ocr_api_key: Option<String>,

    /// Full URL of an OpenAI-compatible embeddings endpoint.
    #[arg(long, env = "DOCQA_EMBEDDINGS_URL")]
    embeddings_url: Option<String>,

    /// Embedding model name; it is recorded in the index.
    #[arg(long, env = "DOCQA_EMBEDDINGS_MODEL", default_value = "text-embedding-ada-002")]
    embeddings_model: String,

    /// Use the offline character-trigram embedder instead of a remote model.
    #[arg(long, default_value_t = false)]
    local_embeddings: bool,

    /// Full URL of an OpenAI-compatible chat completions endpoint.
    #[arg(long, env = "DOCQA_LLM_URL")]
    llm_url: Option<String>,

    /// Chat model or deployment name.
    #[arg(long, env = "DOCQA_LLM_MODEL", default_value = "gpt-4o-mini")]
    llm_model: String,

    /// Sampling temperature for answers.
    #[arg(long, default_value = "0.3")]
    temperature: f32,

    /// Key for the embeddings and chat endpoints.
    #[arg(long, env = "DOCQA_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// `bearer` or `azure` (sends an `api-key` header).
    #[arg(long, env = "DOCQA_AUTH_STYLE", default_value = "bearer")]
    auth_style: String,

    /// Request timeout for every remote call, in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,
}

#[derive(Subcommand)]
enum Command {
    /// Build the index if it is missing or unusable.
    Index,
    /// Delete the index and build it again from the corpus.
    Rebuild,
    /// Print a summary of the current index.
    Stats,
    /// Answer a single question.
    Ask {
        #[arg(long)]
        question: String,
        /// `auto` takes the best match, `interactive` lets you pick one.
        #[arg(long, default_value = "auto")]
        mode: SelectionMode,
    },
    /// Ask questions in a loop until `exit`.
    Chat {
        #[arg(long, default_value = "interactive")]
        mode: SelectionMode,
    },
}

/// Lines from standard input, read on a dedicated thread so that Ctrl-C can
/// cancel a pending prompt. Outside a prompt Ctrl-C still ends the process.
struct Terminal {
    lines: mpsc::UnboundedReceiver<String>,
    interrupts: mpsc::UnboundedReceiver<()>,
    prompting: Arc<AtomicBool>,
}

impl Terminal {
    fn new(
        lines: mpsc::UnboundedReceiver<String>,
        interrupts: mpsc::UnboundedReceiver<()>,
    ) -> Self {
        Self {
            lines,
            interrupts,
            prompting: Arc::new(AtomicBool::new(false)),
        }
    }

    fn spawn() -> Self {
        let (line_sender, lines) = mpsc::unbounded_channel();
        thread::spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line_sender.send(line).is_err() {
                    break;
                }
            }
        });

        let (interrupt_sender, interrupts) = mpsc::unbounded_channel();
        let terminal = Self::new(lines, interrupts);
        let prompting = Arc::clone(&terminal.prompting);
        tokio::spawn(async move {
            while signal::ctrl_c().await.is_ok() {
                if !prompting.load(Ordering::SeqCst) {
                    process::exit(130);
                }
                if interrupt_sender.send(()).is_err() {
                    break;
                }
            }
        });

        terminal
    }

    /// `None` on end of input, a read error or Ctrl-C.
    async fn prompt(&mut self, prompt: &str) -> Option<String> {
        print!("{prompt}");
        io::stdout().flush().ok()?;

        self.prompting.store(true, Ordering::SeqCst);
        let line = tokio::select! {
            line = self.lines.recv() => line.map(|line| line.trim().to_string()),
            Some(()) = self.interrupts.recv() => {
                println!();
                None
            }
        };
        self.prompting.store(false, Ordering::SeqCst);
        line
    }

    /// For synchronous callers running inside the multi-threaded runtime.
    fn prompt_blocking(&mut self, prompt: &str) -> Option<String> {
        let handle = Handle::current();
        task::block_in_place(|| handle.block_on(self.prompt(prompt)))
    }
}

/// Prints the candidates and reads the choice from the terminal.
struct TerminalChannel<'a> {
    terminal: &'a mut Terminal,
}

impl SelectionChannel for TerminalChannel<'_> {
    fn request(&mut self, candidates: &[RetrievalResult]) -> SelectionInput {
        println!("\nFound {} relevant passages:", candidates.len());
        println!("{}", "=".repeat(80));
        for (position, hit) in candidates.iter().enumerate() {
            println!("{}. {}", position + 1, hit.chunk.source_file);
            println!(
                "   chunk {} | type {} | {} chars | score {:.4}",
                hit.chunk.chunk_index, hit.chunk.file_type, hit.chunk.char_len, hit.score
            );
            println!("   {}", hit.chunk.preview(PREVIEW_CHARS));
            println!();
        }

        match self.terminal.prompt_blocking(&format!(
            "Choose a document (1-{}) or 'auto' for the best match: ",
            candidates.len()
        )) {
            Some(line) => SelectionInput::Line(line),
            None => SelectionInput::Closed,
        }
    }

    fn reject(&mut self, error: &InvalidSelection) {
        println!("{error}");
    }
}

fn build_pipeline(settings: &Settings) -> anyhow::Result<BoxedPipeline> {
    let timeout = settings.timeout_secs.map(Duration::from_secs);
    let auth: ApiAuth = settings
        .auth_style
        .parse()
        .map_err(|error| anyhow::anyhow!("{error}"))?;

    let ocr: Box<dyn OcrService + Send + Sync> = match &settings.ocr_endpoint {
        Some(endpoint) => Box::new(FallbackOcr::new(
            PdfTextLayer,
            HttpOcrService::new(OcrEndpointConfig {
                endpoint: endpoint.clone(),
                api_key: settings.ocr_api_key.clone(),
                timeout,
            })?,
        )),
        None => {
            warn!("no OCR endpoint configured, images will be skipped");
            Box::new(PdfTextLayer)
        }
    };

    let embedder: Box<dyn EmbeddingProvider + Send + Sync> = match &settings.embeddings_url {
        Some(url) if !settings.local_embeddings => Box::new(OpenAiEmbeddings::new(EndpointConfig {
            endpoint: url.clone(),
            model: settings.embeddings_model.clone(),
            api_key: settings.api_key.clone(),
            auth,
            timeout,
        })?),
        _ => {
            if !settings.local_embeddings {
                warn!("no embeddings endpoint configured, using local trigram embeddings");
            }
            Box::new(CharacterNgramEmbedder::default())
        }
    };

    let model: Box<dyn LanguageModel + Send + Sync> = match &settings.llm_url {
        Some(url) => Box::new(
            OpenAiChatModel::new(EndpointConfig {
                endpoint: url.clone(),
                model: settings.llm_model.clone(),
                api_key: settings.api_key.clone(),
                auth,
                timeout,
            })?
            .with_temperature(settings.temperature),
        ),
        None => Box::new(UnconfiguredModel),
    };

    let config = PipelineConfig {
        corpus_dir: settings.corpus_dir.clone(),
        index_dir: settings
            .index_dir
            .clone()
            .unwrap_or_else(|| settings.corpus_dir.clone()),
        chunking: ChunkingConfig::new(settings.chunk_size, settings.chunk_overlap)?,
        top_k: settings.top_k,
        embed_batch_size: settings.embed_batch_size,
    };

    Ok(Pipeline::new(config, ocr, embedder, model))
}

async fn answer_once(
    pipeline: &BoxedPipeline,
    terminal: &mut Terminal,
    index: &Index,
    question: &str,
    mode: SelectionMode,
) {
    match pipeline
        .ask(index, question, mode, &mut TerminalChannel { terminal })
        .await
    {
        QueryOutcome::NoMatch => {
            println!("No relevant document found. Try rephrasing the question.");
        }
        QueryOutcome::Answered(answer) => {
            println!("\n{}", "=".repeat(80));
            println!("Question: {}", answer.question);
            println!("Document: {}", answer.source_file);
            println!("Chunk: {}", answer.chunk_index);
            println!("{}", "-".repeat(80));
            println!("{}", answer.text);
            println!("{}", "=".repeat(80));
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "docqa boot"
    );

    let pipeline = build_pipeline(&cli.settings)?;

    match cli.command {
        Command::Index => {
            let index = pipeline.ensure_index().await?;
            println!(
                "{} passages indexed in {}",
                index.len(),
                pipeline.store().dir().display()
            );
        }
        Command::Rebuild => {
            let report = pipeline.rebuild().await?;
            for skipped in &report.skipped_files {
                warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped file");
            }
            println!(
                "{} passages from {} files indexed at {}",
                report.index.len(),
                report.files_indexed.len(),
                Utc::now().to_rfc3339()
            );
        }
        Command::Stats => {
            let stats = pipeline.stats().await?;
            let file_types = stats
                .file_types
                .iter()
                .map(|kind| kind.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            println!("location: {}", pipeline.store().dir().display());
            println!("passages: {}", stats.entry_count);
            println!("files: {}", stats.unique_files);
            println!("file types: {file_types}");
            println!("embedding model: {} ({} dims)", stats.embedding_model, stats.dimensions);
            println!("built at: {}", stats.created_at.to_rfc3339());
        }
        Command::Ask { question, mode } => {
            let index = pipeline.ensure_index().await?;
            let mut terminal = Terminal::spawn();
            answer_once(&pipeline, &mut terminal, &index, &question, mode).await;
        }
        Command::Chat { mode } => {
            let index = pipeline.ensure_index().await?;
            let mut terminal = Terminal::spawn();
            println!("Answers come only from the indexed documents.");
            println!("Type 'exit' to leave.");

            loop {
                let Some(question) = terminal.prompt("\nQuestion: ").await else {
                    break;
                };
                if EXIT_WORDS.contains(&question.to_lowercase().as_str()) {
                    break;
                }
                if question.is_empty() {
                    continue;
                }
                answer_once(&pipeline, &mut terminal, &index, &question, mode).await;
            }
            println!("Bye.");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_core::{choose, Chunk, FileType};

    fn candidates() -> Vec<RetrievalResult> {
        ["invoice.png", "receipt.pdf"]
            .into_iter()
            .enumerate()
            .map(|(rank, file)| RetrievalResult {
                chunk: Chunk::new(file, 0, format!("text of {file}"), FileType::Png, 1),
                score: 0.9 - rank as f32 * 0.1,
                rank,
            })
            .collect()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn ctrl_c_at_selection_takes_the_best_match() {
        let (_line_sender, lines) = mpsc::unbounded_channel();
        let (interrupt_sender, interrupts) = mpsc::unbounded_channel();
        let mut terminal = Terminal::new(lines, interrupts);
        interrupt_sender.send(()).unwrap();

        let results = candidates();
        let chosen = choose(
            &results,
            SelectionMode::Interactive,
            &mut TerminalChannel { terminal: &mut terminal },
        );
        assert_eq!(chosen.chunk.source_file, "invoice.png");
        assert!(!terminal.prompting.load(Ordering::SeqCst));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn end_of_input_at_selection_takes_the_best_match() {
        let (line_sender, lines) = mpsc::unbounded_channel::<String>();
        let (_interrupt_sender, interrupts) = mpsc::unbounded_channel();
        drop(line_sender);
        let mut terminal = Terminal::new(lines, interrupts);

        let results = candidates();
        let chosen = choose(
            &results,
            SelectionMode::Interactive,
            &mut TerminalChannel { terminal: &mut terminal },
        );
        assert_eq!(chosen.chunk.source_file, "invoice.png");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn typed_choice_is_used_after_a_rejected_one() {
        let (line_sender, lines) = mpsc::unbounded_channel();
        let (_interrupt_sender, interrupts) = mpsc::unbounded_channel();
        line_sender.send("7".to_string()).unwrap();
        line_sender.send(" 2 ".to_string()).unwrap();
        let mut terminal = Terminal::new(lines, interrupts);

        let results = candidates();
        let chosen = choose(
            &results,
            SelectionMode::Interactive,
            &mut TerminalChannel { terminal: &mut terminal },
        );
        assert_eq!(chosen.chunk.source_file, "receipt.pdf");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn ctrl_c_at_the_question_prompt_ends_the_chat() {
        let (_line_sender, lines) = mpsc::unbounded_channel();
        let (interrupt_sender, interrupts) = mpsc::unbounded_channel();
        let mut terminal = Terminal::new(lines, interrupts);
        interrupt_sender.send(()).unwrap();

        assert_eq!(terminal.prompt("Question: ").await, None);
    }
}
