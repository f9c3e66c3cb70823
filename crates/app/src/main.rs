use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use ecoreport_core::{
    preview_path_best_effort, reconcile_stuck_reports, CharacterNgramEmbedder, Chunker,
    ChunkingConfig, Embedder, EmbeddingConfig, IngestionOrchestrator, LopdfExtractor,
    OpenAiEmbedder, SearchQuery, SimilaritySearch, SupabaseStore,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum EmbedderKind {
    /// OpenAI-compatible `/embeddings` endpoint.
    Openai,
    /// Offline trigram hashing; vectors are not comparable with OpenAI ones.
    Ngram,
}

#[derive(Parser)]
#[command(name = "ecoreport", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Supabase project URL
    #[arg(long, env = "SUPABASE_URL", global = true)]
    supabase_url: Option<String>,

    /// Supabase service role key
    #[arg(long, env = "SUPABASE_SERVICE_ROLE_KEY", hide_env_values = true, global = true)]
    supabase_key: Option<String>,

    /// Storage bucket holding uploaded reports
    #[arg(long, env = "SUPABASE_BUCKET", default_value = "reports", global = true)]
    bucket: String,

    /// Embedding backend
    #[arg(
        long,
        env = "EMBEDDER",
        value_enum,
        default_value_t = EmbedderKind::Openai,
        global = true
    )]
    embedder: EmbedderKind,

    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    openai_api_key: Option<String>,

    /// OpenAI-compatible API base URL
    #[arg(
        long,
        env = "OPENAI_BASE_URL",
        default_value = "https://api.openai.com/v1",
        global = true
    )]
    openai_base_url: String,

    /// Embedding model name
    #[arg(long, env = "EMBEDDING_MODEL", default_value = "text-embedding-3-small", global = true)]
    embedding_model: String,

    /// Embedding vector dimensions
    #[arg(long, env = "EMBEDDING_DIMENSIONS", default_value = "1536", global = true)]
    embedding_dimensions: usize,

    /// Characters of chunk text sent to the embedding model
    #[arg(long, env = "EMBEDDING_MAX_INPUT_CHARS", default_value = "8000", global = true)]
    embedding_max_input_chars: usize,

    /// Target chunk size in characters
    #[arg(long, env = "CHUNK_SIZE", default_value = "1000", global = true)]
    chunk_size: usize,

    /// Characters shared by consecutive chunks
    #[arg(long, env = "CHUNK_OVERLAP", default_value = "200", global = true)]
    chunk_overlap: usize,

    /// Minimum window fraction kept when snapping to a sentence break
    #[arg(long, env = "CHUNK_MIN_BREAK_RATIO", default_value = "0.7", global = true)]
    chunk_min_break_ratio: f64,
}

#[derive(Subcommand)]
enum Command {
    /// Extract, chunk, embed, and store one uploaded report.
    Process {
        /// Report id in the reports table.
        #[arg(long)]
        report_id: String,
    },
    /// Rank stored chunks by similarity to a query.
    Search {
        /// Search query
        #[arg(long)]
        query: String,
        /// Case-insensitive ecosystem substring filter.
        #[arg(long)]
        ecosystem: Option<String>,
        /// Exact region filter.
        #[arg(long)]
        region: Option<String>,
        /// Number of results to return.
        #[arg(long, default_value = "10")]
        limit: usize,
        /// Minimum similarity for a result.
        #[arg(long, default_value = "0.7")]
        threshold: f64,
    },
    /// Extract and chunk local PDFs without touching storage or embeddings.
    Preview {
        /// A PDF file or a folder searched recursively.
        #[arg(long)]
        path: String,
        /// Print each chunk's text as well as its label and offsets.
        #[arg(long, default_value_t = false)]
        show_text: bool,
    },
    /// Mark reports stuck in processing as failed.
    Reconcile {
        /// Only reports untouched for this many minutes are affected.
        #[arg(long, default_value = "30")]
        older_than_minutes: i64,
        /// List the affected reports without changing them.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
}

impl Cli {
    fn chunking(&self) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size: self.chunk_size,
            overlap: self.chunk_overlap,
            min_break_ratio: self.chunk_min_break_ratio,
        }
    }

    fn supabase(&self) -> anyhow::Result<Arc<SupabaseStore>> {
        let (Some(url), Some(key)) = (&self.supabase_url, &self.supabase_key) else {
            bail!("SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY are required for this command");
        };
        Ok(Arc::new(SupabaseStore::new(url, key.clone(), self.bucket.clone())?))
    }

    fn embedder(&self) -> anyhow::Result<Arc<dyn Embedder>> {
        match self.embedder {
            EmbedderKind::Ngram => Ok(Arc::new(CharacterNgramEmbedder::default())),
            EmbedderKind::Openai => {
                let api_key = self
                    .openai_api_key
                    .clone()
                    .context("OPENAI_API_KEY is required for the openai embedder")?;
                let config = EmbeddingConfig {
                    base_url: self.openai_base_url.clone(),
                    model: self.embedding_model.clone(),
                    dimensions: self.embedding_dimensions,
                    max_input_chars: self.embedding_max_input_chars,
                    timeout: Duration::from_secs(30),
                    ..EmbeddingConfig::openai(api_key)
                };
                Ok(Arc::new(OpenAiEmbedder::new(config)?))
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "ecoreport boot"
    );

    match &cli.command {
        Command::Process { report_id } => {
            let store = cli.supabase()?;
            let orchestrator = IngestionOrchestrator::new(
                store.clone(),
                store,
                cli.embedder()?,
                cli.chunking(),
            )?;

            let summary = orchestrator.process_report(report_id).await?;
            if summary.failed_embeddings > 0 {
                warn!(
                    report_id = %summary.report_id,
                    failed = summary.failed_embeddings,
                    "some chunks were stored without embeddings"
                );
            }

            println!(
                "report {} completed: {} pages, {} words, {} chunks ({} embedded) at {}",
                summary.report_id,
                summary.page_count,
                summary.word_count,
                summary.chunk_count,
                summary.embedded_count,
                Utc::now().to_rfc3339()
            );
        }
        Command::Search {
            query,
            ecosystem,
            region,
            limit,
            threshold,
        } => {
            let search = SimilaritySearch::new(cli.supabase()?, cli.embedder()?);
            let mut search_query = SearchQuery::new(query.clone())
                .with_limit(*limit)
                .with_threshold(*threshold);
            search_query.ecosystem = ecosystem.clone();
            search_query.region = region.clone();

            let results = search.search(&search_query).await?;

            println!("query: {}", search_query.text);
            if results.is_empty() {
                println!("no chunks above similarity {threshold:.2}");
            }
            for result in results {
                println!(
                    "[{:.4}] {} ({} / {}) chunk={} section={}",
                    result.similarity,
                    result.report.title,
                    result.report.ecosystem,
                    result.report.region,
                    result.chunk.chunk_index,
                    result.chunk.section_type
                );
                println!("  {}", result.chunk.content);
            }
        }
        Command::Preview { path, show_text } => {
            let chunker = Chunker::new(cli.chunking())?;
            let report = preview_path_best_effort(Path::new(path), &LopdfExtractor, &chunker)?;

            for skipped in &report.skipped_files {
                warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
            }

            for file in report.files {
                println!(
                    "{}: {} pages, {} words, language={}, {} chunks, sha256={}",
                    file.path.display(),
                    file.page_count,
                    file.word_count,
                    file.language,
                    file.chunks.len(),
                    file.checksum
                );
                for (index, chunk) in file.chunks.iter().enumerate() {
                    println!(
                        "  #{index} [{}..{}) {}",
                        chunk.start_char, chunk.end_char, chunk.section_type
                    );
                    if *show_text {
                        println!("{}", chunk.content);
                    }
                }
            }
        }
        Command::Reconcile {
            older_than_minutes,
            dry_run,
        } => {
            let store = cli.supabase()?;
            let stuck = reconcile_stuck_reports(
                store.as_ref(),
                chrono::Duration::minutes(*older_than_minutes),
                Utc::now(),
                *dry_run,
            )
            .await?;

            if stuck.is_empty() {
                println!("no reports stuck in processing");
            }
            for report in stuck {
                println!(
                    "{}{} ({}) idle since {}",
                    if *dry_run { "would fail: " } else { "failed: " },
                    report.title,
                    report.ecosystem,
                    report.updated_at.to_rfc3339()
                );
            }
        }
    }

    Ok(())
}
