use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use novel_vector_store::{
    chapters_dir, vector_store_dir, EmbeddingConfig, EmbeddingMode, EmbeddingModel,
    RetrievalConfig, VectorStore,
};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod chapters;

#[derive(Parser)]
#[command(name = "novel-memory")]
#[command(about = "Retrieval memory for long-form novel generation", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(long, global = true)]
    quiet: bool,

    /// Override embedding backend (overrides NOVEL_EMBEDDING_MODE)
    #[arg(long, global = true, value_enum)]
    embed_mode: Option<EmbedMode>,

    /// Override embedding model id (overrides NOVEL_EMBEDDING_MODEL)
    #[arg(long, global = true)]
    embed_model: Option<String>,

    /// Model directory (overrides NOVEL_MODEL_DIR)
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Embed one chapter into the novel's memory and save it
    Add(AddArgs),

    /// Retrieve the chapters most relevant to a query
    Search(SearchArgs),

    /// Show what the novel's memory holds
    Info(InfoArgs),

    /// Rebuild the memory from the novel's chapter files
    Reindex(ReindexArgs),
}

#[derive(Args)]
struct AddArgs {
    /// Novel directory
    #[arg(long)]
    novel: PathBuf,

    /// Chapter number
    #[arg(long, allow_negative_numbers = true)]
    chapter: i64,

    /// Read chapter text from a file
    #[arg(long, conflicts_with = "text", required_unless_present = "text")]
    file: Option<PathBuf>,

    /// Chapter text
    #[arg(long)]
    text: Option<String>,
}

#[derive(Args)]
struct SearchArgs {
    /// Novel directory
    #[arg(long)]
    novel: PathBuf,

    /// Query text
    #[arg(long)]
    query: String,

    /// Number of chapters to return (defaults to NOVEL_RAG_TOP_K or 3)
    #[arg(short, long)]
    k: Option<usize>,

    /// Output JSON format
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct InfoArgs {
    /// Novel directory
    #[arg(long)]
    novel: PathBuf,

    /// Output JSON format
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ReindexArgs {
    /// Novel directory
    #[arg(long)]
    novel: PathBuf,

    /// Output JSON format
    #[arg(long)]
    json: bool,
}

#[derive(Copy, Clone, ValueEnum)]
enum EmbedMode {
    Onnx,
    Lexical,
}

impl EmbedMode {
    const fn as_domain(self) -> EmbeddingMode {
        match self {
            EmbedMode::Onnx => EmbeddingMode::Onnx,
            EmbedMode::Lexical => EmbeddingMode::Lexical,
        }
    }
}

#[derive(Serialize)]
struct ReindexOutput {
    chapters: usize,
    entries: usize,
    skipped_empty: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();

    // Keep stdout clean for JSON consumers
    let json_output = match &cli.command {
        Commands::Search(args) => args.json,
        Commands::Info(args) => args.json,
        Commands::Reindex(args) => args.json,
        Commands::Add(_) => false,
    };
    if json_output {
        cli.quiet = true;
    }

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    // ORT is extremely noisy
    if !cli.verbose {
        builder.filter_module("ort", log::LevelFilter::Off);
    }
    builder.target(env_logger::Target::Stderr).init();

    let embedder = load_embedder(&cli)?;

    match cli.command {
        Commands::Add(args) => run_add(args, embedder).await?,
        Commands::Search(args) => run_search(args, embedder).await?,
        Commands::Info(args) => run_info(args, embedder).await?,
        Commands::Reindex(args) => run_reindex(args, embedder).await?,
    }

    Ok(())
}

fn load_embedder(cli: &Cli) -> Result<Arc<EmbeddingModel>> {
    let mut config = EmbeddingConfig::from_env().context("Invalid embedding configuration")?;
    if let Some(mode) = cli.embed_mode {
        config.mode = mode.as_domain();
    }
    if let Some(model) = &cli.embed_model {
        config.model_id = model.clone();
    }
    if let Some(dir) = &cli.model_dir {
        config.model_dir = dir.clone();
    }

    log::debug!(
        "Embedding backend: {} (model {}, dir {})",
        config.mode.as_str(),
        config.model_id,
        config.model_dir.display()
    );
    let model = EmbeddingModel::new(&config).context("Failed to load embedding model")?;
    Ok(Arc::new(model))
}

async fn open_store(novel: &Path, embedder: Arc<EmbeddingModel>) -> Result<VectorStore> {
    VectorStore::open(novel, embedder)
        .await
        .with_context(|| format!("Failed to open vector store for {}", novel.display()))
}

async fn run_add(args: AddArgs, embedder: Arc<EmbeddingModel>) -> Result<()> {
    let text = match (&args.file, args.text) {
        (Some(path), _) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        (None, Some(text)) => text,
        (None, None) => bail!("Either --file or --text is required"),
    };
    if text.trim().is_empty() {
        bail!("Chapter {} has no text to index", args.chapter);
    }

    let mut store = open_store(&args.novel, embedder).await?;
    store.add_document(&text, args.chapter).await?;
    store.save().await?;

    println!(
        "Indexed chapter {} ({} entries in {})",
        args.chapter,
        store.len(),
        vector_store_dir(store.location()).display()
    );
    Ok(())
}

async fn run_search(args: SearchArgs, embedder: Arc<EmbeddingModel>) -> Result<()> {
    let k = match args.k {
        Some(k) => k,
        None => RetrievalConfig::from_env()?.top_k,
    };
    let store = open_store(&args.novel, embedder).await?;
    let hits = store.search_hits(&args.query, k).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }
    if hits.is_empty() {
        eprintln!("No matching chapters");
        return Ok(());
    }
    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. chapter {} (distance: {:.3})",
            i + 1,
            hit.chapter_index,
            hit.distance
        );
        println!("{}", hit.text);
        println!();
    }
    Ok(())
}

async fn run_info(args: InfoArgs, embedder: Arc<EmbeddingModel>) -> Result<()> {
    let store = open_store(&args.novel, embedder).await?;
    let stats = store.stats();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }
    println!("Location:  {}", vector_store_dir(store.location()).display());
    println!("Entries:   {}", stats.entries);
    println!("Dimension: {}", stats.dimension);
    println!("Model:     {}", stats.model_id);
    println!("Revision:  {}", stats.revision);
    let chapters: Vec<String> = stats.chapters.iter().map(ToString::to_string).collect();
    println!("Chapters:  {}", chapters.join(", "));
    Ok(())
}

async fn run_reindex(args: ReindexArgs, embedder: Arc<EmbeddingModel>) -> Result<()> {
    let files = chapters::list_chapters(&chapters_dir(&args.novel))?;
    if files.is_empty() {
        log::warn!("No chapter files found under {}", args.novel.display());
    }

    let mut texts = Vec::with_capacity(files.len());
    for file in &files {
        texts.push((file.index, file.read()?));
    }
    let batch: Vec<(i64, &str)> = texts
        .iter()
        .map(|(index, text)| (*index, text.as_str()))
        .collect();

    // Fresh store so stale or foreign artifacts are replaced
    let mut store = VectorStore::empty(&args.novel, embedder);
    let entries = store.add_documents(&batch).await?;
    store.save().await?;
    log::info!(
        "Reindexed {} chapter files into {}",
        files.len(),
        vector_store_dir(store.location()).display()
    );

    let output = ReindexOutput {
        chapters: files.len(),
        entries,
        skipped_empty: files.len() - entries,
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!(
            "Reindexed {} chapters ({} entries, {} empty skipped)",
            output.chapters, output.entries, output.skipped_empty
        );
    }
    Ok(())
}
