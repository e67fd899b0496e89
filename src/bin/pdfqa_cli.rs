use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use pdfqa::config::{self, Config, EmbeddingProvider};
use pdfqa::logging::{LogOutput, init_tracing_with};
use pdfqa::processing::chunking::{SplitterSettings, split_documents};
use pdfqa::processing::{DocumentLoader, PdfLoader, RagService};

const DEFAULT_QUERY: &str = "What is the procedure for error code 404 in the manual?";
const SAMPLE_CHARS: usize = 500;

#[derive(Parser)]
#[command(
    name = "pdfqa-cli",
    about = "Index one PDF and answer a question about it"
)]
struct Cli {
    /// PDF file to index.
    pdf: PathBuf,
    /// Question to ask once the file is indexed.
    #[arg(long, short, default_value = DEFAULT_QUERY)]
    query: String,
}

#[tokio::main]
async fn main() {
    init_tracing_with(LogOutput::Stderr);
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("invalid configuration")?;

    preflight(&config, |key| std::env::var(key).ok())?;

    if !cli.pdf.is_file() {
        bail!("File not found: {}", cli.pdf.display());
    }
    let filename = cli
        .pdf
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| cli.pdf.display().to_string());

    let document = PdfLoader::new()
        .load(&cli.pdf, &filename)
        .await
        .with_context(|| format!("failed to load {}", cli.pdf.display()))?;
    println!(
        "Loaded {} pages from {}",
        document.pages.len(),
        cli.pdf.display()
    );
    if let Some(page) = document.pages.first() {
        println!("Sample page content: {}", sample(&page.text));
    }

    let chunks = split_documents(
        std::slice::from_ref(&document),
        SplitterSettings::from_config(&config),
    )?;
    println!("Split into {} chunks.", chunks.len());
    if let Some(chunk) = chunks.first() {
        println!("Sample chunk content: {}", sample(&chunk.text));
    }

    let service = RagService::new(&config);
    let chunk_count = service.index_chunks(vec![filename], chunks).await?;
    println!("Vector index created with {chunk_count} chunks.");

    let answer = service.ask(&cli.query).await?;
    println!("QA Result: {}", answer.text);
    if !answer.sources.is_empty() {
        println!("Sources: {}", answer.sources.join(", "));
    }
    Ok(())
}

/// Fail before any file or network work when a required key is missing.
fn preflight(config: &Config, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
    config::chat_api_key_from(&lookup).context("a chat API key is required")?;
    if config.embedding_provider == EmbeddingProvider::OpenAI {
        config::openai_api_key_from(&lookup)
            .context("the openai embedding provider needs a key")?;
    }
    Ok(())
}

fn sample(text: &str) -> String {
    text.chars().take(SAMPLE_CHARS).collect()
}
