//! Corpus build and query CLI.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use bookrag::{CorpusManager, CorpusStats, RagConfig};

#[derive(Parser)]
#[command(name = "bookrag", version, about = "Build and query a PDF book retrieval corpus")]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, env = "BOOKRAG_CONFIG")]
    config: Option<PathBuf>,

    /// Directory containing PDF books
    #[arg(long, env = "BOOKRAG_BOOKS_DIR")]
    books_dir: Option<PathBuf>,

    /// Directory for the persisted chunk/vector pair
    #[arg(long, env = "BOOKRAG_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Skip the embedding backend (keyword search only)
    #[arg(long)]
    no_embeddings: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build (or load) the corpus and print statistics
    Build {
        /// Discard the persisted pair and rebuild from the books directory
        #[arg(long)]
        force: bool,
    },
    /// Search the corpus
    Query {
        text: String,
        #[arg(long, default_value_t = 5)]
        top_k: usize,
    },
    /// Print statistics for an already-built corpus
    Stats,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> bookrag::Result<()> {
    let mut config = match &cli.config {
        Some(path) => RagConfig::from_toml_file(path)?,
        None => RagConfig::default(),
    };
    if let Some(dir) = cli.books_dir {
        config.books_dir = dir;
    }
    if let Some(dir) = cli.cache_dir {
        config.cache_dir = dir;
    }
    if cli.no_embeddings {
        config.embedding_enabled = false;
    }

    let mut manager = CorpusManager::new(config)?;

    match cli.command {
        Command::Build { force } => {
            if force {
                manager.rebuild()?;
            } else {
                manager.ensure_ready()?;
            }
            print_stats(&manager.stats());
        }
        Command::Query { text, top_k } => {
            manager.ensure_ready()?;
            let results = manager.search(&text, top_k);
            if results.is_empty() {
                println!("no results");
            }
            for result in &results {
                println!(
                    "{:>2}. [{:.3}] {} - {} (page {})",
                    result.rank,
                    result.relevance_score,
                    result.chunk.book_name,
                    result.chunk.chapter,
                    result.chunk.page_number
                );
                println!("    {}", preview(&result.chunk.text, 200));
            }
        }
        Command::Stats => {
            if manager.try_load()? {
                print_stats(&manager.stats());
            } else {
                println!("corpus has not been built yet (run `bookrag build`)");
            }
        }
    }

    Ok(())
}

fn print_stats(stats: &CorpusStats) {
    println!("books:            {}", stats.books);
    println!("chunks:           {}", stats.chunks);
    println!("total words:      {}", stats.total_words);
    println!("mean words/chunk: {:.0}", stats.mean_words_per_chunk);
    match stats.embedding_dim {
        Some(dim) => println!("embeddings:       {} x {}", stats.embedded_rows, dim),
        None => println!("embeddings:       absent (keyword search only)"),
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let mut cut: String = flat.chars().take(max_chars).collect();
        cut.push_str("...");
        cut
    }
}
