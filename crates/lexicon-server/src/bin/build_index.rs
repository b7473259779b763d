use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use lexicon_db::{LanguageIndex, corpus_file_name, index_file_name};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "build-index")]
#[command(about = "Scan dictionary corpora and write their offset indexes")]
struct Cli {
    /// Language code; repeat for several corpora.
    #[arg(long = "lang", required = true)]
    languages: Vec<String>,
    /// Corpus file to scan; only valid with a single `--lang`.
    #[arg(long)]
    corpus: Option<PathBuf>,
    #[arg(long, default_value = "wiktionary")]
    corpus_dir: PathBuf,
    #[arg(long, default_value = "wiktionary/offsets")]
    out_dir: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    if cli.corpus.is_some() && cli.languages.len() > 1 {
        bail!("--corpus names one file but {} languages were given", cli.languages.len());
    }
    fs::create_dir_all(&cli.out_dir)
        .with_context(|| format!("create {}", cli.out_dir.display()))?;

    for language in &cli.languages {
        let corpus = cli
            .corpus
            .clone()
            .unwrap_or_else(|| cli.corpus_dir.join(corpus_file_name(language)));
        let (index, stats) = LanguageIndex::build(&corpus, language)?;
        let out = cli.out_dir.join(index_file_name(language));
        index.save(&out)?;
        println!(
            "{language}: {} lines, {} indexed, {} skipped, {} words -> {}",
            stats.lines,
            stats.indexed,
            stats.skipped,
            index.word_count(),
            out.display()
        );
    }

    Ok(())
}
