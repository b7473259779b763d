use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use lexicon_db::{Lexicon, LoadMode};

fn main() -> Result<()> {
    const USAGE: &str =
        "usage: cargo run -p lexicon-db --example lookup -- <corpus-dir> <index-dir> <lang> <word>";
    let mut args = env::args().skip(1);
    let corpus_dir = args.next().map(PathBuf::from).context(USAGE)?;
    let index_dir = args.next().map(PathBuf::from).context(USAGE)?;
    let lang = args.next().context(USAGE)?;
    let word = args.next().context(USAGE)?;

    let lexicon = Lexicon::open(&corpus_dir, &index_dir, &[lang.as_str()], LoadMode::Mmap)
        .with_context(|| format!("loading {lang} lexicon from {}", corpus_dir.display()))?;

    if let Some(index) = lexicon.index().language(&lang) {
        println!("Corpus      : {}", corpus_dir.display());
        println!("Words       : {}", index.word_count());
        println!("Offsets     : {}", index.offset_count());
        match index.fingerprint() {
            Some(fp) => println!("Fingerprint : {fp}"),
            None => println!("Fingerprint : none"),
        }
    }

    let records = lexicon.records(&lang, &word)?;
    println!("'{word}' has {} record(s)", records.len());
    for located in records {
        let record = located.record;
        println!(
            "  @{} {} [{}] {}: {} sense(s), {} translation(s)",
            located.offset,
            record.word,
            record.lang_code,
            record.pos.as_deref().unwrap_or("-"),
            record.senses.len(),
            record.translations.len()
        );
        for sense in &record.senses {
            let gloss = sense.glosses.last().map(String::as_str).unwrap_or("");
            println!("    - {gloss}");
        }
    }

    Ok(())
}
