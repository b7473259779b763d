use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use lexicon_db::{Lexicon, LoadMode};
use lexicon_enrich::translate::{ChatCompletionProvider, DeepLProvider, NllbProvider};
use lexicon_enrich::{BackendChoice, Backends, EmbeddingScorer, EnrichConfig, Orchestrator};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{Level, info, warn};
use tracing_subscriber::EnvFilter;

use lexicon_server::{AppState, router};

const DEFAULT_PORT: u16 = 8766;
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_CORPUS_DIR: &str = "wiktionary";
const DEFAULT_INDEX_DIR: &str = "wiktionary/offsets";
const DEFAULT_LANGS: &str = "de,en";
const DEFAULT_EMBEDDING_URL: &str = "http://127.0.0.1:8780/v1";
const DEFAULT_EMBEDDING_MODEL: &str = "paraphrase-multilingual-MiniLM-L12-v2";
const DEFAULT_NLLB_URL: &str = "http://127.0.0.1:8770";
const DEFAULT_DEEPL_URL: &str = "https://api-free.deepl.com";
const DEFAULT_OPENROUTER_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_OPENROUTER_MODEL: &str = "deepseek/deepseek-r1:free";
const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 60;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = load_config()?;
    info!("binding to {}:{}", config.host, config.port);
    info!(
        "using corpora in {} and indexes in {} (mode: {:?}, languages: {})",
        config.corpus_dir.display(),
        config.index_dir.display(),
        config.load_mode,
        config.languages.join(",")
    );
    info!(
        "bridge language {}, similarity threshold {}",
        config.enrich.bridge_lang, config.enrich.similarity_threshold
    );

    let start = Instant::now();
    let languages: Vec<&str> = config.languages.iter().map(String::as_str).collect();
    let lexicon = Lexicon::open(
        &config.corpus_dir,
        &config.index_dir,
        &languages,
        config.load_mode,
    )?;
    info!("lexicon loaded in {} ms", start.elapsed().as_millis());
    if !lexicon.has_language(&config.enrich.bridge_lang) {
        warn!(
            "bridge language {} is not loaded; bridged translations are disabled",
            config.enrich.bridge_lang
        );
    }

    let timeout = Duration::from_secs(config.backend_timeout_secs);
    let scorer = EmbeddingScorer::new(
        &config.embedding_url,
        config.embedding_model.as_str(),
        config.embedding_api_key.as_deref(),
        timeout,
    )?;
    let backends = build_backends(&config, timeout)?;
    info!("translation backends: {:?}", backends.configured());

    let orchestrator = Orchestrator::new(
        Arc::new(lexicon),
        Arc::new(scorer),
        backends,
        config.enrich.clone(),
    );
    let state = AppState {
        orchestrator: Arc::new(orchestrator),
    };

    let app = router(state).layer(TraceLayer::new_for_http());
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.host, config.port))?;
    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Debug, Clone)]
struct Config {
    host: String,
    port: u16,
    corpus_dir: PathBuf,
    index_dir: PathBuf,
    languages: Vec<String>,
    load_mode: LoadMode,
    enrich: EnrichConfig,
    embedding_url: String,
    embedding_model: String,
    embedding_api_key: Option<String>,
    nllb_url: String,
    deepl_url: String,
    deepl_api_key: Option<String>,
    openrouter_url: String,
    openrouter_api_key: Option<String>,
    openrouter_model: String,
    backend_timeout_secs: u64,
}

fn load_config() -> Result<Config> {
    let mut cli_corpus_dir: Option<PathBuf> = None;
    let mut cli_index_dir: Option<PathBuf> = None;
    let mut cli_load_mode: Option<LoadMode> = None;
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--corpus-dir" => {
                if let Some(path) = args.next() {
                    cli_corpus_dir = Some(PathBuf::from(path));
                }
            }
            "--index-dir" => {
                if let Some(path) = args.next() {
                    cli_index_dir = Some(PathBuf::from(path));
                }
            }
            _ => {
                if let Some(path) = arg.strip_prefix("--corpus-dir=") {
                    cli_corpus_dir = Some(PathBuf::from(path));
                } else if let Some(path) = arg.strip_prefix("--index-dir=") {
                    cli_index_dir = Some(PathBuf::from(path));
                } else if let Some(mode) = arg.strip_prefix("--load-mode=") {
                    cli_load_mode = parse_load_mode(mode);
                }
            }
        }
    }

    let host = env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
    let port = env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);
    let corpus_dir = cli_corpus_dir
        .or_else(|| env::var("CORPUS_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CORPUS_DIR));
    let index_dir = cli_index_dir
        .or_else(|| env::var("INDEX_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_INDEX_DIR));
    let languages = parse_languages(
        &env::var("CORPUS_LANGS").unwrap_or_else(|_| DEFAULT_LANGS.to_string()),
    );
    anyhow::ensure!(!languages.is_empty(), "CORPUS_LANGS names no language");
    let load_mode = cli_load_mode
        .or_else(|| {
            env::var("CORPUS_LOAD_MODE")
                .ok()
                .as_deref()
                .and_then(parse_load_mode)
        })
        .unwrap_or(LoadMode::Mmap);

    let mut enrich = EnrichConfig::default();
    if let Ok(lang) = env::var("BRIDGE_LANG")
        && !lang.trim().is_empty()
    {
        enrich.bridge_lang = lang.trim().to_string();
    }
    if let Some(threshold) = env::var("SIMILARITY_THRESHOLD")
        .ok()
        .and_then(|v| v.parse::<f32>().ok())
        .filter(|v| (0.0..=1.0).contains(v))
    {
        enrich.similarity_threshold = threshold;
    }

    let backend_timeout_secs = env::var("BACKEND_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_BACKEND_TIMEOUT_SECS);

    Ok(Config {
        host,
        port,
        corpus_dir,
        index_dir,
        languages,
        load_mode,
        enrich,
        embedding_url: env_or("EMBEDDING_URL", DEFAULT_EMBEDDING_URL),
        embedding_model: env_or("EMBEDDING_MODEL", DEFAULT_EMBEDDING_MODEL),
        embedding_api_key: secret("EMBEDDING_API_KEY")?,
        nllb_url: env_or("NLLB_URL", DEFAULT_NLLB_URL),
        deepl_url: env_or("DEEPL_URL", DEFAULT_DEEPL_URL),
        deepl_api_key: secret("DEEPL_API_KEY")?,
        openrouter_url: env_or("OPENROUTER_URL", DEFAULT_OPENROUTER_URL),
        openrouter_api_key: secret("OPENROUTER_API_KEY")?,
        openrouter_model: env_or("OPENROUTER_MODEL", DEFAULT_OPENROUTER_MODEL),
        backend_timeout_secs,
    })
}

fn build_backends(config: &Config, timeout: Duration) -> Result<Backends> {
    let mut backends = Backends::new();
    backends.insert(
        BackendChoice::Nllb,
        Arc::new(NllbProvider::new(&config.nllb_url, timeout)?),
    );
    match &config.deepl_api_key {
        Some(key) => backends.insert(
            BackendChoice::Deepl,
            Arc::new(DeepLProvider::new(&config.deepl_url, key, timeout)?),
        ),
        None => info!("DEEPL_API_KEY not set; DeepL requests fall back to NLLB"),
    }
    match &config.openrouter_api_key {
        Some(key) => backends.insert(
            BackendChoice::Deepseek,
            Arc::new(ChatCompletionProvider::new(
                &config.openrouter_url,
                key,
                config.openrouter_model.as_str(),
                timeout,
            )?),
        ),
        None => info!("OPENROUTER_API_KEY not set; Deepseek requests fall back to NLLB"),
    }
    Ok(backends)
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// `NAME` from the environment, or the trimmed content of the file named by
/// `NAME_FILE`.
fn secret(name: &str) -> Result<Option<String>> {
    if let Ok(value) = env::var(name)
        && !value.trim().is_empty()
    {
        return Ok(Some(value.trim().to_string()));
    }
    let Ok(path) = env::var(format!("{name}_FILE")) else {
        return Ok(None);
    };
    let value = fs::read_to_string(&path).with_context(|| format!("read {name}_FILE {path}"))?;
    let value = value.trim();
    Ok((!value.is_empty()).then(|| value.to_string()))
}

fn parse_languages(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for lang in raw.split(',').map(str::trim).filter(|l| !l.is_empty()) {
        if !out.iter().any(|l| l == lang) {
            out.push(lang.to_string());
        }
    }
    out
}

fn parse_load_mode(raw: &str) -> Option<LoadMode> {
    match raw.to_ascii_lowercase().as_str() {
        "mmap" => Some(LoadMode::Mmap),
        "handle" => Some(LoadMode::Handle),
        _ => None,
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let max_level = env_filter
        .max_level_hint()
        .and_then(|hint| hint.into_level())
        .unwrap_or(Level::INFO);
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_level(true)
        .with_max_level(max_level)
        .init();
}
