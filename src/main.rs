//! # Statute Knowledge-Graph CLI Driver
//!
//! ## Purpose
//! Command-line entry point for corpus ingestion, fact embedding, vector
//! index management, and statute resolution queries.
//!
//! ## Input/Output Specification
//! - **Input**: Configuration file, command line arguments, environment
//!   variables, corpus files
//! - **Output**: Ingestion statistics, query results (human-readable or
//!   JSON), health status
//!
//! ## Architecture Flow
//! 1. Parse command line arguments and load configuration
//! 2. Initialize logging and tracing
//! 3. Open the graph store
//! 4. Dispatch the subcommand: ingest / embed / build-index / query /
//!    stats / check-health

use clap::{Arg, ArgMatches, Command};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use statute_kg_search::{
    config::Config,
    embedding::HashingEmbedder,
    errors::{KgError, Result},
    graph::GraphStore,
    ingestion::IngestionPipeline,
    search::RetrievalEngine,
    vector::IndexManager,
};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("statute-kg")
        .version("1.0.0")
        .about("Statute knowledge-graph retrieval engine for civil tort cases")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config.toml")
                .global(true),
        )
        .subcommand(
            Command::new("ingest")
                .about("Parse the statute and judgment corpora and rebuild the graph")
                .arg(
                    Arg::new("statutes")
                        .long("statutes")
                        .value_name("FILE")
                        .help("Statute corpus file")
                        .required(true),
                )
                .arg(
                    Arg::new("cases")
                        .long("cases")
                        .value_name("FILE")
                        .help("Judgment corpus file")
                        .required(true),
                ),
        )
        .subcommand(Command::new("embed").about("Embed fact narratives that lack a vector"))
        .subcommand(
            Command::new("build-index")
                .about("Rebuild the vector index from stored fact embeddings"),
        )
        .subcommand(
            Command::new("query")
                .about("Resolve statutes for an accident description")
                .arg(
                    Arg::new("fact")
                        .long("fact")
                        .value_name("TEXT")
                        .help("Accident fact description")
                        .required(true),
                )
                .arg(
                    Arg::new("injury")
                        .long("injury")
                        .value_name("TEXT")
                        .help("Injury description")
                        .default_value(""),
                )
                .arg(
                    Arg::new("compensation")
                        .long("compensation")
                        .value_name("TEXT")
                        .help("Compensation request text for the drafting payload")
                        .default_value(""),
                )
                .arg(
                    Arg::new("top-k")
                        .long("top-k")
                        .value_name("N")
                        .help("Number of nearest facts to consult")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help("Emit the full drafting payload as JSON")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
        .subcommand(Command::new("stats").about("Show graph store statistics"))
        .subcommand(Command::new("check-health").about("Run health checks and exit"))
        .get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("config.toml");
    let config = Config::from_file(config_path)?;
    config.validate()?;

    init_logging(&config)?;
    info!("Configuration loaded from: {}", config_path);

    let store = Arc::new(GraphStore::open(&config.storage).await?);

    match matches.subcommand() {
        Some(("ingest", sub)) => run_ingest(sub, &config, store).await,
        Some(("embed", _)) => run_embed(&config, store).await,
        Some(("build-index", _)) => run_build_index(&config, store).await,
        Some(("query", sub)) => run_query(sub, &config, store).await,
        Some(("stats", _)) => run_stats(store).await,
        Some(("check-health", _)) => run_health_check(store).await,
        _ => Err(KgError::Config {
            message: "no subcommand given; see --help".to_string(),
        }),
    }
}

/// Initialize logging and tracing
fn init_logging(config: &Config) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_new(&config.logging.level).map_err(|_| {
        KgError::Config {
            message: format!("Invalid log level: {}", config.logging.level),
        }
    })?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_level(true);

    if config.logging.json_format {
        tracing_subscriber::registry()
            .with(fmt_layer.json().with_filter(filter))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt_layer.with_filter(filter))
            .init();
    }
    Ok(())
}

async fn run_ingest(matches: &ArgMatches, config: &Config, store: Arc<GraphStore>) -> Result<()> {
    let statutes_path = matches
        .get_one::<String>("statutes")
        .ok_or_else(|| KgError::Config {
            message: "--statutes is required".to_string(),
        })?;
    let cases_path = matches
        .get_one::<String>("cases")
        .ok_or_else(|| KgError::Config {
            message: "--cases is required".to_string(),
        })?;

    let statute_corpus = std::fs::read_to_string(statutes_path)?;
    let case_corpus = std::fs::read_to_string(cases_path)?;

    let pipeline = IngestionPipeline::new(&config.ingestion, store);
    let stats = pipeline.ingest(&statute_corpus, &case_corpus).await?;

    println!("Ingestion complete:");
    println!(
        "  statutes: {} ({} blocks skipped)",
        stats.statutes, stats.statute_blocks_skipped
    );
    println!(
        "  cases: {} ({} blocks skipped)",
        stats.cases, stats.case_blocks_skipped
    );
    println!("  compensation items: {}", stats.compensation_items);
    println!(
        "  statute links: {} ({} dangling references dropped)",
        stats.statute_links, stats.dangling_references
    );
    Ok(())
}

/// Embedding dimension for the built-in hashing embedder; `0` in the config
/// means "inferred", which the CLI resolves to a fixed default so ingestion
/// and querying agree.
fn embedding_dimension(config: &Config) -> usize {
    if config.vector.dimension > 0 {
        config.vector.dimension
    } else {
        256
    }
}

async fn run_embed(config: &Config, store: Arc<GraphStore>) -> Result<()> {
    let embedder = HashingEmbedder::new(embedding_dimension(config));
    let pipeline = IngestionPipeline::new(&config.ingestion, store);
    let stats = pipeline.apply_embeddings(&embedder).await?;

    // Stored vectors changed, the persisted index is stale
    let manager = IndexManager::new(
        config.vector.index_dir.clone(),
        config.vector.hnsw.clone(),
        config.vector.dimension,
    );
    manager.invalidate()?;

    println!(
        "Embedded {} facts ({} already embedded)",
        stats.embedded, stats.already_embedded
    );
    Ok(())
}

async fn run_build_index(config: &Config, store: Arc<GraphStore>) -> Result<()> {
    let manager = IndexManager::new(
        config.vector.index_dir.clone(),
        config.vector.hnsw.clone(),
        config.vector.dimension,
    );
    manager.invalidate()?;
    let index = manager.ensure_loaded(&store).await?;
    println!(
        "Built vector index with {} facts at {:?}",
        index.len(),
        config.vector.index_dir
    );
    Ok(())
}

async fn run_query(matches: &ArgMatches, config: &Config, store: Arc<GraphStore>) -> Result<()> {
    let fact = matches
        .get_one::<String>("fact")
        .map(String::as_str)
        .unwrap_or("");
    let injury = matches
        .get_one::<String>("injury")
        .map(String::as_str)
        .unwrap_or("");
    let compensation = matches
        .get_one::<String>("compensation")
        .map(String::as_str)
        .unwrap_or("");
    let top_k = matches.get_one::<usize>("top-k").copied();

    let embedder = Arc::new(HashingEmbedder::new(embedding_dimension(config)));
    let engine = RetrievalEngine::new(store, embedder, config);

    if matches.get_flag("json") {
        let payload = engine
            .drafting_payload(fact, injury, compensation, top_k)
            .await?;
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    let ids = engine.resolve_statutes(fact, injury, top_k).await?;
    if ids.is_empty() {
        println!("No statutes resolved (is the corpus ingested and embedded?)");
        return Ok(());
    }

    let details = engine.statutes_with_explanations(&ids).await?;
    for detail in details {
        println!("{}", detail.id);
        println!("  {}", detail.text);
        if let Some(explanation) = detail.explanation {
            println!("  口語化解釋: {}", explanation);
        }
    }
    Ok(())
}

async fn run_stats(store: Arc<GraphStore>) -> Result<()> {
    let stats = store.stats().await?;
    println!("Graph store:");
    println!("  nodes: {}", stats.node_count);
    println!("  edges: {}", stats.edge_count);
    println!(
        "  facts: {} ({} embedded)",
        stats.fact_count, stats.embedded_fact_count
    );
    Ok(())
}

async fn run_health_check(store: Arc<GraphStore>) -> Result<()> {
    store.health_check().await?;
    println!("✓ Graph store is healthy");
    Ok(())
}
