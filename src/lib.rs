//! # Statute Knowledge-Graph Retrieval Engine
//!
//! ## Overview
//! This library builds a property graph over a civil-code statute corpus and
//! a judgment corpus, embeds the case fact narratives into a vector index,
//! and resolves free-text accident descriptions to the statutes the most
//! similar precedent cases actually cited.
//!
//! ## Architecture
//! The system is composed of several key modules:
//! - `citation`: Canonical statute citation normalization and extraction
//! - `ingestion`: Statute and judgment corpus parsing and graph assembly
//! - `graph`: Embedded property-graph store (nodes, typed edges, embeddings)
//! - `embedding`: Injected embedding-model boundary
//! - `vector`: Approximate nearest-neighbor index over fact embeddings
//! - `search`: Multi-hop retrieval from query text to cited statutes
//! - `config`: Configuration management and settings
//! - `errors`: Centralized error handling and types
//!
//! ## Input/Output Specification
//! - **Input**: Statute corpus (`"""`-delimited blocks), judgment corpus
//!   (`"`-quoted blocks), free-text queries
//! - **Output**: Canonically-sorted statute ids with article text and
//!   plain-language explanations, plus a structured drafting payload
//! - **Performance**: Deterministic results; sub-second queries once the
//!   index is loaded
//!
//! ## Usage
//! ```rust,no_run
//! use statute_kg_search::{Config, RetrievalEngine};
//! use statute_kg_search::embedding::HashingEmbedder;
//! use statute_kg_search::graph::GraphStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file("config.toml")?;
//!     let store = Arc::new(GraphStore::open(&config.storage).await?);
//!     let embedder = Arc::new(HashingEmbedder::new(256));
//!     let engine = RetrievalEngine::new(store, embedder, &config);
//!     let statutes = engine
//!         .resolve_statutes("被告駕車追撞原告", "原告受有右腿骨折之傷害", None)
//!         .await?;
//!     println!("Resolved {} statutes", statutes.len());
//!     Ok(())
//! }
//! ```

// Core modules
pub mod citation;
pub mod config;
pub mod embedding;
pub mod errors;
pub mod graph;
pub mod ingestion;
pub mod search;
pub mod vector;

// Utilities
pub mod utils;

// Re-exports for convenience
pub use citation::CitationNormalizer;
pub use config::Config;
pub use errors::{KgError, Result};
pub use search::{DraftingRequest, RetrievalEngine, StatuteDetail};

/// Node id of the statute collection anchor (text: 起訴書相關法條)
pub const STATUTE_COLLECTION_ROOT_ID: &str = "StatuteCollection";

/// Node id of the case collection anchor (text: 參考用判決書)
pub const CASE_COLLECTION_ROOT_ID: &str = "CaseCollection";

/// Node id of the top-level reference-data anchor (text: 參考資料)
pub const REFERENCE_DATA_ROOT_ID: &str = "ReferenceData";
