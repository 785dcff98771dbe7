//! # Document Ingestion Module
//!
//! ## Purpose
//! Batch ingestion of the statute and case corpora into the graph store:
//! full reset, then statutes with explanations, then cases with their facts,
//! legal references, and compensation items, followed by a separate
//! embedding pass over the ingested facts.
//!
//! ## Input/Output Specification
//! - **Input**: Raw statute corpus, raw case corpus, ingestion configuration
//! - **Output**: Populated graph store plus [`IngestStats`]
//! - **Workflow**: Reset → Statutes → Anchors → Cases → (later) Embeddings
//!
//! ## Key Features
//! - Single-writer batch pass with idempotent upserts per document
//! - Lenient skip-and-continue for malformed blocks, strict mode optional
//! - Dangling statute citations dropped and counted, never fatal
//! - Ingestion statistics with timing and per-stage counts
//!
//! ## Architecture
//! - `statutes`: statute corpus block parser
//! - `cases`: case corpus block parser

pub mod cases;
pub mod statutes;

use crate::citation::CitationNormalizer;
use crate::config::IngestionConfig;
use crate::embedding::Embedder;
use crate::errors::Result;
use crate::graph::{EdgeKind, GraphStore, NodeKind};
use crate::utils::Timer;
use crate::{CASE_COLLECTION_ROOT_ID, REFERENCE_DATA_ROOT_ID, STATUTE_COLLECTION_ROOT_ID};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use cases::{CaseParser, CaseRecord, CompensationItem};
pub use statutes::{StatuteParser, StatuteRecord};

/// Ingestion execution statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestStats {
    /// Statutes ingested
    pub statutes: usize,
    /// Statute blocks skipped as malformed
    pub statute_blocks_skipped: usize,
    /// Cases ingested
    pub cases: usize,
    /// Case blocks skipped as malformed
    pub case_blocks_skipped: usize,
    /// Compensation items ingested
    pub compensation_items: usize,
    /// Statute citation edges created
    pub statute_links: usize,
    /// Citations naming statutes absent from the store, silently dropped
    pub dangling_references: usize,
    /// Start of the run
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    /// End of the run
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Statistics for the separate embedding pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingStats {
    /// Facts embedded during this pass
    pub embedded: usize,
    /// Facts that already carried an embedding
    pub already_embedded: usize,
}

/// Batch ingestion pipeline
pub struct IngestionPipeline {
    store: Arc<GraphStore>,
    normalizer: CitationNormalizer,
    statute_parser: StatuteParser,
    case_parser: CaseParser,
}

impl IngestionPipeline {
    pub fn new(config: &IngestionConfig, store: Arc<GraphStore>) -> Self {
        Self {
            store,
            normalizer: CitationNormalizer::new(&config.jurisdiction_prefix),
            statute_parser: StatuteParser::new(config.strict),
            case_parser: CaseParser::new(config.strict),
        }
    }

    /// Run the full ingestion pass: reset prior state, then stream statutes,
    /// then stream cases. Re-running with the same documents produces the
    /// same node and edge counts.
    pub async fn ingest(&self, statute_corpus: &str, case_corpus: &str) -> Result<IngestStats> {
        let timer = Timer::new("ingest");
        let mut stats = IngestStats {
            started_at: Some(chrono::Utc::now()),
            ..Default::default()
        };

        self.store.reset().await?;

        self.ingest_statutes(statute_corpus, &mut stats).await?;
        self.ingest_anchors().await?;
        self.ingest_cases(case_corpus, &mut stats).await?;

        self.store.flush().await?;
        stats.finished_at = Some(chrono::Utc::now());
        timer.stop();

        tracing::info!(
            "Ingestion completed: {} statutes ({} skipped), {} cases ({} skipped), \
             {} statute links, {} dangling references",
            stats.statutes,
            stats.statute_blocks_skipped,
            stats.cases,
            stats.case_blocks_skipped,
            stats.statute_links,
            stats.dangling_references
        );

        Ok(stats)
    }

    async fn ingest_statutes(&self, corpus: &str, stats: &mut IngestStats) -> Result<()> {
        let (records, skipped) = self.statute_parser.parse(corpus)?;
        stats.statute_blocks_skipped = skipped;

        for record in &records {
            let statute_id = self.normalizer.statute_id(&record.article_number);
            let explanation_id = format!("{}_explanation", statute_id);

            self.store
                .upsert_node(NodeKind::Statute, &statute_id, &record.text)
                .await?;
            self.store
                .upsert_node(NodeKind::Explanation, &explanation_id, &record.explanation)
                .await?;
            self.store
                .upsert_edge(EdgeKind::Explains, &statute_id, &explanation_id)
                .await?;
            stats.statutes += 1;
        }

        Ok(())
    }

    /// Create the collection anchor nodes and link every statute under the
    /// statute anchor. Used only for bulk discovery and export.
    async fn ingest_anchors(&self) -> Result<()> {
        self.store
            .upsert_node(
                NodeKind::StatuteCollectionRoot,
                STATUTE_COLLECTION_ROOT_ID,
                "起訴書相關法條",
            )
            .await?;
        self.store
            .upsert_node(
                NodeKind::CaseCollectionRoot,
                CASE_COLLECTION_ROOT_ID,
                "參考用判決書",
            )
            .await?;
        self.store
            .upsert_node(NodeKind::ReferenceDataRoot, REFERENCE_DATA_ROOT_ID, "參考資料")
            .await?;
        self.store
            .upsert_edge(
                EdgeKind::HasStatuteCollection,
                REFERENCE_DATA_ROOT_ID,
                STATUTE_COLLECTION_ROOT_ID,
            )
            .await?;
        self.store
            .upsert_edge(
                EdgeKind::HasCaseCollection,
                REFERENCE_DATA_ROOT_ID,
                CASE_COLLECTION_ROOT_ID,
            )
            .await?;

        // Anchor edges do not exist yet at this point, so scan nodes directly
        for statute_id in self.store.node_ids_of_kind(NodeKind::Statute).await? {
            self.store
                .upsert_edge(
                    EdgeKind::CollectsStatute,
                    STATUTE_COLLECTION_ROOT_ID,
                    &statute_id,
                )
                .await?;
        }

        Ok(())
    }

    async fn ingest_cases(&self, corpus: &str, stats: &mut IngestStats) -> Result<()> {
        let (records, skipped) = self.case_parser.parse(corpus, &self.normalizer)?;
        stats.case_blocks_skipped = skipped;

        for record in &records {
            self.ingest_case(record, stats).await?;
        }

        Ok(())
    }

    async fn ingest_case(&self, record: &CaseRecord, stats: &mut IngestStats) -> Result<()> {
        let case_id = record.case_id();

        self.store
            .upsert_node(NodeKind::Case, &case_id, &record.raw)
            .await?;
        self.store
            .upsert_edge(EdgeKind::CollectsCase, CASE_COLLECTION_ROOT_ID, &case_id)
            .await?;

        let fact_id = record.fact_id();
        self.store
            .upsert_node(NodeKind::Fact, &fact_id, &record.fact_text)
            .await?;
        self.store
            .upsert_edge(EdgeKind::HasFact, &case_id, &fact_id)
            .await?;

        if let Some(legal_text) = &record.legal_text {
            let legal_id = record.legal_id();
            self.store
                .upsert_node(NodeKind::LegalReference, &legal_id, legal_text)
                .await?;
            self.store
                .upsert_edge(EdgeKind::CitesReference, &case_id, &legal_id)
                .await?;

            for statute_id in &record.references {
                // Lenient best-effort linking: citations naming statutes
                // outside the curated set are dropped, not errors
                if self.store.node_exists(NodeKind::Statute, statute_id).await? {
                    self.store
                        .upsert_edge(EdgeKind::ReferencesStatute, &legal_id, statute_id)
                        .await?;
                    stats.statute_links += 1;
                } else {
                    tracing::debug!(
                        "Dropping dangling statute reference {} in {}",
                        statute_id,
                        legal_id
                    );
                    stats.dangling_references += 1;
                }
            }
        }

        if let Some(compensation_text) = &record.compensation_text {
            let compensation_id = record.compensation_id();
            self.store
                .upsert_node(NodeKind::Compensation, &compensation_id, compensation_text)
                .await?;
            self.store
                .upsert_edge(EdgeKind::ClaimsCompensation, &case_id, &compensation_id)
                .await?;

            for (j, item) in record.items.iter().enumerate() {
                let item_id = record.item_id(j + 1);
                self.store
                    .upsert_node(NodeKind::CompensationItem, &item_id, &item.text)
                    .await?;
                self.store
                    .upsert_edge(EdgeKind::HasItem, &compensation_id, &item_id)
                    .await?;
                stats.compensation_items += 1;
            }
        }

        stats.cases += 1;
        Ok(())
    }

    /// Separate embedding pass: embed every fact that does not yet carry a
    /// vector. Runs after ingestion, before index build.
    pub async fn apply_embeddings(&self, embedder: &dyn Embedder) -> Result<EmbeddingStats> {
        let timer = Timer::new("apply_embeddings");
        let mut stats = EmbeddingStats::default();

        let pending = self.store.unembedded_fact_ids().await?;
        stats.already_embedded = self.store.fact_embeddings().await?.len();

        for fact_id in pending {
            let fact = self
                .store
                .get_node(NodeKind::Fact, &fact_id)
                .await?
                .ok_or_else(|| crate::internal_error!("fact '{}' vanished mid-pass", fact_id))?;
            let vector = embedder.embed(&fact.text).await?;
            self.store.set_fact_embedding(&fact_id, vector).await?;
            stats.embedded += 1;
        }

        self.store.flush().await?;
        timer.stop();
        tracing::info!(
            "Embedding pass: {} embedded, {} already embedded",
            stats.embedded,
            stats.already_embedded
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IngestionConfig, StorageConfig};
    use crate::embedding::HashingEmbedder;

    const STATUTES: &str = "第 184 條\n因故意或過失，不法侵害他人之權利者，負損害賠償責任。\n口語化解釋: 害別人受損就要賠。\n\"\"\"\n第 191-2 條\n動力車輛在使用中加損害於他人者，駕駛人應賠償。\n口語化解釋: 開車撞傷人要賠。";

    const CASES: &str = "\"一、被告駕車追撞原告，致原告受傷。二、按民法第184條及第191條之2，被告應負賠償責任。（一）醫療費用190元。（二）慰撫金99,000元。\"\n\"一、被告騎車撞及原告。二、依民法第184條及民法第999條請求。\"";

    async fn pipeline() -> (tempfile::TempDir, Arc<GraphStore>, IngestionPipeline) {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageConfig {
            db_path: dir.path().join("graph.db"),
            compression_threshold_bytes: 0,
        };
        let store = Arc::new(GraphStore::open(&storage).await.unwrap());
        let config = IngestionConfig {
            jurisdiction_prefix: "民法第".to_string(),
            strict: false,
        };
        let pipeline = IngestionPipeline::new(&config, store.clone());
        (dir, store, pipeline)
    }

    #[tokio::test]
    async fn full_ingestion_builds_expected_graph() {
        let (_dir, store, pipeline) = pipeline().await;
        let stats = pipeline.ingest(STATUTES, CASES).await.unwrap();

        assert_eq!(stats.statutes, 2);
        assert_eq!(stats.cases, 2);
        assert_eq!(stats.compensation_items, 2);
        assert_eq!(stats.statute_links, 3);
        assert_eq!(stats.dangling_references, 1);

        let cited = store.statutes_cited_by_fact("Fact1").await.unwrap();
        assert_eq!(
            cited.into_iter().collect::<Vec<_>>(),
            vec!["民法第184條".to_string(), "民法第191-2條".to_string()]
        );

        assert_eq!(store.statute_ids().await.unwrap().len(), 2);
        assert_eq!(
            store.case_ids().await.unwrap(),
            vec!["Case1".to_string(), "Case2".to_string()]
        );
    }

    #[tokio::test]
    async fn double_ingestion_is_idempotent() {
        let (_dir, store, pipeline) = pipeline().await;
        pipeline.ingest(STATUTES, CASES).await.unwrap();
        let first = store.stats().await.unwrap();
        pipeline.ingest(STATUTES, CASES).await.unwrap();
        let second = store.stats().await.unwrap();

        assert_eq!(first.node_count, second.node_count);
        assert_eq!(first.edge_count, second.edge_count);
    }

    #[tokio::test]
    async fn embedding_pass_covers_all_facts_once() {
        let (_dir, store, pipeline) = pipeline().await;
        pipeline.ingest(STATUTES, CASES).await.unwrap();

        let embedder = HashingEmbedder::new(32);
        let first = pipeline.apply_embeddings(&embedder).await.unwrap();
        assert_eq!(first.embedded, 2);
        assert_eq!(first.already_embedded, 0);

        let second = pipeline.apply_embeddings(&embedder).await.unwrap();
        assert_eq!(second.embedded, 0);
        assert_eq!(second.already_embedded, 2);

        assert_eq!(store.fact_embeddings().await.unwrap().len(), 2);
    }
}
