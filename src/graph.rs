//! # Graph Store Module
//!
//! ## Purpose
//! Persistent typed property graph holding statutes, cases, and their
//! extracted entities, with idempotent merge-by-key upsert semantics and the
//! typed read queries the retrieval engine depends on.
//!
//! ## Input/Output Specification
//! - **Input**: Node and edge upserts from the ingestion pipeline,
//!   fact-embedding writes from the embedding pass
//! - **Output**: Multi-hop traversals, fact-embedding scans, statute lookups
//! - **Storage**: Sled embedded database, bincode-encoded records
//!
//! ## Key Features
//! - Idempotent upserts: node and edge keys are the merge keys, so writing
//!   the same key twice yields one record
//! - Forward and reverse edge trees for constant-prefix traversal in both
//!   directions
//! - Two-hop fact-to-statute traversal with existence-checked endpoints
//! - Optional gzip compression for large node text

use crate::config::StorageConfig;
use crate::errors::{KgError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Node kinds in the legal knowledge graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Statute,
    Explanation,
    Case,
    Fact,
    LegalReference,
    Compensation,
    CompensationItem,
    StatuteCollectionRoot,
    CaseCollectionRoot,
    ReferenceDataRoot,
}

impl NodeKind {
    /// Stable key prefix for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Statute => "statute",
            NodeKind::Explanation => "explanation",
            NodeKind::Case => "case",
            NodeKind::Fact => "fact",
            NodeKind::LegalReference => "legal_reference",
            NodeKind::Compensation => "compensation",
            NodeKind::CompensationItem => "compensation_item",
            NodeKind::StatuteCollectionRoot => "statute_root",
            NodeKind::CaseCollectionRoot => "case_root",
            NodeKind::ReferenceDataRoot => "reference_data",
        }
    }
}

/// Edge kinds in the legal knowledge graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    /// Statute -> Explanation
    Explains,
    /// Case -> Fact
    HasFact,
    /// Case -> LegalReference
    CitesReference,
    /// LegalReference -> Statute
    ReferencesStatute,
    /// Case -> Compensation
    ClaimsCompensation,
    /// Compensation -> CompensationItem
    HasItem,
    /// StatuteCollectionRoot -> Statute
    CollectsStatute,
    /// CaseCollectionRoot -> Case
    CollectsCase,
    /// ReferenceDataRoot -> StatuteCollectionRoot
    HasStatuteCollection,
    /// ReferenceDataRoot -> CaseCollectionRoot
    HasCaseCollection,
}

impl EdgeKind {
    /// Stable key prefix for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Explains => "explains",
            EdgeKind::HasFact => "has_fact",
            EdgeKind::CitesReference => "cites_reference",
            EdgeKind::ReferencesStatute => "references_statute",
            EdgeKind::ClaimsCompensation => "claims_compensation",
            EdgeKind::HasItem => "has_item",
            EdgeKind::CollectsStatute => "collects_statute",
            EdgeKind::CollectsCase => "collects_case",
            EdgeKind::HasStatuteCollection => "has_statute_collection",
            EdgeKind::HasCaseCollection => "has_case_collection",
        }
    }
}

/// Stored node record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Node kind
    pub kind: NodeKind,
    /// Unique id within the kind (also the merge key)
    pub id: String,
    /// Node text payload
    pub text: String,
    /// Fact embedding, populated by a separate pass after ingestion
    pub embedding: Option<Vec<f32>>,
}

/// Entry returned by [`GraphStore::fact_embeddings`]
#[derive(Debug, Clone)]
pub struct FactEmbedding {
    pub fact_id: String,
    pub text: String,
    pub vector: Vec<f32>,
}

/// Node and edge totals, used for stats output and idempotency checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub fact_count: usize,
    pub embedded_fact_count: usize,
}

/// Persistent typed property graph over sled
pub struct GraphStore {
    db: Arc<sled::Db>,
    nodes: sled::Tree,
    edges: sled::Tree,
    edges_rev: sled::Tree,
    compression_threshold: usize,
}

/// Marker byte prefixed to node values: 0 = raw bincode, 1 = gzip bincode
const VALUE_RAW: u8 = 0;
const VALUE_GZIP: u8 = 1;

impl GraphStore {
    /// Open or create a graph store at the configured path
    pub async fn open(config: &StorageConfig) -> Result<Self> {
        if let Some(parent) = config.db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let db = sled::open(&config.db_path).map_err(|e| KgError::StoreUnavailable {
            path: config.db_path.to_string_lossy().to_string(),
            reason: e.to_string(),
        })?;

        let nodes = db.open_tree("nodes").map_err(|e| KgError::StoreUnavailable {
            path: config.db_path.to_string_lossy().to_string(),
            reason: format!("Failed to open nodes tree: {}", e),
        })?;
        let edges = db.open_tree("edges").map_err(|e| KgError::StoreUnavailable {
            path: config.db_path.to_string_lossy().to_string(),
            reason: format!("Failed to open edges tree: {}", e),
        })?;
        let edges_rev = db
            .open_tree("edges_rev")
            .map_err(|e| KgError::StoreUnavailable {
                path: config.db_path.to_string_lossy().to_string(),
                reason: format!("Failed to open reverse edges tree: {}", e),
            })?;

        let store = Self {
            db: Arc::new(db),
            nodes,
            edges,
            edges_rev,
            compression_threshold: config.compression_threshold_bytes,
        };

        tracing::info!(
            "Graph store opened with {} nodes, {} edges",
            store.nodes.len(),
            store.edges.len()
        );

        Ok(store)
    }

    fn node_key(kind: NodeKind, id: &str) -> Vec<u8> {
        format!("{}/{}", kind.as_str(), id).into_bytes()
    }

    fn edge_key(kind: EdgeKind, from: &str, to: &str) -> Vec<u8> {
        format!("{}/{}/{}", kind.as_str(), from, to).into_bytes()
    }

    fn encode_node(&self, record: &NodeRecord) -> Result<Vec<u8>> {
        let payload = bincode::serialize(record)?;
        if self.compression_threshold > 0 && payload.len() > self.compression_threshold {
            use std::io::Write;
            let mut encoder =
                flate2::write::GzEncoder::new(vec![VALUE_GZIP], flate2::Compression::default());
            encoder.write_all(&payload)?;
            Ok(encoder.finish()?)
        } else {
            let mut value = Vec::with_capacity(payload.len() + 1);
            value.push(VALUE_RAW);
            value.extend_from_slice(&payload);
            Ok(value)
        }
    }

    fn decode_node(value: &[u8]) -> Result<NodeRecord> {
        match value.split_first() {
            Some((&VALUE_RAW, rest)) => Ok(bincode::deserialize(rest)?),
            Some((&VALUE_GZIP, rest)) => {
                use std::io::Read;
                let mut decoder = flate2::read::GzDecoder::new(rest);
                let mut payload = Vec::new();
                decoder.read_to_end(&mut payload)?;
                Ok(bincode::deserialize(&payload)?)
            }
            _ => Err(KgError::Internal {
                message: "Empty node record".to_string(),
            }),
        }
    }

    /// Insert or update a node. The (kind, id) pair is the merge key, so
    /// repeated upserts produce one node.
    pub async fn upsert_node(&self, kind: NodeKind, id: &str, text: &str) -> Result<()> {
        // Preserve an existing embedding when the same node is re-ingested
        let key = Self::node_key(kind, id);
        let embedding = match self.nodes.get(&key)? {
            Some(existing) => Self::decode_node(&existing)?.embedding,
            None => None,
        };

        let record = NodeRecord {
            kind,
            id: id.to_string(),
            text: text.to_string(),
            embedding,
        };
        self.nodes.insert(key, self.encode_node(&record)?)?;
        tracing::debug!("Upserted node {}/{}", kind.as_str(), id);
        Ok(())
    }

    /// Insert or update a directed edge. The (kind, from, to) triple is the
    /// merge key; re-writing it never duplicates the edge.
    pub async fn upsert_edge(&self, kind: EdgeKind, from: &str, to: &str) -> Result<()> {
        self.edges.insert(Self::edge_key(kind, from, to), &[])?;
        self.edges_rev
            .insert(format!("{}/{}/{}", kind.as_str(), to, from).into_bytes(), &[])?;
        tracing::debug!("Upserted edge {} {} -> {}", kind.as_str(), from, to);
        Ok(())
    }

    /// Fetch a node by kind and id
    pub async fn get_node(&self, kind: NodeKind, id: &str) -> Result<Option<NodeRecord>> {
        match self.nodes.get(Self::node_key(kind, id))? {
            Some(value) => Ok(Some(Self::decode_node(&value)?)),
            None => Ok(None),
        }
    }

    /// Check whether a node exists
    pub async fn node_exists(&self, kind: NodeKind, id: &str) -> Result<bool> {
        Ok(self.nodes.contains_key(Self::node_key(kind, id))?)
    }

    /// Detach-delete everything: nodes, edges, reverse edges
    pub async fn reset(&self) -> Result<()> {
        self.nodes.clear()?;
        self.edges.clear()?;
        self.edges_rev.clear()?;
        tracing::info!("Graph store reset");
        Ok(())
    }

    /// Flush pending writes to disk
    pub async fn flush(&self) -> Result<()> {
        self.db.flush_async().await?;
        Ok(())
    }

    /// Set the embedding vector on a fact node
    pub async fn set_fact_embedding(&self, fact_id: &str, vector: Vec<f32>) -> Result<()> {
        let key = Self::node_key(NodeKind::Fact, fact_id);
        let mut record = match self.nodes.get(&key)? {
            Some(value) => Self::decode_node(&value)?,
            None => {
                return Err(KgError::Internal {
                    message: format!("Fact node '{}' not found", fact_id),
                })
            }
        };
        record.embedding = Some(vector);
        self.nodes.insert(key, self.encode_node(&record)?)?;
        Ok(())
    }

    /// Iterate all facts carrying an embedding, in stable key order.
    ///
    /// This scan order defines the vector index insertion order, so it must
    /// be deterministic across calls against an unchanged store.
    pub async fn fact_embeddings(&self) -> Result<Vec<FactEmbedding>> {
        let prefix = format!("{}/", NodeKind::Fact.as_str());
        let mut entries = Vec::new();
        for item in self.nodes.scan_prefix(prefix.as_bytes()) {
            let (_, value) = item?;
            let record = Self::decode_node(&value)?;
            if let Some(vector) = record.embedding {
                entries.push(FactEmbedding {
                    fact_id: record.id,
                    text: record.text,
                    vector,
                });
            }
        }
        Ok(entries)
    }

    /// All node ids of one kind, in stable key order
    pub async fn node_ids_of_kind(&self, kind: NodeKind) -> Result<Vec<String>> {
        let prefix = format!("{}/", kind.as_str());
        let mut ids = Vec::new();
        for item in self.nodes.scan_prefix(prefix.as_bytes()) {
            let (key, _) = item?;
            let key = String::from_utf8_lossy(&key).into_owned();
            if let Some(id) = key.strip_prefix(&prefix) {
                ids.push(id.to_string());
            }
        }
        Ok(ids)
    }

    /// Ids of facts that do not yet carry an embedding
    pub async fn unembedded_fact_ids(&self) -> Result<Vec<String>> {
        let prefix = format!("{}/", NodeKind::Fact.as_str());
        let mut ids = Vec::new();
        for item in self.nodes.scan_prefix(prefix.as_bytes()) {
            let (_, value) = item?;
            let record = Self::decode_node(&value)?;
            if record.embedding.is_none() {
                ids.push(record.id);
            }
        }
        Ok(ids)
    }

    /// Outbound neighbors of `from` along `kind` edges
    fn outbound(&self, kind: EdgeKind, from: &str) -> Result<Vec<String>> {
        let prefix = format!("{}/{}/", kind.as_str(), from);
        let mut neighbors = Vec::new();
        for item in self.edges.scan_prefix(prefix.as_bytes()) {
            let (key, _) = item?;
            let key = String::from_utf8_lossy(&key).into_owned();
            if let Some(to) = key.strip_prefix(&prefix) {
                neighbors.push(to.to_string());
            }
        }
        Ok(neighbors)
    }

    /// Inbound neighbors of `to` along `kind` edges
    fn inbound(&self, kind: EdgeKind, to: &str) -> Result<Vec<String>> {
        let prefix = format!("{}/{}/", kind.as_str(), to);
        let mut neighbors = Vec::new();
        for item in self.edges_rev.scan_prefix(prefix.as_bytes()) {
            let (key, _) = item?;
            let key = String::from_utf8_lossy(&key).into_owned();
            if let Some(from) = key.strip_prefix(&prefix) {
                neighbors.push(from.to_string());
            }
        }
        Ok(neighbors)
    }

    /// Statutes reachable from a fact via its owning case:
    /// Fact ←has_fact← Case →cites_reference→ LegalReference
    /// →references_statute→ Statute.
    ///
    /// Statute endpoints are existence-checked; referenced ids with no stored
    /// node are dropped. Unknown fact ids yield an empty set.
    pub async fn statutes_cited_by_fact(&self, fact_id: &str) -> Result<BTreeSet<String>> {
        let mut statutes = BTreeSet::new();
        for case_id in self.inbound(EdgeKind::HasFact, fact_id)? {
            for legal_id in self.outbound(EdgeKind::CitesReference, &case_id)? {
                for statute_id in self.outbound(EdgeKind::ReferencesStatute, &legal_id)? {
                    if self.nodes.contains_key(Self::node_key(NodeKind::Statute, &statute_id))? {
                        statutes.insert(statute_id);
                    }
                }
            }
        }
        Ok(statutes)
    }

    /// Fetch a statute's text and its plain-language explanation, if stored
    pub async fn statute_with_explanation(
        &self,
        statute_id: &str,
    ) -> Result<Option<(String, Option<String>)>> {
        let statute = match self.get_node(NodeKind::Statute, statute_id).await? {
            Some(node) => node,
            None => return Ok(None),
        };

        let mut explanation = None;
        for explanation_id in self.outbound(EdgeKind::Explains, statute_id)? {
            if let Some(node) = self.get_node(NodeKind::Explanation, &explanation_id).await? {
                explanation = Some(node.text);
                break;
            }
        }

        Ok(Some((statute.text, explanation)))
    }

    /// All statute ids collected under the statute anchor, ascending
    pub async fn statute_ids(&self) -> Result<Vec<String>> {
        let mut ids = self.outbound(
            EdgeKind::CollectsStatute,
            crate::STATUTE_COLLECTION_ROOT_ID,
        )?;
        ids.sort();
        Ok(ids)
    }

    /// All case ids collected under the case anchor, ascending
    pub async fn case_ids(&self) -> Result<Vec<String>> {
        let mut ids = self.outbound(EdgeKind::CollectsCase, crate::CASE_COLLECTION_ROOT_ID)?;
        ids.sort();
        Ok(ids)
    }

    /// Node and edge totals
    pub async fn stats(&self) -> Result<GraphStats> {
        let facts = self.fact_embeddings().await?;
        let fact_prefix = format!("{}/", NodeKind::Fact.as_str());
        let fact_count = self.nodes.scan_prefix(fact_prefix.as_bytes()).count();
        Ok(GraphStats {
            node_count: self.nodes.len(),
            edge_count: self.edges.len(),
            fact_count,
            embedded_fact_count: facts.len(),
        })
    }

    /// Health check: round-trip a sentinel key
    pub async fn health_check(&self) -> Result<()> {
        let key = b"__health_check";
        self.nodes.insert(key, b"ok".as_ref())?;
        if self.nodes.get(key)?.is_none() {
            return Err(KgError::Internal {
                message: "Health check value not found after write".to_string(),
            });
        }
        self.nodes.remove(key)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;

    async fn temp_store() -> (tempfile::TempDir, GraphStore) {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            db_path: dir.path().join("graph.db"),
            compression_threshold_bytes: 64,
        };
        let store = GraphStore::open(&config).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn upserts_are_idempotent() {
        let (_dir, store) = temp_store().await;
        store
            .upsert_node(NodeKind::Statute, "民法第184條", "條文")
            .await
            .unwrap();
        store
            .upsert_node(NodeKind::Statute, "民法第184條", "條文")
            .await
            .unwrap();
        store
            .upsert_edge(EdgeKind::Explains, "民法第184條", "民法第184條_explanation")
            .await
            .unwrap();
        store
            .upsert_edge(EdgeKind::Explains, "民法第184條", "民法第184條_explanation")
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.node_count, 1);
        assert_eq!(stats.edge_count, 1);
    }

    #[tokio::test]
    async fn reingestion_preserves_fact_embedding() {
        let (_dir, store) = temp_store().await;
        store
            .upsert_node(NodeKind::Fact, "Fact1", "事故經過")
            .await
            .unwrap();
        store
            .set_fact_embedding("Fact1", vec![0.5, 0.5])
            .await
            .unwrap();
        store
            .upsert_node(NodeKind::Fact, "Fact1", "事故經過")
            .await
            .unwrap();

        let facts = store.fact_embeddings().await.unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].vector, vec![0.5, 0.5]);
    }

    #[tokio::test]
    async fn two_hop_traversal_reaches_statutes() {
        let (_dir, store) = temp_store().await;
        store
            .upsert_node(NodeKind::Statute, "民法第184條", "條文")
            .await
            .unwrap();
        store.upsert_node(NodeKind::Case, "Case1", "全文").await.unwrap();
        store.upsert_node(NodeKind::Fact, "Fact1", "事實").await.unwrap();
        store
            .upsert_node(NodeKind::LegalReference, "Legal1", "法律依據")
            .await
            .unwrap();
        store.upsert_edge(EdgeKind::HasFact, "Case1", "Fact1").await.unwrap();
        store
            .upsert_edge(EdgeKind::CitesReference, "Case1", "Legal1")
            .await
            .unwrap();
        store
            .upsert_edge(EdgeKind::ReferencesStatute, "Legal1", "民法第184條")
            .await
            .unwrap();
        // Dangling reference: statute node never ingested
        store
            .upsert_edge(EdgeKind::ReferencesStatute, "Legal1", "民法第999條")
            .await
            .unwrap();

        let statutes = store.statutes_cited_by_fact("Fact1").await.unwrap();
        assert_eq!(
            statutes.into_iter().collect::<Vec<_>>(),
            vec!["民法第184條".to_string()]
        );
    }

    #[tokio::test]
    async fn unknown_fact_yields_empty_set() {
        let (_dir, store) = temp_store().await;
        let statutes = store.statutes_cited_by_fact("FactX").await.unwrap();
        assert!(statutes.is_empty());
    }

    #[tokio::test]
    async fn large_node_text_roundtrips_compressed() {
        let (_dir, store) = temp_store().await;
        let long_text = "判決書全文。".repeat(200);
        store
            .upsert_node(NodeKind::Case, "Case1", &long_text)
            .await
            .unwrap();
        let node = store.get_node(NodeKind::Case, "Case1").await.unwrap().unwrap();
        assert_eq!(node.text, long_text);
    }

    #[tokio::test]
    async fn reset_clears_everything() {
        let (_dir, store) = temp_store().await;
        store.upsert_node(NodeKind::Case, "Case1", "text").await.unwrap();
        store.upsert_edge(EdgeKind::HasFact, "Case1", "Fact1").await.unwrap();
        store.reset().await.unwrap();
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.node_count, 0);
        assert_eq!(stats.edge_count, 0);
    }
}
