//! # Retrieval Engine Module
//!
//! ## Purpose
//! Resolves a free-text accident description to the civil-code statutes the
//! most similar precedent cases cited, by embedding the query, finding the
//! nearest fact narratives in the vector index, and walking the graph from
//! each fact to the statutes its case references.
//!
//! ## Input/Output Specification
//! - **Input**: Fact description and injury description (joined with a
//!   single space before embedding), optional per-query k
//! - **Output**: Deduplicated statute ids in ascending lexicographic order;
//!   optionally joined with article text and explanation, or packaged as a
//!   structured drafting payload
//! - **Determinism**: Same store contents and query text always produce the
//!   same statute list
//!
//! ## Key Features
//! - Multi-hop traversal: query -> nearest facts -> cases -> legal
//!   references -> statutes
//! - Fewer than k indexed facts degrades gracefully; an empty store yields
//!   an empty result, never an error
//! - Lenient enrichment: unknown statute ids are dropped, a statute without
//!   an explanation is returned with `explanation: None`

use crate::config::Config;
use crate::embedding::Embedder;
use crate::errors::Result;
use crate::graph::GraphStore;
use crate::utils::Timer;
use crate::vector::{IndexManager, SearchHit};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// A resolved statute with its article text and plain-language explanation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatuteDetail {
    /// Canonical statute id, e.g. `民法第191-2條`
    pub id: String,
    /// Article text
    pub text: String,
    /// Plain-language explanation, when one was ingested
    pub explanation: Option<String>,
}

/// Structured payload for downstream complaint drafting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftingRequest {
    /// Accident fact description as given by the user
    pub fact_text: String,
    /// Injury description as given by the user
    pub injury_text: String,
    /// Compensation request text as given by the user
    pub compensation_text: String,
    /// Statutes resolved from the fact and injury descriptions, with
    /// article text and explanations
    pub resolved_statutes: Vec<StatuteDetail>,
}

/// Multi-hop retrieval engine over the graph store and vector index
pub struct RetrievalEngine {
    store: Arc<GraphStore>,
    index: IndexManager,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
}

impl RetrievalEngine {
    pub fn new(store: Arc<GraphStore>, embedder: Arc<dyn Embedder>, config: &Config) -> Self {
        let index = IndexManager::new(
            config.vector.index_dir.clone(),
            config.vector.hnsw.clone(),
            config.vector.dimension,
        );
        Self {
            store,
            index,
            embedder,
            top_k: config.retrieval.top_k,
        }
    }

    /// The k nearest fact narratives to the combined query text
    pub async fn nearest_facts(
        &self,
        fact_text: &str,
        injury_text: &str,
        k: Option<usize>,
    ) -> Result<Vec<SearchHit>> {
        let query = Self::combine_query(fact_text, injury_text);
        let vector = self.embedder.embed(&query).await?;
        let index = self.index.ensure_loaded(&self.store).await?;
        index.search(&vector, k.unwrap_or(self.top_k))
    }

    /// Resolve the statutes cited by the cases behind the k nearest facts.
    ///
    /// The per-fact statute sets are unioned and returned in ascending
    /// lexicographic order.
    pub async fn resolve_statutes(
        &self,
        fact_text: &str,
        injury_text: &str,
        k: Option<usize>,
    ) -> Result<Vec<String>> {
        let timer = Timer::new("resolve_statutes");

        let hits = self.nearest_facts(fact_text, injury_text, k).await?;
        let mut statutes = BTreeSet::new();
        for hit in &hits {
            statutes.extend(self.store.statutes_cited_by_fact(&hit.fact_id).await?);
        }

        let elapsed = timer.stop();
        tracing::info!(
            "Resolved {} statutes from {} nearest facts in {}ms",
            statutes.len(),
            hits.len(),
            elapsed
        );
        Ok(statutes.into_iter().collect())
    }

    /// Enrich statute ids with article text and explanations.
    ///
    /// Lenient: ids with no stored statute node are dropped, and order of
    /// the input ids is preserved.
    pub async fn statutes_with_explanations(&self, ids: &[String]) -> Result<Vec<StatuteDetail>> {
        let mut details = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some((text, explanation)) = self.store.statute_with_explanation(id).await? {
                details.push(StatuteDetail {
                    id: id.clone(),
                    text,
                    explanation,
                });
            } else {
                tracing::warn!("Resolved statute '{}' has no stored node, dropping", id);
            }
        }
        Ok(details)
    }

    /// Assemble the full drafting payload for a user request
    pub async fn drafting_payload(
        &self,
        fact_text: &str,
        injury_text: &str,
        compensation_text: &str,
        k: Option<usize>,
    ) -> Result<DraftingRequest> {
        let ids = self.resolve_statutes(fact_text, injury_text, k).await?;
        let resolved_statutes = self.statutes_with_explanations(&ids).await?;
        Ok(DraftingRequest {
            fact_text: fact_text.to_string(),
            injury_text: injury_text.to_string(),
            compensation_text: compensation_text.to_string(),
            resolved_statutes,
        })
    }

    /// Drop the cached vector index so the next query rebuilds it from the
    /// store. Call after re-ingesting or re-embedding.
    pub fn invalidate_index(&self) -> Result<()> {
        self.index.invalidate()
    }

    fn combine_query(fact_text: &str, injury_text: &str) -> String {
        match (fact_text.trim(), injury_text.trim()) {
            (fact, "") => fact.to_string(),
            ("", injury) => injury.to_string(),
            (fact, injury) => format!("{} {}", fact, injury),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_joins_fact_and_injury_with_one_space() {
        assert_eq!(
            RetrievalEngine::combine_query("被告駕車追撞", "原告骨折"),
            "被告駕車追撞 原告骨折"
        );
    }

    #[test]
    fn query_omits_empty_segments() {
        assert_eq!(RetrievalEngine::combine_query("被告駕車追撞", ""), "被告駕車追撞");
        assert_eq!(RetrievalEngine::combine_query("", "原告骨折"), "原告骨折");
        assert_eq!(RetrievalEngine::combine_query("", ""), "");
    }

    #[test]
    fn drafting_request_serializes_with_stable_field_names() {
        let request = DraftingRequest {
            fact_text: "事實".to_string(),
            injury_text: "傷害".to_string(),
            compensation_text: "賠償".to_string(),
            resolved_statutes: vec![StatuteDetail {
                id: "民法第184條".to_string(),
                text: "因故意或過失，不法侵害他人之權利者".to_string(),
                explanation: None,
            }],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["fact_text"], "事實");
        assert_eq!(json["resolved_statutes"][0]["id"], "民法第184條");
        assert!(json["resolved_statutes"][0]["explanation"].is_null());
    }
}
