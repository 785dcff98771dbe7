//! # Vector Index Module
//!
//! ## Purpose
//! Approximate nearest-neighbor search over fact embeddings using a layered
//! proximity graph (HNSW), built from the graph store, persisted to disk,
//! and rebuilt on demand.
//!
//! ## Input/Output Specification
//! - **Input**: Fact embeddings `(fact_id, text, vector)` from the graph
//!   store; query vectors at search time
//! - **Output**: Up to k nearest facts, nearest first, squared-L2 distance
//! - **Artifacts**: `fact_index.hnsw` (graph + vectors) and
//!   `fact_metadata.bin` (side-table of fact ids and texts in insertion
//!   order); the pair is versioned together
//!
//! ## Key Features
//! - HNSW construction with M=32, efConstruction=200, efSearch=100 defaults
//! - Deterministic level assignment, so identical inputs build identical
//!   graphs
//! - Atomic persistence: write to a temp file, then rename into place, so a
//!   crash mid-build never leaves a loadable partial snapshot
//! - Self-healing load: absent or corrupt artifacts trigger one rebuild from
//!   the graph store, never an error to the query caller

use crate::config::HnswConfig;
use crate::errors::{KgError, Result};
use crate::graph::{FactEmbedding, GraphStore};
use crate::utils::Timer;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File name of the serialized ANN structure
pub const INDEX_FILE: &str = "fact_index.hnsw";
/// File name of the side-table mapping position -> (fact_id, fact_text)
pub const METADATA_FILE: &str = "fact_metadata.bin";

/// One entry handed to [`VectorIndex::build`]
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub fact_id: String,
    pub text: String,
    pub vector: Vec<f32>,
}

impl From<FactEmbedding> for IndexEntry {
    fn from(fact: FactEmbedding) -> Self {
        Self {
            fact_id: fact.fact_id,
            text: fact.text,
            vector: fact.vector,
        }
    }
}

/// One search result, nearest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub fact_id: String,
    pub fact_text: String,
    /// Squared L2 distance to the query (FAISS convention; an exact match
    /// scores 0.0)
    pub distance: f32,
}

/// Side-table row persisted next to the ANN structure
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SideEntry {
    fact_id: String,
    text: String,
}

/// Candidate ordered by distance, ties by insertion position.
///
/// `BinaryHeap` is a max-heap; `Reverse` turns it into the min-heap the
/// search frontier needs.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    distance: f32,
    position: usize,
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.position.cmp(&other.position))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Layered proximity graph over the stored vectors
#[derive(Debug, Serialize, Deserialize)]
struct HnswGraph {
    dimension: usize,
    m: usize,
    ef_construction: usize,
    entry_point: Option<usize>,
    max_level: usize,
    vectors: Vec<Vec<f32>>,
    /// Top layer of each node
    levels: Vec<usize>,
    /// neighbors[node][layer] -> neighbor positions
    neighbors: Vec<Vec<Vec<u32>>>,
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// SplitMix64 keyed by insertion position: deterministic builds without a
/// PRNG dependency
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e3779b97f4a7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d049bb133111eb);
    x ^ (x >> 31)
}

impl HnswGraph {
    fn new(dimension: usize, config: &HnswConfig) -> Self {
        Self {
            dimension,
            m: config.m,
            ef_construction: config.ef_construction,
            entry_point: None,
            max_level: 0,
            vectors: Vec::new(),
            levels: Vec::new(),
            neighbors: Vec::new(),
        }
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Geometric level distribution with the standard 1/ln(M) factor
    fn assign_level(&self, position: usize) -> usize {
        let bits = splitmix64(position as u64 ^ 0x51_7cc1b727220a95);
        let unit = ((bits >> 11) as f64 + 1.0) / (1u64 << 53) as f64;
        let level = (-unit.ln() / (self.m as f64).ln()).floor();
        level as usize
    }

    /// Degree cap per layer: 2M at layer 0, M above
    fn max_degree(&self, layer: usize) -> usize {
        if layer == 0 {
            self.m * 2
        } else {
            self.m
        }
    }

    /// Greedy descent on one layer toward the query
    fn greedy_closest(&self, query: &[f32], start: usize, layer: usize) -> usize {
        let mut current = start;
        let mut current_dist = squared_l2(query, &self.vectors[current]);
        loop {
            let mut improved = false;
            for &neighbor in &self.neighbors[current][layer] {
                let dist = squared_l2(query, &self.vectors[neighbor as usize]);
                if dist < current_dist {
                    current = neighbor as usize;
                    current_dist = dist;
                    improved = true;
                }
            }
            if !improved {
                return current;
            }
        }
    }

    /// Beam search on one layer; returns up to `ef` candidates sorted
    /// nearest-first (ties by insertion position)
    fn search_layer(&self, query: &[f32], entry: usize, ef: usize, layer: usize) -> Vec<Candidate> {
        let entry_candidate = Candidate {
            distance: squared_l2(query, &self.vectors[entry]),
            position: entry,
        };

        let mut visited: HashSet<usize> = HashSet::new();
        visited.insert(entry);

        // Frontier is a min-heap, results a max-heap capped at ef
        let mut frontier: BinaryHeap<std::cmp::Reverse<Candidate>> = BinaryHeap::new();
        frontier.push(std::cmp::Reverse(entry_candidate));
        let mut results: BinaryHeap<Candidate> = BinaryHeap::new();
        results.push(entry_candidate);

        while let Some(std::cmp::Reverse(candidate)) = frontier.pop() {
            let worst = results.peek().map(|c| c.distance).unwrap_or(f32::INFINITY);
            if results.len() >= ef && candidate.distance > worst {
                break;
            }
            for &neighbor in &self.neighbors[candidate.position][layer] {
                let neighbor = neighbor as usize;
                if !visited.insert(neighbor) {
                    continue;
                }
                let dist = squared_l2(query, &self.vectors[neighbor]);
                let worst = results.peek().map(|c| c.distance).unwrap_or(f32::INFINITY);
                if results.len() < ef || dist < worst {
                    let next = Candidate {
                        distance: dist,
                        position: neighbor,
                    };
                    frontier.push(std::cmp::Reverse(next));
                    results.push(next);
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        let mut sorted = results.into_vec();
        sorted.sort();
        sorted
    }

    /// Insert one vector; position is the insertion index
    fn insert(&mut self, vector: Vec<f32>) {
        let position = self.len();
        let level = self.assign_level(position);

        self.vectors.push(vector);
        self.levels.push(level);
        self.neighbors.push(vec![Vec::new(); level + 1]);

        let entry = match self.entry_point {
            Some(entry) => entry,
            None => {
                self.entry_point = Some(position);
                self.max_level = level;
                return;
            }
        };

        let query = self.vectors[position].clone();
        let mut current = entry;

        // Descend through layers above the new node's level
        let mut layer = self.max_level;
        while layer > level {
            current = self.greedy_closest(&query, current, layer);
            layer -= 1;
        }

        // Connect on each layer from min(level, max_level) down to 0
        let top = level.min(self.max_level);
        for layer in (0..=top).rev() {
            let candidates = self.search_layer(&query, current, self.ef_construction, layer);
            current = candidates.first().map(|c| c.position).unwrap_or(current);

            let cap = self.max_degree(layer);
            let selected: Vec<u32> = candidates
                .iter()
                .take(cap)
                .map(|c| c.position as u32)
                .collect();

            for &neighbor in &selected {
                self.link(position, neighbor as usize, layer);
            }
        }

        if level > self.max_level {
            self.max_level = level;
            self.entry_point = Some(position);
        }
    }

    /// Add a bidirectional link on `layer`, pruning each side to its cap by
    /// distance
    fn link(&mut self, a: usize, b: usize, layer: usize) {
        let cap = self.max_degree(layer);
        for (from, to) in [(a, b), (b, a)] {
            let list = &mut self.neighbors[from][layer];
            if list.contains(&(to as u32)) {
                continue;
            }
            list.push(to as u32);
            if list.len() > cap {
                let base = self.vectors[from].clone();
                let mut scored: Vec<Candidate> = self.neighbors[from][layer]
                    .iter()
                    .map(|&n| Candidate {
                        distance: squared_l2(&base, &self.vectors[n as usize]),
                        position: n as usize,
                    })
                    .collect();
                scored.sort();
                self.neighbors[from][layer] =
                    scored.iter().take(cap).map(|c| c.position as u32).collect();
            }
        }
    }

    /// k nearest positions to the query, nearest first
    fn search(&self, query: &[f32], k: usize, ef_search: usize) -> Vec<Candidate> {
        let entry = match self.entry_point {
            Some(entry) => entry,
            None => return Vec::new(),
        };

        let mut current = entry;
        for layer in (1..=self.max_level).rev() {
            current = self.greedy_closest(query, current, layer);
        }

        let ef = ef_search.max(k);
        let mut candidates = self.search_layer(query, current, ef, 0);
        candidates.truncate(k);
        candidates
    }
}

/// Approximate nearest-neighbor index over fact embeddings plus its
/// side-table.
///
/// The index and the side-table always have the same length and the same
/// insertion order; a mismatch after load is a `CorruptIndex` condition.
#[derive(Debug)]
pub struct VectorIndex {
    graph: HnswGraph,
    side: Vec<SideEntry>,
    ef_search: usize,
}

impl VectorIndex {
    /// Build an index over the given entries.
    ///
    /// All vectors must share one dimension; the first entry's length (or
    /// `expected_dimension` when non-zero) is authoritative and any deviation
    /// fails with `DimensionMismatch`.
    pub fn build(
        entries: Vec<IndexEntry>,
        config: &HnswConfig,
        expected_dimension: usize,
    ) -> Result<Self> {
        let timer = Timer::new("vector_index_build");

        let dimension = if expected_dimension > 0 {
            expected_dimension
        } else {
            entries.first().map(|e| e.vector.len()).unwrap_or(0)
        };

        let mut graph = HnswGraph::new(dimension, config);
        let mut side = Vec::with_capacity(entries.len());

        for entry in entries {
            if entry.vector.len() != dimension {
                return Err(KgError::DimensionMismatch {
                    fact_id: entry.fact_id,
                    expected: dimension,
                    found: entry.vector.len(),
                });
            }
            graph.insert(entry.vector);
            side.push(SideEntry {
                fact_id: entry.fact_id,
                text: entry.text,
            });
        }

        let elapsed = timer.stop();
        tracing::info!(
            "Built vector index with {} entries (dim {}) in {}ms",
            side.len(),
            dimension,
            elapsed
        );

        Ok(Self {
            graph,
            side,
            ef_search: config.ef_search,
        })
    }

    /// Number of indexed entries
    pub fn len(&self) -> usize {
        self.side.len()
    }

    pub fn is_empty(&self) -> bool {
        self.side.is_empty()
    }

    /// Embedding dimension of the indexed vectors
    pub fn dimension(&self) -> usize {
        self.graph.dimension
    }

    /// Up to k nearest entries, nearest first, squared-L2 distance, ties
    /// broken by insertion order. Returns fewer than k results when the
    /// index holds fewer entries.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if !self.is_empty() && query.len() != self.graph.dimension {
            return Err(KgError::DimensionMismatch {
                fact_id: "<query>".to_string(),
                expected: self.graph.dimension,
                found: query.len(),
            });
        }

        Ok(self
            .graph
            .search(query, k, self.ef_search)
            .into_iter()
            .map(|c| SearchHit {
                fact_id: self.side[c.position].fact_id.clone(),
                fact_text: self.side[c.position].text.clone(),
                distance: c.distance,
            })
            .collect())
    }

    /// Persist both artifacts atomically: serialize to a temp file in the
    /// target directory, then rename into place.
    pub fn persist(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        Self::write_atomic(&dir.join(INDEX_FILE), &bincode::serialize(&self.graph)?)?;
        Self::write_atomic(&dir.join(METADATA_FILE), &bincode::serialize(&self.side)?)?;
        tracing::info!("Persisted vector index ({} entries) to {:?}", self.len(), dir);
        Ok(())
    }

    fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
        let dir = path.parent().ok_or_else(|| KgError::Internal {
            message: format!("index path {:?} has no parent directory", path),
        })?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.flush()?;
        tmp.persist(path).map_err(|e| KgError::Internal {
            message: format!("failed to replace {:?}: {}", path, e),
        })?;
        Ok(())
    }

    /// Load a persisted index pair.
    ///
    /// Returns `Ok(None)` when either artifact is absent (caller rebuilds);
    /// fails with `CorruptIndex` when the files exist but cannot be decoded
    /// or disagree in length.
    pub fn load(dir: &Path, ef_search: usize) -> Result<Option<Self>> {
        let index_path = dir.join(INDEX_FILE);
        let meta_path = dir.join(METADATA_FILE);
        if !index_path.exists() || !meta_path.exists() {
            return Ok(None);
        }

        let graph: HnswGraph =
            bincode::deserialize(&std::fs::read(&index_path)?).map_err(|e| {
                KgError::CorruptIndex {
                    details: format!("unreadable ANN structure: {}", e),
                }
            })?;
        let side: Vec<SideEntry> =
            bincode::deserialize(&std::fs::read(&meta_path)?).map_err(|e| {
                KgError::CorruptIndex {
                    details: format!("unreadable side-table: {}", e),
                }
            })?;

        if graph.len() != side.len() {
            return Err(KgError::CorruptIndex {
                details: format!(
                    "side-table length {} != index length {}",
                    side.len(),
                    graph.len()
                ),
            });
        }

        Ok(Some(Self {
            graph,
            side,
            ef_search,
        }))
    }
}

/// Lazily loaded index cache: {Unloaded -> Ready}, transitioning through a
/// single rebuild on any load failure.
pub struct IndexManager {
    dir: PathBuf,
    config: HnswConfig,
    expected_dimension: usize,
    state: RwLock<Option<Arc<VectorIndex>>>,
}

impl IndexManager {
    pub fn new(dir: PathBuf, config: HnswConfig, expected_dimension: usize) -> Self {
        Self {
            dir,
            config,
            expected_dimension,
            state: RwLock::new(None),
        }
    }

    /// Return the ready index, loading the persisted snapshot or rebuilding
    /// it from the graph store. Rebuilds at most once per call; corruption
    /// is self-healed, never surfaced to the caller.
    pub async fn ensure_loaded(&self, store: &GraphStore) -> Result<Arc<VectorIndex>> {
        if let Some(index) = self.state.read().as_ref() {
            return Ok(index.clone());
        }

        let loaded = match VectorIndex::load(&self.dir, self.config.ef_search) {
            Ok(Some(index)) => {
                tracing::info!("Loaded vector index ({} entries) from {:?}", index.len(), self.dir);
                index
            }
            Ok(None) => {
                tracing::info!("No persisted vector index at {:?}, building", self.dir);
                self.rebuild(store).await?
            }
            Err(e @ KgError::CorruptIndex { .. }) => {
                tracing::warn!("{}; rebuilding vector index from graph store", e);
                self.rebuild(store).await?
            }
            Err(e) => return Err(e),
        };

        let index = Arc::new(loaded);
        *self.state.write() = Some(index.clone());
        Ok(index)
    }

    async fn rebuild(&self, store: &GraphStore) -> Result<VectorIndex> {
        let entries: Vec<IndexEntry> = store
            .fact_embeddings()
            .await?
            .into_iter()
            .map(IndexEntry::from)
            .collect();
        let index = VectorIndex::build(entries, &self.config, self.expected_dimension)?;
        index.persist(&self.dir)?;
        Ok(index)
    }

    /// Drop the cached index and remove the persisted artifacts, forcing a
    /// rebuild on the next query
    pub fn invalidate(&self) -> Result<()> {
        *self.state.write() = None;
        for file in [INDEX_FILE, METADATA_FILE] {
            let path = self.dir.join(file);
            if path.exists() {
                std::fs::remove_file(path)?;
            }
        }
        tracing::info!("Vector index invalidated");
        Ok(())
    }
}
