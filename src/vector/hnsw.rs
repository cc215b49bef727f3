//! HNSW (Hierarchical Navigable Small World) graph for approximate
//! nearest neighbor search.
//!
//! Pure Rust implementation with:
//! - Arena-allocated nodes addressed by dense internal indexes
//! - Seeded level assignment, so the same insert sequence builds the same graph
//! - Heuristic neighbor selection with degree pruning
//! - Soft-delete via a tombstone set + filter-during-traversal search
//! - bincode snapshots for persistence
//!
//! # Thread Safety
//!
//! `HnswIndex` has no interior mutability. Inserts and tombstoning take
//! `&mut self`; searches take `&self`. The owner is responsible for
//! serializing writers against readers.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::mem::size_of;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::HnswConfig;
use crate::error::{PulseIndexError, Result, StorageError};
use crate::types::DocumentId;

use super::{validate_vector, DistanceMetric, VectorIndex, VectorRecord};

/// Snapshot format version. Bump on any change to the serialized layout.
const SNAPSHOT_VERSION: u32 = 1;

/// Upper bound on nodes pre-allocated from the `max_elements` hint.
const MAX_PREALLOCATED_NODES: usize = 65_536;

/// A node reached during traversal, ordered by distance to the query.
#[derive(Clone, Copy, Debug)]
struct Candidate {
    distance: f32,
    node: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Ties broken by insertion order so results are deterministic
        self.distance
            .total_cmp(&other.distance)
            .then(self.node.cmp(&other.node))
    }
}

/// A graph node: the stored vector plus one adjacency list per layer.
///
/// `neighbors[l]` exists for every layer `l <= level`.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct Node {
    id: DocumentId,
    vector: Vec<f32>,
    neighbors: Vec<Vec<usize>>,
}

impl Node {
    #[inline]
    fn level(&self) -> usize {
        self.neighbors.len().saturating_sub(1)
    }
}

/// HNSW vector index.
///
/// Each named index owns exactly one `HnswIndex`. The graph has no native
/// delete: [`VectorIndex::mark_deleted`] tombstones a node, and physically
/// dropping tombstones means building a new graph with
/// [`HnswIndex::rebuild_from_records`].
pub struct HnswIndex {
    /// Vector length shared by every node.
    dimension: usize,

    /// Fixed at creation.
    metric: DistanceMetric,

    /// Graph parameters, reused on rebuild.
    config: HnswConfig,

    /// Node arena. Internal IDs are positions in this vector.
    nodes: Vec<Node>,

    /// Live document ID → internal ID.
    id_to_node: HashMap<DocumentId, usize>,

    /// Tombstoned internal IDs (kept for navigation, never returned).
    deleted: HashSet<usize>,

    /// Node at the highest layer, where every search starts.
    entry_point: Option<usize>,

    /// Level of the entry point.
    max_level: usize,

    /// splitmix64 state for level assignment.
    rng_state: u64,

    /// Level multiplier `1 / ln(M)`.
    level_mult: f64,
}

impl std::fmt::Debug for HnswIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HnswIndex")
            .field("dimension", &self.dimension)
            .field("metric", &self.metric)
            .field("live", &self.id_to_node.len())
            .field("total", &self.nodes.len())
            .field("max_level", &self.max_level)
            .finish_non_exhaustive()
    }
}

/// Borrowed view used when writing a snapshot.
#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    dimension: usize,
    metric: DistanceMetric,
    config: &'a HnswConfig,
    nodes: &'a [Node],
    deleted: Vec<usize>,
    entry_point: Option<usize>,
    max_level: usize,
    rng_state: u64,
}

/// Owned snapshot read back from disk.
#[derive(Deserialize)]
struct Snapshot {
    version: u32,
    dimension: usize,
    metric: DistanceMetric,
    config: HnswConfig,
    nodes: Vec<Node>,
    deleted: Vec<usize>,
    entry_point: Option<usize>,
    max_level: usize,
    rng_state: u64,
}

fn level_multiplier(max_nb_connection: usize) -> f64 {
    1.0 / (max_nb_connection.max(2) as f64).ln()
}

fn corrupted(msg: impl Into<String>) -> PulseIndexError {
    PulseIndexError::Storage(StorageError::corrupted(msg))
}

impl HnswIndex {
    /// Creates a new empty HNSW index.
    ///
    /// # Arguments
    ///
    /// * `dimension` - Expected vector length (validated on insert and search)
    /// * `metric` - Distance metric, fixed for the lifetime of the graph
    /// * `config` - HNSW tuning parameters
    pub fn new(dimension: usize, metric: DistanceMetric, config: &HnswConfig) -> Self {
        Self {
            dimension,
            metric,
            config: config.clone(),
            nodes: Vec::with_capacity(config.max_elements.min(MAX_PREALLOCATED_NODES)),
            id_to_node: HashMap::new(),
            deleted: HashSet::new(),
            entry_point: None,
            max_level: 0,
            rng_state: config.level_seed,
            level_mult: level_multiplier(config.max_nb_connection),
        }
    }

    /// Builds a fresh index from a set of records.
    ///
    /// This is how deletes become physical: the caller collects the
    /// surviving records and builds a new graph with the same parameters.
    /// Records are validated up front; nothing is built if any is invalid.
    pub fn rebuild_from_records(
        dimension: usize,
        metric: DistanceMetric,
        config: &HnswConfig,
        records: &[VectorRecord],
    ) -> Result<Self> {
        let mut index = Self::new(dimension, metric, config);
        index.insert_batch(records)?;
        Ok(index)
    }

    /// Returns the graph parameters.
    pub fn config(&self) -> &HnswConfig {
        &self.config
    }

    /// Returns the total number of nodes, including tombstoned ones.
    pub fn total_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the number of layers in the graph (0 when empty).
    pub fn layer_count(&self) -> usize {
        if self.entry_point.is_some() {
            self.max_level + 1
        } else {
            0
        }
    }

    /// Returns the number of nodes present on the given layer.
    pub fn layer_size(&self, layer: usize) -> usize {
        self.nodes.iter().filter(|n| n.level() >= layer).count()
    }

    /// Returns the live records in insertion order.
    pub fn records(&self) -> Vec<VectorRecord> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(idx, _)| !self.deleted.contains(idx))
            .map(|(_, node)| VectorRecord::new(node.id.clone(), node.vector.clone()))
            .collect()
    }

    /// Approximate heap footprint of the graph in bytes.
    pub fn memory_usage(&self) -> usize {
        let nodes: usize = self
            .nodes
            .iter()
            .map(|n| {
                size_of::<Node>()
                    + n.id.as_str().len()
                    + n.vector.len() * size_of::<f32>()
                    + n.neighbors
                        .iter()
                        .map(|layer| size_of::<Vec<usize>>() + layer.len() * size_of::<usize>())
                        .sum::<usize>()
            })
            .sum();
        let map = self.id_to_node.len() * (size_of::<DocumentId>() + size_of::<usize>());
        let tombstones = self.deleted.len() * size_of::<usize>();
        nodes + map + tombstones
    }

    /// Serializes the whole graph (nodes, links, tombstones, RNG state).
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut deleted: Vec<usize> = self.deleted.iter().copied().collect();
        deleted.sort_unstable();

        let snapshot = SnapshotRef {
            version: SNAPSHOT_VERSION,
            dimension: self.dimension,
            metric: self.metric,
            config: &self.config,
            nodes: &self.nodes,
            deleted,
            entry_point: self.entry_point,
            max_level: self.max_level,
            rng_state: self.rng_state,
        };

        bincode::serialize(&snapshot)
            .map_err(|e| StorageError::serialization(format!("HNSW snapshot: {}", e)).into())
    }

    /// Restores a graph written by [`HnswIndex::to_bytes`].
    ///
    /// The structure is checked before use: every link must point at an
    /// existing node present on that layer, and every vector must have the
    /// recorded dimension.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let snapshot: Snapshot = bincode::deserialize(bytes)
            .map_err(|e| corrupted(format!("Invalid HNSW snapshot: {}", e)))?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(corrupted(format!(
                "Unsupported HNSW snapshot version {} (expected {})",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }
        if snapshot.dimension == 0 {
            return Err(corrupted("HNSW snapshot has zero dimension"));
        }
        snapshot
            .config
            .validate()
            .map_err(|e| corrupted(format!("Invalid HNSW parameters in snapshot: {}", e)))?;

        let count = snapshot.nodes.len();
        for (idx, node) in snapshot.nodes.iter().enumerate() {
            if node.vector.len() != snapshot.dimension {
                return Err(corrupted(format!(
                    "Node {} has dimension {} (expected {})",
                    idx,
                    node.vector.len(),
                    snapshot.dimension
                )));
            }
            if node.neighbors.is_empty() {
                return Err(corrupted(format!("Node {} has no layers", idx)));
            }
            for (layer, links) in node.neighbors.iter().enumerate() {
                for &nb in links {
                    if nb >= count || snapshot.nodes[nb].level() < layer {
                        return Err(corrupted(format!(
                            "Node {} links to invalid neighbor {} on layer {}",
                            idx, nb, layer
                        )));
                    }
                }
            }
        }

        match snapshot.entry_point {
            Some(ep) if ep >= count => {
                return Err(corrupted(format!("Entry point {} out of range", ep)));
            }
            Some(ep) if snapshot.nodes[ep].level() != snapshot.max_level => {
                return Err(corrupted("Entry point is not on the top layer"));
            }
            None if count > 0 => {
                return Err(corrupted("Non-empty graph without entry point"));
            }
            _ => {}
        }

        if let Some(&bad) = snapshot.deleted.iter().find(|&&d| d >= count) {
            return Err(corrupted(format!("Tombstone {} out of range", bad)));
        }

        let deleted: HashSet<usize> = snapshot.deleted.into_iter().collect();
        let mut id_to_node = HashMap::with_capacity(count);
        for (idx, node) in snapshot.nodes.iter().enumerate() {
            if !deleted.contains(&idx) {
                id_to_node.insert(node.id.clone(), idx);
            }
        }

        Ok(Self {
            dimension: snapshot.dimension,
            metric: snapshot.metric,
            level_mult: level_multiplier(snapshot.config.max_nb_connection),
            config: snapshot.config,
            nodes: snapshot.nodes,
            id_to_node,
            deleted,
            entry_point: snapshot.entry_point,
            max_level: snapshot.max_level,
            rng_state: snapshot.rng_state,
        })
    }

    // ======================================================================
    // Graph internals
    // ======================================================================

    /// Draws a level from the geometric distribution `floor(-ln(u) / ln(M))`.
    fn random_level(&mut self) -> usize {
        // splitmix64
        self.rng_state = self.rng_state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.rng_state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^= z >> 31;

        // Uniform in (0, 1], so ln() is finite
        let uniform = ((z >> 11) as f64 + 1.0) / (1u64 << 53) as f64;
        let level = (-uniform.ln() * self.level_mult).floor() as usize;
        level.min(self.config.max_layer)
    }

    #[inline]
    fn max_connections(&self, layer: usize) -> usize {
        if layer == 0 {
            self.config.max_nb_connection * 2
        } else {
            self.config.max_nb_connection
        }
    }

    #[inline]
    fn distance_to(&self, query: &[f32], node: usize) -> f32 {
        self.metric.distance(query, &self.nodes[node].vector)
    }

    #[inline]
    fn distance_between(&self, a: usize, b: usize) -> f32 {
        self.metric
            .distance(&self.nodes[a].vector, &self.nodes[b].vector)
    }

    /// Walks a single layer greedily towards the query.
    fn greedy_closest(&self, query: &[f32], mut best: Candidate, layer: usize) -> Candidate {
        loop {
            let mut changed = false;
            for &nb in &self.nodes[best.node].neighbors[layer] {
                let distance = self.distance_to(query, nb);
                if distance < best.distance {
                    best = Candidate { distance, node: nb };
                    changed = true;
                }
            }
            if !changed {
                return best;
            }
        }
    }

    /// Beam search over one layer.
    ///
    /// Every node is used for navigation; only nodes passing `accept` are
    /// collected. Returns up to `ef` accepted nodes sorted by ascending distance.
    fn search_layer(
        &self,
        query: &[f32],
        entry_points: &[Candidate],
        ef: usize,
        layer: usize,
        accept: Option<&dyn Fn(usize) -> bool>,
    ) -> Vec<Candidate> {
        let accepts = |node: usize| accept.map_or(true, |f| f(node));

        // ef can exceed the graph, and callers may pass any k
        let ef = ef.min(self.nodes.len()).max(1);
        let mut visited: HashSet<usize> =
            HashSet::with_capacity(ef.saturating_mul(4).min(self.nodes.len()));
        // Min-heap: closest unexplored candidate first
        let mut candidates: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();
        // Max-heap: worst accepted result on top for pruning
        let mut results: BinaryHeap<Candidate> = BinaryHeap::new();

        for &ep in entry_points {
            if visited.insert(ep.node) {
                candidates.push(Reverse(ep));
                if accepts(ep.node) {
                    results.push(ep);
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        while let Some(Reverse(current)) = candidates.pop() {
            if results.len() >= ef {
                if let Some(worst) = results.peek() {
                    if current.distance > worst.distance {
                        break;
                    }
                }
            }

            for &nb in &self.nodes[current.node].neighbors[layer] {
                if !visited.insert(nb) {
                    continue;
                }

                let candidate = Candidate {
                    distance: self.distance_to(query, nb),
                    node: nb,
                };
                let has_room = results.len() < ef;
                let closer = results
                    .peek()
                    .map_or(true, |worst| candidate.distance < worst.distance);

                if has_room || closer {
                    candidates.push(Reverse(candidate));
                    if accepts(nb) {
                        results.push(candidate);
                        if results.len() > ef {
                            results.pop();
                        }
                    }
                }
            }
        }

        results.into_sorted_vec()
    }

    /// Picks up to `m` neighbors from `candidates` (sorted ascending).
    ///
    /// A candidate is preferred when it is closer to the base node than to
    /// any neighbor already chosen, which keeps links spread across
    /// directions. Remaining slots are filled with the closest skipped ones.
    fn select_neighbors(&self, candidates: &[Candidate], m: usize) -> Vec<usize> {
        if candidates.len() <= m {
            return candidates.iter().map(|c| c.node).collect();
        }

        let mut selected: Vec<Candidate> = Vec::with_capacity(m);
        let mut skipped: Vec<Candidate> = Vec::new();

        for &candidate in candidates {
            if selected.len() >= m {
                break;
            }
            let diverse = selected
                .iter()
                .all(|s| self.distance_between(candidate.node, s.node) > candidate.distance);
            if diverse {
                selected.push(candidate);
            } else {
                skipped.push(candidate);
            }
        }

        for candidate in skipped {
            if selected.len() >= m {
                break;
            }
            selected.push(candidate);
        }

        selected.into_iter().map(|c| c.node).collect()
    }

    /// Shrinks a node's adjacency list on `layer` back to `max_conn`.
    fn prune_connections(&mut self, node: usize, layer: usize, max_conn: usize) {
        let mut scored: Vec<Candidate> = self.nodes[node].neighbors[layer]
            .iter()
            .map(|&nb| Candidate {
                distance: self.distance_between(node, nb),
                node: nb,
            })
            .collect();
        scored.sort();

        let kept = self.select_neighbors(&scored, max_conn);
        self.nodes[node].neighbors[layer] = kept;
    }

    /// Links a new node into the graph. The vector is already validated.
    fn insert_node(&mut self, id: DocumentId, vector: Vec<f32>) {
        let level = self.random_level();
        let node = self.nodes.len();
        self.nodes.push(Node {
            id: id.clone(),
            vector,
            neighbors: vec![Vec::new(); level + 1],
        });
        self.id_to_node.insert(id, node);

        let Some(entry) = self.entry_point else {
            self.entry_point = Some(node);
            self.max_level = level;
            return;
        };

        let query = self.nodes[node].vector.clone();
        let mut ep = Candidate {
            distance: self.distance_to(&query, entry),
            node: entry,
        };

        // Phase 1: greedy descent through layers above the new node's level
        for layer in ((level + 1)..=self.max_level).rev() {
            ep = self.greedy_closest(&query, ep, layer);
        }

        // Phase 2: connect on every layer from min(level, max_level) down to 0
        let mut entry_points = vec![ep];
        for layer in (0..=level.min(self.max_level)).rev() {
            let found = self.search_layer(
                &query,
                &entry_points,
                self.config.ef_construction.min(self.nodes.len()),
                layer,
                None,
            );
            let selected = self.select_neighbors(&found, self.config.max_nb_connection);
            let max_conn = self.max_connections(layer);

            for &nb in &selected {
                self.nodes[nb].neighbors[layer].push(node);
                if self.nodes[nb].neighbors[layer].len() > max_conn {
                    self.prune_connections(nb, layer, max_conn);
                }
            }
            self.nodes[node].neighbors[layer] = selected;

            if !found.is_empty() {
                entry_points = found;
            }
        }

        if level > self.max_level {
            self.max_level = level;
            self.entry_point = Some(node);
        }
    }
}

// ==========================================================================
// VectorIndex trait implementation
// ==========================================================================

impl VectorIndex for HnswIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn insert(&mut self, id: DocumentId, vector: &[f32]) -> Result<()> {
        validate_vector(vector, self.dimension)?;

        // Last write wins: the previous node stays only as a tombstone
        if let Some(previous) = self.id_to_node.get(&id).copied() {
            debug!(id = %id, "Replacing existing vector");
            self.deleted.insert(previous);
        }

        self.insert_node(id, vector.to_vec());
        Ok(())
    }

    fn insert_batch(&mut self, records: &[VectorRecord]) -> Result<()> {
        // Pre-pass: reject the whole batch before any mutation
        for record in records {
            validate_vector(&record.vector, self.dimension)?;
        }

        for record in records {
            self.insert(record.id.clone(), &record.vector)?;
        }

        debug!(count = records.len(), total = self.nodes.len(), "Batch inserted");
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize, ef_search: usize) -> Result<Vec<(DocumentId, f32)>> {
        self.search_filtered(query, k, ef_search, &|_| true)
    }

    fn search_filtered(
        &self,
        query: &[f32],
        k: usize,
        ef_search: usize,
        filter: &dyn Fn(&DocumentId) -> bool,
    ) -> Result<Vec<(DocumentId, f32)>> {
        validate_vector(query, self.dimension)?;

        let Some(entry) = self.entry_point else {
            return Ok(Vec::new());
        };
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut ep = Candidate {
            distance: self.distance_to(query, entry),
            node: entry,
        };
        for layer in (1..=self.max_level).rev() {
            ep = self.greedy_closest(query, ep, layer);
        }

        let accept = |node: usize| !self.deleted.contains(&node) && filter(&self.nodes[node].id);
        let ef = ef_search.max(k).min(self.nodes.len());
        let found = self.search_layer(query, &[ep], ef, 0, Some(&accept));

        Ok(found
            .into_iter()
            .take(k)
            .map(|c| (self.nodes[c.node].id.clone(), c.distance))
            .collect())
    }

    fn mark_deleted(&mut self, id: &DocumentId) -> bool {
        match self.id_to_node.remove(id) {
            Some(node) => {
                self.deleted.insert(node);
                true
            }
            None => false,
        }
    }

    fn is_deleted(&self, id: &DocumentId) -> bool {
        !self.id_to_node.contains_key(id) && self.deleted.iter().any(|&n| &self.nodes[n].id == id)
    }

    fn contains(&self, id: &DocumentId) -> bool {
        self.id_to_node.contains_key(id)
    }

    fn deleted_count(&self) -> usize {
        self.deleted.len()
    }

    fn len(&self) -> usize {
        self.id_to_node.len()
    }
}

// ==========================================================================
// Tests
// ==========================================================================
