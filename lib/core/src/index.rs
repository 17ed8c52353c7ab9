use crate::{ArticleMetadata, Error, Result, Vector};
use ahash::AHashMap;
use ordered_float::OrderedFloat;
use parking_lot::RwLock;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BinaryHeap;
use std::fmt;
use std::str::FromStr;

/// Above this many records, distance scans run on the rayon pool.
const PARALLEL_SCAN_THRESHOLD: usize = 2048;

/// Distance metric used for nearest-neighbor ranking.
///
/// Every metric is non-negative, so [`similarity_score`] stays in (0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Distance {
    #[default]
    SquaredEuclidean,
    Euclidean,
    Cosine,
}

impl Distance {
    #[inline]
    pub fn between(&self, a: &Vector, b: &Vector) -> f32 {
        match self {
            Distance::SquaredEuclidean => a.squared_l2_distance(b),
            Distance::Euclidean => a.l2_distance(b),
            Distance::Cosine => (1.0 - a.cosine_similarity(b)).max(0.0),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Distance::SquaredEuclidean => "l2",
            Distance::Euclidean => "euclidean",
            Distance::Cosine => "cosine",
        }
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Distance {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "l2" | "squared_euclidean" => Ok(Distance::SquaredEuclidean),
            "euclidean" => Ok(Distance::Euclidean),
            "cosine" => Ok(Distance::Cosine),
            other => Err(Error::InvalidConfig(format!("unknown distance metric: {}", other))),
        }
    }
}

/// Map a distance to a similarity in (0, 1]; 1.0 only at zero distance.
#[inline]
pub fn similarity_score(distance: f32) -> f32 {
    // NaN and infinity would otherwise map to 0.0 or NaN
    let distance = if distance.is_nan() { f32::MAX } else { distance.clamp(0.0, f32::MAX) };
    1.0 / (1.0 + distance)
}

/// One article as stored in the vector index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedRecord {
    pub id: String,
    pub embedding: Vector,
    pub document: String,
    pub metadata: ArticleMetadata,
}

/// Configuration for a vector index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexConfig {
    pub dimension: usize,
    pub distance: Distance,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimension: crate::embedder::DEFAULT_HASHING_DIM,
            distance: Distance::default(),
        }
    }
}

#[derive(Default)]
struct Records {
    /// insertion order
    entries: Vec<IndexedRecord>,
    positions: AHashMap<String, usize>,
}

/// In-memory exact nearest-neighbor index keyed by article id.
///
/// Records are never updated in place: [`insert_if_absent`](Self::insert_if_absent)
/// keeps the first record for an id, and the only removal is [`reset`](Self::reset).
pub struct VectorIndex {
    config: IndexConfig,
    records: RwLock<Records>,
}

impl VectorIndex {
    pub fn new(config: IndexConfig) -> Self {
        Self {
            config,
            records: RwLock::new(Records::default()),
        }
    }

    /// Rebuild an index from records in their original insertion order.
    /// Repeated ids keep their first occurrence.
    pub fn from_records(config: IndexConfig, records: Vec<IndexedRecord>) -> Result<Self> {
        let index = Self::new(config);
        for record in records {
            index.insert_if_absent(record)?;
        }
        Ok(index)
    }

    #[inline]
    pub fn config(&self) -> IndexConfig {
        self.config
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    #[inline]
    pub fn distance(&self) -> Distance {
        self.config.distance
    }

    pub fn count(&self) -> usize {
        self.records.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.read().positions.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<IndexedRecord> {
        let records = self.records.read();
        records.positions.get(id).map(|&pos| records.entries[pos].clone())
    }

    /// Insert unless the id is already present. The check and the insert
    /// happen under one write lock. Returns `false` for a duplicate.
    pub fn insert_if_absent(&self, record: IndexedRecord) -> Result<bool> {
        if record.embedding.dim() != self.config.dimension {
            return Err(Error::InvalidDimension {
                expected: self.config.dimension,
                actual: record.embedding.dim(),
            });
        }

        let mut records = self.records.write();
        if records.positions.contains_key(&record.id) {
            return Ok(false);
        }
        let pos = records.entries.len();
        records.positions.insert(record.id.clone(), pos);
        records.entries.push(record);
        Ok(true)
    }

    /// The `k` records closest to `query`, nearest first.
    /// Equal distances keep insertion order.
    pub fn nearest(&self, query: &Vector, k: usize) -> Result<Vec<(IndexedRecord, f32)>> {
        if query.dim() != self.config.dimension {
            return Err(Error::InvalidDimension {
                expected: self.config.dimension,
                actual: query.dim(),
            });
        }

        let records = self.records.read();
        if k == 0 || records.entries.is_empty() {
            return Ok(Vec::new());
        }

        let distance = self.config.distance;
        let scored: Vec<(OrderedFloat<f32>, usize)> = if records.entries.len() >= PARALLEL_SCAN_THRESHOLD {
            records
                .entries
                .par_iter()
                .enumerate()
                .map(|(pos, r)| (OrderedFloat(distance.between(query, &r.embedding)), pos))
                .collect()
        } else {
            records
                .entries
                .iter()
                .enumerate()
                .map(|(pos, r)| (OrderedFloat(distance.between(query, &r.embedding)), pos))
                .collect()
        };

        // max-heap of the best k seen so far; the worst sits on top
        let mut best: BinaryHeap<(OrderedFloat<f32>, usize)> = BinaryHeap::with_capacity(k + 1);
        for candidate in scored {
            best.push(candidate);
            if best.len() > k {
                best.pop();
            }
        }

        Ok(best
            .into_sorted_vec()
            .into_iter()
            .map(|(dist, pos)| (records.entries[pos].clone(), dist.into_inner()))
            .collect())
    }

    /// First `n` records in insertion order
    pub fn peek(&self, n: usize) -> Vec<IndexedRecord> {
        self.records.read().entries.iter().take(n).cloned().collect()
    }

    /// All records in insertion order
    pub fn records(&self) -> Vec<IndexedRecord> {
        self.records.read().entries.clone()
    }

    /// Drop every record
    pub fn reset(&self) {
        let mut records = self.records.write();
        records.entries.clear();
        records.positions.clear();
    }
}
