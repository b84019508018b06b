//! Multi-table random-projection LSH index (sign-random-projections family,
//! the same hash family as `ritchie46/lsh-rs`'s `SignRandomProjections`,
//! reimplemented here over plain `Vec<f32>` instead of `ndarray` since the
//! rest of this crate has no array-algebra dependency to share it with).
//!
//! A signature is the `P`-bit packing of `sign(hyperplane_p . v)` for
//! `p in 0..P`, LSB = plane 0. Bucket maps are keyed by that packed `u32`
//! (P is small — default 8, capped well under 32 — so a packed integer is
//! both cheaper and simpler than `ritchie46`'s `Vec<K>` hash keys).

use crate::error::{Result, VdbError};
use crate::vector::{cosine_distance_unit, normalize, random_hyperplane, sign_bit};
use rand::SeedableRng;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct LshParams {
    pub tables: usize,
    pub planes: usize,
    pub seed: u64,
}

impl Default for LshParams {
    fn default() -> Self {
        Self {
            tables: 4,
            planes: 8,
            seed: 42,
        }
    }
}

pub struct LshIndex {
    dim: usize,
    params: LshParams,
    /// `hyperplanes[table][plane]` is a `dim`-length random direction.
    hyperplanes: Vec<Vec<Vec<f32>>>,
    buckets: Vec<HashMap<u32, HashSet<String>>>,
    vectors: HashMap<String, Vec<f32>>,
    signatures: HashMap<String, Vec<u32>>,
}

impl LshIndex {
    pub fn new(dim: usize, params: LshParams) -> Self {
        let hyperplanes = Self::draw_hyperplanes(dim, params);
        Self {
            dim,
            params,
            hyperplanes,
            buckets: (0..params.tables).map(|_| HashMap::new()).collect(),
            vectors: HashMap::new(),
            signatures: HashMap::new(),
        }
    }

    fn draw_hyperplanes(dim: usize, params: LshParams) -> Vec<Vec<Vec<f32>>> {
        // Re-seeding here (rather than threading one RNG through) is what
        // makes `rebuild_from` reproduce byte-identical bucket layout after
        // a snapshot reload: the sequence of draws only depends on
        // `(dim, params)`, never on process history.
        let mut rng = rand::rngs::StdRng::seed_from_u64(params.seed);
        (0..params.tables)
            .map(|_| {
                (0..params.planes)
                    .map(|_| random_hyperplane(dim, &mut rng))
                    .collect()
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    fn signature_for_table(&self, table: usize, vector: &[f32]) -> u32 {
        let mut sig = 0u32;
        for (plane, hyperplane) in self.hyperplanes[table].iter().enumerate() {
            let d = crate::vector::dot(hyperplane, vector);
            sig |= sign_bit(d) << plane;
        }
        sig
    }

    fn signatures_for(&self, vector: &[f32]) -> Vec<u32> {
        (0..self.params.tables)
            .map(|t| self.signature_for_table(t, vector))
            .collect()
    }

    pub fn add(&mut self, chunk_id: &str, vector: &[f32]) -> Result<()> {
        if self.vectors.contains_key(chunk_id) {
            return Err(VdbError::duplicate("chunk", chunk_id));
        }
        let normalized = normalize(vector)?;
        let sigs = self.signatures_for(&normalized);
        for (table, sig) in sigs.iter().enumerate() {
            self.buckets[table]
                .entry(*sig)
                .or_default()
                .insert(chunk_id.to_string());
        }
        self.vectors.insert(chunk_id.to_string(), normalized);
        self.signatures.insert(chunk_id.to_string(), sigs);
        Ok(())
    }

    pub fn remove(&mut self, chunk_id: &str) -> Result<()> {
        let sigs = self
            .signatures
            .remove(chunk_id)
            .ok_or_else(|| VdbError::not_found("chunk", chunk_id))?;
        self.vectors.remove(chunk_id);
        for (table, sig) in sigs.iter().enumerate() {
            if let Some(bucket) = self.buckets[table].get_mut(sig) {
                bucket.remove(chunk_id);
                if bucket.is_empty() {
                    self.buckets[table].remove(sig);
                }
            }
        }
        Ok(())
    }

    /// Equivalent to remove + add; the caller (the library's `IndexFacade`,
    /// itself only ever invoked while holding the library's reentrant lock)
    /// is what makes this atomic from an outside observer's point of view —
    /// there is no partial-update state visible between the two steps.
    pub fn update(&mut self, chunk_id: &str, vector: &[f32]) -> Result<()> {
        self.remove(chunk_id)?;
        self.add(chunk_id, vector)
    }

    /// Union of the query's bucket across all tables, scored by cosine
    /// distance and truncated to `k` with the same tie-break as
    /// `ExactIndex`. An empty union is returned as-is: this index never
    /// silently falls back to a brute-force scan.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(String, f32)>> {
        let normalized_query = normalize(query)?;
        let sigs = self.signatures_for(&normalized_query);

        let mut candidates: HashSet<&str> = HashSet::new();
        for (table, sig) in sigs.iter().enumerate() {
            if let Some(bucket) = self.buckets[table].get(sig) {
                candidates.extend(bucket.iter().map(String::as_str));
            }
        }

        let mut scored: Vec<(String, f32)> = candidates
            .into_iter()
            .map(|id| {
                let dist = cosine_distance_unit(&normalized_query, &self.vectors[id]);
                (id.to_string(), dist)
            })
            .collect();
        scored.sort_by(|(id_a, d_a), (id_b, d_b)| {
            d_a.partial_cmp(d_b)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| id_a.cmp(id_b))
        });
        scored.truncate(k);
        Ok(scored)
    }

    /// Clear all buckets, redraw projection matrices from `params.seed`, and
    /// re-insert every pair. Used on snapshot load and on algorithm swap so
    /// bucket identity never depends on in-memory history, only on the
    /// persisted `(dim, params)` plus the entity data.
    pub fn rebuild_from(dim: usize, params: LshParams, pairs: &[(String, Vec<f32>)]) -> Result<Self> {
        let mut index = Self::new(dim, params);
        for (id, vector) in pairs {
            index.add(id, vector)?;
        }
        Ok(index)
    }
}
