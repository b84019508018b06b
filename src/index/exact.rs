//! Brute-force exact nearest-neighbor index.
//!
//! Storage follows `abkve`'s structure-of-arrays layout: one flat `Vec<f32>`
//! with vector `i` at `data[i*dim..(i+1)*dim]`, plus a parallel `ids` vector
//! and a `chunk_id -> row` lookup map. Removal is an O(1) swap-remove of the
//! last row into the vacated slot, same as the original. Scoring switches to
//! a rayon parallel scan above [`PARALLEL_SCAN_THRESHOLD`], the same
//! crossover `abkve`'s `search`/`search_parallel` split was built around.

use crate::error::{Result, VdbError};
use crate::vector::{cosine_distance_unit, normalize};
use rayon::prelude::*;
use std::collections::HashMap;

/// Below this many stored vectors, scoring sequentially avoids rayon's
/// thread-dispatch overhead; above it, the parallel scan wins (same
/// crossover `abkve`'s own `search_parallel` was built for).
const PARALLEL_SCAN_THRESHOLD: usize = 2048;

pub struct ExactIndex {
    dim: usize,
    data: Vec<f32>,
    ids: Vec<String>,
    lookup: HashMap<String, usize>,
}

impl ExactIndex {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            data: Vec::new(),
            ids: Vec::new(),
            lookup: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn row(&self, idx: usize) -> &[f32] {
        &self.data[idx * self.dim..(idx + 1) * self.dim]
    }

    pub fn add(&mut self, chunk_id: &str, vector: &[f32]) -> Result<()> {
        if self.lookup.contains_key(chunk_id) {
            return Err(VdbError::duplicate("chunk", chunk_id));
        }
        let normalized = normalize(vector)?;
        self.lookup.insert(chunk_id.to_string(), self.ids.len());
        self.ids.push(chunk_id.to_string());
        self.data.extend_from_slice(&normalized);
        Ok(())
    }

    pub fn remove(&mut self, chunk_id: &str) -> Result<()> {
        let idx = self
            .lookup
            .remove(chunk_id)
            .ok_or_else(|| VdbError::not_found("chunk", chunk_id))?;

        let last = self.ids.len() - 1;
        if idx != last {
            // Swap the last row into the vacated slot.
            let dim = self.dim;
            let last_start = last * dim;
            let last_row: Vec<f32> = self.data[last_start..last_start + dim].to_vec();
            let dst_start = idx * dim;
            self.data[dst_start..dst_start + dim].copy_from_slice(&last_row);
            self.ids.swap(idx, last);
            let moved_id = self.ids[idx].clone();
            self.lookup.insert(moved_id, idx);
        }
        self.data.truncate(last * self.dim);
        self.ids.truncate(last);
        Ok(())
    }

    pub fn update(&mut self, chunk_id: &str, vector: &[f32]) -> Result<()> {
        let idx = *self
            .lookup
            .get(chunk_id)
            .ok_or_else(|| VdbError::not_found("chunk", chunk_id))?;
        let normalized = normalize(vector)?;
        let start = idx * self.dim;
        self.data[start..start + self.dim].copy_from_slice(&normalized);
        Ok(())
    }

    /// Top-k by cosine distance, ties broken by ascending `chunk_id`. If
    /// fewer than `k` vectors are stored, all are returned.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(String, f32)>> {
        let normalized_query = normalize(query)?;
        let mut scored: Vec<(String, f32)> = if self.ids.len() >= PARALLEL_SCAN_THRESHOLD {
            (0..self.ids.len())
                .into_par_iter()
                .map(|i| {
                    let dist = cosine_distance_unit(&normalized_query, self.row(i));
                    (self.ids[i].clone(), dist)
                })
                .collect()
        } else {
            (0..self.ids.len())
                .map(|i| {
                    let dist = cosine_distance_unit(&normalized_query, self.row(i));
                    (self.ids[i].clone(), dist)
                })
                .collect()
        };
        scored.sort_by(|(id_a, d_a), (id_b, d_b)| {
            d_a.partial_cmp(d_b)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| id_a.cmp(id_b))
        });
        scored.truncate(k);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_returns_nearest_first_with_deterministic_tie_break() {
        let mut idx = ExactIndex::new(3);
        idx.add("c", &[1.0, 0.0, 0.0]).unwrap();
        idx.add("a", &[1.0, 0.0, 0.0]).unwrap();
        idx.add("b", &[0.0, 1.0, 0.0]).unwrap();

        let results = idx.search(&[1.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(results.len(), 2);
        // "a" and "c" tie at distance 0; ascending chunk_id breaks the tie.
        assert_eq!(results[0].0, "a");
        assert_eq!(results[1].0, "c");
    }

    #[test]
    fn search_with_k_larger_than_store_returns_everything() {
        let mut idx = ExactIndex::new(2);
        idx.add("a", &[1.0, 0.0]).unwrap();
        let results = idx.search(&[1.0, 0.0], 50).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn add_duplicate_id_fails() {
        let mut idx = ExactIndex::new(2);
        idx.add("a", &[1.0, 0.0]).unwrap();
        let err = idx.add("a", &[0.0, 1.0]).unwrap_err();
        assert!(matches!(err, VdbError::DuplicateId { .. }));
    }

    #[test]
    fn remove_unknown_id_fails() {
        let mut idx = ExactIndex::new(2);
        let err = idx.remove("ghost").unwrap_err();
        assert!(matches!(err, VdbError::NotFound { .. }));
    }

    #[test]
    fn remove_swaps_last_row_into_vacated_slot() {
        let mut idx = ExactIndex::new(2);
        idx.add("a", &[1.0, 0.0]).unwrap();
        idx.add("b", &[0.0, 1.0]).unwrap();
        idx.add("c", &[0.7, 0.7]).unwrap();

        idx.remove("a").unwrap();
        assert_eq!(idx.len(), 2);
        // "c" (formerly last) should have moved into "a"'s old slot and
        // still be findable / searchable correctly.
        let results = idx.search(&[0.7, 0.7], 1).unwrap();
        assert_eq!(results[0].0, "c");
    }

    #[test]
    fn update_replaces_vector_in_place() {
        let mut idx = ExactIndex::new(2);
        idx.add("a", &[1.0, 0.0]).unwrap();
        idx.update("a", &[0.0, 1.0]).unwrap();
        let results = idx.search(&[0.0, 1.0], 1).unwrap();
        assert_eq!(results[0].0, "a");
        assert!(results[0].1.abs() < 1e-5);
    }

    #[test]
    fn search_above_the_parallel_threshold_matches_sequential_results() {
        let mut idx = ExactIndex::new(4);
        for i in 0..(PARALLEL_SCAN_THRESHOLD + 10) {
            let v = [i as f32, 0.0, 0.0, 1.0];
            idx.add(&i.to_string(), &v).unwrap();
        }
        let results = idx.search(&[0.0, 0.0, 0.0, 1.0], 5).unwrap();
        assert_eq!(results.len(), 5);
        assert_eq!(results[0].0, "0");
    }
}
