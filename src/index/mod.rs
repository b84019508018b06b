//! Per-library index indirection.
//!
//! A library's [`IndexFacade`] is a tagged variant over `{none, exact, lsh}`
//! rather than a trait object hierarchy — see `DESIGN.md` for why: the
//! capability set (`add`/`remove`/`update`/`search`/`rebuild_from`) is small
//! and fixed, so a closed enum is simpler to reason about than dynamic
//! dispatch through a shared trait object, and it lets `swap` build the new
//! backend fully before installing it without any unsafe aliasing tricks.

pub mod exact;
pub mod lsh;

use crate::error::{Result, VdbError};
use crate::model::IndexAlgorithm;
use exact::ExactIndex;
use lsh::{LshIndex, LshParams};

enum IndexState {
    None,
    Exact(ExactIndex),
    Lsh(LshIndex),
}

pub struct IndexFacade {
    state: IndexState,
    dimension: Option<usize>,
    lsh_params: LshParams,
}

impl IndexFacade {
    pub fn new(lsh_params: LshParams) -> Self {
        Self {
            state: IndexState::None,
            dimension: None,
            lsh_params,
        }
    }

    pub fn is_indexed(&self) -> bool {
        !matches!(self.state, IndexState::None)
    }

    pub fn algorithm(&self) -> Option<IndexAlgorithm> {
        match self.state {
            IndexState::None => None,
            IndexState::Exact(_) => Some(IndexAlgorithm::Exact),
            IndexState::Lsh(_) => Some(IndexAlgorithm::Lsh),
        }
    }

    pub fn len(&self) -> usize {
        match &self.state {
            IndexState::None => 0,
            IndexState::Exact(i) => i.len(),
            IndexState::Lsh(i) => i.len(),
        }
    }

    fn build_backend(
        algorithm: IndexAlgorithm,
        dimension: usize,
        lsh_params: LshParams,
        chunks: &[(String, Vec<f32>)],
    ) -> Result<IndexState> {
        match algorithm {
            IndexAlgorithm::Exact => {
                let mut index = ExactIndex::new(dimension);
                for (id, vector) in chunks {
                    index.add(id, vector)?;
                }
                Ok(IndexState::Exact(index))
            }
            IndexAlgorithm::Lsh => {
                let index = LshIndex::rebuild_from(dimension, lsh_params, chunks)?;
                Ok(IndexState::Lsh(index))
            }
        }
    }

    /// Build a fresh backend from scratch and install it. `chunks` must
    /// already be sorted by `chunk_id` so insertion order — and therefore
    /// tie-break behavior inside the backend — is deterministic.
    pub fn materialize(
        &mut self,
        algorithm: IndexAlgorithm,
        dimension: usize,
        chunks: &[(String, Vec<f32>)],
    ) -> Result<()> {
        let backend = Self::build_backend(algorithm, dimension, self.lsh_params, chunks)?;
        self.state = backend;
        self.dimension = Some(dimension);
        Ok(())
    }

    /// Build the new backend first; only swap it in on success, so a
    /// mid-build failure leaves the previous index fully intact.
    pub fn swap(
        &mut self,
        algorithm: IndexAlgorithm,
        chunks: &[(String, Vec<f32>)],
    ) -> Result<()> {
        let dimension = self
            .dimension
            .ok_or_else(|| VdbError::Internal("swap called before any dimension was recorded".into()))?;
        for (_, vector) in chunks {
            if vector.len() != dimension {
                return Err(VdbError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
        }
        let backend = Self::build_backend(algorithm, dimension, self.lsh_params, chunks)?;
        self.state = backend;
        Ok(())
    }

    pub fn on_chunk_added(&mut self, chunk_id: &str, vector: &[f32]) -> Result<()> {
        match &mut self.state {
            IndexState::None => Ok(()),
            IndexState::Exact(i) => i.add(chunk_id, vector),
            IndexState::Lsh(i) => i.add(chunk_id, vector),
        }
    }

    pub fn on_chunk_removed(&mut self, chunk_id: &str) -> Result<()> {
        match &mut self.state {
            IndexState::None => Ok(()),
            IndexState::Exact(i) => i.remove(chunk_id),
            IndexState::Lsh(i) => i.remove(chunk_id),
        }
    }

    pub fn on_chunk_updated(&mut self, chunk_id: &str, vector: &[f32]) -> Result<()> {
        match &mut self.state {
            IndexState::None => Ok(()),
            IndexState::Exact(i) => i.update(chunk_id, vector),
            IndexState::Lsh(i) => i.update(chunk_id, vector),
        }
    }

    pub fn search(&self, library_id: &str, query: &[f32], k: usize) -> Result<Vec<(String, f32)>> {
        let dimension = match self.dimension {
            Some(d) => d,
            None => return Err(VdbError::not_indexed(library_id)),
        };
        if query.len() != dimension {
            return Err(VdbError::DimensionMismatch {
                expected: dimension,
                actual: query.len(),
            });
        }
        match &self.state {
            IndexState::None => Err(VdbError::not_indexed(library_id)),
            IndexState::Exact(i) => i.search(query, k),
            IndexState::Lsh(i) => i.search(query, k),
        }
    }
}
