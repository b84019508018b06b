//! # vectorlite — an in-process vector database
//!
//! Libraries of documents made of text chunks with embeddings, searchable
//! either by exact brute-force cosine distance or by an approximate
//! locality-sensitive-hashing index, hot-swappable per library without
//! taking search or writes offline crate-wide.
//!
//! ## Layout
//!
//! - [`model`] — the `Library` / `Document` / `Chunk` data model.
//! - [`vector`] — vector math: normalization, dot product, cosine distance,
//!   random hyperplane generation.
//! - [`index`] — the per-library index facade over the exact and LSH
//!   backends.
//! - [`store`] — [`EntityStore`], the concurrent CRUD + search surface.
//! - [`config`] — environment-driven runtime configuration.
//! - [`snapshot`] — crash-safe persistence and the background snapshotter.
//! - [`bootstrap`] — startup sequencing (snapshot, sample data, or empty).
//!
//! ## Concurrency
//!
//! One `RwLock` guards the set of libraries; each library's contents are
//! guarded by their own reentrant mutex, so independent libraries never
//! contend with each other. See `store.rs` for the full locking discipline.

// Global allocator: mimalloc's per-thread heaps make the small, frequent
// allocations in the hot insert/search paths close to contention-free.
// Declared at the crate root so it covers every allocation in the process,
// including those made by parking_lot and rayon.
use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod index;
pub mod model;
pub mod snapshot;
pub mod store;
pub mod vector;

pub use bootstrap::bootstrap;
pub use config::Config;
pub use error::{Result, VdbError};
pub use model::{Chunk, ChunkInput, Document, IndexAlgorithm, Library, Metadata, MetadataFilter, SearchHit};
pub use snapshot::Snapshotter;
pub use store::{ChunkUpdate, EntityStore};
