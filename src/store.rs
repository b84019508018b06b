//! The authoritative in-memory store: libraries, documents, chunks, and the
//! per-library index kept in sync with them.
//!
//! Concurrency discipline (see `DESIGN.md`): one `parking_lot::RwLock` guards
//! the library *set* (creation/deletion/lookup of libraries), and one
//! `parking_lot::ReentrantMutex` guards each library's contents. The mutex is
//! reentrant because `index_library` enumerates the library's own chunks and
//! then calls back into the same library's lock scope to materialize the
//! index — ordinary (non-reentrant) locking would deadlock a single thread
//! against itself there. Locks are always acquired library-set-first, then
//! by ascending `library_id`, which is the only ordering the snapshotter and
//! any future multi-library operation need to avoid deadlock.

use crate::error::{Result, VdbError};
use crate::index::lsh::LshParams;
use crate::index::IndexFacade;
use crate::model::{
    matches_filter, Chunk, ChunkInput, Document, IndexAlgorithm, Library, Metadata,
    MetadataFilter, SearchHit,
};
use chrono::Utc;
use parking_lot::ReentrantMutex;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Optional partial update applied to an existing chunk.
#[derive(Debug, Clone, Default)]
pub struct ChunkUpdate {
    pub text: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub metadata: Option<Metadata>,
}

struct LibraryData {
    library: Library,
    documents: HashMap<String, Document>,
    chunks: HashMap<String, Chunk>,
    /// `document_id -> chunk_id`s in insertion order, for cascade delete.
    document_chunks: HashMap<String, Vec<String>>,
    index: IndexFacade,
}

struct LibraryCell {
    lock: ReentrantMutex<RefCell<LibraryData>>,
}

pub struct EntityStore {
    libraries: RwLock<HashMap<String, Arc<LibraryCell>>>,
    lsh_params: LshParams,
    /// Set by every mutating operation, cleared by the snapshotter once it
    /// has written a consistent view. Shared (not owned) by whichever
    /// `Snapshotter` is watching this store — see `Snapshotter::spawn`.
    dirty: Arc<AtomicBool>,
}

impl EntityStore {
    pub fn new(lsh_params: LshParams) -> Self {
        Self {
            libraries: RwLock::new(HashMap::new()),
            lsh_params,
            dirty: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle to this store's dirty flag, shared with a `Snapshotter` so its
    /// periodic-tick loop can see mutations without polling the store
    /// itself.
    pub fn dirty_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.dirty)
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    fn get_cell(&self, library_id: &str) -> Result<Arc<LibraryCell>> {
        let set = self.libraries.read();
        set.get(library_id)
            .cloned()
            .ok_or_else(|| VdbError::not_found("library", library_id))
    }

    // ---- Libraries --------------------------------------------------

    pub fn create_library(&self, library_id: Option<String>, metadata: Metadata) -> Result<Library> {
        let id = library_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut set = self.libraries.write();
        if set.contains_key(&id) {
            return Err(VdbError::duplicate("library", id));
        }
        let now = Utc::now();
        let library = Library {
            library_id: id.clone(),
            metadata,
            created_at: now,
            updated_at: now,
            is_indexed: false,
            index_algorithm: None,
            dimension: None,
        };
        let data = LibraryData {
            library: library.clone(),
            documents: HashMap::new(),
            chunks: HashMap::new(),
            document_chunks: HashMap::new(),
            index: IndexFacade::new(self.lsh_params),
        };
        set.insert(
            id,
            Arc::new(LibraryCell {
                lock: ReentrantMutex::new(RefCell::new(data)),
            }),
        );
        info!(library_id = %library.library_id, "library created");
        self.mark_dirty();
        Ok(library)
    }

    pub fn get_library(&self, library_id: &str) -> Result<Library> {
        let cell = self.get_cell(library_id)?;
        let guard = cell.lock.lock();
        Ok(guard.borrow().library.clone())
    }

    pub fn list_libraries(&self) -> Vec<Library> {
        let set = self.libraries.read();
        let mut ids: Vec<&String> = set.keys().collect();
        ids.sort();
        ids.into_iter()
            .map(|id| set[id].lock.lock().borrow().library.clone())
            .collect()
    }

    pub fn update_library_metadata(&self, library_id: &str, metadata: Metadata) -> Result<Library> {
        let cell = self.get_cell(library_id)?;
        let guard = cell.lock.lock();
        let mut data = guard.borrow_mut();
        data.library.metadata = metadata;
        data.library.updated_at = Utc::now();
        let result = data.library.clone();
        self.mark_dirty();
        Ok(result)
    }

    pub fn delete_library(&self, library_id: &str) -> Result<()> {
        let mut set = self.libraries.write();
        if set.remove(library_id).is_none() {
            return Err(VdbError::not_found("library", library_id));
        }
        info!(library_id, "library deleted (cascade)");
        self.mark_dirty();
        Ok(())
    }

    // ---- Documents ----------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub fn create_document(
        &self,
        library_id: &str,
        document_id: Option<String>,
        title: String,
        metadata: Metadata,
        chunks: Option<Vec<ChunkInput>>,
    ) -> Result<Document> {
        let cell = self.get_cell(library_id)?;
        let guard = cell.lock.lock();
        let mut data = guard.borrow_mut();

        let doc_id = document_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        if data.documents.contains_key(&doc_id) {
            return Err(VdbError::duplicate("document", doc_id));
        }

        let now = Utc::now();
        let prepared = match chunks {
            Some(inputs) => Self::validate_chunk_batch(&data, library_id, &doc_id, inputs, now)?,
            None => Vec::new(),
        };
        if let Some(dim) = prepared.first().map(|c| c.embedding.len()) {
            if data.library.dimension.is_none() {
                data.library.dimension = Some(dim);
            }
        }

        let document = Document {
            document_id: doc_id.clone(),
            library_id: library_id.to_string(),
            title,
            metadata,
            created_at: now,
            updated_at: now,
        };
        data.documents.insert(doc_id.clone(), document.clone());
        data.document_chunks.insert(doc_id.clone(), Vec::new());
        for chunk in prepared {
            Self::commit_chunk(&mut data, chunk)?;
        }
        data.library.updated_at = now;
        debug!(library_id, document_id = %doc_id, "document created");
        self.mark_dirty();
        Ok(document)
    }

    pub fn get_document(&self, library_id: &str, document_id: &str) -> Result<Document> {
        let cell = self.get_cell(library_id)?;
        let guard = cell.lock.lock();
        let data = guard.borrow();
        data.documents
            .get(document_id)
            .cloned()
            .ok_or_else(|| VdbError::not_found("document", document_id))
    }

    pub fn list_documents(&self, library_id: &str) -> Result<Vec<Document>> {
        let cell = self.get_cell(library_id)?;
        let guard = cell.lock.lock();
        let data = guard.borrow();
        let mut docs: Vec<Document> = data.documents.values().cloned().collect();
        docs.sort_by(|a, b| a.document_id.cmp(&b.document_id));
        Ok(docs)
    }

    pub fn update_document(
        &self,
        library_id: &str,
        document_id: &str,
        title: Option<String>,
        metadata: Option<Metadata>,
    ) -> Result<Document> {
        let cell = self.get_cell(library_id)?;
        let guard = cell.lock.lock();
        let mut data = guard.borrow_mut();
        let now = Utc::now();
        let doc = data
            .documents
            .get_mut(document_id)
            .ok_or_else(|| VdbError::not_found("document", document_id))?;
        if let Some(t) = title {
            doc.title = t;
        }
        if let Some(m) = metadata {
            doc.metadata = m;
        }
        doc.updated_at = now;
        let result = doc.clone();
        data.library.updated_at = now;
        self.mark_dirty();
        Ok(result)
    }

    pub fn delete_document(&self, library_id: &str, document_id: &str) -> Result<()> {
        let cell = self.get_cell(library_id)?;
        let guard = cell.lock.lock();
        let mut data = guard.borrow_mut();
        if !data.documents.contains_key(document_id) {
            return Err(VdbError::not_found("document", document_id));
        }
        let chunk_ids = data.document_chunks.remove(document_id).unwrap_or_default();
        for chunk_id in &chunk_ids {
            data.chunks.remove(chunk_id);
            if data.index.is_indexed() {
                data.index.on_chunk_removed(chunk_id)?;
            }
        }
        data.documents.remove(document_id);
        data.library.updated_at = Utc::now();
        debug!(library_id, document_id, chunks_removed = chunk_ids.len(), "document deleted (cascade)");
        self.mark_dirty();
        Ok(())
    }

    // ---- Chunks ---------------------------------------------------------

    fn validate_chunk_batch(
        data: &LibraryData,
        library_id: &str,
        document_id: &str,
        inputs: Vec<ChunkInput>,
        now: chrono::DateTime<Utc>,
    ) -> Result<Vec<Chunk>> {
        let mut dimension = data.library.dimension;
        let mut seen: HashSet<String> = HashSet::new();
        let mut prepared = Vec::with_capacity(inputs.len());

        for input in inputs {
            if input.text.trim().is_empty() {
                return Err(VdbError::InvalidArgument("chunk text must not be empty".into()));
            }
            let chunk_id = input.chunk_id.unwrap_or_else(|| Uuid::new_v4().to_string());
            if data.chunks.contains_key(&chunk_id) || !seen.insert(chunk_id.clone()) {
                return Err(VdbError::duplicate("chunk", chunk_id));
            }

            // Validates the embedding is non-degenerate; the normalized copy
            // itself is discarded — chunks store the caller's raw embedding,
            // normalization happens once at index-insert time.
            crate::vector::normalize(&input.embedding)?;

            let dim = input.embedding.len();
            match dimension {
                None => dimension = Some(dim),
                Some(expected) if expected != dim => {
                    return Err(VdbError::DimensionMismatch {
                        expected,
                        actual: dim,
                    })
                }
                _ => {}
            }

            prepared.push(Chunk {
                chunk_id,
                document_id: document_id.to_string(),
                library_id: library_id.to_string(),
                text: input.text,
                embedding: input.embedding,
                metadata: input.metadata,
                created_at: now,
                updated_at: now,
            });
        }
        Ok(prepared)
    }

    fn commit_chunk(data: &mut LibraryData, chunk: Chunk) -> Result<()> {
        if data.index.is_indexed() {
            data.index.on_chunk_added(&chunk.chunk_id, &chunk.embedding)?;
        }
        data.document_chunks
            .entry(chunk.document_id.clone())
            .or_default()
            .push(chunk.chunk_id.clone());
        data.chunks.insert(chunk.chunk_id.clone(), chunk);
        Ok(())
    }

    pub fn create_chunk(
        &self,
        library_id: &str,
        document_id: &str,
        input: ChunkInput,
    ) -> Result<Chunk> {
        let cell = self.get_cell(library_id)?;
        let guard = cell.lock.lock();
        let mut data = guard.borrow_mut();
        if !data.documents.contains_key(document_id) {
            return Err(VdbError::not_found("document", document_id));
        }
        let now = Utc::now();
        let mut prepared = Self::validate_chunk_batch(&data, library_id, document_id, vec![input], now)?;
        if data.library.dimension.is_none() {
            data.library.dimension = Some(prepared[0].embedding.len());
        }
        let chunk = prepared.remove(0);
        Self::commit_chunk(&mut data, chunk.clone())?;
        if let Some(doc) = data.documents.get_mut(document_id) {
            doc.updated_at = now;
        }
        data.library.updated_at = now;
        self.mark_dirty();
        Ok(chunk)
    }

    /// All-or-nothing: if any candidate chunk fails validation, nothing in
    /// the batch is inserted.
    pub fn create_chunks_bulk(
        &self,
        library_id: &str,
        document_id: &str,
        inputs: Vec<ChunkInput>,
    ) -> Result<Vec<Chunk>> {
        let cell = self.get_cell(library_id)?;
        let guard = cell.lock.lock();
        let mut data = guard.borrow_mut();
        if !data.documents.contains_key(document_id) {
            return Err(VdbError::not_found("document", document_id));
        }
        let now = Utc::now();
        let prepared = Self::validate_chunk_batch(&data, library_id, document_id, inputs, now)?;
        if let Some(dim) = prepared.first().map(|c| c.embedding.len()) {
            if data.library.dimension.is_none() {
                data.library.dimension = Some(dim);
            }
        }
        for chunk in prepared.iter().cloned() {
            Self::commit_chunk(&mut data, chunk)?;
        }
        if let Some(doc) = data.documents.get_mut(document_id) {
            doc.updated_at = now;
        }
        data.library.updated_at = now;
        self.mark_dirty();
        Ok(prepared)
    }

    pub fn get_chunk(&self, library_id: &str, chunk_id: &str) -> Result<Chunk> {
        let cell = self.get_cell(library_id)?;
        let guard = cell.lock.lock();
        let data = guard.borrow();
        data.chunks
            .get(chunk_id)
            .cloned()
            .ok_or_else(|| VdbError::not_found("chunk", chunk_id))
    }

    pub fn list_chunks(&self, library_id: &str, document_id: &str) -> Result<Vec<Chunk>> {
        let cell = self.get_cell(library_id)?;
        let guard = cell.lock.lock();
        let data = guard.borrow();
        let ids = data
            .document_chunks
            .get(document_id)
            .ok_or_else(|| VdbError::not_found("document", document_id))?;
        Ok(ids.iter().filter_map(|id| data.chunks.get(id).cloned()).collect())
    }

    pub fn chunk_count(&self, library_id: &str) -> Result<usize> {
        let cell = self.get_cell(library_id)?;
        let guard = cell.lock.lock();
        Ok(guard.borrow().chunks.len())
    }

    pub fn update_chunk(
        &self,
        library_id: &str,
        chunk_id: &str,
        update: ChunkUpdate,
    ) -> Result<Chunk> {
        let cell = self.get_cell(library_id)?;
        let guard = cell.lock.lock();
        let mut data = guard.borrow_mut();

        let mut chunk = data
            .chunks
            .get(chunk_id)
            .cloned()
            .ok_or_else(|| VdbError::not_found("chunk", chunk_id))?;

        if let Some(text) = update.text {
            if text.trim().is_empty() {
                return Err(VdbError::InvalidArgument("chunk text must not be empty".into()));
            }
            chunk.text = text;
        }
        if let Some(embedding) = update.embedding {
            crate::vector::normalize(&embedding)?;
            if let Some(expected) = data.library.dimension {
                if embedding.len() != expected {
                    return Err(VdbError::DimensionMismatch {
                        expected,
                        actual: embedding.len(),
                    });
                }
            }
            chunk.embedding = embedding;
        }
        if let Some(metadata) = update.metadata {
            chunk.metadata = metadata;
        }
        chunk.updated_at = Utc::now();

        if data.index.is_indexed() {
            data.index.on_chunk_updated(chunk_id, &chunk.embedding)?;
        }
        data.chunks.insert(chunk_id.to_string(), chunk.clone());
        data.library.updated_at = chunk.updated_at;
        self.mark_dirty();
        Ok(chunk)
    }

    pub fn delete_chunk(&self, library_id: &str, document_id: &str, chunk_id: &str) -> Result<()> {
        let cell = self.get_cell(library_id)?;
        let guard = cell.lock.lock();
        let mut data = guard.borrow_mut();

        let chunk = data
            .chunks
            .get(chunk_id)
            .ok_or_else(|| VdbError::not_found("chunk", chunk_id))?;
        if chunk.document_id != document_id {
            return Err(VdbError::not_found("chunk", chunk_id));
        }

        data.chunks.remove(chunk_id);
        if let Some(ids) = data.document_chunks.get_mut(document_id) {
            ids.retain(|id| id != chunk_id);
        }
        if data.index.is_indexed() {
            data.index.on_chunk_removed(chunk_id)?;
        }
        data.library.updated_at = Utc::now();
        self.mark_dirty();
        Ok(())
    }

    // ---- Indexing & search ----------------------------------------------

    pub fn index_library(&self, library_id: &str, algorithm: IndexAlgorithm) -> Result<()> {
        let cell = self.get_cell(library_id)?;
        let guard = cell.lock.lock();
        let mut data = guard.borrow_mut();

        let dimension = data.library.dimension.ok_or_else(|| {
            VdbError::InvalidArgument("library has no chunks yet; nothing to index".into())
        })?;

        let mut chunk_pairs: Vec<(String, Vec<f32>)> = data
            .chunks
            .iter()
            .map(|(id, c)| (id.clone(), c.embedding.clone()))
            .collect();
        chunk_pairs.sort_by(|a, b| a.0.cmp(&b.0));

        if data.index.is_indexed() {
            data.index.swap(algorithm, &chunk_pairs)?;
        } else {
            data.index.materialize(algorithm, dimension, &chunk_pairs)?;
        }
        data.library.is_indexed = true;
        data.library.index_algorithm = Some(algorithm);
        data.library.updated_at = Utc::now();
        info!(library_id, ?algorithm, chunks = chunk_pairs.len(), "library indexed");
        self.mark_dirty();
        Ok(())
    }

    /// `metadata_filter`, when given, is applied as a post-filter over
    /// candidates *before* top-k truncation: the index is asked for up to
    /// all of its members, the filter is applied, and only then is the
    /// result truncated to `k`. Any other ordering would return fewer than
    /// `k` results even when `k` matching chunks exist.
    pub fn search(
        &self,
        library_id: &str,
        query: &[f32],
        k: usize,
        metadata_filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Err(VdbError::InvalidArgument("k must be greater than zero".into()));
        }
        let cell = self.get_cell(library_id)?;
        let guard = cell.lock.lock();
        let data = guard.borrow();

        let effective_k = match metadata_filter {
            Some(_) => data.index.len().max(k),
            None => k,
        };
        let raw = data.index.search(library_id, query, effective_k)?;

        let mut hits: Vec<SearchHit> = raw
            .into_iter()
            .filter_map(|(id, distance)| data.chunks.get(&id).map(|chunk| SearchHit {
                chunk: chunk.clone(),
                distance,
            }))
            .collect();

        if let Some(filter) = metadata_filter {
            hits.retain(|hit| matches_filter(&hit.chunk.metadata, filter));
        }
        hits.truncate(k);
        Ok(hits)
    }

    // ---- Snapshot export / import ---------------------------------------

    pub fn export_snapshot(&self) -> SnapshotData {
        let set = self.libraries.read();
        let mut ids: Vec<&String> = set.keys().collect();
        ids.sort();

        let libraries = ids
            .into_iter()
            .map(|id| {
                let cell = &set[id];
                let guard = cell.lock.lock();
                let data = guard.borrow();

                let mut doc_ids: Vec<&String> = data.documents.keys().collect();
                doc_ids.sort();
                let documents = doc_ids
                    .into_iter()
                    .map(|doc_id| {
                        let document = data.documents[doc_id].clone();
                        let mut chunk_ids =
                            data.document_chunks.get(doc_id).cloned().unwrap_or_default();
                        chunk_ids.sort();
                        let chunks = chunk_ids
                            .into_iter()
                            .filter_map(|cid| data.chunks.get(&cid).cloned())
                            .collect();
                        DocumentSnapshot { document, chunks }
                    })
                    .collect();

                LibrarySnapshot {
                    library: data.library.clone(),
                    lsh_params: self.lsh_params,
                    documents,
                }
            })
            .collect();

        SnapshotData {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            libraries,
        }
    }

    /// Replace the entire store with `snapshot`'s contents. LSH indices are
    /// never trusted byte-for-byte: every indexed library is rematerialized
    /// here from its persisted seed and parameters.
    pub fn import_snapshot(&self, snapshot: SnapshotData) -> Result<()> {
        let mut set = self.libraries.write();
        set.clear();

        for lib_snap in snapshot.libraries {
            let mut data = LibraryData {
                library: lib_snap.library,
                documents: HashMap::new(),
                chunks: HashMap::new(),
                document_chunks: HashMap::new(),
                index: IndexFacade::new(lib_snap.lsh_params),
            };

            for doc_snap in lib_snap.documents {
                let doc_id = doc_snap.document.document_id.clone();
                let mut chunk_ids = Vec::with_capacity(doc_snap.chunks.len());
                for chunk in doc_snap.chunks {
                    chunk_ids.push(chunk.chunk_id.clone());
                    data.chunks.insert(chunk.chunk_id.clone(), chunk);
                }
                data.documents.insert(doc_id.clone(), doc_snap.document);
                data.document_chunks.insert(doc_id, chunk_ids);
            }

            if data.library.is_indexed {
                if let Some(algorithm) = data.library.index_algorithm {
                    let dimension = data.library.dimension.ok_or_else(|| {
                        VdbError::Internal("indexed library missing dimension in snapshot".into())
                    })?;
                    let mut chunk_pairs: Vec<(String, Vec<f32>)> = data
                        .chunks
                        .iter()
                        .map(|(id, c)| (id.clone(), c.embedding.clone()))
                        .collect();
                    chunk_pairs.sort_by(|a, b| a.0.cmp(&b.0));
                    data.index.materialize(algorithm, dimension, &chunk_pairs)?;
                }
            }

            let id = data.library.library_id.clone();
            set.insert(
                id,
                Arc::new(LibraryCell {
                    lock: ReentrantMutex::new(RefCell::new(data)),
                }),
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub document: Document,
    pub chunks: Vec<Chunk>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibrarySnapshot {
    pub library: Library,
    pub lsh_params: LshParams,
    pub documents: Vec<DocumentSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotData {
    pub schema_version: u32,
    pub libraries: Vec<LibrarySnapshot>,
}
