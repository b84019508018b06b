//! Startup sequencing: load persisted state, or seed from a sample
//! embeddings file, or start empty.

use crate::config::Config;
use crate::error::Result;
use crate::model::{ChunkInput, Metadata};
use crate::snapshot::{load_snapshot_with_fallback, Snapshotter};
use crate::store::EntityStore;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

const DEFAULT_LIBRARY_ID: &str = "default";
const DEFAULT_DOCUMENT_ID: &str = "default";

#[derive(Debug, Deserialize)]
struct SampleRecord {
    chunk_id: Option<String>,
    text: String,
    embedding: Vec<f32>,
    #[serde(default)]
    metadata: Metadata,
}

/// 1. Try the canonical snapshot, then its backup.
/// 2. If neither exists, try loading `config.sample_embeddings_path` into a
///    freshly created default library.
/// 3. Otherwise start from an empty store.
///
/// Also spawns the background `Snapshotter` that watches the returned store
/// and periodically persists it once it has been mutated. The caller owns
/// the `Snapshotter` and should call `shutdown()` on it during an orderly
/// shutdown to flush any pending changes.
pub fn bootstrap(config: &Config) -> Result<(Arc<EntityStore>, Snapshotter)> {
    let store = if let Some(snapshot) = load_snapshot_with_fallback(config) {
        let store = EntityStore::new(config.lsh_params());
        store.import_snapshot(snapshot)?;
        info!("store restored from snapshot");
        store
    } else {
        let store = EntityStore::new(config.lsh_params());
        if let Some(path) = &config.sample_embeddings_path {
            if path.exists() {
                load_sample_embeddings(&store, path, config)?;
            } else {
                warn!(path = %path.display(), "configured sample embeddings path does not exist; starting empty");
            }
        } else {
            info!("no snapshot and no sample embeddings configured; starting empty");
        }
        store
    };

    let store = Arc::new(store);
    let snapshotter = Snapshotter::spawn(Arc::clone(&store), config.clone());
    Ok((store, snapshotter))
}

/// Reads newline-delimited JSON records (`{chunk_id?, text, embedding,
/// metadata?}`) into a single default library/document, then indexes it
/// with `config.default_algorithm`.
fn load_sample_embeddings(store: &EntityStore, path: &Path, config: &Config) -> Result<()> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut inputs = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: SampleRecord = serde_json::from_str(&line)
            .map_err(|e| crate::error::VdbError::InvalidArgument(format!("malformed sample record: {e}")))?;
        inputs.push(ChunkInput {
            chunk_id: record.chunk_id,
            text: record.text,
            embedding: record.embedding,
            metadata: record.metadata,
        });
    }

    if inputs.is_empty() {
        warn!(path = %path.display(), "sample embeddings file contained no records");
        return Ok(());
    }

    store.create_library(Some(DEFAULT_LIBRARY_ID.to_string()), Metadata::new())?;
    store.create_document(
        DEFAULT_LIBRARY_ID,
        Some(DEFAULT_DOCUMENT_ID.to_string()),
        "sample embeddings".to_string(),
        Metadata::new(),
        Some(inputs),
    )?;
    store.index_library(DEFAULT_LIBRARY_ID, config.default_algorithm)?;
    info!(
        chunks = store.chunk_count(DEFAULT_LIBRARY_ID)?,
        "bootstrapped default library from sample embeddings"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn bootstrap_with_no_snapshot_and_no_sample_path_starts_empty() {
        let dir = tempdir().unwrap();
        let config = Config {
            snapshot_path: dir.path().join("vectordb.snapshot"),
            ..Config::default()
        };
        let (store, snapshotter) = bootstrap(&config).unwrap();
        assert!(store.list_libraries().is_empty());
        snapshotter.shutdown();
    }

    #[test]
    fn bootstrap_loads_sample_embeddings_when_no_snapshot_exists() {
        let dir = tempdir().unwrap();
        let sample_path = dir.path().join("sample.ndjson");
        let mut f = File::create(&sample_path).unwrap();
        writeln!(f, r#"{{"chunk_id":"c1","text":"hello","embedding":[1.0,0.0]}}"#).unwrap();
        writeln!(f, r#"{{"chunk_id":"c2","text":"world","embedding":[0.0,1.0]}}"#).unwrap();
        drop(f);

        let config = Config {
            snapshot_path: dir.path().join("snapshots").join("vectordb.snapshot"),
            sample_embeddings_path: Some(sample_path),
            ..Config::default()
        };
        let (store, snapshotter) = bootstrap(&config).unwrap();
        let libs = store.list_libraries();
        assert_eq!(libs.len(), 1);
        assert!(libs[0].is_indexed);
        assert_eq!(store.chunk_count(DEFAULT_LIBRARY_ID).unwrap(), 2);
        snapshotter.shutdown();
    }

    #[test]
    fn bootstrap_prefers_an_existing_snapshot_over_sample_embeddings() {
        let dir = tempdir().unwrap();
        let config = Config {
            snapshot_path: dir.path().join("vectordb.snapshot"),
            ..Config::default()
        };
        let seed = EntityStore::new(config.lsh_params());
        seed.create_library(Some("from-snapshot".into()), Metadata::new())
            .unwrap();
        crate::snapshot::write_snapshot(&seed.export_snapshot(), &config).unwrap();

        let (restored, snapshotter) = bootstrap(&config).unwrap();
        let libs = restored.list_libraries();
        assert_eq!(libs.len(), 1);
        assert_eq!(libs[0].library_id, "from-snapshot");
        snapshotter.shutdown();
    }

    /// Spawns the bootstrap-returned `Snapshotter`, mutates the store, waits
    /// past the snapshot interval, and confirms the periodic worker actually
    /// wrote a snapshot to disk — not just the manual `write_snapshot` path.
    #[test]
    fn the_background_snapshotter_persists_a_mutation_without_being_asked() {
        let dir = tempdir().unwrap();
        let config = Config {
            snapshot_path: dir.path().join("vectordb.snapshot"),
            snapshot_interval_seconds: 1,
            ..Config::default()
        };

        let (store, snapshotter) = bootstrap(&config).unwrap();
        assert!(!config.snapshot_path.exists());

        store
            .create_library(Some("watched".into()), Metadata::new())
            .unwrap();

        std::thread::sleep(std::time::Duration::from_millis(1_500));
        assert!(
            config.snapshot_path.exists(),
            "periodic snapshot was never written after the store was mutated"
        );

        let loaded = crate::snapshot::load_snapshot(&config.snapshot_path).unwrap();
        assert_eq!(loaded.libraries.len(), 1);
        assert_eq!(loaded.libraries[0].library_id, "watched");

        snapshotter.shutdown();
    }
}
