//! End-to-end scenarios spanning store, index, and persistence together —
//! the things a unit test scoped to one module can't exercise.

use std::sync::Arc;
use std::thread;
use vectorlite::index::lsh::LshParams;
use vectorlite::model::{ChunkInput, IndexAlgorithm, Metadata};
use vectorlite::store::EntityStore;
use vectorlite::{Config, VdbError};

fn chunk(id: &str, embedding: Vec<f32>) -> ChunkInput {
    ChunkInput {
        chunk_id: Some(id.to_string()),
        text: format!("text {id}"),
        embedding,
        metadata: Metadata::new(),
    }
}

#[test]
fn exact_search_orders_by_distance_then_chunk_id() {
    let store = EntityStore::new(LshParams::default());
    store.create_library(Some("lib".into()), Metadata::new()).unwrap();
    store
        .create_document(
            "lib",
            Some("doc".into()),
            "doc".into(),
            Metadata::new(),
            Some(vec![
                chunk("z", vec![1.0, 0.0]),
                chunk("a", vec![1.0, 0.0]),
                chunk("m", vec![0.0, 1.0]),
            ]),
        )
        .unwrap();
    store.index_library("lib", IndexAlgorithm::Exact).unwrap();

    let hits = store.search("lib", &[1.0, 0.0], 3, None).unwrap();
    assert_eq!(
        hits.iter().map(|h| h.chunk.chunk_id.clone()).collect::<Vec<_>>(),
        vec!["a", "z", "m"]
    );
}

#[test]
fn lsh_with_one_table_one_plane_only_returns_its_own_bucket() {
    let store = EntityStore::new(LshParams {
        tables: 1,
        planes: 1,
        seed: 42,
    });
    store.create_library(Some("lib".into()), Metadata::new()).unwrap();
    store
        .create_document(
            "lib",
            Some("doc".into()),
            "doc".into(),
            Metadata::new(),
            Some(vec![
                chunk("pos", vec![1.0, 0.0, 0.0]),
                chunk("neg", vec![-1.0, 0.0, 0.0]),
            ]),
        )
        .unwrap();
    store.index_library("lib", IndexAlgorithm::Exact).unwrap();
    store.index_library("lib", IndexAlgorithm::Lsh).unwrap();

    // A single plane splits the space into exactly two buckets; a query
    // aligned with "pos" must never surface "neg" as a false positive from
    // the wrong bucket.
    let hits = store.search("lib", &[1.0, 0.0, 0.0], 2, None).unwrap();
    assert!(hits.iter().all(|h| h.chunk.chunk_id == "pos"));
}

#[test]
fn dimension_mismatch_on_first_chunk_of_a_batch_rejects_the_whole_batch() {
    let store = EntityStore::new(LshParams::default());
    store.create_library(Some("lib".into()), Metadata::new()).unwrap();

    let err = store
        .create_document(
            "lib",
            Some("doc".into()),
            "doc".into(),
            Metadata::new(),
            Some(vec![chunk("a", vec![1.0, 0.0]), chunk("b", vec![1.0, 0.0, 0.0])]),
        )
        .unwrap_err();
    assert!(matches!(err, VdbError::DimensionMismatch { .. }));
    assert!(store.get_document("lib", "doc").is_err());
}

#[test]
fn concurrent_search_and_delete_never_panics_or_corrupts_the_index() {
    let store = Arc::new(EntityStore::new(LshParams::default()));
    store.create_library(Some("lib".into()), Metadata::new()).unwrap();
    let inputs: Vec<ChunkInput> = (0..500)
        .map(|i| chunk(&i.to_string(), vec![(i % 7) as f32, 1.0]))
        .collect();
    store
        .create_document("lib", Some("doc".into()), "doc".into(), Metadata::new(), Some(inputs))
        .unwrap();
    store.index_library("lib", IndexAlgorithm::Exact).unwrap();

    let searcher_store = Arc::clone(&store);
    let searcher = thread::spawn(move || {
        for _ in 0..200 {
            let _ = searcher_store.search("lib", &[1.0, 1.0], 10, None);
        }
    });

    let deleter_store = Arc::clone(&store);
    let deleter = thread::spawn(move || {
        for i in 0..250 {
            let _ = deleter_store.delete_chunk("lib", "doc", &i.to_string());
        }
    });

    searcher.join().unwrap();
    deleter.join().unwrap();

    // The store must still be internally consistent: every remaining hit
    // must resolve back to a chunk that really exists.
    let hits = store.search("lib", &[1.0, 1.0], 500, None).unwrap();
    for hit in hits {
        assert!(store.get_chunk("lib", &hit.chunk.chunk_id).is_ok());
    }
}

#[test]
fn a_truncated_snapshot_file_recovers_from_its_backup() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        snapshot_path: dir.path().join("vectordb.snapshot"),
        ..Config::default()
    };

    let store = EntityStore::new(config.lsh_params());
    store.create_library(Some("lib".into()), Metadata::new()).unwrap();
    store
        .create_document(
            "lib",
            Some("doc".into()),
            "doc".into(),
            Metadata::new(),
            Some(vec![chunk("a", vec![1.0, 0.0])]),
        )
        .unwrap();
    store.index_library("lib", IndexAlgorithm::Exact).unwrap();

    vectorlite::snapshot::write_snapshot(&store.export_snapshot(), &config).unwrap();
    vectorlite::snapshot::write_snapshot(&store.export_snapshot(), &config).unwrap();

    // Simulate a crash partway through the next write.
    std::fs::write(&config.snapshot_path, b"garbage").unwrap();

    let (restored, snapshotter) = vectorlite::bootstrap(&config).unwrap();
    assert_eq!(restored.list_libraries().len(), 1);
    assert!(restored.get_chunk("lib", "a").is_ok());
    snapshotter.shutdown();
}

#[test]
fn bulk_chunk_insertion_is_all_or_nothing_on_duplicate_id() {
    let store = EntityStore::new(LshParams::default());
    store.create_library(Some("lib".into()), Metadata::new()).unwrap();
    store
        .create_document("lib", Some("doc".into()), "doc".into(), Metadata::new(), None)
        .unwrap();
    store.create_chunk("lib", "doc", chunk("existing", vec![1.0, 0.0])).unwrap();

    let batch = vec![
        chunk("new-1", vec![0.0, 1.0]),
        chunk("existing", vec![0.5, 0.5]),
        chunk("new-2", vec![1.0, 1.0]),
    ];
    let err = store.create_chunks_bulk("lib", "doc", batch).unwrap_err();
    assert!(matches!(err, VdbError::DuplicateId { .. }));
    assert_eq!(store.chunk_count("lib").unwrap(), 1);
}
