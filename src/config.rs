//! Runtime configuration, loaded from the environment.
//!
//! Mirrors the `env::var(...).parse()` shape of `rvector`'s
//! `packages/configs::AppConfig`, but every field falls back to a default
//! instead of `.expect()`-panicking on a missing variable — this crate is a
//! library embedded into a host process, and a misconfigured environment
//! should never be fatal to load.

use crate::model::IndexAlgorithm;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the canonical snapshot file. The backup (`.bak`) and in-flight
    /// (`.tmp`) files used by the atomic-write protocol are siblings of this
    /// path, not separately configurable.
    pub snapshot_path: PathBuf,
    /// How often the background snapshotter wakes up to check for dirty data.
    pub snapshot_interval_seconds: u64,
    /// Optional newline-delimited JSON file of pre-embedded chunks, loaded
    /// into a default library on first boot when no snapshot exists yet.
    pub sample_embeddings_path: Option<PathBuf>,
    pub default_algorithm: IndexAlgorithm,
    pub lsh_tables: usize,
    pub lsh_planes: usize,
    pub lsh_seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("./vectordb.snapshot"),
            snapshot_interval_seconds: 30,
            sample_embeddings_path: None,
            default_algorithm: IndexAlgorithm::Exact,
            lsh_tables: 4,
            lsh_planes: 8,
            lsh_seed: 42,
        }
    }
}

impl Config {
    /// Reads `VDB_*` environment variables, falling back to
    /// [`Config::default`] field-by-field for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            snapshot_path: std::env::var("VDB_SNAPSHOT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.snapshot_path),
            snapshot_interval_seconds: std::env::var("VDB_SNAPSHOT_INTERVAL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|secs| *secs >= 1)
                .unwrap_or(defaults.snapshot_interval_seconds),
            sample_embeddings_path: std::env::var("VDB_SAMPLE_EMBEDDINGS_PATH")
                .ok()
                .map(PathBuf::from),
            default_algorithm: std::env::var("VDB_DEFAULT_ALGORITHM")
                .ok()
                .and_then(|v| IndexAlgorithm::from_str(&v).ok())
                .unwrap_or(defaults.default_algorithm),
            lsh_tables: std::env::var("VDB_LSH_TABLES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.lsh_tables),
            lsh_planes: std::env::var("VDB_LSH_PLANES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.lsh_planes),
            lsh_seed: std::env::var("VDB_LSH_SEED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.lsh_seed),
        }
    }

    pub fn lsh_params(&self) -> crate::index::lsh::LshParams {
        crate::index::lsh::LshParams {
            tables: self.lsh_tables,
            planes: self.lsh_planes,
            seed: self.lsh_seed,
        }
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_seconds)
    }

    pub fn snapshot_backup_path(&self) -> PathBuf {
        let mut p = self.snapshot_path.clone().into_os_string();
        p.push(".bak");
        PathBuf::from(p)
    }

    pub fn snapshot_tmp_path(&self) -> PathBuf {
        let mut p = self.snapshot_path.clone().into_os_string();
        p.push(".tmp");
        PathBuf::from(p)
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.snapshot_path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
