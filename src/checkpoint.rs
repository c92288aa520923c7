//! Versioned checkpoint store.
//!
//! Weights are written under one of three backends chosen by file suffix
//! (`.safetensors`, `.bin`, `.json.zst`), always via write-to-temp plus
//! rename so a reader never sees a torn file. Every checkpoint carries a
//! JSON metadata sidecar, and `best.<ext>` tracks the highest-metric
//! checkpoint as an atomically-replaced copy.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::neural::{model_io, WeightMap};
use crate::{ChessRlError, Result};

/// Bumped when the sidecar layout changes.
pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointBackend {
    Safetensors,
    Bincode,
    JsonZst,
}

impl CheckpointBackend {
    pub fn extension(self) -> &'static str {
        match self {
            CheckpointBackend::Safetensors => "safetensors",
            CheckpointBackend::Bincode => "bin",
            CheckpointBackend::JsonZst => "json.zst",
        }
    }

    pub fn flag_name(self) -> &'static str {
        match self {
            CheckpointBackend::Safetensors => "safetensors",
            CheckpointBackend::Bincode => "bincode",
            CheckpointBackend::JsonZst => "json-zst",
        }
    }

    /// Infer the backend from a weights filename.
    pub fn detect(path: &Path) -> Result<CheckpointBackend> {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if name.ends_with(".safetensors") {
            Ok(CheckpointBackend::Safetensors)
        } else if name.ends_with(".json.zst") {
            Ok(CheckpointBackend::JsonZst)
        } else if name.ends_with(".bin") {
            Ok(CheckpointBackend::Bincode)
        } else {
            Err(ChessRlError::Checkpoint(format!(
                "UnknownFormat: cannot infer checkpoint backend from '{}'",
                path.display()
            )))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckpointMetadata {
    #[serde(rename = "checkpointId")]
    pub checkpoint_id: String,
    pub cycle: u64,
    pub performance: f64,
    #[serde(rename = "isBest")]
    pub is_best: bool,
    pub description: String,
    #[serde(rename = "backendType")]
    pub backend: String,
    pub timestamp: String,
    pub version: u32,
}

impl CheckpointMetadata {
    pub fn new(
        checkpoint_id: impl Into<String>,
        cycle: u64,
        performance: f64,
        is_best: bool,
        description: impl Into<String>,
        backend: CheckpointBackend,
    ) -> CheckpointMetadata {
        CheckpointMetadata {
            checkpoint_id: checkpoint_id.into(),
            cycle,
            performance,
            is_best,
            description: description.into(),
            backend: backend.flag_name().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            version: CHECKPOINT_SCHEMA_VERSION,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckpointSummary {
    pub weights_path: PathBuf,
    pub metadata: CheckpointMetadata,
}

pub struct CheckpointStore {
    directory: PathBuf,
    backend: CheckpointBackend,
    best_metric: Option<f64>,
}

impl CheckpointStore {
    /// Open (creating if needed) a checkpoint directory. The running best
    /// metric is restored from an existing `best.json` sidecar.
    pub fn open(directory: impl Into<PathBuf>, backend: CheckpointBackend) -> Result<CheckpointStore> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;
        let best_metric = read_metadata(&directory.join("best.json"))
            .ok()
            .map(|meta| meta.performance);
        Ok(CheckpointStore {
            directory,
            backend,
            best_metric,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn backend(&self) -> CheckpointBackend {
        self.backend
    }

    pub fn best_metric(&self) -> Option<f64> {
        self.best_metric
    }

    fn weights_path(&self, name: &str) -> PathBuf {
        self.directory
            .join(format!("{}.{}", name, self.backend.extension()))
    }

    /// Persist a checkpoint and its sidecar; advances the `best.*` alias
    /// when the checkpoint is flagged best with a strictly higher metric.
    /// IO failures are retried once before surfacing.
    pub fn save(
        &mut self,
        name: &str,
        weights: &WeightMap,
        metadata: &CheckpointMetadata,
    ) -> Result<PathBuf> {
        let weights_path = self.weights_path(name);
        with_one_retry(|| write_weights_atomic(&weights_path, self.backend, weights))?;

        let sidecar_path = self.directory.join(format!("{}.json", name));
        with_one_retry(|| write_metadata_atomic(&sidecar_path, metadata))?;

        let strictly_better = self
            .best_metric
            .map(|best| metadata.performance > best)
            .unwrap_or(true);
        if metadata.is_best && strictly_better {
            let best_weights = self.directory.join(format!("best.{}", self.backend.extension()));
            with_one_retry(|| copy_atomic(&weights_path, &best_weights))?;
            let best_sidecar = self.directory.join("best.json");
            with_one_retry(|| write_metadata_atomic(&best_sidecar, metadata))?;
            self.best_metric = Some(metadata.performance);
            log::info!(
                "new best checkpoint '{}' (metric {:.4})",
                metadata.checkpoint_id,
                metadata.performance
            );
        }

        Ok(weights_path)
    }

    /// Load a checkpoint by weights path, verifying the backend when the
    /// caller expects a particular one.
    pub fn load(
        path: impl AsRef<Path>,
        expected: Option<CheckpointBackend>,
    ) -> Result<(WeightMap, CheckpointMetadata)> {
        let path = path.as_ref();
        let detected = CheckpointBackend::detect(path)?;
        if let Some(expected) = expected {
            if expected != detected {
                return Err(ChessRlError::Checkpoint(format!(
                    "'{}' is a {} checkpoint; pass --checkpoint-backend {}",
                    path.display(),
                    detected.flag_name(),
                    detected.flag_name()
                )));
            }
        }

        let weights = read_weights(path, detected)?;
        let sidecar = sidecar_path_for(path, detected);
        let metadata = read_metadata(&sidecar)?;
        Ok((weights, metadata))
    }

    /// Summaries of every checkpoint in a directory, ordered by cycle.
    pub fn list(directory: impl AsRef<Path>) -> Result<Vec<CheckpointSummary>> {
        let mut summaries = Vec::new();
        for entry in fs::read_dir(directory.as_ref())? {
            let path = entry?.path();
            let Ok(backend) = CheckpointBackend::detect(&path) else {
                continue;
            };
            let sidecar = sidecar_path_for(&path, backend);
            match read_metadata(&sidecar) {
                Ok(metadata) => summaries.push(CheckpointSummary {
                    weights_path: path,
                    metadata,
                }),
                Err(e) => log::warn!("skipping '{}': {}", path.display(), e),
            }
        }
        summaries.sort_by_key(|s| s.metadata.cycle);
        Ok(summaries)
    }
}

fn sidecar_path_for(weights_path: &Path, backend: CheckpointBackend) -> PathBuf {
    let name = weights_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");
    let suffix = format!(".{}", backend.extension());
    let base = name.strip_suffix(&suffix).unwrap_or(name);
    weights_path.with_file_name(format!("{}.json", base))
}

fn with_one_retry<T>(mut operation: impl FnMut() -> Result<T>) -> Result<T> {
    match operation() {
        Ok(value) => Ok(value),
        Err(first) => {
            log::warn!("checkpoint write failed, retrying once: {}", first);
            operation()
        }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("tmp");
    path.with_file_name(format!(".{}.tmp", name))
}

fn write_weights_atomic(
    path: &Path,
    backend: CheckpointBackend,
    weights: &WeightMap,
) -> Result<()> {
    let tmp = temp_path(path);
    match backend {
        CheckpointBackend::Safetensors => model_io::save_weights(weights, &tmp)?,
        CheckpointBackend::Bincode => {
            let bytes = bincode::serialize(weights).map_err(|e| {
                ChessRlError::Checkpoint(format!("bincode encoding failed: {}", e))
            })?;
            fs::write(&tmp, bytes)?;
        }
        CheckpointBackend::JsonZst => {
            let json = serde_json::to_vec(weights)
                .map_err(|e| ChessRlError::Checkpoint(format!("JSON encoding failed: {}", e)))?;
            let compressed = zstd::encode_all(json.as_slice(), 3)
                .map_err(|e| ChessRlError::Checkpoint(format!("zstd encoding failed: {}", e)))?;
            fs::write(&tmp, compressed)?;
        }
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_weights(path: &Path, backend: CheckpointBackend) -> Result<WeightMap> {
    match backend {
        CheckpointBackend::Safetensors => model_io::load_weights(path),
        CheckpointBackend::Bincode => {
            let bytes = fs::read(path)?;
            bincode::deserialize(&bytes).map_err(|e| {
                ChessRlError::Checkpoint(format!(
                    "corrupt bincode checkpoint '{}': {}",
                    path.display(),
                    e
                ))
            })
        }
        CheckpointBackend::JsonZst => {
            let bytes = fs::read(path)?;
            let json = zstd::decode_all(bytes.as_slice()).map_err(|e| {
                ChessRlError::Checkpoint(format!(
                    "corrupt zstd checkpoint '{}': {}",
                    path.display(),
                    e
                ))
            })?;
            serde_json::from_slice(&json).map_err(|e| {
                ChessRlError::Checkpoint(format!(
                    "corrupt JSON checkpoint '{}': {}",
                    path.display(),
                    e
                ))
            })
        }
    }
}

fn write_metadata_atomic(path: &Path, metadata: &CheckpointMetadata) -> Result<()> {
    let tmp = temp_path(path);
    let json = serde_json::to_vec_pretty(metadata)
        .map_err(|e| ChessRlError::Checkpoint(format!("metadata encoding failed: {}", e)))?;
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_metadata(path: &Path) -> Result<CheckpointMetadata> {
    let bytes = fs::read(path).map_err(|e| {
        ChessRlError::Checkpoint(format!("missing metadata sidecar '{}': {}", path.display(), e))
    })?;
    serde_json::from_slice(&bytes).map_err(|e| {
        ChessRlError::Checkpoint(format!("corrupt metadata sidecar '{}': {}", path.display(), e))
    })
}

fn copy_atomic(from: &Path, to: &Path) -> Result<()> {
    let tmp = temp_path(to);
    fs::copy(from, &tmp)?;
    fs::rename(&tmp, to)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neural::WeightTensor;
    use assert_matches::assert_matches;

    fn sample_weights(scale: f32) -> WeightMap {
        let mut weights = WeightMap::new();
        weights.insert(
            "fc0.weight".to_string(),
            WeightTensor {
                shape: vec![2, 2],
                data: vec![scale, -scale, 0.5 * scale, 2.0 * scale],
            },
        );
        weights
    }

    #[test]
    fn test_roundtrip_all_backends() {
        for backend in [
            CheckpointBackend::Safetensors,
            CheckpointBackend::Bincode,
            CheckpointBackend::JsonZst,
        ] {
            let dir = tempfile::tempdir().unwrap();
            let mut store = CheckpointStore::open(dir.path(), backend).unwrap();
            let weights = sample_weights(1.5);
            let metadata =
                CheckpointMetadata::new("ck-1", 10, 0.5, false, "cycle checkpoint", backend);
            let path = store.save("cycle-000010", &weights, &metadata).unwrap();

            let (loaded_weights, loaded_meta) = CheckpointStore::load(&path, Some(backend)).unwrap();
            assert_eq!(loaded_weights, weights);
            assert_eq!(loaded_meta, metadata);
        }
    }

    #[test]
    fn test_backend_mismatch_is_actionable() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CheckpointStore::open(dir.path(), CheckpointBackend::Bincode).unwrap();
        let metadata = CheckpointMetadata::new(
            "ck-1",
            1,
            0.0,
            false,
            "",
            CheckpointBackend::Bincode,
        );
        let path = store
            .save("cycle-000001", &sample_weights(1.0), &metadata)
            .unwrap();
        let err = CheckpointStore::load(&path, Some(CheckpointBackend::Safetensors)).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("bincode"), "unhelpful message: {}", message);
    }

    #[test]
    fn test_unknown_suffix_rejected() {
        assert_matches!(
            CheckpointBackend::detect(Path::new("weights.xyz")),
            Err(ChessRlError::Checkpoint(_))
        );
    }

    #[test]
    fn test_best_tracking_requires_strict_improvement() {
        let dir = tempfile::tempdir().unwrap();
        let backend = CheckpointBackend::Bincode;
        let mut store = CheckpointStore::open(dir.path(), backend).unwrap();

        let performances = [0.50, 0.55, 0.53, 0.60];
        let mut running_best = f64::NEG_INFINITY;
        for (index, &performance) in performances.iter().enumerate() {
            let is_best = performance > running_best;
            if is_best {
                running_best = performance;
            }
            let metadata = CheckpointMetadata::new(
                format!("ck-{}", index),
                index as u64,
                performance,
                is_best,
                "",
                backend,
            );
            store
                .save(&format!("cycle-{:06}", index), &sample_weights(index as f32), &metadata)
                .unwrap();
        }

        assert_eq!(store.best_metric(), Some(0.60));
        let (_weights, best_meta) =
            CheckpointStore::load(dir.path().join("best.bin"), Some(backend)).unwrap();
        assert_eq!(best_meta.performance, 0.60);
        assert_eq!(best_meta.checkpoint_id, "ck-3");
    }

    #[test]
    fn test_best_metric_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let backend = CheckpointBackend::Bincode;
        {
            let mut store = CheckpointStore::open(dir.path(), backend).unwrap();
            let metadata = CheckpointMetadata::new("ck-1", 1, 0.7, true, "", backend);
            store.save("cycle-000001", &sample_weights(1.0), &metadata).unwrap();
        }
        let store = CheckpointStore::open(dir.path(), backend).unwrap();
        assert_eq!(store.best_metric(), Some(0.7));
    }

    #[test]
    fn test_list_orders_by_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let backend = CheckpointBackend::Bincode;
        let mut store = CheckpointStore::open(dir.path(), backend).unwrap();
        for cycle in [30u64, 10, 20] {
            let metadata = CheckpointMetadata::new(
                format!("ck-{}", cycle),
                cycle,
                0.0,
                false,
                "",
                backend,
            );
            store
                .save(&format!("cycle-{:06}", cycle), &sample_weights(1.0), &metadata)
                .unwrap();
        }
        let listed = CheckpointStore::list(dir.path()).unwrap();
        let cycles: Vec<u64> = listed.iter().map(|s| s.metadata.cycle).collect();
        assert_eq!(cycles, vec![10, 20, 30]);
    }
}
