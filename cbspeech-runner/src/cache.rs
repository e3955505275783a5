//! Stage memoization.
//!
//! A stage output is keyed by `StageKey { stage, fingerprint }`, where the
//! fingerprint is the BLAKE3 hash of the stage id, its parameters and the
//! fingerprints of its inputs. The artifact path is a pure function of the
//! key: `{root}/{stage}/{fingerprint}.json`. An artifact is reused only when
//! it is not older than the source files it was derived from.

use cbspeech_core::fingerprint::{Fingerprint, FingerprintBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, warn};

use crate::stage::StageId;

/// Bumped when the layout of a stage output changes.
const ARTIFACT_FORMAT: u64 = 1;

#[derive(Debug, Error)]
pub enum StageCacheError {
    #[error("stage cache I/O on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize stage artifact: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StageCacheError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StageKey {
    pub stage: StageId,
    pub fingerprint: Fingerprint,
}

impl StageKey {
    /// Derive the key of `stage` from its parameters and input fingerprints.
    pub fn derive<P: Serialize>(
        stage: StageId,
        params: &P,
        inputs: &[&Fingerprint],
    ) -> Result<Self, serde_json::Error> {
        let mut b = FingerprintBuilder::new("stage");
        b.u64(ARTIFACT_FORMAT).str(stage.as_str()).json(params)?;
        b.u64(inputs.len() as u64);
        for fp in inputs {
            b.fingerprint(fp);
        }
        Ok(Self {
            stage,
            fingerprint: b.finish(),
        })
    }

    /// `{stage}/{fingerprint}.json`
    pub fn relative_path(&self) -> PathBuf {
        Path::new(self.stage.as_str()).join(format!("{}.json", self.fingerprint))
    }
}

/// Artifact count and size of one stage directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageCacheSummary {
    pub stage: StageId,
    pub artifacts: usize,
    pub bytes: u64,
}

#[derive(Debug, Clone)]
pub struct StageCache {
    root: PathBuf,
}

impl StageCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, key: &StageKey) -> PathBuf {
        self.root.join(key.relative_path())
    }

    /// Whether an artifact exists for `key` and is at least as new as every
    /// existing file in `sources`.
    pub fn is_fresh(&self, key: &StageKey, sources: &[PathBuf]) -> bool {
        let Some(artifact) = modified(&self.path(key)) else {
            return false;
        };
        sources.iter().all(|src| match modified(src) {
            Some(t) => artifact >= t,
            None => true,
        })
    }

    /// Load a fresh artifact. `None` when missing, stale or unreadable.
    pub fn load<T: DeserializeOwned>(&self, key: &StageKey, sources: &[PathBuf]) -> Option<T> {
        if !self.is_fresh(key, sources) {
            return None;
        }
        let path = self.path(key);
        let content = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(v) => {
                debug!(path = %path.display(), "stage artifact loaded");
                Some(v)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable stage artifact");
                None
            }
        }
    }

    /// Persist an artifact atomically (write to .tmp, rename into place).
    pub fn store<T: Serialize>(&self, key: &StageKey, value: &T) -> Result<PathBuf, StageCacheError> {
        let path = self.path(key);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| StageCacheError::io(dir, e))?;
        }
        let json = serde_json::to_vec(value)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| StageCacheError::io(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            StageCacheError::io(&path, e)
        })?;
        Ok(path)
    }

    /// Artifact counts per memoized stage.
    pub fn summary(&self) -> Vec<StageCacheSummary> {
        StageId::MEMOIZED
            .iter()
            .map(|&stage| {
                let files = artifacts_in(&self.root.join(stage.as_str()));
                StageCacheSummary {
                    stage,
                    artifacts: files.len(),
                    bytes: files.iter().map(|(_, len)| len).sum(),
                }
            })
            .collect()
    }

    /// Delete every stage artifact. Returns the number of files removed.
    pub fn clear(&self) -> Result<usize, StageCacheError> {
        let mut removed = 0;
        for stage in StageId::MEMOIZED {
            for (path, _) in artifacts_in(&self.root.join(stage.as_str())) {
                fs::remove_file(&path).map_err(|e| StageCacheError::io(&path, e))?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn artifacts_in(dir: &Path) -> Vec<(PathBuf, u64)> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let path = e.path();
            let len = e.metadata().ok()?.len();
            (path.extension().and_then(|s| s.to_str()) == Some("json")).then_some((path, len))
        })
        .collect()
}
