//! Persistent build ledger
//!
//! One JSON record per cell holds the last committed build (fingerprint,
//! time, status). An in-progress build is a separate `.building` marker
//! created with `create_new`, so at most one build per cell can hold it
//! across threads and processes. Commit replaces the record atomically
//! and removes the marker; abort only removes the marker, leaving the
//! previous record as it was.
//!
//! Markers older than the staleness threshold are reported as failed
//! builds and may be reclaimed by the next `begin_build`.
//!
//! # Layout
//!
//! | File | Content |
//! |------|---------|
//! | `<storage-id>.json` | committed [`LedgerEntry`] |
//! | `<storage-id>.building` | in-progress marker (token, start time, pid) |

use crate::cache::fingerprint::Fingerprint;
use crate::error::{DrydockError, DrydockResult};
use crate::matrix::MatrixCell;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// On-disk record format
pub const LEDGER_FORMAT: u32 = 1;

const RECORD_EXT: &str = "json";
const MARKER_EXT: &str = "building";

/// Build status of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildStatus {
    Success,
    Failed,
    InProgress,
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::InProgress => write!(f, "in-progress"),
        }
    }
}

/// Snapshot of one cell's ledger state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub cell: MatrixCell,
    /// Fingerprint of the last committed build, if any
    pub fingerprint: Option<Fingerprint>,
    /// Commit time, or start time for in-progress builds
    pub built_at: DateTime<Utc>,
    pub status: BuildStatus,
    /// Set when the entry comes from an abandoned in-progress marker
    pub interrupted: bool,
}

impl LedgerEntry {
    /// Whether this entry can justify reusing an image with `current`
    pub fn is_reusable_for(&self, current: &Fingerprint) -> bool {
        self.status == BuildStatus::Success
            && self.fingerprint.as_ref().is_some_and(|fp| fp.matches(current))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LedgerRecord {
    format: u32,
    cell: MatrixCell,
    fingerprint: Fingerprint,
    built_at: DateTime<Utc>,
    status: BuildStatus,
}

#[derive(Debug, Serialize, Deserialize)]
struct BuildMarker {
    cell: MatrixCell,
    token: Uuid,
    started_at: DateTime<Utc>,
    pid: u32,
}

/// Proof of holding a cell's in-progress marker
///
/// Consumed by [`Ledger::commit`] or [`Ledger::abort`]. Dropping it
/// without either leaves the marker for the staleness rule.
#[derive(Debug)]
#[must_use = "a build token must be committed or aborted"]
pub struct BuildToken {
    cell: MatrixCell,
    id: Uuid,
    started_at: DateTime<Utc>,
}

/// Per-cell persistent build ledger
pub struct Ledger {
    dir: PathBuf,
    stale_after: Duration,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Ledger {
    /// Open (creating if needed) the ledger in `dir`
    pub async fn open(dir: impl Into<PathBuf>, stale_after: std::time::Duration) -> DrydockResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| DrydockError::io(format!("creating ledger directory {}", dir.display()), e))?;

        let stale_after = Duration::from_std(stale_after)
            .map_err(|e| DrydockError::Internal(format!("staleness threshold out of range: {}", e)))?;

        Ok(Self {
            dir,
            stale_after,
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Current state of `cell`, with stale markers reported as failed
    pub async fn get(&self, cell: &MatrixCell) -> DrydockResult<Option<LedgerEntry>> {
        let record = self.read_record(cell).await?;
        let marker = self.read_marker(cell).await?;

        let entry = match (marker, record) {
            (Some(marker), record) => {
                let stale = self.is_stale(marker.started_at);
                Some(LedgerEntry {
                    cell: cell.clone(),
                    fingerprint: record.map(|r| r.fingerprint),
                    built_at: marker.started_at,
                    status: if stale {
                        BuildStatus::Failed
                    } else {
                        BuildStatus::InProgress
                    },
                    interrupted: stale,
                })
            }
            (None, Some(record)) => Some(LedgerEntry {
                cell: cell.clone(),
                fingerprint: Some(record.fingerprint),
                built_at: record.built_at,
                status: record.status,
                interrupted: false,
            }),
            (None, None) => None,
        };

        Ok(entry)
    }

    /// Mark `cell` in-progress
    ///
    /// Fails with `ConcurrentBuildConflict` while another live build holds
    /// the cell. A stale marker is reclaimed.
    pub async fn begin_build(&self, cell: &MatrixCell) -> DrydockResult<BuildToken> {
        let lock = self.key_lock(cell);
        let _guard = lock.lock().await;

        let marker_path = self.marker_path(cell);

        for _ in 0..2 {
            let token = BuildToken {
                cell: cell.clone(),
                id: Uuid::new_v4(),
                started_at: Utc::now(),
            };

            match self.create_marker(&marker_path, &token).await {
                Ok(()) => {
                    debug!("[{}] build started (token {})", cell, token.id);
                    return Ok(token);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    let started_at = self.marker_started_at(&marker_path).await?;
                    if !self.is_stale(started_at) {
                        return Err(DrydockError::ConcurrentBuildConflict {
                            cell: cell.key(),
                            started_at: started_at.to_rfc3339(),
                        });
                    }
                    warn!(
                        "[{}] reclaiming abandoned build started {}",
                        cell,
                        started_at.to_rfc3339()
                    );
                    remove_if_exists(&marker_path).await?;
                }
                Err(e) => {
                    return Err(DrydockError::io(
                        format!("creating build marker {}", marker_path.display()),
                        e,
                    ))
                }
            }
        }

        Err(DrydockError::ConcurrentBuildConflict {
            cell: cell.key(),
            started_at: "just now".to_string(),
        })
    }

    /// Record the outcome of a build and release the cell
    pub async fn commit(
        &self,
        token: BuildToken,
        fingerprint: Fingerprint,
        status: BuildStatus,
    ) -> DrydockResult<LedgerEntry> {
        if status == BuildStatus::InProgress {
            return Err(DrydockError::Internal(
                "cannot commit a build as in-progress".to_string(),
            ));
        }

        let lock = self.key_lock(&token.cell);
        let _guard = lock.lock().await;

        self.verify_token(&token).await?;

        let record = LedgerRecord {
            format: LEDGER_FORMAT,
            cell: token.cell.clone(),
            fingerprint,
            built_at: Utc::now(),
            status,
        };
        let content = serde_json::to_vec_pretty(&record)?;
        write_atomic(&self.record_path(&token.cell), &content).await?;
        remove_if_exists(&self.marker_path(&token.cell)).await?;

        info!(
            "[{}] ledger committed {} ({})",
            token.cell, record.status, record.fingerprint
        );

        Ok(LedgerEntry {
            cell: record.cell,
            fingerprint: Some(record.fingerprint),
            built_at: record.built_at,
            status: record.status,
            interrupted: false,
        })
    }

    /// Release the cell without touching its committed record
    pub async fn abort(&self, token: BuildToken) -> DrydockResult<()> {
        let lock = self.key_lock(&token.cell);
        let _guard = lock.lock().await;

        self.verify_token(&token).await?;
        remove_if_exists(&self.marker_path(&token.cell)).await?;

        debug!("[{}] build aborted (token {})", token.cell, token.id);
        Ok(())
    }

    /// Every cell with a record or marker, in cell order
    pub async fn entries(&self) -> DrydockResult<Vec<LedgerEntry>> {
        let mut cells = BTreeSet::new();

        let mut dir = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| DrydockError::io(format!("reading ledger {}", self.dir.display()), e))?;

        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| DrydockError::io("reading ledger entry", e))?
        {
            let path = entry.path();
            match path.extension().and_then(|e| e.to_str()) {
                Some(RECORD_EXT) => {
                    if let Some(record) = read_json::<LedgerRecord>(&path).await? {
                        cells.insert(record.cell);
                    }
                }
                Some(MARKER_EXT) => {
                    if let Ok(Some(marker)) = read_json::<BuildMarker>(&path).await {
                        cells.insert(marker.cell);
                    }
                }
                _ => {}
            }
        }

        let mut entries = Vec::with_capacity(cells.len());
        for cell in cells {
            if let Some(entry) = self.get(&cell).await? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// Drop everything recorded for `cell`; returns whether anything existed
    pub async fn forget(&self, cell: &MatrixCell) -> DrydockResult<bool> {
        let lock = self.key_lock(cell);
        let _guard = lock.lock().await;

        let record = remove_if_exists(&self.record_path(cell)).await?;
        let marker = remove_if_exists(&self.marker_path(cell)).await?;
        Ok(record || marker)
    }

    /// Remove all records and markers; returns the number of files removed
    pub async fn clear(&self) -> DrydockResult<usize> {
        let mut removed = 0;
        let mut dir = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| DrydockError::io(format!("reading ledger {}", self.dir.display()), e))?;

        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| DrydockError::io("reading ledger entry", e))?
        {
            let path = entry.path();
            let ours = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some(RECORD_EXT) | Some(MARKER_EXT)
            );
            if ours && remove_if_exists(&path).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn key_lock(&self, cell: &MatrixCell) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(cell.key()).or_default().clone()
    }

    fn is_stale(&self, started_at: DateTime<Utc>) -> bool {
        Utc::now() - started_at >= self.stale_after
    }

    fn record_path(&self, cell: &MatrixCell) -> PathBuf {
        self.dir
            .join(format!("{}.{}", cell.storage_id(), RECORD_EXT))
    }

    fn marker_path(&self, cell: &MatrixCell) -> PathBuf {
        self.dir
            .join(format!("{}.{}", cell.storage_id(), MARKER_EXT))
    }

    async fn read_record(&self, cell: &MatrixCell) -> DrydockResult<Option<LedgerRecord>> {
        let path = self.record_path(cell);
        let record = read_json::<LedgerRecord>(&path).await?;
        match record {
            Some(record) if record.cell != *cell => Err(DrydockError::LedgerCorrupt {
                path,
                reason: format!("record belongs to {}, expected {}", record.cell, cell),
            }),
            other => Ok(other),
        }
    }

    async fn read_marker(&self, cell: &MatrixCell) -> DrydockResult<Option<BuildMarker>> {
        let path = self.marker_path(cell);
        match read_json::<BuildMarker>(&path).await {
            Ok(marker) => Ok(marker),
            // Marker still being written, or left half-written by a crash
            Err(DrydockError::LedgerCorrupt { .. }) => {
                let started_at = file_mtime(&path).await?;
                Ok(Some(BuildMarker {
                    cell: cell.clone(),
                    token: Uuid::nil(),
                    started_at,
                    pid: 0,
                }))
            }
            Err(e) => Err(e),
        }
    }

    async fn marker_started_at(&self, path: &Path) -> DrydockResult<DateTime<Utc>> {
        match read_json::<BuildMarker>(path).await {
            Ok(Some(marker)) => Ok(marker.started_at),
            Ok(None) => Ok(DateTime::<Utc>::MIN_UTC),
            Err(DrydockError::LedgerCorrupt { .. }) => file_mtime(path).await,
            Err(e) => Err(e),
        }
    }

    async fn create_marker(&self, path: &Path, token: &BuildToken) -> std::io::Result<()> {
        let marker = BuildMarker {
            cell: token.cell.clone(),
            token: token.id,
            started_at: token.started_at,
            pid: std::process::id(),
        };
        let content = serde_json::to_vec_pretty(&marker).map_err(std::io::Error::other)?;

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;
        file.write_all(&content).await?;
        file.flush().await?;
        Ok(())
    }

    async fn verify_token(&self, token: &BuildToken) -> DrydockResult<()> {
        let path = self.marker_path(&token.cell);
        match read_json::<BuildMarker>(&path).await {
            Ok(Some(marker)) if marker.token == token.id => Ok(()),
            Ok(_) | Err(DrydockError::LedgerCorrupt { .. }) => Err(DrydockError::BuildTokenLost {
                cell: token.cell.key(),
            }),
            Err(e) => Err(e),
        }
    }
}

/// Read and parse a JSON file; `None` if it does not exist
async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> DrydockResult<Option<T>> {
    let content = match tokio::fs::read(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(DrydockError::io(format!("reading {}", path.display()), e)),
    };

    serde_json::from_slice(&content)
        .map(Some)
        .map_err(|e| DrydockError::LedgerCorrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

async fn file_mtime(path: &Path) -> DrydockResult<DateTime<Utc>> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(DateTime::<Utc>::MIN_UTC),
        Err(e) => return Err(DrydockError::io(format!("inspecting {}", path.display()), e)),
    };
    let modified = metadata
        .modified()
        .map_err(|e| DrydockError::io(format!("reading mtime of {}", path.display()), e))?;
    Ok(DateTime::<Utc>::from(modified))
}

/// Write to a sibling temp file, then rename over `path`
async fn write_atomic(path: &Path, content: &[u8]) -> DrydockResult<()> {
    let tmp = path.with_extension(format!("tmp-{}", Uuid::new_v4().simple()));
    tokio::fs::write(&tmp, content)
        .await
        .map_err(|e| DrydockError::io(format!("writing {}", tmp.display()), e))?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(DrydockError::io(format!("replacing {}", path.display()), e));
    }
    Ok(())
}

async fn remove_if_exists(path: &Path) -> DrydockResult<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(DrydockError::io(format!("removing {}", path.display()), e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::fingerprint::{fingerprint, InputSet};
    use std::time::Duration as StdDuration;
    use tempfile::TempDir;

    const HOUR: StdDuration = StdDuration::from_secs(3600);

    fn cell(runtime: &str) -> MatrixCell {
        MatrixCell::new([("runtime", runtime), ("backend", "X")])
    }

    fn fp(content: &str) -> Fingerprint {
        let inputs: InputSet = [("input", content)].into_iter().collect();
        fingerprint(&cell("A"), &inputs)
    }

    async fn ledger(dir: &TempDir, stale_after: StdDuration) -> Ledger {
        Ledger::open(dir.path(), stale_after).await.unwrap()
    }

    #[tokio::test]
    async fn absent_cell_has_no_entry() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir, HOUR).await;
        assert!(ledger.get(&cell("A")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn commit_records_success() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir, HOUR).await;

        let token = ledger.begin_build(&cell("A")).await.unwrap();
        ledger
            .commit(token, fp("1"), BuildStatus::Success)
            .await
            .unwrap();

        let entry = ledger.get(&cell("A")).await.unwrap().unwrap();
        assert_eq!(entry.status, BuildStatus::Success);
        assert_eq!(entry.fingerprint, Some(fp("1")));
        assert!(entry.is_reusable_for(&fp("1")));
        assert!(!entry.is_reusable_for(&fp("2")));
    }

    #[tokio::test]
    async fn in_progress_is_never_reusable() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir, HOUR).await;

        let token = ledger.begin_build(&cell("A")).await.unwrap();
        ledger.commit(token, fp("1"), BuildStatus::Success).await.unwrap();

        let _rebuild = ledger.begin_build(&cell("A")).await.unwrap();
        let entry = ledger.get(&cell("A")).await.unwrap().unwrap();
        assert_eq!(entry.status, BuildStatus::InProgress);
        assert!(!entry.is_reusable_for(&fp("1")));
    }

    #[tokio::test]
    async fn concurrent_begin_build_conflicts() {
        let dir = TempDir::new().unwrap();
        let ledger = Arc::new(ledger(&dir, HOUR).await);

        let a = {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.begin_build(&cell("A")).await })
        };
        let b = {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.begin_build(&cell("A")).await })
        };
        let results = [a.await.unwrap(), b.await.unwrap()];

        let ok = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(DrydockError::ConcurrentBuildConflict { .. })))
            .count();
        assert_eq!(ok, 1);
        assert_eq!(conflicts, 1);
    }

    #[tokio::test]
    async fn different_cells_do_not_conflict() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir, HOUR).await;

        let a = ledger.begin_build(&cell("A")).await.unwrap();
        let b = ledger.begin_build(&cell("B")).await.unwrap();
        ledger.abort(a).await.unwrap();
        ledger.commit(b, fp("b"), BuildStatus::Success).await.unwrap();

        assert!(ledger.get(&cell("A")).await.unwrap().is_none());
        assert_eq!(
            ledger.get(&cell("B")).await.unwrap().unwrap().status,
            BuildStatus::Success
        );
    }

    #[tokio::test]
    async fn abort_restores_prior_state() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir, HOUR).await;

        let token = ledger.begin_build(&cell("A")).await.unwrap();
        ledger.commit(token, fp("1"), BuildStatus::Success).await.unwrap();
        let before = ledger.get(&cell("A")).await.unwrap().unwrap();

        let token = ledger.begin_build(&cell("A")).await.unwrap();
        ledger.abort(token).await.unwrap();

        let after = ledger.get(&cell("A")).await.unwrap().unwrap();
        assert_eq!(before, after);

        // and the cell can be built again
        let token = ledger.begin_build(&cell("A")).await.unwrap();
        ledger.abort(token).await.unwrap();
    }

    #[tokio::test]
    async fn stale_marker_reads_as_failed_and_is_reclaimable() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir, StdDuration::ZERO).await;

        let token = ledger.begin_build(&cell("A")).await.unwrap();
        ledger.commit(token, fp("1"), BuildStatus::Success).await.unwrap();

        // simulate a crash: token dropped without commit or abort
        let _crashed = ledger.begin_build(&cell("A")).await.unwrap();

        let entry = ledger.get(&cell("A")).await.unwrap().unwrap();
        assert_eq!(entry.status, BuildStatus::Failed);
        assert!(entry.interrupted);
        assert!(!entry.is_reusable_for(&fp("1")));

        let retry = ledger.begin_build(&cell("A")).await.unwrap();
        ledger.commit(retry, fp("2"), BuildStatus::Success).await.unwrap();
        assert!(ledger
            .get(&cell("A"))
            .await
            .unwrap()
            .unwrap()
            .is_reusable_for(&fp("2")));
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let ledger = ledger(&dir, HOUR).await;
            let token = ledger.begin_build(&cell("A")).await.unwrap();
            ledger.commit(token, fp("1"), BuildStatus::Success).await.unwrap();
            let _abandoned = ledger.begin_build(&cell("B")).await.unwrap();
        }

        let reopened = ledger(&dir, HOUR).await;
        assert_eq!(
            reopened.get(&cell("A")).await.unwrap().unwrap().fingerprint,
            Some(fp("1"))
        );
        assert_eq!(
            reopened.get(&cell("B")).await.unwrap().unwrap().status,
            BuildStatus::InProgress
        );
        assert!(matches!(
            reopened.begin_build(&cell("B")).await,
            Err(DrydockError::ConcurrentBuildConflict { .. })
        ));
    }

    #[tokio::test]
    async fn stolen_token_cannot_commit() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir, StdDuration::ZERO).await;

        let first = ledger.begin_build(&cell("A")).await.unwrap();
        let second = ledger.begin_build(&cell("A")).await.unwrap();

        assert!(matches!(
            ledger.commit(first, fp("1"), BuildStatus::Success).await,
            Err(DrydockError::BuildTokenLost { .. })
        ));
        ledger.commit(second, fp("2"), BuildStatus::Success).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_fields_are_ignored() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir, HOUR).await;
        let c = cell("A");
        let record = serde_json::json!({
            "format": 7,
            "cell": c.key(),
            "fingerprint": {"schema": 1, "digest": "abc", "algo": "sha256"},
            "built_at": "2024-01-15T10:00:00Z",
            "status": "success",
            "builder": "someone-else",
        });
        std::fs::write(
            dir.path().join(format!("{}.json", c.storage_id())),
            record.to_string(),
        )
        .unwrap();

        let entry = ledger.get(&c).await.unwrap().unwrap();
        assert_eq!(entry.status, BuildStatus::Success);
        assert_eq!(entry.fingerprint.unwrap().digest(), "abc");
    }

    #[tokio::test]
    async fn corrupt_record_is_reported() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir, HOUR).await;
        let c = cell("A");
        std::fs::write(dir.path().join(format!("{}.json", c.storage_id())), "{not json").unwrap();

        assert!(matches!(
            ledger.get(&c).await,
            Err(DrydockError::LedgerCorrupt { .. })
        ));
    }

    #[tokio::test]
    async fn entries_forget_and_clear() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir, HOUR).await;

        for runtime in ["B", "A"] {
            let token = ledger.begin_build(&cell(runtime)).await.unwrap();
            ledger.commit(token, fp(runtime), BuildStatus::Success).await.unwrap();
        }
        let entries = ledger.entries().await.unwrap();
        let keys: Vec<String> = entries.iter().map(|e| e.cell.key()).collect();
        assert_eq!(keys, vec!["runtime=A,backend=X", "runtime=B,backend=X"]);

        assert!(ledger.forget(&cell("A")).await.unwrap());
        assert!(!ledger.forget(&cell("A")).await.unwrap());
        assert_eq!(ledger.clear().await.unwrap(), 1);
        assert!(ledger.entries().await.unwrap().is_empty());
    }
}
