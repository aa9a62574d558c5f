use std::path::Path;
use std::sync::Arc;

use apex_shared::error::{ApexError, ApexResult};

use crate::ops::{Op, OpResult};

/// A cheaply-clonable handle to the embedded store.
///
/// This is the "small context value carrying the store handle" design
/// note from spec §9: every component that needs storage access holds
/// one of these rather than a direct reference to another component,
/// which is how the workspace avoids cyclic references between the
/// Orchestrator, Process Manager, and Briefing Store.
#[derive(Clone)]
pub struct StoreHandle {
    db: Arc<sled::Db>,
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("path", &self.db.path())
            .finish()
    }
}

impl StoreHandle {
    /// Open (or create) the store file at `path`. `map_size_bytes` is
    /// an advisory cache-size hint, not a hard cap — `sled` grows its
    /// backing file as needed.
    pub fn open(path: impl AsRef<Path>, map_size_bytes: u64) -> ApexResult<Self> {
        let db = sled::Config::new()
            .path(path.as_ref())
            .cache_capacity(map_size_bytes)
            .open()
            .map_err(map_sled_err)?;
        Ok(Self { db: Arc::new(db) })
    }

    /// The filesystem path this store is backed by, e.g. for handing
    /// to a utility subprocess via `--lmdb-path` (spec §6).
    pub fn path(&self) -> std::path::PathBuf {
        self.db.path().to_path_buf()
    }

    /// Open a store backed by a temporary directory, for tests.
    pub fn open_temporary() -> ApexResult<(Self, tempfile::TempDir)> {
        let dir = tempfile::tempdir().map_err(|e| ApexError::IoFailure(e.to_string()))?;
        let handle = Self::open(dir.path(), 16 * 1024 * 1024)?;
        Ok((handle, dir))
    }

    pub fn read(&self, key: &str) -> ApexResult<Option<Vec<u8>>> {
        self.db
            .get(key.as_bytes())
            .map(|opt| opt.map(|ivec| ivec.to_vec()))
            .map_err(map_sled_err)
    }

    pub fn write(&self, key: &str, value: &[u8]) -> ApexResult<()> {
        self.db
            .insert(key.as_bytes(), value)
            .map(|_| ())
            .map_err(map_sled_err)?;
        self.db.flush().map_err(map_sled_err)?;
        Ok(())
    }

    pub fn delete(&self, key: &str) -> ApexResult<()> {
        self.db.remove(key.as_bytes()).map_err(map_sled_err)?;
        self.db.flush().map_err(map_sled_err)?;
        Ok(())
    }

    /// Ordered list of keys whose bytes start with `prefix`.
    pub fn list_keys(&self, prefix: &str) -> ApexResult<Vec<String>> {
        self.db
            .scan_prefix(prefix.as_bytes())
            .keys()
            .map(|res| {
                res.map_err(map_sled_err).map(|ivec| {
                    String::from_utf8_lossy(&ivec).into_owned()
                })
            })
            .collect()
    }

    /// Bounded ordered `(key, value)` pairs in `[start, end)`, at most
    /// `limit` entries.
    pub fn scan(
        &self,
        start: &str,
        end: &str,
        limit: usize,
    ) -> ApexResult<Vec<(String, Vec<u8>)>> {
        self.db
            .range(start.as_bytes().to_vec()..end.as_bytes().to_vec())
            .take(limit)
            .map(|res| {
                res.map_err(map_sled_err).map(|(k, v)| {
                    (String::from_utf8_lossy(&k).into_owned(), v.to_vec())
                })
            })
            .collect()
    }

    /// All-or-nothing batch of reads/writes/deletes. `sled`'s
    /// transactional tree serializes this against every other writer.
    pub fn transact(&self, ops: Vec<Op>) -> ApexResult<Vec<OpResult>> {
        let result: sled::transaction::TransactionResult<Vec<OpResult>, ApexError> =
            self.db.transaction(|tx| {
                let mut results = Vec::with_capacity(ops.len());
                for op in &ops {
                    match op {
                        Op::Read(key) => {
                            let value = tx.get(key.as_bytes())?;
                            results.push(OpResult::Value(value.map(|v| v.to_vec())));
                        }
                        Op::Write(key, value) => {
                            tx.insert(key.as_bytes(), value.as_slice())?;
                            results.push(OpResult::Written);
                        }
                        Op::Delete(key) => {
                            tx.remove(key.as_bytes())?;
                            results.push(OpResult::Deleted);
                        }
                    }
                }
                Ok(results)
            });

        let outcome = result.map_err(|e| match e {
            sled::transaction::TransactionError::Abort(err) => err,
            sled::transaction::TransactionError::Storage(storage_err) => {
                ApexError::Conflict(storage_err.to_string())
            }
        })?;
        self.db.flush().map_err(map_sled_err)?;
        Ok(outcome)
    }

    /// Snapshot every key/value pair under `prefix`, for the Recovery
    /// subsystem's checkpoint operation (spec §4.I).
    pub fn snapshot_prefix(&self, prefix: &str) -> ApexResult<Vec<(String, Vec<u8>)>> {
        self.db
            .scan_prefix(prefix.as_bytes())
            .map(|res| {
                res.map_err(map_sled_err).map(|(k, v)| {
                    (String::from_utf8_lossy(&k).into_owned(), v.to_vec())
                })
            })
            .collect()
    }
}

fn map_sled_err(err: sled::Error) -> ApexError {
    match err {
        sled::Error::Io(io_err) if io_err.kind() == std::io::ErrorKind::OutOfMemory => {
            ApexError::ResourceExhausted(io_err.to_string())
        }
        other => ApexError::IoFailure(other.to_string()),
    }
}
