//! Durable trip storage behind a single-writer lock.

use std::{collections::HashMap, fs::{self, File, OpenOptions}, io::{BufRead, BufReader, Write}, path::{Path, PathBuf}};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;
use model::*;

use crate::{import_ndjson, write_ndjson};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("trip {0} not found")]
    NotFound(Uuid),
    #[error("trip {0} already exists")]
    Duplicate(Uuid),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Persistence for trip segments. Every call is atomic with respect to
/// every other call on the same store.
pub trait TripStore: Send + Sync {
    fn insert(&self, segment: TripSegment) -> Result<(), StoreError>;
    fn append_point(&self, id: Uuid, point: TripPoint) -> Result<(), StoreError>;
    fn finish(&self, id: Uuid, end_time: u64) -> Result<(), StoreError>;
    /// Idempotent: marking an already synced segment is a no-op.
    fn mark_synced(&self, id: Uuid) -> Result<(), StoreError>;
    /// Unsynced segments, oldest first.
    fn list_unsynced(&self) -> Result<Vec<TripSegment>, StoreError>;
    fn get(&self, id: Uuid) -> Result<Option<TripSegment>, StoreError>;

    fn unsynced_count(&self) -> Result<usize, StoreError> {
        Ok(self.list_unsynced()?.len())
    }
}

#[derive(Default)]
struct TripTable {
    trips: HashMap<Uuid, TripSegment>,
}

impl TripTable {
    fn from_segments(segments: Vec<TripSegment>) -> Self {
        Self { trips: segments.into_iter().map(|s| (s.id, s)).collect() }
    }

    fn insert(&mut self, segment: TripSegment) -> Result<(), StoreError> {
        if self.trips.contains_key(&segment.id) {
            return Err(StoreError::Duplicate(segment.id));
        }
        self.trips.insert(segment.id, segment);
        Ok(())
    }

    fn get_mut(&mut self, id: Uuid) -> Result<&mut TripSegment, StoreError> {
        self.trips.get_mut(&id).ok_or(StoreError::NotFound(id))
    }

    /// Returns whether anything changed.
    fn mark_synced(&mut self, id: Uuid) -> Result<bool, StoreError> {
        let t = self.get_mut(id)?;
        let changed = !t.synced;
        t.synced = true;
        Ok(changed)
    }

    fn sorted(&self, unsynced_only: bool) -> Vec<TripSegment> {
        let mut v: Vec<TripSegment> = self
            .trips
            .values()
            .filter(|t| !unsynced_only || !t.synced)
            .cloned()
            .collect();
        v.sort_by_key(|t| t.start_time);
        v
    }
}

/// Process-local store, used by tests and when no data directory exists.
#[derive(Default)]
pub struct MemoryTripStore {
    inner: Mutex<TripTable>,
}

impl MemoryTripStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<TripSegment> {
        self.inner.lock().sorted(false)
    }
}

impl TripStore for MemoryTripStore {
    fn insert(&self, segment: TripSegment) -> Result<(), StoreError> {
        self.inner.lock().insert(segment)
    }

    fn append_point(&self, id: Uuid, point: TripPoint) -> Result<(), StoreError> {
        self.inner.lock().get_mut(id)?.points.push(point);
        Ok(())
    }

    fn finish(&self, id: Uuid, end_time: u64) -> Result<(), StoreError> {
        self.inner.lock().get_mut(id)?.end_time = Some(end_time);
        Ok(())
    }

    fn mark_synced(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.lock().mark_synced(id).map(|_| ())
    }

    fn list_unsynced(&self) -> Result<Vec<TripSegment>, StoreError> {
        Ok(self.inner.lock().sorted(true))
    }

    fn get(&self, id: Uuid) -> Result<Option<TripSegment>, StoreError> {
        Ok(self.inner.lock().trips.get(&id).cloned())
    }
}

/// One JSON segment per line, plus a `<path>.journal` of appended points.
/// Points only ever append one journal line; the snapshot is rewritten
/// (and the journal folded in) on open, insert, finish and mark-synced.
pub struct NdjsonTripStore {
    path: PathBuf,
    journal: PathBuf,
    inner: Mutex<TripTable>,
}

#[derive(Serialize, Deserialize)]
struct JournalPoint {
    id: Uuid,
    point: TripPoint,
}

impl NdjsonTripStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let segments = if path.exists() { import_ndjson(path)? } else { Vec::new() };
        let mut table = TripTable::from_segments(segments);
        let journal = journal_path(path);
        let replayed = if journal.exists() { replay_journal(&journal, &mut table)? } else { 0 };

        let store = Self { path: path.to_path_buf(), journal, inner: Mutex::new(TripTable::default()) };
        if store.journal.exists() {
            store.compact(&table)?;
        }
        debug!(
            "opened trip store {} with {} segments ({} journaled points)",
            path.display(),
            table.trips.len(),
            replayed
        );
        *store.inner.lock() = table;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn all(&self) -> Vec<TripSegment> {
        self.inner.lock().sorted(false)
    }

    /// Writes the snapshot and drops the journal it now contains.
    fn compact(&self, table: &TripTable) -> Result<(), StoreError> {
        let tmp = self.path.with_extension("ndjson.tmp");
        write_ndjson(&table.sorted(false), &tmp)?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            warn!("could not replace {}: {}", self.path.display(), e);
            StoreError::Io(e)
        })?;
        match fs::remove_file(&self.journal) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(StoreError::Io(e)),
            _ => Ok(()),
        }
    }

    fn mutate<F>(&self, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut TripTable) -> Result<bool, StoreError>,
    {
        let mut table = self.inner.lock();
        if f(&mut table)? {
            self.compact(&table)?;
        }
        Ok(())
    }
}

fn journal_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".journal");
    path.with_file_name(name)
}

/// Applies journaled points. Points at or before a segment's last stored
/// timestamp are already in the snapshot and are skipped.
fn replay_journal(journal: &Path, table: &mut TripTable) -> Result<usize, StoreError> {
    let rdr = BufReader::new(File::open(journal)?);
    let mut applied = 0;
    for (n, line) in rdr.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: JournalPoint = match serde_json::from_str(&line) {
            Ok(e) => e,
            Err(e) => {
                warn!("skipping corrupt journal line {}:{}: {}", journal.display(), n + 1, e);
                continue;
            }
        };
        let Some(seg) = table.trips.get_mut(&entry.id) else {
            warn!("journal point for unknown trip {}", entry.id);
            continue;
        };
        if seg.points.last().is_some_and(|p| p.timestamp >= entry.point.timestamp) {
            continue;
        }
        seg.points.push(entry.point);
        applied += 1;
    }
    Ok(applied)
}

impl TripStore for NdjsonTripStore {
    fn insert(&self, segment: TripSegment) -> Result<(), StoreError> {
        self.mutate(|t| t.insert(segment).map(|_| true))
    }

    fn append_point(&self, id: Uuid, point: TripPoint) -> Result<(), StoreError> {
        let mut table = self.inner.lock();
        let segment = table.get_mut(id)?;
        let entry = JournalPoint { id, point };
        let line = serde_json::to_string(&entry).map_err(anyhow::Error::from)?;
        let mut f = OpenOptions::new().create(true).append(true).open(&self.journal)?;
        writeln!(f, "{line}")?;
        segment.points.push(entry.point);
        Ok(())
    }

    fn finish(&self, id: Uuid, end_time: u64) -> Result<(), StoreError> {
        self.mutate(|t| {
            t.get_mut(id)?.end_time = Some(end_time);
            Ok(true)
        })
    }

    fn mark_synced(&self, id: Uuid) -> Result<(), StoreError> {
        self.mutate(|t| t.mark_synced(id))
    }

    fn list_unsynced(&self) -> Result<Vec<TripSegment>, StoreError> {
        Ok(self.inner.lock().sorted(true))
    }

    fn get(&self, id: Uuid) -> Result<Option<TripSegment>, StoreError> {
        Ok(self.inner.lock().trips.get(&id).cloned())
    }
}
