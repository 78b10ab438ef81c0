//! Receipt / dispatch / file record persistence.
//!
//! The handler talks to a [`ReceiptStore`]; writes are only accepted between
//! `begin` and `commit`, and `rollback_if_active` discards everything written
//! since `begin`. Id allocation is not transactional: like a database
//! sequence, an id handed out inside a rolled-back transaction stays used, so a
//! record re-created after a rollback keeps the id it was first given.
//!
//! [`JsonStore`] persists committed state as one JSON document at
//! `<state>/receipts.json`, written with the `.tmp` + rename protocol. Several
//! processes may share that file (the daemon and `dr dispatcher`), so a commit
//! replays its own writes onto the document as it is on disk at that moment,
//! under an exclusive lock on `receipts.json.lock`.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};

use dr_core::{
    DispatchId, DispatchRecord, DispatcherStatus, DispatcherType, FileRecord, FileRecordId,
    ReceiptId, ReceiptRecord,
};

use crate::error::{store_io_err, StoreError};

/// Persistence boundary for lifecycle records and dispatcher status.
pub trait ReceiptStore: Send {
    fn begin(&mut self) -> Result<(), StoreError>;
    fn commit(&mut self) -> Result<(), StoreError>;
    /// Discard uncommitted writes; a no-op outside a transaction.
    fn rollback_if_active(&mut self);
    fn is_active(&self) -> bool;

    /// Insert or replace; assigns `receipt.id` on first save.
    fn save_receipt(&mut self, receipt: &mut ReceiptRecord) -> Result<ReceiptId, StoreError>;
    /// Insert or replace; assigns `dispatch.id` on first save.
    fn save_dispatch(&mut self, dispatch: &mut DispatchRecord) -> Result<DispatchId, StoreError>;
    fn save_file(&mut self, file: &mut FileRecord) -> Result<FileRecordId, StoreError>;
    fn set_dispatcher_status(&mut self, status: DispatcherStatus) -> Result<(), StoreError>;

    fn receipt(&self, id: ReceiptId) -> Option<ReceiptRecord>;
    fn receipts(&self) -> Vec<ReceiptRecord>;
    fn dispatches_for(&self, receipt: ReceiptId) -> Vec<DispatchRecord>;
    fn files_for(&self, dispatch: DispatchId) -> Vec<FileRecord>;
    /// `None` means no operator decision was recorded: the dispatcher is enabled.
    fn dispatcher_status(&self, dispatcher_type: DispatcherType) -> Option<DispatcherStatus>;
}

/// Complete store contents; also the on-disk format of [`JsonStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub next_id: u64,
    #[serde(default)]
    pub receipts: Vec<ReceiptRecord>,
    #[serde(default)]
    pub dispatches: Vec<DispatchRecord>,
    #[serde(default)]
    pub files: Vec<FileRecord>,
    #[serde(default)]
    pub dispatcher_statuses: Vec<DispatcherStatus>,
}

impl StoreSnapshot {
    fn put_receipt(&mut self, receipt: ReceiptRecord) {
        match self.receipts.iter_mut().find(|r| r.id == receipt.id) {
            Some(existing) => *existing = receipt,
            None => self.receipts.push(receipt),
        }
    }

    fn put_dispatch(&mut self, dispatch: DispatchRecord) {
        match self.dispatches.iter_mut().find(|d| d.id == dispatch.id) {
            Some(existing) => *existing = dispatch,
            None => self.dispatches.push(dispatch),
        }
    }

    fn put_file(&mut self, file: FileRecord) {
        match self.files.iter_mut().find(|f| f.id == file.id) {
            Some(existing) => *existing = file,
            None => self.files.push(file),
        }
    }

    fn put_status(&mut self, status: DispatcherStatus) {
        match self
            .dispatcher_statuses
            .iter_mut()
            .find(|s| s.dispatcher_type == status.dispatcher_type)
        {
            Some(existing) => *existing = status,
            None => self.dispatcher_statuses.push(status),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-process store: a committed snapshot plus a working copy while a
/// transaction is open.
#[derive(Debug, Default)]
pub struct MemoryStore {
    committed: StoreSnapshot,
    pending: Option<StoreSnapshot>,
    next_id: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let next_id = snapshot.next_id;
        Self {
            committed: snapshot,
            pending: None,
            next_id,
        }
    }

    /// Committed state only.
    pub fn snapshot(&self) -> &StoreSnapshot {
        &self.committed
    }

    fn view(&self) -> &StoreSnapshot {
        self.pending.as_ref().unwrap_or(&self.committed)
    }

    fn working(&mut self) -> Result<&mut StoreSnapshot, StoreError> {
        self.pending.as_mut().ok_or(StoreError::NoTransaction)
    }

    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// The state `commit` would publish, with the id sequence folded in.
    fn pending_snapshot(&self) -> Option<StoreSnapshot> {
        self.pending.clone().map(|mut snapshot| {
            snapshot.next_id = self.next_id;
            snapshot
        })
    }

    /// Replace committed state with `snapshot`, never moving the sequence backwards.
    fn reload(&mut self, snapshot: StoreSnapshot) {
        self.next_id = self.next_id.max(snapshot.next_id);
        self.committed = snapshot;
    }
}

impl ReceiptStore for MemoryStore {
    fn begin(&mut self) -> Result<(), StoreError> {
        if self.pending.is_some() {
            return Err(StoreError::TransactionActive);
        }
        self.pending = Some(self.committed.clone());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        let snapshot = self.pending_snapshot().ok_or(StoreError::NoTransaction)?;
        self.committed = snapshot;
        self.pending = None;
        Ok(())
    }

    fn rollback_if_active(&mut self) {
        if self.pending.take().is_some() {
            tracing::debug!("rolled back store transaction");
        }
    }

    fn is_active(&self) -> bool {
        self.pending.is_some()
    }

    fn save_receipt(&mut self, receipt: &mut ReceiptRecord) -> Result<ReceiptId, StoreError> {
        self.working()?;
        let id = *receipt.id.get_or_insert_with(|| ReceiptId(self.allocate()));
        self.working()?.put_receipt(receipt.clone());
        Ok(id)
    }

    fn save_dispatch(&mut self, dispatch: &mut DispatchRecord) -> Result<DispatchId, StoreError> {
        self.working()?;
        let id = *dispatch.id.get_or_insert_with(|| DispatchId(self.allocate()));
        self.working()?.put_dispatch(dispatch.clone());
        Ok(id)
    }

    fn save_file(&mut self, file: &mut FileRecord) -> Result<FileRecordId, StoreError> {
        self.working()?;
        let id = *file.id.get_or_insert_with(|| FileRecordId(self.allocate()));
        self.working()?.put_file(file.clone());
        Ok(id)
    }

    fn set_dispatcher_status(&mut self, status: DispatcherStatus) -> Result<(), StoreError> {
        self.working()?.put_status(status);
        Ok(())
    }

    fn receipt(&self, id: ReceiptId) -> Option<ReceiptRecord> {
        self.view()
            .receipts
            .iter()
            .find(|r| r.id == Some(id))
            .cloned()
    }

    fn receipts(&self) -> Vec<ReceiptRecord> {
        self.view().receipts.clone()
    }

    fn dispatches_for(&self, receipt: ReceiptId) -> Vec<DispatchRecord> {
        self.view()
            .dispatches
            .iter()
            .filter(|d| d.receipt_id == Some(receipt))
            .cloned()
            .collect()
    }

    fn files_for(&self, dispatch: DispatchId) -> Vec<FileRecord> {
        self.view()
            .files
            .iter()
            .filter(|f| f.dispatch_id == dispatch)
            .cloned()
            .collect()
    }

    fn dispatcher_status(&self, dispatcher_type: DispatcherType) -> Option<DispatcherStatus> {
        self.view()
            .dispatcher_statuses
            .iter()
            .find(|s| s.dispatcher_type == dispatcher_type)
            .copied()
    }
}

// ---------------------------------------------------------------------------
// JsonStore
// ---------------------------------------------------------------------------

/// File-backed store. Every `begin` re-reads the document so that edits made by
/// other processes (e.g. `dr dispatcher disable`) are seen by the next message.
#[derive(Debug)]
pub struct JsonStore {
    path: PathBuf,
    inner: MemoryStore,
    /// Writes of the open transaction, replayed onto the on-disk document at commit.
    writes: Vec<StoreWrite>,
}

#[derive(Debug, Clone)]
enum StoreWrite {
    Receipt(ReceiptRecord),
    Dispatch(DispatchRecord),
    File(FileRecord),
    Status(DispatcherStatus),
}

impl StoreWrite {
    fn apply(&self, snapshot: &mut StoreSnapshot) {
        match self {
            StoreWrite::Receipt(receipt) => snapshot.put_receipt(receipt.clone()),
            StoreWrite::Dispatch(dispatch) => snapshot.put_dispatch(dispatch.clone()),
            StoreWrite::File(file) => snapshot.put_file(file.clone()),
            StoreWrite::Status(status) => snapshot.put_status(*status),
        }
    }
}

impl JsonStore {
    /// Open the store at `path`; a missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let snapshot = load_snapshot(&path)?;
        Ok(Self {
            path,
            inner: MemoryStore::from_snapshot(snapshot),
            writes: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Committed state as of the last `open`, `begin` or `commit`.
    pub fn snapshot(&self) -> &StoreSnapshot {
        self.inner.snapshot()
    }
}

impl ReceiptStore for JsonStore {
    fn begin(&mut self) -> Result<(), StoreError> {
        if self.inner.is_active() {
            return Err(StoreError::TransactionActive);
        }
        let snapshot = load_snapshot(&self.path)?;
        self.inner.reload(snapshot);
        self.writes.clear();
        self.inner.begin()
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        if !self.inner.is_active() {
            return Err(StoreError::NoTransaction);
        }
        let _lock = StoreLock::acquire(&self.path)?;
        let mut merged = load_snapshot(&self.path)?;
        for write in &self.writes {
            write.apply(&mut merged);
        }
        merged.next_id = merged.next_id.max(self.inner.next_id);
        save_snapshot(&self.path, &merged)?;

        tracing::debug!(writes = self.writes.len(), path = %self.path.display(), "committed store transaction");
        self.writes.clear();
        self.inner.pending = None;
        self.inner.reload(merged);
        Ok(())
    }

    fn rollback_if_active(&mut self) {
        self.writes.clear();
        self.inner.rollback_if_active();
    }

    fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    fn save_receipt(&mut self, receipt: &mut ReceiptRecord) -> Result<ReceiptId, StoreError> {
        let id = self.inner.save_receipt(receipt)?;
        self.writes.push(StoreWrite::Receipt(receipt.clone()));
        Ok(id)
    }

    fn save_dispatch(&mut self, dispatch: &mut DispatchRecord) -> Result<DispatchId, StoreError> {
        let id = self.inner.save_dispatch(dispatch)?;
        self.writes.push(StoreWrite::Dispatch(dispatch.clone()));
        Ok(id)
    }

    fn save_file(&mut self, file: &mut FileRecord) -> Result<FileRecordId, StoreError> {
        let id = self.inner.save_file(file)?;
        self.writes.push(StoreWrite::File(file.clone()));
        Ok(id)
    }

    fn set_dispatcher_status(&mut self, status: DispatcherStatus) -> Result<(), StoreError> {
        self.inner.set_dispatcher_status(status)?;
        self.writes.push(StoreWrite::Status(status));
        Ok(())
    }

    fn receipt(&self, id: ReceiptId) -> Option<ReceiptRecord> {
        self.inner.receipt(id)
    }

    fn receipts(&self) -> Vec<ReceiptRecord> {
        self.inner.receipts()
    }

    fn dispatches_for(&self, receipt: ReceiptId) -> Vec<DispatchRecord> {
        self.inner.dispatches_for(receipt)
    }

    fn files_for(&self, dispatch: DispatchId) -> Vec<FileRecord> {
        self.inner.files_for(dispatch)
    }

    fn dispatcher_status(&self, dispatcher_type: DispatcherType) -> Option<DispatcherStatus> {
        self.inner.dispatcher_status(dispatcher_type)
    }
}

/// Exclusive advisory lock on `<store>.lock`, released on drop.
struct StoreLock {
    file: File,
}

impl StoreLock {
    fn acquire(store_path: &Path) -> Result<Self, StoreError> {
        if let Some(dir) = store_path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| store_io_err(dir, e))?;
        }
        let path = store_path.with_extension("json.lock");
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| store_io_err(&path, e))?;
        file.lock_exclusive().map_err(|e| store_io_err(&path, e))?;
        Ok(Self { file })
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn load_snapshot(path: &Path) -> Result<StoreSnapshot, StoreError> {
    if !path.exists() {
        return Ok(StoreSnapshot::default());
    }
    let contents = std::fs::read_to_string(path).map_err(|e| store_io_err(path, e))?;
    Ok(serde_json::from_str(&contents)?)
}

fn save_snapshot(path: &Path, snapshot: &StoreSnapshot) -> Result<(), StoreError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| store_io_err(dir, e))?;
    }
    let json = serde_json::to_string_pretty(snapshot)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| store_io_err(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| store_io_err(path, e))?;
    Ok(())
}
