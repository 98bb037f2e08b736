//! Per-kind upload progress.
//!
//! The board is partitioned by file kind. Each partition has exactly one
//! writer, a [`ProgressCell`] owned by that kind's upload executor; everyone
//! else reads through the [`ProgressBoard`]. Writers never see each other's
//! cells.

use mediaflow_core::{FileKind, KindProgress};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::watch;

/// Write half of one kind's progress
#[derive(Debug)]
pub struct ProgressCell {
    kind: FileKind,
    tx: Arc<watch::Sender<KindProgress>>,
}

impl ProgressCell {
    /// Second handle on the same cell, for the upload body stream of the
    /// executor that owns this cell.
    pub(crate) fn share(&self) -> Self {
        Self {
            kind: self.kind,
            tx: Arc::clone(&self.tx),
        }
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    pub fn get(&self) -> KindProgress {
        *self.tx.borrow()
    }

    /// Record a new percentage. Returns true if the value moved forward.
    pub fn advance(&self, percent: u8) -> bool {
        self.tx.send_if_modified(|progress| progress.advance(percent))
    }

    pub fn complete(&self) {
        self.tx.send_modify(KindProgress::complete);
    }

    /// Discard partial progress. Returns true if there was any to discard.
    pub fn reset(&self) -> bool {
        self.tx.send_if_modified(|progress| {
            let had_progress = *progress != KindProgress::default();
            progress.reset();
            had_progress
        })
    }
}

/// Read-only view over every kind's progress
#[derive(Debug, Clone)]
pub struct ProgressBoard {
    cells: HashMap<FileKind, watch::Receiver<KindProgress>>,
}

impl ProgressBoard {
    /// Create a board plus one writer cell per kind. Duplicate kinds collapse
    /// to a single cell.
    pub fn new(kinds: impl IntoIterator<Item = FileKind>) -> (Self, BTreeMap<FileKind, ProgressCell>) {
        let mut cells = HashMap::new();
        let mut writers = BTreeMap::new();
        for kind in kinds {
            if writers.contains_key(&kind) {
                continue;
            }
            let (tx, rx) = watch::channel(KindProgress::default());
            cells.insert(kind, rx);
            writers.insert(
                kind,
                ProgressCell {
                    kind,
                    tx: Arc::new(tx),
                },
            );
        }
        (Self { cells }, writers)
    }

    pub fn get(&self, kind: FileKind) -> Option<KindProgress> {
        self.cells.get(&kind).map(|rx| *rx.borrow())
    }

    pub fn snapshot(&self) -> BTreeMap<FileKind, KindProgress> {
        self.cells
            .iter()
            .map(|(kind, rx)| (*kind, *rx.borrow()))
            .collect()
    }

    /// Watch one kind's progress for changes
    pub fn subscribe(&self, kind: FileKind) -> Option<watch::Receiver<KindProgress>> {
        self.cells.get(&kind).cloned()
    }

    pub fn all_uploaded(&self) -> bool {
        self.cells.values().all(|rx| rx.borrow().uploaded)
    }
}
