//! Process-wide counters for save/load activity. They live only as long as the process;
//! `fablekit play` prints them when the session ends.
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::fiction::errors::IoOperation;

static SAVES_STARTED: AtomicU64 = AtomicU64::new(0);
static SAVES_COMPLETED: AtomicU64 = AtomicU64::new(0);
static SAVES_FAILED: AtomicU64 = AtomicU64::new(0);
static LOADS_STARTED: AtomicU64 = AtomicU64::new(0);
static LOADS_COMPLETED: AtomicU64 = AtomicU64::new(0);
static LOADS_FAILED: AtomicU64 = AtomicU64::new(0);
static REJECTED: AtomicU64 = AtomicU64::new(0);
static ENTITIES_REATTACHED: AtomicU64 = AtomicU64::new(0);

pub fn inc_started(op: IoOperation) {
    match op {
        IoOperation::Save => SAVES_STARTED.fetch_add(1, Ordering::Relaxed),
        IoOperation::Load => LOADS_STARTED.fetch_add(1, Ordering::Relaxed),
    };
}

pub fn inc_completed(op: IoOperation) {
    match op {
        IoOperation::Save => SAVES_COMPLETED.fetch_add(1, Ordering::Relaxed),
        IoOperation::Load => LOADS_COMPLETED.fetch_add(1, Ordering::Relaxed),
    };
}

pub fn inc_failed(op: IoOperation) {
    match op {
        IoOperation::Save => SAVES_FAILED.fetch_add(1, Ordering::Relaxed),
        IoOperation::Load => LOADS_FAILED.fetch_add(1, Ordering::Relaxed),
    };
}

pub fn inc_rejected() {
    REJECTED.fetch_add(1, Ordering::Relaxed);
}

pub fn add_reattached(count: usize) {
    ENTITIES_REATTACHED.fetch_add(count as u64, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub saves_started: u64,
    pub saves_completed: u64,
    pub saves_failed: u64,
    pub loads_started: u64,
    pub loads_completed: u64,
    pub loads_failed: u64,
    pub rejected: u64,
    pub entities_reattached: u64,
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Saves:      {} started, {} completed, {} failed",
            self.saves_started, self.saves_completed, self.saves_failed
        )?;
        writeln!(
            f,
            "Loads:      {} started, {} completed, {} failed",
            self.loads_started, self.loads_completed, self.loads_failed
        )?;
        writeln!(f, "Rejected:   {}", self.rejected)?;
        write!(f, "Reattached: {} entities", self.entities_reattached)
    }
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        saves_started: SAVES_STARTED.load(Ordering::Relaxed),
        saves_completed: SAVES_COMPLETED.load(Ordering::Relaxed),
        saves_failed: SAVES_FAILED.load(Ordering::Relaxed),
        loads_started: LOADS_STARTED.load(Ordering::Relaxed),
        loads_completed: LOADS_COMPLETED.load(Ordering::Relaxed),
        loads_failed: LOADS_FAILED.load(Ordering::Relaxed),
        rejected: REJECTED.load(Ordering::Relaxed),
        entities_reattached: ENTITIES_REATTACHED.load(Ordering::Relaxed),
    }
}
