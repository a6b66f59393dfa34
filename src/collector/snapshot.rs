use super::value::Value;
use crate::core::types::SimTime;
use chrono::NaiveDateTime;
use log::error;
use serde::Serialize;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::time::{Duration, Instant};

/// Immutable point-in-time view of the published variables
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub sequence: u64,
    pub sim_time: SimTime,
    pub datetime: NaiveDateTime,
    /// Variable id and value, in declaration order
    pub values: Vec<(String, Value)>,
}

impl Snapshot {
    pub(crate) fn empty(datetime: NaiveDateTime) -> Self {
        Self {
            sequence: 0,
            sim_time: 0,
            datetime,
            values: Vec::new(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Value> {
        self.values.iter().find(|(k, _)| k == id).map(|(_, v)| v)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(k, _)| k.as_str())
    }
}

struct HubInner {
    latest: RwLock<Arc<Snapshot>>,
    sequence: Mutex<u64>,
    published: Condvar,
    subscribers: Mutex<Vec<Sender<Arc<Snapshot>>>>,
}

/// Hand-off point between the simulation and its readers.
///
/// Readers only ever see whole snapshots; the sampler swaps in a new `Arc`
/// under a short write lock.
#[derive(Clone)]
pub struct SnapshotHub {
    inner: Arc<HubInner>,
}

impl SnapshotHub {
    pub fn new(initial: Snapshot) -> Self {
        let sequence = initial.sequence;
        Self {
            inner: Arc::new(HubInner {
                latest: RwLock::new(Arc::new(initial)),
                sequence: Mutex::new(sequence),
                published: Condvar::new(),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Most recent snapshot
    pub fn latest(&self) -> Arc<Snapshot> {
        match self.inner.latest.read() {
            Ok(latest) => Arc::clone(&latest),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn sequence(&self) -> u64 {
        match self.inner.sequence.lock() {
            Ok(seq) => *seq,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Block until a snapshot newer than `sequence` is published or the timeout expires
    pub fn wait_newer(&self, sequence: u64, timeout: Duration) -> Option<Arc<Snapshot>> {
        let deadline = Instant::now() + timeout;
        let mut current = match self.inner.sequence.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        while *current <= sequence {
            let left = deadline.checked_duration_since(Instant::now())?;
            current = match self.inner.published.wait_timeout(current, left) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        drop(current);
        Some(self.latest())
    }

    /// Channel receiving every snapshot published from now on
    pub fn subscribe(&self) -> Receiver<Arc<Snapshot>> {
        let (tx, rx) = channel();
        match self.inner.subscribers.lock() {
            Ok(mut subscribers) => subscribers.push(tx),
            Err(poisoned) => poisoned.into_inner().push(tx),
        }
        rx
    }

    pub(crate) fn publish(&self, snapshot: Snapshot) {
        let sequence = snapshot.sequence;
        let snapshot = Arc::new(snapshot);
        match self.inner.latest.write() {
            Ok(mut latest) => *latest = Arc::clone(&snapshot),
            Err(poisoned) => *poisoned.into_inner() = Arc::clone(&snapshot),
        }
        match self.inner.sequence.lock() {
            Ok(mut seq) => *seq = sequence,
            Err(poisoned) => *poisoned.into_inner() = sequence,
        }
        self.inner.published.notify_all();

        match self.inner.subscribers.lock() {
            Ok(mut subscribers) => {
                subscribers.retain(|tx| tx.send(Arc::clone(&snapshot)).is_ok())
            }
            Err(_) => error!("Snapshot subscribers lock poisoned, notifications dropped"),
        }
    }
}

impl std::fmt::Debug for SnapshotHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotHub")
            .field("sequence", &self.sequence())
            .finish()
    }
}
