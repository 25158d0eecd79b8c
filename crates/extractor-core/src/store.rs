//! Shared progress state for a single extraction job.
//!
//! [`ProgressStore`] is the single source of truth consumers render from.
//! Every write produces an immutable [`ProgressSnapshot`] delivered to all
//! live subscribers in publish order; subscribing replays the latest snapshot
//! immediately, so late subscribers render the current state without waiting
//! for the next update.
//!
//! Writers that animate progress over time (simulation, push tracking, the
//! orchestrator's terminal writes) hold a [`DriverHandle`]. Issuing a new
//! handle supersedes and cancels the previous one, and a superseded handle's
//! writes are refused, so output from a stale driver can never land on top of
//! a newer job.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::phase::Phase;

/// One immutable observation of extraction progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub phase: Phase,
    /// Whole percent, always within `0..=100`.
    pub percentage: u8,
    pub message: String,
    pub estimated_secs_remaining: u64,
    pub job_started_at: DateTime<Utc>,
    /// Reset whenever the phase changes.
    pub phase_started_at: DateTime<Utc>,
}

struct StoreInner {
    snapshot: ProgressSnapshot,
    /// Monotonic anchor for elapsed-time math; `None` until a job starts.
    job_anchor: Option<Instant>,
    subscribers: Vec<UnboundedSender<ProgressSnapshot>>,
    /// Cancellation token of the driver generation currently allowed to write.
    driver: Option<CancellationToken>,
    generation: u64,
}

/// Progress state store with replay-on-subscribe multicast.
pub struct ProgressStore {
    inner: Mutex<StoreInner>,
}

impl Default for ProgressStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                snapshot: initial_snapshot(),
                job_anchor: None,
                subscribers: Vec::new(),
                driver: None,
                generation: 0,
            }),
        }
    }

    fn locked(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().expect("progress store lock poisoned")
    }

    /// The latest snapshot.
    pub fn current(&self) -> ProgressSnapshot {
        self.locked().snapshot.clone()
    }

    /// Register a subscriber.
    ///
    /// The current snapshot is delivered immediately, followed by every
    /// subsequent snapshot in publish order. Dropping the receiver
    /// unsubscribes.
    pub fn subscribe(&self) -> UnboundedReceiver<ProgressSnapshot> {
        let mut inner = self.locked();
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(inner.snapshot.clone());
        inner.subscribers.push(tx);
        rx
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.locked().subscribers.len()
    }

    /// Begin a new job: `Uploading` at 0% with the estimate seeded from the
    /// nominal phase durations.
    pub fn start_upload(&self) {
        let mut inner = self.locked();
        let now = Utc::now();
        inner.job_anchor = Some(Instant::now());
        let snapshot = ProgressSnapshot {
            phase: Phase::Uploading,
            percentage: 0,
            message: Phase::Uploading.message().to_string(),
            estimated_secs_remaining: Phase::total_nominal_secs(),
            job_started_at: now,
            phase_started_at: now,
        };
        Self::write(&mut inner, snapshot);
    }

    /// Publish a progress update with the phase's default message.
    ///
    /// The raw percentage is clamped to `[0, 100]` and rounded before it
    /// becomes visible anywhere.
    pub fn publish(&self, phase: Phase, raw_percentage: f64) {
        self.publish_with_message(phase, raw_percentage, None);
    }

    /// Publish a progress update, overriding the default message when
    /// `message` is non-empty.
    pub fn publish_with_message(&self, phase: Phase, raw_percentage: f64, message: Option<&str>) {
        let mut inner = self.locked();
        Self::apply_update(&mut inner, phase, raw_percentage, message);
    }

    /// Terminal success: `Complete` at 100%.
    pub fn mark_complete(&self) {
        let mut inner = self.locked();
        Self::apply_complete(&mut inner);
    }

    /// Terminal failure. The last published percentage is preserved so the
    /// display does not jump backwards; an empty message falls back to the
    /// phase default.
    pub fn mark_error(&self, message: &str) {
        let mut inner = self.locked();
        Self::apply_error(&mut inner, message);
    }

    /// Return to `Idle`, superseding and cancelling any active driver.
    pub fn reset(&self) {
        let mut inner = self.locked();
        inner.generation += 1;
        if let Some(token) = inner.driver.take() {
            token.cancel();
        }
        inner.job_anchor = None;
        Self::write(&mut inner, initial_snapshot());
    }

    fn apply_update(
        inner: &mut StoreInner,
        phase: Phase,
        raw_percentage: f64,
        message: Option<&str>,
    ) {
        let now = Utc::now();
        // A publish without an explicit start_upload still anchors the job.
        if inner.snapshot.phase == Phase::Idle {
            inner.job_anchor = Some(Instant::now());
            inner.snapshot.job_started_at = now;
        }
        let percentage = clamp_percentage(raw_percentage);
        let message = match message {
            Some(text) if !text.is_empty() => text.to_string(),
            _ => phase.message().to_string(),
        };
        let phase_started_at = if phase != inner.snapshot.phase {
            now
        } else {
            inner.snapshot.phase_started_at
        };
        let snapshot = ProgressSnapshot {
            phase,
            percentage,
            message,
            estimated_secs_remaining: estimate_remaining(inner.job_anchor, percentage),
            job_started_at: inner.snapshot.job_started_at,
            phase_started_at,
        };
        Self::write(inner, snapshot);
    }

    fn apply_complete(inner: &mut StoreInner) {
        let snapshot = ProgressSnapshot {
            phase: Phase::Complete,
            percentage: 100,
            message: Phase::Complete.message().to_string(),
            estimated_secs_remaining: 0,
            job_started_at: inner.snapshot.job_started_at,
            phase_started_at: Utc::now(),
        };
        Self::write(inner, snapshot);
    }

    fn apply_error(inner: &mut StoreInner, message: &str) {
        let message = if message.is_empty() {
            Phase::Error.message().to_string()
        } else {
            message.to_string()
        };
        let snapshot = ProgressSnapshot {
            phase: Phase::Error,
            percentage: inner.snapshot.percentage,
            message,
            estimated_secs_remaining: 0,
            job_started_at: inner.snapshot.job_started_at,
            phase_started_at: Utc::now(),
        };
        Self::write(inner, snapshot);
    }

    /// Replace the snapshot and notify subscribers, all under the lock so
    /// every subscriber observes the same total order.
    fn write(inner: &mut StoreInner, snapshot: ProgressSnapshot) {
        inner.snapshot = snapshot;
        let snap = inner.snapshot.clone();
        inner.subscribers.retain(|tx| tx.send(snap.clone()).is_ok());
    }
}

impl std::fmt::Debug for ProgressStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.locked();
        f.debug_struct("ProgressStore")
            .field("snapshot", &inner.snapshot)
            .field("subscribers", &inner.subscribers.len())
            .field("generation", &inner.generation)
            .finish()
    }
}

/// Write access for one driver generation.
///
/// Obtained from [`DriverHandle::issue`], which supersedes (and cancels) the
/// previously issued handle. All writes are refused once the handle is
/// superseded by a newer one or by [`ProgressStore::reset`], and each write
/// reports whether it landed.
#[derive(Clone)]
pub struct DriverHandle {
    store: Arc<ProgressStore>,
    generation: u64,
    cancel: CancellationToken,
}

impl DriverHandle {
    /// Register a new driver generation on the store.
    pub fn issue(store: &Arc<ProgressStore>) -> Self {
        let mut inner = store.locked();
        inner.generation += 1;
        if let Some(previous) = inner.driver.take() {
            previous.cancel();
        }
        let token = CancellationToken::new();
        inner.driver = Some(token.clone());
        let generation = inner.generation;
        drop(inner);
        Self {
            store: Arc::clone(store),
            generation,
            cancel: token,
        }
    }

    /// Atomically hand this generation over to a successor.
    ///
    /// Fails when the handle has already been superseded (by a newer driver
    /// or a reset), so a writer that lost its slot cannot reclaim one.
    pub fn supersede(&self) -> Option<Self> {
        let mut inner = self.store.locked();
        if inner.generation != self.generation {
            return None;
        }
        inner.generation += 1;
        if let Some(previous) = inner.driver.take() {
            previous.cancel();
        }
        let token = CancellationToken::new();
        inner.driver = Some(token.clone());
        let generation = inner.generation;
        drop(inner);
        Some(Self {
            store: Arc::clone(&self.store),
            generation,
            cancel: token,
        })
    }

    /// Whether this handle is still the authorized writer.
    pub fn is_current(&self) -> bool {
        self.store.locked().generation == self.generation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Completes when the handle is superseded or the store is reset.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// A clone of this generation's cancellation token.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The latest snapshot, regardless of who wrote it.
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.store.current()
    }

    /// Gated progress update. Returns false when the write was refused.
    pub fn publish(&self, phase: Phase, raw_percentage: f64) -> bool {
        self.publish_with_message(phase, raw_percentage, None)
    }

    /// Gated progress update with a message override.
    ///
    /// Refused when this handle is superseded or the job already reached a
    /// terminal phase.
    pub fn publish_with_message(
        &self,
        phase: Phase,
        raw_percentage: f64,
        message: Option<&str>,
    ) -> bool {
        let mut inner = self.store.locked();
        if inner.generation != self.generation {
            log::debug!("refusing progress update from superseded driver");
            return false;
        }
        if inner.snapshot.phase.is_terminal() {
            return false;
        }
        ProgressStore::apply_update(&mut inner, phase, raw_percentage, message);
        true
    }

    /// Gated terminal success.
    pub fn mark_complete(&self) -> bool {
        let mut inner = self.store.locked();
        if inner.generation != self.generation {
            log::debug!("refusing completion from superseded driver");
            return false;
        }
        ProgressStore::apply_complete(&mut inner);
        true
    }

    /// Gated terminal failure.
    pub fn mark_error(&self, message: &str) -> bool {
        let mut inner = self.store.locked();
        if inner.generation != self.generation {
            log::debug!("refusing error from superseded driver");
            return false;
        }
        ProgressStore::apply_error(&mut inner, message);
        true
    }
}

impl std::fmt::Debug for DriverHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverHandle")
            .field("generation", &self.generation)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

fn initial_snapshot() -> ProgressSnapshot {
    let now = Utc::now();
    ProgressSnapshot {
        phase: Phase::Idle,
        percentage: 0,
        message: Phase::Idle.message().to_string(),
        estimated_secs_remaining: 0,
        job_started_at: now,
        phase_started_at: now,
    }
}

fn clamp_percentage(raw: f64) -> u8 {
    raw.clamp(0.0, 100.0).round() as u8
}

/// Remaining seconds extrapolated from elapsed time and completed fraction.
///
/// At 0% (or before a job anchor exists) there is nothing to extrapolate
/// from, so the sum of the nominal phase durations is used instead.
fn estimate_remaining(anchor: Option<Instant>, percentage: u8) -> u64 {
    let Some(anchor) = anchor else {
        return Phase::total_nominal_secs();
    };
    if percentage == 0 {
        return Phase::total_nominal_secs();
    }
    let elapsed = anchor.elapsed().as_secs_f64();
    let estimated_total = elapsed / (f64::from(percentage) / 100.0);
    (estimated_total - elapsed).max(0.0).round() as u64
}
