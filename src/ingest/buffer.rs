//! In-process batching buffer for telemetry writes.
//!
//! Design reference: SPEC_FULL.md §4.3 (Batching Buffer).
//!
//! Each device class gets its own [`Buffer`]. Incoming readings accumulate
//! under a short-held lock; a background timer and a size threshold both
//! trigger a flush, which swaps the accumulated `Vec` out from under the lock
//! so the write to Postgres never holds it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::model::{MeterReadingInput, VehicleReadingInput};

/// A batching buffer for one device class's readings.
///
/// Cloning is cheap — it shares the underlying lock via `Arc`.
#[derive(Clone)]
pub struct Buffer<T> {
    inner: Arc<Mutex<Vec<T>>>,
    flush_size: usize,
}

impl<T> Buffer<T> {
    pub fn new(flush_size: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Vec::new())),
            flush_size,
        }
    }

    /// Push a reading onto the buffer. Returns `true` only for the single
    /// push that brings the buffer to exactly the flush-size threshold —
    /// the caller should trigger an immediate flush in that case.
    ///
    /// Pushes are serialized by the buffer's own lock, so exactly one push
    /// ever observes `len == flush_size` between two flushes: later pushes
    /// see `len > flush_size` and return `false`, so concurrent pushes past
    /// the threshold never spawn more than one size-triggered flush
    /// (SPEC_FULL.md §8, "at most one size-triggered flush").
    pub async fn push(&self, item: T) -> bool {
        let mut guard = self.inner.lock().await;
        guard.push(item);
        guard.len() == self.flush_size
    }

    /// Swap the buffer's contents out, leaving an empty `Vec` behind. The
    /// lock is held only for the swap itself.
    pub async fn take(&self) -> Vec<T> {
        let mut guard = self.inner.lock().await;
        std::mem::take(&mut *guard)
    }

    /// Put items back at the front of the buffer — used to retry a batch
    /// whose write failed, so nothing already queued behind it is lost.
    pub async fn prepend(&self, mut items: Vec<T>) {
        if items.is_empty() {
            return;
        }
        let mut guard = self.inner.lock().await;
        items.append(&mut guard);
        *guard = items;
    }

    /// Current number of buffered, unflushed readings.
    pub async fn depth(&self) -> usize {
        self.inner.lock().await.len()
    }
}

pub type VehicleBuffer = Buffer<VehicleReadingInput>;
pub type MeterBuffer = Buffer<MeterReadingInput>;

/// The pair of per-class buffers shared across the ingestion handler and the
/// background flush task.
#[derive(Clone)]
pub struct Buffers {
    pub vehicle: VehicleBuffer,
    pub meter: MeterBuffer,
}

impl Buffers {
    pub fn new(flush_size: usize) -> Self {
        Self {
            vehicle: Buffer::new(flush_size),
            meter: Buffer::new(flush_size),
        }
    }

    /// Total readings currently buffered, across both classes.
    pub async fn total_depth(&self) -> usize {
        self.vehicle.depth().await + self.meter.depth().await
    }
}

/// Start the periodic flush timer. Runs every `interval` and flushes both
/// buffers regardless of size — this is the time trigger; the size trigger
/// is driven separately by the ingestion handler calling [`flush_vehicle`]
/// / [`flush_meter`] directly when `push` reports the threshold crossed.
///
/// The first tick is consumed immediately so a flush cycle doesn't run
/// during startup before any readings have arrived.
pub fn spawn_flush_timer(
    buffers: Buffers,
    pool: sqlx::PgPool,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            flush_vehicle(&buffers.vehicle, &pool).await;
            flush_meter(&buffers.meter, &pool).await;
        }
    })
}

/// Flush the vehicle buffer. On write failure the batch is re-prepended so
/// the next flush attempt (timer or size trigger) retries it.
#[tracing::instrument(skip(buffer, pool))]
pub async fn flush_vehicle(buffer: &VehicleBuffer, pool: &sqlx::PgPool) {
    let batch = buffer.take().await;
    if batch.is_empty() {
        return;
    }
    let len = batch.len();
    match crate::ingest::repository::write_vehicle_batch(pool, &batch).await {
        Ok(()) => tracing::debug!(count = len, "flushed vehicle batch"),
        Err(e) => {
            tracing::error!(error = %e, count = len, "vehicle batch write failed, will retry");
            buffer.prepend(batch).await;
        }
    }
}

/// Flush the meter buffer. Same retry-by-reprepend behavior as
/// [`flush_vehicle`].
#[tracing::instrument(skip(buffer, pool))]
pub async fn flush_meter(buffer: &MeterBuffer, pool: &sqlx::PgPool) {
    let batch = buffer.take().await;
    if batch.is_empty() {
        return;
    }
    let len = batch.len();
    match crate::ingest::repository::write_meter_batch(pool, &batch).await {
        Ok(()) => tracing::debug!(count = len, "flushed meter batch"),
        Err(e) => {
            tracing::error!(error = %e, count = len, "meter batch write failed, will retry");
            buffer.prepend(batch).await;
        }
    }
}

/// Best-effort drain of both buffers, called during graceful shutdown.
/// Errors are logged and otherwise ignored — there's no further retry path
/// once the process is exiting.
pub async fn drain_on_shutdown(buffers: &Buffers, pool: &sqlx::PgPool) {
    flush_vehicle(&buffers.vehicle, pool).await;
    flush_meter(&buffers.meter, pool).await;
}
