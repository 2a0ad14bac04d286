//! The streaming sink facade.
//!
//! [`RollingSink`] writes through to a live artifact. A capacity-1 guard
//! (a tokio mutex over the sink state) serialises every mutation visible
//! to writers; trigger tasks and the controller never touch the state
//! except through the controller's rotation hand-off, which takes the
//! same guard. Pending rotations travel over a watch channel, which is
//! exactly the "capacity one, latest value wins" primitive the hand-off
//! needs: a burst of triggers before the next write coalesces into a
//! single rotation carrying the newest stamp.
//!
//! The sink observes a pending rotation at the start of `write`, never
//! during one, so the bytes of one call always land entirely in one
//! generation.

use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::artifact::{Artifact, NextFactory, RecordHeader};
use crate::config::RotationOptions;
use crate::controller::{self, RotationTarget};
use crate::error::{Result, SinkError, StickyFault};
use crate::metrics::SinkMetrics;
use crate::trigger::{self, WritePings};

/// Generations are numbered densely starting here, in both sink variants.
pub const FIRST_GENERATION: u64 = 1;

/// A concurrency-safe writer that rotates its output artifact on trigger
/// events.
///
/// Construct with [`RollingSink::open`]; the first artifact is created
/// immediately and trigger tasks are spawned onto the current tokio
/// runtime. All methods take `&self`, so the sink can be shared behind an
/// `Arc` by any number of writer tasks.
pub struct RollingSink {
    state: Arc<Mutex<SinkState>>,
    metrics: Arc<SinkMetrics>,
    pings: WritePings,
    manual: mpsc::Sender<DateTime<Utc>>,
    cancel: CancellationToken,
    keep_empty: bool,
}

impl std::fmt::Debug for RollingSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollingSink").finish_non_exhaustive()
    }
}

/// Everything the guard protects.
struct SinkState {
    factory: Box<dyn NextFactory>,
    current: Option<Artifact>,
    generation: u64,
    bytes_in_generation: u64,
    records_in_generation: u64,
    pending: watch::Receiver<Option<DateTime<Utc>>>,
    sticky: Option<StickyFault>,
    closed: bool,
}

impl RollingSink {
    /// Build the first artifact and start the trigger and controller
    /// tasks. Must be called from within a tokio runtime.
    pub fn open(factory: impl NextFactory, options: RotationOptions) -> Result<Self> {
        options.validate()?;

        let mut factory: Box<dyn NextFactory> = Box::new(factory);
        let stamp = Utc::now();
        let first = factory
            .create(FIRST_GENERATION, stamp)
            .map_err(|source| SinkError::Factory {
                generation: FIRST_GENERATION,
                source,
            })?;
        tracing::debug!(generation = FIRST_GENERATION, stamp = %stamp, "opened first artifact");

        let cancel = CancellationToken::new();
        let (events, pings, manual) = trigger::spawn(&options, &cancel);
        let (pending_tx, pending_rx) = watch::channel(None);

        let state = Arc::new(Mutex::new(SinkState {
            factory,
            current: Some(first),
            generation: FIRST_GENERATION,
            bytes_in_generation: 0,
            records_in_generation: 0,
            pending: pending_rx,
            sticky: None,
            closed: false,
        }));
        let metrics = Arc::new(SinkMetrics::new());

        let target = SwapTarget {
            state: Arc::clone(&state),
            pending: pending_tx,
            metrics: Arc::clone(&metrics),
            keep_empty: options.keep_empty,
        };
        tokio::spawn(controller::run(
            events,
            options.timeout,
            target,
            cancel.clone(),
        ));

        Ok(Self {
            state,
            metrics,
            pings,
            manual,
            cancel,
            keep_empty: options.keep_empty,
        })
    }

    /// Append `bytes` to the current generation, installing the next
    /// artifact first if a rotation is pending.
    ///
    /// The whole slice lands in exactly one generation. Zero-length
    /// writes succeed without touching the artifact or any trigger.
    pub async fn write(&self, bytes: &[u8]) -> Result<usize> {
        let mut state = self.state.lock().await;
        self.ready(&mut state)?;
        if bytes.is_empty() {
            return Ok(0);
        }

        let generation = state.generation;
        let artifact = current_artifact(&mut state, generation)?;
        match artifact.writer_mut().write_all(bytes) {
            Ok(()) => {
                self.account(&mut state, bytes.len());
                Ok(bytes.len())
            }
            Err(source) => {
                self.metrics.record_error();
                Err(SinkError::Write { generation, source })
            }
        }
    }

    /// Append one framed record: the header is emitted ahead of the
    /// payload on artifacts with archive capability and ignored by raw
    /// ones. Only payload bytes are charged to the size threshold.
    pub async fn write_record(&self, header: &RecordHeader, payload: &[u8]) -> Result<usize> {
        let mut state = self.state.lock().await;
        self.ready(&mut state)?;
        if payload.is_empty() {
            return Ok(0);
        }

        let generation = state.generation;
        let artifact = current_artifact(&mut state, generation)?;
        match artifact.writer_mut().write_record(header, payload) {
            Ok(n) => {
                self.account(&mut state, n);
                Ok(n)
            }
            Err(source) => {
                self.metrics.record_error();
                Err(SinkError::Write { generation, source })
            }
        }
    }

    /// Request a rotation. Returns immediately; the rotation takes effect
    /// before the next write. A request already queued wins over this
    /// one's stamp being delivered twice.
    pub fn rotate(&self) {
        if self.manual.try_send(Utc::now()).is_err() {
            tracing::debug!("manual rotation already pending");
        }
    }

    /// Stop the trigger tasks, flush and close the current artifact.
    ///
    /// Idempotent in the one-shot sense: the first call performs the
    /// shutdown, every later call returns [`SinkError::AlreadyClosed`]
    /// without re-closing anything.
    pub async fn close(&self) -> Result<()> {
        self.cancel.cancel();

        let mut state = self.state.lock().await;
        if state.closed {
            return Err(SinkError::AlreadyClosed);
        }
        state.closed = true;

        let result = match state.current.take() {
            Some(artifact) => {
                let bytes = state.bytes_in_generation;
                let generation = state.generation;
                finish_artifact(artifact, generation, bytes, self.keep_empty, &self.metrics)
                    .map_err(SinkError::Close)
            }
            None => Ok(()),
        };

        let snapshot = self.metrics.snapshot();
        tracing::info!(
            generations = state.generation,
            tail_records = state.records_in_generation,
            bytes = snapshot.bytes_written,
            records = snapshot.records_written,
            rotations = snapshot.rotations,
            "sink closed"
        );
        result
    }

    pub fn metrics(&self) -> &SinkMetrics {
        &self.metrics
    }

    /// Number of the generation currently receiving writes.
    pub async fn generation(&self) -> u64 {
        self.state.lock().await.generation
    }

    /// Reject closed/faulted sinks, then consume any pending rotation.
    fn ready(&self, state: &mut SinkState) -> Result<()> {
        if state.closed {
            return Err(SinkError::AlreadyClosed);
        }
        if let Some(fault) = &state.sticky {
            return Err(fault.to_error());
        }
        self.install_pending(state)
    }

    /// If the controller left a pending-rotation notice, build the next
    /// generation's artifact now. A factory failure faults the sink until
    /// close.
    fn install_pending(&self, state: &mut SinkState) -> Result<()> {
        let Some(stamp) = take_pending(state) else {
            return Ok(());
        };

        let generation = state.generation + 1;
        match state.factory.create(generation, stamp) {
            Ok(artifact) => {
                state.generation = generation;
                state.current = Some(artifact);
                state.bytes_in_generation = 0;
                state.records_in_generation = 0;
                self.metrics.record_rotation();
                tracing::debug!(generation, stamp = %stamp, "installed next artifact");
                Ok(())
            }
            Err(source) => {
                state.generation = generation;
                state.sticky = Some(StickyFault::new(generation, &source));
                self.metrics.record_error();
                tracing::error!(
                    generation,
                    error = %source,
                    "artifact factory failed; sink faulted until close"
                );
                Err(SinkError::Factory { generation, source })
            }
        }
    }

    fn account(&self, state: &mut SinkState, bytes: usize) {
        state.bytes_in_generation += bytes as u64;
        state.records_in_generation += 1;
        self.metrics.record_write(bytes as u64);
        self.pings.record_write(bytes as u64);
    }
}

impl Drop for RollingSink {
    fn drop(&mut self) {
        // Stop trigger tasks even if the caller never closed; buffered
        // artifact data is flushed by the writer's own drop.
        self.cancel.cancel();
    }
}

/// The controller's side of the hand-off: publish the pending notice and
/// retire the superseded artifact under one guard acquisition, so a
/// writer can never observe the notice while the old artifact is still
/// installed.
struct SwapTarget {
    state: Arc<Mutex<SinkState>>,
    pending: watch::Sender<Option<DateTime<Utc>>>,
    metrics: Arc<SinkMetrics>,
    keep_empty: bool,
}

#[async_trait]
impl RotationTarget for SwapTarget {
    async fn rotate(&mut self, stamp: DateTime<Utc>) {
        let mut state = self.state.lock().await;
        if state.closed {
            return;
        }

        self.pending.send_replace(Some(stamp));

        if let Some(old) = state.current.take() {
            let bytes = state.bytes_in_generation;
            let generation = state.generation;
            state.bytes_in_generation = 0;
            state.records_in_generation = 0;
            // Close errors are reported here; the generation is already
            // superseded and the next write starts fresh regardless.
            let _ = finish_artifact(old, generation, bytes, self.keep_empty, &self.metrics);
        }
    }
}

fn take_pending(state: &mut SinkState) -> Option<DateTime<Utc>> {
    if state.pending.has_changed().unwrap_or(false) {
        *state.pending.borrow_and_update()
    } else {
        None
    }
}

fn current_artifact(state: &mut SinkState, generation: u64) -> Result<&mut Artifact> {
    match state.current.as_mut() {
        Some(artifact) => Ok(artifact),
        None => Err(SinkError::Write {
            generation,
            source: io::Error::other("no artifact installed"),
        }),
    }
}

/// Flush and close an artifact, then apply the empty-drop policy.
fn finish_artifact(
    artifact: Artifact,
    generation: u64,
    bytes: u64,
    keep_empty: bool,
    metrics: &SinkMetrics,
) -> io::Result<()> {
    let path = artifact.path().map(Path::to_path_buf);
    let result = artifact.close();
    if let Err(e) = &result {
        tracing::error!(generation, error = %e, "artifact close failed");
    }

    if !keep_empty && bytes == 0 {
        if let Some(path) = path {
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    metrics.record_empty_dropped();
                    tracing::debug!(generation, path = %path.display(), "removed empty artifact");
                }
                Err(e) => {
                    tracing::warn!(
                        generation,
                        path = %path.display(),
                        error = %e,
                        "failed to remove empty artifact"
                    );
                }
            }
        }
    }
    result
}

#[cfg(test)]
#[path = "sink_test.rs"]
mod sink_test;

#[cfg(test)]
#[path = "sink_property_test.rs"]
mod sink_property_test;
