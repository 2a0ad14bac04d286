//! The buffered staging sink.
//!
//! [`StagedSink`] is the variant for artifacts that must be written in
//! one pass: writes append to an in-memory staging buffer, and a rotation
//! swaps the active buffer with a spare under the guard, then writes the
//! spare's contents to a freshly named file outside it. Writers are never
//! exposed to filesystem I/O, at the cost of one extra memory copy.
//!
//! The spare buffer is owned by the rotation task itself; since there is
//! exactly one controller, no lock is needed around it. A swap that
//! yields an empty buffer is skipped entirely, so generation numbers on
//! disk stay dense.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::BytesMut;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::artifact::RecordHeader;
use crate::config::RotationOptions;
use crate::controller::{self, RotationTarget};
use crate::error::{Result, SinkError, StickyFault};
use crate::metrics::SinkMetrics;
use crate::trigger::{self, WritePings};

/// Initial capacity of each staging buffer.
const STAGE_CAPACITY: usize = 64 * 1024;

/// Produces the datadir-relative path for a staged generation.
pub trait StagePath: Send + 'static {
    fn next_path(&mut self, generation: u64, stamp: DateTime<Utc>) -> io::Result<PathBuf>;
}

impl<F> StagePath for F
where
    F: FnMut(u64, DateTime<Utc>) -> io::Result<PathBuf> + Send + 'static,
{
    fn next_path(&mut self, generation: u64, stamp: DateTime<Utc>) -> io::Result<PathBuf> {
        self(generation, stamp)
    }
}

/// Frames records into the staging buffer for archive-shaped generations.
pub trait RecordFramer: Send + 'static {
    /// Append one record (header, payload, any padding) to `out`.
    fn frame(&mut self, header: &RecordHeader, payload: &[u8], out: &mut BytesMut)
        -> io::Result<()>;

    /// Append the end-of-archive trailer before a generation is
    /// persisted.
    fn finish(&mut self, out: &mut BytesMut) -> io::Result<()> {
        let _ = out;
        Ok(())
    }
}

/// A sink that stages each generation in memory and flushes it as one
/// complete file.
pub struct StagedSink {
    state: Arc<Mutex<StagedState>>,
    metrics: Arc<SinkMetrics>,
    pings: WritePings,
    manual: mpsc::Sender<DateTime<Utc>>,
    cancel: CancellationToken,
    datadir: PathBuf,
}

impl std::fmt::Debug for StagedSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagedSink").finish_non_exhaustive()
    }
}

struct StagedState {
    prime: BytesMut,
    namer: Box<dyn StagePath>,
    framer: Option<Box<dyn RecordFramer>>,
    /// Number of the last generation persisted to disk; the buffer being
    /// staged will become `persisted + 1`.
    persisted: u64,
    sticky: Option<StickyFault>,
    closed: bool,
}

impl StagedSink {
    /// Open a raw staging sink writing files under `datadir`.
    pub fn open(
        datadir: impl Into<PathBuf>,
        namer: impl StagePath,
        options: RotationOptions,
    ) -> Result<Self> {
        Self::build(datadir.into(), Box::new(namer), None, options)
    }

    /// Open a staging sink that frames records into each generation (for
    /// single-pass archive formats).
    pub fn archive(
        datadir: impl Into<PathBuf>,
        namer: impl StagePath,
        framer: impl RecordFramer,
        options: RotationOptions,
    ) -> Result<Self> {
        Self::build(datadir.into(), Box::new(namer), Some(Box::new(framer)), options)
    }

    fn build(
        datadir: PathBuf,
        namer: Box<dyn StagePath>,
        framer: Option<Box<dyn RecordFramer>>,
        options: RotationOptions,
    ) -> Result<Self> {
        options.validate()?;
        if !datadir.is_dir() {
            return Err(SinkError::config(format!(
                "datadir {} is not a directory",
                datadir.display()
            )));
        }

        let cancel = CancellationToken::new();
        let (events, pings, manual) = trigger::spawn(&options, &cancel);

        let state = Arc::new(Mutex::new(StagedState {
            prime: BytesMut::with_capacity(STAGE_CAPACITY),
            namer,
            framer,
            persisted: 0,
            sticky: None,
            closed: false,
        }));
        let metrics = Arc::new(SinkMetrics::new());

        let target = StageSwap {
            state: Arc::clone(&state),
            datadir: datadir.clone(),
            metrics: Arc::clone(&metrics),
            spare: BytesMut::with_capacity(STAGE_CAPACITY),
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
            datadir,
        })
    }

    /// Append `bytes` to the staging buffer. Never touches the
    /// filesystem.
    pub async fn write(&self, bytes: &[u8]) -> Result<usize> {
        let mut state = self.state.lock().await;
        ready(&state)?;
        if bytes.is_empty() {
            return Ok(0);
        }

        state.prime.extend_from_slice(bytes);
        drop(state);

        self.metrics.record_write(bytes.len() as u64);
        self.pings.record_write(bytes.len() as u64);
        Ok(bytes.len())
    }

    /// Append one framed record. Without a framer the payload is staged
    /// raw. Only payload bytes are charged to the size threshold.
    pub async fn write_record(&self, header: &RecordHeader, payload: &[u8]) -> Result<usize> {
        let mut state = self.state.lock().await;
        ready(&state)?;
        if payload.is_empty() {
            return Ok(0);
        }

        let generation = state.persisted + 1;
        let StagedState { prime, framer, .. } = &mut *state;
        match framer {
            Some(framer) => {
                framer
                    .frame(header, payload, prime)
                    .map_err(|source| SinkError::Write { generation, source })?;
            }
            None => prime.extend_from_slice(payload),
        }
        drop(state);

        self.metrics.record_write(payload.len() as u64);
        self.pings.record_write(payload.len() as u64);
        Ok(payload.len())
    }

    /// Request a rotation. Returns immediately.
    pub fn rotate(&self) {
        if self.manual.try_send(Utc::now()).is_err() {
            tracing::debug!("manual rotation already pending");
        }
    }

    /// Stop the trigger tasks and persist whatever is still staged.
    /// One-shot; later calls return [`SinkError::AlreadyClosed`].
    pub async fn close(&self) -> Result<()> {
        self.cancel.cancel();

        let mut state = self.state.lock().await;
        if state.closed {
            return Err(SinkError::AlreadyClosed);
        }
        state.closed = true;

        if state.prime.is_empty() {
            tracing::info!(generations = state.persisted, "staged sink closed");
            return Ok(());
        }

        let StagedState { prime, framer, .. } = &mut *state;
        if let Some(framer) = framer {
            framer.finish(prime).map_err(SinkError::Close)?;
        }

        let generation = state.persisted + 1;
        let rel = state
            .namer
            .next_path(generation, Utc::now())
            .map_err(SinkError::Close)?;
        state.persisted = generation;
        let data = state.prime.split();

        let path = persist(&self.datadir, &rel, &data).map_err(SinkError::Close)?;
        tracing::info!(
            generation,
            path = %path.display(),
            bytes = data.len(),
            "staged sink closed"
        );
        Ok(())
    }

    pub fn metrics(&self) -> &SinkMetrics {
        &self.metrics
    }

    /// Number of generations persisted so far.
    pub async fn generations(&self) -> u64 {
        self.state.lock().await.persisted
    }
}

impl Drop for StagedSink {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn ready(state: &StagedState) -> Result<()> {
    if state.closed {
        return Err(SinkError::AlreadyClosed);
    }
    if let Some(fault) = &state.sticky {
        return Err(fault.to_error());
    }
    Ok(())
}

/// The rotation task's half: swap buffers under the guard, persist the
/// spare outside it.
struct StageSwap {
    state: Arc<Mutex<StagedState>>,
    datadir: PathBuf,
    metrics: Arc<SinkMetrics>,
    spare: BytesMut,
}

#[async_trait]
impl RotationTarget for StageSwap {
    async fn rotate(&mut self, stamp: DateTime<Utc>) {
        let generation;
        let rel;
        {
            let mut state = self.state.lock().await;
            if state.closed || state.prime.is_empty() {
                return;
            }

            let trailer = {
                let StagedState { prime, framer, .. } = &mut *state;
                match framer {
                    Some(framer) => framer.finish(prime),
                    None => Ok(()),
                }
            };
            if let Err(source) = trailer {
                let next = state.persisted + 1;
                state.sticky = Some(StickyFault::new(next, &source));
                self.metrics.record_error();
                tracing::error!(generation = next, error = %source, "archive trailer failed");
                return;
            }

            generation = state.persisted + 1;
            rel = match state.namer.next_path(generation, stamp) {
                Ok(rel) => rel,
                Err(source) => {
                    state.sticky = Some(StickyFault::new(generation, &source));
                    self.metrics.record_error();
                    tracing::error!(generation, error = %source, "generation naming failed");
                    return;
                }
            };
            state.persisted = generation;
            std::mem::swap(&mut state.prime, &mut self.spare);
        }

        match persist(&self.datadir, &rel, &self.spare) {
            Ok(path) => {
                self.metrics.record_rotation();
                tracing::info!(
                    generation,
                    path = %path.display(),
                    bytes = self.spare.len(),
                    "staged generation persisted"
                );
            }
            Err(source) => {
                self.metrics.record_error();
                tracing::error!(generation, error = %source, "staged generation lost");
                let mut state = self.state.lock().await;
                state.sticky = Some(StickyFault::new(generation, &source));
            }
        }
        self.spare.clear();
    }
}

/// Write one complete generation to its freshly named file, creating the
/// parent directory if absent.
fn persist(datadir: &Path, rel: &Path, data: &[u8]) -> io::Result<PathBuf> {
    let path = datadir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, data)?;
    Ok(path)
}

#[cfg(test)]
#[path = "staged_test.rs"]
mod staged_test;
