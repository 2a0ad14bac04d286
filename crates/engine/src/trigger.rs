//! The four rotation trigger sources.
//!
//! Each enabled source runs on its own task and reports to the rotation
//! controller over a dedicated channel. Sources share no state with the
//! sink; the write path feeds them with best-effort pings that never
//! block (a slow trigger task loses a ping rather than back-pressuring
//! the writer). Trigger bookkeeping therefore only needs to be
//! eventually consistent within a generation.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::RotationOptions;

/// Per-source event channels hold at most one undelivered event; a tick
/// that finds the controller busy is dropped and rotation timing drifts
/// by at most one period.
const EVENT_CHANNEL_CAPACITY: usize = 1;

/// Write-path pings feeding the threshold source.
const PING_CHANNEL_CAPACITY: usize = 64;

/// A sample posted by the write path after a successful write.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WriteSample {
    pub bytes: u64,
}

/// A timeout firing, carrying how long the writer had been idle when the
/// timer expired.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TimeoutFire {
    pub stamp: DateTime<Utc>,
    pub idle: Duration,
}

/// Receiving ends handed to the rotation controller. Disabled sources are
/// `None`.
pub(crate) struct TriggerEvents {
    pub interval: Option<mpsc::Receiver<DateTime<Utc>>>,
    pub timeout: Option<mpsc::Receiver<TimeoutFire>>,
    pub threshold: Option<mpsc::Receiver<DateTime<Utc>>>,
    pub manual: mpsc::Receiver<DateTime<Utc>>,
}

/// Sending ends held by a sink's write path.
pub(crate) struct WritePings {
    threshold: Option<mpsc::Sender<WriteSample>>,
    activity: Option<watch::Sender<Instant>>,
}

impl WritePings {
    /// Report a successful write of `bytes` bytes. Never blocks.
    pub fn record_write(&self, bytes: u64) {
        if let Some(tx) = &self.threshold {
            if tx.try_send(WriteSample { bytes }).is_err() {
                tracing::debug!(bytes, "threshold ping dropped");
            }
        }
        if let Some(tx) = &self.activity {
            tx.send_replace(Instant::now());
        }
    }
}

/// Spawn every enabled trigger source. Returns the controller-side event
/// channels, the write-path pings, and the sender behind `rotate()`.
pub(crate) fn spawn(
    options: &RotationOptions,
    cancel: &CancellationToken,
) -> (TriggerEvents, WritePings, mpsc::Sender<DateTime<Utc>>) {
    let (manual_tx, manual_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    let interval = options.interval.map(|every| {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(run_interval(every, tx, cancel.clone()));
        rx
    });

    let (timeout, activity) = match options.timeout {
        Some(after) => {
            let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
            let (activity_tx, activity_rx) = watch::channel(Instant::now());
            tokio::spawn(run_timeout(after, activity_rx, tx, cancel.clone()));
            (Some(rx), Some(activity_tx))
        }
        None => (None, None),
    };

    let (threshold, threshold_tx) = if options.threshold_enabled() {
        let (ping_tx, ping_rx) = mpsc::channel(PING_CHANNEL_CAPACITY);
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(run_threshold(
            options.max_size,
            options.max_count,
            ping_rx,
            tx,
            cancel.clone(),
        ));
        (Some(rx), Some(ping_tx))
    } else {
        (None, None)
    };

    let events = TriggerEvents {
        interval,
        timeout,
        threshold,
        manual: manual_rx,
    };
    let pings = WritePings {
        threshold: threshold_tx,
        activity,
    };
    (events, pings, manual_tx)
}

/// Periodic tick, always on once enabled.
async fn run_interval(
    every: Duration,
    events: mpsc::Sender<DateTime<Utc>>,
    cancel: CancellationToken,
) {
    let mut ticker = time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick of a tokio interval completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if events.try_send(Utc::now()).is_err() {
                    tracing::debug!("interval tick dropped, controller busy");
                }
            }
        }
    }
}

/// Single-shot inactivity timer, re-armed after every firing and pushed
/// out by every activity ping from the write path.
async fn run_timeout(
    after: Duration,
    mut activity: watch::Receiver<Instant>,
    events: mpsc::Sender<TimeoutFire>,
    cancel: CancellationToken,
) {
    let mut deadline = Instant::now() + after;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = time::sleep_until(deadline) => {
                let last = *activity.borrow_and_update();
                let fire = TimeoutFire {
                    stamp: Utc::now(),
                    idle: last.elapsed(),
                };
                if events.try_send(fire).is_err() {
                    tracing::debug!("timeout fire dropped, controller busy");
                }
                deadline = Instant::now() + after;
            }
            changed = activity.changed() => {
                match changed {
                    Ok(()) => {
                        deadline = *activity.borrow_and_update() + after;
                    }
                    // Sink gone; nothing left to time.
                    Err(_) => break,
                }
            }
        }
    }
}

/// Byte/record counter fed by write-path pings; fires on breach of either
/// ceiling and resets both counts.
async fn run_threshold(
    max_size: u64,
    max_count: u64,
    mut pings: mpsc::Receiver<WriteSample>,
    events: mpsc::Sender<DateTime<Utc>>,
    cancel: CancellationToken,
) {
    let mut bytes: u64 = 0;
    let mut records: u64 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            sample = pings.recv() => {
                let Some(sample) = sample else { break };
                bytes += sample.bytes;
                records += 1;

                let size_hit = max_size > 0 && bytes >= max_size;
                let count_hit = max_count > 0 && records >= max_count;
                if size_hit || count_hit {
                    if events.try_send(Utc::now()).is_err() {
                        tracing::debug!("threshold fire dropped, controller busy");
                    }
                    bytes = 0;
                    records = 0;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "trigger_test.rs"]
mod trigger_test;
