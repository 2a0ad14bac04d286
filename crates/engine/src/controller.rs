//! The rotation controller: a single task that serialises trigger events
//! into rotations.
//!
//! The controller waits on every enabled trigger channel at once. Per
//! event it picks the rotation stamp, discards timeout firings that would
//! land before real inactivity, and hands the stamp to the sink variant's
//! [`RotationTarget`]. Because there is exactly one controller task,
//! rotations are totally ordered and at most one is in flight.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::trigger::TriggerEvents;

/// The sink side of a rotation. Implementations swap out the superseded
/// generation; they must not wait on trigger channels.
#[async_trait]
pub(crate) trait RotationTarget: Send + 'static {
    async fn rotate(&mut self, stamp: DateTime<Utc>);
}

/// Run the controller until cancellation.
///
/// `timeout_floor` is the configured inactivity window; timeout events
/// whose observed idle span is shorter are discarded so that "rotate
/// after d of silence" means at least d of silence.
pub(crate) async fn run<T: RotationTarget>(
    mut events: TriggerEvents,
    timeout_floor: Option<Duration>,
    mut target: T,
    cancel: CancellationToken,
) {
    loop {
        let stamp = tokio::select! {
            _ = cancel.cancelled() => break,
            Some(stamp) = next_event(&mut events.interval) => {
                tracing::info!(stamp = %stamp, "interval rotation");
                Some(stamp)
            }
            Some(fire) = next_event(&mut events.timeout) => {
                match timeout_floor {
                    Some(floor) if fire.idle < floor => {
                        tracing::debug!(
                            idle_ms = fire.idle.as_millis() as u64,
                            "timeout fired before real inactivity, discarded"
                        );
                        None
                    }
                    _ => {
                        tracing::info!(
                            stamp = %fire.stamp,
                            idle_ms = fire.idle.as_millis() as u64,
                            "timeout rotation"
                        );
                        Some(fire.stamp)
                    }
                }
            }
            Some(stamp) = next_event(&mut events.threshold) => {
                tracing::info!(stamp = %stamp, "threshold rotation");
                Some(stamp)
            }
            Some(stamp) = events.manual.recv() => {
                tracing::info!(stamp = %stamp, "manual rotation");
                Some(stamp)
            }
            else => break,
        };

        if let Some(stamp) = stamp {
            target.rotate(stamp).await;
        }
    }
}

/// Await the next event from an optional channel; disabled sources never
/// produce one.
async fn next_event<T>(rx: &mut Option<mpsc::Receiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "controller_test.rs"]
mod controller_test;
