//! Tests for the rotation controller.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::controller::{self, RotationTarget};
use crate::trigger::{TimeoutFire, TriggerEvents};

struct RecordingTarget {
    stamps: Arc<StdMutex<Vec<DateTime<Utc>>>>,
}

#[async_trait]
impl RotationTarget for RecordingTarget {
    async fn rotate(&mut self, stamp: DateTime<Utc>) {
        self.stamps.lock().unwrap().push(stamp);
    }
}

fn recording_target() -> (RecordingTarget, Arc<StdMutex<Vec<DateTime<Utc>>>>) {
    let stamps = Arc::new(StdMutex::new(Vec::new()));
    (
        RecordingTarget {
            stamps: Arc::clone(&stamps),
        },
        stamps,
    )
}

fn manual_only() -> (TriggerEvents, mpsc::Sender<DateTime<Utc>>) {
    let (tx, rx) = mpsc::channel(1);
    (
        TriggerEvents {
            interval: None,
            timeout: None,
            threshold: None,
            manual: rx,
        },
        tx,
    )
}

#[tokio::test(start_paused = true)]
async fn manual_events_rotate_in_order() {
    let (events, manual) = manual_only();
    let (target, stamps) = recording_target();
    let cancel = CancellationToken::new();
    tokio::spawn(controller::run(events, None, target, cancel.clone()));

    let first = Utc::now();
    manual.send(first).await.unwrap();
    sleep(Duration::from_millis(1)).await;
    let second = Utc::now();
    manual.send(second).await.unwrap();
    sleep(Duration::from_millis(1)).await;

    assert_eq!(*stamps.lock().unwrap(), vec![first, second]);
    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn timeout_below_the_floor_is_discarded() {
    let (timeout_tx, timeout_rx) = mpsc::channel(1);
    let (_manual_tx, manual_rx) = mpsc::channel::<DateTime<Utc>>(1);
    let events = TriggerEvents {
        interval: None,
        timeout: Some(timeout_rx),
        threshold: None,
        manual: manual_rx,
    };
    let (target, stamps) = recording_target();
    let cancel = CancellationToken::new();
    tokio::spawn(controller::run(
        events,
        Some(Duration::from_millis(50)),
        target,
        cancel.clone(),
    ));

    timeout_tx
        .send(TimeoutFire {
            stamp: Utc::now(),
            idle: Duration::from_millis(10),
        })
        .await
        .unwrap();
    sleep(Duration::from_millis(1)).await;
    assert!(stamps.lock().unwrap().is_empty(), "early fire discarded");

    let accepted = Utc::now();
    timeout_tx
        .send(TimeoutFire {
            stamp: accepted,
            idle: Duration::from_millis(50),
        })
        .await
        .unwrap();
    sleep(Duration::from_millis(1)).await;
    assert_eq!(*stamps.lock().unwrap(), vec![accepted]);
    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_the_loop() {
    let (events, _manual) = manual_only();
    let (target, _stamps) = recording_target();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(controller::run(events, None, target, cancel.clone()));

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("controller exits on cancel")
        .unwrap();
}
