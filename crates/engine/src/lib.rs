//! roll-engine - File-rotation sink engine
//!
//! A stream-oriented writer that partitions an unbounded sequence of writes
//! into a series of output artifacts ("generations") on local storage. A
//! generation rolls over when any of four trigger sources demands it:
//!
//! | Trigger | Fires when |
//! |---------|------------|
//! | interval | a fixed period elapses, regardless of traffic |
//! | timeout | the writer has been idle for a configured window |
//! | threshold | cumulative bytes or records in the generation breach a ceiling |
//! | manual | a caller invokes `rotate()` |
//!
//! # Architecture
//!
//! ```text
//! [writer] --write()--> [sink facade] --bytes--> [current artifact]
//!              |                ^
//!              | pings          | pending rotation (capacity-1, latest wins)
//!              v                |
//!          [trigger tasks] -> [rotation controller]
//! ```
//!
//! Trigger sources run as independent tasks and feed the rotation
//! controller over dedicated channels. The controller serialises them into
//! at most one pending rotation; the sink observes the notice at the start
//! of the next write and swaps in a fresh artifact from its factory. The
//! swap point means every individual `write` lands entirely in one
//! generation.
//!
//! Two sink variants share the trigger/controller machinery:
//!
//! - [`RollingSink`] writes through to a live artifact and installs the
//!   next one lazily after a rotation.
//! - [`StagedSink`] collects bytes in memory between rotations and flushes
//!   one complete file per generation, isolating writers from filesystem
//!   I/O entirely.

pub mod artifact;
pub mod config;
pub mod error;
pub mod metrics;
pub mod sink;
pub mod staged;

mod controller;
mod trigger;

pub use artifact::{
    ArchiveFormat, Artifact, ArtifactKind, ArtifactWrite, InnerClose, NextFactory, RecordHeader,
};
pub use config::RotationOptions;
pub use error::{Result, SinkError};
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use sink::RollingSink;
pub use staged::{RecordFramer, StagePath, StagedSink};
