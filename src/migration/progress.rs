//! Progress publishing: fixed-cadence sampling of the migration state.
//!
//! The publisher is a pure reader. Each tick takes the shared lock just
//! long enough to snapshot the state and collect the transcript lines
//! appended since the previous tick, then pushes one [`ProgressFrame`]
//! into the sink. Any number of publishers can observe one migration.
//!
//! The transport is abstracted behind [`ProgressSink`]: the panel's
//! routing layer adapts its websocket to it, the CLI prints frames to
//! stdout, tests collect them from a channel.

use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded};
use thiserror::Error;

use super::protocol::ProgressFrame;
use super::state::{MigrationHandle, MigrationStep};

/// The receiving end of a progress stream went away.
#[derive(Error, Debug, Clone, Copy)]
#[error("progress sink closed")]
pub struct SinkClosed;

/// Push transport for progress frames.
pub trait ProgressSink: Send {
    fn send(&mut self, frame: &ProgressFrame) -> Result<(), SinkClosed>;
    /// Normal-closure signal after the final frame.
    fn close(&mut self);
}

/// Samples one migration's state on a fixed cadence.
pub struct ProgressPublisher {
    state: MigrationHandle,
    tick: Duration,
}

impl ProgressPublisher {
    pub fn new(state: MigrationHandle, tick: Duration) -> Self {
        Self { state, tick }
    }

    /// Stream frames into `sink` until the migration is observed Done (or
    /// Idle, meaning a concurrent reset), after one final frame is sent and the
    /// sink closed; a failed send also stops the publisher,
    /// without a close.
    pub fn run(&self, sink: &mut dyn ProgressSink) {
        let ticker = crossbeam_channel::tick(self.tick);
        let mut cursor = 0usize;

        loop {
            if ticker.recv().is_err() {
                return;
            }

            let (snapshot, new_logs) = self.state.snapshot_with_new_logs(&mut cursor);
            let frame = ProgressFrame {
                step: snapshot.step,
                results: snapshot.results,
                started_at: snapshot.started_at,
                ended_at: snapshot.ended_at,
                new_logs: if new_logs.is_empty() { None } else { Some(new_logs) },
            };
            let finished = matches!(snapshot.step, MigrationStep::Done | MigrationStep::Idle);

            if sink.send(&frame).is_err() {
                return;
            }

            if finished {
                sink.close();
                return;
            }
        }
    }

    /// Run on a dedicated thread, consuming the publisher and sink.
    pub fn spawn(self, mut sink: impl ProgressSink + 'static) -> std::thread::JoinHandle<()> {
        std::thread::spawn(move || self.run(&mut sink))
    }
}

/// [`ProgressSink`] over a crossbeam channel. Closing drops the sender so
/// the receiver sees a clean disconnect after the final frame.
pub struct ChannelSink {
    tx: Option<Sender<ProgressFrame>>,
}

/// Build a channel-backed sink plus its receiving half.
pub fn channel(capacity: usize) -> (ChannelSink, Receiver<ProgressFrame>) {
    let (tx, rx) = bounded(capacity);
    (ChannelSink { tx: Some(tx) }, rx)
}

impl ProgressSink for ChannelSink {
    fn send(&mut self, frame: &ProgressFrame) -> Result<(), SinkClosed> {
        match &self.tx {
            Some(tx) => tx.send(frame.clone()).map_err(|_| SinkClosed),
            None => Err(SinkClosed),
        }
    }

    fn close(&mut self) {
        self.tx = None;
    }
}
