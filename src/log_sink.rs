//! Best-effort progress logging.
//!
//! The scanner, mover and dispatcher report human-readable lines through a
//! [`LogSink`]. Delivery is never guaranteed: a sink may batch, render, or
//! drop lines, and it must never block the caller.

use crate::output::OutputFormatter;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use indicatif::ProgressBar;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

/// Default capacity of a [`ChannelSink`].
pub const LOG_CHANNEL_CAPACITY: usize = 1_000;

/// Accepts formatted log lines.
pub trait LogSink: Send + Sync {
    /// Hands a line to the sink. Must return promptly.
    fn accept(&self, text: String);
}

/// Discards everything.
pub struct NullSink;

impl LogSink for NullSink {
    fn accept(&self, _text: String) {}
}

/// Bounded channel sink that drops lines when the consumer falls behind.
pub struct ChannelSink {
    tx: Sender<String>,
    dropped: AtomicU64,
}

impl ChannelSink {
    /// Creates a sink and the receiver its lines arrive on.
    pub fn bounded(capacity: usize) -> (Self, Receiver<String>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Number of lines discarded because the channel was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl LogSink for ChannelSink {
    fn accept(&self, text: String) {
        match self.tx.try_send(text) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::trace!(dropped = total, "log channel full, line dropped");
            }
            // Nobody is listening any more.
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

/// Keeps every line in memory.
#[derive(Default)]
pub struct CollectingSink {
    lines: Mutex<Vec<String>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the lines received so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Whether any received line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|line| line.contains(needle))
    }
}

impl LogSink for CollectingSink {
    fn accept(&self, text: String) {
        self.lines.lock().push(text);
    }
}

/// Background thread that renders a [`ChannelSink`]'s lines to the terminal
/// and keeps a transcript.
///
/// Lines are printed with the progress bar suspended so the two don't
/// interleave. The pump stops once every sender has been dropped.
pub struct LogPump {
    handle: JoinHandle<Vec<String>>,
}

impl LogPump {
    pub fn spawn(rx: Receiver<String>, progress: ProgressBar, echo: bool) -> Self {
        let handle = thread::spawn(move || {
            let mut transcript = Vec::new();
            for line in rx.iter() {
                if echo {
                    progress.suspend(|| OutputFormatter::render(&line));
                }
                transcript.push(line);
            }
            transcript
        });
        Self { handle }
    }

    /// Waits for the channel to close and returns every line received.
    pub fn finish(self) -> Vec<String> {
        self.handle.join().unwrap_or_else(|_| {
            tracing::error!("log pump thread panicked");
            Vec::new()
        })
    }
}
