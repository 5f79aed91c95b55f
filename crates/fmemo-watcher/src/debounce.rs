//! Debouncing of raw filesystem events.
//!
//! Editors rarely save with a single write. A typical save is a temp file
//! write, a rename over the original, and a metadata touch, each reported
//! separately. The debouncer collects paths while events keep arriving and
//! only hands them over once the window has passed without a new event.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;

/// Where the debouncer is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    /// Nothing pending.
    Idle,
    /// Events collected, waiting for the window to pass.
    Pending,
}

/// Paths whose events have settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettledBatch {
    /// Distinct paths, in the order they were first seen.
    pub paths: Vec<PathBuf>,

    /// How many raw events were merged into this batch.
    pub raw_events: usize,
}

/// Collects raw events into batches separated by quiet periods.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    deadline: Option<Instant>,
    paths: Vec<PathBuf>,
    seen: HashSet<PathBuf>,
    raw_events: usize,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
            paths: Vec::new(),
            seen: HashSet::new(),
            raw_events: 0,
        }
    }

    pub fn state(&self) -> BatchState {
        if self.deadline.is_some() {
            BatchState::Pending
        } else {
            BatchState::Idle
        }
    }

    /// When the pending batch settles, if one is pending.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Records one raw event and restarts the window.
    pub fn push(&mut self, path: PathBuf, now: Instant) {
        self.raw_events += 1;
        if self.seen.insert(path.clone()) {
            self.paths.push(path);
        }
        self.deadline = Some(now + self.window);
    }

    /// Records one raw event touching several paths.
    pub fn push_all<I>(&mut self, paths: I, now: Instant)
    where
        I: IntoIterator<Item = PathBuf>,
    {
        for path in paths {
            self.push(path, now);
        }
    }

    /// Returns the batch if the window has passed, resetting to idle.
    pub fn take_settled(&mut self, now: Instant) -> Option<SettledBatch> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                self.seen.clear();
                Some(SettledBatch {
                    paths: std::mem::take(&mut self.paths),
                    raw_events: std::mem::replace(&mut self.raw_events, 0),
                })
            }
            _ => None,
        }
    }
}
