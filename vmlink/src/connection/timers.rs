//! Generation-tagged timers feeding the controller's event loop.
//!
//! Timers are always stopped on state exit, but an expiry may already be in
//! flight as an event when that happens. Every (re)arming therefore bumps a
//! generation counter carried by the expiry event; an event whose generation
//! does not match the timer's current one is a no-op.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use super::events::{Event, TimerKind};

/// Single-shot timer for state timeouts (start, soft-close, hard-close).
///
/// `is_armed` stays true from `start` until the timer is stopped or a
/// matching expiry is consumed, so step functions can read "the timeout has
/// elapsed" as `!is_armed()`.
#[derive(Debug)]
pub(crate) struct StateTimer {
    kind: TimerKind,
    tx: UnboundedSender<Event>,
    generation: u64,
    armed: bool,
    task: Option<JoinHandle<()>>,
}

impl StateTimer {
    pub fn new(kind: TimerKind, tx: UnboundedSender<Event>) -> Self {
        Self {
            kind,
            tx,
            generation: 0,
            armed: false,
            task: None,
        }
    }

    pub fn start(&mut self, after: Duration) {
        self.cancel_task();
        self.generation += 1;
        self.armed = true;

        let kind = self.kind;
        let generation = self.generation;
        let tx = self.tx.clone();
        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send(Event::Timer { kind, generation });
        }));
    }

    pub fn stop(&mut self) {
        self.cancel_task();
        self.generation += 1;
        self.armed = false;
    }

    /// Consume an expiry event. Returns `true` if it disarmed the timer,
    /// `false` for a stale event.
    pub fn expire(&mut self, generation: u64) -> bool {
        if self.armed && generation == self.generation {
            self.armed = false;
            self.task = None;
            true
        } else {
            tracing::trace!(kind = ?self.kind, "ignoring stale timer expiry");
            false
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    #[cfg(test)]
    pub fn current_generation(&self) -> u64 {
        self.generation
    }

    fn cancel_task(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for StateTimer {
    fn drop(&mut self) {
        self.cancel_task();
    }
}

/// Repeating timer for polling and reconnect attempts.
#[derive(Debug)]
pub(crate) struct IntervalTimer {
    kind: TimerKind,
    tx: UnboundedSender<Event>,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl IntervalTimer {
    pub fn new(kind: TimerKind, tx: UnboundedSender<Event>) -> Self {
        Self {
            kind,
            tx,
            generation: 0,
            task: None,
        }
    }

    /// (Re)start ticking at `interval`. The first tick fires one full
    /// interval from now.
    pub fn start(&mut self, interval: Duration) {
        self.cancel_task();
        self.generation += 1;

        let kind = self.kind;
        let generation = self.generation;
        let tx = self.tx.clone();
        self.task = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if tx.send(Event::Timer { kind, generation }).is_err() {
                    break;
                }
            }
        }));
    }

    pub fn stop(&mut self) {
        self.cancel_task();
        self.generation += 1;
    }

    /// Whether a tick event belongs to the current arming.
    pub fn accepts(&self, generation: u64) -> bool {
        self.task.is_some() && generation == self.generation
    }

    pub fn is_active(&self) -> bool {
        self.task.is_some()
    }

    #[cfg(test)]
    pub fn current_generation(&self) -> u64 {
        self.generation
    }

    fn cancel_task(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for IntervalTimer {
    fn drop(&mut self) {
        self.cancel_task();
    }
}
