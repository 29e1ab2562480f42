use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::engine::AudioEngine;
use crate::error::EngineError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// One poll's view of the engine; superseded by the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackSnapshot {
    pub position_ms: u64,
    pub is_playing: bool,
    pub finished: bool,
}

/// Result of one tick, tagged with the epoch of the poller that issued it
/// and the order it was issued in
#[derive(Debug)]
pub struct PollReport {
    pub epoch: u64,
    pub seq: u64,
    pub outcome: Result<PlaybackSnapshot, EngineError>,
}

/// Ask the engine for its position and whether it has finished.
pub fn query(engine: &dyn AudioEngine) -> Result<PlaybackSnapshot, EngineError> {
    let state = engine.poll_state()?;
    let finished = engine.poll_finished()?;
    Ok(PlaybackSnapshot {
        position_ms: state.position_ms,
        is_playing: state.is_playing,
        finished,
    })
}

/// Timer-driven position poller.
///
/// The owner calls `tick` from its loop; the poller decides whether a poll is
/// due and runs the engine round trip off-thread so a stalled engine never
/// blocks the owner. At most one round trip is in flight. Every `start`/`stop`
/// moves to a new epoch, so reports from an earlier run are recognisably stale.
/// Within a run, a report issued before one already accepted is dropped.
#[derive(Debug)]
pub struct Poller {
    interval: Duration,
    epoch: u64,
    issued: u64,
    latest_accepted: u64,
    running: bool,
    next_due: Option<Instant>,
    in_flight: Arc<AtomicBool>,
    consecutive_failures: u32,
}

impl Default for Poller {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl Poller {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            epoch: 0,
            issued: 0,
            latest_accepted: 0,
            running: false,
            next_due: None,
            in_flight: Arc::new(AtomicBool::new(false)),
            consecutive_failures: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Begin polling; a running poller is replaced, never doubled.
    pub fn start(&mut self, now: Instant) -> u64 {
        self.stop();
        self.epoch += 1;
        self.running = true;
        self.next_due = Some(now);
        self.consecutive_failures = 0;
        tracing::debug!(epoch = self.epoch, "poller_started");
        self.epoch
    }

    /// Stop polling. Idempotent; anything already in flight becomes stale.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        self.next_due = None;
        self.epoch += 1;
        tracing::debug!(epoch = self.epoch, "poller_stopped");
    }

    /// Issue a poll if one is due and none is in flight. Returns true when a poll was sent.
    pub fn tick<F>(&mut self, now: Instant, engine: &Arc<dyn AudioEngine>, deliver: F) -> bool
    where
        F: FnOnce(PollReport) + Send + 'static,
    {
        let Some(due) = self.next_due else {
            return false;
        };
        if !self.running || now < due {
            return false;
        }
        // Stay on the cadence grid; skip boundaries missed while the owner was busy
        let mut next = due + self.interval;
        while next <= now {
            next += self.interval;
        }
        self.next_due = Some(next);

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::trace!(epoch = self.epoch, "poll_skipped_in_flight");
            return false;
        }

        self.issued += 1;
        let epoch = self.epoch;
        let seq = self.issued;
        let engine = Arc::clone(engine);
        let in_flight = Arc::clone(&self.in_flight);
        let spawned = thread::Builder::new()
            .name("position-poll".into())
            .spawn(move || {
                let outcome = query(engine.as_ref());
                in_flight.store(false, Ordering::Release);
                deliver(PollReport { epoch, seq, outcome });
            });

        if let Err(e) = spawned {
            self.in_flight.store(false, Ordering::Release);
            tracing::warn!(error = %e, "poll_spawn_failed");
            return false;
        }
        true
    }

    /// Accept a report from the current run. Stale reports and failed ticks yield None.
    pub fn accept(&mut self, report: PollReport) -> Option<PlaybackSnapshot> {
        if !self.running || report.epoch != self.epoch {
            tracing::debug!(
                report_epoch = report.epoch,
                epoch = self.epoch,
                "stale_poll_discarded"
            );
            return None;
        }
        if report.seq <= self.latest_accepted {
            tracing::debug!(
                seq = report.seq,
                latest = self.latest_accepted,
                "out_of_order_poll_discarded"
            );
            return None;
        }
        self.latest_accepted = report.seq;
        match report.outcome {
            Ok(snapshot) => {
                self.consecutive_failures = 0;
                Some(snapshot)
            }
            Err(e) => {
                self.consecutive_failures += 1;
                tracing::warn!(
                    error = %e,
                    epoch = self.epoch,
                    failures = self.consecutive_failures,
                    "poll_tick_failed"
                );
                None
            }
        }
    }
}
