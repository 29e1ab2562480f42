use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event as CtEvent, KeyEvent, KeyEventKind};

/// Unified event type consumed by the app runner
#[derive(Clone, Debug)]
pub enum ReaderEvent {
    Key(KeyEvent),
    Resize,
    Tick,
}

/// Source of terminal events (keyboard, resize, etc.)
pub trait EventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    fn recv_timeout(&self, timeout: Duration) -> Result<ReaderEvent, RecvTimeoutError>;
}

/// Production event source using crossterm
pub struct CrosstermEventSource {
    rx: Receiver<ReaderEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || loop {
            let event = match event::read() {
                // Windows reports releases too
                Ok(CtEvent::Key(key)) if key.kind != KeyEventKind::Release => ReaderEvent::Key(key),
                Ok(CtEvent::Resize(_, _)) => ReaderEvent::Resize,
                Ok(_) => continue,
                Err(e) => {
                    tracing::error!(error = %e, "terminal_read_failed");
                    break;
                }
            };
            if tx.send(event).is_err() {
                break;
            }
        });

        Self { rx }
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<ReaderEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Test event source for unit tests
pub struct TestEventSource {
    rx: Receiver<ReaderEvent>,
}

impl TestEventSource {
    pub fn new(rx: Receiver<ReaderEvent>) -> Self {
        Self { rx }
    }
}

impl EventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<ReaderEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Runner that advances the application one event/tick at a time.
///
/// Ticks keep their own schedule: a steady stream of key events does not
/// starve them.
pub struct Runner<E: EventSource, T: Ticker> {
    event_source: E,
    ticker: T,
    next_tick: Instant,
}

impl<E: EventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        let next_tick = Instant::now() + ticker.interval();
        Self {
            event_source,
            ticker,
            next_tick,
        }
    }

    /// Blocks until the next event or the next tick, whichever comes first
    pub fn step(&mut self) -> ReaderEvent {
        let now = Instant::now();
        if now >= self.next_tick {
            return self.tick(now);
        }

        let remaining = self.next_tick - now;
        match self.event_source.recv_timeout(remaining) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) => self.tick(Instant::now()),
            Err(RecvTimeoutError::Disconnected) => {
                thread::sleep(remaining);
                self.tick(Instant::now())
            }
        }
    }

    fn tick(&mut self, now: Instant) -> ReaderEvent {
        self.next_tick += self.ticker.interval();
        if self.next_tick <= now {
            // Fell behind; don't fire a burst of catch-up ticks
            self.next_tick = now + self.ticker.interval();
        }
        ReaderEvent::Tick
    }
}
