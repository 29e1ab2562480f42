use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::document::DocumentText;
use crate::engine::{clamp_speed, clamp_volume, AudioEngine};
use crate::error::{SessionError, SynthesisError};
use crate::poller::{PollReport, Poller, DEFAULT_POLL_INTERVAL};
use crate::session::{Acquisition, Notice, PlaybackState, Session, SnapshotOutcome, TimingRequest};
use crate::synth::{Synthesis, Synthesizer};
use crate::sync::{current_word_index, word_state, WordState};
use crate::timing::{TimingTable, WordTiming};

const STALL_MESSAGE: &str = "audio engine is not responding";

#[derive(Debug, Clone, Copy)]
pub struct NarratorSettings {
    pub speed: f32,
    pub volume: f32,
    pub poll_interval: Duration,
    /// Consecutive failed polls before playback is reported as stalled
    pub stall_after_failures: u32,
}

impl Default for NarratorSettings {
    fn default() -> Self {
        Self {
            speed: 1.0,
            volume: 1.0,
            poll_interval: DEFAULT_POLL_INTERVAL,
            stall_after_failures: 20,
        }
    }
}

#[derive(Debug)]
pub enum Acquired {
    /// Audio plus timings estimated at `speed`
    Full { synthesis: Synthesis, speed: f32 },
    Timings(Vec<WordTiming>),
}

#[derive(Debug)]
pub struct AcquisitionReport {
    pub generation: u64,
    pub outcome: Result<Acquired, SynthesisError>,
}

/// Responses coming back from worker threads
#[derive(Debug)]
pub enum NarratorEvent {
    Polled(PollReport),
    Acquired(AcquisitionReport),
}

/// Drives a `Session` against an audio engine and a synthesizer.
///
/// Engine commands are issued inline; synthesis and polling run on worker
/// threads and report back through a channel that `pump` drains on the
/// owning thread, so the session only ever has one writer.
pub struct Narrator {
    session: Session,
    poller: Poller,
    engine: Arc<dyn AudioEngine>,
    synth: Arc<dyn Synthesizer>,
    stall_after_failures: u32,
    stalled: bool,
    events_tx: Sender<NarratorEvent>,
    events_rx: Receiver<NarratorEvent>,
}

impl Narrator {
    pub fn new(
        engine: Arc<dyn AudioEngine>,
        synth: Arc<dyn Synthesizer>,
        settings: NarratorSettings,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        let session = Session::new(settings.speed, settings.volume);

        if let Err(e) = engine.set_speed(session.speed()) {
            tracing::warn!(error = %e, "initial_speed_rejected");
        }
        if let Err(e) = engine.set_volume(session.volume()) {
            tracing::warn!(error = %e, "initial_volume_rejected");
        }

        Self {
            session,
            poller: Poller::new(settings.poll_interval),
            engine,
            synth,
            stall_after_failures: settings.stall_after_failures.max(1),
            stalled: false,
            events_tx,
            events_rx,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> PlaybackState {
        self.session.state()
    }

    pub fn table(&self) -> &TimingTable {
        self.session.table()
    }

    pub fn poller(&self) -> &Poller {
        &self.poller
    }

    pub fn synthesizer(&self) -> &Arc<dyn Synthesizer> {
        &self.synth
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.session.notice()
    }

    pub fn dismiss_notice(&mut self) {
        self.session.dismiss_notice();
    }

    pub fn is_stalled(&self) -> bool {
        self.stalled
    }

    /// Word being spoken at the session's position, recomputed from the live table.
    pub fn current_word(&self) -> Option<usize> {
        current_word_index(self.session.position_ms(), self.session.table().words())
    }

    pub fn word_state(&self, index: usize) -> WordState {
        word_state(index, self.current_word())
    }

    /// Load a document, replacing whatever was loaded before.
    pub fn load(&mut self, document: DocumentText) {
        if self.session.state() != PlaybackState::Idle || self.session.document().is_some() {
            self.clear();
        }
        tracing::info!(words = document.word_count, "document_loading");
        let request = self.session.load(document);
        self.dispatch(request);
    }

    /// Try preparing the retained document again after a failed load.
    pub fn retry(&mut self) -> Result<(), SessionError> {
        let request = self.session.retry()?;
        tracing::info!(generation = request.generation, "document_retry");
        self.dispatch(request);
        Ok(())
    }

    pub fn play(&mut self, now: Instant) -> Result<(), SessionError> {
        self.session.can_play()?;

        if let Err(e) = self.start_engine() {
            tracing::warn!(error = %e, "play_failed");
            self.session.set_notice(Notice::error(e.to_string()));
            return Err(e);
        }

        self.session.mark_playing()?;
        self.stalled = false;
        self.poller.start(now);
        tracing::info!(position_ms = self.session.position_ms(), "playback_started");
        Ok(())
    }

    fn start_engine(&self) -> Result<(), SessionError> {
        if self.session.state() == PlaybackState::Finished {
            // Replay from the top
            let audio = self.session.audio().cloned().unwrap_or_default();
            if let Err(e) = self.engine.stop() {
                tracing::debug!(error = %e, "stop_failed_on_replay");
            }
            self.engine.load(&audio, self.session.duration_ms())?;
        }
        self.engine.play()?;
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), SessionError> {
        if self.session.state() != PlaybackState::Playing {
            return self.session.mark_paused();
        }

        // On failure the engine may still be playing; keep polling so the next tick reconciles
        if let Err(e) = self.engine.pause() {
            tracing::warn!(error = %e, "pause_failed");
            self.session.set_notice(Notice::error(e.to_string()));
            return Err(e.into());
        }

        self.poller.stop();
        self.session.mark_paused()?;
        tracing::info!(position_ms = self.session.position_ms(), "playback_paused");
        Ok(())
    }

    pub fn toggle(&mut self, now: Instant) -> Result<(), SessionError> {
        if self.session.is_playing() {
            self.pause()
        } else {
            self.play(now)
        }
    }

    /// Change speed on the engine, then refresh the timing table for it.
    pub fn set_speed(&mut self, speed: f32) -> Result<(), SessionError> {
        let speed = clamp_speed(speed);
        if let Err(e) = self.engine.set_speed(speed) {
            tracing::warn!(error = %e, speed, "set_speed_failed");
            self.session.set_notice(Notice::error(e.to_string()));
            return Err(e.into());
        }

        if let Some(request) = self.session.change_speed(speed) {
            tracing::info!(speed, generation = request.generation, "speed_change_requested");
            self.dispatch(request);
        }
        Ok(())
    }

    pub fn set_volume(&mut self, volume: f32) -> Result<(), SessionError> {
        let volume = clamp_volume(volume);
        if let Err(e) = self.engine.set_volume(volume) {
            tracing::warn!(error = %e, volume, "set_volume_failed");
            self.session.set_notice(Notice::error(e.to_string()));
            return Err(e.into());
        }
        self.session.set_volume(volume);
        Ok(())
    }

    /// Stop everything and forget the document. Engine failures are ignored.
    pub fn clear(&mut self) {
        self.poller.stop();
        if let Err(e) = self.engine.stop() {
            tracing::debug!(error = %e, "stop_failed_on_clear");
        }
        self.session.clear();
        self.stalled = false;
        tracing::info!("session_cleared");
    }

    /// Issue a position poll when one is due.
    pub fn tick(&mut self, now: Instant) -> bool {
        let tx = self.events_tx.clone();
        self.poller.tick(now, &self.engine, move |report| {
            let _ = tx.send(NarratorEvent::Polled(report));
        })
    }

    /// Apply every response that has arrived. Returns true if anything was applied.
    pub fn pump(&mut self) -> bool {
        let mut applied = false;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle(event);
            applied = true;
        }
        applied
    }

    /// Block up to `timeout` for a response, then apply everything pending.
    pub fn wait(&mut self, timeout: Duration) -> bool {
        match self.events_rx.recv_timeout(timeout) {
            Ok(event) => {
                self.handle(event);
                self.pump();
                true
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    fn handle(&mut self, event: NarratorEvent) {
        match event {
            NarratorEvent::Polled(report) => self.on_poll(report),
            NarratorEvent::Acquired(report) => self.on_acquired(report),
        }
    }

    fn on_poll(&mut self, report: PollReport) {
        let Some(snapshot) = self.poller.accept(report) else {
            if self.poller.is_running()
                && !self.stalled
                && self.poller.consecutive_failures() >= self.stall_after_failures
            {
                self.stalled = true;
                self.session.set_notice(Notice::warning(STALL_MESSAGE));
                tracing::warn!(
                    failures = self.poller.consecutive_failures(),
                    "playback_stalled"
                );
            }
            return;
        };
        if self.stalled {
            self.stalled = false;
            if self.session.notice().is_some_and(|n| n.message == STALL_MESSAGE) {
                self.session.dismiss_notice();
            }
            tracing::info!("playback_recovered");
        }

        match self.session.apply_snapshot(snapshot) {
            SnapshotOutcome::Finished => {
                self.poller.stop();
                tracing::info!(position_ms = self.session.position_ms(), "playback_finished");
            }
            SnapshotOutcome::Paused => {
                self.poller.stop();
                tracing::info!(position_ms = self.session.position_ms(), "playback_paused_by_engine");
            }
            SnapshotOutcome::Advanced | SnapshotOutcome::Ignored => {}
        }
    }

    fn on_acquired(&mut self, report: AcquisitionReport) {
        let generation = report.generation;
        if !self.session.is_current(generation) {
            tracing::debug!(
                generation,
                current = self.session.generation(),
                "stale_acquisition_discarded"
            );
            return;
        }

        match report.outcome {
            Ok(Acquired::Full { synthesis, speed }) => self.finish_load(generation, synthesis, speed),
            Ok(Acquired::Timings(words)) => self.finish_speed_change(generation, Ok(words)),
            Err(e) if self.session.state() == PlaybackState::Preparing => {
                self.fail_load(generation, e.into());
            }
            Err(e) => self.finish_speed_change(generation, Err(e)),
        }
    }

    fn finish_load(&mut self, generation: u64, synthesis: Synthesis, speed: f32) {
        if self.session.state() != PlaybackState::Preparing {
            return;
        }
        let Some(text) = self.session.text() else {
            return;
        };

        let table = match TimingTable::for_text(generation, speed, text, synthesis.word_timings) {
            Ok(table) => table,
            Err(e) => {
                self.fail_load(generation, e.into());
                return;
            }
        };
        if let Err(e) = self.engine.load(&synthesis.audio, synthesis.duration_ms) {
            self.fail_load(generation, e.into());
            return;
        }

        if self
            .session
            .finish_load(generation, table, synthesis.audio, synthesis.duration_ms)
        {
            tracing::info!(
                generation,
                words = self.session.table().len(),
                duration_ms = self.session.duration_ms(),
                "document_ready"
            );
            if let Some(request) = self.session.follow_up_request() {
                self.dispatch(request);
            }
        }
    }

    fn fail_load(&mut self, generation: u64, error: SessionError) {
        tracing::warn!(error = %error, generation, "document_prepare_failed");
        self.session.fail_load(generation, &error);
    }

    fn finish_speed_change(&mut self, generation: u64, result: Result<Vec<WordTiming>, SynthesisError>) {
        match self.session.finish_speed_change(generation, result) {
            Ok(true) => tracing::info!(
                generation,
                speed = self.session.table().speed(),
                "timings_swapped"
            ),
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, generation, "timings_refresh_failed"),
        }
    }

    fn dispatch(&mut self, request: TimingRequest) {
        let synth = Arc::clone(&self.synth);
        let tx = self.events_tx.clone();
        let generation = request.generation;

        let spawned = thread::Builder::new()
            .name("synthesis".into())
            .spawn(move || {
                let outcome = acquire(synth.as_ref(), &request);
                let _ = tx.send(NarratorEvent::Acquired(AcquisitionReport {
                    generation: request.generation,
                    outcome,
                }));
            });

        if let Err(e) = spawned {
            tracing::error!(error = %e, generation, "synthesis_spawn_failed");
            let error = SessionError::Synthesis(SynthesisError::Io(e));
            if self.session.state() == PlaybackState::Preparing {
                self.fail_load(generation, error);
            } else {
                self.session.set_notice(Notice::warning(error.to_string()));
            }
        }
    }
}

/// Run one request against the synthesizer.
fn acquire(synth: &dyn Synthesizer, request: &TimingRequest) -> Result<Acquired, SynthesisError> {
    match request.kind {
        Acquisition::Full => {
            let mut synthesis = synth.synthesize_full(&request.text)?;
            if request.speed != 1.0 {
                synthesis.word_timings = synth.synthesize_timings(&request.text, request.speed)?;
            }
            Ok(Acquired::Full {
                synthesis,
                speed: request.speed,
            })
        }
        Acquisition::TimingsOnly => synth
            .synthesize_timings(&request.text, request.speed)
            .map(Acquired::Timings),
    }
}
