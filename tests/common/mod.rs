// Scripted engine and synthesizer for driving a Narrator deterministically.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use readalong::engine::{AudioEngine, AudioHandle, EngineState};
use readalong::error::{EngineError, SynthesisError};
use readalong::narrator::{Narrator, NarratorSettings};
use readalong::session::PlaybackState;
use readalong::synth::{Synthesis, Synthesizer, VoiceInfo};
use readalong::timing::{estimate_word_timings, word_count, WordTiming};

pub const QUICK_BROWN_FOX: &str = "the quick brown fox";

pub fn fox_timings() -> Vec<WordTiming> {
    vec![
        WordTiming::new("the", 0, 200),
        WordTiming::new("quick", 200, 500),
        WordTiming::new("brown", 500, 900),
        WordTiming::new("fox", 900, 1200),
    ]
}

#[derive(Debug, Default)]
struct EngineInner {
    position_ms: u64,
    is_playing: bool,
    finished: bool,
    loaded: bool,
    speed: f32,
    volume: f32,
    calls: Vec<&'static str>,
}

/// Engine whose answers are set by the test
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    inner: Mutex<EngineInner>,
    pub fail_play: AtomicBool,
    pub fail_pause: AtomicBool,
    pub fail_set_speed: AtomicBool,
    pub fail_poll: AtomicBool,
    // Held by a test to stall poll_state
    pub poll_gate: Mutex<()>,
    pub polls: AtomicU32,
}

impl ScriptedEngine {
    pub fn set_position(&self, position_ms: u64) {
        self.inner.lock().unwrap().position_ms = position_ms;
    }

    pub fn set_finished(&self, finished: bool) {
        self.inner.lock().unwrap().finished = finished;
    }

    pub fn set_playing(&self, is_playing: bool) {
        self.inner.lock().unwrap().is_playing = is_playing;
    }

    pub fn is_playing(&self) -> bool {
        self.inner.lock().unwrap().is_playing
    }

    pub fn speed(&self) -> f32 {
        self.inner.lock().unwrap().speed
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().unwrap().calls.clear();
    }

    fn record(&self, call: &'static str) {
        self.inner.lock().unwrap().calls.push(call);
    }
}

fn rejected(command: &'static str) -> EngineError {
    EngineError::Rejected {
        command,
        reason: "scripted failure".into(),
    }
}

impl AudioEngine for ScriptedEngine {
    fn load(&self, _audio: &AudioHandle, _duration_ms: u64) -> Result<(), EngineError> {
        self.record("load");
        let mut inner = self.inner.lock().unwrap();
        inner.loaded = true;
        inner.position_ms = 0;
        inner.finished = false;
        inner.is_playing = false;
        Ok(())
    }

    fn play(&self) -> Result<(), EngineError> {
        self.record("play");
        if self.fail_play.load(Ordering::SeqCst) {
            return Err(rejected("play"));
        }
        self.inner.lock().unwrap().is_playing = true;
        Ok(())
    }

    fn pause(&self) -> Result<(), EngineError> {
        self.record("pause");
        if self.fail_pause.load(Ordering::SeqCst) {
            return Err(rejected("pause"));
        }
        self.inner.lock().unwrap().is_playing = false;
        Ok(())
    }

    fn stop(&self) -> Result<(), EngineError> {
        self.record("stop");
        let mut inner = self.inner.lock().unwrap();
        inner.is_playing = false;
        inner.loaded = false;
        inner.position_ms = 0;
        Ok(())
    }

    fn set_speed(&self, speed: f32) -> Result<(), EngineError> {
        self.record("set_speed");
        if self.fail_set_speed.load(Ordering::SeqCst) {
            return Err(rejected("set_speed"));
        }
        self.inner.lock().unwrap().speed = speed;
        Ok(())
    }

    fn set_volume(&self, volume: f32) -> Result<(), EngineError> {
        self.record("set_volume");
        self.inner.lock().unwrap().volume = volume;
        Ok(())
    }

    fn poll_state(&self) -> Result<EngineState, EngineError> {
        let _gate = self.poll_gate.lock().unwrap();
        self.polls.fetch_add(1, Ordering::SeqCst);
        if self.fail_poll.load(Ordering::SeqCst) {
            return Err(EngineError::Timeout("poll_state"));
        }
        let inner = self.inner.lock().unwrap();
        Ok(EngineState {
            position_ms: inner.position_ms,
            is_playing: inner.is_playing,
        })
    }

    fn poll_finished(&self) -> Result<bool, EngineError> {
        Ok(self.inner.lock().unwrap().finished)
    }
}

/// Synthesizer with scripted timings, failures and per-speed delays
#[derive(Debug, Default)]
pub struct ScriptedSynth {
    // Timings returned for a given speed, keyed by speed * 100
    timings: Mutex<HashMap<u32, Vec<WordTiming>>>,
    delays: Mutex<HashMap<u32, Duration>>,
    pub fail_full: AtomicBool,
    pub fail_timings: AtomicBool,
    // Held by a test to stall synthesize_full
    pub full_gate: Mutex<()>,
    pub full_calls: AtomicU32,
}

fn speed_key(speed: f32) -> u32 {
    (speed * 100.0).round() as u32
}

impl ScriptedSynth {
    pub fn with_timings(speed: f32, words: Vec<WordTiming>) -> Self {
        let synth = Self::default();
        synth.script(speed, words);
        synth
    }

    pub fn script(&self, speed: f32, words: Vec<WordTiming>) {
        self.timings.lock().unwrap().insert(speed_key(speed), words);
    }

    pub fn delay(&self, speed: f32, delay: Duration) {
        self.delays.lock().unwrap().insert(speed_key(speed), delay);
    }

    fn timings_for(&self, text: &str, speed: f32) -> Vec<WordTiming> {
        let delay = self.delays.lock().unwrap().get(&speed_key(speed)).copied();
        if let Some(delay) = delay {
            thread::sleep(delay);
        }
        // Scripts only apply to text with the same number of words
        self.timings
            .lock()
            .unwrap()
            .get(&speed_key(speed))
            .filter(|words| words.len() == word_count(text))
            .cloned()
            .unwrap_or_else(|| estimate_word_timings(text, speed))
    }
}

impl Synthesizer for ScriptedSynth {
    fn is_available(&self) -> bool {
        true
    }

    fn voices(&self) -> Vec<VoiceInfo> {
        Vec::new()
    }

    fn synthesize_full(&self, text: &str) -> Result<Synthesis, SynthesisError> {
        let _gate = self.full_gate.lock().unwrap();
        self.full_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_full.load(Ordering::SeqCst) {
            return Err(SynthesisError::Failed("scripted failure".into()));
        }
        let word_timings = self.timings_for(text, 1.0);
        let duration_ms = word_timings.last().map_or(0, |w| w.end_ms);
        Ok(Synthesis {
            audio: AudioHandle::silent(),
            word_timings,
            duration_ms,
        })
    }

    fn synthesize_timings(&self, text: &str, speed: f32) -> Result<Vec<WordTiming>, SynthesisError> {
        if self.fail_timings.load(Ordering::SeqCst) {
            return Err(SynthesisError::Failed("scripted failure".into()));
        }
        Ok(self.timings_for(text, speed))
    }
}

pub struct Harness {
    pub engine: Arc<ScriptedEngine>,
    pub synth: Arc<ScriptedSynth>,
    pub narrator: Narrator,
    // Advances one second per manual poll so a tick is always due
    clock: Instant,
}

impl Harness {
    pub fn new(synth: ScriptedSynth) -> Self {
        Self::with_settings(synth, NarratorSettings::default())
    }

    pub fn with_settings(synth: ScriptedSynth, settings: NarratorSettings) -> Self {
        let engine = Arc::new(ScriptedEngine::default());
        let synth = Arc::new(synth);
        let narrator = Narrator::new(engine.clone(), synth.clone(), settings);
        Self {
            engine,
            synth,
            narrator,
            clock: Instant::now() + Duration::from_secs(60),
        }
    }

    /// Pump responses until `done` holds, failing the test after two seconds.
    pub fn wait_for(&mut self, what: &str, mut done: impl FnMut(&Narrator) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !done(&self.narrator) {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            self.narrator.wait(Duration::from_millis(10));
        }
    }

    pub fn wait_state(&mut self, state: PlaybackState) {
        self.wait_for(&format!("state {state}"), |n| n.state() == state);
    }

    /// Issue one poll now and apply its report.
    pub fn poll_once(&mut self) {
        let epoch = self.narrator.poller().epoch();
        let before = self.engine.polls.load(Ordering::SeqCst);
        self.clock += Duration::from_secs(1);
        assert!(self.narrator.tick(self.clock), "poll was not issued");
        self.wait_for("poll report", |n| {
            !n.poller().is_in_flight() || n.poller().epoch() != epoch
        });
        assert!(self.engine.polls.load(Ordering::SeqCst) > before);
        // The flag clears just before delivery; make sure the report is in
        self.narrator.wait(Duration::from_millis(50));
    }
}
