use std::path::{Path, PathBuf};
use std::process::{Child, Command as Process, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::EngineError;

pub const MIN_SPEED: f32 = 0.5;
pub const MAX_SPEED: f32 = 2.0;

/// How long a caller waits for the engine to answer one command
pub const REPLY_TIMEOUT: Duration = Duration::from_millis(250);

/// Non-finite speeds fall back to 1.0x.
pub fn clamp_speed(speed: f32) -> f32 {
    if speed.is_finite() {
        speed.clamp(MIN_SPEED, MAX_SPEED)
    } else {
        1.0
    }
}

pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_finite() {
        volume.clamp(0.0, 1.0)
    } else {
        1.0
    }
}

/// Opaque reference to synthesized audio. Silent handles carry no file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioHandle {
    path: Option<PathBuf>,
}

impl AudioHandle {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn silent() -> Self {
        Self::default()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Answer to a position query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineState {
    pub position_ms: u64,
    pub is_playing: bool,
}

/// Request/response boundary to whatever actually plays the narration.
pub trait AudioEngine: Send + Sync {
    fn load(&self, audio: &AudioHandle, duration_ms: u64) -> Result<(), EngineError>;
    fn play(&self) -> Result<(), EngineError>;
    fn pause(&self) -> Result<(), EngineError>;
    fn stop(&self) -> Result<(), EngineError>;
    fn set_speed(&self, speed: f32) -> Result<(), EngineError>;
    fn set_volume(&self, volume: f32) -> Result<(), EngineError>;
    fn poll_state(&self) -> Result<EngineState, EngineError>;
    fn poll_finished(&self) -> Result<bool, EngineError>;
}

/// External player invocation, e.g.
/// `["ffplay", "-nodisp", "-autoexit", "-ss", "{start}", "-af", "atempo={speed},volume={volume}", "{path}"]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerCommand {
    argv: Vec<String>,
}

impl PlayerCommand {
    pub fn new(argv: Vec<String>) -> Option<Self> {
        if argv.is_empty() {
            None
        } else {
            Some(Self { argv })
        }
    }

    pub fn render(&self, path: &Path, start_secs: f64, speed: f32, volume: f32) -> Vec<String> {
        self.argv
            .iter()
            .map(|arg| {
                arg.replace("{path}", &path.to_string_lossy())
                    .replace("{start}", &format!("{start_secs:.3}"))
                    .replace("{speed}", &format!("{speed:.2}"))
                    .replace("{volume}", &format!("{volume:.2}"))
            })
            .collect()
    }

    fn spawn(&self, path: &Path, start_secs: f64, speed: f32, volume: f32) -> std::io::Result<Child> {
        let args = self.render(path, start_secs, speed, volume);
        Process::new(&args[0])
            .args(&args[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
    }
}

type Reply<T> = Sender<Result<T, EngineError>>;

enum EngineCommand {
    Load {
        audio: AudioHandle,
        duration_ms: u64,
        reply: Reply<()>,
    },
    Play(Reply<()>),
    Pause(Reply<()>),
    Stop(Reply<()>),
    SetSpeed(f32, Reply<()>),
    SetVolume(f32, Reply<()>),
    State(Reply<EngineState>),
    Finished(Reply<bool>),
}

/// Engine that keeps the playback clock for a loaded clip on its own thread.
///
/// Positions are reported on the active speed's timeline: content position
/// divided by speed. When a player command is configured, the clip's file is
/// handed to it on play and the process is killed on pause.
pub struct ClockEngine {
    commands: Sender<EngineCommand>,
}

impl ClockEngine {
    pub fn new(player: Option<PlayerCommand>) -> Self {
        let (commands, rx) = mpsc::channel::<EngineCommand>();

        thread::spawn(move || run_clock(rx, Clock::new(player)));

        Self { commands }
    }

    fn request<T>(
        &self,
        name: &'static str,
        command: impl FnOnce(Reply<T>) -> EngineCommand,
    ) -> Result<T, EngineError> {
        let (tx, rx) = mpsc::channel();
        self.commands
            .send(command(tx))
            .map_err(|_| EngineError::Unreachable)?;

        match rx.recv_timeout(REPLY_TIMEOUT) {
            Ok(reply) => reply,
            Err(RecvTimeoutError::Timeout) => Err(EngineError::Timeout(name)),
            Err(RecvTimeoutError::Disconnected) => Err(EngineError::Unreachable),
        }
    }
}

impl Default for ClockEngine {
    fn default() -> Self {
        Self::new(None)
    }
}

impl AudioEngine for ClockEngine {
    fn load(&self, audio: &AudioHandle, duration_ms: u64) -> Result<(), EngineError> {
        let audio = audio.clone();
        self.request("load", |reply| EngineCommand::Load {
            audio,
            duration_ms,
            reply,
        })
    }

    fn play(&self) -> Result<(), EngineError> {
        self.request("play", EngineCommand::Play)
    }

    fn pause(&self) -> Result<(), EngineError> {
        self.request("pause", EngineCommand::Pause)
    }

    fn stop(&self) -> Result<(), EngineError> {
        self.request("stop", EngineCommand::Stop)
    }

    fn set_speed(&self, speed: f32) -> Result<(), EngineError> {
        self.request("set_speed", |reply| EngineCommand::SetSpeed(speed, reply))
    }

    fn set_volume(&self, volume: f32) -> Result<(), EngineError> {
        self.request("set_volume", |reply| EngineCommand::SetVolume(volume, reply))
    }

    fn poll_state(&self) -> Result<EngineState, EngineError> {
        self.request("poll_state", EngineCommand::State)
    }

    fn poll_finished(&self) -> Result<bool, EngineError> {
        self.request("poll_finished", EngineCommand::Finished)
    }
}

fn run_clock(commands: Receiver<EngineCommand>, mut clock: Clock) {
    // Exits once every ClockEngine handle is dropped
    while let Ok(command) = commands.recv() {
        let now = Instant::now();
        clock.reconcile(now);

        // A caller that timed out has dropped its receiver; nothing to do then
        match command {
            EngineCommand::Load {
                audio,
                duration_ms,
                reply,
            } => {
                clock.load(audio, duration_ms);
                let _ = reply.send(Ok(()));
            }
            EngineCommand::Play(reply) => {
                let _ = reply.send(clock.play(now));
            }
            EngineCommand::Pause(reply) => {
                let _ = reply.send(clock.pause(now));
            }
            EngineCommand::Stop(reply) => {
                clock.stop();
                let _ = reply.send(Ok(()));
            }
            EngineCommand::SetSpeed(speed, reply) => {
                let _ = reply.send(clock.set_speed(speed, now));
            }
            EngineCommand::SetVolume(volume, reply) => {
                let _ = reply.send(clock.set_volume(volume, now));
            }
            EngineCommand::State(reply) => {
                let _ = reply.send(Ok(clock.state(now)));
            }
            EngineCommand::Finished(reply) => {
                let _ = reply.send(Ok(clock.is_finished(now)));
            }
        }
    }
}

struct Clip {
    audio: AudioHandle,
    duration_ms: u64,
}

struct Clock {
    clip: Option<Clip>,
    content_ms: f64,
    // Some while playing; content_ms is the position at this instant
    anchor: Option<Instant>,
    speed: f32,
    volume: f32,
    player: Option<PlayerCommand>,
    child: Option<Child>,
}

impl Clock {
    fn new(player: Option<PlayerCommand>) -> Self {
        Self {
            clip: None,
            content_ms: 0.0,
            anchor: None,
            speed: 1.0,
            volume: 1.0,
            player,
            child: None,
        }
    }

    fn content_at(&self, now: Instant) -> f64 {
        let running = self.anchor.map_or(0.0, |anchor| {
            now.duration_since(anchor).as_secs_f64() * 1000.0 * self.speed as f64
        });
        let content = self.content_ms + running;
        match &self.clip {
            Some(clip) => content.min(clip.duration_ms as f64),
            None => content,
        }
    }

    fn settle(&mut self, now: Instant) {
        self.content_ms = self.content_at(now);
        if self.anchor.is_some() {
            self.anchor = Some(now);
        }
    }

    fn is_finished(&self, now: Instant) -> bool {
        match &self.clip {
            Some(clip) => self.content_at(now) >= clip.duration_ms as f64,
            None => true,
        }
    }

    /// Stop the clock once the clip has run out.
    fn reconcile(&mut self, now: Instant) {
        if self.anchor.is_some() && self.is_finished(now) {
            self.settle(now);
            self.anchor = None;
            self.kill_player();
        }
    }

    fn load(&mut self, audio: AudioHandle, duration_ms: u64) {
        self.kill_player();
        self.clip = Some(Clip { audio, duration_ms });
        self.content_ms = 0.0;
        self.anchor = None;
    }

    fn play(&mut self, now: Instant) -> Result<(), EngineError> {
        if self.clip.is_none() {
            return Err(EngineError::Rejected {
                command: "play",
                reason: "nothing loaded".into(),
            });
        }
        if self.anchor.is_none() && !self.is_finished(now) {
            self.child = self.spawn_player(self.speed, self.volume)?;
            self.anchor = Some(now);
        }
        Ok(())
    }

    fn pause(&mut self, now: Instant) -> Result<(), EngineError> {
        if self.clip.is_none() {
            return Err(EngineError::Rejected {
                command: "pause",
                reason: "nothing loaded".into(),
            });
        }
        self.settle(now);
        self.anchor = None;
        self.kill_player();
        Ok(())
    }

    fn stop(&mut self) {
        self.kill_player();
        self.clip = None;
        self.content_ms = 0.0;
        self.anchor = None;
    }

    fn set_speed(&mut self, speed: f32, now: Instant) -> Result<(), EngineError> {
        let speed = clamp_speed(speed);
        self.settle(now);
        self.restart_player(speed, self.volume)?;
        self.speed = speed;
        Ok(())
    }

    fn set_volume(&mut self, volume: f32, now: Instant) -> Result<(), EngineError> {
        let volume = clamp_volume(volume);
        self.settle(now);
        self.restart_player(self.speed, volume)?;
        self.volume = volume;
        Ok(())
    }

    fn state(&self, now: Instant) -> EngineState {
        EngineState {
            position_ms: (self.content_at(now) / self.speed as f64) as u64,
            is_playing: self.anchor.is_some(),
        }
    }

    fn spawn_player(&self, speed: f32, volume: f32) -> Result<Option<Child>, EngineError> {
        let (Some(player), Some(clip)) = (&self.player, &self.clip) else {
            return Ok(None);
        };
        let Some(path) = clip.audio.path() else {
            return Ok(None);
        };
        let child = player.spawn(path, self.content_ms / 1000.0, speed, volume)?;
        Ok(Some(child))
    }

    /// Replace a running player with one at the new settings; on failure the old one keeps playing.
    fn restart_player(&mut self, speed: f32, volume: f32) -> Result<(), EngineError> {
        if self.anchor.is_some() && self.child.is_some() {
            let child = self.spawn_player(speed, volume)?;
            self.kill_player();
            self.child = child;
        }
        Ok(())
    }

    fn kill_player(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                tracing::debug!(error = %e, "player_already_exited");
            }
            let _ = child.wait();
        }
    }
}

impl Drop for Clock {
    fn drop(&mut self) {
        self.kill_player();
    }
}
