use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::engine::{clamp_speed, clamp_volume, PlayerCommand};
use crate::narrator::NarratorSettings;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub speed: f32,
    pub volume: f32,
    pub poll_interval_ms: u64,
    pub stall_after_failures: u32,
    pub frame_interval_ms: u64,
    pub scroll_frames: u16,
    pub piper_path: Option<PathBuf>,
    pub voice_model: Option<PathBuf>,
    /// argv template for an external player, e.g. `["mpv", "--start={start}", "{path}"]`
    pub player_command: Option<Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            speed: 1.0,
            volume: 1.0,
            poll_interval_ms: 50,
            stall_after_failures: 20,
            frame_interval_ms: 25,
            scroll_frames: 6,
            piper_path: None,
            voice_model: None,
            player_command: None,
        }
    }
}

impl Config {
    pub fn narrator_settings(&self) -> NarratorSettings {
        NarratorSettings {
            speed: clamp_speed(self.speed),
            volume: clamp_volume(self.volume),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            stall_after_failures: self.stall_after_failures,
        }
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }

    pub fn player(&self) -> Option<PlayerCommand> {
        self.player_command.clone().and_then(PlayerCommand::new)
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = if let Some(pd) = ProjectDirs::from("", "", "readalong") {
            pd.config_dir().join("config.json")
        } else {
            PathBuf::from("readalong_config.json")
        };
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        match fs::read(&self.path) {
            Ok(bytes) => match serde_json::from_slice::<Config>(&bytes) {
                Ok(cfg) => cfg,
                Err(e) => {
                    tracing::warn!(error = %e, path = %self.path.display(), "config_unreadable");
                    Config::default()
                }
            },
            Err(_) => Config::default(),
        }
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)
    }
}
