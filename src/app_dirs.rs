use directories::ProjectDirs;
use std::path::PathBuf;

pub const DEFAULT_VOICE: &str = "en_US-amy-medium.onnx";

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    pub fn state_dir() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            Some(
                PathBuf::from(home)
                    .join(".local")
                    .join("state")
                    .join("readalong"),
            )
        } else {
            ProjectDirs::from("", "", "readalong")
                .map(|proj_dirs| proj_dirs.data_local_dir().to_path_buf())
        }
    }

    pub fn log_path() -> Option<PathBuf> {
        Self::state_dir().map(|dir| dir.join("readalong.log"))
    }

    /// Where the synthesizer writes the current document's audio
    pub fn audio_path() -> PathBuf {
        Self::state_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("narration.wav")
    }

    pub fn default_voice_model() -> Option<PathBuf> {
        ProjectDirs::from("", "", "readalong")
            .map(|proj_dirs| proj_dirs.data_dir().join("voices").join(DEFAULT_VOICE))
    }
}
