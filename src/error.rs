use std::path::PathBuf;

use crate::session::PlaybackState;

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("unsupported document type: {0}")]
    Unsupported(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("PDF extraction error: {0}")]
    Pdf(String),
    #[error("no readable text in {}", .0.display())]
    NoText(PathBuf),
}

#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("speech engine not installed (looked for {})", .0.display())]
    EngineNotInstalled(PathBuf),
    #[error("nothing to synthesize")]
    EmptyText,
    #[error("failed to run speech engine: {0}")]
    Io(#[from] std::io::Error),
    #[error("speech engine failed: {0}")]
    Failed(String),
    #[error("timing table has {actual} words, text has {expected}")]
    WordCountMismatch { expected: usize, actual: usize },
    #[error("malformed timing at word {index}: {reason}")]
    MalformedTimings { index: usize, reason: &'static str },
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("audio engine unreachable")]
    Unreachable,
    #[error("audio engine did not answer {0} in time")]
    Timeout(&'static str),
    #[error("audio engine rejected {command}: {reason}")]
    Rejected {
        command: &'static str,
        reason: String,
    },
    #[error("audio player failed: {0}")]
    Player(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no document loaded")]
    NoDocument,
    #[error("cannot {action} while {from}")]
    InvalidTransition {
        from: PlaybackState,
        action: &'static str,
    },
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}
