// Library surface for headless/integration tests and reuse.
// Keep this lean to avoid coupling to bin-only types in main.rs.
pub mod app_dirs;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod layout;
pub mod logging;
pub mod narrator;
pub mod poller;
pub mod runtime;
pub mod scroll;
pub mod session;
pub mod sync;
pub mod synth;
pub mod timing;

pub use narrator::{Narrator, NarratorSettings};
pub use session::PlaybackState;
