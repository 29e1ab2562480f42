use std::sync::Arc;

use crate::document::DocumentText;
use crate::engine::{clamp_speed, clamp_volume, AudioHandle};
use crate::error::{SessionError, SynthesisError};
use crate::poller::PlaybackSnapshot;
use crate::timing::{TimingTable, WordTiming};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum PlaybackState {
    Idle,
    Preparing,
    Ready,
    Playing,
    Paused,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    /// Audio and timings for a freshly loaded document
    Full,
    /// New timings for the loaded audio after a speed change
    TimingsOnly,
}

/// Work the session wants done by the synthesizer
#[derive(Debug, Clone)]
pub struct TimingRequest {
    pub generation: u64,
    pub kind: Acquisition,
    pub text: Arc<str>,
    pub speed: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum NoticeLevel {
    Warning,
    Error,
}

/// Dismissible message for the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// What applying a poll snapshot did to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOutcome {
    /// Not playing, so the snapshot says nothing new
    Ignored,
    Advanced,
    Paused,
    Finished,
}

#[derive(Debug, Clone)]
struct Loaded {
    document: DocumentText,
    text: Arc<str>,
}

/// Single owner of playback state; every mutation is one transition.
#[derive(Debug, Clone)]
pub struct Session {
    loaded: Option<Loaded>,
    table: TimingTable,
    audio: Option<AudioHandle>,
    duration_ms: u64,
    state: PlaybackState,
    position_ms: u64,
    speed: f32,
    volume: f32,
    // Latest generation handed out; responses for older ones are stale
    generation: u64,
    notice: Option<Notice>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(1.0, 1.0)
    }
}

impl Session {
    pub fn new(speed: f32, volume: f32) -> Self {
        Self {
            loaded: None,
            table: TimingTable::empty(),
            audio: None,
            duration_ms: 0,
            state: PlaybackState::Idle,
            position_ms: 0,
            speed: clamp_speed(speed),
            volume: clamp_volume(volume),
            generation: 0,
            notice: None,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn document(&self) -> Option<&DocumentText> {
        self.loaded.as_ref().map(|l| &l.document)
    }

    pub fn text(&self) -> Option<&str> {
        self.loaded.as_ref().map(|l| &*l.text)
    }

    pub fn table(&self) -> &TimingTable {
        &self.table
    }

    pub fn audio(&self) -> Option<&AudioHandle> {
        self.audio.as_ref()
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn position_ms(&self) -> u64 {
        self.position_ms
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn set_notice(&mut self, notice: Notice) {
        self.notice = Some(notice);
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    /// True while `generation` is the newest request handed out.
    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    fn next_request(&mut self, kind: Acquisition) -> Option<TimingRequest> {
        let text = self.loaded.as_ref()?.text.clone();
        self.generation += 1;
        Some(TimingRequest {
            generation: self.generation,
            kind,
            text,
            speed: self.speed,
        })
    }

    /// Start preparing `document`; any previous table, position and notice are dropped.
    pub fn load(&mut self, document: DocumentText) -> TimingRequest {
        let text: Arc<str> = Arc::from(document.joined());
        self.reset_playback();
        self.notice = None;
        self.loaded = Some(Loaded {
            document,
            text: text.clone(),
        });
        self.state = PlaybackState::Preparing;
        self.generation += 1;
        TimingRequest {
            generation: self.generation,
            kind: Acquisition::Full,
            text,
            speed: self.speed,
        }
    }

    /// Ask again for a document whose preparation failed.
    pub fn retry(&mut self) -> Result<TimingRequest, SessionError> {
        if self.state != PlaybackState::Idle {
            return Err(self.invalid("retry"));
        }
        let document = self
            .loaded
            .as_ref()
            .map(|l| l.document.clone())
            .ok_or(SessionError::NoDocument)?;
        Ok(self.load(document))
    }

    /// Install a prepared table. Returns false when the response is stale.
    pub fn finish_load(
        &mut self,
        generation: u64,
        table: TimingTable,
        audio: AudioHandle,
        duration_ms: u64,
    ) -> bool {
        if !self.is_current(generation) || self.state != PlaybackState::Preparing {
            return false;
        }
        self.table = table;
        self.audio = Some(audio);
        self.duration_ms = duration_ms;
        self.position_ms = 0;
        self.state = PlaybackState::Ready;
        true
    }

    /// Preparation failed: back to idle, document kept for a retry.
    pub fn fail_load(&mut self, generation: u64, error: &SessionError) -> bool {
        if !self.is_current(generation) || self.state != PlaybackState::Preparing {
            return false;
        }
        self.reset_playback();
        self.state = PlaybackState::Idle;
        self.notice = Some(Notice::error(error.to_string()));
        true
    }

    /// Request timings at the session's speed when the installed table was made at another.
    pub fn follow_up_request(&mut self) -> Option<TimingRequest> {
        if self.table.is_empty() || self.table.speed() == self.speed {
            return None;
        }
        self.next_request(Acquisition::TimingsOnly)
    }

    /// Record a new speed and, when there is a table to replace, ask for one at that speed.
    pub fn change_speed(&mut self, speed: f32) -> Option<TimingRequest> {
        self.speed = clamp_speed(speed);
        match self.state {
            PlaybackState::Ready
            | PlaybackState::Playing
            | PlaybackState::Paused
            | PlaybackState::Finished => self.next_request(Acquisition::TimingsOnly),
            // Preparing picks the speed up once the load lands; Idle has nothing to refresh
            PlaybackState::Idle | PlaybackState::Preparing => None,
        }
    }

    /// Swap in timings for the current speed, leaving position and play state alone.
    pub fn finish_speed_change(
        &mut self,
        generation: u64,
        result: Result<Vec<WordTiming>, SynthesisError>,
    ) -> Result<bool, SessionError> {
        if !self.is_current(generation) {
            return Ok(false);
        }
        let Some(text) = self.text() else {
            return Ok(false);
        };

        match result.and_then(|words| TimingTable::for_text(generation, self.speed, text, words)) {
            Ok(table) => {
                self.table = table;
                Ok(true)
            }
            Err(e) => {
                self.notice = Some(Notice::warning(format!(
                    "{e}; highlighting still follows the {:.2}x timings",
                    self.table.speed()
                )));
                Err(e.into())
            }
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = clamp_volume(volume);
    }

    /// Enter Playing. Replaying a finished document starts over from 0.
    pub fn mark_playing(&mut self) -> Result<(), SessionError> {
        match self.state {
            PlaybackState::Ready | PlaybackState::Paused => {}
            PlaybackState::Finished => self.position_ms = 0,
            _ => return Err(self.invalid("play")),
        }
        self.state = PlaybackState::Playing;
        Ok(())
    }

    pub fn mark_paused(&mut self) -> Result<(), SessionError> {
        if self.state != PlaybackState::Playing {
            return Err(self.invalid("pause"));
        }
        self.state = PlaybackState::Paused;
        Ok(())
    }

    /// Check that `play` is allowed right now without changing anything.
    pub fn can_play(&self) -> Result<(), SessionError> {
        match self.state {
            PlaybackState::Ready | PlaybackState::Paused | PlaybackState::Finished => Ok(()),
            _ => Err(self.invalid("play")),
        }
    }

    /// Fold one poll result into the session; a finished report wins over is_playing.
    pub fn apply_snapshot(&mut self, snapshot: PlaybackSnapshot) -> SnapshotOutcome {
        if self.state != PlaybackState::Playing {
            return SnapshotOutcome::Ignored;
        }
        if snapshot.finished {
            self.position_ms = self.table.last_end_ms().unwrap_or(snapshot.position_ms);
            self.state = PlaybackState::Finished;
            return SnapshotOutcome::Finished;
        }
        self.position_ms = snapshot.position_ms;
        if !snapshot.is_playing {
            self.state = PlaybackState::Paused;
            return SnapshotOutcome::Paused;
        }
        SnapshotOutcome::Advanced
    }

    /// Forget the document. Outstanding responses become stale.
    pub fn clear(&mut self) {
        self.reset_playback();
        self.loaded = None;
        self.notice = None;
        self.state = PlaybackState::Idle;
        self.generation += 1;
    }

    fn reset_playback(&mut self) {
        self.table = TimingTable::empty();
        self.audio = None;
        self.duration_ms = 0;
        self.position_ms = 0;
    }

    fn invalid(&self, action: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            from: self.state,
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::estimate_word_timings;
    use assert_matches::assert_matches;

    fn doc(text: &str) -> DocumentText {
        DocumentText::from_text(text)
    }

    fn ready(session: &mut Session, text: &str) -> u64 {
        let request = session.load(doc(text));
        let words = estimate_word_timings(text, request.speed);
        let table = TimingTable::for_text(request.generation, request.speed, text, words).unwrap();
        let duration = table.last_end_ms().unwrap();
        assert!(session.finish_load(request.generation, table, AudioHandle::silent(), duration));
        request.generation
    }

    fn snapshot(position_ms: u64, is_playing: bool, finished: bool) -> PlaybackSnapshot {
        PlaybackSnapshot {
            position_ms,
            is_playing,
            finished,
        }
    }

    #[test]
    fn load_moves_to_preparing_with_full_request() {
        let mut session = Session::default();
        let request = session.load(doc("the quick  brown\n\nfox"));

        assert_eq!(session.state(), PlaybackState::Preparing);
        assert_eq!(request.kind, Acquisition::Full);
        assert_eq!(request.generation, session.generation());
        assert_eq!(request.speed, 1.0);
        assert_eq!(&*request.text, "the quick brown\n\nfox");
    }

    #[test]
    fn finish_load_enters_ready_at_zero() {
        let mut session = Session::default();
        ready(&mut session, "the quick brown fox");

        assert_eq!(session.state(), PlaybackState::Ready);
        assert_eq!(session.position_ms(), 0);
        assert_eq!(session.table().len(), 4);
        assert!(!session.is_playing());
    }

    #[test]
    fn failed_load_keeps_document_and_allows_retry() {
        let mut session = Session::default();
        let request = session.load(doc("hello world"));
        let error = SessionError::from(SynthesisError::EmptyText);

        assert!(session.fail_load(request.generation, &error));
        assert_eq!(session.state(), PlaybackState::Idle);
        assert_eq!(session.notice().unwrap().level, NoticeLevel::Error);
        assert_eq!(session.text(), Some("hello world"));

        let retry = session.retry().unwrap();
        assert!(retry.generation > request.generation);
        assert_eq!(session.state(), PlaybackState::Preparing);
        assert!(session.notice().is_none());
    }

    #[test]
    fn stale_load_is_discarded_after_clear() {
        let mut session = Session::default();
        let request = session.load(doc("hello world"));
        session.clear();

        let table = TimingTable::empty();
        assert!(!session.finish_load(request.generation, table, AudioHandle::silent(), 0));
        assert_eq!(session.state(), PlaybackState::Idle);
        assert!(session.document().is_none());
    }

    #[test]
    fn play_pause_cycle() {
        let mut session = Session::default();
        ready(&mut session, "one two three");

        session.mark_playing().unwrap();
        assert!(session.is_playing());
        session.mark_paused().unwrap();
        assert_eq!(session.state(), PlaybackState::Paused);
        assert_matches!(
            session.mark_paused(),
            Err(SessionError::InvalidTransition {
                from: PlaybackState::Paused,
                action: "pause"
            })
        );
    }

    #[test]
    fn cannot_play_while_preparing() {
        let mut session = Session::default();
        session.load(doc("one two"));
        assert_matches!(session.can_play(), Err(SessionError::InvalidTransition { .. }));
        assert_matches!(session.mark_playing(), Err(SessionError::InvalidTransition { .. }));
    }

    #[test]
    fn finished_snapshot_wins_over_is_playing() {
        let mut session = Session::default();
        ready(&mut session, "one two three");
        session.mark_playing().unwrap();

        let outcome = session.apply_snapshot(snapshot(500, true, true));
        assert_eq!(outcome, SnapshotOutcome::Finished);
        assert_eq!(session.state(), PlaybackState::Finished);
        assert_eq!(session.position_ms(), session.table().last_end_ms().unwrap());
    }

    #[test]
    fn engine_reporting_stopped_reconciles_to_paused() {
        let mut session = Session::default();
        ready(&mut session, "one two three");
        session.mark_playing().unwrap();

        assert_eq!(
            session.apply_snapshot(snapshot(120, false, false)),
            SnapshotOutcome::Paused
        );
        assert_eq!(session.position_ms(), 120);
    }

    #[test]
    fn snapshots_are_ignored_unless_playing() {
        let mut session = Session::default();
        ready(&mut session, "one two three");
        assert_eq!(
            session.apply_snapshot(snapshot(300, true, false)),
            SnapshotOutcome::Ignored
        );
        assert_eq!(session.position_ms(), 0);
    }

    #[test]
    fn replay_after_finish_restarts_from_zero() {
        let mut session = Session::default();
        ready(&mut session, "one two");
        session.mark_playing().unwrap();
        session.apply_snapshot(snapshot(10_000, false, true));

        session.mark_playing().unwrap();
        assert_eq!(session.position_ms(), 0);
        assert!(session.is_playing());
    }

    #[test]
    fn speed_change_swaps_table_and_keeps_play_state() {
        let mut session = Session::default();
        let text = "the quick brown fox";
        ready(&mut session, text);
        session.mark_playing().unwrap();
        session.apply_snapshot(snapshot(600, true, false));

        let request = session.change_speed(1.5).unwrap();
        assert_eq!(request.kind, Acquisition::TimingsOnly);
        assert_eq!(request.speed, 1.5);

        let swapped = session
            .finish_speed_change(request.generation, Ok(estimate_word_timings(text, 1.5)))
            .unwrap();
        assert!(swapped);
        assert_eq!(session.table().speed(), 1.5);
        assert_eq!(session.table().generation(), request.generation);
        assert!(session.is_playing());
        assert_eq!(session.position_ms(), 600);
    }

    #[test]
    fn superseded_speed_change_is_discarded() {
        let mut session = Session::default();
        let text = "the quick brown fox";
        ready(&mut session, text);

        let first = session.change_speed(1.5).unwrap();
        let second = session.change_speed(2.0).unwrap();

        let late = session
            .finish_speed_change(first.generation, Ok(estimate_word_timings(text, 1.5)))
            .unwrap();
        assert!(!late);
        assert_eq!(session.table().speed(), 1.0);

        assert!(session
            .finish_speed_change(second.generation, Ok(estimate_word_timings(text, 2.0)))
            .unwrap());
        assert_eq!(session.table().speed(), 2.0);
    }

    #[test]
    fn failed_speed_change_keeps_old_table_and_new_speed() {
        let mut session = Session::default();
        let text = "the quick brown fox";
        ready(&mut session, text);
        let before = session.table().clone();

        let request = session.change_speed(1.5).unwrap();
        let result =
            session.finish_speed_change(request.generation, Ok(estimate_word_timings("the fox", 1.5)));

        assert_matches!(
            result,
            Err(SessionError::Synthesis(SynthesisError::WordCountMismatch { .. }))
        );
        assert_eq!(session.table().words(), before.words());
        assert_eq!(session.speed(), 1.5);
        assert_eq!(session.notice().unwrap().level, NoticeLevel::Warning);
    }

    #[test]
    fn speed_change_while_preparing_follows_up_after_load() {
        let mut session = Session::default();
        let text = "one two three";
        let request = session.load(doc(text));
        assert!(session.change_speed(1.25).is_none());

        // The load was requested at 1.0
        let table = TimingTable::for_text(
            request.generation,
            request.speed,
            text,
            estimate_word_timings(text, request.speed),
        )
        .unwrap();
        assert!(session.finish_load(request.generation, table, AudioHandle::silent(), 1000));

        let follow_up = session.follow_up_request().unwrap();
        assert_eq!(follow_up.kind, Acquisition::TimingsOnly);
        assert_eq!(follow_up.speed, 1.25);
    }

    #[test]
    fn speed_change_in_idle_is_remembered() {
        let mut session = Session::default();
        assert!(session.change_speed(0.1).is_none());
        assert_eq!(session.speed(), 0.5);
        let request = session.load(doc("hi there"));
        assert_eq!(request.speed, 0.5);
    }

    #[test]
    fn clear_discards_everything_but_preferences() {
        let mut session = Session::new(1.5, 0.4);
        ready(&mut session, "one two");
        session.mark_playing().unwrap();
        session.clear();

        assert_eq!(session.state(), PlaybackState::Idle);
        assert!(session.document().is_none());
        assert!(session.table().is_empty());
        assert_eq!(session.position_ms(), 0);
        assert_eq!(session.speed(), 1.5);
        assert_eq!(session.volume(), 0.4);
        assert_matches!(session.retry(), Err(SessionError::NoDocument));
    }
}
