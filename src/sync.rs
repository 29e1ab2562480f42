use crate::timing::WordTiming;

/// Index of the word being spoken at `position_ms`.
///
/// The last word whose start is at or before the position wins, so tied starts
/// and zero-length words resolve to the later entry. A position before the
/// first word maps to word 0. `timings` must be ordered by `start_ms`, which
/// `TimingTable` guarantees.
pub fn current_word_index(position_ms: u64, timings: &[WordTiming]) -> Option<usize> {
    if timings.is_empty() {
        return None;
    }
    let started = timings.partition_point(|w| w.start_ms <= position_ms);
    Some(started.saturating_sub(1))
}

/// How a word relates to the one being spoken
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum WordState {
    Past,
    Current,
    Upcoming,
}

pub fn word_state(index: usize, current: Option<usize>) -> WordState {
    match current {
        Some(c) if index < c => WordState::Past,
        Some(c) if index == c => WordState::Current,
        _ => WordState::Upcoming,
    }
}
