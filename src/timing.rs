use std::sync::Arc;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::engine::clamp_speed;
use crate::error::SynthesisError;

/// Average speaking rate at 1.0x
pub const BASE_WORDS_PER_MINUTE: f32 = 150.0;

/// One spoken word and the span of the audio it occupies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordTiming {
    pub word: String,
    pub start_ms: u64,
    pub end_ms: u64,
}

impl WordTiming {
    pub fn new(word: impl Into<String>, start_ms: u64, end_ms: u64) -> Self {
        Self {
            word: word.into(),
            start_ms,
            end_ms,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }
}

/// Words as the synthesizer counts them: runs of whitespace separate, empty tokens dropped.
pub fn tokenize(text: &str) -> impl Iterator<Item = &str> {
    text.split_whitespace()
}

pub fn word_count(text: &str) -> usize {
    tokenize(text).count()
}

/// Lay words back to back at the base speaking rate, longer words taking longer.
pub fn estimate_word_timings(text: &str, speed: f32) -> Vec<WordTiming> {
    let words_per_second = (BASE_WORDS_PER_MINUTE * clamp_speed(speed)) / 60.0;
    let ms_per_word = 1000.0 / words_per_second;

    let mut current_ms = 0u64;
    tokenize(text)
        .map(|word| {
            let length_factor = (word.chars().count() as f32 / 5.0).clamp(0.5, 2.0);
            let duration = (ms_per_word * length_factor) as u64;
            let timing = WordTiming::new(word, current_ms, current_ms + duration);
            current_ms += duration;
            timing
        })
        .collect()
}

/// One generation of word timings for a (text, speed) pair.
///
/// Readers share the words through an `Arc`, so replacing the table never
/// mutates a slice someone else is looking at.
#[derive(Debug, Clone)]
pub struct TimingTable {
    generation: u64,
    speed: f32,
    words: Arc<[WordTiming]>,
}

impl Default for TimingTable {
    fn default() -> Self {
        Self::empty()
    }
}

impl TimingTable {
    pub fn empty() -> Self {
        Self {
            generation: 0,
            speed: 1.0,
            words: Arc::from(Vec::new()),
        }
    }

    /// Validate `words` as produced for `text` and wrap them as a table.
    pub fn for_text(
        generation: u64,
        speed: f32,
        text: &str,
        words: Vec<WordTiming>,
    ) -> Result<Self, SynthesisError> {
        let expected = word_count(text);
        if words.len() != expected {
            return Err(SynthesisError::WordCountMismatch {
                expected,
                actual: words.len(),
            });
        }
        Self::new(generation, speed, words)
    }

    pub fn new(generation: u64, speed: f32, words: Vec<WordTiming>) -> Result<Self, SynthesisError> {
        if let Some(index) = words.iter().position(|w| w.word.trim().is_empty()) {
            return Err(SynthesisError::MalformedTimings {
                index,
                reason: "empty word",
            });
        }
        if let Some(index) = words.iter().position(|w| w.end_ms < w.start_ms) {
            return Err(SynthesisError::MalformedTimings {
                index,
                reason: "ends before it starts",
            });
        }
        if let Some((index, _)) = words
            .iter()
            .tuple_windows()
            .enumerate()
            .find(|(_, (a, b))| b.start_ms < a.start_ms)
        {
            return Err(SynthesisError::MalformedTimings {
                index: index + 1,
                reason: "starts before the previous word",
            });
        }

        Ok(Self {
            generation,
            speed,
            words: Arc::from(words),
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn words(&self) -> &[WordTiming] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&WordTiming> {
        self.words.get(index)
    }

    pub fn last_end_ms(&self) -> Option<u64> {
        self.words.last().map(|w| w.end_ms)
    }
}
