use unicode_width::UnicodeWidthStr;

use crate::scroll::WordLayout;
use crate::timing::tokenize;

/// Paragraphs wrapped to a width, with the row of every word recorded.
///
/// Word indices count tokens across all paragraphs in order, which is the
/// same numbering the timing table uses for the joined text.
#[derive(Debug, Clone, Default)]
pub struct TextLayout {
    words: Vec<String>,
    // Word indices per row; an empty row separates paragraphs
    rows: Vec<Vec<usize>>,
    word_rows: Vec<usize>,
    width: usize,
}

impl TextLayout {
    pub fn new<S: AsRef<str>>(paragraphs: &[S], width: usize) -> Self {
        let width = width.max(1);
        let mut layout = Self {
            width,
            ..Self::default()
        };

        for (p, paragraph) in paragraphs.iter().enumerate() {
            if p > 0 {
                layout.rows.push(Vec::new());
            }
            let mut row: Vec<usize> = Vec::new();
            let mut row_width = 0;

            for word in tokenize(paragraph.as_ref()) {
                let word_width = word.width();
                if !row.is_empty() && row_width + 1 + word_width > width {
                    layout.rows.push(std::mem::take(&mut row));
                    row_width = 0;
                }
                row_width += if row.is_empty() { word_width } else { 1 + word_width };

                let index = layout.words.len();
                layout.words.push(word.to_string());
                layout.word_rows.push(layout.rows.len());
                row.push(index);
            }
            if !row.is_empty() {
                layout.rows.push(row);
            }
        }

        layout
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn rows(&self) -> &[Vec<usize>] {
        &self.rows
    }

    pub fn word(&self, index: usize) -> Option<&str> {
        self.words.get(index).map(String::as_str)
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }
}

impl WordLayout for TextLayout {
    fn row_of(&self, index: usize) -> Option<usize> {
        self.word_rows.get(index).copied()
    }

    fn row_count(&self) -> usize {
        self.rows.len()
    }
}
