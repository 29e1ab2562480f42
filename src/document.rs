use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ExtractionError;
use crate::timing::word_count;

/// Readable text of a document, split into paragraphs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentText {
    pub paragraphs: Vec<String>,
    pub word_count: usize,
    pub page_count: usize,
}

impl DocumentText {
    /// Paragraphs are separated by blank lines; whitespace inside one collapses to single spaces.
    pub fn from_pages<S: AsRef<str>>(pages: &[S]) -> Self {
        let paragraphs: Vec<String> = pages
            .iter()
            .flat_map(|page| page.as_ref().split("\n\n"))
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| p.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|p| !p.is_empty())
            .collect();

        let word_count = paragraphs.iter().map(|p| word_count(p)).sum();

        Self {
            paragraphs,
            word_count,
            page_count: pages.len().max(1),
        }
    }

    pub fn from_text(text: &str) -> Self {
        Self::from_pages(&[text])
    }

    /// Full text handed to the synthesizer; tokenizes to the paragraphs' words in order.
    pub fn joined(&self) -> String {
        self.paragraphs.join("\n\n")
    }

    pub fn is_empty(&self) -> bool {
        self.word_count == 0
    }
}

pub fn extract_document(path: &Path) -> Result<DocumentText, ExtractionError> {
    if !path.exists() {
        return Err(ExtractionError::NotFound(path.to_path_buf()));
    }

    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let document = match extension.as_str() {
        "pdf" => {
            let pages = pdf_extract::extract_text_by_pages(path)
                .map_err(|e| ExtractionError::Pdf(format!("{e:?}")))?;
            DocumentText::from_pages(&pages)
        }
        "txt" | "text" | "md" => DocumentText::from_text(&fs::read_to_string(path)?),
        other => return Err(ExtractionError::Unsupported(other.to_string())),
    };

    if document.is_empty() {
        return Err(ExtractionError::NoText(path.to_path_buf()));
    }

    tracing::info!(
        path = %path.display(),
        paragraphs = document.paragraphs.len(),
        words = document.word_count,
        pages = document.page_count,
        "document_extracted"
    );
    Ok(document)
}
