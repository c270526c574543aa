use crate::config::DEFAULT_PREVIEW_CHARS;
use crate::{FinalResult, RerankedCandidate};

pub const TRUNCATION_MARKER: &str = "...";

#[derive(Debug, Clone, Copy)]
pub struct ResultFormatter {
    preview_chars: usize,
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self {
            preview_chars: DEFAULT_PREVIEW_CHARS,
        }
    }
}

impl ResultFormatter {
    pub fn new(preview_chars: usize) -> Self {
        Self { preview_chars }
    }

    pub fn format(&self, ranked: Vec<RerankedCandidate>) -> Vec<FinalResult> {
        ranked
            .into_iter()
            .enumerate()
            .map(|(index, reranked)| {
                let relevance_score = reranked.relevance_score();
                let candidate = reranked.fused.candidate;
                FinalResult {
                    rank: index + 1,
                    content_preview: preview(&candidate.content, self.preview_chars),
                    id: candidate.id,
                    title: candidate.title,
                    full_content: candidate.content,
                    document_type: candidate.document_type,
                    category: candidate.category,
                    source: candidate.source,
                    relevance_score,
                    search_type: candidate.search_type,
                }
            })
            .collect()
    }
}

/// First `max_chars` characters plus a marker, or the text verbatim when it fits.
pub fn preview(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &content[..cut]),
        None => content.to_string(),
    }
}
