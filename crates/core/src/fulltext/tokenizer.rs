//! Analyzer for full-text columns.
//!
//! Lowercases, splits on non-alphanumeric characters, removes stop words
//! and single-character tokens. Token positions count every emitted token,
//! so position deltas in the posting streams reflect real distances in the
//! analyzed text.

use std::collections::HashSet;
use std::sync::LazyLock;

static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is",
        "it", "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there",
        "these", "they", "this", "to", "was", "will", "with",
    ]
    .into_iter()
    .collect()
});

/// Analyzed text: owns the lowercased buffer, exposes `(token, position)`
/// pairs via byte spans. One heap allocation for the buffer instead of one
/// per token.
pub struct AnalyzedText {
    buffer: String,
    spans: Vec<(u32, u32)>,
}

impl AnalyzedText {
    /// Iterator over `(token, position)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> + '_ {
        self.spans
            .iter()
            .enumerate()
            .map(|(pos, &(s, e))| (&self.buffer[s as usize..e as usize], pos as u32))
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}

/// Analyze `text` into lowercased tokens with positions.
pub fn analyze(text: &str) -> AnalyzedText {
    let buffer = text.to_lowercase();
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;

    for (i, c) in buffer.char_indices() {
        if c.is_alphanumeric() {
            if start.is_none() {
                start = Some(i);
            }
        } else if let Some(s) = start {
            push_span(&buffer, s, i, &mut spans);
            start = None;
        }
    }
    if let Some(s) = start {
        push_span(&buffer, s, buffer.len(), &mut spans);
    }

    AnalyzedText { buffer, spans }
}

fn push_span(buffer: &str, start: usize, end: usize, spans: &mut Vec<(u32, u32)>) {
    let token = &buffer[start..end];
    if token.len() > 1 && !STOP_WORDS.contains(token) {
        spans.push((start as u32, end as u32));
    }
}
