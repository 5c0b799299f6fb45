//! Display smoothing for streamed text.
//!
//! Provider deltas arrive in irregular bursts. [`ChunkBuffer`] re-splits them
//! into characters, words or sentences so a UI can reveal text at a steady
//! pace.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Unit text is released in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingStrategy {
    Character,
    #[default]
    Word,
    Sentence,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SmoothingOptions {
    pub enabled: bool,
    pub strategy: ChunkingStrategy,
    /// Pause between released chunks.
    pub delay: Duration,
}

impl Default for SmoothingOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            strategy: ChunkingStrategy::Word,
            delay: Duration::from_millis(30),
        }
    }
}

impl SmoothingOptions {
    pub fn enabled(strategy: ChunkingStrategy, delay: Duration) -> Self {
        Self {
            enabled: true,
            strategy,
            delay,
        }
    }
}

/// Buffers text and releases it in whole display units.
///
/// A unit includes its trailing whitespace, so concatenating everything
/// `push` and `flush` return reproduces the input exactly.
#[derive(Debug, Default)]
pub struct ChunkBuffer {
    strategy: ChunkingStrategy,
    pending: String,
}

impl ChunkBuffer {
    pub fn new(strategy: ChunkingStrategy) -> Self {
        Self {
            strategy,
            pending: String::new(),
        }
    }

    /// Add a delta and return every unit it completes.
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        self.pending.push_str(delta);
        let mut out = Vec::new();
        while let Some(end) = self.next_boundary() {
            let rest = self.pending.split_off(end);
            out.push(std::mem::replace(&mut self.pending, rest));
        }
        out
    }

    /// Release whatever is left.
    pub fn flush(&mut self) -> Option<String> {
        (!self.pending.is_empty()).then(|| std::mem::take(&mut self.pending))
    }

    /// Byte offset just past the first complete unit.
    fn next_boundary(&self) -> Option<usize> {
        let text = self.pending.as_str();
        match self.strategy {
            ChunkingStrategy::Character => text.chars().next().map(char::len_utf8),
            ChunkingStrategy::Word => {
                let start = text.find(|c: char| !c.is_whitespace())?;
                let word_end = start + text[start..].find(char::is_whitespace)?;
                // Trailing whitespace must be followed by something to be known complete.
                let next = text[word_end..].find(|c: char| !c.is_whitespace())?;
                Some(word_end + next)
            }
            ChunkingStrategy::Sentence => {
                let mut chars = text.char_indices().peekable();
                while let Some((i, c)) = chars.next() {
                    if c == '\n' {
                        return Some(i + 1);
                    }
                    if matches!(c, '.' | '!' | '?')
                        && let Some(&(j, next)) = chars.peek()
                        && next.is_whitespace()
                    {
                        return Some(j + next.len_utf8());
                    }
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(strategy: ChunkingStrategy, deltas: &[&str]) -> Vec<String> {
        let mut buffer = ChunkBuffer::new(strategy);
        let mut out: Vec<String> = deltas.iter().flat_map(|d| buffer.push(d)).collect();
        out.extend(buffer.flush());
        out
    }

    #[test]
    fn test_character_chunks() {
        assert_eq!(run(ChunkingStrategy::Character, &["hé", "y"]), vec!["h", "é", "y"]);
    }

    #[test]
    fn test_word_chunks_across_deltas() {
        let out = run(ChunkingStrategy::Word, &["Hel", "lo wo", "rld  and", " more"]);
        assert_eq!(out, vec!["Hello ", "world  ", "and ", "more"]);
        assert_eq!(out.concat(), "Hello world  and more");
    }

    #[test]
    fn test_word_waits_for_next_word() {
        let mut buffer = ChunkBuffer::new(ChunkingStrategy::Word);
        assert!(buffer.push("Hello ").is_empty());
        assert_eq!(buffer.push("w"), vec!["Hello "]);
        assert_eq!(buffer.flush().as_deref(), Some("w"));
        assert_eq!(buffer.flush(), None);
    }

    #[test]
    fn test_sentence_chunks() {
        let out = run(ChunkingStrategy::Sentence, &["One. Tw", "o? 3.5 is", " fine\nEnd"]);
        assert_eq!(out, vec!["One. ", "Two? ", "3.5 is fine\n", "End"]);
    }
}
