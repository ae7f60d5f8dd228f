//! Split a completion into 2–4 coherent message chunks.
//!
//! The text is broken into progressively finer units (paragraphs, sentences,
//! clauses, words) until there are enough units to fill the target chunk
//! count, then the units are packed in order into chunks of roughly equal
//! length.  Each chunk is a trimmed slice of the original text, so line breaks
//! and punctuation inside a chunk survive untouched.

use std::ops::Range;

use regex::Regex;

use crate::error::HumanizeError;

pub const MIN_CHUNKS: usize = 2;
pub const MAX_CHUNKS: usize = 4;

/// Characters of completion per chunk before another chunk is warranted.
const CHARS_PER_CHUNK: usize = 140;

#[derive(Debug, Clone)]
pub struct Chunker {
    paragraph: Regex,
    sentence: Regex,
    clause: Regex,
    word: Regex,
}

impl Chunker {
    pub fn new() -> Result<Self, HumanizeError> {
        Ok(Self {
            paragraph: Regex::new(r"\n[ \t]*\n\s*")?,
            sentence: Regex::new(r#"[.!?…]+["'”’)\]]*\s+"#)?,
            clause: Regex::new(r"[,;:—–]\s+")?,
            word: Regex::new(r"\s+")?,
        })
    }

    /// Number of chunks a completion of `chars` characters should become.
    pub fn target_chunks(chars: usize) -> usize {
        chars.div_ceil(CHARS_PER_CHUNK).clamp(MIN_CHUNKS, MAX_CHUNKS)
    }

    pub fn split(&self, text: &str) -> Result<Vec<String>, HumanizeError> {
        let Some(whole) = trim_range(text, 0..text.len()) else {
            return Err(HumanizeError::EmptyCompletion);
        };
        let chars = text[whole.clone()].chars().count();
        if chars < MIN_CHUNKS {
            return Err(HumanizeError::CompletionTooShort { chars });
        }
        let target = Self::target_chunks(chars);

        // Paragraph and sentence boundaries keep their trailing punctuation
        // with the preceding unit; word boundaries drop the whitespace.
        let levels: [(&Regex, bool); 4] = [
            (&self.paragraph, false),
            (&self.sentence, true),
            (&self.clause, true),
            (&self.word, false),
        ];
        let mut units = vec![whole];
        for (pattern, keep_delimiter) in levels {
            if units.len() >= target {
                break;
            }
            units = units
                .into_iter()
                .flat_map(|range| split_range(text, range, pattern, keep_delimiter))
                .collect();
        }
        if units.len() < MIN_CHUNKS {
            // A single unbroken token: cut it at the character midpoint.
            units = units
                .into_iter()
                .flat_map(|range| halve_range(text, range))
                .collect();
        }

        Ok(pack(text, &units, target))
    }
}

/// Convenience wrapper that compiles a [`Chunker`] for a one-off split.
pub fn chunk_text(text: &str) -> Result<Vec<String>, HumanizeError> {
    Chunker::new()?.split(text)
}

fn trim_range(text: &str, range: Range<usize>) -> Option<Range<usize>> {
    let piece = &text[range.clone()];
    let lead = piece.len() - piece.trim_start().len();
    let trail = piece.len() - piece.trim_end().len();
    let start = range.start + lead;
    let end = range.end - trail;
    (start < end).then_some(start..end)
}

fn split_range(
    text: &str,
    range: Range<usize>,
    pattern: &Regex,
    keep_delimiter: bool,
) -> Vec<Range<usize>> {
    let slice = &text[range.clone()];
    let mut pieces = Vec::new();
    let mut last = 0;
    for m in pattern.find_iter(slice) {
        let end = if keep_delimiter { m.end() } else { m.start() };
        pieces.push(range.start + last..range.start + end);
        last = m.end();
    }
    pieces.push(range.start + last..range.end);
    pieces
        .into_iter()
        .filter_map(|piece| trim_range(text, piece))
        .collect()
}

fn halve_range(text: &str, range: Range<usize>) -> Vec<Range<usize>> {
    let slice = &text[range.clone()];
    let count = slice.chars().count();
    match slice.char_indices().nth(count / 2) {
        Some((mid, _)) if mid > 0 => vec![range.start..range.start + mid, range.start + mid..range.end],
        _ => vec![range],
    }
}

/// Pack ordered units into `min(target, units.len())` chunks.
///
/// A chunk is closed once the running character count reaches its share of
/// the total, or when exactly one unit per outstanding chunk remains.
fn pack(text: &str, units: &[Range<usize>], target: usize) -> Vec<String> {
    let chunk_count = target.min(units.len());
    let lengths: Vec<usize> = units.iter().map(|r| text[r.clone()].chars().count()).collect();
    let total: usize = lengths.iter().sum();

    let mut chunks = Vec::with_capacity(chunk_count);
    let mut start: Option<usize> = None;
    let mut consumed = 0;
    for (i, unit) in units.iter().enumerate() {
        if start.is_none() {
            start = Some(unit.start);
        }
        consumed += lengths[i];

        let open_after = chunk_count - chunks.len() - 1;
        let units_left = units.len() - i - 1;
        let share_reached = consumed * chunk_count >= total * (chunks.len() + 1);
        if open_after > 0 && (share_reached || units_left == open_after) {
            if let Some(from) = start.take() {
                chunks.push(text[from..unit.end].to_string());
            }
        }
    }
    if let (Some(from), Some(last)) = (start, units.last()) {
        chunks.push(text[from..last.end].to_string());
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker() -> Chunker {
        Chunker::new().unwrap()
    }

    #[test]
    fn short_reply_still_becomes_two_messages() {
        let chunks = chunker().split("Sounds good! See you then.").unwrap();
        assert_eq!(chunks, vec!["Sounds good!", "See you then."]);
    }

    #[test]
    fn single_word_is_split_in_half() {
        let chunks = chunker().split("okay").unwrap();
        assert_eq!(chunks, vec!["ok", "ay"]);
    }

    #[test]
    fn two_characters_is_the_minimum() {
        assert_eq!(chunker().split("ok").unwrap(), vec!["o", "k"]);
        assert!(matches!(
            chunker().split(" k "),
            Err(HumanizeError::CompletionTooShort { chars: 1 })
        ));
        assert!(matches!(chunker().split("  \n "), Err(HumanizeError::EmptyCompletion)));
    }

    #[test]
    fn paragraphs_are_preferred_boundaries() {
        let text = "First thought about the trip.\n\nSecond thought, a bit longer than the first one.";
        let chunks = chunker().split(text).unwrap();
        assert_eq!(
            chunks,
            vec![
                "First thought about the trip.",
                "Second thought, a bit longer than the first one."
            ]
        );
    }

    #[test]
    fn long_text_never_exceeds_four_chunks() {
        let sentence = "This is one sentence of a rather long answer that keeps going. ";
        let text = sentence.repeat(30);
        let chunks = chunker().split(&text).unwrap();
        assert_eq!(chunks.len(), MAX_CHUNKS);
        let joined: usize = chunks.iter().map(|c| c.split_whitespace().count()).sum();
        assert_eq!(joined, text.split_whitespace().count());
    }

    #[test]
    fn chunk_count_is_always_in_range() {
        let samples = [
            "hi there",
            "Yes.",
            "a,b",
            "Honestly? I think you should go. It sounds like a great opportunity, and you have been wanting a change for ages.",
            "no punctuation at all just a long run of words that goes on for quite some time without any sentence break whatsoever and then some more words to push it past the first chunk size threshold easily",
        ];
        for sample in samples {
            let chunks = chunker().split(sample).unwrap();
            assert!(
                (MIN_CHUNKS..=MAX_CHUNKS).contains(&chunks.len()),
                "{sample:?} gave {} chunks",
                chunks.len()
            );
            assert!(chunks.iter().all(|c| !c.trim().is_empty()));
        }
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let chunks = chunker().split("héllo").unwrap();
        assert_eq!(chunks.concat(), "héllo");
        assert_eq!(chunks.len(), 2);
    }
}
