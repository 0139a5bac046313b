//! Splitting of arbitrary-length text into bounded-size chunks.
//!
//! Lengths are counted in Unicode scalar values, not bytes, so Cyrillic or
//! CJK input gets the same budget as ASCII.

use serde::{Deserialize, Serialize};

/// Default upper bound on chunk length, in characters.
pub const DEFAULT_MAX_CHUNK_LENGTH: usize = 180;

/// Separator table searched inside each window. Higher priority wins; on a
/// tie the rightmost position wins.
const SEPARATORS: &[(&str, u8)] = &[
    ("\n\n", 2),
    ("\n", 2),
    (". ", 1),
    ("! ", 1),
    ("? ", 1),
    ("; ", 1),
    (": ", 1),
    (", ", 0),
    (" - ", 0),
    (" \u{2013} ", 0),
    (" \u{2014} ", 0),
    (" ", 0),
];

/// A bounded-length slice of the original text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    /// Position of the chunk in the original text.
    pub index: usize,
    pub text: String,
    /// Length of `text` in characters.
    pub length: usize,
}

/// Result of chunking without synthesis, useful to estimate cost up front.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPreview {
    pub original_length: usize,
    pub num_chunks: usize,
    pub chunks: Vec<TextChunk>,
}

/// Split `text` into ordered chunks of at most `max_length` characters.
///
/// Blank lines are dropped and consecutive lines are packed together while
/// they fit. Input without any non-blank content yields an empty vector.
/// A `max_length` of zero is treated as one.
pub fn split(text: &str, max_length: usize) -> Vec<TextChunk> {
    let max_length = max_length.max(1);
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for line in text.split('\n') {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let line_len = line.chars().count();

        if !current.is_empty() && current_len + line_len + 1 > max_length {
            pieces.extend(split_buffer(&current, max_length));
            current.clear();
            current.push_str(line);
            current_len = line_len;
        } else {
            if !current.is_empty() {
                current.push('\n');
                current_len += 1;
            }
            current.push_str(line);
            current_len += line_len;
        }
    }

    if !current.is_empty() {
        pieces.extend(split_buffer(&current, max_length));
    }

    pieces
        .into_iter()
        .enumerate()
        .map(|(index, text)| TextChunk {
            index,
            length: text.chars().count(),
            text,
        })
        .collect()
}

/// Chunk `text` and report what a synthesis request would send.
pub fn preview(text: &str, max_length: usize) -> ChunkPreview {
    let chunks = split(text, max_length);
    ChunkPreview {
        original_length: text.trim().chars().count(),
        num_chunks: chunks.len(),
        chunks,
    }
}

/// Flush one accumulated buffer, cutting it at the best separator of each
/// `max_length` window when it does not fit whole.
fn split_buffer(text: &str, max_length: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_length {
        return vec![text.to_string()];
    }

    let mut out = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let end = start + max_length;
        if end >= chars.len() {
            push_trimmed(&mut out, &chars[start..]);
            break;
        }

        let cut = best_cut(&chars, start, end)
            .unwrap_or_else(|| fallback_cut(&chars, start, end));
        push_trimmed(&mut out, &chars[start..=cut]);

        start = cut + 1;
        while start < chars.len() && chars[start].is_whitespace() {
            start += 1;
        }
    }

    out
}

/// Highest-priority separator strictly after `start` that lies entirely in
/// `chars[start..end]`.
fn best_cut(chars: &[char], start: usize, end: usize) -> Option<usize> {
    let mut best: Option<(u8, usize)> = None;
    for &(sep, priority) in SEPARATORS {
        let sep: Vec<char> = sep.chars().collect();
        let Some(pos) = rfind(chars, &sep, start, end) else {
            continue;
        };
        if pos <= start {
            continue;
        }
        let better = match best {
            None => true,
            Some((p, at)) => priority > p || (priority == p && pos > at),
        };
        if better {
            best = Some((priority, pos));
        }
    }
    best.map(|(_, pos)| pos)
}

/// First space at or after the window midpoint, else a hard cut at the
/// window's last character.
fn fallback_cut(chars: &[char], start: usize, end: usize) -> usize {
    let mid = start + (end - start) / 2;
    chars[mid..end]
        .iter()
        .position(|&c| c == ' ')
        .map(|p| mid + p)
        .unwrap_or(end - 1)
}

/// Rightmost occurrence of `needle` fully contained in `hay[start..end]`.
fn rfind(hay: &[char], needle: &[char], start: usize, end: usize) -> Option<usize> {
    if needle.is_empty() || end < start + needle.len() {
        return None;
    }
    (start..=end - needle.len())
        .rev()
        .find(|&i| hay[i..i + needle.len()] == *needle)
}

fn push_trimmed(out: &mut Vec<String>, chars: &[char]) {
    let s: String = chars.iter().collect();
    let s = s.trim();
    if !s.is_empty() {
        out.push(s.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(chunks: &[TextChunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.text.as_str()).collect()
    }

    #[test]
    fn blank_input_yields_nothing() {
        assert!(split("", 20).is_empty());
        assert!(split("   \n  ", 20).is_empty());
        assert!(split("\n\n\t\n", 5).is_empty());
    }

    #[test]
    fn sentence_terminator_beats_later_space() {
        let chunks = split("Hello world. This is a test sentence.", 20);
        assert_eq!(chunks[0].text, "Hello world.");
        assert!(chunks.iter().all(|c| c.length <= 20));
        assert_eq!(
            texts(&chunks).join(" "),
            "Hello world. This is a test sentence."
        );
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = split("  Just one line.  ", 180);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].text, "Just one line.");
        assert_eq!(chunks[0].length, 14);
    }

    #[test]
    fn lines_are_packed_until_they_overflow() {
        let chunks = split("aaaa\n\nbbbb\ncccc\ndddd", 9);
        assert_eq!(texts(&chunks), vec!["aaaa\nbbbb", "cccc\ndddd"]);
        assert_eq!(chunks[1].index, 1);
    }

    #[test]
    fn sentence_end_outranks_later_clause_separator() {
        let chunks = split("Hi there. Foo, bar baz qux", 16);
        assert_eq!(chunks[0].text, "Hi there.");
        assert_eq!(chunks[1].text, "Foo, bar baz qux");
    }

    #[test]
    fn clause_separator_used_when_no_sentence_end() {
        let chunks = split("alpha beta, gamma delta epsilon", 16);
        assert_eq!(chunks[0].text, "alpha beta,");
    }

    #[test]
    fn rightmost_separator_wins_on_equal_priority() {
        let chunks = split("aa bb cc dd ee ff", 10);
        assert_eq!(chunks[0].text, "aa bb cc");
    }

    #[test]
    fn unbreakable_token_is_force_cut() {
        let chunks = split("abcdefghijklmnopqrstuvwxyz", 10);
        assert_eq!(texts(&chunks), vec!["abcdefghij", "klmnopqrst", "uvwxyz"]);
    }

    #[test]
    fn fallback_stays_inside_the_window() {
        let chars: Vec<char> = "abcdefghij klmnop".chars().collect();
        assert_eq!(fallback_cut(&chars, 0, 10), 9);
        assert_eq!(fallback_cut(&chars, 0, 11), 10);
        assert_eq!(fallback_cut(&chars, 2, 6), 5);
    }

    #[test]
    fn space_just_past_the_window_still_force_cuts() {
        let text = format!("{} {}", "x".repeat(25), "y".repeat(3));
        let chunks = split(&text, 10);
        assert_eq!(
            texts(&chunks),
            vec!["xxxxxxxxxx", "xxxxxxxxxx", "xxxxx yyy"]
        );
    }

    #[test]
    fn lengths_count_characters_not_bytes() {
        let text = "Привет мир. Это проверка длины.";
        let chunks = split(text, 12);
        assert!(chunks.iter().all(|c| c.length <= 12), "{chunks:?}");
        assert_eq!(chunks[0].text, "Привет мир.");
        for c in &chunks {
            assert_eq!(c.length, c.text.chars().count());
        }
    }

    #[test]
    fn indices_follow_emission_order() {
        let chunks = split("one two three four five six seven eight nine ten", 8);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i);
        }
    }

    #[test]
    fn preview_reports_counts() {
        let p = preview("  First line.\nSecond line.  ", 12);
        assert_eq!(p.original_length, 24);
        assert_eq!(p.num_chunks, p.chunks.len());
        assert_eq!(p.num_chunks, 2);
    }

    #[test]
    fn zero_max_length_does_not_hang() {
        let chunks = split("ab c", 0);
        assert_eq!(texts(&chunks), vec!["a", "b", "c"]);
    }
}
