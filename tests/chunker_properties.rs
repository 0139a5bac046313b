//! Property-based tests for the text chunker.

use proptest::prelude::*;

use tts_pipeline::chunker::split;

/// Prose-like text: words, punctuation, spaces, dashes and line breaks.
fn prose() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Zа-яё0-9 .,!?;:\n\t\u{2014}-]{0,400}")
        .unwrap()
        .boxed()
}

fn non_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

proptest! {
    /// Chunks reproduce the input, minus whitespace, with nothing lost,
    /// duplicated or reordered.
    #[test]
    fn chunks_preserve_content(text in prose(), max_length in 1usize..200) {
        let chunks = split(&text, max_length);
        let joined: String = chunks.iter().map(|c| c.text.as_str()).collect();
        prop_assert_eq!(non_whitespace(&joined), non_whitespace(&text));
    }

    /// No chunk exceeds the limit, none is blank and none carries outer
    /// whitespace.
    #[test]
    fn chunks_respect_the_limit(text in prose(), max_length in 1usize..200) {
        for chunk in split(&text, max_length) {
            prop_assert!(chunk.length <= max_length, "{:?} over {}", chunk.text, max_length);
            prop_assert_eq!(chunk.length, chunk.text.chars().count());
            prop_assert!(!chunk.text.is_empty());
            prop_assert_eq!(chunk.text.trim(), chunk.text.as_str());
        }
    }

    /// Indices are the emission order.
    #[test]
    fn indices_are_sequential(text in prose(), max_length in 1usize..200) {
        let chunks = split(&text, max_length);
        for (i, chunk) in chunks.iter().enumerate() {
            prop_assert_eq!(chunk.index, i);
        }
    }

    /// Blank input never produces chunks.
    #[test]
    fn blank_input_yields_nothing(text in "[ \t\n]{0,50}", max_length in 1usize..50) {
        prop_assert!(split(&text, max_length).is_empty());
    }

    /// Text that already fits comes back as one chunk.
    #[test]
    fn short_single_line_is_one_chunk(text in "[a-z]{1,20}( [a-z]{1,20}){0,3}") {
        let chunks = split(&text, 200);
        prop_assert_eq!(chunks.len(), 1);
        prop_assert_eq!(&chunks[0].text, &text);
    }
}
