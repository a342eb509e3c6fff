//! Sentence-window splitter.
//!
//! Three-step strategy:
//! 1. Split the text at sentence ends (`.`, `!`, `?` followed by whitespace)
//! 2. Break any sentence longer than the word budget into word slices
//! 3. Pack consecutive pieces into windows, carrying a word-bounded tail of
//!    each window into the next one as overlap

use std::collections::VecDeque;

/// Split `text` into chunks of at most `chunk_size` words, each sharing up to
/// `chunk_overlap` trailing words (whole sentences) with its predecessor.
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    if text.trim().is_empty() || chunk_size == 0 {
        return Vec::new();
    }

    let pieces: Vec<(String, usize)> = split_sentences(text)
        .into_iter()
        .flat_map(|sentence| split_long_sentence(sentence, chunk_size))
        .collect();

    let mut chunks = Vec::new();
    let mut window: VecDeque<(String, usize)> = VecDeque::new();
    let mut window_words = 0usize;

    // Every piece after the first lands behind a piece not yet emitted, so a
    // non-empty window always has something new to flush.
    for (piece, words) in pieces {
        if !window.is_empty() && window_words + words > chunk_size {
            chunks.push(join_window(&window));
            while !window.is_empty()
                && (window_words > chunk_overlap || window_words + words > chunk_size)
            {
                if let Some((_, dropped)) = window.pop_front() {
                    window_words -= dropped;
                }
            }
        }
        window_words += words;
        window.push_back((piece, words));
    }

    if !window.is_empty() {
        chunks.push(join_window(&window));
    }

    chunks
}

fn join_window(window: &VecDeque<(String, usize)>) -> String {
    window
        .iter()
        .map(|(piece, _)| piece.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split at sentence terminators that are followed by whitespace or the end
/// of the text. Returned sentences are trimmed and non-empty.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = match chars.peek() {
                Some((_, next)) => next.is_whitespace(),
                None => true,
            };
            if at_boundary {
                let end = i + c.len_utf8();
                let sentence = text[start..end].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence);
                }
                start = end;
            }
        }
    }

    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences
}

/// A sentence within budget stays whole; a longer one is sliced by words.
fn split_long_sentence(sentence: &str, chunk_size: usize) -> Vec<(String, usize)> {
    let words: Vec<&str> = sentence.split_whitespace().collect();
    if words.len() <= chunk_size {
        return vec![(words.join(" "), words.len())];
    }
    words
        .chunks(chunk_size)
        .map(|slice| (slice.join(" "), slice.len()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word_count(s: &str) -> usize {
        s.split_whitespace().count()
    }

    #[test]
    fn test_split_empty() {
        assert!(split_text("", 10, 2).is_empty());
        assert!(split_text("   ", 10, 2).is_empty());
    }

    #[test]
    fn test_small_text_is_one_chunk() {
        let chunks = split_text("Hello there. How are you?", 256, 128);
        assert_eq!(chunks, vec!["Hello there. How are you?".to_string()]);
    }

    #[test]
    fn test_split_sentences_keeps_decimals_together() {
        let sentences = split_sentences("Version 0.10 shipped. It is fast! Really?");
        assert_eq!(sentences, vec!["Version 0.10 shipped.", "It is fast!", "Really?"]);
    }

    #[test]
    fn test_chunks_respect_word_budget() {
        let text = (0..50)
            .map(|i| format!("This is sentence {i} of the post."))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = split_text(&text, 20, 5);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(word_count(chunk) <= 20, "chunk too long: {chunk}");
        }
    }

    #[test]
    fn test_consecutive_chunks_overlap() {
        let text = (0..20)
            .map(|i| format!("Fact {i} is here."))
            .collect::<Vec<_>>()
            .join(" ");
        // 4 words per sentence, budget 12, overlap 4: each chunk after the
        // first starts with the previous chunk's last sentence.
        let chunks = split_text(&text, 12, 4);
        assert!(chunks.len() > 2);
        for pair in chunks.windows(2) {
            let last_sentence = pair[0].rsplit_once(" Fact").map(|(_, s)| s).unwrap();
            assert!(
                pair[1].starts_with(&format!("Fact{last_sentence}")),
                "expected overlap between {:?} and {:?}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_zero_overlap_partitions_text() {
        let text = "A b c. D e f. G h i. J k l.";
        let chunks = split_text(text, 6, 0);
        assert_eq!(chunks, vec!["A b c. D e f.", "G h i. J k l."]);
    }

    #[test]
    fn test_long_sentence_sliced_by_words() {
        let sentence = (0..25).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let chunks = split_text(&sentence, 10, 3);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| word_count(c) <= 10));
        assert!(chunks[0].starts_with("w0"));
        assert!(chunks[2].ends_with("w24"));
    }

    #[test]
    fn test_all_words_are_covered() {
        let text = (0..30)
            .map(|i| format!("Word{i} appears once."))
            .collect::<Vec<_>>()
            .join(" ");
        let joined = split_text(&text, 16, 8).join(" ");
        for i in 0..30 {
            assert!(joined.contains(&format!("Word{i} ")));
        }
    }
}
