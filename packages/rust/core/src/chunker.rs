//! Token-bounded, word-aligned chunking.
//!
//! Chunks are contiguous slices of the input. Each boundary sits at the start
//! of a word and inter-word whitespace stays with the preceding chunk, so
//! concatenating every chunk in order reproduces the input byte-for-byte.

use rfqscope_shared::ChunkingConfig;

/// Splits a role's text into chunks whose estimated token cost stays under a ceiling.
#[derive(Debug, Clone)]
pub struct Chunker {
    token_estimate_per_char: f64,
    token_ceiling: f64,
    overlap_chars: usize,
}

impl Chunker {
    pub fn new(token_estimate_per_char: f64, token_ceiling: usize, overlap_chars: usize) -> Self {
        Self {
            token_estimate_per_char,
            token_ceiling: token_ceiling as f64,
            overlap_chars,
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(
            config.token_estimate_per_char,
            config.max_tokens_per_chunk,
            config.chunk_overlap_chars,
        )
    }

    /// Estimated token cost of one word.
    pub fn estimated_tokens(&self, word: &str) -> f64 {
        word.chars().count() as f64 * self.token_estimate_per_char
    }

    /// Partition `text` into chunks.
    ///
    /// Words accumulate into the current chunk until the next one would push
    /// its cost over the ceiling; that word then opens a new chunk. A single
    /// word above the ceiling forms a chunk of its own. Text without words
    /// yields no chunks.
    pub fn chunk<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let mut boundaries = Vec::new();
        let mut current = 0.0_f64;
        let mut has_words = false;

        for (start, word) in words(text) {
            let cost = self.estimated_tokens(word);
            if !has_words {
                // The first chunk also carries any leading whitespace.
                boundaries.push(0);
                current = cost;
                has_words = true;
            } else if current + cost > self.token_ceiling {
                boundaries.push(start);
                current = cost;
            } else {
                current += cost;
            }
        }

        let mut chunks = Vec::with_capacity(boundaries.len());
        for (i, &start) in boundaries.iter().enumerate() {
            let end = boundaries.get(i + 1).copied().unwrap_or(text.len());
            chunks.push(&text[start..end]);
        }
        chunks
    }

    /// Read-only context for chunk `index`: the trailing `overlap_chars` of the
    /// previous chunk, trimmed forward to a word start.
    pub fn preceding_context<'a>(&self, chunks: &[&'a str], index: usize) -> Option<&'a str> {
        if index == 0 || self.overlap_chars == 0 {
            return None;
        }
        let tail = chunks.get(index - 1)?.trim_end();
        let count = tail.chars().count();
        if count <= self.overlap_chars {
            let window = tail.trim_start();
            return (!window.is_empty()).then_some(window);
        }

        let (cut, _) = tail.char_indices().nth(count - self.overlap_chars)?;
        let window = &tail[cut..];
        let window = if tail[..cut].ends_with(char::is_whitespace) {
            window
        } else {
            // Cut landed inside a word; skip to the next one.
            match window.find(char::is_whitespace) {
                Some(pos) => window[pos..].trim_start(),
                None => "",
            }
        };
        (!window.is_empty()).then_some(window)
    }
}

/// Whitespace-delimited words with their byte offsets.
fn words(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.split_whitespace().map(move |word| {
        // `split_whitespace` yields subslices of `text`.
        let start = word.as_ptr() as usize - text.as_ptr() as usize;
        (start, word)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(ceiling: usize) -> Chunker {
        Chunker::new(0.8, ceiling, 100)
    }

    #[test]
    fn empty_and_whitespace_yield_nothing() {
        assert!(chunker(8000).chunk("").is_empty());
        assert!(chunker(8000).chunk("  \n\t ").is_empty());
    }

    #[test]
    fn small_text_is_one_chunk() {
        let text = "  We need a data platform.\n";
        assert_eq!(chunker(8000).chunk(text), vec![text]);
    }

    #[test]
    fn splits_at_word_starts() {
        // "alpha"=4.0 "beta"=3.2 "gamma"=4.0 with a ceiling of 8.
        let chunks = chunker(8).chunk("alpha beta gamma");
        assert_eq!(chunks, vec!["alpha beta ", "gamma"]);
    }

    #[test]
    fn oversized_word_stands_alone() {
        let big = "x".repeat(50);
        let text = format!("a {big} b");
        let chunks = chunker(8).chunk(&text);
        assert_eq!(chunks, vec!["a ", &format!("{big} ")[..], "b"]);
    }

    #[test]
    fn oversized_first_word_emits_no_empty_chunk() {
        let big = "y".repeat(50);
        let chunks = chunker(8).chunk(&big);
        assert_eq!(chunks, vec![big.as_str()]);
    }

    #[test]
    fn cost_counts_chars_not_bytes() {
        let c = chunker(8000);
        assert_eq!(c.estimated_tokens("café"), 4.0 * 0.8);
    }

    #[test]
    fn preceding_context_is_word_bounded() {
        let c = Chunker::new(0.8, 8, 8);
        let chunks = ["one two three ", "four"];
        assert_eq!(c.preceding_context(&chunks, 0), None);
        // Last 8 chars of "one two three" are "wo three"; trimmed to "three".
        assert_eq!(c.preceding_context(&chunks, 1), Some("three"));
    }

    #[test]
    fn preceding_context_of_short_chunk_is_whole_chunk() {
        let c = Chunker::new(0.8, 8, 100);
        let chunks = ["  tiny ", "next"];
        assert_eq!(c.preceding_context(&chunks, 1), Some("tiny"));
    }

    #[test]
    fn preceding_context_disabled() {
        let c = Chunker::new(0.8, 8, 0);
        assert_eq!(c.preceding_context(&["a ", "b"], 1), None);
    }

    use proptest::prelude::*;

    fn text_strategy() -> impl Strategy<Value = String> {
        proptest::collection::vec(("[a-zA-Zé0-9]{0,30}", "[ \t\n]{1,3}"), 0..60).prop_map(
            |parts| {
                parts
                    .into_iter()
                    .map(|(word, gap)| format!("{word}{gap}"))
                    .collect::<String>()
            },
        )
    }

    proptest! {
        #[test]
        fn concatenation_is_lossless(text in text_strategy(), ceiling in 1usize..64) {
            let chunks = chunker(ceiling).chunk(&text);
            if text.trim().is_empty() {
                prop_assert!(chunks.is_empty());
            } else {
                prop_assert_eq!(chunks.concat(), text);
            }
        }

        #[test]
        fn ceiling_holds_except_for_lone_words(text in text_strategy(), ceiling in 1usize..64) {
            let c = chunker(ceiling);
            for chunk in c.chunk(&text) {
                let words: Vec<&str> = chunk.split_whitespace().collect();
                prop_assert!(!words.is_empty(), "empty chunk emitted");
                let cost: f64 = words.iter().map(|w| c.estimated_tokens(w)).sum();
                prop_assert!(words.len() == 1 || cost <= ceiling as f64,
                    "chunk {:?} costs {} over ceiling {}", chunk, cost, ceiling);
            }
        }

        #[test]
        fn chunking_is_deterministic(text in text_strategy(), ceiling in 1usize..64) {
            let c = chunker(ceiling);
            prop_assert_eq!(c.chunk(&text), c.chunk(&text));
        }
    }
}
