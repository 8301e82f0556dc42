use once_cell::sync::Lazy;
use regex::Regex;

// Text up to and including a run of terminal punctuation plus any closing
// quotes or brackets, or a trailing unterminated remainder.
static SENTENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[^.!?]+(?:[.!?]+["'\u{201D}\u{2019})\]]*|$)"#).expect("sentence pattern is valid")
});

/// Splits prose into trimmed, non-empty sentences.
pub fn split_sentences(text: &str) -> Vec<String> {
    SENTENCE
        .find_iter(text)
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Splits sentences at the midpoint; the first half gets `n / 2`.
pub fn split_halves(sentences: &[String]) -> (&[String], &[String]) {
    sentences.split_at(sentences.len() / 2)
}

/// Cuts `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(n: usize) -> String {
        (1..=n)
            .map(|i| format!("Sentence number {}.", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_split_sentences_basic() {
        let s = split_sentences("Once upon a time. A dragon yawned!  Was he sleepy? Yes");
        assert_eq!(
            s,
            vec!["Once upon a time.", "A dragon yawned!", "Was he sleepy?", "Yes"]
        );
    }

    #[test]
    fn test_split_keeps_closing_quotes() {
        let s = split_sentences("\"Goodnight!\" said Mom. The end...\n\n");
        assert_eq!(s, vec!["\"Goodnight!\"", "said Mom.", "The end..."]);
    }

    #[test]
    fn test_split_empty() {
        assert!(split_sentences("").is_empty());
        assert!(split_sentences("   \n ").is_empty());
    }

    #[test]
    fn test_halves_even_and_odd() {
        let ten = split_sentences(&numbered(10));
        let (a, b) = split_halves(&ten);
        assert_eq!((a.len(), b.len()), (5, 5));

        let eleven = split_sentences(&numbered(11));
        let (a, b) = split_halves(&eleven);
        assert_eq!((a.len(), b.len()), (5, 6));
        assert_eq!(b[0], "Sentence number 6.");

        let one = split_sentences(&numbered(1));
        let (a, b) = split_halves(&one);
        assert_eq!((a.len(), b.len()), (0, 1));
    }

    #[test]
    fn test_truncate_chars_multibyte() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars(&"x".repeat(200), 150).len(), 150);
    }
}
