//! Plain-text helpers shared by the generators: word counting, sentence
//! splitting, length capping and lexical overlap.

use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

/// Number of whitespace-separated words. Buckets are measured in this unit.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Split text into sentences on `.`, `!` or `?` followed by whitespace or end of text.
///
/// Returned slices are trimmed and never empty. Text without terminal
/// punctuation is a single sentence.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let at_boundary = match chars.peek() {
            None => true,
            Some((_, next)) => next.is_whitespace(),
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

    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences
}

/// Shorten `text` to at most `max_words` words.
///
/// Keeps whole leading sentences while they fit. If even the first sentence
/// is too long, falls back to a hard cut after `max_words` words.
pub fn truncate_to_words(text: &str, max_words: usize) -> String {
    if word_count(text) <= max_words {
        return text.trim().to_string();
    }

    let mut kept: Vec<&str> = Vec::new();
    let mut words = 0;
    for sentence in split_sentences(text) {
        let n = word_count(sentence);
        if words + n > max_words {
            break;
        }
        words += n;
        kept.push(sentence);
    }

    if kept.is_empty() {
        text.split_whitespace()
            .take(max_words)
            .collect::<Vec<_>>()
            .join(" ")
    } else {
        kept.join(" ")
    }
}

/// Head-truncate `text` to at most `max_chars` characters.
///
/// The cut lands on the last sentence end inside the limit, else on the last
/// whitespace, else exactly at the limit. Returns the input untouched when it fits.
pub fn cap_chars(text: &str, max_chars: usize) -> Cow<'_, str> {
    if text.chars().count() <= max_chars {
        return Cow::Borrowed(text);
    }

    let head = char_prefix(text, max_chars);

    let sentence_end = head
        .char_indices()
        .filter(|(i, c)| {
            matches!(c, '.' | '!' | '?')
                && text[i + c.len_utf8()..]
                    .chars()
                    .next()
                    .is_none_or(char::is_whitespace)
        })
        .map(|(i, c)| i + c.len_utf8())
        .last();

    if let Some(end) = sentence_end {
        return Cow::Owned(head[..end].trim().to_string());
    }
    Cow::Owned(word_prefix(head).to_string())
}

/// The first `max_chars` characters of `text`, cut back to a word boundary.
pub fn head_at_word_boundary(text: &str, max_chars: usize) -> &str {
    if text.chars().count() <= max_chars {
        return text.trim();
    }
    word_prefix(char_prefix(text, max_chars))
}

fn char_prefix(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte, _)) => &text[..byte],
        None => text,
    }
}

/// Drop a trailing partial word (if any whitespace exists to cut on).
fn word_prefix(head: &str) -> &str {
    match head.rfind(char::is_whitespace) {
        Some(pos) if !head[..pos].trim().is_empty() => head[..pos].trim_end(),
        _ => head.trim_end(),
    }
}

/// Lowercased distinct word tokens, ignoring punctuation.
pub fn distinct_words(text: &str) -> HashSet<String> {
    static WORD_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\w+").expect("valid regex"));

    WORD_RE
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Lexical overlap between two texts.
///
/// Shared distinct normalized words divided by the smaller distinct-word
/// count, in `[0, 1]`. Zero when either text has no words.
pub fn token_overlap(a: &str, b: &str) -> f32 {
    let a = distinct_words(a);
    let b = distinct_words(b);
    let smaller = a.len().min(b.len());
    if smaller == 0 {
        return 0.0;
    }
    let shared = a.intersection(&b).count();
    shared as f32 / smaller as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_words() {
        assert_eq!(word_count("  a quick\tbrown\nfox "), 4);
        assert_eq!(word_count(""), 0);
    }

    #[test]
    fn splits_on_terminal_punctuation() {
        let s = split_sentences("A 6.1 quake hit. Homes fell! Is help coming? Yes");
        assert_eq!(s, vec!["A 6.1 quake hit.", "Homes fell!", "Is help coming?", "Yes"]);
    }

    #[test]
    fn decimal_points_do_not_split() {
        assert_eq!(split_sentences("Magnitude 6.1 recorded."), vec!["Magnitude 6.1 recorded."]);
    }

    #[test]
    fn truncate_keeps_whole_sentences() {
        let text = "One two three. Four five six. Seven eight nine.";
        assert_eq!(truncate_to_words(text, 7), "One two three. Four five six.");
        assert_eq!(truncate_to_words(text, 100), text);
    }

    #[test]
    fn truncate_falls_back_to_hard_cut() {
        let text = "one two three four five six seven";
        assert_eq!(truncate_to_words(text, 3), "one two three");
    }

    #[test]
    fn cap_chars_prefers_sentence_end() {
        let text = "Roads closed. Bridges damaged across the valley";
        assert_eq!(cap_chars(text, 30), "Roads closed.");
        assert!(matches!(cap_chars("short", 30), Cow::Borrowed("short")));
    }

    #[test]
    fn cap_chars_falls_back_to_word_boundary() {
        assert_eq!(cap_chars("alpha beta gamma delta", 13), "alpha beta");
    }

    #[test]
    fn head_cuts_at_word_boundary() {
        assert_eq!(head_at_word_boundary("flooding in the river basin", 12), "flooding in");
        assert_eq!(head_at_word_boundary("tiny", 200), "tiny");
    }

    #[test]
    fn overlap_uses_smaller_vocabulary() {
        assert_eq!(token_overlap("The river flooded.", "the RIVER flooded the town"), 1.0);
        assert_eq!(token_overlap("", "anything"), 0.0);
        let partial = token_overlap("aid trucks arrived", "aid teams left");
        assert!((partial - 1.0 / 3.0).abs() < 1e-6);
    }
}
