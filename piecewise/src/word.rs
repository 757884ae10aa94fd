//! The two trivial model types: whole words and single characters.
use crate::token::Segment;
use crate::vocab::Vocab;
use crate::WHITESPACE_MARKER;
use std::ops::Range;

/// Each whitespace delimited word of the normalized text is one piece.
///
/// Words start at a whitespace marker, or with `suffix` they end just after one.
pub(crate) fn encode_words(text: &str, vocab: &Vocab, suffix: bool) -> Vec<Segment> {
    split_words(text, suffix)
        .into_iter()
        .map(|range| lookup(text, range, vocab))
        .collect()
}

/// Each character of the normalized text is one piece.
pub(crate) fn encode_chars(text: &str, vocab: &Vocab) -> Vec<Segment> {
    text.char_indices()
        .map(|(offset, c)| lookup(text, offset..offset + c.len_utf8(), vocab))
        .collect()
}

fn lookup(text: &str, range: Range<usize>, vocab: &Vocab) -> Segment {
    Segment {
        id: vocab
            .match_piece(&text[range.clone()])
            .map(|found| found.id)
            .unwrap_or_else(|| vocab.unk_id()),
        range,
    }
}

fn split_words(text: &str, suffix: bool) -> Vec<Range<usize>> {
    let mut words = Vec::new();
    let mut start = 0;

    for (offset, c) in text.char_indices() {
        if c != WHITESPACE_MARKER {
            continue;
        }
        if suffix {
            let end = offset + c.len_utf8();
            words.push(start..end);
            start = end;
        } else if offset > start {
            words.push(start..offset);
            start = offset;
        }
    }

    if start < text.len() {
        words.push(start..text.len());
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words<'a>(text: &'a str, suffix: bool) -> Vec<&'a str> {
        split_words(text, suffix)
            .into_iter()
            .map(|range| &text[range])
            .collect()
    }

    #[test]
    fn prefix_words() {
        assert_eq!(
            words("\u{2581}hello\u{2581}world", false),
            ["\u{2581}hello", "\u{2581}world"]
        );
        assert_eq!(words("hi\u{2581}there", false), ["hi", "\u{2581}there"]);
        assert!(words("", false).is_empty());
    }

    #[test]
    fn suffix_words() {
        assert_eq!(
            words("hello\u{2581}world\u{2581}", true),
            ["hello\u{2581}", "world\u{2581}"]
        );
        assert_eq!(words("a\u{2581}b", true), ["a\u{2581}", "b"]);
    }
}
