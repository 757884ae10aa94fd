//! Segmentation with a SentencePiece BPE (byte pair encoding) model.
//!
//! Unlike tiktoken style BPE, merges here operate on characters and the merge priority is the
//! score of the merged piece: higher scores merge first.
use crate::token::Segment;
use crate::vocab::Vocab;
use rand::{Rng, RngCore};
use std::ops::Range;

/// Randomly skip merges while segmenting, as described in "BPE-Dropout: Simple and Effective
/// Subword Regularization" (Provilkov et al).
pub(crate) struct Dropout<'r> {
    /// Probability that any given merge is dropped
    pub probability: f32,
    pub rng: &'r mut dyn RngCore,
}

/// Using the BPE algorithm find the pieces in `text`.
///
/// Pieces that aren't in the vocabulary come back as the unknown piece.
pub(crate) fn byte_pair_encode(
    text: &str,
    vocab: &Vocab,
    dropout: Option<Dropout<'_>>,
) -> Vec<Segment> {
    let symbols = initial_symbols(text, vocab);

    byte_pair_merge(text, symbols, vocab, dropout)
        .into_iter()
        .map(|range| Segment {
            id: vocab
                .match_piece(&text[range.clone()])
                .map(|found| found.id)
                .unwrap_or_else(|| vocab.unk_id()),
            range,
        })
        .collect()
}

/// Split `text` into the symbols merging starts from: single characters, except that user defined
/// pieces are kept whole.
fn initial_symbols(text: &str, vocab: &Vocab) -> Vec<usize> {
    let offsets = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect::<Vec<_>>();
    let num_chars = offsets.len() - 1;

    let mut starts = Vec::with_capacity(num_chars);
    let mut pos = 0;
    while pos < num_chars {
        starts.push(offsets[pos]);

        let mut len = 1;
        if vocab.has_user_defined() {
            // Longest user defined piece starting here, if there is one
            len = (2..=vocab.max_piece_chars().min(num_chars - pos))
                .rev()
                .find(|&len| {
                    vocab
                        .match_piece(&text[offsets[pos]..offsets[pos + len]])
                        .is_some_and(|found| found.user_defined)
                })
                .unwrap_or(1);
        }
        pos += len;
    }
    starts
}

/// Merge adjacent symbols together into progressively fewer, longer pieces until no adjacent pair
/// forms a piece in the vocabulary.
///
/// `starts` holds the byte offset where each initial symbol starts.  The result is the byte range
/// of each final piece.
///
/// Based on the `byte_pair_merge` function in the tiktoken source, with scores instead of ranks.
fn byte_pair_merge(
    text: &str,
    starts: Vec<usize>,
    vocab: &Vocab,
    mut dropout: Option<Dropout<'_>>,
) -> Vec<Range<usize>> {
    // This is a vector of (start, score).
    // The score is that of the piece formed by merging the symbol starting at `start` with the
    // next one, or `None` if that isn't a piece.
    // The last item is a sentinel marking the end of the text.
    let mut parts: Vec<(usize, Option<f32>)> = starts
        .into_iter()
        .chain(std::iter::once(text.len()))
        .map(|start| (start, None))
        .collect();

    let get_score = |parts: &Vec<(usize, Option<f32>)>, start_idx: usize, skip: usize| {
        if (start_idx + skip + 2) < parts.len() {
            vocab
                .match_piece(&text[parts[start_idx].0..parts[start_idx + skip + 2].0])
                .map(|found| found.score)
        } else {
            None
        }
    };

    for i in 0..parts.len().saturating_sub(2) {
        parts[i].1 = get_score(&parts, i, 0);
    }

    while parts.len() > 2 {
        // Highest score wins, leftmost on ties
        let mut best: Option<(f32, usize)> = None;
        for (i, &(_, score)) in parts[..parts.len() - 1].iter().enumerate() {
            if let Some(score) = score {
                if best.map_or(true, |(best_score, _)| score > best_score) {
                    best = Some((score, i));
                }
            }
        }

        let Some((_, i)) = best else {
            break;
        };

        if let Some(dropout) = dropout.as_mut() {
            if dropout.rng.gen::<f32>() < dropout.probability {
                // This pair stays unmerged unless one of its neighbors merges and it's
                // re-scored
                parts[i].1 = None;
                continue;
            }
        }

        // parts[i + 1] is about to be removed, so score the neighbors as if it already was
        parts[i].1 = get_score(&parts, i, 1);
        if i > 0 {
            parts[i - 1].1 = get_score(&parts, i - 1, 1);
        }

        parts.remove(i + 1);
    }

    parts.windows(2).map(|pair| pair[0].0..pair[1].0).collect()
}
