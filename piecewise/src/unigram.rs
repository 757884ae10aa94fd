//! Segmentation with a unigram language model.
//!
//! Every way of splitting the text into vocabulary pieces is represented in a [`Lattice`], and the
//! split whose pieces have the highest total log probability wins.
use crate::token::Segment;
use crate::vocab::Vocab;
use crate::TokenId;
use rand::distributions::{Distribution, WeightedIndex};
use rand::RngCore;

/// Score penalty applied, relative to the lowest scoring piece, to a character that no piece
/// covers.
const UNK_PENALTY: f32 = 10.0;

#[derive(Clone, Debug)]
struct Node {
    id: TokenId,

    /// Start position, in chars
    start: usize,

    /// Length, in chars
    len: usize,

    score: f32,
}

/// A partial path ending at some position, used by n-best search
#[derive(Clone, Copy)]
struct Hypothesis<'a> {
    score: f32,

    /// The last node on the path, or `None` for the empty path at the start of the text
    node: Option<&'a Node>,

    /// Rank of the predecessor hypothesis at `node.start`
    prev_rank: usize,
}

pub(crate) struct Lattice {
    /// Byte offset of every char boundary in `text`, including the end of the text
    offsets: Vec<usize>,

    /// Candidate nodes, grouped by the char position they start at
    starts: Vec<Vec<Node>>,
}

impl Lattice {
    pub fn new(text: &str, vocab: &Vocab) -> Self {
        let offsets = text
            .char_indices()
            .map(|(offset, _)| offset)
            .chain(std::iter::once(text.len()))
            .collect::<Vec<_>>();
        let num_chars = offsets.len() - 1;
        let unk_score = vocab.min_score() - UNK_PENALTY;

        let mut starts = Vec::with_capacity(num_chars);
        for start in 0..num_chars {
            let mut nodes = Vec::new();
            let mut has_single_char = false;

            for len in 1..=vocab.max_piece_chars().min(num_chars - start) {
                let piece = &text[offsets[start]..offsets[start + len]];
                if let Some(found) = vocab.match_piece(piece) {
                    // User defined pieces must always win over any other split of the same text
                    let score = if found.user_defined {
                        len as f32 * vocab.max_score() - 0.1
                    } else {
                        found.score
                    };
                    nodes.push(Node {
                        id: found.id,
                        start,
                        len,
                        score,
                    });
                    has_single_char |= len == 1;
                }
            }

            if !has_single_char {
                nodes.push(Node {
                    id: vocab.unk_id(),
                    start,
                    len: 1,
                    score: unk_score,
                });
            }

            starts.push(nodes);
        }

        Self { offsets, starts }
    }

    fn num_chars(&self) -> usize {
        self.starts.len()
    }

    fn segment(&self, node: &Node) -> Segment {
        Segment {
            id: node.id,
            range: self.offsets[node.start]..self.offsets[node.start + node.len],
        }
    }

    /// The single highest scoring segmentation
    pub fn viterbi(&self) -> Vec<Segment> {
        let num_chars = self.num_chars();
        let mut best_score = vec![f32::NEG_INFINITY; num_chars + 1];
        let mut best_node: Vec<Option<&Node>> = vec![None; num_chars + 1];
        best_score[0] = 0.0;

        for start in 0..num_chars {
            // Every position has at least a single char node, so every position is reachable
            let base = best_score[start];
            for node in &self.starts[start] {
                let end = start + node.len;
                let score = base + node.score;
                if score > best_score[end] {
                    best_score[end] = score;
                    best_node[end] = Some(node);
                }
            }
        }

        let mut segments = Vec::new();
        let mut pos = num_chars;
        while pos > 0 {
            let node = best_node[pos].expect("BUG: every lattice position must be reachable");
            segments.push(self.segment(node));
            pos = node.start;
        }
        segments.reverse();
        segments
    }

    /// The `n` highest scoring segmentations, best first, with their scores.
    ///
    /// Keeps the `n` best partial paths ending at each position, which is exact for a lattice
    /// since every path into a position passes through earlier positions only.
    pub fn nbest(&self, n: usize) -> Vec<(Vec<Segment>, f32)> {
        let num_chars = self.num_chars();
        let mut table: Vec<Vec<Hypothesis<'_>>> = vec![Vec::new(); num_chars + 1];
        table[0].push(Hypothesis {
            score: 0.0,
            node: None,
            prev_rank: 0,
        });

        for start in 0..num_chars {
            // All paths into `start` are known by now
            let mut hypotheses = std::mem::take(&mut table[start]);
            keep_best(&mut hypotheses, n);

            for node in &self.starts[start] {
                for (rank, hypothesis) in hypotheses.iter().enumerate() {
                    table[start + node.len].push(Hypothesis {
                        score: hypothesis.score + node.score,
                        node: Some(node),
                        prev_rank: rank,
                    });
                }
            }

            table[start] = hypotheses;
        }

        keep_best(&mut table[num_chars], n);

        table[num_chars]
            .iter()
            .map(|last| {
                let mut segments = Vec::new();
                let mut hypothesis = *last;
                while let Some(node) = hypothesis.node {
                    segments.push(self.segment(node));
                    hypothesis = table[node.start][hypothesis.prev_rank];
                }
                segments.reverse();
                (segments, last.score)
            })
            .collect()
    }

    /// Pick one of the `n` best segmentations at random, each with probability proportional to
    /// `exp(alpha * score)`.
    pub fn sample_nbest(&self, n: usize, alpha: f32, rng: &mut dyn RngCore) -> Vec<Segment> {
        let mut candidates = self.nbest(n);
        debug_assert!(!candidates.is_empty());

        // Scores are log probabilities and can be very negative; shift them so the best one is 0
        // before exponentiating
        let max_score = candidates
            .iter()
            .map(|(_, score)| *score)
            .fold(f32::NEG_INFINITY, f32::max);
        let weights = candidates
            .iter()
            .map(|(_, score)| (f64::from(alpha) * f64::from(score - max_score)).exp())
            .collect::<Vec<_>>();

        let chosen = match WeightedIndex::new(&weights) {
            Ok(distribution) => distribution.sample(rng),
            Err(_) => 0,
        };

        candidates.swap_remove(chosen).0
    }
}

fn keep_best(hypotheses: &mut Vec<Hypothesis<'_>>, n: usize) {
    hypotheses.sort_by(|a, b| b.score.total_cmp(&a.score));
    hypotheses.truncate(n);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_models;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn pieces(model: &crate::SentencePieceModel, segments: &[Segment]) -> Vec<String> {
        segments
            .iter()
            .map(|segment| model.id_to_piece(segment.id).unwrap().to_string())
            .collect()
    }

    #[test]
    fn viterbi_picks_highest_scoring_split() {
        let model = test_models::unigram();
        let text = "\u{2581}hello\u{2581}world";
        let lattice = Lattice::new(text, model.vocab());

        let segments = lattice.viterbi();

        assert_eq!(pieces(&model, &segments), ["\u{2581}hello", "\u{2581}world"]);
        assert_eq!(&text[segments[1].range.clone()], "\u{2581}world");
    }

    #[test]
    fn uncovered_chars_become_unknown() {
        let model = test_models::unigram();
        let lattice = Lattice::new("\u{2581}hex", model.vocab());

        let segments = lattice.viterbi();

        assert_eq!(pieces(&model, &segments), ["\u{2581}he", "<unk>"]);
        assert_eq!(segments[1].range, 5..6);
    }

    #[test]
    fn user_defined_pieces_win() {
        let model = test_models::unigram();
        let lattice = Lattice::new("\u{2581}hello<sep>world", model.vocab());

        assert_eq!(
            pieces(&model, &lattice.viterbi()),
            ["\u{2581}hello", "<sep>", "w", "o", "r", "ld"]
        );
    }

    #[test]
    fn nbest_is_ordered() {
        let model = test_models::unigram();
        let lattice = Lattice::new("\u{2581}hello", model.vocab());

        let nbest = lattice.nbest(3);

        assert_eq!(nbest.len(), 3);
        assert_eq!(pieces(&model, &nbest[0].0), ["\u{2581}hello"]);
        assert_eq!(pieces(&model, &nbest[1].0), ["\u{2581}he", "llo"]);
        assert_eq!(pieces(&model, &nbest[2].0), ["\u{2581}", "h", "e", "llo"]);
        assert_eq!(nbest[0].1, -4.0);
        assert_eq!(nbest[1].1, -6.0);
        assert_eq!(nbest[2].1, -24.0);

        // The best path of the n-best search is the Viterbi path
        assert_eq!(nbest[0].0, lattice.viterbi());
    }

    #[test]
    fn nbest_of_empty_text() {
        let model = test_models::unigram();
        let lattice = Lattice::new("", model.vocab());

        assert_eq!(lattice.nbest(4), vec![(Vec::new(), 0.0)]);
        assert!(lattice.viterbi().is_empty());
    }

    #[test]
    fn sharp_sampling_picks_the_best() {
        let model = test_models::unigram();
        let lattice = Lattice::new("\u{2581}hello", model.vocab());
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..50 {
            let sampled = lattice.sample_nbest(2, 100.0, &mut rng);
            assert_eq!(pieces(&model, &sampled), ["\u{2581}hello"]);
        }
    }

    #[test]
    fn flat_sampling_visits_every_candidate() {
        let model = test_models::unigram();
        let lattice = Lattice::new("\u{2581}hello", model.vocab());
        let mut rng = StdRng::seed_from_u64(11);
        let candidates = lattice.nbest(2);

        let mut seen = [false, false];
        for _ in 0..200 {
            let sampled = lattice.sample_nbest(2, 0.0, &mut rng);
            let index = candidates
                .iter()
                .position(|(segments, _)| *segments == sampled)
                .expect("sample must be one of the n-best");
            seen[index] = true;
        }
        assert_eq!(seen, [true, true]);
    }
}
