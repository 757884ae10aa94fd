/// A token output by the model, represented by the id of its piece.
///
/// The id is the index of the piece in the model's vocabulary.  SentencePiece ids are signed 32
/// bit integers on the wire but can never be negative once a model has loaded, so they're kept
/// unsigned here.
pub type TokenId = u32;

/// The marker SentencePiece substitutes for whitespace so that it becomes part of a piece.
pub const WHITESPACE_MARKER: char = '\u{2581}';

/// Default text an unknown piece decodes to: " ⁇ ".
pub const DEFAULT_UNK_SURFACE: &str = " \u{2047} ";

/// A piece found in the input text, before unknown pieces are merged or expanded.
///
/// `range` is a byte range into the normalized text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Segment {
    pub id: TokenId,
    pub range: std::ops::Range<usize>,
}
