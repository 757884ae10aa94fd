//! The vocabulary of a model: every piece with its score and type, and the lookup tables needed to
//! match pieces against text.
use crate::error::*;
use crate::proto::{PieceType, TrainerSpec};
use crate::TokenId;
use snafu::{ensure, OptionExt};

pub use rustc_hash::FxHashMap as HashMap;

/// A single vocabulary entry
#[derive(Clone, Debug)]
pub(crate) struct Entry {
    pub piece: String,
    pub score: f32,
    pub kind: PieceType,
}

impl Entry {
    /// Pieces which can be matched against input text.  Control, unknown, unused and byte pieces
    /// are only ever emitted by special handling.
    fn is_matchable(&self) -> bool {
        matches!(self.kind, PieceType::Normal | PieceType::UserDefined)
    }
}

/// A matched piece, with the score the lattice should use for it
#[derive(Clone, Copy, Debug)]
pub(crate) struct Match {
    pub id: TokenId,
    pub score: f32,
    pub user_defined: bool,
}

#[derive(Clone, Debug)]
pub(crate) struct Vocab {
    entries: Vec<Entry>,

    /// Every piece, matchable or not, keyed by its text
    by_piece: HashMap<String, TokenId>,

    /// The length in chars of the longest matchable piece
    max_piece_chars: usize,

    /// Lowest and highest scores among normal pieces
    min_score: f32,
    max_score: f32,

    has_user_defined: bool,

    unk_id: TokenId,
    bos_id: Option<TokenId>,
    eos_id: Option<TokenId>,
    pad_id: Option<TokenId>,

    /// Byte fallback pieces, `<0x00>` through `<0xFF>`, indexed by byte value
    byte_ids: [Option<TokenId>; 256],
}

impl Vocab {
    pub fn new(pieces: &[crate::proto::Piece], spec: &TrainerSpec) -> crate::Result<Self> {
        ensure!(!pieces.is_empty(), EmptyVocabularySnafu);

        let mut entries = Vec::with_capacity(pieces.len());
        let mut by_piece = HashMap::with_capacity_and_hasher(pieces.len(), Default::default());
        let mut byte_ids = [None; 256];
        let mut max_piece_chars = 0;
        let mut min_score = f32::MAX;
        let mut max_score = f32::MIN;
        let mut has_user_defined = false;

        for (id, piece) in pieces.iter().enumerate() {
            let kind = piece.piece_type().context(UnknownPieceTypeSnafu {
                id,
                piece_type: piece.r#type.unwrap_or_default(),
            })?;
            let text = piece.piece.clone().unwrap_or_default();
            ensure!(!text.is_empty(), EmptyPieceSnafu { id });

            let token = id as TokenId;
            if let Some(first) = by_piece.insert(text.clone(), token) {
                return DuplicatePieceSnafu {
                    piece: text,
                    first,
                    second: token,
                }
                .fail();
            }

            let entry = Entry {
                piece: text,
                score: piece.score.unwrap_or_default(),
                kind,
            };

            if entry.is_matchable() {
                max_piece_chars = max_piece_chars.max(entry.piece.chars().count());
            }
            match kind {
                PieceType::Normal => {
                    min_score = min_score.min(entry.score);
                    max_score = max_score.max(entry.score);
                }
                PieceType::UserDefined => has_user_defined = true,
                PieceType::Byte => {
                    if let Some(byte) = parse_byte_piece(&entry.piece) {
                        byte_ids[byte as usize] = Some(token);
                    }
                }
                _ => {}
            }

            entries.push(entry);
        }

        if min_score > max_score {
            // No normal pieces at all; scores are irrelevant in that case
            min_score = 0.0;
            max_score = 0.0;
        }

        let vocab_size = entries.len();
        let special = |name: &'static str, id: i32| -> crate::Result<Option<TokenId>> {
            if id < 0 {
                return Ok(None);
            }
            ensure!(
                (id as usize) < vocab_size,
                SpecialIdOutOfRangeSnafu {
                    name,
                    id,
                    vocab_size
                }
            );
            Ok(Some(id as TokenId))
        };

        let unk_id = special("unk", spec.unk_id())?.context(SpecialIdOutOfRangeSnafu {
            name: "unk",
            id: spec.unk_id(),
            vocab_size,
        })?;
        ensure!(
            entries[unk_id as usize].kind == PieceType::Unknown,
            UnknownIdNotUnknownSnafu { id: unk_id }
        );

        Ok(Self {
            bos_id: special("bos", spec.bos_id())?,
            eos_id: special("eos", spec.eos_id())?,
            pad_id: special("pad", spec.pad_id())?,
            entries,
            by_piece,
            max_piece_chars,
            min_score,
            max_score,
            has_user_defined,
            unk_id,
            byte_ids,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entry(&self, id: TokenId) -> Option<&Entry> {
        self.entries.get(id as usize)
    }

    pub fn id_of(&self, piece: &str) -> Option<TokenId> {
        self.by_piece.get(piece).copied()
    }

    /// Look up `piece` among the pieces that may be matched against text
    pub fn match_piece(&self, piece: &str) -> Option<Match> {
        let id = self.id_of(piece)?;
        let entry = &self.entries[id as usize];
        entry.is_matchable().then_some(Match {
            id,
            score: entry.score,
            user_defined: entry.kind == PieceType::UserDefined,
        })
    }

    pub fn max_piece_chars(&self) -> usize {
        self.max_piece_chars
    }

    pub fn min_score(&self) -> f32 {
        self.min_score
    }

    pub fn max_score(&self) -> f32 {
        self.max_score
    }

    pub fn has_user_defined(&self) -> bool {
        self.has_user_defined
    }

    pub fn unk_id(&self) -> TokenId {
        self.unk_id
    }

    pub fn bos_id(&self) -> Option<TokenId> {
        self.bos_id
    }

    pub fn eos_id(&self) -> Option<TokenId> {
        self.eos_id
    }

    pub fn pad_id(&self) -> Option<TokenId> {
        self.pad_id
    }

    pub fn byte_id(&self, byte: u8) -> Option<TokenId> {
        self.byte_ids[byte as usize]
    }

    /// The byte a `<0xXX>` piece stands for, if `id` is such a piece
    pub fn byte_value(&self, id: TokenId) -> Option<u8> {
        self.entry(id)
            .filter(|entry| entry.kind == PieceType::Byte)
            .and_then(|entry| parse_byte_piece(&entry.piece))
    }
}

/// Byte fallback pieces are spelled `<0xAB>`, always with two upper case hex digits.
fn parse_byte_piece(piece: &str) -> Option<u8> {
    let hex = piece.strip_prefix("<0x")?.strip_suffix('>')?;
    if hex.len() != 2 {
        return None;
    }
    u8::from_str_radix(hex, 16).ok()
}
