use snafu::Snafu;
use std::path::PathBuf;

use crate::{ModelKind, TokenId};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PiecewiseError {
    #[snafu(display("The model bytes are not a valid SentencePiece model protobuf"))]
    InvalidProto { source: prost::DecodeError },

    #[snafu(display("The model has no pieces"))]
    EmptyVocabulary,

    #[snafu(display("The model type {model_type} isn't one of the supported model types"))]
    UnsupportedModelType { model_type: i32 },

    #[snafu(display("Piece {id} has an unrecognized piece type {piece_type}"))]
    UnknownPieceType { id: usize, piece_type: i32 },

    #[snafu(display("Piece {id} is empty"))]
    EmptyPiece { id: usize },

    #[snafu(display(
        "The piece '{piece}' appears more than once in the vocabulary (ids {first} and {second})"
    ))]
    DuplicatePiece {
        piece: String,
        first: TokenId,
        second: TokenId,
    },

    #[snafu(display(
        "The {name} id {id} doesn't refer to a piece in a vocabulary of {vocab_size} pieces"
    ))]
    SpecialIdOutOfRange {
        name: &'static str,
        id: i32,
        vocab_size: usize,
    },

    #[snafu(display("The unknown piece id {id} must refer to a piece of type UNKNOWN"))]
    UnknownIdNotUnknown { id: TokenId },

    #[snafu(display("nbest_size {nbest_size} is out of range; it must be between 1 and {max}"))]
    NbestOutOfRange { nbest_size: usize, max: usize },

    #[snafu(display("N-best segmentation isn't available for {kind} models"))]
    NbestUnsupported { kind: ModelKind },

    #[snafu(display("Token id {id} isn't part of this model's vocabulary"))]
    UnknownTokenId { id: TokenId },

    #[snafu(display("File I/O error on file '{}'", path.display()))]
    FileIo {
        path: PathBuf,
        source: std::io::Error,
    },
}
