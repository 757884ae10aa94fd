use snafu::Snafu;

use crate::{ElementType, WireFormat};

pub type Result<T, E = StrTensorError> = std::result::Result<T, E>;

/// The broad class of an error, which says when it can happen and how much work it aborts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub enum ErrorKind {
    /// Raised while constructing an engine or operator, before any data flows
    Configuration,

    /// A packed buffer or decomposed batch is malformed; aborts the call that found it
    Format,

    /// Segmenting one batch element failed; aborts the whole batch
    ModelRuntime,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StrTensorError {
    #[snafu(display("The tokenizer model could not be loaded"))]
    InvalidModel { source: piecewise::PiecewiseError },

    #[snafu(display(
        "The {wire_format} wire format takes {expected} inputs, but {actual} were given"
    ))]
    InputArity {
        wire_format: WireFormat,
        expected: usize,
        actual: usize,
    },

    #[snafu(display(
        "Input {index} ('{name}') must have element type {expected}, but it has {actual}"
    ))]
    InputElementType {
        index: usize,
        name: &'static str,
        expected: ElementType,
        actual: ElementType,
    },

    #[snafu(display(
        "The operator was configured for the {expected} wire format, but was given a {actual} \
        string tensor"
    ))]
    WireFormatMismatch {
        expected: WireFormat,
        actual: WireFormat,
    },

    #[snafu(display("add_{marker} was requested but the model has no {marker} piece"))]
    MissingSpecialPiece { marker: &'static str },

    #[snafu(display("nbest_size {nbest_size} is larger than the maximum of {max}"))]
    NbestOutOfRange { nbest_size: i32, max: usize },

    #[snafu(display("The pack mode '{mode}' isn't supported; the only mode is 'begins_ends'"))]
    UnsupportedPackMode { mode: String },

    #[snafu(display(
        "Incorrect packed string tensor format: {len} bytes is too short to hold the batch size"
    ))]
    TruncatedHeader { len: usize },

    #[snafu(display("Incorrect packed string tensor format: negative batch size {batch_size}"))]
    NegativeBatchSize { batch_size: i32 },

    #[snafu(display(
        "Incorrect packed string tensor format: a batch of {batch_size} needs at least {required} \
        bytes for the first string offset and end indices, but there are {actual}"
    ))]
    TruncatedOffsets {
        batch_size: usize,
        required: usize,
        actual: usize,
    },

    #[snafu(display(
        "String data ends at offset {required}, but there are only {actual} character bytes"
    ))]
    TruncatedChars { required: usize, actual: usize },

    #[snafu(display("String {index} has an invalid byte range {begin}..{end}"))]
    InvalidRange { index: usize, begin: i32, end: i32 },

    #[snafu(display("There are {begins} begin offsets but {ends} end offsets"))]
    MismatchedLengths { begins: usize, ends: usize },

    #[snafu(display("{total} doesn't fit in the 32 bit offsets of a string tensor"))]
    OffsetOverflow { total: usize },

    #[snafu(display("Sentence {index} is not valid UTF-8"))]
    NotUtf8 {
        index: usize,
        source: std::str::Utf8Error,
    },

    #[snafu(display("Segmenting sentence {index} failed"))]
    Segmentation {
        index: usize,
        source: piecewise::PiecewiseError,
    },

    #[snafu(display("Token id {id} doesn't fit in a 32 bit signed integer"))]
    TokenIdOverflow { id: u32 },
}

impl StrTensorError {
    pub fn kind(&self) -> ErrorKind {
        use StrTensorError::*;

        match self {
            InvalidModel { .. }
            | InputArity { .. }
            | InputElementType { .. }
            | WireFormatMismatch { .. }
            | MissingSpecialPiece { .. }
            | NbestOutOfRange { .. }
            | UnsupportedPackMode { .. } => ErrorKind::Configuration,

            TruncatedHeader { .. }
            | NegativeBatchSize { .. }
            | TruncatedOffsets { .. }
            | TruncatedChars { .. }
            | InvalidRange { .. }
            | MismatchedLengths { .. }
            | OffsetOverflow { .. } => ErrorKind::Format,

            NotUtf8 { .. } | Segmentation { .. } | TokenIdOverflow { .. } => {
                ErrorKind::ModelRuntime
            }
        }
    }
}
