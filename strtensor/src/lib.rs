//! Batches of variable length strings carried as flat numeric tensors, and a SentencePiece
//! tokenizer operator that turns such a batch into a sparse tensor of token ids.
//!
//! A batch moves through the crate like this:
//!
//! - it arrives as a [`StringTensor`]: a packed `u8` buffer (see [`packed`]), the three
//!   decomposed arrays, or native strings;
//! - a [`StringConverter`] unpacks it into [`DecomposedStrings`];
//! - a [`TokenizerEngine`] segments each string into a [`TokenSequence`];
//! - [`SparseBatch::assemble`] turns the sequences into COO sparse tensor data.
mod batch;
mod config;
mod convert;
mod error;
pub mod packed;
mod sparse;
mod tensor;
mod tokenizer;

pub use batch::DecomposedStrings;
pub use config::{OperatorConfig, TokenizerOptions, WireFormat};
pub use convert::{NativeStrings, PackMode, Placeholder, StringConverter, StringTensor};
pub use error::{ErrorKind, Result, StrTensorError};
pub use packed::PackedStrings;
pub use sparse::SparseBatch;
pub use tensor::{Dim, ElementType, TensorSpec};
pub use tokenizer::{SentencepieceTokenizer, TokenizerEngine};

/// Token ids of one string, in order
pub type TokenSequence = Vec<i32>;
