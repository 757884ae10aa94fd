//! Construction time settings for the tokenizer engine and operator.
use serde::{Deserialize, Serialize};
use strum::{EnumIter, EnumString};

use crate::{ElementType, PackMode};

/// Knobs of the SentencePiece tokenizer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerOptions {
    /// Number of best segmentations to sample from.  0 or 1 (or negative) always picks the single
    /// best segmentation.
    pub nbest_size: i32,

    /// Sampling smoothing; only used when `nbest_size > 1`.  For BPE models this is the dropout
    /// probability.
    pub alpha: f32,

    /// Start every non-empty sequence with the beginning of sentence id
    pub add_bos: bool,

    /// End every non-empty sequence with the end of sentence id
    pub add_eos: bool,

    /// Accepted for compatibility, has no effect
    pub reverse: bool,
}

impl Default for TokenizerOptions {
    fn default() -> Self {
        Self {
            nbest_size: 0,
            alpha: 1.0,
            add_bos: false,
            add_eos: false,
            reverse: false,
        }
    }
}

impl TokenizerOptions {
    /// The number of candidates to sample from, or `None` if segmentation is deterministic
    pub fn sampling_size(&self) -> Option<usize> {
        (self.nbest_size > 1).then_some(self.nbest_size as usize)
    }
}

/// How sentences arrive at the tokenizer operator.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    EnumIter,
    strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WireFormat {
    /// One `u8` tensor in the packed string format
    #[default]
    Packed,

    /// Three tensors of begin offsets, end offsets and characters
    Decomposed,

    /// One tensor of native strings
    Native,
}

impl WireFormat {
    /// Names and element types of the operator inputs, the model first
    pub fn inputs(self) -> &'static [(&'static str, ElementType)] {
        match self {
            WireFormat::Packed => &[("model", ElementType::U8), ("sentences", ElementType::U8)],
            WireFormat::Decomposed => &[
                ("model", ElementType::U8),
                ("begins", ElementType::I32),
                ("ends", ElementType::I32),
                ("chars", ElementType::U8),
            ],
            WireFormat::Native => &[
                ("model", ElementType::U8),
                ("sentences", ElementType::String),
            ],
        }
    }
}

/// How an operator is wired into its surroundings.  Fixed when the operator is constructed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    pub wire_format: WireFormat,
    pub pack_mode: PackMode,
}
