//! Conversion between the ways a batch of strings can be handed to an operator.
use serde::{Deserialize, Serialize};
use snafu::OptionExt;
use std::sync::Arc;
use strum::{EnumIter, EnumString};
use tracing::*;

use crate::batch::DecomposedStrings;
use crate::config::WireFormat;
use crate::error::*;
use crate::packed::{self, PackedStrings};
use crate::tensor::{ElementType, TensorSpec};

/// A tensor of native strings, shared by reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NativeStrings {
    strings: Arc<[String]>,
}

impl NativeStrings {
    pub fn new<I, S>(strings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            strings: strings.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &str> + '_ {
        self.strings.iter().map(String::as_str)
    }
}

impl From<Vec<String>> for NativeStrings {
    fn from(strings: Vec<String>) -> Self {
        Self {
            strings: strings.into(),
        }
    }
}

/// A batch of strings in any of the representations an operator can receive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StringTensor<'a> {
    /// A single `u8` buffer in the packed format
    Packed(PackedStrings),

    /// The three arrays that a pack operation was built from, still attached
    Decomposed(DecomposedStrings<'a>),

    /// Native strings
    Native(NativeStrings),
}

impl StringTensor<'_> {
    /// Number of strings
    pub fn len(&self) -> usize {
        match self {
            StringTensor::Packed(packed) => packed.batch_size(),
            StringTensor::Decomposed(strings) => strings.len(),
            StringTensor::Native(strings) => strings.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The wire format an operator must be configured with to accept this tensor
    pub fn wire_format(&self) -> WireFormat {
        match self {
            StringTensor::Packed(_) => WireFormat::Packed,
            StringTensor::Decomposed(_) => WireFormat::Decomposed,
            StringTensor::Native(_) => WireFormat::Native,
        }
    }
}

impl From<PackedStrings> for StringTensor<'static> {
    fn from(packed: PackedStrings) -> Self {
        StringTensor::Packed(packed)
    }
}

impl<'a> From<DecomposedStrings<'a>> for StringTensor<'a> {
    fn from(strings: DecomposedStrings<'a>) -> Self {
        StringTensor::Decomposed(strings)
    }
}

impl From<NativeStrings> for StringTensor<'static> {
    fn from(strings: NativeStrings) -> Self {
        StringTensor::Native(strings)
    }
}

/// How begins and ends are laid out by a pack or unpack operation.
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
pub enum PackMode {
    /// Separate arrays of begin and end offsets
    #[default]
    BeginsEnds,
}

impl PackMode {
    /// Look up a mode by the name it goes by in a model, failing for unsupported modes.
    pub fn from_name(mode: &str) -> Result<Self> {
        mode.parse()
            .ok()
            .context(UnsupportedPackModeSnafu { mode })
    }
}

/// Packs and unpacks string tensors at operator boundaries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StringConverter {
    mode: PackMode,
}

impl StringConverter {
    pub fn new(mode: PackMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> PackMode {
        self.mode
    }

    /// Get the decomposed form of `tensor`.
    ///
    /// A decomposed tensor is passed through as-is, borrowing its arrays.  A packed tensor is
    /// decoded, borrowing its character bytes.  Native strings are laid out one after another in
    /// a new character pool.
    pub fn unpack<'t>(&self, tensor: &'t StringTensor<'_>) -> Result<DecomposedStrings<'t>> {
        let strings = match tensor {
            StringTensor::Decomposed(strings) => strings.borrowed(),
            StringTensor::Packed(packed) => packed::decode(packed.as_bytes())?,
            StringTensor::Native(strings) => DecomposedStrings::from_strings(strings.iter())?,
        };

        trace!(mode = %self.mode, batch_size = strings.len(), "Unpacked string tensor");
        Ok(strings)
    }

    /// Pack `strings` into a single buffer.
    ///
    /// The characters are copied into one contiguous pool in batch order, so gaps or overlaps
    /// between the ranges of `strings` don't survive.
    pub fn pack(&self, strings: &DecomposedStrings<'_>) -> Result<PackedStrings> {
        packed::encode(strings)
    }
}

/// A graph input whose type may not be known until a consumer claims it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Placeholder {
    name: String,
    spec: TensorSpec,
}

impl Placeholder {
    pub fn new(name: impl Into<String>, spec: TensorSpec) -> Self {
        Self {
            name: name.into(),
            spec,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spec(&self) -> &TensorSpec {
        &self.spec
    }

    /// Strings arrive at the graph boundary already packed, so a placeholder that doesn't have an
    /// element type yet becomes a `u8[?]` buffer.  Returns whether the placeholder was changed.
    ///
    /// This is a hook for graph builders: call it on the sentences input before handing the input
    /// specs to [`SentencepieceTokenizer::new`](crate::SentencepieceTokenizer::new) with the packed
    /// wire format.
    pub fn accept_packed_strings(&mut self) -> bool {
        if self.spec.element != ElementType::Dynamic {
            return false;
        }

        let packed = TensorSpec::vector(ElementType::U8);
        info!(
            placeholder = %self.name,
            from = %self.spec,
            to = %packed,
            "Overriding placeholder type to receive packed strings"
        );
        self.spec = packed;
        true
    }
}
