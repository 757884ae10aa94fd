use rand::RngCore;
use snafu::{ensure, OptionExt, ResultExt};
use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;
use strum::{EnumIter, EnumString};
use tracing::*;

mod bpe;
mod error;
mod normalizer;
pub mod proto;
mod token;
mod unigram;
mod vocab;
mod word;

pub use error::*;
pub use token::*;

use normalizer::Normalizer;
use proto::{ModelProto, ModelType, PieceType};
use token::Segment;
use vocab::Vocab;

pub type Result<T> = std::result::Result<T, PiecewiseError>;

/// The largest n-best size accepted by [`SentencePieceModel::nbest_encode`] and
/// [`SentencePieceModel::sample_encode`]
pub const MAX_NBEST_SIZE: usize = 512;

/// The segmentation algorithm a model was trained for
#[derive(Clone, Copy, Debug, Eq, PartialEq, EnumString, EnumIter, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ModelKind {
    Unigram,
    Bpe,
    Word,
    Char,
}

impl From<ModelType> for ModelKind {
    fn from(typ: ModelType) -> Self {
        match typ {
            ModelType::Unigram => ModelKind::Unigram,
            ModelType::Bpe => ModelKind::Bpe,
            ModelType::Word => ModelKind::Word,
            ModelType::Char => ModelKind::Char,
        }
    }
}

/// A loaded SentencePiece model.
///
/// With a model, text can be segmented into pieces, represented by their integer ids, and ids can
/// be decoded back into text.
///
/// Instances are immutable once loaded and are cheap to clone.  They are also thread safe;
/// encoding holds no mutable state, and sampling draws from a random number generator supplied
/// per call.
#[derive(Clone)]
pub struct SentencePieceModel {
    inner: Arc<ModelInner>,
}

struct ModelInner {
    kind: ModelKind,
    vocab: Vocab,
    normalizer: Normalizer,

    /// Decompose unknown pieces into `<0xXX>` byte pieces
    byte_fallback: bool,

    /// What unknown pieces decode to
    unk_surface: String,
}

impl Debug for SentencePieceModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentencePieceModel")
            .field("kind", &self.inner.kind)
            .field("pieces", &self.inner.vocab.len())
            .field("byte_fallback", &self.inner.byte_fallback)
            .finish()
    }
}

impl SentencePieceModel {
    /// Load a model from the bytes of a serialized `ModelProto`, as found in a `.model` file.
    pub fn from_serialized_proto(bytes: &[u8]) -> Result<Self> {
        let proto = ModelProto::decode_from(bytes).context(InvalidProtoSnafu)?;
        Self::from_proto(&proto)
    }

    /// Load a model from a `.model` file on disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).with_context(|_| FileIoSnafu {
            path: path.to_path_buf(),
        })?;

        debug!(path = %path.display(), bytes = bytes.len(), "Read model file");
        Self::from_serialized_proto(&bytes)
    }

    pub fn from_proto(proto: &ModelProto) -> Result<Self> {
        let trainer = proto.trainer_spec.clone().unwrap_or_default();
        let normalizer_spec = proto.normalizer_spec.clone().unwrap_or_default();

        let kind = match trainer.model_type {
            None => ModelKind::Unigram,
            Some(raw) => ModelType::try_from(raw)
                .ok()
                .map(ModelKind::from)
                .context(UnsupportedModelTypeSnafu { model_type: raw })?,
        };

        let vocab = Vocab::new(&proto.pieces, &trainer)?;

        if normalizer_spec
            .precompiled_charsmap
            .as_ref()
            .is_some_and(|rules| !rules.is_empty())
        {
            warn!(
                normalizer = normalizer_spec.name(),
                "The model carries compiled Unicode normalization rules.  These are not applied; \
                text is segmented as-is apart from whitespace handling"
            );
        }

        debug!(
            %kind,
            pieces = vocab.len(),
            byte_fallback = trainer.byte_fallback(),
            "Loaded SentencePiece model"
        );

        Ok(Self {
            inner: Arc::new(ModelInner {
                kind,
                normalizer: Normalizer::new(&normalizer_spec, &trainer),
                byte_fallback: trainer.byte_fallback(),
                unk_surface: trainer
                    .unk_surface
                    .clone()
                    .unwrap_or_else(|| DEFAULT_UNK_SURFACE.to_string()),
                vocab,
            }),
        })
    }

    pub fn kind(&self) -> ModelKind {
        self.inner.kind
    }

    /// The number of pieces in the vocabulary
    pub fn len(&self) -> usize {
        self.inner.vocab.len()
    }

    /// Always false for a loaded model, since an empty vocabulary fails to load
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn byte_fallback(&self) -> bool {
        self.inner.byte_fallback
    }

    pub fn unk_id(&self) -> TokenId {
        self.inner.vocab.unk_id()
    }

    /// The id of the beginning of sentence piece, if the model has one
    pub fn bos_id(&self) -> Option<TokenId> {
        self.inner.vocab.bos_id()
    }

    /// The id of the end of sentence piece, if the model has one
    pub fn eos_id(&self) -> Option<TokenId> {
        self.inner.vocab.eos_id()
    }

    pub fn pad_id(&self) -> Option<TokenId> {
        self.inner.vocab.pad_id()
    }

    pub fn piece_to_id(&self, piece: &str) -> Option<TokenId> {
        self.inner.vocab.id_of(piece)
    }

    pub fn id_to_piece(&self, id: TokenId) -> Option<&str> {
        self.inner.vocab.entry(id).map(|entry| entry.piece.as_str())
    }

    pub(crate) fn vocab(&self) -> &Vocab {
        &self.inner.vocab
    }

    /// Segment `text` into the single best sequence of pieces.
    ///
    /// This is deterministic: the same model and text always produce the same ids.  Text that is
    /// empty, or only whitespace, has no pieces.
    pub fn encode(&self, text: &str) -> Vec<TokenId> {
        let normalized = self.inner.normalizer.normalize(text);
        let vocab = &self.inner.vocab;

        let segments = match self.inner.kind {
            ModelKind::Unigram => unigram::Lattice::new(&normalized, vocab).viterbi(),
            ModelKind::Bpe => bpe::byte_pair_encode(&normalized, vocab, None),
            ModelKind::Word => word::encode_words(
                &normalized,
                vocab,
                self.inner.normalizer.treat_whitespace_as_suffix(),
            ),
            ModelKind::Char => word::encode_chars(&normalized, vocab),
        };

        self.finish(&normalized, segments)
    }

    /// The `nbest_size` best segmentations of `text`, best first, each with its score.
    ///
    /// Only unigram models score alternative segmentations, so this fails for any other kind of
    /// model.
    pub fn nbest_encode(&self, text: &str, nbest_size: usize) -> Result<Vec<(Vec<TokenId>, f32)>> {
        check_nbest_size(nbest_size)?;
        ensure!(
            self.inner.kind == ModelKind::Unigram,
            NbestUnsupportedSnafu {
                kind: self.inner.kind
            }
        );

        let normalized = self.inner.normalizer.normalize(text);
        Ok(unigram::Lattice::new(&normalized, &self.inner.vocab)
            .nbest(nbest_size)
            .into_iter()
            .map(|(segments, score)| (self.finish(&normalized, segments), score))
            .collect())
    }

    /// Segment `text` with subword regularization, drawing randomness from the thread local RNG.
    ///
    /// See [`Self::sample_encode_with_rng`].
    pub fn sample_encode(&self, text: &str, nbest_size: usize, alpha: f32) -> Result<Vec<TokenId>> {
        self.sample_encode_with_rng(text, nbest_size, alpha, &mut rand::thread_rng())
    }

    /// Segment `text` with subword regularization, so that repeated calls may produce different
    /// segmentations of the same text.
    ///
    /// - Unigram models sample one of the `nbest_size` best segmentations, each with probability
    ///   proportional to `exp(alpha * score)`.  Smaller `alpha` flattens the distribution.
    /// - BPE models apply BPE-dropout, skipping each merge with probability `alpha`.
    /// - Word and char models have only one possible segmentation.
    ///
    /// With `nbest_size == 1` this is the same as [`Self::encode`].
    pub fn sample_encode_with_rng(
        &self,
        text: &str,
        nbest_size: usize,
        alpha: f32,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<TokenId>> {
        check_nbest_size(nbest_size)?;
        if nbest_size == 1 {
            return Ok(self.encode(text));
        }

        let normalized = self.inner.normalizer.normalize(text);
        let vocab = &self.inner.vocab;

        let segments = match self.inner.kind {
            ModelKind::Unigram => {
                unigram::Lattice::new(&normalized, vocab).sample_nbest(nbest_size, alpha, rng)
            }
            ModelKind::Bpe => bpe::byte_pair_encode(
                &normalized,
                vocab,
                Some(bpe::Dropout {
                    probability: alpha,
                    rng,
                }),
            ),
            ModelKind::Word | ModelKind::Char => return Ok(self.encode(text)),
        };

        Ok(self.finish(&normalized, segments))
    }

    /// Decode ids back into text.
    ///
    /// Control pieces (such as `<s>`) produce no text, byte pieces are reassembled into the bytes
    /// they stand for, and unknown pieces produce the model's unknown surface string.  Byte
    /// sequences that are not valid UTF-8 are replaced with U+FFFD.
    pub fn decode(&self, ids: &[TokenId]) -> Result<String> {
        let vocab = &self.inner.vocab;
        let mut bytes = Vec::new();

        for &id in ids {
            let entry = vocab.entry(id).context(UnknownTokenIdSnafu { id })?;
            match entry.kind {
                PieceType::Control => {}
                PieceType::Unknown => bytes.extend_from_slice(self.inner.unk_surface.as_bytes()),
                PieceType::Byte => match vocab.byte_value(id) {
                    Some(byte) => bytes.push(byte),
                    None => bytes.extend_from_slice(entry.piece.as_bytes()),
                },
                _ => {
                    let piece = entry.piece.as_str();
                    // The dummy prefix added during normalization doesn't belong in the output
                    let piece = if bytes.is_empty()
                        && self.inner.normalizer.add_dummy_prefix()
                        && !self.inner.normalizer.treat_whitespace_as_suffix()
                    {
                        piece.strip_prefix(WHITESPACE_MARKER).unwrap_or(piece)
                    } else {
                        piece
                    };
                    bytes.extend_from_slice(piece.as_bytes());
                }
            }
        }

        let mut text = String::from_utf8_lossy(&bytes).replace(WHITESPACE_MARKER, " ");
        if self.inner.normalizer.add_dummy_prefix()
            && self.inner.normalizer.treat_whitespace_as_suffix()
            && text.ends_with(' ')
        {
            text.pop();
        }
        Ok(text)
    }

    /// Turn segments into ids, merging runs of unknown pieces or, with byte fallback, spelling
    /// them out as byte pieces.
    fn finish(&self, normalized: &str, segments: Vec<Segment>) -> Vec<TokenId> {
        let vocab = &self.inner.vocab;
        let unk_id = vocab.unk_id();

        let mut ids = Vec::with_capacity(segments.len());
        let mut prev_unknown = false;
        for segment in segments {
            if segment.id != unk_id {
                prev_unknown = false;
                ids.push(segment.id);
            } else if self.inner.byte_fallback {
                ids.extend(
                    normalized[segment.range]
                        .bytes()
                        .map(|byte| vocab.byte_id(byte).unwrap_or(unk_id)),
                );
            } else if !prev_unknown {
                prev_unknown = true;
                ids.push(unk_id);
            }
        }
        ids
    }
}

fn check_nbest_size(nbest_size: usize) -> Result<()> {
    ensure!(
        (1..=MAX_NBEST_SIZE).contains(&nbest_size),
        NbestOutOfRangeSnafu {
            nbest_size,
            max: MAX_NBEST_SIZE
        }
    );
    Ok(())
}
