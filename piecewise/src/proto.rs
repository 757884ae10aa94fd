//! The subset of the SentencePiece `ModelProto` protobuf schema that segmentation needs.
//!
//! Field numbers follow `sentencepiece_model.proto`.  Fields that aren't listed here (self test
//! data, the denormalizer, most of the trainer options) are skipped by `prost` while decoding,
//! so any model file written by the SentencePiece trainer can be loaded.
use prost::Message;

/// A serialized SentencePiece model.
#[derive(Clone, PartialEq, Message)]
pub struct ModelProto {
    /// The vocabulary.  A piece's id is its index in this list.
    #[prost(message, repeated, tag = "1")]
    pub pieces: Vec<Piece>,

    #[prost(message, optional, tag = "2")]
    pub trainer_spec: Option<TrainerSpec>,

    #[prost(message, optional, tag = "3")]
    pub normalizer_spec: Option<NormalizerSpec>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Piece {
    #[prost(string, optional, tag = "1")]
    pub piece: Option<String>,

    /// Log probability for unigram models, merge priority for BPE models
    #[prost(float, optional, tag = "2")]
    pub score: Option<f32>,

    #[prost(enumeration = "PieceType", optional, tag = "3", default = "Normal")]
    pub r#type: Option<i32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum PieceType {
    Normal = 1,
    Unknown = 2,
    Control = 3,
    UserDefined = 4,
    Unused = 5,
    Byte = 6,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ModelType {
    Unigram = 1,
    Bpe = 2,
    Word = 3,
    Char = 4,
}

#[derive(Clone, PartialEq, Message)]
pub struct TrainerSpec {
    #[prost(enumeration = "ModelType", optional, tag = "3", default = "Unigram")]
    pub model_type: Option<i32>,

    #[prost(int32, optional, tag = "4", default = "8000")]
    pub vocab_size: Option<i32>,

    #[prost(bool, optional, tag = "24", default = "false")]
    pub treat_whitespace_as_suffix: Option<bool>,

    #[prost(bool, optional, tag = "35", default = "false")]
    pub byte_fallback: Option<bool>,

    #[prost(int32, optional, tag = "40", default = "0")]
    pub unk_id: Option<i32>,

    #[prost(int32, optional, tag = "41", default = "1")]
    pub bos_id: Option<i32>,

    #[prost(int32, optional, tag = "42", default = "2")]
    pub eos_id: Option<i32>,

    #[prost(int32, optional, tag = "43", default = "-1")]
    pub pad_id: Option<i32>,

    /// What an unknown piece decodes to
    #[prost(string, optional, tag = "44")]
    pub unk_surface: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct NormalizerSpec {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,

    /// Compiled Unicode normalization rules.  Carried through decoding but never applied.
    #[prost(bytes = "vec", optional, tag = "2")]
    pub precompiled_charsmap: Option<Vec<u8>>,

    #[prost(bool, optional, tag = "3", default = "true")]
    pub add_dummy_prefix: Option<bool>,

    #[prost(bool, optional, tag = "4", default = "true")]
    pub remove_extra_whitespaces: Option<bool>,

    #[prost(bool, optional, tag = "5", default = "true")]
    pub escape_whitespaces: Option<bool>,
}

impl Piece {
    /// Convenience constructor, mostly useful for building models by hand.
    pub fn new(piece: impl Into<String>, score: f32, typ: PieceType) -> Self {
        Self {
            piece: Some(piece.into()),
            score: Some(score),
            r#type: Some(typ as i32),
        }
    }

    /// The piece type, or `None` if the model file contains a type this version doesn't know.
    pub fn piece_type(&self) -> Option<PieceType> {
        match self.r#type {
            None => Some(PieceType::Normal),
            Some(raw) => PieceType::try_from(raw).ok(),
        }
    }
}

impl ModelProto {
    pub fn decode_from(bytes: &[u8]) -> Result<Self, prost::DecodeError> {
        Self::decode(bytes)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_fields_take_sentencepiece_defaults() {
        let spec = TrainerSpec::default();
        assert_eq!(spec.unk_id(), 0);
        assert_eq!(spec.bos_id(), 1);
        assert_eq!(spec.eos_id(), 2);
        assert_eq!(spec.pad_id(), -1);
        assert_eq!(spec.model_type(), ModelType::Unigram);

        let normalizer = NormalizerSpec::default();
        assert!(normalizer.add_dummy_prefix());
        assert!(normalizer.remove_extra_whitespaces());
        assert!(normalizer.escape_whitespaces());
    }

    #[test]
    fn survives_serialization() {
        let proto = ModelProto {
            pieces: vec![
                Piece::new("<unk>", 0.0, PieceType::Unknown),
                Piece::new("\u{2581}a", -1.5, PieceType::Normal),
            ],
            trainer_spec: Some(TrainerSpec {
                model_type: Some(ModelType::Bpe as i32),
                ..Default::default()
            }),
            normalizer_spec: None,
        };

        let decoded = ModelProto::decode_from(&proto.to_bytes()).unwrap();
        assert_eq!(decoded, proto);
        assert_eq!(decoded.pieces[0].piece_type(), Some(PieceType::Unknown));
    }

    #[test]
    fn unknown_piece_type_is_reported() {
        let piece = Piece {
            piece: Some("x".to_string()),
            score: None,
            r#type: Some(42),
        };
        assert_eq!(piece.piece_type(), None);
    }
}
