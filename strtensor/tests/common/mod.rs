//! Model fixtures shared by the integration tests
use piecewise::proto::{ModelProto, ModelType, NormalizerSpec, Piece, PieceType, TrainerSpec};

/// A BPE model over the letters `a`, `b` and `c`.
///
/// ids: `<unk>` 0, `<s>` 1, `</s>` 2, `▁` 3, `a` 4, `b` 5, `c` 6, `ab` 7, `▁a` 8, `▁ab` 9
pub fn bpe_model() -> Vec<u8> {
    let pieces = vec![
        Piece::new("<unk>", 0.0, PieceType::Unknown),
        Piece::new("<s>", 0.0, PieceType::Control),
        Piece::new("</s>", 0.0, PieceType::Control),
        Piece::new("\u{2581}", -10.0, PieceType::Normal),
        Piece::new("a", -10.0, PieceType::Normal),
        Piece::new("b", -10.0, PieceType::Normal),
        Piece::new("c", -10.0, PieceType::Normal),
        Piece::new("ab", -1.0, PieceType::Normal),
        Piece::new("\u{2581}a", -2.0, PieceType::Normal),
        Piece::new("\u{2581}ab", -3.0, PieceType::Normal),
    ];

    ModelProto {
        pieces,
        trainer_spec: Some(TrainerSpec {
            model_type: Some(ModelType::Bpe as i32),
            ..Default::default()
        }),
        normalizer_spec: Some(NormalizerSpec::default()),
    }
    .to_bytes()
}

/// Lay `words` and `chars` out in the packed string format by hand
pub fn packed(words: &[i32], chars: &[u8]) -> Vec<u8> {
    let mut bytes = words
        .iter()
        .flat_map(|word| word.to_ne_bytes())
        .collect::<Vec<_>>();
    bytes.extend_from_slice(chars);
    bytes
}
