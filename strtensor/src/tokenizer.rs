//! Tokenization of string batches with a SentencePiece model.
use piecewise::{SentencePieceModel, TokenId, MAX_NBEST_SIZE};
use snafu::{ensure, OptionExt, ResultExt};
use tracing::*;

use crate::batch::DecomposedStrings;
use crate::config::{OperatorConfig, TokenizerOptions, WireFormat};
use crate::convert::{StringConverter, StringTensor};
use crate::error::*;
use crate::sparse::SparseBatch;
use crate::tensor::{Dim, ElementType, TensorSpec};
use crate::TokenSequence;

/// Splits sentences into token ids.
///
/// The model is shared between clones, and encoding holds no mutable state, so a single engine
/// can tokenize from several threads at once.
#[derive(Clone, Debug)]
pub struct TokenizerEngine {
    model: SentencePieceModel,
    options: TokenizerOptions,
    bos: Option<i32>,
    eos: Option<i32>,
}

impl TokenizerEngine {
    /// Load the model from the serialized SentencePiece model in `model_bytes`.
    pub fn create(model_bytes: &[u8], options: TokenizerOptions) -> Result<Self> {
        let model =
            SentencePieceModel::from_serialized_proto(model_bytes).context(InvalidModelSnafu)?;
        Self::with_model(model, options)
    }

    pub fn with_model(model: SentencePieceModel, options: TokenizerOptions) -> Result<Self> {
        ensure!(
            options.nbest_size <= MAX_NBEST_SIZE as i32,
            NbestOutOfRangeSnafu {
                nbest_size: options.nbest_size,
                max: MAX_NBEST_SIZE,
            }
        );

        let bos = if options.add_bos {
            let id = model
                .bos_id()
                .context(MissingSpecialPieceSnafu { marker: "bos" })?;
            Some(token_id(id)?)
        } else {
            None
        };
        let eos = if options.add_eos {
            let id = model
                .eos_id()
                .context(MissingSpecialPieceSnafu { marker: "eos" })?;
            Some(token_id(id)?)
        } else {
            None
        };

        if options.reverse {
            warn!(
                "The reverse option is not supported and has no effect; sequences keep their order"
            );
        }

        debug!(
            kind = %model.kind(),
            pieces = model.len(),
            nbest_size = options.nbest_size,
            alpha = options.alpha,
            add_bos = options.add_bos,
            add_eos = options.add_eos,
            "Created tokenizer engine"
        );

        Ok(Self {
            model,
            options,
            bos,
            eos,
        })
    }

    pub fn model(&self) -> &SentencePieceModel {
        &self.model
    }

    pub fn options(&self) -> &TokenizerOptions {
        &self.options
    }

    /// Whether `reverse` was asked for.  It is accepted but never applied.
    pub fn reverse_requested(&self) -> bool {
        self.options.reverse
    }

    /// Token ids of one sentence.
    ///
    /// Deterministic when `nbest_size <= 1`; otherwise each call samples a segmentation.  An empty
    /// sentence has no ids at all, not even the boundary markers.
    pub fn encode_one(&self, sentence: &[u8]) -> Result<TokenSequence> {
        self.encode_row(0, sentence)
    }

    /// Token ids of every string in `batch`, in batch order.  The first failing row fails the
    /// whole batch.
    pub fn encode_batch(&self, batch: &DecomposedStrings<'_>) -> Result<Vec<TokenSequence>> {
        batch
            .iter()
            .enumerate()
            .map(|(index, sentence)| self.encode_row(index, sentence))
            .collect()
    }

    pub fn tokenize(&self, batch: &DecomposedStrings<'_>) -> Result<SparseBatch> {
        let sequences = self.encode_batch(batch)?;
        let sparse = SparseBatch::assemble(&sequences);

        trace!(
            batch_size = batch.len(),
            tokens = sparse.len(),
            "Tokenized batch"
        );
        Ok(sparse)
    }

    fn encode_row(&self, index: usize, sentence: &[u8]) -> Result<TokenSequence> {
        if sentence.is_empty() {
            return Ok(Vec::new());
        }

        let text = std::str::from_utf8(sentence).context(NotUtf8Snafu { index })?;
        let ids = match self.options.sampling_size() {
            Some(nbest_size) => self
                .model
                .sample_encode(text, nbest_size, self.options.alpha)
                .context(SegmentationSnafu { index })?,
            None => self.model.encode(text),
        };

        let mut sequence = Vec::with_capacity(ids.len() + 2);
        sequence.extend(self.bos);
        for id in ids {
            sequence.push(token_id(id)?);
        }
        sequence.extend(self.eos);
        Ok(sequence)
    }
}

fn token_id(id: TokenId) -> Result<i32> {
    i32::try_from(id).ok().context(TokenIdOverflowSnafu { id })
}

/// The tokenizer as a graph operator: checks its inputs once when it is built, then turns each
/// batch of sentences into a sparse tensor of token ids.
#[derive(Clone, Debug)]
pub struct SentencepieceTokenizer {
    engine: TokenizerEngine,
    config: OperatorConfig,
    converter: StringConverter,
}

impl SentencepieceTokenizer {
    /// Build the operator.
    ///
    /// `inputs` describes every operator input, the model included, and must match what
    /// `config.wire_format` expects.  `model` is the content of the model input.
    pub fn new(
        inputs: &[TensorSpec],
        model: &[u8],
        options: TokenizerOptions,
        config: OperatorConfig,
    ) -> Result<Self> {
        validate_inputs(config.wire_format, inputs)?;
        let engine = TokenizerEngine::create(model, options)?;

        Ok(Self {
            engine,
            config,
            converter: StringConverter::new(config.pack_mode),
        })
    }

    pub fn engine(&self) -> &TokenizerEngine {
        &self.engine
    }

    pub fn config(&self) -> &OperatorConfig {
        &self.config
    }

    /// Sparse indices, sparse values, and dense shape
    pub fn output_specs() -> [TensorSpec; 3] {
        [
            TensorSpec::new(ElementType::I64, [Dim::Dynamic, Dim::Fixed(2)]),
            TensorSpec::vector(ElementType::I32),
            TensorSpec::new(ElementType::I64, [Dim::Fixed(2)]),
        ]
    }

    /// Tokenize `sentences`, which must be in the wire format the operator was built for.
    pub fn evaluate(&self, sentences: &StringTensor<'_>) -> Result<SparseBatch> {
        ensure!(
            sentences.wire_format() == self.config.wire_format,
            WireFormatMismatchSnafu {
                expected: self.config.wire_format,
                actual: sentences.wire_format(),
            }
        );

        let batch = self.converter.unpack(sentences)?;
        self.engine.tokenize(&batch)
    }
}

fn validate_inputs(wire_format: WireFormat, inputs: &[TensorSpec]) -> Result<()> {
    let expected = wire_format.inputs();
    ensure!(
        inputs.len() == expected.len(),
        InputAritySnafu {
            wire_format,
            expected: expected.len(),
            actual: inputs.len(),
        }
    );

    for (index, (input, &(name, element))) in inputs.iter().zip(expected).enumerate() {
        ensure!(
            element.accepts(input.element),
            InputElementTypeSnafu {
                index,
                name,
                expected: element,
                actual: input.element,
            }
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::NativeStrings;
    use crate::test_helpers::{self, init_test_logging};
    use assert_matches::assert_matches;

    fn engine(options: TokenizerOptions) -> TokenizerEngine {
        TokenizerEngine::create(&test_helpers::model_bytes(), options).unwrap()
    }

    fn greedy() -> TokenizerEngine {
        engine(TokenizerOptions::default())
    }

    fn packed_inputs() -> Vec<TensorSpec> {
        vec![
            TensorSpec::vector(ElementType::U8),
            TensorSpec::vector(ElementType::U8),
        ]
    }

    #[test]
    fn encodes_one_sentence() {
        init_test_logging();
        let engine = greedy();

        assert_eq!(engine.encode_one(b"hello world").unwrap(), [5, 9]);
        assert!(engine.encode_one(b"").unwrap().is_empty());
    }

    #[test]
    fn greedy_encoding_is_deterministic() {
        for nbest_size in [-3, 0, 1] {
            let engine = engine(TokenizerOptions {
                nbest_size,
                alpha: 0.1,
                ..Default::default()
            });

            let first = engine.encode_one(b"hello world hello").unwrap();
            let second = engine.encode_one(b"hello world hello").unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn sampled_encoding_uses_model_pieces() {
        let engine = engine(TokenizerOptions {
            nbest_size: 8,
            alpha: 0.1,
            ..Default::default()
        });

        for _ in 0..20 {
            let ids = engine.encode_one(b"hello world").unwrap();
            let text = engine
                .model()
                .decode(&ids.iter().map(|&id| id as u32).collect::<Vec<_>>())
                .unwrap();
            assert_eq!(text, "hello world");
        }
    }

    #[test]
    fn boundary_markers() {
        let engine = engine(TokenizerOptions {
            add_bos: true,
            add_eos: true,
            ..Default::default()
        });
        let bos = engine.model().bos_id().unwrap() as i32;
        let eos = engine.model().eos_id().unwrap() as i32;

        let batch = DecomposedStrings::from_strings(["hello", "", "world hello"]).unwrap();
        let sequences = engine.encode_batch(&batch).unwrap();

        for sequence in sequences.iter().filter(|sequence| !sequence.is_empty()) {
            assert_eq!(sequence.first(), Some(&bos));
            assert_eq!(sequence.last(), Some(&eos));
        }
        assert!(sequences[1].is_empty());
        assert_eq!(sequences[0].len(), 3);
    }

    #[test]
    fn only_eos() {
        let engine = engine(TokenizerOptions {
            add_eos: true,
            ..Default::default()
        });
        assert_eq!(engine.encode_one(b"world").unwrap(), [9, 2]);
    }

    #[test]
    fn batch_order_is_preserved() {
        let engine = greedy();
        let rows = ["world", "", "hello world", "", "hello"];
        let batch = DecomposedStrings::from_strings(rows).unwrap();

        let sequences = engine.encode_batch(&batch).unwrap();

        assert_eq!(sequences.len(), rows.len());
        for (row, sequence) in rows.iter().zip(&sequences) {
            assert_eq!(sequence, &engine.encode_one(row.as_bytes()).unwrap());
        }
    }

    #[test]
    fn one_bad_row_fails_the_batch() {
        let engine = greedy();
        let batch =
            DecomposedStrings::from_strings([&b"hello"[..], &b"\xff\xfe"[..], &b"world"[..]])
                .unwrap();

        let err = engine.tokenize(&batch).unwrap_err();

        assert_matches!(err, StrTensorError::NotUtf8 { index: 1, .. });
        assert_eq!(err.kind(), ErrorKind::ModelRuntime);
    }

    #[test]
    fn construction_errors() {
        let err =
            TokenizerEngine::create(b"\xff\xff\xff", TokenizerOptions::default()).unwrap_err();
        assert_matches!(err, StrTensorError::InvalidModel { .. });
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err = TokenizerEngine::create(
            &test_helpers::model_bytes(),
            TokenizerOptions {
                nbest_size: 513,
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_matches!(err, StrTensorError::NbestOutOfRange { nbest_size: 513, .. });

        let err = TokenizerEngine::create(
            &test_helpers::model_bytes_without_specials(),
            TokenizerOptions {
                add_bos: true,
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_matches!(err, StrTensorError::MissingSpecialPiece { marker: "bos" });
    }

    #[test]
    fn reverse_is_inert() {
        init_test_logging();
        let engine = engine(TokenizerOptions {
            reverse: true,
            ..Default::default()
        });

        assert!(engine.reverse_requested());
        assert_eq!(engine.encode_one(b"hello world").unwrap(), [5, 9]);
    }

    #[test]
    fn engine_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TokenizerEngine>();

        let engine = greedy();
        std::thread::scope(|scope| {
            let handles = (0..4)
                .map(|_| scope.spawn(|| engine.encode_one(b"hello world").unwrap()))
                .collect::<Vec<_>>();
            for handle in handles {
                assert_eq!(handle.join().unwrap(), [5, 9]);
            }
        });
    }

    #[test]
    fn operator_checks_inputs_for_each_wire_format() {
        let model = test_helpers::model_bytes();
        let build = |inputs: &[TensorSpec], wire_format| {
            SentencepieceTokenizer::new(
                inputs,
                &model,
                TokenizerOptions::default(),
                OperatorConfig {
                    wire_format,
                    ..Default::default()
                },
            )
        };

        assert!(build(&packed_inputs(), WireFormat::Packed).is_ok());
        assert!(build(
            &[TensorSpec::vector(ElementType::U8), TensorSpec::dynamic()],
            WireFormat::Packed
        )
        .is_ok());
        assert!(build(
            &[
                TensorSpec::vector(ElementType::U8),
                TensorSpec::vector(ElementType::I32),
                TensorSpec::vector(ElementType::I32),
                TensorSpec::vector(ElementType::U8),
            ],
            WireFormat::Decomposed
        )
        .is_ok());
        assert!(build(
            &[
                TensorSpec::vector(ElementType::U8),
                TensorSpec::vector(ElementType::String)
            ],
            WireFormat::Native
        )
        .is_ok());

        assert_matches!(
            build(&packed_inputs(), WireFormat::Decomposed),
            Err(StrTensorError::InputArity {
                expected: 4,
                actual: 2,
                ..
            })
        );
        assert_matches!(
            build(&packed_inputs(), WireFormat::Native),
            Err(StrTensorError::InputElementType {
                index: 1,
                name: "sentences",
                expected: ElementType::String,
                actual: ElementType::U8,
            })
        );

        let err = build(&[TensorSpec::vector(ElementType::U8)], WireFormat::Packed).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(
            err.to_string(),
            "The packed wire format takes 2 inputs, but 1 were given"
        );
    }

    fn operator(wire_format: WireFormat) -> SentencepieceTokenizer {
        let inputs = wire_format
            .inputs()
            .iter()
            .map(|&(_, element)| TensorSpec::vector(element))
            .collect::<Vec<_>>();
        SentencepieceTokenizer::new(
            &inputs,
            &test_helpers::model_bytes(),
            TokenizerOptions::default(),
            OperatorConfig {
                wire_format,
                ..Default::default()
            },
        )
        .unwrap()
    }

    fn representations(rows: [&str; 3]) -> [StringTensor<'static>; 3] {
        let decomposed = DecomposedStrings::from_strings(rows).unwrap();
        let packed = StringConverter::default().pack(&decomposed).unwrap();
        [
            StringTensor::from(packed),
            StringTensor::from(decomposed),
            StringTensor::from(NativeStrings::new(rows)),
        ]
    }

    #[test]
    fn each_wire_format_evaluates_its_own_representation() {
        for tensor in representations(["hello world", "", "world"]) {
            let tokenizer = operator(tensor.wire_format());

            let sparse = tokenizer.evaluate(&tensor).unwrap();
            assert_eq!(sparse.indices(), [[0, 0], [0, 1], [2, 0]]);
            assert_eq!(sparse.values(), [5, 9, 9]);
            assert_eq!(sparse.dense_shape(), [3, 2]);
        }
    }

    #[test]
    fn other_representations_are_rejected() {
        let packed = operator(WireFormat::Packed);

        let err = packed
            .evaluate(&StringTensor::from(NativeStrings::new(["hello world"])))
            .unwrap_err();
        assert_matches!(
            err,
            StrTensorError::WireFormatMismatch {
                expected: WireFormat::Packed,
                actual: WireFormat::Native,
            }
        );
        assert_eq!(err.kind(), ErrorKind::Configuration);

        for wire_format in [WireFormat::Packed, WireFormat::Decomposed, WireFormat::Native] {
            let tokenizer = operator(wire_format);
            for tensor in representations(["hello world", "", "world"]) {
                assert_eq!(
                    tokenizer.evaluate(&tensor).is_ok(),
                    tensor.wire_format() == wire_format
                );
            }
        }
    }

    #[test]
    fn output_specs() {
        let [indices, values, shape] = SentencepieceTokenizer::output_specs();
        assert_eq!(indices.to_string(), "i64[?,2]");
        assert_eq!(values.to_string(), "i32[?]");
        assert_eq!(shape.to_string(), "i64[2]");
    }
}
