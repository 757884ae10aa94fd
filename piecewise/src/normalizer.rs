//! Whitespace handling applied to text before segmentation.
//!
//! SentencePiece models can also carry compiled Unicode normalization rules.  Those are not
//! applied here; text is segmented exactly as given apart from the whitespace rules below.
use crate::proto::{NormalizerSpec, TrainerSpec};
use crate::WHITESPACE_MARKER;

#[derive(Clone, Debug)]
pub(crate) struct Normalizer {
    add_dummy_prefix: bool,
    remove_extra_whitespaces: bool,
    escape_whitespaces: bool,
    treat_whitespace_as_suffix: bool,
}

impl Normalizer {
    pub fn new(spec: &NormalizerSpec, trainer: &TrainerSpec) -> Self {
        Self {
            add_dummy_prefix: spec.add_dummy_prefix(),
            remove_extra_whitespaces: spec.remove_extra_whitespaces(),
            escape_whitespaces: spec.escape_whitespaces(),
            treat_whitespace_as_suffix: trainer.treat_whitespace_as_suffix(),
        }
    }

    pub fn add_dummy_prefix(&self) -> bool {
        self.add_dummy_prefix
    }

    pub fn treat_whitespace_as_suffix(&self) -> bool {
        self.treat_whitespace_as_suffix
    }

    /// Normalize `text`.  The result is empty iff there is nothing to segment.
    pub fn normalize(&self, text: &str) -> String {
        let body = if self.remove_extra_whitespaces {
            text.split(' ')
                .filter(|word| !word.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        } else {
            text.to_string()
        };

        if body.is_empty() {
            return body;
        }

        let mut normalized = String::with_capacity(body.len() + 1);
        if self.add_dummy_prefix && !self.treat_whitespace_as_suffix {
            normalized.push(' ');
        }
        normalized.push_str(&body);
        if self.add_dummy_prefix && self.treat_whitespace_as_suffix {
            normalized.push(' ');
        }

        if self.escape_whitespaces {
            normalized.replace(' ', WHITESPACE_MARKER.encode_utf8(&mut [0; 4]))
        } else {
            normalized
        }
    }
}
