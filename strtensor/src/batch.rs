//! The decomposed representation of a batch of strings: begin offsets, end offsets, and one pool
//! of character bytes.
use snafu::{ensure, OptionExt};
use std::borrow::Cow;

use crate::error::*;

/// A batch of byte strings as three parallel arrays.
///
/// String `i` is `chars[begins[i]..ends[i]]`.  Ranges need not be contiguous or ordered, and may
/// overlap.  The arrays are validated on construction and can't be modified afterwards, so every
/// range is known to be in bounds.
///
/// The arrays are `Cow`s so a batch decoded from a packed buffer can borrow it rather than copy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecomposedStrings<'a> {
    begins: Cow<'a, [i32]>,
    ends: Cow<'a, [i32]>,
    chars: Cow<'a, [u8]>,
}

impl<'a> DecomposedStrings<'a> {
    /// Validate and wrap the three arrays.
    ///
    /// Fails if `begins` and `ends` differ in length, if any range is negative or inverted, or if
    /// any range extends past the end of `chars`.
    pub fn new(
        begins: impl Into<Cow<'a, [i32]>>,
        ends: impl Into<Cow<'a, [i32]>>,
        chars: impl Into<Cow<'a, [u8]>>,
    ) -> Result<Self> {
        let (begins, ends, chars) = (begins.into(), ends.into(), chars.into());

        ensure!(
            begins.len() == ends.len(),
            MismatchedLengthsSnafu {
                begins: begins.len(),
                ends: ends.len(),
            }
        );

        for (index, (&begin, &end)) in begins.iter().zip(ends.iter()).enumerate() {
            ensure!(
                0 <= begin && begin <= end,
                InvalidRangeSnafu { index, begin, end }
            );
            ensure!(
                end as usize <= chars.len(),
                TruncatedCharsSnafu {
                    required: end as usize,
                    actual: chars.len(),
                }
            );
        }

        Ok(Self {
            begins,
            ends,
            chars,
        })
    }

    /// An empty batch
    pub fn empty() -> Self {
        Self {
            begins: Cow::Borrowed(&[]),
            ends: Cow::Borrowed(&[]),
            chars: Cow::Borrowed(&[]),
        }
    }

    /// Lay `strings` out one after another in a single character pool.
    pub fn from_strings<I, S>(strings: I) -> Result<DecomposedStrings<'static>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        let mut begins = Vec::new();
        let mut ends = Vec::new();
        let mut chars = Vec::new();

        for string in strings {
            begins.push(offset(chars.len())?);
            chars.extend_from_slice(string.as_ref());
            ends.push(offset(chars.len())?);
        }

        Ok(DecomposedStrings {
            begins: begins.into(),
            ends: ends.into(),
            chars: chars.into(),
        })
    }

    /// Number of strings in the batch
    pub fn len(&self) -> usize {
        self.begins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.begins.is_empty()
    }

    pub fn begins(&self) -> &[i32] {
        &self.begins
    }

    pub fn ends(&self) -> &[i32] {
        &self.ends
    }

    pub fn chars(&self) -> &[u8] {
        &self.chars
    }

    /// The bytes of string `index`
    pub fn get(&self, index: usize) -> Option<&[u8]> {
        let begin = *self.begins.get(index)? as usize;
        let end = self.ends[index] as usize;
        Some(&self.chars[begin..end])
    }

    /// The bytes of each string, in batch order
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &[u8]> + '_ {
        self.begins
            .iter()
            .zip(self.ends.iter())
            .map(|(&begin, &end)| &self.chars[begin as usize..end as usize])
    }

    /// Whether the strings are packed back to back starting at 0, with no gaps or unused
    /// trailing bytes.  Only such batches survive packing unchanged.
    pub fn is_contiguous(&self) -> bool {
        let mut expected = 0;
        for (&begin, &end) in self.begins.iter().zip(self.ends.iter()) {
            if begin != expected {
                return false;
            }
            expected = end;
        }
        expected as usize == self.chars.len()
    }

    /// Total bytes across all strings, counting bytes shared by overlapping ranges once per string
    pub fn total_len(&self) -> usize {
        self.iter().map(<[u8]>::len).sum()
    }

    /// A view of this batch that borrows from it
    pub fn borrowed(&self) -> DecomposedStrings<'_> {
        DecomposedStrings {
            begins: Cow::Borrowed(&self.begins),
            ends: Cow::Borrowed(&self.ends),
            chars: Cow::Borrowed(&self.chars),
        }
    }

    pub fn into_owned(self) -> DecomposedStrings<'static> {
        DecomposedStrings {
            begins: Cow::Owned(self.begins.into_owned()),
            ends: Cow::Owned(self.ends.into_owned()),
            chars: Cow::Owned(self.chars.into_owned()),
        }
    }

    /// The three arrays, in the order `(begins, ends, chars)`
    pub fn into_parts(self) -> (Cow<'a, [i32]>, Cow<'a, [i32]>, Cow<'a, [u8]>) {
        (self.begins, self.ends, self.chars)
    }
}

impl Default for DecomposedStrings<'_> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Convert a byte offset to the 32 bit form string tensors store
pub(crate) fn offset(value: usize) -> Result<i32> {
    i32::try_from(value)
        .ok()
        .context(OffsetOverflowSnafu { total: value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn strings_in_any_order() {
        let batch = DecomposedStrings::new(vec![3, 0, 2], vec![5, 2, 2], &b"abcde"[..]).unwrap();

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.get(0), Some(&b"de"[..]));
        assert_eq!(batch.get(1), Some(&b"ab"[..]));
        assert_eq!(batch.get(2), Some(&b""[..]));
        assert_eq!(batch.get(3), None);
        assert_eq!(
            batch.iter().collect::<Vec<_>>(),
            [&b"de"[..], &b"ab"[..], &b""[..]]
        );
        assert!(!batch.is_contiguous());
        assert_eq!(batch.total_len(), 4);
    }

    #[test]
    fn from_strings_is_contiguous() {
        let batch = DecomposedStrings::from_strings(["ab", "", "c"]).unwrap();

        assert_eq!(batch.begins(), [0, 2, 2]);
        assert_eq!(batch.ends(), [2, 2, 3]);
        assert_eq!(batch.chars(), b"abc");
        assert!(batch.is_contiguous());

        let empty = DecomposedStrings::from_strings(Vec::<String>::new()).unwrap();
        assert!(empty.is_empty());
        assert!(empty.is_contiguous());
        assert_eq!(empty, DecomposedStrings::empty());
    }

    #[test]
    fn rejects_inconsistent_arrays() {
        assert_matches!(
            DecomposedStrings::new(vec![0, 1], vec![1], &b"ab"[..]),
            Err(StrTensorError::MismatchedLengths { begins: 2, ends: 1 })
        );
        assert_matches!(
            DecomposedStrings::new(vec![2], vec![1], &b"ab"[..]),
            Err(StrTensorError::InvalidRange {
                index: 0,
                begin: 2,
                end: 1
            })
        );
        assert_matches!(
            DecomposedStrings::new(vec![-1], vec![1], &b"ab"[..]),
            Err(StrTensorError::InvalidRange { .. })
        );
        assert_matches!(
            DecomposedStrings::new(vec![0, 1], vec![1, 3], &b"ab"[..]),
            Err(StrTensorError::TruncatedChars {
                required: 3,
                actual: 2
            })
        );
    }

    #[test]
    fn trailing_unused_bytes_are_not_contiguous() {
        let batch = DecomposedStrings::new(vec![0], vec![1], &b"ab"[..]).unwrap();
        assert!(!batch.is_contiguous());
    }

    #[test]
    fn borrowed_and_owned_views_are_equal() {
        let batch = DecomposedStrings::from_strings(["x", "yz"]).unwrap();

        assert_eq!(batch.borrowed(), batch);
        assert_eq!(batch.borrowed().into_owned(), batch);

        let (begins, ends, chars) = batch.into_parts();
        assert_eq!(&*begins, [0, 1]);
        assert_eq!(&*ends, [1, 3]);
        assert_eq!(&*chars, b"xyz");
    }
}
