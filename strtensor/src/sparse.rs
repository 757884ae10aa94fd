use serde::Serialize;

use crate::TokenSequence;

/// Token ids for a whole batch as a sparse matrix in coordinate (COO) form.
///
/// Row `i` of the matrix holds the ids of sentence `i`.  There is one coordinate per token, rows
/// in batch order and positions in order within each row.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SparseBatch {
    indices: Vec<[i64; 2]>,
    values: Vec<i32>,
    dense_shape: [i64; 2],
}

impl SparseBatch {
    pub fn assemble(sequences: &[TokenSequence]) -> Self {
        let total = sequences.iter().map(Vec::len).sum();
        let mut indices = Vec::with_capacity(total);
        let mut values = Vec::with_capacity(total);
        let mut max_len = 0;

        for (row, sequence) in sequences.iter().enumerate() {
            for (position, &id) in sequence.iter().enumerate() {
                indices.push([row as i64, position as i64]);
                values.push(id);
            }
            max_len = max_len.max(sequence.len());
        }

        Self {
            indices,
            values,
            dense_shape: [sequences.len() as i64, max_len as i64],
        }
    }

    /// `(row, position)` of each token
    pub fn indices(&self) -> &[[i64; 2]] {
        &self.indices
    }

    /// The indices as the flat row-major buffer of an `[M, 2]` tensor
    pub fn indices_flat(&self) -> Vec<i64> {
        self.indices.iter().flatten().copied().collect()
    }

    pub fn values(&self) -> &[i32] {
        &self.values
    }

    /// `[batch size, longest sequence]`
    pub fn dense_shape(&self) -> [i64; 2] {
        self.dense_shape
    }

    /// Total number of tokens
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Expand back into one sequence per row
    pub fn to_sequences(&self) -> Vec<TokenSequence> {
        let mut sequences = vec![Vec::new(); self.dense_shape[0] as usize];
        for (&[row, _], &id) in self.indices.iter().zip(&self.values) {
            sequences[row as usize].push(id);
        }
        sequences
    }
}
