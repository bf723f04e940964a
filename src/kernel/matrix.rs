use crate::Count;
use crate::Likelihood;
use crate::Probability;

/// one transition matrix for a fixed (branch, rates) triple.
/// square, side = max family size + 1, row i = distribution of
/// descendant sizes given i ancestral genes. row 0 is the absorbing
/// extinction row.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    side: usize,
    rows: Vec<Probability>,
}

impl Transition {
    pub fn zeros(side: usize) -> Self {
        Self {
            side,
            rows: vec![0.0; side * side],
        }
    }

    pub fn identity(side: usize) -> Self {
        let mut matrix = Self::zeros(side);
        for i in 0..side {
            matrix.set(i, i, 1.0);
        }
        matrix
    }

    pub fn side(&self) -> usize {
        self.side
    }

    pub fn get(&self, i: Count, j: Count) -> Probability {
        self.rows[i * self.side + j]
    }

    pub(crate) fn set(&mut self, i: Count, j: Count, p: Probability) {
        self.rows[i * self.side + j] = p;
    }

    pub fn row(&self, i: Count) -> &[Probability] {
        &self.rows[i * self.side..(i + 1) * self.side]
    }

    /// row i dotted against a likelihood vector
    pub fn dot(&self, i: Count, vector: &[Likelihood]) -> Likelihood {
        self.row(i)
            .iter()
            .zip(vector.iter())
            .map(|(p, l)| p * l)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_rows() {
        let matrix = Transition::identity(4);
        for i in 0..4 {
            for j in 0..4 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_eq!(matrix.get(i, j), expected);
            }
        }
    }

    #[test]
    fn dot_is_row_against_vector() {
        let mut matrix = Transition::zeros(3);
        matrix.set(1, 0, 0.25);
        matrix.set(1, 1, 0.50);
        matrix.set(1, 2, 0.25);
        let vector = [1.0, 2.0, 4.0];
        assert!((matrix.dot(1, &vector) - 2.25).abs() < 1e-12);
    }
}
