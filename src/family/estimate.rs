use super::errormodel::ErrorModel;
use super::store::FamilyStore;
use crate::Count;
use crate::Probability;
use crate::Score;
use crate::error::Error;
use crate::likelihood::prior::RootPrior;
use crate::search::simplex::Restarts;
use crate::search::simplex::Simplex;

/// symmetric pair counts from two replicate measurements of the same
/// families. the lower triangle folds into the upper, j < i adding
/// into [j][i] and then zeroing, so each unordered pair is counted
/// once.
#[derive(Debug, Clone)]
pub struct PairCounts {
    max: Count,
    pairs: Vec<Vec<f64>>,
}

impl PairCounts {
    pub fn from_replicates(first: &FamilyStore, second: &FamilyStore) -> Result<Self, Error> {
        if first.species() != second.species() {
            return Err(Error::inconsistent(
                "replicate files disagree on species".to_string(),
            ));
        }
        if first.len() != second.len() {
            return Err(Error::inconsistent(format!(
                "replicate files hold {} and {} families",
                first.len(),
                second.len()
            )));
        }
        let max = first.max_count().max(second.max_count());
        let mut pairs = vec![vec![0.0; max + 1]; max + 1];
        for (a, b) in first.families().iter().zip(second.families().iter()) {
            if a.id != b.id {
                return Err(Error::inconsistent(format!(
                    "family order mismatch at '{}' vs '{}'",
                    a.id, b.id
                )));
            }
            for (x, y) in a.counts.iter().zip(b.counts.iter()) {
                pairs[*x][*y] += 1.0;
            }
        }
        for i in 0..=max {
            for j in 0..i {
                pairs[j][i] += pairs[i][j];
                pairs[i][j] = 0.0;
            }
        }
        Ok(Self { max, pairs })
    }

    pub fn max(&self) -> Count {
        self.max
    }

    pub fn get(&self, i: Count, j: Count) -> f64 {
        self.pairs[i][j]
    }
}

/// maximum likelihood fit of a misclassification window to replicate
/// pair counts. the window is one offset distribution shared by every
/// true count: symmetric (one parameter per positive offset, the
/// center inferred) or asymmetric (every offset a parameter,
/// normalized).
pub struct ErrorEstimate<'a> {
    pairs: &'a PairCounts,
    prior: RootPrior,
    max_diff: usize,
    symmetric: bool,
}

impl<'a> ErrorEstimate<'a> {
    pub fn new(pairs: &'a PairCounts, prior: RootPrior, max_diff: usize, symmetric: bool) -> Self {
        Self {
            pairs,
            prior,
            max_diff: max_diff.max(1),
            symmetric,
        }
    }

    pub fn dimensions(&self) -> usize {
        if self.symmetric {
            self.max_diff
        } else {
            2 * self.max_diff + 1
        }
    }

    /// offset weights [-max_diff ..= max_diff], or None when the
    /// vector violates a constraint: a negative weight, a negative
    /// inferred center, or decay away from the peak broken
    fn window(&self, theta: &[f64]) -> Option<Vec<Probability>> {
        if theta.len() != self.dimensions() {
            return None;
        }
        if theta.iter().any(|x| *x < 0.0) {
            return None;
        }
        let window: Vec<Probability> = if self.symmetric {
            let spread: f64 = theta.iter().sum();
            let center = 1.0 - 2.0 * spread;
            if center < 0.0 {
                return None;
            }
            theta
                .iter()
                .rev()
                .copied()
                .chain(std::iter::once(center))
                .chain(theta.iter().copied())
                .collect()
        } else {
            let total: f64 = theta.iter().sum();
            if total <= 0.0 {
                return None;
            }
            theta.iter().map(|x| x / total).collect()
        };
        let center = self.max_diff;
        for d in 1..=self.max_diff {
            if window[center - d] > window[center - d + 1] {
                return None;
            }
            if window[center + d] > window[center + d - 1] {
                return None;
            }
        }
        Some(window)
    }

    fn model(&self, window: Vec<Probability>) -> Result<ErrorModel, Error> {
        let rows = vec![Some(window); self.pairs.max() + 1];
        ErrorModel::new(
            self.pairs.max(),
            -(self.max_diff as i64),
            self.max_diff as i64,
            rows,
        )
    }

    /// negative log likelihood of the folded pair counts, conditioned
    /// on at least one member of the pair being observed
    pub fn cost(&self, theta: &[f64]) -> Score {
        let Some(window) = self.window(theta) else {
            return Score::INFINITY;
        };
        let Ok(model) = self.model(window) else {
            return Score::INFINITY;
        };
        let max = self.pairs.max();
        let mut score = 0.0;
        for i in 0..=max {
            for j in i..=max {
                let count = self.pairs.get(i, j);
                if count == 0.0 {
                    continue;
                }
                let joint: f64 = (0..=max)
                    .map(|k| self.prior.get(k) * model.probability(i, k) * model.probability(j, k))
                    .sum();
                if joint <= 0.0 {
                    return Score::INFINITY;
                }
                score -= count * joint.ln();
            }
        }
        let both_zero: f64 = (0..=max)
            .map(|k| self.prior.get(k) * model.probability(0, k).powi(2))
            .sum();
        score -= (1.0 - both_zero).ln();
        if score.is_finite() {
            score
        } else {
            Score::INFINITY
        }
    }

    /// drive the simplex to the best window and materialize the model
    pub fn estimate(&self, simplex: &Simplex, restarts: &Restarts) -> Result<ErrorModel, Error> {
        let start: Vec<f64> = (1..=self.dimensions())
            .map(|d| 0.1 / d as f64)
            .collect();
        let start = if self.symmetric {
            start
        } else {
            // peak in the middle, gentle decay outward
            let center = self.max_diff;
            (0..self.dimensions())
                .map(|at| 1.0 / (1.0 + at.abs_diff(center) as f64))
                .collect()
        };
        let minimum = restarts.search(simplex, &start, &mut |theta| self.cost(theta));
        let window = self.window(&minimum.point).ok_or(Error::NumericFailure {
            what: "undecodable error window".to_string(),
        })?;
        self.model(window)
    }
}
