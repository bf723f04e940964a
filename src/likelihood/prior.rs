use crate::Count;
use crate::Likelihood;
use crate::Probability;
use crate::error::Error;
use statrs::distribution::Discrete;
use statrs::distribution::Poisson;

/// distribution over root family sizes, built once per search epoch
#[derive(Debug, Clone, PartialEq)]
pub struct RootPrior(Vec<Probability>);

impl RootPrior {
    /// histogram of the observed sizes with add-one smoothing
    pub fn empirical(sizes: impl IntoIterator<Item = Count>, max: Count) -> Self {
        let mut weights = vec![1.0; max + 1];
        for size in sizes {
            if size <= max {
                weights[size] += 1.0;
            }
        }
        Self::normalized(weights)
    }

    /// poisson pmf truncated to [0, max] and renormalized
    pub fn poisson(rate: f64, max: Count) -> Result<Self, Error> {
        let poisson = Poisson::new(rate).map_err(|_| Error::NumericFailure {
            what: format!("poisson rate {}", rate),
        })?;
        let weights = (0..=max).map(|k| poisson.pmf(k as u64)).collect();
        Ok(Self::normalized(weights))
    }

    fn normalized(mut weights: Vec<Probability>) -> Self {
        let sum: Probability = weights.iter().sum();
        weights.iter_mut().for_each(|w| *w /= sum);
        Self(weights)
    }

    pub fn get(&self, size: Count) -> Probability {
        self.0.get(size).copied().unwrap_or(0.0)
    }

    pub fn weights(&self) -> &[Probability] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// total probability of a root vector under this prior
    pub fn joint(&self, root: &[Likelihood], root_min: Count) -> Likelihood {
        root.iter()
            .enumerate()
            .map(|(at, l)| l * self.get(root_min + at))
            .sum()
    }
}
