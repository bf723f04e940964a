use super::conditional::Conditional;
use crate::Count;
use crate::Likelihood;
use crate::Probability;
use crate::error::Error;
use crate::likelihood::prior::RootPrior;

/// posterior over root sizes: the root vector weighted by the prior,
/// normalized
pub fn posterior(
    root: &[Likelihood],
    prior: &RootPrior,
    root_min: Count,
) -> Result<Vec<Probability>, Error> {
    let mut weights: Vec<Probability> = root
        .iter()
        .enumerate()
        .map(|(at, l)| l * prior.get(root_min + at))
        .collect();
    let sum: Probability = weights.iter().sum();
    if !sum.is_finite() || sum <= 0.0 {
        return Err(Error::NumericFailure {
            what: format!("root posterior normalizer {}", sum),
        });
    }
    weights.iter_mut().for_each(|w| *w /= sum);
    Ok(weights)
}

/// family p-value: the maximum over the root sizes that carry
/// posterior mass
pub fn family(
    conditional: &Conditional,
    root: &[Likelihood],
    posterior: &[Probability],
    root_min: Count,
) -> Probability {
    posterior
        .iter()
        .enumerate()
        .filter(|(_, weight)| **weight > 0.0)
        .map(|(at, _)| conditional.pvalue(root_min + at, root[at]))
        .fold(0.0, Probability::max)
}
