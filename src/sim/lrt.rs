use crate::Probability;
use crate::Score;
use crate::error::Error;
use statrs::distribution::ChiSquared;
use statrs::distribution::ContinuousCDF;

/// nested model comparison by likelihood ratio. scores are negative
/// log likelihoods, so the statistic is twice the drop from the null
/// to the alternative.
#[derive(Debug, Clone, PartialEq)]
pub struct LikelihoodRatio {
    pub null_score: Score,
    pub alternative_score: Score,
    pub statistic: f64,
    pub degrees: usize,
    pub pvalue: Probability,
}

pub fn ratio(
    null_score: Score,
    alternative_score: Score,
    degrees: usize,
) -> Result<LikelihoodRatio, Error> {
    if degrees == 0 {
        return Err(Error::inconsistent(
            "the models have the same dimension".to_string(),
        ));
    }
    if !null_score.is_finite() || !alternative_score.is_finite() {
        return Err(Error::NumericFailure {
            what: "likelihood ratio over non-finite scores".to_string(),
        });
    }
    let statistic = (2.0 * (null_score - alternative_score)).max(0.0);
    let chi = ChiSquared::new(degrees as f64).map_err(|_| Error::NumericFailure {
        what: format!("chi squared with {} degrees", degrees),
    })?;
    let pvalue = 1.0 - chi.cdf(statistic);
    Ok(LikelihoodRatio {
        null_score,
        alternative_score,
        statistic,
        degrees,
        pvalue,
    })
}
