use super::logchoose::LogChoose;
use super::matrix::Transition;
use super::rates::DeathRate;
use crate::Count;
use crate::Rate;

/// the linear birth death process along one branch. duplication at
/// per-gene rate lambda, loss at per-gene rate mu, extinction (size 0)
/// absorbing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BirthDeath {
    birth: Rate,
    death: Rate,
}

impl BirthDeath {
    pub fn new(birth: Rate, death: DeathRate) -> Self {
        Self {
            birth,
            death: death.resolve(birth),
        }
    }

    pub fn birth(&self) -> Rate {
        self.birth
    }
    pub fn death(&self) -> Rate {
        self.death
    }

    /// extinction weight alpha and duplication weight beta after time t.
    /// alpha is also the probability that one ancestral gene leaves no
    /// descendants.
    fn coefficients(&self, t: f64) -> (f64, f64) {
        let l = self.birth;
        let m = self.death;
        if (l - m).abs() < crate::RATE_EQUALITY_EPSILON {
            let a = l * t / (1.0 + l * t);
            (a, a)
        } else {
            let e = ((l - m) * t).exp();
            let d = l * e - m;
            (m * (e - 1.0) / d, l * (e - 1.0) / d)
        }
    }

    /// P(i -> j), summed over k ancestral genes that survive with
    /// descendants. each term is assembled in log space from the
    /// binomial table and exponentiated once. 1 - alpha - beta goes
    /// negative once mu * e^((lambda - mu) t) exceeds lambda, so its
    /// sign is carried outside the logarithm.
    fn probability(
        &self,
        table: &LogChoose,
        i: Count,
        j: Count,
        alpha: f64,
        beta: f64,
        residue: f64,
    ) -> f64 {
        let mut p = 0.0;
        for k in 0..=i.min(j) {
            let deaths = i - k;
            let births = j - k;
            if deaths > 0 && alpha <= 0.0 {
                continue;
            }
            if births > 0 && beta <= 0.0 {
                continue;
            }
            if k > 0 && residue == 0.0 {
                continue;
            }
            let mut ln = table.get(i, k) + table.get(i + j - k - 1, i - 1);
            if deaths > 0 {
                ln += deaths as f64 * alpha.ln();
            }
            if births > 0 {
                ln += births as f64 * beta.ln();
            }
            if k > 0 {
                ln += k as f64 * residue.abs().ln();
            }
            let sign = if k % 2 == 1 && residue < 0.0 { -1.0 } else { 1.0 };
            p += sign * ln.exp();
        }
        p.max(0.0)
    }

    /// the full transition matrix of the given side for a branch of
    /// length t. t at or below the clamp yields the identity, which
    /// also suppresses catastrophic cancellation on near-zero branches.
    pub fn transition(&self, t: f64, side: usize, table: &LogChoose) -> Transition {
        if t <= crate::BRANCH_IDENTITY_CLAMP {
            return Transition::identity(side);
        }
        let (alpha, beta) = self.coefficients(t);
        if alpha <= 0.0 && beta <= 0.0 {
            return Transition::identity(side);
        }
        let residue = 1.0 - alpha - beta;
        let mut matrix = Transition::zeros(side);
        matrix.set(0, 0, 1.0);
        for i in 1..side {
            for j in 0..side {
                matrix.set(i, j, self.probability(table, i, j, alpha, beta, residue));
            }
        }
        matrix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kernel(birth: Rate, death: f64) -> BirthDeath {
        BirthDeath::new(birth, DeathRate::from(death))
    }

    #[test]
    fn tied_death_rate_resolves_to_birth() {
        let process = kernel(0.01, -1.0);
        assert_eq!(process.death(), 0.01);
    }

    #[test]
    fn zero_branch_is_identity() {
        let table = LogChoose::new(64);
        let matrix = kernel(0.01, -1.0).transition(0.0, 21, &table);
        assert_eq!(matrix, Transition::identity(21));
    }

    #[test]
    fn extinction_is_absorbing() {
        let table = LogChoose::new(64);
        let matrix = kernel(0.02, 0.01).transition(5.0, 12, &table);
        assert_eq!(matrix.get(0, 0), 1.0);
        for j in 1..12 {
            assert_eq!(matrix.get(0, j), 0.0);
        }
    }

    #[test]
    fn rows_sum_to_one_and_entries_are_positive() {
        // the matrix is truncated at its side, so the mass conservation
        // check runs on rows whose support stays well inside it
        let table = LogChoose::new(256);
        for (t, birth, death) in [
            (1.0, 0.01, -1.0),
            (10.0, 0.002, 0.005),
            (68.7105, 0.006335, -1.0),
            (5.0, 0.02, 0.01),
            (25.0, 0.0, 0.01),
            (25.0, 0.01, 0.0),
        ] {
            let matrix = kernel(birth, death).transition(t, 61, &table);
            for i in 0..=10 {
                let mut sum = 0.0;
                for j in 0..61 {
                    let p = matrix.get(i, j);
                    assert!(p >= 0.0, "negative entry at ({}, {})", i, j);
                    sum += p;
                }
                assert!(
                    (sum - 1.0).abs() < crate::ROW_SUM_TOLERANCE,
                    "row {} sums to {} for t={} l={} m={}",
                    i,
                    sum,
                    t,
                    birth,
                    death
                );
            }
        }
    }

    #[test]
    fn single_gene_transitions_at_unit_branch() {
        let table = LogChoose::new(64);
        let matrix = kernel(0.01, -1.0).transition(1.0, 21, &table);
        assert!((matrix.get(1, 0) - 0.0099).abs() < 1e-6);
        assert!((matrix.get(1, 1) - 0.980296).abs() < 1e-6);
        assert!((matrix.get(1, 2) - 0.0097059).abs() < 1e-6);
    }

    #[test]
    fn five_gene_transition_on_a_long_branch() {
        let table = LogChoose::new(512);
        let matrix = kernel(0.006335, -1.0).transition(68.7105, 141, &table);
        assert!((matrix.get(5, 5) - 0.19466).abs() < 1e-4);
    }
}
