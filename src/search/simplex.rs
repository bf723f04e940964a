use crate::Score;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;

/// nelder mead over a scalar cost. derivative free, no restarts of
/// its own; Restarts layers randomized reruns on top. the initial
/// simplex is the caller's point plus one unit-vector perturbation
/// per dimension, scaled by the point's magnitude.
#[derive(Debug, Clone, Copy)]
pub struct Simplex {
    pub tol_x: f64,
    pub tol_f: f64,
    pub max_iterations: usize,
}

impl Default for Simplex {
    fn default() -> Self {
        Self {
            tol_x: crate::SIMPLEX_TOL_X,
            tol_f: crate::SIMPLEX_TOL_F,
            max_iterations: crate::SIMPLEX_MAX_ITERATIONS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Minimum {
    pub point: Vec<f64>,
    pub score: Score,
    pub iterations: usize,
    pub converged: bool,
}

impl Simplex {
    pub fn minimize<F>(&self, start: &[f64], cost: &mut F) -> Minimum
    where
        F: FnMut(&[f64]) -> Score,
    {
        let n = start.len();
        assert!(n > 0, "empty search vector");
        let scale = start.iter().map(|x| x * x).sum::<f64>().sqrt();
        let scale = if scale > 0.0 { scale } else { 1.0 };
        let mut vertices = vec![start.to_vec()];
        for dimension in 0..n {
            let mut vertex = start.to_vec();
            vertex[dimension] += scale;
            vertices.push(vertex);
        }
        let mut scores: Vec<Score> = vertices.iter().map(|v| cost(v)).collect();
        let mut iterations = 0;
        let mut converged = false;
        loop {
            Self::order(&mut vertices, &mut scores);
            if self.spread(&scores) < self.tol_f && self.diameter(&vertices) < self.tol_x {
                converged = true;
                break;
            }
            if iterations >= self.max_iterations {
                break;
            }
            iterations += 1;
            let centroid = Self::centroid(&vertices[..n]);
            let worst = vertices[n].clone();
            let reflected = Self::blend(&centroid, &worst, -crate::SIMPLEX_REFLECT);
            let reflected_score = cost(&reflected);
            if reflected_score < scores[0] {
                let expanded = Self::blend(&centroid, &worst, -crate::SIMPLEX_EXPAND);
                let expanded_score = cost(&expanded);
                if expanded_score < reflected_score {
                    vertices[n] = expanded;
                    scores[n] = expanded_score;
                } else {
                    vertices[n] = reflected;
                    scores[n] = reflected_score;
                }
            } else if reflected_score < scores[n - 1] {
                vertices[n] = reflected;
                scores[n] = reflected_score;
            } else {
                let (toward, toward_score) = if reflected_score < scores[n] {
                    (reflected, reflected_score)
                } else {
                    (worst, scores[n])
                };
                let contracted = Self::blend(&centroid, &toward, crate::SIMPLEX_CONTRACT);
                let contracted_score = cost(&contracted);
                if contracted_score < toward_score {
                    vertices[n] = contracted;
                    scores[n] = contracted_score;
                } else {
                    // shrink the whole simplex toward the best vertex
                    let best = vertices[0].clone();
                    for at in 1..=n {
                        vertices[at] = Self::blend(&best, &vertices[at], crate::SIMPLEX_SHRINK);
                        scores[at] = cost(&vertices[at]);
                    }
                }
            }
        }
        Minimum {
            point: vertices[0].clone(),
            score: scores[0],
            iterations,
            converged,
        }
    }

    fn order(vertices: &mut [Vec<f64>], scores: &mut [Score]) {
        let mut order: Vec<usize> = (0..scores.len()).collect();
        order.sort_by(|a, b| {
            scores[*a]
                .partial_cmp(&scores[*b])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let sorted_vertices: Vec<Vec<f64>> = order.iter().map(|at| vertices[*at].clone()).collect();
        let sorted_scores: Vec<Score> = order.iter().map(|at| scores[*at]).collect();
        vertices.clone_from_slice(&sorted_vertices);
        scores.copy_from_slice(&sorted_scores);
    }

    /// anchor + factor * (point - anchor). a negative factor reflects
    /// through the anchor.
    fn blend(anchor: &[f64], point: &[f64], factor: f64) -> Vec<f64> {
        anchor
            .iter()
            .zip(point.iter())
            .map(|(a, p)| a + factor * (p - a))
            .collect()
    }

    fn centroid(vertices: &[Vec<f64>]) -> Vec<f64> {
        let n = vertices.len() as f64;
        let mut centroid = vec![0.0; vertices[0].len()];
        for vertex in vertices {
            for (slot, x) in centroid.iter_mut().zip(vertex.iter()) {
                *slot += x / n;
            }
        }
        centroid
    }

    fn spread(&self, scores: &[Score]) -> f64 {
        scores[scores.len() - 1] - scores[0]
    }

    fn diameter(&self, vertices: &[Vec<f64>]) -> f64 {
        let best = &vertices[0];
        vertices[1..]
            .iter()
            .map(|vertex| {
                vertex
                    .iter()
                    .zip(best.iter())
                    .map(|(a, b)| (a - b).abs())
                    .fold(0.0, f64::max)
            })
            .fold(0.0, f64::max)
    }
}

/// randomized rerun driver: keep the best minimum over up to `runs`
/// starts, stopping early when two successive runs agree within the
/// function tolerance. a failure to converge is logged and the best
/// point is still returned.
#[derive(Debug, Clone, Copy)]
pub struct Restarts {
    pub runs: usize,
    pub seed: u64,
}

impl Default for Restarts {
    fn default() -> Self {
        Self {
            runs: crate::SIMPLEX_MAX_RUNS,
            seed: 0,
        }
    }
}

impl Restarts {
    pub fn search<F>(&self, simplex: &Simplex, start: &[f64], cost: &mut F) -> Minimum
    where
        F: FnMut(&[f64]) -> Score,
    {
        let mut rng = SmallRng::seed_from_u64(self.seed);
        let mut best: Option<Minimum> = None;
        let mut previous: Option<Score> = None;
        for run in 0..self.runs.max(1) {
            let from: Vec<f64> = if run == 0 {
                start.to_vec()
            } else {
                start
                    .iter()
                    .map(|x| x * rng.gen_range(0.25..1.75) + rng.gen_range(0.0..1e-6))
                    .collect()
            };
            let minimum = simplex.minimize(&from, cost);
            log::debug!(
                "simplex run {} scored {} after {} iterations",
                run,
                minimum.score,
                minimum.iterations
            );
            let settled = matches!(previous, Some(p) if (p - minimum.score).abs() < simplex.tol_f);
            previous = Some(minimum.score);
            best = match best {
                Some(b) if b.score <= minimum.score => Some(b),
                _ => Some(minimum),
            };
            if settled {
                break;
            }
        }
        let best = best.expect("at least one run");
        if !best.converged {
            log::warn!(
                "{}",
                crate::Error::ConvergenceFailure {
                    runs: self.runs,
                    score: best.score,
                }
            );
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bowl(x: &[f64]) -> Score {
        (x[0] - 3.0).powi(2) + (x[1] + 1.0).powi(2) + 7.0
    }

    #[test]
    fn finds_the_bowl_bottom() {
        let simplex = Simplex::default();
        let minimum = simplex.minimize(&[0.0, 0.0], &mut bowl);
        assert!(minimum.converged);
        assert!((minimum.point[0] - 3.0).abs() < 1e-3);
        assert!((minimum.point[1] + 1.0).abs() < 1e-3);
        assert!((minimum.score - 7.0).abs() < 1e-6);
    }

    #[test]
    fn iteration_budget_is_respected() {
        let simplex = Simplex {
            max_iterations: 2,
            ..Simplex::default()
        };
        let minimum = simplex.minimize(&[100.0, 100.0], &mut bowl);
        assert!(!minimum.converged);
        assert!(minimum.iterations <= 2);
    }

    #[test]
    fn infinite_costs_are_stepped_around() {
        let mut walled = |x: &[f64]| {
            if x[0] < 0.0 {
                Score::INFINITY
            } else {
                (x[0] - 2.0).powi(2)
            }
        };
        let simplex = Simplex::default();
        let minimum = simplex.minimize(&[5.0], &mut walled);
        assert!((minimum.point[0] - 2.0).abs() < 1e-3);
    }

    #[test]
    fn restarts_keep_the_best_and_are_reproducible() {
        let restarts = Restarts {
            runs: 5,
            seed: 42,
        };
        let simplex = Simplex::default();
        let first = restarts.search(&simplex, &[10.0, -10.0], &mut bowl);
        let again = restarts.search(&simplex, &[10.0, -10.0], &mut bowl);
        assert_eq!(first.point, again.point);
        assert!((first.score - 7.0).abs() < 1e-6);
    }
}
