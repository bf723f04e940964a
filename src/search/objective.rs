use super::lambdas;
use super::lambdas::Layout;
use super::lambdas::Rates;
use super::simplex::Minimum;
use super::simplex::Restarts;
use super::simplex::Simplex;
use crate::Likelihood;
use crate::Score;
use crate::error::Error;
use crate::family::store::FamilyStore;
use crate::kernel::cache::MatrixCache;
use crate::kernel::matrix::Transition;
use crate::likelihood::engine::Engine;
use crate::likelihood::prior::RootPrior;
use crate::likelihood::range::SizeRange;
use crate::phylo::tree::Phylogeny;
use petgraph::graph::NodeIndex;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

/// the scalar objective behind the simplex: decode a search vector
/// into per-branch rates, refresh transition matrices through the
/// cache, and score the whole data set by negative total log
/// likelihood. families fan out over the worker pool and the
/// reduction runs in family index order, so the score never depends
/// on scheduling.
pub struct Objective<'a> {
    tree: &'a mut Phylogeny,
    store: &'a FamilyStore,
    cache: &'a MatrixCache,
    prior: &'a RootPrior,
    range: SizeRange,
    layout: Layout,
}

/// one finished search: the decoded rates at the best point
#[derive(Debug, Clone)]
pub struct Fit {
    pub rates: Rates,
    pub minimum: Minimum,
    pub layout: Layout,
}

impl<'a> Objective<'a> {
    pub fn new(
        tree: &'a mut Phylogeny,
        store: &'a FamilyStore,
        cache: &'a MatrixCache,
        prior: &'a RootPrior,
        range: SizeRange,
        layout: Layout,
    ) -> Self {
        Self {
            tree,
            store,
            cache,
            prior,
            range,
            layout,
        }
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// rejected vectors and numeric failures cost infinity; the
    /// search steps around them and keeps going
    pub fn cost(&mut self, theta: &[f64]) -> Score {
        let Some(rates) = self.layout.decode(theta) else {
            return Score::INFINITY;
        };
        match self.evaluate(&rates) {
            Ok(score) if score.is_finite() => score,
            Ok(score) => {
                log::warn!("non-finite objective {} at {:?}", score, theta);
                Score::INFINITY
            }
            Err(error) => {
                log::warn!("objective failure: {}", error);
                Score::INFINITY
            }
        }
    }

    pub fn evaluate(&mut self, rates: &Rates) -> Result<Score, Error> {
        let joints = if self.layout.clusters == 1 {
            self.plain(rates)?
        } else {
            self.clustered(rates)?
        };
        let mut score = 0.0;
        for joint in joints {
            score -= joint.ln();
        }
        Ok(score)
    }

    fn plain(&mut self, rates: &Rates) -> Result<Vec<Likelihood>, Error> {
        lambdas::apply(self.tree, rates, 0);
        self.cache.apply(self.tree);
        let engine = Engine::new(self.tree, self.range);
        let store = self.store;
        let prior = self.prior;
        let root_min = self.range.root_min;
        (0..store.len())
            .into_par_iter()
            .map(|family| {
                let counts = store.counts(family)?;
                let root = engine.root_vector(&counts)?;
                Ok(prior.joint(&root, root_min))
            })
            .collect()
    }

    fn clustered(&mut self, rates: &Rates) -> Result<Vec<Likelihood>, Error> {
        let mut tables: Vec<BTreeMap<NodeIndex, Arc<Transition>>> = Vec::new();
        for cluster in 0..self.layout.clusters {
            lambdas::apply(self.tree, rates, cluster);
            self.cache.apply(self.tree);
            let mut table = BTreeMap::new();
            for index in self.tree.postorder() {
                if index == self.tree.root() {
                    continue;
                }
                let matrix = self.tree.node(index).matrix.clone().ok_or({
                    Error::MatrixMissing {
                        node: index.index(),
                    }
                })?;
                table.insert(index, matrix);
            }
            tables.push(table);
        }
        let engine = Engine::new(self.tree, self.range);
        let store = self.store;
        let prior = self.prior;
        let root_min = self.range.root_min;
        let weights = &rates.weights;
        (0..store.len())
            .into_par_iter()
            .map(|family| {
                let counts = store.counts(family)?;
                let root = engine.clustered(&counts, &tables, weights)?;
                Ok(prior.joint(&root, root_min))
            })
            .collect()
    }

    /// the full estimation loop: randomized simplex restarts from a
    /// data-driven starting vector
    pub fn fit(&mut self, simplex: &Simplex, restarts: &Restarts) -> Result<Fit, Error> {
        let start = self.layout.start(lambdas::guess(self.tree));
        log::info!(
            "estimating {} parameters from {:?}",
            self.layout.dimensions(),
            start
        );
        let minimum = restarts.search(simplex, &start, &mut |theta| self.cost(theta));
        let rates = self
            .layout
            .decode(&minimum.point)
            .ok_or(Error::NumericFailure {
                what: "undecodable simplex minimum".to_string(),
            })?;
        log::info!("best score {} after {} iterations", minimum.score, minimum.iterations);
        Ok(Fit {
            rates,
            minimum,
            layout: self.layout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phylo::newick;

    const TREE: &str = "((A:1,B:1):1,(C:1,D:1):1);";
    const FILE: &str = "Desc\tFamily ID\tA\tB\tC\tD\n\
                        one\tF1\t2\t3\t1\t2\n\
                        two\tF2\t1\t1\t2\t1\n\
                        three\tF3\t4\t2\t2\t3\n";

    fn fixture() -> (Phylogeny, FamilyStore, MatrixCache, RootPrior, SizeRange) {
        let tree = newick::parse(TREE).unwrap();
        let mut store = FamilyStore::read(FILE.as_bytes(), "<test>").unwrap();
        store.index(&tree).unwrap();
        let range = SizeRange::span(8);
        let cache = MatrixCache::new(range.max);
        let prior = RootPrior::empirical(store.sizes(), range.max);
        (tree, store, cache, prior, range)
    }

    #[test]
    fn cost_is_finite_and_deterministic() {
        let (mut tree, store, cache, prior, range) = fixture();
        let layout = Layout::single(false);
        let mut objective = Objective::new(&mut tree, &store, &cache, &prior, range, layout);
        let first = objective.cost(&[0.01]);
        let again = objective.cost(&[0.01]);
        assert!(first.is_finite());
        assert!(first > 0.0);
        assert_eq!(first, again);
    }

    #[test]
    fn negative_rates_cost_infinity() {
        let (mut tree, store, cache, prior, range) = fixture();
        let layout = Layout::single(false);
        let mut objective = Objective::new(&mut tree, &store, &cache, &prior, range, layout);
        assert!(objective.cost(&[-0.01]).is_infinite());
    }

    #[test]
    fn clustered_and_plain_agree_on_a_degenerate_mixture() {
        let (mut tree, store, cache, prior, range) = fixture();
        let plain = {
            let layout = Layout::single(false);
            let mut objective =
                Objective::new(&mut tree, &store, &cache, &prior, range, layout);
            objective.cost(&[0.01])
        };
        let mixed = {
            let layout = Layout {
                groups: 1,
                clusters: 2,
                estimate_death: false,
                fixcluster0: false,
            };
            let mut objective =
                Objective::new(&mut tree, &store, &cache, &prior, range, layout);
            // both clusters at the same rate, any weight split
            objective.cost(&[0.01, 0.01, 0.35])
        };
        assert!((plain - mixed).abs() < 1e-9);
    }

    #[test]
    fn fitting_improves_on_the_starting_vector() {
        let (mut tree, store, cache, prior, range) = fixture();
        let layout = Layout::single(false);
        let mut objective = Objective::new(&mut tree, &store, &cache, &prior, range, layout);
        let start = layout.start(lambdas::guess(objective.tree));
        let at_start = objective.cost(&start);
        let simplex = Simplex {
            max_iterations: 200,
            ..Simplex::default()
        };
        let restarts = Restarts { runs: 2, seed: 7 };
        let fit = objective.fit(&simplex, &restarts).unwrap();
        assert!(fit.minimum.score <= at_start);
        assert!(fit.rates.birth[0][0] >= 0.0);
    }
}
