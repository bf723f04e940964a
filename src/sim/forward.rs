use crate::Count;
use crate::error::Error;
use crate::family::family::Family;
use crate::family::store::FamilyStore;
use crate::likelihood::engine::LeafCounts;
use crate::likelihood::prior::RootPrior;
use crate::phylo::tree::Phylogeny;
use rand::Rng;
use rand::SeedableRng;
use rand::distributions::Distribution;
use rand::distributions::WeightedIndex;
use rand::rngs::SmallRng;

/// forward simulation of family sizes down a fitted tree: every child
/// size is drawn from its transition matrix row at the parent's size
pub struct Simulator<'a> {
    tree: &'a Phylogeny,
}

impl<'a> Simulator<'a> {
    pub fn new(tree: &'a Phylogeny) -> Self {
        Self { tree }
    }

    /// sizes for every node from one rollout, indexed by raw node
    /// index
    pub fn rollout<R: Rng>(&self, root: Count, rng: &mut R) -> Result<Vec<Count>, Error> {
        let mut sizes = vec![0; self.tree.len()];
        sizes[self.tree.root().index()] = root;
        for index in self.tree.postorder().into_iter().rev() {
            if index == self.tree.root() {
                continue;
            }
            let parent = self.tree.parent(index).expect("non-root node");
            let from = sizes[parent.index()];
            let matrix = self
                .tree
                .node(index)
                .matrix
                .as_ref()
                .ok_or(Error::MatrixMissing {
                    node: index.index(),
                })?;
            let row = WeightedIndex::new(matrix.row(from)).map_err(|_| Error::NumericFailure {
                what: format!("degenerate transition row {}", from),
            })?;
            sizes[index.index()] = row.sample(rng);
        }
        Ok(sizes)
    }

    /// one simulated family: the rollout restricted to the leaves
    pub fn leaves<R: Rng>(&self, root: Count, rng: &mut R) -> Result<LeafCounts, Error> {
        let sizes = self.rollout(root, rng)?;
        Ok(self
            .tree
            .leaves()
            .into_iter()
            .map(|leaf| (leaf, sizes[leaf.index()]))
            .collect())
    }

    /// a synthetic data set: root sizes drawn from the prior, one
    /// rollout per family, species columns in leaf order
    pub fn generate(&self, prior: &RootPrior, n: usize, seed: u64) -> Result<FamilyStore, Error> {
        let roots = WeightedIndex::new(prior.weights()).map_err(|_| Error::NumericFailure {
            what: "degenerate root prior".to_string(),
        })?;
        let mut rng = SmallRng::seed_from_u64(seed);
        let leaves = self.tree.leaves();
        let species: Vec<String> = leaves
            .iter()
            .map(|leaf| {
                self.tree
                    .node(*leaf)
                    .species()
                    .unwrap_or_default()
                    .to_string()
            })
            .collect();
        let mut store = FamilyStore::assemble(species);
        for nth in 0..n {
            let root = roots.sample(&mut rng);
            let sizes = self.rollout(root, &mut rng)?;
            store.push(Family {
                id: format!("sim{}", nth),
                desc: format!("root {}", root),
                counts: leaves.iter().map(|leaf| sizes[leaf.index()]).collect(),
            });
        }
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::cache::MatrixCache;
    use crate::phylo::newick;

    fn fitted(max: Count) -> Phylogeny {
        let mut tree = newick::parse("((A:1,B:1):1,(C:1,D:1):1);").unwrap();
        for index in tree.postorder() {
            tree.node_mut(index).birth = 0.05;
        }
        let cache = MatrixCache::new(max);
        cache.apply(&mut tree);
        tree
    }

    #[test]
    fn rollouts_stay_in_range_and_reproduce() {
        let tree = fitted(10);
        let simulator = Simulator::new(&tree);
        let mut rng = SmallRng::seed_from_u64(17);
        let first = simulator.rollout(4, &mut rng).unwrap();
        assert!(first.iter().all(|s| *s <= 10));
        assert_eq!(first[tree.root().index()], 4);
        let mut rng = SmallRng::seed_from_u64(17);
        let again = simulator.rollout(4, &mut rng).unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn extinction_stays_extinct() {
        let tree = fitted(6);
        let simulator = Simulator::new(&tree);
        let mut rng = SmallRng::seed_from_u64(3);
        let sizes = simulator.rollout(0, &mut rng).unwrap();
        assert!(sizes.iter().all(|s| *s == 0));
    }

    #[test]
    fn generated_stores_have_the_tree_species() {
        let tree = fitted(10);
        let simulator = Simulator::new(&tree);
        let prior = RootPrior::empirical([2, 3, 4].into_iter(), 10);
        let store = simulator.generate(&prior, 25, 99).unwrap();
        assert_eq!(store.len(), 25);
        assert_eq!(store.species(), ["A", "B", "C", "D"]);
        assert!(store.max_count() <= 10);
        let again = simulator.generate(&prior, 25, 99).unwrap();
        assert_eq!(store.families(), again.families());
    }
}
