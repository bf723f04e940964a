use super::range::SizeRange;
use crate::Count;
use crate::Likelihood;
use crate::Probability;
use crate::error::Error;
use crate::kernel::matrix::Transition;
use crate::phylo::node::Kind;
use crate::phylo::tree::Phylogeny;
use petgraph::graph::NodeIndex;
use std::collections::BTreeMap;
use std::sync::Arc;

pub type LeafCounts = BTreeMap<NodeIndex, Count>;

/// felsenstein pruning over one tree and size range. the tree is read
/// only here; scratch vectors live per call, so independent families
/// can run on parallel workers against one engine.
pub struct Engine<'a> {
    tree: &'a Phylogeny,
    range: SizeRange,
}

impl<'a> Engine<'a> {
    pub fn new(tree: &'a Phylogeny, range: SizeRange) -> Self {
        Self { tree, range }
    }

    pub fn range(&self) -> SizeRange {
        self.range
    }

    /// P(leaf counts | root size = r) for every r in the root range
    pub fn root_vector(&self, counts: &LeafCounts) -> Result<Vec<Likelihood>, Error> {
        let vectors = self.node_vectors(counts)?;
        Ok(self.root_slice(&vectors))
    }

    pub fn root_slice(&self, vectors: &[Vec<Likelihood>]) -> Vec<Likelihood> {
        let root = &vectors[self.tree.root().index()];
        self.range.roots().map(|r| root[r]).collect()
    }

    /// conditional vectors for every node, indexed by raw node index
    pub fn node_vectors(&self, counts: &LeafCounts) -> Result<Vec<Vec<Likelihood>>, Error> {
        self.upward(counts, &|index| self.tree.node(index).matrix.clone())
    }

    /// K cluster root vectors combined by the weight simplex
    pub fn clustered(
        &self,
        counts: &LeafCounts,
        tables: &[BTreeMap<NodeIndex, Arc<Transition>>],
        weights: &[Probability],
    ) -> Result<Vec<Likelihood>, Error> {
        let mut combined = vec![0.0; self.range.root_count()];
        for (table, weight) in tables.iter().zip(weights.iter()) {
            let vectors = self.upward(counts, &|index| table.get(&index).cloned())?;
            for (at, l) in self.root_slice(&vectors).into_iter().enumerate() {
                combined[at] += weight * l;
            }
        }
        Ok(combined)
    }

    /// bottom up pass. leaves pin their observed count, or spread it
    /// through their error model; internals multiply, per candidate
    /// size, the matrix-weighted sums over each child.
    fn upward(
        &self,
        counts: &LeafCounts,
        matrix: &dyn Fn(NodeIndex) -> Option<Arc<Transition>>,
    ) -> Result<Vec<Vec<Likelihood>>, Error> {
        let side = self.range.max + 1;
        let mut vectors: Vec<Vec<Likelihood>> = vec![Vec::new(); self.tree.len()];
        for index in self.tree.postorder() {
            let node = self.tree.node(index);
            let mut vector = vec![0.0; side];
            match &node.kind {
                Kind::Leaf { species, error, .. } => {
                    let count = counts.get(&index).copied().ok_or_else(|| {
                        Error::inconsistent(format!("no count for leaf '{}'", species))
                    })?;
                    if count > self.range.max {
                        return Err(Error::OutOfRange {
                            value: count,
                            bound: self.range.max,
                        });
                    }
                    match error {
                        None => vector[count] = 1.0,
                        Some(model) => {
                            if model.max() < self.range.max {
                                return Err(Error::inconsistent(format!(
                                    "error model for '{}' stops at {}, need {}",
                                    species,
                                    model.max(),
                                    self.range.max
                                )));
                            }
                            for (truth, slot) in vector.iter_mut().enumerate() {
                                *slot = model.probability(count, truth);
                            }
                        }
                    }
                }
                Kind::Internal { .. } => {
                    vector.fill(1.0);
                    for child in self.tree.children(index) {
                        let matrix = matrix(child).ok_or(Error::MatrixMissing {
                            node: child.index(),
                        })?;
                        let below = &vectors[child.index()];
                        for (s, slot) in vector.iter_mut().enumerate() {
                            *slot *= matrix.dot(s, below);
                        }
                    }
                }
            }
            vectors[index.index()] = vector;
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::family::errormodel::ErrorModel;
    use crate::kernel::cache::MatrixCache;
    use crate::phylo::newick;

    fn fitted(text: &str, birth: f64, max: Count) -> (Phylogeny, MatrixCache) {
        let mut tree = newick::parse(text).unwrap();
        for index in tree.postorder() {
            tree.node_mut(index).birth = birth;
        }
        let cache = MatrixCache::new(max);
        cache.apply(&mut tree);
        (tree, cache)
    }

    fn counts_by_species(tree: &Phylogeny, pairs: &[(&str, Count)]) -> LeafCounts {
        pairs
            .iter()
            .map(|(species, count)| (tree.leaf(species).unwrap(), *count))
            .collect()
    }

    #[test]
    fn quartet_root_vector_reference_values() {
        let (tree, _cache) = fitted("((A:1,B:1):1,(C:1,D:1):1);", 0.01, 15);
        let engine = Engine::new(&tree, SizeRange::span(15));
        let counts = counts_by_species(&tree, &[("A", 5), ("B", 10), ("C", 2), ("D", 6)]);
        let root = engine.root_vector(&counts).unwrap();
        assert_eq!(root.len(), 16);
        assert_eq!(root[0], 0.0);
        let expected = [1.42e-13, 2.88e-9, 4.12e-7, 6.74e-7];
        for (at, want) in expected.iter().enumerate() {
            let got = root[at + 1];
            assert!(
                (got - want).abs() < want * 0.1,
                "root[{}] = {}, expected about {}",
                at + 1,
                got,
                want
            );
        }
    }

    /// exhaustive sum over every ancestral assignment, for small trees
    fn brute_force(
        tree: &Phylogeny,
        counts: &LeafCounts,
        root_size: Count,
        max: Count,
    ) -> Likelihood {
        let internals: Vec<NodeIndex> = tree
            .postorder()
            .into_iter()
            .filter(|i| *i != tree.root() && !tree.node(*i).is_leaf())
            .collect();
        let mut total = 0.0;
        let mut assignment = vec![0usize; internals.len()];
        loop {
            let size_of = |index: NodeIndex| -> Count {
                if index == tree.root() {
                    root_size
                } else if let Some(at) = internals.iter().position(|i| *i == index) {
                    assignment[at]
                } else {
                    counts[&index]
                }
            };
            let mut product = 1.0;
            for index in tree.postorder() {
                if index == tree.root() {
                    continue;
                }
                let parent = tree.parent(index).unwrap();
                let matrix = tree.node(index).matrix.as_ref().unwrap();
                product *= matrix.get(size_of(parent), size_of(index));
            }
            total += product;
            // odometer over internal assignments
            let mut at = 0;
            loop {
                if at == assignment.len() {
                    return total;
                }
                assignment[at] += 1;
                if assignment[at] <= max {
                    break;
                }
                assignment[at] = 0;
                at += 1;
            }
        }
    }

    #[test]
    fn pruning_matches_brute_force_enumeration() {
        let (tree, _cache) = fitted("((A:1,B:2):1,(C:1,D:1):3);", 0.05, 5);
        let engine = Engine::new(&tree, SizeRange::span(5));
        let counts = counts_by_species(&tree, &[("A", 2), ("B", 4), ("C", 0), ("D", 3)]);
        let root = engine.root_vector(&counts).unwrap();
        for r in 0..=5usize {
            let expected = brute_force(&tree, &counts, r, 5);
            assert!(
                (root[r] - expected).abs() < 1e-9,
                "root size {}: pruning {} brute force {}",
                r,
                root[r],
                expected
            );
        }
    }

    #[test]
    fn pruning_matches_brute_force_on_a_multifurcation() {
        let (tree, _cache) = fitted("((A:1,B:1,C:2):2,(D:1,E:1):1);", 0.03, 4);
        let engine = Engine::new(&tree, SizeRange::span(4));
        let counts =
            counts_by_species(&tree, &[("A", 1), ("B", 2), ("C", 1), ("D", 0), ("E", 2)]);
        let root = engine.root_vector(&counts).unwrap();
        for r in 0..=4usize {
            let expected = brute_force(&tree, &counts, r, 4);
            assert!((root[r] - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn unset_matrices_are_reported() {
        let mut tree = newick::parse("((A:1,B:1):1,(C:1,D:1):1);").unwrap();
        for index in tree.postorder() {
            tree.node_mut(index).birth = 0.01;
        }
        let engine = Engine::new(&tree, SizeRange::span(5));
        let counts = counts_by_species(&tree, &[("A", 1), ("B", 1), ("C", 1), ("D", 1)]);
        assert!(matches!(
            engine.root_vector(&counts),
            Err(Error::MatrixMissing { .. })
        ));
    }

    #[test]
    fn oversized_counts_are_reported() {
        let (tree, _cache) = fitted("((A:1,B:1):1,(C:1,D:1):1);", 0.01, 5);
        let engine = Engine::new(&tree, SizeRange::span(5));
        let counts = counts_by_species(&tree, &[("A", 1), ("B", 9), ("C", 1), ("D", 1)]);
        assert!(matches!(
            engine.root_vector(&counts),
            Err(Error::OutOfRange { value: 9, bound: 5 })
        ));
    }

    #[test]
    fn error_models_spread_the_leaf_vector() {
        let (mut tree, _cache) = fitted("((A:1,B:1):1,(C:1,D:1):1);", 0.01, 4);
        let text = "maxcnt: 4\n\
                    cntdiff -1 0 1\n\
                    0 0 0.9 0.1\n\
                    1 0.1 0.8 0.1\n\
                    2 0.1 0.8 0.1\n\
                    3 0.1 0.8 0.1\n\
                    4 0.1 0.8 0.1\n";
        let model = Arc::new(ErrorModel::read(text.as_bytes(), "<test>").unwrap());
        assert!(tree.attach_error(Some("A"), &model));
        let engine = Engine::new(&tree, SizeRange::span(4));
        let exact = counts_by_species(&tree, &[("A", 2), ("B", 2), ("C", 2), ("D", 2)]);
        let fuzzy = engine.root_vector(&exact).unwrap();
        let sharp = {
            let mut plain = tree.clone();
            plain.detach_error(Some("A"));
            let engine = Engine::new(&plain, SizeRange::span(4));
            engine.root_vector(&exact).unwrap()
        };
        // mass leaks to neighboring sizes but stays comparable
        assert!(fuzzy[2] > 0.0);
        assert!(fuzzy[2] < sharp[2]);
    }

    #[test]
    fn clustered_mixture_interpolates_between_rates() {
        let (tree, cache) = fitted("((A:1,B:1):1,(C:1,D:1):1);", 0.01, 8);
        let engine = Engine::new(&tree, SizeRange::span(8));
        let counts = counts_by_species(&tree, &[("A", 2), ("B", 2), ("C", 2), ("D", 2)]);
        let table = |birth: f64| -> BTreeMap<NodeIndex, Arc<Transition>> {
            tree.postorder()
                .into_iter()
                .filter(|i| *i != tree.root())
                .map(|i| {
                    let node = tree.node(i);
                    (i, cache.get(node.branch, birth, node.death))
                })
                .collect()
        };
        let slow = table(0.005);
        let fast = table(0.05);
        let mixed = engine
            .clustered(&counts, &[slow.clone(), fast.clone()], &[0.5, 0.5])
            .unwrap();
        let pure_slow = engine.clustered(&counts, &[slow], &[1.0]).unwrap();
        let pure_fast = engine.clustered(&counts, &[fast], &[1.0]).unwrap();
        for r in 0..mixed.len() {
            let blend = 0.5 * pure_slow[r] + 0.5 * pure_fast[r];
            assert!((mixed[r] - blend).abs() < 1e-12);
        }
    }
}
