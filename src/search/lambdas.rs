use crate::Probability;
use crate::Rate;
use crate::kernel::rates::DeathRate;
use crate::phylo::tree::Phylogeny;

/// decoded rate parameters for one objective evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct Rates {
    pub birth: Vec<Vec<Rate>>,
    pub death: Option<Vec<Rate>>,
    pub weights: Vec<Probability>,
}

/// shape of the search vector. the lambda tree is the phylogeny
/// itself: every node's taxon id picks the rate group its branch
/// belongs to. per group the vector carries the cluster birth rates
/// (cluster 0 pinned to zero under fixcluster0), then one death rate
/// per group when those are estimated, then the first K-1 cluster
/// weights with the last inferred from the simplex residual.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub groups: usize,
    pub clusters: usize,
    pub estimate_death: bool,
    pub fixcluster0: bool,
}

impl Layout {
    pub fn single(estimate_death: bool) -> Self {
        Self {
            groups: 1,
            clusters: 1,
            estimate_death,
            fixcluster0: false,
        }
    }

    pub fn from_tree(
        tree: &Phylogeny,
        clusters: usize,
        estimate_death: bool,
        fixcluster0: bool,
    ) -> Self {
        let groups = tree
            .postorder()
            .into_iter()
            .filter(|i| *i != tree.root())
            .map(|i| tree.node(i).taxon.max(0) as usize)
            .max()
            .unwrap_or(0)
            + 1;
        Self {
            groups,
            clusters: clusters.max(1),
            estimate_death,
            fixcluster0,
        }
    }

    fn free_births(&self) -> usize {
        if self.fixcluster0 {
            self.clusters - 1
        } else {
            self.clusters
        }
    }

    pub fn dimensions(&self) -> usize {
        let deaths = if self.estimate_death { self.groups } else { 0 };
        self.groups * self.free_births() + deaths + self.clusters - 1
    }

    /// None rejects the vector: wrong arity, a negative rate, or
    /// cluster weights leaving no residual for the last cluster
    pub fn decode(&self, theta: &[f64]) -> Option<Rates> {
        if theta.len() != self.dimensions() {
            return None;
        }
        if theta.iter().any(|x| *x < 0.0) {
            return None;
        }
        let mut cursor = theta.iter().copied();
        let mut birth = Vec::with_capacity(self.groups);
        for _ in 0..self.groups {
            let mut clusters = Vec::with_capacity(self.clusters);
            if self.fixcluster0 {
                clusters.push(0.0);
            }
            while clusters.len() < self.clusters {
                clusters.push(cursor.next()?);
            }
            birth.push(clusters);
        }
        let death = if self.estimate_death {
            Some((0..self.groups).map(|_| cursor.next()).collect::<Option<_>>()?)
        } else {
            None
        };
        let mut weights: Vec<Probability> = Vec::with_capacity(self.clusters);
        while weights.len() + 1 < self.clusters {
            weights.push(cursor.next()?);
        }
        let residual = 1.0 - weights.iter().sum::<Probability>();
        if residual < 0.0 {
            return None;
        }
        weights.push(residual);
        Some(Rates {
            birth,
            death,
            weights,
        })
    }

    /// a flat starting vector around one rate guess
    pub fn start(&self, guess: Rate) -> Vec<f64> {
        let mut theta = Vec::with_capacity(self.dimensions());
        for _ in 0..self.groups {
            for cluster in 0..self.free_births() {
                theta.push(guess * (1.0 + cluster as f64));
            }
        }
        if self.estimate_death {
            for _ in 0..self.groups {
                theta.push(guess);
            }
        }
        for _ in 0..self.clusters - 1 {
            theta.push(1.0 / self.clusters as f64);
        }
        theta
    }
}

/// a serviceable rate guess: about one event expected along the
/// deepest root to leaf path
pub fn guess(tree: &Phylogeny) -> Rate {
    let deepest = tree
        .leaves()
        .into_iter()
        .map(|leaf| tree.depth(leaf))
        .fold(0.0, f64::max);
    if deepest > 0.0 { 1.0 / deepest } else { 0.01 }
}

/// write one cluster's per-branch rates onto the tree
pub fn apply(tree: &mut Phylogeny, rates: &Rates, cluster: usize) {
    let groups = rates.birth.len();
    for index in tree.postorder() {
        if index == tree.root() {
            continue;
        }
        let node = tree.node_mut(index);
        let group = (node.taxon.max(0) as usize).min(groups - 1);
        node.birth = rates.birth[group][cluster];
        node.death = match &rates.death {
            Some(death) => DeathRate::Value(death[group]),
            None => DeathRate::SameAsBirth,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phylo::newick;

    #[test]
    fn group_count_comes_from_taxon_ids() {
        let tree = newick::parse("((A:1[1],B:1[0]):1[1],(C:1[2],D:1):1);").unwrap();
        let layout = Layout::from_tree(&tree, 1, false, false);
        assert_eq!(layout.groups, 3);
        assert_eq!(layout.dimensions(), 3);
    }

    #[test]
    fn death_rates_add_one_dimension_per_group() {
        let tree = newick::parse("((A:1[1],B:1):1,(C:1,D:1):1);").unwrap();
        let layout = Layout::from_tree(&tree, 1, true, false);
        assert_eq!(layout.dimensions(), 4);
        let rates = layout.decode(&[0.01, 0.02, 0.005, 0.006]).unwrap();
        assert_eq!(rates.birth, vec![vec![0.01], vec![0.02]]);
        assert_eq!(rates.death, Some(vec![0.005, 0.006]));
        assert_eq!(rates.weights, vec![1.0]);
    }

    #[test]
    fn clusters_append_births_and_weights() {
        let layout = Layout {
            groups: 1,
            clusters: 3,
            estimate_death: false,
            fixcluster0: false,
        };
        assert_eq!(layout.dimensions(), 5);
        let rates = layout.decode(&[0.01, 0.02, 0.03, 0.5, 0.3]).unwrap();
        assert_eq!(rates.birth, vec![vec![0.01, 0.02, 0.03]]);
        let residual: f64 = rates.weights[2];
        assert!((residual - 0.2).abs() < 1e-12);
    }

    #[test]
    fn fixcluster0_pins_the_first_birth_rate() {
        let layout = Layout {
            groups: 2,
            clusters: 2,
            estimate_death: false,
            fixcluster0: true,
        };
        assert_eq!(layout.dimensions(), 3);
        let rates = layout.decode(&[0.04, 0.05, 0.7]).unwrap();
        assert_eq!(rates.birth, vec![vec![0.0, 0.04], vec![0.0, 0.05]]);
        assert!((rates.weights[1] - 0.3).abs() < 1e-12);
    }

    #[test]
    fn negative_rates_and_overweight_clusters_are_rejected() {
        let layout = Layout {
            groups: 1,
            clusters: 2,
            estimate_death: false,
            fixcluster0: false,
        };
        assert!(layout.decode(&[0.01, -0.02, 0.5]).is_none());
        assert!(layout.decode(&[0.01, 0.02, 1.5]).is_none());
        assert!(layout.decode(&[0.01, 0.02]).is_none());
    }

    #[test]
    fn apply_routes_rates_through_taxon_groups() {
        let mut tree = newick::parse("((A:1[1],B:1):1,(C:1,D:1):1);").unwrap();
        let rates = Rates {
            birth: vec![vec![0.01], vec![0.09]],
            death: None,
            weights: vec![1.0],
        };
        apply(&mut tree, &rates, 0);
        let a = tree.leaf("A").unwrap();
        let b = tree.leaf("B").unwrap();
        assert_eq!(tree.node(a).birth, 0.09);
        assert_eq!(tree.node(b).birth, 0.01);
    }

    #[test]
    fn start_matches_dimensions() {
        for layout in [
            Layout::single(false),
            Layout::single(true),
            Layout {
                groups: 2,
                clusters: 3,
                estimate_death: true,
                fixcluster0: true,
            },
        ] {
            assert_eq!(layout.start(0.01).len(), layout.dimensions());
            assert!(layout.decode(&layout.start(0.01)).is_some());
        }
    }
}
