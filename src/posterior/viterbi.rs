use crate::Count;
use crate::Probability;
use crate::error::Error;
use crate::likelihood::engine::Engine;
use crate::likelihood::engine::LeafCounts;
use crate::phylo::tree::Phylogeny;

/// MAP ancestral sizes, one per node, with a marginal p-value for the
/// transition into each node
#[derive(Debug, Clone)]
pub struct Viterbi {
    pub sizes: Vec<Count>,
    pub pvalues: Vec<Probability>,
}

/// top down assignment: the root takes the posterior mode, every
/// other node the size maximizing transition probability times its
/// conditional vector. the per-node p-value is the total probability
/// of transitions out of the parent no more likely than the chosen
/// one.
pub fn assign(
    tree: &Phylogeny,
    engine: &Engine,
    counts: &LeafCounts,
    posterior: &[Probability],
    root_min: Count,
) -> Result<Viterbi, Error> {
    let vectors = engine.node_vectors(counts)?;
    let mut sizes = vec![0; tree.len()];
    let mut pvalues = vec![1.0; tree.len()];
    let mode = posterior
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(at, _)| at)
        .unwrap_or(0);
    sizes[tree.root().index()] = root_min + mode;
    // parents come before children in reverse postorder
    for index in tree.postorder().into_iter().rev() {
        if index == tree.root() {
            continue;
        }
        let parent = tree.parent(index).expect("non-root node");
        let from = sizes[parent.index()];
        let matrix = tree
            .node(index)
            .matrix
            .as_ref()
            .ok_or(Error::MatrixMissing {
                node: index.index(),
            })?;
        let below = &vectors[index.index()];
        let mut best = 0;
        let mut best_joint = -1.0;
        for (to, l) in below.iter().enumerate() {
            let joint = matrix.get(from, to) * l;
            if joint > best_joint {
                best = to;
                best_joint = joint;
            }
        }
        sizes[index.index()] = best;
        let chosen = matrix.get(from, best);
        pvalues[index.index()] = (0..below.len())
            .map(|to| matrix.get(from, to))
            .filter(|p| *p <= chosen)
            .sum();
    }
    Ok(Viterbi { sizes, pvalues })
}
