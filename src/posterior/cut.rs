use crate::Count;
use crate::Probability;
use crate::error::Error;
use crate::likelihood::engine::Engine;
use crate::likelihood::engine::LeafCounts;
use crate::likelihood::prior::RootPrior;
use crate::likelihood::range::SizeRange;
use crate::phylo::tree::Phylogeny;
use crate::sim::forward::Simulator;
use petgraph::graph::NodeIndex;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rayon::prelude::*;
use std::collections::BTreeMap;

/// p-value for the subtree against the rest of the tree at one
/// internal branch
#[derive(Debug, Clone)]
pub struct Cut {
    pub node: NodeIndex,
    pub pvalue: Probability,
}

/// for every internal branch: split the tree there, score each side's
/// observed counts at its own posterior mode root, and measure how
/// often a paired draw from the two independent nulls is at least as
/// extreme on both sides at once.
pub fn pvalues(
    tree: &Phylogeny,
    range: SizeRange,
    counts: &LeafCounts,
    prior: &RootPrior,
    draws: usize,
    seed: u64,
) -> Result<Vec<Cut>, Error> {
    let by_species = species_counts(tree, counts);
    let mut cuts = Vec::new();
    for (nth, index) in tree.postorder().into_iter().enumerate() {
        if index == tree.root() || tree.node(index).is_leaf() {
            continue;
        }
        let (inside, outside) = tree.split(index);
        let pvalue = paired(
            &inside,
            &outside,
            &by_species,
            range,
            prior,
            draws,
            seed.wrapping_add(nth as u64),
        )?;
        cuts.push(Cut {
            node: index,
            pvalue,
        });
    }
    Ok(cuts)
}

fn species_counts(tree: &Phylogeny, counts: &LeafCounts) -> BTreeMap<String, Count> {
    counts
        .iter()
        .filter_map(|(index, count)| {
            tree.node(*index)
                .species()
                .map(|species| (species.to_string(), *count))
        })
        .collect()
}

fn recounts(side: &Phylogeny, by_species: &BTreeMap<String, Count>) -> LeafCounts {
    side.leaves()
        .into_iter()
        .filter_map(|leaf| {
            side.node(leaf)
                .species()
                .and_then(|species| by_species.get(species))
                .map(|count| (leaf, *count))
        })
        .collect()
}

/// observed likelihood and posterior mode root for one side
fn observe(
    side: &Phylogeny,
    counts: &LeafCounts,
    range: SizeRange,
    prior: &RootPrior,
) -> Result<(Count, f64), Error> {
    let engine = Engine::new(side, range);
    let root = engine.root_vector(counts)?;
    let posterior = super::pvalue::posterior(&root, prior, range.root_min)?;
    let mode = posterior
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(at, _)| at)
        .unwrap_or(0);
    Ok((range.root_min + mode, root[mode]))
}

fn paired(
    inside: &Phylogeny,
    outside: &Phylogeny,
    by_species: &BTreeMap<String, Count>,
    range: SizeRange,
    prior: &RootPrior,
    draws: usize,
    seed: u64,
) -> Result<Probability, Error> {
    let inner_counts = recounts(inside, by_species);
    let outer_counts = recounts(outside, by_species);
    let (inner_root, inner_observed) = observe(inside, &inner_counts, range, prior)?;
    let (outer_root, outer_observed) = observe(outside, &outer_counts, range, prior)?;
    let inner_engine = Engine::new(inside, range);
    let outer_engine = Engine::new(outside, range);
    let inner_simulator = Simulator::new(inside);
    let outer_simulator = Simulator::new(outside);
    let extreme: usize = (0..draws)
        .into_par_iter()
        .map(|draw| {
            let mut rng = SmallRng::seed_from_u64(
                seed.wrapping_mul(0x9e3779b97f4a7c15)
                    .wrapping_add(draw as u64),
            );
            let inner_sim = inner_simulator.leaves(inner_root, &mut rng)?;
            let outer_sim = outer_simulator.leaves(outer_root, &mut rng)?;
            let inner = inner_engine.root_vector(&inner_sim)?[inner_root - range.root_min];
            let outer = outer_engine.root_vector(&outer_sim)?[outer_root - range.root_min];
            Ok(usize::from(inner <= inner_observed && outer <= outer_observed))
        })
        .collect::<Result<Vec<usize>, Error>>()?
        .into_iter()
        .sum();
    Ok(extreme as Probability / draws as Probability)
}
