use crate::Count;
use crate::Probability;
use crate::Rate;
use crate::Score;
use crate::error::Error;
use crate::family::store::FamilyStore;
use crate::kernel::cache::MatrixCache;
use crate::likelihood::engine::Engine;
use crate::likelihood::prior::RootPrior;
use crate::likelihood::range::SizeRange;
use crate::phylo::newick;
use crate::phylo::tree::Phylogeny;
use crate::posterior::conditional::Conditional;
use crate::posterior::pvalue;
use crate::posterior::viterbi;
use crate::search::lambdas;
use crate::search::lambdas::Rates;
use rayon::prelude::*;
use serde::Serialize;

/// one node's MAP size and transition p-value within one family
#[derive(Debug, Clone, Serialize)]
pub struct NodeLine {
    pub label: String,
    pub size: Count,
    pub pvalue: Probability,
}

#[derive(Debug, Clone, Serialize)]
pub struct FamilyLine {
    pub id: String,
    pub pvalue: Probability,
    pub root: Count,
    pub nodes: Vec<NodeLine>,
}

/// the persisted outcome of an estimation: MLE parameters, the
/// annotated tree, and per-family p-values with MAP ancestral sizes
#[derive(Debug, Serialize)]
pub struct Report {
    pub tree: String,
    pub birth: Vec<Vec<Rate>>,
    pub death: Option<Vec<Rate>>,
    pub weights: Vec<Probability>,
    pub score: Score,
    pub families: Vec<FamilyLine>,
}

impl Report {
    pub fn assemble(
        tree: &mut Phylogeny,
        store: &FamilyStore,
        rates: &Rates,
        range: SizeRange,
        prior: &RootPrior,
        cache: &MatrixCache,
        score: Score,
        draws: usize,
        seed: u64,
    ) -> Result<Self, Error> {
        // under a latent mixture the report follows the heaviest
        // cluster's rates
        let showcase = rates
            .weights
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(at, _)| at)
            .unwrap_or(0);
        lambdas::apply(tree, rates, showcase);
        cache.apply(tree);
        log::info!(
            "building conditional distributions, {} draws per root size",
            draws
        );
        let conditional = Conditional::build(tree, range, draws, seed)?;
        let engine = Engine::new(tree, range);
        let order = tree.postorder();
        let tree = &*tree;
        let families: Vec<FamilyLine> = (0..store.len())
            .into_par_iter()
            .map(|nth| {
                let counts = store.counts(nth)?;
                let root = engine.root_vector(&counts)?;
                let posterior = pvalue::posterior(&root, prior, range.root_min)?;
                let family_pvalue = pvalue::family(&conditional, &root, &posterior, range.root_min);
                let map = viterbi::assign(tree, &engine, &counts, &posterior, range.root_min)?;
                let nodes = order
                    .iter()
                    .map(|index| NodeLine {
                        label: label(tree, *index),
                        size: map.sizes[index.index()],
                        pvalue: map.pvalues[index.index()],
                    })
                    .collect();
                Ok(FamilyLine {
                    id: store.family(nth).id.clone(),
                    pvalue: family_pvalue,
                    root: map.sizes[tree.root().index()],
                    nodes,
                })
            })
            .collect::<Result<_, Error>>()?;
        Ok(Self {
            tree: newick::write(tree),
            birth: rates.birth.clone(),
            death: rates.death.clone(),
            weights: rates.weights.clone(),
            score,
            families,
        })
    }

    /// tab separated text, one family per line
    pub fn text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# tree\t{}\n", self.tree));
        for (group, clusters) in self.birth.iter().enumerate() {
            let clusters: Vec<String> = clusters.iter().map(|l| l.to_string()).collect();
            out.push_str(&format!("# lambda[{}]\t{}\n", group, clusters.join("\t")));
        }
        if let Some(death) = &self.death {
            let death: Vec<String> = death.iter().map(|m| m.to_string()).collect();
            out.push_str(&format!("# mu\t{}\n", death.join("\t")));
        }
        if self.weights.len() > 1 {
            let weights: Vec<String> = self.weights.iter().map(|w| w.to_string()).collect();
            out.push_str(&format!("# weights\t{}\n", weights.join("\t")));
        }
        out.push_str(&format!("# score\t{}\n", self.score));
        out.push_str("FAMILY\tPVALUE\tROOT\tNODES\n");
        for family in &self.families {
            let nodes: Vec<String> = family
                .nodes
                .iter()
                .map(|n| format!("{}={}({})", n.label, n.size, n.pvalue))
                .collect();
            out.push_str(&format!(
                "{}\t{}\t{}\t{}\n",
                family.id,
                family.pvalue,
                family.root,
                nodes.join(",")
            ));
        }
        out
    }

    pub fn json(&self) -> Result<String, Error> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
    }

    pub fn save(&self, path: &std::path::Path, json: bool) -> Result<(), Error> {
        let text = if json { self.json()? } else { self.text() };
        std::fs::write(path, text)?;
        Ok(())
    }
}

fn label(tree: &Phylogeny, index: petgraph::graph::NodeIndex) -> String {
    match tree.node(index).species() {
        Some(species) => species.to_string(),
        None => format!("<{}>", index.index()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::lambdas::Layout;

    fn fixture() -> (Phylogeny, FamilyStore, MatrixCache, RootPrior, SizeRange) {
        let tree = newick::parse("((A:1,B:1):1,(C:1,D:1):1);").unwrap();
        let file = "Desc\tFamily ID\tA\tB\tC\tD\n\
                    one\tF1\t2\t3\t1\t2\n\
                    two\tF2\t1\t1\t2\t1\n";
        let mut store = FamilyStore::read(file.as_bytes(), "<test>").unwrap();
        store.index(&tree).unwrap();
        let range = SizeRange::span(8);
        let cache = MatrixCache::new(range.max);
        let prior = RootPrior::empirical(store.sizes(), range.max);
        (tree, store, cache, prior, range)
    }

    #[test]
    fn assembles_per_family_lines() {
        let (mut tree, store, cache, prior, range) = fixture();
        let layout = Layout::single(false);
        let rates = layout.decode(&[0.01]).unwrap();
        let report = Report::assemble(
            &mut tree, &store, &rates, range, &prior, &cache, 42.0, 32, 1,
        )
        .unwrap();
        assert_eq!(report.families.len(), 2);
        for family in &report.families {
            assert!((0.0..=1.0).contains(&family.pvalue));
            assert_eq!(family.nodes.len(), 7);
            assert!(family.root <= range.max);
        }
        let text = report.text();
        assert!(text.contains("F1"));
        assert!(text.contains("# lambda[0]\t0.01"));
        let json = report.json().unwrap();
        assert!(json.contains("\"id\": \"F1\""));
    }
}
