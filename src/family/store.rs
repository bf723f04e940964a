use super::errormodel::ErrorModel;
use super::family::Family;
use crate::Count;
use crate::error::Error;
use crate::phylo::tree::Phylogeny;
use petgraph::graph::NodeIndex;
use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

/// the loaded data set: species header, families, and any error
/// models. read-only while an evaluation runs. the species to leaf
/// index must be rebuilt against every new tree before counts are
/// handed to the engine.
#[derive(Debug, Clone, Default)]
pub struct FamilyStore {
    species: Vec<String>,
    families: Vec<Family>,
    models: Vec<Arc<ErrorModel>>,
    columns: Option<Vec<NodeIndex>>,
}

impl FamilyStore {
    /// tab separated counts: `Desc<TAB>Family ID<TAB>species...`, one
    /// family per following line
    pub fn read<R: BufRead>(reader: R, file: &str) -> Result<Self, Error> {
        let mut lines = reader.lines().enumerate();
        let header = match lines.next() {
            Some((_, line)) => line?,
            None => return Err(Error::parse(file, 1, "empty family file")),
        };
        let columns: Vec<&str> = header.split('\t').collect();
        if columns.len() < 3 {
            return Err(Error::parse(file, 1, "expected Desc, Family ID, species..."));
        }
        let species: Vec<String> = columns[2..].iter().map(|s| s.trim().to_string()).collect();
        let mut families = Vec::new();
        for (at, line) in lines {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() != species.len() + 2 {
                return Err(Error::parse(
                    file,
                    at + 1,
                    format!("{} fields, expected {}", fields.len(), species.len() + 2),
                ));
            }
            let counts: Vec<Count> = fields[2..]
                .iter()
                .map(|c| {
                    c.trim().parse().map_err(|_| {
                        Error::parse(file, at + 1, format!("bad count '{}'", c.trim()))
                    })
                })
                .collect::<Result<_, _>>()?;
            families.push(Family {
                desc: fields[0].trim().to_string(),
                id: fields[1].trim().to_string(),
                counts,
            });
        }
        Ok(Self {
            species,
            families,
            models: Vec::new(),
            columns: None,
        })
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let file = std::fs::File::open(path)?;
        Self::read(std::io::BufReader::new(file), &path.display().to_string())
    }

    /// an empty store over a fixed species header, for simulation
    /// output
    pub fn assemble(species: Vec<String>) -> Self {
        Self {
            species,
            families: Vec::new(),
            models: Vec::new(),
            columns: None,
        }
    }

    /// the same tab separated layout `read` accepts
    pub fn write<W: std::io::Write>(&self, mut writer: W) -> Result<(), Error> {
        writeln!(writer, "Desc\tFamily ID\t{}", self.species.join("\t"))?;
        for family in &self.families {
            let counts: Vec<String> = family.counts.iter().map(|c| c.to_string()).collect();
            writeln!(
                writer,
                "{}\t{}\t{}",
                family.desc,
                family.id,
                counts.join("\t")
            )?;
        }
        Ok(())
    }

    pub fn species(&self) -> &[String] {
        &self.species
    }

    pub fn families(&self) -> &[Family] {
        &self.families
    }

    pub fn family(&self, index: usize) -> &Family {
        &self.families[index]
    }

    pub fn len(&self) -> usize {
        self.families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    pub fn push(&mut self, family: Family) {
        self.families.push(family);
    }

    /// bind species columns to tree leaves. the species sets must
    /// match exactly in both directions.
    pub fn index(&mut self, tree: &Phylogeny) -> Result<(), Error> {
        let mut columns = Vec::with_capacity(self.species.len());
        for species in &self.species {
            let leaf = tree.leaf(species).ok_or_else(|| {
                Error::inconsistent(format!("species '{}' is not a tree leaf", species))
            })?;
            columns.push(leaf);
        }
        for leaf in tree.leaves() {
            let name = tree.node(leaf).species().unwrap_or_default();
            if !self.species.iter().any(|s| s == name) {
                return Err(Error::inconsistent(format!(
                    "tree leaf '{}' has no count column",
                    name
                )));
            }
        }
        self.columns = Some(columns);
        Ok(())
    }

    /// leaf counts for one family, keyed by tree node
    pub fn counts(&self, family: usize) -> Result<BTreeMap<NodeIndex, Count>, Error> {
        let columns = self.columns.as_ref().ok_or(Error::NotSynchronized)?;
        Ok(columns
            .iter()
            .copied()
            .zip(self.families[family].counts.iter().copied())
            .collect())
    }

    pub fn max_count(&self) -> Count {
        self.families.iter().map(Family::max).max().unwrap_or(0)
    }

    /// every observed leaf count, across families and species
    pub fn sizes(&self) -> impl Iterator<Item = Count> + '_ {
        self.families.iter().flat_map(|f| f.counts.iter().copied())
    }

    /// the store owns error models; leaves reference them
    pub fn adopt(&mut self, model: ErrorModel) -> Arc<ErrorModel> {
        let model = Arc::new(model);
        self.models.push(model.clone());
        model
    }

    pub fn models(&self) -> &[Arc<ErrorModel>] {
        &self.models
    }
}
