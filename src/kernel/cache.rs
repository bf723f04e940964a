use super::birthdeath::BirthDeath;
use super::logchoose::LogChoose;
use super::matrix::Transition;
use super::rates::DeathRate;
use crate::Count;
use crate::Rate;
use crate::phylo::tree::Phylogeny;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::RwLock;

/// lookup key. branch lengths truncate to whole units: sub-unit
/// differences do not move the transition probabilities at the
/// precision carried here, so nearby branches share one matrix.
/// callers must tolerate that sharing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Key {
    branch: u64,
    birth: u64,
    death: u64,
}

impl From<(f64, Rate, DeathRate)> for Key {
    fn from((t, birth, death): (f64, Rate, DeathRate)) -> Self {
        Self {
            branch: t.trunc() as u64,
            birth: birth.to_bits(),
            death: f64::from(death).to_bits(),
        }
    }
}

/// owns every transition matrix in play. entries append between
/// resets and are never replaced, so an evaluation may hold a matrix
/// across the whole pass. a reset takes &mut self, which forces all
/// workers to have joined first.
#[derive(Debug)]
pub struct MatrixCache {
    side: usize,
    table: LogChoose,
    matrices: RwLock<BTreeMap<Key, Arc<Transition>>>,
}

impl MatrixCache {
    pub fn new(max: Count) -> Self {
        Self {
            side: max + 1,
            table: LogChoose::new(2 * (max + 1)),
            matrices: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn side(&self) -> usize {
        self.side
    }

    pub fn len(&self) -> usize {
        self.matrices.read().expect("cache lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// fetch or compute the matrix for one (branch, rates) triple.
    /// computation happens outside the write lock; when two workers
    /// race on a fresh key the first insert wins and the loser's
    /// matrix is dropped.
    pub fn get(&self, t: f64, birth: Rate, death: DeathRate) -> Arc<Transition> {
        let key = Key::from((t, birth, death));
        if let Some(matrix) = self.matrices.read().expect("cache lock").get(&key) {
            return matrix.clone();
        }
        let matrix = Arc::new(BirthDeath::new(birth, death).transition(t, self.side, &self.table));
        self.matrices
            .write()
            .expect("cache lock")
            .entry(key)
            .or_insert(matrix)
            .clone()
    }

    /// drop everything and resize future matrices. matrices handed out
    /// before the reset stay alive only for holders of their Arc.
    pub fn reset(&mut self, max: Count) {
        self.side = max + 1;
        if 2 * self.side > self.table.bound() {
            self.table = LogChoose::new(2 * self.side);
        }
        self.matrices.get_mut().expect("cache lock").clear();
    }

    /// point every non-root node at its matrix. must run before any
    /// likelihood evaluation against this tree.
    pub fn apply(&self, tree: &mut Phylogeny) {
        for index in tree.postorder() {
            if index == tree.root() {
                continue;
            }
            let (branch, birth, death) = {
                let node = tree.node(index);
                (node.branch, node.birth, node.death)
            };
            tree.node_mut(index).matrix = Some(self.get(branch, birth, death));
        }
    }
}
