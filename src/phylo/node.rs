use crate::Rate;
use crate::family::errormodel::ErrorModel;
use crate::kernel::matrix::Transition;
use crate::kernel::rates::DeathRate;
use std::sync::Arc;

/// one phylogeny node: a shared rate header plus the leaf or internal
/// payload. the transition matrix is borrowed from the cache, never
/// owned here.
#[derive(Debug, Clone)]
pub struct Node {
    pub branch: f64,
    pub taxon: i64,
    pub birth: Rate,
    pub death: DeathRate,
    pub matrix: Option<Arc<Transition>>,
    pub kind: Kind,
}

#[derive(Debug, Clone)]
pub enum Kind {
    Leaf {
        species: String,
        error: Option<Arc<ErrorModel>>,
    },
    Internal {
        label: Option<String>,
    },
}

impl Node {
    pub fn leaf(species: impl Into<String>, branch: f64) -> Self {
        Self {
            branch,
            taxon: 0,
            birth: 0.0,
            death: DeathRate::SameAsBirth,
            matrix: None,
            kind: Kind::Leaf {
                species: species.into(),
                error: None,
            },
        }
    }

    pub fn internal(branch: f64) -> Self {
        Self {
            branch,
            taxon: 0,
            birth: 0.0,
            death: DeathRate::SameAsBirth,
            matrix: None,
            kind: Kind::Internal { label: None },
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, Kind::Leaf { .. })
    }

    pub fn species(&self) -> Option<&str> {
        match &self.kind {
            Kind::Leaf { species, .. } => Some(species),
            Kind::Internal { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&Arc<ErrorModel>> {
        match &self.kind {
            Kind::Leaf { error, .. } => error.as_ref(),
            Kind::Internal { .. } => None,
        }
    }
}
