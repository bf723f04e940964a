use crate::Count;

/// one gene family: the homologs of one orthology group, counted per
/// species column of the source file. owned by the store and never
/// mutated after loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Family {
    pub id: String,
    pub desc: String,
    pub counts: Vec<Count>,
}

impl Family {
    pub fn count(&self, column: usize) -> Count {
        self.counts[column]
    }

    pub fn max(&self) -> Count {
        self.counts.iter().copied().max().unwrap_or(0)
    }
}

impl crate::Arbitrary for Family {
    fn random() -> Self {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        Self {
            id: format!("fam{}", rng.gen_range(0..100_000)),
            desc: "random".to_string(),
            counts: (0..rng.gen_range(2..8))
                .map(|_| rng.gen_range(0..20))
                .collect(),
        }
    }
}
