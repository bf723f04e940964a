/// everything that can go wrong between reading inputs and writing a
/// report. io and validation errors abort the running command; numeric
/// failures inside the objective are downgraded to infinite cost by the
/// search layer and never surface as this type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("{file}:{line}: {what}")]
    Parse {
        file: String,
        line: usize,
        what: String,
    },
    #[error("inconsistent input: {what}")]
    Inconsistent { what: String },
    #[error("value {value} exceeds bound {bound}")]
    OutOfRange { value: usize, bound: usize },
    #[error("family store is not indexed against the tree")]
    NotSynchronized,
    #[error("no transition matrix at node {node}")]
    MatrixMissing { node: usize },
    #[error("non-finite value in {what}")]
    NumericFailure { what: String },
    #[error("search did not converge after {runs} runs, best score {score}")]
    ConvergenceFailure { runs: usize, score: f64 },
}

impl Error {
    pub fn parse(file: &str, line: usize, what: impl Into<String>) -> Self {
        Self::Parse {
            file: file.to_string(),
            line,
            what: what.into(),
        }
    }
    pub fn inconsistent(what: impl Into<String>) -> Self {
        Self::Inconsistent { what: what.into() }
    }
}
