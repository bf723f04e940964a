pub mod lambdas;
pub mod objective;
pub mod simplex;
