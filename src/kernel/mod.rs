pub mod birthdeath;
pub mod cache;
pub mod logchoose;
pub mod matrix;
pub mod rates;
