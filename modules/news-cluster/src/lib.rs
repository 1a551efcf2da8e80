pub mod clusterer;
pub mod matcher;
pub mod similarity;
pub mod tokenize;

pub use clusterer::{Assignment, Clusterer};
pub use matcher::MatchRule;
