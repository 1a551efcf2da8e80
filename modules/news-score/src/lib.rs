pub mod prompt;
pub mod scorer;

pub use scorer::{DropReason, ScoreOutcome, Scorer};
