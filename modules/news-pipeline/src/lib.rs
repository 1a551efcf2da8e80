pub mod cycle;
pub mod report;

pub use cycle::{run_cycle, CycleConfig, PipelineServices};
pub use report::CycleReport;
