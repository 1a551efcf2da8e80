//! The per-cycle summary the supervisor logs at the end of every run
//! (spec.md §5: "the cycle ends with a partial report" when the wall-clock
//! budget is exceeded, and more generally every cycle produces one).

use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub entries_collected: usize,
    pub entries_scored: usize,
    pub entries_kept: usize,
    pub entries_dropped: usize,
    pub clusters_new: usize,
    pub clusters_joined: usize,
    pub clusters_published: usize,
    pub clusters_updated: usize,
    pub clusters_unchanged: usize,
    pub clusters_skipped_no_image: usize,
    pub clusters_skipped_no_source: usize,
    pub clusters_deferred: usize,
    pub budget_exceeded: bool,
    pub duration: Duration,
}

impl CycleReport {
    pub fn log(&self) {
        tracing::info!(
            entries_collected = self.entries_collected,
            entries_scored = self.entries_scored,
            entries_kept = self.entries_kept,
            entries_dropped = self.entries_dropped,
            clusters_new = self.clusters_new,
            clusters_joined = self.clusters_joined,
            clusters_published = self.clusters_published,
            clusters_updated = self.clusters_updated,
            clusters_unchanged = self.clusters_unchanged,
            clusters_skipped_no_image = self.clusters_skipped_no_image,
            clusters_skipped_no_source = self.clusters_skipped_no_source,
            clusters_deferred = self.clusters_deferred,
            budget_exceeded = self.budget_exceeded,
            duration_ms = self.duration.as_millis() as u64,
            "cycle complete"
        );
    }
}
