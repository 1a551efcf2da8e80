pub mod cluster;
pub mod output;
pub mod processed_url;
pub mod publisher;

pub use cluster::{ClusterStore, HttpClusterStore, InMemoryClusterStore};
pub use output::{HttpOutputStore, InMemoryOutputStore, OutputStore};
pub use processed_url::{HttpProcessedUrlStore, InMemoryProcessedUrlStore, ProcessedUrlStore};
pub use publisher::{PublishDraft, PublishOutcome, Publisher};
