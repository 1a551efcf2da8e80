pub mod config;
pub mod error;
pub mod highlight;
pub mod types;

pub use config::Config;
pub use error::{PipelineError, FULL_WEIGHT, RATE_LIMIT_WEIGHT};
pub use types::{
    ChartType, Category, ClusterMember, ClusterState, ComponentKind, CredibilityTier, DataPoint,
    DetailEntry, EventCluster, FeedDescriptor, FeedEntry, GeoMarker, GraphComponent, MapComponent,
    ProcessedUrlMark, PublishedEvent, ScoredEntry, TimelineEntry,
};
