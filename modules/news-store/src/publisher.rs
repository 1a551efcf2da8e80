//! Stage 8 (spec.md §4.9): insert-or-update logic for a synthesized,
//! component-populated cluster, followed by marking every member URL
//! processed. This is the only stage that writes to the output store.

use std::sync::Arc;

use chrono::Utc;
use news_common::{Category, ComponentKind, DetailEntry, EventCluster, GraphComponent, MapComponent, PipelineError, PublishedEvent, TimelineEntry};
use tracing::{debug, info};
use uuid::Uuid;

use crate::cluster::ClusterStore;
use crate::output::OutputStore;
use crate::processed_url::ProcessedUrlStore;

/// Everything the publisher needs beyond the cluster itself — the output
/// of stages 4-7, already validated by their own stages.
pub struct PublishDraft {
    pub title_advanced: String,
    pub title_simple: String,
    pub bullets_advanced: Vec<String>,
    pub bullets_simple: Vec<String>,
    pub body_advanced: String,
    pub body_simple: String,
    pub category: Category,
    pub emoji: String,
    pub image_url: String,
    pub image_source_name: String,
    pub components_order: Vec<ComponentKind>,
    pub timeline: Option<Vec<TimelineEntry>>,
    pub details: Option<Vec<DetailEntry>>,
    pub graph: Option<GraphComponent>,
    pub map: Option<MapComponent>,
}

/// Which of the three publish branches ran (spec.md §4.9, §5): the cycle
/// report distinguishes a brand-new event, a materially changed republish,
/// and a no-op so "unchanged" isn't miscounted as either of the others.
#[derive(Debug, Clone)]
pub enum PublishOutcome {
    Inserted(PublishedEvent),
    Updated(PublishedEvent),
    Unchanged(PublishedEvent),
}

impl PublishOutcome {
    pub fn event(&self) -> &PublishedEvent {
        match self {
            PublishOutcome::Inserted(e) | PublishOutcome::Updated(e) | PublishOutcome::Unchanged(e) => e,
        }
    }
}

pub struct Publisher {
    cluster_store: Arc<dyn ClusterStore>,
    output_store: Arc<dyn OutputStore>,
    processed_url_store: Arc<dyn ProcessedUrlStore>,
}

impl Publisher {
    pub fn new(
        cluster_store: Arc<dyn ClusterStore>,
        output_store: Arc<dyn OutputStore>,
        processed_url_store: Arc<dyn ProcessedUrlStore>,
    ) -> Self {
        Self {
            cluster_store,
            output_store,
            processed_url_store,
        }
    }

    /// Publishes `draft` for `cluster`: inserts if this cluster has never
    /// been published, updates if materially different, or is a no-op
    /// otherwise. Marks every cluster-member URL processed afterward
    /// regardless of which branch ran (spec.md §4.9).
    pub async fn publish(&self, cluster: &mut EventCluster, draft: PublishDraft) -> Result<PublishOutcome, PipelineError> {
        let existing = self.output_store.get_by_cluster_id(cluster.cluster_id).await?;

        let outcome = match existing {
            None => {
                let now = Utc::now();
                let event = PublishedEvent {
                    event_id: Uuid::new_v4(),
                    cluster_id: cluster.cluster_id,
                    title_advanced: draft.title_advanced,
                    title_simple: draft.title_simple,
                    bullets_advanced: draft.bullets_advanced,
                    bullets_simple: draft.bullets_simple,
                    body_advanced: draft.body_advanced,
                    body_simple: draft.body_simple,
                    category: draft.category,
                    emoji: draft.emoji,
                    image_url: draft.image_url,
                    image_source_name: draft.image_source_name,
                    number_of_sources: cluster.number_of_sources() as u32,
                    components_order: draft.components_order,
                    timeline: draft.timeline,
                    details: draft.details,
                    graph: draft.graph,
                    map: draft.map,
                    version: 1,
                    created_at: now,
                    last_updated_at: now,
                };
                info!(cluster_id = %cluster.cluster_id, event_id = %event.event_id, "publisher: inserting new event");
                self.output_store.upsert(&event).await?;
                cluster.state = news_common::ClusterState::Live;
                self.cluster_store.save(cluster).await?;
                PublishOutcome::Inserted(event)
            }
            Some(previous) => {
                let number_of_sources = cluster.number_of_sources() as u32;
                if !is_materially_changed(&previous, &draft, number_of_sources) {
                    debug!(cluster_id = %cluster.cluster_id, "publisher: no material change, skipping update");
                    PublishOutcome::Unchanged(previous)
                } else {
                    let event = PublishedEvent {
                        event_id: previous.event_id,
                        cluster_id: cluster.cluster_id,
                        title_advanced: draft.title_advanced,
                        title_simple: draft.title_simple,
                        bullets_advanced: draft.bullets_advanced,
                        bullets_simple: draft.bullets_simple,
                        body_advanced: draft.body_advanced,
                        body_simple: draft.body_simple,
                        category: draft.category,
                        emoji: draft.emoji,
                        image_url: draft.image_url,
                        image_source_name: draft.image_source_name,
                        number_of_sources,
                        components_order: draft.components_order,
                        timeline: draft.timeline,
                        details: draft.details,
                        graph: draft.graph,
                        map: draft.map,
                        version: previous.version + 1,
                        created_at: previous.created_at,
                        last_updated_at: Utc::now(),
                    };
                    info!(cluster_id = %cluster.cluster_id, event_id = %event.event_id, version = event.version, "publisher: updating event");
                    self.output_store.upsert(&event).await?;
                    PublishOutcome::Updated(event)
                }
            }
        };

        for member in &cluster.members {
            let _ = self.processed_url_store.check_and_insert(member.scored.url()).await;
        }

        Ok(outcome)
    }
}

/// "Material change" per spec.md §4.9: a title-advanced change, a new
/// source-count, or any component value change. Whitespace-only diffs in
/// the title do not count.
fn is_materially_changed(previous: &PublishedEvent, draft: &PublishDraft, number_of_sources: u32) -> bool {
    if normalize_whitespace(&previous.title_advanced) != normalize_whitespace(&draft.title_advanced) {
        return true;
    }
    if previous.number_of_sources != number_of_sources {
        return true;
    }
    if previous.components_order != draft.components_order {
        return true;
    }
    if components_differ(previous, draft) {
        return true;
    }
    false
}

fn components_differ(previous: &PublishedEvent, draft: &PublishDraft) -> bool {
    let timeline_differs = match (&previous.timeline, &draft.timeline) {
        (None, None) => false,
        (Some(a), Some(b)) => a.len() != b.len() || a.iter().zip(b).any(|(x, y)| x.date != y.date || x.event != y.event),
        _ => true,
    };
    let details_differs = match (&previous.details, &draft.details) {
        (None, None) => false,
        (Some(a), Some(b)) => a.len() != b.len() || a.iter().zip(b).any(|(x, y)| x.label != y.label || x.value != y.value),
        _ => true,
    };
    let graph_differs = match (&previous.graph, &draft.graph) {
        (None, None) => false,
        (Some(a), Some(b)) => a.chart_type != b.chart_type || a.data_points.len() != b.data_points.len(),
        _ => true,
    };
    let map_differs = match (&previous.map, &draft.map) {
        (None, None) => false,
        (Some(a), Some(b)) => a.markers.len() != b.markers.len(),
        _ => true,
    };
    timeline_differs || details_differs || graph_differs || map_differs
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::InMemoryClusterStore;
    use crate::output::InMemoryOutputStore;
    use crate::processed_url::InMemoryProcessedUrlStore;
    use news_common::{ClusterMember, CredibilityTier, FeedEntry, ScoredEntry};

    fn cluster() -> EventCluster {
        let member = ClusterMember::new(ScoredEntry {
            entry: FeedEntry {
                source_name: "Wire".into(),
                url: "https://example.com/a".into(),
                guid: None,
                title: "Title".into(),
                summary: "summary".into(),
                body: String::new(),
                image_url: None,
                published_at: Utc::now(),
                fetched_at: Utc::now(),
                tier: CredibilityTier::Major,
            },
            importance: 900,
            category: Category::World,
            emoji: "🌍".into(),
            score_reasoning: String::new(),
        });
        EventCluster::seed(member, Default::default(), Default::default())
    }

    fn draft(title: &str) -> PublishDraft {
        PublishDraft {
            title_advanced: title.to_string(),
            title_simple: title.to_string(),
            bullets_advanced: vec!["a".into(), "b".into(), "c".into()],
            bullets_simple: vec!["a".into(), "b".into(), "c".into()],
            body_advanced: "x".repeat(300),
            body_simple: "x".repeat(300),
            category: Category::World,
            emoji: "🌍".into(),
            image_url: "https://example.com/x.jpg".into(),
            image_source_name: "Example".into(),
            components_order: vec![ComponentKind::Details],
            timeline: None,
            details: Some(vec![DetailEntry { label: "x".into(), value: "1".into(), subtitle: None }]),
            graph: None,
            map: None,
        }
    }

    fn publisher() -> (Publisher, Arc<InMemoryOutputStore>) {
        let cluster_store = Arc::new(InMemoryClusterStore::new());
        let output_store = Arc::new(InMemoryOutputStore::new());
        let processed_url_store = Arc::new(InMemoryProcessedUrlStore::new());
        (Publisher::new(cluster_store, output_store.clone(), processed_url_store), output_store)
    }

    #[tokio::test]
    async fn inserts_new_event_at_version_one() {
        let (publisher, _) = publisher();
        let mut c = cluster();
        let outcome = publisher.publish(&mut c, draft("Quake hits region")).await.unwrap();
        assert!(matches!(outcome, PublishOutcome::Inserted(_)));
        assert_eq!(outcome.event().version, 1);
        assert_eq!(c.state, news_common::ClusterState::Live);
    }

    #[tokio::test]
    async fn marks_member_urls_processed_after_publish() {
        let cluster_store = Arc::new(InMemoryClusterStore::new());
        let output_store = Arc::new(InMemoryOutputStore::new());
        let processed_url_store = Arc::new(InMemoryProcessedUrlStore::new());
        let publisher = Publisher::new(cluster_store, output_store, processed_url_store.clone());
        let mut c = cluster();
        publisher.publish(&mut c, draft("Quake hits region")).await.unwrap();
        assert!(!processed_url_store.check_and_insert("https://example.com/a").await.unwrap());
    }

    #[tokio::test]
    async fn updates_on_title_change_and_increments_version() {
        let (publisher, _) = publisher();
        let mut c = cluster();
        publisher.publish(&mut c, draft("Original title")).await.unwrap();
        let outcome = publisher.publish(&mut c, draft("Changed title")).await.unwrap();
        assert!(matches!(outcome, PublishOutcome::Updated(_)));
        assert_eq!(outcome.event().version, 2);
    }

    #[tokio::test]
    async fn whitespace_only_title_difference_does_not_trigger_update() {
        let (publisher, _) = publisher();
        let mut c = cluster();
        publisher.publish(&mut c, draft("Quake   hits region")).await.unwrap();
        let outcome = publisher.publish(&mut c, draft("Quake hits region")).await.unwrap();
        assert!(matches!(outcome, PublishOutcome::Unchanged(_)));
        assert_eq!(outcome.event().version, 1);
    }

    #[tokio::test]
    async fn new_source_count_triggers_update() {
        let (publisher, _) = publisher();
        let mut c = cluster();
        publisher.publish(&mut c, draft("Quake hits region")).await.unwrap();
        c.members.push(ClusterMember::new(ScoredEntry {
            entry: FeedEntry {
                source_name: "Second Wire".into(),
                url: "https://example.com/b".into(),
                guid: None,
                title: "Title".into(),
                summary: "summary".into(),
                body: String::new(),
                image_url: None,
                published_at: Utc::now(),
                fetched_at: Utc::now(),
                tier: CredibilityTier::Major,
            },
            importance: 800,
            category: Category::World,
            emoji: "🌍".into(),
            score_reasoning: String::new(),
        }));
        let outcome = publisher.publish(&mut c, draft("Quake hits region")).await.unwrap();
        assert_eq!(outcome.event().version, 2);
        assert_eq!(outcome.event().number_of_sources, 2);
    }

    #[tokio::test]
    async fn created_at_is_preserved_across_updates() {
        let (publisher, _) = publisher();
        let mut c = cluster();
        let first = publisher.publish(&mut c, draft("Original title")).await.unwrap();
        let second = publisher.publish(&mut c, draft("Changed title")).await.unwrap();
        assert_eq!(first.event().created_at, second.event().created_at);
    }
}
