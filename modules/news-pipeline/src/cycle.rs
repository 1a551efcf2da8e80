//! The `cycle` orchestration function (spec.md §2, §5): runs all eight
//! stages, in order, over one poll's worth of feed data. The function is
//! pure in the sense that all durable state lives in the injected stores —
//! calling it twice with the same store state and the same upstream
//! responses produces the same outcome.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use news_client::LlmProvider;
use news_cluster::{Assignment, Clusterer};
use news_common::{Category, ComponentKind, FeedDescriptor, GraphComponent, MapComponent};
use news_components::{ComponentGenerator, ComponentSelector};
use news_fetch::{BodyCache, BodyFetcher, ScrapingGateway};
use news_feeds::FeedCollector;
use news_http::HttpClient;
use news_score::Scorer;
use news_store::{ClusterStore, OutputStore, PublishDraft, PublishOutcome, Publisher};
use news_synth::{ImageProber, ImageSelector, Synthesizer};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::report::CycleReport;

/// Provider keys follow spec.md §6's three named LLM roles (scoring,
/// writing, research); the Component Selector is small and cheap enough to
/// reuse the research provider rather than add a fourth provider key to
/// Config (an Open Question resolution, recorded in the design ledger).
pub struct PipelineServices {
    pub http: Arc<HttpClient>,
    pub scorer_provider: Arc<dyn LlmProvider>,
    pub writer_provider: Arc<dyn LlmProvider>,
    pub writer_fallback: Option<Arc<dyn LlmProvider>>,
    pub research_provider: Arc<dyn LlmProvider>,
    pub image_prober: Arc<dyn ImageProber>,
    pub scraping_gateway: Arc<dyn ScrapingGateway>,
    pub body_cache: Arc<BodyCache>,
    pub processed_url_store: Arc<dyn news_store::ProcessedUrlStore>,
    pub cluster_store: Arc<dyn ClusterStore>,
    pub output_store: Arc<dyn OutputStore>,
}

#[derive(Debug, Clone)]
pub struct CycleConfig {
    pub retention_window: chrono::Duration,
    pub clustering_window: chrono::Duration,
    pub importance_threshold: u16,
    /// Floor under `has_usable_source`'s summary-length fallback
    /// (spec.md §4.4).
    pub min_summary_chars: usize,
    pub scorer_model: String,
    pub writer_model: String,
    pub selector_model: String,
    pub research_model: String,
    pub cycle_budget: Duration,
    pub llm_concurrency: usize,
}

pub async fn run_cycle(services: &PipelineServices, feeds: &[FeedDescriptor], config: &CycleConfig) -> CycleReport {
    let start = Instant::now();
    let mut report = CycleReport::default();

    let collector = FeedCollector::new(Arc::clone(&services.http), config.retention_window);
    let collected = collector.collect(feeds, |_| false).await;
    report.entries_collected = collected.len();

    let urls: Vec<String> = collected.iter().map(|e| e.url.clone()).collect();
    let already_processed = services.processed_url_store.bulk_check(&urls).await.unwrap_or_default();
    let fresh: Vec<_> = collected.into_iter().filter(|e| !already_processed.contains(&e.url)).collect();

    let scorer = Scorer::new(
        Arc::clone(&services.http),
        Arc::clone(&services.scorer_provider),
        config.scorer_model.clone(),
        config.importance_threshold,
    );
    let outcomes = scorer.score_batch(fresh).await;
    report.entries_scored = outcomes.len();

    let mut kept = Vec::new();
    for outcome in outcomes {
        let _ = services.processed_url_store.check_and_insert(outcome.url()).await;
        match outcome {
            news_score::ScoreOutcome::Kept(scored) => kept.push(scored),
            news_score::ScoreOutcome::Dropped { .. } => report.entries_dropped += 1,
        }
    }
    report.entries_kept = kept.len();

    let clusterer = Clusterer::new(config.clustering_window);
    let mut touched = std::collections::HashSet::new();

    for scored in kept {
        let candidates = match services.cluster_store.candidates(scored.entry.published_at, config.clustering_window).await {
            Ok(c) => c,
            Err(err) => {
                warn!(error = %err, "cycle: failed to load cluster candidates, seeding new cluster");
                Vec::new()
            }
        };

        match clusterer.assign(&scored, &candidates) {
            Assignment::JoinExisting { cluster_id, .. } => {
                if let Ok(Some(mut cluster)) = services.cluster_store.get(cluster_id).await {
                    clusterer.join(&mut cluster, news_common::ClusterMember::new(scored));
                    if services.cluster_store.save(&cluster).await.is_ok() {
                        touched.insert(cluster.cluster_id);
                        report.clusters_joined += 1;
                    }
                }
            }
            Assignment::NewCluster => {
                let cluster = clusterer.seed(news_common::ClusterMember::new(scored));
                if services.cluster_store.save(&cluster).await.is_ok() {
                    touched.insert(cluster.cluster_id);
                    report.clusters_new += 1;
                }
            }
        }
    }

    let image_selector = ImageSelector::new(Arc::clone(&services.image_prober));
    let body_fetcher = BodyFetcher::new(Arc::clone(&services.http), Arc::clone(&services.scraping_gateway), Arc::clone(&services.body_cache));
    let mut synthesizer = Synthesizer::new(Arc::clone(&services.http), Arc::clone(&services.writer_provider), config.writer_model.clone());
    if let Some(fallback) = &services.writer_fallback {
        synthesizer = synthesizer.with_fallback(Arc::clone(fallback));
    }
    let synthesizer = Arc::new(synthesizer);
    let component_selector = Arc::new(ComponentSelector::new(Arc::clone(&services.http), Arc::clone(&services.research_provider), config.selector_model.clone()));
    let component_generator = Arc::new(ComponentGenerator::new(Arc::clone(&services.http), Arc::clone(&services.research_provider), config.research_model.clone()));
    let publisher = Arc::new(Publisher::new(Arc::clone(&services.cluster_store), Arc::clone(&services.output_store), Arc::clone(&services.processed_url_store)));

    let cluster_ids: Vec<Uuid> = touched.into_iter().collect();
    let budget_deadline = start + config.cycle_budget;

    let outcomes = stream::iter(cluster_ids.into_iter().map(|cluster_id| {
        let cluster_store = Arc::clone(&services.cluster_store);
        let body_fetcher_ref = &body_fetcher;
        let image_selector_ref = &image_selector;
        let synthesizer = Arc::clone(&synthesizer);
        let component_selector = Arc::clone(&component_selector);
        let component_generator = Arc::clone(&component_generator);
        let publisher = Arc::clone(&publisher);
        let min_summary_chars = config.min_summary_chars;

        async move {
            if Instant::now() >= budget_deadline {
                return ClusterOutcome::BudgetExceeded;
            }

            let Ok(Some(mut cluster)) = cluster_store.get(cluster_id).await else {
                return ClusterOutcome::Missing;
            };

            body_fetcher_ref.fetch_cluster(&mut cluster).await;

            if !news_fetch::has_usable_source(&cluster, min_summary_chars) {
                return ClusterOutcome::SkippedNoSource;
            }

            let Some(image) = image_selector_ref.select(&cluster).await else {
                return ClusterOutcome::SkippedNoImage;
            };

            let category = dominant_category(&cluster);

            let article = match synthesizer.synthesize(&cluster, category).await {
                Ok(article) => article,
                Err(err) => {
                    debug!(cluster_id = %cluster_id, error = %err, "cycle: synthesis failed, deferring cluster");
                    return ClusterOutcome::Deferred;
                }
            };

            let selection = component_selector.select(&article.title_advanced, category).await;
            let generated = component_generator.generate_all(&selection.components, &article.body_advanced, selection.hint.as_deref()).await;

            let (components_order, timeline, details, graph, map) = split_components(generated);

            let draft = PublishDraft {
                title_advanced: article.title_advanced,
                title_simple: article.title_simple,
                bullets_advanced: article.bullets_advanced,
                bullets_simple: article.bullets_simple,
                body_advanced: article.body_advanced,
                body_simple: article.body_simple,
                category,
                emoji: cluster.top_member().map(|m| m.scored.emoji.clone()).unwrap_or_default(),
                image_url: image.url,
                image_source_name: image.source_name,
                components_order,
                timeline,
                details,
                graph,
                map,
            };

            match publisher.publish(&mut cluster, draft).await {
                Ok(PublishOutcome::Inserted(_)) => ClusterOutcome::Published,
                Ok(PublishOutcome::Updated(_)) => ClusterOutcome::Updated,
                Ok(PublishOutcome::Unchanged(_)) => ClusterOutcome::Unchanged,
                Err(err) => {
                    warn!(cluster_id = %cluster_id, error = %err, "cycle: publish failed, cluster stays pending");
                    ClusterOutcome::Deferred
                }
            }
        }
    }))
    .buffer_unordered(config.llm_concurrency)
    .collect::<Vec<_>>()
    .await;

    for outcome in outcomes {
        match outcome {
            ClusterOutcome::Published => report.clusters_published += 1,
            ClusterOutcome::Updated => report.clusters_updated += 1,
            ClusterOutcome::Unchanged => report.clusters_unchanged += 1,
            ClusterOutcome::SkippedNoImage => report.clusters_skipped_no_image += 1,
            ClusterOutcome::SkippedNoSource => report.clusters_skipped_no_source += 1,
            ClusterOutcome::Deferred => report.clusters_deferred += 1,
            ClusterOutcome::BudgetExceeded => report.budget_exceeded = true,
            ClusterOutcome::Missing => {}
        }
    }

    report.duration = start.elapsed();
    report
}

enum ClusterOutcome {
    Published,
    Updated,
    Unchanged,
    SkippedNoImage,
    SkippedNoSource,
    Deferred,
    BudgetExceeded,
    Missing,
}

/// The cluster's category is the top member's category — the canonical
/// title is also drawn from the top member (spec.md §4.3), so this keeps
/// title and category in agreement.
fn dominant_category(cluster: &news_common::EventCluster) -> Category {
    cluster.top_member().map(|m| m.scored.category).unwrap_or(Category::Other)
}

type SplitComponents = (Vec<ComponentKind>, Option<Vec<news_common::TimelineEntry>>, Option<Vec<news_common::DetailEntry>>, Option<GraphComponent>, Option<MapComponent>);

fn split_components(generated: Vec<(ComponentKind, news_components::GeneratedComponent)>) -> SplitComponents {
    let mut order = Vec::new();
    let mut timeline = None;
    let mut details = None;
    let mut graph = None;
    let mut map = None;

    for (kind, component) in generated {
        order.push(kind);
        match component {
            news_components::GeneratedComponent::Timeline(entries) => timeline = Some(entries),
            news_components::GeneratedComponent::Details(entries) => details = Some(entries),
            news_components::GeneratedComponent::Graph(g) => graph = Some(g),
            news_components::GeneratedComponent::Map(m) => map = Some(m),
        }
    }

    (order, timeline, details, graph, map)
}
