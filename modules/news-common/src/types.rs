//! Closed structured records for every stage boundary in the pipeline
//! (spec.md §3). Stage boundaries are typed transformations over these
//! records, not free-form maps — the re-architecture spec.md §9 calls for
//! when leaving a dynamically-typed source language.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Feed descriptors (collector input)
// ---------------------------------------------------------------------------

/// Per-source static attribute used in image scoring and cluster tie-breaks
/// (Glossary: "Source credibility tier").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CredibilityTier {
    Premium,
    Major,
    Standard,
    Regional,
}

/// A configured feed to poll every cycle. RSS source lists as literal data
/// are explicitly out of scope (spec.md §1); this is the shape the core
/// expects an external list to be supplied in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedDescriptor {
    pub url: String,
    pub source_name: String,
    pub tier: CredibilityTier,
}

// ---------------------------------------------------------------------------
// FeedEntry — stage 0 output
// ---------------------------------------------------------------------------

/// What the collector emits. `url` is the primary key after canonicalisation
/// (spec.md §3: trim, lower-case host, strip tracking query params).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedEntry {
    pub source_name: String,
    pub url: String,
    pub guid: Option<String>,
    pub title: String,
    pub summary: String,
    pub body: String,
    pub image_url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
    pub tier: CredibilityTier,
}

// ---------------------------------------------------------------------------
// Category — closed enumeration (Glossary)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    World,
    Politics,
    Business,
    Markets,
    Technology,
    Science,
    Health,
    Climate,
    Sports,
    Entertainment,
    Other,
}

impl Category {
    pub fn all() -> &'static [Category] {
        &[
            Category::World,
            Category::Politics,
            Category::Business,
            Category::Markets,
            Category::Technology,
            Category::Science,
            Category::Health,
            Category::Climate,
            Category::Sports,
            Category::Entertainment,
            Category::Other,
        ]
    }

    /// Parse the closed set case-insensitively; unknown tags fall back to
    /// `Other` rather than failing the whole scoring response (the scorer
    /// may drift on exact casing/spelling — this keeps that tolerant).
    pub fn parse_lenient(raw: &str) -> Category {
        match raw.trim().to_lowercase().as_str() {
            "world" => Category::World,
            "politics" => Category::Politics,
            "business" => Category::Business,
            "markets" => Category::Markets,
            "technology" | "tech" => Category::Technology,
            "science" => Category::Science,
            "health" => Category::Health,
            "climate" => Category::Climate,
            "sports" => Category::Sports,
            "entertainment" => Category::Entertainment,
            _ => Category::Other,
        }
    }

    /// Whether this category is "geographic" for component-selector
    /// fallback purposes (spec.md §4.7).
    pub fn is_geographic(&self) -> bool {
        matches!(self, Category::World | Category::Climate)
    }

    /// Whether this category is "economic" for component-selector fallback.
    pub fn is_economic(&self) -> bool {
        matches!(self, Category::Business | Category::Markets)
    }
}

// ---------------------------------------------------------------------------
// ScoredEntry — stage 1 output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredEntry {
    pub entry: FeedEntry,
    /// 0-1000, assigned by the scorer.
    pub importance: u16,
    pub category: Category,
    /// Short grapheme, e.g. a single emoji.
    pub emoji: String,
    /// Free-text diagnostic, not shown to readers.
    pub score_reasoning: String,
}

impl ScoredEntry {
    pub fn url(&self) -> &str {
        &self.entry.url
    }

    pub fn title(&self) -> &str {
        &self.entry.title
    }
}

// ---------------------------------------------------------------------------
// EventCluster — durable grouping (stage 2+)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterState {
    /// Has members, nothing published yet.
    Pending,
    /// Published; may still accept new members for the remainder of the
    /// clustering window.
    Live,
    /// Window expired — no further changes accepted.
    Closed,
}

/// A cluster member: a scored entry plus whatever full-text body has been
/// fetched for it (stage 3) and the per-source score used to rank members
/// during synthesis (spec.md §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterMember {
    pub scored: ScoredEntry,
    /// Full article text once fetched by the body fetcher; `None` until
    /// fetched, `Some("")` after a permanent fetch failure (spec.md §4.4).
    pub fetched_body: Option<String>,
}

impl ClusterMember {
    pub fn new(scored: ScoredEntry) -> Self {
        Self {
            scored,
            fetched_body: None,
        }
    }

    /// The best text available to synthesize from: the fetched body if
    /// present and non-empty, else the feed summary (spec.md §4.4 fallback).
    pub fn synthesis_text(&self) -> &str {
        match &self.fetched_body {
            Some(body) if !body.is_empty() => body.as_str(),
            _ => self.scored.entry.summary.as_str(),
        }
    }

    pub fn needs_fetch(&self) -> bool {
        self.fetched_body.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventCluster {
    pub cluster_id: Uuid,
    pub canonical_title: String,
    pub keyword_set: HashSet<String>,
    pub entity_set: HashSet<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub members: Vec<ClusterMember>,
    pub state: ClusterState,
}

impl EventCluster {
    pub fn seed(member: ClusterMember, keyword_set: HashSet<String>, entity_set: HashSet<String>) -> Self {
        let published_at = member.scored.entry.published_at;
        let title = member.scored.title().to_string();
        Self {
            cluster_id: Uuid::new_v4(),
            canonical_title: title,
            keyword_set,
            entity_set,
            first_seen: published_at,
            last_seen: published_at,
            members: vec![member],
            state: ClusterState::Pending,
        }
    }

    pub fn number_of_sources(&self) -> usize {
        self.members.len()
    }

    /// Highest-scoring member, tie-broken by most recent published-at
    /// (spec.md §4.3, used to recompute canonical-title).
    pub fn top_member(&self) -> Option<&ClusterMember> {
        self.members.iter().max_by(|a, b| {
            a.scored
                .importance
                .cmp(&b.scored.importance)
                .then(a.scored.entry.published_at.cmp(&b.scored.entry.published_at))
        })
    }

    pub fn is_within_window(&self, published_at: DateTime<Utc>, window: chrono::Duration) -> bool {
        (published_at - self.first_seen).abs() <= window
            || (self.last_seen - published_at).abs() <= window
    }
}

// ---------------------------------------------------------------------------
// Component payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Timeline,
    Details,
    Graph,
    Map,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// May be approximate (month+year) if the exact day is unknown.
    pub date: String,
    pub event: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailEntry {
    pub label: String,
    pub value: String,
    pub subtitle: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Line,
    Bar,
    Area,
    Column,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPoint {
    pub label: String,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphComponent {
    pub chart_type: ChartType,
    pub data_points: Vec<DataPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoMarker {
    pub lat: f64,
    pub lon: f64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapComponent {
    pub center: GeoMarker,
    pub markers: Vec<GeoMarker>,
}

// ---------------------------------------------------------------------------
// PublishedEvent — the output (stage 8)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedEvent {
    pub event_id: Uuid,
    pub cluster_id: Uuid,
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
    pub number_of_sources: u32,
    pub components_order: Vec<ComponentKind>,
    pub timeline: Option<Vec<TimelineEntry>>,
    pub details: Option<Vec<DetailEntry>>,
    pub graph: Option<GraphComponent>,
    pub map: Option<MapComponent>,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl PublishedEvent {
    /// Invariant check: components-order length equals the count of
    /// non-null component fields, and every listed key has a present field
    /// (spec.md §8, testable property 3).
    pub fn components_consistent(&self) -> bool {
        let present_count = [
            self.timeline.is_some(),
            self.details.is_some(),
            self.graph.is_some(),
            self.map.is_some(),
        ]
        .iter()
        .filter(|p| **p)
        .count();
        if self.components_order.len() != present_count {
            return false;
        }
        self.components_order.iter().all(|k| match k {
            ComponentKind::Timeline => self.timeline.is_some(),
            ComponentKind::Details => self.details.is_some(),
            ComponentKind::Graph => self.graph.is_some(),
            ComponentKind::Map => self.map.is_some(),
        })
    }
}

// ---------------------------------------------------------------------------
// ProcessedUrlMark — idempotence boundary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedUrlMark {
    pub url: String,
    pub first_seen: DateTime<Utc>,
}
