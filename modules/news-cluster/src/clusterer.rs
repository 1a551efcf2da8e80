//! Stage 2 (spec.md §4.3): assigns a [`ScoredEntry`] to an existing
//! [`EventCluster`] or seeds a new one. This is the hardest single
//! subsystem in the pipeline; diagnostics are non-optional here — every
//! comparison, matched or rejected, is logged so the clusterer's accuracy
//! can be verified by inspecting the traces (spec.md §4.3).

use std::collections::HashSet;

use chrono::Duration;
use news_common::{ClusterMember, ClusterState, EventCluster, ScoredEntry};
use tracing::debug;
use uuid::Uuid;

use crate::matcher::{decide, MatchRule};
use crate::similarity::{set_overlap, title_similarity};
use crate::tokenize::{entity_set, keyword_set, title_tokens};

/// The outcome of assigning one scored entry against the current set of
/// open clusters.
#[derive(Debug, Clone)]
pub enum Assignment {
    JoinExisting {
        cluster_id: Uuid,
        rule: MatchRule,
        title_similarity: f64,
    },
    NewCluster,
}

struct Candidate {
    rule: MatchRule,
    title_similarity: f64,
    last_seen: chrono::DateTime<chrono::Utc>,
}

pub struct Clusterer {
    clustering_window: Duration,
}

impl Clusterer {
    pub fn new(clustering_window: Duration) -> Self {
        Self { clustering_window }
    }

    /// Decide where `entry` belongs among `candidates`. Only clusters that
    /// are not closed and whose last-seen is within the clustering window
    /// of the entry's published-at are considered (spec.md §4.3).
    pub fn assign(&self, entry: &ScoredEntry, candidates: &[EventCluster]) -> Assignment {
        let tokens = title_tokens(entry.title());
        let kw = keyword_set(&tokens);
        let ent = entity_set(entry.title());

        let mut best: Option<(Uuid, Candidate)> = None;

        for candidate in candidates {
            if candidate.state == ClusterState::Closed {
                continue;
            }
            if !candidate.is_within_window(entry.entry.published_at, self.clustering_window) {
                debug!(
                    cluster_id = %candidate.cluster_id,
                    "clusterer: candidate outside clustering window, skipped"
                );
                continue;
            }

            let sim = title_similarity(entry.title(), &candidate.canonical_title);
            let kw_overlap = set_overlap(&kw, &candidate.keyword_set);
            let ent_overlap = set_overlap(&ent, &candidate.entity_set);

            match decide(sim, kw_overlap, ent_overlap) {
                Some(rule) => {
                    debug!(
                        cluster_id = %candidate.cluster_id,
                        ?rule,
                        title_similarity = sim,
                        keyword_overlap = kw_overlap,
                        entity_overlap = ent_overlap,
                        "clusterer: candidate matched"
                    );
                    let replace = match &best {
                        None => true,
                        Some((_, current)) => {
                            sim > current.title_similarity
                                || (sim == current.title_similarity && candidate.last_seen > current.last_seen)
                        }
                    };
                    if replace {
                        best = Some((
                            candidate.cluster_id,
                            Candidate {
                                rule,
                                title_similarity: sim,
                                last_seen: candidate.last_seen,
                            },
                        ));
                    }
                }
                None => {
                    let why = if sim < crate::matcher::REJECT_FLOOR {
                        "title-similarity below reject floor"
                    } else {
                        "title-similarity above floor but keyword/entity overlap insufficient"
                    };
                    debug!(
                        cluster_id = %candidate.cluster_id,
                        title_similarity = sim,
                        keyword_overlap = kw_overlap,
                        entity_overlap = ent_overlap,
                        why,
                        "clusterer: candidate rejected"
                    );
                }
            }
        }

        match best {
            Some((cluster_id, c)) => Assignment::JoinExisting {
                cluster_id,
                rule: c.rule,
                title_similarity: c.title_similarity,
            },
            None => Assignment::NewCluster,
        }
    }

    /// Seeds a brand-new cluster from `member`, computing its initial
    /// keyword-set and entity-set from the member's title.
    pub fn seed(&self, member: ClusterMember) -> EventCluster {
        let tokens = title_tokens(member.scored.title());
        let kw = keyword_set(&tokens);
        let ent = entity_set(member.scored.title());
        EventCluster::seed(member, kw, ent)
    }

    /// Appends `member` to `cluster`, recomputing canonical-title (the
    /// title of the highest-scored member, tie-broken by most recent
    /// published-at), keyword-set and entity-set (union of all members),
    /// and last-seen (the later of the cluster's and the member's
    /// published-at) — spec.md §4.3 "When adding to an existing cluster".
    pub fn join(&self, cluster: &mut EventCluster, member: ClusterMember) {
        let published_at = member.scored.entry.published_at;
        let tokens = title_tokens(member.scored.title());
        let kw: HashSet<String> = keyword_set(&tokens);
        let ent = entity_set(member.scored.title());

        cluster.members.push(member);
        cluster.keyword_set.extend(kw);
        cluster.entity_set.extend(ent);
        if let Some(top) = cluster.top_member() {
            cluster.canonical_title = top.scored.title().to_string();
        }
        cluster.last_seen = cluster.last_seen.max(published_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use news_common::{Category, CredibilityTier, FeedEntry};

    fn scored(title: &str, importance: u16, published_at: chrono::DateTime<chrono::Utc>) -> ScoredEntry {
        ScoredEntry {
            entry: FeedEntry {
                source_name: "Wire".into(),
                url: format!("https://example.com/{title}"),
                guid: None,
                title: title.to_string(),
                summary: String::new(),
                body: String::new(),
                image_url: Some("https://example.com/x.jpg".into()),
                published_at,
                fetched_at: Utc::now(),
                tier: CredibilityTier::Major,
            },
            importance,
            category: Category::World,
            emoji: "🌍".into(),
            score_reasoning: String::new(),
        }
    }

    fn clusterer() -> Clusterer {
        Clusterer::new(Duration::hours(24))
    }

    #[test]
    fn creates_new_cluster_when_no_candidates_match() {
        let c = clusterer();
        let entry = scored("Tesla quarterly earnings beat expectations", 800, Utc::now());
        let existing = c.seed(ClusterMember::new(scored(
            "Apple announces iPhone 16 at $999",
            800,
            Utc::now(),
        )));
        let decision = c.assign(&entry, &[existing]);
        assert!(matches!(decision, Assignment::NewCluster));
    }

    #[test]
    fn joins_strong_match_cluster() {
        let c = clusterer();
        let seed_entry = scored("7.8-magnitude earthquake strikes near Gaziantep", 900, Utc::now());
        let existing = c.seed(ClusterMember::new(seed_entry));
        let entry = scored("Earthquake of magnitude 7.8 strikes near Gaziantep", 850, Utc::now());
        let decision = c.assign(&entry, &[existing]);
        match decision {
            Assignment::JoinExisting { rule, .. } => assert_eq!(rule, MatchRule::Strong),
            other => panic!("expected JoinExisting, got {other:?}"),
        }
    }

    #[test]
    fn three_near_simultaneous_earthquake_reports_form_one_cluster() {
        let c = clusterer();
        let now = Utc::now();
        let mut cluster = c.seed(ClusterMember::new(scored(
            "7.8-magnitude earthquake strikes near Gaziantep",
            900,
            now,
        )));

        for (title, minutes) in [
            ("Powerful 7.8 earthquake hits near Gaziantep region", 4),
            ("Earthquake near Gaziantep leaves dozens dead", 9),
        ] {
            let e = scored(title, 850, now + chrono::Duration::minutes(minutes));
            match c.assign(&e, &[cluster.clone()]) {
                Assignment::JoinExisting { cluster_id, .. } => {
                    assert_eq!(cluster_id, cluster.cluster_id);
                    c.join(&mut cluster, ClusterMember::new(e));
                }
                Assignment::NewCluster => panic!("expected all three earthquake reports to join one cluster"),
            }
        }

        assert_eq!(cluster.number_of_sources(), 3);
    }

    #[test]
    fn unrelated_stories_never_merge() {
        let c = clusterer();
        let apple = c.seed(ClusterMember::new(scored("Apple announces iPhone 16 at $999", 800, Utc::now())));
        let tesla = scored("Tesla quarterly earnings beat expectations", 800, Utc::now());
        let decision = c.assign(&tesla, &[apple]);
        assert!(matches!(decision, Assignment::NewCluster));
    }

    #[test]
    fn candidate_outside_clustering_window_is_skipped() {
        let c = clusterer();
        let now = Utc::now();
        let old = c.seed(ClusterMember::new(scored(
            "7.8-magnitude earthquake strikes near Gaziantep",
            900,
            now - Duration::hours(30),
        )));
        let entry = scored("7.8-magnitude earthquake strikes near Gaziantep", 900, now);
        let decision = c.assign(&entry, &[old]);
        assert!(matches!(decision, Assignment::NewCluster));
    }

    #[test]
    fn picks_highest_similarity_when_multiple_candidates_match() {
        let c = clusterer();
        let now = Utc::now();
        let weaker = c.seed(ClusterMember::new(scored(
            "Earthquake strikes southern Turkey region",
            850,
            now,
        )));
        let stronger = c.seed(ClusterMember::new(scored(
            "7.8-magnitude earthquake strikes near Gaziantep",
            900,
            now,
        )));
        let entry = scored("7.8-magnitude earthquake strikes near Gaziantep", 880, now);
        match c.assign(&entry, &[weaker.clone(), stronger.clone()]) {
            Assignment::JoinExisting { cluster_id, .. } => assert_eq!(cluster_id, stronger.cluster_id),
            other => panic!("expected JoinExisting, got {other:?}"),
        }
    }

    #[test]
    fn join_recomputes_canonical_title_from_top_member() {
        let c = clusterer();
        let now = Utc::now();
        let mut cluster = c.seed(ClusterMember::new(scored("Earthquake strikes Gaziantep", 700, now)));
        let better = scored("7.8-magnitude earthquake devastates Gaziantep", 950, now + Duration::minutes(5));
        c.join(&mut cluster, ClusterMember::new(better));
        assert_eq!(cluster.canonical_title, "7.8-magnitude earthquake devastates Gaziantep");
    }

    #[test]
    fn closed_clusters_never_accept_new_members() {
        let c = clusterer();
        let mut cluster = c.seed(ClusterMember::new(scored(
            "7.8-magnitude earthquake strikes near Gaziantep",
            900,
            Utc::now(),
        )));
        cluster.state = ClusterState::Closed;
        let entry = scored("7.8-magnitude earthquake strikes near Gaziantep", 900, Utc::now());
        let decision = c.assign(&entry, &[cluster]);
        assert!(matches!(decision, Assignment::NewCluster));
    }
}
