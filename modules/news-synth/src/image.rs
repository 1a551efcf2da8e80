//! Stage 4 (spec.md §4.5): scores every candidate image across a cluster's
//! sources and picks the best. Filter rules disqualify outright; the
//! remaining candidates are scored and the highest wins.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use news_common::{CredibilityTier, EventCluster};
use tracing::debug;

use crate::probe::{detect_format, parse_dimensions, ImageFormat};

const MIN_WIDTH_DISQUALIFY: u32 = 400;
const WIDTH_BONUS_1200: i32 = 30;
const WIDTH_BONUS_800: i32 = 15;

/// Known ad-network / tracker-pixel hosts; any image served from one of
/// these is disqualified outright regardless of score (spec.md §4.5).
const HOST_BLACKLIST: &[&str] = &[
    "doubleclick.net",
    "googlesyndication.com",
    "scorecardresearch.com",
    "adsafeprotected.com",
    "pixel.wp.com",
];

#[derive(Debug, Clone)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

/// Network probe for image metadata, injected so the scoring logic stays
/// unit-testable without the network (spec.md §8 testable property 2).
#[async_trait]
pub trait ImageProber: Send + Sync {
    async fn probe(&self, url: &str) -> Option<ImageMetadata>;
}

/// HEAD-then-tiny-range-GET prober (spec.md §4.5: "probe image metadata
/// (HEAD or tiny range-GET)").
pub struct HttpImageProber {
    http: reqwest::Client,
}

impl HttpImageProber {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(5))
                .build()
                .expect("failed to build image-probe HTTP client"),
        }
    }
}

impl Default for HttpImageProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageProber for HttpImageProber {
    async fn probe(&self, url: &str) -> Option<ImageMetadata> {
        let response = self
            .http
            .get(url)
            .header("Range", "bytes=0-8191")
            .send()
            .await
            .ok()?;
        if !response.status().is_success() && response.status() != reqwest::StatusCode::PARTIAL_CONTENT {
            return None;
        }
        let bytes = response.bytes().await.ok()?;
        let format = detect_format(&bytes);
        let (width, height) = parse_dimensions(&bytes)?;
        Some(ImageMetadata { width, height, format })
    }
}

/// Pure scoring function over already-probed metadata (spec.md §4.5). A
/// `None` result means the candidate is disqualified.
pub fn score_candidate(tier: CredibilityTier, importance: u16, host: &str, meta: &ImageMetadata) -> Option<i32> {
    if HOST_BLACKLIST.iter().any(|h| host.ends_with(h)) {
        return None;
    }
    if meta.format.is_disqualifying() {
        return None;
    }
    if meta.width < MIN_WIDTH_DISQUALIFY {
        return None;
    }

    let aspect = meta.width as f64 / meta.height.max(1) as f64;
    let sixteen_nine = 16.0 / 9.0;
    let is_extreme = !(0.3..=3.5).contains(&aspect);
    if is_extreme {
        return None;
    }

    let mut score = 0i32;
    score += match tier {
        CredibilityTier::Premium => 30,
        CredibilityTier::Major => 15,
        CredibilityTier::Standard => 5,
        CredibilityTier::Regional => 0,
    };

    if meta.width >= 1200 {
        score += WIDTH_BONUS_1200;
    } else if meta.width >= 800 {
        score += WIDTH_BONUS_800;
    }

    if (aspect - sixteen_nine).abs() / sixteen_nine <= 0.10 {
        score += 20;
    } else if (4.0 / 3.0..=21.0 / 9.0).contains(&aspect) {
        score += 10;
    }

    if importance >= 900 {
        score += 20;
    } else if importance >= 800 {
        score += 10;
    }

    score += meta.format.score_bonus();

    Some(score)
}

#[derive(Debug, Clone)]
pub struct SelectedImage {
    pub url: String,
    pub source_name: String,
    pub score: i32,
}

pub struct ImageSelector {
    prober: Arc<dyn ImageProber>,
    concurrency: usize,
}

impl ImageSelector {
    pub fn new(prober: Arc<dyn ImageProber>) -> Self {
        Self { prober, concurrency: 8 }
    }

    pub fn with_concurrency(prober: Arc<dyn ImageProber>, concurrency: usize) -> Self {
        Self { prober, concurrency }
    }

    /// Picks the best image across every member of `cluster`. Returns
    /// `None` if no candidate survives the filter rules — the cluster is
    /// not published this cycle (spec.md §4.5).
    pub async fn select(&self, cluster: &EventCluster) -> Option<SelectedImage> {
        let candidates: Vec<_> = cluster
            .members
            .iter()
            .filter_map(|m| {
                let url = m.scored.entry.image_url.clone()?;
                Some((url, m.scored.entry.source_name.clone(), m.scored.entry.tier, m.scored.importance))
            })
            .collect();

        let scored = stream::iter(candidates.into_iter().map(|(url, source_name, tier, importance)| {
            let prober = Arc::clone(&self.prober);
            async move {
                let host = url::Url::parse(&url).ok().and_then(|u| u.host_str().map(str::to_string));
                let Some(host) = host else {
                    return None;
                };
                let meta = prober.probe(&url).await?;
                let score = score_candidate(tier, importance, &host, &meta)?;
                debug!(url, score, "image selector: candidate scored");
                Some(SelectedImage { url, source_name, score })
            }
        }))
        .buffer_unordered(self.concurrency)
        .filter_map(|x| async move { x })
        .collect::<Vec<_>>()
        .await;

        scored.into_iter().max_by_key(|s| s.score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(width: u32, height: u32, format: ImageFormat) -> ImageMetadata {
        ImageMetadata { width, height, format }
    }

    #[test]
    fn disqualifies_too_small_images() {
        assert_eq!(
            score_candidate(CredibilityTier::Premium, 900, "example.com", &meta(300, 300, ImageFormat::Jpeg)),
            None
        );
    }

    #[test]
    fn disqualifies_extreme_aspect_ratio() {
        assert_eq!(
            score_candidate(CredibilityTier::Premium, 900, "example.com", &meta(2000, 100, ImageFormat::Jpeg)),
            None
        );
    }

    #[test]
    fn disqualifies_gif() {
        assert_eq!(
            score_candidate(CredibilityTier::Premium, 900, "example.com", &meta(1600, 900, ImageFormat::Gif)),
            None
        );
    }

    #[test]
    fn disqualifies_blacklisted_host() {
        assert_eq!(
            score_candidate(
                CredibilityTier::Premium,
                900,
                "ads.doubleclick.net",
                &meta(1600, 900, ImageFormat::Jpeg)
            ),
            None
        );
    }

    #[test]
    fn scores_premium_16_9_large_high_importance_jpeg_at_maximum() {
        let score = score_candidate(CredibilityTier::Premium, 950, "example.com", &meta(1920, 1080, ImageFormat::Jpeg)).unwrap();
        // 30 (premium) + 30 (>=1200px) + 20 (16:9) + 20 (importance>=900) + 5 (jpeg) = 105
        assert_eq!(score, 105);
    }

    #[test]
    fn regional_small_but_acceptable_image_scores_low_but_passes() {
        let score = score_candidate(CredibilityTier::Regional, 700, "example.com", &meta(850, 650, ImageFormat::Jpeg));
        assert!(score.is_some());
        assert!(score.unwrap() < 50);
    }
}
