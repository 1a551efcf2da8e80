//! Stage 7 (spec.md §4.8): populates each component chosen in stage 6.
//! Every component is validated independently; an invalid component is
//! omitted rather than failing the whole cluster (spec.md §4.8: "the
//! pipeline never publishes a component with malformed data").

use std::sync::Arc;

use news_client::{salvage_json, ChatMessage, ChatRequest, LlmProvider};
use news_common::{ChartType, ComponentKind, DataPoint, DetailEntry, GeoMarker, GraphComponent, MapComponent, PipelineError, TimelineEntry};
use news_http::HttpClient;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Clone)]
pub enum GeneratedComponent {
    Timeline(Vec<TimelineEntry>),
    Details(Vec<DetailEntry>),
    Graph(GraphComponent),
    Map(MapComponent),
}

pub struct ComponentGenerator {
    http: Arc<HttpClient>,
    provider: Arc<dyn LlmProvider>,
    model: String,
}

impl ComponentGenerator {
    pub fn new(http: Arc<HttpClient>, provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            http,
            provider,
            model: model.into(),
        }
    }

    /// Generates every selected component, in order, trimming the order
    /// list to whatever actually validates (spec.md §4.8).
    pub async fn generate_all(
        &self,
        selection: &[ComponentKind],
        body_advanced: &str,
        hint: Option<&str>,
    ) -> Vec<(ComponentKind, GeneratedComponent)> {
        let mut out = Vec::new();
        for kind in selection {
            if let Some(generated) = self.generate_one(*kind, body_advanced, hint).await {
                out.push((*kind, generated));
            } else {
                debug!(?kind, "component generator: dropped invalid component");
            }
        }
        out
    }

    async fn generate_one(&self, kind: ComponentKind, body_advanced: &str, hint: Option<&str>) -> Option<GeneratedComponent> {
        let request = build_request(kind, body_advanced, hint, &self.model);
        let endpoint = self.provider.endpoint_name().to_string();
        let provider = Arc::clone(&self.provider);

        let result = self
            .http
            .call_with_retry(&endpoint, move || {
                let provider = Arc::clone(&provider);
                let request = request.clone();
                async move { provider.complete(request).await.map(|c| c.content) }
            })
            .await;

        let content = result.ok()?;
        parse_and_validate(kind, &content)
    }
}

fn build_request(kind: ComponentKind, body_advanced: &str, hint: Option<&str>, model: &str) -> ChatRequest {
    let (system, instruction) = match kind {
        ComponentKind::Timeline => (
            "You extract a chronological timeline from a news article for a research \
component. Reply with a single JSON object: {\"entries\": [{\"date\": <string, may be \
approximate like \"March 2024\" if the exact day is unknown>, \"event\": <string, at \
most 14 words>}]}. Return 2-4 entries, in chronological order.",
            "Extract the timeline.",
        ),
        ComponentKind::Details => (
            "You extract key facts from a news article for a research component. Reply \
with a single JSON object: {\"entries\": [{\"label\": <string>, \"value\": <string>, \
\"subtitle\": <string or null>}]}. Return exactly 3 entries; at least one value must be \
numeric.",
            "Extract the key details.",
        ),
        ComponentKind::Graph => (
            "You extract a data series from a news article for a chart component. Reply \
with a single JSON object: {\"chart_type\": <one of line, bar, area, column>, \
\"data_points\": [{\"label\": <string>, \"value\": <number>}]}. Return at least 4 data \
points.",
            "Extract the data series.",
        ),
        ComponentKind::Map => (
            "You extract geographic points from a news article for a map component. \
Reply with a single JSON object: {\"center\": {\"lat\": <number>, \"lon\": <number>, \
\"name\": <string>}, \"markers\": [{\"lat\": <number>, \"lon\": <number>, \"name\": \
<string>}]}. Return 1-5 markers.",
            "Extract the geographic points.",
        ),
    };

    let mut user = format!("{instruction}\n\nArticle:\n{body_advanced}");
    if let Some(hint) = hint {
        user.push_str(&format!("\n\nResearch hint: {hint}"));
    }

    ChatRequest {
        model: model.to_string(),
        messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
        temperature: 0.3,
        max_tokens: Some(600),
    }
}

#[derive(Debug, Deserialize)]
struct RawTimeline {
    entries: Vec<TimelineEntry>,
}

#[derive(Debug, Deserialize)]
struct RawDetails {
    entries: Vec<DetailEntry>,
}

#[derive(Debug, Deserialize)]
struct RawGraph {
    chart_type: String,
    data_points: Vec<DataPoint>,
}

#[derive(Debug, Deserialize)]
struct RawMap {
    center: GeoMarker,
    markers: Vec<GeoMarker>,
}

fn parse_and_validate(kind: ComponentKind, content: &str) -> Option<GeneratedComponent> {
    match kind {
        ComponentKind::Timeline => {
            let raw: RawTimeline = salvage_json(content).ok()?;
            if !(2..=4).contains(&raw.entries.len()) {
                return None;
            }
            if raw.entries.iter().any(|e| e.date.trim().is_empty() || e.event.trim().is_empty() || e.event.split_whitespace().count() > 14) {
                return None;
            }
            Some(GeneratedComponent::Timeline(raw.entries))
        }
        ComponentKind::Details => {
            let raw: RawDetails = salvage_json(content).ok()?;
            if raw.entries.len() != 3 {
                return None;
            }
            if raw.entries.iter().any(|e| e.label.trim().is_empty() || e.value.trim().is_empty()) {
                return None;
            }
            if !raw.entries.iter().any(|e| e.value.chars().any(|c| c.is_ascii_digit())) {
                return None;
            }
            Some(GeneratedComponent::Details(raw.entries))
        }
        ComponentKind::Graph => {
            let raw: RawGraph = salvage_json(content).ok()?;
            let chart_type = parse_chart_type(&raw.chart_type)?;
            if raw.data_points.len() < 4 {
                return None;
            }
            Some(GeneratedComponent::Graph(GraphComponent {
                chart_type,
                data_points: raw.data_points,
            }))
        }
        ComponentKind::Map => {
            let raw: RawMap = salvage_json(content).ok()?;
            if !(1..=5).contains(&raw.markers.len()) {
                return None;
            }
            if !is_valid_coordinate(&raw.center) || raw.markers.iter().any(|m| !is_valid_coordinate(m)) {
                return None;
            }
            Some(GeneratedComponent::Map(MapComponent {
                center: raw.center,
                markers: raw.markers,
            }))
        }
    }
}

fn parse_chart_type(raw: &str) -> Option<ChartType> {
    match raw.trim().to_lowercase().as_str() {
        "line" => Some(ChartType::Line),
        "bar" => Some(ChartType::Bar),
        "area" => Some(ChartType::Area),
        "column" => Some(ChartType::Column),
        _ => None,
    }
}

fn is_valid_coordinate(marker: &GeoMarker) -> bool {
    (-90.0..=90.0).contains(&marker.lat) && (-180.0..=180.0).contains(&marker.lon) && !marker.name.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_well_formed_timeline() {
        let content = r#"{"entries": [{"date": "March 2024", "event": "Protests began"}, {"date": "April 2024", "event": "Government resigned"}]}"#;
        assert!(matches!(parse_and_validate(ComponentKind::Timeline, content), Some(GeneratedComponent::Timeline(_))));
    }

    #[test]
    fn rejects_timeline_with_too_few_entries() {
        let content = r#"{"entries": [{"date": "March 2024", "event": "Protests began"}]}"#;
        assert!(parse_and_validate(ComponentKind::Timeline, content).is_none());
    }

    #[test]
    fn validates_details_with_numeric_value() {
        let content = r#"{"entries": [{"label": "Casualties", "value": "12", "subtitle": null}, {"label": "Injured", "value": "40", "subtitle": null}, {"label": "Location", "value": "Gaziantep", "subtitle": null}]}"#;
        assert!(matches!(parse_and_validate(ComponentKind::Details, content), Some(GeneratedComponent::Details(_))));
    }

    #[test]
    fn rejects_details_with_no_numeric_value() {
        let content = r#"{"entries": [{"label": "a", "value": "x", "subtitle": null}, {"label": "b", "value": "y", "subtitle": null}, {"label": "c", "value": "z", "subtitle": null}]}"#;
        assert!(parse_and_validate(ComponentKind::Details, content).is_none());
    }

    #[test]
    fn validates_graph_with_enough_points() {
        let content = r#"{"chart_type": "line", "data_points": [{"label": "a", "value": 1.0}, {"label": "b", "value": 2.0}, {"label": "c", "value": 3.0}, {"label": "d", "value": 4.0}]}"#;
        assert!(matches!(parse_and_validate(ComponentKind::Graph, content), Some(GeneratedComponent::Graph(_))));
    }

    #[test]
    fn rejects_graph_with_unknown_chart_type() {
        let content = r#"{"chart_type": "pie", "data_points": [{"label": "a", "value": 1.0}, {"label": "b", "value": 2.0}, {"label": "c", "value": 3.0}, {"label": "d", "value": 4.0}]}"#;
        assert!(parse_and_validate(ComponentKind::Graph, content).is_none());
    }

    #[test]
    fn validates_map_with_valid_coordinates() {
        let content = r#"{"center": {"lat": 37.0, "lon": 37.3, "name": "Gaziantep"}, "markers": [{"lat": 37.0, "lon": 37.3, "name": "Gaziantep"}]}"#;
        assert!(matches!(parse_and_validate(ComponentKind::Map, content), Some(GeneratedComponent::Map(_))));
    }

    #[test]
    fn rejects_map_with_out_of_range_coordinates() {
        let content = r#"{"center": {"lat": 200.0, "lon": 37.3, "name": "Nowhere"}, "markers": [{"lat": 37.0, "lon": 37.3, "name": "Gaziantep"}]}"#;
        assert!(parse_and_validate(ComponentKind::Map, content).is_none());
    }

    #[test]
    fn rejects_map_with_too_many_markers() {
        let markers: Vec<String> = (0..6).map(|i| format!(r#"{{"lat": {i}.0, "lon": 1.0, "name": "m{i}"}}"#)).collect();
        let content = format!(r#"{{"center": {{"lat": 1.0, "lon": 1.0, "name": "c"}}, "markers": [{}]}}"#, markers.join(","));
        assert!(parse_and_validate(ComponentKind::Map, &content).is_none());
    }
}
