//! Fixtures for the end-to-end cycle test: trait implementations over
//! canned scripts instead of a mocking crate. The one collaborator with no
//! trait seam (the feed collector builds its own `reqwest::Client`) is
//! exercised against a minimal local HTTP server instead.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use news_client::{ChatCompletion, ChatRequest, FinishReason, LlmProvider};
use news_common::PipelineError;
use news_fetch::ScrapingGateway;
use news_synth::{ImageMetadata, ImageProber};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Replies one script entry per call, in order; errors once the script is
/// exhausted. Mirrors the `ScriptedProvider` used throughout the scorer,
/// synthesizer and selector unit tests.
pub struct ScriptedProvider {
    name: String,
    replies: Mutex<Vec<Result<String, PipelineError>>>,
}

impl ScriptedProvider {
    pub fn new(name: impl Into<String>, replies: Vec<Result<String, PipelineError>>) -> Self {
        Self {
            name: name.into(),
            replies: Mutex::new(replies),
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn endpoint_name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, _request: ChatRequest) -> Result<ChatCompletion, PipelineError> {
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            return Err(PipelineError::TransientUpstream("exhausted script".into()));
        }
        match replies.remove(0) {
            Ok(content) => Ok(ChatCompletion {
                content,
                finish_reason: FinishReason::Stop,
            }),
            Err(e) => Err(e),
        }
    }
}

/// The research role is shared between the component selector and the
/// component generator (`PipelineServices::research_provider`); this
/// fixture picks its canned reply by matching a distinctive substring of
/// the incoming system prompt rather than scripting a fixed call order.
pub struct RoutedProvider {
    name: String,
    routes: Vec<(&'static str, String)>,
}

impl RoutedProvider {
    pub fn new(name: impl Into<String>, routes: Vec<(&'static str, String)>) -> Self {
        Self { name: name.into(), routes }
    }
}

#[async_trait]
impl LlmProvider for RoutedProvider {
    fn endpoint_name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion, PipelineError> {
        let system = request
            .messages
            .iter()
            .find(|m| matches!(m.role, news_client::Role::System))
            .map(|m| m.content.as_str())
            .unwrap_or("");

        for (marker, reply) in &self.routes {
            if system.contains(marker) {
                return Ok(ChatCompletion {
                    content: reply.clone(),
                    finish_reason: FinishReason::Stop,
                });
            }
        }
        Err(PipelineError::TransientUpstream(format!("no route for system prompt: {system}")))
    }
}

/// Always returns clean article text, skipping the network entirely.
pub struct FixtureScrapingGateway;

#[async_trait]
impl ScrapingGateway for FixtureScrapingGateway {
    fn endpoint_name(&self) -> &str {
        "fixture-gateway"
    }

    async fn fetch_text(&self, _url: &str) -> Result<String, PipelineError> {
        Ok("A magnitude 7.8 earthquake struck near Gaziantep early this morning, \
            collapsing dozens of buildings and triggering a multi-country emergency \
            response. Rescue teams from several nations are converging on the region \
            as aftershocks continue."
            .repeat(4))
    }
}

/// Always reports a large, well-formed JPEG so every candidate image
/// survives `score_candidate`'s filter rules.
pub struct FixtureImageProber;

#[async_trait]
impl ImageProber for FixtureImageProber {
    async fn probe(&self, _url: &str) -> Option<ImageMetadata> {
        Some(ImageMetadata {
            width: 1920,
            height: 1080,
            format: news_synth::ImageFormat::Jpeg,
        })
    }
}

/// A single-request-at-a-time local HTTP/1.1 server, routing by exact path
/// to a fixed canned response body. No TLS, no keep-alive — just enough
/// wire protocol for `reqwest` to parse a response.
pub struct FeedServer {
    pub addr: std::net::SocketAddr,
}

pub async fn start_feed_server(routes: HashMap<String, String>) -> FeedServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind local feed server");
    let addr = listener.local_addr().expect("local feed server addr");
    let routes = Arc::new(routes);

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let routes = Arc::clone(&routes);
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let Ok(n) = socket.read(&mut buf).await else {
                    return;
                };
                let request = String::from_utf8_lossy(&buf[..n]);
                let path = request
                    .lines()
                    .next()
                    .and_then(|line| line.split_whitespace().nth(1))
                    .unwrap_or("/")
                    .to_string();

                let body = routes.get(&path).cloned().unwrap_or_default();
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/rss+xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    FeedServer { addr }
}

/// One RSS 2.0 document with a single item, publishing `title` at
/// `published_at` with an enclosure image — enough for the collector to
/// extract an image without a follow-up Open-Graph fetch.
pub fn rss_document(item_url: &str, title: &str, published_at: chrono::DateTime<chrono::Utc>) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Fixture Wire</title>
    <link>https://example.invalid/</link>
    <description>Fixture feed</description>
    <item>
      <title>{title}</title>
      <link>{item_url}</link>
      <guid>{item_url}</guid>
      <description>A magnitude 7.8 earthquake struck near Gaziantep, officials said, with rescue efforts underway across the region as the death toll continued to rise through the morning.</description>
      <pubDate>{pub_date}</pubDate>
      <enclosure url="https://images.example.invalid/quake.jpg" type="image/jpeg" length="102400"/>
    </item>
  </channel>
</rss>"#,
        title = title,
        item_url = item_url,
        pub_date = published_at.to_rfc2822(),
    )
}
