// SPDX-License-Identifier: MIT
//! Google Business Profile channel — Local Post publishing.
//!
//! Uses the org's stored OAuth connection, refreshing the access token when
//! its expiry has passed. Post bodies are capped at 1500 characters with
//! sentence-boundary truncation. On a 401 the token is refreshed and the
//! post retried exactly once; a second 401 is a hard failure.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::model::{ContentDraft, PublishResult, PublishStatus};
use crate::storage::{LocationRow, OauthConnectionRow, Storage};

use super::{PublishChannel, PublishError};

/// GBP rejects Local Post summaries longer than this.
pub const GBP_SUMMARY_LIMIT: usize = 1500;

const OAUTH_PROVIDER: &str = "google";

// ─── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalPostBody {
    pub language_code: String,
    pub summary: String,
    pub topic_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocalPostResponse {
    #[serde(default)]
    search_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Raw HTTP reply from the transport, status and body only.
#[derive(Debug, Clone)]
pub struct WireResponse {
    pub status: u16,
    pub body: String,
}

impl WireResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP seam for the GBP API and Google's token endpoint. Injected so the
/// 401/refresh flow is testable without a network.
#[async_trait]
pub trait GbpTransport: Send + Sync {
    async fn create_local_post(
        &self,
        access_token: &str,
        location_ref: &str,
        body: &LocalPostBody,
    ) -> Result<WireResponse>;

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<WireResponse>;
}

// ─── Reqwest transport ────────────────────────────────────────────────────────

pub struct HttpGbpTransport {
    client: reqwest::Client,
    api_base: String,
    token_endpoint: String,
    client_id: String,
    client_secret: String,
}

impl HttpGbpTransport {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: config.gbp_api_base.clone(),
            token_endpoint: config.google_token_endpoint.clone(),
            client_id: config.google_client_id.clone().unwrap_or_default(),
            client_secret: config.google_client_secret.clone().unwrap_or_default(),
        }
    }
}

#[async_trait]
impl GbpTransport for HttpGbpTransport {
    async fn create_local_post(
        &self,
        access_token: &str,
        location_ref: &str,
        body: &LocalPostBody,
    ) -> Result<WireResponse> {
        let url = format!("{}/{}/localPosts", self.api_base, location_ref);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .json(body)
            .send()
            .await
            .context("gbp localPosts request failed")?;
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Ok(WireResponse { status, body })
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<WireResponse> {
        let resp = self
            .client
            .post(&self.token_endpoint)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", &self.client_id),
                ("client_secret", &self.client_secret),
            ])
            .send()
            .await
            .context("oauth token refresh request failed")?;
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Ok(WireResponse { status, body })
    }
}

// ─── Truncation ───────────────────────────────────────────────────────────────

/// Cap `text` at `limit` characters, preferring a sentence boundary.
///
/// The last `.`/`!`/`?` inside the budget wins only when at least 80% of
/// the budget is used; otherwise the cut falls back to the last whitespace
/// (plus an ellipsis), and with no whitespace at all to a hard cut three
/// characters short of the limit.
pub fn truncate_summary(text: &str, limit: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= limit {
        return text.to_string();
    }

    let window = &chars[..limit];
    let min_sentence_cut = limit * 4 / 5;
    if let Some(pos) = window.iter().rposition(|c| matches!(c, '.' | '!' | '?')) {
        if pos + 1 >= min_sentence_cut {
            return window[..=pos].iter().collect();
        }
    }

    let ellipsis_window = &chars[..limit - 3];
    if let Some(pos) = ellipsis_window.iter().rposition(|c| c.is_whitespace()) {
        let cut: String = ellipsis_window[..pos].iter().collect();
        return format!("{}...", cut.trim_end());
    }

    let cut: String = ellipsis_window.iter().collect();
    format!("{cut}...")
}

// ─── Channel ──────────────────────────────────────────────────────────────────

pub struct GbpChannel {
    storage: Arc<Storage>,
    transport: Arc<dyn GbpTransport>,
    language_code: String,
}

impl GbpChannel {
    pub fn new(storage: Arc<Storage>, transport: Arc<dyn GbpTransport>, config: &PipelineConfig) -> Self {
        Self {
            storage,
            transport,
            language_code: config.gbp_language_code.clone(),
        }
    }

    /// Refresh the access token and persist it. Persisting is best-effort —
    /// the fresh token is used for this publish either way.
    async fn refresh_token(&self, conn: &OauthConnectionRow) -> Result<String, PublishError> {
        let reply = self
            .transport
            .refresh_access_token(&conn.refresh_token)
            .await?;
        if !reply.is_success() {
            return Err(PublishError::TokenRefresh {
                status: reply.status,
                body: reply.body,
            });
        }

        let token: TokenResponse = serde_json::from_str(&reply.body)
            .context("token endpoint returned unparseable body")?;
        let expires_at = Utc::now() + Duration::seconds(token.expires_in);

        if let Err(e) = self
            .storage
            .update_oauth_token(&conn.id, &token.access_token, expires_at)
            .await
        {
            warn!(org_id = %conn.org_id, err = %e, "failed to persist refreshed token");
        }
        Ok(token.access_token)
    }
}

#[async_trait]
impl PublishChannel for GbpChannel {
    fn name(&self) -> &'static str {
        "gbp"
    }

    async fn publish(
        &self,
        draft: &ContentDraft,
        location: &LocationRow,
    ) -> Result<PublishResult, PublishError> {
        let conn = self
            .storage
            .oauth_connection(&draft.org_id, OAUTH_PROVIDER)
            .await?
            .ok_or_else(|| PublishError::NotConnected {
                provider: "Google Business Profile".to_string(),
            })?;

        let location_ref = location
            .gbp_location_ref
            .as_deref()
            .ok_or(PublishError::MissingLocationRef)?;

        let mut token = if conn.is_expired(Utc::now()) {
            self.refresh_token(&conn).await?
        } else {
            conn.access_token.clone()
        };

        let body = LocalPostBody {
            language_code: self.language_code.clone(),
            summary: truncate_summary(&draft.content, GBP_SUMMARY_LIMIT),
            topic_type: "STANDARD".to_string(),
        };

        let mut reply = self
            .transport
            .create_local_post(&token, location_ref, &body)
            .await?;

        // One refresh-and-retry on an expired-looking token; a second 401
        // is a hard failure.
        if reply.status == 401 {
            info!(draft_id = %draft.id, "gbp returned 401 — refreshing token and retrying once");
            token = self.refresh_token(&conn).await?;
            reply = self
                .transport
                .create_local_post(&token, location_ref, &body)
                .await?;
        }

        if !reply.is_success() {
            return Err(PublishError::Api {
                status: reply.status,
                body: reply.body,
            });
        }

        let parsed: LocalPostResponse = serde_json::from_str(&reply.body).unwrap_or(LocalPostResponse {
            search_url: None,
        });
        Ok(PublishResult {
            published_url: parsed.search_url,
            status: PublishStatus::Published,
            download_payload: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContentType, DraftStatus, TriggerType};
    use std::sync::Mutex;

    // ─── Truncation ───────────────────────────────────────────────────────

    #[test]
    fn short_text_is_untouched() {
        assert_eq!(truncate_summary("Visit us today.", 1500), "Visit us today.");
    }

    #[test]
    fn truncates_at_late_sentence_boundary() {
        // Sentence boundary at 1400 chars — inside the last 20% of the budget.
        let mut text = "x".repeat(1399);
        text.push('.');
        text.push_str(&"y".repeat(600));

        let out = truncate_summary(&text, 1500);
        assert_eq!(out.chars().count(), 1400);
        assert!(out.ends_with('.'));
    }

    #[test]
    fn early_sentence_boundary_falls_back_to_whitespace() {
        // Boundary at 100 chars is too early (< 80% of budget); space at 1490.
        let mut text = "x".repeat(99);
        text.push('.');
        text.push_str(&"y".repeat(1390));
        text.push(' ');
        text.push_str(&"z".repeat(600));

        let out = truncate_summary(&text, 1500);
        assert_eq!(out.chars().count(), 1490 + 3);
        assert!(out.ends_with("..."));
        assert!(!out.trim_end_matches("...").ends_with(' '));
    }

    #[test]
    fn no_whitespace_hard_truncates_three_short() {
        let text = "x".repeat(2000);
        let out = truncate_summary(&text, 1500);
        assert_eq!(out.chars().count(), 1500);
        assert!(out.ends_with("..."));
        assert_eq!(out.trim_end_matches("...").chars().count(), 1497);
    }

    // ─── 401 retry ────────────────────────────────────────────────────────

    /// Transport that replays a scripted sequence of post replies and
    /// counts refresh calls.
    struct ScriptedTransport {
        post_replies: Mutex<Vec<WireResponse>>,
        posts: Mutex<u32>,
        refreshes: Mutex<u32>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<WireResponse>) -> Self {
            Self {
                post_replies: Mutex::new(replies),
                posts: Mutex::new(0),
                refreshes: Mutex::new(0),
            }
        }

        fn counts(&self) -> (u32, u32) {
            (*self.posts.lock().unwrap(), *self.refreshes.lock().unwrap())
        }
    }

    #[async_trait]
    impl GbpTransport for ScriptedTransport {
        async fn create_local_post(
            &self,
            _access_token: &str,
            _location_ref: &str,
            _body: &LocalPostBody,
        ) -> Result<WireResponse> {
            *self.posts.lock().unwrap() += 1;
            let mut replies = self.post_replies.lock().unwrap();
            Ok(replies.remove(0))
        }

        async fn refresh_access_token(&self, _refresh_token: &str) -> Result<WireResponse> {
            *self.refreshes.lock().unwrap() += 1;
            Ok(WireResponse {
                status: 200,
                body: r#"{"access_token":"fresh-token","expires_in":3600}"#.to_string(),
            })
        }
    }

    async fn seeded(
        transport: Arc<ScriptedTransport>,
    ) -> (tempfile::TempDir, GbpChannel, ContentDraft, LocationRow) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(Storage::new(dir.path()).await.unwrap());
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO oauth_connections \
                 (id, org_id, provider, access_token, refresh_token, expires_at, updated_at) \
             VALUES ('c1', 'o1', 'google', 'stale-token', 'refresh-1', ?, ?)",
        )
        .bind((now + Duration::hours(1)).to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(storage.pool())
        .await
        .unwrap();

        let draft = ContentDraft {
            id: "d1".into(),
            org_id: "o1".into(),
            location_id: Some("l1".into()),
            trigger_type: TriggerType::CompetitorGap,
            trigger_id: Some("g1".into()),
            title: "Post".into(),
            content: "Come try our new patio menu.".into(),
            content_type: ContentType::GbpPost,
            status: DraftStatus::Approved,
            human_approved: true,
            created_at: now,
            published_at: None,
            published_url: None,
        };
        let location = LocationRow {
            id: "l1".into(),
            org_id: "o1".into(),
            name: "Acme BBQ".into(),
            address: None,
            phone: None,
            website_url: None,
            gbp_location_ref: Some("accounts/1/locations/2".into()),
            target_query: None,
            archived: false,
            created_at: now.to_rfc3339(),
        };

        let channel = GbpChannel::new(storage, transport, &PipelineConfig::default());
        (dir, channel, draft, location)
    }

    #[tokio::test]
    async fn success_returns_search_url() {
        let transport = Arc::new(ScriptedTransport::new(vec![WireResponse {
            status: 200,
            body: r#"{"searchUrl":"https://posts.example/p1"}"#.to_string(),
        }]));
        let (_dir, channel, draft, location) = seeded(transport.clone()).await;

        let result = channel.publish(&draft, &location).await.unwrap();
        assert_eq!(result.published_url.as_deref(), Some("https://posts.example/p1"));
        assert!(result.download_payload.is_none());
        assert_eq!(transport.counts(), (1, 0));
    }

    #[tokio::test]
    async fn first_401_refreshes_and_retries_once() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            WireResponse { status: 401, body: String::new() },
            WireResponse {
                status: 200,
                body: r#"{"searchUrl":"https://posts.example/p1"}"#.to_string(),
            },
        ]));
        let (_dir, channel, draft, location) = seeded(transport.clone()).await;

        let result = channel.publish(&draft, &location).await.unwrap();
        assert!(result.published_url.is_some());
        assert_eq!(transport.counts(), (2, 1));
    }

    #[tokio::test]
    async fn second_401_is_a_hard_failure() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            WireResponse { status: 401, body: String::new() },
            WireResponse { status: 401, body: String::new() },
        ]));
        let (_dir, channel, draft, location) = seeded(transport.clone()).await;

        match channel.publish(&draft, &location).await {
            Err(PublishError::Api { status, .. }) => assert_eq!(status, 401),
            other => panic!("expected Api 401, got {other:?}"),
        }
        // Exactly two posts and one refresh — no third attempt.
        assert_eq!(transport.counts(), (2, 1));
    }

    #[tokio::test]
    async fn non_2xx_is_a_hard_failure_with_status() {
        let transport = Arc::new(ScriptedTransport::new(vec![WireResponse {
            status: 429,
            body: "rate limited".to_string(),
        }]));
        let (_dir, channel, draft, location) = seeded(transport.clone()).await;

        match channel.publish(&draft, &location).await {
            Err(PublishError::Api { status, body }) => {
                assert_eq!(status, 429);
                assert_eq!(body, "rate limited");
            }
            other => panic!("expected Api 429, got {other:?}"),
        }
        assert_eq!(transport.counts(), (1, 0));
    }

    #[tokio::test]
    async fn missing_connection_and_location_ref_are_distinct() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let (_dir, channel, mut draft, mut location) = seeded(transport).await;

        location.gbp_location_ref = None;
        assert!(matches!(
            channel.publish(&draft, &location).await,
            Err(PublishError::MissingLocationRef)
        ));

        draft.org_id = "org-without-connection".into();
        location.gbp_location_ref = Some("accounts/1/locations/2".into());
        assert!(matches!(
            channel.publish(&draft, &location).await,
            Err(PublishError::NotConnected { .. })
        ));
    }

    #[tokio::test]
    async fn expired_token_refreshes_before_posting() {
        let transport = Arc::new(ScriptedTransport::new(vec![WireResponse {
            status: 200,
            body: "{}".to_string(),
        }]));
        let (_dir, channel, draft, location) = seeded(transport.clone()).await;

        // Force the stored token past its expiry.
        sqlx::query("UPDATE oauth_connections SET expires_at = ? WHERE id = 'c1'")
            .bind((Utc::now() - Duration::hours(1)).to_rfc3339())
            .execute(channel.storage.pool())
            .await
            .unwrap();

        let result = channel.publish(&draft, &location).await.unwrap();
        // No searchUrl in the reply — published with no URL rather than a fake one.
        assert!(result.published_url.is_none());
        assert_eq!(transport.counts(), (1, 1));
    }
}
