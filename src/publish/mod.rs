// SPDX-License-Identifier: MIT
//! Publish channels — translate an approved draft into a target channel.
//!
//! Two structurally different channels share one contract: the download
//! channel produces a self-contained artifact (no live URL), the GBP
//! channel posts through Google's API (live URL, no artifact). Failures are
//! typed so the dashboard can distinguish "reconnect your account" from a
//! transient API error.

pub mod download;
pub mod gbp;

pub use download::DownloadChannel;
pub use gbp::{GbpChannel, GbpTransport, HttpGbpTransport, WireResponse};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use crate::model::{ContentDraft, ContentType, DraftStatus, PublishResult};
use crate::storage::LocationRow;
use crate::PipelineContext;

/// Typed publish failure. `NotConnected` and `MissingLocationRef` are
/// user-actionable configuration problems; `Api` and `TokenRefresh` carry
/// the upstream HTTP status for display.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("no {provider} connection for this organization — reconnect to publish")]
    NotConnected { provider: String },
    #[error("location has no Google Business Profile location configured")]
    MissingLocationRef,
    #[error("draft has no location to publish against")]
    MissingLocation,
    #[error("draft is not approved for publishing (status {status})")]
    NotPublishable { status: String },
    #[error("publish channel {0} is not configured")]
    ChannelUnavailable(&'static str),
    #[error("token refresh failed with HTTP {status}: {body}")]
    TokenRefresh { status: u16, body: String },
    #[error("publish API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// One publish target. Implementations never silently drop content and
/// never invent a success URL on failure.
#[async_trait]
pub trait PublishChannel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn publish(
        &self,
        draft: &ContentDraft,
        location: &LocationRow,
    ) -> Result<PublishResult, PublishError>;
}

/// Publish an approved draft through the channel its content type targets,
/// record the outcome on the draft, and schedule the post-publish recheck.
///
/// Recheck scheduling is best-effort: a missing target query or an
/// unreachable store never fails a publish that succeeded.
pub async fn publish_draft(
    ctx: &PipelineContext,
    draft_id: &str,
) -> Result<PublishResult, PublishError> {
    let draft = ctx
        .storage
        .get_draft(draft_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("unknown draft {draft_id}"))?;

    if draft.status != DraftStatus::Approved || !draft.human_approved {
        return Err(PublishError::NotPublishable {
            status: draft.status.as_str().to_string(),
        });
    }

    let location_id = draft
        .location_id
        .clone()
        .ok_or(PublishError::MissingLocation)?;
    let location = ctx
        .storage
        .get_location(&location_id)
        .await?
        .ok_or(PublishError::MissingLocation)?;

    let result = match draft.content_type {
        ContentType::GbpPost => {
            let gbp = ctx
                .gbp
                .as_ref()
                .ok_or(PublishError::ChannelUnavailable("gbp"))?;
            gbp.publish(&draft, &location).await?
        }
        _ => DownloadChannel.publish(&draft, &location).await?,
    };

    let applied = ctx
        .storage
        .mark_published(draft_id, result.published_url.as_deref(), Utc::now())
        .await?;
    if !applied {
        warn!(draft_id, "draft moved out of approved during publish — status not updated");
    }

    let target_query = location.target_query.as_deref().unwrap_or("");
    ctx.recheck
        .schedule(draft_id, &location.id, target_query)
        .await;

    info!(
        draft_id,
        channel = if draft.content_type == ContentType::GbpPost { "gbp" } else { "download" },
        url = result.published_url.as_deref().unwrap_or("-"),
        "draft published"
    );
    Ok(result)
}
