// SPDX-License-Identifier: MIT
//! Human-in-the-loop approval state machine.
//!
//! Drafts never publish without an explicit human approval. Transitions are
//! validated against [`DraftStatus::can_transition`] and persisted with a
//! guarded UPDATE, so a draft that moved underneath us is an error rather
//! than a silent overwrite.

use anyhow::{bail, Context as _, Result};
use tracing::info;

use crate::model::{ContentDraft, DraftStatus};
use crate::storage::Storage;

/// Queue a draft for human review.
pub async fn submit_for_approval(storage: &Storage, draft_id: &str) -> Result<ContentDraft> {
    transition(storage, draft_id, DraftStatus::PendingApproval, false).await
}

/// Approve a pending draft. Sets `human_approved`, making it publishable.
pub async fn approve(storage: &Storage, draft_id: &str) -> Result<ContentDraft> {
    transition(storage, draft_id, DraftStatus::Approved, true).await
}

/// Reject a pending draft.
pub async fn reject(storage: &Storage, draft_id: &str) -> Result<ContentDraft> {
    transition(storage, draft_id, DraftStatus::Rejected, false).await
}

/// Archive a draft from any non-archived state. Frees its dedup key for
/// future sweeps.
pub async fn archive(storage: &Storage, draft_id: &str) -> Result<ContentDraft> {
    transition(storage, draft_id, DraftStatus::Archived, false).await
}

async fn transition(
    storage: &Storage,
    draft_id: &str,
    to: DraftStatus,
    set_human_approved: bool,
) -> Result<ContentDraft> {
    let draft = storage
        .get_draft(draft_id)
        .await?
        .with_context(|| format!("unknown draft {draft_id}"))?;

    if !draft.status.can_transition(to) {
        bail!(
            "illegal transition {} -> {} for draft {draft_id}",
            draft.status.as_str(),
            to.as_str()
        );
    }

    let applied = storage
        .update_draft_status(draft_id, draft.status, to, set_human_approved)
        .await?;
    if !applied {
        bail!("draft {draft_id} changed concurrently — transition not applied");
    }

    info!(draft_id, from = draft.status.as_str(), to = to.as_str(), "draft transitioned");
    storage
        .get_draft(draft_id)
        .await?
        .with_context(|| format!("draft {draft_id} vanished after transition"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContentType, TriggerType};
    use chrono::Utc;

    async fn storage_with_draft() -> (tempfile::TempDir, Storage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path()).await.unwrap();
        storage
            .insert_draft(&ContentDraft {
                id: "d1".into(),
                org_id: "o1".into(),
                location_id: Some("l1".into()),
                trigger_type: TriggerType::ReviewGap,
                trigger_id: Some("parking".into()),
                title: "Parking at Acme".into(),
                content: "Body".into(),
                content_type: ContentType::BlogPost,
                status: DraftStatus::Draft,
                human_approved: false,
                created_at: Utc::now(),
                published_at: None,
                published_url: None,
            })
            .await
            .unwrap();
        (dir, storage)
    }

    #[tokio::test]
    async fn full_approval_flow() {
        let (_dir, storage) = storage_with_draft().await;

        let draft = submit_for_approval(&storage, "d1").await.unwrap();
        assert_eq!(draft.status, DraftStatus::PendingApproval);
        assert!(!draft.human_approved);

        let draft = approve(&storage, "d1").await.unwrap();
        assert_eq!(draft.status, DraftStatus::Approved);
        assert!(draft.human_approved);
    }

    #[tokio::test]
    async fn cannot_approve_unsubmitted_draft() {
        let (_dir, storage) = storage_with_draft().await;
        assert!(approve(&storage, "d1").await.is_err());
    }

    #[tokio::test]
    async fn rejected_draft_can_only_archive() {
        let (_dir, storage) = storage_with_draft().await;
        submit_for_approval(&storage, "d1").await.unwrap();
        reject(&storage, "d1").await.unwrap();

        assert!(approve(&storage, "d1").await.is_err());
        let draft = archive(&storage, "d1").await.unwrap();
        assert_eq!(draft.status, DraftStatus::Archived);
    }

    #[tokio::test]
    async fn unknown_draft_is_an_error() {
        let (_dir, storage) = storage_with_draft().await;
        assert!(submit_for_approval(&storage, "nope").await.is_err());
    }
}
