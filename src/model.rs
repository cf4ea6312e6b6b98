// SPDX-License-Identifier: MIT
//! Core data model for the autopilot content pipeline.
//!
//! Triggers are ephemeral — produced by the detectors, consumed by the
//! dedup/creation step, never persisted as-is. Drafts are persistent and
//! flow through the approval state machine before publishing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

// ─── Triggers ─────────────────────────────────────────────────────────────────

/// Kind of signal that can spawn a content draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    CompetitorGap,
    PromptMissing,
    ReviewGap,
    SchemaGap,
    /// Raised by the hallucination pipeline, not by the detector sweep.
    HallucinationCorrection,
    /// Seasonal/occasion pages, created from the occasions calendar.
    Occasion,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CompetitorGap => "competitor_gap",
            Self::PromptMissing => "prompt_missing",
            Self::ReviewGap => "review_gap",
            Self::SchemaGap => "schema_gap",
            Self::HallucinationCorrection => "hallucination_correction",
            Self::Occasion => "occasion",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "competitor_gap" => Some(Self::CompetitorGap),
            "prompt_missing" => Some(Self::PromptMissing),
            "review_gap" => Some(Self::ReviewGap),
            "schema_gap" => Some(Self::SchemaGap),
            "hallucination_correction" => Some(Self::HallucinationCorrection),
            "occasion" => Some(Self::Occasion),
            _ => None,
        }
    }
}

/// An actionable signal detected for one location.
///
/// In-memory only. The `(trigger_type, trigger_id)` pair identifies the
/// finding across repeated sweeps and is the deduplication key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftTrigger {
    pub trigger_type: TriggerType,
    pub trigger_id: String,
    pub org_id: String,
    pub location_id: String,
    /// Detector-specific context consumed by the prompt builder.
    pub context: serde_json::Value,
}

impl DraftTrigger {
    /// Key used to deduplicate against drafts already on file.
    pub fn dedup_key(&self) -> String {
        format!("{}:{}", self.trigger_type.as_str(), self.trigger_id)
    }
}

// ─── Drafts ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    FaqPage,
    OccasionPage,
    BlogPost,
    LandingPage,
    GbpPost,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FaqPage => "faq_page",
            Self::OccasionPage => "occasion_page",
            Self::BlogPost => "blog_post",
            Self::LandingPage => "landing_page",
            Self::GbpPost => "gbp_post",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "faq_page" => Some(Self::FaqPage),
            "occasion_page" => Some(Self::OccasionPage),
            "blog_post" => Some(Self::BlogPost),
            "landing_page" => Some(Self::LandingPage),
            "gbp_post" => Some(Self::GbpPost),
            _ => None,
        }
    }
}

/// Lifecycle state of a content draft.
///
/// Transitions are validated by [`crate::approval`]; nothing else mutates
/// a draft's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus {
    Draft,
    PendingApproval,
    DraftReady,
    Approved,
    Rejected,
    Published,
    Archived,
}

impl DraftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::PendingApproval => "pending_approval",
            Self::DraftReady => "draft_ready",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Published => "published",
            Self::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "pending_approval" => Some(Self::PendingApproval),
            "draft_ready" => Some(Self::DraftReady),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "published" => Some(Self::Published),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }

    /// Legal transitions of the HITL approval state machine.
    pub fn can_transition(&self, to: DraftStatus) -> bool {
        use DraftStatus::*;
        matches!(
            (self, to),
            (Draft, DraftReady)
                | (Draft, PendingApproval)
                | (DraftReady, PendingApproval)
                | (PendingApproval, Approved)
                | (PendingApproval, Rejected)
                | (Approved, Published)
                | (Draft, Archived)
                | (DraftReady, Archived)
                | (PendingApproval, Archived)
                | (Approved, Archived)
                | (Rejected, Archived)
                | (Published, Archived)
        )
    }
}

/// A persisted content draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentDraft {
    pub id: String,
    pub org_id: String,
    pub location_id: Option<String>,
    pub trigger_type: TriggerType,
    pub trigger_id: Option<String>,
    pub title: String,
    pub content: String,
    pub content_type: ContentType,
    pub status: DraftStatus,
    pub human_approved: bool,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub published_url: Option<String>,
}

// ─── Plans ────────────────────────────────────────────────────────────────────

/// Subscription tier of an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Trial,
    Starter,
    Growth,
    Agency,
}

impl PlanTier {
    /// Parse a stored plan string. Unknown values fall back to `Trial`
    /// (fail-closed for quota enforcement).
    pub fn parse_or_trial(s: &str) -> Self {
        match s {
            "trial" => Self::Trial,
            "starter" => Self::Starter,
            "growth" => Self::Growth,
            "agency" => Self::Agency,
            other => {
                warn!(plan = %other, "unknown plan tier — treating as trial");
                Self::Trial
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trial => "trial",
            Self::Starter => "starter",
            Self::Growth => "growth",
            Self::Agency => "agency",
        }
    }

    /// Whether this tier may run the autopilot sweep at all.
    pub fn autopilot_enabled(&self) -> bool {
        matches!(self, Self::Growth | Self::Agency)
    }

    /// Monthly draft ceiling per location. Zero means autopilot is denied.
    pub fn monthly_draft_limit(&self) -> u32 {
        match self {
            Self::Trial | Self::Starter => 0,
            Self::Growth => 10,
            Self::Agency => 30,
        }
    }
}

// ─── Publishing ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishStatus {
    Published,
    Failed,
}

/// Outcome of a channel publish. The download channel produces an artifact
/// payload and no live URL; the GBP channel produces a URL and no payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResult {
    pub published_url: Option<String>,
    pub status: PublishStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_payload: Option<String>,
}

// ─── Correction verification ──────────────────────────────────────────────────

/// A previously detected inaccuracy due for re-verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowUpAlert {
    pub id: String,
    /// Engine that originally produced the inaccuracy (e.g. `"chatgpt"`).
    pub provider: String,
    /// The stored query to re-issue.
    pub query: String,
    /// The original wrong claim, source of the fingerprints.
    pub claim_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowUpResult {
    pub still_hallucinating: bool,
}
