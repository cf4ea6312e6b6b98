// SPDX-License-Identifier: MIT
//! Per-plan monthly draft quota.
//!
//! The ceiling resets on the first of each calendar month (UTC) and is
//! scoped per location. A denial is a normal terminal state for a
//! location's sweep, never an error.

use anyhow::Result;
use chrono::{DateTime, Datelike, TimeZone, Utc};

use crate::model::PlanTier;
use crate::storage::Storage;

/// Outcome of the draft limit gate.
#[derive(Debug, Clone, Copy)]
pub struct DraftLimitCheck {
    pub allowed: bool,
    /// Drafts already created this calendar month for the location.
    pub current: u32,
    /// Plan ceiling; zero for tiers without autopilot.
    pub limit: u32,
}

/// First instant of the calendar month containing `now`.
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Compare this month's draft count against the plan ceiling.
///
/// The orchestrator re-derives the verdict before each individual commit by
/// adding drafts it has created in the same sweep to `current`.
pub async fn check_draft_limit(
    storage: &Storage,
    org_id: &str,
    location_id: &str,
    plan: PlanTier,
    now: DateTime<Utc>,
) -> Result<DraftLimitCheck> {
    let limit = plan.monthly_draft_limit();
    if limit == 0 {
        return Ok(DraftLimitCheck {
            allowed: false,
            current: 0,
            limit,
        });
    }

    let current = storage
        .count_drafts_since(org_id, location_id, month_start(now))
        .await?;

    Ok(DraftLimitCheck {
        allowed: current < limit,
        current,
        limit,
    })
}
