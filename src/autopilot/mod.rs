// SPDX-License-Identifier: MIT
//! Autopilot orchestrator — the scheduler-facing entry points.
//!
//! One sweep per org: resolve the plan, then for each active location run
//! the detectors concurrently, deduplicate against drafts on file, and
//! create drafts under the monthly gate. Locations within an org and orgs
//! within a sweep run sequentially to bound load on the store and external
//! APIs; a single location's failure never aborts its siblings.

pub mod dedup;
pub mod detectors;
pub mod drafter;
pub mod limits;

pub use dedup::deduplicate_triggers;
pub use drafter::{content_type_for, DraftGenerator};
pub use limits::{check_draft_limit, DraftLimitCheck};

use anyhow::{Context as _, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::model::PlanTier;
use crate::observability::LatencyTracker;
use crate::storage::LocationRow;
use crate::PipelineContext;

/// Outcome of an org (or multi-org) sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    /// Locations swept to completion.
    pub processed: u32,
    /// Locations whose sweep failed and was skipped.
    pub failed: u32,
    /// Drafts created.
    pub created: u32,
}

impl SweepSummary {
    fn absorb(&mut self, other: SweepSummary) {
        self.processed += other.processed;
        self.failed += other.failed;
        self.created += other.created;
    }
}

/// Run the autopilot sweep for a single org.
///
/// Orgs on tiers without autopilot return an empty summary, not an error.
/// An unknown org id is caller error and propagates.
pub async fn run_for_org(ctx: &PipelineContext, org_id: &str) -> Result<SweepSummary> {
    let org = ctx
        .storage
        .get_org(org_id)
        .await?
        .with_context(|| format!("unknown org {org_id}"))?;

    let plan = org.plan_tier();
    if !plan.autopilot_enabled() {
        info!(org_id, plan = plan.as_str(), "autopilot not available on plan — skipping");
        return Ok(SweepSummary::default());
    }

    let tracker = LatencyTracker::start("autopilot.org_sweep");
    let locations = ctx.storage.active_locations(org_id).await?;
    let mut summary = SweepSummary::default();

    for location in &locations {
        match sweep_location(ctx, plan, location).await {
            Ok(created) => {
                summary.processed += 1;
                summary.created += created;
            }
            Err(e) => {
                summary.failed += 1;
                warn!(org_id, location_id = %location.id, err = %e, "location sweep failed");
            }
        }
    }

    tracker.finish();
    info!(
        org_id,
        processed = summary.processed,
        failed = summary.failed,
        created = summary.created,
        "org sweep complete"
    );
    Ok(summary)
}

/// Run the sweep for every org on an autopilot-capable tier.
///
/// Tier filtering happens up front so non-qualifying orgs are never
/// iterated per-location. Orgs run sequentially; one org's failure is
/// logged and the sweep continues.
pub async fn run_all_orgs(ctx: &PipelineContext) -> Result<SweepSummary> {
    let orgs = ctx
        .storage
        .orgs_on_tiers(&[PlanTier::Growth, PlanTier::Agency])
        .await?;

    let mut summary = SweepSummary::default();
    for org in &orgs {
        match run_for_org(ctx, &org.id).await {
            Ok(s) => summary.absorb(s),
            Err(e) => {
                summary.failed += 1;
                warn!(org_id = %org.id, err = %e, "org sweep failed");
            }
        }
    }
    Ok(summary)
}

/// Detect → deduplicate → gate → create, for one location.
///
/// Returns the number of drafts created. The gate is checked once up front
/// and re-derived before each commit, since each created draft changes the
/// count it depends on.
async fn sweep_location(
    ctx: &PipelineContext,
    plan: PlanTier,
    location: &LocationRow,
) -> Result<u32> {
    let org_id = location.org_id.as_str();
    let location_id = location.id.as_str();

    let candidates = detectors::detect_all(&ctx.storage, org_id, location_id).await;
    if candidates.is_empty() {
        return Ok(0);
    }

    let existing = ctx.storage.existing_draft_keys(org_id, location_id).await?;
    let candidates = deduplicate_triggers(candidates, &existing);
    if candidates.is_empty() {
        return Ok(0);
    }

    let gate = check_draft_limit(&ctx.storage, org_id, location_id, plan, Utc::now()).await?;
    if !gate.allowed {
        info!(
            location_id,
            current = gate.current,
            limit = gate.limit,
            "draft limit reached — skipping location"
        );
        return Ok(0);
    }

    let mut created: u32 = 0;
    for trigger in &candidates {
        if gate.current + created >= gate.limit {
            info!(
                location_id,
                created,
                limit = gate.limit,
                "draft limit reached mid-sweep — stopping"
            );
            break;
        }
        if drafter::create_draft_from_trigger(&ctx.storage, ctx.generator.as_ref(), trigger, location)
            .await?
            .is_some()
        {
            created += 1;
        }
    }

    Ok(created)
}
