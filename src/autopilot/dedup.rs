//! Trigger deduplication against drafts already on file.
//!
//! Detectors are idempotent re-scans — the same competitor gap fires on
//! every sweep until it is resolved. Without this filter each run would
//! re-spawn a draft for the same finding.

use std::collections::HashSet;

use crate::model::DraftTrigger;

/// Drop candidates whose `(trigger_type, trigger_id)` key already has a
/// non-archived draft, or that repeat an earlier candidate in the same
/// batch. Pure and order-preserving.
///
/// The key is advisory — no storage uniqueness constraint backs it, so two
/// overlapping sweeps can still double-create (accepted race; scheduler
/// cadence is coarse).
pub fn deduplicate_triggers(
    candidates: Vec<DraftTrigger>,
    existing: &HashSet<String>,
) -> Vec<DraftTrigger> {
    let mut seen: HashSet<String> = HashSet::new();
    candidates
        .into_iter()
        .filter(|t| {
            let key = t.dedup_key();
            !existing.contains(&key) && seen.insert(key)
        })
        .collect()
}
