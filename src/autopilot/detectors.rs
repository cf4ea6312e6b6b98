// SPDX-License-Identifier: MIT
//! Trigger detectors — four independent, read-only signal scanners.
//!
//! Each detector inspects one signal table for a location and emits zero or
//! more [`DraftTrigger`] candidates. An empty vec is the no-signal result;
//! detectors never treat "nothing found" as an error. They know nothing of
//! each other — [`detect_all`] fans them out concurrently and concatenates.

use anyhow::Result;
use serde_json::json;
use tracing::warn;

use crate::model::{DraftTrigger, TriggerType};
use crate::storage::Storage;

/// Minimum review mentions of a theme before it is worth a page.
const REVIEW_THEME_MIN_MENTIONS: i64 = 3;

/// Run all four detectors concurrently and concatenate their findings.
///
/// A failing detector contributes zero triggers (logged); its siblings are
/// unaffected.
pub async fn detect_all(storage: &Storage, org_id: &str, location_id: &str) -> Vec<DraftTrigger> {
    let (competitor, prompts, reviews, schema) = tokio::join!(
        detect_competitor_gaps(storage, org_id, location_id),
        detect_missing_prompts(storage, org_id, location_id),
        detect_review_gaps(storage, org_id, location_id),
        detect_schema_gaps(storage, org_id, location_id),
    );

    let mut triggers = Vec::new();
    for (name, result) in [
        ("competitor_gap", competitor),
        ("prompt_missing", prompts),
        ("review_gap", reviews),
        ("schema_gap", schema),
    ] {
        match result {
            Ok(found) => triggers.extend(found),
            Err(e) => warn!(detector = name, location_id, err = %e, "detector failed — skipping"),
        }
    }
    triggers
}

/// Queries where a competitor currently outranks the business.
pub async fn detect_competitor_gaps(
    storage: &Storage,
    org_id: &str,
    location_id: &str,
) -> Result<Vec<DraftTrigger>> {
    let rows: Vec<(String, String, String)> = sqlx::query_as(
        "SELECT id, competitor, topic FROM visibility_gaps \
         WHERE org_id = ? AND location_id = ? AND resolved = 0 \
         ORDER BY detected_at ASC",
    )
    .bind(org_id)
    .bind(location_id)
    .fetch_all(storage.pool())
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, competitor, topic)| DraftTrigger {
            trigger_type: TriggerType::CompetitorGap,
            trigger_id: id,
            org_id: org_id.to_string(),
            location_id: location_id.to_string(),
            context: json!({ "competitor": competitor, "topic": topic }),
        })
        .collect())
}

/// Tracked prompts whose latest check did not mention the business.
pub async fn detect_missing_prompts(
    storage: &Storage,
    org_id: &str,
    location_id: &str,
) -> Result<Vec<DraftTrigger>> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT id, prompt_text FROM tracked_prompts \
         WHERE org_id = ? AND location_id = ? AND archived = 0 AND last_mentioned = 0",
    )
    .bind(org_id)
    .bind(location_id)
    .fetch_all(storage.pool())
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, prompt_text)| DraftTrigger {
            trigger_type: TriggerType::PromptMissing,
            trigger_id: id,
            org_id: org_id.to_string(),
            location_id: location_id.to_string(),
            context: json!({ "prompt": prompt_text }),
        })
        .collect())
}

/// Recurring review themes with no covering page on the site.
pub async fn detect_review_gaps(
    storage: &Storage,
    org_id: &str,
    location_id: &str,
) -> Result<Vec<DraftTrigger>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT theme, mention_count FROM review_insights \
         WHERE org_id = ? AND location_id = ? AND has_page = 0 AND mention_count >= ? \
         ORDER BY mention_count DESC",
    )
    .bind(org_id)
    .bind(location_id)
    .bind(REVIEW_THEME_MIN_MENTIONS)
    .fetch_all(storage.pool())
    .await?;

    Ok(rows
        .into_iter()
        .map(|(theme, mention_count)| DraftTrigger {
            trigger_type: TriggerType::ReviewGap,
            // Slug keeps the id stable across re-scans of the same theme.
            trigger_id: slugify(&theme),
            org_id: org_id.to_string(),
            location_id: location_id.to_string(),
            context: json!({ "theme": theme, "mention_count": mention_count }),
        })
        .collect())
}

/// FAQ structured data missing from the location's site per the latest audit.
pub async fn detect_schema_gaps(
    storage: &Storage,
    org_id: &str,
    location_id: &str,
) -> Result<Vec<DraftTrigger>> {
    let latest: Option<(bool,)> = sqlx::query_as(
        "SELECT has_faq_schema FROM site_audits \
         WHERE org_id = ? AND location_id = ? \
         ORDER BY audited_at DESC LIMIT 1",
    )
    .bind(org_id)
    .bind(location_id)
    .fetch_optional(storage.pool())
    .await?;

    // No audit on file means no signal, not a finding.
    let Some((has_faq_schema,)) = latest else {
        return Ok(Vec::new());
    };
    if has_faq_schema {
        return Ok(Vec::new());
    }

    Ok(vec![DraftTrigger {
        trigger_type: TriggerType::SchemaGap,
        trigger_id: "faq_schema".to_string(),
        org_id: org_id.to_string(),
        location_id: location_id.to_string(),
        context: json!({ "missing": "faq_schema" }),
    }])
}

fn slugify(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_dash = true;
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    out.trim_end_matches('-').to_string()
}
