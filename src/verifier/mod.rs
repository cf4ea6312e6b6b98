// SPDX-License-Identifier: MIT
//! Correction verifier — did the published fix actually land?
//!
//! Re-issues a stored query against the engine that originally produced an
//! inaccuracy and looks for the wrong facts in the fresh response. A failed
//! provider call counts as "still hallucinating": a broken check must not
//! silently mark an open issue as resolved.

pub mod fingerprints;

pub use fingerprints::extract_fingerprints;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use crate::model::{FollowUpAlert, FollowUpResult};
use crate::storage::Storage;

/// Characters of the claim used as a loose match when no fingerprint could
/// be extracted at all.
const LOOSE_PREFIX_CHARS: usize = 30;

/// Hint passed alongside re-check queries so engines answer in the same
/// local-business frame as the original audit.
const RECHECK_CONTEXT_HINT: &str = "local business information";

// ─── Engine routing ───────────────────────────────────────────────────────────

/// Known AI answer-engine families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineFamily {
    OpenAi,
    Anthropic,
    Perplexity,
    Google,
}

/// Fallback for providers no mapping rule recognizes.
const DEFAULT_FAMILY: EngineFamily = EngineFamily::OpenAi;

impl EngineFamily {
    /// Map a stored provider name onto an engine family. Unrecognized
    /// providers take the default family — deliberately, and logged.
    pub fn from_provider(provider: &str) -> Self {
        let p = provider.to_lowercase();
        if p.contains("chatgpt") || p.contains("openai") || p.contains("gpt") {
            Self::OpenAi
        } else if p.contains("claude") || p.contains("anthropic") {
            Self::Anthropic
        } else if p.contains("perplexity") || p.contains("sonar") {
            Self::Perplexity
        } else if p.contains("gemini") || p.contains("google") || p.contains("bard") {
            Self::Google
        } else {
            warn!(provider, fallback = ?DEFAULT_FAMILY, "unrecognized provider — using default engine");
            DEFAULT_FAMILY
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Complete,
    Error,
}

#[derive(Debug, Clone)]
pub struct EngineAnswer {
    pub status: EngineStatus,
    pub content: String,
}

/// One AI answer-engine family's query surface.
#[async_trait]
pub trait AnswerEngine: Send + Sync {
    async fn query(&self, text: &str, context_hint: &str) -> Result<EngineAnswer>;
}

/// Family → engine mapping, built once at startup.
#[derive(Default)]
pub struct EngineRouter {
    engines: HashMap<EngineFamily, Arc<dyn AnswerEngine>>,
}

impl EngineRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_engine(mut self, family: EngineFamily, engine: Arc<dyn AnswerEngine>) -> Self {
        self.engines.insert(family, engine);
        self
    }

    pub fn engine(&self, family: EngineFamily) -> Option<&Arc<dyn AnswerEngine>> {
        self.engines.get(&family)
    }
}

// ─── Verification ─────────────────────────────────────────────────────────────

/// Re-query the alert's engine and decide whether the inaccuracy persists.
///
/// "Still hallucinating" when any extracted fingerprint reappears in the
/// fresh response (case-insensitive); with zero fingerprints, when a short
/// prefix of the claim does. Provider failure resolves conservatively to
/// `true`.
pub async fn check_correction_status(
    router: &EngineRouter,
    alert: &FollowUpAlert,
) -> FollowUpResult {
    let family = EngineFamily::from_provider(&alert.provider);
    let Some(engine) = router.engine(family) else {
        warn!(alert_id = %alert.id, ?family, "no engine configured — treating as still hallucinating");
        return FollowUpResult {
            still_hallucinating: true,
        };
    };

    let answer = match engine.query(&alert.query, RECHECK_CONTEXT_HINT).await {
        Ok(answer) if answer.status == EngineStatus::Complete => answer,
        Ok(_) => {
            warn!(alert_id = %alert.id, "engine returned error status — treating as still hallucinating");
            return FollowUpResult {
                still_hallucinating: true,
            };
        }
        Err(e) => {
            warn!(alert_id = %alert.id, err = %e, "engine query failed — treating as still hallucinating");
            return FollowUpResult {
                still_hallucinating: true,
            };
        }
    };

    let response = answer.content.to_lowercase();
    let fingerprints = extract_fingerprints(&alert.claim_text);

    let still_hallucinating = if fingerprints.is_empty() {
        let prefix: String = alert
            .claim_text
            .chars()
            .take(LOOSE_PREFIX_CHARS)
            .collect::<String>()
            .trim()
            .to_lowercase();
        !prefix.is_empty() && response.contains(&prefix)
    } else {
        fingerprints
            .iter()
            .any(|fp| response.contains(&fp.to_lowercase()))
    };

    info!(
        alert_id = %alert.id,
        still_hallucinating,
        fingerprints = fingerprints.len(),
        "correction check complete"
    );
    FollowUpResult { still_hallucinating }
}

/// Run the check and write the verdict back onto the alert record:
/// `resolved` when the wrong facts are gone, `open` (with a fresh
/// last-checked timestamp) when they persist.
pub async fn resolve_alert(
    storage: &Storage,
    router: &EngineRouter,
    alert_id: &str,
) -> Result<FollowUpResult> {
    let row = storage
        .get_alert(alert_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("unknown alert {alert_id}"))?;

    let alert = FollowUpAlert {
        id: row.id.clone(),
        provider: row.provider.clone(),
        query: row.query.clone(),
        claim_text: row.claim_text.clone(),
    };
    let result = check_correction_status(router, &alert).await;

    let status = if result.still_hallucinating { "open" } else { "resolved" };
    storage.set_alert_status(alert_id, status, Utc::now()).await?;
    Ok(result)
}
