// SPDX-License-Identifier: MIT
//! Draft creation — turns a trigger into a persisted content draft.
//!
//! The only component that talks to the text-generation provider. A
//! provider failure means "no draft produced for this trigger"; the sweep
//! continues.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::model::{ContentDraft, ContentType, DraftStatus, DraftTrigger, TriggerType};
use crate::storage::{LocationRow, Storage};

/// Text-generation provider. Injected so the sweep is testable without an
/// LLM behind it; `generate` may fail on quota or timeout.
#[async_trait]
pub trait DraftGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Channel-appropriate content type for each trigger kind.
pub fn content_type_for(trigger_type: TriggerType) -> ContentType {
    match trigger_type {
        TriggerType::CompetitorGap => ContentType::LandingPage,
        TriggerType::PromptMissing => ContentType::FaqPage,
        TriggerType::ReviewGap => ContentType::BlogPost,
        TriggerType::SchemaGap => ContentType::FaqPage,
        TriggerType::HallucinationCorrection => ContentType::FaqPage,
        TriggerType::Occasion => ContentType::OccasionPage,
    }
}

fn ctx_str<'a>(trigger: &'a DraftTrigger, key: &str) -> &'a str {
    trigger.context.get(key).and_then(|v| v.as_str()).unwrap_or("")
}

/// Title + generation prompt for a trigger, grounded in the location's name.
pub fn build_prompt(trigger: &DraftTrigger, location: &LocationRow) -> (String, String) {
    let business = location.name.as_str();
    match trigger.trigger_type {
        TriggerType::CompetitorGap => {
            let topic = ctx_str(trigger, "topic");
            let competitor = ctx_str(trigger, "competitor");
            (
                format!("{business}: your choice for {topic}"),
                format!(
                    "Write a landing page for {business} focused on \"{topic}\". \
                     AI answer engines currently recommend {competitor} for this topic. \
                     Highlight what {business} offers for {topic}, with concrete details \
                     a first-time customer would want. Do not mention competitors."
                ),
            )
        }
        TriggerType::PromptMissing => {
            let prompt = ctx_str(trigger, "prompt");
            (
                format!("FAQ: {prompt}"),
                format!(
                    "Write an FAQ page for {business} that directly answers the question \
                     \"{prompt}\". Format each entry as 'Q:' and 'A:' lines. Include 3 to 5 \
                     related questions a customer searching this would also ask."
                ),
            )
        }
        TriggerType::ReviewGap => {
            let theme = ctx_str(trigger, "theme");
            (
                format!("{theme} at {business}"),
                format!(
                    "Write a short blog post for {business} about \"{theme}\". Customers \
                     repeatedly bring this up in reviews but the website does not cover it. \
                     Use a warm, factual tone."
                ),
            )
        }
        TriggerType::SchemaGap => (
            format!("Frequently asked questions — {business}"),
            format!(
                "Write a general FAQ page for {business} suitable for FAQ structured data. \
                 Format each entry as 'Q:' and 'A:' lines, covering hours, location, \
                 offerings, and booking."
            ),
        ),
        TriggerType::HallucinationCorrection => {
            let claim = ctx_str(trigger, "claim");
            (
                format!("The facts about {business}"),
                format!(
                    "AI assistants have been repeating an inaccurate claim about {business}: \
                     \"{claim}\". Write a clear corrective FAQ entry ('Q:' and 'A:' lines) \
                     stating the accurate information, without repeating the wrong details."
                ),
            )
        }
        TriggerType::Occasion => {
            let occasion = ctx_str(trigger, "occasion");
            (
                format!("{occasion} at {business}"),
                format!(
                    "Write an occasion page for {business} for {occasion}: what is offered, \
                     how to book, and why to choose {business} for it."
                ),
            )
        }
    }
}

/// Generate and persist a draft for one trigger.
///
/// Returns `Ok(None)` when the provider fails — the caller moves on to the
/// next candidate without counting this one against the quota.
pub async fn create_draft_from_trigger(
    storage: &Storage,
    generator: &dyn DraftGenerator,
    trigger: &DraftTrigger,
    location: &LocationRow,
) -> Result<Option<ContentDraft>> {
    let (title, prompt) = build_prompt(trigger, location);

    let content = match generator.generate(&prompt).await {
        Ok(text) => text,
        Err(e) => {
            warn!(
                trigger = trigger.trigger_type.as_str(),
                trigger_id = %trigger.trigger_id,
                err = %e,
                "generation failed — no draft for this trigger"
            );
            return Ok(None);
        }
    };

    let draft = ContentDraft {
        id: Uuid::new_v4().to_string(),
        org_id: trigger.org_id.clone(),
        location_id: Some(trigger.location_id.clone()),
        trigger_type: trigger.trigger_type,
        trigger_id: Some(trigger.trigger_id.clone()),
        title,
        content,
        content_type: content_type_for(trigger.trigger_type),
        status: DraftStatus::Draft,
        human_approved: false,
        created_at: Utc::now(),
        published_at: None,
        published_url: None,
    };

    storage.insert_draft(&draft).await?;
    info!(
        draft_id = %draft.id,
        trigger = draft.trigger_type.as_str(),
        location_id = %trigger.location_id,
        "draft created"
    );
    Ok(Some(draft))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    pub(crate) struct StaticGenerator(pub &'static str);

    #[async_trait]
    impl DraftGenerator for StaticGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    pub(crate) struct FailingGenerator;

    #[async_trait]
    impl DraftGenerator for FailingGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Err(anyhow!("quota exceeded"))
        }
    }

    fn location() -> LocationRow {
        LocationRow {
            id: "l1".into(),
            org_id: "o1".into(),
            name: "Acme BBQ Midtown".into(),
            address: None,
            phone: None,
            website_url: None,
            gbp_location_ref: None,
            target_query: None,
            archived: false,
            created_at: Utc::now().to_rfc3339(),
        }
    }

    fn trigger() -> DraftTrigger {
        DraftTrigger {
            trigger_type: TriggerType::CompetitorGap,
            trigger_id: "g1".into(),
            org_id: "o1".into(),
            location_id: "l1".into(),
            context: serde_json::json!({ "competitor": "Smokehouse 9", "topic": "outdoor seating" }),
        }
    }

    #[test]
    fn prompt_includes_business_and_topic() {
        let (title, prompt) = build_prompt(&trigger(), &location());
        assert!(title.contains("outdoor seating"));
        assert!(prompt.contains("Acme BBQ Midtown"));
        assert!(prompt.contains("Smokehouse 9"));
    }

    #[tokio::test]
    async fn provider_failure_produces_no_draft() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path()).await.unwrap();

        let created =
            create_draft_from_trigger(&storage, &FailingGenerator, &trigger(), &location())
                .await
                .unwrap();
        assert!(created.is_none());
        assert!(storage
            .existing_draft_keys("o1", "l1")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn successful_generation_persists_draft() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path()).await.unwrap();

        let created = create_draft_from_trigger(
            &storage,
            &StaticGenerator("Generated body"),
            &trigger(),
            &location(),
        )
        .await
        .unwrap()
        .expect("draft");

        assert_eq!(created.status, DraftStatus::Draft);
        assert_eq!(created.content_type, ContentType::LandingPage);
        let keys = storage.existing_draft_keys("o1", "l1").await.unwrap();
        assert!(keys.contains("competitor_gap:g1"));
    }
}
