// SPDX-License-Identifier: MIT
//! GeoPilot — autopilot content pipeline for AI answer-engine visibility.
//!
//! Detects signals worth acting on for each business location, turns them
//! into deduplicated content drafts under a per-plan monthly quota, walks
//! drafts through human approval, publishes through channel adapters, and
//! schedules a delayed re-check that verifies the published content moved
//! the business's standing.
//!
//! The embedding service owns scheduling: it calls
//! [`autopilot::run_all_orgs`] on a fixed cadence and drains
//! [`recheck::RecheckScheduler::get_pending_rechecks`] into
//! [`verifier::resolve_alert`].

pub mod approval;
pub mod autopilot;
pub mod config;
pub mod model;
pub mod observability;
pub mod publish;
pub mod recheck;
pub mod storage;
pub mod verifier;

use std::sync::Arc;

use autopilot::DraftGenerator;
use config::PipelineConfig;
use publish::{GbpChannel, GbpTransport, HttpGbpTransport};
use recheck::{RecheckScheduler, RecheckStore};
use storage::Storage;
use verifier::EngineRouter;

/// Shared collaborators passed into every pipeline entry point.
///
/// All external clients are injected at construction; the GBP channel is a
/// constructor-time optional rather than a runtime null — environments
/// without Google credentials simply have no channel.
#[derive(Clone)]
pub struct PipelineContext {
    pub config: Arc<PipelineConfig>,
    pub storage: Arc<Storage>,
    /// Text-generation provider used by the draft creator.
    pub generator: Arc<dyn DraftGenerator>,
    /// Post-publish recheck scheduling (best-effort).
    pub recheck: Arc<RecheckScheduler>,
    /// AI answer engines for correction verification.
    pub engines: Arc<EngineRouter>,
    /// GBP publish channel; `None` when no transport is configured.
    pub gbp: Option<Arc<GbpChannel>>,
}

impl PipelineContext {
    pub fn new(
        config: Arc<PipelineConfig>,
        storage: Arc<Storage>,
        generator: Arc<dyn DraftGenerator>,
        recheck_store: Arc<dyn RecheckStore>,
        engines: Arc<EngineRouter>,
        gbp_transport: Option<Arc<dyn GbpTransport>>,
    ) -> Self {
        let gbp = gbp_transport
            .map(|transport| Arc::new(GbpChannel::new(storage.clone(), transport, &config)));
        Self {
            storage,
            generator,
            recheck: Arc::new(RecheckScheduler::new(recheck_store)),
            engines,
            gbp,
            config,
        }
    }

    /// Context with the reqwest-backed GBP transport, when the config
    /// carries Google OAuth credentials.
    pub fn with_http_gbp(
        config: Arc<PipelineConfig>,
        storage: Arc<Storage>,
        generator: Arc<dyn DraftGenerator>,
        recheck_store: Arc<dyn RecheckStore>,
        engines: Arc<EngineRouter>,
    ) -> Self {
        let transport: Option<Arc<dyn GbpTransport>> = config
            .gbp_configured()
            .then(|| Arc::new(HttpGbpTransport::new(&config)) as Arc<dyn GbpTransport>);
        Self::new(config, storage, generator, recheck_store, engines, transport)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Shared fixtures for module tests.

    use std::sync::Arc;

    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::Utc;

    use crate::autopilot::DraftGenerator;
    use crate::config::PipelineConfig;
    use crate::model::{ContentDraft, ContentType, DraftStatus, TriggerType};
    use crate::recheck::InMemoryRecheckStore;
    use crate::storage::Storage;
    use crate::verifier::EngineRouter;
    use crate::PipelineContext;

    pub struct StaticGenerator(pub &'static str);

    #[async_trait]
    impl DraftGenerator for StaticGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    /// Context over a throwaway database, a fixed generator, an in-memory
    /// recheck store, no engines, and no GBP transport.
    pub async fn test_context() -> (tempfile::TempDir, PipelineContext) {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = Arc::new(Storage::new(dir.path()).await.expect("storage"));
        let ctx = PipelineContext::new(
            Arc::new(PipelineConfig::default()),
            storage,
            Arc::new(StaticGenerator("Generated content.")),
            Arc::new(InMemoryRecheckStore::new()),
            Arc::new(EngineRouter::new()),
            None,
        );
        (dir, ctx)
    }

    pub async fn seed_org(ctx: &PipelineContext, id: &str, plan: &str) {
        sqlx::query("INSERT INTO orgs (id, name, plan, created_at) VALUES (?, ?, ?, ?)")
            .bind(id)
            .bind(format!("Org {id}"))
            .bind(plan)
            .bind(Utc::now().to_rfc3339())
            .execute(ctx.storage.pool())
            .await
            .expect("seed org");
    }

    pub async fn seed_location(ctx: &PipelineContext, id: &str, org_id: &str) {
        sqlx::query(
            "INSERT INTO locations \
                 (id, org_id, name, address, phone, website_url, target_query, archived, created_at) \
             VALUES (?, ?, ?, '101 Peach St', '404-555-0100', 'https://acmebbq.example', \
                     'best bbq in midtown', 0, ?)",
        )
        .bind(id)
        .bind(org_id)
        .bind(format!("Location {id}"))
        .bind(Utc::now().to_rfc3339())
        .execute(ctx.storage.pool())
        .await
        .expect("seed location");
    }

    pub fn draft(id: &str, org_id: &str, location_id: &str, status: DraftStatus) -> ContentDraft {
        ContentDraft {
            id: id.into(),
            org_id: org_id.into(),
            location_id: Some(location_id.into()),
            trigger_type: TriggerType::ReviewGap,
            trigger_id: Some(format!("trigger-{id}")),
            title: "Seeded draft".into(),
            content: "Q: Hours?\nA: 11am to 9pm daily.".into(),
            content_type: ContentType::FaqPage,
            status,
            human_approved: status == DraftStatus::Approved,
            created_at: Utc::now(),
            published_at: None,
            published_url: None,
        }
    }

    pub async fn seed_draft(
        ctx: &PipelineContext,
        id: &str,
        org_id: &str,
        location_id: &str,
        status: DraftStatus,
    ) {
        ctx.storage
            .insert_draft(&draft(id, org_id, location_id, status))
            .await
            .expect("seed draft");
    }
}
