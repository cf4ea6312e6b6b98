//! SQLite persistence for the autopilot pipeline.
//!
//! Thin query wrappers over the product's relational store. The pipeline
//! owns draft lifecycle writes; the signal tables (`visibility_gaps`,
//! `tracked_prompts`, `review_insights`, `site_audits`) are read-only here
//! and populated by the analysis side of the product.

use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteConnectOptions, SqlitePool};

use crate::model::{ContentDraft, ContentType, DraftStatus, PlanTier, TriggerType};

// ─── Rows ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrgRow {
    pub id: String,
    pub name: String,
    pub plan: String,
    pub created_at: String,
}

impl OrgRow {
    pub fn plan_tier(&self) -> PlanTier {
        PlanTier::parse_or_trial(&self.plan)
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LocationRow {
    pub id: String,
    pub org_id: String,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub website_url: Option<String>,
    /// GBP API location resource name (e.g. `accounts/1/locations/2`).
    pub gbp_location_ref: Option<String>,
    /// The AI-engine query whose ranking motivated tracking this location.
    pub target_query: Option<String>,
    pub archived: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DraftRow {
    pub id: String,
    pub org_id: String,
    pub location_id: Option<String>,
    pub trigger_type: String,
    pub trigger_id: Option<String>,
    pub title: String,
    pub content: String,
    pub content_type: String,
    pub status: String,
    pub human_approved: bool,
    pub created_at: String,
    pub published_at: Option<String>,
    pub published_url: Option<String>,
}

impl TryFrom<DraftRow> for ContentDraft {
    type Error = anyhow::Error;

    fn try_from(r: DraftRow) -> Result<Self> {
        Ok(ContentDraft {
            trigger_type: TriggerType::parse(&r.trigger_type)
                .with_context(|| format!("unknown trigger_type {:?}", r.trigger_type))?,
            content_type: ContentType::parse(&r.content_type)
                .with_context(|| format!("unknown content_type {:?}", r.content_type))?,
            status: DraftStatus::parse(&r.status)
                .with_context(|| format!("unknown draft status {:?}", r.status))?,
            created_at: parse_ts(&r.created_at)?,
            published_at: r.published_at.as_deref().map(parse_ts).transpose()?,
            id: r.id,
            org_id: r.org_id,
            location_id: r.location_id,
            trigger_id: r.trigger_id,
            title: r.title,
            content: r.content,
            human_approved: r.human_approved,
            published_url: r.published_url,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OauthConnectionRow {
    pub id: String,
    pub org_id: String,
    pub provider: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: String,
    pub updated_at: String,
}

impl OauthConnectionRow {
    /// Whether the stored access token has passed its expiry timestamp.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match parse_ts(&self.expires_at) {
            Ok(at) => at <= now,
            // Unparseable expiry counts as expired so the token gets refreshed.
            Err(_) => true,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct HallucinationAlertRow {
    pub id: String,
    pub org_id: String,
    pub location_id: Option<String>,
    pub provider: String,
    pub query: String,
    pub claim_text: String,
    pub status: String,
    pub created_at: String,
    pub last_checked_at: Option<String>,
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("bad timestamp {s:?}"))?
        .with_timezone(&Utc))
}

// ─── Storage ──────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;
        let db_path = data_dir.join("geopilot.db");
        let opts =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))?
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .create_if_missing(true);

        let pool = SqlitePool::connect_with(opts).await?;
        sqlx::migrate!("src/storage/migrations")
            .run(&pool)
            .await
            .context("failed to run database migrations")?;
        Ok(Self { pool })
    }

    /// Return a clone of the connection pool (cheap — Arc-backed).
    /// Detector queries run directly against the pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ─── Orgs & locations ─────────────────────────────────────────────────

    pub async fn get_org(&self, org_id: &str) -> Result<Option<OrgRow>> {
        Ok(sqlx::query_as("SELECT * FROM orgs WHERE id = ?")
            .bind(org_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// All orgs whose plan tier is in `tiers`, ordered by creation time.
    /// Used by the multi-org sweep to skip non-autopilot tiers up front.
    pub async fn orgs_on_tiers(&self, tiers: &[PlanTier]) -> Result<Vec<OrgRow>> {
        if tiers.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; tiers.len()].join(", ");
        let sql = format!(
            "SELECT * FROM orgs WHERE plan IN ({placeholders}) ORDER BY created_at ASC"
        );
        let mut query = sqlx::query_as(&sql);
        for tier in tiers {
            query = query.bind(tier.as_str());
        }
        Ok(query.fetch_all(&self.pool).await?)
    }

    pub async fn active_locations(&self, org_id: &str) -> Result<Vec<LocationRow>> {
        Ok(sqlx::query_as(
            "SELECT * FROM locations WHERE org_id = ? AND archived = 0 ORDER BY created_at ASC",
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn get_location(&self, location_id: &str) -> Result<Option<LocationRow>> {
        Ok(sqlx::query_as("SELECT * FROM locations WHERE id = ?")
            .bind(location_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    // ─── Drafts ───────────────────────────────────────────────────────────

    pub async fn insert_draft(&self, draft: &ContentDraft) -> Result<()> {
        sqlx::query(
            "INSERT INTO content_drafts \
                 (id, org_id, location_id, trigger_type, trigger_id, title, content, \
                  content_type, status, human_approved, created_at, published_at, published_url) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&draft.id)
        .bind(&draft.org_id)
        .bind(&draft.location_id)
        .bind(draft.trigger_type.as_str())
        .bind(&draft.trigger_id)
        .bind(&draft.title)
        .bind(&draft.content)
        .bind(draft.content_type.as_str())
        .bind(draft.status.as_str())
        .bind(draft.human_approved)
        .bind(draft.created_at.to_rfc3339())
        .bind(draft.published_at.map(|t| t.to_rfc3339()))
        .bind(&draft.published_url)
        .execute(&self.pool)
        .await
        .context("insert content_drafts")?;
        Ok(())
    }

    pub async fn get_draft(&self, draft_id: &str) -> Result<Option<ContentDraft>> {
        let row: Option<DraftRow> = sqlx::query_as("SELECT * FROM content_drafts WHERE id = ?")
            .bind(draft_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(ContentDraft::try_from).transpose()
    }

    /// `"{trigger_type}:{trigger_id}"` keys of all non-archived drafts for a
    /// location. The deduplicator filters new candidates against this set.
    pub async fn existing_draft_keys(
        &self,
        org_id: &str,
        location_id: &str,
    ) -> Result<HashSet<String>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT trigger_type, trigger_id FROM content_drafts \
             WHERE org_id = ? AND location_id = ? \
               AND trigger_id IS NOT NULL AND status != 'archived'",
        )
        .bind(org_id)
        .bind(location_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(t, i)| format!("{t}:{i}")).collect())
    }

    /// Drafts created for a location at or after `since` (RFC 3339 strings
    /// compare lexicographically, so a plain `>=` works).
    pub async fn count_drafts_since(
        &self,
        org_id: &str,
        location_id: &str,
        since: DateTime<Utc>,
    ) -> Result<u32> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM content_drafts \
             WHERE org_id = ? AND location_id = ? AND created_at >= ?",
        )
        .bind(org_id)
        .bind(location_id)
        .bind(since.to_rfc3339())
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u32)
    }

    /// Guarded status transition: only applies when the stored status still
    /// matches `from`. Returns `false` when the draft moved underneath us.
    pub async fn update_draft_status(
        &self,
        draft_id: &str,
        from: DraftStatus,
        to: DraftStatus,
        set_human_approved: bool,
    ) -> Result<bool> {
        let result = if set_human_approved {
            sqlx::query(
                "UPDATE content_drafts SET status = ?, human_approved = 1 \
                 WHERE id = ? AND status = ?",
            )
            .bind(to.as_str())
            .bind(draft_id)
            .bind(from.as_str())
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query("UPDATE content_drafts SET status = ? WHERE id = ? AND status = ?")
                .bind(to.as_str())
                .bind(draft_id)
                .bind(from.as_str())
                .execute(&self.pool)
                .await?
        };
        Ok(result.rows_affected() > 0)
    }

    /// Record a successful publish. Guarded on `approved` so a concurrent
    /// archive cannot be clobbered.
    pub async fn mark_published(
        &self,
        draft_id: &str,
        published_url: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE content_drafts \
             SET status = 'published', published_at = ?, published_url = ? \
             WHERE id = ? AND status = 'approved'",
        )
        .bind(at.to_rfc3339())
        .bind(published_url)
        .bind(draft_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ─── OAuth connections ────────────────────────────────────────────────

    pub async fn oauth_connection(
        &self,
        org_id: &str,
        provider: &str,
    ) -> Result<Option<OauthConnectionRow>> {
        Ok(sqlx::query_as(
            "SELECT * FROM oauth_connections WHERE org_id = ? AND provider = ?",
        )
        .bind(org_id)
        .bind(provider)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn update_oauth_token(
        &self,
        connection_id: &str,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE oauth_connections \
             SET access_token = ?, expires_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(access_token)
        .bind(expires_at.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .bind(connection_id)
        .execute(&self.pool)
        .await
        .context("update oauth_connections")?;
        Ok(())
    }

    // ─── Hallucination alerts ─────────────────────────────────────────────

    pub async fn get_alert(&self, alert_id: &str) -> Result<Option<HallucinationAlertRow>> {
        Ok(
            sqlx::query_as("SELECT * FROM hallucination_alerts WHERE id = ?")
                .bind(alert_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn set_alert_status(
        &self,
        alert_id: &str,
        status: &str,
        checked_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE hallucination_alerts SET status = ?, last_checked_at = ? WHERE id = ?",
        )
        .bind(status)
        .bind(checked_at.to_rfc3339())
        .bind(alert_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
