// SPDX-License-Identifier: MIT
//! Download channel — self-contained HTML artifact with structured data.
//!
//! Produces a page the owner uploads to their own site: draft body plus
//! `LocalBusiness` JSON-LD (and `FAQPage` JSON-LD when the body carries
//! `Q:`/`A:` pairs) injected into the head. No live URL — the payload is
//! returned base64-encoded for the dashboard to offer as a download.

use std::sync::OnceLock;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::{json, Value};

use crate::model::{ContentDraft, PublishResult, PublishStatus};
use crate::storage::LocationRow;

use super::{PublishChannel, PublishError};

static RE_FAQ_PAIR: OnceLock<regex::Regex> = OnceLock::new();

fn re_faq_pair() -> &'static regex::Regex {
    RE_FAQ_PAIR.get_or_init(|| {
        regex::Regex::new(r"(?m)^\s*Q:\s*(.+?)\s*\r?\n\s*A:\s*(.+?)\s*$").expect("faq pair regex")
    })
}

pub struct DownloadChannel;

#[async_trait]
impl PublishChannel for DownloadChannel {
    fn name(&self) -> &'static str {
        "download"
    }

    async fn publish(
        &self,
        draft: &ContentDraft,
        location: &LocationRow,
    ) -> Result<PublishResult, PublishError> {
        let html = build_artifact(draft, location);
        Ok(PublishResult {
            published_url: None,
            status: PublishStatus::Published,
            download_payload: Some(BASE64.encode(html.as_bytes())),
        })
    }
}

/// `LocalBusiness` JSON-LD from location fields. Absent fields are omitted
/// entirely, not serialized as null.
pub fn local_business_jsonld(location: &LocationRow) -> Value {
    let mut obj = json!({
        "@context": "https://schema.org",
        "@type": "LocalBusiness",
        "name": location.name,
    });
    if let Some(address) = &location.address {
        obj["address"] = json!({
            "@type": "PostalAddress",
            "streetAddress": address,
        });
    }
    if let Some(phone) = &location.phone {
        obj["telephone"] = json!(phone);
    }
    if let Some(url) = &location.website_url {
        obj["url"] = json!(url);
    }
    obj
}

/// `FAQPage` JSON-LD from `Q:`/`A:` pairs in the draft body, or `None` when
/// the body carries no pairs.
pub fn faq_jsonld(content: &str) -> Option<Value> {
    let pairs: Vec<(String, String)> = re_faq_pair()
        .captures_iter(content)
        .map(|c| (c[1].trim().to_string(), c[2].trim().to_string()))
        .collect();
    if pairs.is_empty() {
        return None;
    }

    let entities: Vec<Value> = pairs
        .into_iter()
        .map(|(q, a)| {
            json!({
                "@type": "Question",
                "name": q,
                "acceptedAnswer": { "@type": "Answer", "text": a },
            })
        })
        .collect();

    Some(json!({
        "@context": "https://schema.org",
        "@type": "FAQPage",
        "mainEntity": entities,
    }))
}

/// Escape user text for embedding in HTML element content or attributes.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Serialize a JSON-LD value for a `<script>` block. `</` is escaped so
/// user text cannot terminate the script element early.
fn jsonld_script(value: &Value) -> String {
    let body = serde_json::to_string(value)
        .unwrap_or_else(|_| "{}".to_string())
        .replace("</", "<\\/");
    format!("<script type=\"application/ld+json\">{body}</script>")
}

fn build_artifact(draft: &ContentDraft, location: &LocationRow) -> String {
    let title = escape_html(&draft.title);

    let mut head_scripts = jsonld_script(&local_business_jsonld(location));
    if let Some(faq) = faq_jsonld(&draft.content) {
        head_scripts.push('\n');
        head_scripts.push_str(&jsonld_script(&faq));
    }

    let body: String = draft
        .content
        .split("\n\n")
        .filter(|p| !p.trim().is_empty())
        .map(|p| format!("<p>{}</p>\n", escape_html(p.trim())))
        .collect();

    format!(
        "<!doctype html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{title}</title>\n{head_scripts}\n</head>\n<body>\n\
         <article>\n<h1>{title}</h1>\n{body}</article>\n</body>\n</html>\n"
    )
}
