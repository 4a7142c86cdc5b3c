//! Writes crawl observations into the site graph. Every call is one transaction and
//! is idempotent on the table's unique key.

use crate::data::{Database, current_timestamp};
use browsint_scanner::RobotsPolicy;
use rusqlite::{OptionalExtension, Result, params};
use std::collections::BTreeMap;
use tracing::debug;

pub struct SiteGraphWriter<'a> {
    db: &'a Database,
}

impl<'a> SiteGraphWriter<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn ensure_website(&self, domain: &str) -> Result<i64> {
        let now = current_timestamp();
        self.db.transaction(|tx| {
            tx.execute(
                "INSERT INTO websites (domain, created_at, updated_at) VALUES (?1, ?2, ?2)
                 ON CONFLICT(domain) DO NOTHING",
                params![domain, now],
            )?;
            tx.query_row(
                "SELECT id FROM websites WHERE domain = ?1",
                params![domain],
                |row| row.get(0),
            )
        })
    }

    /// Insert the page, or refresh status, length, content type and timestamps if it exists.
    pub fn upsert_page(
        &self,
        website_id: i64,
        url: &str,
        title: Option<&str>,
        status_code: u16,
        content_length: usize,
        content_type: Option<&str>,
    ) -> Result<i64> {
        let now = current_timestamp();
        let length = i64::try_from(content_length).unwrap_or(i64::MAX);

        self.db.transaction(|tx| {
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM pages WHERE website_id = ?1 AND url = ?2",
                    params![website_id, url],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(page_id) = existing {
                tx.execute(
                    "UPDATE pages SET status_code = ?1, content_length = ?2, content_type = ?3,
                         title = COALESCE(title, ?4), last_checked = ?5, updated_at = ?5
                     WHERE id = ?6",
                    params![status_code, length, content_type, title, now, page_id],
                )?;
                debug!("Updated page {} ({})", page_id, url);
                return Ok(page_id);
            }

            tx.execute(
                "INSERT INTO pages (website_id, url, title, status_code, content_length, content_type,
                                    last_checked, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, ?7)",
                params![website_id, url, title, status_code, length, content_type, now],
            )?;
            Ok(tx.last_insert_rowid())
        })
    }

    /// Returns false when the `(page_id, href)` pair already exists.
    pub fn insert_link(
        &self,
        page_id: i64,
        href: &str,
        anchor_text: &str,
        is_internal: bool,
    ) -> Result<bool> {
        let now = current_timestamp();
        let anchor = (!anchor_text.is_empty()).then_some(anchor_text);
        self.db.transaction(|tx| {
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO links (page_id, href, anchor_text, is_internal, is_followed, created_at)
                 VALUES (?1, ?2, ?3, ?4, 1, ?5)",
                params![page_id, href, anchor, is_internal, now],
            )?;
            Ok(inserted > 0)
        })
    }

    /// Stores each entry once per page. Non-string values are stored as JSON text.
    pub fn insert_metadata(
        &self,
        page_id: i64,
        metadata: &BTreeMap<String, serde_json::Value>,
    ) -> Result<usize> {
        if metadata.is_empty() {
            return Ok(0);
        }
        let now = current_timestamp();
        self.db.transaction(|tx| {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO meta_data (page_id, meta_name, meta_content, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            let mut inserted = 0;
            for (name, value) in metadata {
                let content = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                inserted += stmt.execute(params![page_id, name, content, now])?;
            }
            Ok(inserted)
        })
    }

    /// Replace the website's robots record, its rules and sitemaps.
    pub fn save_robots(&self, website_id: i64, policy: &RobotsPolicy, raw: &str) -> Result<i64> {
        let now = current_timestamp();
        self.db.transaction(|tx| {
            tx.execute(
                "DELETE FROM robots_txt WHERE website_id = ?1",
                params![website_id],
            )?;
            tx.execute(
                "INSERT INTO robots_txt (website_id, content, crawl_delay, last_checked, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4, ?4)",
                params![website_id, raw, policy.crawl_delay, now],
            )?;
            let robots_id = tx.last_insert_rowid();

            let mut rule_stmt = tx.prepare(
                "INSERT INTO robots_rules (robots_txt_id, path, allow, is_sensitive, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for rule in &policy.rules {
                rule_stmt.execute(params![robots_id, rule.path, rule.allow, rule.sensitive, now])?;
            }

            let mut sitemap_stmt = tx.prepare(
                "INSERT OR IGNORE INTO robots_sitemaps (robots_txt_id, url, created_at) VALUES (?1, ?2, ?3)",
            )?;
            for sitemap in &policy.sitemaps {
                sitemap_stmt.execute(params![robots_id, sitemap, now])?;
            }

            debug!(
                "Saved robots.txt for website {}: {} rules, {} sitemaps",
                website_id,
                policy.rules.len(),
                policy.sitemaps.len()
            );
            Ok(robots_id)
        })
    }
}
