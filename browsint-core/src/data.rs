use browsint_scanner::RobotsRule;
use rusqlite::{Connection, OptionalExtension, Result, Transaction, params};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

/// SQLite store for the site graph.
pub struct Database {
    conn: Connection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebsiteRecord {
    pub id: i64,
    pub domain: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    pub id: i64,
    pub website_id: i64,
    pub url: String,
    pub title: Option<String>,
    pub status_code: Option<u16>,
    pub content_length: Option<i64>,
    pub content_type: Option<String>,
    pub last_checked: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub id: i64,
    pub page_id: i64,
    pub href: String,
    pub anchor_text: Option<String>,
    pub is_internal: bool,
    pub is_followed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaRecord {
    pub name: String,
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotsRecord {
    pub id: i64,
    pub website_id: i64,
    pub content: Option<String>,
    pub crawl_delay: Option<f64>,
    pub rules: Vec<RobotsRule>,
    pub sitemaps: Vec<String>,
}

pub(crate) fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

const PAGE_COLUMNS: &str = "id, website_id, url, title, status_code, content_length, content_type, \
                            last_checked, created_at, updated_at";

fn page_from_row(row: &rusqlite::Row<'_>) -> Result<PageRecord> {
    Ok(PageRecord {
        id: row.get(0)?,
        website_id: row.get(1)?,
        url: row.get(2)?,
        title: row.get(3)?,
        status_code: row.get(4)?,
        content_length: row.get(5)?,
        content_type: row.get(6)?,
        last_checked: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

impl Database {
    pub fn drop(path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            ",
        )?;

        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
CREATE TABLE IF NOT EXISTS websites (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    domain TEXT NOT NULL UNIQUE,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    website_id INTEGER NOT NULL,
    url TEXT NOT NULL,
    title TEXT,
    status_code INTEGER,
    content_length INTEGER,
    content_type TEXT,
    last_checked INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    FOREIGN KEY(website_id) REFERENCES websites(id) ON DELETE CASCADE,
    UNIQUE(website_id, url)
);

CREATE INDEX IF NOT EXISTS idx_pages_website ON pages(website_id);

CREATE TABLE IF NOT EXISTS links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    page_id INTEGER NOT NULL,
    href TEXT NOT NULL,
    anchor_text TEXT,
    is_internal BOOLEAN NOT NULL DEFAULT 1,
    is_followed BOOLEAN NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL,
    FOREIGN KEY(page_id) REFERENCES pages(id) ON DELETE CASCADE,
    UNIQUE(page_id, href)
);

CREATE TABLE IF NOT EXISTS meta_data (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    page_id INTEGER NOT NULL,
    meta_name TEXT NOT NULL,
    meta_content TEXT,
    created_at INTEGER NOT NULL,
    FOREIGN KEY(page_id) REFERENCES pages(id) ON DELETE CASCADE,
    UNIQUE(page_id, meta_name)
);

CREATE TABLE IF NOT EXISTS robots_txt (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    website_id INTEGER NOT NULL,
    content TEXT,
    crawl_delay REAL,
    last_checked INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    FOREIGN KEY(website_id) REFERENCES websites(id) ON DELETE CASCADE,
    UNIQUE(website_id)
);

CREATE TABLE IF NOT EXISTS robots_rules (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    robots_txt_id INTEGER NOT NULL,
    path TEXT NOT NULL,
    allow BOOLEAN NOT NULL DEFAULT 0,
    is_sensitive BOOLEAN NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    FOREIGN KEY(robots_txt_id) REFERENCES robots_txt(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS robots_sitemaps (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    robots_txt_id INTEGER NOT NULL,
    url TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    FOREIGN KEY(robots_txt_id) REFERENCES robots_txt(id) ON DELETE CASCADE,
    UNIQUE(robots_txt_id, url)
);
            ",
        )?;
        Ok(())
    }

    /// Run `f` in one transaction: commit on `Ok`, roll back on `Err`.
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let tx = self.conn.unchecked_transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    // Read side
    pub fn get_website(&self, domain: &str) -> Result<Option<WebsiteRecord>> {
        self.conn
            .query_row(
                "SELECT id, domain, created_at, updated_at FROM websites WHERE domain = ?1",
                params![domain],
                |row| {
                    Ok(WebsiteRecord {
                        id: row.get(0)?,
                        domain: row.get(1)?,
                        created_at: row.get(2)?,
                        updated_at: row.get(3)?,
                    })
                },
            )
            .optional()
    }

    pub fn get_page(&self, website_id: i64, url: &str) -> Result<Option<PageRecord>> {
        self.conn
            .query_row(
                &format!("SELECT {PAGE_COLUMNS} FROM pages WHERE website_id = ?1 AND url = ?2"),
                params![website_id, url],
                page_from_row,
            )
            .optional()
    }

    pub fn count_pages(&self, website_id: i64) -> Result<i64> {
        self.conn.query_row(
            "SELECT COUNT(*) FROM pages WHERE website_id = ?1",
            params![website_id],
            |row| row.get(0),
        )
    }

    pub fn get_links(&self, page_id: i64) -> Result<Vec<LinkRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, page_id, href, anchor_text, is_internal, is_followed
             FROM links WHERE page_id = ?1 ORDER BY id",
        )?;
        let links = stmt
            .query_map(params![page_id], |row| {
                Ok(LinkRecord {
                    id: row.get(0)?,
                    page_id: row.get(1)?,
                    href: row.get(2)?,
                    anchor_text: row.get(3)?,
                    is_internal: row.get(4)?,
                    is_followed: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(links)
    }

    pub fn get_metadata(&self, page_id: i64) -> Result<Vec<MetaRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT meta_name, meta_content FROM meta_data WHERE page_id = ?1 ORDER BY meta_name",
        )?;
        let entries = stmt
            .query_map(params![page_id], |row| {
                Ok(MetaRecord {
                    name: row.get(0)?,
                    content: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(entries)
    }

    pub fn get_robots(&self, website_id: i64) -> Result<Option<RobotsRecord>> {
        let header = self
            .conn
            .query_row(
                "SELECT id, content, crawl_delay FROM robots_txt WHERE website_id = ?1",
                params![website_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<f64>>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, content, crawl_delay)) = header else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            "SELECT path, allow, is_sensitive FROM robots_rules WHERE robots_txt_id = ?1 ORDER BY id",
        )?;
        let rules = stmt
            .query_map(params![id], |row| {
                Ok(RobotsRule {
                    path: row.get(0)?,
                    allow: row.get(1)?,
                    sensitive: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;

        let mut stmt = self
            .conn
            .prepare("SELECT url FROM robots_sitemaps WHERE robots_txt_id = ?1 ORDER BY id")?;
        let sitemaps = stmt
            .query_map(params![id], |row| row.get(0))?
            .collect::<Result<Vec<String>>>()?;

        Ok(Some(RobotsRecord {
            id,
            website_id,
            content,
            crawl_delay,
            rules,
            sitemaps,
        }))
    }

    pub fn get_connection(&self) -> &Connection {
        &self.conn
    }
}
