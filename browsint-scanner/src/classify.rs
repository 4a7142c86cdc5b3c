//! Maps fetched content to its place in a run's download directory.

use chrono::{DateTime, Local};
use percent_encoding::percent_decode_str;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use url::Url;

const IMAGE_TOKENS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "svg", "webp", "ico"];
const DOCUMENT_TOKENS: &[&str] = &[
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "txt", "rtf", "csv", "xml", "json",
];
const MAX_FILENAME_CHARS: usize = 100;
const INDEX_FILE: &str = "index.html";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentBucket {
    Html,
    Images,
    Documents,
    Other,
}

impl ContentBucket {
    pub const ALL: [ContentBucket; 4] = [
        ContentBucket::Html,
        ContentBucket::Images,
        ContentBucket::Documents,
        ContentBucket::Other,
    ];

    pub fn from_content_type(content_type: &str) -> Self {
        let ct = content_type.to_ascii_lowercase();
        if ct.is_empty() || ct.contains("html") {
            ContentBucket::Html
        } else if IMAGE_TOKENS.iter().any(|t| ct.contains(t)) {
            ContentBucket::Images
        } else if DOCUMENT_TOKENS.iter().any(|t| ct.contains(t)) {
            ContentBucket::Documents
        } else {
            ContentBucket::Other
        }
    }

    pub fn dir_name(self) -> &'static str {
        match self {
            ContentBucket::Html => "html",
            ContentBucket::Images => "images",
            ContentBucket::Documents => "documents",
            ContentBucket::Other => "other",
        }
    }

    fn tokens(self) -> &'static [&'static str] {
        match self {
            ContentBucket::Images => IMAGE_TOKENS,
            ContentBucket::Documents => DOCUMENT_TOKENS,
            ContentBucket::Html | ContentBucket::Other => &[],
        }
    }

    fn extension_for(self, content_type: &str) -> &'static str {
        let ct = content_type.to_ascii_lowercase();
        if ct.contains("html") {
            return "html";
        }
        let mut best: Option<&'static str> = None;
        for &token in self.tokens() {
            if ct.contains(token) && best.is_none_or(|b| token.len() > b.len()) {
                best = Some(token);
            }
        }
        best.unwrap_or("html")
    }
}

/// Relative directory (bucket plus URL path) and sanitized filename for a fetched URL.
pub fn classify_and_path(url: &str, content_type: &str) -> (PathBuf, String) {
    let bucket = ContentBucket::from_content_type(content_type);
    let mut dir = PathBuf::from(bucket.dir_name());

    let segments: Vec<String> = Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .map(|s| s.map(|seg| percent_decode_str(seg).decode_utf8_lossy().into_owned()).collect())
        })
        .unwrap_or_default();

    let Some((last, parents)) = segments.split_last() else {
        return (dir, INDEX_FILE.to_string());
    };

    for segment in parents.iter().filter(|s| !s.is_empty()) {
        dir.push(sanitize(segment));
    }

    let file_name = if last.is_empty() {
        INDEX_FILE.to_string()
    } else if last.contains('.') {
        last.clone()
    } else {
        format!("{}.{}", last, bucket.extension_for(content_type))
    };

    (dir, sanitize(&file_name))
}

/// Keep alphanumerics, `.`, `-` and `_`; everything else becomes `_`. At most 100 characters.
pub fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILENAME_CHARS)
        .collect();

    if cleaned.chars().all(|c| c == '.') {
        "_".repeat(cleaned.chars().count().max(1))
    } else {
        cleaned
    }
}

/// Create `{domain}_{YYYYmmdd_HHMMSS}` with its bucket subdirectories under `root`,
/// then point `{domain}_latest` at it.
pub fn create_run_directory(root: &Path, domain: &str, now: DateTime<Local>) -> io::Result<PathBuf> {
    let clean_domain = domain.strip_prefix("www.").unwrap_or(domain);
    let run_dir = root.join(format!("{}_{}", clean_domain, now.format("%Y%m%d_%H%M%S")));

    fs::create_dir_all(&run_dir)?;
    for bucket in ContentBucket::ALL {
        fs::create_dir_all(run_dir.join(bucket.dir_name()))?;
    }
    info!("Created site directory structure at {}", run_dir.display());

    let latest = root.join(format!("{}_latest", clean_domain));
    if let Err(e) = relink(&latest, &run_dir) {
        warn!("Could not update {}: {}", latest.display(), e);
    }

    Ok(run_dir)
}

#[cfg(unix)]
fn relink(link: &Path, target: &Path) -> io::Result<()> {
    if let Ok(meta) = fs::symlink_metadata(link) {
        if meta.file_type().is_symlink() {
            fs::remove_file(link)?;
        } else {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "exists and is not a symlink",
            ));
        }
    }
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn relink(_link: &Path, _target: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "symlinks not supported on this platform",
    ))
}
