//! Canonical URL form used as the deduplication key for a crawl run.

use percent_encoding::percent_decode_str;
use tracing::debug;
use url::{Position, Url};

/// Resolve `candidate` against `base` and reduce it to its canonical string.
///
/// The fragment is dropped, the result is percent-decoded and trailing slashes are
/// removed unless the path is the root. Returns `None` when either URL fails to parse.
pub fn normalize(candidate: &str, base: &str) -> Option<String> {
    let base_url = match Url::parse(base) {
        Ok(url) => url,
        Err(e) => {
            debug!("Cannot parse base URL '{}': {}", base, e);
            return None;
        }
    };

    let mut resolved = match base_url.join(candidate.trim()) {
        Ok(url) => url,
        Err(e) => {
            debug!("Cannot resolve '{}' against '{}': {}", candidate, base, e);
            return None;
        }
    };
    resolved.set_fragment(None);

    let mut canonical = decode(resolved.as_str());
    if canonical.ends_with('/') && resolved.path() != "/" {
        let prefix = decode(&resolved[..Position::BeforePath]);
        let trimmed = canonical.trim_end_matches('/');
        canonical = if trimmed.len() <= prefix.len() {
            format!("{}/", prefix)
        } else {
            trimmed.to_string()
        };
    }

    Some(canonical)
}

/// Host of `url`, if it parses and has one.
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
}

/// Exact host comparison, no subdomain folding.
pub fn is_internal(url: &str, base_domain: &str) -> bool {
    host_of(url).is_some_and(|host| host == base_domain)
}

fn decode(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}
