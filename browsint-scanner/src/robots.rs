//! robots.txt parsing, matching and the per-run gate built on top of it.

use crate::fetcher::Fetcher;
use crate::normalize::normalize;
use regex::{RegexSet, RegexSetBuilder};
use robotstxt::DefaultMatcher;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::OnceLock;
use tracing::{debug, info, warn};
use url::Url;

/// Longest politeness delay honored, in seconds. Larger values are capped.
pub const MAX_CRAWL_DELAY_SECS: f64 = 3600.0;

const SENSITIVE_PATTERNS: &[&str] = &[
    r"admin",
    r"backup",
    r"staging",
    r"dev",
    r"test",
    r"beta",
    r"wp-admin",
    r"administrator",
    r"login",
    r"user",
    r"console",
    r"dashboard",
    r"private",
    r"secret",
    r"internal",
    r"config",
    r"setup",
    r"install",
    r"phpmy",
    r"sql",
    r"database",
    r"db",
    r"temp",
    r"tmp",
    r"old",
    r"bak",
    r"\.git",
    r"\.svn",
    r"\.env",
    r"api/internal",
    r"api/private",
    r"api/v\d+/admin",
];

fn sensitive_set() -> &'static RegexSet {
    static SET: OnceLock<RegexSet> = OnceLock::new();
    SET.get_or_init(|| {
        RegexSetBuilder::new(SENSITIVE_PATTERNS)
            .case_insensitive(true)
            .build()
            .unwrap_or_else(|_| RegexSet::empty())
    })
}

/// Whether a robots path looks security relevant.
pub fn is_sensitive_path(path: &str) -> bool {
    sensitive_set().is_match(path)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotsRule {
    pub path: String,
    pub allow: bool,
    pub sensitive: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RobotsPolicy {
    pub rules: Vec<RobotsRule>,
    pub sitemaps: Vec<String>,
    pub sensitive_paths: BTreeSet<String>,
    pub crawl_delay: Option<f64>,
    /// robots.txt text handed to the matcher, with a `*` group opened for leading rules.
    #[serde(skip)]
    match_body: String,
}

/// Operator choice made before the crawl starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyDecision {
    #[default]
    Respect,
    Override,
}

impl RobotsPolicy {
    /// Parse robots.txt text, keeping the rules of the `*` group.
    ///
    /// Lines before the first `User-agent` count as part of the `*` group. Consecutive
    /// `User-agent` lines form one group. `Sitemap` lines apply regardless of group.
    pub fn parse(content: &str) -> Self {
        let mut policy = RobotsPolicy::default();
        let mut relevant = true;
        let mut last_was_agent = false;
        let mut seen_agent = false;
        let mut leading_rules = false;

        for raw_line in content.lines() {
            let line = match raw_line.find('#') {
                Some(idx) => &raw_line[..idx],
                None => raw_line,
            }
            .trim();
            if line.is_empty() {
                continue;
            }

            let Some((directive, value)) = line.split_once(':') else {
                debug!("Ignoring robots line without directive: {}", line);
                continue;
            };
            let directive = directive.trim().to_ascii_lowercase();
            let value = value.trim();

            if directive == "user-agent" {
                let is_wildcard = value == "*";
                relevant = if last_was_agent {
                    relevant || is_wildcard
                } else {
                    is_wildcard
                };
                last_was_agent = true;
                seen_agent = true;
                continue;
            }
            last_was_agent = false;

            match directive.as_str() {
                "sitemap" => {
                    if !value.is_empty() {
                        policy.sitemaps.push(value.to_string());
                    }
                }
                "allow" | "disallow" if relevant => {
                    if value.is_empty() {
                        continue;
                    }
                    leading_rules |= !seen_agent;
                    let sensitive = is_sensitive_path(value);
                    if sensitive {
                        policy.sensitive_paths.insert(value.to_string());
                    }
                    policy.rules.push(RobotsRule {
                        path: value.to_string(),
                        allow: directive == "allow",
                        sensitive,
                    });
                }
                "crawl-delay" if relevant => match value.parse::<f64>() {
                    Ok(delay) if delay.is_finite() && delay >= 0.0 => {
                        if delay > MAX_CRAWL_DELAY_SECS {
                            warn!(
                                "crawl-delay of {}s capped to {}s",
                                value, MAX_CRAWL_DELAY_SECS
                            );
                        }
                        policy.crawl_delay = Some(delay.min(MAX_CRAWL_DELAY_SECS));
                    }
                    _ => debug!("Ignoring invalid crawl-delay '{}'", value),
                },
                _ => {}
            }
        }

        policy.match_body = if leading_rules {
            format!("User-agent: *\n{}", content)
        } else {
            content.to_string()
        };
        policy
    }

    /// Whether the `*` group allows `url`.
    ///
    /// Longest matching rule wins, ties favor allow, no match allows. `*` and a trailing `$`
    /// are honored, and matching covers the path plus query string.
    pub fn is_allowed(&self, url: &str) -> bool {
        if self.rules.is_empty() {
            return true;
        }
        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.match_body, "*", url)
    }

    /// Normalized URLs for every disallowed path without wildcard characters.
    pub fn override_seeds(&self, origin: &str) -> Vec<String> {
        self.seed_urls(origin, |_| true)
    }

    /// The subset of [`RobotsPolicy::override_seeds`] whose rule is sensitive.
    pub fn sensitive_seeds(&self, origin: &str) -> Vec<String> {
        self.seed_urls(origin, |rule| rule.sensitive)
    }

    fn seed_urls(&self, origin: &str, keep: impl Fn(&RobotsRule) -> bool) -> Vec<String> {
        let mut seen = HashSet::new();
        self.rules
            .iter()
            .filter(|rule| !rule.allow && !rule.path.contains(['*', '?', '$']))
            .filter(|rule| keep(rule))
            .filter_map(|rule| normalize(&rule.path, origin))
            .filter(|url| seen.insert(url.clone()))
            .collect()
    }

    /// Fetch `/robots.txt` at the origin of `start_url`.
    ///
    /// Returns `None` when the file is unreachable, non-2xx or empty.
    pub async fn fetch(fetcher: &dyn Fetcher, start_url: &Url) -> Option<(RobotsPolicy, String)> {
        let robots_url = start_url.join("/robots.txt").ok()?;
        info!("Fetching robots.txt from {}", robots_url);

        let response = match fetcher.fetch_raw(robots_url.as_str()).await {
            Ok(response) => response,
            Err(e) => {
                warn!("robots.txt unavailable at {}: {}", robots_url, e);
                return None;
            }
        };

        if !(200..300).contains(&response.status_code) {
            info!(
                "robots.txt returned status {}, allowing all paths",
                response.status_code
            );
            return None;
        }

        let raw = String::from_utf8_lossy(&response.body).into_owned();
        if raw.trim().is_empty() {
            info!("robots.txt is empty, allowing all paths");
            return None;
        }

        let policy = RobotsPolicy::parse(&raw);
        info!(
            "Parsed robots.txt: {} rules, {} sitemaps, {} sensitive paths",
            policy.rules.len(),
            policy.sitemaps.len(),
            policy.sensitive_paths.len()
        );
        Some((policy, raw))
    }
}

/// Robots state for one run: the fetched policy (if any) and the operator decision.
#[derive(Debug, Clone, Default)]
pub struct RobotsGate {
    policy: Option<RobotsPolicy>,
    raw: Option<String>,
    decision: PolicyDecision,
}

impl RobotsGate {
    /// No robots.txt was found, everything is allowed.
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn new(policy: RobotsPolicy, raw: String, decision: PolicyDecision) -> Self {
        Self {
            policy: Some(policy),
            raw: Some(raw),
            decision,
        }
    }

    pub fn policy(&self) -> Option<&RobotsPolicy> {
        self.policy.as_ref()
    }

    pub fn raw_text(&self) -> Option<&str> {
        self.raw.as_deref()
    }

    pub fn decision(&self) -> PolicyDecision {
        self.decision
    }

    /// False only when a policy exists and the operator chose to override it.
    pub fn respects_robots(&self) -> bool {
        self.policy.is_none() || self.decision == PolicyDecision::Respect
    }

    /// Whether the crawl may fetch `url`.
    pub fn admits(&self, url: &str) -> bool {
        match (&self.policy, self.decision) {
            (Some(policy), PolicyDecision::Respect) => policy.is_allowed(url),
            _ => true,
        }
    }

    /// Whether the parsed policy would deny `url`, whatever the decision.
    pub fn restricts(&self, url: &str) -> bool {
        self.policy
            .as_ref()
            .is_some_and(|policy| !policy.is_allowed(url))
    }

    pub fn override_seeds(&self, origin: &str) -> Vec<String> {
        match (&self.policy, self.decision) {
            (Some(policy), PolicyDecision::Override) => policy.override_seeds(origin),
            _ => Vec::new(),
        }
    }

    pub fn sensitive_seeds(&self, origin: &str) -> Vec<String> {
        match (&self.policy, self.decision) {
            (Some(policy), PolicyDecision::Override) => policy.sensitive_seeds(origin),
            _ => Vec::new(),
        }
    }

    /// Politeness delay raised to the robots crawl-delay, never lowered.
    pub fn effective_delay(&self, requested: f64) -> f64 {
        match self.policy.as_ref().and_then(|p| p.crawl_delay) {
            Some(delay) if delay > requested => delay,
            _ => requested,
        }
    }
}
