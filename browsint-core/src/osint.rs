//! OSINT profiling seam used by survey crawls, and the public-profile prober shipped with it.

use async_trait::async_trait;
use browsint_scanner::PageTechnologies;
use browsint_scanner::fetcher::{DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT};
use browsint_scanner::tech;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

const BRAND_SUFFIXES: &[&str] = &[
    ".com", ".it", ".org", ".net", ".edu", ".gov", ".io", ".co.uk", ".eu", ".info", ".biz",
];

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Profile request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Invalid profile target: {0}")]
    InvalidTarget(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialProfile {
    pub platform: String,
    pub url: String,
    pub username: String,
    pub confidence: f64,
}

/// Enrichment lookups invoked by the crawl engine in survey mode.
#[async_trait]
pub trait OsintProfiler: Send + Sync {
    async fn profile_email(&self, email: &str) -> Result<serde_json::Value, ProfileError>;
    async fn profile_username(&self, username: &str) -> Result<serde_json::Value, ProfileError>;
    async fn profile_domain(&self, domain: &str) -> Result<serde_json::Value, ProfileError>;
    async fn find_brand_profiles(&self, brand: &str) -> Result<Vec<SocialProfile>, ProfileError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity_type", rename_all = "snake_case")]
pub enum ProfiledEntity {
    Email {
        page_url: String,
        entity: String,
        profile_details: serde_json::Value,
    },
    #[serde(rename = "phone_numbers_found")]
    PhoneNumbers {
        page_url: String,
        entity: Vec<String>,
    },
    SocialProfile {
        page_url: String,
        entity: String,
        profile_details: SocialProfile,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OsintSummary {
    pub entities_profiled: Vec<ProfiledEntity>,
    pub page_technologies: BTreeMap<String, PageTechnologies>,
}

impl OsintSummary {
    pub fn emails(&self) -> impl Iterator<Item = &str> {
        self.entities_profiled.iter().filter_map(|e| match e {
            ProfiledEntity::Email { entity, .. } => Some(entity.as_str()),
            _ => None,
        })
    }

    pub fn social_profiles(&self) -> impl Iterator<Item = &SocialProfile> {
        self.entities_profiled.iter().filter_map(|e| match e {
            ProfiledEntity::SocialProfile {
                profile_details, ..
            } => Some(profile_details),
            _ => None,
        })
    }
}

/// Brand handle derived from a domain: lowercase, no `www.`, first known suffix removed,
/// first remaining label.
pub fn brand_name(domain: &str) -> String {
    let lower = domain.to_lowercase();
    let mut brand = lower.replace("www.", "");
    if let Some(suffix) = BRAND_SUFFIXES.iter().find(|s| brand.ends_with(*s)) {
        brand.truncate(brand.len() - suffix.len());
    }
    brand.split('.').next().unwrap_or_default().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub name: String,
    /// Profile URL with `{}` in place of the username.
    pub url_template: String,
}

impl Platform {
    pub fn new(name: impl Into<String>, url_template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url_template: url_template.into(),
        }
    }

    fn profile_url(&self, username: &str) -> String {
        self.url_template.replace("{}", username)
    }
}

pub fn default_platforms() -> Vec<Platform> {
    vec![
        Platform::new("GitHub", "https://github.com/{}"),
        Platform::new("GitLab", "https://gitlab.com/{}"),
        Platform::new("Reddit", "https://www.reddit.com/user/{}"),
        Platform::new("Instagram", "https://www.instagram.com/{}/"),
        Platform::new("X", "https://x.com/{}"),
        Platform::new("Facebook", "https://www.facebook.com/{}"),
        Platform::new("LinkedIn", "https://www.linkedin.com/company/{}"),
        Platform::new("YouTube", "https://www.youtube.com/@{}"),
        Platform::new("TikTok", "https://www.tiktok.com/@{}"),
        Platform::new("Medium", "https://medium.com/@{}"),
    ]
}

/// Checks public profile URLs for a username. A 2xx answer counts as a hit.
pub struct PlatformProbe {
    client: Client,
    platforms: Vec<Platform>,
    domain_template: String,
}

impl PlatformProbe {
    pub fn new() -> Result<Self, ProfileError> {
        Self::with_options(DEFAULT_USER_AGENT, DEFAULT_TIMEOUT_SECS)
    }

    pub fn with_options(user_agent: &str, timeout_secs: u64) -> Result<Self, ProfileError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self {
            client,
            platforms: default_platforms(),
            domain_template: "https://{}/".to_string(),
        })
    }

    pub fn with_platforms(mut self, platforms: Vec<Platform>) -> Self {
        self.platforms = platforms;
        self
    }

    /// URL used by `profile_domain`, with `{}` in place of the domain.
    pub fn with_domain_template(mut self, template: impl Into<String>) -> Self {
        self.domain_template = template.into();
        self
    }

    async fn probe(&self, username: &str) -> Result<Vec<SocialProfile>, ProfileError> {
        if !is_probe_safe(username) {
            return Err(ProfileError::InvalidTarget(username.to_string()));
        }

        let mut found = Vec::new();
        for platform in &self.platforms {
            let url = platform.profile_url(username);
            match self.client.get(&url).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!("{} profile found at {}", platform.name, url);
                    found.push(SocialProfile {
                        platform: platform.name.clone(),
                        url,
                        username: username.to_string(),
                        confidence: 1.0,
                    });
                }
                Ok(response) => debug!("{} answered {} for {}", platform.name, response.status(), url),
                Err(e) => debug!("{} probe failed for {}: {}", platform.name, url, e),
            }
        }
        Ok(found)
    }
}

fn is_probe_safe(username: &str) -> bool {
    !username.is_empty()
        && username.len() <= 64
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

#[async_trait]
impl OsintProfiler for PlatformProbe {
    async fn profile_email(&self, email: &str) -> Result<serde_json::Value, ProfileError> {
        let Some((local, domain)) = email.split_once('@') else {
            return Err(ProfileError::InvalidTarget(email.to_string()));
        };
        let profiles = self.probe(local).await.unwrap_or_default();
        Ok(json!({
            "email": email,
            "local_part": local,
            "domain": domain,
            "profiles": profiles,
        }))
    }

    async fn profile_username(&self, username: &str) -> Result<serde_json::Value, ProfileError> {
        let profiles = self.probe(username).await?;
        Ok(json!({
            "username": username,
            "profiles": profiles,
        }))
    }

    async fn profile_domain(&self, domain: &str) -> Result<serde_json::Value, ProfileError> {
        if domain.is_empty() || domain.contains(['/', '@', ' ']) {
            return Err(ProfileError::InvalidTarget(domain.to_string()));
        }
        let url = self.domain_template.replace("{}", domain);
        let response = self.client.get(&url).send().await?;
        let status_code = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = response.text().await?;

        Ok(json!({
            "domain": domain,
            "url": final_url,
            "status_code": status_code,
            "web_server": headers.get("server"),
            "technologies": tech::detect(&body, &headers, &final_url),
        }))
    }

    async fn find_brand_profiles(&self, brand: &str) -> Result<Vec<SocialProfile>, ProfileError> {
        info!("Searching social profiles for brand '{}'", brand);
        self.probe(brand).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brand_name() {
        assert_eq!(brand_name("www.Acme.com"), "acme");
        assert_eq!(brand_name("shop.acme.co.uk"), "shop");
        assert_eq!(brand_name("acme.co.uk"), "acme");
        assert_eq!(brand_name("acme.it"), "acme");
        assert_eq!(brand_name("acme.dev"), "acme");
        assert_eq!(brand_name("localhost"), "localhost");
    }

    #[test]
    fn test_probe_safe_usernames() {
        assert!(is_probe_safe("acme"));
        assert!(is_probe_safe("mario.rossi_1"));
        assert!(!is_probe_safe(""));
        assert!(!is_probe_safe("../etc"));
        assert!(!is_probe_safe("a b"));
    }

    #[test]
    fn test_entity_serialization() {
        let entity = ProfiledEntity::PhoneNumbers {
            page_url: "https://acme.test/".to_string(),
            entity: vec!["+390612345678".to_string()],
        };
        let value = serde_json::to_value(&entity).unwrap();
        assert_eq!(value["entity_type"], "phone_numbers_found");
        assert_eq!(value["entity"][0], "+390612345678");
    }
}
