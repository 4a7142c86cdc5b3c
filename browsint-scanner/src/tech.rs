//! Framework, JavaScript library and analytics signatures.

use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;

const SCRIPT_PATTERNS: &[(&str, &str)] = &[
    ("jQuery", r"(?i)jquery(-[0-9.]+)?(\.(slim|min))*\.js"),
    ("React", r"(?i)react(-dom)?(-[0-9.]+)?(\.(production|development|min))*\.js"),
    ("AngularJS", r"(?i)angular(-[0-9.]+)?(\.min)?\.js"),
    ("Angular", r"(?i)main\.(?:[a-f0-9]+\.)?js"),
    ("Vue.js", r"(?i)vue(-[0-9.]+)?(\.(global|runtime|prod|min))*\.js"),
    ("Bootstrap JS", r"(?i)bootstrap(-[0-9.]+)?(\.(bundle|min))*\.js"),
    ("Lodash", r"(?i)lodash(-[0-9.]+)?(\.min)?\.js"),
    ("Moment.js", r"(?i)moment(-[0-9.]+)?(\.min)?\.js"),
    ("GSAP", r"(?i)gsap(-[0-9.]+)?(\.min)?\.js|TweenMax"),
    ("D3.js", r"(?i)d3(-[0-9.]+)?(\.min)?\.js"),
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageTechnologies {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub framework_cms: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub js_libraries: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub analytics: Vec<String>,
}

impl PageTechnologies {
    pub fn is_empty(&self) -> bool {
        self.framework_cms.is_empty() && self.js_libraries.is_empty() && self.analytics.is_empty()
    }
}

struct Signatures {
    scripts: Vec<(&'static str, Regex)>,
    inline_jquery: Regex,
    google_analytics: Regex,
    generator: Selector,
    drupal: Selector,
    link: Selector,
    script_src: Selector,
}

fn signatures() -> Option<&'static Signatures> {
    static SIGNATURES: OnceLock<Option<Signatures>> = OnceLock::new();
    SIGNATURES
        .get_or_init(|| {
            let scripts = SCRIPT_PATTERNS
                .iter()
                .map(|(name, pattern)| Regex::new(pattern).map(|re| (*name, re)))
                .collect::<Result<Vec<_>, _>>()
                .ok()?;
            Some(Signatures {
                scripts,
                inline_jquery: Regex::new(r"window\.jQuery|\$\(|jQuery\(").ok()?,
                google_analytics: Regex::new(
                    r"www\.google-analytics\.com/analytics\.js|gtag\('config', 'UA-|gtag\('config', 'G-",
                )
                .ok()?,
                generator: Selector::parse("meta[name]").ok()?,
                drupal: Selector::parse("#drupal-css").ok()?,
                link: Selector::parse("link[href]").ok()?,
                script_src: Selector::parse("script[src]").ok()?,
            })
        })
        .as_ref()
}

/// Run every detector on one page.
pub fn detect(html: &str, headers: &HashMap<String, String>, url: &str) -> PageTechnologies {
    let Some(sig) = signatures() else {
        return PageTechnologies::default();
    };
    let document = Html::parse_document(html);

    PageTechnologies {
        framework_cms: detect_framework(sig, &document, headers, html, url),
        js_libraries: detect_js_libraries(sig, &document, html),
        analytics: detect_analytics(sig, html),
    }
}

fn detect_framework(
    sig: &Signatures,
    document: &Html,
    headers: &HashMap<String, String>,
    html: &str,
    url: &str,
) -> Vec<String> {
    let mut detected = BTreeSet::new();

    for meta in document.select(&sig.generator) {
        let element = meta.value();
        if element
            .attr("name")
            .is_some_and(|n| n.eq_ignore_ascii_case("generator"))
            && let Some(content) = element.attr("content").map(str::trim)
            && !content.is_empty()
        {
            detected.insert(content.to_string());
        }
    }

    for header in ["x-powered-by", "x-generator"] {
        if let Some(value) = headers.get(header).map(|v| v.trim())
            && !value.is_empty()
        {
            detected.insert(value.to_string());
        }
    }

    let wordpress_script = document.select(&sig.script_src).any(|s| {
        s.value()
            .attr("src")
            .is_some_and(|src| src.contains("wp-content") || src.contains("wp-includes"))
    });
    if html.contains("wp-content")
        || html.contains("wp-includes")
        || wordpress_script
        || url.contains("/wp-admin")
        || url.contains("/wp-login")
    {
        detected.insert("WordPress".to_string());
    }
    if document.select(&sig.drupal).next().is_some() {
        detected.insert("Drupal".to_string());
    }
    if document
        .select(&sig.link)
        .any(|l| l.value().attr("href").is_some_and(|h| h.contains("joomla")))
    {
        detected.insert("Joomla".to_string());
    }
    if html.contains("Powered by Shopify") {
        detected.insert("Shopify".to_string());
    }
    if html.contains("squarespace.com") {
        detected.insert("Squarespace".to_string());
    }
    if html.contains("wix.com") {
        detected.insert("Wix".to_string());
    }

    detected.into_iter().collect()
}

fn detect_js_libraries(sig: &Signatures, document: &Html, html: &str) -> Vec<String> {
    let mut libraries = BTreeSet::new();

    for script in document.select(&sig.script_src) {
        let Some(src) = script.value().attr("src") else {
            continue;
        };
        for (name, pattern) in &sig.scripts {
            if pattern.is_match(src) {
                libraries.insert(name.to_string());
            }
        }
    }

    if sig.inline_jquery.is_match(html) {
        libraries.insert("jQuery (likely)".to_string());
    }
    if html.contains("React.createElement") || html.contains("ReactDOM.render") {
        libraries.insert("React (likely)".to_string());
    }
    if html.contains("ng-app") || html.contains("angular.module") {
        libraries.insert("AngularJS (likely)".to_string());
    }
    if html.contains("new Vue(") {
        libraries.insert("Vue.js (likely)".to_string());
    }

    libraries.into_iter().collect()
}

fn detect_analytics(sig: &Signatures, html: &str) -> Vec<String> {
    let mut services = BTreeSet::new();

    if sig.google_analytics.is_match(html) {
        services.insert("Google Analytics (Universal or GA4)");
    }
    if html.contains("googletagmanager.com/gtm.js") {
        services.insert("Google Tag Manager");
    }
    if html.contains("connect.facebook.net/en_US/fbevents.js") || html.contains("fbq('init'") {
        services.insert("Facebook Pixel");
    }
    if html.contains("matomo.js") || html.contains("piwik.js") || html.contains("_paq.push") {
        services.insert("Matomo (Piwik)");
    }
    if html.contains("static.hotjar.com/c/hotjar-") || html.contains("hj('event'") {
        services.insert("Hotjar");
    }
    if html.contains("js.hs-scripts.com/") || html.contains("track HubSpot analytics") {
        services.insert("HubSpot Analytics");
    }

    services.into_iter().map(str::to_string).collect()
}
