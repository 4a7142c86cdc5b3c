use crate::error::{Result, ScanError};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;
use url::Url;

/// Key under which JSON-LD blocks are stored in [`ParsedPage::metadata`].
pub const STRUCTURED_DATA_KEY: &str = "structured_data";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkInfo {
    /// Absolute form of the `href`, or the raw value when it cannot be resolved.
    pub url: String,
    pub text: String,
    pub rel: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCounts {
    pub images: usize,
    pub stylesheets: usize,
    pub scripts: usize,
    pub forms: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedPage {
    pub title: Option<String>,
    pub description: Option<String>,
    pub canonical_url: Option<String>,
    pub lang: Option<String>,
    pub links: Vec<LinkInfo>,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub counts: PageCounts,
}

/// Structural extraction from an HTML document.
pub trait PageParser: Send + Sync {
    fn parse(&self, html: &str, url: &str) -> ParsedPage;
}

struct Selectors {
    title: Selector,
    h1: Selector,
    anchor: Selector,
    meta: Selector,
    canonical: Selector,
    html: Selector,
    json_ld: Selector,
    img: Selector,
    stylesheet: Selector,
    script_src: Selector,
    form: Selector,
}

/// [`PageParser`] backed by `scraper`.
pub struct HtmlParser {
    selectors: Selectors,
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ScanError::ParseError(format!("selector '{}': {}", css, e)))
}

impl HtmlParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            selectors: Selectors {
                title: selector("title")?,
                h1: selector("h1")?,
                anchor: selector("a[href]")?,
                meta: selector("meta")?,
                canonical: selector("link[rel=\"canonical\"]")?,
                html: selector("html")?,
                json_ld: selector("script[type=\"application/ld+json\"]")?,
                img: selector("img")?,
                stylesheet: selector("link[rel=\"stylesheet\"]")?,
                script_src: selector("script[src]")?,
                form: selector("form")?,
            },
        })
    }

    fn title(&self, document: &Html) -> Option<String> {
        document
            .select(&self.selectors.title)
            .chain(document.select(&self.selectors.h1))
            .map(element_text)
            .find(|text| !text.is_empty())
    }

    fn description(&self, document: &Html) -> Option<String> {
        let mut og_description = None;
        for meta in document.select(&self.selectors.meta) {
            let Some(content) = meta.value().attr("content").map(str::trim) else {
                continue;
            };
            if content.is_empty() {
                continue;
            }
            if meta
                .value()
                .attr("name")
                .is_some_and(|n| n.eq_ignore_ascii_case("description"))
            {
                return Some(content.to_string());
            }
            if og_description.is_none() && meta.value().attr("property") == Some("og:description") {
                og_description = Some(content.to_string());
            }
        }
        og_description
    }

    fn links(&self, document: &Html, base: Option<&Url>) -> Vec<LinkInfo> {
        document
            .select(&self.selectors.anchor)
            .filter_map(|a| {
                let href = a.value().attr("href")?.trim();
                if href.starts_with('#') {
                    return None;
                }
                let url = base
                    .and_then(|b| b.join(href).ok())
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| href.to_string());
                Some(LinkInfo {
                    url,
                    text: element_text(a),
                    rel: a.value().attr("rel").unwrap_or_default().to_string(),
                })
            })
            .collect()
    }

    fn metadata(&self, document: &Html, url: &str) -> BTreeMap<String, serde_json::Value> {
        let mut metadata = BTreeMap::new();

        for meta in document.select(&self.selectors.meta) {
            let element = meta.value();
            let name = element.attr("name").or_else(|| element.attr("property"));
            if let Some(name) = name
                && let Some(content) = element.attr("content")
                && !name.is_empty()
                && !content.is_empty()
            {
                metadata.insert(
                    name.to_string(),
                    serde_json::Value::String(content.to_string()),
                );
            }
        }

        for script in document.select(&self.selectors.json_ld) {
            let raw: String = script.text().collect();
            match serde_json::from_str::<serde_json::Value>(raw.trim()) {
                Ok(value) => {
                    metadata.insert(STRUCTURED_DATA_KEY.to_string(), value);
                }
                Err(e) => debug!("Skipping malformed JSON-LD on {}: {}", url, e),
            }
        }

        metadata
    }
}

impl PageParser for HtmlParser {
    fn parse(&self, html: &str, url: &str) -> ParsedPage {
        let document = Html::parse_document(html);
        let base = Url::parse(url).ok();

        let canonical_url = document
            .select(&self.selectors.canonical)
            .find_map(|link| link.value().attr("href"))
            .map(|href| href.trim().to_string());
        let lang = document
            .select(&self.selectors.html)
            .find_map(|root| root.value().attr("lang"))
            .map(str::to_string);

        let page = ParsedPage {
            title: self.title(&document),
            description: self.description(&document),
            canonical_url,
            lang,
            links: self.links(&document, base.as_ref()),
            metadata: self.metadata(&document, url),
            counts: PageCounts {
                images: document.select(&self.selectors.img).count(),
                stylesheets: document.select(&self.selectors.stylesheet).count(),
                scripts: document.select(&self.selectors.script_src).count(),
                forms: document.select(&self.selectors.form).count(),
            },
        };

        debug!(
            "Parsed {}: {} links, {} metadata entries",
            url,
            page.links.len(),
            page.metadata.len()
        );
        page
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
