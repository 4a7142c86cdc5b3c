use crate::error::{Result, ScanError};
use async_trait::async_trait;
use encoding_rs::{Encoding, UTF_8};
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_USER_AGENT: &str = "Browsint/0.1 (+https://github.com/browsint/browsint)";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Raw result of one GET request.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Final URL after redirects.
    pub url: String,
    pub status_code: u16,
    /// Header names are lowercase.
    pub headers: HashMap<String, String>,
    /// Lowercase charset label declared by the server, if any.
    pub encoding: Option<String>,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn content_type(&self) -> &str {
        self.headers
            .get("content-type")
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Decode the body using the declared charset.
    pub fn text(&self) -> Result<String> {
        decode_body(&self.body, self.encoding.as_deref())
    }
}

/// Network retrieval of a single URL.
///
/// Any HTTP response counts as a fetch; only transport failures and empty bodies are errors.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch_raw(&self, url: &str) -> Result<FetchResponse>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        Self::with_options(DEFAULT_USER_AGENT, DEFAULT_TIMEOUT_SECS)
    }

    pub fn with_options(user_agent: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(timeout_secs.div_ceil(2)))
            .pool_idle_timeout(Duration::from_secs(90))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_raw(&self, url: &str) -> Result<FetchResponse> {
        debug!("Fetching {}", url);

        let response = self.client.get(url).send().await?;
        let final_url = response.url().to_string();
        let status_code = response.status().as_u16();

        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let encoding = headers.get("content-type").and_then(|ct| charset_of(ct));

        let body = response.bytes().await?.to_vec();
        if body.is_empty() {
            return Err(ScanError::EmptyBody(url.to_string()));
        }

        debug!(
            "Fetched {} ({} bytes, status {})",
            final_url,
            body.len(),
            status_code
        );

        Ok(FetchResponse {
            url: final_url,
            status_code,
            headers,
            encoding,
            body,
        })
    }
}

/// `charset` parameter of a content-type header value.
pub fn charset_of(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_ascii_lowercase())
            .filter(|v| !v.is_empty())
    })
}

/// Decode a body as the declared encoding.
///
/// Without a declaration the body is read as UTF-8 with replacement characters. Legacy
/// charsets decode with replacement characters too. Only an unknown label, or bytes that are
/// not valid UTF-8 under a UTF-8 declaration, are errors.
pub fn decode_body(body: &[u8], encoding: Option<&str>) -> Result<String> {
    let Some(label) = encoding else {
        return Ok(String::from_utf8_lossy(body).into_owned());
    };

    let Some(encoding) = Encoding::for_label(label.as_bytes()) else {
        return Err(decode_error(label, "unknown charset"));
    };

    if encoding == UTF_8 {
        return encoding
            .decode_without_bom_handling_and_without_replacement(body)
            .map(|text| text.into_owned())
            .ok_or_else(|| decode_error(label, "invalid UTF-8 sequence"));
    }

    let (text, actual, had_errors) = encoding.decode(body);
    if had_errors {
        debug!("Replaced malformed {} sequences in body", actual.name());
    }
    Ok(text.into_owned())
}

fn decode_error(encoding: &str, reason: impl ToString) -> ScanError {
    ScanError::DecodeError {
        encoding: encoding.to_string(),
        reason: reason.to_string(),
    }
}
