//! Breadth-first crawl orchestration.
//!
//! One [`CrawlEngine::start_crawl`] call drives a single run: robots.txt is consulted once,
//! the frontier is seeded and drained strictly in FIFO order, and every fetched page is
//! either written into the site graph (`Download`) or mined for OSINT (`OsintSurvey`).

use crate::config::Settings;
use crate::data::Database;
use crate::error::CrawlError;
use crate::graph::SiteGraphWriter;
use crate::osint::{OsintProfiler, OsintSummary, PlatformProbe, ProfiledEntity, brand_name};
use browsint_scanner::classify::{classify_and_path, create_run_directory};
use browsint_scanner::extract::{
    extract_emails, extract_phone_numbers, filter_emails, filter_phone_numbers,
};
use browsint_scanner::{
    CrawlTask, FetchResponse, Fetcher, Frontier, HtmlParser, HttpFetcher, MAX_CRAWL_DELAY_SECS,
    PageParser, ParsedPage, PolicyDecision, RobotsGate, RobotsPolicy, VisitedSet, is_internal,
    normalize, tech,
};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, debug, error, info, info_span, warn};
use url::Url;
use uuid::Uuid;

pub const DEFAULT_DEPTH_LIMIT: usize = 2;
pub const DEFAULT_POLITENESS_DELAY: f64 = 1.0;

const TEXT_CONTENT_MARKERS: [&str; 4] = ["html", "xml", "text", "json"];

/// Called before each fetch with `(urls_visited, url, depth)`.
pub type ProgressCallback = Arc<dyn Fn(usize, &str, usize) + Send + Sync>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlMode {
    /// Save pages to disk and record them in the site graph.
    #[default]
    Download,
    /// Extract emails, phone numbers and technologies; nothing is persisted.
    OsintSurvey,
}

/// Where a run gets its robots.txt from.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RobotsSource {
    /// Fetch it when the run starts.
    #[default]
    Fetch,
    /// Reuse an earlier [`CrawlEngine::preview_robots`] result. `None` means no robots.txt.
    Previewed(Option<(RobotsPolicy, String)>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrawlRequest {
    pub start_url: String,
    pub depth_limit: usize,
    /// Seconds to wait before each fetch.
    pub politeness_delay: f64,
    pub mode: CrawlMode,
    pub save_to_disk: bool,
    pub policy_decision: PolicyDecision,
    pub robots: RobotsSource,
}

impl CrawlRequest {
    pub fn new(start_url: impl Into<String>) -> Self {
        Self {
            start_url: start_url.into(),
            depth_limit: DEFAULT_DEPTH_LIMIT,
            politeness_delay: DEFAULT_POLITENESS_DELAY,
            mode: CrawlMode::default(),
            save_to_disk: true,
            policy_decision: PolicyDecision::default(),
            robots: RobotsSource::default(),
        }
    }

    pub fn with_depth_limit(mut self, depth_limit: usize) -> Self {
        self.depth_limit = depth_limit;
        self
    }

    /// Clamped to `0..=MAX_CRAWL_DELAY_SECS`; NaN means no delay.
    pub fn with_delay(mut self, seconds: f64) -> Self {
        self.politeness_delay = if seconds.is_nan() {
            0.0
        } else {
            seconds.clamp(0.0, MAX_CRAWL_DELAY_SECS)
        };
        self
    }

    pub fn with_mode(mut self, mode: CrawlMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_save_to_disk(mut self, save_to_disk: bool) -> Self {
        self.save_to_disk = save_to_disk;
        self
    }

    pub fn with_policy_decision(mut self, decision: PolicyDecision) -> Self {
        self.policy_decision = decision;
        self
    }

    /// Enforce the robots.txt the operator already reviewed instead of fetching it again.
    pub fn with_previewed_robots(mut self, preview: Option<(RobotsPolicy, String)>) -> Self {
        self.robots = RobotsSource::Previewed(preview);
        self
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlStats {
    pub run_id: String,
    pub urls_visited: usize,
    pub pages_saved: usize,
    pub errors: usize,
    /// Fetched URLs the robots policy would have denied.
    pub restricted_paths_crawled: usize,
    pub download_path: Option<PathBuf>,
    pub robots_txt: Option<RobotsPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub osint_summary: Option<OsintSummary>,
}

/// Mutable state owned by one run.
struct RunContext {
    base_domain: String,
    origin: String,
    frontier: Frontier,
    visited: VisitedSet,
    gate: RobotsGate,
    delay: f64,
    run_dir: Option<PathBuf>,
    website_id: Option<i64>,
    already_profiled: HashSet<String>,
    osint: Option<OsintSummary>,
    stats: CrawlStats,
}

impl RunContext {
    fn setup_error(&self, message: impl Into<String>) -> CrawlError {
        CrawlError::setup(message, self.stats.clone())
    }

    /// Queue `url` unless it was already seen this run.
    fn enqueue(&mut self, url: String, depth: usize) -> bool {
        if self.visited.contains(&url) || self.frontier.contains(&url) {
            return false;
        }
        self.frontier.push(CrawlTask::new(url, depth))
    }
}

pub struct CrawlEngine {
    fetcher: Box<dyn Fetcher>,
    parser: Box<dyn PageParser>,
    database: Option<Database>,
    profiler: Option<Box<dyn OsintProfiler>>,
    downloads_dir: PathBuf,
    progress_callback: Option<ProgressCallback>,
}

impl CrawlEngine {
    pub fn new(fetcher: Box<dyn Fetcher>, parser: Box<dyn PageParser>) -> Self {
        Self {
            fetcher,
            parser,
            database: None,
            profiler: None,
            downloads_dir: PathBuf::from("downloads"),
            progress_callback: None,
        }
    }

    /// Engine with the HTTP fetcher, HTML parser and SQLite store described by `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self, CrawlError> {
        let fetcher = HttpFetcher::with_options(&settings.user_agent, settings.timeout_secs)?;
        let parser = HtmlParser::new()?;
        let database = Database::new(&settings.database_path)?;

        Ok(Self::new(Box::new(fetcher), Box::new(parser))
            .with_database(database)
            .with_downloads_dir(&settings.downloads_dir))
    }

    /// Engine for `OsintSurvey` runs: no store is opened and profiles come from
    /// [`PlatformProbe`].
    pub fn survey_from_settings(settings: &Settings) -> Result<Self, CrawlError> {
        let fetcher = HttpFetcher::with_options(&settings.user_agent, settings.timeout_secs)?;
        let parser = HtmlParser::new()?;
        let profiler = PlatformProbe::with_options(&settings.user_agent, settings.timeout_secs)?;

        Ok(Self::new(Box::new(fetcher), Box::new(parser)).with_profiler(Box::new(profiler)))
    }

    pub fn with_database(mut self, database: Database) -> Self {
        self.database = Some(database);
        self
    }

    pub fn with_profiler(mut self, profiler: Box<dyn OsintProfiler>) -> Self {
        self.profiler = Some(profiler);
        self
    }

    pub fn with_downloads_dir(mut self, downloads_dir: impl Into<PathBuf>) -> Self {
        self.downloads_dir = downloads_dir.into();
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn database(&self) -> Option<&Database> {
        self.database.as_ref()
    }

    /// Fetch and parse robots.txt for `start_url` without crawling, so the caller can
    /// decide between respecting and overriding it.
    pub async fn preview_robots(&self, start_url: &str) -> Option<(RobotsPolicy, String)> {
        let url = Url::parse(start_url).ok()?;
        RobotsPolicy::fetch(self.fetcher.as_ref(), &url).await
    }

    pub async fn start_crawl(&self, request: CrawlRequest) -> Result<CrawlStats, CrawlError> {
        let stats = CrawlStats {
            run_id: Uuid::new_v4().to_string(),
            ..Default::default()
        };

        let start = match Url::parse(request.start_url.trim()) {
            Ok(url) => url,
            Err(e) => {
                return Err(CrawlError::setup(
                    format!("invalid start URL '{}': {}", request.start_url, e),
                    stats,
                ));
            }
        };
        let Some(domain) = start.host_str().map(str::to_string) else {
            return Err(CrawlError::setup(
                format!("start URL '{}' has no host", request.start_url),
                stats,
            ));
        };

        let span = info_span!("crawl", run_id = %stats.run_id, domain = %domain);
        self.run(request, start, domain, stats).instrument(span).await
    }

    async fn run(
        &self,
        mut request: CrawlRequest,
        start: Url,
        domain: String,
        stats: CrawlStats,
    ) -> Result<CrawlStats, CrawlError> {
        let mut ctx = RunContext {
            origin: start.origin().ascii_serialization(),
            base_domain: domain,
            frontier: Frontier::new(),
            visited: VisitedSet::new(),
            gate: RobotsGate::allow_all(),
            delay: request.politeness_delay,
            run_dir: None,
            website_id: None,
            already_profiled: HashSet::new(),
            osint: (request.mode == CrawlMode::OsintSurvey).then(OsintSummary::default),
            stats,
        };

        if request.mode == CrawlMode::Download && self.database.is_none() {
            return Err(ctx.setup_error("download mode requires a database"));
        }

        info!(
            "Starting {:?} crawl of {} (depth {}, delay {:.1}s)",
            request.mode, start, request.depth_limit, request.politeness_delay
        );

        let robots = match std::mem::take(&mut request.robots) {
            RobotsSource::Fetch => RobotsPolicy::fetch(self.fetcher.as_ref(), &start).await,
            RobotsSource::Previewed(preview) => preview,
        };
        if let Some((policy, raw)) = robots {
            ctx.gate = RobotsGate::new(policy, raw, request.policy_decision);
        }
        ctx.stats.robots_txt = ctx.gate.policy().cloned();
        ctx.delay = ctx.gate.effective_delay(request.politeness_delay);
        if ctx.delay > request.politeness_delay {
            info!("Politeness delay raised to robots crawl-delay of {}s", ctx.delay);
        }

        if request.mode == CrawlMode::Download {
            self.record_site(&mut ctx);

            if request.save_to_disk {
                let run_dir = create_run_directory(&self.downloads_dir, &ctx.base_domain, Local::now())
                    .map_err(|e| {
                        ctx.setup_error(format!(
                            "cannot create output directory under {}: {}",
                            self.downloads_dir.display(),
                            e
                        ))
                    })?;
                ctx.stats.download_path = Some(run_dir.clone());
                ctx.run_dir = Some(run_dir);
            }
        }

        let Some(seed) = normalize(start.as_str(), start.as_str()) else {
            return Err(ctx.setup_error(format!("cannot normalize start URL {}", start)));
        };
        ctx.enqueue(seed, 0);
        self.seed_overrides(&mut ctx);

        while let Some(task) = ctx.frontier.pop() {
            if ctx.visited.contains(&task.url) {
                continue;
            }
            if task.depth > request.depth_limit {
                debug!("Skipping {} beyond depth limit ({})", task.url, task.depth);
                continue;
            }
            if !ctx.gate.admits(&task.url) {
                debug!("Disallowed by robots.txt: {}", task.url);
                continue;
            }

            ctx.visited.mark(&task.url);
            ctx.stats.urls_visited += 1;
            if ctx.gate.restricts(&task.url) {
                ctx.stats.restricted_paths_crawled += 1;
                warn!("Crawling robots-restricted path {}", task.url);
            }

            if let Some(callback) = &self.progress_callback {
                callback(ctx.stats.urls_visited, &task.url, task.depth);
            }
            if ctx.delay > 0.0 {
                match Duration::try_from_secs_f64(ctx.delay) {
                    Ok(pause) => tokio::time::sleep(pause).await,
                    Err(e) => warn!("Skipping politeness delay of {}s: {}", ctx.delay, e),
                }
            }

            debug!("Fetching {} (depth {})", task.url, task.depth);
            match self.fetcher.fetch_raw(&task.url).await {
                Ok(response) => self.process_page(&mut ctx, &request, &task, response).await,
                Err(e) => {
                    warn!("Failed to fetch {}: {}", task.url, e);
                    ctx.stats.errors += 1;
                }
            }
        }

        if ctx.frontier.dropped() > 0 {
            warn!("{} links dropped because the frontier was full", ctx.frontier.dropped());
        }

        if let Some(mut summary) = ctx.osint.take() {
            self.lookup_brand(&ctx.base_domain, &ctx.origin, &mut summary).await;
            ctx.stats.osint_summary = Some(summary);
        }

        info!(
            "Crawl finished: {} visited, {} saved, {} errors",
            ctx.stats.urls_visited, ctx.stats.pages_saved, ctx.stats.errors
        );
        Ok(ctx.stats)
    }

    /// Website row and robots record, written once per run.
    fn record_site(&self, ctx: &mut RunContext) {
        let Some(db) = &self.database else {
            return;
        };
        let writer = SiteGraphWriter::new(db);

        let website_id = match writer.ensure_website(&ctx.base_domain) {
            Ok(id) => id,
            Err(e) => {
                error!("Cannot record website {}: {}", ctx.base_domain, e);
                ctx.stats.errors += 1;
                return;
            }
        };
        ctx.website_id = Some(website_id);

        if let (Some(policy), Some(raw)) = (ctx.gate.policy(), ctx.gate.raw_text())
            && let Err(e) = writer.save_robots(website_id, policy, raw)
        {
            error!("Cannot save robots.txt for {}: {}", ctx.base_domain, e);
            ctx.stats.errors += 1;
        }
    }

    fn seed_overrides(&self, ctx: &mut RunContext) {
        if ctx.gate.respects_robots() {
            return;
        }

        for url in ctx.gate.sensitive_seeds(&ctx.origin) {
            warn!("Sensitive path from robots.txt queued: {}", url);
        }

        let seeds = ctx.gate.override_seeds(&ctx.origin);
        info!("Overriding robots.txt: queueing {} disallowed paths", seeds.len());
        for url in seeds {
            ctx.enqueue(url, 0);
        }
    }

    async fn process_page(
        &self,
        ctx: &mut RunContext,
        request: &CrawlRequest,
        task: &CrawlTask,
        response: FetchResponse,
    ) {
        let content_type = response.content_type().to_string();

        if let Some(run_dir) = &ctx.run_dir {
            match save_to_disk(run_dir, &task.url, &content_type, &response.body).await {
                Ok(path) => {
                    debug!("Saved {} to {}", task.url, path.display());
                    ctx.stats.pages_saved += 1;
                }
                Err(e) => {
                    warn!("Failed to save {}: {}", task.url, e);
                    ctx.stats.errors += 1;
                }
            }
        }

        let document = if is_text_like(&content_type) {
            match response.text() {
                Ok(text) => {
                    let page = self.parser.parse(&text, &task.url);
                    Some((text, page))
                }
                Err(e) => {
                    warn!("{}: {}", task.url, CrawlError::from(e));
                    ctx.stats.errors += 1;
                    None
                }
            }
        } else {
            debug!("Not parsing {} ({})", task.url, content_type);
            None
        };

        match request.mode {
            CrawlMode::Download => {
                let page = document.as_ref().map(|(_, page)| page);
                self.record_page(ctx, task, &response, &content_type, page);
            }
            CrawlMode::OsintSurvey => {
                if let Some((text, _)) = &document {
                    self.survey_page(ctx, &task.url, text, &response.headers).await;
                }
            }
        }

        if let Some((_, page)) = &document
            && task.depth < request.depth_limit
        {
            for link in &page.links {
                if let Some(url) = normalize(&link.url, &task.url)
                    && is_internal(&url, &ctx.base_domain)
                {
                    ctx.enqueue(url, task.depth + 1);
                }
            }
        }
    }

    /// Page row plus its links and metadata.
    fn record_page(
        &self,
        ctx: &mut RunContext,
        task: &CrawlTask,
        response: &FetchResponse,
        content_type: &str,
        page: Option<&ParsedPage>,
    ) {
        let (Some(db), Some(website_id)) = (&self.database, ctx.website_id) else {
            return;
        };
        let writer = SiteGraphWriter::new(db);

        let page_id = match writer.upsert_page(
            website_id,
            &task.url,
            page.and_then(|p| p.title.as_deref()),
            response.status_code,
            response.body.len(),
            (!content_type.is_empty()).then_some(content_type),
        ) {
            Ok(id) => id,
            Err(e) => {
                error!("Cannot record page {}: {}", task.url, e);
                ctx.stats.errors += 1;
                return;
            }
        };

        let Some(page) = page else {
            return;
        };

        for link in &page.links {
            let Some(href) = normalize(&link.url, &task.url) else {
                continue;
            };
            let internal = is_internal(&href, &ctx.base_domain);
            if let Err(e) = writer.insert_link(page_id, &href, &link.text, internal) {
                error!("Cannot record link {} on {}: {}", href, task.url, e);
                ctx.stats.errors += 1;
            }
        }

        if let Err(e) = writer.insert_metadata(page_id, &page.metadata) {
            error!("Cannot record metadata for {}: {}", task.url, e);
            ctx.stats.errors += 1;
        }
    }

    async fn survey_page(
        &self,
        ctx: &mut RunContext,
        page_url: &str,
        text: &str,
        headers: &HashMap<String, String>,
    ) {
        let Some(summary) = ctx.osint.as_mut() else {
            return;
        };

        let emails = filter_emails(&extract_emails(text), &ctx.base_domain);
        for email in emails {
            if !ctx.already_profiled.insert(email.clone()) {
                continue;
            }
            info!("Found email {} on {}", email, page_url);
            let profile_details = match &self.profiler {
                Some(profiler) => match profiler.profile_email(&email).await {
                    Ok(details) => details,
                    Err(e) => {
                        warn!("Profiling {} failed: {}", email, e);
                        serde_json::json!({ "error": e.to_string() })
                    }
                },
                None => serde_json::Value::Null,
            };
            summary.entities_profiled.push(ProfiledEntity::Email {
                page_url: page_url.to_string(),
                entity: email,
                profile_details,
            });
        }

        let phones = filter_phone_numbers(&extract_phone_numbers(text));
        if !phones.is_empty() {
            info!("Found {} phone numbers on {}", phones.len(), page_url);
            summary.entities_profiled.push(ProfiledEntity::PhoneNumbers {
                page_url: page_url.to_string(),
                entity: phones.into_iter().collect(),
            });
        }

        let technologies = tech::detect(text, headers, page_url);
        if !technologies.is_empty() {
            summary
                .page_technologies
                .insert(page_url.to_string(), technologies);
        }
    }

    async fn lookup_brand(&self, domain: &str, origin: &str, summary: &mut OsintSummary) {
        let Some(profiler) = &self.profiler else {
            return;
        };
        let brand = brand_name(domain);
        info!("Looking up social profiles for brand '{}'", brand);

        match profiler.find_brand_profiles(&brand).await {
            Ok(profiles) => {
                for profile in profiles {
                    summary.entities_profiled.push(ProfiledEntity::SocialProfile {
                        page_url: origin.to_string(),
                        entity: profile.url.clone(),
                        profile_details: profile,
                    });
                }
            }
            Err(e) => warn!("Brand lookup for '{}' failed: {}", brand, e),
        }
    }
}

fn is_text_like(content_type: &str) -> bool {
    let lower = content_type.to_ascii_lowercase();
    TEXT_CONTENT_MARKERS.iter().any(|marker| lower.contains(marker))
}

async fn save_to_disk(
    run_dir: &Path,
    url: &str,
    content_type: &str,
    body: &[u8],
) -> io::Result<PathBuf> {
    let (dir, file_name) = classify_and_path(url, content_type);
    let target_dir = run_dir.join(dir);
    tokio::fs::create_dir_all(&target_dir).await?;
    let path = target_dir.join(file_name);
    tokio::fs::write(&path, body).await?;
    Ok(path)
}
