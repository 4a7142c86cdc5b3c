pub mod config;
pub mod crawl;
pub mod data;
pub mod error;
pub mod graph;
pub mod osint;

pub use config::Settings;
pub use crawl::{CrawlEngine, CrawlMode, CrawlRequest, CrawlStats, ProgressCallback, RobotsSource};
pub use data::Database;
pub use error::CrawlError;
pub use graph::SiteGraphWriter;
pub use osint::{OsintProfiler, OsintSummary, PlatformProbe, ProfiledEntity, SocialProfile};
