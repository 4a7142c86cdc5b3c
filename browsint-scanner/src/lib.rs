pub mod classify;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod frontier;
pub mod normalize;
pub mod parser;
pub mod robots;
pub mod tech;

pub use classify::{ContentBucket, classify_and_path};
pub use error::ScanError;
pub use fetcher::{FetchResponse, Fetcher, HttpFetcher};
pub use frontier::{CrawlTask, Frontier, VisitedSet};
pub use normalize::{is_internal, normalize};
pub use parser::{HtmlParser, LinkInfo, PageParser, ParsedPage};
pub use robots::{MAX_CRAWL_DELAY_SECS, PolicyDecision, RobotsGate, RobotsPolicy, RobotsRule};
pub use tech::PageTechnologies;
