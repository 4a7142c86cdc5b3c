use crate::crawl::CrawlStats;
use crate::osint::ProfileError;
use browsint_scanner::ScanError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Fatal before or during seeding. Carries whatever stats were gathered.
    #[error("Crawl setup failed: {message}")]
    Setup {
        message: String,
        partial: Box<CrawlStats>,
    },
}

impl CrawlError {
    pub fn setup(message: impl Into<String>, partial: CrawlStats) -> Self {
        CrawlError::Setup {
            message: message.into(),
            partial: Box::new(partial),
        }
    }

    /// Stats gathered before a setup failure.
    pub fn partial_stats(&self) -> Option<&CrawlStats> {
        match self {
            CrawlError::Setup { partial, .. } => Some(partial),
            _ => None,
        }
    }
}

impl From<ScanError> for CrawlError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::DecodeError { encoding, reason } => {
                CrawlError::Decode(format!("cannot decode body as {}: {}", encoding, reason))
            }
            ScanError::IoError(e) => CrawlError::Io(e),
            other => CrawlError::Network(other.to_string()),
        }
    }
}

impl From<ProfileError> for CrawlError {
    fn from(err: ProfileError) -> Self {
        CrawlError::Network(err.to_string())
    }
}
