use browsint_scanner::fetcher::{DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const DEFAULT_DATA_DIR: &str = "~/.config/browsint/";
pub const DATABASE_FILE: &str = "browsint.db";
pub const DOWNLOADS_DIR: &str = "downloads";

/// Filesystem locations and HTTP options shared by `init` and `crawl`.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    pub downloads_dir: PathBuf,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Settings {
    /// Settings rooted at `data_dir`. A leading `~` is expanded.
    pub fn from_data_dir(data_dir: &str) -> Self {
        let expanded = shellexpand::tilde(data_dir);
        let data_dir = Path::new(expanded.as_ref()).to_path_buf();
        Self {
            database_path: data_dir.join(DATABASE_FILE),
            downloads_dir: data_dir.join(DOWNLOADS_DIR),
            data_dir,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Create the data and downloads directories if missing.
    pub fn ensure_dirs(&self) -> io::Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        fs::create_dir_all(&self.downloads_dir)
    }

    /// True once `init` has created the database.
    pub fn is_initialized(&self) -> bool {
        self.database_path.exists()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_data_dir(DEFAULT_DATA_DIR)
    }
}
