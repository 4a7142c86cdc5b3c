use std::collections::{HashSet, VecDeque};
use tracing::warn;

/// Upper bound on pending tasks.
pub const MAX_PENDING: usize = 2000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTask {
    pub url: String,
    pub depth: usize,
}

impl CrawlTask {
    pub fn new(url: impl Into<String>, depth: usize) -> Self {
        Self {
            url: url.into(),
            depth,
        }
    }
}

/// Bounded FIFO of pending crawl tasks.
#[derive(Debug, Default)]
pub struct Frontier {
    queue: VecDeque<CrawlTask>,
    dropped: usize,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task. Returns false and drops it when the frontier is full.
    pub fn push(&mut self, task: CrawlTask) -> bool {
        if self.queue.len() >= MAX_PENDING {
            self.dropped += 1;
            warn!(
                "Frontier full ({} tasks), dropping {} at depth {}",
                MAX_PENDING, task.url, task.depth
            );
            return false;
        }
        self.queue.push_back(task);
        true
    }

    pub fn pop(&mut self) -> Option<CrawlTask> {
        self.queue.pop_front()
    }

    pub fn has_room(&self) -> bool {
        self.queue.len() < MAX_PENDING
    }

    pub fn contains(&self, url: &str) -> bool {
        self.queue.iter().any(|task| task.url == url)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Tasks refused because the frontier was full.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

/// Canonical URLs fetched during one run.
#[derive(Debug, Default)]
pub struct VisitedSet {
    urls: HashSet<String>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the URL was not already present.
    pub fn mark(&mut self, url: &str) -> bool {
        self.urls.insert(url.to_string())
    }

    pub fn contains(&self, url: &str) -> bool {
        self.urls.contains(url)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}
