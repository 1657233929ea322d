use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashSet;
use tokio::sync::Mutex;
use tracing::warn;

use webcrawler_core::CrawlError;

/// Process-wide, append-only record of every URL ever fetched by any job.
///
/// `contains` is served from an in-memory set so it never blocks on disk.
/// `mark` inserts into that set first (atomically, via `DashSet`) and then
/// appends to the on-disk log — the insert is what makes `mark(u)`
/// happen-before any subsequent `contains(u)` seen by another job, since the
/// set entry is visible the instant `insert` returns `true`.
pub struct VisitedRegistry {
    path: PathBuf,
    seen: DashSet<String>,
    file_lock: Mutex<()>,
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl VisitedRegistry {
    /// `data_dir` is the platform's on-disk root; the log lives at
    /// `{data_dir}/visited_urls.data`.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join("visited_urls.data"),
            seen: DashSet::new(),
            file_lock: Mutex::new(()),
        }
    }

    /// Populate the in-memory set from the append log at startup. Duplicate
    /// lines are tolerated (the set absorbs them silently); malformed lines
    /// are skipped with a warning.
    pub async fn load_all(&self) -> Result<(), CrawlError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(CrawlError::Persistence(e.to_string())),
        };
        for line in contents.lines() {
            match line.split_whitespace().next() {
                Some(url) => {
                    self.seen.insert(url.to_string());
                }
                None => warn!(line, "skipping malformed visited-log line"),
            }
        }
        Ok(())
    }

    /// Mark `url` as visited by `job_id`. Idempotent: the second and later
    /// calls for the same URL are a no-op and return `false`.
    pub async fn mark(&self, url: &str, job_id: &str) -> Result<bool, CrawlError> {
        if !self.seen.insert(url.to_string()) {
            return Ok(false);
        }

        let line = format!("{} {} {}\n", url, job_id, now_unix());
        let _guard = self.file_lock.lock().await;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || append_line(&path, &line))
            .await
            .map_err(|e| CrawlError::Persistence(e.to_string()))??;
        Ok(true)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.seen.contains(url)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

fn append_line(path: &Path, line: &str) -> Result<(), CrawlError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CrawlError::Persistence(e.to_string()))?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| CrawlError::Persistence(e.to_string()))?;
    file.write_all(line.as_bytes())
        .map_err(|e| CrawlError::Persistence(e.to_string()))
}
