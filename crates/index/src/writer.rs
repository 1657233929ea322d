use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use webcrawler_core::{CrawlError, Posting};

/// Appends postings to sharded index files under `{data_dir}/storage/`.
///
/// One writer lock per shard (`DashMap<shard file, Mutex<()>>`), so writes to
/// `a.data` never block writes to `b.data` — only same-shard writers
/// serialize. No compaction, no dedup: re-crawling a page produces a second
/// line, and ranking (see `search`) accounts for that.
pub struct IndexWriter {
    storage_dir: PathBuf,
    shard_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl IndexWriter {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            storage_dir: data_dir.as_ref().join("storage"),
            shard_locks: DashMap::new(),
        }
    }

    fn lock_for(&self, file_name: &str) -> Arc<Mutex<()>> {
        self.shard_locks
            .entry(file_name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Total posting lines across every shard file, for `/crawler/stats`.
    /// Counts occurrences, not distinct words — a word re-crawled on two
    /// pages counts twice, matching the index's own no-dedup contract.
    pub async fn total_postings(&self) -> Result<u64, CrawlError> {
        let mut entries = match tokio::fs::read_dir(&self.storage_dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(CrawlError::Persistence(e.to_string())),
        };

        let mut total = 0u64;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CrawlError::Persistence(e.to_string()))?
        {
            if entry.path().extension().and_then(|e| e.to_str()) != Some("data") {
                continue;
            }
            let contents = tokio::fs::read_to_string(entry.path())
                .await
                .map_err(|e| CrawlError::Persistence(e.to_string()))?;
            total += contents.lines().count() as u64;
        }
        Ok(total)
    }

    /// Append `postings` to their respective shard files, one line per
    /// posting. Postings are grouped by shard first so each shard is opened
    /// and locked exactly once per call.
    pub async fn append(&self, postings: &[Posting]) -> Result<(), CrawlError> {
        if postings.is_empty() {
            return Ok(());
        }

        let mut by_shard: HashMap<String, String> = HashMap::new();
        for posting in postings {
            let file_name = posting.shard_key().file_name();
            let entry = by_shard.entry(file_name).or_default();
            entry.push_str(&posting.to_line());
            entry.push('\n');
        }

        for (file_name, lines) in by_shard {
            let lock = self.lock_for(&file_name);
            let _guard = lock.lock().await;
            let path = self.storage_dir.join(&file_name);
            let path_for_blocking = path.clone();
            tokio::task::spawn_blocking(move || append_lines(&path_for_blocking, &lines))
                .await
                .map_err(|e| CrawlError::Persistence(e.to_string()))??;
        }
        Ok(())
    }
}

fn append_lines(path: &Path, lines: &str) -> Result<(), CrawlError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CrawlError::Persistence(e.to_string()))?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| CrawlError::Persistence(e.to_string()))?;
    file.write_all(lines.as_bytes())
        .map_err(|e| CrawlError::Persistence(e.to_string()))
}
