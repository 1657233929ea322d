use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;

use webcrawler_core::{CrawlError, FrontierEntry, PushOutcome, RejectReason};

use crate::visited::VisitedRegistry;

/// A single job's bounded FIFO of (url, depth) pairs, mirrored to
/// `{data_dir}/crawlers/{id}.queue` on every mutation.
pub struct Frontier {
    path: PathBuf,
    max_depth: u32,
    max_queue_capacity: usize,
    visited: Arc<VisitedRegistry>,
    queue: Mutex<VecDeque<FrontierEntry>>,
}

impl Frontier {
    pub fn new(
        data_dir: impl AsRef<Path>,
        job_id: &str,
        max_depth: u32,
        max_queue_capacity: usize,
        visited: Arc<VisitedRegistry>,
    ) -> Self {
        Self {
            path: data_dir.as_ref().join("crawlers").join(format!("{job_id}.queue")),
            max_depth,
            max_queue_capacity,
            visited,
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Rebuild a frontier from its `.queue` mirror, for `RESUME_FROM_FILES`.
    /// Malformed lines are skipped with a log entry, per the resume contract.
    pub async fn load_from_file(&self) {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(_) => return,
        };
        let mut queue = self.queue.lock().await;
        for line in contents.lines() {
            match FrontierEntry::parse_line(line) {
                Some(entry) => queue.push_back(entry),
                None => warn!(line, "skipping malformed queue line on resume"),
            }
        }
    }

    /// Enqueue `(url, depth)`. The visited check happens at enqueue time (not
    /// dequeue) to bound memory: a URL already in the Visited Registry never
    /// occupies frontier space. Back-pressure policy is drop-newest: a push
    /// against a full queue is rejected and the FIFO order of what's already
    /// queued is untouched.
    pub async fn push(&self, url: String, depth: u32) -> Result<PushOutcome, CrawlError> {
        if depth > self.max_depth {
            return Ok(PushOutcome::Rejected(RejectReason::BudgetExceeded));
        }
        if self.visited.contains(&url) {
            return Ok(PushOutcome::Rejected(RejectReason::AlreadyVisited));
        }

        let mut queue = self.queue.lock().await;
        if queue.len() >= self.max_queue_capacity {
            return Ok(PushOutcome::Rejected(RejectReason::Full));
        }
        queue.push_back(FrontierEntry { url, depth });
        self.persist_locked(&queue).await?;
        Ok(PushOutcome::Accepted)
    }

    pub async fn pop(&self) -> Option<FrontierEntry> {
        let mut queue = self.queue.lock().await;
        let popped = queue.pop_front();
        if popped.is_some() {
            if let Err(e) = self.persist_locked(&queue).await {
                warn!(error = %e, "failed to persist frontier after pop");
            }
        }
        popped
    }

    pub async fn snapshot(&self) -> Vec<FrontierEntry> {
        self.queue.lock().await.iter().cloned().collect()
    }

    pub async fn size(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.queue.lock().await.is_empty()
    }

    /// Full rewrite of the `.queue` mirror file. Acceptable given the
    /// `max_queue_capacity <= 100000` cap; see the design notes on queue
    /// persistence atomicity.
    async fn persist_locked(&self, queue: &VecDeque<FrontierEntry>) -> Result<(), CrawlError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CrawlError::Persistence(e.to_string()))?;
        }
        let mut contents = String::new();
        for entry in queue {
            contents.push_str(&entry.to_line());
            contents.push('\n');
        }
        tokio::fs::write(&self.path, contents)
            .await
            .map_err(|e| CrawlError::Persistence(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(dir: &Path) -> Arc<VisitedRegistry> {
        Arc::new(VisitedRegistry::new(dir))
    }

    #[tokio::test]
    async fn push_accepted_increments_size() {
        let dir = tempfile::tempdir().unwrap();
        let f = Frontier::new(dir.path(), "job1", 5, 10, registry(dir.path()));
        assert_eq!(f.size().await, 0);
        assert_eq!(f.push("http://a".into(), 1).await.unwrap(), PushOutcome::Accepted);
        assert_eq!(f.size().await, 1);
    }

    #[tokio::test]
    async fn push_beyond_capacity_is_rejected_full() {
        let dir = tempfile::tempdir().unwrap();
        let f = Frontier::new(dir.path(), "job1", 5, 2, registry(dir.path()));
        assert!(f.push("http://a".into(), 0).await.unwrap().is_accepted());
        assert!(f.push("http://b".into(), 0).await.unwrap().is_accepted());
        let outcome = f.push("http://c".into(), 0).await.unwrap();
        assert_eq!(outcome, PushOutcome::Rejected(RejectReason::Full));
        assert_eq!(f.size().await, 2);
    }

    #[tokio::test]
    async fn push_beyond_max_depth_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let f = Frontier::new(dir.path(), "job1", 1, 10, registry(dir.path()));
        assert_eq!(
            f.push("http://a".into(), 2).await.unwrap(),
            PushOutcome::Rejected(RejectReason::BudgetExceeded)
        );
    }

    #[tokio::test]
    async fn push_already_visited_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let visited = registry(dir.path());
        visited.mark("http://a", "job1").await.unwrap();
        let f = Frontier::new(dir.path(), "job1", 5, 10, visited);
        assert_eq!(
            f.push("http://a".into(), 0).await.unwrap(),
            PushOutcome::Rejected(RejectReason::AlreadyVisited)
        );
        assert_eq!(f.size().await, 0);
    }

    #[tokio::test]
    async fn pop_preserves_fifo_order() {
        let dir = tempfile::tempdir().unwrap();
        let f = Frontier::new(dir.path(), "job1", 5, 10, registry(dir.path()));
        f.push("http://a".into(), 0).await.unwrap();
        f.push("http://b".into(), 0).await.unwrap();
        assert_eq!(f.pop().await.unwrap().url, "http://a");
        assert_eq!(f.pop().await.unwrap().url, "http://b");
        assert!(f.pop().await.is_none());
    }

    #[tokio::test]
    async fn resume_from_files_skips_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let crawlers = dir.path().join("crawlers");
        tokio::fs::create_dir_all(&crawlers).await.unwrap();
        tokio::fs::write(
            crawlers.join("job1.queue"),
            "http://a 1\nmalformed-line\nhttp://b 2\n",
        )
        .await
        .unwrap();
        let f = Frontier::new(dir.path(), "job1", 5, 10, registry(dir.path()));
        f.load_from_file().await;
        let snap = f.snapshot().await;
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].url, "http://a");
        assert_eq!(snap[1].url, "http://b");
    }
}
