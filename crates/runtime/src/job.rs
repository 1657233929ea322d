use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{watch, Mutex, Notify, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use webcrawler_core::{CrawlError, JobConfig, JobId, JobSnapshot, JobStatus, Posting};
use webcrawler_extractor::extract;
use webcrawler_frontier::{Frontier, VisitedRegistry};
use webcrawler_index::IndexWriter;

use crate::fetcher::Fetcher;
use crate::rate_limiter::RateLimiter;

/// Number of concurrent in-flight fetches per job. The source had one worker
/// per configured network driver; this reimplementation has a single fetch
/// protocol, so a fixed small pool stands in for that per-job concurrency.
const WORKER_POOL_SIZE: usize = 8;
/// Ring buffer bound for the in-memory log, per the design notes on
/// unbounded log buffers.
const LOG_RING_CAPACITY: usize = 10_000;

/// How a job's frontier is populated the moment its dispatcher starts.
enum Bootstrap {
    /// Fresh job: seed the frontier with `(origin, depth 0)`.
    SeedOrigin,
    /// `RESUME_FROM_FILES`: rebuild the frontier from the on-disk `.queue` mirror.
    LoadFromFile,
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// One running (or paused/stopped) crawl job: its frontier, rate limiter,
/// worker pool, and status, mirrored to `{data_dir}/crawlers/{id}.status`.
pub struct JobRuntime {
    pub id: JobId,
    pub config: JobConfig,
    data_dir: PathBuf,
    status_tx: watch::Sender<JobStatus>,
    cancel: CancellationToken,
    visited_count: AtomicU64,
    in_flight: AtomicUsize,
    created_at: i64,
    updated_at: AtomicI64,
    frontier: Arc<Frontier>,
    visited_registry: Arc<VisitedRegistry>,
    index: Arc<IndexWriter>,
    logs: Mutex<VecDeque<String>>,
    status_file_lock: Mutex<()>,
    done: Notify,
}

impl JobRuntime {
    /// Create and start a brand-new job: Active from the moment it's spawned.
    pub fn start(
        id: JobId,
        config: JobConfig,
        data_dir: impl AsRef<Path>,
        visited_registry: Arc<VisitedRegistry>,
        index: Arc<IndexWriter>,
    ) -> Arc<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        let frontier = Arc::new(Frontier::new(
            &data_dir,
            &id,
            config.max_depth,
            config.max_queue_capacity,
            visited_registry.clone(),
        ));
        let (status_tx, _rx) = watch::channel(JobStatus::Active);
        let now = now_unix();
        let runtime = Arc::new(Self {
            id,
            config,
            data_dir,
            status_tx,
            cancel: CancellationToken::new(),
            visited_count: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            created_at: now,
            updated_at: AtomicI64::new(now),
            frontier,
            visited_registry,
            index,
            logs: Mutex::new(VecDeque::new()),
            status_file_lock: Mutex::new(()),
            done: Notify::new(),
        });
        tokio::spawn(runtime.clone().run(Bootstrap::SeedOrigin));
        runtime
    }

    /// Reattach a runtime to an existing `Stopped`/`Interrupted` job, with its
    /// frontier rebuilt from `{id}.queue` rather than freshly seeded from
    /// `origin` — the `RESUME_FROM_FILES` path.
    pub fn resume_from_files(
        id: JobId,
        config: JobConfig,
        created_at: i64,
        visited_count: u64,
        data_dir: impl AsRef<Path>,
        visited_registry: Arc<VisitedRegistry>,
        index: Arc<IndexWriter>,
    ) -> Arc<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        let frontier = Arc::new(Frontier::new(
            &data_dir,
            &id,
            config.max_depth,
            config.max_queue_capacity,
            visited_registry.clone(),
        ));
        let (status_tx, _rx) = watch::channel(JobStatus::Active);
        let runtime = Arc::new(Self {
            id,
            config,
            data_dir,
            status_tx,
            cancel: CancellationToken::new(),
            visited_count: AtomicU64::new(visited_count),
            in_flight: AtomicUsize::new(0),
            created_at,
            updated_at: AtomicI64::new(now_unix()),
            frontier,
            visited_registry,
            index,
            logs: Mutex::new(VecDeque::new()),
            status_file_lock: Mutex::new(()),
            done: Notify::new(),
        });
        tokio::spawn(runtime.clone().run(Bootstrap::LoadFromFile));
        runtime
    }

    pub fn status(&self) -> JobStatus {
        *self.status_tx.borrow()
    }

    pub async fn pause(&self) -> Result<(), CrawlError> {
        if self.status() != JobStatus::Active {
            return Err(CrawlError::IllegalTransition(format!(
                "cannot PAUSE job in state {}",
                self.status()
            )));
        }
        let _ = self.status_tx.send(JobStatus::Paused);
        self.log("paused".to_string()).await;
        self.persist_status().await
    }

    pub async fn resume(&self) -> Result<(), CrawlError> {
        if self.status() != JobStatus::Paused {
            return Err(CrawlError::IllegalTransition(format!(
                "cannot RESUME job in state {}",
                self.status()
            )));
        }
        let _ = self.status_tx.send(JobStatus::Active);
        self.log("resumed".to_string()).await;
        self.persist_status().await
    }

    pub async fn stop(&self) -> Result<(), CrawlError> {
        if matches!(self.status(), JobStatus::Stopped | JobStatus::Finished) {
            return Err(CrawlError::IllegalTransition(format!(
                "cannot STOP job in state {}",
                self.status()
            )));
        }
        self.cancel.cancel();
        let _ = self.status_tx.send(JobStatus::Stopped);
        self.log("stopped".to_string()).await;
        self.persist_status().await
    }

    /// Resolves once the dispatcher and every in-flight fetch have exited.
    /// A no-op if the job has already reached `Stopped`/`Finished`.
    pub async fn wait_done(&self) {
        if matches!(self.status(), JobStatus::Stopped | JobStatus::Finished) {
            return;
        }
        self.done.notified().await;
    }

    pub async fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            crawler_id: self.id.clone(),
            origin: self.config.origin.clone(),
            max_depth: self.config.max_depth,
            hit_rate: self.config.hit_rate,
            max_queue_capacity: self.config.max_queue_capacity,
            max_urls_to_visit: self.config.max_urls_to_visit,
            status: self.status(),
            visited_count: self.visited_count.load(Ordering::SeqCst),
            created_at: self.created_at,
            updated_at: self.updated_at.load(Ordering::SeqCst),
            queue: self.frontier.snapshot().await,
            logs: self.logs.lock().await.iter().cloned().collect(),
        }
    }

    async fn log(&self, line: String) {
        info!(job_id = %self.id, "{}", line);
        let mut logs = self.logs.lock().await;
        if logs.len() >= LOG_RING_CAPACITY {
            logs.pop_front();
        }
        logs.push_back(format!("[{}] {}", now_unix(), line));
    }

    async fn wait_while_paused(&self) {
        let mut rx = self.status_tx.subscribe();
        while *rx.borrow() == JobStatus::Paused {
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                _ = self.cancel.cancelled() => return,
            }
        }
    }

    fn budget_reached(&self) -> bool {
        self.config.max_urls_to_visit != 0
            && self.visited_count.load(Ordering::SeqCst) >= self.config.max_urls_to_visit
    }

    async fn run(self: Arc<Self>, bootstrap: Bootstrap) {
        match bootstrap {
            Bootstrap::SeedOrigin => {
                let origin = self.config.origin.clone();
                let _ = self.frontier.push(origin, 0).await;
            }
            Bootstrap::LoadFromFile => {
                self.frontier.load_from_file().await;
                self.log("resumed from on-disk queue and status files".to_string()).await;
            }
        }

        let rate_limiter = RateLimiter::new(self.config.hit_rate);
        let fetcher = Fetcher::with_default_timeout();
        let semaphore = Arc::new(Semaphore::new(WORKER_POOL_SIZE));

        loop {
            if self.status() == JobStatus::Stopped {
                break;
            }
            self.wait_while_paused().await;
            if self.status() == JobStatus::Stopped {
                break;
            }
            if self.budget_reached() {
                self.finish().await;
                break;
            }

            let entry = match self.frontier.pop().await {
                Some(e) => e,
                None => {
                    if self.in_flight.load(Ordering::SeqCst) == 0 {
                        self.finish().await;
                        break;
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_millis(200)) => {}
                        _ = self.cancel.cancelled() => break,
                    }
                    continue;
                }
            };

            let permit = match semaphore.clone().acquire_owned().await {
                Ok(p) => p,
                Err(_) => break,
            };
            if rate_limiter.acquire(&self.cancel).await.is_err() {
                drop(permit);
                break;
            }

            self.in_flight.fetch_add(1, Ordering::SeqCst);
            let this = self.clone();
            let fetcher = fetcher.clone();
            tokio::spawn(async move {
                this.fetch_one(entry, &fetcher).await;
                this.in_flight.fetch_sub(1, Ordering::SeqCst);
                drop(permit);
            });
        }

        while self.in_flight.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.done.notify_waiters();
    }

    async fn finish(&self) {
        let _ = self.status_tx.send(JobStatus::Finished);
        self.log("finished: frontier drained or budget reached".to_string()).await;
        let _ = self.persist_status().await;
    }

    async fn fetch_one(&self, entry: webcrawler_core::FrontierEntry, fetcher: &Fetcher) {
        let fetched = tokio::select! {
            res = fetcher.fetch(&entry.url) => res,
            _ = self.cancel.cancelled() => return,
        };

        match fetched {
            Ok(bytes) => {
                // Marked visited before parsing: idempotent even on a crash mid-parse.
                if let Ok(was_new) = self.visited_registry.mark(&entry.url, &self.id).await {
                    if !was_new {
                        return;
                    }
                }
                let result = extract(&bytes, &entry.url);
                for link in &result.links {
                    let _ = self.frontier.push(link.clone(), entry.depth + 1).await;
                }
                let postings: Vec<Posting> = result
                    .tokens
                    .into_iter()
                    .map(|(word, frequency)| Posting {
                        word,
                        relevant_url: entry.url.clone(),
                        origin_url: self.config.origin.clone(),
                        depth: entry.depth,
                        frequency,
                    })
                    .collect();
                if let Err(e) = self.index.append(&postings).await {
                    warn!(job_id = %self.id, url = %entry.url, error = %e, "failed to append postings");
                }
                self.visited_count.fetch_add(1, Ordering::SeqCst);
                self.log(format!(
                    "fetched {} (depth {}, {} links, {} words)",
                    entry.url,
                    entry.depth,
                    result.links.len(),
                    postings.len()
                ))
                .await;
            }
            Err(e) => {
                // The URL stays visited even on failure, so it's never refetched.
                let _ = self.visited_registry.mark(&entry.url, &self.id).await;
                self.log(format!("skip {}: {}", entry.url, e)).await;
            }
        }
        self.updated_at.store(now_unix(), Ordering::SeqCst);
        let _ = self.persist_status().await;
    }

    pub(crate) async fn persist_status(&self) -> Result<(), CrawlError> {
        let snapshot = self.snapshot().await;
        let path = self.data_dir.join("crawlers").join(format!("{}.status", self.id));
        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| CrawlError::Persistence(e.to_string()))?;

        let _guard = self.status_file_lock.lock().await;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CrawlError::Persistence(e.to_string()))?;
        }
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| CrawlError::Persistence(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    fn config(origin: String) -> JobConfig {
        JobConfig {
            origin,
            max_depth: 2,
            hit_rate: 50.0,
            max_queue_capacity: 1000,
            max_urls_to_visit: 0,
        }
    }

    #[tokio::test]
    async fn happy_path_crawls_and_finishes() {
        let mut server = mockito::Server::new_async().await;
        let root_url = server.url();
        let child_url = format!("{root_url}/child");

        let _root_mock = server
            .mock("GET", "/")
            .with_status(200)
            .with_body(format!(r#"<html><body><a href="{child_url}">child</a> rust</body></html>"#))
            .create_async()
            .await;
        let _child_mock = server
            .mock("GET", "/child")
            .with_status(200)
            .with_body("<html><body>leaf page rust</body></html>")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let visited = Arc::new(VisitedRegistry::new(dir.path()));
        let index = Arc::new(IndexWriter::new(dir.path()));
        let runtime = JobRuntime::start(
            "job1".to_string(),
            config(format!("{root_url}/")),
            dir.path(),
            visited.clone(),
            index.clone(),
        );

        timeout(Duration::from_secs(5), runtime.wait_done())
            .await
            .expect("job should finish within timeout");

        let snap = runtime.snapshot().await;
        assert_eq!(snap.status, JobStatus::Finished);
        assert_eq!(snap.visited_count, 2);
        assert!(visited.contains(&format!("{root_url}/")));
        assert!(visited.contains(&child_url));
    }

    #[tokio::test]
    async fn depth_cutoff_stops_link_discovery() {
        let mut server = mockito::Server::new_async().await;
        let root_url = server.url();
        let child_url = format!("{root_url}/child");

        let _root_mock = server
            .mock("GET", "/")
            .with_status(200)
            .with_body(format!(r#"<a href="{child_url}">child</a>"#))
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let visited = Arc::new(VisitedRegistry::new(dir.path()));
        let index = Arc::new(IndexWriter::new(dir.path()));
        let mut cfg = config(format!("{root_url}/"));
        cfg.max_depth = 0; // origin is depth 0; the child at depth 1 is over budget
        let runtime = JobRuntime::start("job1".to_string(), cfg, dir.path(), visited.clone(), index);

        timeout(Duration::from_secs(5), runtime.wait_done()).await.unwrap();

        assert!(visited.contains(&format!("{root_url}/")));
        assert!(!visited.contains(&child_url));
    }

    #[tokio::test]
    async fn budget_reached_finishes_early() {
        let mut server = mockito::Server::new_async().await;
        let root_url = server.url();
        let _root_mock = server
            .mock("GET", "/")
            .with_status(200)
            .with_body("<html><body>no links here</body></html>")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let visited = Arc::new(VisitedRegistry::new(dir.path()));
        let index = Arc::new(IndexWriter::new(dir.path()));
        let mut cfg = config(format!("{root_url}/"));
        cfg.max_urls_to_visit = 1;
        let runtime = JobRuntime::start("job1".to_string(), cfg, dir.path(), visited, index);

        timeout(Duration::from_secs(5), runtime.wait_done()).await.unwrap();
        assert_eq!(runtime.status(), JobStatus::Finished);
    }

    #[tokio::test]
    async fn finished_job_rejects_pause() {
        let mut server = mockito::Server::new_async().await;
        let root_url = server.url();
        let _root_mock = server
            .mock("GET", "/")
            .with_status(200)
            .with_body("<html><body>static page</body></html>")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let visited = Arc::new(VisitedRegistry::new(dir.path()));
        let index = Arc::new(IndexWriter::new(dir.path()));
        let runtime = JobRuntime::start(
            "job1".to_string(),
            config(format!("{root_url}/")),
            dir.path(),
            visited,
            index,
        );

        timeout(Duration::from_secs(5), runtime.wait_done()).await.unwrap();
        assert_eq!(runtime.status(), JobStatus::Finished);
        // A finished job can no longer be paused.
        assert!(runtime.pause().await.is_err());
    }

    #[tokio::test]
    async fn illegal_transitions_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let visited = Arc::new(VisitedRegistry::new(dir.path()));
        let index = Arc::new(IndexWriter::new(dir.path()));
        let runtime = JobRuntime::start(
            "job1".to_string(),
            config("http://127.0.0.1:1".to_string()),
            dir.path(),
            visited,
            index,
        );
        // A fresh job is Active, not Paused: RESUME is illegal regardless of
        // how far the dispatcher has since progressed.
        assert!(runtime.resume().await.is_err());
        // PAUSE is legal the instant a job starts, since `start` sets Active
        // synchronously before the dispatcher is ever polled.
        assert!(runtime.pause().await.is_ok());
    }
}
