use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{info, warn};
use uuid::Uuid;

use webcrawler_core::{CrawlError, JobConfig, JobId, JobSnapshot, JobStatus, PlatformStats};
use webcrawler_frontier::VisitedRegistry;
use webcrawler_index::IndexWriter;

use crate::job::JobRuntime;

/// Thread-safe job-id → runtime map, plus the startup reconciliation that
/// turns orphaned `Active`/`Paused` status files into `Interrupted` jobs.
///
/// Only one `JobRegistry` exists per process; it owns the process-wide
/// [`VisitedRegistry`] and [`IndexWriter`] and hands shared clones of both to
/// every job it creates.
pub struct JobRegistry {
    data_dir: PathBuf,
    jobs: DashMap<JobId, Arc<JobRuntime>>,
    visited: Arc<VisitedRegistry>,
    index: Arc<IndexWriter>,
    total_created: AtomicU64,
}

impl JobRegistry {
    pub async fn new(data_dir: impl AsRef<Path>) -> Result<Self, CrawlError> {
        let data_dir = data_dir.as_ref().to_path_buf();
        let visited = Arc::new(VisitedRegistry::new(&data_dir));
        visited.load_all().await?;
        let index = Arc::new(IndexWriter::new(&data_dir));

        let registry = Self {
            data_dir,
            jobs: DashMap::new(),
            visited,
            index,
            total_created: AtomicU64::new(0),
        };
        registry.reconcile_on_startup().await?;
        Ok(registry)
    }

    /// Scan `{data_dir}/crawlers/*.status` for jobs left `Active`/`Paused` by
    /// a prior process — those have no attached runtime now, so per the
    /// state machine they become `Interrupted` on disk. `RESUME_FROM_FILES`
    /// is required to bring them back.
    async fn reconcile_on_startup(&self) -> Result<(), CrawlError> {
        let crawlers_dir = self.data_dir.join("crawlers");
        let mut entries = match tokio::fs::read_dir(&crawlers_dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(CrawlError::Persistence(e.to_string())),
        };

        let mut reconciled = 0u64;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CrawlError::Persistence(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("status") {
                continue;
            }
            let contents = match tokio::fs::read_to_string(&path).await {
                Ok(c) => c,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to read status file during reconciliation");
                    continue;
                }
            };
            let mut snapshot: JobSnapshot = match serde_json::from_str(&contents) {
                Ok(s) => s,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unparseable status file");
                    continue;
                }
            };
            if matches!(snapshot.status, JobStatus::Active | JobStatus::Paused) {
                snapshot.status = JobStatus::Interrupted;
                let json = serde_json::to_string_pretty(&snapshot)
                    .map_err(|e| CrawlError::Persistence(e.to_string()))?;
                tokio::fs::write(&path, json)
                    .await
                    .map_err(|e| CrawlError::Persistence(e.to_string()))?;
                reconciled += 1;
            }
            self.total_created.fetch_add(1, Ordering::Relaxed);
        }
        if reconciled > 0 {
            info!(reconciled, "marked orphaned jobs Interrupted at startup");
        }
        Ok(())
    }

    pub async fn create(&self, config: JobConfig) -> Result<JobId, CrawlError> {
        config.validate()?;
        let id = Uuid::new_v4().to_string();
        let runtime = JobRuntime::start(
            id.clone(),
            config,
            &self.data_dir,
            self.visited.clone(),
            self.index.clone(),
        );
        self.jobs.insert(id.clone(), runtime);
        self.total_created.fetch_add(1, Ordering::Relaxed);
        Ok(id)
    }

    pub async fn pause(&self, id: &str) -> Result<(), CrawlError> {
        self.live(id)?.pause().await
    }

    pub async fn resume(&self, id: &str) -> Result<(), CrawlError> {
        self.live(id)?.resume().await
    }

    pub async fn stop(&self, id: &str) -> Result<(), CrawlError> {
        self.live(id)?.stop().await
    }

    /// Bring a `Stopped`/`Interrupted` job back to `Active`, rebuilding its
    /// frontier from `{id}.queue` and continuing `visited_count` from its
    /// last `.status` snapshot.
    pub async fn resume_from_files(&self, id: &str) -> Result<(), CrawlError> {
        if let Some(existing) = self.jobs.get(id) {
            if !matches!(existing.status(), JobStatus::Stopped) {
                return Err(CrawlError::IllegalTransition(format!(
                    "cannot RESUME_FROM_FILES job in state {}",
                    existing.status()
                )));
            }
        }

        let status_path = self.data_dir.join("crawlers").join(format!("{id}.status"));
        let contents = tokio::fs::read_to_string(&status_path)
            .await
            .map_err(|_| CrawlError::NotFound(format!("no status file for job {id}")))?;
        let snapshot: JobSnapshot =
            serde_json::from_str(&contents).map_err(|e| CrawlError::Persistence(e.to_string()))?;
        if !matches!(snapshot.status, JobStatus::Stopped | JobStatus::Interrupted) {
            return Err(CrawlError::IllegalTransition(format!(
                "cannot RESUME_FROM_FILES job in state {}",
                snapshot.status
            )));
        }

        let config = JobConfig {
            origin: snapshot.origin,
            max_depth: snapshot.max_depth,
            hit_rate: snapshot.hit_rate,
            max_queue_capacity: snapshot.max_queue_capacity,
            max_urls_to_visit: snapshot.max_urls_to_visit,
        };
        let runtime = JobRuntime::resume_from_files(
            id.to_string(),
            config,
            snapshot.created_at,
            snapshot.visited_count,
            &self.data_dir,
            self.visited.clone(),
            self.index.clone(),
        );
        self.jobs.insert(id.to_string(), runtime);
        Ok(())
    }

    /// For a live job this reads in-memory state; for a job that only
    /// exists on disk (e.g. `Interrupted` after a restart, with no runtime
    /// attached by `reconcile_on_startup`) this falls back to the last
    /// persisted `.status` file, per §4.6.
    pub async fn snapshot(&self, id: &str) -> Result<JobSnapshot, CrawlError> {
        if let Some(runtime) = self.jobs.get(id) {
            return Ok(runtime.snapshot().await);
        }
        self.read_status_file(id)
            .await?
            .ok_or_else(|| CrawlError::NotFound(format!("no job {id}")))
    }

    pub async fn list(&self) -> Vec<JobSnapshot> {
        let mut snapshots = Vec::with_capacity(self.jobs.len());
        let mut seen = std::collections::HashSet::new();
        for entry in self.jobs.iter() {
            seen.insert(entry.key().clone());
            snapshots.push(entry.value().snapshot().await);
        }

        let crawlers_dir = self.data_dir.join("crawlers");
        if let Ok(mut entries) = tokio::fs::read_dir(&crawlers_dir).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("status") {
                    continue;
                }
                let Some(id) = path.file_stem().and_then(|s| s.to_str()) else { continue };
                if seen.contains(id) {
                    continue;
                }
                if let Ok(Some(snapshot)) = self.read_status_file(id).await {
                    snapshots.push(snapshot);
                }
            }
        }
        snapshots
    }

    /// Read `crawlers/{id}.status` directly, for jobs with no live runtime.
    async fn read_status_file(&self, id: &str) -> Result<Option<JobSnapshot>, CrawlError> {
        let status_path = self.data_dir.join("crawlers").join(format!("{id}.status"));
        let contents = match tokio::fs::read_to_string(&status_path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CrawlError::Persistence(e.to_string())),
        };
        let snapshot: JobSnapshot =
            serde_json::from_str(&contents).map_err(|e| CrawlError::Persistence(e.to_string()))?;
        Ok(Some(snapshot))
    }

    pub async fn stats(&self) -> Result<PlatformStats, CrawlError> {
        let mut active = 0u64;
        for entry in self.jobs.iter() {
            if entry.value().status() == JobStatus::Active {
                active += 1;
            }
        }
        Ok(PlatformStats {
            total_visited_urls: self.visited.len() as u64,
            total_words_in_database: self.index.total_postings().await?,
            total_active_crawlers: active,
            total_crawlers_created: self.total_created.load(Ordering::Relaxed),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Stop every live job. Used by `/crawler/clear` before the caller wipes
    /// the on-disk data directory and rebuilds a fresh registry in its place.
    pub async fn stop_all(&self) {
        for entry in self.jobs.iter() {
            let _ = entry.value().stop().await;
        }
    }

    fn live(&self, id: &str) -> Result<Arc<JobRuntime>, CrawlError> {
        self.jobs
            .get(id)
            .map(|r| r.value().clone())
            .ok_or_else(|| CrawlError::NotFound(format!("no live job {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;
    use webcrawler_core::JobConfig;

    fn config(origin: String) -> JobConfig {
        JobConfig {
            origin,
            max_depth: 3,
            hit_rate: 50.0,
            max_queue_capacity: 1000,
            max_urls_to_visit: 0,
        }
    }

    #[tokio::test]
    async fn create_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new(dir.path()).await.unwrap();
        let bad = JobConfig {
            origin: String::new(),
            max_depth: 3,
            hit_rate: 1.0,
            max_queue_capacity: 1000,
            max_urls_to_visit: 0,
        };
        assert!(registry.create(bad).await.is_err());
    }

    #[tokio::test]
    async fn lifecycle_resume_from_files_after_stop() {
        let mut server = mockito::Server::new_async().await;
        let root_url = server.url();
        let _mock = server
            .mock("GET", "/")
            .with_status(200)
            .with_body("<html><body>no links here, just words</body></html>")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new(dir.path()).await.unwrap();
        let id = registry.create(config(format!("{root_url}/"))).await.unwrap();

        let snap = registry.snapshot(&id).await.unwrap();
        assert!(matches!(snap.status, JobStatus::Active | JobStatus::Finished));

        // Stop might race a fast Finish; either way the job is no longer Active.
        let _ = registry.stop(&id).await;
        let stopped_or_finished = registry.snapshot(&id).await.unwrap().status;
        assert!(matches!(stopped_or_finished, JobStatus::Stopped | JobStatus::Finished));

        if stopped_or_finished == JobStatus::Stopped {
            timeout(Duration::from_secs(2), registry.resume_from_files(&id))
                .await
                .expect("resume_from_files should not hang")
                .unwrap();
            assert_eq!(registry.snapshot(&id).await.unwrap().status, JobStatus::Active);
        }
    }

    #[tokio::test]
    async fn stats_reports_created_count() {
        let mut server = mockito::Server::new_async().await;
        let root_url = server.url();
        let _mock = server.mock("GET", "/").with_status(200).with_body("<html></html>").create_async().await;

        let dir = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new(dir.path()).await.unwrap();
        registry.create(config(format!("{root_url}/"))).await.unwrap();
        let stats = registry.stats().await.unwrap();
        assert_eq!(stats.total_crawlers_created, 1);
    }

    #[tokio::test]
    async fn reconcile_on_startup_marks_orphans_interrupted() {
        let dir = tempfile::tempdir().unwrap();
        let crawlers = dir.path().join("crawlers");
        tokio::fs::create_dir_all(&crawlers).await.unwrap();
        let snapshot = JobSnapshot {
            crawler_id: "orphan".into(),
            origin: "http://example.com".into(),
            max_depth: 3,
            hit_rate: 1.0,
            max_queue_capacity: 1000,
            max_urls_to_visit: 0,
            status: JobStatus::Active,
            visited_count: 5,
            created_at: 0,
            updated_at: 0,
            queue: Vec::new(),
            logs: Vec::new(),
        };
        tokio::fs::write(
            crawlers.join("orphan.status"),
            serde_json::to_string(&snapshot).unwrap(),
        )
        .await
        .unwrap();

        let registry = JobRegistry::new(dir.path()).await.unwrap();
        let contents = tokio::fs::read_to_string(crawlers.join("orphan.status")).await.unwrap();
        let reloaded: JobSnapshot = serde_json::from_str(&contents).unwrap();
        assert_eq!(reloaded.status, JobStatus::Interrupted);

        // No live runtime is attached for an orphan, so snapshot/list must
        // fall back to the on-disk file rather than returning NotFound.
        let snap = registry.snapshot("orphan").await.unwrap();
        assert_eq!(snap.status, JobStatus::Interrupted);
        assert_eq!(snap.max_urls_to_visit, 0);

        let listed = registry.list().await;
        assert!(listed.iter().any(|s| s.crawler_id == "orphan"));
    }
}
