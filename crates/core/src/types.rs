use serde::{Deserialize, Serialize};

/// Opaque job identifier, assigned by the [`JobRegistry`](crate) on creation.
pub type JobId = String;

/// One entry in a job's frontier: a URL paired with its discovery depth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontierEntry {
    pub url: String,
    pub depth: u32,
}

impl FrontierEntry {
    pub fn new(url: impl Into<String>, depth: u32) -> Self {
        Self {
            url: url.into(),
            depth,
        }
    }

    /// Parse a `"{url} {depth}"` line from a `.queue` file. Malformed lines
    /// return `None` and are skipped by the caller with a log entry.
    pub fn parse_line(line: &str) -> Option<Self> {
        let mut parts = line.trim().rsplitn(2, ' ');
        let depth = parts.next()?.parse::<u32>().ok()?;
        let url = parts.next()?.to_string();
        if url.is_empty() {
            return None;
        }
        Some(Self { url, depth })
    }

    pub fn to_line(&self) -> String {
        format!("{} {}", self.url, self.depth)
    }
}

/// Why a `push` onto the frontier was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The queue is already at `max_queue_capacity`.
    Full,
    /// The URL is already in the Visited Registry.
    AlreadyVisited,
    /// The entry's depth exceeds the job's `max_depth`.
    BudgetExceeded,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RejectReason::Full => "Full",
            RejectReason::AlreadyVisited => "AlreadyVisited",
            RejectReason::BudgetExceeded => "BudgetExceeded",
        };
        f.write_str(s)
    }
}

/// Outcome of a `Frontier::push`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Accepted,
    Rejected(RejectReason),
}

impl PushOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, PushOutcome::Accepted)
    }
}

/// One line of the inverted index: a word occurrence on a crawled page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub word: String,
    pub relevant_url: String,
    pub origin_url: String,
    pub depth: u32,
    pub frequency: u64,
}

impl Posting {
    /// First character of `word`, used to pick the shard file. Follows the
    /// same rule the Word Index Writer and Search Engine both rely on.
    pub fn shard_key(&self) -> ShardKey {
        ShardKey::for_word(&self.word)
    }

    pub fn to_line(&self) -> String {
        format!(
            "{} {} {} {} {}",
            self.word, self.relevant_url, self.origin_url, self.depth, self.frequency
        )
    }

    /// Parse a `"{word} {relevant_url} {origin_url} {depth} {freq}"` shard line.
    pub fn parse_line(line: &str) -> Option<Self> {
        let mut parts = line.trim().splitn(5, ' ');
        let word = parts.next()?.to_string();
        let relevant_url = parts.next()?.to_string();
        let origin_url = parts.next()?.to_string();
        let depth = parts.next()?.parse().ok()?;
        let frequency = parts.next()?.parse().ok()?;
        Some(Self {
            word,
            relevant_url,
            origin_url,
            depth,
            frequency,
        })
    }
}

/// The shard a word's postings live in: the lowercase first character,
/// rendered as `{c}.data` for ASCII letters or `u{hex}.data` otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShardKey(String);

impl ShardKey {
    pub fn for_word(word: &str) -> Self {
        let first = word.chars().next().unwrap_or('_').to_lowercase().next().unwrap_or('_');
        if first.is_ascii_alphabetic() {
            ShardKey(first.to_string())
        } else {
            ShardKey(format!("u{:x}", first as u32))
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.data", self.0)
    }
}

/// Lifecycle state of a crawl job. See the state machine in the component design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Active,
    Paused,
    Stopped,
    Finished,
    Interrupted,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Active => "Active",
            JobStatus::Paused => "Paused",
            JobStatus::Stopped => "Stopped",
            JobStatus::Finished => "Finished",
            JobStatus::Interrupted => "Interrupted",
        };
        f.write_str(s)
    }
}

/// Client-supplied job configuration, validated by [`JobConfig::validate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub origin: String,
    pub max_depth: u32,
    #[serde(default = "default_hit_rate")]
    pub hit_rate: f64,
    #[serde(default = "default_queue_capacity")]
    pub max_queue_capacity: usize,
    /// 0 means unbounded. This meaning is deliberate, not a placeholder — see
    /// the design notes on `max_urls_to_visit=0`.
    #[serde(default)]
    pub max_urls_to_visit: u64,
}

fn default_hit_rate() -> f64 {
    1.0
}

fn default_queue_capacity() -> usize {
    1000
}

impl JobConfig {
    pub fn validate(&self) -> Result<(), crate::CrawlError> {
        if self.origin.trim().is_empty() {
            return Err(crate::CrawlError::InvalidInput("origin must not be empty".into()));
        }
        if !(1..=1000).contains(&self.max_depth) {
            return Err(crate::CrawlError::InvalidInput(
                "max_depth must be in [1, 1000]".into(),
            ));
        }
        if !(0.1..=1000.0).contains(&self.hit_rate) {
            return Err(crate::CrawlError::InvalidInput(
                "hit_rate must be in [0.1, 1000]".into(),
            ));
        }
        if !(100..=100_000).contains(&self.max_queue_capacity) {
            return Err(crate::CrawlError::InvalidInput(
                "max_queue_capacity must be in [100, 100000]".into(),
            ));
        }
        if self.max_urls_to_visit > 10_000 {
            return Err(crate::CrawlError::InvalidInput(
                "max_urls_to_visit must be in [0, 10000] (0 = unbounded)".into(),
            ));
        }
        Ok(())
    }
}

/// Merged view of a job's live runtime state and its on-disk status file,
/// returned by the registry and serialized directly as the `/crawler/status`
/// response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub crawler_id: JobId,
    pub origin: String,
    pub max_depth: u32,
    pub hit_rate: f64,
    pub max_queue_capacity: usize,
    pub max_urls_to_visit: u64,
    pub status: JobStatus,
    pub visited_count: u64,
    pub created_at: i64,
    pub updated_at: i64,
    pub queue: Vec<FrontierEntry>,
    pub logs: Vec<String>,
}

/// Aggregate platform stats for `/crawler/stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformStats {
    pub total_visited_urls: u64,
    pub total_words_in_database: u64,
    pub total_active_crawlers: u64,
    pub total_crawlers_created: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frontier_entry_line_round_trip() {
        let e = FrontierEntry::new("http://example.com/a", 3);
        assert_eq!(FrontierEntry::parse_line(&e.to_line()), Some(e));
    }

    #[test]
    fn frontier_entry_rejects_malformed_lines() {
        assert_eq!(FrontierEntry::parse_line(""), None);
        assert_eq!(FrontierEntry::parse_line("onlyoneword"), None);
        assert_eq!(FrontierEntry::parse_line("http://x not-a-number"), None);
    }

    #[test]
    fn posting_line_round_trip() {
        let p = Posting {
            word: "python".into(),
            relevant_url: "http://a".into(),
            origin_url: "http://origin".into(),
            depth: 1,
            frequency: 5,
        };
        assert_eq!(Posting::parse_line(&p.to_line()), Some(p));
    }

    #[test]
    fn shard_key_ascii_vs_unicode() {
        assert_eq!(ShardKey::for_word("python").file_name(), "a.data".replace('a', "p"));
        assert_eq!(ShardKey::for_word("élan").file_name(), "ue9.data");
    }

    #[test]
    fn job_config_validates_bounds() {
        let mut cfg = JobConfig {
            origin: "http://example.com".into(),
            max_depth: 0,
            hit_rate: 1.0,
            max_queue_capacity: 1000,
            max_urls_to_visit: 0,
        };
        assert!(cfg.validate().is_err());
        cfg.max_depth = 5;
        assert!(cfg.validate().is_ok());
        cfg.max_urls_to_visit = 20_000;
        assert!(cfg.validate().is_err());
    }
}
