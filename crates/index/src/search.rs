use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use webcrawler_core::{CrawlError, Posting, ShardKey};
use webcrawler_extractor::tokenize;

/// A single ranked hit returned to a `/search` caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub word: String,
    pub url: String,
    pub score: i64,
}

/// Paginated search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub total_results: usize,
    pub page: Vec<SearchHit>,
}

/// Reads the sharded postings files written by [`crate::writer::IndexWriter`]
/// and answers prefix-match queries against them.
pub struct SearchEngine {
    storage_dir: PathBuf,
}

impl SearchEngine {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            storage_dir: data_dir.as_ref().join("storage"),
        }
    }

    /// Tokenize `query` the same way pages are tokenized, group the resulting
    /// tokens by the shard file they'd match against, read each shard file at
    /// most once, score every posting whose word starts with one of the
    /// query's tokens, then sort and paginate.
    ///
    /// Score = `frequency * 10 + max(0, 100 - depth) + (50 if word == token else 0)`.
    /// Ties break by word ascending, then url ascending, for a stable order
    /// across runs.
    pub async fn search(
        &self,
        query: &str,
        page_limit: usize,
        page_offset: usize,
    ) -> Result<SearchResponse, CrawlError> {
        let tokens = tokenize(query);
        if tokens.is_empty() {
            return Ok(SearchResponse { total_results: 0, page: Vec::new() });
        }

        let mut tokens_by_shard: HashMap<String, Vec<String>> = HashMap::new();
        for token in tokens {
            let shard = ShardKey::for_word(&token).file_name();
            tokens_by_shard.entry(shard).or_default().push(token);
        }

        let mut hits: Vec<SearchHit> = Vec::new();
        for (shard_file, shard_tokens) in tokens_by_shard {
            let path = self.storage_dir.join(&shard_file);
            let contents = match tokio::fs::read_to_string(&path).await {
                Ok(c) => c,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(CrawlError::Persistence(e.to_string())),
            };

            for line in contents.lines() {
                let Some(posting) = Posting::parse_line(line) else { continue };
                for token in &shard_tokens {
                    if posting.word.starts_with(token.as_str()) {
                        hits.push(SearchHit {
                            word: posting.word.clone(),
                            url: posting.relevant_url.clone(),
                            score: score(&posting, token),
                        });
                        break;
                    }
                }
            }
        }

        hits.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.word.cmp(&b.word))
                .then_with(|| a.url.cmp(&b.url))
        });

        let total_results = hits.len();
        let page = hits.into_iter().skip(page_offset).take(page_limit).collect();
        Ok(SearchResponse { total_results, page })
    }

    /// Pick a uniformly random indexed word by sampling a random shard file
    /// (among those that exist) and a random line within it. Used by
    /// `/search/random` to let callers explore the index without a query.
    pub async fn random_word(&self) -> Result<Option<String>, CrawlError> {
        let mut entries = match tokio::fs::read_dir(&self.storage_dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CrawlError::Persistence(e.to_string())),
        };

        let mut shard_paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CrawlError::Persistence(e.to_string()))?
        {
            if entry.path().extension().and_then(|e| e.to_str()) == Some("data") {
                shard_paths.push(entry.path());
            }
        }
        if shard_paths.is_empty() {
            return Ok(None);
        }

        let mut rng = rand::thread_rng();
        shard_paths.shuffle(&mut rng);

        for path in shard_paths {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| CrawlError::Persistence(e.to_string()))?;
            let words: Vec<&str> = contents
                .lines()
                .filter_map(|l| l.split(' ').next())
                .filter(|w| !w.is_empty())
                .collect();
            if let Some(word) = words.choose(&mut rng) {
                return Ok(Some(word.to_string()));
            }
        }
        Ok(None)
    }
}

fn score(posting: &Posting, token: &str) -> i64 {
    let frequency_score = posting.frequency as i64 * 10;
    let depth_score = (100 - posting.depth as i64).max(0);
    let exact_match_bonus = if posting.word == token { 50 } else { 0 };
    frequency_score + depth_score + exact_match_bonus
}

impl PartialOrd for SearchHit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SearchHit {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .cmp(&self.score)
            .then_with(|| self.word.cmp(&other.word))
            .then_with(|| self.url.cmp(&other.url))
    }
}
