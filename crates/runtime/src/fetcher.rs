use std::error::Error as _;
use std::time::Duration;

use reqwest::Client;
use tracing::warn;

use webcrawler_core::CrawlError;

const USER_AGENT: &str = "webcrawler/0.1 (+https://example.invalid/bot)";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Fetches page bodies over HTTPS, retrying once without certificate
/// verification when the first attempt fails on a TLS error.
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    insecure_client: Client,
}

impl Fetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: build_client(timeout, false),
            insecure_client: build_client(timeout, true),
        }
    }

    pub fn with_default_timeout() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Fetch `url`'s body as raw bytes. A TLS failure on the first attempt
    /// triggers exactly one retry against a client that skips certificate
    /// verification; any other network error is returned unretried.
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, CrawlError> {
        match self.client.get(url).send().await {
            Ok(resp) => read_body(resp).await,
            Err(e) if is_tls_error(&e) => {
                warn!(url, "TLS verification failed, retrying without certificate verification");
                let resp = self
                    .insecure_client
                    .get(url)
                    .send()
                    .await
                    .map_err(to_crawl_error)?;
                read_body(resp).await
            }
            Err(e) => Err(to_crawl_error(e)),
        }
    }
}

fn build_client(timeout: Duration, accept_invalid_certs: bool) -> Client {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::limited(10))
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()
        .expect("failed to build HTTP client")
}

async fn read_body(resp: reqwest::Response) -> Result<Vec<u8>, CrawlError> {
    resp.bytes().await.map(|b| b.to_vec()).map_err(to_crawl_error)
}

fn is_tls_error(err: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = err.source();
    while let Some(s) = source {
        let msg = s.to_string().to_lowercase();
        if msg.contains("certificate") || msg.contains("tls") || msg.contains("ssl") {
            return true;
        }
        source = s.source();
    }
    false
}

fn to_crawl_error(err: reqwest::Error) -> CrawlError {
    if err.is_timeout() {
        CrawlError::Timeout(DEFAULT_TIMEOUT_SECS)
    } else {
        CrawlError::Network(err.to_string())
    }
}
