//! HTTP access used by remote repositories.

use crate::error::{RepoError, RepoResult};
use std::fs::File;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Blocking GET primitives.
pub trait Fetcher: Send + Sync {
    /// Fetch a document as text.
    fn get_text(&self, url: &str) -> RepoResult<String>;

    /// Stream a resource into `dest`, creating or truncating the file.
    fn download(&self, url: &str, dest: &Path) -> RepoResult<()>;
}

/// [`Fetcher`] over blocking `reqwest`. Non-2xx responses are failures.
///
/// A client is built per request, so the fetcher can be created and dropped
/// from inside an async runtime as long as requests run on blocking threads.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    timeout: Option<Duration>,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self { timeout: None }
    }

    /// Abort requests that take longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn get(&self, url: &str) -> RepoResult<reqwest::blocking::Response> {
        let fetch_error = |e: reqwest::Error| RepoError::Fetch {
            url: url.to_string(),
            message: e.to_string(),
        };

        let mut builder = reqwest::blocking::Client::builder()
            .user_agent(concat!("almanac/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        debug!("GET {}", url);
        builder
            .build()
            .map_err(fetch_error)?
            .get(url)
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(fetch_error)
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher for HttpFetcher {
    fn get_text(&self, url: &str) -> RepoResult<String> {
        self.get(url)?.text().map_err(|e| RepoError::Fetch {
            url: url.to_string(),
            message: format!("Failed to read response: {}", e),
        })
    }

    fn download(&self, url: &str, dest: &Path) -> RepoResult<()> {
        let mut response = self.get(url)?;
        let mut file = File::create(dest)?;
        let bytes = response.copy_to(&mut file).map_err(|e| RepoError::Fetch {
            url: url.to_string(),
            message: format!("Failed to read response: {}", e),
        })?;
        debug!("Downloaded {} bytes from {} to {:?}", bytes, url, dest);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::time::Instant;

    #[test]
    fn test_timeout_abandons_silent_server() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/index.json", listener.local_addr().unwrap());
        std::thread::spawn(move || {
            // Accept and hold connections without answering.
            let held: Vec<_> = listener.incoming().take(4).collect();
            std::thread::sleep(Duration::from_secs(30));
            drop(held);
        });

        let fetcher = HttpFetcher::new().with_timeout(Duration::from_millis(200));
        let started = Instant::now();
        let err = fetcher.get_text(&url).unwrap_err();

        assert!(matches!(err, RepoError::Fetch { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
