//! HTTP utilities
//!
//! Streaming download of one artifact into scratch space with throttled
//! progress. There is no retry here: a failed transfer is terminal and the
//! user re-requests it.

use futures::StreamExt;
use reqwest::Client;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::downloader::config::InstallerConfig;
use crate::downloader::core::{DownloadError, ProgressCallback, ProgressThrottle, Result, TransferProgress};

/// HTTP client with integrated streaming download
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    timeout: Duration,
    progress_interval: Duration,
}

impl HttpClient {
    /// Create a new HTTP client from configuration
    pub fn from_config(config: &InstallerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| DownloadError::Configuration {
                message: format!("failed to create HTTP client: {}", e),
                field: None,
            })?;

        Ok(Self {
            client,
            timeout: config.timeout,
            progress_interval: config.progress_interval,
        })
    }

    fn check_url(url: &str) -> Result<()> {
        let parsed = url::Url::parse(url).map_err(|source| DownloadError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        match parsed.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(DownloadError::UnsupportedUrl {
                url: url.to_string(),
                scheme: scheme.to_string(),
            }),
        }
    }

    fn transport_error(&self, url: &str, error: reqwest::Error) -> DownloadError {
        if error.is_timeout() {
            DownloadError::NetworkTimeout {
                url: url.to_string(),
                duration_secs: self.timeout.as_secs(),
            }
        } else {
            DownloadError::Transport {
                url: url.to_string(),
                source: error,
            }
        }
    }

    /// Stream `url` into `dest_path`, returning the byte count
    ///
    /// Progress reports are non-decreasing, spaced by the configured interval,
    /// and the last one always carries the final count.
    pub async fn download_to_file(
        &self,
        url: &str,
        dest_path: &Path,
        progress_callback: Option<ProgressCallback>,
    ) -> Result<u64> {
        Self::check_url(url)?;
        debug!("Stream downloading: {} to {}", url, dest_path.display());

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let total = response.content_length();
        debug!("Content length: {:?}", total);

        let mut file = fs::File::create(dest_path)
            .await
            .map_err(|source| DownloadError::DownloadIo { path: dest_path.to_path_buf(), source })?;

        let mut stream = response.bytes_stream();
        let mut downloaded = 0u64;
        let start_time = Instant::now();
        let mut throttle = ProgressThrottle::new(self.progress_interval);

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| self.transport_error(url, e))?;
            file.write_all(&chunk)
                .await
                .map_err(|source| DownloadError::DownloadIo { path: dest_path.to_path_buf(), source })?;
            downloaded += chunk.len() as u64;

            if let Some(ref callback) = progress_callback {
                if throttle.should_emit(Instant::now(), false) {
                    callback(progress(downloaded, total, start_time));
                }
            }
        }

        file.flush()
            .await
            .map_err(|source| DownloadError::DownloadIo { path: dest_path.to_path_buf(), source })?;

        if let Some(ref callback) = progress_callback {
            if throttle.should_emit(Instant::now(), true) {
                callback(progress(downloaded, total.or(Some(downloaded)), start_time));
            }
        }

        debug!("Stream download completed: {} bytes", downloaded);
        Ok(downloaded)
    }
}

fn progress(downloaded: u64, total: Option<u64>, start_time: Instant) -> TransferProgress {
    let elapsed = start_time.elapsed().as_secs_f64();
    let speed_bps = if elapsed > 0.0 { downloaded as f64 / elapsed } else { 0.0 };
    TransferProgress {
        downloaded,
        total,
        speed_bps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> HttpClient {
        HttpClient::from_config(&InstallerConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn streams_body_and_reports_final_progress() {
        let server = MockServer::start().await;
        let body = vec![7u8; 64 * 1024];
        Mock::given(method("GET"))
            .and(path("/mod.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("mod.zip");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: ProgressCallback = Arc::new(move |p| sink.lock().unwrap().push(p.downloaded));

        let size = client()
            .download_to_file(&format!("{}/mod.zip", server.uri()), &dest, Some(callback))
            .await
            .unwrap();

        assert_eq!(size, body.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), body);
        let seen = seen.lock().unwrap();
        assert_eq!(*seen.last().unwrap(), body.len() as u64);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let err = client()
            .download_to_file(&format!("{}/missing.zip", server.uri()), &dir.path().join("x"), None)
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::HttpStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let config = InstallerConfig::default().with_timeout(Duration::from_millis(200));
        let client = HttpClient::from_config(&config).unwrap();
        let dir = tempdir().unwrap();
        let err = client
            .download_to_file(&format!("{}/slow.zip", server.uri()), &dir.path().join("x"), None)
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::NetworkTimeout { .. }));
    }

    #[tokio::test]
    async fn only_http_schemes_are_fetched() {
        let dir = tempdir().unwrap();
        let err = client()
            .download_to_file("file:///etc/passwd", &dir.path().join("x"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::UnsupportedUrl { .. }));
    }

    #[tokio::test]
    async fn unparseable_url_names_the_request() {
        let dir = tempdir().unwrap();
        let err = client()
            .download_to_file("not a url", &dir.path().join("x"), None)
            .await
            .unwrap_err();

        match err {
            DownloadError::InvalidUrl { url, .. } => assert_eq!(url, "not a url"),
            other => panic!("expected invalid url, got {other:?}"),
        }
        assert!(!dir.path().join("x").exists());
    }
}
