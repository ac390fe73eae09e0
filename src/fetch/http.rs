// src/fetch/http.rs
// =============================================================================
// This module fetches pages and images over HTTP.
//
// Key functionality:
// - One shared reqwest client (connection pooling, timeouts, redirect limit)
// - Pages come back as text, and only when the server says they are HTML
// - Images are streamed chunk by chunk straight into their destination file,
//   which is flushed and synced before success is reported
// - Failures are categorized (timeout, HTTP status, network, disk) so the
//   coordinator can log them; nothing is retried
// =============================================================================

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;
use url::Url;

const USER_AGENT: &str = concat!("site-mirror/", env!("CARGO_PKG_VERSION"));
const MAX_REDIRECTS: usize = 5;

#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection refused, DNS failure, TLS error, broken body stream...
    #[error("network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("timeout fetching {url}")]
    Timeout { url: String },

    /// The server answered with a non-2xx status
    #[error("HTTP {status} fetching {url}")]
    HttpStatus { url: String, status: u16 },

    /// A page URL answered with something other than HTML (an image, a PDF...)
    #[error("{url} is not an HTML page ({content_type})")]
    NotHtml { url: String, content_type: String },

    /// Creating, writing or syncing the destination file failed
    #[error("IO error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    fn from_reqwest(url: &Url, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else {
            FetchError::Network {
                url: url.to_string(),
                source: error,
            }
        }
    }

    fn io(path: &Path, source: std::io::Error) -> Self {
        FetchError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    // Builds the shared client
    //
    // `timeout` bounds every request end to end; connecting gets at most
    // 10 seconds of it.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;

        Ok(Self { client })
    }

    // Fetches a page body as text
    //
    // A response without a Content-Type header is treated as HTML.
    pub async fn fetch_page(&self, url: &Url) -> Result<String, FetchError> {
        let response = self.get(url).await?;

        if let Some(content_type) = response.headers().get(CONTENT_TYPE) {
            let content_type = content_type.to_str().unwrap_or_default();
            if !is_html(content_type) {
                return Err(FetchError::NotHtml {
                    url: url.to_string(),
                    content_type: content_type.to_string(),
                });
            }
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))
    }

    // Downloads `url` into `dest`, returning the number of bytes written
    //
    // A partially written file is removed when the transfer fails.
    pub async fn download(&self, url: &Url, dest: &Path) -> Result<u64, FetchError> {
        let response = self.get(url).await?;

        let mut file = File::create(dest)
            .await
            .map_err(|e| FetchError::io(dest, e))?;

        match stream_to_file(&mut file, response, url, dest).await {
            Ok(bytes) => {
                debug!("Downloaded {} bytes from {} to {:?}", bytes, url, dest);
                Ok(bytes)
            }
            Err(e) => {
                drop(file);
                let _ = tokio::fs::remove_file(dest).await;
                Err(e)
            }
        }
    }

    async fn get(&self, url: &Url) -> Result<Response, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response)
    }
}

fn is_html(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    matches!(mime.as_str(), "text/html" | "application/xhtml+xml")
}

async fn stream_to_file(
    file: &mut File,
    response: Response,
    url: &Url,
    path: &Path,
) -> Result<u64, FetchError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| FetchError::from_reqwest(url, e))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| FetchError::io(path, e))?;
        written += chunk.len() as u64;
    }

    // Only report success once the bytes are on disk
    writer.flush().await.map_err(|e| FetchError::io(path, e))?;
    writer
        .into_inner()
        .sync_all()
        .await
        .map_err(|e| FetchError::io(path, e))?;

    Ok(written)
}
