use std::io;
use std::path::{Path, PathBuf};

use reqwest::{Client, StatusCode, Url};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

#[derive(Debug, thiserror::Error)]
#[error("fetch failed for {url}: {cause}")]
pub struct FetchError {
    pub url: String,
    #[source]
    pub cause: FetchCause,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchCause {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("remote responded with {0}")]
    Status(StatusCode),

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Downloads remote media into scratch storage.
#[derive(Clone, Debug)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// Stream `url` into `dest` and return `dest` once the whole body is on disk.
    ///
    /// The destination file is only created after a successful status line.
    pub async fn fetch(&self, url: &Url, dest: &Path) -> Result<PathBuf, FetchError> {
        self.fetch_inner(url, dest).await.map_err(|cause| FetchError {
            url: url.to_string(),
            cause,
        })?;
        Ok(dest.to_path_buf())
    }

    async fn fetch_inner(&self, url: &Url, dest: &Path) -> Result<(), FetchCause> {
        let mut response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchCause::Status(status));
        }

        let write_err = |source: io::Error| FetchCause::Write {
            path: dest.to_path_buf(),
            source,
        };

        let mut file = File::create(dest).await.map_err(write_err)?;
        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await.map_err(write_err)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(write_err)?;
        file.sync_all().await.map_err(write_err)?;

        tracing::debug!(url = %url, path = %dest.display(), bytes = written, "Download complete");
        Ok(())
    }
}
