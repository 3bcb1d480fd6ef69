//! HTTP(S) download transport.

use std::path::Path;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::StreamExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::transfer::{ProgressFn, Transport, TransferError, TransferUnit};

pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new() -> Result<Self, TransferError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }

    /// Stream one URL to a local file, ticking progress per received chunk.
    async fn download(
        &self,
        url: &str,
        dest: &Path,
        progress: &ProgressFn,
    ) -> Result<u64, TransferError> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        // Unknown until here; chunked responses may never report a total.
        let total = response.content_length();

        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let mut file = fs::File::create(dest).await?;

        let mut stream = response.bytes_stream();
        let mut transferred = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            transferred += chunk.len() as u64;
            progress(transferred, total);
        }
        file.flush().await?;

        Ok(transferred)
    }
}

impl Transport for HttpSource {
    fn transfer<'a>(
        &'a self,
        unit: &'a TransferUnit,
        progress: &'a ProgressFn,
    ) -> BoxFuture<'a, Result<u64, TransferError>> {
        Box::pin(self.download(&unit.source, &unit.destination, progress))
    }
}
