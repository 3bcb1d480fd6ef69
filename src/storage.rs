//! Object-storage upload transport.
//!
//! Backends are typed variants; each constructs its own `object_store`
//! client. Uploads stream the file in fixed-size parts with a small number
//! of parts in flight, ticking progress as parts are handed off.

use std::path::Path;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{MultipartUpload, ObjectStore, PutPayload};
use serde::Deserialize;
use tokio::io::AsyncReadExt;

use crate::transfer::{ProgressFn, Transport, TransferError, TransferUnit};

/// Multipart part size (1 MiB).
const PART_SIZE: usize = 1024 * 1024;
/// Parts uploaded concurrently per file.
const PARTS_IN_FLIGHT: usize = 4;

/// Supported storage backends, selected with `-t/--type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// Aliyun OSS, addressed through its S3-compatible endpoint.
    #[value(name = "ali", alias = "aliyun-oss")]
    AliyunOss,
}

/// Credentials and addressing read from the `-c/--config` JSON file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OssConfig {
    pub region: String,
    pub bucket: String,
    pub access_key_id: String,
    pub access_key_secret: String,
    /// Defaults to the region's public endpoint.
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl OssConfig {
    fn endpoint(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("https://{}.aliyuncs.com", self.region))
    }
}

pub struct StorageSink {
    store: Arc<dyn ObjectStore>,
}

impl StorageSink {
    pub fn connect(backend: Backend, config: &OssConfig) -> Result<Self, TransferError> {
        let store: Arc<dyn ObjectStore> = match backend {
            Backend::AliyunOss => Arc::new(
                AmazonS3Builder::new()
                    .with_endpoint(config.endpoint())
                    .with_region(&config.region)
                    .with_bucket_name(&config.bucket)
                    .with_access_key_id(&config.access_key_id)
                    .with_secret_access_key(&config.access_key_secret)
                    .with_virtual_hosted_style_request(true)
                    .build()?,
            ),
        };
        Ok(Self { store })
    }

    async fn upload(
        &self,
        source: &Path,
        key: &ObjectPath,
        progress: &ProgressFn,
    ) -> Result<u64, TransferError> {
        let mut file = tokio::fs::File::open(source).await?;
        let total = file.metadata().await?.len();

        // Nothing to split below one part; a single put also covers the
        // zero-byte case multipart completion rejects.
        if total as usize <= PART_SIZE {
            let mut buf = Vec::with_capacity(total as usize);
            file.read_to_end(&mut buf).await?;
            self.store.put(key, PutPayload::from(buf)).await?;
            progress(total, Some(total));
            return Ok(total);
        }

        let mut upload = self.store.put_multipart(key).await?;
        match stream_parts(&mut upload, &mut file, total, progress).await {
            Ok(sent) => {
                upload.complete().await?;
                Ok(sent)
            }
            Err(err) => {
                // Drop the unfinished parts on the server side.
                let _ = upload.abort().await;
                Err(err)
            }
        }
    }
}

/// Feed the file to the upload part by part, keeping up to
/// `PARTS_IN_FLIGHT` parts outstanding.
async fn stream_parts(
    upload: &mut Box<dyn MultipartUpload>,
    file: &mut tokio::fs::File,
    total: u64,
    progress: &ProgressFn,
) -> Result<u64, TransferError> {
    let mut in_flight = FuturesUnordered::new();
    let mut sent = 0u64;

    loop {
        let mut buf = vec![0u8; PART_SIZE];
        let n = read_full(file, &mut buf).await?;
        if n == 0 {
            break;
        }
        buf.truncate(n);

        while in_flight.len() >= PARTS_IN_FLIGHT {
            if let Some(part) = in_flight.next().await {
                part?;
            }
        }
        in_flight.push(upload.put_part(PutPayload::from(buf)));

        sent += n as u64;
        progress(sent, Some(total));
    }

    while let Some(part) = in_flight.next().await {
        part?;
    }
    Ok(sent)
}

/// Read until `buf` is full or EOF; returns bytes read.
async fn read_full(file: &mut tokio::fs::File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

impl Transport for StorageSink {
    fn transfer<'a>(
        &'a self,
        unit: &'a TransferUnit,
        progress: &'a ProgressFn,
    ) -> BoxFuture<'a, Result<u64, TransferError>> {
        Box::pin(async move {
            let key = ObjectPath::from(unit.destination.to_string_lossy().as_ref());
            self.upload(Path::new(&unit.source), &key, progress).await
        })
    }

    /// Nothing local to remove; unfinished multipart uploads were already
    /// aborted in the transfer path.
    fn cleanup<'a>(&'a self, _unit: &'a TransferUnit) -> BoxFuture<'a, Result<(), TransferError>> {
        Box::pin(async { Ok(()) })
    }
}
