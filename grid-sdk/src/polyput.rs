//! Parallel fan-out PUT: one source, N identical streaming uploads.

use std::io;

use bytes::Bytes;
use reqwest::header::CONTENT_LENGTH;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use crate::error::SdkError;
use crate::proxy::http_client;
use crate::slice_reader::SliceReader;
use crate::RAWX_HEADER_PREFIX;

const READ_BUF_SIZE: usize = 8192;

/// Per-target window: how many in-flight buffers a worker may hold before
/// the coordinator stops feeding it.
const WINDOW: usize = 8;

/// One PUT per target, all streaming the same bytes.
///
/// The coordinator reads the source in fixed-size buffers and hands each one
/// to every live worker through a bounded channel; the channel capacity is
/// the per-worker credit window, so a slow replica parks the coordinator
/// instead of buffering unboundedly. A worker failure drops its receiver,
/// which the coordinator observes on the next send and stops feeding that
/// target, the rest continue. Success requires a quorum of workers.
pub struct PolyPut {
    client: reqwest::Client,
    targets: Vec<String>,
    headers: Vec<(String, String)>,
}

impl PolyPut {
    pub fn new() -> Result<PolyPut, SdkError> {
        Ok(PolyPut::with_client(http_client()?))
    }

    pub fn with_client(client: reqwest::Client) -> PolyPut {
        PolyPut {
            client,
            targets: Vec::new(),
            headers: Vec::new(),
        }
    }

    pub fn add_target(&mut self, url: &str) {
        self.targets.push(url.to_string());
    }

    pub fn add_header(&mut self, key: &str, value: &str) {
        self.headers.push((key.to_string(), value.to_string()));
    }

    /// Stream `src.len()` bytes to every target.
    ///
    /// Returns [`SdkError::QuorumNotReached`] when `failures >= 1 + N/2`;
    /// fewer failures are tolerated silently, repair is the caller's concern.
    pub async fn execute<R: AsyncRead + Unpin>(
        &self,
        src: &mut SliceReader<R>,
    ) -> Result<(), SdkError> {
        if self.targets.is_empty() {
            return Err(SdkError::InvalidConfig("fan-out without targets".to_string()));
        }
        let length = src.len();

        let mut feeds = Vec::with_capacity(self.targets.len());
        let mut workers = Vec::with_capacity(self.targets.len());
        for url in &self.targets {
            let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(WINDOW);
            let mut req = self
                .client
                .put(url)
                .header(CONTENT_LENGTH, length)
                .header("Content-Type", "octet/stream")
                .header(
                    format!("{RAWX_HEADER_PREFIX}chunk-id"),
                    basename(url).to_string(),
                )
                .body(reqwest::Body::wrap_stream(ReceiverStream::new(rx)));
            for (key, value) in &self.headers {
                req = req.header(key.as_str(), value.as_str());
            }
            workers.push(tokio::spawn(async move {
                let resp = req.send().await?;
                let status = resp.status();
                if status.is_success() {
                    Ok(())
                } else {
                    Err(SdkError::TargetStatus(status.as_u16()))
                }
            }));
            feeds.push(Some(tx));
        }

        // Feed every live worker, round-robin over the same buffer.
        let mut buf = [0u8; READ_BUF_SIZE];
        let mut read_err = None;
        loop {
            let count = match src.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    read_err = Some(e);
                    break;
                }
            };
            let bytes = Bytes::copy_from_slice(&buf[..count]);
            for feed in feeds.iter_mut() {
                if let Some(tx) = feed {
                    if tx.send(Ok(bytes.clone())).await.is_err() {
                        // The worker died; stop feeding it, keep the rest.
                        *feed = None;
                    }
                }
            }
        }
        // End of stream: closing the channels ends every request body.
        drop(feeds);

        let mut failures = 0usize;
        for worker in workers {
            match worker.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!(error = %e, "fan-out target failed");
                    failures += 1;
                }
                Err(_) => failures += 1,
            }
        }

        if failures >= 1 + self.targets.len() / 2 {
            return Err(SdkError::QuorumNotReached);
        }
        if let Some(e) = read_err {
            return Err(e.into());
        }
        Ok(())
    }
}

fn basename(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}
