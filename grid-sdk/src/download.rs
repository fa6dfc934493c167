//! Sequential object download: one byte stream over the concatenated
//! meta-chunk bodies.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use tokio::io::{AsyncRead, ReadBuf};
use tokio_util::io::StreamReader;

use crate::error::SdkError;
use crate::metachunk::MetaChunk;

type BodyReader = StreamReader<BoxStream<'static, io::Result<Bytes>>, Bytes>;
type OpeningFuture = Pin<Box<dyn Future<Output = Result<BodyReader, SdkError>> + Send>>;

/// Plain GET on the first data chunk of one meta-chunk. Single replica,
/// fail fast: no fallback to the other data chunks.
async fn open_meta_chunk(client: reqwest::Client, mc: MetaChunk) -> Result<BodyReader, SdkError> {
    let url = mc
        .data
        .first()
        .map(|c| c.url.clone())
        .ok_or(SdkError::NotFound)?;
    let resp = client.get(url).send().await?;
    let status = resp.status();
    if status.as_u16() == 404 {
        return Err(SdkError::NotFound);
    }
    if !status.is_success() {
        return Err(SdkError::TargetStatus(status.as_u16()));
    }
    let stream = resp.bytes_stream().map_err(io::Error::other).boxed();
    Ok(StreamReader::new(stream))
}

enum ReadState {
    Idle,
    Opening(OpeningFuture),
    Reading(BodyReader),
}

/// `AsyncRead` over all meta-chunks in order: EOF on the current body closes
/// it and opens the next one; any other error propagates.
pub struct ChunksReader {
    client: reqwest::Client,
    metas: Vec<MetaChunk>,
    next: usize,
    state: ReadState,
}

impl ChunksReader {
    pub(crate) fn new(client: reqwest::Client, metas: Vec<MetaChunk>) -> ChunksReader {
        ChunksReader {
            client,
            metas,
            next: 0,
            state: ReadState::Idle,
        }
    }

    pub fn meta_chunks(&self) -> &[MetaChunk] {
        &self.metas
    }
}

impl AsyncRead for ChunksReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            match &mut this.state {
                ReadState::Reading(reader) => {
                    let before = buf.filled().len();
                    match Pin::new(reader).poll_read(cx, buf) {
                        Poll::Ready(Ok(())) => {
                            if buf.filled().len() > before {
                                return Poll::Ready(Ok(()));
                            }
                            // Current meta-chunk drained, move on.
                            this.state = ReadState::Idle;
                        }
                        other => return other,
                    }
                }
                ReadState::Opening(fut) => match fut.as_mut().poll(cx) {
                    Poll::Ready(Ok(reader)) => this.state = ReadState::Reading(reader),
                    Poll::Ready(Err(e)) => {
                        this.state = ReadState::Idle;
                        return Poll::Ready(Err(io::Error::other(e)));
                    }
                    Poll::Pending => return Poll::Pending,
                },
                ReadState::Idle => {
                    if this.next >= this.metas.len() {
                        return Poll::Ready(Ok(()));
                    }
                    let mc = this.metas[this.next].clone();
                    this.next += 1;
                    let client = this.client.clone();
                    this.state = ReadState::Opening(Box::pin(open_meta_chunk(client, mc)));
                }
            }
        }
    }
}
