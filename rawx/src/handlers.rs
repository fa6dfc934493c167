use std::io::{self, Read, Write};

use bytes::Bytes;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use md5::{Digest, Md5};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::ReaderStream;
use tracing::warn;

use chunk_storage::{ChunkWriter, FileReader, StoreError};

use crate::headers::{
    attr_name, ATTR_CHUNK_HASH, ATTR_COMPRESSION, ATTR_MAP, COMPRESSION_ZLIB, HEADER_CHUNK_HASH,
    HEADER_CHUNK_META_HASH, HEADER_ERROR, HEADER_LIST_TRUNCATED,
};
use crate::server::{HttpBody, RawxService};

const READ_BUF_SIZE: usize = 16384;
const DEFAULT_LIST_MAX: usize = 10000;

/// Request-level failures with their HTTP mapping.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("Missing mandatory header {0}")]
    MissingHeader(String),

    #[error("Missing content length")]
    MissingContentLength,

    #[error("MD5 sum mismatch")]
    Md5Mismatch,

    #[error("Compression mode not managed")]
    CompressionNotManaged,

    #[error("Unexpected end of request body")]
    ShortBody,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("request body error: {0}")]
    Body(#[from] hyper::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl RequestError {
    pub fn status(&self) -> StatusCode {
        match self {
            RequestError::MissingHeader(_) | RequestError::MissingContentLength => {
                StatusCode::BAD_REQUEST
            }
            RequestError::Store(e) => match e {
                StoreError::ChunkExists => StatusCode::FORBIDDEN,
                StoreError::InvalidChunkName
                | StoreError::InvalidListMarker
                | StoreError::InvalidListPrefix => StatusCode::BAD_REQUEST,
                StoreError::NotFound => StatusCode::NOT_FOUND,
                e if e.is_not_found() => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub fn full_body(body: impl Into<Bytes>) -> HttpBody {
    Full::new(body.into()).map_err(io::Error::other).boxed()
}

fn reply(status: StatusCode) -> Response<HttpBody> {
    Response::builder()
        .status(status)
        .body(full_body(Bytes::new()))
        .unwrap()
}

pub fn reply_error(e: &RequestError) -> Response<HttpBody> {
    let mut resp = reply(e.status());
    if let Ok(v) = HeaderValue::from_str(&e.to_string()) {
        resp.headers_mut().insert(HEADER_ERROR, v);
    }
    resp
}

impl RawxService {
    /// PUT /<chunkid>: stream the body into a pending entry, hash it on the
    /// fly, then finalize (hash check + metadata) only when the transfer
    /// succeeded, and publish.
    pub(crate) async fn do_put(
        &self,
        chunkid: &str,
        headers: &HeaderMap,
        body: Incoming,
    ) -> Response<HttpBody> {
        let Some(content_length) = content_length(headers) else {
            return reply_error(&RequestError::MissingContentLength);
        };

        let mut writer = match self.repo().put(chunkid, content_length).await {
            Ok(w) => w,
            Err(e) => return reply_error(&RequestError::Store(e)),
        };

        let uploaded = stream_body(body, &mut writer, content_length, self.compress()).await;
        let finalized = match uploaded {
            Ok(hash) => finish_put(headers, &mut writer, &hash, self.compress()).map(|()| hash),
            Err(e) => Err(e),
        };

        match finalized {
            Ok(hash) => {
                if let Err(e) = writer.commit().await {
                    return reply_error(&RequestError::Store(e));
                }
                let mut resp = reply(StatusCode::OK);
                if let Ok(v) = HeaderValue::from_str(&hash) {
                    resp.headers_mut().insert(HEADER_CHUNK_HASH, v);
                }
                resp
            }
            Err(e) => {
                if let Err(abort_err) = writer.abort().await {
                    warn!(chunkid, error = %abort_err, "abort failed");
                }
                reply_error(&e)
            }
        }
    }

    /// GET /<chunkid>: emit the persisted attributes as headers and stream
    /// the body, inflating it when the chunk was stored compressed.
    pub(crate) async fn do_get(&self, chunkid: &str) -> Response<HttpBody> {
        let reader = match self.repo().get(chunkid).await {
            Ok(r) => r,
            Err(e) => return reply_error(&RequestError::Store(e)),
        };

        let compressed = match reader.get_attr(ATTR_COMPRESSION) {
            Ok(None) => false,
            Ok(Some(v)) if v == COMPRESSION_ZLIB => true,
            Ok(Some(_)) => return reply_error(&RequestError::CompressionNotManaged),
            Err(e) => return reply_error(&RequestError::Store(e)),
        };

        let size = match reader.size().await {
            Ok(s) => s,
            Err(e) => return reply_error(&RequestError::Store(e)),
        };

        let mut builder = Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_LENGTH, size)
            .header(CONTENT_TYPE, "application/octet-stream");
        for (attr, header) in ATTR_MAP
            .iter()
            .chain(std::iter::once(&("chunk.hash", HEADER_CHUNK_META_HASH)))
        {
            if let Ok(Some(v)) = reader.get_attr(&attr_name(attr)) {
                if let Ok(v) = HeaderValue::from_bytes(&v) {
                    builder = builder.header(*header, v);
                }
            }
        }

        let body = if compressed {
            inflate_body(reader)
        } else {
            let stream = ReaderStream::with_capacity(reader.into_file(), READ_BUF_SIZE);
            StreamBody::new(futures::TryStreamExt::map_ok(stream, Frame::data)).boxed()
        };
        builder.body(body).unwrap()
    }

    /// DELETE /<chunkid>
    pub(crate) async fn do_delete(&self, chunkid: &str) -> Response<HttpBody> {
        match self.repo().del(chunkid).await {
            Ok(()) => reply(StatusCode::OK),
            Err(e) => reply_error(&RequestError::Store(e)),
        }
    }

    /// GET /stat and /info: two lines per slot, counters and timers.
    pub(crate) fn do_stat(&self) -> Response<HttpBody> {
        let counters = self.counters().snapshot();
        let timers = self.timers().snapshot();

        let mut out = String::new();
        for (i, name) in chunk_storage::STAT_NAMES.iter().enumerate() {
            out.push_str(&format!("counter.{} {}\n", name, counters[i]));
            out.push_str(&format!("timer.{} {}\n", name, timers[i]));
        }
        Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "text/plain")
            .body(full_body(out))
            .unwrap()
    }

    /// GET /list?marker=&prefix=&max=
    pub(crate) async fn do_list(&self, query: Option<&str>) -> Response<HttpBody> {
        let mut marker = String::new();
        let mut prefix = String::new();
        let mut max = DEFAULT_LIST_MAX;
        for pair in query.unwrap_or("").split('&') {
            match pair.split_once('=') {
                Some(("marker", v)) => marker = v.to_string(),
                Some(("prefix", v)) => prefix = v.to_string(),
                Some(("max", v)) => max = v.parse().unwrap_or(DEFAULT_LIST_MAX),
                _ => {}
            }
        }

        let repo = self.repo().clone();
        let listed = tokio::task::spawn_blocking(move || repo.list(&marker, &prefix, max)).await;

        match listed {
            Ok(Ok((names, truncated))) => {
                let mut out = String::new();
                for name in names {
                    out.push_str(&name);
                    out.push('\n');
                }
                Response::builder()
                    .status(StatusCode::OK)
                    .header(CONTENT_TYPE, "text/plain")
                    .header(HEADER_LIST_TRUNCATED, if truncated { "true" } else { "false" })
                    .body(full_body(out))
                    .unwrap()
            }
            Ok(Err(e)) => reply_error(&RequestError::Store(e)),
            Err(e) => reply_error(&RequestError::Io(io::Error::other(e))),
        }
    }
}

pub(crate) fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Pump `Content-Length` bytes from the request into the writer through an
/// MD5 accumulator, optionally through a zlib compressor.
async fn stream_body(
    mut body: Incoming,
    writer: &mut ChunkWriter,
    content_length: u64,
    compress: bool,
) -> Result<String, RequestError> {
    let mut hasher = Md5::new();
    let mut sink = if compress {
        BodySink::Zlib(ZlibEncoder::new(Vec::new(), Compression::default()))
    } else {
        BodySink::Plain
    };

    let mut remaining = content_length;
    while remaining > 0 {
        let Some(frame) = body.frame().await else {
            return Err(RequestError::ShortBody);
        };
        let frame = frame?;
        let Ok(data) = frame.into_data() else { continue };
        if data.is_empty() {
            continue;
        }
        let take = remaining.min(data.len() as u64) as usize;
        let data = &data[..take];
        hasher.update(data);
        sink.write(data, writer).await?;
        remaining -= take as u64;
    }
    sink.finish(writer).await?;

    Ok(hex::encode_upper(hasher.finalize()))
}

enum BodySink {
    Plain,
    Zlib(ZlibEncoder<Vec<u8>>),
}

impl BodySink {
    async fn write(&mut self, data: &[u8], writer: &mut ChunkWriter) -> Result<(), RequestError> {
        match self {
            BodySink::Plain => writer.write(data).await?,
            BodySink::Zlib(enc) => {
                enc.write_all(data)?;
                let buffered = std::mem::take(enc.get_mut());
                if !buffered.is_empty() {
                    writer.write(&buffered).await?;
                }
            }
        }
        Ok(())
    }

    async fn finish(&mut self, writer: &mut ChunkWriter) -> Result<(), RequestError> {
        if let BodySink::Zlib(enc) = std::mem::replace(self, BodySink::Plain) {
            let tail = enc.finish()?;
            if !tail.is_empty() {
                writer.write(&tail).await?;
            }
        }
        Ok(())
    }
}

/// Verify the announced hash and persist the metadata; runs only after a
/// complete transfer.
fn finish_put(
    headers: &HeaderMap,
    writer: &mut ChunkWriter,
    computed: &str,
    compressed: bool,
) -> Result<(), RequestError> {
    if let Some(expected) = headers.get(HEADER_CHUNK_HASH) {
        let expected = expected.to_str().unwrap_or("").to_uppercase();
        if expected != computed {
            return Err(RequestError::Md5Mismatch);
        }
    }

    for (attr, header) in ATTR_MAP.iter() {
        let value = headers
            .get(*header)
            .ok_or_else(|| RequestError::MissingHeader(header.to_string()))?;
        writer.set_attr(&attr_name(attr), value.as_bytes())?;
    }
    writer.set_attr(ATTR_CHUNK_HASH, computed.as_bytes())?;
    if compressed {
        writer.set_attr(ATTR_COMPRESSION, COMPRESSION_ZLIB)?;
    }
    Ok(())
}

/// Inflate a zlib-stored chunk on the blocking pool, streaming it out through
/// a small channel. A decode failure mid-stream can only be logged, the
/// response has already started.
fn inflate_body(reader: FileReader) -> HttpBody {
    let path = reader.path().to_path_buf();
    let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(8);
    tokio::task::spawn_blocking(move || {
        let file = match std::fs::File::open(&path) {
            Ok(f) => f,
            Err(e) => {
                let _ = tx.blocking_send(Err(e));
                return;
            }
        };
        let mut decoder = ZlibDecoder::new(file);
        let mut buf = [0u8; READ_BUF_SIZE];
        loop {
            match decoder.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.blocking_send(Ok(Bytes::copy_from_slice(&buf[..n]))).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "inflate failed mid-stream");
                    let _ = tx.blocking_send(Err(e));
                    break;
                }
            }
        }
    });
    let stream = ReceiverStream::new(rx);
    StreamBody::new(futures::TryStreamExt::map_ok(stream, Frame::data)).boxed()
}
