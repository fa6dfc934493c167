//! Bounded-length adapter over a shared source.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};

/// Reads at most `size` bytes from the underlying source, then reports EOF.
/// The source ending early is an error: the bound is a promise, it backs the
/// `Content-Length` of the fan-out sub-requests.
pub struct SliceReader<R> {
    inner: R,
    original: u64,
    remaining: u64,
}

impl<R> SliceReader<R> {
    pub fn new(inner: R, size: u64) -> SliceReader<R> {
        SliceReader {
            inner,
            original: size,
            remaining: size,
        }
    }

    /// The original bound.
    pub fn len(&self) -> u64 {
        self.original
    }

    pub fn is_empty(&self) -> bool {
        self.original == 0
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for SliceReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.remaining == 0 {
            return Poll::Ready(Ok(()));
        }

        let max = buf.remaining().min(this.remaining as usize);
        if max == 0 {
            return Poll::Ready(Ok(()));
        }
        let mut limited = ReadBuf::new(&mut buf.initialize_unfilled()[..max]);

        match Pin::new(&mut this.inner).poll_read(cx, &mut limited) {
            Poll::Ready(Ok(())) => {
                let filled = limited.filled().len();
                if filled == 0 {
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "source ended before the slice bound",
                    )));
                }
                buf.advance(filled);
                this.remaining -= filled as u64;
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_bounded_read() {
        let source: &[u8] = b"0123456789";
        let mut slice = SliceReader::new(source, 4);
        assert_eq!(slice.len(), 4);

        let mut out = Vec::new();
        slice.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"0123");
        // The bound is remembered even after draining.
        assert_eq!(slice.len(), 4);
    }

    #[tokio::test]
    async fn test_consecutive_slices_share_the_source() {
        let mut source: &[u8] = b"aaaabbbbcc";
        let mut first = Vec::new();
        SliceReader::new(&mut source, 4)
            .read_to_end(&mut first)
            .await
            .unwrap();
        let mut second = Vec::new();
        SliceReader::new(&mut source, 6)
            .read_to_end(&mut second)
            .await
            .unwrap();
        assert_eq!(first, b"aaaa");
        assert_eq!(second, b"bbbbcc");
    }

    #[tokio::test]
    async fn test_short_source_is_an_error() {
        let source: &[u8] = b"abc";
        let mut slice = SliceReader::new(source, 10);
        let mut out = Vec::new();
        let err = slice.read_to_end(&mut out).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_zero_slice() {
        let source: &[u8] = b"abc";
        let mut slice = SliceReader::new(source, 0);
        assert!(slice.is_empty());
        let mut out = Vec::new();
        slice.read_to_end(&mut out).await.unwrap();
        assert!(out.is_empty());
    }
}
