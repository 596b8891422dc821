//! In-memory duplex transport handed to `h2`
//!
//! `h2` wants an `AsyncRead + AsyncWrite` object. The adapter keeps one end of
//! a shared buffer pair and the engine owns the other: bytes fed through
//! `receive` become readable, bytes the engine writes pile up until the
//! caller drains them. Reads with nothing buffered return `Pending`; the
//! adapter re-polls after every input, so no waker is ever needed.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

#[derive(Debug, Default)]
struct Buffers {
    inbound: BytesMut,
    outbound: BytesMut,
    eof: bool,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Pipe {
    shared: Arc<Mutex<Buffers>>,
}

impl Pipe {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Buffers> {
        // Buffers stay consistent even if a holder panicked.
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn feed(&self, data: &[u8]) {
        self.lock().inbound.extend_from_slice(data);
    }

    pub(crate) fn feed_eof(&self) {
        self.lock().eof = true;
    }

    /// Bytes fed but not yet read by the engine.
    pub(crate) fn unread(&self) -> usize {
        self.lock().inbound.len()
    }

    pub(crate) fn take_outbound(&self) -> Option<Bytes> {
        let mut buffers = self.lock();
        if buffers.outbound.is_empty() {
            None
        } else {
            Some(buffers.outbound.split().freeze())
        }
    }
}

impl AsyncRead for Pipe {
    fn poll_read(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let mut buffers = self.lock();
        if buffers.inbound.is_empty() {
            // Zero bytes read signals end of stream.
            return if buffers.eof { Poll::Ready(Ok(())) } else { Poll::Pending };
        }
        let n = buf.remaining().min(buffers.inbound.len());
        let chunk = buffers.inbound.split_to(n);
        buf.put_slice(&chunk);
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for Pipe {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, data: &[u8]) -> Poll<io::Result<usize>> {
        self.lock().outbound.extend_from_slice(data);
        Poll::Ready(Ok(data.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::task::noop_waker_ref;

    #[test]
    fn reads_what_was_fed_then_pends() {
        let mut pipe = Pipe::new();
        pipe.feed(b"hello");
        let mut cx = Context::from_waker(noop_waker_ref());
        let mut storage = [0u8; 3];
        let mut buf = ReadBuf::new(&mut storage);
        assert!(Pin::new(&mut pipe).poll_read(&mut cx, &mut buf).is_ready());
        assert_eq!(buf.filled(), b"hel");
        assert_eq!(pipe.unread(), 2);

        let mut storage = [0u8; 8];
        let mut buf = ReadBuf::new(&mut storage);
        assert!(Pin::new(&mut pipe).poll_read(&mut cx, &mut buf).is_ready());
        let mut buf = ReadBuf::new(&mut storage);
        assert!(Pin::new(&mut pipe).poll_read(&mut cx, &mut buf).is_pending());

        pipe.feed_eof();
        let mut buf = ReadBuf::new(&mut storage);
        assert!(Pin::new(&mut pipe).poll_read(&mut cx, &mut buf).is_ready());
        assert!(buf.filled().is_empty());
    }

    #[test]
    fn writes_accumulate_until_taken() {
        let mut pipe = Pipe::new();
        let mut cx = Context::from_waker(noop_waker_ref());
        let _ = Pin::new(&mut pipe).poll_write(&mut cx, b"ab");
        let _ = Pin::new(&mut pipe).poll_write(&mut cx, b"cd");
        assert_eq!(pipe.take_outbound().as_deref(), Some(&b"abcd"[..]));
        assert!(pipe.take_outbound().is_none());
    }
}
