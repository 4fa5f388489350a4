//! Stall limits for client connections.
//!
//! [`TimeoutStream`] wraps an accepted socket and fails an I/O call that
//! makes no progress for too long:
//!
//! - a write or flush pending for longer than the write timeout (a client
//!   that stopped reading a response body),
//! - a read pending for longer than the idle timeout with no write
//!   progress in between (an idle keep-alive connection).
//!
//! Either failure surfaces as [`io::ErrorKind::TimedOut`], which makes
//! hyper drop the connection.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::{Instant, Sleep};

/// A socket whose stalled reads and writes time out.
#[derive(Debug)]
pub struct TimeoutStream<S> {
    inner: S,
    idle_timeout: Duration,
    write_timeout: Duration,
    read_deadline: Pin<Box<Sleep>>,
    read_armed: bool,
    write_deadline: Pin<Box<Sleep>>,
    write_armed: bool,
}

impl<S> TimeoutStream<S> {
    /// Wraps a stream. Must be called inside a Tokio runtime.
    pub fn new(inner: S, idle_timeout: Duration, write_timeout: Duration) -> Self {
        Self {
            inner,
            idle_timeout,
            write_timeout,
            read_deadline: Box::pin(tokio::time::sleep(idle_timeout)),
            read_armed: false,
            write_deadline: Box::pin(tokio::time::sleep(write_timeout)),
            write_armed: false,
        }
    }

    /// Returns the wrapped stream.
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    fn poll_read_deadline(&mut self, cx: &mut Context<'_>) -> Poll<io::Error> {
        if !self.read_armed {
            self.read_deadline
                .as_mut()
                .reset(Instant::now() + self.idle_timeout);
            self.read_armed = true;
        }
        self.read_deadline
            .as_mut()
            .poll(cx)
            .map(|()| io::Error::new(io::ErrorKind::TimedOut, "connection idle timeout"))
    }

    fn poll_write_deadline(&mut self, cx: &mut Context<'_>) -> Poll<io::Error> {
        if !self.write_armed {
            self.write_deadline
                .as_mut()
                .reset(Instant::now() + self.write_timeout);
            self.write_armed = true;
        }
        self.write_deadline
            .as_mut()
            .poll(cx)
            .map(|()| io::Error::new(io::ErrorKind::TimedOut, "connection write timeout"))
    }

    /// Settles a write-side poll: a pending call keeps the write deadline
    /// running, anything else clears it and counts as connection activity.
    fn settle_write<T>(
        &mut self,
        cx: &mut Context<'_>,
        poll: Poll<io::Result<T>>,
    ) -> Poll<io::Result<T>> {
        match poll {
            Poll::Ready(result) => {
                self.write_armed = false;
                self.read_armed = false;
                Poll::Ready(result)
            }
            Poll::Pending => self.poll_write_deadline(cx).map(Err),
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for TimeoutStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(result) => {
                this.read_armed = false;
                Poll::Ready(result)
            }
            Poll::Pending => this.poll_read_deadline(cx).map(Err),
        }
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for TimeoutStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_write(cx, buf);
        this.settle_write(cx, poll)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_write_vectored(cx, bufs);
        this.settle_write(cx, poll)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_flush(cx);
        this.settle_write(cx, poll)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_shutdown(cx);
        this.settle_write(cx, poll)
    }
}
