//! HTTP body types used while capturing and replaying cached response bodies.
//!
//! [`CacheBody`] lets [`SizeLimitedResponseReader`](crate::size_limited_reader)
//! hand back either a buffered byte slice pulled from a [`Resource`](crate::entry::Resource)
//! or a pass-through wrapper around the origin body it never finished capturing.

#![allow(missing_docs)]

use std::{
    error::Error as StdError,
    fmt,
    pin::Pin,
    task::{Context, Poll},
};

use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;

/// Opaque body error, boxing whatever the wrapped body produced.
#[derive(Debug)]
pub struct BodyError(Box<dyn StdError + Send + Sync>);

impl BodyError {
    pub fn new(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self(err.into())
    }
}

impl fmt::Display for BodyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl StdError for BodyError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.0.as_ref())
    }
}

impl From<std::convert::Infallible> for BodyError {
    fn from(err: std::convert::Infallible) -> Self {
        match err {}
    }
}

pin_project! {
    /// A body that is either already fully buffered (served from cache) or
    /// still streaming from the origin (a miss, or a size-limited capture
    /// that bailed out and must pass the rest of the body through unaltered).
    #[project = CacheBodyProj]
    pub enum CacheBody<B> {
        Buffered {
            data: Option<Bytes>,
        },
        Streaming {
            #[pin]
            inner: B,
        },
    }
}

impl<B> CacheBody<B> {
    /// A body whose bytes are already resident in memory.
    #[must_use]
    pub fn buffered(data: Bytes) -> Self {
        Self::Buffered { data: Some(data) }
    }

    /// A body that still needs to be driven to completion.
    #[must_use]
    pub fn streaming(body: B) -> Self {
        Self::Streaming { inner: body }
    }

    /// The buffered bytes, if this body is the [`CacheBody::Buffered`] variant.
    pub fn buffered_data(&self) -> Option<&Bytes> {
        match self {
            Self::Buffered { data } => data.as_ref(),
            Self::Streaming { .. } => None,
        }
    }

    /// Take the buffered bytes out, if this body is the
    /// [`CacheBody::Buffered`] variant.
    pub fn into_buffered_data(self) -> Option<Bytes> {
        match self {
            Self::Buffered { data } => data,
            Self::Streaming { .. } => None,
        }
    }
}

impl<B> Body for CacheBody<B>
where
    B: Body + Unpin,
    B::Error: Into<BodyError>,
    B::Data: Into<Bytes>,
{
    type Data = Bytes;
    type Error = BodyError;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.as_mut().project() {
            CacheBodyProj::Buffered { data } => {
                if let Some(bytes) = data.take() {
                    if bytes.is_empty() {
                        Poll::Ready(None)
                    } else {
                        Poll::Ready(Some(Ok(Frame::data(bytes))))
                    }
                } else {
                    Poll::Ready(None)
                }
            }
            CacheBodyProj::Streaming { inner } => {
                inner.poll_frame(cx).map(|opt| {
                    opt.map(|res| {
                        res.map(|frame| frame.map_data(Into::into))
                            .map_err(Into::into)
                    })
                })
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            CacheBody::Buffered { data } => data.is_none(),
            CacheBody::Streaming { inner } => inner.is_end_stream(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self {
            CacheBody::Buffered { data } => {
                let len = data.as_ref().map(|b| b.len() as u64).unwrap_or(0);
                SizeHint::with_exact(len)
            }
            CacheBody::Streaming { inner } => inner.size_hint(),
        }
    }
}

impl<B> From<Bytes> for CacheBody<B> {
    fn from(bytes: Bytes) -> Self {
        Self::buffered(bytes)
    }
}

impl<B: fmt::Debug> fmt::Debug for CacheBody<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffered { data } => f
                .debug_struct("CacheBody::Buffered")
                .field("len", &data.as_ref().map(|b| b.len()))
                .finish(),
            Self::Streaming { inner } => {
                f.debug_struct("CacheBody::Streaming").field("inner", inner).finish()
            }
        }
    }
}
