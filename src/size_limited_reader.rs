//! Copy an origin response body into a [`Resource`] up to `maxObjectSize`,
//! or hand back a pass-through body reconstructed from what was already
//! read plus what remains.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use http_body::{Body, Frame, SizeHint};
use http_body_util::BodyExt;
use pin_project_lite::pin_project;

use crate::entry::{Resource, ResourceFactory};
use crate::error::Result;

/// Result of attempting a size-limited capture.
pub enum CaptureOutcome<B> {
    /// The whole body fit within the limit and is now a [`Resource`].
    Stored(Resource),
    /// The body exceeded `max_size`; nothing was stored. The returned body
    /// replays the bytes already consumed followed by the rest of the
    /// original stream, so the caller can still pass the response through.
    TooLarge(ReconstructedBody<B>),
}

impl<B> std::fmt::Debug for CaptureOutcome<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stored(resource) => f.debug_tuple("Stored").field(resource).finish(),
            Self::TooLarge(_) => f.debug_tuple("TooLarge").finish(),
        }
    }
}

/// Read `body` into memory up to `max_size` bytes (inclusive). On success
/// the bytes are handed to `factory` to produce a [`Resource`] under `key`.
pub async fn capture<B>(
    mut body: B,
    max_size: usize,
    factory: &dyn ResourceFactory,
    key: &str,
) -> Result<CaptureOutcome<B>>
where
    B: Body<Data = Bytes> + Unpin,
    B::Error: Into<crate::body::BodyError>,
{
    let mut buf = BytesMut::new();
    loop {
        match body.frame().await {
            None => {
                let resource = factory.generate(key, buf.freeze().to_vec().into())?;
                return Ok(CaptureOutcome::Stored(resource));
            }
            Some(Ok(frame)) => {
                if let Ok(data) = frame.into_data() {
                    buf.extend_from_slice(&data);
                    if buf.len() > max_size {
                        let prefix = buf.freeze();
                        return Ok(CaptureOutcome::TooLarge(ReconstructedBody::new(prefix, body)));
                    }
                }
            }
            Some(Err(err)) => {
                return Err(crate::error::CacheError::ResourceFault(err.into().to_string()));
            }
        }
    }
}

pin_project! {
    /// Replays a buffered prefix, then the remainder of the original body.
    pub struct ReconstructedBody<B> {
        prefix: Option<Bytes>,
        #[pin]
        inner: B,
    }
}

impl<B> ReconstructedBody<B> {
    fn new(prefix: Bytes, inner: B) -> Self {
        Self { prefix: Some(prefix), inner }
    }
}

impl<B> Body for ReconstructedBody<B>
where
    B: Body<Data = Bytes> + Unpin,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<std::result::Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();
        if let Some(prefix) = this.prefix.take() {
            return Poll::Ready(Some(Ok(Frame::data(prefix))));
        }
        this.inner.poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.prefix.is_none() && self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        match &self.prefix {
            Some(prefix) => {
                let mut hint = self.inner.size_hint();
                let lower = hint.lower() + prefix.len() as u64;
                hint.set_lower(lower);
                if let Some(upper) = hint.upper() {
                    hint.set_upper(upper + prefix.len() as u64);
                }
                hint
            }
            None => self.inner.size_hint(),
        }
    }
}
