use crate::codec::Codec;
use crate::future::ResponseFuture;
use http::Request;
use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;

/// A Tower service that applies negotiated content codings to responses.
pub struct NegotiationService<S, M, U> {
    inner: S,
    codec: Arc<Codec<M, U>>,
    min_size: usize,
}

impl<S, M, U> NegotiationService<S, M, U> {
    /// Creates a new service wrapping the given inner service.
    pub fn new(inner: S, codec: Arc<Codec<M, U>>, min_size: usize) -> Self {
        Self {
            inner,
            codec,
            min_size,
        }
    }

    /// Returns the codec used for negotiation.
    pub fn codec(&self) -> &Codec<M, U> {
        &self.codec
    }

    /// Returns a reference to the inner service.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Returns a mutable reference to the inner service.
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Consumes this service, returning the inner service.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: Clone, M, U> Clone for NegotiationService<S, M, U> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            codec: Arc::clone(&self.codec),
            min_size: self.min_size,
        }
    }
}

impl<S: fmt::Debug, M, U> fmt::Debug for NegotiationService<S, M, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NegotiationService")
            .field("inner", &self.inner)
            .field("codec", &self.codec)
            .field("min_size", &self.min_size)
            .finish()
    }
}

impl<S, ReqBody, ResBody, M, U> Service<Request<ReqBody>> for NegotiationService<S, M, U>
where
    S: Service<Request<ReqBody>, Response = http::Response<ResBody>>,
{
    type Response = http::Response<crate::body::CompressionBody<ResBody>>;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future, M, U>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        // Negotiation needs the response Content-Type, so only capture the
        // client's preferences here.
        let accept_encoding = req
            .headers()
            .get_all(http::header::ACCEPT_ENCODING)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect::<Vec<_>>()
            .join(",");

        let inner = self.inner.call(req);

        ResponseFuture::new(inner, Arc::clone(&self.codec), accept_encoding, self.min_size)
    }
}
