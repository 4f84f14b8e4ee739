use crate::codec::Codec;
use crate::service::NegotiationService;
use std::fmt;
use std::sync::Arc;
use tower::Layer;

/// Default minimum body size for compression (approximately 1 MTU).
pub const DEFAULT_MIN_SIZE: usize = 860;

/// A Tower layer that compresses HTTP response bodies with the coding
/// negotiated by a [`Codec`].
pub struct NegotiationLayer<M, U> {
    codec: Arc<Codec<M, U>>,
    min_size: usize,
}

impl<M, U> NegotiationLayer<M, U> {
    /// Creates a new layer using `codec`.
    ///
    /// The default minimum size for compression is 860 bytes.
    pub fn new(codec: Arc<Codec<M, U>>) -> Self {
        Self {
            codec,
            min_size: DEFAULT_MIN_SIZE,
        }
    }

    /// Sets the minimum body size required for compression.
    ///
    /// Responses with a known Content-Length smaller than this value
    /// will not be compressed.
    pub fn min_size(mut self, size: usize) -> Self {
        self.min_size = size;
        self
    }
}

impl<M, U> Clone for NegotiationLayer<M, U> {
    fn clone(&self) -> Self {
        Self {
            codec: Arc::clone(&self.codec),
            min_size: self.min_size,
        }
    }
}

impl<M, U> fmt::Debug for NegotiationLayer<M, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NegotiationLayer")
            .field("codec", &self.codec)
            .field("min_size", &self.min_size)
            .finish()
    }
}

impl<S, M, U> Layer<S> for NegotiationLayer<M, U> {
    type Service = NegotiationService<S, M, U>;

    fn layer(&self, inner: S) -> Self::Service {
        NegotiationService::new(inner, Arc::clone(&self.codec), self.min_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_size() {
        let codec: Arc<Codec<(), ()>> = Arc::new(Codec::builder().build());
        let layer = NegotiationLayer::new(Arc::clone(&codec));
        let service = layer.clone().min_size(10).layer(());
        assert!(format!("{layer:?}").contains("min_size: 860"));
        assert!(format!("{service:?}").contains("min_size: 10"));
    }
}
