use crate::body::{CompressedBody, CompressionBody};
use crate::codec::Codec;
use crate::compression::Negotiated;
use http::{Response, StatusCode, header};
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

pin_project! {
    /// Future for negotiation service responses.
    pub struct ResponseFuture<F, M, U> {
        #[pin]
        inner: F,
        codec: Arc<Codec<M, U>>,
        accept_encoding: String,
        min_size: usize,
    }
}

impl<F, M, U> ResponseFuture<F, M, U> {
    pub(crate) fn new(inner: F, codec: Arc<Codec<M, U>>, accept_encoding: String, min_size: usize) -> Self {
        Self {
            inner,
            codec,
            accept_encoding,
            min_size,
        }
    }
}

impl<F, B, E, M, U> Future for ResponseFuture<F, M, U>
where
    F: Future<Output = Result<Response<B>, E>>,
{
    type Output = Result<Response<CompressionBody<B>>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        match this.inner.poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Ready(Ok(response)) => {
                let response = wrap_response(response, this.codec, this.accept_encoding, *this.min_size);
                Poll::Ready(Ok(response))
            }
        }
    }
}

/// Applies the negotiated content coding to the response.
fn wrap_response<B, M, U>(
    response: Response<B>,
    codec: &Codec<M, U>,
    accept_encoding: &str,
    min_size: usize,
) -> Response<CompressionBody<B>> {
    let (mut parts, body) = response.into_parts();

    if has_content_encoding(&parts.headers)
        || has_content_range(&parts.headers)
        || is_below_min_size(&parts.headers, min_size)
    {
        return Response::from_parts(parts, CompressionBody::passthrough(body));
    }

    let content_type = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let compressor = match codec.search(content_type, accept_encoding) {
        Negotiated::Identity => None,
        Negotiated::Compress(c) => Some(c),
        Negotiated::NotAcceptable => {
            parts.status = StatusCode::NOT_ACCEPTABLE;
            parts.headers.remove(header::CONTENT_TYPE);
            parts.headers.remove(header::CONTENT_LENGTH);
            if let Ok(value) = header::HeaderValue::from_str(codec.accept_encoding_header()) {
                parts.headers.insert(header::ACCEPT_ENCODING, value);
            }
            add_vary_accept_encoding(&mut parts.headers);
            return Response::from_parts(parts, CompressionBody::empty());
        }
    };

    let Some(compressor) = compressor else {
        return Response::from_parts(parts, CompressionBody::passthrough(body));
    };
    let Ok(content_encoding) = header::HeaderValue::from_str(compressor.name()) else {
        tracing::warn!(name = compressor.name(), "content coding is not a valid header value");
        return Response::from_parts(parts, CompressionBody::passthrough(body));
    };

    // Check for x-accel-buffering: no header or streaming content types
    let always_flush = parts
        .headers
        .get("x-accel-buffering")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("no"))
        || is_streaming_content_type(&parts.headers);

    let state = match CompressedBody::new(compressor.compressor(), always_flush) {
        Ok(state) => state,
        Err(e) => {
            tracing::warn!(error = %e, name = compressor.name(), "failed to create encoder");
            return Response::from_parts(parts, CompressionBody::passthrough(body));
        }
    };

    parts.headers.insert(header::CONTENT_ENCODING, content_encoding);

    // Remove Content-Length since compressed size is unknown
    parts.headers.remove(header::CONTENT_LENGTH);

    // Remove Accept-Ranges since we can't support ranges on compressed content
    parts.headers.remove(header::ACCEPT_RANGES);

    add_vary_accept_encoding(&mut parts.headers);

    Response::from_parts(parts, CompressionBody::Compressed { inner: body, state })
}

/// Checks if Content-Encoding header is already present.
fn has_content_encoding(headers: &header::HeaderMap) -> bool {
    headers.contains_key(header::CONTENT_ENCODING)
}

/// Checks if Content-Range header is present (range response).
fn has_content_range(headers: &header::HeaderMap) -> bool {
    headers.contains_key(header::CONTENT_RANGE)
}

/// Adds Accept-Encoding to the Vary header if not already present.
fn add_vary_accept_encoding(headers: &mut header::HeaderMap) {
    // Check all Vary headers to see if Accept-Encoding is already present
    for vary in headers.get_all(header::VARY) {
        if let Ok(vary_str) = vary.to_str() {
            let covered = vary_str.split(',').any(|v| {
                let v = v.trim();
                v.eq_ignore_ascii_case("*") || v.eq_ignore_ascii_case("accept-encoding")
            });
            if covered {
                return;
            }
        }
    }

    headers.append(
        header::VARY,
        header::HeaderValue::from_static("accept-encoding"),
    );
}

/// Checks if the content type requires always flushing (e.g., streaming).
fn is_streaming_content_type(headers: &header::HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| {
            ct.starts_with("text/event-stream") || ct.starts_with("application/grpc-web")
        })
}

/// Checks if Content-Length is below the minimum size.
fn is_below_min_size(headers: &header::HeaderMap, min_size: usize) -> bool {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
        .is_some_and(|len| len < min_size)
}
