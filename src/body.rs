use crate::pool::{Compressor, WriteClose};
use bytes::{Buf, Bytes, BytesMut};
use http_body::{Body, Frame, SizeHint};
use parking_lot::Mutex;
use pin_project_lite::pin_project;
use std::io::{self, Write};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

pin_project! {
    /// A response body that may be compressed.
    ///
    /// This type wraps an inner body and either compresses it with the
    /// negotiated compressor, passes it through unchanged, or replaces it
    /// with nothing when the response was turned into a `406`.
    #[project = CompressionBodyProj]
    #[allow(missing_docs)]
    pub enum CompressionBody<B> {
        /// Compressed body with encoder.
        Compressed {
            #[pin]
            inner: B,
            state: CompressedBody,
        },
        /// Passthrough body without compression.
        Passthrough {
            #[pin]
            inner: B,
        },
        /// Empty body.
        Empty { _empty: () },
    }
}

/// Collects encoder output until it is emitted as a frame.
#[derive(Clone, Default)]
struct FrameSink(Arc<Mutex<BytesMut>>);

impl FrameSink {
    fn take(&self) -> Bytes {
        self.0.lock().split().freeze()
    }
}

impl Write for FrameSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// State and buffers for an actively compressed body.
pub(crate) struct CompressedBody {
    encoder: Option<Box<dyn WriteClose>>,
    sink: FrameSink,
    always_flush: bool,
    state: CompressState,
    pending_trailers: Option<http::HeaderMap>,
}

/// State machine for compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompressState {
    /// Reading data from inner body and compressing.
    Reading,
    /// Finishing compression after inner body is done.
    Finishing,
    /// Emitting buffered trailers.
    Trailers,
    /// Compression is complete.
    Done,
}

impl CompressedBody {
    pub(crate) fn new(compressor: &dyn Compressor, always_flush: bool) -> io::Result<Self> {
        let sink = FrameSink::default();
        let encoder = compressor.new_encoder(Box::new(sink.clone()))?;
        Ok(Self {
            encoder: Some(encoder),
            sink,
            always_flush,
            state: CompressState::Reading,
            pending_trailers: None,
        })
    }

    /// Returns the current compression state.
    pub(crate) fn state(&self) -> CompressState {
        self.state
    }

    /// Returns whether always flush is enabled.
    #[allow(dead_code)]
    pub(crate) fn always_flush(&self) -> bool {
        self.always_flush
    }

    fn after_finish(&self) -> CompressState {
        if self.pending_trailers.is_some() {
            CompressState::Trailers
        } else {
            CompressState::Done
        }
    }

    /// Polls the inner body and compresses data.
    fn poll_compressed<B>(
        &mut self,
        cx: &mut Context<'_>,
        mut inner: Pin<&mut B>,
    ) -> Poll<Option<Result<Frame<Bytes>, io::Error>>>
    where
        B: Body,
        B::Data: Buf,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        loop {
            match self.state {
                CompressState::Done => return Poll::Ready(None),

                CompressState::Trailers => {
                    self.state = CompressState::Done;
                    if let Some(trailers) = self.pending_trailers.take() {
                        return Poll::Ready(Some(Ok(Frame::trailers(trailers))));
                    }
                    return Poll::Ready(None);
                }

                CompressState::Finishing => {
                    // Closing writes the trailer and hands the encoder
                    // state back to its pool.
                    if let Some(encoder) = self.encoder.take() {
                        if let Err(e) = encoder.close() {
                            self.state = CompressState::Done;
                            return Poll::Ready(Some(Err(e)));
                        }
                    }
                    self.state = self.after_finish();

                    let data = self.sink.take();
                    if !data.is_empty() {
                        return Poll::Ready(Some(Ok(Frame::data(data))));
                    }
                }

                CompressState::Reading => match inner.as_mut().poll_frame(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(None) => {
                        self.state = CompressState::Finishing;
                    }
                    Poll::Ready(Some(Err(e))) => {
                        return Poll::Ready(Some(Err(io::Error::other(e.into()))));
                    }
                    Poll::Ready(Some(Ok(frame))) => match frame.into_data() {
                        Ok(data) => {
                            if let Err(e) = self.compress_chunk(data) {
                                self.state = CompressState::Done;
                                return Poll::Ready(Some(Err(e)));
                            }
                            let data = self.sink.take();
                            if !data.is_empty() {
                                return Poll::Ready(Some(Ok(Frame::data(data))));
                            }
                            // No output yet, keep reading.
                        }
                        Err(frame) => {
                            if let Ok(trailers) = frame.into_trailers() {
                                // Buffer trailers and finish compression first
                                self.pending_trailers = Some(trailers);
                                self.state = CompressState::Finishing;
                            }
                        }
                    },
                },
            }
        }
    }

    /// Feeds a chunk of input data to the encoder.
    fn compress_chunk<D: Buf>(&mut self, mut data: D) -> io::Result<()> {
        let encoder = self
            .encoder
            .as_mut()
            .ok_or_else(|| io::Error::other("encoder already closed"))?;

        while data.has_remaining() {
            let chunk = data.chunk();
            let n = chunk.len();
            encoder.write_all(chunk)?;
            data.advance(n);
        }

        if self.always_flush {
            encoder.flush()?;
        }
        Ok(())
    }
}

impl<B> CompressionBody<B> {
    /// Creates a body compressed with `compressor`. The encoder state is
    /// returned to the compressor's pool once the body is fully emitted.
    pub fn compressed(inner: B, compressor: &dyn Compressor, always_flush: bool) -> io::Result<Self> {
        Ok(Self::Compressed {
            inner,
            state: CompressedBody::new(compressor, always_flush)?,
        })
    }

    /// Creates a passthrough body without compression.
    pub fn passthrough(inner: B) -> Self {
        Self::Passthrough { inner }
    }

    /// Creates a body without content.
    pub fn empty() -> Self {
        Self::Empty { _empty: () }
    }
}

impl<B> Body for CompressionBody<B>
where
    B: Body,
    B::Data: Buf,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project() {
            CompressionBodyProj::Passthrough { inner } => {
                // Pass through frames, converting data to Bytes
                match inner.poll_frame(cx) {
                    Poll::Pending => Poll::Pending,
                    Poll::Ready(None) => Poll::Ready(None),
                    Poll::Ready(Some(Ok(frame))) => {
                        let frame = frame.map_data(|mut data| data.copy_to_bytes(data.remaining()));
                        Poll::Ready(Some(Ok(frame)))
                    }
                    Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(io::Error::other(e.into())))),
                }
            }
            CompressionBodyProj::Compressed { inner, state } => state.poll_compressed(cx, inner),
            CompressionBodyProj::Empty { .. } => Poll::Ready(None),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            CompressionBody::Passthrough { inner } => inner.is_end_stream(),
            CompressionBody::Compressed { state, .. } => state.state() == CompressState::Done,
            CompressionBody::Empty { .. } => true,
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self {
            CompressionBody::Passthrough { inner } => inner.size_hint(),
            // Compressed size is unknown
            CompressionBody::Compressed { .. } => SizeHint::default(),
            CompressionBody::Empty { .. } => SizeHint::with_exact(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::tests::frame_compressor;
    use http::HeaderMap;
    use std::collections::VecDeque;

    /// A test body that yields predefined frames.
    struct TestBody {
        frames: VecDeque<Frame<Bytes>>,
    }

    impl TestBody {
        fn new(frames: Vec<Frame<Bytes>>) -> Self {
            Self {
                frames: frames.into(),
            }
        }
    }

    impl Body for TestBody {
        type Data = Bytes;
        type Error = std::convert::Infallible;

        fn poll_frame(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
            match self.frames.pop_front() {
                Some(frame) => Poll::Ready(Some(Ok(frame))),
                None => Poll::Ready(None),
            }
        }
    }

    fn poll_body<B: Body + Unpin>(body: &mut B) -> Option<Result<Frame<B::Data>, B::Error>> {
        let waker = std::task::Waker::noop();
        let mut cx = Context::from_waker(waker);
        match Pin::new(body).poll_frame(&mut cx) {
            Poll::Ready(result) => result,
            Poll::Pending => None,
        }
    }

    /// Drains a body, returning the concatenated data and the trailers.
    fn collect<B: Body<Data = Bytes> + Unpin>(body: &mut B) -> (Vec<u8>, Option<HeaderMap>)
    where
        B::Error: std::fmt::Debug,
    {
        let mut data = Vec::new();
        let mut trailers = None;
        while let Some(frame) = poll_body(body) {
            let frame = frame.unwrap();
            match frame.into_data() {
                Ok(chunk) => data.extend_from_slice(&chunk),
                Err(frame) => trailers = frame.into_trailers().ok(),
            }
        }
        (data, trailers)
    }

    #[test]
    fn test_passthrough_data() {
        let inner = TestBody::new(vec![Frame::data(Bytes::from("hello world"))]);
        let mut body = CompressionBody::passthrough(inner);

        let frame = poll_body(&mut body).unwrap().unwrap();
        assert!(frame.is_data());
        assert_eq!(frame.into_data().unwrap(), Bytes::from("hello world"));

        assert!(poll_body(&mut body).is_none());
    }

    #[test]
    fn test_passthrough_trailers() {
        let mut trailers = HeaderMap::new();
        trailers.insert("x-checksum", "abc123".parse().unwrap());

        let inner = TestBody::new(vec![
            Frame::data(Bytes::from("data")),
            Frame::trailers(trailers.clone()),
        ]);
        let mut body = CompressionBody::passthrough(inner);

        let (data, received) = collect(&mut body);
        assert_eq!(data, b"data");
        assert_eq!(received.unwrap().get("x-checksum").unwrap(), "abc123");
    }

    #[test]
    fn test_empty_body() {
        let mut body: CompressionBody<TestBody> = CompressionBody::empty();
        assert!(body.is_end_stream());
        assert_eq!(body.size_hint().exact(), Some(0));
        assert!(poll_body(&mut body).is_none());
    }

    #[test]
    fn test_compressed_frames() {
        let compressor = frame_compressor("frame");
        let inner = TestBody::new(vec![
            Frame::data(Bytes::from("hello ")),
            Frame::data(Bytes::from("world")),
        ]);
        let mut body = CompressionBody::compressed(inner, &compressor, false).unwrap();

        let (data, trailers) = collect(&mut body);
        assert_eq!(data, b"\x06hello \x05world\x00");
        assert!(trailers.is_none());
        assert!(body.is_end_stream());

        // The encoder state went back to the pool.
        assert_eq!(compressor.idle_encoders(), 1);
    }

    #[test]
    fn test_compressed_with_trailers() {
        let mut trailers = HeaderMap::new();
        trailers.insert("x-checksum", "abc123".parse().unwrap());

        let compressor = frame_compressor("frame");
        let inner = TestBody::new(vec![
            Frame::data(Bytes::from("hello world")),
            Frame::trailers(trailers),
        ]);
        let mut body = CompressionBody::compressed(inner, &compressor, false).unwrap();

        let (data, received) = collect(&mut body);
        assert_eq!(data, b"\x0bhello world\x00");
        let received = received.expect("Expected trailers frame");
        assert_eq!(received.get("x-checksum").unwrap(), "abc123");
    }

    #[test]
    fn test_full_body() {
        use http_body_util::Full;

        let compressor = frame_compressor("frame");
        let mut body =
            CompressionBody::compressed(Full::new(Bytes::from("abc")), &compressor, true).unwrap();
        assert_eq!(collect(&mut body).0, b"\x03abc\x00");

        let mut body = CompressionBody::passthrough(Full::new(Bytes::from("abc")));
        assert_eq!(body.size_hint().exact(), Some(3));
        assert_eq!(collect(&mut body).0, b"abc");
    }

    #[test]
    #[cfg(feature = "gzip")]
    fn test_gzip_body_decodes() {
        use crate::algorithm::Algorithm;
        use std::io::Read;

        let gzip = Algorithm::Gzip.compressor();
        let chunks: Vec<_> = (0..20)
            .map(|i| Frame::data(Bytes::from(format!("chunk number {i}\n"))))
            .collect();
        let expected: String = (0..20).map(|i| format!("chunk number {i}\n")).collect();

        let mut body = CompressionBody::compressed(TestBody::new(chunks), &gzip, true).unwrap();
        let (data, _) = collect(&mut body);
        assert_eq!(&data[..2], &[0x1f, 0x8b]);

        let mut decoder = gzip.new_decoder(Box::new(&data[..])).unwrap();
        let mut decoded = String::new();
        decoder.read_to_string(&mut decoded).unwrap();
        decoder.close().unwrap();
        assert_eq!(decoded, expected);
    }
}
