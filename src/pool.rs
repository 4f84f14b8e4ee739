//! Pooled stream compressors.
//!
//! Compression state (deflate windows, brotli tables, zstd contexts) is
//! expensive to allocate, so each [`PooledCompressor`] keeps a bounded
//! free-list of encoder and decoder states. A state is borrowed when a
//! stream is wrapped and handed back once the wrapper is closed.

use parking_lot::Mutex;
use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;

/// Default number of idle states kept per pool.
pub const DEFAULT_POOL_CAPACITY: usize = 64;

const INPUT_BUFFER_SIZE: usize = 8 * 1024;

/// A state that can be cleared and reused for a new stream.
pub trait Reset {
    /// Clears all stream state. Implementations must not retain anything
    /// from the previous stream.
    fn reset(&mut self) -> io::Result<()>;
}

impl<T: Reset + ?Sized> Reset for Box<T> {
    fn reset(&mut self) -> io::Result<()> {
        (**self).reset()
    }
}

/// A reusable compression engine.
///
/// Output is appended to the provided vector; the engine never holds on to
/// the stream it writes into.
pub trait Encode: Reset + Send {
    /// Compresses `input` in full.
    fn encode(&mut self, input: &[u8], output: &mut Vec<u8>) -> io::Result<()>;

    /// Emits everything buffered so far without ending the stream.
    fn flush(&mut self, output: &mut Vec<u8>) -> io::Result<()>;

    /// Ends the stream, emitting any trailer.
    fn finish(&mut self, output: &mut Vec<u8>) -> io::Result<()>;
}

/// A reusable decompression engine.
pub trait Decode: Reset + Send {
    /// Decompresses from `input`, returning how many bytes were consumed and
    /// whether the end of the compressed stream was reached.
    fn decode(&mut self, input: &[u8], output: &mut Vec<u8>) -> io::Result<(usize, bool)>;

    /// Called once the source is exhausted to emit any remaining output.
    fn finish(&mut self, output: &mut Vec<u8>) -> io::Result<()>;
}

/// A writer that must be explicitly closed.
///
/// Closing consumes the writer, so a stream can only be closed once.
pub trait WriteClose: Write + Send {
    /// Ends the stream, writing any trailer to the underlying writer.
    fn close(self: Box<Self>) -> io::Result<()>;
}

/// A reader that must be explicitly closed.
pub trait ReadClose: Read + Send {
    /// Releases the resources held by the reader.
    fn close(self: Box<Self>) -> io::Result<()>;
}

/// The capability of wrapping byte streams with an encoding.
pub trait Compressor: Send + Sync {
    /// Name of the algorithm, e.g. `gzip`.
    fn name(&self) -> &str;

    /// Wraps `w` so that everything written is compressed into it.
    fn new_encoder<'w>(&self, w: Box<dyn Write + Send + 'w>) -> io::Result<Box<dyn WriteClose + 'w>>;

    /// Wraps `r` so that reads yield the decompressed stream.
    fn new_decoder<'r>(&self, r: Box<dyn Read + Send + 'r>) -> io::Result<Box<dyn ReadClose + 'r>>;
}

/// A bounded free-list of reusable states.
pub struct Pool<T> {
    make: Box<dyn Fn() -> T + Send + Sync>,
    idle: Mutex<Vec<T>>,
    capacity: usize,
}

impl<T> Pool<T> {
    /// Creates an empty pool that builds states with `make`.
    pub fn new<F>(capacity: usize, make: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            make: Box::new(make),
            idle: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Takes an idle state, or builds a new one when the pool is empty.
    pub fn acquire(&self) -> T {
        let reused = self.idle.lock().pop();
        match reused {
            Some(state) => {
                tracing::trace!("reusing pooled state");
                state
            }
            None => (self.make)(),
        }
    }

    /// Returns a state that has already been reset. States beyond the
    /// pool's capacity are dropped.
    fn put(&self, state: T) {
        let mut idle = self.idle.lock();
        if idle.len() < self.capacity {
            idle.push(state);
        }
    }

    /// Number of idle states.
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }

    /// Maximum number of idle states kept.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T: Reset> Pool<T> {
    /// Resets `state` and makes it available again. A state that fails to
    /// reset is discarded.
    pub fn release(&self, mut state: T) {
        match state.reset() {
            Ok(()) => self.put(state),
            Err(e) => tracing::trace!(error = %e, "discarding pooled state"),
        }
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("idle", &self.idle())
            .field("capacity", &self.capacity)
            .finish()
    }
}

type EncoderPool = Pool<Box<dyn Encode>>;
type DecoderPool = Pool<Box<dyn Decode>>;

/// A [`Compressor`] backed by pools of encoder and decoder states.
#[derive(Clone)]
pub struct PooledCompressor {
    name: String,
    encoders: Arc<EncoderPool>,
    decoders: Arc<DecoderPool>,
}

impl PooledCompressor {
    /// Creates a compressor keeping up to [`DEFAULT_POOL_CAPACITY`] idle
    /// states of each kind.
    pub fn new<E, D, FE, FD>(name: impl Into<String>, new_encoder: FE, new_decoder: FD) -> Self
    where
        E: Encode + 'static,
        D: Decode + 'static,
        FE: Fn() -> E + Send + Sync + 'static,
        FD: Fn() -> D + Send + Sync + 'static,
    {
        Self::with_capacity(name, DEFAULT_POOL_CAPACITY, new_encoder, new_decoder)
    }

    /// Creates a compressor keeping up to `capacity` idle states of each kind.
    pub fn with_capacity<E, D, FE, FD>(
        name: impl Into<String>,
        capacity: usize,
        new_encoder: FE,
        new_decoder: FD,
    ) -> Self
    where
        E: Encode + 'static,
        D: Decode + 'static,
        FE: Fn() -> E + Send + Sync + 'static,
        FD: Fn() -> D + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            encoders: Arc::new(Pool::new(capacity, move || {
                Box::new(new_encoder()) as Box<dyn Encode>
            })),
            decoders: Arc::new(Pool::new(capacity, move || {
                Box::new(new_decoder()) as Box<dyn Decode>
            })),
        }
    }

    /// Number of idle encoder states.
    pub fn idle_encoders(&self) -> usize {
        self.encoders.idle()
    }

    /// Number of idle decoder states.
    pub fn idle_decoders(&self) -> usize {
        self.decoders.idle()
    }
}

impl fmt::Debug for PooledCompressor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledCompressor")
            .field("name", &self.name)
            .field("encoders", &self.encoders)
            .field("decoders", &self.decoders)
            .finish()
    }
}

impl Compressor for PooledCompressor {
    fn name(&self) -> &str {
        &self.name
    }

    fn new_encoder<'w>(&self, w: Box<dyn Write + Send + 'w>) -> io::Result<Box<dyn WriteClose + 'w>> {
        let state = self.encoders.acquire();
        Ok(Box::new(Encoder {
            pool: Arc::clone(&self.encoders),
            state: Some(state),
            inner: w,
            output: Vec::new(),
        }))
    }

    fn new_decoder<'r>(&self, r: Box<dyn Read + Send + 'r>) -> io::Result<Box<dyn ReadClose + 'r>> {
        let state = self.decoders.acquire();
        let mut decoder = Decoder {
            pool: Arc::clone(&self.decoders),
            state: Some(state),
            inner: r,
            input: vec![0u8; INPUT_BUFFER_SIZE],
            start: 0,
            end: 0,
            output: Vec::new(),
            position: 0,
            done: false,
        };

        // Surface a broken stream header now rather than on first read. The
        // state is dropped with the decoder instead of going back to the pool.
        decoder.fill()?;
        Ok(Box::new(decoder))
    }
}

fn closed() -> io::Error {
    io::Error::other("stream already closed")
}

/// Compressing writer handed out by [`PooledCompressor::new_encoder`].
///
/// Dropping it without calling [`WriteClose::close`] discards the borrowed
/// state instead of returning it to the pool.
struct Encoder<'w> {
    pool: Arc<EncoderPool>,
    state: Option<Box<dyn Encode>>,
    inner: Box<dyn Write + Send + 'w>,
    output: Vec<u8>,
}

impl Encoder<'_> {
    fn drain(&mut self) -> io::Result<()> {
        if !self.output.is_empty() {
            self.inner.write_all(&self.output)?;
            self.output.clear();
        }
        Ok(())
    }
}

impl Write for Encoder<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let state = self.state.as_mut().ok_or_else(closed)?;
        state.encode(buf, &mut self.output)?;
        self.drain()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let state = self.state.as_mut().ok_or_else(closed)?;
        state.flush(&mut self.output)?;
        self.drain()?;
        self.inner.flush()
    }
}

impl WriteClose for Encoder<'_> {
    fn close(mut self: Box<Self>) -> io::Result<()> {
        let mut state = self.state.take().ok_or_else(closed)?;
        state.finish(&mut self.output)?;
        self.drain()?;
        self.inner.flush()?;
        self.pool.release(state);
        Ok(())
    }
}

/// Decompressing reader handed out by [`PooledCompressor::new_decoder`].
struct Decoder<'r> {
    pool: Arc<DecoderPool>,
    state: Option<Box<dyn Decode>>,
    inner: Box<dyn Read + Send + 'r>,
    input: Vec<u8>,
    start: usize,
    end: usize,
    output: Vec<u8>,
    position: usize,
    done: bool,
}

impl Decoder<'_> {
    /// Decodes until some output is available or the stream has ended.
    fn fill(&mut self) -> io::Result<()> {
        self.output.clear();
        self.position = 0;

        while self.output.is_empty() && !self.done {
            let state = self.state.as_mut().ok_or_else(closed)?;

            if self.start == self.end {
                let n = self.inner.read(&mut self.input)?;
                if n == 0 {
                    state.finish(&mut self.output)?;
                    self.done = true;
                    break;
                }
                self.start = 0;
                self.end = n;
            }

            let (consumed, finished) = state.decode(&self.input[self.start..self.end], &mut self.output)?;
            self.start += consumed;
            if finished {
                self.done = true;
            }
        }

        Ok(())
    }
}

impl Read for Decoder<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.position == self.output.len() {
            if self.done {
                return Ok(0);
            }
            self.fill()?;
        }

        let available = &self.output[self.position..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.position += n;
        Ok(n)
    }
}

impl ReadClose for Decoder<'_> {
    fn close(mut self: Box<Self>) -> io::Result<()> {
        let state = self.state.take().ok_or_else(closed)?;
        self.pool.release(state);
        Ok(())
    }
}
