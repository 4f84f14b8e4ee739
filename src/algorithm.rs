//! Built-in compression algorithms backed by `compression-codecs`.

use crate::pool::{Decode, Encode, PooledCompressor, Reset};
#[cfg(feature = "brotli")]
use compression_codecs::brotli::{BrotliDecoder, BrotliEncoder, params::EncoderParams as BrotliParams};
#[cfg(feature = "deflate")]
use compression_codecs::deflate::{DeflateDecoder, DeflateEncoder};
#[cfg(feature = "gzip")]
use compression_codecs::gzip::{GzipDecoder, GzipEncoder};
#[cfg(feature = "zstd")]
use compression_codecs::zstd::{ZstdDecoder, ZstdEncoder};
use compression_codecs::{DecodeV2, EncodeV2};
#[cfg(any(feature = "gzip", feature = "deflate"))]
use compression_core::Level;
use compression_core::util::{PartialBuffer, WriteBuffer};
use std::io;

const OUTPUT_BUFFER_SIZE: usize = 8 * 1024; // 8KB output buffer

/// Compression algorithms shipped with the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// Zstd compression.
    #[cfg(feature = "zstd")]
    Zstd,
    /// Brotli compression.
    #[cfg(feature = "brotli")]
    Brotli,
    /// Gzip compression.
    #[cfg(feature = "gzip")]
    Gzip,
    /// Deflate compression.
    #[cfg(feature = "deflate")]
    Deflate,
}

impl Algorithm {
    /// Returns the Content-Encoding header value for this algorithm.
    pub fn content_encoding(&self) -> &'static str {
        match *self {
            #[cfg(feature = "zstd")]
            Algorithm::Zstd => "zstd",
            #[cfg(feature = "brotli")]
            Algorithm::Brotli => "br",
            #[cfg(feature = "gzip")]
            Algorithm::Gzip => "gzip",
            #[cfg(feature = "deflate")]
            Algorithm::Deflate => "deflate",
        }
    }

    fn encoder(&self) -> Box<dyn EncodeV2 + Send> {
        match *self {
            #[cfg(feature = "zstd")]
            Algorithm::Zstd => Box::new(ZstdEncoder::new(3)), // level 3 is a good default
            #[cfg(feature = "brotli")]
            Algorithm::Brotli => Box::new(BrotliEncoder::new(BrotliParams::default())),
            #[cfg(feature = "gzip")]
            Algorithm::Gzip => Box::new(GzipEncoder::new(Level::Default.into())),
            #[cfg(feature = "deflate")]
            Algorithm::Deflate => Box::new(DeflateEncoder::new(Level::Default.into())),
        }
    }

    fn decoder(&self) -> Box<dyn DecodeV2 + Send> {
        match *self {
            #[cfg(feature = "zstd")]
            Algorithm::Zstd => Box::new(ZstdDecoder::new()),
            #[cfg(feature = "brotli")]
            Algorithm::Brotli => Box::new(BrotliDecoder::new()),
            #[cfg(feature = "gzip")]
            Algorithm::Gzip => Box::new(GzipDecoder::new()),
            #[cfg(feature = "deflate")]
            Algorithm::Deflate => Box::new(DeflateDecoder::new()),
        }
    }

    /// Creates a pooled compressor for this algorithm.
    ///
    /// Decoder states are reinitialized and reused as a whole. Encoders
    /// cannot be rewound once finished, so a pooled encoder keeps only its
    /// output buffer and gets a fresh compression engine for every stream.
    pub fn compressor(self) -> PooledCompressor {
        PooledCompressor::new(
            self.content_encoding(),
            move || CodecEncoder::new(self),
            move || CodecDecoder::new(self),
        )
    }

    /// Like [`Algorithm::compressor`], keeping up to `capacity` idle states.
    pub fn compressor_with_capacity(self, capacity: usize) -> PooledCompressor {
        PooledCompressor::with_capacity(
            self.content_encoding(),
            capacity,
            move || CodecEncoder::new(self),
            move || CodecDecoder::new(self),
        )
    }
}

/// Encoder state for a built-in algorithm.
pub struct CodecEncoder {
    algorithm: Algorithm,
    encoder: Box<dyn EncodeV2 + Send>,
    output_buffer: Vec<u8>,
}

impl CodecEncoder {
    fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            encoder: algorithm.encoder(),
            output_buffer: vec![0u8; OUTPUT_BUFFER_SIZE],
        }
    }

    /// Drives `step` until it reports completion, collecting its output.
    fn drain<F>(&mut self, output: &mut Vec<u8>, mut step: F) -> io::Result<()>
    where
        F: FnMut(&mut (dyn EncodeV2 + Send), &mut WriteBuffer<'_>) -> io::Result<bool>,
    {
        loop {
            let mut buf = WriteBuffer::new_initialized(self.output_buffer.as_mut_slice());
            let done = step(self.encoder.as_mut(), &mut buf)?;
            let written = buf.written_len();
            output.extend_from_slice(&self.output_buffer[..written]);
            if done {
                return Ok(());
            }
        }
    }
}

impl Encode for CodecEncoder {
    fn encode(&mut self, input: &[u8], output: &mut Vec<u8>) -> io::Result<()> {
        let mut input_buf = PartialBuffer::new(input);

        // Keep encoding until all input is consumed
        loop {
            let consumed = input_buf.written_len();
            let mut buf = WriteBuffer::new_initialized(self.output_buffer.as_mut_slice());
            self.encoder
                .encode(&mut input_buf, &mut buf)
                .map_err(io::Error::other)?;

            let written = buf.written_len();
            output.extend_from_slice(&self.output_buffer[..written]);

            if input_buf.written_len() >= input.len() {
                return Ok(());
            }
            if written == 0 && input_buf.written_len() == consumed {
                return Err(io::Error::other("encoder made no progress"));
            }
        }
    }

    fn flush(&mut self, output: &mut Vec<u8>) -> io::Result<()> {
        self.drain(output, |encoder, buf| encoder.flush(buf).map_err(io::Error::other))
    }

    fn finish(&mut self, output: &mut Vec<u8>) -> io::Result<()> {
        self.drain(output, |encoder, buf| encoder.finish(buf).map_err(io::Error::other))
    }
}

impl Reset for CodecEncoder {
    // Encoders cannot be rewound once finished; only the engine is rebuilt,
    // the output buffer is kept.
    fn reset(&mut self) -> io::Result<()> {
        self.encoder = self.algorithm.encoder();
        Ok(())
    }
}

/// Decoder state for a built-in algorithm.
pub struct CodecDecoder {
    decoder: Box<dyn DecodeV2 + Send>,
    output_buffer: Vec<u8>,
}

impl CodecDecoder {
    fn new(algorithm: Algorithm) -> Self {
        Self {
            decoder: algorithm.decoder(),
            output_buffer: vec![0u8; OUTPUT_BUFFER_SIZE],
        }
    }
}

impl Decode for CodecDecoder {
    fn decode(&mut self, input: &[u8], output: &mut Vec<u8>) -> io::Result<(usize, bool)> {
        let mut input_buf = PartialBuffer::new(input);

        loop {
            let consumed = input_buf.written_len();
            let mut buf = WriteBuffer::new_initialized(self.output_buffer.as_mut_slice());
            let done = self
                .decoder
                .decode(&mut input_buf, &mut buf)
                .map_err(io::Error::other)?;

            let written = buf.written_len();
            output.extend_from_slice(&self.output_buffer[..written]);

            if done {
                return Ok((input_buf.written_len(), true));
            }
            // A full output buffer may mean more output is pending.
            if input_buf.written_len() >= input.len() && written < self.output_buffer.len() {
                return Ok((input_buf.written_len(), false));
            }
            if written == 0 && input_buf.written_len() == consumed {
                return Ok((consumed, false));
            }
        }
    }

    fn finish(&mut self, output: &mut Vec<u8>) -> io::Result<()> {
        loop {
            let mut buf = WriteBuffer::new_initialized(self.output_buffer.as_mut_slice());
            let done = self.decoder.finish(&mut buf).map_err(io::Error::other)?;
            let written = buf.written_len();
            output.extend_from_slice(&self.output_buffer[..written]);
            if done {
                return Ok(());
            }
        }
    }
}

impl Reset for CodecDecoder {
    fn reset(&mut self) -> io::Result<()> {
        self.decoder.reinit().map_err(io::Error::other)
    }
}
