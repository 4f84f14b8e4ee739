//! The negotiation facade handed to the HTTP layer.

use crate::charset::{self, Charset, CharsetResolver, Charsets};
use crate::compression::{Compressions, NamedCompressor, Negotiated};
use crate::error::{ConfigError, ContentTypeError};
use crate::mimetype::{Mimetype, Mimetypes};
use crate::pool::Compressor;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Collects mimetypes and compressors before serving starts.
///
/// Calling [`CodecBuilder::build`] freezes the configuration into a
/// [`Codec`] that only allows negotiation.
pub struct CodecBuilder<M, U> {
    mimetypes: Mimetypes<M, U>,
    compressions: Compressions,
    charsets: Arc<dyn CharsetResolver>,
    compress: bool,
}

impl<M, U> CodecBuilder<M, U> {
    /// Creates an empty builder with compression enabled and the built-in
    /// charsets.
    pub fn new() -> Self {
        Self {
            mimetypes: Mimetypes::new(),
            compressions: Compressions::new(),
            charsets: Arc::new(Charsets),
            compress: true,
        }
    }

    /// Registers a format. The first registered format is the default
    /// answer to requests without an `Accept` header.
    pub fn add_mimetype(
        &mut self,
        name: &str,
        marshal: M,
        unmarshal: Option<U>,
        problem: &str,
    ) -> Result<&mut Self, ConfigError> {
        self.mimetypes.add(name, marshal, unmarshal, problem)?;
        Ok(self)
    }

    /// Registers a compressor for the content types matching `patterns`
    /// (`text/plain`, `text/*`, `*`).
    pub fn add_compressor(
        &mut self,
        name: &str,
        compressor: Arc<dyn Compressor>,
        patterns: &[&str],
    ) -> Result<&mut Self, ConfigError> {
        self.compressions
            .add(NamedCompressor::new(name, compressor, patterns)?);
        Ok(self)
    }

    /// Replaces the charset resolver.
    pub fn charsets(&mut self, resolver: Arc<dyn CharsetResolver>) -> &mut Self {
        self.charsets = resolver;
        self
    }

    /// Sets whether responses may be compressed initially.
    pub fn compress(&mut self, enabled: bool) -> &mut Self {
        self.compress = enabled;
        self
    }

    /// Freezes the configuration.
    pub fn build(self) -> Codec<M, U> {
        tracing::debug!(
            mimetypes = self.mimetypes.items().len(),
            compressors = self.compressions.compressors().len(),
            accept = self.mimetypes.accept_header(),
            accept_encoding = self.compressions.accept_encoding(),
            "codec configured"
        );
        Codec {
            mimetypes: self.mimetypes,
            compressions: self.compressions,
            charsets: self.charsets,
            compress: AtomicBool::new(self.compress),
        }
    }
}

impl<M, U> Default for CodecBuilder<M, U> {
    fn default() -> Self {
        Self::new()
    }
}

/// Content negotiation for one server: output format, request format and
/// charset, and response compression.
///
/// The registries are immutable; only the compression switch may change
/// while serving.
pub struct Codec<M, U> {
    mimetypes: Mimetypes<M, U>,
    compressions: Compressions,
    charsets: Arc<dyn CharsetResolver>,
    compress: AtomicBool,
}

impl<M, U> Codec<M, U> {
    /// Starts configuring a codec.
    pub fn builder() -> CodecBuilder<M, U> {
        CodecBuilder::new()
    }

    /// Selects the response format for an `Accept` header. `None` means
    /// `406 Not Acceptable`.
    pub fn accept(&self, header: &str) -> Option<&Mimetype<M, U>> {
        self.mimetypes.accept(header)
    }

    /// Resolves a request `Content-Type` into its unmarshal function and
    /// the charset to transcode from (`None` for UTF-8).
    pub fn content_type(
        &self,
        header: &str,
    ) -> Result<(&U, Option<Arc<dyn Charset>>), ContentTypeError> {
        self.mimetypes.content_type(header, self.charsets.as_ref())
    }

    /// Selects the response charset for an `Accept-Charset` header. `None`
    /// means `406 Not Acceptable`.
    pub fn accept_charset(&self, header: &str) -> Option<Arc<dyn Charset>> {
        charset::accept_charset(self.charsets.as_ref(), header)
    }

    /// Selects the coding for a response of `content_type` given the
    /// client's `Accept-Encoding` header. Never compresses while compression
    /// is disabled.
    pub fn search(&self, content_type: &str, accept_encoding: &str) -> Negotiated<'_> {
        if !self.can_compress() {
            return Negotiated::Identity;
        }

        let negotiated = self.compressions.search(content_type, accept_encoding);
        tracing::debug!(
            content_type,
            accept_encoding,
            selected = negotiated.name(),
            not_acceptable = negotiated.is_not_acceptable(),
            "negotiated content coding"
        );
        negotiated
    }

    /// Registered mimetypes.
    pub fn mimetypes(&self) -> &Mimetypes<M, U> {
        &self.mimetypes
    }

    /// Registered compressors.
    pub fn compressions(&self) -> &Compressions {
        &self.compressions
    }

    /// Value for an `Accept` header listing the request formats understood.
    pub fn accept_header(&self) -> &str {
        self.mimetypes.accept_header()
    }

    /// Value for an `Accept-Encoding` header listing the supported codings.
    pub fn accept_encoding_header(&self) -> &str {
        self.compressions.accept_encoding()
    }

    /// Returns true if responses may currently be compressed.
    pub fn can_compress(&self) -> bool {
        self.compress.load(Ordering::Relaxed)
    }

    /// Allows response compression.
    pub fn enable_compress(&self) {
        self.compress.store(true, Ordering::Relaxed);
    }

    /// Disables response compression.
    pub fn disable_compress(&self) {
        self.compress.store(false, Ordering::Relaxed);
    }
}

impl<M, U> fmt::Debug for Codec<M, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec")
            .field("mimetypes", &self.mimetypes)
            .field("compressions", &self.compressions)
            .field("compress", &self.can_compress())
            .finish()
    }
}
