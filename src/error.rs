//! Error types for negotiation and configuration.

use thiserror::Error;

/// Errors raised while configuring a [`CodecBuilder`](crate::CodecBuilder).
///
/// These indicate a misconfigured server and are only produced before the
/// codec is frozen.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A mimetype with the same name was already registered.
    #[error("mimetype {0} is already registered")]
    DuplicateMimetype(String),

    /// A mimetype was registered with an empty name.
    #[error("mimetype name must not be empty")]
    EmptyMimetypeName,

    /// A compressor was registered with an empty name.
    #[error("compressor name must not be empty")]
    EmptyCompressorName,
}

/// Errors raised while resolving the `Content-Type` of a request.
///
/// An HTTP layer maps all of these to `415 Unsupported Media Type`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContentTypeError {
    /// The header was empty.
    #[error("content type is empty")]
    Empty,

    /// No mimetype able to decode the body is registered under this name.
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// The `charset` parameter could not be resolved.
    #[error(transparent)]
    Charset(#[from] CharsetError),
}

/// Errors produced by charset resolution and transcoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CharsetError {
    /// The charset name is not known to the resolver.
    #[error("unknown charset: {0}")]
    Unknown(String),

    /// The input contains a byte sequence invalid for the charset.
    #[error("invalid {charset} byte sequence at offset {position}")]
    Malformed {
        /// Name of the charset used for decoding.
        charset: &'static str,
        /// Offset of the first invalid byte.
        position: usize,
    },
}

/// A malformed quality parameter inside a negotiable header.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid quality value {value:?} for {item:?}")]
pub struct QualityError {
    /// The value the parameter belongs to.
    pub item: String,
    /// The raw `q=` parameter value.
    pub value: String,
}
