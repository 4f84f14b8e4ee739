//! HTTP content negotiation with pooled streaming compression.
//!
//! A [`Codec`] decides, for every request, which serialization format to
//! answer with (`Accept`), how to read the request body (`Content-Type`),
//! which charset to use (`Accept-Charset`) and whether to compress the
//! response (`Accept-Encoding`).
//!
//! # Example
//!
//! ```ignore
//! use http_negotiation::{Algorithm, Codec, NegotiationLayer};
//! use std::sync::Arc;
//! use tower::ServiceBuilder;
//!
//! let mut builder = Codec::builder();
//! builder
//!     .add_mimetype("application/json", marshal_json, Some(unmarshal_json), "application/problem+json")?
//!     .add_compressor("br", Arc::new(Algorithm::Brotli.compressor()), &["text/*", "application/json"])?
//!     .add_compressor("gzip", Arc::new(Algorithm::Gzip.compressor()), &["*"])?;
//! let codec = Arc::new(builder.build());
//!
//! let service = ServiceBuilder::new()
//!     .layer(NegotiationLayer::new(codec))
//!     .service(my_service);
//! ```
//!
//! # Accept-Encoding rules
//!
//! - Nothing is compressed when no compressor is eligible for the response
//!   `Content-Type`, or the header is missing.
//! - A trailing `*` selects the first eligible compressor the client did not
//!   list; `*;q=0` rejects the response with `406 Not Acceptable`.
//! - Otherwise the highest weighted listed coding wins, ties going to the
//!   client's order. An acceptable `identity` with no other match falls
//!   back to the first eligible compressor.
//!
//! # Response Modifications
//!
//! When the layer compresses a response:
//! - `Content-Encoding` header is set to the coding used
//! - `Content-Length` header is removed (compressed size is unknown)
//! - `Accept-Ranges` header is removed
//! - `Vary` header includes `Accept-Encoding`
//!
//! Responses that already carry `Content-Encoding` or `Content-Range`, or
//! whose `Content-Length` is below the minimum size, are left untouched.

#![deny(missing_docs)]

mod algorithm;
mod body;
mod charset;
mod codec;
mod compression;
mod error;
mod future;
mod layer;
mod mimetype;
mod pool;
pub mod qheader;
mod service;

pub use algorithm::{Algorithm, CodecDecoder, CodecEncoder};
pub use body::CompressionBody;
pub use charset::{
    Charset, CharsetResolver, Charsets, DEFAULT_CHARSET, Latin1, UsAscii, Utf8, accept_charset,
};
pub use codec::{Codec, CodecBuilder};
pub use compression::{Compressions, IDENTITY, NamedCompressor, Negotiated};
pub use error::{CharsetError, ConfigError, ContentTypeError, QualityError};
pub use future::ResponseFuture;
pub use layer::{DEFAULT_MIN_SIZE, NegotiationLayer};
pub use mimetype::{ANY_MIMETYPE, Mimetype, Mimetypes};
pub use pool::{
    Compressor, DEFAULT_POOL_CAPACITY, Decode, Encode, Pool, PooledCompressor, ReadClose, Reset,
    WriteClose,
};
pub use service::NegotiationService;
