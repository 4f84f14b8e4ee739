//! Character sets for request bodies and `Accept-Charset` negotiation.

use crate::error::CharsetError;
use crate::qheader;
use std::fmt;
use std::sync::Arc;

/// The charset assumed when none is specified.
pub const DEFAULT_CHARSET: &str = "utf-8";

/// A character set able to transcode bytes into UTF-8 text.
pub trait Charset: Send + Sync + fmt::Debug {
    /// Canonical lowercase name, e.g. `iso-8859-1`.
    fn name(&self) -> &'static str;

    /// Decodes `input` into a UTF-8 string.
    fn decode(&self, input: &[u8]) -> Result<String, CharsetError>;
}

/// Resolves charset names as found in `Content-Type` and `Accept-Charset`.
pub trait CharsetResolver: Send + Sync {
    /// Looks up a charset by name. Names are case-insensitive.
    fn get(&self, name: &str) -> Result<Arc<dyn Charset>, CharsetError>;
}

/// UTF-8.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8;

impl Charset for Utf8 {
    fn name(&self) -> &'static str {
        DEFAULT_CHARSET
    }

    fn decode(&self, input: &[u8]) -> Result<String, CharsetError> {
        std::str::from_utf8(input)
            .map(str::to_owned)
            .map_err(|e| CharsetError::Malformed {
                charset: self.name(),
                position: e.valid_up_to(),
            })
    }
}

/// 7-bit US-ASCII.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsAscii;

impl Charset for UsAscii {
    fn name(&self) -> &'static str {
        "us-ascii"
    }

    fn decode(&self, input: &[u8]) -> Result<String, CharsetError> {
        if let Some(position) = input.iter().position(|b| !b.is_ascii()) {
            return Err(CharsetError::Malformed {
                charset: self.name(),
                position,
            });
        }
        Ok(input.iter().map(|&b| b as char).collect())
    }
}

/// ISO-8859-1, where every byte maps to the code point of the same value.
#[derive(Debug, Clone, Copy, Default)]
pub struct Latin1;

impl Charset for Latin1 {
    fn name(&self) -> &'static str {
        "iso-8859-1"
    }

    fn decode(&self, input: &[u8]) -> Result<String, CharsetError> {
        Ok(input.iter().map(|&b| char::from(b)).collect())
    }
}

/// The built-in resolver: `utf-8`, `us-ascii` and `iso-8859-1` with their
/// common aliases.
#[derive(Debug, Clone, Copy, Default)]
pub struct Charsets;

impl CharsetResolver for Charsets {
    fn get(&self, name: &str) -> Result<Arc<dyn Charset>, CharsetError> {
        let charset: Arc<dyn Charset> = match name.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Arc::new(Utf8),
            "us-ascii" | "ascii" => Arc::new(UsAscii),
            "iso-8859-1" | "iso8859-1" | "latin1" | "l1" => Arc::new(Latin1),
            _ => return Err(CharsetError::Unknown(name.to_owned())),
        };
        Ok(charset)
    }
}

/// Returns true if `name` designates UTF-8, which needs no transcoding.
pub fn is_utf8(name: &str) -> bool {
    name.eq_ignore_ascii_case(DEFAULT_CHARSET)
}

/// Selects the charset for a response from an `Accept-Charset` header.
///
/// A header without entries selects UTF-8, as does `*`. Entries are tried by weight
/// and the first one the resolver knows wins. Returns `None` if nothing the
/// client accepts can be produced.
pub fn accept_charset(resolver: &dyn CharsetResolver, header: &str) -> Option<Arc<dyn Charset>> {
    let items = qheader::parse(header, "*");
    if items.is_empty() {
        return resolver.get(DEFAULT_CHARSET).ok();
    }

    for item in items {
        if let Some(err) = &item.error {
            tracing::warn!(error = %err, header, "skipping malformed Accept-Charset entry");
            continue;
        }
        if item.quality == 0.0 {
            continue;
        }

        let name = if item.value == "*" { DEFAULT_CHARSET } else { item.value };
        if let Ok(charset) = resolver.get(name) {
            return Some(charset);
        }
    }

    tracing::debug!(header, "no acceptable charset");
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selected(header: &str) -> Option<&'static str> {
        accept_charset(&Charsets, header).map(|c| c.name())
    }

    #[test]
    fn test_resolve_aliases() {
        assert_eq!(Charsets.get("UTF-8").unwrap().name(), "utf-8");
        assert_eq!(Charsets.get("latin1").unwrap().name(), "iso-8859-1");
        assert_eq!(Charsets.get("ASCII").unwrap().name(), "us-ascii");
        assert_eq!(
            Charsets.get("koi8-r").unwrap_err(),
            CharsetError::Unknown("koi8-r".into())
        );
    }

    #[test]
    fn test_decode() {
        assert_eq!(Latin1.decode(b"caf\xe9").unwrap(), "café");
        assert_eq!(UsAscii.decode(b"plain").unwrap(), "plain");
        assert_eq!(
            UsAscii.decode(b"ab\xe9").unwrap_err(),
            CharsetError::Malformed {
                charset: "us-ascii",
                position: 2
            }
        );
        assert_eq!(Utf8.decode("é".as_bytes()).unwrap(), "é");
        assert!(Utf8.decode(b"\xff").is_err());
    }

    #[test]
    fn test_is_utf8() {
        assert!(is_utf8("utf-8"));
        assert!(is_utf8("UTF-8"));
        assert!(!is_utf8("latin1"));
    }

    #[test]
    fn test_accept_charset_default() {
        assert_eq!(selected(""), Some("utf-8"));
        assert_eq!(selected("*"), Some("utf-8"));
        assert_eq!(selected(","), Some("utf-8"));
        assert_eq!(selected(" , "), Some("utf-8"));
    }

    #[test]
    fn test_accept_charset_by_quality() {
        assert_eq!(selected("utf-8;q=0.5, iso-8859-1"), Some("iso-8859-1"));
        assert_eq!(selected("koi8-r, us-ascii;q=0.8"), Some("us-ascii"));
        assert_eq!(selected("latin1;q=bad, ascii;q=0.1"), Some("us-ascii"));
    }

    #[test]
    fn test_accept_charset_none_acceptable() {
        assert_eq!(selected("koi8-r"), None);
        assert_eq!(selected("utf-8;q=0"), None);
    }
}
