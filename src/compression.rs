//! Registry of named compressors and `Accept-Encoding` negotiation.

use crate::error::ConfigError;
use crate::pool::Compressor;
use crate::qheader;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Encoding token meaning "no transformation".
pub const IDENTITY: &str = "identity";

/// A compressor registered under a content coding name, restricted to a set
/// of content types.
pub struct NamedCompressor {
    name: String,
    compressor: Arc<dyn Compressor>,
    exact_types: HashSet<String>,
    prefix_types: Vec<String>,
}

impl NamedCompressor {
    /// Creates an entry eligible for the given content type patterns.
    ///
    /// A pattern ending in `*` matches by prefix (`text/*` matches
    /// `text/plain`, `*` matches everything); any other pattern must match
    /// exactly. With no patterns the compressor applies to every type.
    pub fn new(
        name: impl Into<String>,
        compressor: Arc<dyn Compressor>,
        patterns: &[&str],
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ConfigError::EmptyCompressorName);
        }

        let mut exact_types = HashSet::new();
        let mut prefix_types: Vec<String> = Vec::new();
        if patterns.is_empty() {
            prefix_types.push(String::new());
        }
        for pattern in patterns {
            let pattern = pattern.trim();
            match pattern.strip_suffix('*') {
                Some(prefix) => {
                    if !prefix_types.iter().any(|p| p == prefix) {
                        prefix_types.push(prefix.to_owned());
                    }
                }
                None => {
                    exact_types.insert(pattern.to_owned());
                }
            }
        }

        Ok(Self {
            name,
            compressor,
            exact_types,
            prefix_types,
        })
    }

    /// The content coding name, e.g. `gzip`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The compressor used for this coding.
    pub fn compressor(&self) -> &dyn Compressor {
        self.compressor.as_ref()
    }

    /// Returns true if this compressor may be applied to `content_type`.
    /// Parameters such as `charset` are ignored.
    pub fn matches(&self, content_type: &str) -> bool {
        let content_type = media_type(content_type);
        self.exact_types.contains(content_type)
            || self.prefix_types.iter().any(|p| content_type.starts_with(p.as_str()))
    }
}

impl fmt::Debug for NamedCompressor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedCompressor")
            .field("name", &self.name)
            .field("exact_types", &self.exact_types)
            .field("prefix_types", &self.prefix_types)
            .finish()
    }
}

/// Strips parameters from a content type.
pub(crate) fn media_type(content_type: &str) -> &str {
    content_type
        .split_once(';')
        .map_or(content_type, |(mt, _)| mt)
        .trim()
}

/// Outcome of `Accept-Encoding` negotiation.
#[derive(Debug, Clone, Copy)]
pub enum Negotiated<'a> {
    /// Send the body uncompressed.
    Identity,
    /// Compress the body with this compressor.
    Compress(&'a NamedCompressor),
    /// The client refuses every available coding; reply `406`.
    NotAcceptable,
}

impl<'a> Negotiated<'a> {
    /// The selected compressor, if any.
    pub fn compressor(&self) -> Option<&'a NamedCompressor> {
        match *self {
            Negotiated::Compress(c) => Some(c),
            _ => None,
        }
    }

    /// The selected coding name, empty when not compressing.
    pub fn name(&self) -> &'a str {
        match *self {
            Negotiated::Compress(c) => c.name(),
            _ => "",
        }
    }

    /// Returns true if the response must be rejected with `406`.
    pub fn is_not_acceptable(&self) -> bool {
        matches!(self, Negotiated::NotAcceptable)
    }
}

/// Ordered list of named compressors. Registration order breaks ties.
#[derive(Debug, Default)]
pub struct Compressions {
    compressors: Vec<NamedCompressor>,
    accept_encoding: String,
}

impl Compressions {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a compressor and refreshes the advertised coding list.
    pub fn add(&mut self, compressor: NamedCompressor) {
        self.compressors.push(compressor);

        let mut names: Vec<&str> = Vec::with_capacity(self.compressors.len());
        for c in &self.compressors {
            if !names.contains(&c.name()) {
                names.push(c.name());
            }
        }
        self.accept_encoding = names.join(",");
    }

    /// Registered compressors in registration order.
    pub fn compressors(&self) -> &[NamedCompressor] {
        &self.compressors
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.compressors.is_empty()
    }

    /// De-duplicated, comma separated names of all registered codings.
    pub fn accept_encoding(&self) -> &str {
        &self.accept_encoding
    }

    /// Selects a coding for a response of `content_type` given the client's
    /// `Accept-Encoding` header.
    ///
    /// A trailing `*` entry offers the first eligible compressor the client
    /// did not name explicitly, or rejects everything when its weight is
    /// zero. Otherwise entries are tried by weight; an acceptable `identity`
    /// entry with no explicit match falls back to the first eligible
    /// compressor. Unknown codings result in an uncompressed response, never
    /// in a rejection.
    pub fn search(&self, content_type: &str, header: &str) -> Negotiated<'_> {
        if self.compressors.is_empty() {
            return Negotiated::Identity;
        }

        let accepts = qheader::parse(header, "*");
        let Some(last) = accepts.last() else {
            return Negotiated::Identity;
        };

        let eligible: Vec<&NamedCompressor> = self
            .compressors
            .iter()
            .filter(|c| c.matches(content_type))
            .collect();
        if eligible.is_empty() {
            return Negotiated::Identity;
        }

        if last.value == "*" && last.error.is_none() {
            if last.quality == 0.0 {
                tracing::debug!(header, "all content codings refused");
                return Negotiated::NotAcceptable;
            }

            let listed = |name: &str| accepts.iter().any(|item| item.value.eq_ignore_ascii_case(name));
            return match eligible.iter().find(|c| !listed(c.name())) {
                Some(&c) => Negotiated::Compress(c),
                None => Negotiated::Identity,
            };
        }

        let mut identity = None;
        for accept in &accepts {
            if let Some(err) = &accept.error {
                tracing::warn!(error = %err, header, "skipping malformed Accept-Encoding entry");
                continue;
            }
            if accept.value.eq_ignore_ascii_case(IDENTITY) {
                identity = Some(accept);
            }
            if accept.quality == 0.0 {
                continue;
            }
            if let Some(&c) = eligible.iter().find(|c| c.name().eq_ignore_ascii_case(accept.value)) {
                return Negotiated::Compress(c);
            }
        }

        match identity {
            Some(item) if item.quality > 0.0 => Negotiated::Compress(eligible[0]),
            _ => Negotiated::Identity,
        }
    }
}
