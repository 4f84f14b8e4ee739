//! Registry of serialization formats, `Accept` selection and `Content-Type`
//! resolution.

use crate::charset::{self, Charset, CharsetResolver};
use crate::error::{ConfigError, ContentTypeError};
use crate::qheader;
use std::fmt;
use std::sync::Arc;

/// Token matching every media type in an `Accept` header.
pub const ANY_MIMETYPE: &str = "*/*";

/// A registered representation format.
///
/// The marshal builder and unmarshal function are opaque to the registry; an
/// entry without an unmarshal function can only be used for output.
pub struct Mimetype<M, U> {
    name: String,
    problem: String,
    marshal: M,
    unmarshal: Option<U>,
}

impl<M, U> Mimetype<M, U> {
    /// The media type, e.g. `application/json`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The media type used for problem (structured error) bodies.
    pub fn problem(&self) -> &str {
        &self.problem
    }

    /// Returns the media type to announce for a normal or a problem body.
    pub fn name_for(&self, problem: bool) -> &str {
        if problem { &self.problem } else { &self.name }
    }

    /// The marshal builder.
    pub fn marshal(&self) -> &M {
        &self.marshal
    }

    /// The unmarshal function, absent for output-only formats.
    pub fn unmarshal(&self) -> Option<&U> {
        self.unmarshal.as_ref()
    }
}

impl<M, U> fmt::Debug for Mimetype<M, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mimetype")
            .field("name", &self.name)
            .field("problem", &self.problem)
            .field("unmarshal", &self.unmarshal.is_some())
            .finish()
    }
}

/// Ordered list of mimetypes. The first entry is the default.
pub struct Mimetypes<M, U> {
    items: Vec<Mimetype<M, U>>,
    accept: String,
}

impl<M, U> Default for Mimetypes<M, U> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            accept: String::new(),
        }
    }
}

impl<M, U> fmt::Debug for Mimetypes<M, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.items).finish()
    }
}

impl<M, U> Mimetypes<M, U> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a format. An empty `problem` falls back to `name`.
    pub fn add(
        &mut self,
        name: &str,
        marshal: M,
        unmarshal: Option<U>,
        problem: &str,
    ) -> Result<(), ConfigError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ConfigError::EmptyMimetypeName);
        }
        if self.get(name).is_some() {
            return Err(ConfigError::DuplicateMimetype(name.to_owned()));
        }

        let problem = match problem.trim() {
            "" => name,
            p => p,
        };
        self.items.push(Mimetype {
            name: name.to_owned(),
            problem: problem.to_owned(),
            marshal,
            unmarshal,
        });

        self.accept = self
            .items
            .iter()
            .filter(|m| m.unmarshal.is_some())
            .map(|m| m.name.as_str())
            .collect::<Vec<_>>()
            .join(",");
        Ok(())
    }

    /// Registered formats in registration order.
    pub fn items(&self) -> &[Mimetype<M, U>] {
        &self.items
    }

    /// Comma separated names of the formats accepted as request bodies.
    pub fn accept_header(&self) -> &str {
        &self.accept
    }

    /// Looks up a format by exact (case-insensitive) name.
    pub fn get(&self, name: &str) -> Option<&Mimetype<M, U>> {
        self.items.iter().find(|m| m.name.eq_ignore_ascii_case(name))
    }

    /// Resolves one `Accept` entry: exact name, `type/*` range, or `*/*`.
    fn find(&self, value: &str) -> Option<&Mimetype<M, U>> {
        if value == ANY_MIMETYPE {
            return self.items.first();
        }
        if let Some(prefix) = value.strip_suffix('*').filter(|p| p.ends_with('/')) {
            return self.items.iter().find(|m| {
                m.name
                    .get(..prefix.len())
                    .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
            });
        }
        self.get(value)
    }

    /// Selects the output format for an `Accept` header.
    ///
    /// A header without entries selects the first registered format. Returns `None`
    /// when nothing matches, which maps to `406 Not Acceptable`.
    pub fn accept(&self, header: &str) -> Option<&Mimetype<M, U>> {
        let items = qheader::parse(header, ANY_MIMETYPE);
        if items.is_empty() {
            return self.items.first();
        }

        for item in items {
            if let Some(err) = &item.error {
                tracing::warn!(error = %err, header, "skipping malformed Accept entry");
                continue;
            }
            if item.quality == 0.0 {
                continue;
            }
            if let Some(m) = self.find(item.value) {
                return Some(m);
            }
        }

        tracing::debug!(header, "no acceptable mimetype");
        None
    }

    /// Resolves a request `Content-Type` into the unmarshal function and,
    /// for charsets other than UTF-8, the charset to transcode from.
    pub fn content_type(
        &self,
        header: &str,
        charsets: &dyn CharsetResolver,
    ) -> Result<(&U, Option<Arc<dyn Charset>>), ContentTypeError> {
        let mut parts = header.split(';');
        let name = parts.next().unwrap_or("").trim();
        if name.is_empty() {
            return Err(ContentTypeError::Empty);
        }

        let unmarshal = self
            .get(name)
            .and_then(Mimetype::unmarshal)
            .ok_or_else(|| ContentTypeError::UnsupportedMediaType(name.to_owned()))?;

        let charset = parts.find_map(|param| {
            let (key, value) = param.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("charset")
                .then(|| value.trim().trim_matches('"'))
        });

        match charset {
            None => Ok((unmarshal, None)),
            Some(c) if c.is_empty() || charset::is_utf8(c) => Ok((unmarshal, None)),
            Some(c) => Ok((unmarshal, Some(charsets.get(c)?))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charset::Charsets;
    use crate::error::CharsetError;
    use serde_json::{Value, json};

    type Marshal = fn(&Value) -> Vec<u8>;
    type Unmarshal = fn(&[u8]) -> Result<Value, String>;

    fn marshal_json(v: &Value) -> Vec<u8> {
        serde_json::to_vec(v).unwrap()
    }

    fn unmarshal_json(data: &[u8]) -> Result<Value, String> {
        serde_json::from_slice(data).map_err(|e| e.to_string())
    }

    fn marshal_text(v: &Value) -> Vec<u8> {
        v.to_string().into_bytes()
    }

    fn unmarshal_text(data: &[u8]) -> Result<Value, String> {
        Ok(Value::String(String::from_utf8_lossy(data).into_owned()))
    }

    fn registry() -> Mimetypes<Marshal, Unmarshal> {
        let mut m = Mimetypes::new();
        m.add(
            "application/json",
            marshal_json as Marshal,
            Some(unmarshal_json as Unmarshal),
            "application/problem+json",
        )
        .unwrap();
        m.add("text/plain", marshal_text, Some(unmarshal_text), "")
            .unwrap();
        m.add("text/html", marshal_text, None, "").unwrap();
        m
    }

    fn accepted(m: &Mimetypes<Marshal, Unmarshal>, header: &str) -> Option<String> {
        m.accept(header).map(|m| m.name().to_owned())
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut m = registry();
        let err = m
            .add("application/json", marshal_text, None, "")
            .unwrap_err();
        assert_eq!(err, ConfigError::DuplicateMimetype("application/json".into()));
        assert_eq!(m.items().len(), 3);
        assert_eq!(m.items()[0].problem(), "application/problem+json");
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut m = registry();
        assert_eq!(
            m.add(" ", marshal_text, None, "").unwrap_err(),
            ConfigError::EmptyMimetypeName
        );
    }

    #[test]
    fn test_problem_defaults_to_name() {
        let m = registry();
        let text = m.get("text/plain").unwrap();
        assert_eq!(text.problem(), "text/plain");
        let json = m.get("application/json").unwrap();
        assert_eq!(json.name_for(true), "application/problem+json");
        assert_eq!(json.name_for(false), "application/json");
    }

    #[test]
    fn test_accept_header_skips_output_only() {
        assert_eq!(registry().accept_header(), "application/json,text/plain");
    }

    #[test]
    fn test_accept_default() {
        let m = registry();
        assert_eq!(accepted(&m, "").as_deref(), Some("application/json"));
        assert_eq!(accepted(&m, "*/*").as_deref(), Some("application/json"));
        assert_eq!(accepted(&m, ",").as_deref(), Some("application/json"));
        assert_eq!(accepted(&m, " , ").as_deref(), Some("application/json"));
    }

    #[test]
    fn test_accept_exact_and_ranges() {
        let m = registry();
        assert_eq!(accepted(&m, "text/plain").as_deref(), Some("text/plain"));
        assert_eq!(accepted(&m, "text/*").as_deref(), Some("text/plain"));
        assert_eq!(accepted(&m, "Text/HTML").as_deref(), Some("text/html"));
        assert_eq!(
            accepted(&m, "text/html;q=0.9, application/json").as_deref(),
            Some("application/json")
        );
        assert_eq!(
            accepted(&m, "application/xml, */*;q=0.1").as_deref(),
            Some("application/json")
        );
        assert_eq!(
            accepted(&m, "*/*, text/html").as_deref(),
            Some("text/html")
        );
    }

    #[test]
    fn test_accept_output_only_matchable() {
        let m = registry();
        let html = m.accept("text/html").unwrap();
        assert!(html.unmarshal().is_none());
        assert_eq!((html.marshal())(&json!("x")), b"\"x\"");
    }

    #[test]
    fn test_not_acceptable() {
        let m = registry();
        assert!(m.accept("application/xml").is_none());
        assert!(m.accept("image/*").is_none());
        assert!(m.accept("application/json;q=0").is_none());
        assert!(m.accept("application/json;q=oops").is_none());
    }

    #[test]
    fn test_empty_registry() {
        let m: Mimetypes<Marshal, Unmarshal> = Mimetypes::new();
        assert!(m.accept("").is_none());
        assert!(m.accept("*/*").is_none());
    }

    #[test]
    fn test_content_type_utf8() {
        let m = registry();
        for entry in m.items().iter().filter(|e| e.unmarshal().is_some()) {
            let header = format!("{}; charset=utf-8", entry.name());
            let (unmarshal, charset) = m.content_type(&header, &Charsets).unwrap();
            assert!(charset.is_none());
            assert_eq!(unmarshal(b"\"v\""), (entry.unmarshal().unwrap())(b"\"v\""));
        }

        let (unmarshal, charset) = m.content_type("application/json", &Charsets).unwrap();
        assert!(charset.is_none());
        assert_eq!(unmarshal(br#"{"a":1}"#).unwrap(), json!({"a": 1}));

        let (_, charset) = m
            .content_type("application/json; charset=\"UTF-8\"", &Charsets)
            .unwrap();
        assert!(charset.is_none());
    }

    #[test]
    fn test_content_type_other_charset() {
        let m = registry();
        let (unmarshal, charset) = m
            .content_type("text/plain;charset=iso-8859-1", &Charsets)
            .unwrap();
        let charset = charset.expect("expected a charset");
        assert_eq!(charset.name(), "iso-8859-1");

        let text = charset.decode(b"caf\xe9").unwrap();
        assert_eq!(unmarshal(text.as_bytes()).unwrap(), json!("café"));
    }

    #[test]
    fn test_content_type_errors() {
        let m = registry();
        assert_eq!(
            m.content_type("", &Charsets).unwrap_err(),
            ContentTypeError::Empty
        );
        assert_eq!(
            m.content_type("application/xml", &Charsets).unwrap_err(),
            ContentTypeError::UnsupportedMediaType("application/xml".into())
        );
        assert_eq!(
            m.content_type("text/html", &Charsets).unwrap_err(),
            ContentTypeError::UnsupportedMediaType("text/html".into())
        );
        assert_eq!(
            m.content_type("text/plain; charset=koi8-r", &Charsets)
                .unwrap_err(),
            ContentTypeError::Charset(CharsetError::Unknown("koi8-r".into()))
        );
    }
}
