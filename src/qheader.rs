//! Parsing of quality-weighted headers such as `Accept`, `Accept-Charset`
//! and `Accept-Encoding`.

use crate::error::QualityError;

/// One comma separated entry of a quality-weighted header.
#[derive(Debug, Clone, PartialEq)]
pub struct QHeaderItem<'a> {
    /// The entry without its parameters, e.g. `gzip` or `text/html`.
    pub value: &'a str,
    /// The `q` weight, `1.0` when absent and `0.0` when malformed.
    pub quality: f32,
    /// Set when the `q` parameter could not be parsed.
    pub error: Option<QualityError>,
}

impl<'a> QHeaderItem<'a> {
    /// Parses one segment like `br;q=0.8`. Blank segments yield `None`.
    fn parse(segment: &'a str) -> Option<Self> {
        let mut parts = segment.split(';');
        let value = parts.next().unwrap_or("").trim();
        if value.is_empty() {
            return None;
        }

        let mut item = QHeaderItem {
            value,
            quality: 1.0,
            error: None,
        };

        for param in parts {
            let Some((key, raw)) = param.split_once('=') else {
                continue;
            };
            if !key.trim().eq_ignore_ascii_case("q") {
                continue;
            }

            let raw = raw.trim();
            match raw.parse::<f32>() {
                Ok(q) if (0.0..=1.0).contains(&q) => item.quality = q,
                _ => {
                    item.quality = 0.0;
                    item.error = Some(QualityError {
                        item: value.to_owned(),
                        value: raw.to_owned(),
                    });
                }
            }
            // Only the first weight counts.
            break;
        }

        Some(item)
    }

    /// Returns true if the item was parsed cleanly and has a non-zero weight.
    pub fn is_acceptable(&self) -> bool {
        self.error.is_none() && self.quality > 0.0
    }

    /// Orders concrete values before partial (`type/*`) and full wildcards.
    fn wildcard_rank(&self, any: &str) -> u8 {
        if self.value == any {
            2
        } else if self.value.ends_with("/*") {
            1
        } else {
            0
        }
    }
}

/// Parses a quality-weighted header.
///
/// Items are sorted by descending quality. Among equal weights, wildcards
/// (`any`, and `type/*` ranges) come after concrete values and the client's
/// declaration order is kept otherwise. Malformed `q` parameters do not
/// abort the parse: the item is kept with `error` set and a weight of zero.
///
/// An empty header yields an empty list.
pub fn parse<'a>(header: &'a str, any: &str) -> Vec<QHeaderItem<'a>> {
    let mut items: Vec<QHeaderItem<'a>> = header.split(',').filter_map(QHeaderItem::parse).collect();

    // `sort_by` is stable, which keeps declaration order among equals.
    items.sort_by(|a, b| {
        b.quality
            .total_cmp(&a.quality)
            .then_with(|| a.wildcard_rank(any).cmp(&b.wildcard_rank(any)))
    });

    items
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values<'a>(items: &[QHeaderItem<'a>]) -> Vec<&'a str> {
        items.iter().map(|i| i.value).collect()
    }

    #[test]
    fn test_empty_header() {
        assert!(parse("", "*").is_empty());
        assert!(parse(" , ,", "*").is_empty());
    }

    #[test]
    fn test_default_quality() {
        let items = parse("gzip", "*");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].value, "gzip");
        assert_eq!(items[0].quality, 1.0);
        assert!(items[0].error.is_none());
    }

    #[test]
    fn test_sorted_by_quality() {
        let items = parse("gzip;q=0.5, br, zstd;q=0.8", "*");
        assert_eq!(values(&items), vec!["br", "zstd", "gzip"]);
        assert_eq!(items[1].quality, 0.8);
    }

    #[test]
    fn test_ties_keep_declaration_order() {
        let items = parse("deflate, gzip, br", "*");
        assert_eq!(values(&items), vec!["deflate", "gzip", "br"]);
    }

    #[test]
    fn test_whitespace_and_uppercase_q() {
        let items = parse("  gzip ; Q = 0.3 ,br ;q=0.4", "*");
        assert_eq!(values(&items), vec!["br", "gzip"]);
        assert_eq!(items[1].quality, 0.3);
    }

    #[test]
    fn test_other_params_ignored() {
        let items = parse("text/html;level=1;q=0.7", "*/*");
        assert_eq!(items[0].value, "text/html");
        assert_eq!(items[0].quality, 0.7);
    }

    #[test]
    fn test_wildcard_sorted_after_concrete() {
        let items = parse("*, gzip, compress", "*");
        assert_eq!(values(&items), vec!["gzip", "compress", "*"]);

        let items = parse("*;q=0.5, gzip;q=0.2", "*");
        assert_eq!(values(&items), vec!["*", "gzip"]);
    }

    #[test]
    fn test_accept_ranges_ordering() {
        let items = parse("*/*, text/*, text/html", "*/*");
        assert_eq!(values(&items), vec!["text/html", "text/*", "*/*"]);
    }

    #[test]
    fn test_malformed_quality_kept_with_error() {
        let items = parse("gzip;q=abc, br;q=2, deflate", "*");
        assert_eq!(values(&items), vec!["deflate", "gzip", "br"]);

        let gzip = &items[1];
        assert_eq!(gzip.quality, 0.0);
        let err = gzip.error.as_ref().expect("expected quality error");
        assert_eq!(err.item, "gzip");
        assert_eq!(err.value, "abc");

        assert!(items[2].error.is_some());
        assert!(!items[2].is_acceptable());
        assert!(items[0].is_acceptable());
    }

    #[test]
    fn test_first_quality_wins() {
        let items = parse("gzip;q=abc;q=0.95, br;q=0.9", "*");
        assert_eq!(values(&items), vec!["br", "gzip"]);
        assert_eq!(items[1].quality, 0.0);
        assert!(items[1].error.is_some());

        let items = parse("gzip;q=0.2;q=0.9, br;q=0.5", "*");
        assert_eq!(values(&items), vec!["br", "gzip"]);
        assert_eq!(items[1].quality, 0.2);
    }

    #[test]
    fn test_zero_quality_kept() {
        let items = parse("identity;q=0, gzip", "*");
        assert_eq!(values(&items), vec!["gzip", "identity"]);
        assert!(items[1].error.is_none());
        assert!(!items[1].is_acceptable());
    }
}
