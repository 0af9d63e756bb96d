//! Citation post-processing applied once a stream has closed.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use reqwest::Url;
use serde_json::Value;

use crate::types::Source;

/// One or more `[n]` markers directly followed by a punctuation character.
static MARKERS_BEFORE_PUNCT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"((?:\[\d+\])+)([.!?,;:])").unwrap());
static MARKER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\d+\]").unwrap());

/// Normalize raw upstream citations into display sources.
///
/// Anything other than a JSON array yields no sources.
pub fn format_citations(citations: &Value) -> Vec<Source> {
    match citations {
        Value::Array(items) => items.iter().map(format_citation).collect(),
        _ => Vec::new(),
    }
}

fn format_citation(citation: &Value) -> Source {
    match citation {
        Value::String(url) => Source {
            title: None,
            url: url.clone(),
            excerpt: String::new(),
            domain: extract_domain(url),
        },
        Value::Object(fields) => {
            let text = |key: &str| {
                fields
                    .get(key)
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
            };
            // No usable url: the record itself is the only URL candidate left.
            let url = text("url")
                .map(str::to_string)
                .unwrap_or_else(|| citation.to_string());
            Source {
                title: text("title").map(str::to_string),
                excerpt: text("snippet")
                    .or_else(|| text("excerpt"))
                    .unwrap_or_default()
                    .to_string(),
                domain: extract_domain(&url),
                url,
            }
        }
        other => {
            let url = other.to_string();
            Source {
                title: None,
                domain: extract_domain(&url),
                url,
                excerpt: String::new(),
            }
        }
    }
}

/// Host of `url` without a leading `www.`; `url` itself when it has no host.
pub fn extract_domain(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => match parsed.host_str() {
            Some(host) => host.strip_prefix("www.").unwrap_or(host).to_string(),
            None => url.to_string(),
        },
        Err(_) => url.to_string(),
    }
}

/// Move citation markers behind the punctuation they precede.
///
/// `text[1].` becomes `text.[1]` and `text[1][2],` becomes `text,[1][2]`.
/// Markers not directly followed by punctuation are left alone. Rewriting
/// runs to a fixpoint, so `[1].[2].` settles as `..[1][2]` and applying
/// the function twice gives the same result as once.
pub fn normalize_citation_placement(content: &str) -> String {
    let mut current = content.to_string();
    loop {
        let rewritten = match MARKERS_BEFORE_PUNCT_RE.replace_all(&current, move_markers) {
            Cow::Borrowed(_) => break,
            Cow::Owned(rewritten) => rewritten,
        };
        current = rewritten;
    }
    current
}

fn move_markers(caps: &Captures) -> String {
    let markers: String = MARKER_RE
        .find_iter(&caps[1])
        .map(|m| m.as_str())
        .collect();
    format!("{}{}", &caps[2], markers)
}
