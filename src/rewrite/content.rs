//! Link discovery and substitution inside text and HTML bodies.
//!
//! Discovery is a per-content-type [`LinkStrategy`]: plain text is scanned
//! with a URL regex, HTML is streamed through `lol_html` and only `<a href>`
//! values are considered. Both defer the rewrite/preserve decision to the
//! same [`Rewriter::decide`].

use std::sync::LazyLock;

use lol_html::{element, HtmlRewriter, Settings};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use tracing::{trace, warn};

use crate::error::{GuardError, Result};

use super::classifier::UrlClassifier;

/// Bare URLs in plain text. The path and query must end on a word character,
/// `/` or `=`, so trailing sentence punctuation and closing brackets stay
/// outside the match.
static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://(?:[\w-]+\.)+[\w-]+(?:/[^\s<>"']*[\w/])?(?:\?[^\s<>"']*[\w=])?"#)
        .expect("URL pattern is a valid regex")
});

/// Characters left unescaped when embedding the original URL: unreserved
/// characters plus `: / ? = &`, keeping the wrapped URL readable.
const URL_PARAM: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b':')
    .remove(b'/')
    .remove(b'?')
    .remove(b'=')
    .remove(b'&');

/// Body flavours that carry rewritable links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    PlainText,
    Html,
}

impl ContentKind {
    /// Map an exact MIME type to a kind.
    pub fn from_mime(content_type: &str) -> Option<Self> {
        match content_type {
            "text/plain" => Some(Self::PlainText),
            "text/html" => Some(Self::Html),
            _ => None,
        }
    }

    /// MIME subtype written back into Content-Type.
    pub fn subtype(self) -> &'static str {
        match self {
            Self::PlainText => "plain",
            Self::Html => "html",
        }
    }

    fn strategy(self) -> &'static dyn LinkStrategy {
        match self {
            Self::PlainText => &PlainTextLinks,
            Self::Html => &HtmlAnchors,
        }
    }
}

/// What to do with one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Preserve,
    /// Replace with this proxied URL.
    Rewrite(String),
}

/// New content and whether any link changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    pub content: String,
    pub modified: bool,
}

impl Rewrite {
    fn unchanged(content: &str) -> Self {
        Self {
            content: content.to_string(),
            modified: false,
        }
    }
}

/// A URL found in content, with its `[start, end)` byte span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrlMatch<'a> {
    pub start: usize,
    pub end: usize,
    pub url: &'a str,
}

/// Find candidate URLs in plain text, in order.
pub fn find_urls(content: &str) -> impl Iterator<Item = UrlMatch<'_>> {
    URL_PATTERN.find_iter(content).map(|m| UrlMatch {
        start: m.start(),
        end: m.end(),
        url: m.as_str(),
    })
}

/// `https://<check_host>/check?url=<original>` with the original URL
/// percent-encoded except for `: / ? = &`.
pub fn proxied_url(check_host: &str, url: &str) -> String {
    format!(
        "https://{check_host}/check?url={}",
        utf8_percent_encode(url, URL_PARAM)
    )
}

/// Longest `&...;` sequence tried as a character reference.
const MAX_ENTITY_LEN: usize = 32;

/// Decode HTML character references in an attribute value.
///
/// Known references become characters; a bare `&` or an unknown name is
/// kept literally, as browsers do.
fn decode_entities(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let reference = rest[1..]
            .char_indices()
            .take(MAX_ENTITY_LEN)
            .take_while(|&(_, c)| c.is_ascii_alphanumeric() || c == '#' || c == ';')
            .find(|&(_, c)| c == ';')
            .map(|(i, _)| &rest[..i + 2]);
        match reference.and_then(|r| htmlescape::decode_html(r).ok().map(|d| (r.len(), d))) {
            Some((len, decoded)) => {
                out.push_str(&decoded);
                rest = &rest[len..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Finds links in one kind of content and substitutes them.
pub trait LinkStrategy: Sync {
    fn rewrite(&self, content: &str, decide: &dyn Fn(&str) -> Decision) -> Result<Rewrite>;
}

/// Regex scan over plain text.
pub struct PlainTextLinks;

impl LinkStrategy for PlainTextLinks {
    fn rewrite(&self, content: &str, decide: &dyn Fn(&str) -> Decision) -> Result<Rewrite> {
        let mut output = String::with_capacity(content.len());
        let mut last_end = 0;
        let mut modified = false;

        for found in find_urls(content) {
            output.push_str(&content[last_end..found.start]);
            match decide(found.url) {
                Decision::Rewrite(proxied) => {
                    output.push_str(&proxied);
                    modified = true;
                }
                Decision::Preserve => output.push_str(found.url),
            }
            last_end = found.end;
        }
        output.push_str(&content[last_end..]);

        Ok(Rewrite {
            content: output,
            modified,
        })
    }
}

/// `<a href="http...">` attributes in HTML. Text nodes are not scanned.
pub struct HtmlAnchors;

impl LinkStrategy for HtmlAnchors {
    fn rewrite(&self, content: &str, decide: &dyn Fn(&str) -> Decision) -> Result<Rewrite> {
        let mut output = Vec::with_capacity(content.len() + content.len() / 8);
        let mut modified = false;

        let mut rewriter = HtmlRewriter::new(
            Settings {
                element_content_handlers: vec![element!("a[href]", |el| {
                    let Some(href) = el.get_attribute("href") else {
                        return Ok(());
                    };
                    let url = decode_entities(&href);
                    if !url.starts_with("http") {
                        return Ok(());
                    }
                    if let Decision::Rewrite(proxied) = decide(&url) {
                        el.set_attribute("href", &proxied.replace('&', "&amp;"))?;
                        modified = true;
                    }
                    Ok(())
                })],
                ..Settings::default()
            },
            |chunk: &[u8]| output.extend_from_slice(chunk),
        );
        rewriter
            .write(content.as_bytes())
            .map_err(|e| GuardError::Html(e.to_string()))?;
        rewriter.end().map_err(|e| GuardError::Html(e.to_string()))?;

        let content = String::from_utf8(output).map_err(|e| GuardError::Html(e.to_string()))?;
        Ok(Rewrite { content, modified })
    }
}

/// Rewrites links in text bodies according to a [`UrlClassifier`].
#[derive(Debug, Clone)]
pub struct Rewriter {
    classifier: UrlClassifier,
}

impl Rewriter {
    pub fn new(classifier: UrlClassifier) -> Self {
        Self { classifier }
    }

    pub fn classifier(&self) -> &UrlClassifier {
        &self.classifier
    }

    /// Decide the fate of a single URL.
    pub fn decide(&self, url: &str) -> Decision {
        match self.classifier.skip_reason(url) {
            Some(reason) => {
                trace!(url, %reason, "Preserving link");
                Decision::Preserve
            }
            None => Decision::Rewrite(proxied_url(self.classifier.check_host(), url)),
        }
    }

    /// Rewrite every eligible link in `content`.
    ///
    /// Never fails: if the content cannot be processed, the original text is
    /// returned with `modified == false`.
    pub fn rewrite(&self, content: &str, kind: ContentKind) -> Rewrite {
        if content.is_empty() {
            return Rewrite::unchanged(content);
        }
        match kind.strategy().rewrite(content, &|url| self.decide(url)) {
            Ok(rewrite) => rewrite,
            Err(e) => {
                warn!(error = %e, ?kind, "Link rewriting failed, keeping original content");
                Rewrite::unchanged(content)
            }
        }
    }
}
