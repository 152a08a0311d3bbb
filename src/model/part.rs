//! A single MIME part and the attributes derived from its headers.

use crate::error::{GuardError, Result};
use crate::parser::encoding;
use crate::parser::header::{parse_structured, StructuredValue};

use super::header::Header;
use super::tree::PartId;

/// Content type assumed when a part declares none (RFC 2045 §5.2).
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// Payload of a part: either encoded body bytes or child parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// Raw (still transfer-encoded) body bytes.
    Leaf(Vec<u8>),
    /// Child parts plus the raw bytes around them.
    ///
    /// `segments` always has `children.len() + 1` entries: the preamble and
    /// first delimiter, the delimiters between children, and the closing
    /// delimiter with any epilogue.
    Container {
        children: Vec<PartId>,
        segments: Vec<Vec<u8>>,
    },
}

/// One node of a MIME tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    headers: Vec<Header>,
    separator: Vec<u8>,
    body: Body,
}

/// Headers and body computed for a part before it is touched.
///
/// Built by [`Part::prepare_text`] and swapped in by [`Part::apply`], so a
/// failure while encoding never leaves a half-written part behind.
#[derive(Debug, Clone)]
pub struct Replacement {
    headers: Vec<Header>,
    body: Vec<u8>,
}

impl Part {
    pub(crate) fn new(headers: Vec<Header>, separator: Vec<u8>, body: Body) -> Self {
        Self {
            headers,
            separator,
            body,
        }
    }

    pub(crate) fn set_body(&mut self, body: Body) {
        self.body = body;
    }

    /// Header fields in message order.
    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    /// Mutable access to the header list.
    pub fn headers_mut(&mut self) -> &mut Vec<Header> {
        &mut self.headers
    }

    /// Value of the first header with this name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers.iter().find(|h| h.is(name)).map(Header::value)
    }

    /// The blank line ending the header block (may be empty).
    pub fn separator(&self) -> &[u8] {
        &self.separator
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    /// `true` if this part holds children rather than content.
    pub fn is_container(&self) -> bool {
        matches!(self.body, Body::Container { .. })
    }

    /// Child ids, empty for leaves.
    pub fn children(&self) -> &[PartId] {
        match &self.body {
            Body::Container { children, .. } => children,
            Body::Leaf(_) => &[],
        }
    }

    /// Raw encoded body bytes of a leaf.
    pub fn leaf_body(&self) -> Option<&[u8]> {
        match &self.body {
            Body::Leaf(bytes) => Some(bytes),
            Body::Container { .. } => None,
        }
    }

    fn structured(&self, name: &str) -> Option<StructuredValue> {
        self.header(name).map(|v| parse_structured(&v))
    }

    /// Lower-cased `type/subtype`, defaulting to `text/plain` when the header
    /// is missing or malformed.
    pub fn content_type(&self) -> String {
        self.structured("content-type")
            .map(|ct| ct.value.to_ascii_lowercase())
            .filter(|ct| ct.contains('/'))
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string())
    }

    /// Lower-cased `charset` parameter of the Content-Type.
    pub fn charset(&self) -> Option<String> {
        self.structured("content-type")
            .and_then(|ct| ct.param("charset"))
            .map(|c| c.trim().to_ascii_lowercase())
            .filter(|c| !c.is_empty())
    }

    /// Lower-cased Content-Transfer-Encoding, if declared.
    pub fn transfer_encoding(&self) -> Option<String> {
        self.header("content-transfer-encoding")
            .map(|v| v.trim().to_ascii_lowercase())
            .filter(|v| !v.is_empty())
    }

    /// Raw Content-Disposition value, if declared.
    pub fn disposition(&self) -> Option<String> {
        self.header("content-disposition")
    }

    /// `true` when the disposition starts with `attachment`.
    pub fn is_attachment(&self) -> bool {
        self.disposition()
            .is_some_and(|d| d.to_ascii_lowercase().starts_with("attachment"))
    }

    /// Declared filename: the disposition's `filename`, else the
    /// Content-Type's `name`.
    pub fn filename(&self) -> Option<String> {
        self.structured("content-disposition")
            .and_then(|d| d.param("filename"))
            .or_else(|| self.structured("content-type").and_then(|ct| ct.param("name")))
    }

    /// Line ending used by this part's header block.
    pub fn line_ending(&self) -> &'static str {
        self.headers
            .iter()
            .find_map(Header::line_ending)
            .unwrap_or(if self.separator.starts_with(b"\n") {
                "\n"
            } else {
                "\r\n"
            })
    }

    /// Decode a leaf's body through its transfer-encoding and `charset`.
    pub fn decoded_text(&self, charset: &str) -> Result<String> {
        let body = self.leaf_body().ok_or_else(|| {
            GuardError::decode("container part", "multipart parts carry no text")
        })?;
        let bytes = encoding::decode_transfer(body, self.transfer_encoding().as_deref())?;
        encoding::decode_charset(&bytes, charset)
    }

    /// Compute new headers and body carrying `text` as `text/<subtype>`.
    ///
    /// Content-Type keeps its non-charset parameters; Content-Type and
    /// Content-Transfer-Encoding are replaced in place or appended. A
    /// `7bit` or missing encoding is upgraded to quoted-printable if the new
    /// body is not 7-bit clean.
    pub fn prepare_text(
        &self,
        text: &str,
        subtype: &str,
        charset: &str,
        transfer_encoding: Option<&str>,
    ) -> Result<Replacement> {
        let eol = self.line_ending();
        let bytes = encoding::encode_charset(text, charset)?;

        let transfer_encoding = match transfer_encoding {
            None | Some("7bit") if !encoding::is_seven_bit_clean(&bytes) => {
                Some("quoted-printable")
            }
            other => other,
        };

        let mut body = encoding::encode_transfer(&bytes, transfer_encoding, eol);
        let had_trailing_newline = self.leaf_body().is_some_and(|b| b.ends_with(b"\n"));
        if had_trailing_newline && !body.ends_with(b"\n") {
            body.extend_from_slice(eol.as_bytes());
        }

        let mut content_type = format!("text/{subtype}; charset=\"{charset}\"");
        if let Some(ct) = self.structured("content-type") {
            for (name, value) in ct.params.iter().filter(|(n, _)| n != "charset") {
                content_type.push_str(&format!("; {name}=\"{}\"", quote_param(value)));
            }
        }

        let mut headers = self.headers.clone();
        upsert_header(&mut headers, "Content-Type", &content_type, eol);
        if let Some(cte) = transfer_encoding {
            upsert_header(&mut headers, "Content-Transfer-Encoding", cte, eol);
        }

        Ok(Replacement { headers, body })
    }

    /// Swap in a prepared replacement, turning the part into a leaf.
    pub fn apply(&mut self, replacement: Replacement) {
        if self.separator.is_empty() {
            self.separator = self.line_ending().as_bytes().to_vec();
        }
        self.headers = replacement.headers;
        self.body = Body::Leaf(replacement.body);
    }
}

/// Replace the first field with this name, or append a new one.
fn upsert_header(headers: &mut Vec<Header>, name: &str, value: &str, eol: &str) {
    let field = Header::new(name, value, eol);
    match headers.iter_mut().find(|h| h.is(name)) {
        Some(existing) => *existing = field,
        None => headers.push(field),
    }
}

fn quote_param(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
