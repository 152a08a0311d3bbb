//! Transfer-encoding and charset codecs for text bodies.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use encoding_rs::Encoding;

use crate::error::{GuardError, Result};

/// Longest line allowed in a 7bit body (RFC 5322 §2.1.1).
const MAX_LINE_OCTETS: usize = 998;

/// Column at which base64 output is wrapped.
const BASE64_LINE_WIDTH: usize = 76;

/// Undo a Content-Transfer-Encoding. Unknown or identity encodings
/// (`7bit`, `8bit`, `binary`, unset) return the bytes unchanged.
pub fn decode_transfer(body: &[u8], transfer_encoding: Option<&str>) -> Result<Vec<u8>> {
    match transfer_encoding {
        Some("base64") => {
            let compact: Vec<u8> = body
                .iter()
                .copied()
                .filter(|b| !b.is_ascii_whitespace())
                .collect();
            STANDARD
                .decode(compact)
                .map_err(|e| GuardError::decode("base64 body", e))
        }
        Some("quoted-printable") => {
            quoted_printable::decode(body, quoted_printable::ParseMode::Robust)
                .map_err(|e| GuardError::decode("quoted-printable body", e))
        }
        _ => Ok(body.to_vec()),
    }
}

/// Apply a Content-Transfer-Encoding, using `line_ending` for line breaks.
pub fn encode_transfer(bytes: &[u8], transfer_encoding: Option<&str>, line_ending: &str) -> Vec<u8> {
    match transfer_encoding {
        Some("quoted-printable") => {
            let crlf = normalize_line_endings(bytes, "\r\n");
            let encoded = quoted_printable::encode(crlf);
            normalize_line_endings(&encoded, line_ending)
        }
        Some("base64") => {
            let encoded = STANDARD.encode(bytes);
            let mut out = Vec::with_capacity(encoded.len() + encoded.len() / 38 + 2);
            for line in encoded.as_bytes().chunks(BASE64_LINE_WIDTH) {
                out.extend_from_slice(line);
                out.extend_from_slice(line_ending.as_bytes());
            }
            out
        }
        _ => bytes.to_vec(),
    }
}

fn lookup(charset: &str) -> Result<&'static Encoding> {
    Encoding::for_label(charset.trim().as_bytes())
        .ok_or_else(|| GuardError::UnknownCharset(charset.to_string()))
}

/// Decode bytes in `charset`. Malformed sequences are an error rather than
/// being replaced, so a rewrite never silently alters the original text.
pub fn decode_charset(bytes: &[u8], charset: &str) -> Result<String> {
    let encoding = lookup(charset)?;
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| text.into_owned())
        .ok_or_else(|| GuardError::decode(format!("{charset} text"), "malformed byte sequence"))
}

/// Encode text into `charset`, failing if any character has no mapping.
pub fn encode_charset(text: &str, charset: &str) -> Result<Vec<u8>> {
    let encoding = lookup(charset)?;
    let (bytes, used, had_errors) = encoding.encode(text);
    if had_errors || used != encoding {
        return Err(GuardError::Unrepresentable(charset.to_string()));
    }
    Ok(bytes.into_owned())
}

/// `true` if the bytes are ASCII without NULs and no line exceeds 998
/// octets, i.e. they can travel as `7bit`.
pub fn is_seven_bit_clean(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| b.is_ascii() && b != 0)
        && bytes
            .split(|&b| b == b'\n')
            .all(|line| line.len() <= MAX_LINE_OCTETS + 1)
}

/// Rewrite every line break (`\r\n` or bare `\n`) as `line_ending`.
fn normalize_line_endings(bytes: &[u8], line_ending: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + bytes.len() / 32);
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\r' if bytes.get(i + 1) == Some(&b'\n') => {
                out.extend_from_slice(line_ending.as_bytes());
                i += 2;
            }
            b'\n' => {
                out.extend_from_slice(line_ending.as_bytes());
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    out
}
