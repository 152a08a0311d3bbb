//! Header block splitting and structured header values (RFC 2045 parameters,
//! RFC 2231 extended parameters).

use percent_encoding::percent_decode_str;

use crate::model::header::Header;

/// Split a raw header block into fields and the terminating blank line.
///
/// Continuation lines (leading space or tab) stay attached to their field.
/// The returned separator holds the blank line and anything after it, so
/// concatenating the fields and the separator reproduces `block` exactly.
pub fn split_header_block(block: &[u8]) -> (Vec<Header>, Vec<u8>) {
    let mut fields: Vec<Vec<u8>> = Vec::new();
    let mut separator = Vec::new();
    let mut rest = block;

    while !rest.is_empty() {
        let line_len = rest
            .iter()
            .position(|&b| b == b'\n')
            .map_or(rest.len(), |pos| pos + 1);
        let (line, tail) = rest.split_at(line_len);

        if line == b"\n" || line == b"\r\n" {
            separator = rest.to_vec();
            break;
        }

        let continuation = line[0] == b' ' || line[0] == b'\t';
        match fields.last_mut() {
            Some(field) if continuation => field.extend_from_slice(line),
            _ => fields.push(line.to_vec()),
        }
        rest = tail;
    }

    (fields.into_iter().map(Header::from_raw).collect(), separator)
}

/// A header value of the form `token; name=value; name="quoted value"`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructuredValue {
    /// The leading token (e.g. `text/plain`, `attachment`), trimmed.
    pub value: String,
    /// Parameters in order, names lower-cased, values unquoted.
    pub params: Vec<(String, String)>,
}

impl StructuredValue {
    /// Look up a parameter, joining RFC 2231 continuations
    /// (`name*0=`, `name*1*=`) and decoding the extended `name*=` form.
    pub fn param(&self, name: &str) -> Option<String> {
        let name = name.to_ascii_lowercase();
        if let Some((_, value)) = self.params.iter().find(|(n, _)| *n == name) {
            return Some(value.clone());
        }

        let mut pieces: Vec<(u32, bool, &str)> = Vec::new();
        for (param, value) in &self.params {
            let Some(rest) = param
                .strip_prefix(name.as_str())
                .and_then(|r| r.strip_prefix('*'))
            else {
                continue;
            };
            let (index, extended) = if rest.is_empty() {
                (0, true)
            } else {
                let (digits, extended) = match rest.strip_suffix('*') {
                    Some(digits) => (digits, true),
                    None => (rest, false),
                };
                match digits.parse::<u32>() {
                    Ok(index) => (index, extended),
                    Err(_) => continue,
                }
            };
            pieces.push((index, extended, value.as_str()));
        }

        if pieces.is_empty() {
            return None;
        }
        pieces.sort_by_key(|piece| piece.0);

        let mut joined = String::new();
        for (i, &(_, extended, value)) in pieces.iter().enumerate() {
            if extended {
                // First extended segment carries `charset'language'`.
                let encoded = if i == 0 {
                    value.splitn(3, '\'').nth(2).unwrap_or(value)
                } else {
                    value
                };
                joined.push_str(&percent_decode_str(encoded).decode_utf8_lossy());
            } else {
                joined.push_str(value);
            }
        }
        Some(joined)
    }
}

/// Parse a structured header value such as a Content-Type or
/// Content-Disposition.
pub fn parse_structured(input: &str) -> StructuredValue {
    let mut segments = split_unquoted(input, ';').into_iter();
    let value = segments.next().unwrap_or_default().trim().to_string();
    let params = segments
        .filter_map(|segment| {
            let (name, value) = segment.split_once('=')?;
            let name = name.trim().to_ascii_lowercase();
            if name.is_empty() {
                return None;
            }
            Some((name, unquote(value.trim())))
        })
        .collect();
    StructuredValue { value, params }
}

/// Split on `sep` outside double quotes.
fn split_unquoted(input: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for ch in input.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quotes => {
                current.push(ch);
                escaped = true;
            }
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            c if c == sep && !in_quotes => parts.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    parts.push(current);
    parts
}

/// Strip surrounding double quotes and resolve backslash escapes.
fn unquote(s: &str) -> String {
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        let mut out = String::with_capacity(s.len() - 2);
        let mut chars = s[1..s.len() - 1].chars();
        while let Some(ch) = chars.next() {
            if ch == '\\' {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            } else {
                out.push(ch);
            }
        }
        out
    } else {
        s.to_string()
    }
}
