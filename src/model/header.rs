//! A single header field kept in its original byte layout.

/// One header field (`Name: value`, including any folded continuation lines
/// and the trailing line ending), stored verbatim.
///
/// Fields that the engine never touches are written back byte-for-byte, so
/// folding, spacing and odd encodings survive a round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    name: String,
    raw: Vec<u8>,
}

impl Header {
    /// Wrap raw field bytes. The name is everything before the first `:`;
    /// a line without a colon yields an empty name and is carried along as-is.
    pub fn from_raw(raw: Vec<u8>) -> Self {
        let name = raw
            .iter()
            .position(|&b| b == b':')
            .map(|pos| String::from_utf8_lossy(&raw[..pos]).trim().to_string())
            .unwrap_or_default();
        Self { name, raw }
    }

    /// Build a fresh single-line field.
    pub fn new(name: &str, value: &str, line_ending: &str) -> Self {
        Self::from_raw(format!("{name}: {value}{line_ending}").into_bytes())
    }

    /// Field name as written in the message.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Case-insensitive name comparison.
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Unfolded, trimmed value.
    pub fn value(&self) -> String {
        let Some(colon) = self.raw.iter().position(|&b| b == b':') else {
            return String::new();
        };
        let unfolded: Vec<u8> = self.raw[colon + 1..]
            .iter()
            .copied()
            .filter(|&b| b != b'\r' && b != b'\n')
            .collect();
        String::from_utf8_lossy(&unfolded).trim().to_string()
    }

    /// The verbatim bytes of this field.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// `"\r\n"` or `"\n"`, depending on how this field is terminated.
    pub fn line_ending(&self) -> Option<&'static str> {
        if self.raw.ends_with(b"\r\n") {
            Some("\r\n")
        } else if self.raw.ends_with(b"\n") {
            Some("\n")
        } else {
            None
        }
    }
}
