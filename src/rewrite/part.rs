//! Per-part eligibility and rewriting.

use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::model::part::Part;

use super::content::{ContentKind, Rewrite, Rewriter};

/// Charset assumed when a text part declares none.
pub const DEFAULT_CHARSET: &str = "utf-8";

/// Content types that are never touched, even if they carry URLs.
const CALENDAR_TYPES: &[&str] = &["text/calendar", "application/ics"];

/// Why a part is not handed to the content rewriter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ineligible {
    /// Not exactly `text/plain` or `text/html`.
    NotText(String),
    /// A calendar invitation.
    Calendar,
    /// The part declares a filename.
    Filename(String),
    /// Content-Disposition is `attachment`.
    Attachment,
}

impl std::fmt::Display for Ineligible {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotText(ct) => write!(f, "content type {ct}"),
            Self::Calendar => write!(f, "calendar"),
            Self::Filename(name) => write!(f, "filename {name:?}"),
            Self::Attachment => write!(f, "attachment disposition"),
        }
    }
}

/// Parts skipped outright while walking a multipart tree: calendar data
/// and anything carrying a filename.
pub fn excluded(part: &Part) -> Option<Ineligible> {
    let content_type = part.content_type();
    if CALENDAR_TYPES.contains(&content_type.as_str()) {
        return Some(Ineligible::Calendar);
    }
    part.filename().map(Ineligible::Filename)
}

/// Check whether a part may be rewritten, and as what.
pub fn eligibility(part: &Part) -> std::result::Result<ContentKind, Ineligible> {
    let content_type = part.content_type();
    let kind = ContentKind::from_mime(&content_type).ok_or(Ineligible::NotText(content_type))?;
    if let Some(reason) = excluded(part) {
        return Err(reason);
    }
    if part.is_attachment() {
        return Err(Ineligible::Attachment);
    }
    Ok(kind)
}

/// Rewrite the links of one part in place.
///
/// Returns `true` iff the part was modified. Decode and encode failures
/// leave the part untouched and return `false`.
pub fn process_part(part: &mut Part, rewriter: &Rewriter) -> bool {
    let kind = match eligibility(part) {
        Ok(kind) => kind,
        Err(reason) => {
            trace!(%reason, "Part not eligible for rewriting");
            return false;
        }
    };

    match rewrite_part(part, kind, rewriter) {
        Ok(modified) => modified,
        Err(e) => {
            warn!(error = %e, ?kind, "Leaving part unmodified");
            false
        }
    }
}

fn rewrite_part(part: &mut Part, kind: ContentKind, rewriter: &Rewriter) -> Result<bool> {
    let charset = part
        .charset()
        .unwrap_or_else(|| DEFAULT_CHARSET.to_string());
    let mut transfer_encoding = part.transfer_encoding();

    let text = part.decoded_text(&charset)?;
    let Rewrite { content, modified } = rewriter.rewrite(&text, kind);
    if !modified {
        return Ok(false);
    }

    // Proxied URLs may not fit 7bit's restrictions; QP is always safe.
    if charset == DEFAULT_CHARSET && transfer_encoding.as_deref() == Some("7bit") {
        transfer_encoding = Some("quoted-printable".to_string());
    }

    let replacement = part.prepare_text(&content, kind.subtype(), &charset, transfer_encoding.as_deref())?;
    part.apply(replacement);
    debug!(?kind, %charset, "Rewrote links in part");
    Ok(true)
}
