//! MIME tree construction.
//!
//! `mail-parser` finds the part boundaries; the bytes themselves are sliced
//! from the original input so that an untouched tree serializes back to the
//! exact same bytes (no header re-folding, no re-encoding).

use mail_parser::{Message, MessageParser, PartType};
use tracing::debug;

use crate::error::{GuardError, Result};
use crate::model::part::{Body, Part};
use crate::model::tree::{MimeTree, PartId};
use crate::parser::header::split_header_block;

/// Maximum multipart nesting depth accepted (to prevent stack overflow on
/// adversarial input).
const MAX_DEPTH: usize = 32;

/// Parse raw message bytes into a [`MimeTree`].
///
/// Inline `message/rfc822` parts are expanded into a single child holding
/// the embedded message; attached ones stay opaque leaves. Input whose
/// part offsets do not describe a well-formed tree is rejected with
/// [`GuardError::MalformedMessage`].
pub fn parse_tree(raw: &[u8]) -> Result<MimeTree> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Err(GuardError::MalformedMessage("empty message".into()));
    }
    let message = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| GuardError::MalformedMessage("no RFC 5322 message found".into()))?;

    let mut builder = TreeBuilder {
        raw,
        message: &message,
        parts: Vec::new(),
    };
    builder.build(0, 0, Some(raw.len()), 0)?;
    debug!(parts = builder.parts.len(), "Parsed MIME tree");
    Ok(MimeTree::from_parts(builder.parts))
}

struct TreeBuilder<'a, 'x> {
    raw: &'a [u8],
    message: &'a Message<'x>,
    parts: Vec<Part>,
}

impl TreeBuilder<'_, '_> {
    /// Build the part `source` whose header starts at `header_start`.
    ///
    /// Returns the arena id and the offset where the part's bytes end.
    fn build(
        &mut self,
        source: usize,
        header_start: usize,
        forced_end: Option<usize>,
        depth: usize,
    ) -> Result<(PartId, usize)> {
        if depth > MAX_DEPTH {
            return Err(GuardError::MalformedMessage(format!(
                "multipart nesting deeper than {MAX_DEPTH}"
            )));
        }
        let message = self.message;
        let src = message.parts.get(source).ok_or_else(|| {
            GuardError::MalformedMessage(format!("reference to missing part {source}"))
        })?;

        let raw_len = self.raw.len();
        let body_start = (src.raw_body_offset() as usize).clamp(header_start, raw_len);
        let declared_end = forced_end
            .unwrap_or_else(|| src.raw_end_offset() as usize)
            .clamp(body_start, raw_len);
        let (headers, separator) = split_header_block(&self.raw[header_start..body_start]);

        // Reserve the slot first so parents precede their children.
        let id = PartId(self.parts.len());
        self.parts
            .push(Part::new(headers, separator, Body::Leaf(Vec::new())));

        let (body, end) = match &src.body {
            PartType::Multipart(child_ids) => {
                let mut children = Vec::with_capacity(child_ids.len());
                let mut segments = Vec::with_capacity(child_ids.len() + 1);
                let mut cursor = body_start;

                for &child in child_ids {
                    let child_start = message
                        .parts
                        .get(child)
                        .map(|p| p.raw_header_offset() as usize)
                        .ok_or_else(|| {
                            GuardError::MalformedMessage(format!(
                                "reference to missing part {child}"
                            ))
                        })?;
                    if child_start < cursor || child_start > raw_len {
                        return Err(GuardError::MalformedMessage(format!(
                            "part {child} starts at {child_start}, before offset {cursor}"
                        )));
                    }
                    segments.push(self.raw[cursor..child_start].to_vec());
                    let (child_id, child_end) = self.build(child, child_start, None, depth + 1)?;
                    children.push(child_id);
                    cursor = child_end;
                }

                let end = declared_end.max(cursor);
                segments.push(self.raw[cursor..end].to_vec());
                (Body::Container { children, segments }, end)
            }
            _ => {
                let body = match self.build_embedded(id, body_start, declared_end, depth) {
                    Some(child) => Body::Container {
                        children: vec![child],
                        segments: vec![Vec::new(), Vec::new()],
                    },
                    None => Body::Leaf(self.raw[body_start..declared_end].to_vec()),
                };
                (body, declared_end)
            }
        };

        self.parts[id.index()].set_body(body);
        Ok((id, end))
    }

    /// Expand an inline `message/rfc822` body into a sub-tree appended to
    /// the same arena. The body bytes become the child's bytes unchanged.
    ///
    /// Attached messages, encoded bodies and bodies that do not parse stay
    /// opaque leaves (`None`).
    fn build_embedded(
        &mut self,
        id: PartId,
        start: usize,
        end: usize,
        depth: usize,
    ) -> Option<PartId> {
        let part = &self.parts[id.index()];
        let identity = matches!(
            part.transfer_encoding().as_deref(),
            None | Some("7bit") | Some("8bit") | Some("binary")
        );
        if part.content_type() != "message/rfc822"
            || !identity
            || part.is_attachment()
            || part.filename().is_some()
        {
            return None;
        }

        let outer = self.raw;
        let raw = &outer[start..end];
        if raw.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        let message = MessageParser::default().parse(raw)?;

        let first = self.parts.len();
        let mut nested = TreeBuilder {
            raw,
            message: &message,
            parts: std::mem::take(&mut self.parts),
        };
        let result = nested.build(0, 0, Some(raw.len()), depth + 1);
        self.parts = nested.parts;

        match result {
            Ok((child, _)) => Some(child),
            Err(e) => {
                debug!(part = %id, error = %e, "Keeping embedded message opaque");
                self.parts.truncate(first);
                None
            }
        }
    }
}
