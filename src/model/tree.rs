//! Arena-backed MIME tree.
//!
//! Parts live in a single `Vec` and refer to their children by [`PartId`].
//! The tree is built once from raw bytes, mutated in place by the rewrite
//! engine, and serialized back with [`MimeTree::to_bytes`].

use std::collections::HashSet;

use crate::error::Result;

use super::part::{Body, Part};

/// Index of a part inside its [`MimeTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartId(pub(crate) usize);

impl PartId {
    /// The message itself.
    pub const ROOT: PartId = PartId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for PartId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A parsed message: the root part plus all its descendants.
#[derive(Debug, Clone)]
pub struct MimeTree {
    parts: Vec<Part>,
}

impl MimeTree {
    /// Parse raw RFC 5322 bytes. See [`crate::parser::mime::parse_tree`].
    pub fn parse(raw: &[u8]) -> Result<Self> {
        crate::parser::mime::parse_tree(raw)
    }

    /// Build from an arena whose first entry is the root.
    pub(crate) fn from_parts(parts: Vec<Part>) -> Self {
        debug_assert!(!parts.is_empty(), "a tree always has a root");
        Self { parts }
    }

    pub fn root(&self) -> &Part {
        &self.parts[PartId::ROOT.0]
    }

    pub fn root_mut(&mut self) -> &mut Part {
        &mut self.parts[PartId::ROOT.0]
    }

    /// Borrow a part. Ids handed out by this tree are always valid.
    pub fn part(&self, id: PartId) -> &Part {
        &self.parts[id.0]
    }

    pub fn part_mut(&mut self, id: PartId) -> &mut Part {
        &mut self.parts[id.0]
    }

    /// Number of parts, containers included.
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// `true` if the root part is a multipart container.
    pub fn is_multipart(&self) -> bool {
        self.root().is_container()
    }

    /// Every part reachable from the root, depth-first, parents before
    /// children. Each id appears once even if referenced twice.
    pub fn walk(&self) -> Vec<PartId> {
        let mut order = Vec::with_capacity(self.parts.len());
        let mut visited = HashSet::new();
        let mut stack = vec![PartId::ROOT];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            order.push(id);
            stack.extend(self.part(id).children().iter().rev().copied());
        }
        order
    }

    /// Serialize the tree back into raw message bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_part(PartId::ROOT, &mut out);
        out
    }

    fn write_part(&self, id: PartId, out: &mut Vec<u8>) {
        let part = self.part(id);
        for header in part.headers() {
            out.extend_from_slice(header.raw());
        }
        out.extend_from_slice(part.separator());
        match part.body() {
            Body::Leaf(bytes) => out.extend_from_slice(bytes),
            Body::Container { children, segments } => {
                for (i, segment) in segments.iter().enumerate() {
                    out.extend_from_slice(segment);
                    if let Some(&child) = children.get(i) {
                        self.write_part(child, out);
                    }
                }
            }
        }
    }
}
