//! Structural header de-duplication.
//!
//! Upstream relays occasionally duplicate structural headers. A second
//! Content-Type or Content-Transfer-Encoding makes the message invalid for
//! re-ingestion, so only the first occurrence of each is kept, in every part.

use std::collections::HashSet;

use tracing::warn;

use crate::model::header::Header;
use crate::model::tree::{MimeTree, PartId};

/// Header names allowed at most once per part (lower-case).
pub const PROTECTED_HEADERS: &[&str] = &["precedence", "content-type", "content-transfer-encoding"];

/// De-duplicate protected headers in every part of the tree.
///
/// Part boundaries are found by the parser, which may have followed a
/// duplicate that is now gone. After any removal the tree is re-parsed from
/// its own bytes, so its shape matches the surviving headers, and the pass
/// repeats until nothing is removed (newly exposed parts may carry
/// duplicates of their own).
///
/// Idempotent. Returns the number of header fields removed.
pub fn normalize_headers(tree: &mut MimeTree) -> usize {
    let mut total = 0;
    loop {
        let mut visited = HashSet::new();
        let removed = normalize_part(tree, PartId::ROOT, &mut visited);
        if removed == 0 {
            return total;
        }
        total += removed;
        match MimeTree::parse(&tree.to_bytes()) {
            Ok(reparsed) => *tree = reparsed,
            Err(e) => {
                warn!(error = %e, "Could not re-parse after header de-duplication");
                return total;
            }
        }
    }
}

fn normalize_part(tree: &mut MimeTree, id: PartId, visited: &mut HashSet<PartId>) -> usize {
    if !visited.insert(id) {
        return 0;
    }
    let removed = dedup_headers(tree.part_mut(id).headers_mut());
    let children = tree.part(id).children().to_vec();
    removed
        + children
            .into_iter()
            .map(|child| normalize_part(tree, child, visited))
            .sum::<usize>()
}

/// Keep the first occurrence of each protected header, preserving order.
pub fn dedup_headers(headers: &mut Vec<Header>) -> usize {
    let before = headers.len();
    let mut seen: HashSet<String> = HashSet::new();
    headers.retain(|header| {
        let name = header.name().to_ascii_lowercase();
        !PROTECTED_HEADERS.contains(&name.as_str()) || seen.insert(name)
    });
    before - headers.len()
}
