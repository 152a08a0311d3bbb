//! MIME tree data model: header fields, parts and the owning arena.

pub mod header;
pub mod part;
pub mod tree;
