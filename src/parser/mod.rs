//! Message parsing: MIME tree construction, header splitting, and body codecs.

pub mod encoding;
pub mod header;
pub mod mime;
