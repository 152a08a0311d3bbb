//! Link rewriting: classification, per-content strategies, part processing
//! and whole-message orchestration.

pub mod classifier;
pub mod content;
pub mod engine;
pub mod normalize;
pub mod part;

pub use classifier::{HostMatch, SkipPattern, SkipReason, UrlClassifier};
pub use content::{proxied_url, ContentKind, Decision, Rewriter};
pub use engine::Engine;
