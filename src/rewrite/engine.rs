//! Whole-message orchestration.

use tracing::{debug, info, trace};

use crate::config::Config;
use crate::error::Result;
use crate::model::tree::MimeTree;

use super::classifier::UrlClassifier;
use super::content::Rewriter;
use super::normalize::normalize_headers;
use super::part::{excluded, process_part};

/// Applies header normalization and link rewriting to a whole message.
#[derive(Debug, Clone)]
pub struct Engine {
    rewriter: Rewriter,
}

impl Engine {
    pub fn new(rewriter: Rewriter) -> Self {
        Self { rewriter }
    }

    /// Build an engine from the `[rewrite]` section.
    pub fn from_config(config: &Config) -> Result<Self> {
        let classifier = UrlClassifier::with_patterns(
            config.rewrite.check_host.clone(),
            &config.rewrite.skip_patterns,
        )?;
        Ok(Self::new(Rewriter::new(classifier)))
    }

    pub fn rewriter(&self) -> &Rewriter {
        &self.rewriter
    }

    /// Normalize headers, then rewrite every eligible part.
    ///
    /// Returns `true` iff at least one part's links were rewritten. Header
    /// de-duplication alone does not count as a modification.
    pub fn process_message(&self, tree: &mut MimeTree) -> bool {
        let removed = normalize_headers(tree);
        if removed > 0 {
            debug!(removed, "Removed duplicate structural headers");
        }

        if !tree.is_multipart() {
            return process_part(tree.root_mut(), &self.rewriter);
        }

        let mut modified = false;
        for id in tree.walk() {
            let part = tree.part(id);
            if part.is_container() {
                continue;
            }
            if let Some(reason) = excluded(part) {
                trace!(part = %id, %reason, "Skipping part");
                continue;
            }
            if process_part(tree.part_mut(id), &self.rewriter) {
                trace!(part = %id, "Part rewritten");
                modified = true;
            }
        }
        modified
    }

    /// Parse, process and serialize a raw message.
    ///
    /// Returns `Ok(None)` when nothing was rewritten; the caller should then
    /// deliver the original bytes.
    pub fn rewrite_bytes(&self, raw: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut tree = MimeTree::parse(raw)?;
        if !self.process_message(&mut tree) {
            return Ok(None);
        }
        let out = tree.to_bytes();
        info!(bytes_in = raw.len(), bytes_out = out.len(), "Message rewritten");
        Ok(Some(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Engine {
        Engine::from_config(&Config::default()).unwrap()
    }

    #[test]
    fn test_single_part_rewritten() {
        let raw = b"Subject: x\r\nContent-Type: text/plain\r\n\r\ngo https://example.org/a\r\n";
        let out = engine().rewrite_bytes(raw).unwrap().expect("modified");
        let tree = MimeTree::parse(&out).unwrap();
        let text = tree.root().decoded_text("utf-8").unwrap();
        assert_eq!(text, "go https://check.example.com/check?url=https://example.org/a\r\n");
    }

    #[test]
    fn test_no_links_means_no_output() {
        let raw = b"Subject: x\r\nContent-Type: text/plain\r\n\r\nnothing here\r\n";
        assert!(engine().rewrite_bytes(raw).unwrap().is_none());
    }

    #[test]
    fn test_dedup_alone_is_not_a_modification() {
        let raw = b"Content-Type: text/plain\r\nContent-Type: text/html\r\n\r\nplain\r\n";
        let mut tree = MimeTree::parse(raw).unwrap();
        assert!(!engine().process_message(&mut tree));
        assert_eq!(tree.root().headers().len(), 1);
    }

    #[test]
    fn test_links_rewritten_under_duplicated_root_content_type() {
        let raw = b"Subject: relayed\r\n\
Content-Type: multipart/mixed; boundary=b\r\n\
Content-Type: text/plain\r\n\
\r\n\
--b\r\n\
Content-Type: text/plain\r\n\
\r\n\
see https://example.org/x\r\n\
--b--\r\n";
        let mut tree = MimeTree::parse(raw).unwrap();
        assert!(engine().process_message(&mut tree));
        assert!(tree.is_multipart());
        assert_eq!(tree.root().content_type(), "multipart/mixed");

        let child = tree.root().children()[0];
        let text = tree.part(child).decoded_text("utf-8").unwrap();
        assert!(text.contains("https://check.example.com/check?url=https://example.org/x"));
        let out = tree.to_bytes();
        let reparsed = MimeTree::parse(&out).unwrap();
        assert_eq!(reparsed.walk().len(), 2);
    }

    #[test]
    fn test_invalid_config_pattern_is_an_error() {
        let mut config = Config::default();
        config.rewrite.skip_patterns.push(crate::rewrite::classifier::SkipPattern {
            provider: "broken".into(),
            host: "example.net".into(),
            host_match: Default::default(),
            path: "/(".into(),
        });
        assert!(Engine::from_config(&config).is_err());
    }
}
