//! Integration tests for whole-message link rewriting.

use std::path::Path;

use clickguard::config::Config;
use clickguard::model::tree::{MimeTree, PartId};
use clickguard::rewrite::Engine;

const PROXY: &str = "https://check.example.com/check?url=";

fn fixture(name: &str) -> Vec<u8> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    std::fs::read(&path).unwrap_or_else(|e| panic!("read {}: {e}", path.display()))
}

fn engine() -> Engine {
    Engine::from_config(&Config::default()).unwrap()
}

/// Leaf parts in walk order, with their decoded text.
fn leaves(tree: &MimeTree) -> Vec<(PartId, String)> {
    tree.walk()
        .into_iter()
        .filter(|&id| !tree.part(id).is_container())
        .map(|id| {
            let part = tree.part(id);
            let charset = part.charset().unwrap_or_else(|| "utf-8".into());
            (id, part.decoded_text(&charset).unwrap())
        })
        .collect()
}

// ─── Scenario 1: plain-text link is wrapped, readable form ─────────

#[test]
fn test_plain_text_link_is_proxied() {
    let out = engine()
        .rewrite_bytes(&fixture("plain_link.eml"))
        .unwrap()
        .expect("message should be modified");
    let tree = MimeTree::parse(&out).unwrap();
    let root = tree.root();

    assert_eq!(
        root.decoded_text("utf-8").unwrap(),
        format!("Visit {PROXY}https://example.org/page?x=1 today\r\n")
    );
    // 7bit utf-8 content is upgraded once rewritten.
    assert_eq!(root.transfer_encoding().as_deref(), Some("quoted-printable"));
    assert_eq!(root.header("subject").as_deref(), Some("Link"));
    assert_eq!(root.header("message-id").as_deref(), Some("<plain-1@example.org>"));
}

// ─── Scenario 2: conferencing links survive in both alternatives ────

#[test]
fn test_alternative_keeps_zoom_links() {
    let out = engine()
        .rewrite_bytes(&fixture("alternative.eml"))
        .unwrap()
        .expect("message should be modified");
    let tree = MimeTree::parse(&out).unwrap();
    let parts = leaves(&tree);
    assert_eq!(parts.len(), 2);

    let (_, plain) = &parts[0];
    assert!(plain.contains("Join at https://zoom.us/j/123456789 or"));
    assert!(plain.contains(&format!("read {PROXY}https://example.org/notes.")));

    let (html_id, html) = &parts[1];
    assert_eq!(tree.part(*html_id).content_type(), "text/html");
    assert!(html.contains(r#"<a href="https://zoom.us/j/123456789">here</a>"#));
    assert!(html.contains(&format!(
        r#"<a href="{PROXY}https://example.org/notes?a=1&amp;b=2">the notes</a>"#
    )));
}

// ─── Scenarios 3 and 4: calendars and attachments are never touched ─

#[test]
fn test_calendar_and_attachments_untouched() {
    let raw = fixture("calendar_invite.eml");
    let before = MimeTree::parse(&raw).unwrap();
    let out = engine().rewrite_bytes(&raw).unwrap().expect("body part has a link");
    let after = MimeTree::parse(&out).unwrap();

    let before_leaves = leaves(&before);
    let after_leaves = leaves(&after);
    assert_eq!(before_leaves.len(), 4);
    assert_eq!(after_leaves.len(), 4);

    assert_eq!(
        after_leaves[0].1.trim_end(),
        format!("Agenda: {PROXY}https://example.org/agenda")
    );
    for i in 1..4 {
        assert_eq!(after_leaves[i].1, before_leaves[i].1, "leaf {i} changed");
        let id = after_leaves[i].0;
        assert_eq!(
            after.part(id).headers(),
            before.part(before_leaves[i].0).headers(),
            "headers of leaf {i} changed"
        );
    }
}

// ─── Scenario 5: output is a fixed point ────────────────────────────

#[test]
fn test_rewriting_is_idempotent() {
    for name in ["plain_link.eml", "alternative.eml", "calendar_invite.eml"] {
        let once = engine()
            .rewrite_bytes(&fixture(name))
            .unwrap()
            .expect("first pass rewrites");
        assert!(
            engine().rewrite_bytes(&once).unwrap().is_none(),
            "{name}: second pass modified the message"
        );
    }
}

#[test]
fn test_message_without_links_is_byte_identical() {
    let raw = fixture("no_links.eml");
    assert!(engine().rewrite_bytes(&raw).unwrap().is_none());

    let mut tree = MimeTree::parse(&raw).unwrap();
    assert!(!engine().process_message(&mut tree));
    assert_eq!(tree.to_bytes(), raw);
}

#[test]
fn test_duplicate_headers_are_collapsed() {
    let out = engine()
        .rewrite_bytes(&fixture("duplicate_headers.eml"))
        .unwrap()
        .expect("message should be modified");
    let tree = MimeTree::parse(&out).unwrap();
    let root = tree.root();

    let count = |name: &str| root.headers().iter().filter(|h| h.is(name)).count();
    assert_eq!(count("content-type"), 1);
    assert_eq!(count("content-transfer-encoding"), 1);
    assert_eq!(count("precedence"), 1);
    assert_eq!(root.header("precedence").as_deref(), Some("bulk"));
    assert_eq!(root.charset().as_deref(), Some("utf-8"));
    assert_eq!(root.transfer_encoding().as_deref(), Some("8bit"));
    assert_eq!(
        root.decoded_text("utf-8").unwrap(),
        format!("See {PROXY}https://example.org/status\r\n")
    );
}

#[test]
fn test_aggregate_flag_tracks_any_rewrite() {
    let cases = [
        ("alternative.eml", true),
        ("calendar_invite.eml", true),
        ("no_links.eml", false),
    ];
    for (name, expected) in cases {
        let mut tree = MimeTree::parse(&fixture(name)).unwrap();
        assert_eq!(engine().process_message(&mut tree), expected, "{name}");
    }
}

#[test]
fn test_custom_skip_pattern_from_config() {
    let config: Config = toml::from_str(
        r#"
[rewrite]
check_host = "links.corp.test"

[[rewrite.skip_patterns]]
provider = "docs"
host = "example.org"
path = "/notes"
"#,
    )
    .unwrap();
    let engine = Engine::from_config(&config).unwrap();
    let raw = b"Content-Type: text/plain\r\n\r\nhttps://example.org/notes https://example.org/other\r\n";
    let out = engine.rewrite_bytes(raw).unwrap().expect("one link rewritten");
    let text = MimeTree::parse(&out).unwrap().root().decoded_text("utf-8").unwrap();
    assert_eq!(
        text,
        "https://example.org/notes https://links.corp.test/check?url=https://example.org/other\r\n"
    );
}

// ─── Nested structures are traversed to the leaves ──────────────────

#[test]
fn test_nested_alternative_inside_mixed() {
    let raw = fixture("nested.eml");
    let before = MimeTree::parse(&raw).unwrap();
    let out = engine().rewrite_bytes(&raw).unwrap().expect("nested leaves have links");
    let after = MimeTree::parse(&out).unwrap();

    let parts = leaves(&after);
    assert_eq!(parts.len(), 3);
    assert_eq!(after.walk().len(), 5);

    assert!(parts[0].1.contains(&format!("Slides: {PROXY}https://example.org/slides")));
    assert!(parts[1]
        .1
        .contains(&format!(r#"<a href="{PROXY}https://example.org/slides">here</a>"#)));

    let (calendar, text) = &parts[2];
    assert_eq!(after.part(*calendar).content_type(), "text/calendar");
    assert_eq!(text, &leaves(&before)[2].1);
    assert!(text.contains("URL:https://example.org/event"));
}

#[test]
fn test_inline_forwarded_message_is_rewritten() {
    let raw = fixture("forwarded.eml");
    let out = engine().rewrite_bytes(&raw).unwrap().expect("inline message has a link");
    let tree = MimeTree::parse(&out).unwrap();

    let parts = leaves(&tree);
    assert_eq!(parts.len(), 3);
    assert!(parts[0].1.starts_with("Forwarding the thread below."));

    let (inner, text) = &parts[1];
    let inner = tree.part(*inner);
    assert_eq!(inner.header("subject").as_deref(), Some("deals"));
    assert_eq!(inner.headers().iter().filter(|h| h.is("content-type")).count(), 1);
    assert_eq!(inner.content_type(), "text/plain");
    assert!(text.contains(&format!("Offer at {PROXY}https://example.com/offer")));

    // The attached copy is one opaque leaf and keeps its link.
    let (attached, text) = &parts[2];
    assert_eq!(tree.part(*attached).content_type(), "message/rfc822");
    assert!(text.contains("Archived https://example.com/archive"));
    assert!(!text.contains(PROXY));
}

#[test]
fn test_nested_fixtures_are_idempotent() {
    for name in ["nested.eml", "forwarded.eml"] {
        let once = engine().rewrite_bytes(&fixture(name)).unwrap().expect("first pass rewrites");
        assert!(engine().rewrite_bytes(&once).unwrap().is_none(), "{name}");
    }
}
