//! Integration tests for the mail-flow handler over filesystem collaborators.

use std::path::{Path, PathBuf};

use clickguard::config::Config;
use clickguard::error::{GuardError, Result};
use clickguard::gateway::event::FlowResponse;
use clickguard::gateway::flow::MessageFlow;
use clickguard::gateway::{Gateway, InvocationEvent, Outcome, SpoolFlow};
use clickguard::model::tree::MimeTree;
use clickguard::store::{ContentStore, FsContentStore};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// A spool holding `fixture` as message `id`, plus an empty store.
fn setup(id: &str, fixture_name: &str) -> (tempfile::TempDir, FsContentStore) {
    let dir = tempfile::tempdir().unwrap();
    let incoming = dir.path().join("spool").join("incoming");
    std::fs::create_dir_all(&incoming).unwrap();
    std::fs::copy(fixture(fixture_name), incoming.join(format!("{id}.eml"))).unwrap();
    let store = FsContentStore::open(dir.path().join("store")).unwrap();
    (dir, store)
}

fn event(id: &str, sender: &str) -> InvocationEvent {
    serde_json::from_value(serde_json::json!({
        "summaryVersion": "2019-07-28",
        "messageId": id,
        "envelope": {
            "mailFrom": {"address": sender},
            "recipients": [{"address": "bob@example.net"}]
        },
        "flowDirection": "INBOUND"
    }))
    .unwrap()
}

#[test]
fn test_rewritten_message_reaches_outgoing() {
    let (dir, store) = setup("msg-1", "plain_link.eml");
    let flow = SpoolFlow::new(dir.path().join("spool"), store.clone());
    let gateway = Gateway::from_config(&Config::default(), flow, Some(store.clone())).unwrap();

    let outcome = gateway.handle(&event("msg-1", "alice@example.org")).unwrap();
    assert_eq!(outcome, Outcome::Rewritten { key: "mail/msg-1".into() });
    assert_eq!(outcome.response(), FlowResponse::deliver());

    let delivered = std::fs::read(gateway.flow().outgoing_path("msg-1").unwrap()).unwrap();
    assert_eq!(delivered, store.get("mail/msg-1").unwrap());
    let text = MimeTree::parse(&delivered)
        .unwrap()
        .root()
        .decoded_text("utf-8")
        .unwrap();
    assert!(text.contains("https://check.example.com/check?url=https://example.org/page?x=1"));
}

#[test]
fn test_unchanged_message_is_not_stored() {
    let (dir, store) = setup("msg-2", "no_links.eml");
    let flow = SpoolFlow::new(dir.path().join("spool"), store.clone());
    let gateway = Gateway::from_config(&Config::default(), flow, Some(store.clone())).unwrap();

    assert_eq!(
        gateway.handle(&event("msg-2", "alice@example.org")).unwrap(),
        Outcome::Unchanged
    );
    assert!(store.get("mail/msg-2").is_err());
    assert!(!gateway.flow().outgoing_path("msg-2").unwrap().exists());
}

#[test]
fn test_safe_sender_from_config() {
    let (dir, store) = setup("msg-3", "plain_link.eml");
    let mut config = Config::default();
    config.senders.safe = vec!["Alerts@Corp.Example".into()];
    let flow = SpoolFlow::new(dir.path().join("spool"), store.clone());
    let gateway = Gateway::from_config(&config, flow, Some(store)).unwrap();

    assert_eq!(
        gateway.handle(&event("msg-3", "alerts@corp.example")).unwrap(),
        Outcome::SafeSender
    );
    assert!(!gateway.flow().outgoing_path("msg-3").unwrap().exists());
}

#[test]
fn test_frozen_message_is_delivered_unchanged() {
    let (dir, store) = setup("msg-4", "plain_link.eml");
    std::fs::write(dir.path().join("spool/incoming/msg-4.frozen"), b"").unwrap();
    let flow = SpoolFlow::new(dir.path().join("spool"), store.clone());
    let gateway = Gateway::from_config(&Config::default(), flow, Some(store)).unwrap();

    assert_eq!(
        gateway.handle(&event("msg-4", "alice@example.org")).unwrap(),
        Outcome::Frozen
    );
    assert!(!gateway.flow().outgoing_path("msg-4").unwrap().exists());
}

#[test]
fn test_missing_message_propagates() {
    let (dir, store) = setup("msg-5", "plain_link.eml");
    let flow = SpoolFlow::new(dir.path().join("spool"), store.clone());
    let gateway = Gateway::from_config(&Config::default(), flow, Some(store)).unwrap();

    assert!(matches!(
        gateway.handle(&event("other", "alice@example.org")),
        Err(GuardError::MessageNotFound(id)) if id == "other"
    ));
}

/// Wraps a spool and refuses every update, like a validator would.
struct RejectingFlow(SpoolFlow<FsContentStore>);

impl MessageFlow for RejectingFlow {
    fn get_raw_message(&self, message_id: &str) -> Result<Vec<u8>> {
        self.0.get_raw_message(message_id)
    }

    fn put_raw_message(&self, message_id: &str, _key: &str) -> Result<()> {
        Err(GuardError::MessageRejected(format!(
            "{message_id}: invalid Return-Path"
        )))
    }
}

#[test]
fn test_rejected_content_is_preserved() {
    let (dir, store) = setup("msg-6", "alternative.eml");
    let flow = RejectingFlow(SpoolFlow::new(dir.path().join("spool"), store.clone()));
    let gateway = Gateway::from_config(&Config::default(), flow, Some(store.clone())).unwrap();

    let outcome = gateway.handle(&event("msg-6", "alice@example.org")).unwrap();
    assert_eq!(outcome, Outcome::Rejected);
    assert_eq!(outcome.response(), FlowResponse::deliver());
    assert!(store.get("mail/msg-6").is_err());
    assert!(dir.path().join("store/mail/msg-6.error").is_file());
}

#[test]
fn test_unsafe_message_id_is_refused() {
    let (dir, store) = setup("..", "plain_link.eml");
    let flow = SpoolFlow::new(dir.path().join("spool"), store.clone());
    let gateway = Gateway::from_config(&Config::default(), flow, Some(store)).unwrap();

    assert!(matches!(
        gateway.handle(&event("..", "alice@example.org")),
        Err(GuardError::InvalidPath(_))
    ));
}
