//! Mail-flow integration: fetch, rewrite, store, submit.
//!
//! Whatever happens to the rewrite, the hook always answers with the default
//! delivery action. A rejected or frozen update means the original message
//! is delivered unchanged.

pub mod event;
pub mod flow;

use std::collections::HashSet;

use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{GuardError, Result};
use crate::rewrite::Engine;
use crate::store::{message_key, ContentStore};

pub use event::{FlowResponse, InvocationEvent};
pub use flow::{MessageFlow, SpoolFlow};

/// What happened to one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The sender is on the allow-list; the message was not fetched.
    SafeSender,
    /// Nothing to rewrite, or the message could not be parsed.
    Unchanged,
    /// Rewritten content was stored under `key` and accepted.
    Rewritten { key: String },
    /// The flow refused the rewritten content; it was kept for inspection.
    Rejected,
    /// The message may no longer be updated.
    Frozen,
}

impl Outcome {
    /// Every outcome delivers with the default action.
    pub fn response(&self) -> FlowResponse {
        FlowResponse::deliver()
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SafeSender => write!(f, "safe sender"),
            Self::Unchanged => write!(f, "unchanged"),
            Self::Rewritten { key } => write!(f, "rewritten ({key})"),
            Self::Rejected => write!(f, "rejected"),
            Self::Frozen => write!(f, "frozen"),
        }
    }
}

/// Handles mail-flow invocations with an [`Engine`].
pub struct Gateway<F, S> {
    engine: Engine,
    flow: F,
    store: Option<S>,
    safe_senders: HashSet<String>,
}

impl<F: MessageFlow, S: ContentStore> Gateway<F, S> {
    pub fn new(engine: Engine, flow: F, store: Option<S>) -> Self {
        Self {
            engine,
            flow,
            store,
            safe_senders: HashSet::new(),
        }
    }

    /// Build a gateway using the `[rewrite]` and `[senders]` sections.
    pub fn from_config(config: &Config, flow: F, store: Option<S>) -> Result<Self> {
        let engine = Engine::from_config(config)?;
        Ok(Self::new(engine, flow, store).with_safe_senders(config.senders.safe_set()))
    }

    /// Replace the sender allow-list. Addresses are compared lower-cased.
    pub fn with_safe_senders<I>(mut self, senders: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        self.safe_senders = senders
            .into_iter()
            .map(|s| s.as_ref().trim().to_ascii_lowercase())
            .collect();
        self
    }

    pub fn is_safe_sender(&self, address: &str) -> bool {
        self.safe_senders
            .contains(&address.trim().to_ascii_lowercase())
    }

    pub fn flow(&self) -> &F {
        &self.flow
    }

    /// Process one invocation.
    ///
    /// Flow errors other than rejection and freezing propagate, as does a
    /// missing store when a rewrite needs to be saved.
    pub fn handle(&self, event: &InvocationEvent) -> Result<Outcome> {
        let message_id = event.message_id.as_str();

        if let Some(sender) = event.sender() {
            if self.is_safe_sender(sender) {
                info!(message_id, sender, "Skipping safe sender");
                return Ok(Outcome::SafeSender);
            }
        }

        info!(message_id, "Processing message");
        match self.rewrite_and_submit(message_id) {
            Ok(outcome) => Ok(outcome),
            Err(GuardError::MessageFrozen(_)) => {
                info!(message_id, "Message not eligible for update, delivering unchanged");
                Ok(Outcome::Frozen)
            }
            Err(GuardError::MessageRejected(reason)) => {
                warn!(message_id, %reason, "Rewritten message rejected, delivering unchanged");
                Ok(Outcome::Rejected)
            }
            Err(e) => {
                error!(message_id, error = %e, "Message processing failed");
                Err(e)
            }
        }
    }

    fn rewrite_and_submit(&self, message_id: &str) -> Result<Outcome> {
        let raw = self.flow.get_raw_message(message_id)?;
        debug!(message_id, bytes = raw.len(), "Fetched message");

        let rewritten = match self.engine.rewrite_bytes(&raw) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                info!(message_id, "No URLs to modify in message");
                return Ok(Outcome::Unchanged);
            }
            Err(e) => {
                warn!(message_id, error = %e, "Could not parse message, delivering unchanged");
                return Ok(Outcome::Unchanged);
            }
        };

        let store = self.store.as_ref().ok_or(GuardError::StoreNotConfigured)?;
        let key = message_key(message_id)?;
        store.put(&key, &rewritten)?;

        match self.flow.put_raw_message(message_id, &key) {
            Ok(()) => {
                info!(message_id, key, "Message updated");
                Ok(Outcome::Rewritten { key })
            }
            Err(GuardError::MessageRejected(reason)) => {
                if let Err(e) = store.preserve_error(&key) {
                    error!(message_id, key, error = %e, "Failed to preserve rejected content");
                }
                Err(GuardError::MessageRejected(reason))
            }
            Err(e) => Err(e),
        }
    }
}
