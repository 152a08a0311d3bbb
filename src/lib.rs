//! `clickguard`: click-time link protection for email.
//!
//! This crate rewrites the links in plain-text and HTML bodies of RFC 5322
//! messages so that they pass through a checking service, while leaving
//! calendar data, attachments, conferencing join links and already-wrapped
//! links alone. The [`gateway`] module plugs the rewriter into a mail-flow
//! hook.

pub mod config;
pub mod error;
pub mod gateway;
pub mod model;
pub mod parser;
pub mod rewrite;
pub mod store;
