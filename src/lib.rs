//! jobscan — classification, routing, and safety-gated dispatch of
//! job-opportunity messages.
//!
//! A feed of chat messages flows through a keyword relevance classifier,
//! a multi-profile router, email extraction, a global dedup ledger, and a
//! layered safety gate before anything reaches the SMTP transport. Every
//! decision, including every skip, is recorded in an append-only outbox.

pub mod classify;
pub mod config;
pub mod error;
pub mod feed;
pub mod gate;
pub mod pipeline;
pub mod profile;
pub mod store;
pub mod transport;

pub use error::{Error, Result};
