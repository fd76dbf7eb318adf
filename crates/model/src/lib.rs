//! An abstraction layer for different LLMs.
//!
//! This crate establishes an unified protocol for the agent to talk to
//! a hosted model, so that the turn executor never depends on a concrete
//! vendor API.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to. Request messages
//! are serializable, which lets callers persist a conversation between
//! turns without knowing which provider produced it.

#![deny(missing_docs)]

mod error;
mod provider;
mod request;
mod response;

pub use error::*;
pub use provider::*;
pub use request::*;
pub use response::*;
