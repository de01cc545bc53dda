//! # relay-core
//!
//! Shared vocabulary for the relay crates:
//!
//! - **Topics**: `/`-separated topic matching with `+` and `#` wildcards
//! - **Messages**: [`Message`] with its routing [`MessageType`] and [`ConnTarget`]
//! - **Envelopes**: [`tag`], [`untag`], and [`validate`] for the flat wire form
//! - **Ids**: generated connection ids
//! - **Errors**: [`EnvelopeError`] with client-facing messages

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod message;
pub mod topic;

pub use errors::EnvelopeError;
pub use message::{ConnTarget, Message, MessageType, tag, untag, untag_slice, validate};
