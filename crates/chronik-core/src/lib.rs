//! Chronik Core — shared event-sourcing abstractions.
//!
//! This crate defines the stream model, event envelopes, the store trait
//! seams, and the schema-evolution machinery that every chronik backend
//! implements. It contains no infrastructure code.

pub mod checkpoint;
pub mod clock;
pub mod error;
pub mod event;
pub mod lock;
pub mod registry;
pub mod repository;
pub mod snapshot;
pub mod store;
pub mod stream;
pub mod upcast;
