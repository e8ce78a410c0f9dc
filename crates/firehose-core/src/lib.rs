//! # firehose-core
//!
//! Shared types for the firehose realtime dispatcher.
//!
//! - [`envelope`]: the `{name, data}` wire message used in both directions
//! - [`events`]: lifecycle event names and the wildcard match rule
//! - [`target`]: owner identity of a registered callback
//! - [`errors`]: error types shared across crates
//! - [`logging`]: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod envelope;
pub mod errors;
pub mod events;
pub mod logging;
pub mod target;

pub use envelope::{Envelope, EnvelopeError};
pub use errors::{FirehoseError, Result};
pub use events::{CLOSE, CONNECTION, WILDCARD, WildcardMode};
pub use target::Target;
