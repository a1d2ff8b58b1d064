//! Probe event parser module
//!
//! Decodes the line-oriented wire format emitted by the tracing agents.

pub mod core;
pub mod error;

// Re-export commonly used items
pub use self::core::{Decoded, EventKind, ProbeEvent, ValueParser, WireEvent};
pub use error::{ParseError, ParseResult};
